//! Cosine similarity and the histogram of pairwise similarities

use serde::Serialize;

/// Cosine similarity; zero when either vector has zero norm
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Symmetric matrix of pairwise cosine similarities
pub fn similarity_matrix(vectors: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let n = vectors.len();
    let mut matrix = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        matrix[i][i] = 1.0;
        for j in (i + 1)..n {
            let s = cosine(&vectors[i], &vectors[j]);
            matrix[i][j] = s;
            matrix[j][i] = s;
        }
    }
    matrix
}

/// Values above the diagonal, row by row
pub fn upper_triangle(matrix: &[Vec<f32>]) -> Vec<f32> {
    matrix
        .iter()
        .enumerate()
        .flat_map(|(i, row)| row.iter().skip(i + 1).copied())
        .collect()
}

/// Fixed-width bins over `[min, max]`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub min: f32,
    pub max: f32,
    pub counts: Vec<usize>,
}

impl Histogram {
    pub fn new(values: &[f32], bins: usize, min: f32, max: f32) -> Self {
        let bins = bins.max(1);
        let mut counts = vec![0usize; bins];
        let width = (max - min) / bins as f32;
        for v in values.iter().filter(|v| v.is_finite()) {
            let bin = ((v - min) / width).floor();
            let bin = (bin.max(0.0) as usize).min(bins - 1);
            counts[bin] += 1;
        }
        Self { min, max, counts }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Lower and upper edge of bin `i`
    pub fn bin_range(&self, i: usize) -> (f32, f32) {
        let width = (self.max - self.min) / self.counts.len() as f32;
        (self.min + width * i as f32, self.min + width * (i + 1) as f32)
    }

    /// One line per non-empty bin, bars scaled to `width` characters
    pub fn render_ascii(&self, width: usize) -> String {
        let peak = self.counts.iter().copied().max().unwrap_or(0).max(1);
        let mut out = String::new();
        for (i, count) in self.counts.iter().enumerate() {
            if *count == 0 {
                continue;
            }
            let (lo, hi) = self.bin_range(i);
            let bar = ((*count * width) as f64 / peak as f64).ceil() as usize;
            out.push_str(&format!(
                "[{:>5.2}, {:>5.2}) {:<width$} {}\n",
                lo,
                hi,
                "#".repeat(bar),
                count,
                width = width
            ));
        }
        out
    }
}
