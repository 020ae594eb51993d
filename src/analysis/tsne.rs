//! Exact t-SNE projection to two dimensions
//!
//! O(n²) per iteration, which is fine for the few hundred distinct stress
//! reasons a run produces. Randomness comes only from a seeded `StdRng`, so
//! the same input and seed always give the same layout.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// t-SNE parameters
#[derive(Debug, Clone, Serialize)]
pub struct TsneOptions {
    /// Target perplexity; clamped to what the sample size allows
    pub perplexity: f64,
    pub iterations: usize,
    /// Step size; `None` scales it with the sample size
    pub learning_rate: Option<f64>,
    pub early_exaggeration: f64,
    /// Iterations run with early exaggeration
    pub exaggeration_iterations: usize,
    pub seed: u64,
}

impl Default for TsneOptions {
    fn default() -> Self {
        Self {
            perplexity: 30.0,
            iterations: 500,
            learning_rate: None,
            early_exaggeration: 12.0,
            exaggeration_iterations: 100,
            seed: 42,
        }
    }
}

/// Largest usable perplexity for `n` points
pub fn effective_perplexity(requested: f64, n: usize) -> f64 {
    let limit = (n.saturating_sub(1)) as f64 / 3.0;
    requested.min(limit).max(1.0)
}

fn squared_distances(vectors: &[Vec<f32>]) -> Vec<Vec<f64>> {
    let n = vectors.len();
    let mut d = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let dist: f64 = vectors[i]
                .iter()
                .zip(&vectors[j])
                .map(|(a, b)| {
                    let diff = f64::from(*a) - f64::from(*b);
                    diff * diff
                })
                .sum();
            d[i][j] = dist;
            d[j][i] = dist;
        }
    }
    d
}

/// Conditional probabilities of row `i` for precision `beta`, and their entropy
fn row_probabilities(distances: &[f64], i: usize, beta: f64, row: &mut [f64]) -> f64 {
    let mut sum = 0.0;
    for (j, d) in distances.iter().enumerate() {
        row[j] = if j == i { 0.0 } else { (-d * beta).exp() };
        sum += row[j];
    }
    if sum <= f64::MIN_POSITIVE {
        // Every neighbour is infinitely far at this precision
        let uniform = 1.0 / (distances.len() - 1) as f64;
        for (j, p) in row.iter_mut().enumerate() {
            *p = if j == i { 0.0 } else { uniform };
        }
        return ((distances.len() - 1) as f64).ln();
    }
    let mut entropy = 0.0;
    for (j, p) in row.iter_mut().enumerate() {
        *p /= sum;
        if j != i && *p > 0.0 {
            entropy -= *p * p.ln();
        }
    }
    entropy
}

/// Symmetric joint probabilities with every row matched to the perplexity
fn joint_probabilities(distances: &[Vec<f64>], perplexity: f64) -> Vec<Vec<f64>> {
    let n = distances.len();
    let target = perplexity.ln();
    let mut conditional = vec![vec![0.0; n]; n];

    for i in 0..n {
        let (mut beta, mut lo, mut hi) = (1.0f64, 0.0f64, f64::INFINITY);
        for _ in 0..64 {
            let entropy = row_probabilities(&distances[i], i, beta, &mut conditional[i]);
            let diff = entropy - target;
            if diff.abs() < 1e-5 {
                break;
            }
            if diff > 0.0 {
                lo = beta;
                beta = if hi.is_infinite() { beta * 2.0 } else { (beta + hi) / 2.0 };
            } else {
                hi = beta;
                beta = (beta + lo) / 2.0;
            }
        }
    }

    let mut joint = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                joint[i][j] = ((conditional[i][j] + conditional[j][i]) / (2.0 * n as f64)).max(1e-12);
            }
        }
    }
    joint
}

/// Project `vectors` to 2-D
pub fn tsne(vectors: &[Vec<f32>], options: &TsneOptions) -> Vec<[f64; 2]> {
    let n = vectors.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![[0.0, 0.0]];
    }

    let perplexity = effective_perplexity(options.perplexity, n);
    let p = joint_probabilities(&squared_distances(vectors), perplexity);

    let learning_rate = options
        .learning_rate
        .unwrap_or_else(|| (n as f64 / options.early_exaggeration / 4.0).max(50.0));

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut y: Vec<[f64; 2]> = (0..n)
        .map(|_| [rng.gen_range(-1e-2..1e-2), rng.gen_range(-1e-2..1e-2)])
        .collect();
    let mut velocity = vec![[0.0f64; 2]; n];
    let mut gains = vec![[1.0f64; 2]; n];
    let mut num = vec![vec![0.0f64; n]; n];

    for iteration in 0..options.iterations {
        let exaggeration = if iteration < options.exaggeration_iterations {
            options.early_exaggeration
        } else {
            1.0
        };
        let momentum = if iteration < 250 { 0.5 } else { 0.8 };

        // Student-t affinities in the embedding
        let mut z = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = y[i][0] - y[j][0];
                let dy = y[i][1] - y[j][1];
                let q = 1.0 / (1.0 + dx * dx + dy * dy);
                num[i][j] = q;
                num[j][i] = q;
                z += 2.0 * q;
            }
        }
        let z = z.max(f64::MIN_POSITIVE);

        for i in 0..n {
            let mut grad = [0.0f64; 2];
            for j in 0..n {
                if i == j {
                    continue;
                }
                let strength = (exaggeration * p[i][j] - num[i][j] / z) * num[i][j];
                grad[0] += 4.0 * strength * (y[i][0] - y[j][0]);
                grad[1] += 4.0 * strength * (y[i][1] - y[j][1]);
            }

            for d in 0..2 {
                gains[i][d] = if (grad[d] > 0.0) != (velocity[i][d] > 0.0) {
                    gains[i][d] + 0.2
                } else {
                    (gains[i][d] * 0.8).max(0.01)
                };
                velocity[i][d] =
                    momentum * velocity[i][d] - learning_rate * gains[i][d] * grad[d];
            }
        }

        for (point, v) in y.iter_mut().zip(&velocity) {
            point[0] += v[0];
            point[1] += v[1];
        }

        let mean = y.iter().fold([0.0, 0.0], |acc, p| [acc[0] + p[0], acc[1] + p[1]]);
        let mean = [mean[0] / n as f64, mean[1] / n as f64];
        for point in y.iter_mut() {
            point[0] -= mean[0];
            point[1] -= mean[1];
        }
    }

    y
}
