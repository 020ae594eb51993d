//! # Embedding Space Analysis
//!
//! Read-only exploration of a materialized embedding table.
//!
//! ## Key Components
//!
//! - `similarity`: cosine similarity matrix and a fixed-bin histogram of pairwise similarities
//! - `tsne`: exact, seeded t-SNE projection to two dimensions
//! - `graph`: similarity graph with connected components and a force-directed layout
//! - `run_analysis`: reads the table, analyzes it and writes a JSON report
//!
//! ## Features
//!
//! - Deterministic output for a given seed
//! - Textual summary with an ASCII histogram
//! - An empty table is reported and skipped, never an error

use crate::error::{Error, Result};
use crate::queries::{ROW_COUNT_COLUMN, embedding_rows_sql};
use crate::warehouse::{Row, TableId, Warehouse};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, instrument};

pub mod graph;
pub mod similarity;
pub mod tsne;

use similarity::Histogram;
use tsne::TsneOptions;

/// Analysis parameters
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOptions {
    pub histogram_bins: usize,
    /// Minimum cosine similarity for a graph edge
    pub similarity_threshold: f32,
    pub layout_iterations: usize,
    pub tsne: TsneOptions,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            histogram_bins: 20,
            similarity_threshold: 0.8,
            layout_iterations: 300,
            tsne: TsneOptions::default(),
        }
    }
}

/// One distinct embedded text
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedPoint {
    /// Id of one of the rows carrying this text
    pub id: Value,
    pub label: String,
    /// Number of rows carrying this text
    pub rows: u64,
    pub vector: Vec<f32>,
}

/// A point placed in the plane
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedPoint {
    pub id: Value,
    pub label: String,
    pub rows: u64,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphReport {
    pub threshold: f32,
    pub edges: usize,
    /// Point indices of each connected component, largest first
    pub components: Vec<Vec<usize>>,
    pub layout: Vec<PlacedPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub table: String,
    /// Rows read, counting every row of a shared text
    pub rows: u64,
    /// Distinct texts
    pub points: usize,
    pub dimensions: usize,
    pub similarity_histogram: Histogram,
    /// Mean pairwise cosine similarity, when there is at least one pair
    pub mean_similarity: Option<f32>,
    pub perplexity: f64,
    pub projection: Vec<PlacedPoint>,
    pub graph: GraphReport,
}

/// Turn embedding rows into one point per distinct text, in first-seen
/// order. Every vector must share one dimensionality.
pub fn points_from_rows(rows: &[Row], id_column: &str, text_column: &str) -> Result<Vec<EmbeddedPoint>> {
    let mut points: Vec<EmbeddedPoint> = Vec::new();
    let mut by_label: HashMap<String, usize> = HashMap::new();
    for (index, row) in rows.iter().enumerate() {
        let vector: Vec<f32> = row
            .get(crate::catalog::EMBEDDING_COLUMN)
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Analysis(format!("row {} has no embedding array", index)))?
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|x| x as f32)
                    .ok_or_else(|| Error::Analysis(format!("row {} has a non-numeric embedding value", index)))
            })
            .collect::<Result<_>>()?;

        if vector.is_empty() {
            return Err(Error::Analysis(format!("row {} has an empty embedding", index)));
        }
        if let Some(first) = points.first().map(|p| p.vector.len()) {
            if vector.len() != first {
                return Err(Error::Analysis(format!(
                    "row {} has {} dimensions, expected {}",
                    index,
                    vector.len(),
                    first
                )));
            }
        }

        let label = row
            .get(text_column)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let count = row
            .get(ROW_COUNT_COLUMN)
            .and_then(Value::as_u64)
            .unwrap_or(1);

        match by_label.get(&label) {
            Some(&existing) => points[existing].rows += count,
            None => {
                by_label.insert(label.clone(), points.len());
                points.push(EmbeddedPoint {
                    id: row.get(id_column).cloned().unwrap_or(Value::Null),
                    label,
                    rows: count,
                    vector,
                });
            }
        }
    }
    Ok(points)
}

fn place(points: &[EmbeddedPoint], coordinates: &[[f64; 2]]) -> Vec<PlacedPoint> {
    points
        .iter()
        .zip(coordinates)
        .map(|(p, [x, y])| PlacedPoint {
            id: p.id.clone(),
            label: p.label.clone(),
            rows: p.rows,
            x: *x,
            y: *y,
        })
        .collect()
}

/// Analyze a non-empty set of points
pub fn analyze(table: &TableId, points: &[EmbeddedPoint], options: &AnalysisOptions) -> AnalysisReport {
    let vectors: Vec<Vec<f32>> = points.iter().map(|p| p.vector.clone()).collect();

    let matrix = similarity::similarity_matrix(&vectors);
    let pairs = similarity::upper_triangle(&matrix);
    let histogram = Histogram::new(&pairs, options.histogram_bins, -1.0, 1.0);
    let mean_similarity =
        (!pairs.is_empty()).then(|| pairs.iter().sum::<f32>() / pairs.len() as f32);

    let projection = tsne::tsne(&vectors, &options.tsne);

    let similarity_graph = graph::similarity_graph(&matrix, options.similarity_threshold);
    let layout = graph::force_layout(&similarity_graph, options.layout_iterations, options.tsne.seed);

    AnalysisReport {
        table: table.to_string(),
        rows: points.iter().map(|p| p.rows).sum(),
        points: points.len(),
        dimensions: vectors.first().map(Vec::len).unwrap_or(0),
        similarity_histogram: histogram,
        mean_similarity,
        perplexity: tsne::effective_perplexity(options.tsne.perplexity, points.len()),
        projection: place(points, &projection),
        graph: GraphReport {
            threshold: options.similarity_threshold,
            edges: similarity_graph.edge_count(),
            components: graph::components(&similarity_graph),
            layout: place(points, &layout),
        },
    }
}

/// Human-readable summary of a report
pub fn render_summary(report: &AnalysisReport) -> String {
    let mut out = format!(
        "Embedding analysis of {}\n  rows: {}\n  points: {}\n  dimensions: {}\n",
        report.table, report.rows, report.points, report.dimensions
    );
    if let Some(mean) = report.mean_similarity {
        out.push_str(&format!("  mean pairwise cosine similarity: {:.3}\n", mean));
    }
    out.push_str(&format!("  t-SNE perplexity: {:.1}\n", report.perplexity));
    out.push_str(&format!(
        "  similarity graph (>= {:.2}): {} edges, {} components, largest has {} points\n",
        report.graph.threshold,
        report.graph.edges,
        report.graph.components.len(),
        report.graph.components.first().map(Vec::len).unwrap_or(0)
    ));
    out.push_str("\nPairwise cosine similarity:\n");
    out.push_str(&report.similarity_histogram.render_ascii(40));
    out
}

/// Analyze an embedding table and write the JSON report to `output`.
/// Returns `None` without writing anything when the table has no rows.
#[instrument(skip(warehouse, options, output), fields(table = %table))]
pub async fn run_analysis(
    warehouse: &dyn Warehouse,
    table: &TableId,
    id_column: &str,
    text_column: &str,
    options: &AnalysisOptions,
    output: &Path,
) -> Result<Option<AnalysisReport>> {
    let result = warehouse
        .run_query(&embedding_rows_sql(table, id_column, text_column))
        .await?;

    if result.is_empty() {
        println!("No embeddings found in {}; nothing to analyze.", table);
        return Ok(None);
    }

    let points = points_from_rows(&result.rows, id_column, text_column)?;
    let report = analyze(table, &points, options);

    tokio::fs::write(output, serde_json::to_vec_pretty(&report)?).await?;
    info!(points = report.points, path = %output.display(), "analysis report written");

    println!("{}", render_summary(&report));
    println!("Report written to {}", output.display());
    Ok(Some(report))
}
