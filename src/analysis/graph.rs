//! Similarity graph: points joined when their cosine similarity reaches a
//! threshold, grouped into connected components and laid out with a seeded
//! force-directed simulation.

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

/// Build the graph; node weights are point indices, edge weights similarities
pub fn similarity_graph(matrix: &[Vec<f32>], threshold: f32) -> UnGraph<usize, f32> {
    let n = matrix.len();
    let mut graph = UnGraph::with_capacity(n, 0);
    let nodes: Vec<NodeIndex> = (0..n).map(|i| graph.add_node(i)).collect();

    for i in 0..n {
        for j in (i + 1)..n {
            if matrix[i][j] >= threshold {
                graph.add_edge(nodes[i], nodes[j], matrix[i][j]);
            }
        }
    }
    graph
}

/// Connected components as sorted point indices, largest first
pub fn components(graph: &UnGraph<usize, f32>) -> Vec<Vec<usize>> {
    let mut sets = UnionFind::new(graph.node_count());
    for edge in graph.edge_references() {
        sets.union(edge.source().index(), edge.target().index());
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for node in graph.node_indices() {
        groups
            .entry(sets.find(node.index()))
            .or_default()
            .push(graph[node]);
    }

    let mut components: Vec<Vec<usize>> = groups
        .into_values()
        .map(|mut members| {
            members.sort_unstable();
            members
        })
        .collect();
    components.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));
    components
}

/// Fruchterman-Reingold layout in the unit square
pub fn force_layout(graph: &UnGraph<usize, f32>, iterations: usize, seed: u64) -> Vec<[f64; 2]> {
    let n = graph.node_count();
    if n == 0 {
        return Vec::new();
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut positions: Vec<[f64; 2]> = (0..n)
        .map(|_| [rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)])
        .collect();
    if n == 1 {
        return positions;
    }

    let k = (1.0 / n as f64).sqrt();
    let initial_temperature = 0.1;

    for iteration in 0..iterations {
        let temperature = initial_temperature * (1.0 - iteration as f64 / iterations as f64);
        let mut displacement = vec![[0.0f64; 2]; n];

        // Every pair repels
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = positions[i][0] - positions[j][0];
                let dy = positions[i][1] - positions[j][1];
                let dist = (dx * dx + dy * dy).sqrt().max(1e-6);
                let force = k * k / dist;
                let (fx, fy) = (dx / dist * force, dy / dist * force);
                displacement[i][0] += fx;
                displacement[i][1] += fy;
                displacement[j][0] -= fx;
                displacement[j][1] -= fy;
            }
        }

        // Edges attract, stronger for more similar pairs
        for edge in graph.edge_references() {
            let (i, j) = (edge.source().index(), edge.target().index());
            let dx = positions[i][0] - positions[j][0];
            let dy = positions[i][1] - positions[j][1];
            let dist = (dx * dx + dy * dy).sqrt().max(1e-6);
            let force = dist * dist / k * f64::from(edge.weight().max(0.0));
            let (fx, fy) = (dx / dist * force, dy / dist * force);
            displacement[i][0] -= fx;
            displacement[i][1] -= fy;
            displacement[j][0] += fx;
            displacement[j][1] += fy;
        }

        for (position, disp) in positions.iter_mut().zip(&displacement) {
            let length = (disp[0] * disp[0] + disp[1] * disp[1]).sqrt().max(1e-9);
            let step = length.min(temperature);
            position[0] += disp[0] / length * step;
            position[1] += disp[1] / length * step;
        }
    }

    positions
}
