//! Synthetic edge lists shaped like the real input: a spanning tree over
//! documents, weighted by the cosine similarity of their topic mixtures.

use std::path::Path;

use csv::Writer;
use petgraph::unionfind::UnionFind;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::info;

use crate::error::{Error, Result};
use crate::graph::EdgeRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthConfig {
    pub documents: usize,
    pub topics: usize,
    pub seed: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        SynthConfig {
            documents: 200,
            topics: 60,
            seed: 42,
        }
    }
}

/// One topic mixture per document, each summing to 1.
///
/// Every document draws from its own seeded generator, so the output does not
/// depend on how rayon splits the work.
pub fn topic_mixtures(config: &SynthConfig) -> Vec<Vec<f64>> {
    (0..config.documents)
        .into_par_iter()
        .map(|doc| {
            let mut rng = StdRng::seed_from_u64(document_seed(config.seed, doc));
            let raw: Vec<f64> = (0..config.topics)
                .map(|_| rng.gen_range(0.0..1.0))
                .collect();
            let total: f64 = raw.iter().sum();
            if total > 0.0 {
                raw.iter().map(|x| x / total).collect()
            } else {
                raw
            }
        })
        .collect()
}

fn document_seed(seed: u64, doc: usize) -> u64 {
    seed ^ (doc as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Build the similarity graph and keep a spanning tree of it.
///
/// Edges are taken in ascending similarity order (Kruskal); pairs with zero
/// similarity are never linked, so the result is a forest when some document
/// shares no topic with the rest.
pub fn synthesize(config: &SynthConfig) -> Vec<EdgeRecord> {
    let mixtures = topic_mixtures(config);
    let n = mixtures.len();

    let mixtures_ref = &mixtures;
    let mut pairs: Vec<(usize, usize, f64)> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            (i + 1..n).filter_map(move |j| {
                let similarity = cosine_similarity(&mixtures_ref[i], &mixtures_ref[j]);
                (similarity > 0.0).then_some((i, j, similarity))
            })
        })
        .collect();
    pairs.sort_by(|a, b| a.2.total_cmp(&b.2));

    let mut sets = UnionFind::<usize>::new(n);
    let mut tree = Vec::with_capacity(n.saturating_sub(1));
    for (i, j, similarity) in pairs {
        if sets.union(i, j) {
            tree.push(EdgeRecord::new(i.to_string(), j.to_string(), similarity));
            if tree.len() + 1 == n {
                break;
            }
        }
    }

    let total: f64 = tree.iter().map(|edge| edge.weight).sum();
    info!(
        documents = n,
        edges = tree.len(),
        total_weight = total,
        "spanning tree synthesized"
    );
    tree
}

/// Write `source,target,weight` rows with a header.
pub fn write_edges(path: impl AsRef<Path>, edges: &[EdgeRecord]) -> Result<()> {
    let path = path.as_ref();
    let write_error = |source| Error::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = Writer::from_path(path).map_err(write_error)?;
    for edge in edges {
        writer.serialize(edge).map_err(write_error)?;
    }
    writer.flush().map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}
