use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{Reader, ReaderBuilder, StringRecord, Trim};
use petgraph::algo::connected_components;
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// One row of the edge list: `source,target,weight`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
    pub weight: f64,
}

impl EdgeRecord {
    pub fn new(source: impl Into<String>, target: impl Into<String>, weight: f64) -> Self {
        EdgeRecord {
            source: source.into(),
            target: target.into(),
            weight,
        }
    }

    /// Raw weights are distances; the detector wants similarities.
    pub fn effective_weight(&self) -> f64 {
        1.0 - self.weight
    }
}

/// How the edge list is turned into an [`EdgeGraph`].
///
/// Both strategies build the same graph: same vertex order, same edge order,
/// same weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LoadStrategy {
    /// Insert each row into the graph as soon as it is read.
    #[default]
    Streaming,
    /// Read the whole edge table first, parse it in parallel, then convert.
    Staged,
}

/// Undirected weighted multigraph keyed by vertex identifier.
///
/// Vertices keep first-appearance order (source before target, row by row).
/// Rows between the same pair become parallel edges; nothing is merged.
#[derive(Debug, Clone, Default)]
pub struct EdgeGraph {
    graph: UnGraph<String, f64>,
    node_indices: HashMap<String, NodeIndex>,
}

impl EdgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw records, applying the `1 - weight` transform.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = EdgeRecord>,
    {
        let mut graph = EdgeGraph::new();
        for record in records {
            let weight = record.effective_weight();
            graph.add_edge(&record.source, &record.target, weight);
        }
        graph
    }

    pub fn add_vertex(&mut self, id: &str) -> NodeIndex {
        if let Some(&index) = self.node_indices.get(id) {
            return index;
        }
        let index = self.graph.add_node(id.to_string());
        self.node_indices.insert(id.to_string(), index);
        index
    }

    /// Adds an edge carrying `weight` as given (no transform).
    pub fn add_edge(&mut self, source: &str, target: &str, weight: f64) -> EdgeIndex {
        let u = self.add_vertex(source);
        let v = self.add_vertex(target);
        self.graph.add_edge(u, v, weight)
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// An empty graph is not connected.
    pub fn is_connected(&self) -> bool {
        self.vertex_count() > 0 && connected_components(&self.graph) == 1
    }

    /// Effective edge weights in edge-index order.
    pub fn weights(&self) -> Vec<f64> {
        self.graph.raw_edges().iter().map(|edge| edge.weight).collect()
    }

    /// Edge endpoints as vertex indices, in edge-index order.
    pub fn endpoints(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.graph
            .raw_edges()
            .iter()
            .map(|edge| (edge.source().index(), edge.target().index()))
    }

    pub fn label(&self, vertex: usize) -> Option<&str> {
        self.graph
            .node_weight(NodeIndex::new(vertex))
            .map(String::as_str)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.node_indices.get(id).map(|index| index.index())
    }

    pub fn as_petgraph(&self) -> &UnGraph<String, f64> {
        &self.graph
    }
}

/// Load an edge list from a CSV with `source`, `target` and `weight` columns.
pub fn load_graph(path: impl AsRef<Path>, strategy: LoadStrategy) -> Result<EdgeGraph> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(file);

    let graph = match strategy {
        LoadStrategy::Streaming => load_streaming(&mut reader, path)?,
        LoadStrategy::Staged => load_staged(&mut reader, path)?,
    };

    info!(
        path = %path.display(),
        vertices = graph.vertex_count(),
        edges = graph.edge_count(),
        "loaded edge list"
    );
    Ok(graph)
}

fn load_streaming<R: Read>(reader: &mut Reader<R>, path: &Path) -> Result<EdgeGraph> {
    debug!("streaming rows into graph");
    let mut graph = EdgeGraph::new();
    for (row, result) in reader.deserialize::<EdgeRecord>().enumerate() {
        // header is line 1
        let record = result.map_err(|err| row_error(path, row as u64 + 2, err))?;
        graph.add_edge(&record.source, &record.target, record.effective_weight());
    }
    Ok(graph)
}

fn load_staged<R: Read>(reader: &mut Reader<R>, path: &Path) -> Result<EdgeGraph> {
    let headers = reader
        .headers()
        .map_err(|err| row_error(path, 1, err))?
        .clone();

    let mut rows: Vec<StringRecord> = Vec::new();
    for (row, result) in reader.records().enumerate() {
        rows.push(result.map_err(|err| row_error(path, row as u64 + 2, err))?);
    }
    debug!(rows = rows.len(), "staged edge table");

    let table: Vec<EdgeRecord> = rows
        .par_iter()
        .enumerate()
        .map(|(row, record)| {
            record
                .deserialize(Some(&headers))
                .map_err(|err| row_error(path, row as u64 + 2, err))
        })
        .collect::<Result<_>>()?;

    let mut graph = EdgeGraph::new();
    for record in &table {
        graph.add_vertex(&record.source);
        graph.add_vertex(&record.target);
    }
    for record in &table {
        graph.add_edge(&record.source, &record.target, record.effective_weight());
    }
    Ok(graph)
}

fn row_error(path: &Path, fallback_line: u64, err: csv::Error) -> Error {
    if let csv::ErrorKind::Io(io) = err.kind() {
        return Error::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(io.kind(), io.to_string()),
        };
    }
    let line = err.position().map_or(fallback_line, |pos| pos.line());
    Error::Parse { line, source: err }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_weight_transform() {
        let file = csv_file("source,target,weight\na,b,0.2\n");
        let graph = load_graph(file.path(), LoadStrategy::Streaming).unwrap();

        let weights = graph.weights();
        assert_eq!(weights.len(), 1);
        assert!((weights[0] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_parallel_edges_are_kept() {
        let file = csv_file("source,target,weight\na,b,0.1\nb,a,0.3\na,b,0.5\n");
        let graph = load_graph(file.path(), LoadStrategy::Streaming).unwrap();

        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.edge_count(), 3);
        assert!(graph.is_connected());
    }

    #[test]
    fn test_vertex_order_is_first_appearance() {
        let file = csv_file("source,target,weight\nc,a,0.1\na,b,0.1\nd,c,0.1\n");
        let graph = load_graph(file.path(), LoadStrategy::Streaming).unwrap();

        let labels: Vec<&str> = (0..graph.vertex_count())
            .map(|v| graph.label(v).unwrap())
            .collect();
        assert_eq!(labels, vec!["c", "a", "b", "d"]);
        assert_eq!(graph.index_of("d"), Some(3));
    }

    #[test]
    fn test_extra_columns_ignored() {
        let file = csv_file("id,source,target,weight,note\n7,x,y,0.25,hello\n");
        let graph = load_graph(file.path(), LoadStrategy::Staged).unwrap();

        assert_eq!(graph.edge_count(), 1);
        assert!((graph.weights()[0] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_strategies_agree() {
        let file = csv_file(
            "source,target,weight\n1,2,0.1\n2,3,0.9\n3,1,0.4\n4,5,0.0\n2,1,0.7\n",
        );
        let streamed = load_graph(file.path(), LoadStrategy::Streaming).unwrap();
        let staged = load_graph(file.path(), LoadStrategy::Staged).unwrap();

        assert_eq!(streamed.vertex_count(), staged.vertex_count());
        assert_eq!(streamed.weights(), staged.weights());
        assert_eq!(
            streamed.endpoints().collect::<Vec<_>>(),
            staged.endpoints().collect::<Vec<_>>()
        );
        for v in 0..streamed.vertex_count() {
            assert_eq!(streamed.label(v), staged.label(v));
        }
        assert!(!streamed.is_connected());
    }

    #[test]
    fn test_padded_fields() {
        let file = csv_file("source, target, weight\na, b, 0.2\nb ,c,0.5 \n");

        for strategy in [LoadStrategy::Streaming, LoadStrategy::Staged] {
            let graph = load_graph(file.path(), strategy).unwrap();
            assert_eq!(graph.vertex_count(), 3);
            assert_eq!(graph.index_of("b"), Some(1));
            assert!((graph.weights()[0] - 0.8).abs() < 1e-12);
            assert!((graph.weights()[1] - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_missing_file() {
        let result = load_graph("/definitely/not/here.csv", LoadStrategy::Streaming);
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[test]
    fn test_non_numeric_weight() {
        let file = csv_file("source,target,weight\na,b,0.5\nb,c,heavy\n");

        for strategy in [LoadStrategy::Streaming, LoadStrategy::Staged] {
            match load_graph(file.path(), strategy) {
                Err(Error::Parse { line, .. }) => assert_eq!(line, 3),
                other => panic!("expected parse error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_graph_not_connected() {
        let graph = EdgeGraph::new();
        assert!(!graph.is_connected());
        assert_eq!(graph.vertex_count(), 0);
    }

    #[test]
    fn test_from_records() {
        let graph = EdgeGraph::from_records(vec![
            EdgeRecord::new("a", "b", 0.2),
            EdgeRecord::new("a", "b", 0.2),
        ]);
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.weights().iter().all(|w| (w - 0.8).abs() < 1e-12));
    }
}
