use std::path::Path;

use petgraph::dot::{Config, Dot};
use petgraph::graph::{EdgeReference, NodeIndex};

use crate::error::{Error, Result};
use crate::graph::EdgeGraph;
use crate::leiden::Partition;

/// Render the graph as Graphviz DOT, one fill colour per community.
pub fn to_dot(graph: &EdgeGraph, partition: &Partition) -> String {
    let edge_attrs = |_, edge: EdgeReference<'_, f64>| {
        format!("label=\"{:.3}\"", edge.weight())
    };
    let node_attrs = |_, (index, label): (NodeIndex, &String)| {
        let community = partition.community_of(index.index()).unwrap_or(0);
        let hue = ((community * 60) % 360) as f32 / 360.0;
        format!(
            "label=\"{}\", style=filled, fillcolor=\"{:.3} 0.5 0.7\"",
            label, hue
        )
    };
    let dot = Dot::with_attr_getters(
        graph.as_petgraph(),
        &[Config::NodeNoLabel, Config::EdgeNoLabel],
        &edge_attrs,
        &node_attrs,
    );
    format!("{}", dot)
}

pub fn write_dot(graph: &EdgeGraph, partition: &Partition, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, to_dot(graph, partition)).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_colours_by_community() {
        let mut graph = EdgeGraph::new();
        graph.add_edge("a", "b", 0.5);
        graph.add_edge("c", "d", 0.25);
        let partition = Partition::from_membership(vec![0, 0, 1, 1]);

        let dot = to_dot(&graph, &partition);
        assert!(dot.starts_with("graph {"));
        assert!(dot.contains("label=\"a\", style=filled, fillcolor=\"0.000 0.5 0.7\""));
        assert!(dot.contains("label=\"d\", style=filled, fillcolor=\"0.167 0.5 0.7\""));
        assert!(dot.contains("label=\"0.250\""));
    }

    #[test]
    fn test_write_dot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.dot");
        let mut graph = EdgeGraph::new();
        graph.add_edge("x", "y", 1.0);
        let partition = Partition::from_membership(vec![0, 0]);

        write_dot(&graph, &partition, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("--"));
    }
}
