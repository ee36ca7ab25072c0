//! The console report printed by the `sweep` command.

use std::io::Write;

use crate::error::Result;
use crate::leiden::Detector;
use crate::sweep::sweep;

/// Write the graph diagnostics, the mode header, then each interval as soon
/// as it closes.
///
/// On a failed partition the lines already written stay written and the
/// error is returned.
pub fn write_report<W: Write>(
    detector: &Detector<'_>,
    resolutions: &[f64],
    use_weights: bool,
    out: &mut W,
) -> Result<()> {
    let graph = detector.graph();
    writeln!(out, "Is the graph connected? {}", graph.is_connected())?;
    writeln!(
        out,
        "Number of nodes: {}, Number of edges: {}",
        graph.vertex_count(),
        graph.edge_count()
    )?;

    if use_weights {
        writeln!(out, "Testing with transformed weights:")?;
    } else {
        writeln!(out, "Testing with unweighted edges:")?;
    }
    for interval in sweep(detector, resolutions, use_weights)? {
        writeln!(out, "{}", interval?)?;
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::graph::EdgeGraph;
    use crate::leiden::Leiden;

    fn render(graph: &EdgeGraph, resolutions: &[f64], use_weights: bool) -> (Result<()>, String) {
        let detector = Detector::new(graph, Leiden::new());
        let mut out = Vec::new();
        let result = write_report(&detector, resolutions, use_weights, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_single_edge_report() {
        let mut graph = EdgeGraph::new();
        graph.add_edge("a", "b", 1.0);

        let (result, text) = render(&graph, &[0.5, 1.0], true);
        result.unwrap();
        assert_eq!(
            text,
            "Is the graph connected? true\n\
             Number of nodes: 2, Number of edges: 1\n\
             Testing with transformed weights:\n\
             Resolution interval: [0.5, 1], Communities: 1\n"
        );
    }

    #[test]
    fn test_bad_resolutions_write_only_the_header() {
        let mut graph = EdgeGraph::new();
        graph.add_edge("a", "b", 1.0);
        graph.add_vertex("c");

        let (result, text) = render(&graph, &[], false);
        assert!(matches!(result, Err(Error::EmptySweep)));
        assert_eq!(
            text,
            "Is the graph connected? false\n\
             Number of nodes: 3, Number of edges: 1\n\
             Testing with unweighted edges:\n"
        );
    }
}
