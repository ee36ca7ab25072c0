//! # leiden-sweep
//!
//! Load a weighted edge list, run Leiden community detection across a range
//! of resolution parameters, and report the plateaus: maximal runs of
//! resolutions over which the number of communities stays the same.
//!
//! ```no_run
//! use leiden_sweep::{Detector, Leiden, LoadStrategy, ResolutionGrid, load_graph, sweep};
//!
//! let graph = load_graph("./temp/mst_edges.csv", LoadStrategy::Streaming)?;
//! let resolutions = ResolutionGrid::default().resolutions()?;
//! let detector = Detector::new(&graph, Leiden::new());
//! for interval in sweep(&detector, &resolutions, true)? {
//!     println!("{}", interval?);
//! }
//! # Ok::<(), leiden_sweep::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod graph;
pub mod leiden;
pub mod report;
pub mod sweep;
pub mod synth;

pub use config::Config;
pub use error::{Error, Result};
pub use export::write_dot;
pub use graph::{EdgeGraph, EdgeRecord, LoadStrategy, load_graph};
pub use leiden::{Detector, Leiden, Objective, Partition};
pub use report::write_report;
pub use sweep::{
    Partitioner, ResolutionGrid, ResolutionInterval, Sweep, sweep, sweep_and_report,
};
pub use synth::{SynthConfig, synthesize, write_edges};
