use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A row could not be read or its fields could not be parsed.
    #[error("malformed edge row at line {line}: {source}")]
    Parse {
        line: u64,
        #[source]
        source: csv::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("cannot write report: {0}")]
    Report(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("graph has no vertices")]
    EmptyGraph,

    #[error("invalid resolution {0}: must be finite and non-negative")]
    InvalidResolution(f64),

    #[error("weight vector has {found} entries but the graph has {expected} edges")]
    WeightCountMismatch { expected: usize, found: usize },

    #[error("invalid weight {weight} on edge {edge}: must be finite and non-negative")]
    InvalidWeight { edge: usize, weight: f64 },

    #[error("resolution sequence is empty")]
    EmptySweep,

    #[error("resolutions must be finite and strictly increasing (offending index {index})")]
    UnorderedResolutions { index: usize },

    #[error("invalid resolution grid: {0}")]
    InvalidGrid(&'static str),
}
