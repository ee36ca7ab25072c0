use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::LoadStrategy;
use crate::leiden::{Leiden, Objective};
use crate::sweep::{ResolutionGrid, validate_resolutions};

/// Run configuration. Every field has a default, so a config file only needs
/// the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub edge_file: PathBuf,
    pub strategy: LoadStrategy,
    pub use_weights: bool,
    pub objective: Objective,
    pub seed: u64,
    pub iterations: usize,
    pub randomness: f64,
    /// Explicit resolutions; takes precedence over `grid`.
    pub resolutions: Option<Vec<f64>>,
    pub grid: ResolutionGrid,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            edge_file: PathBuf::from("./temp/mst_edges.csv"),
            strategy: LoadStrategy::default(),
            use_weights: true,
            objective: Objective::default(),
            seed: 42,
            iterations: 2,
            randomness: 0.01,
            resolutions: None,
            grid: ResolutionGrid::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// The resolution sequence to sweep.
    pub fn resolutions(&self) -> Result<Vec<f64>> {
        match &self.resolutions {
            Some(list) => {
                validate_resolutions(list)?;
                Ok(list.clone())
            }
            None => self.grid.resolutions(),
        }
    }

    pub fn leiden(&self) -> Leiden {
        Leiden::new()
            .with_objective(self.objective)
            .with_seed(self.seed)
            .with_iterations(self.iterations)
            .with_randomness(self.randomness)
    }
}
