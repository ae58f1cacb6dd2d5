use dyprove_core::prover::Budget;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error)
}

/// Search limits as written in a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub max_steps: u64,
    /// Zero disables the timeout.
    pub timeout_secs: u64,
    pub max_nodes: usize
}

impl Default for BudgetConfig {
    fn default() -> Self {
        let budget = Budget::default();
        BudgetConfig {
            max_steps: budget.max_steps,
            timeout_secs: budget.timeout.map_or(0, |t| t.as_secs()),
            max_nodes: budget.max_nodes
        }
    }
}

impl BudgetConfig {
    pub fn budget(&self) -> Budget {
        Budget {
            max_steps: self.max_steps,
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            max_nodes: self.max_nodes
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Flags that activate `when`-guarded rules, restrictions and lemmas.
    pub flags: BTreeSet<String>,
    pub budget: BudgetConfig,
    /// Size of the search thread pool. Zero uses one thread per core.
    pub threads: usize
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}
