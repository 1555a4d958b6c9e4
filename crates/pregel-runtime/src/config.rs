//! Run configuration.

use pregel_core::NodeId;
use serde::{Deserialize, Serialize};

use crate::error::PregelError;
use crate::message::CombinerKind;

/// Upper bound on worker threads for a single run.
pub const MAX_CONCURRENCY: usize = 1024;

pub const DEFAULT_MAX_ITERATIONS: u32 = 20;

/// Nodes processed between two progress reports of a worker.
pub const DEFAULT_PROGRESS_BATCH_SIZE: u64 = 4096;

/// Which nodes are active in superstep 0.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialActive {
    #[default]
    All,
    Nodes(Vec<NodeId>),
}

/// Configuration for a Pregel run.
///
/// Missing fields take their defaults when deserialized, so a partial JSON
/// object such as `{"max_iterations": 5}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PregelConfig {
    /// Worker threads. Results do not depend on this value.
    pub concurrency: usize,
    /// Hard cap on supersteps.
    pub max_iterations: u32,
    /// Built-in reduction applied to messages bound for the same node.
    pub combiner: CombinerKind,
    pub initial_active: InitialActive,
    pub progress_batch_size: u64,
}

impl Default for PregelConfig {
    fn default() -> Self {
        PregelConfig {
            concurrency: num_cpus::get().clamp(1, MAX_CONCURRENCY),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            combiner: CombinerKind::None,
            initial_active: InitialActive::All,
            progress_batch_size: DEFAULT_PROGRESS_BATCH_SIZE,
        }
    }
}

impl PregelConfig {
    /// Checks the graph-independent constraints.
    pub fn validate(&self) -> Result<(), PregelError> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(PregelError::configuration(format!(
                "concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                self.concurrency
            )));
        }
        if self.max_iterations == 0 {
            return Err(PregelError::configuration(
                "max_iterations must be at least 1",
            ));
        }
        if self.progress_batch_size == 0 {
            return Err(PregelError::configuration(
                "progress_batch_size must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PregelConfig::default();
        assert!(config.concurrency >= 1);
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(config.initial_active, InitialActive::All);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_values() {
        let bad = [
            PregelConfig {
                concurrency: 0,
                ..Default::default()
            },
            PregelConfig {
                concurrency: MAX_CONCURRENCY + 1,
                ..Default::default()
            },
            PregelConfig {
                max_iterations: 0,
                ..Default::default()
            },
            PregelConfig {
                progress_batch_size: 0,
                ..Default::default()
            },
        ];
        for config in bad {
            let err = config.validate().unwrap_err();
            assert!(matches!(err, PregelError::Configuration { .. }), "{err}");
        }
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PregelConfig = serde_json::from_str(
            r#"{"max_iterations": 5, "combiner": "min", "initial_active": {"nodes": [0, 3]}}"#,
        )
        .unwrap();
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.combiner, CombinerKind::Min);
        assert_eq!(
            config.initial_active,
            InitialActive::Nodes(vec![NodeId(0), NodeId(3)])
        );
        assert_eq!(config.progress_batch_size, DEFAULT_PROGRESS_BATCH_SIZE);

        let all: PregelConfig = serde_json::from_str(r#"{"initial_active": "all"}"#).unwrap();
        assert_eq!(all.initial_active, InitialActive::All);
    }
}
