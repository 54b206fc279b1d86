//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a single orchestrated run.
///
/// Immutable once the driver is constructed; what used to be mutable
/// command-line globals in batch-client style tools lives here instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum number of streams that may be registered. `None` means
    /// unbounded (the default).
    #[serde(default)]
    pub max_streams: Option<usize>,

    /// Log the assembled batch size every tick at debug level.
    #[serde(default = "default_trace_batches")]
    pub trace_batches: bool,
}

fn default_trace_batches() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_streams: None,
            trace_batches: default_trace_batches(),
        }
    }
}

impl OrchestratorConfig {
    /// Config with a hard cap on registered streams.
    pub fn with_max_streams(max_streams: usize) -> Self {
        Self {
            max_streams: Some(max_streams),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unbounded() {
        let config = OrchestratorConfig::default();
        assert!(config.max_streams.is_none());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: OrchestratorConfig = serde_json::from_str("{}").unwrap();
        assert!(config.max_streams.is_none());
        assert!(config.trace_batches);
    }
}
