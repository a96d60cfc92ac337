//! Graph and node configuration
//!
//! Configurations are plain data, usually loaded from JSON:
//!
//! ```json
//! {
//!   "buffer_size": 64,
//!   "node": [{
//!     "node": "MatrixSubtractNode",
//!     "input_stream": ["MINUEND:input_matrix"],
//!     "input_side_packet": ["SUBTRAHEND:side_matrix"],
//!     "output_stream": ["output_matrix"]
//!   }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::GraphError;

/// Default capacity of every stream channel
pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Configuration of a single node instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Registry id of the node type
    pub node: String,
    /// Instance name, generated from the type when absent
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub input_stream: Vec<String>,
    #[serde(default)]
    pub input_side_packet: Vec<String>,
    #[serde(default)]
    pub output_stream: Vec<String>,
}

impl NodeConfig {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn input_stream(mut self, entry: impl Into<String>) -> Self {
        self.input_stream.push(entry.into());
        self
    }

    pub fn input_side_packet(mut self, entry: impl Into<String>) -> Self {
        self.input_side_packet.push(entry.into());
        self
    }

    pub fn output_stream(mut self, entry: impl Into<String>) -> Self {
        self.output_stream.push(entry.into());
        self
    }
}

/// Configuration of a whole graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default)]
    pub node: Vec<NodeConfig>,
    /// Channel capacity, [`DEFAULT_BUFFER_SIZE`] when absent
    #[serde(default)]
    pub buffer_size: Option<usize>,
    /// Blocked-operation report threshold, 5000 ms when absent
    #[serde(default)]
    pub watchdog_threshold_ms: Option<u64>,
}

impl GraphConfig {
    pub fn from_json(text: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }

    pub fn watchdog_threshold(&self) -> Duration {
        self.watchdog_threshold_ms
            .map(Duration::from_millis)
            .unwrap_or(super::watchdog::DEFAULT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_graph_config() {
        let config = GraphConfig::from_json(
            r#"{
                "buffer_size": 8,
                "node": [{
                    "node": "MatrixSubtractNode",
                    "name": "subtract",
                    "input_stream": ["SUBTRAHEND:input_matrix"],
                    "input_side_packet": ["MINUEND:side_matrix"],
                    "output_stream": ["output_matrix"]
                }]
            }"#,
        )
        .unwrap();

        let expected = NodeConfig::new("MatrixSubtractNode")
            .with_name("subtract")
            .input_stream("SUBTRAHEND:input_matrix")
            .input_side_packet("MINUEND:side_matrix")
            .output_stream("output_matrix");
        assert_eq!(config.node, vec![expected]);
        assert_eq!(config.buffer_size(), 8);
        assert_eq!(config.watchdog_threshold(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_lists_default_to_empty() {
        let config = GraphConfig::from_json(r#"{"node": [{"node": "Anything"}]}"#).unwrap();
        assert!(config.node[0].input_stream.is_empty());
        assert_eq!(config.node[0].name, None);
        assert_eq!(config.buffer_size(), DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        assert!(matches!(
            GraphConfig::from_json("{ not json"),
            Err(GraphError::Config(_))
        ));
    }
}
