//! Registry of node types constructible from configuration
//!
//! The registry maps a stable type id (the `node` field of a [`NodeConfig`])
//! to a factory. Nothing is registered implicitly: callers populate a registry
//! explicitly, typically with [`crate::nodes::register_builtin_nodes`], and
//! hand it to the pipeline builder.

use std::collections::BTreeMap;

use super::config::NodeConfig;
use super::errors::NodeError;
use super::node::ProcessNode;
use crate::GraphError;

/// Builds a node from its configuration, running its contract checks
pub type NodeFactory =
    Box<dyn Fn(&NodeConfig) -> Result<Box<dyn ProcessNode>, NodeError> + Send + Sync>;

/// Mapping from node type id to factory
#[derive(Default)]
pub struct NodeRegistry {
    factories: BTreeMap<String, NodeFactory>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `node_type`. Ids must be unique.
    pub fn register<F>(&mut self, node_type: impl Into<String>, factory: F) -> Result<(), GraphError>
    where
        F: Fn(&NodeConfig) -> Result<Box<dyn ProcessNode>, NodeError> + Send + Sync + 'static,
    {
        let node_type = node_type.into();
        if self.factories.contains_key(&node_type) {
            return Err(GraphError::DuplicateNodeType(node_type));
        }
        self.factories.insert(node_type, Box::new(factory));
        Ok(())
    }

    /// Instantiate the node a configuration names
    pub fn create(&self, config: &NodeConfig) -> Result<Box<dyn ProcessNode>, NodeError> {
        let factory = self
            .factories
            .get(&config.node)
            .ok_or_else(|| NodeError::UnknownNodeType(config.node.clone()))?;
        factory(config)
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// Registered type ids, sorted
    pub fn node_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}
