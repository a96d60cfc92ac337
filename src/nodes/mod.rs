//! Built-in processing nodes
//!
//! - **MatrixSubtractNode**: Streamed matrix minus side matrix, or the reverse
//! - **PacketSource / PacketCollector**: Feed packets into a graph and collect
//!   them back out
//!
//! Configured nodes become available to [`crate::Pipeline::add_node`] once
//! they are registered:
//!
//! ```
//! use matgraph::NodeRegistry;
//! use matgraph::nodes::register_builtin_nodes;
//!
//! let mut registry = NodeRegistry::new();
//! register_builtin_nodes(&mut registry)?;
//! assert!(registry.contains("MatrixSubtractNode"));
//! # Ok::<(), matgraph::GraphError>(())
//! ```

pub mod matrix_subtract;
mod stream_io;

pub use matrix_subtract::{MatrixSubtractNode, Role};
pub use stream_io::{PacketCollector, PacketSource};

use crate::GraphError;
use crate::runtime::node::ProcessNode;
use crate::runtime::registry::NodeRegistry;

/// Register every configurable node type of this crate
pub fn register_builtin_nodes(registry: &mut NodeRegistry) -> Result<(), GraphError> {
    registry.register(matrix_subtract::NODE_TYPE, |config| {
        Ok(Box::new(MatrixSubtractNode::from_config(config)?) as Box<dyn ProcessNode>)
    })
}

/// A registry holding the built-in node types
pub fn builtin_registry() -> Result<NodeRegistry, GraphError> {
    let mut registry = NodeRegistry::new();
    register_builtin_nodes(&mut registry)?;
    Ok(registry)
}
