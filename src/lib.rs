//! Streaming matrix graph with a thread-per-node runtime
//!
//! This library runs graphs of processing nodes connected by timestamped
//! packet streams. Every node runs on its own thread and exchanges packets
//! over bounded crossbeam channels. Configuration-level constants are bound to
//! nodes as immutable side packets.
//!
//! # Architecture
//!
//! - **MatrixSubtractNode**: Subtracts a streamed matrix and a side matrix, with
//!   the operand order chosen by the tags in the node configuration
//! - **Contracts**: Nodes declare tagged, typed ports before the graph is wired
//! - **Pipeline**: Wires streams by name, binds side packets and opens nodes
//! - **Scheduler**: Manages node lifecycle and parallel execution
//!
//! # Example
//!
//! ```no_run
//! use matgraph::nodes::{PacketCollector, PacketSource, register_builtin_nodes};
//! use matgraph::{GraphConfig, Matrix, NodeRegistry, Packet, Pipeline, Timestamp};
//!
//! let config = GraphConfig::from_json(r#"{
//!     "node": [{
//!         "node": "MatrixSubtractNode",
//!         "input_stream": ["MINUEND:input_matrix"],
//!         "input_side_packet": ["SUBTRAHEND:side_matrix"],
//!         "output_stream": ["output_matrix"]
//!     }]
//! }"#)?;
//! let mut registry = NodeRegistry::new();
//! register_builtin_nodes(&mut registry)?;
//!
//! let mut pipeline = Pipeline::from_config(&config, &registry)?;
//! pipeline.add_side_packet("side_matrix", Matrix::from_element(2, 2, 1.0))?;
//! let input = vec![Packet::new(Matrix::from_element(2, 2, 3.0), Timestamp::new(0))];
//! pipeline.add_process("source", PacketSource::new("input_matrix", input))?;
//! let (collector, results) = PacketCollector::<Matrix>::new("output_matrix");
//! pipeline.add_process("sink", collector)?;
//!
//! pipeline.build()?.wait()?;
//! for packet in results.try_iter() {
//!     println!("{}: {}", packet.timestamp, packet.get());
//! }
//! # Ok::<(), matgraph::GraphError>(())
//! ```

use thiserror::Error;

pub mod matrix;
pub mod nodes;
pub mod runtime;

pub use matrix::{Matrix, Shape};

pub use nodes::{MatrixSubtractNode, PacketCollector, PacketSource, register_builtin_nodes};

// Re-export streaming runtime components
pub use runtime::{
    ConnectionError, GraphConfig, InputPort, NodeConfig, NodeContract, NodeError, NodeRegistry,
    OpenContext, OutputPort, Packet, Pipeline, PortDirection, PortError, PortSchema, ProcessNode,
    Scheduler, TagMap, Timestamp, TimestampDiff, WorkError, WorkResult, register_type,
};

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error("Node type '{0}' is already registered")]
    DuplicateNodeType(String),

    #[error("Node '{node}' failed: {source}")]
    NodeFailed { node: String, source: WorkError },
}

pub type Result<T> = std::result::Result<T, GraphError>;
