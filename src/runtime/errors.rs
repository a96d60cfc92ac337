//! Error types for the runtime system

use super::packet::Timestamp;
use crate::matrix::Shape;

/// Error type for port operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Port '{0}' is not connected")]
    NotConnected(String),

    #[error("Port '{port}' does not carry {expected}")]
    TypeMismatch { port: String, expected: &'static str },

    #[error("Side packet '{0}' was not provided to this node")]
    SidePacketMissing(String),
}

/// Error type for wiring nodes together at build time
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Type mismatch on stream '{stream}': {from_node} produces {from_type}, {to_node} expects {to_type}")]
    TypeMismatch {
        stream: String,
        from_node: String,
        from_type: &'static str,
        to_node: String,
        to_type: &'static str,
    },

    #[error("Node with name '{0}' already exists")]
    DuplicateNode(String),

    #[error("Stream '{stream}' consumed by node '{node}' has no producer")]
    StreamNotFound { node: String, stream: String },

    #[error("Stream '{stream}' is produced by both '{first}' and '{second}'")]
    DuplicateProducer {
        stream: String,
        first: String,
        second: String,
    },

    #[error("Side packet '{name}' required by node '{node}' was not provided")]
    SidePacketNotFound { node: String, name: String },

    #[error("Side packet '{name}' holds {provided}, node '{node}' expects {expected}")]
    SidePacketTypeMismatch {
        node: String,
        name: String,
        provided: &'static str,
        expected: &'static str,
    },

    #[error("Side packet '{0}' already exists")]
    DuplicateSidePacket(String),

    #[error("Type {0} not registered. Call register_type::<T>() before building the pipeline")]
    TypeNotRegistered(&'static str),
}

/// Error type reported by nodes, at contract time or while processing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(
        "Input matrix and the input side matrix must have the same dimension \
         (minuend {minuend}, subtrahend {subtrahend})"
    )]
    DimensionMismatch { minuend: Shape, subtrahend: Shape },

    #[error("No node type registered as '{0}'")]
    UnknownNodeType(String),

    #[error("Node '{0}' is not open")]
    NotReady(String),
}

/// Error type for work function operations
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    #[error("Timestamp {next} on port '{port}' does not follow {last}")]
    TimestampOrder {
        port: String,
        last: Timestamp,
        next: Timestamp,
    },

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error("Node panicked: {0}")]
    Panicked(String),

    #[error("Shutdown signal received")]
    Shutdown,
}

/// Result type for work functions
pub type WorkResult<T = ()> = Result<T, WorkError>;
