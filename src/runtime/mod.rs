//! Runtime support for streaming node graphs

pub mod config;
pub mod contract;
pub mod errors;
pub mod node;
pub mod packet;
pub mod pipeline;
pub mod ports;
pub mod receiver;
pub mod registry;
pub mod scheduler;
pub mod sender;
pub mod type_registry;
pub mod watchdog;

pub use config::{DEFAULT_BUFFER_SIZE, GraphConfig, NodeConfig};
pub use contract::{NodeContract, TagEntry, TagMap};
pub use errors::{ConnectionError, NodeError, PortError, WorkError, WorkResult};
pub use node::{OpenContext, ProcessNode};
pub use packet::{Packet, Timestamp, TimestampDiff};
pub use pipeline::Pipeline;
pub use ports::{InputPort, OutputPort, PortDirection, PortSchema};
pub use receiver::Receiver;
pub use registry::{NodeFactory, NodeRegistry};
pub use scheduler::Scheduler;
pub use sender::Sender;
pub use type_registry::register_type;
pub use watchdog::Watchdog;
