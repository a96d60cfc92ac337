//! Node trait for streaming processing
//!
//! Defines the ProcessNode trait that all streaming nodes implement, and the
//! OpenContext handed to a node once before its first work() call.

use std::any::Any;
use std::sync::Arc;

pub use super::errors::{PortError, WorkError, WorkResult};
use super::packet::TimestampDiff;
pub use super::ports::{InputPort, OutputPort, PortSchema};

/// A processing node that transforms data
/// - Sources have 0 inputs and N outputs
/// - Sinks have N inputs and 0 outputs
/// - Processors have N inputs and M outputs
///
/// The scheduler runs every node on its own thread, so calls on one node are
/// never concurrent. Lifecycle: `open()` once, `work()` until the node stops
/// or its inputs end, then `close()` once.
pub trait ProcessNode: Send {
    /// Get a debug name for this node
    fn name(&self) -> &str;

    /// Get node type identifier (the registry id for configured nodes)
    fn node_type(&self) -> &str {
        self.name()
    }

    /// Check if this node should stop processing
    fn should_stop(&self) -> bool {
        false
    }

    /// Schema for all input stream ports
    fn input_schema(&self) -> Vec<PortSchema> {
        Vec::new()
    }

    /// Schema for all input side packet ports
    fn side_input_schema(&self) -> Vec<PortSchema> {
        Vec::new()
    }

    /// Schema for all output stream ports
    fn output_schema(&self) -> Vec<PortSchema> {
        Vec::new()
    }

    /// One-time setup, after wiring and before any thread starts
    fn open(&mut self, _ctx: &mut OpenContext) -> WorkResult<()> {
        Ok(())
    }

    /// Do work: read from inputs, process, write to outputs
    /// Returns Ok(n) where n is the number of packets produced, or Err on failure.
    /// `Err(WorkError::Shutdown)` ends the node without failing the run.
    fn work(&mut self, inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize>;

    /// Teardown, called once when the node's thread exits
    fn close(&mut self) -> WorkResult<()> {
        Ok(())
    }
}

/// Side packet value as stored by the pipeline
pub(crate) type SideValue = Arc<dyn Any + Send + Sync>;

/// Setup context passed to [`ProcessNode::open`]
///
/// Holds the side packets bound to the node's side input ports, in port
/// order, and collects the timestamp offset the node promises for its outputs.
pub struct OpenContext {
    node_name: String,
    side_packets: Vec<(PortSchema, SideValue)>,
    offset: Option<TimestampDiff>,
}

impl OpenContext {
    pub(crate) fn new(node_name: impl Into<String>, side_packets: Vec<(PortSchema, SideValue)>) -> Self {
        Self {
            node_name: node_name.into(),
            side_packets,
            offset: None,
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Typed side packet bound to side input port `port`
    pub fn side_packet<T: Send + Sync + 'static>(&self, port: usize) -> Result<Arc<T>, PortError> {
        let (schema, value) = self
            .side_packets
            .get(port)
            .ok_or_else(|| PortError::SidePacketMissing(format!("#{}", port)))?;
        Arc::clone(value)
            .downcast::<T>()
            .map_err(|_| PortError::TypeMismatch {
                port: schema.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Declare the distance between an input timestamp and the output
    /// timestamps it produces
    pub fn set_offset(&mut self, offset: TimestampDiff) {
        self.offset = Some(offset);
    }

    pub fn offset(&self) -> Option<TimestampDiff> {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ports::PortDirection;

    fn context_with(value: SideValue) -> OpenContext {
        let schema = PortSchema::untagged::<u32>("side", 0, PortDirection::SideInput);
        OpenContext::new("node", vec![(schema, value)])
    }

    #[test]
    fn test_side_packet_lookup() {
        let ctx = context_with(Arc::new(7u32));
        assert_eq!(*ctx.side_packet::<u32>(0).unwrap(), 7);
        assert!(matches!(
            ctx.side_packet::<u32>(1),
            Err(PortError::SidePacketMissing(_))
        ));
        assert!(matches!(
            ctx.side_packet::<i64>(0),
            Err(PortError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_offset_defaults_to_unset() {
        let mut ctx = context_with(Arc::new(0u32));
        assert_eq!(ctx.offset(), None);
        ctx.set_offset(TimestampDiff::ZERO);
        assert_eq!(ctx.offset(), Some(TimestampDiff::ZERO));
    }
}
