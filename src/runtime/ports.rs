//! Port schemas and type-erased port wrappers
//!
//! Provides PortSchema, which describes a declared port, plus InputPort and
//! OutputPort, which wrap the channel endpoints the pipeline hands to a node.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::AtomicBool;

use crossbeam_channel::Receiver as CrossbeamReceiver;

pub use super::errors::PortError;
use super::contract::TagEntry;
use super::packet::Packet;
use super::receiver::Receiver;
use super::sender::Sender;
use super::watchdog::{Watchdog, WatchdogHandle};

/// Direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    SideInput,
    Output,
}

/// Schema describing a port's metadata
#[derive(Debug, Clone)]
pub struct PortSchema {
    /// Tag from the configuration entry, empty if untagged
    pub tag: String,
    /// Index within the tag
    pub tag_index: usize,
    /// Stream or side packet name the port is bound to
    pub stream: String,
    /// Position of the port in the node's port list
    pub index: usize,
    pub direction: PortDirection,
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl PortSchema {
    /// Create a new port schema with type information
    pub fn new<T: 'static>(entry: &TagEntry, index: usize, direction: PortDirection) -> Self {
        Self {
            tag: entry.tag.clone(),
            tag_index: entry.index,
            stream: entry.stream.clone(),
            index,
            direction,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Untagged port bound to `stream`
    pub fn untagged<T: 'static>(
        stream: impl Into<String>,
        index: usize,
        direction: PortDirection,
    ) -> Self {
        let entry = TagEntry {
            tag: String::new(),
            index,
            stream: stream.into(),
        };
        Self::new::<T>(&entry, index, direction)
    }

    pub fn carries<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Display for PortSchema {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.tag.is_empty(), self.tag_index) {
            (true, _) => write!(f, "{}", self.stream),
            (false, 0) => write!(f, "{}:{}", self.tag, self.stream),
            (false, i) => write!(f, "{}:{}:{}", self.tag, i, self.stream),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Type-erased port wrappers
// ────────────────────────────────────────────────────────────────────────────

/// Type-erased input port wrapping a crossbeam receiver of `Packet<T>`
pub struct InputPort {
    name: String,
    channel: Box<dyn Any + Send>,
    watchdog_handle: WatchdogHandle,
    eos: AtomicBool,
}

impl InputPort {
    /// Create from a type-erased receiver (for internal use by Pipeline)
    pub(crate) fn from_type_erased(
        channel: Box<dyn Any + Send>,
        watchdog: &Watchdog,
        node_name: &str,
        port_name: &str,
    ) -> Self {
        Self {
            name: port_name.to_string(),
            channel,
            watchdog_handle: watchdog.register_port(node_name, "recv", port_name),
            eos: AtomicBool::new(false),
        }
    }

    /// Wrap a typed receiver directly (for driving a node by hand)
    pub fn from_receiver<T: Send + Sync + 'static>(
        receiver: CrossbeamReceiver<Packet<T>>,
        watchdog: &Watchdog,
        node_name: &str,
        port_name: &str,
    ) -> Self {
        Self::from_type_erased(Box::new(receiver), watchdog, node_name, port_name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a typed receiver with watchdog monitoring
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Receiver<'_, T>, PortError> {
        let receiver = self
            .channel
            .downcast_ref::<CrossbeamReceiver<Packet<T>>>()
            .ok_or_else(|| PortError::TypeMismatch {
                port: self.name.clone(),
                expected: std::any::type_name::<T>(),
            })?;
        Ok(Receiver::new(receiver, &self.watchdog_handle, &self.eos))
    }
}

impl fmt::Debug for InputPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InputPort({})", self.name)
    }
}

/// Type-erased output port wrapping a broadcast `Sender<T>`
pub struct OutputPort {
    name: String,
    channel: Box<dyn Any + Send>,
    watchdog_handle: WatchdogHandle,
}

impl OutputPort {
    /// Create from a type-erased sender (for internal use by Pipeline)
    pub(crate) fn from_type_erased(
        channel: Box<dyn Any + Send>,
        watchdog: &Watchdog,
        node_name: &str,
        port_name: &str,
    ) -> Self {
        Self {
            name: port_name.to_string(),
            channel,
            watchdog_handle: watchdog.register_port(node_name, "send", port_name),
        }
    }

    /// Wrap a typed sender directly (for driving a node by hand)
    pub fn from_sender<T: Send + Sync + 'static>(
        sender: Sender<T>,
        watchdog: &Watchdog,
        node_name: &str,
        port_name: &str,
    ) -> Self {
        Self::from_type_erased(Box::new(sender), watchdog, node_name, port_name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a sender with watchdog monitoring.
    /// Returns an owned sender that shares destinations and the timestamp
    /// bound with the port.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Sender<T>, PortError> {
        let sender = self
            .channel
            .downcast_ref::<Sender<T>>()
            .ok_or_else(|| PortError::TypeMismatch {
                port: self.name.clone(),
                expected: std::any::type_name::<T>(),
            })?;
        Ok(sender.with_watchdog(self.watchdog_handle.clone(), &self.name))
    }
}

impl fmt::Debug for OutputPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "OutputPort({})", self.name)
    }
}
