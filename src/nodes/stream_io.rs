//! Nodes that feed packets into a graph and collect them back out
//!
//! `PacketSource` plays a fixed sequence of packets onto a stream.
//! `PacketCollector` drains a stream into a channel held by the caller.

use crate::runtime::errors::PortError;
use crate::runtime::node::{InputPort, OutputPort, ProcessNode, WorkError, WorkResult};
use crate::runtime::packet::Packet;
use crate::runtime::ports::{PortDirection, PortSchema};
use crossbeam_channel::{Receiver as CrossbeamReceiver, Sender as CrossbeamSender, unbounded};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Source node emitting a fixed sequence of packets, one per work() call
///
/// Output: the named stream, untagged index 0
pub struct PacketSource<T> {
    name: String,
    stream: String,
    packets: VecDeque<Packet<T>>,
}

impl<T: Send + Sync + 'static> PacketSource<T> {
    pub fn new(stream: impl Into<String>, packets: impl IntoIterator<Item = Packet<T>>) -> Self {
        Self {
            name: "packet_source".to_string(),
            stream: stream.into(),
            packets: packets.into_iter().collect(),
        }
    }

    /// With custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Packets not yet emitted
    pub fn remaining(&self) -> usize {
        self.packets.len()
    }
}

impl<T: Send + Sync + 'static> ProcessNode for PacketSource<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn node_type(&self) -> &str {
        "PacketSource"
    }

    fn should_stop(&self) -> bool {
        self.packets.is_empty()
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::untagged::<T>(&self.stream, 0, PortDirection::Output)]
    }

    fn work(&mut self, _inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
        let output = outputs
            .first()
            .ok_or_else(|| PortError::NotConnected(self.stream.clone()))?
            .get::<T>()?;

        let Some(packet) = self.packets.pop_front() else {
            return Ok(0);
        };
        trace!("[{}] Emitting packet at {}", self.name, packet.timestamp);
        output.send(packet)?;
        Ok(1)
    }
}

/// Sink node forwarding every packet of a stream to the caller
///
/// Input: the named stream, untagged index 0
pub struct PacketCollector<T> {
    name: String,
    stream: String,
    tx: CrossbeamSender<Packet<T>>,
    received: usize,
}

impl<T: Send + Sync + 'static> PacketCollector<T> {
    /// Create a collector and the receiver its packets are delivered to
    pub fn new(stream: impl Into<String>) -> (Self, CrossbeamReceiver<Packet<T>>) {
        let (tx, rx) = unbounded();
        let collector = Self {
            name: "packet_collector".to_string(),
            stream: stream.into(),
            tx,
            received: 0,
        };
        (collector, rx)
    }

    /// With custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<T: Send + Sync + 'static> ProcessNode for PacketCollector<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn node_type(&self) -> &str {
        "PacketCollector"
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        vec![PortSchema::untagged::<T>(&self.stream, 0, PortDirection::Input)]
    }

    fn work(&mut self, inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
        let packet = inputs
            .first()
            .ok_or_else(|| PortError::NotConnected(self.stream.clone()))?
            .get::<T>()?
            .recv()?;

        // Nobody is listening anymore
        self.tx.send(packet).map_err(|_| WorkError::Shutdown)?;
        self.received += 1;
        Ok(0)
    }

    fn close(&mut self) -> WorkResult<()> {
        debug!("[{}] Collected {} packets", self.name, self.received);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::packet::Timestamp;
    use crate::runtime::sender::Sender;
    use crate::runtime::watchdog::Watchdog;
    use crossbeam_channel::bounded;

    #[test]
    fn test_source_emits_in_order_then_stops() {
        let watchdog = Watchdog::new();
        let (tx, rx) = bounded::<Packet<u32>>(4);
        let outputs = vec![OutputPort::from_sender(
            Sender::new(vec![tx]),
            &watchdog,
            "source",
            "numbers",
        )];
        let mut source = PacketSource::new(
            "numbers",
            vec![
                Packet::new(1u32, Timestamp::new(10)),
                Packet::new(2u32, Timestamp::new(20)),
            ],
        );

        assert_eq!(source.output_schema()[0].stream, "numbers");
        assert_eq!(source.work(&[], &outputs).unwrap(), 1);
        assert_eq!(source.remaining(), 1);
        assert!(!source.should_stop());
        assert_eq!(source.work(&[], &outputs).unwrap(), 1);
        assert!(source.should_stop());

        let received: Vec<(i64, u32)> = rx
            .try_iter()
            .map(|p| (p.timestamp.value(), *p.get()))
            .collect();
        assert_eq!(received, vec![(10, 1), (20, 2)]);
    }

    #[test]
    fn test_source_without_output_port() {
        let mut source = PacketSource::new("numbers", vec![Packet::new(1u32, Timestamp::new(0))]);
        assert!(matches!(
            source.work(&[], &[]),
            Err(WorkError::Port(PortError::NotConnected(_)))
        ));
    }

    #[test]
    fn test_collector_forwards_until_stream_ends() {
        let watchdog = Watchdog::new();
        let (tx, rx) = bounded::<Packet<u32>>(4);
        let inputs = vec![InputPort::from_receiver(rx, &watchdog, "sink", "numbers")];
        let (mut collector, results) = PacketCollector::<u32>::new("numbers");

        tx.send(Packet::new(5, Timestamp::new(1))).unwrap();
        drop(tx);

        assert_eq!(collector.work(&inputs, &[]).unwrap(), 0);
        assert!(matches!(collector.work(&inputs, &[]), Err(WorkError::Shutdown)));
        assert_eq!(*results.recv().unwrap().get(), 5);
    }
}
