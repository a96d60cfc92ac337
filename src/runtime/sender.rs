//! Broadcast sender with timestamp ordering and watchdog monitoring

use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::Sender as CrossbeamSender;
use tracing::debug;

use super::errors::{WorkError, WorkResult};
use super::packet::{Packet, Timestamp};
use super::watchdog::{OperationGuard, WatchdogHandle};

/// Broadcast sender that sends packets to zero or more consumers
///
/// Every clone of a sender shares the last timestamp sent on the stream, so
/// timestamps strictly increase no matter which clone emitted them. A sender
/// without destinations belongs to an unconnected output and silently accepts
/// packets.
pub struct Sender<T> {
    destinations: Vec<CrossbeamSender<Packet<T>>>,
    last_timestamp: Arc<Mutex<Option<Timestamp>>>,
    watchdog_handle: Option<WatchdogHandle>,
    port: String,
}

impl<T> Sender<T> {
    /// Create a new Sender from a vector of crossbeam senders
    pub fn new(destinations: Vec<CrossbeamSender<Packet<T>>>) -> Self {
        Self {
            destinations,
            last_timestamp: Arc::new(Mutex::new(None)),
            watchdog_handle: None,
            port: String::new(),
        }
    }

    /// Attach a watchdog handle and port name to a clone of this sender
    pub fn with_watchdog(&self, watchdog_handle: WatchdogHandle, port: &str) -> Self {
        Self {
            destinations: self.destinations.clone(),
            last_timestamp: Arc::clone(&self.last_timestamp),
            watchdog_handle: Some(watchdog_handle),
            port: port.to_string(),
        }
    }

    /// Get the number of broadcast destinations
    pub fn num_destinations(&self) -> usize {
        self.destinations.len()
    }

    /// Send a packet to all destinations
    ///
    /// Fails with `TimestampOrder` if the packet does not come strictly after
    /// the previous one on this stream. Returns `Shutdown` once every consumer
    /// has gone away, so producers wind down instead of failing the run.
    pub fn send(&self, packet: Packet<T>) -> WorkResult<()> {
        {
            let mut last = self
                .last_timestamp
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(prev) = *last
                && packet.timestamp <= prev
            {
                return Err(WorkError::TimestampOrder {
                    port: self.port.clone(),
                    last: prev,
                    next: packet.timestamp,
                });
            }
            *last = Some(packet.timestamp);
        }

        if self.destinations.is_empty() {
            return Ok(());
        }

        let _guard = self.watchdog_handle.as_ref().map(OperationGuard::new);

        let mut delivered = false;
        for dest in &self.destinations {
            if dest.send(packet.clone()).is_ok() {
                delivered = true;
            }
        }

        if !delivered {
            debug!("Sender on '{}': all consumers disconnected", self.port);
            return Err(WorkError::Shutdown);
        }
        Ok(())
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            destinations: self.destinations.clone(),
            last_timestamp: Arc::clone(&self.last_timestamp),
            watchdog_handle: self.watchdog_handle.clone(),
            port: self.port.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_broadcast_to_all_destinations() {
        let (tx1, rx1) = bounded::<Packet<i32>>(4);
        let (tx2, rx2) = bounded::<Packet<i32>>(4);
        let sender = Sender::new(vec![tx1, tx2]);
        assert_eq!(sender.num_destinations(), 2);

        sender.send(Packet::new(5, Timestamp::new(1))).unwrap();

        let a = rx1.recv().unwrap();
        let b = rx2.recv().unwrap();
        assert!(Arc::ptr_eq(&a.payload, &b.payload));
    }

    #[test]
    fn test_timestamps_must_increase_across_clones() {
        let (tx, _rx) = bounded::<Packet<i32>>(4);
        let sender = Sender::new(vec![tx]);
        let clone = sender.clone();

        sender.send(Packet::new(1, Timestamp::new(3))).unwrap();
        let err = clone.send(Packet::new(2, Timestamp::new(3))).unwrap_err();
        assert!(matches!(
            err,
            WorkError::TimestampOrder { last, next, .. }
                if last == Timestamp::new(3) && next == Timestamp::new(3)
        ));
        assert!(clone.send(Packet::new(3, Timestamp::new(4))).is_ok());
    }

    #[test]
    fn test_unconnected_sender_accepts_packets() {
        let sender = Sender::<i32>::new(Vec::new());
        assert!(sender.send(Packet::new(1, Timestamp::new(0))).is_ok());
    }

    #[test]
    fn test_disconnected_consumers_shut_down_producer() {
        let (tx, rx) = bounded::<Packet<i32>>(4);
        let sender = Sender::new(vec![tx]);
        drop(rx);
        assert!(matches!(
            sender.send(Packet::new(1, Timestamp::new(0))),
            Err(WorkError::Shutdown)
        ));
    }
}
