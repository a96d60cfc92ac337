//! Channel receiver with end-of-stream caching and watchdog monitoring

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Receiver as CrossbeamReceiver;

use super::errors::{WorkError, WorkResult};
use super::packet::Packet;
use super::watchdog::{OperationGuard, WatchdogHandle};

/// Borrowed view of an input port's channel
///
/// A stream ends when every producer has dropped its sender. The first
/// receive that observes this sets the port's end-of-stream flag, so every
/// later call returns `WorkError::Shutdown` without touching the channel.
pub struct Receiver<'a, T> {
    receiver: &'a CrossbeamReceiver<Packet<T>>,
    watchdog_handle: &'a WatchdogHandle,
    eos: &'a AtomicBool,
}

impl<'a, T> Receiver<'a, T> {
    pub fn new(
        receiver: &'a CrossbeamReceiver<Packet<T>>,
        watchdog_handle: &'a WatchdogHandle,
        eos: &'a AtomicBool,
    ) -> Self {
        Self {
            receiver,
            watchdog_handle,
            eos,
        }
    }

    /// Blocking receive of the next packet
    pub fn recv(&self) -> WorkResult<Packet<T>> {
        if self.eos.load(Ordering::Relaxed) {
            return Err(WorkError::Shutdown);
        }

        let _guard = OperationGuard::new(self.watchdog_handle);
        match self.receiver.recv() {
            Ok(packet) => Ok(packet),
            Err(_) => {
                self.eos.store(true, Ordering::Relaxed);
                tracing::debug!("Receiver::recv() - all producers gone, returning Shutdown");
                Err(WorkError::Shutdown)
            }
        }
    }

    /// Whether end of stream has already been observed
    pub fn is_done(&self) -> bool {
        self.eos.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::packet::Timestamp;
    use crate::runtime::Watchdog;
    use crossbeam_channel::bounded;

    #[test]
    fn test_recv_in_order() {
        let (tx, rx) = bounded::<Packet<i32>>(10);
        let wd = Watchdog::new();
        let handle = wd.register_port("test", "recv", "test_port");
        let eos = AtomicBool::new(false);
        let receiver = Receiver::new(&rx, &handle, &eos);

        tx.send(Packet::new(42, Timestamp::new(1))).unwrap();
        tx.send(Packet::new(99, Timestamp::new(2))).unwrap();

        assert_eq!(*receiver.recv().unwrap().get(), 42);
        let second = receiver.recv().unwrap();
        assert_eq!(*second.get(), 99);
        assert_eq!(second.timestamp, Timestamp::new(2));
    }

    #[test]
    fn test_disconnect_returns_shutdown() {
        let (tx, rx) = bounded::<Packet<i32>>(10);
        let wd = Watchdog::new();
        let handle = wd.register_port("test", "recv", "test_port");
        let eos = AtomicBool::new(false);
        let receiver = Receiver::new(&rx, &handle, &eos);

        tx.send(Packet::new(42, Timestamp::new(0))).unwrap();
        drop(tx);

        // Buffered packet is still delivered
        assert_eq!(*receiver.recv().unwrap().get(), 42);
        assert!(matches!(receiver.recv(), Err(WorkError::Shutdown)));
        assert!(receiver.is_done());
    }

    #[test]
    fn test_eos_persists_across_receivers() {
        let (tx, rx) = bounded::<Packet<i32>>(10);
        let wd = Watchdog::new();
        let handle = wd.register_port("test", "recv", "test_port");
        let eos = AtomicBool::new(false);
        drop(tx);

        {
            let receiver = Receiver::new(&rx, &handle, &eos);
            assert!(matches!(receiver.recv(), Err(WorkError::Shutdown)));
        }

        // Next work() call builds a fresh Receiver over the same port state
        let receiver = Receiver::new(&rx, &handle, &eos);
        assert!(receiver.is_done());
    }
}
