//! Thread-per-node scheduler for streaming graphs
//!
//! Spawns a dedicated thread for each node and manages their lifecycle. Each
//! thread calls `work()` in a loop until the node asks to stop, its inputs end
//! (`WorkError::Shutdown`), or the run is stopped. Any other error fails the
//! run: it is recorded, the stop signal is raised, and `wait()` reports it.

use super::errors::WorkError;
use super::node::ProcessNode;
use super::packet::TimestampDiff;
use super::ports::{InputPort, OutputPort};
use super::watchdog::{DEFAULT_THRESHOLD, Watchdog};
use crate::GraphError;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver as StdReceiver, Sender as StdSender, channel};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// First failure of a run: node name and its error
type Failure = Arc<Mutex<Option<(String, WorkError)>>>;

fn record_failure(failure: &Failure, node: &str, err: WorkError) {
    let mut slot = failure.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_none() {
        *slot = Some((node.to_string(), err));
    }
}

/// Text of a panic payload
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runtime scheduler that executes a streaming graph
pub struct Scheduler {
    threads: Vec<(String, JoinHandle<()>)>,
    stop_signal: Arc<AtomicBool>,
    failure: Failure,
    offsets: HashMap<String, TimestampDiff>,
    completion_tx: StdSender<String>,
    completion_rx: StdReceiver<String>,
    watchdog: Watchdog,
    watchdog_handle: JoinHandle<()>,
}

impl Scheduler {
    /// Create a new scheduler with watchdog monitoring
    pub fn new() -> Self {
        Self::with_watchdog_threshold(DEFAULT_THRESHOLD)
    }

    pub fn with_watchdog_threshold(threshold: Duration) -> Self {
        let (completion_tx, completion_rx) = channel();
        let watchdog = Watchdog::with_threshold(threshold);
        let watchdog_handle = watchdog.start_monitoring_thread();
        debug!(
            "Watchdog enabled - will report operations blocked >{:?}",
            threshold
        );
        Self {
            threads: Vec::new(),
            stop_signal: Arc::new(AtomicBool::new(false)),
            failure: Arc::new(Mutex::new(None)),
            offsets: HashMap::new(),
            completion_tx,
            completion_rx,
            watchdog,
            watchdog_handle,
        }
    }

    /// Get a reference to the watchdog
    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Remember the timestamp offset a node declared at open
    pub(crate) fn record_offset(&mut self, node: &str, offset: TimestampDiff) {
        self.offsets.insert(node.to_string(), offset);
    }

    /// Timestamp offset declared by `node`, if it declared one
    pub fn timestamp_offset(&self, node: &str) -> Option<TimestampDiff> {
        self.offsets.get(node).copied()
    }

    /// Start an opened node in its own thread
    pub fn start_process(
        &mut self,
        name: impl Into<String>,
        mut node: Box<dyn ProcessNode>,
        inputs: Vec<InputPort>,
        outputs: Vec<OutputPort>,
    ) {
        let stop_signal = Arc::clone(&self.stop_signal);
        let failure = Arc::clone(&self.failure);
        let completion_tx = self.completion_tx.clone();
        let name = name.into();
        let thread_name = name.clone();

        debug!("Starting node: {} ({})", name, node.node_type());

        let handle = thread::spawn(move || {
            let mut produced = 0usize;

            loop {
                if stop_signal.load(Ordering::Relaxed) || node.should_stop() {
                    break;
                }

                let result = panic::catch_unwind(AssertUnwindSafe(|| node.work(&inputs, &outputs)))
                    .unwrap_or_else(|payload| Err(WorkError::Panicked(panic_message(payload.as_ref()))));

                match result {
                    Ok(n) => produced += n,
                    Err(WorkError::Shutdown) => {
                        debug!("[{}] Streams ended", thread_name);
                        break;
                    }
                    Err(e) => {
                        error!("[{}] Work error: {}", thread_name, e);
                        record_failure(&failure, &thread_name, e);
                        stop_signal.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            }

            if let Err(e) = node.close() {
                error!("[{}] Close error: {}", thread_name, e);
                record_failure(&failure, &thread_name, e);
            }

            info!("[{}] Shutdown. Produced {} packets.", thread_name, produced);

            // Dropping the ports closes the streams for downstream nodes
            drop(outputs);
            drop(inputs);
            drop(node);

            let _ = completion_tx.send(thread_name);
        });

        self.threads.push((name, handle));
    }

    /// Signal all nodes to stop
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::Relaxed);
    }

    /// Wait for all node threads to complete.
    /// Returns the first node failure of the run, if any.
    pub fn wait(self) -> Result<(), GraphError> {
        let Scheduler {
            threads,
            stop_signal,
            failure,
            completion_tx,
            completion_rx,
            watchdog,
            watchdog_handle,
            ..
        } = self;

        // Close our end so the channel disconnects once every thread is done
        drop(completion_tx);

        let total_threads = threads.len();
        let mut completed = 0;

        info!("Waiting for {} threads to complete...", total_threads);

        let mut threads_by_name: HashMap<String, JoinHandle<()>> = threads.into_iter().collect();

        while completed < total_threads {
            let Ok(thread_name) = completion_rx.recv() else {
                break;
            };
            completed += 1;
            if let Some(handle) = threads_by_name.remove(&thread_name) {
                match handle.join() {
                    Ok(()) => debug!(
                        "[{}] Thread completed ({}/{})",
                        thread_name, completed, total_threads
                    ),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!(
                            "[{}] Thread panicked ({}/{}): {}",
                            thread_name, completed, total_threads, message
                        );
                        record_failure(&failure, &thread_name, WorkError::Panicked(message));
                        stop_signal.store(true, Ordering::Relaxed);
                    }
                }
            }
        }

        // Threads that panicked never reported completion
        for (thread_name, handle) in threads_by_name {
            if let Err(payload) = handle.join() {
                let message = panic_message(payload.as_ref());
                error!("[{}] Thread panicked: {}", thread_name, message);
                record_failure(&failure, &thread_name, WorkError::Panicked(message));
                stop_signal.store(true, Ordering::Relaxed);
            }
        }

        info!("All {} threads completed", total_threads);

        watchdog.stop();
        let _ = watchdog_handle.join();

        let first_failure = failure.lock().unwrap_or_else(PoisonError::into_inner).take();
        match first_failure {
            Some((node, source)) => Err(GraphError::NodeFailed { node, source }),
            None => Ok(()),
        }
    }

    /// Get the number of running threads
    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    /// Get the names of all running threads
    pub fn thread_names(&self) -> Vec<String> {
        self.threads.iter().map(|(name, _)| name.clone()).collect()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::errors::{NodeError, WorkResult};
    use crate::runtime::packet::{Packet, Timestamp};
    use crate::runtime::sender::Sender;
    use crossbeam_channel::bounded;

    struct CountingSource {
        count: i64,
        max: i64,
    }

    impl ProcessNode for CountingSource {
        fn name(&self) -> &str {
            "counting_source"
        }

        fn should_stop(&self) -> bool {
            self.count >= self.max
        }

        fn work(&mut self, _inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
            let output = outputs[0].get::<u32>()?;
            output.send(Packet::new(self.count as u32, Timestamp::new(self.count)))?;
            self.count += 1;
            Ok(1)
        }
    }

    struct RecordingSink {
        received: Arc<Mutex<Vec<(i64, u32)>>>,
        closed: Arc<AtomicBool>,
    }

    impl ProcessNode for RecordingSink {
        fn name(&self) -> &str {
            "recording_sink"
        }

        fn work(&mut self, inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
            let packet = inputs[0].get::<u32>()?.recv()?;
            self.received
                .lock()
                .unwrap()
                .push((packet.timestamp.value(), *packet.get()));
            Ok(0)
        }

        fn close(&mut self) -> WorkResult<()> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    struct FailingNode;

    impl ProcessNode for FailingNode {
        fn name(&self) -> &str {
            "failing"
        }

        fn work(&mut self, _inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
            Err(NodeError::InvalidConfiguration("boom".to_string()).into())
        }
    }

    struct PanickingNode;

    impl ProcessNode for PanickingNode {
        fn name(&self) -> &str {
            "panicking"
        }

        fn work(&mut self, _inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
            panic!("matrix buffer corrupted");
        }
    }

    struct PanicOnClose;

    impl ProcessNode for PanicOnClose {
        fn name(&self) -> &str {
            "panic_on_close"
        }

        fn should_stop(&self) -> bool {
            true
        }

        fn work(&mut self, _inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
            Ok(0)
        }

        fn close(&mut self) -> WorkResult<()> {
            panic!("teardown failed");
        }
    }

    #[test]
    fn test_scheduler_basic() {
        let mut scheduler = Scheduler::new();
        let watchdog = scheduler.watchdog().clone();
        let (tx, rx) = bounded::<Packet<u32>>(10);

        let received = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));

        scheduler.start_process(
            "source",
            Box::new(CountingSource { count: 0, max: 5 }),
            vec![],
            vec![OutputPort::from_sender(Sender::new(vec![tx]), &watchdog, "source", "out")],
        );
        scheduler.start_process(
            "sink",
            Box::new(RecordingSink {
                received: Arc::clone(&received),
                closed: Arc::clone(&closed),
            }),
            vec![InputPort::from_receiver(rx, &watchdog, "sink", "in")],
            vec![],
        );
        assert_eq!(scheduler.num_threads(), 2);

        scheduler.wait().unwrap();

        let values = received.lock().unwrap();
        assert_eq!(*values, vec![(0, 0), (1, 1), (2, 2), (3, 3), (4, 4)]);
        assert!(closed.load(Ordering::Relaxed));
    }

    #[test]
    fn test_failure_is_reported_by_wait() {
        let mut scheduler = Scheduler::new();
        scheduler.start_process("failing", Box::new(FailingNode), vec![], vec![]);

        let result = scheduler.wait();
        assert!(matches!(
            result,
            Err(GraphError::NodeFailed { ref node, source: WorkError::Node(_) }) if node == "failing"
        ));
    }

    #[test]
    fn test_panic_in_work_fails_the_run() {
        let mut scheduler = Scheduler::new();
        scheduler.start_process("boom", Box::new(PanickingNode), vec![], vec![]);

        match scheduler.wait() {
            Err(GraphError::NodeFailed {
                node,
                source: WorkError::Panicked(message),
            }) => {
                assert_eq!(node, "boom");
                assert!(message.contains("matrix buffer corrupted"));
            }
            other => panic!("expected a panic failure, got {:?}", other),
        }
    }

    #[test]
    fn test_panic_in_close_fails_the_run() {
        let mut scheduler = Scheduler::new();
        scheduler.start_process("closer", Box::new(PanicOnClose), vec![], vec![]);

        assert!(matches!(
            scheduler.wait(),
            Err(GraphError::NodeFailed { ref node, source: WorkError::Panicked(_) }) if node == "closer"
        ));
    }

    #[test]
    fn test_panic_stops_other_nodes() {
        let mut scheduler = Scheduler::new();
        let watchdog = scheduler.watchdog().clone();
        let (tx, rx) = bounded::<Packet<u32>>(1);

        scheduler.start_process(
            "source",
            Box::new(CountingSource { count: 0, max: i64::MAX }),
            vec![],
            vec![OutputPort::from_sender(Sender::new(vec![tx]), &watchdog, "source", "out")],
        );
        scheduler.start_process(
            "boom",
            Box::new(PanickingNode),
            vec![InputPort::from_receiver(rx, &watchdog, "boom", "in")],
            vec![],
        );

        assert!(matches!(
            scheduler.wait(),
            Err(GraphError::NodeFailed { ref node, .. }) if node == "boom"
        ));
    }

    #[test]
    fn test_offsets_are_recorded() {
        let mut scheduler = Scheduler::new();
        scheduler.record_offset("node", TimestampDiff::ZERO);
        assert_eq!(scheduler.timestamp_offset("node"), Some(TimestampDiff::ZERO));
        assert_eq!(scheduler.timestamp_offset("other"), None);
        scheduler.wait().unwrap();
    }
}
