//! Blocked-operation watchdog
//!
//! Each port handle stores the start time of its current blocking send/recv in
//! an atomic. A monitoring thread scans those timestamps every 100 ms and
//! warns about operations that have been stuck longer than the threshold.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Default time an operation may block before it is reported
pub const DEFAULT_THRESHOLD: Duration = Duration::from_secs(5);

/// Milliseconds since UNIX_EPOCH
#[inline(always)]
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Operation tracking for one port
struct PortState {
    /// Start of the current operation (ms since epoch), 0 when idle
    started_at: AtomicU64,
    /// Set once the current operation has been reported
    reported: AtomicBool,
    node_name: String,
    port_name: String,
    operation: &'static str,
}

/// Handle to a port's watchdog state, held by port wrappers
#[derive(Clone)]
pub struct WatchdogHandle {
    state: Arc<PortState>,
}

impl WatchdogHandle {
    #[inline(always)]
    fn begin(&self) {
        self.state.started_at.store(now_millis(), Ordering::Relaxed);
        self.state.reported.store(false, Ordering::Relaxed);
    }

    #[inline(always)]
    fn end(&self) {
        if self.state.reported.swap(false, Ordering::Relaxed) {
            info!(
                "[{}] {} on port '{}' resumed",
                self.state.node_name, self.state.operation, self.state.port_name
            );
        }
        self.state.started_at.store(0, Ordering::Relaxed);
    }
}

/// Shared watchdog state
#[derive(Clone)]
pub struct Watchdog {
    ports: Arc<Mutex<Vec<Weak<PortState>>>>,
    enabled: Arc<AtomicBool>,
    threshold: Duration,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(threshold: Duration) -> Self {
        Self {
            ports: Arc::new(Mutex::new(Vec::new())),
            enabled: Arc::new(AtomicBool::new(true)),
            threshold,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Register a port for monitoring
    pub fn register_port(
        &self,
        node_name: &str,
        operation: &'static str,
        port_name: &str,
    ) -> WatchdogHandle {
        let state = Arc::new(PortState {
            started_at: AtomicU64::new(0),
            reported: AtomicBool::new(false),
            node_name: node_name.to_string(),
            port_name: port_name.to_string(),
            operation,
        });

        self.ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(&state));

        WatchdogHandle { state }
    }

    /// Report operations blocked longer than the threshold.
    /// Returns how many ports are currently reported as blocked.
    pub fn check_for_blocked(&self) -> usize {
        let now = now_millis();
        let threshold_ms = self.threshold.as_millis() as u64;
        let mut blocked = 0;

        let mut ports = self.ports.lock().unwrap_or_else(PoisonError::into_inner);
        ports.retain(|weak| {
            let Some(state) = weak.upgrade() else {
                return false;
            };
            let start = state.started_at.load(Ordering::Relaxed);
            if start > 0 && now.saturating_sub(start) > threshold_ms {
                blocked += 1;
                if !state.reported.swap(true, Ordering::Relaxed) {
                    warn!(
                        "[{}] {} on port '{}' blocked for {:.1}s",
                        state.node_name,
                        state.operation,
                        state.port_name,
                        now.saturating_sub(start) as f64 / 1000.0
                    );
                }
            }
            true
        });
        blocked
    }

    /// Start the monitoring thread
    pub fn start_monitoring_thread(&self) -> std::thread::JoinHandle<()> {
        let watchdog = self.clone();
        std::thread::spawn(move || {
            while watchdog.enabled.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(100));
                watchdog.check_for_blocked();
            }
        })
    }

    /// Stop the monitoring thread
    pub fn stop(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard marking a blocking operation on a port
pub struct OperationGuard<'a> {
    handle: &'a WatchdogHandle,
}

impl<'a> OperationGuard<'a> {
    #[inline(always)]
    pub fn new(handle: &'a WatchdogHandle) -> Self {
        handle.begin();
        Self { handle }
    }
}

impl Drop for OperationGuard<'_> {
    #[inline(always)]
    fn drop(&mut self) {
        self.handle.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_operation_reported() {
        let watchdog = Watchdog::with_threshold(Duration::from_millis(10));
        let handle = watchdog.register_port("node", "recv", "in");

        {
            let _guard = OperationGuard::new(&handle);
            std::thread::sleep(Duration::from_millis(30));
            assert_eq!(watchdog.check_for_blocked(), 1);
        }

        assert_eq!(watchdog.check_for_blocked(), 0);
    }

    #[test]
    fn test_dropped_ports_are_forgotten() {
        let watchdog = Watchdog::new();
        let handle = watchdog.register_port("node", "send", "out");
        drop(handle);
        assert_eq!(watchdog.check_for_blocked(), 0);
        assert!(watchdog.ports.lock().unwrap().is_empty());
    }
}
