//! [`Watchdog`] – liveness tracking for long-running tasks.
//!
//! The arbiter worker registers itself at start-up and calls
//! [`Watchdog::heartbeat`] on every loop iteration (including idle dequeue
//! timeouts).  `status()` reports the worker as unhealthy once a heartbeat
//! deadline is missed, which happens only when a driver call hangs past the
//! gateway timeout or the task has died.  The deadline comes from
//! `ControlConfig::worker_heartbeat`, which is sized for the slowest intent.
//!
//! The registry is behind a mutex so the worker and status readers can share
//! one `Arc<Watchdog>`.  Deadlines are measured on tokio's clock so they
//! follow paused time in tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Health state reported for a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    Healthy,
    /// No heartbeat within the deadline, or never registered.
    TimedOut,
}

struct Deadline {
    last_heartbeat: Instant,
    timeout: Duration,
}

impl Deadline {
    fn expired(&self) -> bool {
        self.last_heartbeat.elapsed() > self.timeout
    }
}

/// # Example
///
/// ```
/// use std::time::Duration;
/// use strider_kernel::watchdog::{ComponentHealth, Watchdog};
///
/// let wd = Watchdog::new();
/// wd.register("arbiter", Duration::from_secs(3));
/// wd.heartbeat("arbiter");
/// assert_eq!(wd.health("arbiter"), ComponentHealth::Healthy);
/// ```
#[derive(Default)]
pub struct Watchdog {
    components: Mutex<HashMap<String, Deadline>>,
}

impl Watchdog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Deadline>> {
        self.components
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register (or re-register) `component_id`; the deadline starts now.
    pub fn register(&self, component_id: &str, timeout: Duration) {
        self.lock().insert(
            component_id.to_string(),
            Deadline {
                last_heartbeat: Instant::now(),
                timeout,
            },
        );
    }

    /// Forget `component_id`.  A deregistered component reports
    /// [`ComponentHealth::TimedOut`].
    pub fn deregister(&self, component_id: &str) {
        self.lock().remove(component_id);
    }

    /// No-op for unknown components.
    pub fn heartbeat(&self, component_id: &str) {
        if let Some(entry) = self.lock().get_mut(component_id) {
            entry.last_heartbeat = Instant::now();
        }
    }

    pub fn health(&self, component_id: &str) -> ComponentHealth {
        match self.lock().get(component_id) {
            Some(entry) if !entry.expired() => ComponentHealth::Healthy,
            _ => ComponentHealth::TimedOut,
        }
    }

    /// IDs of every registered component past its deadline, in no particular
    /// order.
    pub fn check_all(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, entry)| entry.expired())
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fresh_registration_is_healthy() {
        let wd = Watchdog::new();
        wd.register("arbiter", Duration::from_secs(5));
        assert_eq!(wd.health("arbiter"), ComponentHealth::Healthy);
    }

    #[test]
    fn silent_component_times_out() {
        let wd = Watchdog::new();
        wd.register("arbiter", Duration::from_millis(20));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(wd.health("arbiter"), ComponentHealth::TimedOut);
        assert_eq!(wd.check_all(), vec!["arbiter".to_string()]);
    }

    #[test]
    fn heartbeat_keeps_component_alive() {
        let wd = Watchdog::new();
        wd.register("arbiter", Duration::from_millis(40));
        for _ in 0..3 {
            thread::sleep(Duration::from_millis(15));
            wd.heartbeat("arbiter");
        }
        assert_eq!(wd.health("arbiter"), ComponentHealth::Healthy);
    }

    #[test]
    fn deregistered_component_reports_timed_out() {
        let wd = Watchdog::new();
        wd.register("scheduler", Duration::from_secs(60));
        wd.deregister("scheduler");
        assert_eq!(wd.health("scheduler"), ComponentHealth::TimedOut);
        assert!(wd.check_all().is_empty());
    }

    #[test]
    fn unknown_component_heartbeat_is_ignored() {
        let wd = Watchdog::new();
        wd.heartbeat("ghost");
        assert_eq!(wd.health("ghost"), ComponentHealth::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_follows_runtime_clock() {
        let wd = Watchdog::new();
        wd.register("arbiter", Duration::from_secs(3));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(wd.health("arbiter"), ComponentHealth::Healthy);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(wd.health("arbiter"), ComponentHealth::TimedOut);

        wd.heartbeat("arbiter");
        assert_eq!(wd.health("arbiter"), ComponentHealth::Healthy);
    }
}
