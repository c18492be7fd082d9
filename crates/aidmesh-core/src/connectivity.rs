//! Connectivity probing and polling.
//!
//! Link-layer transitions are not always reliably pushed, so connectivity
//! is polled on a multi-second cadence in addition to whatever the platform
//! reports. Router and proxy decisions never trust a cached flag: they call
//! [`ConnectivityProbe::current`] at decision time.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::types::connectivity::ConnectivityState;

/// Capacity of the connectivity transition channel
const TRANSITION_CHANNEL_CAPACITY: usize = 32;

/// Supplies the current connectivity snapshot.
///
/// Implementations read the platform's link state; the probe is consulted
/// fresh for every routing decision.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Read the current state. Must reflect reality at call time, not a
    /// cached snapshot.
    async fn current(&self) -> ConnectivityState;
}

/// A probe backed by an explicitly settable value.
///
/// Used by tests and by embedders that receive link-state callbacks from
/// the platform and push them in.
#[derive(Debug, Default)]
pub struct ManualProbe {
    state: RwLock<ConnectivityState>,
}

impl ManualProbe {
    /// Create a probe starting fully offline
    pub fn new(initial: ConnectivityState) -> Self {
        Self {
            state: RwLock::new(initial),
        }
    }

    /// Replace the reported state
    pub fn set(&self, state: ConnectivityState) {
        *self.state.write() = state;
    }
}

#[async_trait]
impl ConnectivityProbe for ManualProbe {
    async fn current(&self) -> ConnectivityState {
        *self.state.read()
    }
}

/// Polls a probe on a fixed cadence and broadcasts transitions.
///
/// Consumers (the queue drainer, UIs) subscribe to learn when a route
/// appears; they still re-read the probe before acting on it.
pub struct ConnectivityMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    tx: broadcast::Sender<ConnectivityState>,
    task: JoinHandle<()>,
}

impl ConnectivityMonitor {
    /// Spawn the polling task.
    pub fn spawn(probe: Arc<dyn ConnectivityProbe>, interval: std::time::Duration) -> Self {
        let (tx, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        let tx_for_task = tx.clone();
        let probe_for_task = probe.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut last: Option<ConnectivityState> = None;
            loop {
                ticker.tick().await;
                let state = probe_for_task.current().await;
                if last != Some(state) {
                    info!(%state, "Connectivity transition");
                    last = Some(state);
                    let _ = tx_for_task.send(state);
                } else {
                    debug!(%state, "Connectivity unchanged");
                }
            }
        });

        Self { probe, tx, task }
    }

    /// Subscribe to connectivity transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }

    /// Re-read the probe right now (never a cached value).
    pub async fn current(&self) -> ConnectivityState {
        self.probe.current().await
    }

    /// Stop the polling task.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_manual_probe_reports_set_state() {
        let probe = ManualProbe::default();
        assert_eq!(probe.current().await, ConnectivityState::offline());

        probe.set(ConnectivityState::online());
        assert_eq!(probe.current().await, ConnectivityState::online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_broadcasts_transitions_only() {
        let probe = Arc::new(ManualProbe::default());
        let monitor = ConnectivityMonitor::spawn(probe.clone(), Duration::from_secs(5));
        let mut rx = monitor.subscribe();

        // First poll reports the initial state
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(rx.recv().await.unwrap(), ConnectivityState::offline());

        // No transition: several ticks, nothing broadcast
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(rx.try_recv().is_err());

        // Transition: broadcast on the next tick
        probe.set(ConnectivityState::online());
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(rx.recv().await.unwrap(), ConnectivityState::online());

        monitor.shutdown();
    }

    #[tokio::test]
    async fn test_current_rereads_probe() {
        let probe = Arc::new(ManualProbe::default());
        let monitor = ConnectivityMonitor::spawn(probe.clone(), Duration::from_secs(3600));

        probe.set(ConnectivityState::online());
        // No tick has observed the change; current() still sees it
        assert_eq!(monitor.current().await, ConnectivityState::online());

        monitor.shutdown();
    }
}
