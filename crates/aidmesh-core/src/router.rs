//! Submission router: one connectivity snapshot in, exactly one strategy
//! out.
//!
//! The decision table is a pure function from [`ConnectivityState`] to
//! [`Strategy`], evaluated against a freshly re-read snapshot on every
//! attempt, never a cached flag. The executor runs the chosen strategy
//! with a per-tier timeout; a tier's failure falls through to the next
//! lower tier, ending at the offline mutation queue. A timed-out attempt is
//! abandoned; its only persisted side effect is the idempotent queue entry.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::backend::BackendGateway;
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityProbe;
use crate::error::{ReportError, ReportResult};
use crate::mesh::client::HostGateway;
use crate::mesh::proxy::HostProxy;
use crate::queue::OfflineQueue;
use crate::storage::Storage;
use crate::types::connectivity::ConnectivityState;
use crate::types::queue::QueueOperation;
use crate::types::report::{NewReport, Report, StatusEvent};
use crate::types::ReportRef;

/// The five submission strategies. Exactly one is chosen per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Internet, not hosting, no host link: submit straight to the backend
    Direct,
    /// Internet and a host link: backend first, then best-effort forward of
    /// the canonical-tagged payload to the host
    Dual,
    /// Host link only: submit to the host proxy; stays temp-id until the
    /// host syncs
    HostRelay,
    /// This device is the host: like Direct when online (also writing its
    /// own hosted cache), otherwise straight into the hosted cache as the
    /// group's authoritative local copy
    HostingSelf,
    /// Nothing reachable: append to the offline mutation queue
    Fallback,
}

/// The decision table (§ routing). Pure; trivially exhaustive over the
/// snapshot, so exactly one branch applies to any state.
pub fn decide(state: &ConnectivityState) -> Strategy {
    if state.is_hosting {
        Strategy::HostingSelf
    } else if state.has_internet && state.is_connected_to_host {
        Strategy::Dual
    } else if state.has_internet {
        Strategy::Direct
    } else if state.is_connected_to_host {
        Strategy::HostRelay
    } else {
        Strategy::Fallback
    }
}

/// Where a submission ended up.
#[derive(Debug, Clone)]
pub enum Disposition {
    /// The backend accepted it; the report carries its canonical id
    Synced(Report),
    /// A host accepted it; canonical id pending the host's own sync
    Relayed(Report),
    /// Written into this device's own hosted cache as the group's
    /// authoritative local copy
    Hosted(Report),
    /// Appended to the offline mutation queue
    Queued {
        /// The entry's replay position
        sequence: u64,
    },
}

/// Result of one submission attempt.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    /// The strategy the decision table selected
    pub strategy: Strategy,
    /// Where the operation ended up
    pub disposition: Disposition,
}

/// Result of replaying a queued operation (no queue fallback).
#[derive(Debug, Clone)]
pub enum ReplayOutcome {
    /// The backend accepted it; canonical mapping is persisted
    Canonical(Report),
    /// A host accepted it; the entry may stay queued until a canonical
    /// mapping exists
    Relayed(Report),
}

/// Client-side submission router.
pub struct SubmissionRouter {
    probe: Arc<dyn ConnectivityProbe>,
    backend: Arc<dyn BackendGateway>,
    /// Present while connected to a group host
    host: RwLock<Option<Arc<dyn HostGateway>>>,
    /// Present while this device is itself hosting
    own_proxy: RwLock<Option<Arc<HostProxy>>>,
    queue: Arc<OfflineQueue>,
    storage: Storage,
    config: SyncConfig,
}

impl SubmissionRouter {
    /// Create a router.
    pub fn new(
        probe: Arc<dyn ConnectivityProbe>,
        backend: Arc<dyn BackendGateway>,
        queue: Arc<OfflineQueue>,
        storage: Storage,
        config: SyncConfig,
    ) -> Self {
        Self {
            probe,
            backend,
            host: RwLock::new(None),
            own_proxy: RwLock::new(None),
            queue,
            storage,
            config,
        }
    }

    /// Attach the gateway for a newly connected host.
    pub fn set_host(&self, host: Option<Arc<dyn HostGateway>>) {
        *self.host.write() = host;
    }

    /// Attach this device's own proxy while it hosts.
    pub fn set_own_proxy(&self, proxy: Option<Arc<HostProxy>>) {
        *self.own_proxy.write() = proxy;
    }

    /// Submit a new report through whichever path is currently reachable.
    ///
    /// Validation failures are returned immediately and never queued. Any
    /// transient failure lands the payload in the offline queue.
    pub async fn submit_report(&self, payload: NewReport) -> ReportResult<SubmissionOutcome> {
        payload.validate()?;

        let state = self.probe.current().await;
        let strategy = decide(&state);
        debug!(?strategy, %state, "Submission strategy selected");

        let disposition = match strategy {
            Strategy::Direct => match self.backend_submit(payload.clone()).await {
                Ok(report) => Disposition::Synced(report),
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Direct submission failed; queueing");
                    self.enqueue_create(payload)?
                }
                Err(e) => return Err(e),
            },
            Strategy::Dual => match self.backend_submit(payload.clone()).await {
                Ok(report) => {
                    self.forward_to_host(&payload, &report).await;
                    Disposition::Synced(report)
                }
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Dual backend leg failed; trying host relay");
                    self.relay_or_queue(payload).await?
                }
                Err(e) => return Err(e),
            },
            Strategy::HostRelay => self.relay_or_queue(payload).await?,
            Strategy::HostingSelf => {
                let proxy = self.own_proxy.read().clone();
                match proxy {
                    Some(proxy) => match proxy.submit(payload.clone()).await {
                        Ok(report) if report.synced_to_backend => Disposition::Synced(report),
                        Ok(report) => Disposition::Hosted(report),
                        Err(e) if e.is_transient() => {
                            warn!(error = %e, "Hosting-self submission failed; queueing");
                            self.enqueue_create(payload)?
                        }
                        Err(e) => return Err(e),
                    },
                    None => {
                        warn!("Hosting flagged but no proxy attached; queueing");
                        self.enqueue_create(payload)?
                    }
                }
            }
            Strategy::Fallback => self.enqueue_create(payload)?,
        };

        Ok(SubmissionOutcome {
            strategy,
            disposition,
        })
    }

    /// Route a status transition the same way reports are routed.
    pub async fn submit_update(
        &self,
        target: ReportRef,
        event: StatusEvent,
    ) -> ReportResult<SubmissionOutcome> {
        let state = self.probe.current().await;
        let strategy = decide(&state);
        debug!(?strategy, %state, "Update strategy selected");

        let op = || QueueOperation::StatusUpdate {
            target,
            status: event.status,
            actor: event.actor.clone(),
            timestamp: event.timestamp,
        };

        let disposition = match strategy {
            Strategy::Direct | Strategy::Dual => {
                match self.backend_update(target, event.clone()).await {
                    Ok(report) => Disposition::Synced(report),
                    Err(e) if e.is_transient() => {
                        if strategy == Strategy::Dual {
                            match self.host_update(target, event.clone()).await {
                                Ok(report) => Disposition::Relayed(report),
                                Err(e) if e.is_transient() => self.enqueue_op(op())?,
                                Err(e) => return Err(e),
                            }
                        } else {
                            warn!(error = %e, "Direct update failed; queueing");
                            self.enqueue_op(op())?
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
            Strategy::HostRelay => match self.host_update(target, event.clone()).await {
                Ok(report) => Disposition::Relayed(report),
                Err(e) if e.is_transient() => self.enqueue_op(op())?,
                Err(e) => return Err(e),
            },
            Strategy::HostingSelf => {
                let proxy = self.own_proxy.read().clone();
                match proxy {
                    Some(proxy) => match proxy.update_status(target, event.clone()).await {
                        Ok(report) if report.synced_to_backend => Disposition::Synced(report),
                        Ok(report) => Disposition::Hosted(report),
                        Err(e) if e.is_transient() => self.enqueue_op(op())?,
                        Err(e) => return Err(e),
                    },
                    None => self.enqueue_op(op())?,
                }
            }
            Strategy::Fallback => self.enqueue_op(op())?,
        };

        Ok(SubmissionOutcome {
            strategy,
            disposition,
        })
    }

    /// Replay a queued operation. No queue fallback: if nothing is
    /// reachable the caller gets a transient error and the entry stays
    /// where it is.
    pub async fn replay(&self, operation: &QueueOperation) -> ReportResult<ReplayOutcome> {
        let state = self.probe.current().await;
        let strategy = decide(&state);

        match operation {
            QueueOperation::Create { payload } => match strategy {
                Strategy::Direct | Strategy::Dual => {
                    let report = self.backend_submit(payload.clone()).await?;
                    Ok(ReplayOutcome::Canonical(report))
                }
                Strategy::HostingSelf => {
                    let proxy = self.own_proxy.read().clone();
                    match proxy {
                        Some(proxy) => {
                            let report = proxy.submit(payload.clone()).await?;
                            if report.synced_to_backend {
                                self.storage.record_origin(&payload.local_id, &report.id)?;
                                Ok(ReplayOutcome::Canonical(report))
                            } else {
                                Ok(ReplayOutcome::Relayed(report))
                            }
                        }
                        None => Err(ReportError::Network("no proxy attached".to_string())),
                    }
                }
                Strategy::HostRelay => {
                    let report = self.host_submit(payload.clone()).await?;
                    Ok(ReplayOutcome::Relayed(report))
                }
                Strategy::Fallback => {
                    Err(ReportError::Network("no route to backend or host".to_string()))
                }
            },
            QueueOperation::StatusUpdate {
                target,
                status,
                actor,
                timestamp,
            } => {
                let event = StatusEvent::new(*status, actor.clone(), *timestamp);
                match strategy {
                    Strategy::Direct | Strategy::Dual => {
                        let report = self.backend_update(*target, event).await?;
                        Ok(ReplayOutcome::Canonical(report))
                    }
                    Strategy::HostingSelf => {
                        let proxy = self.own_proxy.read().clone();
                        match proxy {
                            Some(proxy) => {
                                let report = proxy.update_status(*target, event).await?;
                                if report.synced_to_backend {
                                    Ok(ReplayOutcome::Canonical(report))
                                } else {
                                    Ok(ReplayOutcome::Relayed(report))
                                }
                            }
                            None => Err(ReportError::Network("no proxy attached".to_string())),
                        }
                    }
                    Strategy::HostRelay => {
                        let report = self.host_update(*target, event).await?;
                        Ok(ReplayOutcome::Relayed(report))
                    }
                    Strategy::Fallback => {
                        Err(ReportError::Network("no route to backend or host".to_string()))
                    }
                }
            }
        }
    }

    async fn backend_submit(&self, payload: NewReport) -> ReportResult<Report> {
        let local_id = payload.local_id;
        let report = tokio::time::timeout(
            self.config.request_timeout,
            self.backend.submit_report(payload),
        )
        .await
        .map_err(|_| ReportError::Timeout("backend submit".to_string()))??;
        self.storage.record_origin(&local_id, &report.id)?;
        Ok(report)
    }

    async fn backend_update(&self, target: ReportRef, event: StatusEvent) -> ReportResult<Report> {
        tokio::time::timeout(
            self.config.request_timeout,
            self.backend.update_status(target, event),
        )
        .await
        .map_err(|_| ReportError::Timeout("backend update".to_string()))?
    }

    async fn host_submit(&self, payload: NewReport) -> ReportResult<Report> {
        let host = self
            .host
            .read()
            .clone()
            .ok_or_else(|| ReportError::Network("no host gateway attached".to_string()))?;
        tokio::time::timeout(self.config.request_timeout, host.submit_report(payload))
            .await
            .map_err(|_| ReportError::Timeout("host submit".to_string()))?
    }

    async fn host_update(&self, target: ReportRef, event: StatusEvent) -> ReportResult<Report> {
        let host = self
            .host
            .read()
            .clone()
            .ok_or_else(|| ReportError::Network("no host gateway attached".to_string()))?;
        tokio::time::timeout(self.config.request_timeout, host.update_status(target, event))
            .await
            .map_err(|_| ReportError::Timeout("host update".to_string()))?
    }

    async fn relay_or_queue(&self, payload: NewReport) -> ReportResult<Disposition> {
        match self.host_submit(payload.clone()).await {
            Ok(report) => {
                info!(origin = %payload.local_id, "Report relayed to host");
                Ok(Disposition::Relayed(report))
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Host relay failed; queueing");
                self.enqueue_create(payload)
            }
            Err(e) => Err(e),
        }
    }

    /// Best-effort second leg of the Dual strategy: the host learns the
    /// canonical-tagged copy so its cache converges without waiting for its
    /// own backend sync. Either leg may fail independently.
    async fn forward_to_host(&self, payload: &NewReport, canonical: &Report) {
        let mut forwarded = payload.clone();
        forwarded.seed_history = canonical.status_history.clone();
        if let Err(e) = self.host_submit(forwarded).await {
            debug!(error = %e, "Host forward leg failed (ignored)");
        }
    }

    fn enqueue_create(&self, payload: NewReport) -> ReportResult<Disposition> {
        let local_id = payload.local_id;
        let item = self
            .queue
            .enqueue(local_id, QueueOperation::Create { payload })?;
        info!(origin = %local_id, sequence = item.sequence, "Report queued offline");
        Ok(Disposition::Queued {
            sequence: item.sequence,
        })
    }

    fn enqueue_op(&self, operation: QueueOperation) -> ReportResult<Disposition> {
        let local_id = crate::types::LocalId::new();
        let item = self.queue.enqueue(local_id, operation)?;
        info!(sequence = item.sequence, "Update queued offline");
        Ok(Disposition::Queued {
            sequence: item.sequence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(internet: bool, hosting: bool, host_link: bool) -> ConnectivityState {
        ConnectivityState {
            has_internet: internet,
            is_hosting: hosting,
            is_connected_to_host: host_link,
        }
    }

    #[test]
    fn test_decision_table() {
        assert_eq!(decide(&state(true, false, false)), Strategy::Direct);
        assert_eq!(decide(&state(true, false, true)), Strategy::Dual);
        assert_eq!(decide(&state(false, false, true)), Strategy::HostRelay);
        assert_eq!(decide(&state(true, true, false)), Strategy::HostingSelf);
        assert_eq!(decide(&state(false, true, false)), Strategy::HostingSelf);
        assert_eq!(decide(&state(false, false, false)), Strategy::Fallback);
    }

    #[test]
    fn test_host_link_without_internet_never_falls_to_queue() {
        // The §8 property: a reachable host always wins over full offline
        // storage.
        let s = state(false, false, true);
        assert_eq!(decide(&s), Strategy::HostRelay);
        assert_ne!(decide(&s), Strategy::Fallback);
    }

    #[test]
    fn test_hosting_dominates_other_flags() {
        assert_eq!(decide(&state(true, true, true)), Strategy::HostingSelf);
    }

    // Executor behavior (fallback tiers, timeouts, queueing) is covered by
    // the router_integration test with scripted gateways.
}
