//! Host-side relay logic: a local mirror of the backend's report
//! operations for peers reachable only over the radio link.
//!
//! Connectivity is re-read per request. With internet, requests pass
//! through to the real backend and are mirrored into the Hosted Cache;
//! without, the Hosted Cache is the store-of-record and accepted reports
//! are stamped `hosted_in_group = true, synced_to_backend = false`.
//!
//! Duplicate detection uses the same dedup key as the backend, so a report
//! seen both through the mesh and later directly by the backend reconciles
//! wherever the two copies meet.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::backend::BackendGateway;
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityProbe;
use crate::error::{ReportError, ReportResult};
use crate::events::{EventChannel, ReportEvent};
use crate::merge::{self, MergeOutcome};
use crate::mesh::protocol::{MeshRequest, MeshResponse, MeshWireRequest, MeshWireResponse};
use crate::storage::Storage;
use crate::types::hosted::HostedReportRecord;
use crate::types::report::{NewReport, Report, ReportStatus, StatusEvent};
use crate::types::{GroupId, ReportRef};

/// The host's relay service. Transport-agnostic: [`handle`](Self::handle)
/// maps request bytes to response bytes and never panics on bad input.
pub struct HostProxy {
    group: GroupId,
    storage: Storage,
    probe: Arc<dyn ConnectivityProbe>,
    backend: Arc<dyn BackendGateway>,
    config: SyncConfig,
    events: EventChannel,
}

impl HostProxy {
    /// Create a proxy for the given group.
    pub fn new(
        group: GroupId,
        storage: Storage,
        probe: Arc<dyn ConnectivityProbe>,
        backend: Arc<dyn BackendGateway>,
        config: SyncConfig,
        events: EventChannel,
    ) -> Self {
        Self {
            group,
            storage,
            probe,
            backend,
            config,
            events,
        }
    }

    /// The group this proxy serves.
    pub fn group(&self) -> GroupId {
        self.group
    }

    /// The event channel group-scoped notices are emitted on.
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    /// Handle one raw request, returning the raw response.
    ///
    /// Malformed input is answered with an error response; the proxy keeps
    /// serving other requests either way.
    pub async fn handle(&self, bytes: &[u8]) -> Vec<u8> {
        let response = match MeshWireRequest::decode(bytes) {
            Ok(wire) => {
                let request = wire.into_inner();
                debug!(request = request.label(), "Mesh request received");
                match self.dispatch(request).await {
                    Ok(resp) => resp,
                    Err(e) => {
                        warn!(error = %e, "Mesh request failed");
                        MeshResponse::Error {
                            message: e.to_string(),
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Malformed mesh request");
                MeshResponse::Error {
                    message: format!("malformed request: {}", e),
                }
            }
        };

        match MeshWireResponse::new(response).encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                // Encoding a response should not fail; answer with nothing
                // rather than taking the proxy down.
                error!(error = %e, "Failed to encode mesh response");
                Vec::new()
            }
        }
    }

    async fn dispatch(&self, request: MeshRequest) -> ReportResult<MeshResponse> {
        match request {
            MeshRequest::SubmitReport { payload } => {
                let report = self.submit(payload).await?;
                Ok(MeshResponse::Report { report })
            }
            MeshRequest::ListReports => {
                let reports = self.list().await?;
                Ok(MeshResponse::Reports { reports })
            }
            MeshRequest::UpdateStatus { target, event } => {
                let report = self.update_status(target, event).await?;
                Ok(MeshResponse::Report { report })
            }
        }
    }

    /// Submit a report on behalf of a peer.
    ///
    /// Online: pass through to the backend and mirror the canonical record.
    /// Offline (or backend transiently failing): accept into the Hosted
    /// Cache, deduplicating against records already relayed for the group.
    pub async fn submit(&self, payload: NewReport) -> ReportResult<Report> {
        payload.validate()?;

        let state = self.probe.current().await;
        if state.has_internet {
            match self.backend.submit_report(payload.clone()).await {
                Ok(report) => {
                    self.storage
                        .record_origin(&payload.local_id, &report.id)?;
                    let record = HostedReportRecord::passthrough(report.clone(), self.group);
                    self.storage.save_hosted(&record)?;
                    self.events.emit(ReportEvent::GroupChanged {
                        group: self.group,
                        report: ReportRef::Canonical(report.id),
                    });
                    return Ok(report);
                }
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Backend pass-through failed; serving from hosted cache");
                }
                Err(e) => return Err(e),
            }
        }

        self.submit_offline(payload)
    }

    fn submit_offline(&self, payload: NewReport) -> ReportResult<Report> {
        let records = self.storage.list_hosted(&self.group)?;
        let existing = records
            .iter()
            .find(|rec| merge::is_duplicate(&rec.report, &payload, &self.config));

        let (record, changed) = match existing {
            Some(rec) => match merge::merge_submission(&rec.report, &payload) {
                MergeOutcome::Merged(report) => {
                    let mut updated = rec.clone();
                    updated.report = report;
                    (updated, true)
                }
                MergeOutcome::Unchanged(_) => {
                    debug!(key = %rec.key(), "Hosted duplicate suppressed");
                    (rec.clone(), false)
                }
                MergeOutcome::Inserted(_) => unreachable!("merge of a matched duplicate"),
            },
            None => {
                let mut report = Report::from_submission(&payload);
                report.synced_to_backend = false;
                info!(origin = %payload.local_id, "Report hosted for offline group");
                (HostedReportRecord::offline(report, self.group), true)
            }
        };

        if changed {
            self.storage.save_hosted(&record)?;
            self.events.emit(ReportEvent::GroupChanged {
                group: self.group,
                report: record
                    .report
                    .origin_id
                    .filter(|_| !record.synced_to_backend)
                    .map(ReportRef::Local)
                    .unwrap_or(ReportRef::Canonical(record.report.id)),
            });
        }
        Ok(record.report)
    }

    /// List the group's reports: the backend's view when online, the
    /// Hosted Cache otherwise.
    pub async fn list(&self) -> ReportResult<Vec<Report>> {
        let state = self.probe.current().await;
        if state.has_internet {
            match self.backend.list_reports().await {
                Ok(reports) => return Ok(reports),
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Backend list failed; serving hosted cache");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(self
            .storage
            .list_hosted(&self.group)?
            .into_iter()
            .map(|rec| rec.report)
            .collect())
    }

    /// Relay a status transition.
    ///
    /// Each update refreshes the Hosted Cache entry and emits a
    /// group-scoped event; when online it is also forwarded to the backend.
    pub async fn update_status(
        &self,
        target: ReportRef,
        event: StatusEvent,
    ) -> ReportResult<Report> {
        let state = self.probe.current().await;

        if state.has_internet {
            match self.backend.update_status(target, event.clone()).await {
                Ok(report) => {
                    self.refresh_hosted(&report)?;
                    self.events.emit(ReportEvent::GroupChanged {
                        group: self.group,
                        report: ReportRef::Canonical(report.id),
                    });
                    return Ok(report);
                }
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Backend status relay failed; applying to hosted cache");
                }
                Err(e) => return Err(e),
            }
        }

        self.update_status_offline(target, event)
    }

    fn update_status_offline(
        &self,
        target: ReportRef,
        event: StatusEvent,
    ) -> ReportResult<Report> {
        let key = self.hosted_key_for(target)?;
        let record = self
            .storage
            .load_hosted(&key)?
            .ok_or_else(|| ReportError::ReportNotFound(key.clone()))?;

        if record.report.status == ReportStatus::Resolved {
            return Err(ReportError::AlreadyResolved(key));
        }

        match merge::apply_status_event(&record.report, event) {
            Some(report) => {
                let mut updated = record;
                updated.report = report.clone();
                // The cache now carries changes the backend has not seen.
                updated.synced_to_backend = false;
                // Record keyed identically; a status change never re-keys.
                self.storage.save_hosted(&updated)?;
                self.events.emit(ReportEvent::GroupChanged {
                    group: self.group,
                    report: target,
                });
                Ok(report)
            }
            None => Ok(record.report),
        }
    }

    /// Replay every unsynced hosted record into the backend.
    ///
    /// Called when the host regains internet. Each record submits under its
    /// origin id with its full accumulated status history, so the backend
    /// merges or inserts exactly as if the peer had reached it directly.
    /// Returns the number of records now synced.
    pub async fn sync_to_backend(&self) -> ReportResult<usize> {
        let pending = self.storage.unsynced_hosted(&self.group)?;
        let mut synced = 0usize;

        for record in pending {
            let old_key = record.key();
            let origin = record.report.origin_id.ok_or_else(|| {
                ReportError::InvalidOperation(format!(
                    "hosted record {} has no origin id",
                    old_key
                ))
            })?;

            let payload = NewReport {
                local_id: origin,
                user: record.report.user.clone(),
                kind: record.report.kind,
                location: record.report.location.clone(),
                message: record.report.message.clone(),
                created_at: record.report.created_at,
                seed_history: record.report.status_history.clone(),
            };

            match self.backend.submit_report(payload).await {
                Ok(report) => {
                    self.storage.record_origin(&origin, &report.id)?;
                    let mut updated = record;
                    updated.report = report;
                    updated.synced_to_backend = true;
                    updated.report.synced_to_backend = true;
                    self.storage.replace_hosted(&old_key, &updated)?;
                    synced += 1;
                    info!(origin = %origin, id = %updated.report.id, "Hosted record synced");
                }
                Err(e) if e.is_transient() => {
                    // Connectivity flapped mid-sync; the rest stays queued.
                    warn!(error = %e, "Hosted sync interrupted");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(synced)
    }

    fn refresh_hosted(&self, report: &Report) -> ReportResult<()> {
        let key = report.id.to_string_repr();
        if let Some(mut record) = self.storage.load_hosted(&key)? {
            record.report = report.clone();
            self.storage.save_hosted(&record)?;
        }
        Ok(())
    }

    fn hosted_key_for(&self, target: ReportRef) -> ReportResult<String> {
        match target {
            ReportRef::Canonical(id) => Ok(id.to_string_repr()),
            ReportRef::Local(local) => {
                // A local ref may already have a canonical twin on this host
                match self.storage.lookup_origin(&local)? {
                    Some(canonical) => Ok(canonical.to_string_repr()),
                    None => Ok(local.to_string_repr()),
                }
            }
        }
    }
}
