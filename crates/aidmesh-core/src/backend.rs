//! Backend ingestion: the source of truth for canonical reports.
//!
//! `Backend` owns the report store and runs every submission through the
//! dedup & merge engine. Ingestion is logically single-writer per dedup
//! key: the lookup-then-write section is serialized so two submissions
//! racing within the same window cannot both insert. Accepted creates and
//! merge-producing updates are broadcast on the event channel and handed to
//! the notification collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::error::{ReportError, ReportResult};
use crate::events::{EventChannel, ReportEvent};
use crate::merge::{self, MergeOutcome};
use crate::notify::{self, LogNotifier, Notification, Notifier};
use crate::session::{Role, Session};
use crate::storage::Storage;
use crate::types::report::{NewReport, Report, ReportStatus, StatusEvent};
use crate::types::{ReportId, ReportRef};

/// The backend's report ingestion service.
pub struct Backend {
    storage: Storage,
    config: SyncConfig,
    events: EventChannel,
    notifier: Arc<dyn Notifier>,
    /// Serializes the lookup-then-write critical section. A racing
    /// submission therefore always sees the other's insert before its own
    /// match query runs, the in-process equivalent of an optimistic
    /// re-query with retry-on-conflict.
    ingest_lock: Mutex<()>,
}

impl Backend {
    /// Create a backend over the given store with a logging notifier.
    pub fn new(storage: Storage, config: SyncConfig) -> Self {
        Self::with_notifier(storage, config, Arc::new(LogNotifier))
    }

    /// Create a backend with a custom notification collaborator.
    pub fn with_notifier(
        storage: Storage,
        config: SyncConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            storage,
            config,
            events: EventChannel::new(),
            notifier,
            ingest_lock: Mutex::new(()),
        }
    }

    /// The event propagation channel for this backend.
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    /// Ingest a submission: validate, find a duplicate within the dedup
    /// window, then merge into it or insert a new canonical report.
    ///
    /// Idempotent: replaying an already-merged submission returns
    /// [`MergeOutcome::Unchanged`] and persists/broadcasts nothing, but the
    /// temp-id mapping is still recorded so the caller learns the canonical
    /// id.
    pub async fn submit(&self, payload: NewReport) -> ReportResult<MergeOutcome> {
        payload.validate()?;

        let _guard = self.ingest_lock.lock().await;

        // Match query runs inside the critical section, immediately before
        // any insert, so a concurrent duplicate is always found.
        let candidates = self
            .storage
            .reports_by_author_kind(&payload.user, payload.kind)?;
        let existing = candidates
            .iter()
            .find(|r| merge::is_duplicate(r, &payload, &self.config));

        let outcome = match existing {
            Some(existing) => merge::merge_submission(existing, &payload),
            None => MergeOutcome::Inserted(Report::from_submission(&payload)),
        };

        match &outcome {
            MergeOutcome::Inserted(report) => {
                self.storage.save_report(report)?;
                self.storage.record_origin(&payload.local_id, &report.id)?;
                info!(id = %report.id, kind = %report.kind, "Report accepted");
                self.events.emit(ReportEvent::Created { id: report.id });
                notify::dispatch_best_effort(
                    self.notifier.as_ref(),
                    Notification::report_created(report),
                );
            }
            MergeOutcome::Merged(report) => {
                self.storage.save_report(report)?;
                self.storage.record_origin(&payload.local_id, &report.id)?;
                info!(id = %report.id, status = %report.status, "Duplicate merged");
                self.events.emit(ReportEvent::Changed { id: report.id });
                notify::dispatch_best_effort(
                    self.notifier.as_ref(),
                    Notification::status_changed(report),
                );
            }
            MergeOutcome::Unchanged(report) => {
                // Suppressed duplicate: nothing persisted, nothing
                // re-broadcast; only the origin mapping is recorded.
                self.storage.record_origin(&payload.local_id, &report.id)?;
                debug!(id = %report.id, "Duplicate suppressed");
            }
        }

        Ok(outcome)
    }

    /// Apply a status transition to a report.
    ///
    /// Rejected when the actor's role does not permit the transition or the
    /// report is already resolved. Re-applying an already-present
    /// (status, actor) pair is an idempotent no-op.
    pub async fn update_status(
        &self,
        target: ReportRef,
        status: ReportStatus,
        session: &Session,
        timestamp: i64,
    ) -> ReportResult<Report> {
        session.authorize_status(status)?;
        let id = self.resolve_ref(target)?;

        let _guard = self.ingest_lock.lock().await;

        let report = self
            .storage
            .load_report(&id)?
            .ok_or_else(|| ReportError::ReportNotFound(id.to_string_repr()))?;

        if report.status == ReportStatus::Resolved {
            return Err(ReportError::AlreadyResolved(id.to_string_repr()));
        }

        let event = StatusEvent::new(status, session.user.clone(), timestamp);
        match merge::apply_status_event(&report, event) {
            Some(updated) => {
                self.storage.save_report(&updated)?;
                info!(id = %updated.id, status = %updated.status, "Status updated");
                self.events.emit(ReportEvent::Changed { id: updated.id });
                notify::dispatch_best_effort(
                    self.notifier.as_ref(),
                    Notification::status_changed(&updated),
                );
                Ok(updated)
            }
            None => {
                debug!(id = %report.id, "Status event already present");
                Ok(report)
            }
        }
    }

    /// Fetch a report by canonical id.
    pub fn get(&self, id: &ReportId) -> ReportResult<Option<Report>> {
        self.storage.load_report(id)
    }

    /// All canonical reports.
    pub fn list(&self) -> ReportResult<Vec<Report>> {
        self.storage.list_reports()
    }

    /// The canonical id a temp id was mapped to, if it has synced.
    pub fn canonical_for(&self, local: &crate::types::LocalId) -> ReportResult<Option<ReportId>> {
        self.storage.lookup_origin(local)
    }

    fn resolve_ref(&self, target: ReportRef) -> ReportResult<ReportId> {
        match target {
            ReportRef::Canonical(id) => Ok(id),
            ReportRef::Local(local) => self
                .storage
                .lookup_origin(&local)?
                .ok_or_else(|| ReportError::ReportNotFound(local.to_string_repr())),
        }
    }
}

/// How a device reaches the backend.
///
/// The in-process [`LocalBackendGateway`] wraps a [`Backend`] directly;
/// deployments with a remote backend implement this over their own
/// transport. Authentication is supplied by the implementation.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// Submit a report; returns the canonical record (inserted or merged).
    async fn submit_report(&self, payload: NewReport) -> ReportResult<Report>;

    /// Apply a status transition on behalf of the event's actor.
    async fn update_status(&self, target: ReportRef, event: StatusEvent) -> ReportResult<Report>;

    /// All canonical reports.
    async fn list_reports(&self) -> ReportResult<Vec<Report>>;
}

/// In-process gateway wrapping a [`Backend`].
///
/// Actors are granted `role` uniformly; a real deployment resolves roles
/// through its authentication collaborator instead.
pub struct LocalBackendGateway {
    backend: Arc<Backend>,
    role: Role,
}

impl LocalBackendGateway {
    /// Wrap a backend, granting every actor the given role.
    pub fn new(backend: Arc<Backend>, role: Role) -> Self {
        Self { backend, role }
    }
}

#[async_trait]
impl BackendGateway for LocalBackendGateway {
    async fn submit_report(&self, payload: NewReport) -> ReportResult<Report> {
        let outcome = self.backend.submit(payload).await?;
        Ok(outcome.report().clone())
    }

    async fn update_status(&self, target: ReportRef, event: StatusEvent) -> ReportResult<Report> {
        let session = Session::new(event.actor.clone(), self.role);
        self.backend
            .update_status(target, event.status, &session, event.timestamp)
            .await
    }

    async fn list_reports(&self) -> ReportResult<Vec<Report>> {
        self.backend.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::report::{Location, ReportType};
    use crate::types::UserId;
    use tempfile::TempDir;

    fn backend() -> (Backend, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path().join("test.redb")).unwrap();
        (Backend::new(storage, SyncConfig::default()), temp_dir)
    }

    fn payload_at(ts: i64) -> NewReport {
        let mut p = NewReport::new(
            UserId::new("u1"),
            ReportType::Fire,
            Location::new(37.7749, -122.4194, "pier 7"),
            "smoke",
        );
        p.created_at = ts;
        p
    }

    #[tokio::test]
    async fn test_submit_inserts_new_report() {
        let (backend, _temp) = backend();
        let outcome = backend.submit(payload_at(1_000_000)).await.unwrap();
        assert!(matches!(outcome, MergeOutcome::Inserted(_)));
        assert_eq!(backend.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_payload() {
        let (backend, _temp) = backend();
        let mut p = payload_at(1_000_000);
        p.user = UserId::new("");
        let err = backend.submit(p).await.unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
        // Never queued, never stored
        assert!(backend.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_pair_yields_one_canonical_either_order() {
        for flip in [false, true] {
            let (backend, _temp) = backend();
            let a = payload_at(1_000_000);
            let b = payload_at(1_010_000);
            let (first, second) = if flip { (b.clone(), a.clone()) } else { (a.clone(), b.clone()) };

            backend.submit(first).await.unwrap();
            backend.submit(second).await.unwrap();

            assert_eq!(backend.list().unwrap().len(), 1, "flip={}", flip);
        }
    }

    #[tokio::test]
    async fn test_replayed_submission_is_idempotent() {
        let (backend, _temp) = backend();
        let p = payload_at(1_000_000);
        backend.submit(p.clone()).await.unwrap();

        let before = backend.list().unwrap();
        let outcome = backend.submit(p).await.unwrap();
        assert!(matches!(outcome, MergeOutcome::Unchanged(_)));

        let after = backend.list().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_offline_replay_merges_acknowledgement() {
        let (backend, _temp) = backend();
        backend.submit(payload_at(1_000_000)).await.unwrap();

        let mut replay = payload_at(1_010_000);
        replay.seed_history.push(StatusEvent::new(
            ReportStatus::Acknowledged,
            UserId::new("u2"),
            1_005_000,
        ));
        let outcome = backend.submit(replay).await.unwrap();

        let report = outcome.report();
        assert_eq!(report.status, ReportStatus::Acknowledged);
        assert_eq!(report.status_history.len(), 2);
        assert_eq!(backend.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_temp_id_maps_to_one_canonical() {
        let (backend, _temp) = backend();
        let p = payload_at(1_000_000);
        let local = p.local_id;
        let outcome = backend.submit(p.clone()).await.unwrap();
        let canonical = outcome.report().id;

        // Replay with the same local id: mapping unchanged
        backend.submit(p).await.unwrap();
        assert_eq!(backend.canonical_for(&local).unwrap(), Some(canonical));
    }

    #[tokio::test]
    async fn test_update_status_on_resolved_is_rejected() {
        let (backend, _temp) = backend();
        let outcome = backend.submit(payload_at(1_000_000)).await.unwrap();
        let id = outcome.report().id;
        let responder = Session::new(UserId::new("r1"), Role::Responder);

        backend
            .update_status(
                ReportRef::Canonical(id),
                ReportStatus::Resolved,
                &responder,
                1_100_000,
            )
            .await
            .unwrap();

        let err = backend
            .update_status(
                ReportRef::Canonical(id),
                ReportStatus::Responding,
                &responder,
                1_200_000,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::AlreadyResolved(_)));

        // No state mutation
        let report = backend.get(&id).unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Resolved);
    }

    #[tokio::test]
    async fn test_update_status_unauthorized_role() {
        let (backend, _temp) = backend();
        let outcome = backend.submit(payload_at(1_000_000)).await.unwrap();
        let id = outcome.report().id;
        let reporter = Session::new(UserId::new("u9"), Role::Reporter);

        let err = backend
            .update_status(
                ReportRef::Canonical(id),
                ReportStatus::Resolved,
                &reporter,
                1_100_000,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_update_status_by_local_ref() {
        let (backend, _temp) = backend();
        let p = payload_at(1_000_000);
        let local = p.local_id;
        backend.submit(p).await.unwrap();

        let session = Session::new(UserId::new("u2"), Role::Reporter);
        let updated = backend
            .update_status(
                ReportRef::Local(local),
                ReportStatus::Acknowledged,
                &session,
                1_050_000,
            )
            .await
            .unwrap();
        assert_eq!(updated.status, ReportStatus::Acknowledged);
    }

    #[tokio::test]
    async fn test_events_emitted_on_create_and_merge_only() {
        let (backend, _temp) = backend();
        let mut rx = backend.events().subscribe();

        let p = payload_at(1_000_000);
        backend.submit(p.clone()).await.unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            ReportEvent::Created { .. }
        ));

        // Exact replay: suppressed duplicate, no event
        backend.submit(p).await.unwrap();
        assert!(rx.try_recv().is_err());

        // Merge-producing replay: one Changed event
        let mut replay = payload_at(1_005_000);
        replay.seed_history.push(StatusEvent::new(
            ReportStatus::Acknowledged,
            UserId::new("u2"),
            1_004_000,
        ));
        backend.submit(replay).await.unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            ReportEvent::Changed { .. }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_one_canonical() {
        let (backend, _temp) = backend();
        let backend = Arc::new(backend);

        let submissions = (0..8).map(|_| {
            let backend = backend.clone();
            let p = payload_at(1_000_000);
            async move { backend.submit(p).await }
        });
        for outcome in futures::future::join_all(submissions).await {
            outcome.unwrap();
        }

        assert_eq!(backend.list().unwrap().len(), 1);
    }
}
