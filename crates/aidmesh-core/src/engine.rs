//! Main ReportEngine - the device-side entry point for Aidmesh
//!
//! ReportEngine wires together Storage, the Offline Mutation Queue, the
//! Submission Router, the connectivity monitor, and (while hosting) the
//! mesh host proxy and its endpoint:
//! - Submit reports and status updates through whichever path is reachable
//! - Drain queued operations when connectivity returns
//! - Host a relay group for peers on the local radio link
//! - Read a reconciled view combining canonical and still-pending copies
//!
//! # Example
//!
//! ```ignore
//! use aidmesh_core::{ReportEngine, ReportType, Location};
//!
//! let mut engine = ReportEngine::new(
//!     "~/.aidmesh/data", user, backend, probe, SyncConfig::default(),
//! ).await?;
//!
//! // Submit through whatever is reachable right now
//! let outcome = engine
//!     .submit_report(ReportType::Fire, Location::new(37.7, -122.4, "pier"), "smoke")
//!     .await?;
//!
//! // Become the group host
//! let ticket = engine.start_hosting(GroupId::new()).await?;
//! println!("share: {}", ticket.encode()?);
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::BackendGateway;
use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityMonitor, ConnectivityProbe};
use crate::error::{ReportError, ReportResult};
use crate::events::EventChannel;
use crate::merge;
use crate::mesh::client::HostGateway;
use crate::mesh::endpoint::HostEndpoint;
use crate::mesh::proxy::HostProxy;
use crate::queue::{OfflineQueue, QueueDrainer};
use crate::router::{SubmissionOutcome, SubmissionRouter};
use crate::storage::Storage;
use crate::ticket::HostTicket;
use crate::types::connectivity::ConnectivityState;
use crate::types::queue::QueueOperation;
use crate::types::report::{Location, NewReport, Report, ReportStatus, ReportType, StatusEvent};
use crate::types::{GroupId, ReportRef, UserId};

/// Device-side engine coordinating submission, queueing, and hosting.
pub struct ReportEngine {
    storage: Storage,
    config: SyncConfig,
    user: UserId,
    backend: Arc<dyn BackendGateway>,
    probe: Arc<dyn ConnectivityProbe>,
    queue: Arc<OfflineQueue>,
    router: Arc<SubmissionRouter>,
    monitor: ConnectivityMonitor,
    drainer: Option<QueueDrainer>,
    events: EventChannel,
    hosting: Option<HostEndpoint>,
    data_dir: PathBuf,
}

impl ReportEngine {
    /// Create an engine with the given data directory.
    ///
    /// Spawns the connectivity monitor and the queue drainer.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Io` if the directory cannot be created.
    /// Returns `ReportError::Database` if storage initialization fails.
    pub async fn new(
        data_dir: impl AsRef<Path>,
        user: UserId,
        backend: Arc<dyn BackendGateway>,
        probe: Arc<dyn ConnectivityProbe>,
        config: SyncConfig,
    ) -> ReportResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        info!(?data_dir, %user, "Initializing ReportEngine");

        std::fs::create_dir_all(&data_dir)?;
        let storage = Storage::new(data_dir.join("aidmesh.redb"))?;

        let queue = Arc::new(OfflineQueue::new(storage.clone()));
        let router = Arc::new(SubmissionRouter::new(
            probe.clone(),
            backend.clone(),
            queue.clone(),
            storage.clone(),
            config.clone(),
        ));

        let monitor = ConnectivityMonitor::spawn(probe.clone(), config.poll_interval);
        let drainer = QueueDrainer::spawn(
            queue.clone(),
            router.clone(),
            config.clone(),
            monitor.subscribe(),
        );

        Ok(Self {
            storage,
            config,
            user,
            backend,
            probe,
            queue,
            router,
            monitor,
            drainer: Some(drainer),
            events: EventChannel::new(),
            hosting: None,
            data_dir,
        })
    }

    /// The data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The device-local event channel (group-scoped notices while hosting).
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    /// The current connectivity snapshot, re-read from the probe.
    pub async fn connectivity(&self) -> ConnectivityState {
        self.monitor.current().await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Submission
    // ═══════════════════════════════════════════════════════════════════════

    /// Create and submit a report authored by this device's user.
    pub async fn submit_report(
        &self,
        kind: ReportType,
        location: Location,
        message: impl Into<String>,
    ) -> ReportResult<SubmissionOutcome> {
        let payload = NewReport::new(self.user.clone(), kind, location, message);
        self.router.submit_report(payload).await
    }

    /// Submit a prepared payload (replays, payloads carrying offline
    /// transitions).
    pub async fn submit_payload(&self, payload: NewReport) -> ReportResult<SubmissionOutcome> {
        self.router.submit_report(payload).await
    }

    /// Apply a status transition as this device's user.
    pub async fn update_status(
        &self,
        target: ReportRef,
        status: ReportStatus,
    ) -> ReportResult<SubmissionOutcome> {
        let event = StatusEvent::new(
            status,
            self.user.clone(),
            chrono::Utc::now().timestamp_millis(),
        );
        self.router.submit_update(target, event).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queue Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Number of operations waiting in the offline queue.
    pub fn queue_len(&self) -> ReportResult<usize> {
        self.queue.len()
    }

    /// Run one drain pass right now (the background drainer also runs on
    /// its own timer and on connectivity transitions).
    pub async fn drain_now(&self) -> ReportResult<usize> {
        QueueDrainer::drain(&self.queue, &self.router, &self.config).await
    }

    /// Destructively clear local offline storage.
    ///
    /// Refused while any queue entry remains unsynced.
    pub fn clear_local(&self) -> ReportResult<()> {
        self.queue.clear()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Host Link
    // ═══════════════════════════════════════════════════════════════════════

    /// Attach a gateway for a reachable group host (set `None` when the
    /// radio link drops).
    pub fn attach_host(&self, host: Option<Arc<dyn HostGateway>>) {
        self.router.set_host(host);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Hosting
    // ═══════════════════════════════════════════════════════════════════════

    /// Start hosting a relay group: bind the endpoint, register the relay
    /// protocol, and route this device's own submissions through its
    /// hosted cache.
    ///
    /// Returns the shareable ticket peers use to connect.
    pub async fn start_hosting(&mut self, group: GroupId) -> ReportResult<HostTicket> {
        if self.hosting.is_some() {
            return Err(ReportError::InvalidOperation(
                "already hosting a group".to_string(),
            ));
        }

        let proxy = Arc::new(HostProxy::new(
            group,
            self.storage.clone(),
            self.probe.clone(),
            self.backend.clone(),
            self.config.clone(),
            self.events.clone(),
        ));

        let secret_key = match self.storage.load_endpoint_secret_key()? {
            Some(key_bytes) => iroh::SecretKey::from(key_bytes),
            None => {
                let secret_key = iroh::SecretKey::generate(&mut rand::rng());
                let key_bytes: [u8; 32] = secret_key.to_bytes();
                self.storage.save_endpoint_secret_key(&key_bytes)?;
                secret_key
            }
        };

        let endpoint = HostEndpoint::bind(proxy.clone(), &self.config, Some(secret_key)).await?;
        let ticket = endpoint.ticket()?;

        self.router.set_own_proxy(Some(proxy));
        self.hosting = Some(endpoint);
        info!(%group, "Hosting started");
        Ok(ticket)
    }

    /// Stop hosting: close the endpoint and detach the proxy. Hosted cache
    /// records stay durable and keep syncing to the backend.
    pub async fn stop_hosting(&mut self) {
        if let Some(endpoint) = self.hosting.take() {
            self.router.set_own_proxy(None);
            endpoint.shutdown().await;
            info!("Hosting stopped");
        }
    }

    /// Whether this device is currently hosting.
    pub fn is_hosting(&self) -> bool {
        self.hosting.is_some()
    }

    /// The current host ticket, if hosting.
    pub fn host_ticket(&self) -> ReportResult<Option<HostTicket>> {
        match &self.hosting {
            Some(endpoint) => Ok(Some(endpoint.ticket()?)),
            None => Ok(None),
        }
    }

    /// Replay unsynced hosted records into the backend (host role).
    pub async fn sync_hosted(&self) -> ReportResult<usize> {
        match &self.hosting {
            Some(endpoint) => endpoint.proxy().sync_to_backend().await,
            None => Ok(0),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reading
    // ═══════════════════════════════════════════════════════════════════════

    /// A reconciled view of reports: the backend's canonical list combined
    /// with still-pending local copies, merged by origin id.
    ///
    /// A queued create whose temp id already maps to a canonical report is
    /// folded into that report; queued status updates are merged into the
    /// view copy so the reader sees its own offline transitions.
    pub async fn reports(&self) -> ReportResult<Vec<Report>> {
        let mut view = match self.backend.list_reports().await {
            Ok(reports) => reports,
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Backend unreachable; reading local copies only");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        // While hosting, the hosted cache is part of this device's view.
        if let Some(endpoint) = &self.hosting {
            let group = endpoint.proxy().group();
            for record in self.storage.list_hosted(&group)? {
                let already = view.iter().any(|r| {
                    r.id == record.report.id
                        || (record.report.origin_id.is_some()
                            && r.origin_id == record.report.origin_id)
                });
                if !already {
                    view.push(record.report);
                }
            }
        }

        for item in self.queue.items()? {
            match &item.operation {
                QueueOperation::Create { payload } => {
                    let canonical = self.storage.lookup_origin(&payload.local_id)?;
                    let already = view.iter().any(|r| {
                        Some(r.id) == canonical || r.origin_id == Some(payload.local_id)
                    });
                    if !already {
                        let mut pending = Report::from_submission(payload);
                        pending.synced_to_backend = false;
                        view.push(pending);
                    }
                }
                QueueOperation::StatusUpdate {
                    target,
                    status,
                    actor,
                    timestamp,
                } => {
                    let event = StatusEvent::new(*status, actor.clone(), *timestamp);
                    if let Some(slot) = self.view_target_mut(&mut view, *target)? {
                        if let Some(updated) = merge::apply_status_event(slot, event) {
                            *slot = updated;
                        }
                    }
                }
            }
        }

        view.sort_by_key(|r| r.created_at);
        Ok(view)
    }

    fn view_target_mut<'a>(
        &self,
        view: &'a mut [Report],
        target: ReportRef,
    ) -> ReportResult<Option<&'a mut Report>> {
        let found = match target {
            ReportRef::Canonical(id) => view.iter_mut().find(|r| r.id == id),
            ReportRef::Local(local) => {
                let canonical = self.storage.lookup_origin(&local)?;
                view.iter_mut()
                    .find(|r| r.origin_id == Some(local) || Some(r.id) == canonical)
            }
        };
        Ok(found)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Shutdown
    // ═══════════════════════════════════════════════════════════════════════

    /// Stop background tasks and close any host endpoint.
    pub async fn shutdown(mut self) {
        if let Some(drainer) = self.drainer.take() {
            drainer.shutdown();
        }
        if let Some(endpoint) = self.hosting.take() {
            endpoint.shutdown().await;
        }
        self.monitor.shutdown();
        info!("ReportEngine shut down");
    }
}
