//! Aidmesh Core Library
//!
//! Incident report synchronization with offline queueing and mesh host
//! relay.
//!
//! ## Overview
//!
//! Aidmesh tracks emergency incident reports across three cooperating
//! roles: a central backend (source of truth), hosting devices relaying
//! report operations to peers reachable only over a local radio link, and
//! client devices that submit through whichever path is currently
//! reachable, with no guarantee of connectivity, delivery order, or a
//! single submission attempt per report.
//!
//! The core is the report synchronization and conflict-resolution engine:
//!
//! - **Dedup & merge**: independently created copies of the same incident
//!   collapse into one canonical report; status histories from multiple
//!   authors merge into one timeline that only ever moves forward
//! - **Offline mutation queue**: a durable, strictly ordered, at-least-once
//!   log of local operations, drained when connectivity returns
//! - **Mesh host proxy**: a host device mirrors the backend's report
//!   operations for its peer group, serving from its hosted cache while
//!   offline and reconciling with the backend later
//! - **Submission router**: a pure decision table from a connectivity
//!   snapshot to exactly one submission strategy
//!
//! ## Quick Start
//!
//! ```ignore
//! use aidmesh_core::{
//!     Backend, LocalBackendGateway, Location, ManualProbe, ReportEngine,
//!     ReportType, Role, Storage, SyncConfig, UserId,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend_storage = Storage::new("/srv/aidmesh/backend.redb")?;
//!     let backend = Arc::new(Backend::new(backend_storage, SyncConfig::default()));
//!     let gateway = Arc::new(LocalBackendGateway::new(backend, Role::Reporter));
//!
//!     let probe = Arc::new(ManualProbe::default());
//!     let engine = ReportEngine::new(
//!         "~/.aidmesh/data",
//!         UserId::new("u1"),
//!         gateway,
//!         probe,
//!         SyncConfig::default(),
//!     )
//!     .await?;
//!
//!     engine
//!         .submit_report(
//!             ReportType::Fire,
//!             Location::new(37.7749, -122.4194, "pier 7"),
//!             "smoke from the second floor",
//!         )
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod events;
pub mod merge;
pub mod mesh;
pub mod notify;
pub mod queue;
pub mod router;
pub mod session;
pub mod storage;
pub mod ticket;
pub mod types;

// Re-exports
pub use backend::{Backend, BackendGateway, LocalBackendGateway};
pub use config::SyncConfig;
pub use connectivity::{ConnectivityMonitor, ConnectivityProbe, ManualProbe};
pub use engine::ReportEngine;
pub use error::{ReportError, ReportResult};
pub use events::{EventChannel, ReportEvent, EVENT_CHANNEL_CAPACITY};
pub use merge::{DedupKey, MergeOutcome};
pub use mesh::{
    HostEndpoint, HostGateway, HostProxy, LoopbackHostGateway, MeshHostClient, MeshRequest,
    MeshResponse, REPORT_ALPN,
};
pub use queue::{OfflineQueue, QueueDrainer};
pub use router::{decide, Disposition, ReplayOutcome, Strategy, SubmissionOutcome, SubmissionRouter};
pub use session::{Role, Session};
pub use storage::Storage;
pub use ticket::{HostAddrBytes, HostTicket};
pub use types::connectivity::ConnectivityState;
pub use types::hosted::HostedReportRecord;
pub use types::queue::{OfflineQueueItem, QueueOperation};
pub use types::report::{
    Location, NewReport, Report, ReportStatus, ReportType, StatusEvent,
};
pub use types::{GroupId, LocalId, ReportId, ReportRef, UserId};
