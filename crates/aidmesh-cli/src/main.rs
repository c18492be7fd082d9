//! Aidmesh CLI
//!
//! Thin wrapper around aidmesh-core for command-line usage. Runs a
//! single-node setup: an embedded backend store plus the device-side
//! engine, with connectivity supplied by flags so offline behavior is easy
//! to exercise.
//!
//! ## Usage
//!
//! ```bash
//! # Submit a report (offline: lands in the queue)
//! aidmesh report submit --kind fire --lat 37.77 --lon -122.42 \
//!     --place "pier 7" "smoke from the second floor"
//!
//! # Submit with backend reachability
//! aidmesh --online report submit --kind medical --lat 37.8 --lon -122.4 \
//!     --place "ferry building" "person collapsed"
//!
//! # Submit through a group host
//! aidmesh --host-ticket aidmesh-host:... report submit --kind fire ...
//!
//! # List reports (canonical plus pending local copies)
//! aidmesh --online report list
//!
//! # Update a report's status
//! aidmesh --online report status <report_id> acknowledged
//!
//! # Inspect and drain the offline queue
//! aidmesh queue list
//! aidmesh --online queue drain
//! aidmesh queue clear
//!
//! # Host a relay group (prints the ticket peers connect with)
//! aidmesh host run
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use aidmesh_core::{
    Backend, ConnectivityState, Disposition, GroupId, HostTicket, LocalBackendGateway, Location,
    LocalId, ManualProbe, MeshHostClient, ReportEngine, ReportId, ReportRef, ReportStatus,
    ReportType, Role, Storage, SyncConfig, UserId,
};

/// Aidmesh - incident report sync over mesh relays
#[derive(Parser)]
#[command(name = "aidmesh")]
#[command(version = "0.1.0")]
#[command(about = "Aidmesh - incident report sync over mesh relays")]
#[command(
    long_about = "Tracks emergency incident reports across a backend, relay hosts, and \
offline-capable devices. Reports merge by author, type, location, and time; status \
histories converge to one canonical timeline."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.aidmesh/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Treat the backend as reachable over the internet
    #[arg(long, global = true)]
    online: bool,

    /// Connect to a group host using its ticket
    #[arg(long, global = true)]
    host_ticket: Option<String>,

    /// User id submitting operations (default: local)
    #[arg(long, global = true, default_value = "local")]
    user: String,

    /// Role granted to actors on the embedded backend
    #[arg(long, global = true, value_enum, default_value = "responder")]
    role: RoleArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show node information
    Info,

    /// Report operations
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },

    /// Offline queue operations
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Host a relay group
    Host {
        #[command(subcommand)]
        action: HostAction,
    },
}

#[derive(Subcommand)]
enum ReportAction {
    /// Submit a new report
    Submit {
        /// Incident category
        #[arg(long, value_enum)]
        kind: KindArg,
        /// Latitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// Longitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Free-text location description
        #[arg(long, default_value = "")]
        place: String,
        /// Report message
        message: String,
    },

    /// List reports (canonical plus pending local copies)
    List,

    /// Apply a status transition to a report
    Status {
        /// Canonical report id (or a local id for unsynced reports)
        id: String,
        /// New status
        #[arg(value_enum)]
        status: StatusArg,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// List queued operations
    List,
    /// Replay queued operations against whatever is reachable
    Drain,
    /// Destructively clear the queue (refused while entries are unsynced)
    Clear,
}

#[derive(Subcommand)]
enum HostAction {
    /// Run as a relay host until interrupted
    Run {
        /// Group id (base58); a fresh group is created when omitted
        #[arg(long)]
        group: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Medical,
    Fire,
    Earthquake,
    Security,
    Accident,
    Other,
}

impl From<KindArg> for ReportType {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Medical => ReportType::Medical,
            KindArg::Fire => ReportType::Fire,
            KindArg::Earthquake => ReportType::Earthquake,
            KindArg::Security => ReportType::Security,
            KindArg::Accident => ReportType::Accident,
            KindArg::Other => ReportType::Other,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Reported,
    Acknowledged,
    Responding,
    Resolved,
}

impl From<StatusArg> for ReportStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Reported => ReportStatus::Reported,
            StatusArg::Acknowledged => ReportStatus::Acknowledged,
            StatusArg::Responding => ReportStatus::Responding,
            StatusArg::Resolved => ReportStatus::Resolved,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Reporter,
    Responder,
    Coordinator,
}

impl From<RoleArg> for Role {
    fn from(r: RoleArg) -> Self {
        match r {
            RoleArg::Reporter => Role::Reporter,
            RoleArg::Responder => Role::Responder,
            RoleArg::Coordinator => Role::Coordinator,
        }
    }
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".aidmesh")
        .join("data")
}

fn parse_report_ref(id: &str) -> Result<ReportRef> {
    // Ids render as `report_<ulid>` / `local_<ulid>`; a bare ULID is taken
    // as canonical.
    if let Some(rest) = id.strip_prefix("local_") {
        let local_id = LocalId::from_string(rest).map_err(|e| anyhow!("invalid id: {}", e))?;
        return Ok(ReportRef::Local(local_id));
    }
    let rest = id.strip_prefix("report_").unwrap_or(id);
    let report_id = ReportId::from_string(rest).map_err(|e| anyhow!("invalid id: {}", e))?;
    Ok(ReportRef::Canonical(report_id))
}

fn describe(disposition: &Disposition) -> String {
    match disposition {
        Disposition::Synced(report) => format!("synced as {}", report.id),
        Disposition::Relayed(report) => format!(
            "relayed to host (temp id {})",
            report
                .origin_id
                .map(|l| l.to_string())
                .unwrap_or_else(|| "?".to_string())
        ),
        Disposition::Hosted(report) => format!("hosted for the group as {}", report.id),
        Disposition::Queued { sequence } => {
            format!("queued offline at position {}", sequence)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);

    // Embedded backend: a single-node setup keeps the backend store next to
    // the device data. Deployments with a remote backend swap the gateway.
    let backend_storage = Storage::new(data_dir.join("backend.redb"))
        .context("failed to open backend store")?;
    let backend = Arc::new(Backend::new(backend_storage, SyncConfig::default()));
    let gateway = Arc::new(LocalBackendGateway::new(backend, cli.role.into()));

    let probe = Arc::new(ManualProbe::new(ConnectivityState {
        has_internet: cli.online,
        is_hosting: matches!(cli.command, Commands::Host { .. }),
        is_connected_to_host: cli.host_ticket.is_some(),
    }));

    let mut engine = ReportEngine::new(
        data_dir.join("device"),
        UserId::new(cli.user.clone()),
        gateway,
        probe,
        SyncConfig::default(),
    )
    .await?;

    if let Some(ticket_str) = &cli.host_ticket {
        let ticket = HostTicket::decode(ticket_str)?;
        let endpoint = iroh::Endpoint::builder().bind().await?;
        let client = MeshHostClient::from_ticket(endpoint, &ticket, &SyncConfig::default())?;
        engine.attach_host(Some(Arc::new(client)));
    }

    match cli.command {
        Commands::Info => {
            let connectivity = engine.connectivity().await;
            println!("Aidmesh v0.1.0");
            println!();
            println!("Data directory: {}", engine.data_dir().display());
            println!("User: {}", cli.user);
            println!("Connectivity: {}", connectivity);
            println!("Queued operations: {}", engine.queue_len()?);
        }

        Commands::Report { action } => match action {
            ReportAction::Submit {
                kind,
                lat,
                lon,
                place,
                message,
            } => {
                let outcome = engine
                    .submit_report(kind.into(), Location::new(lat, lon, place), message)
                    .await?;
                println!(
                    "Submitted via {:?}: {}",
                    outcome.strategy,
                    describe(&outcome.disposition)
                );
            }

            ReportAction::List => {
                let reports = engine.reports().await?;
                if reports.is_empty() {
                    println!("No reports.");
                }
                for report in reports {
                    let marker = if report.synced_to_backend { " " } else { "~" };
                    println!(
                        "{}{}  {:<10}  {:<12}  {}",
                        marker, report.id, report.kind, report.status, report.message
                    );
                    for event in &report.status_history {
                        println!(
                            "    {} by {} at {}",
                            event.status,
                            event.actor,
                            chrono::DateTime::from_timestamp_millis(event.timestamp)
                                .map(|t| t.to_rfc3339())
                                .unwrap_or_else(|| event.timestamp.to_string())
                        );
                    }
                }
            }

            ReportAction::Status { id, status } => {
                let target = parse_report_ref(&id)?;
                let outcome = engine.update_status(target, status.into()).await?;
                println!(
                    "Update via {:?}: {}",
                    outcome.strategy,
                    describe(&outcome.disposition)
                );
            }
        },

        Commands::Queue { action } => match action {
            QueueAction::List => {
                let count = engine.queue_len()?;
                if count == 0 {
                    println!("Queue is empty.");
                } else {
                    println!("{} operation(s) pending replay.", count);
                }
            }

            QueueAction::Drain => {
                let drained = engine.drain_now().await?;
                println!("Drained {} operation(s); {} left.", drained, engine.queue_len()?);
            }

            QueueAction::Clear => match engine.clear_local() {
                Ok(()) => println!("Local queue cleared."),
                Err(e) => return Err(anyhow!("{}", e)),
            },
        },

        Commands::Host { action } => match action {
            HostAction::Run { group } => {
                let group = match group {
                    Some(s) => GroupId::from_base58(&s)
                        .map_err(|e| anyhow!("invalid group id: {}", e))?,
                    None => GroupId::new(),
                };

                let ticket = engine.start_hosting(group).await?;
                println!("Hosting group {}", group.to_base58());
                println!("Ticket: {}", ticket.encode()?);
                println!("Press Ctrl-C to stop.");

                tokio::signal::ctrl_c().await?;
                engine.stop_hosting().await;
                println!("Host stopped.");
            }
        },
    }

    engine.shutdown().await;
    Ok(())
}
