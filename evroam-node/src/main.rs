//! EVROAM Node - CLI for the roaming synchronization adapter
//!
//! Publishes the local charging infrastructure described by a JSON state
//! file to a roaming network exchange.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults
//! evroam-node --id rs-001 --name "Depot North" --state-file state.json
//!
//! # Connect to a specific exchange, faster status updates
//! evroam-node --id rs-001 --name "Depot North" --state-file state.json \
//!     --remote-url ws://roaming.example.net/exchange --status-interval-secs 5
//!
//! # Publish only two facilities, hide a connector under maintenance
//! evroam-node --id rs-001 --name "Depot North" --state-file state.json \
//!     --include-facility F1 --include-facility F2 --exclude-connector F1*3
//! ```
//!
//! # State File
//!
//! ```json
//! { "facilities": [...], "statuses": [...], "sessions": [...] }
//! ```
//!
//! The file is re-read on every tick, so editing it drives the adapter.

mod observer;
mod source;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use evroam_sync::{AdapterBuilder, DisableFlags, WsExchange, WsExchangeConfig};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::source::FileSource;

/// EV roaming synchronization adapter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Adapter identity on the roaming network
    #[arg(short, long)]
    id: String,

    /// Display name
    #[arg(short, long)]
    name: String,

    /// Optional description
    #[arg(short, long)]
    description: Option<String>,

    /// Roaming exchange WebSocket URL
    #[arg(long, default_value = "ws://localhost:9210/roaming")]
    remote_url: String,

    /// JSON file holding the local state
    #[arg(short, long)]
    state_file: PathBuf,

    /// Facility data interval
    #[arg(long, default_value = "300")]
    facility_interval_secs: u64,

    /// Connector status interval
    #[arg(long, default_value = "10")]
    status_interval_secs: u64,

    /// Session records interval
    #[arg(long, default_value = "60")]
    session_interval_secs: u64,

    /// Bound on every remote call
    #[arg(long, default_value = "30")]
    request_timeout_secs: u64,

    #[arg(long)]
    disable_facility: bool,

    #[arg(long)]
    disable_status: bool,

    #[arg(long)]
    disable_session: bool,

    /// Disable immediate sending of concluded sessions
    #[arg(long)]
    disable_session_send: bool,

    /// Publish only these facilities (can be repeated)
    #[arg(long)]
    include_facility: Vec<String>,

    /// Never publish these connectors (can be repeated)
    #[arg(long)]
    exclude_connector: Vec<String>,

    /// Operator for records that carry none
    #[arg(long, requires = "default_operator_name")]
    default_operator_id: Option<String>,

    #[arg(long, requires = "default_operator_id")]
    default_operator_name: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Print banner
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║           EVROAM Node - Roaming Synchronization              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Adapter:  {:<50} ║", truncate(&args.id, 50));
    println!("║  Name:     {:<50} ║", truncate(&args.name, 50));
    println!("║  Remote:   {:<50} ║", truncate(&args.remote_url, 50));
    println!("║  State:    {:<50} ║", truncate(&args.state_file.display().to_string(), 50));
    println!(
        "║  Ticks:    {:<50} ║",
        format!(
            "facility {}s, status {}s, session {}s",
            args.facility_interval_secs, args.status_interval_secs, args.session_interval_secs
        )
    );
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    // Build configuration
    let mut builder = AdapterBuilder::new(&args.id, &args.name)
        .intervals(
            Duration::from_secs(args.facility_interval_secs),
            Duration::from_secs(args.status_interval_secs),
            Duration::from_secs(args.session_interval_secs),
        )
        .request_timeout(Duration::from_secs(args.request_timeout_secs))
        .disable(DisableFlags {
            facility: args.disable_facility,
            status: args.disable_status,
            session: args.disable_session,
            session_send: args.disable_session_send,
        });

    if let Some(description) = &args.description {
        builder = builder.description(description);
    }
    if !args.include_facility.is_empty() {
        info!("Publishing facilities: {}", args.include_facility.join(", "));
        let included = args.include_facility.clone();
        builder = builder.include_facility(move |id| included.iter().any(|f| f == id.as_str()));
    }
    if !args.exclude_connector.is_empty() {
        info!("Excluding connectors: {}", args.exclude_connector.join(", "));
        let excluded = args.exclude_connector.clone();
        builder = builder.include_connector(move |id| !excluded.iter().any(|c| c == id.as_str()));
    }
    if let (Some(id), Some(name)) = (&args.default_operator_id, &args.default_operator_name) {
        builder = builder.default_operator(id.as_str(), name.as_str());
    }

    // Remote exchange
    let (exchange, connection) = WsExchange::new(WsExchangeConfig::new(&args.remote_url, &args.id));
    tokio::spawn(async move {
        if let Err(e) = connection.run().await {
            error!("Exchange connection stopped: {}", e);
        }
    });

    let source = Arc::new(FileSource::new(&args.state_file));
    let adapter = builder.build(source, Arc::new(exchange))?;
    observer::register(&adapter);

    info!("Starting EVROAM adapter...");
    let scheduler = adapter.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    scheduler.shutdown().await;

    Ok(())
}

/// Truncate string with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
