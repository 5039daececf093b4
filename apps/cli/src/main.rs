//! `capsule` command-line entry point.
//!
//! A thin client: every subcommand other than `start` serializes one
//! [`ControlRequest`], sends it over [`IpcClient`], and prints the
//! [`ControlResponse`] that comes back. `start` is the one command that does
//! not talk to a running daemon — it spawns `capsule-daemon` as a detached
//! child process, since the CLI and daemon are separate binaries.

use std::path::PathBuf;
use std::process::{Command as ProcessCommand, Stdio};

use anyhow::{bail, Context, Result};
use capsule_control::{ControlRequest, ControlResponse};
use capsule_ipc_client::{IpcClient, IpcError};
use capsule_settings::Config;
use clap::{Parser, Subcommand};

/// Capsule node operator CLI.
#[derive(Parser)]
#[command(name = "capsule")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Control socket path, overriding the configured default.
    #[arg(long)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node daemon in the background.
    Start,
    /// Report lockdown/airlock state and live peer/session counts.
    Status,
    /// List active entries in the local peer table.
    Peers,
    /// Stop the running daemon.
    Stop,
    /// Record a slash event against a peer.
    Slash {
        did: String,
        reason: String,
        #[arg(default_value_t = 1)]
        severity: u8,
    },
    /// Show the most recent slash events.
    SlashLog {
        #[arg(default_value_t = 20)]
        limit: usize,
    },
    /// Ban a peer by DID.
    Ban { did: String, reason: String },
    /// Lift a ban on a peer.
    Unban { did: String },
    /// Set a peer's trust score in the local trust graph.
    Trust { did: String, score: f64 },
    /// List federation sessions and their state.
    Sessions,
    /// Show routing-table bucket occupancy.
    Dht,
    /// Show trust-graph vertex and edge counts.
    QvlQuery,
    /// Print this node's identity (hex node id).
    Identity,
    /// Engage admission lockdown: stop accepting new sessions.
    Lockdown,
    /// Lift admission lockdown.
    Unlock,
    /// Set the graded airlock admission state.
    Airlock {
        #[arg(value_parser = ["open", "restricted", "closed"])]
        state: String,
    },
    /// Show the total known-node count in the routing table.
    Topology,
    /// Enable or disable relaying and set its trust threshold.
    RelayControl {
        #[arg(long)]
        enable: bool,
        #[arg(long, default_value_t = 0.5)]
        threshold: f64,
    },
    /// Show relay forwarding counters.
    RelayStats,
    /// Send a message to a peer over a one-hop relay circuit.
    RelaySend { target: String, message: String },
}

#[tokio::main]
async fn main() {
    capsule_logging::init("info");
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(exit_code_for(&e));
    }
}

/// Maps an error to the exit code contract: connection failures are `1`,
/// requests the daemon understood but rejected are `2`.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<IpcError>() {
        Some(IpcError::DaemonError(_)) => 2,
        Some(_) => 1,
        None => 1,
    }
}

async fn run(cli: Cli) -> Result<()> {
    if matches!(cli.command, Commands::Start) {
        return start().await;
    }

    let client = IpcClient::new(socket_path(&cli.socket));

    match cli.command {
        Commands::Start => unreachable!("handled above"),
        Commands::Status => {
            let response = client.send(ControlRequest::Status).await?;
            print_status(response)
        }
        Commands::Peers => {
            let response = client.send(ControlRequest::Peers).await?;
            print_peers(response)
        }
        Commands::Stop => {
            client.send(ControlRequest::Shutdown).await?;
            println!("shutdown requested");
            Ok(())
        }
        Commands::Slash { did, reason, severity } => {
            client.send(ControlRequest::Slash { did, reason, severity }).await?;
            println!("slash recorded");
            Ok(())
        }
        Commands::SlashLog { limit } => {
            let response = client.send(ControlRequest::SlashLog { limit }).await?;
            print_slash_log(response)
        }
        Commands::Ban { did, reason } => {
            client.send(ControlRequest::Ban { did, reason }).await?;
            println!("peer banned");
            Ok(())
        }
        Commands::Unban { did } => {
            client.send(ControlRequest::Unban { did }).await?;
            println!("ban lifted");
            Ok(())
        }
        Commands::Trust { did, score } => {
            client.send(ControlRequest::Trust { did, score }).await?;
            println!("trust score updated");
            Ok(())
        }
        Commands::Sessions => {
            let response = client.send(ControlRequest::Sessions).await?;
            print_sessions(response)
        }
        Commands::Dht => {
            let response = client.send(ControlRequest::Dht).await?;
            print_dht(response)
        }
        Commands::QvlQuery => {
            let response = client.send(ControlRequest::QvlQuery).await?;
            print_qvl_query(response)
        }
        Commands::Identity => {
            let response = client.send(ControlRequest::Identity).await?;
            print_identity(response)
        }
        Commands::Lockdown => {
            client.send(ControlRequest::Lockdown).await?;
            println!("lockdown engaged");
            Ok(())
        }
        Commands::Unlock => {
            client.send(ControlRequest::Unlock).await?;
            println!("lockdown lifted");
            Ok(())
        }
        Commands::Airlock { state } => {
            client.send(ControlRequest::Airlock { state: state.clone() }).await?;
            println!("airlock set to {state}");
            Ok(())
        }
        Commands::Topology => {
            let response = client.send(ControlRequest::Topology).await?;
            print_topology(response)
        }
        Commands::RelayControl { enable, threshold } => {
            client.send(ControlRequest::RelayControl { enable, threshold }).await?;
            println!("relay policy updated");
            Ok(())
        }
        Commands::RelayStats => {
            let response = client.send(ControlRequest::RelayStats).await?;
            print_relay_stats(response)
        }
        Commands::RelaySend { target, message } => {
            client.send(ControlRequest::RelaySend { target, message }).await?;
            println!("message sent over relay circuit");
            Ok(())
        }
    }
}

fn socket_path(override_path: &Option<PathBuf>) -> PathBuf {
    if let Some(path) = override_path {
        return path.clone();
    }
    Config::load_or_default()
        .map(|c| c.control_socket_path())
        .unwrap_or_else(|_| PathBuf::from("capsule.sock"))
}

/// Spawns `capsule-daemon` as a detached background process, logging to
/// `<data_dir>/capsule-daemon.log`. The daemon manages its own lifetime from
/// there; this command returns as soon as the process is launched.
async fn start() -> Result<()> {
    let config = Config::load_or_default().context("loading configuration")?;
    std::fs::create_dir_all(&config.storage.data_dir)
        .context("creating data directory")?;

    let log_path = config.storage.data_dir.join("capsule-daemon.log");
    let log_file = std::fs::File::create(&log_path).context("opening daemon log file")?;
    let err_file = log_file.try_clone().context("cloning daemon log handle")?;

    let child = ProcessCommand::new("capsule-daemon")
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(err_file))
        .stdin(Stdio::null())
        .spawn()
        .context("failed to launch capsule-daemon (is it on PATH?)")?;

    println!(
        "capsule-daemon started (pid {}), logging to {}",
        child.id(),
        log_path.display()
    );
    Ok(())
}

fn print_status(response: ControlResponse) -> Result<()> {
    match response {
        ControlResponse::Status { lockdown, airlock, federated_sessions, peer_count } => {
            println!("lockdown:           {lockdown}");
            println!("airlock:            {airlock}");
            println!("federated sessions: {federated_sessions}");
            println!("known peers:        {peer_count}");
            Ok(())
        }
        other => unexpected(other),
    }
}

fn print_peers(response: ControlResponse) -> Result<()> {
    match response {
        ControlResponse::Peers { peers } => {
            for peer in peers {
                println!("{}  {}  active={}", peer.short_id, peer.address, peer.active);
            }
            Ok(())
        }
        other => unexpected(other),
    }
}

fn print_sessions(response: ControlResponse) -> Result<()> {
    match response {
        ControlResponse::Sessions { sessions } => {
            for session in sessions {
                println!("{}  {}", session.address, session.state);
            }
            Ok(())
        }
        other => unexpected(other),
    }
}

fn print_dht(response: ControlResponse) -> Result<()> {
    match response {
        ControlResponse::Dht { bucket_counts } => {
            for (prefix_len, count) in bucket_counts.into_iter().enumerate() {
                if count > 0 {
                    println!("bucket {prefix_len}: {count}");
                }
            }
            Ok(())
        }
        other => unexpected(other),
    }
}

fn print_qvl_query(response: ControlResponse) -> Result<()> {
    match response {
        ControlResponse::QvlQuery { vertex_count, edge_count } => {
            println!("vertices: {vertex_count}");
            println!("edges:    {edge_count}");
            Ok(())
        }
        other => unexpected(other),
    }
}

fn print_identity(response: ControlResponse) -> Result<()> {
    match response {
        ControlResponse::Identity { node_id } => {
            println!("{node_id}");
            Ok(())
        }
        other => unexpected(other),
    }
}

fn print_slash_log(response: ControlResponse) -> Result<()> {
    match response {
        ControlResponse::SlashLog { events } => {
            for event in events {
                println!(
                    "{}  {}  severity={}  {}",
                    event.timestamp, event.target_did, event.severity, event.reason
                );
            }
            Ok(())
        }
        other => unexpected(other),
    }
}

fn print_topology(response: ControlResponse) -> Result<()> {
    match response {
        ControlResponse::Topology { total_known_nodes } => {
            println!("total known nodes: {total_known_nodes}");
            Ok(())
        }
        other => unexpected(other),
    }
}

fn print_relay_stats(response: ControlResponse) -> Result<()> {
    match response {
        ControlResponse::RelayStats { packets_forwarded, packets_dropped, sticky_sessions } => {
            println!("packets forwarded: {packets_forwarded}");
            println!("packets dropped:   {packets_dropped}");
            println!("sticky sessions:   {sticky_sessions}");
            Ok(())
        }
        other => unexpected(other),
    }
}

fn unexpected(response: ControlResponse) -> Result<()> {
    bail!("unexpected response from daemon: {response:?}")
}
