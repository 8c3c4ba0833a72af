//! sriov-flowmgrd - SR-IOV Static Flow Manager
//!
//! Entry point for binding and deleting ports against a control-plane
//! record snapshot.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use sdn_flow_common::{FlowMgrError, FlowPusher, StaticFlowClient, StaticFlowEntry};
use sriov_flowmgrd::{
    BindOutcome, BindRequest, FlowMgr, FlowMgrConfig, NetworkSegment, SnapshotRecords,
    TopologyStore, DEFAULT_CONFIG_FILE,
};

/// SR-IOV static flow manager for a single SDN switch
#[derive(Parser, Debug)]
#[command(name = "sriov-flowmgrd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// SDN controller host (overrides the configuration file)
    #[arg(long)]
    server: Option<String>,

    /// SDN controller REST port (overrides the configuration file)
    #[arg(long)]
    port: Option<u16>,

    /// Switch wiring file (overrides the configuration file)
    #[arg(short = 't', long)]
    topology: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct PortArgs {
    /// Network id
    #[arg(short = 'n', long)]
    network: String,

    /// Port id
    #[arg(short = 'p', long = "port-id")]
    port_id: String,

    /// JSON snapshot of the control-plane port records
    #[arg(short = 'r', long)]
    records: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bind a port and push the network's flows
    Bind {
        #[command(flatten)]
        port: PortArgs,

        /// JSON list of candidate network segments
        #[arg(long)]
        segments: Option<PathBuf>,

        /// Agent device mapping, as physnet:interface (repeatable)
        #[arg(long = "device-mapping")]
        device_mappings: Vec<String>,
    },
    /// Delete a port's flows and reconnect the remaining ports
    Delete {
        #[command(flatten)]
        port: PortArgs,
    },
    /// Print the rules a bind would push, without contacting the controller
    Plan {
        #[command(flatten)]
        port: PortArgs,
    },
    /// List the static flows installed on the switch
    Flows,
    /// Load and validate the switch wiring file
    CheckTopology,
}

/// Initializes tracing/logging subsystem
fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

fn load_config(args: &Args) -> Result<FlowMgrConfig> {
    let mut config = FlowMgrConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    if let Some(server) = &args.server {
        config.controller.server = server.clone();
    }
    if let Some(port) = args.port {
        config.controller.port = port;
    }
    if let Some(topology) = &args.topology {
        config.topology.switch_connections_file_path = topology.display().to_string();
    }

    config.validate()?;
    Ok(config)
}

fn client(config: &FlowMgrConfig) -> Result<StaticFlowClient> {
    let client = StaticFlowClient::new(
        config.controller.server.clone(),
        config.controller.port,
        config.timeout(),
    )?
    .with_base_path(config.controller.base_path.clone());
    Ok(client)
}

fn flow_mgr(config: &FlowMgrConfig, records: &Path) -> Result<FlowMgr> {
    let topology = TopologyStore::load(&config.topology.switch_connections_file_path)?;
    let records = SnapshotRecords::load(records)
        .with_context(|| format!("loading port records from {}", records.display()))?;

    Ok(FlowMgr::new(
        Arc::new(topology),
        Arc::new(client(config)?),
        Arc::new(records),
    )
    .with_binding_config(config.binding.clone()))
}

fn load_segments(path: &Path) -> Result<Vec<NetworkSegment>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading segments from {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn parse_device_mappings(mappings: &[String]) -> Result<Option<HashMap<String, String>>> {
    if mappings.is_empty() {
        return Ok(None);
    }

    let mut parsed = HashMap::new();
    for mapping in mappings {
        let Some((physnet, interface)) = mapping.split_once(':') else {
            bail!("invalid device mapping '{}', expected physnet:interface", mapping);
        };
        parsed.insert(physnet.to_string(), interface.to_string());
    }
    Ok(Some(parsed))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_failure(e: &anyhow::Error) {
    error!("{:#}", e);

    let Some(err) = e.downcast_ref::<FlowMgrError>() else {
        return;
    };
    if let FlowMgrError::BatchAborted { completed, ranges, .. } = err {
        error!("Batch stopped after {} flows, ranges {:?}", completed, ranges);
    }
    if err.is_retryable() {
        warn!("Re-running the same command may succeed");
    }
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;

    match args.command {
        Command::Bind {
            port,
            segments,
            device_mappings,
        } => {
            let mgr = flow_mgr(&config, &port.records)?;
            let request = BindRequest {
                network_id: port.network,
                port_id: port.port_id,
                segments: segments.as_deref().map(load_segments).transpose()?.unwrap_or_default(),
                device_mappings: parse_device_mappings(&device_mappings)?,
            };

            let outcome = mgr.bind_port(&request).await?;
            if let BindOutcome::Connected(report) = &outcome {
                info!("Port {} bound, {} flows pushed", request.port_id, report.created);
            }
            print_json(&outcome)
        }
        Command::Delete { port } => {
            let mgr = flow_mgr(&config, &port.records)?;
            let outcome = mgr.delete_port(&port.network, &port.port_id).await?;
            print_json(&outcome)
        }
        Command::Plan { port } => {
            let mgr = flow_mgr(&config, &port.records)?;
            let rules = mgr
                .plan(&BindRequest::new(port.network, port.port_id))
                .await?;
            let entries: Vec<StaticFlowEntry> = rules.iter().map(|rule| rule.to_entry()).collect();
            print_json(&entries)
        }
        Command::Flows => {
            let topology = TopologyStore::load(&config.topology.switch_connections_file_path)?;
            let flows = client(&config)?.list(topology.dpid()).await?;
            print_json(&flows)
        }
        Command::CheckTopology => {
            let topology = TopologyStore::load(&config.topology.switch_connections_file_path)?;
            info!(
                "Switch {} has {} wired ports",
                topology.dpid(),
                topology.switch().ports.len()
            );
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("--- Starting sriov-flowmgrd ---");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_failure(&e);
            ExitCode::FAILURE
        }
    }
}
