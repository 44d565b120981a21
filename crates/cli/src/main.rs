use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::info;

use wharf_api::{InProcApi, WharfApi};
use wharf_core::{fmt_uid, TransitionEvent, WorkspaceSnapshot, WorkspaceSpecRequest};
use wharf_gateway::KubeGateway;

#[derive(Parser, Debug)]
#[command(name = "wharfctl", version, about = "Wharf workspace CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Workspace namespace
    #[arg(long = "ns", global = true, default_value = "default")]
    namespace: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List user-visible workspaces in the namespace
    Ls,
    /// Fetch one workspace, waiting until it reports a usable status
    Get { name: String },
    /// Create a workspace
    Create {
        name: String,
        /// JSON template file; defaults to an empty template
        #[arg(long = "template")]
        template: Option<PathBuf>,
        /// Create stopped instead of started
        #[arg(long = "stopped", action = ArgAction::SetTrue)]
        stopped: bool,
    },
    /// Request workspace deletion
    Rm { name: String },
    /// Start a stopped workspace
    Start { name: String },
    /// Stop a running workspace
    Stop { name: String },
    /// Stream status transitions until ctrl-c
    Watch,
}

fn init_tracing() {
    let env = std::env::var("WHARF_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("WHARF_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid WHARF_METRICS_ADDR; metrics disabled");
        }
    }
}

fn print_snapshot(out: Output, snap: &WorkspaceSnapshot) -> Result<()> {
    match out {
        Output::Json => println!("{}", serde_json::to_string_pretty(snap)?),
        Output::Human => println!(
            "{}\t{}\t{}\t{}",
            snap.name,
            snap.phase.as_deref().unwrap_or("-"),
            snap.access_url.as_deref().unwrap_or("-"),
            fmt_uid(&snap.uid),
        ),
    }
    Ok(())
}

fn print_transition(out: Output, event: &TransitionEvent) -> Result<()> {
    match out {
        Output::Json => println!("{}", serde_json::to_string(event)?),
        Output::Human => {
            let rec = &event.record;
            match rec.error.as_deref() {
                Some(err) => println!(
                    "{}\t{} -> {}\t({})",
                    event.workspace.name, rec.prev_status, rec.status, err
                ),
                None => println!("{}\t{} -> {}", event.workspace.name, rec.prev_status, rec.status),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let gateway = Arc::new(KubeGateway::connect().await?);
    let api = InProcApi::new(gateway);
    let ns = cli.namespace.as_str();

    match cli.command {
        Commands::Ls => {
            let items = api.list(ns).await?;
            for snap in items.iter() {
                print_snapshot(cli.output, snap)?;
            }
        }
        Commands::Get { name } => {
            let snap = api.get(ns, &name).await?;
            print_snapshot(cli.output, &snap)?;
        }
        Commands::Create { name, template, stopped } => {
            let template = match template {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
                }
                None => serde_json::json!({}),
            };
            let spec = WorkspaceSpecRequest {
                name,
                namespace: ns.to_string(),
                started: !stopped,
                template,
            };
            let snap = api.create(&spec).await?;
            print_snapshot(cli.output, &snap)?;
        }
        Commands::Rm { name } => {
            api.delete(ns, &name).await?;
            info!(ns = %ns, name = %name, "deletion requested");
        }
        Commands::Start { name } => {
            let snap = api.set_running(ns, &name, true).await?;
            print_snapshot(cli.output, &snap)?;
        }
        Commands::Stop { name } => {
            let snap = api.set_running(ns, &name, false).await?;
            print_snapshot(cli.output, &snap)?;
        }
        Commands::Watch => {
            let mut handle = api.subscribe(ns).await?;
            loop {
                tokio::select! {
                    maybe = handle.events.recv() => {
                        match maybe {
                            Some(event) => print_transition(cli.output, &event)?,
                            None => break,
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        handle.stop.stop();
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}
