use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use safety_supervisor::audit::AuditLogger;
use safety_supervisor::config::SupervisorConfig;
use safety_supervisor::http::{self, AppState};
use safety_supervisor::runtime::{self, SharedStatus, UdpSink, INBOUND_QUEUE};
use safety_supervisor::Supervisor;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "safety-supervisor", about = "Vehicle safety supervisor")]
struct Args {
    /// Path to config.toml (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP address to receive telemetry on
    #[arg(long)]
    listen: Option<String>,

    /// UDP address of the vehicle's plan generator
    #[arg(long)]
    vehicle_addr: Option<String>,

    /// HTTP status port
    #[arg(long)]
    status_port: Option<u16>,

    /// Own bus address
    #[arg(long)]
    system_id: Option<u16>,
}

impl Args {
    fn apply(&self, cfg: &mut SupervisorConfig) {
        if let Some(listen) = &self.listen {
            cfg.network.listen_addr = listen.clone();
        }
        if let Some(addr) = &self.vehicle_addr {
            cfg.network.vehicle_addr = addr.clone();
        }
        if let Some(port) = self.status_port {
            cfg.network.status_port = port;
        }
        if let Some(id) = self.system_id {
            cfg.supervisor.system_id = id;
        }
    }
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "safety_supervisor=info".into()),
        )
        .init();

    let args = Args::parse();
    let mut cfg = SupervisorConfig::load(args.config.as_deref()).context("loading config")?;
    args.apply(&mut cfg);

    info!("🛡 Safety supervisor starting as {}", cfg.system_address());
    match cfg.safe_zone.to_safe_zone()?.reference {
        Some(p) => info!("Safe zone at ({:.6}, {:.6}) r={}m", p.lat, p.lon, cfg.safe_zone.radius_m),
        None => warn!("No safe zone configured; every position counts as near"),
    }

    let socket = UdpSocket::bind(&cfg.network.listen_addr)
        .await
        .with_context(|| format!("binding UDP {}", cfg.network.listen_addr))?;
    let sink = UdpSink::new(&cfg.network.vehicle_addr)
        .with_context(|| format!("resolving vehicle address {}", cfg.network.vehicle_addr))?;
    info!("Directives go to {}", sink.target());

    let http_addr = format!("0.0.0.0:{}", cfg.network.status_port);
    let listener = TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("binding HTTP {http_addr}"))?;

    let supervisor = Supervisor::from_config(&cfg, sink, runtime::now()).context("invalid config")?;
    let audit = AuditLogger::new(cfg.audit.path.clone());
    info!("Audit session {}", audit.session_id());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
    let (command_tx, command_rx) = mpsc::channel(16);
    let status: SharedStatus = Arc::default();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                // dropping the sender would stop everything; keep it alive
                warn!("ctrl-c handler failed: {e}, running until killed");
                std::future::pending::<()>().await;
            }
        }
    });

    let udp = tokio::spawn(runtime::run_listener(socket, inbound_tx, shutdown_rx.clone()));
    let api = tokio::spawn(http::serve(
        listener,
        AppState { status: status.clone(), commands: command_tx },
        shutdown_rx.clone(),
    ));

    let supervisor = runtime::run_supervisor(
        supervisor,
        inbound_rx,
        command_rx,
        cfg.tick_period(),
        status,
        audit,
        shutdown_rx,
    )
    .await;

    udp.await.context("UDP listener panicked")?;
    api.await.context("status API panicked")?.context("status API failed")?;

    info!(
        "Sent {} messages ({} failed)",
        supervisor.dispatcher().sent(),
        supervisor.dispatcher().failed_sends()
    );
    Ok(())
}
