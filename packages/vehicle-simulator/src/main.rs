//! main.rs — Vehicle simulator entry point
//!
//! One loop, two inputs:
//!   1. Ticker: advances the vehicle and console at update_rate_hz and
//!      publishes their telemetry to the supervisor over UDP
//!   2. UDP socket: plan-generation requests coming back from the supervisor

mod scenarios;
mod sim;
mod udp_tx;
mod vehicle;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use safety_types::{Envelope, SystemAddress, Wgs84Point};
use serde::Deserialize;
use tokio::net::UdpSocket;
use tokio::time::interval;
use tracing::{debug, info, warn};

use scenarios::{ScenarioConfig, ScenarioType};
use sim::Sim;
use udp_tx::UdpTransmitter;
use vehicle::VehicleModel;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vehicle-sim", about = "Vehicle and operator console simulator")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Override the scenario from the config
    #[arg(long, value_enum)]
    scenario: Option<ScenarioType>,
    /// Supervisor UDP address
    #[arg(long)]
    supervisor_addr: Option<String>,
    /// Simulation speed multiplier (1.0 = real-time)
    #[arg(long, default_value = "1.0")]
    speed: f64,
    /// RNG seed for reproducible drift
    #[arg(long)]
    seed: Option<u64>,
}

// ── Config structs ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FullConfig {
    vehicle: VehicleConfig,
    console: ConsoleConfig,
    simulation: SimulationConfig,
    #[serde(default)]
    scenario: ScenarioConfig,
    network: NetworkConfig,
}

#[derive(Debug, Deserialize)]
struct VehicleConfig {
    system_id: u16,
    origin_lat: f64,
    origin_lon: f64,
}

#[derive(Debug, Deserialize)]
struct ConsoleConfig {
    system_id: u16,
    heartbeat_period_s: f64,
}

#[derive(Debug, Deserialize)]
struct SimulationConfig {
    update_rate_hz: f64,
    drift_sigma_mps: f64,
}

#[derive(Debug, Deserialize)]
struct NetworkConfig {
    listen_addr: String,
    supervisor_addr: String,
}

fn load_config(path: &str) -> Result<FullConfig> {
    let raw = std::fs::read_to_string(path)
        .unwrap_or_else(|_| include_str!("../config.toml").to_string());
    toml::from_str(&raw).context("invalid config.toml")
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vehicle_simulator=info".into()),
        )
        .init();

    let args = Args::parse();
    let mut cfg = load_config(&args.config)?;
    if let Some(kind) = args.scenario {
        cfg.scenario.kind = kind;
    }
    if let Some(addr) = &args.supervisor_addr {
        cfg.network.supervisor_addr = addr.clone();
    }
    anyhow::ensure!(cfg.simulation.update_rate_hz > 0.0, "update_rate_hz must be positive");

    let console = SystemAddress(cfg.console.system_id);
    if !console.is_console() {
        warn!("Console address {console} lacks the console class bit; heartbeats will be ignored");
    }

    info!(
        "🚤 Vehicle simulator starting — scenario {:?}, vehicle {}, console {}",
        cfg.scenario.kind,
        SystemAddress(cfg.vehicle.system_id),
        console
    );

    let origin = Wgs84Point::new(cfg.vehicle.origin_lat, cfg.vehicle.origin_lon);
    let model = VehicleModel::new(
        origin,
        cfg.scenario.initial_state(),
        cfg.simulation.drift_sigma_mps,
        cfg.scenario.fail_plans_after(),
    )
    .context("invalid drift_sigma_mps")?;
    let mut sim = Sim::new(
        model,
        cfg.scenario.clone(),
        SystemAddress(cfg.vehicle.system_id),
        console,
        cfg.console.heartbeat_period_s,
    );

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let socket = UdpSocket::bind(&cfg.network.listen_addr)
        .await
        .with_context(|| format!("binding UDP {}", cfg.network.listen_addr))?;
    let tx = UdpTransmitter::new(&cfg.network.supervisor_addr).context("binding UDP transmitter")?;
    info!("📡 Listening on {}, publishing to {}", cfg.network.listen_addr, cfg.network.supervisor_addr);

    let epoch_s = 1.0 / cfg.simulation.update_rate_hz;
    let mut ticker = interval(Duration::from_secs_f64(epoch_s));
    let mut buf = vec![0u8; 4096];
    let mut epoch: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let out = sim.step(epoch_s * args.speed, &mut rng);
                tx.send_all(&out);
                epoch += 1;
                if epoch % 20 == 0 {
                    let v = &sim.vehicle;
                    info!(
                        "⏱ t={:.0}s | {:?} {:?} | depth={:.1}m | {:.0}m from origin | plan '{}' {:?}",
                        sim.elapsed_s(), v.mode, v.medium, v.depth_m,
                        v.distance_from_origin(), v.plan.plan_id, v.plan.state
                    );
                }
            }
            res = socket.recv_from(&mut buf) => match res {
                Ok((len, src)) => match Envelope::decode(&buf[..len]) {
                    Ok(env) => { sim.on_envelope(&env); }
                    Err(e) => debug!("UDP: malformed datagram from {src}: {e}"),
                },
                Err(e) => warn!("UDP: recv error: {e}"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping after {epoch} epochs");
                break;
            }
        }
    }
    Ok(())
}
