//! # runtime
//!
//! Tokio host around [`Supervisor`].
//!
//! ## Architecture
//!   1. A UDP listener task decodes envelopes, stamps the receipt instant and
//!      forwards them over an mpsc channel
//!   2. One owner task holds the supervisor and `select!`s over inbound
//!      messages, parameter commands, the tick interval and shutdown
//!   3. Directives leave through [`UdpSink`], a blocking std socket
//!
//! Only the owner task touches the supervisor, so message handling and
//! decision cycles never interleave.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket as StdUdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use safety_types::Envelope;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::audit::AuditLogger;
use crate::config::{ConfigError, SupervisorParams};
use crate::dispatch::{DirectiveSink, DispatchError};
use crate::supervisor::{Notice, StatusReport, Supervisor};

pub const INBOUND_QUEUE: usize = 256;
const MAX_DATAGRAM: usize = 4096;

/// Latest status snapshot, `None` until the owner loop publishes one.
pub type SharedStatus = Arc<RwLock<Option<StatusReport>>>;

/// One decoded datagram and when it arrived.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub envelope: Envelope,
    pub received_at: Instant,
}

pub enum Command {
    UpdateParameters {
        params: SupervisorParams,
        reply: oneshot::Sender<Result<(), ConfigError>>,
    },
}

/// Current instant on the tokio clock, so paused-time tests drive the timers.
pub fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

// ── UDP In ────────────────────────────────────────────────────────────────────

/// Receive envelopes until shutdown or until the owner hangs up.
pub async fn run_listener(
    socket: UdpSocket,
    tx: mpsc::Sender<Inbound>,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Ok(addr) = socket.local_addr() {
        info!("📡 Listening for telemetry on UDP {addr}");
    }
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            res = socket.recv_from(&mut buf) => match res {
                Ok((len, src)) => match Envelope::decode(&buf[..len]) {
                    Ok(envelope) => {
                        let msg = Inbound { envelope, received_at: now() };
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!("UDP: malformed datagram from {src}: {e}"),
                },
                // Never crash; log and continue
                Err(e) => warn!("UDP: recv error: {e}"),
            }
        }
    }
    debug!("UDP listener stopped");
}

// ── UDP Out ───────────────────────────────────────────────────────────────────

pub struct UdpSink {
    socket: StdUdpSocket,
    target: SocketAddr,
}

impl UdpSink {
    pub fn new(target: &str) -> io::Result<Self> {
        let target = target.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("{target} resolves to nothing"))
        })?;
        let socket = StdUdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(false)?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl DirectiveSink for UdpSink {
    fn send(&mut self, env: &Envelope) -> Result<(), DispatchError> {
        let bytes = env.encode()?;
        self.socket.send_to(&bytes, self.target)?;
        debug!("UDP → {} {}", self.target, env.body.name());
        Ok(())
    }
}

// ── Owner Loop ────────────────────────────────────────────────────────────────

async fn publish(status: &SharedStatus, report: StatusReport) {
    *status.write().await = Some(report);
}

/// Drive the supervisor until shutdown. Returns it, stopped, for inspection.
pub async fn run_supervisor<S: DirectiveSink>(
    mut supervisor: Supervisor<S>,
    mut inbound: mpsc::Receiver<Inbound>,
    mut commands: mpsc::Receiver<Command>,
    tick_period: Duration,
    status: SharedStatus,
    audit: AuditLogger,
    mut shutdown: watch::Receiver<bool>,
) -> Supervisor<S> {
    audit.log_session_event("start").await;
    publish(&status, supervisor.status(now())).await;

    let mut ticker = tokio::time::interval(tick_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("🛡 Supervisor running, tick every {}ms", tick_period.as_millis());

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => break,

            _ = ticker.tick() => {
                let decision = supervisor.tick(now());
                if let Some(directive) = decision.directive() {
                    audit.log_directive(&directive.plan_id(), &decision).await;
                }
                publish(&status, supervisor.status(now())).await;
            }

            Some(msg) = inbound.recv() => {
                if let Some(Notice::Relinquished { by }) =
                    supervisor.handle(&msg.envelope, msg.received_at)
                {
                    audit.log_relinquished(&by).await;
                }
            }

            Some(cmd) = commands.recv() => match cmd {
                Command::UpdateParameters { params, reply } => {
                    let result = supervisor.update_parameters(params, now());
                    match &result {
                        Ok(()) => audit.log_parameters(&params).await,
                        Err(e) => warn!("Rejected parameter update: {e}"),
                    }
                    publish(&status, supervisor.status(now())).await;
                    let _ = reply.send(result);
                }
            },
        }
    }

    supervisor.stop();
    publish(&status, supervisor.status(now())).await;
    audit.log_session_event("stop").await;
    info!("🛑 Supervisor loop stopped");
    supervisor
}
