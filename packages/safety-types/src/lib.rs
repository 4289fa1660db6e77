//! # safety-types
//!
//! Shared bus vocabulary for the vehicle safety supervisor.
//!
//! These types are used by:
//! - `supervisor-rust`: consuming telemetry and emitting plan-generation requests
//! - `packages/vehicle-simulator`: producing telemetry and reacting to requests
//!
//! ## Wire format
//!
//! Every datagram carries one JSON [`Envelope`]: the sender address, an optional
//! destination and one tagged [`Message`] body.
//!
//! ## Addressing
//!
//! A [`SystemAddress`] with bit `0x4000` set belongs to an operator console.
//! Heartbeats from any other class never count as operator contact.

pub mod geo;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use geo::Wgs84Point;

// ── Addressing ────────────────────────────────────────────────────────────────

/// Bus address of a system (vehicle, console, simulator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SystemAddress(pub u16);

impl SystemAddress {
    /// Address class bit carried by operator consoles.
    pub const CONSOLE_CLASS: u16 = 0x4000;

    pub fn is_console(&self) -> bool {
        self.0 & Self::CONSOLE_CLASS != 0
    }
}

impl std::fmt::Display for SystemAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

// ── Vehicle Mode ──────────────────────────────────────────────────────────────

/// Operating mode reported by the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleMode {
    Service,
    Calibration,
    Error,
    Maneuver,
    External,
    Boot,
}

impl VehicleMode {
    /// Service or error: the vehicle itself reports it is not doing useful work.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Service | Self::Error)
    }

    pub fn is_boot(&self) -> bool {
        matches!(self, Self::Boot)
    }
}

// ── Medium ────────────────────────────────────────────────────────────────────

/// Physical environment the vehicle currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Medium {
    #[default]
    Unknown,
    Ground,
    Air,
    Water,
    Underwater,
}

impl Medium {
    /// Afloat at the surface or submerged.
    pub fn in_water(&self) -> bool {
        matches!(self, Self::Water | Self::Underwater)
    }

    pub fn is_underwater(&self) -> bool {
        matches!(self, Self::Underwater)
    }
}

// ── Plan Control ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanState {
    Blocked,
    Ready,
    Initializing,
    Executing,
}

impl PlanState {
    /// Nothing running: either blocked or ready to accept a plan.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Blocked | Self::Ready)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanOutcome {
    #[default]
    None,
    Success,
    Failure,
}

/// Plan-control status snapshot published by the vehicle's plan executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanControlState {
    pub state: PlanState,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub last_outcome: PlanOutcome,
}

impl PlanControlState {
    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    pub fn has_failed(&self) -> bool {
        self.last_outcome == PlanOutcome::Failure
    }
}

// ── Plan Generation ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationOp {
    Request,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationCmd {
    Generate,
    Execute,
}

/// Request to generate (and optionally execute) a named plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanGeneration {
    pub op: GenerationOp,
    pub cmd: GenerationCmd,
    pub plan_id: String,
    #[serde(default)]
    pub params: String,
}

// ── Entity Status ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityHealth {
    Normal,
    Fault,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityActivity {
    Idle,
    Active,
}

/// Externally visible status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStatus {
    pub state: EntityHealth,
    pub status: EntityActivity,
}

impl EntityStatus {
    pub fn normal(status: EntityActivity) -> Self {
        Self { state: EntityHealth::Normal, status }
    }
}

// ── Navigation ────────────────────────────────────────────────────────────────

/// Navigation estimate: a WGS-84 reference plus a local north/east offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatedState {
    /// Reference latitude, degrees
    pub lat: f64,
    /// Reference longitude, degrees
    pub lon: f64,
    /// Height above the WGS-84 ellipsoid, metres
    #[serde(default)]
    pub height: f64,
    /// North offset from the reference, metres
    #[serde(default)]
    pub x: f64,
    /// East offset from the reference, metres
    #[serde(default)]
    pub y: f64,
}

impl EstimatedState {
    /// Absolute position of the vehicle.
    pub fn to_wgs84(&self) -> Wgs84Point {
        geo::displace(Wgs84Point::new(self.lat, self.lon), self.x, self.y)
    }
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// Every message that travels on the supervisor's bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    EstimatedState(EstimatedState),
    Heartbeat,
    /// Plan-control command. Only its source matters to the supervisor.
    PlanControl {
        #[serde(default)]
        plan_id: String,
    },
    PlanControlState(PlanControlState),
    VehicleState {
        op_mode: VehicleMode,
    },
    VehicleMedium {
        medium: Medium,
    },
    PlanGeneration(PlanGeneration),
    EntityState(EntityStatus),
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EstimatedState(_) => "estimated_state",
            Self::Heartbeat => "heartbeat",
            Self::PlanControl { .. } => "plan_control",
            Self::PlanControlState(_) => "plan_control_state",
            Self::VehicleState { .. } => "vehicle_state",
            Self::VehicleMedium { .. } => "vehicle_medium",
            Self::PlanGeneration(_) => "plan_generation",
            Self::EntityState(_) => "entity_state",
        }
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One datagram on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub src: SystemAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<SystemAddress>,
    pub body: Message,
}

impl Envelope {
    pub fn new(src: SystemAddress, body: Message) -> Self {
        Self { src, dst: None, body }
    }

    pub fn to(mut self, dst: SystemAddress) -> Self {
        self.dst = Some(dst);
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
