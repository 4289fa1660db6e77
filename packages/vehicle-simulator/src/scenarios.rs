//! scenarios.rs — Injectable fault scenarios for the vehicle simulator
//!
//! Each scenario puts the vehicle in a situation the supervisor must react
//! to (or, for `nominal`, must leave alone).

use safety_types::{Medium, PlanControlState, PlanOutcome, PlanState, VehicleMode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum ScenarioType {
    /// Healthy survey at the surface with an operator watching
    Nominal,
    /// Fault at the surface, then the console goes silent
    CommsLoss,
    /// Service mode at the surface, nothing running
    DegradedSurface,
    /// Error mode while submerged, nothing running
    DegradedUnderwater,
    /// Submerged after a failed plan; every plan started fails again
    PlanFailure,
    /// Degraded at the surface until the operator takes over plan control
    ExternalTakeover,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub kind: ScenarioType,
    pub initial_depth_m: f64,
    pub comms_loss_after_s: f64,
    pub takeover_after_s: f64,
    pub fail_after_s: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            kind: ScenarioType::Nominal,
            initial_depth_m: 20.0,
            comms_loss_after_s: 30.0,
            takeover_after_s: 20.0,
            fail_after_s: 15.0,
        }
    }
}

/// Where the vehicle starts.
#[derive(Debug, Clone, PartialEq)]
pub struct InitialState {
    pub mode: VehicleMode,
    pub medium: Medium,
    pub depth_m: f64,
    pub plan: PlanControlState,
}

fn idle(last_outcome: PlanOutcome) -> PlanControlState {
    PlanControlState { state: PlanState::Ready, plan_id: String::new(), last_outcome }
}

impl ScenarioConfig {
    pub fn initial_state(&self) -> InitialState {
        let surface = |mode| InitialState {
            mode,
            medium: Medium::Water,
            depth_m: 0.0,
            plan: idle(PlanOutcome::None),
        };
        let submerged = |mode, outcome| InitialState {
            mode,
            medium: Medium::Underwater,
            depth_m: self.initial_depth_m,
            plan: idle(outcome),
        };

        match self.kind {
            ScenarioType::Nominal => InitialState {
                plan: PlanControlState {
                    state: PlanState::Executing,
                    plan_id: "survey".to_string(),
                    last_outcome: PlanOutcome::None,
                },
                ..surface(VehicleMode::Maneuver)
            },
            ScenarioType::CommsLoss | ScenarioType::ExternalTakeover => surface(VehicleMode::Error),
            ScenarioType::DegradedSurface => surface(VehicleMode::Service),
            ScenarioType::DegradedUnderwater => submerged(VehicleMode::Error, PlanOutcome::None),
            ScenarioType::PlanFailure => submerged(VehicleMode::Error, PlanOutcome::Failure),
        }
    }

    /// Console is sending heartbeats at `t_s` seconds into the run.
    pub fn console_online(&self, t_s: f64) -> bool {
        !(self.kind == ScenarioType::CommsLoss && t_s >= self.comms_loss_after_s)
    }

    pub fn takeover_due(&self, t_s: f64) -> bool {
        self.kind == ScenarioType::ExternalTakeover && t_s >= self.takeover_after_s
    }

    /// Plans fail after this many seconds of execution.
    pub fn fail_plans_after(&self) -> Option<f64> {
        (self.kind == ScenarioType::PlanFailure).then_some(self.fail_after_s)
    }
}
