//! vehicle.rs — Kinematic vehicle model
//!
//! Local north/east/depth frame around a WGS-84 origin. Adrift the vehicle
//! follows a Gaussian current; executing a plan it transits, ascends or holds.
//! Pure math, no I/O.

use rand::Rng;
use rand_distr::{Distribution, Normal, NormalError};
use safety_types::{
    EstimatedState, Medium, Message, PlanControlState, PlanOutcome, PlanState, VehicleMode,
    Wgs84Point,
};

use crate::scenarios::InitialState;

pub const TRANSIT_SPEED_MPS: f64 = 1.5;
pub const ASCENT_RATE_MPS: f64 = 0.5;
/// Close enough to the origin to call a safe-zone transit done
pub const ARRIVAL_RADIUS_M: f64 = 10.0;

const SAFETY_PREFIX: &str = "safety_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    SafeZone,
    Surface,
    StationKeep,
    /// Anything else: an operator plan; holds position until replaced
    Other,
}

impl PlanKind {
    pub fn of(plan_id: &str) -> Self {
        match plan_id.strip_prefix(SAFETY_PREFIX).unwrap_or(plan_id) {
            "zone" => Self::SafeZone,
            "surface" => Self::Surface,
            "sk" => Self::StationKeep,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanEvent {
    Started(String),
    Completed(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct VehicleModel {
    origin: Wgs84Point,
    pub mode: VehicleMode,
    pub medium: Medium,
    pub north_m: f64,
    pub east_m: f64,
    pub depth_m: f64,
    pub plan: PlanControlState,
    plan_elapsed_s: f64,
    fail_after_s: Option<f64>,
    drift: Normal<f64>,
}

impl VehicleModel {
    pub fn new(
        origin: Wgs84Point,
        start: InitialState,
        drift_sigma_mps: f64,
        fail_after_s: Option<f64>,
    ) -> Result<Self, NormalError> {
        Ok(Self {
            origin,
            mode: start.mode,
            medium: start.medium,
            north_m: 0.0,
            east_m: 0.0,
            depth_m: start.depth_m,
            plan: start.plan,
            plan_elapsed_s: 0.0,
            fail_after_s,
            drift: Normal::new(0.0, drift_sigma_mps)?,
        })
    }

    pub fn is_executing(&self) -> bool {
        self.plan.state == PlanState::Executing
    }

    pub fn distance_from_origin(&self) -> f64 {
        self.north_m.hypot(self.east_m)
    }

    /// Start (or replace) the running plan.
    pub fn start_plan(&mut self, plan_id: &str) -> PlanEvent {
        self.plan.state = PlanState::Executing;
        self.plan.plan_id = plan_id.to_string();
        self.plan_elapsed_s = 0.0;
        self.mode = VehicleMode::Maneuver;
        PlanEvent::Started(plan_id.to_string())
    }

    fn finish(&mut self, outcome: PlanOutcome) -> PlanEvent {
        let id = std::mem::take(&mut self.plan.plan_id);
        self.plan.state = PlanState::Ready;
        self.plan.last_outcome = outcome;
        self.plan_elapsed_s = 0.0;
        match outcome {
            PlanOutcome::Failure => {
                self.mode = VehicleMode::Error;
                PlanEvent::Failed(id)
            }
            _ => {
                self.mode = VehicleMode::Service;
                PlanEvent::Completed(id)
            }
        }
    }

    /// Advance by `dt` seconds.
    pub fn tick<R: Rng + ?Sized>(&mut self, dt: f64, rng: &mut R) -> Option<PlanEvent> {
        if !self.is_executing() {
            self.north_m += self.drift.sample(rng) * dt;
            self.east_m += self.drift.sample(rng) * dt;
            return None;
        }

        self.plan_elapsed_s += dt;
        if let Some(limit) = self.fail_after_s {
            if self.plan_elapsed_s >= limit {
                return Some(self.finish(PlanOutcome::Failure));
            }
        }

        match PlanKind::of(&self.plan.plan_id) {
            PlanKind::SafeZone => {
                let dist = self.distance_from_origin();
                let step = TRANSIT_SPEED_MPS * dt;
                if dist <= ARRIVAL_RADIUS_M + step {
                    let keep = ARRIVAL_RADIUS_M.min(dist) / dist.max(f64::EPSILON);
                    self.north_m *= keep;
                    self.east_m *= keep;
                    return Some(self.finish(PlanOutcome::Success));
                }
                let scale = (dist - step) / dist;
                self.north_m *= scale;
                self.east_m *= scale;
            }
            PlanKind::Surface => {
                self.depth_m = (self.depth_m - ASCENT_RATE_MPS * dt).max(0.0);
                if self.depth_m <= 0.0 {
                    self.medium = Medium::Water;
                    return Some(self.finish(PlanOutcome::Success));
                }
            }
            // station keeping and operator plans hold position
            PlanKind::StationKeep | PlanKind::Other => {}
        }
        None
    }

    pub fn position(&self) -> EstimatedState {
        EstimatedState {
            lat: self.origin.lat,
            lon: self.origin.lon,
            height: -self.depth_m,
            x: self.north_m,
            y: self.east_m,
        }
    }

    /// One round of telemetry, in the order the bus would carry it.
    pub fn telemetry(&self) -> Vec<Message> {
        vec![
            Message::EstimatedState(self.position()),
            Message::VehicleState { op_mode: self.mode },
            Message::VehicleMedium { medium: self.medium },
            Message::PlanControlState(self.plan.clone()),
        ]
    }
}
