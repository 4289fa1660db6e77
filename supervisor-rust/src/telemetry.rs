//! # telemetry
//!
//! Latest-known view of the vehicle, assembled from asynchronously arriving
//! bus messages. [`Telemetry::apply`] is the only way in; every handler is
//! O(1), idempotent and safe to call in any order or with duplicates.
//!
//! The decision engine refuses to act until vehicle state, medium and
//! plan-control state have each been reported at least once
//! (see [`Readiness`]).

use std::time::{Duration, Instant};

use safety_types::{
    Envelope, EstimatedState, Medium, Message, PlanControlState, SystemAddress, VehicleMode,
    Wgs84Point,
};
use serde::Serialize;
use tracing::debug;

use crate::timer::TimerBank;

// ── Readiness ─────────────────────────────────────────────────────────────────

/// Which telemetry sources have reported during this session. Never cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Readiness(u8);

impl Readiness {
    pub const VEHICLE_STATE: u8 = 0x01;
    pub const MEDIUM: u8 = 0x02;
    pub const PLAN_CONTROL_STATE: u8 = 0x04;
    pub const ALL: u8 = Self::VEHICLE_STATE | Self::MEDIUM | Self::PLAN_CONTROL_STATE;

    pub fn mark(&mut self, source: u8) {
        self.0 |= source;
    }

    pub fn has(&self, source: u8) -> bool {
        self.0 & source == source
    }

    pub fn is_complete(&self) -> bool {
        self.has(Self::ALL)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

// ── Safe Zone ─────────────────────────────────────────────────────────────────

pub const DEFAULT_SAFE_ZONE_RADIUS_M: f64 = 50.0;

/// Reference location the vehicle should stay near when unsupervised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafeZone {
    pub reference: Option<Wgs84Point>,
    pub radius_m: f64,
}

impl Default for SafeZone {
    fn default() -> Self {
        Self { reference: None, radius_m: DEFAULT_SAFE_ZONE_RADIUS_M }
    }
}

impl SafeZone {
    /// With no reference configured every position counts as near.
    pub fn is_near(&self, pos: Wgs84Point) -> bool {
        match self.reference {
            Some(reference) => reference.distance_to(&pos) <= self.radius_m,
            None => true,
        }
    }
}

// ── Medium Tracker ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct MediumTracker {
    current: Medium,
    previous: Medium,
    changed_at: Option<Instant>,
}

impl MediumTracker {
    /// Returns true when the medium actually changed.
    pub fn update(&mut self, medium: Medium, at: Instant) -> bool {
        if medium == self.current && self.changed_at.is_some() {
            return false;
        }
        self.previous = self.current;
        self.current = medium;
        self.changed_at = Some(at);
        true
    }

    pub fn current(&self) -> Medium {
        self.current
    }

    pub fn previous(&self) -> Medium {
        self.previous
    }

    pub fn in_water(&self) -> bool {
        self.current.in_water()
    }

    pub fn is_underwater(&self) -> bool {
        self.current.is_underwater()
    }

    /// Time spent in the current medium.
    pub fn since_transition(&self, now: Instant) -> Option<Duration> {
        self.changed_at.map(|t| now.saturating_duration_since(t))
    }
}

// ── Aggregator ────────────────────────────────────────────────────────────────

/// What a message did beyond updating the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// An operator console heartbeat restarted the comms timer
    OperatorContact,
    /// The vehicle is underwater; no operator link is expected there
    Submerged,
    /// Another authority sent plan control; self-issued directives are void
    ExternalControl(SystemAddress),
}

#[derive(Debug, Clone)]
pub struct Telemetry {
    own: SystemAddress,
    safe_zone: SafeZone,
    readiness: Readiness,
    degraded: bool,
    medium: MediumTracker,
    plan: Option<PlanControlState>,
    near: bool,
    last_fix: Option<Wgs84Point>,
}

impl Telemetry {
    pub fn new(own: SystemAddress, safe_zone: SafeZone) -> Self {
        Self {
            own,
            safe_zone,
            readiness: Readiness::default(),
            degraded: false,
            medium: MediumTracker::default(),
            plan: None,
            near: true,
            last_fix: None,
        }
    }

    /// Fold one bus message into the snapshot.
    pub fn apply(&mut self, env: &Envelope, at: Instant, timers: &mut TimerBank) -> Effect {
        match &env.body {
            Message::EstimatedState(est) => {
                self.on_estimated_state(est);
                Effect::None
            }
            Message::Heartbeat => self.on_heartbeat(env.src, at, timers),
            Message::PlanControl { .. } => self.on_plan_control(env.src),
            Message::PlanControlState(pcs) => {
                self.on_plan_control_state(pcs);
                Effect::None
            }
            Message::VehicleState { op_mode } => {
                self.on_vehicle_state(*op_mode);
                Effect::None
            }
            Message::VehicleMedium { medium } => self.on_vehicle_medium(*medium, at, timers),
            Message::PlanGeneration(_) | Message::EntityState(_) => Effect::None,
        }
    }

    fn on_estimated_state(&mut self, est: &EstimatedState) {
        let pos = est.to_wgs84();
        self.near = self.safe_zone.is_near(pos);
        self.last_fix = Some(pos);
    }

    fn on_heartbeat(&mut self, src: SystemAddress, at: Instant, timers: &mut TimerBank) -> Effect {
        if src == self.own || !src.is_console() {
            return Effect::None;
        }
        timers.comms.reset(at);
        Effect::OperatorContact
    }

    fn on_plan_control(&mut self, src: SystemAddress) -> Effect {
        if src == self.own {
            return Effect::None;
        }
        Effect::ExternalControl(src)
    }

    fn on_plan_control_state(&mut self, pcs: &PlanControlState) {
        self.readiness.mark(Readiness::PLAN_CONTROL_STATE);
        self.plan = Some(pcs.clone());
    }

    fn on_vehicle_state(&mut self, mode: VehicleMode) {
        if !mode.is_boot() {
            self.readiness.mark(Readiness::VEHICLE_STATE);
        }
        self.degraded = mode.is_degraded();
    }

    fn on_vehicle_medium(&mut self, medium: Medium, at: Instant, timers: &mut TimerBank) -> Effect {
        self.readiness.mark(Readiness::MEDIUM);
        if self.medium.update(medium, at) {
            debug!("Medium transition {:?} → {:?}", self.medium.previous(), medium);
        }
        if self.medium.is_underwater() {
            timers.comms.reset(at);
            return Effect::Submerged;
        }
        Effect::None
    }

    pub fn own_address(&self) -> SystemAddress {
        self.own
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_complete()
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn medium(&self) -> &MediumTracker {
        &self.medium
    }

    pub fn plan(&self) -> Option<&PlanControlState> {
        self.plan.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.plan.as_ref().is_some_and(PlanControlState::is_idle)
    }

    pub fn has_failed(&self) -> bool {
        self.plan.as_ref().is_some_and(PlanControlState::has_failed)
    }

    pub fn is_near(&self) -> bool {
        self.near
    }

    pub fn last_fix(&self) -> Option<Wgs84Point> {
        self.last_fix
    }

    pub fn safe_zone(&self) -> &SafeZone {
        &self.safe_zone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safety_types::{PlanOutcome, PlanState};

    const VEHICLE: SystemAddress = SystemAddress(0x0020);
    const CONSOLE: SystemAddress = SystemAddress(0x4010);
    const OTHER_VEHICLE: SystemAddress = SystemAddress(0x0021);

    fn fixture() -> (Telemetry, TimerBank, Instant) {
        let t0 = Instant::now();
        let zone = SafeZone { reference: Some(Wgs84Point::new(41.0, -8.0)), radius_m: 50.0 };
        (Telemetry::new(VEHICLE, zone), TimerBank::new(Duration::from_secs(600), t0), t0)
    }

    fn pcs(state: PlanState, outcome: PlanOutcome) -> Message {
        Message::PlanControlState(PlanControlState {
            state,
            plan_id: String::new(),
            last_outcome: outcome,
        })
    }

    #[test]
    fn readiness_needs_all_three_sources() {
        let (mut tel, mut timers, t0) = fixture();
        assert!(!tel.is_ready());
        tel.apply(&Envelope::new(VEHICLE, Message::VehicleState { op_mode: VehicleMode::Service }), t0, &mut timers);
        tel.apply(&Envelope::new(VEHICLE, Message::VehicleMedium { medium: Medium::Water }), t0, &mut timers);
        assert!(!tel.is_ready());
        tel.apply(&Envelope::new(VEHICLE, pcs(PlanState::Ready, PlanOutcome::None)), t0, &mut timers);
        assert!(tel.is_ready());
        assert_eq!(tel.readiness().bits(), Readiness::ALL);
    }

    #[test]
    fn boot_mode_does_not_count_towards_readiness() {
        let (mut tel, mut timers, t0) = fixture();
        tel.apply(&Envelope::new(VEHICLE, Message::VehicleState { op_mode: VehicleMode::Boot }), t0, &mut timers);
        assert!(!tel.readiness().has(Readiness::VEHICLE_STATE));
        assert!(!tel.is_degraded());
        tel.apply(&Envelope::new(VEHICLE, Message::VehicleState { op_mode: VehicleMode::Error }), t0, &mut timers);
        assert!(tel.readiness().has(Readiness::VEHICLE_STATE));
        assert!(tel.is_degraded());
        // readiness sticks even when the vehicle goes back to boot
        tel.apply(&Envelope::new(VEHICLE, Message::VehicleState { op_mode: VehicleMode::Boot }), t0, &mut timers);
        assert!(tel.readiness().has(Readiness::VEHICLE_STATE));
        assert!(!tel.is_degraded());
    }

    #[test]
    fn only_console_heartbeats_reset_comms() {
        let (mut tel, mut timers, t0) = fixture();
        let later = t0 + Duration::from_secs(900);
        assert!(timers.comms.overflow(later));

        assert_eq!(tel.apply(&Envelope::new(VEHICLE, Message::Heartbeat), later, &mut timers), Effect::None);
        assert_eq!(tel.apply(&Envelope::new(OTHER_VEHICLE, Message::Heartbeat), later, &mut timers), Effect::None);
        assert!(timers.comms.overflow(later));

        assert_eq!(tel.apply(&Envelope::new(CONSOLE, Message::Heartbeat), later, &mut timers), Effect::OperatorContact);
        assert!(!timers.comms.overflow(later));
    }

    #[test]
    fn own_address_heartbeat_is_ignored_even_with_console_bit() {
        let t0 = Instant::now();
        let own = SystemAddress(0x4099);
        let mut tel = Telemetry::new(own, SafeZone::default());
        let mut timers = TimerBank::new(Duration::from_secs(600), t0);
        let later = t0 + Duration::from_secs(900);
        assert_eq!(tel.apply(&Envelope::new(own, Message::Heartbeat), later, &mut timers), Effect::None);
        assert!(timers.comms.overflow(later));
    }

    #[test]
    fn underwater_medium_keeps_comms_alive() {
        let (mut tel, mut timers, t0) = fixture();
        let later = t0 + Duration::from_secs(900);
        let effect = tel.apply(&Envelope::new(VEHICLE, Message::VehicleMedium { medium: Medium::Underwater }), later, &mut timers);
        assert_eq!(effect, Effect::Submerged);
        assert!(!timers.comms.overflow(later));
        assert!(tel.medium().is_underwater());
        assert!(tel.medium().in_water());
    }

    #[test]
    fn medium_tracker_records_transitions() {
        let (mut tel, mut timers, t0) = fixture();
        tel.apply(&Envelope::new(VEHICLE, Message::VehicleMedium { medium: Medium::Water }), t0, &mut timers);
        let dive = t0 + Duration::from_secs(10);
        tel.apply(&Envelope::new(VEHICLE, Message::VehicleMedium { medium: Medium::Underwater }), dive, &mut timers);
        tel.apply(&Envelope::new(VEHICLE, Message::VehicleMedium { medium: Medium::Underwater }), dive + Duration::from_secs(5), &mut timers);
        assert_eq!(tel.medium().previous(), Medium::Water);
        assert_eq!(tel.medium().since_transition(dive + Duration::from_secs(7)), Some(Duration::from_secs(7)));
    }

    #[test]
    fn plan_control_from_elsewhere_is_external() {
        let (mut tel, mut timers, t0) = fixture();
        let body = Message::PlanControl { plan_id: "survey".into() };
        assert_eq!(tel.apply(&Envelope::new(VEHICLE, body.clone()), t0, &mut timers), Effect::None);
        assert_eq!(tel.apply(&Envelope::new(CONSOLE, body), t0, &mut timers), Effect::ExternalControl(CONSOLE));
    }

    #[test]
    fn position_updates_proximity() {
        let (mut tel, mut timers, t0) = fixture();
        assert!(tel.is_near(), "optimistic until the first fix");

        let far = EstimatedState { lat: 41.0, lon: -8.0, height: 0.0, x: 200.0, y: 0.0 };
        tel.apply(&Envelope::new(VEHICLE, Message::EstimatedState(far)), t0, &mut timers);
        assert!(!tel.is_near());

        let close = EstimatedState { lat: 41.0, lon: -8.0, height: 0.0, x: 20.0, y: 20.0 };
        tel.apply(&Envelope::new(VEHICLE, Message::EstimatedState(close)), t0, &mut timers);
        assert!(tel.is_near());
        assert!(tel.last_fix().is_some());
    }

    #[test]
    fn no_reference_means_always_near() {
        let t0 = Instant::now();
        let mut tel = Telemetry::new(VEHICLE, SafeZone::default());
        let mut timers = TimerBank::new(Duration::from_secs(600), t0);
        let far = EstimatedState { lat: 10.0, lon: 10.0, height: 0.0, x: 1e5, y: 1e5 };
        tel.apply(&Envelope::new(VEHICLE, Message::EstimatedState(far)), t0, &mut timers);
        assert!(tel.is_near());
    }

    #[test]
    fn plan_predicates_follow_last_snapshot() {
        let (mut tel, mut timers, t0) = fixture();
        assert!(!tel.is_idle());
        tel.apply(&Envelope::new(VEHICLE, pcs(PlanState::Blocked, PlanOutcome::Failure)), t0, &mut timers);
        assert!(tel.is_idle());
        assert!(tel.has_failed());
        tel.apply(&Envelope::new(VEHICLE, pcs(PlanState::Executing, PlanOutcome::Success)), t0, &mut timers);
        assert!(!tel.is_idle());
        assert!(!tel.has_failed());
    }
}
