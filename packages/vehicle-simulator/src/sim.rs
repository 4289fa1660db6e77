//! sim.rs — One simulated vehicle plus its operator console
//!
//! `step` advances the world and returns the envelopes to put on the bus;
//! `on_envelope` reacts to what the supervisor sends back.

use rand::Rng;
use safety_types::{Envelope, GenerationOp, Message, SystemAddress};
use tracing::{debug, info, warn};

use crate::scenarios::ScenarioConfig;
use crate::vehicle::{PlanEvent, VehicleModel};

/// Plan the operator switches to when taking over.
pub const OPERATOR_PLAN: &str = "operator_recovery";

pub struct Sim {
    pub vehicle: VehicleModel,
    scenario: ScenarioConfig,
    vehicle_addr: SystemAddress,
    console_addr: SystemAddress,
    heartbeat_period_s: f64,
    t_s: f64,
    last_heartbeat_s: Option<f64>,
    took_over: bool,
    console_was_online: bool,
}

impl Sim {
    pub fn new(
        vehicle: VehicleModel,
        scenario: ScenarioConfig,
        vehicle_addr: SystemAddress,
        console_addr: SystemAddress,
        heartbeat_period_s: f64,
    ) -> Self {
        Self {
            vehicle,
            scenario,
            vehicle_addr,
            console_addr,
            heartbeat_period_s,
            t_s: 0.0,
            last_heartbeat_s: None,
            took_over: false,
            console_was_online: true,
        }
    }

    pub fn elapsed_s(&self) -> f64 {
        self.t_s
    }

    /// Advance `dt` seconds; returns the traffic for this epoch.
    pub fn step<R: Rng + ?Sized>(&mut self, dt: f64, rng: &mut R) -> Vec<Envelope> {
        self.t_s += dt;
        if let Some(ev) = self.vehicle.tick(dt, rng) {
            log_event(&ev);
        }

        let mut out: Vec<Envelope> = self
            .vehicle
            .telemetry()
            .into_iter()
            .map(|body| Envelope::new(self.vehicle_addr, body))
            .collect();

        let online = self.scenario.console_online(self.t_s);
        if self.console_was_online && !online {
            warn!("📴 Console link lost at t={:.0}s", self.t_s);
        }
        self.console_was_online = online;

        if online {
            let due = self
                .last_heartbeat_s
                .map_or(true, |last| self.t_s - last >= self.heartbeat_period_s);
            if due {
                self.last_heartbeat_s = Some(self.t_s);
                out.push(Envelope::new(self.console_addr, Message::Heartbeat));
            }
        }

        if !self.took_over && self.scenario.takeover_due(self.t_s) {
            self.took_over = true;
            info!("🕹 Operator takes over with '{OPERATOR_PLAN}'");
            log_event(&self.vehicle.start_plan(OPERATOR_PLAN));
            out.push(
                Envelope::new(self.console_addr, Message::PlanControl { plan_id: OPERATOR_PLAN.to_string() })
                    .to(self.vehicle_addr),
            );
        }
        out
    }

    /// React to inbound traffic. Only plan-generation requests matter.
    pub fn on_envelope(&mut self, env: &Envelope) -> Option<PlanEvent> {
        match &env.body {
            Message::PlanGeneration(pg) if pg.op == GenerationOp::Request => {
                info!("📥 {} requests plan '{}' ({})", env.src, pg.plan_id, pg.params);
                let ev = self.vehicle.start_plan(&pg.plan_id);
                log_event(&ev);
                Some(ev)
            }
            Message::EntityState(es) => {
                info!("Supervisor status {:?}/{:?}", es.state, es.status);
                None
            }
            other => {
                debug!("Ignoring {} from {}", other.name(), env.src);
                None
            }
        }
    }
}

fn log_event(ev: &PlanEvent) {
    match ev {
        PlanEvent::Started(id) => info!("▶ Plan '{id}' started"),
        PlanEvent::Completed(id) => info!("✅ Plan '{id}' completed"),
        PlanEvent::Failed(id) => warn!("❌ Plan '{id}' failed"),
    }
}
