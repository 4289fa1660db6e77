//! # dispatch
//!
//! Builds and emits plan-generation requests, remembers which directives the
//! supervisor itself has outstanding, and publishes the task's entity status.
//!
//! Delivery is the transport's problem. A failed send is logged and counted,
//! but the directive still counts as issued: the next decision cycle sees the
//! outstanding flag exactly as if the vehicle had received it.

use safety_types::{
    EntityActivity, EntityStatus, Envelope, GenerationCmd, GenerationOp, Message, PlanGeneration,
    SystemAddress, WireError,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::engine::Directive;

/// Fixed generation parameters: skip recalibration, ignore minor errors.
pub const DIRECTIVE_PARAMS: &str = "calibrate=false;ignore_errors=true";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("send failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport closed")]
    Closed,
}

/// Outbound half of the bus.
pub trait DirectiveSink: Send {
    fn send(&mut self, env: &Envelope) -> Result<(), DispatchError>;
}

/// Records everything; used for dry runs and tests.
impl DirectiveSink for Vec<Envelope> {
    fn send(&mut self, env: &Envelope) -> Result<(), DispatchError> {
        self.push(env.clone());
        Ok(())
    }
}

pub struct Dispatcher<S> {
    own: SystemAddress,
    sink: S,
    issued_self: bool,
    safety_active: bool,
    status: EntityStatus,
    sent: u64,
    failed_sends: u64,
}

impl<S: DirectiveSink> Dispatcher<S> {
    pub fn new(own: SystemAddress, sink: S) -> Self {
        Self {
            own,
            sink,
            issued_self: false,
            safety_active: false,
            status: EntityStatus::normal(EntityActivity::Idle),
            sent: 0,
            failed_sends: 0,
        }
    }

    /// Publish the initial IDLE status.
    pub fn announce_idle(&mut self) {
        let body = Message::EntityState(self.status);
        self.emit(body);
    }

    /// Request the go-to-safe-zone plan. Entity status is left as it was.
    pub fn go_to_safe_zone(&mut self) {
        self.safety_active = true;
        self.request(Directive::safe_zone());
    }

    /// Request a recovery maneuver and mark the supervisor as intervening.
    pub fn recover(&mut self, directive: Directive) {
        self.issued_self = true;
        self.request(directive);
        self.set_activity(EntityActivity::Active);
    }

    /// Another authority took over plan control. Returns whether anything
    /// outstanding was dropped.
    pub fn relinquish(&mut self) -> bool {
        let had = self.issued_self || self.safety_active;
        self.issued_self = false;
        self.safety_active = false;
        had
    }

    fn request(&mut self, directive: Directive) {
        let plan_id = directive.plan_id();
        info!("🛟 Requesting plan '{plan_id}'");
        self.emit(Message::PlanGeneration(PlanGeneration {
            op: GenerationOp::Request,
            cmd: GenerationCmd::Execute,
            plan_id,
            params: DIRECTIVE_PARAMS.to_string(),
        }));
    }

    /// Emits an entity-state update only when the activity changes.
    pub fn set_activity(&mut self, activity: EntityActivity) {
        if self.status.status == activity {
            return;
        }
        self.status = EntityStatus::normal(activity);
        self.emit(Message::EntityState(self.status));
    }

    fn emit(&mut self, body: Message) {
        let name = body.name();
        match self.sink.send(&Envelope::new(self.own, body)) {
            Ok(()) => self.sent += 1,
            Err(e) => {
                self.failed_sends += 1;
                warn!("Dispatch: {name} not delivered: {e}");
            }
        }
    }

    pub fn issued_self(&self) -> bool {
        self.issued_self
    }

    pub fn safety_active(&self) -> bool {
        self.safety_active
    }

    pub fn status(&self) -> EntityStatus {
        self.status
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn failed_sends(&self) -> u64 {
        self.failed_sends
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
