//! # supervisor
//!
//! Single owner of all supervisory state. Inbound messages go through
//! [`Supervisor::handle`], the periodic cycle through [`Supervisor::tick`];
//! the host must serialize the two (the runtime does so by owning the
//! supervisor in one task), so a decision always sees a consistent snapshot.

use std::time::Instant;

use safety_types::{EntityStatus, Envelope, Medium, SystemAddress, Wgs84Point};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, SupervisorConfig, SupervisorParams};
use crate::dispatch::{DirectiveSink, Dispatcher};
use crate::engine::{self, Decision, DecisionInputs, HoldReason, RuleName};
use crate::telemetry::{Effect, SafeZone, Telemetry};
use crate::timer::TimerBank;

/// Something the host may want to record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Outstanding self-issued directives were dropped for another authority
    Relinquished { by: SystemAddress },
}

/// Serializable view for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub system_id: SystemAddress,
    pub ready: bool,
    pub readiness: u8,
    pub medium: Medium,
    pub degraded: bool,
    pub idle: bool,
    pub has_failed: bool,
    pub near_safe_zone: bool,
    pub last_fix: Option<Wgs84Point>,
    pub issued_self: bool,
    pub safety_active: bool,
    pub comms_remaining_s: f64,
    pub fail_cooldown_remaining_s: f64,
    pub entity: EntityStatus,
    pub last_rule: Option<RuleName>,
    pub last_decision: Option<Decision>,
    pub messages_sent: u64,
    pub failed_sends: u64,
    pub params: SupervisorParams,
    pub stopped: bool,
}

pub struct Supervisor<S> {
    params: SupervisorParams,
    telemetry: Telemetry,
    timers: TimerBank,
    dispatcher: Dispatcher<S>,
    last: Option<(RuleName, Decision)>,
    stopped: bool,
}

impl<S: DirectiveSink> Supervisor<S> {
    /// Start a session: timers begin counting at `now` and IDLE is announced.
    pub fn new(
        own: SystemAddress,
        params: SupervisorParams,
        safe_zone: SafeZone,
        sink: S,
        now: Instant,
    ) -> Self {
        let mut dispatcher = Dispatcher::new(own, sink);
        dispatcher.announce_idle();
        Self {
            params,
            telemetry: Telemetry::new(own, safe_zone),
            timers: TimerBank::new(params.lost_comms_timeout(), now),
            dispatcher,
            last: None,
            stopped: false,
        }
    }

    pub fn from_config(cfg: &SupervisorConfig, sink: S, now: Instant) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self::new(
            cfg.system_address(),
            cfg.policy,
            cfg.safe_zone.to_safe_zone()?,
            sink,
            now,
        ))
    }

    /// Fold one inbound message, received at `at`, into the state.
    pub fn handle(&mut self, env: &Envelope, at: Instant) -> Option<Notice> {
        debug!("← {} from {}", env.body.name(), env.src);
        match self.telemetry.apply(env, at, &mut self.timers) {
            Effect::ExternalControl(by) => {
                if self.dispatcher.relinquish() {
                    info!("🤝 Plan control taken over by {by}, relinquishing");
                    return Some(Notice::Relinquished { by });
                }
                None
            }
            Effect::OperatorContact | Effect::Submerged | Effect::None => None,
        }
    }

    /// Snapshot the policy inputs at `now`.
    pub fn inputs(&self, now: Instant) -> DecisionInputs {
        let medium = self.telemetry.medium();
        DecisionInputs {
            ready: self.telemetry.is_ready(),
            in_water: medium.in_water(),
            underwater: medium.is_underwater(),
            near_safe_zone: self.telemetry.is_near(),
            safety_active: self.dispatcher.safety_active(),
            issued_self: self.dispatcher.issued_self(),
            comms_overflowed: self.timers.comms.overflow(now),
            degraded: self.telemetry.is_degraded(),
            idle: self.telemetry.is_idle(),
            has_failed: self.telemetry.has_failed(),
            fail_cooldown_elapsed: self.timers.fail.overflow(now),
            keep_station: self.params.keep_station_at_surface,
            ascend: self.params.ascend_with_actuation,
        }
    }

    /// One decision cycle. Issues at most one directive.
    pub fn tick(&mut self, now: Instant) -> Decision {
        if self.stopped {
            return Decision::Hold { reason: HoldReason::Stopped };
        }

        let (rule, decision) = engine::evaluate(&self.inputs(now));

        if decision.consumes_failure_retry() {
            self.timers.fail.reset(now);
        }

        match decision {
            Decision::GoToSafeZone { cause } => {
                warn!("⚠ Vehicle unsafe ({cause:?}), sending it to the safe zone");
                self.timers.comms.reset(now);
                self.dispatcher.go_to_safe_zone();
            }
            Decision::Recover { directive } => {
                info!(
                    "Vehicle degraded and idle, requesting {:?} (failure retry: {})",
                    directive.maneuver, directive.failure_retry
                );
                self.dispatcher.recover(directive);
            }
            Decision::Hold { reason } => {
                if self.last.map(|(_, d)| d) != Some(decision) {
                    debug!("Holding: {reason:?}");
                }
            }
        }

        self.last = Some((rule, decision));
        decision
    }

    /// Apply new policy parameters. A changed timeout restarts the comms timer.
    pub fn update_parameters(&mut self, params: SupervisorParams, now: Instant) -> Result<(), ConfigError> {
        params.validate()?;
        if params.lost_comms_timeout_s != self.params.lost_comms_timeout_s {
            self.timers.comms.set_top(params.lost_comms_timeout(), now);
        }
        info!(
            "Parameters updated: timeout={}s keep_station={} ascend={}",
            params.lost_comms_timeout_s, params.keep_station_at_surface, params.ascend_with_actuation
        );
        self.params = params;
        Ok(())
    }

    /// No directive is issued after this.
    pub fn stop(&mut self) {
        if !self.stopped {
            info!("Supervisor stopped");
        }
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn params(&self) -> &SupervisorParams {
        &self.params
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn timers(&self) -> &TimerBank {
        &self.timers
    }

    pub fn dispatcher(&self) -> &Dispatcher<S> {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<S> {
        &mut self.dispatcher
    }

    pub fn last_decision(&self) -> Option<(RuleName, Decision)> {
        self.last
    }

    pub fn status(&self, now: Instant) -> StatusReport {
        let medium = self.telemetry.medium();
        StatusReport {
            system_id: self.telemetry.own_address(),
            ready: self.telemetry.is_ready(),
            readiness: self.telemetry.readiness().bits(),
            medium: medium.current(),
            degraded: self.telemetry.is_degraded(),
            idle: self.telemetry.is_idle(),
            has_failed: self.telemetry.has_failed(),
            near_safe_zone: self.telemetry.is_near(),
            last_fix: self.telemetry.last_fix(),
            issued_self: self.dispatcher.issued_self(),
            safety_active: self.dispatcher.safety_active(),
            comms_remaining_s: self.timers.comms.remaining(now).as_secs_f64(),
            fail_cooldown_remaining_s: self.timers.fail.remaining(now).as_secs_f64(),
            entity: self.dispatcher.status(),
            last_rule: self.last.map(|(r, _)| r),
            last_decision: self.last.map(|(_, d)| d),
            messages_sent: self.dispatcher.sent(),
            failed_sends: self.dispatcher.failed_sends(),
            params: self.params,
            stopped: self.stopped,
        }
    }
}
