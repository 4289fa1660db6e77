//! # engine
//!
//! The periodic decision policy. [`decide`] is pure: it reads a
//! [`DecisionInputs`] snapshot and returns one [`Decision`]; it never touches
//! a clock, a timer or the bus.
//!
//! ## Priority
//!
//! The policy is the ordered [`RULES`] guard table followed by maneuver
//! selection. The first guard that fires wins, so a step can only be reached
//! when every step above it declined:
//!
//! 1. cold start: not every telemetry source has reported yet
//! 2. out of water: never actuate on deck or in the air
//! 3. safety override: unsafe ⇒ go to the safe zone, pre-empting all else
//! 4. policy disabled: neither keep-station nor ascend is allowed
//! 5. not degraded: only intervene in service/error mode
//! 6. busy: never interrupt a running plan
//! 7. failure cooldown: rate-limit retries after a failed plan
//! 8. maneuver selection: ascend underwater, keep station at the surface

use serde::Serialize;

// ── Inputs ────────────────────────────────────────────────────────────────────

/// Everything the policy looks at, flattened to booleans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecisionInputs {
    /// Vehicle state, medium and plan-control state have all reported
    pub ready: bool,
    pub in_water: bool,
    pub underwater: bool,
    /// Close to the safe zone, or no safe zone configured
    pub near_safe_zone: bool,
    /// A go-to-safe-zone directive is outstanding
    pub safety_active: bool,
    /// A self-issued recovery directive is outstanding
    pub issued_self: bool,
    pub comms_overflowed: bool,
    pub degraded: bool,
    pub idle: bool,
    pub has_failed: bool,
    pub fail_cooldown_elapsed: bool,
    pub keep_station: bool,
    pub ascend: bool,
}

// ── Safety Assessment ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SafeBecause {
    NearSafeZone,
    AlreadyHeadingToSafety,
    OperatorContact,
    NoRiskCondition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsafeBecause {
    /// Fault reported and nothing running: likely adrift
    DriftingWhileDegraded,
    /// Running a plan this supervisor requested, with nobody watching
    SelfIssuedPlanActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "verdict", content = "reason")]
pub enum Safety {
    Safe(SafeBecause),
    Unsafe(UnsafeBecause),
}

impl Safety {
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe(_))
    }
}

/// Does the vehicle need to be sent to the safe zone?
pub fn assess_safety(i: &DecisionInputs) -> Safety {
    if i.near_safe_zone {
        return Safety::Safe(SafeBecause::NearSafeZone);
    }
    if i.safety_active {
        return Safety::Safe(SafeBecause::AlreadyHeadingToSafety);
    }
    if !i.comms_overflowed {
        return Safety::Safe(SafeBecause::OperatorContact);
    }
    if i.degraded && i.idle {
        return Safety::Unsafe(UnsafeBecause::DriftingWhileDegraded);
    }
    if i.issued_self {
        return Safety::Unsafe(UnsafeBecause::SelfIssuedPlanActive);
    }
    Safety::Safe(SafeBecause::NoRiskCondition)
}

// ── Directives ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Maneuver {
    SafeZone,
    Surface,
    StationKeep,
}

impl Maneuver {
    fn base_id(&self) -> &'static str {
        match self {
            Self::SafeZone => "zone",
            Self::Surface => "surface",
            Self::StationKeep => "sk",
        }
    }
}

/// Marker prepended to the plan id of failure-recovery and safe-zone plans.
pub const SAFETY_PREFIX: &str = "safety_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Directive {
    pub maneuver: Maneuver,
    /// Issued because the previous plan failed
    pub failure_retry: bool,
}

impl Directive {
    pub fn safe_zone() -> Self {
        Self { maneuver: Maneuver::SafeZone, failure_retry: false }
    }

    /// `safety_zone`, `safety_surface`, `safety_sk`, `surface` or `sk`.
    pub fn plan_id(&self) -> String {
        let prefix = match self.maneuver {
            Maneuver::SafeZone => SAFETY_PREFIX,
            _ if self.failure_retry => SAFETY_PREFIX,
            _ => "",
        };
        format!("{prefix}{}", self.maneuver.base_id())
    }
}

// ── Decisions ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    NotReady,
    OutOfWater,
    PolicyDisabled,
    NotDegraded,
    PlanRunning,
    FailureCooldown,
    /// The maneuver for the current medium is disabled
    ManeuverDisabled { failure_retry: bool },
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Decision {
    Hold { reason: HoldReason },
    GoToSafeZone { cause: UnsafeBecause },
    Recover { directive: Directive },
}

impl Decision {
    fn hold(reason: HoldReason) -> Option<Self> {
        Some(Self::Hold { reason })
    }

    /// Whether this cycle used up the failure-retry slot, and the fail
    /// timer must restart. Also true when the retry found its maneuver
    /// disabled: the slot is consumed before the medium is checked.
    pub fn consumes_failure_retry(&self) -> bool {
        match self {
            Self::Recover { directive } => directive.failure_retry,
            Self::Hold { reason: HoldReason::ManeuverDisabled { failure_retry } } => *failure_retry,
            _ => false,
        }
    }

    pub fn directive(&self) -> Option<Directive> {
        match self {
            Self::Hold { .. } => None,
            Self::GoToSafeZone { .. } => Some(Directive::safe_zone()),
            Self::Recover { directive } => Some(*directive),
        }
    }
}

// ── Rule Table ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleName {
    ColdStart,
    OutOfWater,
    SafetyOverride,
    PolicyDisabled,
    NotDegraded,
    Busy,
    FailureCooldown,
    ManeuverSelection,
}

pub struct Rule {
    pub name: RuleName,
    pub check: fn(&DecisionInputs) -> Option<Decision>,
}

pub const RULES: &[Rule] = &[
    Rule { name: RuleName::ColdStart, check: cold_start },
    Rule { name: RuleName::OutOfWater, check: out_of_water },
    Rule { name: RuleName::SafetyOverride, check: safety_override },
    Rule { name: RuleName::PolicyDisabled, check: policy_disabled },
    Rule { name: RuleName::NotDegraded, check: not_degraded },
    Rule { name: RuleName::Busy, check: busy },
    Rule { name: RuleName::FailureCooldown, check: failure_cooldown },
];

fn cold_start(i: &DecisionInputs) -> Option<Decision> {
    if i.ready { None } else { Decision::hold(HoldReason::NotReady) }
}

fn out_of_water(i: &DecisionInputs) -> Option<Decision> {
    if i.in_water { None } else { Decision::hold(HoldReason::OutOfWater) }
}

fn safety_override(i: &DecisionInputs) -> Option<Decision> {
    match assess_safety(i) {
        Safety::Safe(_) => None,
        Safety::Unsafe(cause) => Some(Decision::GoToSafeZone { cause }),
    }
}

fn policy_disabled(i: &DecisionInputs) -> Option<Decision> {
    if i.keep_station || i.ascend { None } else { Decision::hold(HoldReason::PolicyDisabled) }
}

fn not_degraded(i: &DecisionInputs) -> Option<Decision> {
    if i.degraded { None } else { Decision::hold(HoldReason::NotDegraded) }
}

fn busy(i: &DecisionInputs) -> Option<Decision> {
    if i.idle { None } else { Decision::hold(HoldReason::PlanRunning) }
}

fn failure_cooldown(i: &DecisionInputs) -> Option<Decision> {
    if i.has_failed && !i.fail_cooldown_elapsed {
        Decision::hold(HoldReason::FailureCooldown)
    } else {
        None
    }
}

// Reached only past the cooldown, so a failed last outcome means a retry.
fn maneuver_selection(i: &DecisionInputs) -> Decision {
    let failure_retry = i.has_failed;
    let (maneuver, enabled) = if i.underwater {
        (Maneuver::Surface, i.ascend)
    } else {
        (Maneuver::StationKeep, i.keep_station)
    };
    if !enabled {
        return Decision::Hold { reason: HoldReason::ManeuverDisabled { failure_retry } };
    }
    Decision::Recover { directive: Directive { maneuver, failure_retry } }
}

/// Run the guard table, then select a maneuver if no guard fired; returns
/// the deciding rule and its decision.
pub fn evaluate(i: &DecisionInputs) -> (RuleName, Decision) {
    RULES
        .iter()
        .find_map(|rule| (rule.check)(i).map(|decision| (rule.name, decision)))
        .unwrap_or_else(|| (RuleName::ManeuverSelection, maneuver_selection(i)))
}

pub fn decide(i: &DecisionInputs) -> Decision {
    evaluate(i).1
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ready, afloat at the surface, degraded and idle, with operator contact
    /// and both maneuvers enabled.
    fn base() -> DecisionInputs {
        DecisionInputs {
            ready: true,
            in_water: true,
            underwater: false,
            near_safe_zone: false,
            safety_active: false,
            issued_self: false,
            comms_overflowed: false,
            degraded: true,
            idle: true,
            has_failed: false,
            fail_cooldown_elapsed: false,
            keep_station: true,
            ascend: true,
        }
    }

    fn lost_comms() -> DecisionInputs {
        DecisionInputs { comms_overflowed: true, ..base() }
    }

    #[test]
    fn rule_order_is_fixed() {
        let names: Vec<_> = RULES.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec![
                RuleName::ColdStart,
                RuleName::OutOfWater,
                RuleName::SafetyOverride,
                RuleName::PolicyDisabled,
                RuleName::NotDegraded,
                RuleName::Busy,
                RuleName::FailureCooldown,
            ]
        );
    }

    #[test]
    fn maneuver_selection_decides_when_no_guard_fires() {
        let (rule, decision) = evaluate(&base());
        assert_eq!(rule, RuleName::ManeuverSelection);
        assert!(matches!(decision, Decision::Recover { .. }));

        let (rule, decision) = evaluate(&DecisionInputs { keep_station: false, ..base() });
        assert_eq!(rule, RuleName::ManeuverSelection);
        assert_eq!(
            decision,
            Decision::Hold { reason: HoldReason::ManeuverDisabled { failure_retry: false } }
        );
    }

    #[test]
    fn plan_ids() {
        assert_eq!(Directive::safe_zone().plan_id(), "safety_zone");
        let surface = Directive { maneuver: Maneuver::Surface, failure_retry: false };
        assert_eq!(surface.plan_id(), "surface");
        assert_eq!(Directive { failure_retry: true, ..surface }.plan_id(), "safety_surface");
        let sk = Directive { maneuver: Maneuver::StationKeep, failure_retry: false };
        assert_eq!(sk.plan_id(), "sk");
        assert_eq!(Directive { failure_retry: true, ..sk }.plan_id(), "safety_sk");
    }

    // ── safety assessment ──

    #[test]
    fn near_safe_zone_is_safe_whatever_else() {
        let i = DecisionInputs { near_safe_zone: true, issued_self: true, ..lost_comms() };
        assert_eq!(assess_safety(&i), Safety::Safe(SafeBecause::NearSafeZone));
    }

    #[test]
    fn outstanding_safety_directive_is_safe() {
        let i = DecisionInputs { safety_active: true, ..lost_comms() };
        assert_eq!(assess_safety(&i), Safety::Safe(SafeBecause::AlreadyHeadingToSafety));
    }

    #[test]
    fn operator_contact_is_safe() {
        assert_eq!(assess_safety(&base()), Safety::Safe(SafeBecause::OperatorContact));
    }

    #[test]
    fn drifting_while_degraded_is_unsafe() {
        assert_eq!(assess_safety(&lost_comms()), Safety::Unsafe(UnsafeBecause::DriftingWhileDegraded));
    }

    #[test]
    fn self_issued_plan_without_supervision_is_unsafe() {
        let i = DecisionInputs { degraded: false, idle: false, issued_self: true, ..lost_comms() };
        assert_eq!(assess_safety(&i), Safety::Unsafe(UnsafeBecause::SelfIssuedPlanActive));
    }

    #[test]
    fn no_risk_defaults_to_safe() {
        let i = DecisionInputs { degraded: false, ..lost_comms() };
        assert_eq!(assess_safety(&i), Safety::Safe(SafeBecause::NoRiskCondition));
        let i = DecisionInputs { idle: false, ..lost_comms() };
        assert_eq!(assess_safety(&i), Safety::Safe(SafeBecause::NoRiskCondition));
    }

    // ── rules, in order ──

    #[test]
    fn cold_start_blocks_everything() {
        let i = DecisionInputs { ready: false, ..lost_comms() };
        assert_eq!(evaluate(&i), (RuleName::ColdStart, Decision::Hold { reason: HoldReason::NotReady }));
    }

    #[test]
    fn out_of_water_blocks_even_unsafe() {
        let i = DecisionInputs { in_water: false, ..lost_comms() };
        assert_eq!(evaluate(&i), (RuleName::OutOfWater, Decision::Hold { reason: HoldReason::OutOfWater }));
    }

    #[test]
    fn unsafe_sends_to_safe_zone_only() {
        let (rule, decision) = evaluate(&lost_comms());
        assert_eq!(rule, RuleName::SafetyOverride);
        assert_eq!(decision, Decision::GoToSafeZone { cause: UnsafeBecause::DriftingWhileDegraded });
        assert_eq!(decision.directive(), Some(Directive::safe_zone()));
        assert!(!decision.consumes_failure_retry());
    }

    #[test]
    fn safety_override_ignores_disabled_policy() {
        let i = DecisionInputs { keep_station: false, ascend: false, ..lost_comms() };
        assert!(matches!(decide(&i), Decision::GoToSafeZone { .. }));
    }

    #[test]
    fn disabled_policy_never_recovers() {
        for degraded in [false, true] {
            for idle in [false, true] {
                let i = DecisionInputs { keep_station: false, ascend: false, degraded, idle, ..base() };
                assert_eq!(decide(&i), Decision::Hold { reason: HoldReason::PolicyDisabled });
            }
        }
    }

    #[test]
    fn healthy_vehicle_is_left_alone() {
        let i = DecisionInputs { degraded: false, ..base() };
        assert_eq!(decide(&i), Decision::Hold { reason: HoldReason::NotDegraded });
    }

    #[test]
    fn running_plan_is_not_interrupted() {
        let i = DecisionInputs { idle: false, ..base() };
        assert_eq!(decide(&i), Decision::Hold { reason: HoldReason::PlanRunning });
    }

    #[test]
    fn failure_waits_for_cooldown() {
        let i = DecisionInputs { has_failed: true, underwater: true, ..base() };
        assert_eq!(decide(&i), Decision::Hold { reason: HoldReason::FailureCooldown });

        let i = DecisionInputs { fail_cooldown_elapsed: true, ..i };
        let decision = decide(&i);
        assert_eq!(
            decision,
            Decision::Recover { directive: Directive { maneuver: Maneuver::Surface, failure_retry: true } }
        );
        assert!(decision.consumes_failure_retry());
        assert_eq!(decision.directive().map(|d| d.plan_id()), Some("safety_surface".to_string()));
    }

    #[test]
    fn elapsed_cooldown_without_failure_is_a_plain_recovery() {
        let i = DecisionInputs { fail_cooldown_elapsed: true, ..base() };
        let decision = decide(&i);
        assert_eq!(decision.directive().map(|d| d.plan_id()), Some("sk".to_string()));
        assert!(!decision.consumes_failure_retry());
    }

    #[test]
    fn medium_selects_maneuver() {
        let surface = decide(&base());
        assert_eq!(surface.directive().map(|d| d.maneuver), Some(Maneuver::StationKeep));

        let under = decide(&DecisionInputs { underwater: true, ..base() });
        assert_eq!(under.directive().map(|d| d.maneuver), Some(Maneuver::Surface));
    }

    #[test]
    fn disabled_maneuver_for_medium_holds() {
        let i = DecisionInputs { underwater: true, ascend: false, ..base() };
        assert_eq!(decide(&i), Decision::Hold { reason: HoldReason::ManeuverDisabled { failure_retry: false } });

        let i = DecisionInputs { underwater: false, keep_station: false, ..base() };
        assert_eq!(decide(&i), Decision::Hold { reason: HoldReason::ManeuverDisabled { failure_retry: false } });
    }

    #[test]
    fn disabled_maneuver_still_consumes_failure_retry() {
        let i = DecisionInputs {
            underwater: true,
            ascend: false,
            has_failed: true,
            fail_cooldown_elapsed: true,
            ..base()
        };
        let decision = decide(&i);
        assert_eq!(decision, Decision::Hold { reason: HoldReason::ManeuverDisabled { failure_retry: true } });
        assert!(decision.consumes_failure_retry());
        assert_eq!(decision.directive(), None);
    }

    #[test]
    fn never_acts_when_not_ready_exhaustive() {
        // every combination of the remaining twelve flags
        for bits in 0u16..(1 << 12) {
            let b = |n: u16| bits & (1 << n) != 0;
            let i = DecisionInputs {
                ready: false,
                in_water: b(0),
                underwater: b(1),
                near_safe_zone: b(2),
                safety_active: b(3),
                issued_self: b(4),
                comms_overflowed: b(5),
                degraded: b(6),
                idle: b(7),
                has_failed: b(8),
                fail_cooldown_elapsed: b(9),
                keep_station: b(10),
                ascend: b(11),
            };
            assert_eq!(decide(&i).directive(), None);
            let dry = DecisionInputs { ready: true, in_water: false, ..i };
            assert_eq!(decide(&dry).directive(), None);
        }
    }
}
