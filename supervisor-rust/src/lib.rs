//! # safety_supervisor
//!
//! Watches a vehicle's telemetry and, when nobody is in control, either sends
//! it to a configured safe zone or requests a recovery maneuver: surface when
//! submerged, keep station when afloat.
//!
//! [`supervisor::Supervisor`] owns the state and is driven by the runtime;
//! [`engine`] holds the policy itself.

pub mod audit;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod http;
pub mod runtime;
pub mod supervisor;
pub mod telemetry;
pub mod timer;

pub use config::{SupervisorConfig, SupervisorParams};
pub use dispatch::{DirectiveSink, DispatchError};
pub use engine::{Decision, Directive, Maneuver};
pub use supervisor::{Notice, StatusReport, Supervisor};
