//! # config
//!
//! TOML configuration for the supervisor. Values are validated once at load
//! time; the decision core never sees an out-of-range parameter.

use std::path::{Path, PathBuf};
use std::time::Duration;

use safety_types::{SystemAddress, Wgs84Point};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::telemetry::{SafeZone, DEFAULT_SAFE_ZONE_RADIUS_M};

/// Built-in configuration, used when no file is given or it cannot be read.
pub const DEFAULT_CONFIG: &str = include_str!("../config.toml");

pub const MIN_LOST_COMMS_TIMEOUT_S: f64 = 60.0;
pub const DEFAULT_LOST_COMMS_TIMEOUT_S: f64 = 600.0;
/// One week.
pub const MAX_LOST_COMMS_TIMEOUT_S: f64 = 604_800.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("lost comms timeout {0}s is below the 60s minimum")]
    LostCommsTimeoutTooShort(f64),
    #[error("lost comms timeout {0}s exceeds the one week maximum")]
    LostCommsTimeoutTooLong(f64),
    #[error("safe zone needs both lat and lon")]
    IncompleteSafeZone,
    #[error("safe zone reference ({lat}, {lon}) is not a valid WGS-84 position")]
    InvalidSafeZone { lat: f64, lon: f64 },
    #[error("safe zone radius must be positive, got {0}")]
    InvalidRadius(f64),
    #[error("tick period must be non-zero")]
    ZeroTickPeriod,
}

// ── Sections ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSection {
    /// Bus address of the vehicle this supervisor runs on
    pub system_id: u16,
    pub tick_period_ms: u64,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self { system_id: 0x0020, tick_period_ms: 1000 }
    }
}

/// The recovery policy; may be changed while running.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorParams {
    /// Seconds without operator contact before the vehicle counts as unsupervised
    pub lost_comms_timeout_s: f64,
    /// Keep station once the vehicle is at the surface
    pub keep_station_at_surface: bool,
    /// Execute a popup rather than relying on natural buoyancy
    pub ascend_with_actuation: bool,
}

impl Default for SupervisorParams {
    fn default() -> Self {
        Self {
            lost_comms_timeout_s: DEFAULT_LOST_COMMS_TIMEOUT_S,
            keep_station_at_surface: true,
            ascend_with_actuation: true,
        }
    }
}

impl SupervisorParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.lost_comms_timeout_s >= MIN_LOST_COMMS_TIMEOUT_S) {
            return Err(ConfigError::LostCommsTimeoutTooShort(self.lost_comms_timeout_s));
        }
        if !(self.lost_comms_timeout_s <= MAX_LOST_COMMS_TIMEOUT_S) {
            return Err(ConfigError::LostCommsTimeoutTooLong(self.lost_comms_timeout_s));
        }
        Ok(())
    }

    /// The timeout as a `Duration`, clamped to the accepted range.
    pub fn lost_comms_timeout(&self) -> Duration {
        let secs = self
            .lost_comms_timeout_s
            .clamp(MIN_LOST_COMMS_TIMEOUT_S, MAX_LOST_COMMS_TIMEOUT_S);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(Duration::from_secs(DEFAULT_LOST_COMMS_TIMEOUT_S as u64))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeZoneConfig {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub radius_m: f64,
}

impl Default for SafeZoneConfig {
    fn default() -> Self {
        Self { lat: None, lon: None, radius_m: DEFAULT_SAFE_ZONE_RADIUS_M }
    }
}

impl SafeZoneConfig {
    pub fn to_safe_zone(&self) -> Result<SafeZone, ConfigError> {
        if !(self.radius_m > 0.0) {
            return Err(ConfigError::InvalidRadius(self.radius_m));
        }
        let reference = match (self.lat, self.lon) {
            (None, None) => None,
            (Some(lat), Some(lon)) => {
                let p = Wgs84Point::new(lat, lon);
                if !p.is_valid() {
                    return Err(ConfigError::InvalidSafeZone { lat, lon });
                }
                Some(p)
            }
            _ => return Err(ConfigError::IncompleteSafeZone),
        };
        Ok(SafeZone { reference, radius_m: self.radius_m })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// UDP address telemetry arrives on
    pub listen_addr: String,
    /// UDP address plan-generation requests are sent to
    pub vehicle_addr: String,
    /// HTTP status port
    pub status_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:6002".to_string(),
            vehicle_addr: "127.0.0.1:6001".to_string(),
            status_port: 9091,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// JSON-lines directive audit file; stdout only when unset
    pub path: Option<PathBuf>,
}

// ── Full Config ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub supervisor: SupervisorSection,
    pub policy: SupervisorParams,
    pub safe_zone: SafeZoneConfig,
    pub network: NetworkConfig,
    pub audit: AuditConfig,
}

impl SupervisorConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read `path`, falling back to the built-in defaults when it is missing.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let raw = match path {
            Some(p) => match std::fs::read_to_string(p) {
                Ok(raw) => {
                    info!("Loaded config from {}", p.display());
                    raw
                }
                Err(e) => {
                    warn!("Could not read {}: {e}, using built-in config", p.display());
                    DEFAULT_CONFIG.to_string()
                }
            },
            None => DEFAULT_CONFIG.to_string(),
        };
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy.validate()?;
        self.safe_zone.to_safe_zone()?;
        if self.supervisor.tick_period_ms == 0 {
            return Err(ConfigError::ZeroTickPeriod);
        }
        Ok(())
    }

    pub fn system_address(&self) -> SystemAddress {
        SystemAddress(self.supervisor.system_id)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.supervisor.tick_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_config_is_valid() {
        let cfg = SupervisorConfig::from_toml_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(cfg.policy.lost_comms_timeout_s, 600.0);
        assert!(cfg.policy.keep_station_at_surface);
        assert!(cfg.policy.ascend_with_actuation);
        assert_eq!(cfg.safe_zone.radius_m, 50.0);
    }

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = SupervisorConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.policy, SupervisorParams::default());
        assert_eq!(cfg.tick_period(), Duration::from_secs(1));
        assert_eq!(cfg.safe_zone.to_safe_zone().unwrap().reference, None);
    }

    #[test]
    fn rejects_short_timeout() {
        let err = SupervisorConfig::from_toml_str("[policy]\nlost_comms_timeout_s = 59.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::LostCommsTimeoutTooShort(t) if t == 59.0));
        assert!(SupervisorConfig::from_toml_str("[policy]\nlost_comms_timeout_s = 60.0\n").is_ok());
    }

    #[test]
    fn rejects_unbounded_timeout() {
        let err = SupervisorConfig::from_toml_str("[policy]\nlost_comms_timeout_s = inf\n").unwrap_err();
        assert!(matches!(err, ConfigError::LostCommsTimeoutTooLong(t) if t.is_infinite()));
        let err = SupervisorConfig::from_toml_str("[policy]\nlost_comms_timeout_s = nan\n").unwrap_err();
        assert!(matches!(err, ConfigError::LostCommsTimeoutTooShort(_)));

        let huge = SupervisorParams { lost_comms_timeout_s: 1e300, ..Default::default() };
        assert!(matches!(huge.validate(), Err(ConfigError::LostCommsTimeoutTooLong(_))));
        let week = SupervisorParams { lost_comms_timeout_s: MAX_LOST_COMMS_TIMEOUT_S, ..Default::default() };
        assert!(week.validate().is_ok());
    }

    #[test]
    fn timeout_conversion_never_panics() {
        let week = Duration::from_secs(604_800);
        for t in [1e300, f64::INFINITY] {
            let p = SupervisorParams { lost_comms_timeout_s: t, ..Default::default() };
            assert_eq!(p.lost_comms_timeout(), week);
        }
        let nan = SupervisorParams { lost_comms_timeout_s: f64::NAN, ..Default::default() };
        assert_eq!(nan.lost_comms_timeout(), Duration::from_secs(600));
        let short = SupervisorParams { lost_comms_timeout_s: 5.0, ..Default::default() };
        assert_eq!(short.lost_comms_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn safe_zone_needs_both_coordinates() {
        let err = SupervisorConfig::from_toml_str("[safe_zone]\nlat = 41.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::IncompleteSafeZone));
    }

    #[test]
    fn safe_zone_bounds_and_radius() {
        let err = SupervisorConfig::from_toml_str("[safe_zone]\nlat = 91.0\nlon = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSafeZone { .. }));
        let err = SupervisorConfig::from_toml_str("[safe_zone]\nradius_m = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRadius(_)));
    }

    #[test]
    fn full_file_parses() {
        let raw = r#"
            [supervisor]
            system_id = 33
            tick_period_ms = 500

            [policy]
            lost_comms_timeout_s = 120.0
            keep_station_at_surface = false

            [safe_zone]
            lat = 41.185
            lon = -8.706
            radius_m = 75.0

            [network]
            listen_addr = "127.0.0.1:7000"
        "#;
        let cfg = SupervisorConfig::from_toml_str(raw).unwrap();
        assert_eq!(cfg.system_address(), SystemAddress(33));
        assert_eq!(cfg.policy.lost_comms_timeout(), Duration::from_secs(120));
        assert!(!cfg.policy.keep_station_at_surface);
        assert!(cfg.policy.ascend_with_actuation);
        let zone = cfg.safe_zone.to_safe_zone().unwrap();
        assert_eq!(zone.reference, Some(Wgs84Point::new(41.185, -8.706)));
        assert_eq!(cfg.network.listen_addr, "127.0.0.1:7000");
        assert_eq!(cfg.network.vehicle_addr, "127.0.0.1:6001");
    }

    #[test]
    fn unreadable_file_falls_back() {
        let cfg = SupervisorConfig::load(Some(Path::new("/nonexistent/supervisor.toml"))).unwrap();
        assert_eq!(cfg.policy, SupervisorParams::default());
    }
}
