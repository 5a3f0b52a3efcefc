//! Run configuration
//!
//! Settings come from three layers: built-in defaults, an optional TOML file
//! and command line overrides applied by the binary. Everything is checked by
//! [`CallGenConfig::validate`] before a single worker is created.
//!
//! ```toml
//! destinations = ["127.0.0.1:7000", "127.0.0.1:7002"]
//! max_calls = 4
//! repeat = 10
//! cycle = true
//! fuzzing = true
//!
//! [timing]
//! tmax_est = 5
//! tmin_call = 10
//! tmax_call = 60
//! tmin_wait = 10
//! tmax_wait = 30
//!
//! [fuzz]
//! header_percent = 50
//! media_percent = 0
//! rtcp_percent = 5
//!
//! [rtp]
//! base = 5000
//! max = 5999
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use callgen_rtp_fuzz::{FuzzConfig, PortRange};
use serde::{Deserialize, Serialize};

use crate::error::{CallGenError, Result};

/// Default number of call cycles per worker
pub const DEFAULT_REPEAT: u32 = 10;

/// Timing bounds in whole seconds, as written in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Maximum time to wait for establishment; 0 disables the wait
    pub tmax_est: u64,
    pub tmin_call: u64,
    pub tmax_call: u64,
    pub tmin_wait: u64,
    pub tmax_wait: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tmax_est: 0,
            tmin_call: 10,
            tmax_call: 60,
            tmin_wait: 10,
            tmax_wait: 30,
        }
    }
}

/// How destinations are shared out between workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationPolicy {
    /// Every worker walks the full destination list
    Cycle,
    /// Worker `i` always calls destination `(i - 1) % len`
    Fixed,
}

impl DestinationPolicy {
    pub fn from_cycle_flag(cycle: bool) -> Self {
        if cycle {
            Self::Cycle
        } else {
            Self::Fixed
        }
    }
}

/// Destination list held by worker `index` (1-based)
pub fn worker_destinations(all: &[String], index: usize, policy: DestinationPolicy) -> Vec<String> {
    if all.is_empty() {
        return Vec::new();
    }
    match policy {
        DestinationPolicy::Cycle => all.to_vec(),
        DestinationPolicy::Fixed => vec![all[(index.saturating_sub(1)) % all.len()].clone()],
    }
}

/// Per-worker call cycle parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallParams {
    /// Number of call cycles per worker; 0 runs until cancelled
    pub repeat: u32,
    /// Establishment timeout; zero skips the establishment wait
    pub tmax_est: Duration,
    pub tmin_call: Duration,
    pub tmax_call: Duration,
    pub tmin_wait: Duration,
    pub tmax_wait: Duration,
}

impl Default for CallParams {
    fn default() -> Self {
        TimingConfig::default().to_params(DEFAULT_REPEAT)
    }
}

impl CallParams {
    pub fn validate(&self) -> Result<()> {
        if self.tmin_call.is_zero() || self.tmin_call > self.tmax_call {
            return Err(CallGenError::config(format!(
                "Invalid call duration bounds: min={:?} max={:?}",
                self.tmin_call, self.tmax_call
            )));
        }
        if self.tmin_wait.is_zero() || self.tmin_wait > self.tmax_wait {
            return Err(CallGenError::config(format!(
                "Invalid inter-call delay bounds: min={:?} max={:?}",
                self.tmin_wait, self.tmax_wait
            )));
        }
        Ok(())
    }

    /// Total number of calls per worker, `None` when unbounded
    pub fn calls_per_worker(&self) -> Option<u32> {
        if self.repeat == 0 {
            None
        } else {
            Some(self.repeat)
        }
    }
}

impl TimingConfig {
    pub fn to_params(self, repeat: u32) -> CallParams {
        CallParams {
            repeat,
            tmax_est: Duration::from_secs(self.tmax_est),
            tmin_call: Duration::from_secs(self.tmin_call),
            tmax_call: Duration::from_secs(self.tmax_call),
            tmin_wait: Duration::from_secs(self.tmin_wait),
            tmax_wait: Duration::from_secs(self.tmax_wait),
        }
    }
}

/// Complete configuration of one generator run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallGenConfig {
    /// Call targets
    pub destinations: Vec<String>,
    /// Number of simultaneous workers; 0 is treated as 1
    pub max_calls: usize,
    /// Call cycles per worker; 0 runs until cancelled
    pub repeat: u32,
    /// Walk all destinations in every worker instead of pinning one each
    pub cycle: bool,
    /// Replace media channels with fuzzing channels
    pub fuzzing: bool,
    /// Base seed for reproducible worker timing
    pub seed: Option<u64>,
    /// Call detail record output file
    pub cdr: Option<PathBuf>,
    /// Interface the media sockets bind to
    pub local_ip: IpAddr,
    pub timing: TimingConfig,
    pub fuzz: FuzzConfig,
    pub rtp: PortRange,
}

impl Default for CallGenConfig {
    fn default() -> Self {
        Self {
            destinations: Vec::new(),
            max_calls: 1,
            repeat: DEFAULT_REPEAT,
            cycle: false,
            fuzzing: false,
            seed: None,
            cdr: None,
            local_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            timing: TimingConfig::default(),
            fuzz: FuzzConfig::default(),
            rtp: PortRange::default(),
        }
    }
}

impl CallGenConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CallGenError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Number of workers to run
    pub fn worker_count(&self) -> usize {
        self.max_calls.max(1)
    }

    pub fn destination_policy(&self) -> DestinationPolicy {
        DestinationPolicy::from_cycle_flag(self.cycle)
    }

    pub fn call_params(&self) -> CallParams {
        self.timing.to_params(self.repeat)
    }

    pub fn validate(&self) -> Result<()> {
        if self.destinations.is_empty() {
            return Err(CallGenError::config("no destinations specified"));
        }
        self.call_params().validate()?;
        if self.fuzzing {
            self.fuzz.validate()?;
            self.rtp.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dests(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("host{}", i)).collect()
    }

    #[test]
    fn test_defaults() {
        let config = CallGenConfig::default();
        assert_eq!(config.repeat, 10);
        assert_eq!(config.timing.tmin_call, 10);
        assert_eq!(config.timing.tmax_call, 60);
        assert_eq!(config.timing.tmin_wait, 10);
        assert_eq!(config.timing.tmax_wait, 30);
        assert_eq!(config.timing.tmax_est, 0);
        assert_eq!(config.fuzz, FuzzConfig::new(50, 0, 5));
        assert_eq!(config.rtp, PortRange::new(5000, 5999));
    }

    #[test]
    fn test_zero_max_calls_becomes_one() {
        let config = CallGenConfig {
            max_calls: 0,
            ..Default::default()
        };
        assert_eq!(config.worker_count(), 1);
    }

    #[test]
    fn test_invalid_timing_rejected() {
        let mut params = CallParams::default();
        params.tmin_call = Duration::ZERO;
        assert!(params.validate().is_err());

        let mut params = CallParams::default();
        params.tmin_wait = Duration::ZERO;
        assert!(params.validate().is_err());

        let mut params = CallParams::default();
        params.tmin_call = Duration::from_secs(61);
        assert!(params.validate().is_err());

        let mut params = CallParams::default();
        params.tmin_wait = Duration::from_secs(31);
        assert!(params.validate().is_err());

        assert!(CallParams::default().validate().is_ok());
    }

    #[test]
    fn test_equal_bounds_accepted() {
        let mut params = CallParams::default();
        params.tmin_call = params.tmax_call;
        params.tmin_wait = params.tmax_wait;
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_empty_destinations_rejected() {
        let err = CallGenConfig::default().validate().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_fuzz_percent_checked_only_when_fuzzing() {
        let mut config = CallGenConfig {
            destinations: dests(1),
            fuzz: FuzzConfig::new(101, 0, 0),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        config.fuzzing = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_worker_destinations() {
        let all = dests(3);
        assert_eq!(worker_destinations(&all, 2, DestinationPolicy::Cycle), all);
        assert_eq!(worker_destinations(&all, 1, DestinationPolicy::Fixed), vec!["host0"]);
        assert_eq!(worker_destinations(&all, 3, DestinationPolicy::Fixed), vec!["host2"]);
        assert_eq!(worker_destinations(&all, 5, DestinationPolicy::Fixed), vec!["host1"]);
        assert!(worker_destinations(&[], 1, DestinationPolicy::Cycle).is_empty());
    }

    #[test]
    fn test_from_toml() {
        let config = CallGenConfig::from_toml_str(
            r#"
            destinations = ["127.0.0.1:7000"]
            max_calls = 4
            repeat = 0
            cycle = true

            [timing]
            tmax_est = 5
            tmin_call = 2

            [fuzz]
            rtcp_percent = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.max_calls, 4);
        assert_eq!(config.repeat, 0);
        assert_eq!(config.destination_policy(), DestinationPolicy::Cycle);
        assert_eq!(config.timing.tmax_est, 5);
        assert_eq!(config.timing.tmin_call, 2);
        assert_eq!(config.timing.tmax_call, 60);
        assert_eq!(config.fuzz.rtcp_percent, 100);
        assert_eq!(config.fuzz.header_percent, 50);
        assert_eq!(config.call_params().calls_per_worker(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_toml() {
        let err = CallGenConfig::from_toml_str("max_calls = \"many\"").unwrap_err();
        assert!(matches!(err, CallGenError::ConfigParse(_)));
    }
}
