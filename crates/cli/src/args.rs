//! Command line arguments and how they layer over the configuration file

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use callgen_core::{CallGenConfig, LoggingConfig};
use callgen_core::logging::{level_for_verbosity, parse_log_level};
use clap::{ArgAction, Parser};
use tracing::Level;

const NOTES: &str = "\
Notes:
  If --tmaxest is set a non-zero value then --tmincall is the time to leave
  the call running once established. If zero (the default) then --tmincall
  is the length of the call from initiation. The call may or may not be
  \"answered\" within that time.";

/// Place, hold and clear calls across a pool of simultaneous workers
#[derive(Parser, Debug)]
#[command(name = "callgen", version, about, after_help = NOTES)]
pub struct Args {
    /// Call destinations (host:port media targets for the loopback stack)
    pub destinations: Vec<String>,

    /// Maximum number of simultaneous calls [1]
    #[arg(short, long)]
    pub max: Option<usize>,

    /// Repeat calls n times, 0 for forever [10]
    #[arg(short, long)]
    pub repeat: Option<u32>,

    /// Each simultaneous call cycles through the destination list
    #[arg(short = 'C', long)]
    pub cycle: bool,

    /// Maximum time to wait for "Established" in seconds [0]
    #[arg(long)]
    pub tmaxest: Option<u64>,

    /// Minimum call duration in seconds [10]
    #[arg(long)]
    pub tmincall: Option<u64>,

    /// Maximum call duration in seconds [60]
    #[arg(long)]
    pub tmaxcall: Option<u64>,

    /// Minimum interval between calls in seconds [10]
    #[arg(long)]
    pub tminwait: Option<u64>,

    /// Maximum interval between calls in seconds [30]
    #[arg(long)]
    pub tmaxwait: Option<u64>,

    /// Enable RTP fuzzing
    #[arg(long)]
    pub fuzzing: bool,

    /// Percentage of RTP header to randomly overwrite [50]
    #[arg(long)]
    pub fuzz_header: Option<u8>,

    /// Percentage of RTP media to randomly overwrite [0]
    #[arg(long)]
    pub fuzz_media: Option<u8>,

    /// Percentage of RTCP to randomly overwrite [5]
    #[arg(long)]
    pub fuzz_rtcp: Option<u8>,

    /// Base port of the RTP/RTCP pairs [5000]
    #[arg(long)]
    pub rtp_base: Option<u16>,

    /// Maximum port of the RTP/RTCP pairs [5999]
    #[arg(long)]
    pub rtp_max: Option<u16>,

    /// Local address media sockets bind to [0.0.0.0]
    #[arg(short, long)]
    pub interface: Option<IpAddr>,

    /// Call Detail Record file [none]
    #[arg(short = 'c', long)]
    pub cdr: Option<PathBuf>,

    /// Trace enable (use multiple times for more detail)
    #[arg(short = 't', long = "trace", action = ArgAction::Count)]
    pub trace: u8,

    /// Log level, overriding the -t count (error, warn, info, debug, trace)
    #[arg(long, value_parser = parse_log_level)]
    pub log_level: Option<Level>,

    /// File for trace output [stderr]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Emit trace output as JSON
    #[arg(long)]
    pub json: bool,

    /// TOML configuration file; command line options override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seed for reproducible call timing
    #[arg(long)]
    pub seed: Option<u64>,

    /// Seconds before the loopback stack answers a call
    #[arg(long, default_value = "1", value_parser = parse_seconds)]
    pub answer_delay: Duration,

    /// Loopback stack never answers
    #[arg(long, conflicts_with = "answer_delay")]
    pub no_answer: bool,
}

impl Args {
    /// Load the configuration file, if any, and apply command line overrides
    pub fn to_config(&self) -> callgen_core::Result<CallGenConfig> {
        let mut config = match &self.config {
            Some(path) => CallGenConfig::from_file(path)?,
            None => CallGenConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    pub fn apply(&self, config: &mut CallGenConfig) {
        if !self.destinations.is_empty() {
            config.destinations = self.destinations.clone();
        }
        if let Some(max) = self.max {
            config.max_calls = max;
        }
        if let Some(repeat) = self.repeat {
            config.repeat = repeat;
        }
        config.cycle |= self.cycle;
        config.fuzzing |= self.fuzzing;

        let timing = &mut config.timing;
        override_with(&mut timing.tmax_est, self.tmaxest);
        override_with(&mut timing.tmin_call, self.tmincall);
        override_with(&mut timing.tmax_call, self.tmaxcall);
        override_with(&mut timing.tmin_wait, self.tminwait);
        override_with(&mut timing.tmax_wait, self.tmaxwait);

        override_with(&mut config.fuzz.header_percent, self.fuzz_header);
        override_with(&mut config.fuzz.media_percent, self.fuzz_media);
        override_with(&mut config.fuzz.rtcp_percent, self.fuzz_rtcp);
        override_with(&mut config.rtp.base, self.rtp_base);
        override_with(&mut config.rtp.max, self.rtp_max);
        override_with(&mut config.local_ip, self.interface);

        if self.cdr.is_some() {
            config.cdr = self.cdr.clone();
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
    }

    pub fn logging(&self) -> LoggingConfig {
        let level = self.log_level.unwrap_or_else(|| level_for_verbosity(self.trace));
        let mut logging = LoggingConfig::new(level, "callgen");
        if self.trace >= 3 {
            logging = logging.with_file_info();
        }
        if self.json {
            logging = logging.with_json();
        }
        if let Some(path) = &self.output {
            logging = logging.with_log_file(path);
        }
        logging
    }

    /// Loopback answer delay, `None` when calls are never answered
    pub fn answer_delay(&self) -> Option<Duration> {
        if self.no_answer {
            None
        } else {
            Some(self.answer_delay)
        }
    }
}

/// Non-negative, finite seconds that fit in a `Duration`
fn parse_seconds(value: &str) -> Result<Duration, String> {
    let secs: f64 = value.parse().map_err(|e| format!("invalid number of seconds: {}", e))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid number of seconds {}: {}", value, e))
}

fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Startup line describing the size of the run
pub fn banner(workers: usize, repeat: u32) -> String {
    let mut line = format!(
        "Endpoint starting {} simultaneous call{} ",
        workers,
        if workers > 1 { "s" } else { "" }
    );
    if repeat == 0 {
        line.push_str("infinite times");
    } else {
        line.push_str(&format!("{} time{}", repeat, if repeat != 1 { "s" } else { "" }));
        line.push_str(&format!(", grand total of {} calls", workers as u64 * repeat as u64));
    }
    line.push('.');
    line
}
