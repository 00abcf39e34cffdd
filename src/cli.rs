use clap::Parser;
use std::time::Duration;

use hoptrace::Config;
use hoptrace::config::DEFAULT_PAYLOAD_SIZE;

/// Continuous traceroute/mtr-style path measurement with per-hop stats
#[derive(Parser, Debug, Clone)]
#[command(name = "hoptrace")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Target host to trace (IPv4 address or hostname)
    pub target: String,

    /// Number of cycles to run (0 = until interrupted)
    #[arg(short = 'c', long = "count", default_value = "10")]
    pub count: u64,

    /// Pause between cycles in seconds
    #[arg(short = 'i', long = "interval", default_value = "1.0")]
    pub interval: f64,

    /// Maximum number of hops probed
    #[arg(short = 'm', long = "max-hops", default_value = "30")]
    pub max_hops: u8,

    /// Per-cycle reply timeout in seconds
    #[arg(long = "timeout", default_value = "2")]
    pub timeout: f64,

    /// Delay between hop probes within a cycle, in milliseconds
    #[arg(long = "send-delay", default_value = "10")]
    pub send_delay_ms: u64,

    /// Skip reverse DNS lookups
    #[arg(short = 'n', long = "no-dns")]
    pub no_dns: bool,

    /// Print a report when the run ends (batch, requires -c)
    #[arg(long = "report")]
    pub report: bool,

    /// Output JSON when the run ends (batch, requires -c)
    #[arg(long = "json")]
    pub json: bool,

    /// Output CSV when the run ends (batch, requires -c)
    #[arg(long = "csv")]
    pub csv: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Get cycle interval as Duration (saturates; call `validate` first)
    pub fn interval_duration(&self) -> Duration {
        seconds(self.interval).unwrap_or(Duration::MAX)
    }

    /// Get timeout as Duration (saturates; call `validate` first)
    pub fn timeout_duration(&self) -> Duration {
        seconds(self.timeout).unwrap_or(Duration::MAX)
    }

    /// Check if running in batch mode (non-interactive)
    pub fn is_batch_mode(&self) -> bool {
        self.json || self.csv || self.report
    }

    /// Default log filter for the requested verbosity
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "hoptrace=debug,info",
            _ => "hoptrace=trace,debug",
        }
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.is_batch_mode() && self.count == 0 {
            return Err("Batch output modes (--json, --csv, --report) require -c to be set".into());
        }

        if [self.json, self.csv, self.report].iter().filter(|&&f| f).count() > 1 {
            return Err("Choose only one of --json, --csv, --report".into());
        }

        seconds(self.interval).map_err(|e| format!("Invalid interval {}: {}", self.interval, e))?;

        let timeout =
            seconds(self.timeout).map_err(|e| format!("Invalid timeout {}: {}", self.timeout, e))?;
        if timeout.is_zero() {
            return Err("Timeout must be positive".into());
        }

        if self.max_hops == 0 {
            return Err("Max hops must be at least 1".into());
        }

        Ok(())
    }
}

/// Seconds from the command line; rejects negative, NaN and out-of-range values
fn seconds(value: f64) -> Result<Duration, std::time::TryFromFloatSecsError> {
    Duration::try_from_secs_f64(value)
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        Self {
            target: args.target.clone(),
            max_hops: args.max_hops,
            timeout: args.timeout_duration(),
            interval: args.interval_duration(),
            count: args.count,
            resolve_names: !args.no_dns,
            send_delay: Duration::from_millis(args.send_delay_ms),
            payload_size: DEFAULT_PAYLOAD_SIZE,
        }
    }
}
