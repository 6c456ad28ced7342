use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MONITOR_TICK: Duration = Duration::from_secs(10);

/// Coordinator configuration. Non-positive durations are corrected to the
/// default rather than rejected.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// Upper bound on phase-1, cutoff for status derivation, and advisory
    /// lock TTL.
    pub timeout: Duration,
    /// Base monitor period.
    pub monitor_tick: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            timeout: DEFAULT_TIMEOUT,
            monitor_tick: DEFAULT_MONITOR_TICK,
        }
    }
}

impl Options {
    pub fn new(timeout: Duration, monitor_tick: Duration) -> Self {
        let mut opts = Options {
            timeout,
            monitor_tick,
        };
        opts.repair();
        opts
    }

    /// Read `TCC_TIMEOUT_MS` / `TCC_MONITOR_TICK_MS` if set, falling back to
    /// defaults. Not a CLI — process bootstrap stays out of scope — just the
    /// zero-ceremony env-var fallback this corpus favors for local config.
    pub fn from_env() -> Self {
        let timeout = std::env::var("TCC_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);
        let monitor_tick = std::env::var("TCC_MONITOR_TICK_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_MONITOR_TICK);
        Options::new(timeout, monitor_tick)
    }

    fn repair(&mut self) {
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_TIMEOUT;
        }
        if self.monitor_tick.is_zero() {
            self.monitor_tick = DEFAULT_MONITOR_TICK;
        }
    }
}
