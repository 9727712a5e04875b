// =============================================================================
// config.rs - THE KNOBS
// =============================================================================
//
// Every tunable the engine has, loaded from HANDLE_HUNT_* environment variables
// (and a .env file, if one is lying around). Anything missing or unparseable
// falls back to its default, so an empty environment gives you a working
// scanner: fifteen probes at a time, eight seconds each, direct requests with
// a browser User-Agent, built-in catalog.
//
// CLI flags in main.rs override whatever ends up in here.
// =============================================================================

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::coordinator::DEFAULT_CONCURRENCY_LIMIT;
use crate::prober::{DEFAULT_PROBE_TIMEOUT, DEFAULT_PROXY_BASE_URL, DEFAULT_USER_AGENT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    // =========================================================================
    // SCHEDULING
    // =========================================================================
    /// Maximum simultaneous in-flight probes. Always > 0.
    /// Default: 15
    pub concurrency_limit: usize,

    /// Hard deadline per probe, measured from dispatch.
    /// Default: 8 seconds
    pub probe_timeout: Duration,

    // =========================================================================
    // REQUEST SHAPING
    // =========================================================================
    /// Route probes through the forwarding proxy. Only useful when direct
    /// requests get rejected for cross-origin reasons.
    /// Default: false
    pub use_forwarding_proxy: bool,

    /// Forwarding proxy base URL; the target is appended percent-encoded.
    pub proxy_base_url: String,

    /// User-Agent sent on direct requests.
    pub user_agent: String,

    // =========================================================================
    // CATALOG & OUTPUT
    // =========================================================================
    /// JSON catalog to load instead of the built-in one.
    pub catalog_path: Option<PathBuf>,

    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. `from_env` is this with
    /// `std::env::var`; tests pass a map.
    pub fn from_lookup<L>(lookup: L) -> Self
    where
        L: Fn(&str) -> Option<String>,
    {
        let concurrency_limit = parse_or(&lookup, "HANDLE_HUNT_CONCURRENCY", DEFAULT_CONCURRENCY_LIMIT);
        let concurrency_limit = if concurrency_limit == 0 {
            warn!("HANDLE_HUNT_CONCURRENCY must be > 0, using {}", DEFAULT_CONCURRENCY_LIMIT);
            DEFAULT_CONCURRENCY_LIMIT
        } else {
            concurrency_limit
        };

        let timeout_ms = parse_or(&lookup, "HANDLE_HUNT_PROBE_TIMEOUT_MS", default_timeout_ms());

        Config {
            concurrency_limit,
            probe_timeout: probe_timeout_from_ms(timeout_ms),

            use_forwarding_proxy: flag(&lookup, "HANDLE_HUNT_USE_PROXY", false),
            proxy_base_url: env_or_default(&lookup, "HANDLE_HUNT_PROXY_BASE_URL", DEFAULT_PROXY_BASE_URL),
            user_agent: env_or_default(&lookup, "HANDLE_HUNT_USER_AGENT", DEFAULT_USER_AGENT),

            catalog_path: lookup("HANDLE_HUNT_CATALOG_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            log_json: flag(&lookup, "HANDLE_HUNT_LOG_JSON", false),
        }
    }

    /// Set the probe timeout from a millisecond count, as `--timeout-ms` does.
    pub fn set_probe_timeout_ms(&mut self, ms: u64) {
        self.probe_timeout = probe_timeout_from_ms(ms);
    }
}

fn default_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_PROBE_TIMEOUT.as_millis()).unwrap_or(8_000)
}

/// A zero timeout would fail every probe before it is sent, so it falls back
/// to the default.
pub fn probe_timeout_from_ms(ms: u64) -> Duration {
    if ms == 0 {
        let default_ms = default_timeout_ms();
        warn!("Probe timeout must be > 0 ms, using {}", default_ms);
        return Duration::from_millis(default_ms);
    }
    Duration::from_millis(ms)
}

fn env_or_default<L>(lookup: &L, key: &str, default: &str) -> String
where
    L: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_string())
}

fn parse_or<L, T>(lookup: &L, key: &str, default: T) -> T
where
    L: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Unparseable config value, using default {}", default);
            default
        }),
    }
}

fn flag<L>(lookup: &L, key: &str, default: bool) -> bool
where
    L: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => default,
        Some(v) => matches!(v.as_str(), "1" | "true" | "yes" | "on"),
    }
}
