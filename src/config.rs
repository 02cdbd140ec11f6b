use std::time::Duration;
use tracing::warn;

pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_SETTLE_MS: u64 = 1500;
pub const DEFAULT_RESOLVE_TIMEOUT_MS: u64 = 10000;
pub const DEFAULT_RESULT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_STEP_SETTLE_MS: u64 = 1000;
pub const DEFAULT_WAIT_MS: u64 = 2000;
pub const DEFAULT_SCROLL_STEP: i64 = 500;
pub const DEFAULT_EXTRACT_LIMIT: usize = 3;

/// Timeouts and limits for one engine session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound for every driver call and for extract's wait-for-match.
    pub action_timeout: Duration,
    /// Upper bound for a whole selector waterfall, across all tiers.
    pub resolve_timeout: Duration,
    /// Fixed pause after a search when no result selector is known.
    pub settle_delay: Duration,
    /// How long a search waits for a known result selector.
    pub result_timeout: Duration,
    /// Pause between successive steps of a compound command.
    pub step_settle: Duration,
    /// Duration of the `wait` action.
    pub wait_duration: Duration,
    pub scroll_step: i64,
    pub extract_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_millis(DEFAULT_ACTION_TIMEOUT_MS),
            resolve_timeout: Duration::from_millis(DEFAULT_RESOLVE_TIMEOUT_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_MS),
            result_timeout: Duration::from_millis(DEFAULT_RESULT_TIMEOUT_MS),
            step_settle: Duration::from_millis(DEFAULT_STEP_SETTLE_MS),
            wait_duration: Duration::from_millis(DEFAULT_WAIT_MS),
            scroll_step: DEFAULT_SCROLL_STEP,
            extract_limit: DEFAULT_EXTRACT_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `NLB_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let ms = |key: &str, slot: &mut Duration| {
            if let Some(v) = parse_var::<u64>(&lookup, key) {
                *slot = Duration::from_millis(v);
            }
        };
        ms("NLB_ACTION_TIMEOUT_MS", &mut config.action_timeout);
        ms("NLB_RESOLVE_TIMEOUT_MS", &mut config.resolve_timeout);
        ms("NLB_SETTLE_MS", &mut config.settle_delay);
        ms("NLB_RESULT_TIMEOUT_MS", &mut config.result_timeout);
        ms("NLB_STEP_SETTLE_MS", &mut config.step_settle);
        ms("NLB_WAIT_MS", &mut config.wait_duration);
        if let Some(v) = parse_var::<i64>(&lookup, "NLB_SCROLL_STEP") {
            config.scroll_step = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, "NLB_EXTRACT_LIMIT") {
            config.extract_limit = v.max(1);
        }
        config
    }

    /// Zero delays everywhere; handy for tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            action_timeout: Duration::from_millis(200),
            resolve_timeout: Duration::from_secs(1),
            settle_delay: Duration::ZERO,
            result_timeout: Duration::ZERO,
            step_settle: Duration::ZERO,
            wait_duration: Duration::ZERO,
            ..Self::default()
        }
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("[Config] Ignoring {}={:?}: not a number", key, raw);
            None
        }
    }
}
