//! Runner configuration.

use crate::context::manager::{PRUNE_MIN_SAVINGS_TOKENS, PRUNE_PROTECT_TOKENS};
use std::time::Duration;

/// Configuration for the agent loop.
///
/// The numeric defaults are tuning parameters, not architecture — every one
/// of them can be overridden per runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum model round-trips per user turn.
    pub max_iterations: u32,
    /// Timeout wrapped around every model call.
    pub llm_timeout: Duration,
    /// Whether compaction runs automatically when the threshold is crossed.
    pub auto_compact: bool,
    /// Whether stale tool output is proactively pruned between rounds.
    pub proactive_prune: bool,
    /// Tokens of recent tool output protected from proactive pruning.
    pub prune_protect_tokens: usize,
    /// Minimum projected savings before a prune pass is applied.
    pub prune_min_savings_tokens: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            llm_timeout: Duration::from_secs(300),
            auto_compact: true,
            proactive_prune: true,
            prune_protect_tokens: PRUNE_PROTECT_TOKENS,
            prune_min_savings_tokens: PRUNE_MIN_SAVINGS_TOKENS,
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    pub fn with_auto_compact(mut self, enabled: bool) -> Self {
        self.auto_compact = enabled;
        self
    }

    pub fn with_proactive_prune(mut self, enabled: bool) -> Self {
        self.proactive_prune = enabled;
        self
    }

    pub fn with_prune_protect_tokens(mut self, tokens: usize) -> Self {
        self.prune_protect_tokens = tokens;
        self
    }

    pub fn with_prune_min_savings_tokens(mut self, tokens: usize) -> Self {
        self.prune_min_savings_tokens = tokens;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.llm_timeout, Duration::from_secs(300));
        assert!(config.auto_compact);
    }

    #[test]
    fn builders_override() {
        let config = RunnerConfig::new()
            .with_max_iterations(5)
            .with_auto_compact(false)
            .with_llm_timeout(Duration::from_secs(10));
        assert_eq!(config.max_iterations, 5);
        assert!(!config.auto_compact);
    }
}
