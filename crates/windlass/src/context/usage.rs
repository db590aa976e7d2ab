//! Cumulative token usage and cost tracking for a session.
//!
//! Accumulates provider-reported usage across model calls. Cache-read
//! tokens are accounted separately: they are billed at a steep discount,
//! so cost math over raw input counts would overstate spend by an order
//! of magnitude on well-cached sessions.

use crate::provider::TokenUsage;

/// Billing multiplier for cache-read tokens relative to regular input.
pub const CACHE_READ_DISCOUNT: f64 = 0.1;

/// Billing multiplier for cache-write tokens relative to regular input.
pub const CACHE_WRITE_PREMIUM: f64 = 1.25;

/// Per-model pricing for cost estimation (USD per 1M tokens).
#[derive(Debug, Clone)]
pub struct ModelPricing {
    /// Price per 1M input tokens.
    pub input_per_million: f64,
    /// Price per 1M output tokens.
    pub output_per_million: f64,
}

impl Default for ModelPricing {
    fn default() -> Self {
        // Default to a mid-range estimate.
        Self {
            input_per_million: 3.0,
            output_per_million: 15.0,
        }
    }
}

impl ModelPricing {
    /// Estimate the cost of a single call, cache-aware: cache reads are
    /// discounted, cache writes carry a premium.
    pub fn estimate_cost(&self, usage: &TokenUsage) -> f64 {
        let uncached = usage.input_tokens.saturating_sub(usage.cache_read_tokens) as f64;
        let input_cost = (uncached
            + usage.cache_read_tokens as f64 * CACHE_READ_DISCOUNT
            + usage.cache_write_tokens as f64 * CACHE_WRITE_PREMIUM)
            / 1_000_000.0
            * self.input_per_million;
        let output_cost = usage.output_tokens as f64 / 1_000_000.0 * self.output_per_million;
        input_cost + output_cost
    }
}

/// Lookup approximate pricing for a model by name.
///
/// Matches on the model name segment (after the last `/` in paths like
/// `"anthropic/claude-sonnet-4"`) to avoid false positives from org
/// prefixes. Approximate is fine — cost tracking is for spotting runaway
/// loops, not billing.
pub fn pricing_for_model(model: &str) -> ModelPricing {
    let name = model.rsplit('/').next().unwrap_or(model).to_lowercase();

    if name.contains("opus") {
        ModelPricing {
            input_per_million: 15.0,
            output_per_million: 75.0,
        }
    } else if name.contains("sonnet") {
        ModelPricing {
            input_per_million: 3.0,
            output_per_million: 15.0,
        }
    } else if name.contains("haiku") {
        ModelPricing {
            input_per_million: 0.25,
            output_per_million: 1.25,
        }
    } else if name.contains("gpt-4o-mini") || name.contains("4o-mini") {
        ModelPricing {
            input_per_million: 0.15,
            output_per_million: 0.60,
        }
    } else if name.contains("gpt-4o") || name.contains("gpt-4") {
        ModelPricing {
            input_per_million: 2.50,
            output_per_million: 10.0,
        }
    } else if name.contains("gemini") && name.contains("flash") {
        ModelPricing {
            input_per_million: 0.075,
            output_per_million: 0.30,
        }
    } else if name.contains("gemini") {
        ModelPricing {
            input_per_million: 1.25,
            output_per_million: 5.0,
        }
    } else {
        ModelPricing::default()
    }
}

/// Cumulative usage totals for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageStats {
    /// Number of model calls recorded.
    pub llm_calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_write_tokens: u64,
    pub cache_read_tokens: u64,
}

impl UsageStats {
    /// Cache hit rate: reads over reads plus writes. 0.0 when no cache
    /// activity has been recorded.
    pub fn hit_rate(&self) -> f64 {
        let denom = self.cache_read_tokens + self.cache_write_tokens;
        if denom == 0 {
            0.0
        } else {
            self.cache_read_tokens as f64 / denom as f64
        }
    }

    /// Input tokens adjusted for the cache-read discount: cached tokens
    /// count at [`CACHE_READ_DISCOUNT`] of their raw weight.
    pub fn cost_adjusted_input(&self) -> f64 {
        let raw = self.input_tokens as f64;
        let cached = self.cache_read_tokens.min(self.input_tokens) as f64;
        raw - cached + cached * CACHE_READ_DISCOUNT
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Cumulative usage and cost tracker for a session.
#[derive(Debug, Clone)]
pub struct UsageTracker {
    stats: UsageStats,
    pricing: ModelPricing,
    estimated_cost_usd: f64,
}

impl UsageTracker {
    /// Create a tracker with pricing looked up from the model name.
    pub fn for_model(model: &str) -> Self {
        Self {
            stats: UsageStats::default(),
            pricing: pricing_for_model(model),
            estimated_cost_usd: 0.0,
        }
    }

    /// Record usage from one model call.
    pub fn record(&mut self, usage: &TokenUsage) {
        self.stats.llm_calls += 1;
        self.stats.input_tokens += usage.input_tokens;
        self.stats.output_tokens += usage.output_tokens;
        self.stats.cache_write_tokens += usage.cache_write_tokens;
        self.stats.cache_read_tokens += usage.cache_read_tokens;
        self.estimated_cost_usd += self.pricing.estimate_cost(usage);
    }

    /// Current cumulative totals.
    pub fn snapshot(&self) -> UsageStats {
        self.stats
    }

    pub fn estimated_cost_usd(&self) -> f64 {
        self.estimated_cost_usd
    }

    /// Reset all counters.
    pub fn reset(&mut self) {
        self.stats = UsageStats::default();
        self.estimated_cost_usd = 0.0;
    }

    /// Format as a short summary string.
    pub fn summary(&self) -> String {
        format!(
            "tokens: {} in + {} out = {} total ({} cached, {:.0}% hit rate), est. cost: ${:.4}",
            self.stats.input_tokens,
            self.stats.output_tokens,
            self.stats.total_tokens(),
            self.stats.cache_read_tokens,
            self.stats.hit_rate() * 100.0,
            self.estimated_cost_usd,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u64, output: u64, cache_write: u64, cache_read: u64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
            cache_write_tokens: cache_write,
            cache_read_tokens: cache_read,
        }
    }

    #[test]
    fn tracker_accumulates() {
        let mut tracker = UsageTracker::for_model("anthropic/claude-sonnet-4");
        tracker.record(&usage(1000, 500, 0, 0));
        tracker.record(&usage(2000, 1000, 0, 0));
        let stats = tracker.snapshot();
        assert_eq!(stats.llm_calls, 2);
        assert_eq!(stats.input_tokens, 3000);
        assert_eq!(stats.output_tokens, 1500);
        assert!(tracker.estimated_cost_usd() > 0.0);
    }

    #[test]
    fn hit_rate_all_reads_is_full() {
        let mut tracker = UsageTracker::for_model("claude-sonnet-4");
        tracker.record(&usage(1000, 200, 0, 900));
        tracker.record(&usage(1000, 200, 0, 900));
        let stats = tracker.snapshot();
        assert_eq!(stats.cache_read_tokens, 1800);
        assert!((stats.hit_rate() - 1.0).abs() < f64::EPSILON);
        assert!(stats.cost_adjusted_input() < stats.input_tokens as f64);
    }

    #[test]
    fn hit_rate_zero_denominator_is_zero() {
        let stats = UsageStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn cached_calls_cost_less() {
        let pricing = ModelPricing::default();
        let cold = pricing.estimate_cost(&usage(100_000, 1000, 0, 0));
        let warm = pricing.estimate_cost(&usage(100_000, 1000, 0, 90_000));
        assert!(warm < cold);
    }

    #[test]
    fn cache_writes_cost_more() {
        let pricing = ModelPricing::default();
        let plain = pricing.estimate_cost(&usage(100_000, 0, 0, 0));
        let writing = pricing.estimate_cost(&usage(100_000, 0, 100_000, 0));
        assert!(writing > plain);
    }

    #[test]
    fn pricing_lookup_known_models() {
        let opus = pricing_for_model("anthropic/claude-opus-4");
        assert!(opus.input_per_million > 10.0);

        let haiku = pricing_for_model("anthropic/claude-3.5-haiku");
        assert!(haiku.input_per_million < 1.0);

        let unknown = pricing_for_model("some-unknown-model");
        assert!(unknown.input_per_million > 0.0);
    }

    #[test]
    fn reset_clears_counters() {
        let mut tracker = UsageTracker::for_model("gpt-4o");
        tracker.record(&usage(1000, 100, 0, 0));
        tracker.reset();
        assert_eq!(tracker.snapshot(), UsageStats::default());
        assert_eq!(tracker.estimated_cost_usd(), 0.0);
    }

    #[test]
    fn summary_format() {
        let mut tracker = UsageTracker::for_model("gpt-4o");
        tracker.record(&usage(1000, 500, 0, 200));
        let summary = tracker.summary();
        assert!(summary.contains("tokens:"));
        assert!(summary.contains("cost:"));
    }
}
