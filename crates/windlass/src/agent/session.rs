//! Session state: the conversation store and cumulative counters.
//!
//! A session owns everything that outlives a single user turn: the ordered
//! message history, the usage tracker, and the context manager. All
//! mutation is linearized through the [`Runner`](crate::agent::runner::Runner);
//! the context manager only proposes replacement conversations, and the
//! runner commits them. Each session is independent — no ambient globals.

use crate::Message;
use crate::context::manager::{ContextBudget, ContextManager, ContextUsage};
use crate::context::usage::{UsageStats, UsageTracker};
use chrono::{DateTime, Local};

/// A conversation session: message history plus usage and context state.
#[derive(Debug, Clone)]
pub struct Session {
    model: String,
    system_prompt: String,
    /// Ordered conversation history. The system prompt is not stored here;
    /// it is assembled into each model request by the runner.
    pub messages: Vec<Message>,
    pub tracker: UsageTracker,
    pub context: ContextManager,
    started_at: DateTime<Local>,
    /// Message count right after the last compaction, for loop prevention.
    pub(crate) messages_at_last_compaction: usize,
}

impl Session {
    /// Create a session for a model, with the context budget looked up
    /// from the model name.
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        let model = model.into();
        let system_prompt = system_prompt.into();
        let context = ContextManager::new(ContextBudget::for_model(&model), &system_prompt);
        Self {
            tracker: UsageTracker::for_model(&model),
            context,
            model,
            system_prompt,
            messages: Vec::new(),
            started_at: Local::now(),
            messages_at_last_compaction: 0,
        }
    }

    /// Replace the context manager (custom budget, reducer, or estimator).
    pub fn with_context(mut self, context: ContextManager) -> Self {
        self.context = context;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Point-in-time view of the session, queryable without mutation.
    pub fn usage_snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            message_count: self.messages.len(),
            context: self.context.usage(&self.messages),
            usage: self.tracker.snapshot(),
            estimated_cost_usd: self.tracker.estimated_cost_usd(),
        }
    }

    /// Reset the conversation and all counters.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.tracker.reset();
        self.messages_at_last_compaction = 0;
    }
}

/// User-facing usage snapshot: messages, token breakdown, percent full,
/// cache hit rate, cumulative totals.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub message_count: usize,
    pub context: ContextUsage,
    pub usage: UsageStats,
    pub estimated_cost_usd: f64,
}

impl SessionSnapshot {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "{} messages, {}; session: {} in + {} out tokens, {:.0}% cache hits, est. ${:.4}",
            self.message_count,
            self.context.to_log_string(),
            self.usage.input_tokens,
            self.usage.output_tokens,
            self.usage.hit_rate() * 100.0,
            self.estimated_cost_usd,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TokenUsage;

    #[test]
    fn snapshot_reflects_state_without_mutation() {
        let mut session = Session::new("claude-sonnet-4", "You are helpful.");
        session.messages.push(Message::user("hello"));
        session.tracker.record(&TokenUsage {
            input_tokens: 1000,
            output_tokens: 200,
            cache_write_tokens: 0,
            cache_read_tokens: 900,
        });

        let before = session.messages.clone();
        let snap = session.usage_snapshot();
        assert_eq!(snap.message_count, 1);
        assert_eq!(snap.usage.input_tokens, 1000);
        assert!((snap.usage.hit_rate() - 1.0).abs() < f64::EPSILON);
        assert_eq!(session.messages, before);
    }

    #[test]
    fn clear_resets_everything() {
        let mut session = Session::new("gpt-4o", "sys");
        session.messages.push(Message::user("hi"));
        session.tracker.record(&TokenUsage {
            input_tokens: 10,
            ..Default::default()
        });
        session.clear();
        assert!(session.messages.is_empty());
        assert_eq!(session.tracker.snapshot().input_tokens, 0);
    }

    #[test]
    fn budget_follows_model() {
        let claude = Session::new("anthropic/claude-sonnet-4", "");
        assert_eq!(claude.context.budget().hard_limit, 200_000);
        let gpt = Session::new("openai/gpt-3.5-turbo", "");
        assert_eq!(gpt.context.budget().hard_limit, 16_385);
    }

    #[test]
    fn snapshot_log_string() {
        let session = Session::new("gpt-4o", "sys");
        let log = session.usage_snapshot().to_log_string();
        assert!(log.contains("messages"));
        assert!(log.contains("context:"));
    }
}
