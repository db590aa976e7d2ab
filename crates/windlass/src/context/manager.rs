//! Budget-driven conversation management: pruning, compaction, and
//! emergency reduction.
//!
//! The manager is pure with respect to its input conversation: every
//! operation returns a new message vector and never mutates the store. The
//! agent loop is the sole committer. Operations are also non-throwing by
//! contract — on anything unexpected they return the input unchanged,
//! because a context-management failure must never block the user's task.
//!
//! Three lines of defense, cheapest first:
//!
//! 1. [`ContextManager::ingest_tool_result`] clamps a single pathological
//!    output before it ever reaches the conversation.
//! 2. [`ContextManager::prune`] shrinks stale tool output outside a
//!    recency window, no LLM call needed.
//! 3. [`ContextManager::compact`] replaces the older conversation prefix
//!    with a model-written summary, preserving the recent turns verbatim.
//!
//! Past the emergency threshold, [`ContextManager::emergency_reduce`]
//! truncates without a model call — a summarization call consumes context
//! itself and can make a saturated window worse.

use crate::context::reduce::OutputReducer;
use crate::context::token::TokenEstimator;
use crate::{Message, MessageRole};
use std::future::Future;
use tracing::{debug, warn};

/// Tokens of recent tool output protected from pruning.
pub const PRUNE_PROTECT_TOKENS: usize = 40_000;

/// Minimum projected savings for a prune pass to be worth applying.
pub const PRUNE_MIN_SAVINGS_TOKENS: usize = 20_000;

/// Minimum conversation length before model-driven compaction makes sense.
pub const MIN_COMPACT_MESSAGES: usize = 5;

/// Below this many messages, compaction truncates aggressively instead of
/// paying for a model-written summary.
pub const SMALL_CONVERSATION_MESSAGES: usize = 10;

/// Character ceiling applied to individual tool results during emergency
/// reduction.
const EMERGENCY_RESULT_CEILING_CHARS: usize = 10_000;

/// Character ceiling for [`ContextManager::aggressive_prune`] on small
/// conversations.
const AGGRESSIVE_RESULT_CEILING_CHARS: usize = 5_000;

/// Content floor used by the last-resort oldest-first truncation.
const FLOOR_CONTENT_CHARS: usize = 200;

/// Default reserve for model output when computing usage.
const DEFAULT_OUTPUT_RESERVE: usize = 4_096;

/// Prefix of the synthetic assistant message that replaces a compacted
/// prefix.
pub const COMPACTION_MARKER: &str = "[COMPACTION SUMMARY]";

/// Instruction appended to the older prefix when requesting a summary.
pub const COMPACTION_PROMPT: &str = "\
You are summarizing a working session to continue it seamlessly.

Create a detailed summary of our conversation above. This summary will be the ONLY context
available when we continue, so include:

1. **What was accomplished**: Completed tasks and changes made
2. **Current state**: Files modified, their current status
3. **In progress**: What we're working on now
4. **Next steps**: Clear actions to take next
5. **Key decisions**: Important technical choices and why
6. **User preferences**: Any constraints or preferences mentioned

Be comprehensive but concise. The goal is to continue work seamlessly without losing context.";

// ── Budget ─────────────────────────────────────────────────────────

/// Per-model context budget and the thresholds derived from it.
#[derive(Debug, Clone)]
pub struct ContextBudget {
    /// Context window size in tokens.
    pub hard_limit: usize,
    /// Tokens reserved for model output, counted against the limit.
    pub output_reserve: usize,
    /// Fraction of the limit at which compaction triggers.
    pub compaction_threshold: f64,
    /// Fraction of the limit at which emergency reduction triggers.
    pub emergency_threshold: f64,
}

impl ContextBudget {
    /// Budget for a model, with the context limit looked up by name.
    pub fn for_model(model: &str) -> Self {
        Self {
            hard_limit: context_limit_for(model),
            output_reserve: DEFAULT_OUTPUT_RESERVE,
            compaction_threshold: 0.85,
            emergency_threshold: 1.0,
        }
    }

    pub fn with_hard_limit(mut self, tokens: usize) -> Self {
        self.hard_limit = tokens.max(1);
        self
    }

    pub fn with_output_reserve(mut self, tokens: usize) -> Self {
        self.output_reserve = tokens;
        self
    }

    pub fn with_compaction_threshold(mut self, fraction: f64) -> Self {
        self.compaction_threshold = fraction;
        self
    }

    pub fn with_emergency_threshold(mut self, fraction: f64) -> Self {
        self.emergency_threshold = fraction;
        self
    }
}

/// Context window size for a model, by name.
///
/// Conservative estimates to absorb model-specific formatting overhead.
/// Unknown models get a conservative default.
pub fn context_limit_for(model: &str) -> usize {
    let name = model.to_lowercase();

    // Exact-ish matches first.
    const LIMITS: &[(&str, usize)] = &[
        ("claude-3-5-sonnet", 200_000),
        ("claude-3-5-haiku", 200_000),
        ("claude-sonnet", 200_000),
        ("claude-opus", 200_000),
        ("claude-haiku", 200_000),
        ("gpt-4-turbo", 128_000),
        ("gpt-4o", 128_000),
        ("gpt-3.5-turbo", 16_385),
        ("gemini-1.5-pro", 1_000_000),
        ("gemini-1.5-flash", 1_000_000),
        ("gemini-pro", 32_000),
    ];
    for (key, limit) in LIMITS {
        if name.contains(key) {
            return *limit;
        }
    }

    // Model families.
    if name.contains("claude") {
        200_000
    } else if name.contains("gpt-4") {
        128_000
    } else if name.contains("gpt-3.5") {
        16_385
    } else if name.contains("gemini") {
        32_000
    } else {
        128_000
    }
}

/// Snapshot of context usage at a point in time.
#[derive(Debug, Clone, Copy)]
pub struct ContextUsage {
    pub system_tokens: usize,
    pub message_tokens: usize,
    pub output_reserve: usize,
    /// System + messages + output reserve.
    pub total_tokens: usize,
    pub limit: usize,
    /// Usage as a fraction of the limit (0.0 to 1.0+).
    pub percent_full: f64,
}

impl ContextUsage {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: ~{} tokens ({:.0}% of {})",
            self.total_tokens,
            self.percent_full * 100.0,
            self.limit,
        )
    }
}

// ── Manager ────────────────────────────────────────────────────────

/// Decides when and how to shrink a conversation.
///
/// Holds the budget, the estimator, and the output reducer, plus the
/// system prompt (counted against the budget but not stored in the
/// conversation).
#[derive(Debug, Clone)]
pub struct ContextManager {
    budget: ContextBudget,
    estimator: TokenEstimator,
    reducer: OutputReducer,
    system_prompt_tokens: usize,
    /// High-water mark for the ingestion clamp, as a fraction of the limit.
    ingest_high_water: f64,
    /// Character ceiling applied by the ingestion clamp.
    ingest_ceiling_chars: usize,
}

impl ContextManager {
    pub fn new(budget: ContextBudget, system_prompt: &str) -> Self {
        let estimator = TokenEstimator::new();
        let system_prompt_tokens = estimator.estimate(system_prompt);
        Self {
            budget,
            estimator,
            reducer: OutputReducer::new(),
            system_prompt_tokens,
            ingest_high_water: 1.5,
            ingest_ceiling_chars: 30_000,
        }
    }

    pub fn with_reducer(mut self, reducer: OutputReducer) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn with_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_ingest_high_water(mut self, fraction: f64) -> Self {
        self.ingest_high_water = fraction;
        self
    }

    pub fn with_ingest_ceiling_chars(mut self, chars: usize) -> Self {
        self.ingest_ceiling_chars = chars.max(1);
        self
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    /// Current context usage for a conversation.
    pub fn usage(&self, messages: &[Message]) -> ContextUsage {
        let message_tokens = self.estimator.estimate_messages(messages);
        let total_tokens = self.system_prompt_tokens + message_tokens + self.budget.output_reserve;
        ContextUsage {
            system_tokens: self.system_prompt_tokens,
            message_tokens,
            output_reserve: self.budget.output_reserve,
            total_tokens,
            limit: self.budget.hard_limit,
            percent_full: total_tokens as f64 / self.budget.hard_limit as f64,
        }
    }

    /// Whether the conversation has crossed the compaction threshold.
    ///
    /// Always false on near-empty conversations: summarizing a handful of
    /// messages through a model call is neither cost-effective nor
    /// meaningful.
    pub fn needs_compaction(&self, messages: &[Message]) -> bool {
        messages.len() >= MIN_COMPACT_MESSAGES
            && self.usage(messages).percent_full >= self.budget.compaction_threshold
    }

    // ── Pruning ────────────────────────────────────────────────────

    /// Replace stale tool-result content with reduced summaries.
    ///
    /// Walks tool results newest-first; results inside the most recent
    /// `protect_tokens` of tool output are left alone, everything older is
    /// a candidate. Aborts (input returned unchanged) when projected
    /// savings fall under `min_savings_tokens`. Never removes a message —
    /// only content is replaced, so tool_call/tool_result pairing is
    /// untouched.
    pub fn prune(
        &self,
        messages: &[Message],
        protect_tokens: usize,
        min_savings_tokens: usize,
    ) -> Vec<Message> {
        // Newest-first walk to find candidates outside the protect window.
        let mut recent_tokens = 0usize;
        let mut replacements: Vec<(usize, String)> = Vec::new();
        let mut savings = 0usize;

        for idx in (0..messages.len()).rev() {
            let msg = &messages[idx];
            if msg.role != MessageRole::Tool {
                continue;
            }
            let Some(ref content) = msg.content else {
                continue;
            };
            let tokens = self.estimator.estimate(content);

            if recent_tokens < protect_tokens {
                recent_tokens += tokens;
                continue;
            }

            let tool_name = tool_name_for(messages, idx).unwrap_or("unknown");
            let reduced = self.reducer.reduce(tool_name, content);
            let reduced_tokens = self.estimator.estimate(&reduced);
            if reduced_tokens < tokens {
                savings += tokens - reduced_tokens;
                replacements.push((idx, reduced));
            }
        }

        if savings < min_savings_tokens {
            return messages.to_vec();
        }

        debug!(
            "pruning {} tool results, ~{} tokens freed",
            replacements.len(),
            savings
        );

        let mut out = messages.to_vec();
        for (idx, reduced) in replacements {
            out[idx].content = Some(reduced);
        }
        out
    }

    /// Hard-truncate every tool result on a small conversation.
    ///
    /// Used instead of model-driven compaction when the conversation is too
    /// short for a summary to be worth a model call.
    pub fn aggressive_prune(&self, messages: &[Message]) -> Vec<Message> {
        let mut out = messages.to_vec();
        for msg in &mut out {
            if msg.role == MessageRole::Tool
                && let Some(ref content) = msg.content
                && let Some(truncated) = truncate_marked(content, AGGRESSIVE_RESULT_CEILING_CHARS)
            {
                msg.content = Some(truncated);
            }
        }
        out
    }

    // ── Compaction ─────────────────────────────────────────────────

    /// Replace the older conversation prefix with a model-written summary.
    ///
    /// The last two complete turns are preserved byte-identically; the
    /// split point is a user message, which can never sit between an
    /// assistant's tool calls and their results, so pairing survives the
    /// cut. `summarize` receives the prefix with the summary instruction
    /// appended and returns the summary text.
    ///
    /// On a summarization error the input is returned unchanged. If the
    /// recent suffix alone already exceeds the budget, falls through to
    /// [`Self::emergency_reduce`] instead of looping.
    pub async fn compact<F, Fut>(&self, messages: &[Message], summarize: F) -> Vec<Message>
    where
        F: FnOnce(Vec<Message>) -> Fut,
        Fut: Future<Output = Result<String, String>>,
    {
        let boundary = recent_turns_boundary(messages, 2);
        if boundary == 0 {
            return messages.to_vec();
        }

        let (prefix, suffix) = messages.split_at(boundary);

        // Pathological case: the recent turns alone blow the budget.
        if self.usage(suffix).percent_full >= self.budget.compaction_threshold {
            warn!("recent turns alone exceed the compaction threshold; falling back to emergency reduction");
            return self.emergency_reduce(messages);
        }

        let mut request = prefix.to_vec();
        request.push(Message::user(COMPACTION_PROMPT));

        match summarize(request).await {
            Ok(summary) if !summary.trim().is_empty() => {
                debug!(
                    "compacted {} messages into a {}-char summary",
                    prefix.len(),
                    summary.len()
                );
                let mut out =
                    vec![Message::assistant_text(format!("{COMPACTION_MARKER}\n\n{summary}"))];
                out.extend_from_slice(suffix);
                out
            }
            Ok(_) => {
                warn!("summarization returned empty text; conversation left unchanged");
                messages.to_vec()
            }
            Err(e) => {
                warn!("summarization failed ({e}); conversation left unchanged");
                messages.to_vec()
            }
        }
    }

    // ── Emergency reduction ────────────────────────────────────────

    /// Last-resort reduction, applied when usage is at or past the
    /// emergency threshold. No model call is made. Steps, each skipped
    /// once usage is back under the threshold: hard-truncate oversized
    /// tool results, re-prune with no protect window, then truncate from
    /// the oldest non-system message forward.
    pub fn emergency_reduce(&self, messages: &[Message]) -> Vec<Message> {
        let mut out = messages.to_vec();

        // Step 1: per-result character ceiling.
        for msg in &mut out {
            if msg.role == MessageRole::Tool
                && let Some(ref content) = msg.content
                && let Some(truncated) = truncate_marked(content, EMERGENCY_RESULT_CEILING_CHARS)
            {
                msg.content = Some(truncated);
            }
        }
        if self.under_emergency(&out) {
            return out;
        }

        // Step 2: prune with the protect window lowered to zero.
        out = self.prune(&out, 0, 0);
        if self.under_emergency(&out) {
            return out;
        }

        // Step 3: oldest-first content truncation. Only on conversations
        // too small for normal compaction to take over afterwards.
        if out.len() < MIN_COMPACT_MESSAGES {
            for idx in 0..out.len() {
                if out[idx].role == MessageRole::System {
                    continue;
                }
                let truncated = out[idx]
                    .content
                    .as_deref()
                    .and_then(|c| truncate_marked(c, FLOOR_CONTENT_CHARS));
                if let Some(truncated) = truncated {
                    out[idx].content = Some(truncated);
                }
                if self.under_emergency(&out) {
                    break;
                }
            }
        }

        out
    }

    fn under_emergency(&self, messages: &[Message]) -> bool {
        self.usage(messages).percent_full < self.budget.emergency_threshold
    }

    // ── Ingestion clamp ────────────────────────────────────────────

    /// Clamp a single tool result before it reaches the conversation.
    ///
    /// A pathological output (an enormous file read, say) must never be
    /// allowed into the store unbounded; this is a distinct, earlier line
    /// of defense from periodic pruning. If appending `raw` would push
    /// usage past the high-water mark, it is truncated at a fixed
    /// character ceiling.
    pub fn ingest_tool_result(&self, messages: &[Message], raw: &str) -> String {
        let projected = self.usage(messages).total_tokens + self.estimator.estimate(raw);
        let ratio = projected as f64 / self.budget.hard_limit as f64;
        if ratio < self.ingest_high_water {
            return raw.to_string();
        }

        warn!(
            "tool result of {} chars would reach {:.0}% of context; clamping at ingestion",
            raw.len(),
            ratio * 100.0
        );
        truncate_marked(raw, self.ingest_ceiling_chars).unwrap_or_else(|| raw.to_string())
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Index of the user message that starts the `turns`-from-last turn, or 0
/// when the conversation holds fewer turns than requested.
fn recent_turns_boundary(messages: &[Message], turns: usize) -> usize {
    let mut seen = 0;
    for idx in (0..messages.len()).rev() {
        if messages[idx].role == MessageRole::User {
            seen += 1;
            if seen == turns {
                return idx;
            }
        }
    }
    0
}

/// Find the tool name that produced the tool result at `idx` by scanning
/// backward for the assistant message carrying the matching call.
fn tool_name_for(messages: &[Message], idx: usize) -> Option<&str> {
    let call_id = messages.get(idx)?.tool_call_id.as_deref()?;
    for msg in messages[..idx].iter().rev() {
        if let Some(ref calls) = msg.tool_calls {
            for call in calls {
                if call.id == call_id {
                    return Some(&call.function.name);
                }
            }
        }
    }
    None
}

/// Truncate `content` to `ceiling` characters (on a char boundary) with a
/// marker carrying the original size. `None` when no truncation is needed.
fn truncate_marked(content: &str, ceiling: usize) -> Option<String> {
    if content.len() <= ceiling {
        return None;
    }
    let mut cut = ceiling;
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }
    let (head, _) = content.split_at(cut);
    Some(format!(
        "{head}\n...[truncated - was {} chars]",
        content.len()
    ))
}
