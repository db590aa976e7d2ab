//! Fast token estimation for messages and raw text.
//!
//! The estimator is heuristic by design: characters divided by a fixed
//! ratio, plus small per-field overheads for message structure. It trades
//! accuracy for two properties the rest of the system depends on —
//! determinism and infallibility. Thresholds elsewhere are conservative
//! enough to absorb the estimation error.

use crate::Message;

/// Default characters per token (conservative estimate for English text
/// mixed with code).
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

/// Fixed overhead per message for role and framing.
const ROLE_OVERHEAD: usize = 4;

/// Fixed overhead per tool call for the call envelope (id, type, framing).
const TOOL_CALL_OVERHEAD: usize = 10;

/// Fixed overhead for a tool_call_id field on tool-result messages.
const TOOL_CALL_ID_OVERHEAD: usize = 5;

/// Estimates token counts from character counts.
///
/// Longer text never yields a smaller estimate, and estimating the same
/// input twice always yields the same result. The empty string estimates
/// to zero.
#[derive(Debug, Clone)]
pub struct TokenEstimator {
    chars_per_token: usize,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl TokenEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the chars-per-token ratio (values below 1 are clamped to 1).
    pub fn with_chars_per_token(mut self, ratio: usize) -> Self {
        self.chars_per_token = ratio.max(1);
        self
    }

    /// Estimate tokens for a raw string.
    pub fn estimate(&self, text: &str) -> usize {
        text.len().div_ceil(self.chars_per_token)
    }

    /// Estimate tokens for a single message, including structural overhead
    /// for the role, tool calls, and tool_call_id.
    pub fn estimate_message(&self, msg: &Message) -> usize {
        let mut tokens = ROLE_OVERHEAD;

        if let Some(ref content) = msg.content {
            tokens += self.estimate(content);
        }

        if let Some(ref calls) = msg.tool_calls {
            for call in calls {
                tokens += TOOL_CALL_OVERHEAD;
                tokens += self.estimate(&call.function.name);
                tokens += self.estimate(&call.function.arguments);
            }
        }

        if msg.tool_call_id.is_some() {
            tokens += TOOL_CALL_ID_OVERHEAD;
        }

        tokens
    }

    /// Estimate total tokens for a slice of messages.
    pub fn estimate_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.estimate_message(m)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolCall;

    #[test]
    fn empty_string_is_zero() {
        let est = TokenEstimator::new();
        assert_eq!(est.estimate(""), 0);
    }

    #[test]
    fn estimate_is_deterministic() {
        let est = TokenEstimator::new();
        let text = "fn main() { println!(\"hello\"); }";
        assert_eq!(est.estimate(text), est.estimate(text));
    }

    #[test]
    fn longer_text_never_estimates_smaller() {
        let est = TokenEstimator::new();
        let mut prev = 0;
        for n in 0..200 {
            let t = est.estimate(&"a".repeat(n));
            assert!(t >= prev);
            prev = t;
        }
    }

    #[test]
    fn message_overhead_exceeds_bare_content() {
        let est = TokenEstimator::new();
        let msg = Message::user("hello world");
        assert!(est.estimate_message(&msg) > est.estimate("hello world"));
        // An empty message still costs the role overhead.
        let empty = Message::user("");
        assert!(est.estimate_message(&empty) >= 4);
    }

    #[test]
    fn tool_calls_add_to_estimate() {
        let est = TokenEstimator::new();
        let plain = Message::assistant_text("x");
        let with_call = Message::assistant_tool_calls(
            Some("x".into()),
            vec![ToolCall::function(
                "c1",
                "read_file",
                r#"{"path": "src/main.rs"}"#,
            )],
        );
        assert!(est.estimate_message(&with_call) > est.estimate_message(&plain));
    }

    #[test]
    fn tool_call_id_adds_overhead() {
        let est = TokenEstimator::new();
        let plain = Message::user("result");
        let tool = Message::tool_result("c1", "result");
        assert!(est.estimate_message(&tool) > est.estimate_message(&plain));
    }

    #[test]
    fn custom_ratio_changes_estimate() {
        let default = TokenEstimator::new();
        let coarse = TokenEstimator::new().with_chars_per_token(8);
        let text = "a".repeat(4000);
        assert!(coarse.estimate(&text) < default.estimate(&text));
    }

    #[test]
    fn estimate_messages_sums() {
        let est = TokenEstimator::new();
        let msgs = vec![Message::user("one"), Message::user("two")];
        assert_eq!(
            est.estimate_messages(&msgs),
            est.estimate_message(&msgs[0]) + est.estimate_message(&msgs[1])
        );
    }
}
