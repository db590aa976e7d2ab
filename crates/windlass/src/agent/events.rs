//! Lifecycle events emitted by the agent loop.
//!
//! Implement [`EventHandler`] to observe what the loop decides: model
//! round-trips, tool execution, context pruning and compaction, token
//! usage, interruption. The loop makes its decisions automatically but
//! always tells you what it decided.

use crate::context::manager::ContextUsage;
use crate::provider::TokenUsage;
use tracing::{debug, info, warn};

/// An event emitted during a run. Borrowed data; handlers copy what they
/// need to keep.
#[derive(Debug)]
pub enum LoopEvent<'a> {
    /// A model round-trip is starting.
    IterationStart {
        iteration: u32,
        usage: &'a ContextUsage,
    },
    /// The model produced text content.
    Text { content: &'a str },
    /// The model requested tool calls.
    ToolCallsReceived { count: usize },
    /// A tool is about to execute.
    ToolExecuting { name: &'a str, arguments: &'a str },
    /// A tool finished; `result` is the (possibly clamped) stored content.
    ToolResult { name: &'a str, result: &'a str },
    /// The permission gate denied a tool call.
    PermissionDenied { name: &'a str, reason: &'a str },
    /// Provider-reported token usage for one call.
    TokenUsage { usage: &'a TokenUsage },
    /// Stale tool output was pruned.
    Pruned { tokens_freed: usize },
    /// The conversation was compacted into a summary.
    Compacted {
        messages_before: usize,
        messages_after: usize,
    },
    /// Emergency reduction ran.
    EmergencyReduction,
    /// The run was cancelled; pairing has been repaired.
    Interrupted,
    /// The iteration ceiling was reached.
    IterationLimit { iterations: u32 },
    /// The run completed with a final answer.
    Finished,
}

/// Observer for loop events.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &LoopEvent<'_>);
}

/// Handler that ignores all events.
pub struct NoopHandler;

impl EventHandler for NoopHandler {
    fn on_event(&self, _event: &LoopEvent<'_>) {}
}

/// Handler that logs every event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &LoopEvent<'_>) {
        match event {
            LoopEvent::IterationStart { iteration, usage } => {
                info!("iteration {iteration}: {}", usage.to_log_string());
            }
            LoopEvent::Text { content } => {
                let preview: String = content.chars().take(200).collect();
                debug!("model text: {preview}");
            }
            LoopEvent::ToolCallsReceived { count } => {
                info!("model requested {count} tool call(s)");
            }
            LoopEvent::ToolExecuting { name, arguments } => {
                let args_preview: String = arguments.chars().take(120).collect();
                info!("tool {name}({args_preview})");
            }
            LoopEvent::ToolResult { name, result } => {
                debug!("tool {name} returned {} chars", result.len());
            }
            LoopEvent::PermissionDenied { name, reason } => {
                warn!("tool {name} denied: {reason}");
            }
            LoopEvent::TokenUsage { usage } => {
                debug!(
                    "usage: input={}, output={}, cache_read={}",
                    usage.input_tokens, usage.output_tokens, usage.cache_read_tokens,
                );
            }
            LoopEvent::Pruned { tokens_freed } => {
                info!("pruned stale tool output (~{tokens_freed} tokens freed)");
            }
            LoopEvent::Compacted {
                messages_before,
                messages_after,
            } => {
                info!("compacted conversation: {messages_before} -> {messages_after} messages");
            }
            LoopEvent::EmergencyReduction => {
                warn!("emergency context reduction");
            }
            LoopEvent::Interrupted => {
                warn!("run interrupted");
            }
            LoopEvent::IterationLimit { iterations } => {
                warn!("iteration limit reached after {iterations} iterations");
            }
            LoopEvent::Finished => {
                info!("run finished");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_handler_accepts_all_events() {
        let handler = NoopHandler;
        handler.on_event(&LoopEvent::Finished);
        handler.on_event(&LoopEvent::ToolCallsReceived { count: 3 });
    }
}
