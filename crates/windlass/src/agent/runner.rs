//! The context-bounded tool-calling loop.
//!
//! One logical thread of control per session: the runner appends the user
//! message, calls the model, executes tool calls sequentially in the order
//! the model returned them, appends results, and repeats until the model
//! answers in plain text, the iteration ceiling is hit, or the user
//! cancels. Suspension points are exactly three — the model call, tool
//! execution, and the summarization call inside compaction — and all three
//! are cancellable.
//!
//! The structural invariant the runner maintains at all costs: every tool
//! call on an assistant message gets exactly one tool-result message before
//! the next assistant message. Interruption and permission denial both
//! synthesize error results rather than skip; an unpaired call would make
//! every subsequent model request invalid and corrupt the session until
//! restart.

use crate::agent::config::RunnerConfig;
use crate::agent::events::{EventHandler, LoopEvent, NoopHandler};
use crate::agent::permission::{Decision, PermissionGate};
use crate::agent::session::Session;
use crate::context::manager::SMALL_CONVERSATION_MESSAGES;
use crate::provider::{ModelClient, ModelTurn, ProviderError};
use crate::tools::ToolRegistry;
use crate::{Message, MessageRole};
use chrono::Local;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::{debug, info};

/// Content of the synthetic tool result appended for calls left unpaired
/// by a cancellation.
pub const INTERRUPTED_RESULT: &str = "Error: Operation interrupted by user";

/// Minimum messages that must accrue after a compaction before another one
/// is attempted, so a compaction that fails to shrink the conversation
/// can't trigger itself in a loop.
const MIN_MESSAGES_BETWEEN_COMPACTIONS: usize = 3;

// ── Cancellation ───────────────────────────────────────────────────

/// Cooperative cancellation signal, cloneable across tasks.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Wakes every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the signal so the token can be reused for the next turn.
    pub fn reset(&self) {
        self.inner.cancelled.store(false, Ordering::SeqCst);
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

// ── Loop types ─────────────────────────────────────────────────────

/// State of the loop's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    AwaitingModel,
    ExecutingTools,
    Interrupted,
}

/// Terminal outcome of one user turn. The iteration limit is a normal,
/// expected outcome, distinct from failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model produced a final text answer.
    Completed(String),
    /// The iteration ceiling was hit; carries a user-facing hint.
    IterationLimit(String),
    /// The user cancelled; pairing has been repaired.
    Interrupted,
}

enum ModelStep {
    Interrupted,
    TimedOut,
    Turn(Result<ModelTurn, ProviderError>),
}

// ── Runner ─────────────────────────────────────────────────────────

/// Drives the tool-calling loop over a [`Session`].
pub struct Runner<'a> {
    client: &'a dyn ModelClient,
    tools: &'a ToolRegistry,
    permissions: &'a dyn PermissionGate,
    handler: &'a dyn EventHandler,
    config: RunnerConfig,
    cancel: CancelToken,
    state: LoopState,
}

impl<'a> Runner<'a> {
    pub fn new(
        client: &'a dyn ModelClient,
        tools: &'a ToolRegistry,
        permissions: &'a dyn PermissionGate,
        config: RunnerConfig,
    ) -> Self {
        Self {
            client,
            tools,
            permissions,
            handler: &NoopHandler,
            config,
            cancel: CancelToken::new(),
            state: LoopState::Idle,
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// A clone of the token; cancel it from another task to interrupt.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run one user turn to completion.
    pub async fn run(
        &mut self,
        session: &mut Session,
        user_input: &str,
    ) -> Result<TurnOutcome, ProviderError> {
        session.messages.push(Message::user(user_input));

        let mut iterations = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.interrupt(session));
            }
            if iterations >= self.config.max_iterations {
                self.state = LoopState::Idle;
                self.handler.on_event(&LoopEvent::IterationLimit { iterations });
                return Ok(TurnOutcome::IterationLimit(format!(
                    "Reached maximum iterations ({}). Type 'continue' to resume.",
                    self.config.max_iterations,
                )));
            }
            iterations += 1;

            self.manage_context(session).await;

            let usage = session.context.usage(&session.messages);
            self.handler.on_event(&LoopEvent::IterationStart {
                iteration: iterations,
                usage: &usage,
            });

            self.state = LoopState::AwaitingModel;
            let request = self.assemble_request(session);
            let defs = self.tools.definitions();

            let step = tokio::select! {
                _ = self.cancel.cancelled() => ModelStep::Interrupted,
                result = tokio::time::timeout(
                    self.config.llm_timeout,
                    self.client.send(&request, &defs),
                ) => match result {
                    Ok(turn) => ModelStep::Turn(turn),
                    Err(_) => ModelStep::TimedOut,
                },
            };
            let turn = match step {
                ModelStep::Interrupted => return Ok(self.interrupt(session)),
                ModelStep::TimedOut => {
                    self.state = LoopState::Idle;
                    return Err(ProviderError::Timeout);
                }
                ModelStep::Turn(result) => match result {
                    Ok(turn) => turn,
                    Err(e) => {
                        self.state = LoopState::Idle;
                        return Err(e);
                    }
                },
            };

            if let Some(ref usage) = turn.usage {
                session.tracker.record(usage);
                self.handler.on_event(&LoopEvent::TokenUsage { usage });
            }

            // Final answer: no tool calls requested.
            if turn.tool_calls.is_empty() {
                let answer = turn.content.unwrap_or_default();
                session.messages.push(Message::assistant_text(answer.clone()));
                self.handler.on_event(&LoopEvent::Text { content: &answer });
                self.handler.on_event(&LoopEvent::Finished);
                self.state = LoopState::Idle;
                return Ok(TurnOutcome::Completed(answer));
            }

            // Append the assistant message first, then execute; the calls
            // must be on the record before any result is.
            if let Some(ref content) = turn.content
                && !content.is_empty()
            {
                self.handler.on_event(&LoopEvent::Text { content });
            }
            let calls = turn.tool_calls.clone();
            session
                .messages
                .push(Message::assistant_tool_calls(turn.content, calls.clone()));
            self.handler.on_event(&LoopEvent::ToolCallsReceived { count: calls.len() });

            // Sequential, in model order: later calls may depend on earlier
            // results, and the permission gate presents one prompt at a time.
            self.state = LoopState::ExecutingTools;
            for call in &calls {
                if self.cancel.is_cancelled() {
                    return Ok(self.interrupt(session));
                }

                let name = &call.function.name;
                let arguments = &call.function.arguments;

                let raw = match self.permissions.authorize(name, arguments) {
                    Decision::Deny(reason) => {
                        self.handler.on_event(&LoopEvent::PermissionDenied {
                            name,
                            reason: &reason,
                        });
                        // A denial still produces a paired result.
                        format!("Error: permission denied: {reason}")
                    }
                    Decision::Allow => {
                        self.handler.on_event(&LoopEvent::ToolExecuting { name, arguments });
                        let result = tokio::select! {
                            _ = self.cancel.cancelled() => None,
                            result = self.tools.dispatch(name, arguments) => Some(result),
                        };
                        match result {
                            Some(raw) => raw,
                            None => return Ok(self.interrupt(session)),
                        }
                    }
                };

                let stored = session.context.ingest_tool_result(&session.messages, &raw);
                self.handler.on_event(&LoopEvent::ToolResult {
                    name,
                    result: &stored,
                });
                session.messages.push(Message::tool_result(&call.id, stored));
            }

            self.maybe_prune(session);
        }
    }

    /// Per-call request assembly: the system prompt plus a freshly
    /// generated clock notice, so long-lived sessions don't drift.
    fn assemble_request(&self, session: &Session) -> Vec<Message> {
        let mut request = Vec::with_capacity(session.messages.len() + 2);
        request.push(Message::system(session.system_prompt()));
        request.push(Message::system(format!(
            "Current date and time: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
        )));
        request.extend_from_slice(&session.messages);
        request
    }

    /// Pre-flight context management: emergency reduction past the
    /// emergency threshold, then compaction past the compaction threshold,
    /// then a prune re-check.
    async fn manage_context(&self, session: &mut Session) {
        let usage = session.context.usage(&session.messages);
        if usage.percent_full >= session.context.budget().emergency_threshold {
            session.messages = session.context.emergency_reduce(&session.messages);
            self.handler.on_event(&LoopEvent::EmergencyReduction);
        }

        if !self.config.auto_compact || !session.context.needs_compaction(&session.messages) {
            return;
        }

        let since_last = session
            .messages
            .len()
            .saturating_sub(session.messages_at_last_compaction);
        if session.messages_at_last_compaction > 0 && since_last < MIN_MESSAGES_BETWEEN_COMPACTIONS
        {
            debug!("skipping compaction: only {since_last} messages since the last one");
            return;
        }

        let before = session.messages.len();
        let new_messages = if before < SMALL_CONVERSATION_MESSAGES {
            // Too short for a summary to be worth a model call.
            session.context.aggressive_prune(&session.messages)
        } else {
            let client = self.client;
            let timeout = self.config.llm_timeout;
            let compacted = tokio::select! {
                _ = self.cancel.cancelled() => None,
                result = session.context.compact(&session.messages, |request| async move {
                    match tokio::time::timeout(timeout, client.send(&request, &[])).await {
                        Ok(Ok(turn)) => turn
                            .content
                            .ok_or_else(|| "empty summary response".to_string()),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err("summarization timed out".to_string()),
                    }
                }) => Some(result),
            };
            match compacted {
                Some(messages) => messages,
                // Cancellation is observed at the next loop checkpoint.
                None => return,
            }
        };

        if new_messages != session.messages {
            session.messages = new_messages;
            session.messages_at_last_compaction = session.messages.len();
            info!(
                "compacted conversation: {before} -> {} messages",
                session.messages.len()
            );
            self.handler.on_event(&LoopEvent::Compacted {
                messages_before: before,
                messages_after: session.messages.len(),
            });
        }

        self.maybe_prune(session);
    }

    /// Proactive prune hook; commits only when it actually frees tokens.
    fn maybe_prune(&self, session: &mut Session) {
        if !self.config.proactive_prune {
            return;
        }
        let before = session.context.usage(&session.messages).total_tokens;
        let pruned = session.context.prune(
            &session.messages,
            self.config.prune_protect_tokens,
            self.config.prune_min_savings_tokens,
        );
        let after = session.context.usage(&pruned).total_tokens;
        if after < before {
            session.messages = pruned;
            self.handler.on_event(&LoopEvent::Pruned {
                tokens_freed: before - after,
            });
        }
    }

    /// Cancellation cleanup: restore the pairing invariant, then report.
    fn interrupt(&mut self, session: &mut Session) -> TurnOutcome {
        self.state = LoopState::Interrupted;
        let repaired = repair_tool_pairing(&mut session.messages);
        if repaired > 0 {
            debug!("synthesized {repaired} interrupted tool result(s)");
        }
        self.handler.on_event(&LoopEvent::Interrupted);
        self.state = LoopState::Idle;
        TurnOutcome::Interrupted
    }
}

// ── Pairing repair ─────────────────────────────────────────────────

/// Synthesize error results for every tool call on the trailing assistant
/// message that has no matching tool result yet. Returns how many were
/// added.
pub fn repair_tool_pairing(messages: &mut Vec<Message>) -> usize {
    let Some(assistant_idx) = messages
        .iter()
        .rposition(|m| m.role == MessageRole::Assistant && m.tool_calls.is_some())
    else {
        return 0;
    };

    let missing: Vec<String> = {
        let answered: HashSet<&str> = messages[assistant_idx + 1..]
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        messages[assistant_idx]
            .tool_calls
            .iter()
            .flatten()
            .filter(|call| !answered.contains(call.id.as_str()))
            .map(|call| call.id.clone())
            .collect()
    };

    let count = missing.len();
    for id in missing {
        messages.push(Message::tool_result(id, INTERRUPTED_RESULT));
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolCall;

    fn two_call_assistant() -> Message {
        Message::assistant_tool_calls(
            None,
            vec![
                ToolCall::function("c1", "read_file", "{}"),
                ToolCall::function("c2", "grep", "{}"),
            ],
        )
    }

    #[test]
    fn repair_adds_exactly_the_missing_results() {
        let mut messages = vec![
            Message::user("task"),
            two_call_assistant(),
            Message::tool_result("c1", "done"),
        ];
        let added = repair_tool_pairing(&mut messages);
        assert_eq!(added, 1);
        let last = messages.last().unwrap();
        assert_eq!(last.tool_call_id.as_deref(), Some("c2"));
        assert_eq!(last.content.as_deref(), Some(INTERRUPTED_RESULT));
    }

    #[test]
    fn repair_is_noop_when_fully_paired() {
        let mut messages = vec![
            Message::user("task"),
            two_call_assistant(),
            Message::tool_result("c1", "a"),
            Message::tool_result("c2", "b"),
        ];
        let len = messages.len();
        assert_eq!(repair_tool_pairing(&mut messages), 0);
        assert_eq!(messages.len(), len);
    }

    #[test]
    fn repair_handles_no_tool_calls() {
        let mut messages = vec![Message::user("hi"), Message::assistant_text("hello")];
        assert_eq!(repair_tool_pairing(&mut messages), 0);
    }

    #[tokio::test]
    async fn cancel_token_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_when_already_set() {
        let token = CancelToken::new();
        token.cancel();
        token.cancelled().await;
    }
}
