//! Convenience re-exports for common `windlass` types.
//!
//! Meant to be glob-imported when building agents:
//!
//! ```ignore
//! use windlass::prelude::*;
//! ```
//!
//! This pulls in the types needed for the vast majority of agent programs:
//! the [`ChatClient`], [`Message`] constructors, [`Runner`] + session +
//! config, the [`Tool`] trait + [`ToolRegistry`], the permission gate, and
//! event handlers. Specialized types (the output reducer, the estimator,
//! pricing tables) are intentionally excluded — import those from their
//! modules directly when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Message, MessageRole, ToolCall, ToolDef, json_schema_for};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{
    AllowAll, CancelToken, Decision, EventHandler, FnGate, LoggingHandler, LoopEvent, LoopState,
    NoopHandler, PermissionGate, Runner, RunnerConfig, Session, SessionSnapshot, TurnOutcome,
};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{ContextBudget, ContextManager, ContextUsage};

// ── Provider boundary ───────────────────────────────────────────────
pub use crate::provider::{ChatClient, ModelClient, ModelTurn, ProviderError, TokenUsage};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{FnTool, Tool, ToolFuture, ToolRegistry, parse_tool_args};
