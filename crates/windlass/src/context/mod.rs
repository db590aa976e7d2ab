//! Context window management: estimation, accounting, reduction, and the
//! manager that ties them together.
//!
//! The context window is the scarcest resource in any LLM agent. This module
//! provides layered strategies for keeping a conversation under a fixed
//! token budget:
//!
//! 1. **[`token`]** — [`TokenEstimator`] turns messages into approximate
//!    token counts. Deterministic, monotonic, and infallible; everything
//!    else depends on this call never failing.
//!
//! 2. **[`usage`]** — [`UsageTracker`] accumulates provider-reported token
//!    usage across a session, with cache-aware cost accounting.
//!
//! 3. **[`reduce`]** — [`OutputReducer`] shrinks stale tool output by output
//!    shape (listings, status, file content, command output). No LLM call
//!    needed; highest-ROI context recovery.
//!
//! 4. **[`manager`]** — [`ContextManager`] decides when to prune, when to
//!    compact through a model-written summary, and when to fall back to
//!    emergency truncation. Pure with respect to its input: it returns new
//!    conversation values and never mutates the store.
//!
//! All of this runs automatically inside the
//! [`Runner`](crate::agent::runner::Runner) loop.

pub mod manager;
pub mod reduce;
pub mod token;
pub mod usage;

// Re-export commonly used items at the module level.
pub use manager::{ContextBudget, ContextManager, ContextUsage};
pub use reduce::{KindMap, OutputKind, OutputReducer};
pub use token::TokenEstimator;
pub use usage::{UsageStats, UsageTracker};
