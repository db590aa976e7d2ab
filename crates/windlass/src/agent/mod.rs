//! The agent loop and its session state.
//!
//! [`Runner`](runner::Runner) drives the context-bounded tool-calling loop
//! over a [`Session`](session::Session), which owns the conversation store
//! and the cumulative usage counters. Observability goes through
//! [`EventHandler`](events::EventHandler); tool authorization goes through
//! [`PermissionGate`](permission::PermissionGate); cancellation goes through
//! [`CancelToken`](runner::CancelToken).

pub mod config;
pub mod events;
pub mod permission;
pub mod runner;
pub mod session;

pub use config::RunnerConfig;
pub use events::{EventHandler, LoggingHandler, LoopEvent, NoopHandler};
pub use permission::{AllowAll, Decision, FnGate, PermissionGate};
pub use runner::{CancelToken, LoopState, Runner, TurnOutcome};
pub use session::{Session, SessionSnapshot};
