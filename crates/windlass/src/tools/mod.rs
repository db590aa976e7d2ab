//! Tool abstraction for the function-calling loop.
//!
//! The [`Tool`] trait defines the interface every tool must implement: a
//! static API definition (name, description, JSON Schema) and an async
//! `execute` method. Tools are collected into a [`ToolRegistry`] which
//! handles definition export, argument validation, and dispatch by name.
//!
//! Tool failures are never session-fatal: errors come back as `"Error: ..."`
//! strings that the loop feeds to the model as ordinary tool results, so the
//! model can see and react to the failure.

use crate::{ToolDef, json_schema_for};
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

/// Boxed future returned by [`Tool::execute`].
///
/// Type alias to keep trait signatures and implementations readable.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = String> + Send + 'a>>;

// ── Tool trait ─────────────────────────────────────────────────────

/// A tool the model can invoke via function-calling.
///
/// Implementors provide:
/// - A static definition ([`Tool::definition`]) describing the tool's name,
///   description, and JSON Schema parameters for the model.
/// - An async [`Tool::execute`] method that receives the raw JSON arguments
///   string and returns a result string.
///
/// # Example
///
/// ```ignore
/// struct ReadFile { workdir: String }
///
/// impl Tool for ReadFile {
///     fn definition(&self) -> ToolDef { /* ... */ }
///
///     fn execute(&self, arguments: &str) -> ToolFuture<'_> {
///         let arguments = arguments.to_string();
///         Box::pin(async move {
///             // parse args, read file, return content
///             todo!()
///         })
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    /// The tool definition sent to the model API.
    fn definition(&self) -> ToolDef;

    /// Execute the tool with the given raw JSON arguments string.
    ///
    /// Returns the tool result as a string. Errors should be returned as
    /// `"Error: ..."` strings rather than panicking — the loop will pass
    /// the string back to the model as a tool result regardless.
    ///
    /// Uses a boxed future so that the trait is dyn-compatible (object-safe).
    fn execute(&self, arguments: &str) -> ToolFuture<'_>;

    /// The tool's name (convenience — delegates to definition).
    fn name(&self) -> String {
        self.definition().function.name.clone()
    }
}

// ── ToolRegistry ───────────────────────────────────────────────────

/// A collection of tools dispatched by name.
///
/// Supplied at session start; the loop treats it as the tool-side boundary.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    /// Whether to validate arguments against the JSON Schema before execution.
    validate_args: bool,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("validate_args", &self.validate_args)
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            validate_args: false,
        }
    }

    /// Enable JSON Schema argument validation before execution.
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Export all tool definitions for the model API, sorted by name for a
    /// stable request shape.
    pub fn definitions(&self) -> Vec<ToolDef> {
        let mut defs: Vec<ToolDef> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    /// Dispatch a tool call by name.
    ///
    /// Unknown names and failed validation come back as error strings, not
    /// panics — the result always flows to the model.
    pub async fn dispatch(&self, name: &str, arguments: &str) -> String {
        let Some(tool) = self.tools.get(name) else {
            info!("model called unknown tool: {name}");
            return format!(
                "Error: unknown tool '{name}'. Available tools: {}",
                self.definitions()
                    .iter()
                    .map(|d| d.function.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        };

        if self.validate_args
            && let Some(error) = validate_tool_arguments(tool.as_ref(), arguments)
        {
            return error;
        }

        let args_preview: String = arguments.chars().take(120).collect();
        debug!("executing tool {name}({args_preview})");
        tool.execute(arguments).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Validate raw JSON arguments against a tool's parameter schema.
///
/// Returns `Some(error_message)` on failure, `None` when the arguments are
/// valid (or when the schema itself is invalid, in which case validation is
/// skipped).
pub fn validate_tool_arguments(tool: &dyn Tool, arguments: &str) -> Option<String> {
    let args_value: serde_json::Value = match serde_json::from_str(arguments) {
        Ok(v) => v,
        Err(e) => {
            return Some(format!(
                "Error: invalid JSON arguments for tool '{}': {e}. \
                 Please provide valid JSON matching the tool's parameter schema.",
                tool.name()
            ));
        }
    };

    let schema = tool.definition().function.parameters;

    let validator = match jsonschema::validator_for(&schema) {
        Ok(v) => v,
        Err(_) => return None,
    };

    let errors: Vec<String> = validator
        .iter_errors(&args_value)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Error: argument validation failed for tool '{}':\n{}\n\
             Please fix the arguments and try again.",
            tool.name(),
            errors.join("\n")
        ))
    }
}

/// Parse a raw JSON arguments string into a typed struct.
pub fn parse_tool_args<T: for<'de> Deserialize<'de>>(arguments: &str) -> Result<T, String> {
    serde_json::from_str(arguments).map_err(|e| format!("Error: invalid arguments: {e}"))
}

/// A tool built from a typed argument struct and a closure, for tests and
/// simple integrations.
pub struct FnTool<A, F> {
    def: ToolDef,
    f: F,
    _marker: std::marker::PhantomData<fn(A)>,
}

impl<A, F> FnTool<A, F>
where
    A: JsonSchema + for<'de> Deserialize<'de>,
    F: Fn(A) -> String + Send + Sync,
{
    pub fn new(name: impl Into<String>, description: impl Into<String>, f: F) -> Self {
        Self {
            def: ToolDef::new(name, description, json_schema_for::<A>()),
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<A, F> Tool for FnTool<A, F>
where
    A: JsonSchema + for<'de> Deserialize<'de> + Send,
    F: Fn(A) -> String + Send + Sync,
{
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<A>(arguments);
        Box::pin(async move {
            match parsed {
                Ok(args) => (self.f)(args),
                Err(e) => e,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, JsonSchema)]
    struct EchoArgs {
        text: String,
    }

    fn echo_tool() -> FnTool<EchoArgs, impl Fn(EchoArgs) -> String + Send + Sync> {
        FnTool::new("echo", "Echo the input text.", |args: EchoArgs| args.text)
    }

    #[tokio::test]
    async fn dispatch_known_tool() {
        let registry = ToolRegistry::new().with(echo_tool());
        let result = registry.dispatch("echo", r#"{"text": "hello"}"#).await;
        assert_eq!(result, "hello");
    }

    #[tokio::test]
    async fn dispatch_unknown_tool_returns_error_string() {
        let registry = ToolRegistry::new().with(echo_tool());
        let result = registry.dispatch("missing", "{}").await;
        assert!(result.starts_with("Error: unknown tool"));
        assert!(result.contains("echo"));
    }

    #[tokio::test]
    async fn validation_rejects_bad_arguments() {
        let registry = ToolRegistry::new().with(echo_tool()).with_arg_validation(true);
        let result = registry.dispatch("echo", r#"{"wrong_field": 1}"#).await;
        assert!(result.starts_with("Error: argument validation failed"));
    }

    #[tokio::test]
    async fn validation_rejects_invalid_json() {
        let registry = ToolRegistry::new().with(echo_tool()).with_arg_validation(true);
        let result = registry.dispatch("echo", "not json").await;
        assert!(result.starts_with("Error: invalid JSON arguments"));
    }

    #[test]
    fn definitions_are_sorted() {
        #[derive(Deserialize, JsonSchema)]
        struct NoArgs {}
        let registry = ToolRegistry::new()
            .with(FnTool::new("zeta", "z", |_: NoArgs| String::new()))
            .with(FnTool::new("alpha", "a", |_: NoArgs| String::new()));
        let names: Vec<String> = registry
            .definitions()
            .into_iter()
            .map(|d| d.function.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn parse_tool_args_typed() {
        let args: EchoArgs = parse_tool_args(r#"{"text": "x"}"#).unwrap();
        assert_eq!(args.text, "x");
        assert!(parse_tool_args::<EchoArgs>("{}").is_err());
    }
}
