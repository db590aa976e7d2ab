//! Tool authorization boundary.
//!
//! The gate is consulted once per tool call, synchronously, before
//! execution. Implementations may block on human input — the loop treats
//! the call as a suspension point. A denial still produces a paired tool
//! result in the conversation; the call is never silently skipped.

/// Authorization verdict for one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

/// External authorization boundary for tool execution.
pub trait PermissionGate: Send + Sync {
    fn authorize(&self, tool_name: &str, arguments: &str) -> Decision;
}

/// Gate that allows every call.
pub struct AllowAll;

impl PermissionGate for AllowAll {
    fn authorize(&self, _tool_name: &str, _arguments: &str) -> Decision {
        Decision::Allow
    }
}

/// Gate driven by a closure, for tests and simple policies.
pub struct FnGate<F>(pub F);

impl<F> PermissionGate for FnGate<F>
where
    F: Fn(&str, &str) -> Decision + Send + Sync,
{
    fn authorize(&self, tool_name: &str, arguments: &str) -> Decision {
        (self.0)(tool_name, arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_allows() {
        assert_eq!(AllowAll.authorize("anything", "{}"), Decision::Allow);
    }

    #[test]
    fn fn_gate_applies_policy() {
        let gate = FnGate(|name: &str, _: &str| {
            if name == "run_shell" {
                Decision::Deny("shell disabled".into())
            } else {
                Decision::Allow
            }
        });
        assert_eq!(gate.authorize("read_file", "{}"), Decision::Allow);
        assert_eq!(
            gate.authorize("run_shell", "{}"),
            Decision::Deny("shell disabled".into())
        );
    }
}
