//! Shape-aware reduction of tool output.
//!
//! Tool results are the single largest context consumer in any agent loop.
//! A file read can inject 30KB; a directory listing can return thousands of
//! entries. Most of this is irrelevant after the model has processed it.
//! This module shrinks old results without an LLM call, dispatching on the
//! *shape* of a tool's output rather than its exact name, so new tools get
//! sensible behavior by classification instead of per-tool branches.
//!
//! Two guarantees hold for every reduction: the result is never longer than
//! the input, and never empty — a zero-length result would be
//! indistinguishable from "the tool produced nothing".

use std::collections::HashMap;

/// Placeholder emitted when a tool produced no output at all.
pub const EMPTY_OUTPUT_MARKER: &str = "(no output)";

/// Outputs below this size are returned unchanged; reduction overhead on
/// tiny results isn't worth the fidelity loss.
pub const MIN_REDUCTION_CHARS: usize = 256;

/// Head/tail window for content-like output, in lines.
const CONTENT_WINDOW_LINES: usize = 20;

/// Representative sample count for enumeration-like output.
const ENUM_SAMPLE_LINES: usize = 8;

/// Raw entries kept for status-like output.
const STATUS_ENTRY_LINES: usize = 10;

/// Prefix lines kept for free-form command output.
const COMMAND_PREFIX_LINES: usize = 8;

/// Cap on preserved signal lines in command output.
const COMMAND_SIGNAL_LINES: usize = 20;

/// The shape of a tool's output, driving the reduction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// File listings, directory trees, repo-wide structure maps:
    /// count plus a handful of representative samples.
    Enumeration,
    /// Repository state, search-match lists: counts broken down by
    /// subtype plus the first few raw entries.
    Status,
    /// Single-file reads, structural outlines: head and tail kept
    /// verbatim, middle elided with an explicit marker.
    Content,
    /// Free-form command output: short prefix plus any embedded
    /// success/failure signal lines.
    Command,
}

/// Tool-name to output-shape lookup.
///
/// Unknown tool names fall back to [`OutputKind::Command`], the most
/// conservative strategy for output of unknown structure.
#[derive(Debug, Clone)]
pub struct KindMap {
    map: HashMap<String, OutputKind>,
}

impl Default for KindMap {
    fn default() -> Self {
        let mut map = HashMap::new();
        for name in ["list_files", "list_dir", "tree", "repo_map", "find_files"] {
            map.insert(name.to_string(), OutputKind::Enumeration);
        }
        for name in ["git_status", "grep", "search", "glob"] {
            map.insert(name.to_string(), OutputKind::Status);
        }
        for name in ["read_file", "read_lines", "code_structure", "outline"] {
            map.insert(name.to_string(), OutputKind::Content);
        }
        for name in ["run_shell", "bash", "run_command"] {
            map.insert(name.to_string(), OutputKind::Command);
        }
        Self { map }
    }
}

impl KindMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify an additional tool name.
    pub fn classify(mut self, name: impl Into<String>, kind: OutputKind) -> Self {
        self.map.insert(name.into(), kind);
        self
    }

    /// Look up the output shape for a tool name.
    pub fn kind_for(&self, name: &str) -> OutputKind {
        self.map.get(name).copied().unwrap_or(OutputKind::Command)
    }
}

/// Reduces tool output by shape.
#[derive(Debug, Clone, Default)]
pub struct OutputReducer {
    kinds: KindMap,
}

impl OutputReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kinds(mut self, kinds: KindMap) -> Self {
        self.kinds = kinds;
        self
    }

    /// Reduce a tool result. Dispatches on the output shape registered for
    /// `tool_name`; outputs under [`MIN_REDUCTION_CHARS`] pass through
    /// unchanged.
    pub fn reduce(&self, tool_name: &str, raw: &str) -> String {
        if raw.is_empty() {
            return EMPTY_OUTPUT_MARKER.to_string();
        }
        if raw.len() < MIN_REDUCTION_CHARS {
            return raw.to_string();
        }

        let reduced = match self.kinds.kind_for(tool_name) {
            OutputKind::Enumeration => reduce_enumeration(raw),
            OutputKind::Status => reduce_status(raw),
            OutputKind::Content => reduce_content(raw),
            OutputKind::Command => reduce_command(raw),
        };

        // Reduction must never grow or empty the result.
        if reduced.is_empty() || reduced.len() >= raw.len() {
            raw.to_string()
        } else {
            reduced
        }
    }
}

fn reduce_enumeration(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    if lines.len() <= ENUM_SAMPLE_LINES {
        return raw.to_string();
    }
    let samples = lines
        .iter()
        .take(ENUM_SAMPLE_LINES)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{} entries total; first {} shown:\n{}\n[{} more entries elided]",
        lines.len(),
        ENUM_SAMPLE_LINES,
        samples,
        lines.len() - ENUM_SAMPLE_LINES,
    )
}

fn reduce_status(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() <= STATUS_ENTRY_LINES {
        return raw.to_string();
    }

    // Group by the leading token (e.g. git porcelain status codes, grep
    // file prefixes split at ':').
    let mut counts: Vec<(String, usize)> = Vec::new();
    for line in &lines {
        let key = line
            .split_whitespace()
            .next()
            .unwrap_or("")
            .split(':')
            .next()
            .unwrap_or("")
            .to_string();
        if let Some(entry) = counts.iter_mut().find(|(k, _)| *k == key) {
            entry.1 += 1;
        } else {
            counts.push((key, 1));
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let breakdown = counts
        .iter()
        .take(8)
        .map(|(k, n)| format!("{k}: {n}"))
        .collect::<Vec<_>>()
        .join(", ");
    let head = lines
        .iter()
        .take(STATUS_ENTRY_LINES)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{} entries ({breakdown}); first {} shown:\n{}\n[{} more entries elided]",
        lines.len(),
        STATUS_ENTRY_LINES,
        head,
        lines.len() - STATUS_ENTRY_LINES,
    )
}

fn reduce_content(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    if lines.len() <= 2 * CONTENT_WINDOW_LINES {
        return raw.to_string();
    }
    let head = lines
        .iter()
        .take(CONTENT_WINDOW_LINES)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    let tail = lines
        .iter()
        .skip(lines.len() - CONTENT_WINDOW_LINES)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    let omitted = lines.len() - 2 * CONTENT_WINDOW_LINES;
    format!("{head}\n<{omitted} lines omitted>\n{tail}")
}

/// Keywords marking lines worth preserving in command output: test
/// verdicts, error reports, numeric summaries.
const SIGNAL_KEYWORDS: &[&str] = &[
    "pass", "fail", "error", "warning", "panic", "ok", "success", "denied", "exit",
];

fn is_signal_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    SIGNAL_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn reduce_command(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    if lines.len() <= COMMAND_PREFIX_LINES {
        return raw.to_string();
    }

    let prefix = lines
        .iter()
        .take(COMMAND_PREFIX_LINES)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    let signals: Vec<&str> = lines
        .iter()
        .skip(COMMAND_PREFIX_LINES)
        .filter(|l| is_signal_line(l))
        .take(COMMAND_SIGNAL_LINES)
        .copied()
        .collect();

    let elided = lines.len() - COMMAND_PREFIX_LINES - signals.len();
    let mut out = format!("{prefix}\n[{elided} lines elided]");
    if !signals.is_empty() {
        out.push('\n');
        out.push_str(&signals.join("\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reducer() -> OutputReducer {
        OutputReducer::new()
    }

    #[test]
    fn empty_output_gets_marker() {
        assert_eq!(reducer().reduce("read_file", ""), EMPTY_OUTPUT_MARKER);
    }

    #[test]
    fn small_output_unchanged() {
        let raw = "line one\nline two";
        assert_eq!(reducer().reduce("list_files", raw), raw);
    }

    #[test]
    fn never_larger_never_empty() {
        let inputs = [
            ("list_files", (0..500).map(|i| format!("src/file_{i}.rs")).collect::<Vec<_>>().join("\n")),
            ("read_file", (0..500).map(|i| format!("let x{i} = {i};")).collect::<Vec<_>>().join("\n")),
            ("git_status", (0..300).map(|i| format!("M src/mod_{i}.rs")).collect::<Vec<_>>().join("\n")),
            ("run_shell", (0..300).map(|i| format!("compiling unit {i}")).collect::<Vec<_>>().join("\n")),
            ("unregistered_tool", "x".repeat(5000)),
        ];
        for (tool, raw) in &inputs {
            let out = reducer().reduce(tool, raw);
            assert!(!out.is_empty(), "{tool} produced empty output");
            assert!(out.len() <= raw.len(), "{tool} grew the output");
        }
    }

    #[test]
    fn enumeration_keeps_count_and_samples() {
        let raw = (0..200)
            .map(|i| format!("src/module_{i}.rs"))
            .collect::<Vec<_>>()
            .join("\n");
        let out = reducer().reduce("list_files", &raw);
        assert!(out.contains("200 entries"));
        assert!(out.contains("src/module_0.rs"));
        assert!(out.contains("more entries elided"));
        assert!(out.len() < raw.len() / 5);
    }

    #[test]
    fn status_breaks_down_by_subtype() {
        let mut lines: Vec<String> = (0..50).map(|i| format!("M src/a_{i}.rs")).collect();
        lines.extend((0..30).map(|i| format!("?? new_{i}.rs")));
        let raw = lines.join("\n");
        let out = reducer().reduce("git_status", &raw);
        assert!(out.contains("80 entries"));
        assert!(out.contains("M: 50"));
        assert!(out.contains("??: 30"));
        assert!(out.contains("M src/a_0.rs"));
    }

    #[test]
    fn content_keeps_head_and_tail() {
        let raw = (0..100)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let out = reducer().reduce("read_file", &raw);
        assert!(out.contains("line 0"));
        assert!(out.contains("line 99"));
        assert!(out.contains("<60 lines omitted>"));
        assert!(!out.contains("line 50"));
    }

    #[test]
    fn content_at_window_boundary_unchanged() {
        let raw = (0..40)
            .map(|i| format!("a much longer line of file content number {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(reducer().reduce("read_file", &raw), raw);
    }

    #[test]
    fn command_preserves_signal_lines() {
        let mut lines: Vec<String> = (0..100).map(|i| format!("compiling crate number {i}")).collect();
        lines.push("test result: FAILED. 3 passed; 2 failed".to_string());
        let raw = lines.join("\n");
        let out = reducer().reduce("run_shell", &raw);
        assert!(out.contains("compiling crate number 0"));
        assert!(out.contains("FAILED. 3 passed; 2 failed"));
        assert!(out.contains("lines elided"));
    }

    #[test]
    fn unknown_tool_uses_command_strategy() {
        let raw = (0..100)
            .map(|i| format!("some free-form output line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let out = reducer().reduce("never_registered", &raw);
        assert!(out.len() < raw.len());
        assert!(out.contains("lines elided"));
    }

    #[test]
    fn kind_map_is_extensible() {
        let kinds = KindMap::new().classify("my_lister", OutputKind::Enumeration);
        let reducer = OutputReducer::new().with_kinds(kinds);
        let raw = (0..100).map(|i| format!("entry {i}")).collect::<Vec<_>>().join("\n");
        let out = reducer.reduce("my_lister", &raw);
        assert!(out.contains("100 entries"));
    }
}
