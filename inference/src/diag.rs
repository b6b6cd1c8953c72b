// diag.rs — Unified diagnostics model
//
// Shared diagnostic types for graph indexing, propagation and the dynamic
// path. Fatal conditions travel as `InferenceError` (error.rs) and convert
// into a `Diagnostic` for display; non-fatal findings such as legitimate
// indeterminacy are recorded directly as warning-level diagnostics.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0101`, `W0201`).
///
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // E00xx: item loading
    pub const E0001: DiagCode = DiagCode("E0001"); // item file unreadable
    pub const E0002: DiagCode = DiagCode("E0002"); // item/trace JSON invalid

    // E01xx: malformed graph
    pub const E0101: DiagCode = DiagCode("E0101"); // dangling input
    pub const E0102: DiagCode = DiagCode("E0102"); // duplicate node name
    pub const E0103: DiagCode = DiagCode("E0103"); // cycle outside a loop frame
    pub const E0104: DiagCode = DiagCode("E0104"); // frame structure violation
    pub const E0105: DiagCode = DiagCode("E0105"); // fetch/init node missing
    pub const E0106: DiagCode = DiagCode("E0106"); // output slot out of range

    // E02xx: shape rules
    pub const E0201: DiagCode = DiagCode("E0201"); // rule rejected inputs
    pub const E0202: DiagCode = DiagCode("E0202"); // dtype disagreement
    pub const E0203: DiagCode = DiagCode("E0203"); // unregistered op (reject policy)

    // E03xx: dynamic inference
    pub const E0301: DiagCode = DiagCode("E0301"); // cluster not initialized with item
    pub const E0302: DiagCode = DiagCode("E0302"); // cluster execution failed

    // Warnings
    pub const W0101: DiagCode = DiagCode("W0101"); // unregistered op, outputs unknown
    pub const W0201: DiagCode = DiagCode("W0201"); // pass cap reached before convergence
    pub const W0301: DiagCode = DiagCode("W0301"); // node absent from runtime trace
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any phase, attributed to a node when one is
/// responsible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub node: Option<String>,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            node: None,
            message: message.into(),
            hint: None,
        }
    }

    pub fn warning(code: DiagCode, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, message).with_code(code)
    }

    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(node) = &self.node {
            write!(f, "\n  at node '{}'", node)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}
