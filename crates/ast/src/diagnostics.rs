//! The accumulating diagnostic sink.
//!
//! Legality and type errors are recorded here and traversal continues, so a
//! single pass surfaces as many problems as possible. The CFG builder gates
//! on [`Diagnostics::error_count`]: if analysis reported anything, no blocks
//! are produced. Rendering (ariadne with a plain-text fallback) and JSON
//! export are utilities over the sink; the passes themselves only
//! accumulate.

use ariadne::{Label, Report, ReportKind, Source};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::span::Span;

/// The user-facing error kinds this component can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A `goto` target is not declared in any visible scope.
    UndefinedOrOutOfReachLabel,
    /// Unlabeled `break` with no enclosing `while`.
    BreakOutsideLoop,
    /// Labeled `break` whose label matches no enclosing compound statement.
    BreakLabelUndefined,
    /// Labeled `break` whose label names a leading simple command rather
    /// than the compound statement itself.
    BreakTargetInvalid,
    /// A call's actual input or output count disagrees with the callee.
    ArityMismatch,
    /// An asynchronous call with more than one output, or whose single
    /// output is not an async handle.
    AsyncArityOrTypeError,
    /// A `call forall` callee with a non-empty modifies clause.
    ModifiesClauseViolation,
    /// Two left-hand sides of a parallel assignment denote the same
    /// variable.
    DuplicateParallelAssignmentTarget,
    /// A call names a procedure with no registered declaration.
    UnresolvedCallee,
}

impl DiagnosticKind {
    /// Short machine-readable tag, used in the JSON report.
    pub fn tag(self) -> &'static str {
        match self {
            DiagnosticKind::UndefinedOrOutOfReachLabel => "undefined-or-out-of-reach-label",
            DiagnosticKind::BreakOutsideLoop => "break-outside-loop",
            DiagnosticKind::BreakLabelUndefined => "break-label-undefined",
            DiagnosticKind::BreakTargetInvalid => "break-target-invalid",
            DiagnosticKind::ArityMismatch => "arity-mismatch",
            DiagnosticKind::AsyncArityOrTypeError => "async-arity-or-type-error",
            DiagnosticKind::ModifiesClauseViolation => "modifies-clause-violation",
            DiagnosticKind::DuplicateParallelAssignmentTarget => {
                "duplicate-parallel-assignment-target"
            }
            DiagnosticKind::UnresolvedCallee => "unresolved-callee",
        }
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DiagnosticKind::UndefinedOrOutOfReachLabel => "goto label undefined or out of reach",
            DiagnosticKind::BreakOutsideLoop => "break statement is not inside a loop",
            DiagnosticKind::BreakLabelUndefined => "break label is undefined",
            DiagnosticKind::BreakTargetInvalid => {
                "break label must designate an enclosing statement"
            }
            DiagnosticKind::ArityMismatch => "wrong number of arguments in call",
            DiagnosticKind::AsyncArityOrTypeError => "ill-formed asynchronous call",
            DiagnosticKind::ModifiesClauseViolation => {
                "call forall callee must not modify global state"
            }
            DiagnosticKind::DuplicateParallelAssignmentTarget => {
                "variable assigned more than once in parallel assignment"
            }
            DiagnosticKind::UnresolvedCallee => "call to undeclared procedure",
        };
        f.write_str(text)
    }
}

/// One recorded error, tied to a source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub span: Span,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Diagnostic {}

/// The sink itself. One instance is threaded through resolution, analysis,
/// and lowering of a program; the error count is the only signal downstream
/// phases need.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    diags: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, kind: DiagnosticKind, span: Span, message: impl Into<String>) {
        self.diags.push(Diagnostic {
            kind,
            span,
            message: message.into(),
        });
    }

    pub fn error_count(&self) -> usize {
        self.diags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diags.iter()
    }
}

/// Print every recorded diagnostic to stderr. Diagnostics with a real span
/// get an ariadne report against `source`; spanless ones fall back to a
/// colored one-liner.
pub fn render(diags: &Diagnostics, source_name: &str, source: &str) {
    for diag in diags.iter() {
        if diag.span.is_dummy() {
            render_text(diag);
            continue;
        }
        let report = Report::build(ReportKind::Error, source_name, diag.span.lo as usize)
            .with_message(diag.kind.to_string())
            .with_label(
                Label::new((source_name, diag.span.range())).with_message(diag.message.clone()),
            )
            .finish();
        if report
            .eprint((source_name, Source::from(source)))
            .is_err()
        {
            render_text(diag);
        }
    }
}

fn render_text(diag: &Diagnostic) {
    eprintln!(
        "{} {}: {}",
        "error:".red().bold(),
        diag.kind.to_string().bold(),
        diag.message
    );
}

/// Machine-readable diagnostic report, for IDE integration.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonDiagnosticReport {
    pub source: String,
    pub diagnostics: Vec<JsonDiagnostic>,
    pub summary: JsonSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonDiagnostic {
    pub kind: String,
    pub message: String,
    pub span_lo: u32,
    pub span_hi: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonSummary {
    pub error_count: usize,
}

impl JsonDiagnosticReport {
    pub fn from_sink(diags: &Diagnostics, source_name: &str) -> Self {
        Self {
            source: source_name.to_string(),
            diagnostics: diags
                .iter()
                .map(|d| JsonDiagnostic {
                    kind: d.kind.tag().to_string(),
                    message: d.message.clone(),
                    span_lo: d.span.lo,
                    span_hi: d.span.hi,
                })
                .collect(),
            summary: JsonSummary {
                error_count: diags.error_count(),
            },
        }
    }

    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
