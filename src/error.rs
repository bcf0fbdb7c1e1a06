//! Error kinds, diagnostics, and the status-accumulation helpers used to
//! merge failures across function-group candidates and module elements
//! (spec §7, §6 "Error-payload format").
//!
//! Grounded on `nudl/status/status.h` (the closed set of status kinds and
//! the `StatusWriter` accumulator) and on `nudl/analysis/errors.h`
//! (`CodeContext`/`ErrorInfo`).

use std::fmt;

use crate::name::ScopedName;

/// The closed set of error kinds from spec §7.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    FailedPrecondition,
    Unimplemented,
    /// Not one of spec §7's listed kinds by itself, but required by §4.5
    /// "Group signature selection": "If multiple candidates remain, an
    /// ambiguity error is returned separately" from the joined not-found
    /// status. Modeled as its own kind so callers can distinguish "no
    /// overload matches" from "more than one overload matches".
    Ambiguous,
    /// A rule-check whose falsity would indicate a bug in the analyzer
    /// itself (spec §7 "invariant violation").
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::FailedPrecondition => "failed precondition",
            ErrorKind::Unimplemented => "unimplemented",
            ErrorKind::Ambiguous => "ambiguous",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Position information carried alongside a diagnostic message, mirroring
/// `pb::CodeInterval`.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CodeInterval {
    pub begin_line: u32,
    pub begin_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// A single diagnostic: a located message plus the source snippet it
/// refers to, matching the `ErrorInfo` shape in spec §6.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ErrorInfo {
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub snippet: String,
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

/// The code-position context an expression or AST element carries, used
/// to stamp diagnostics as they're raised. Analogous to
/// `nudl::analysis::CodeContext`.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct CodeContext {
    pub interval: Option<CodeInterval>,
    pub snippet: Option<String>,
}

impl CodeContext {
    pub fn to_error_info(&self, message: impl Into<String>) -> ErrorInfo {
        let interval = self.interval.clone().unwrap_or_default();
        ErrorInfo {
            line: interval.begin_line,
            column: interval.begin_column,
            message: message.into(),
            snippet: self.snippet.clone().unwrap_or_default(),
        }
    }
}

/// A single analysis failure: a kind plus one or more located diagnostics.
/// Multiple `AnalysisError`s accumulate into a [`Status`], matching the
/// §6 "a single status may carry multiple errors" requirement.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AnalysisError {
    pub kind: ErrorKind,
    pub errors: Vec<ErrorInfo>,
    /// File this diagnostic was raised against, if known (§6 file url).
    pub file: Option<String>,
}

impl AnalysisError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            errors: vec![ErrorInfo {
                line: 0,
                column: 0,
                message: message.into(),
                snippet: String::new(),
            }],
            file: None,
        }
    }

    pub fn at(kind: ErrorKind, context: &CodeContext, message: impl Into<String>) -> Self {
        Self {
            kind,
            errors: vec![context.to_error_info(message)],
            file: None,
        }
    }

    pub fn not_found(name: &ScopedName, alternatives: &[ScopedName]) -> Self {
        let message = if alternatives.is_empty() {
            format!("name `{name}` not found")
        } else {
            let alts = alternatives
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            format!("name `{name}` not found; did you mean one of: {alts}?")
        };
        Self::new(ErrorKind::NotFound, message)
    }

    /// A precondition violation that should never happen in correct
    /// analyzer code; tags the message with the fixed "bug notice" suffix
    /// required by spec §7.
    pub fn bug(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::FailedPrecondition,
            format!(
                "{} (this indicates a bug in the analyzer, not in the analyzed program)",
                message.into()
            ),
        )
    }

    /// Merges another error's diagnostics into this one (§4.7's
    /// error-merging across top-level module elements, and §4.5's joining
    /// of failed binding attempts across a function group's candidates).
    pub fn merge(mut self, other: AnalysisError) -> Self {
        self.errors.extend(other.errors);
        self
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for (i, error) in self.errors.iter().enumerate() {
            if i == 0 {
                write!(f, ": {error}")?;
            } else {
                write!(f, "; {error}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for AnalysisError {}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Accumulates zero or more [`AnalysisError`]s without short-circuiting,
/// for the "errors from multiple top-level elements are accumulated and
/// merged" rule in spec §4.7 and §7.
#[derive(Debug, Default)]
pub struct StatusBuilder {
    errors: Vec<AnalysisError>,
}

impl StatusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: AnalysisError) {
        self.errors.push(error);
    }

    pub fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.push(error);
                None
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Folds all accumulated errors into a single joined error (the same
    /// error kind as the first, if any failed; errors are merged for the
    /// joined not-found/ambiguity status described in spec §4.5 and §7).
    pub fn into_result(self) -> Result<()> {
        let mut iter = self.errors.into_iter();
        let Some(first) = iter.next() else {
            return Ok(());
        };
        Err(iter.fold(first, AnalysisError::merge))
    }
}
