//! Error taxonomy surfaced to the host.
//!
//! Every failure the host can observe is an [`InterpreterError`]. Internally the
//! evaluator distinguishes catchable failures (become a `Throw` completion,
//! see `evaluator::Completion`) from failures that must escape straight to the
//! host (parse errors, validation rejection, resource exhaustion, cancellation).
//! The distinction lives in `evaluator::throws_in_sandbox`, not in this module —
//! this module only describes *what* went wrong and *where*.

use std::fmt;

/// Source location attached to an error when the AST carries position info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeLoc {
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl CodeLoc {
    pub const UNKNOWN: Self = Self { line: None, column: None };

    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line: Some(line), column: Some(column) }
    }
}

impl fmt::Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(l), Some(c)) => write!(f, "{l}:{c}"),
            (Some(l), None) => write!(f, "{l}"),
            _ => f.write_str("<unknown>"),
        }
    }
}

/// Malformed source rejected before evaluation even starts.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub loc: CodeLoc,
}

/// Read or write of an undeclared binding.
#[derive(Debug, Clone)]
pub struct ReferenceError {
    pub message: String,
    pub loc: CodeLoc,
}

/// Non-callable call, invalid index, non-iterable spread, const reassignment,
/// non-object destructuring.
#[derive(Debug, Clone)]
pub struct TypeError {
    pub message: String,
    pub loc: CodeLoc,
}

/// A construct the parser accepted but the evaluator rejects (`await` in sync
/// mode, `yield` outside a generator, an unknown private name).
#[derive(Debug, Clone)]
pub struct SyntaxError {
    pub message: String,
    pub loc: CodeLoc,
}

/// Forbidden property name, host mutation attempt, or other security-boundary
/// violation (see `security.rs`).
#[derive(Debug, Clone)]
pub struct SecurityError {
    pub message: String,
    pub loc: CodeLoc,
}

/// A host function or constructor threw while the sandbox called it.
#[derive(Debug, Clone)]
pub struct HostCallError {
    /// The message actually shown to the sandbox/host caller. Redacted unless
    /// `SecurityOptions::hide_host_error_messages` is `false`.
    pub message: String,
    pub loc: CodeLoc,
}

/// The configured validator predicate returned `false` for the parsed program.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

/// An `async function` was invoked from the synchronous `evaluate` entry point.
#[derive(Debug, Clone)]
pub struct AsyncInSyncError {
    pub message: String,
    pub loc: CodeLoc,
}

/// Execution was aborted by an external cancel signal or `timeoutMs`.
#[derive(Debug, Clone)]
pub struct CancelledError {
    pub message: String,
}

/// The cumulative resource tracker reported one of its limits exhausted.
#[derive(Debug, Clone)]
pub struct ResourceExhaustedError {
    pub message: String,
}

/// A sandbox `throw` (or an internal catchable error with no surviving
/// `try`/`catch` to intercept it) that escaped the program's top
/// statement. The payload is opaque here — `error.rs` does not depend on
/// `value.rs`'s concrete `Value` type to avoid a needless coupling for
/// everything that never throws, so the façade downcasts it back via
/// `evaluator::uncaught_value`.
#[derive(Debug, Clone)]
pub struct UncaughtThrow {
    pub display: String,
    pub loc: CodeLoc,
}

/// The single error type returned across the public API.
///
/// Each variant wraps a payload struct rather than inlining fields, so host
/// code can match on `InterpreterError::Type(TypeError { message, loc })`
/// without the enum itself growing a long flat field list per kind.
#[derive(Debug, Clone)]
pub enum InterpreterError {
    Parse(ParseError),
    Reference(ReferenceError),
    Type(TypeError),
    Syntax(SyntaxError),
    Security(SecurityError),
    HostCall(HostCallError),
    Validation(ValidationError),
    AsyncInSync(AsyncInSyncError),
    Cancelled(CancelledError),
    ResourceExhausted(ResourceExhaustedError),
    Thrown(UncaughtThrow),
}

impl InterpreterError {
    #[must_use]
    pub fn reference(message: impl Into<String>, loc: CodeLoc) -> Self {
        Self::Reference(ReferenceError { message: message.into(), loc })
    }

    #[must_use]
    pub fn type_error(message: impl Into<String>, loc: CodeLoc) -> Self {
        Self::Type(TypeError { message: message.into(), loc })
    }

    #[must_use]
    pub fn syntax(message: impl Into<String>, loc: CodeLoc) -> Self {
        Self::Syntax(SyntaxError { message: message.into(), loc })
    }

    #[must_use]
    pub fn security(message: impl Into<String>, loc: CodeLoc) -> Self {
        Self::Security(SecurityError { message: message.into(), loc })
    }

    /// The `loc` carried by this error, if any (`Validation`/`Cancelled`/
    /// `ResourceExhausted` never carry one — they are not AST-anchored).
    #[must_use]
    pub fn loc(&self) -> Option<CodeLoc> {
        match self {
            Self::Parse(e) => Some(e.loc),
            Self::Reference(e) => Some(e.loc),
            Self::Type(e) => Some(e.loc),
            Self::Syntax(e) => Some(e.loc),
            Self::Security(e) => Some(e.loc),
            Self::HostCall(e) => Some(e.loc),
            Self::AsyncInSync(e) => Some(e.loc),
            Self::Thrown(e) => Some(e.loc),
            Self::Validation(_) | Self::Cancelled(_) | Self::ResourceExhausted(_) => None,
        }
    }

    /// Short kind tag, mainly useful for test assertions and for sandbox-side
    /// `error.name`-style reporting.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Parse(_) => "ParseError",
            Self::Reference(_) => "ReferenceError",
            Self::Type(_) => "TypeError",
            Self::Syntax(_) => "SyntaxError",
            Self::Security(_) => "SecurityError",
            Self::HostCall(_) => "HostCallError",
            Self::Validation(_) => "ValidationError",
            Self::AsyncInSync(_) => "AsyncInSyncError",
            Self::Cancelled(_) => "CancelledError",
            Self::ResourceExhausted(_) => "ResourceExhaustedError",
            Self::Thrown(_) => "Error",
        }
    }

    /// The message text, independent of kind — used when building the
    /// sandbox-visible error object for a caught internal error.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Parse(e) => e.message.clone(),
            Self::Reference(e) => e.message.clone(),
            Self::Type(e) => e.message.clone(),
            Self::Syntax(e) => e.message.clone(),
            Self::Security(e) => e.message.clone(),
            Self::HostCall(e) => e.message.clone(),
            Self::Validation(e) => e.message.clone(),
            Self::AsyncInSync(e) => e.message.clone(),
            Self::Cancelled(e) => e.message.clone(),
            Self::ResourceExhausted(e) => e.message.clone(),
            Self::Thrown(e) => e.display.clone(),
        }
    }

    /// `true` for failures that represent a sandbox-level exception a
    /// `try`/`catch` inside the evaluated program can intercept. `false` for
    /// infrastructure-level failures (malformed source, validator rejection,
    /// resource exhaustion, cancellation, calling an async function
    /// synchronously) that always escape straight to the host, bypassing any
    /// `try`/`catch` the sandbox program wrote.
    #[must_use]
    pub fn is_catchable(&self) -> bool {
        matches!(self, Self::Reference(_) | Self::Type(_) | Self::Syntax(_) | Self::Security(_) | Self::HostCall(_))
    }
}

impl fmt::Display for InterpreterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "ParseError: {} ({})", e.message, e.loc),
            Self::Reference(e) => write!(f, "ReferenceError: {} ({})", e.message, e.loc),
            Self::Type(e) => write!(f, "TypeError: {} ({})", e.message, e.loc),
            Self::Syntax(e) => write!(f, "SyntaxError: {} ({})", e.message, e.loc),
            Self::Security(e) => write!(f, "SecurityError: {} ({})", e.message, e.loc),
            Self::HostCall(e) => write!(f, "HostCallError: {} ({})", e.message, e.loc),
            Self::Validation(e) => write!(f, "ValidationError: {}", e.message),
            Self::AsyncInSync(e) => write!(f, "AsyncInSyncError: {} ({})", e.message, e.loc),
            Self::Cancelled(e) => write!(f, "CancelledError: {}", e.message),
            Self::ResourceExhausted(e) => write!(f, "ResourceExhaustedError: {}", e.message),
            Self::Thrown(e) => write!(f, "Uncaught {} ({})", e.display, e.loc),
        }
    }
}

impl std::error::Error for InterpreterError {}

impl From<ParseError> for InterpreterError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}
