//! The rooted error hierarchy shared by every runtime component.
//!
//! Each [`ErrorKind`] signals a distinct recovery policy; callers match on
//! the kind, never on message text. The orchestrator is the only component
//! that maps kinds to a handling scope (skip item, abort rule, abort run) -
//! primitives construct errors and propagate them without logging.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Structured key/value context attached to an error for observability.
///
/// Ordered so that log output and test assertions are deterministic.
pub type ErrorContext = BTreeMap<String, String>;

/// How far an error reaches when the orchestrator handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Skip the current item, continue the rule.
    Item,
    /// Abort the current rule, continue with the next rule.
    Rule,
    /// Abort the whole run.
    Run,
}

/// Discriminant for [`Error`]. One variant per recovery policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Config file missing, malformed, fails validation, or contains a
    /// disallowed reference. Fatal at load.
    Config,
    /// Credential absent, expired, or refused.
    Auth,
    /// Server-issued throttling that survived the retry budget.
    RateLimit { retry_after: Option<Duration> },
    /// Connection or transport failure after all retries.
    Network,
    /// Malformed payload or unrenderable content. The item is skipped.
    Content,
    /// State store unreachable, locked too long, or integrity check failed.
    /// Fatal: the runtime refuses to risk corrupting the store.
    State,
    /// A security invariant was violated. Always fatal at detection.
    Security(SecurityKind),
}

/// The security family of [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityKind {
    Ssrf,
    PathTraversal,
    InputValidation,
    Injection,
}

impl ErrorKind {
    /// Stable identifier used in CLI error reporting and logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Auth => "auth",
            Self::RateLimit { .. } => "rate_limit",
            Self::Network => "network",
            Self::Content => "content",
            Self::State => "state",
            Self::Security(SecurityKind::Ssrf) => "ssrf",
            Self::Security(SecurityKind::PathTraversal) => "path_traversal",
            Self::Security(SecurityKind::InputValidation) => "input_validation",
            Self::Security(SecurityKind::Injection) => "injection",
        }
    }
}

/// An error from any runtime component.
///
/// Shape: a kind (the recovery policy), a human-readable message, and an
/// ordered context map. Built through the per-kind constructors plus
/// [`with_context`](Error::with_context).
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    context: ErrorContext,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for Error {}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn rate_limit(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::new(ErrorKind::RateLimit { retry_after }, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn content(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Content, message)
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::State, message)
    }

    pub fn security(kind: SecurityKind, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Security(kind), message)
    }

    pub fn ssrf(message: impl Into<String>) -> Self {
        Self::security(SecurityKind::Ssrf, message)
    }

    pub fn path_traversal(message: impl Into<String>) -> Self {
        Self::security(SecurityKind::PathTraversal, message)
    }

    pub fn input_validation(message: impl Into<String>) -> Self {
        Self::security(SecurityKind::InputValidation, message)
    }

    pub fn injection(message: impl Into<String>) -> Self {
        Self::security(SecurityKind::Injection, message)
    }

    /// Attach a context entry. Later writes to the same key win.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Stable identifier for logs and exit reporting.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// The handling scope from the orchestrator's failure policy matrix.
    #[must_use]
    pub fn scope(&self) -> Scope {
        match self.kind {
            ErrorKind::Network | ErrorKind::Content => Scope::Item,
            ErrorKind::RateLimit { .. } => Scope::Rule,
            ErrorKind::Config | ErrorKind::Auth | ErrorKind::State | ErrorKind::Security(_) => {
                Scope::Run
            }
        }
    }

    /// A short remediation hint for the CLI's fatal-error report.
    #[must_use]
    pub fn remediation(&self) -> &'static str {
        match self.kind {
            ErrorKind::Config => "check the config file against the documented schema",
            ErrorKind::Auth => "refresh or re-provision the source credentials",
            ErrorKind::RateLimit { .. } => "lower rate_limit_seconds or retry later",
            ErrorKind::Network => "check connectivity and retry",
            ErrorKind::Content => "inspect the offending item; it was skipped",
            ErrorKind::State => "inspect the state file; do not delete it unless corrupt",
            ErrorKind::Security(_) => "review the rejected input; this is never retried",
        }
    }
}
