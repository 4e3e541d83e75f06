//! Typed control signals that drive continue/skip/abort decisions between
//! dependent checks.

use anyhow::Error as AnyError;
use std::borrow::Cow;
use std::fmt;

/// Identifier of a bypass scope. Codes are chosen by the caller and matched
/// structurally; the engine never stores them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BypassCode(Cow<'static, str>);

impl BypassCode {
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for BypassCode {
    fn from(code: &'static str) -> Self {
        Self(Cow::Borrowed(code))
    }
}

impl From<String> for BypassCode {
    fn from(code: String) -> Self {
        Self(Cow::Owned(code))
    }
}

impl From<u64> for BypassCode {
    fn from(code: u64) -> Self {
        Self(Cow::Owned(code.to_string()))
    }
}

impl fmt::Display for BypassCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An expectation that was not met. Callers may absorb it or bypass on it.
#[derive(Debug)]
pub struct AssertionFailure {
    message: String,
    source: Option<AnyError>,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the error that explains why the expectation failed, e.g. the
    /// remote command error behind a "service is active" check.
    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&AnyError> {
        self.source.as_ref()
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for AssertionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.source {
            Some(source) => Some(source.as_ref()),
            None => None,
        }
    }
}

/// Tag of a [`ControlSignal`], used in logs and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Assertion,
    Bypass,
    Fatal,
}

/// Failure value carried through the `Err` side of every check and chain step.
///
/// Handlers match on the variant; nothing inspects dynamic error types to
/// decide whether a failure may be skipped.
#[derive(Debug)]
pub enum ControlSignal {
    Assertion(AssertionFailure),
    Bypass(BypassCode),
    Fatal(AnyError),
}

impl ControlSignal {
    pub fn assertion(message: impl Into<String>) -> Self {
        ControlSignal::Assertion(AssertionFailure::new(message))
    }

    pub fn fatal(error: impl Into<AnyError>) -> Self {
        ControlSignal::Fatal(error.into())
    }

    pub fn kind(&self) -> SignalKind {
        match self {
            ControlSignal::Assertion(_) => SignalKind::Assertion,
            ControlSignal::Bypass(_) => SignalKind::Bypass,
            ControlSignal::Fatal(_) => SignalKind::Fatal,
        }
    }

    pub fn is_assertion(&self) -> bool {
        matches!(self, ControlSignal::Assertion(_))
    }

    /// Returns true only for a bypass carrying exactly `code`.
    pub fn is_bypass_for(&self, code: &BypassCode) -> bool {
        matches!(self, ControlSignal::Bypass(active) if active == code)
    }

    /// Message followed by every cause in the derivation chain, one per line.
    pub fn trace_lines(&self) -> Vec<String> {
        match self {
            ControlSignal::Assertion(failure) => {
                let mut lines = vec![format!("assertion failed: {}", failure.message)];
                if let Some(source) = &failure.source {
                    lines.extend(source.chain().map(|cause| format!("caused by: {cause}")));
                }
                lines
            }
            ControlSignal::Bypass(code) => vec![format!("unresolved bypass `{code}`")],
            ControlSignal::Fatal(error) => {
                let mut causes = error.chain();
                let mut lines = Vec::new();
                if let Some(head) = causes.next() {
                    lines.push(format!("fatal: {head}"));
                }
                lines.extend(causes.map(|cause| format!("caused by: {cause}")));
                lines
            }
        }
    }
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlSignal::Assertion(failure) => write!(f, "assertion failed: {failure}"),
            ControlSignal::Bypass(code) => write!(f, "bypass `{code}` in effect"),
            ControlSignal::Fatal(error) => write!(f, "fatal: {error}"),
        }
    }
}

impl std::error::Error for ControlSignal {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ControlSignal::Assertion(failure) => Some(failure),
            ControlSignal::Bypass(_) => None,
            ControlSignal::Fatal(error) => Some(error.as_ref()),
        }
    }
}

impl From<AssertionFailure> for ControlSignal {
    fn from(failure: AssertionFailure) -> Self {
        ControlSignal::Assertion(failure)
    }
}

/// Infrastructure errors surfaced with `?` are always fatal.
impl From<AnyError> for ControlSignal {
    fn from(error: AnyError) -> Self {
        ControlSignal::Fatal(error)
    }
}

/// Returns early from a check body with an [`AssertionFailure`] when the
/// condition does not hold.
///
/// ```
/// use chaincheck::{ensure_check, ControlSignal};
///
/// fn disk_has_room(free_mb: u64) -> Result<(), ControlSignal> {
///     ensure_check!(free_mb >= 512, "only {free_mb} MB free");
///     Ok(())
/// }
///
/// assert!(disk_has_room(1024).is_ok());
/// assert!(disk_has_room(12).unwrap_err().is_assertion());
/// ```
#[macro_export]
macro_rules! ensure_check {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return ::core::result::Result::Err($crate::ControlSignal::assertion(format!($($arg)+)));
        }
    };
}
