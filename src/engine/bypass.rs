//! Narrow handlers that decide what happens to a failed check.
//!
//! Each handler resolves exactly the signal it claims and hands every other
//! signal back untouched. Handlers never touch telemetry; the counters are
//! kept by [`Chain`](crate::engine::chain::Chain), which runs them.

use crate::engine::executor::Engine;
use crate::engine::signal::{AssertionFailure, BypassCode, ControlSignal};

/// Continues past an assertion failure. Bypasses and fatal failures are
/// returned unchanged.
pub fn allow_assertion(signal: ControlSignal) -> Result<(), ControlSignal> {
    match signal {
        ControlSignal::Assertion(failure) => {
            tracing::debug!(failure = %failure, "assertion failure allowed");
            Ok(())
        }
        other => Err(other),
    }
}

/// Same as [`allow_assertion`], but lets the caller report the swallowed
/// failure. `report` runs one indentation level deeper than the caller.
pub fn allow_assertion_with<F>(
    engine: &Engine,
    signal: ControlSignal,
    report: F,
) -> Result<(), ControlSignal>
where
    F: FnOnce(&Engine, &AssertionFailure),
{
    match signal {
        ControlSignal::Assertion(failure) => {
            let _nested = engine.nested();
            report(engine, &failure);
            Ok(())
        }
        other => Err(other),
    }
}

/// Returns a handler that turns an assertion failure into a bypass carrying
/// `code`. The handler never resolves anything: its result is always `Err`.
///
/// Fatal failures and bypasses that are already in flight are handed back as
/// they are, so infrastructure errors can never be masked as a skip.
pub fn start_bypass(
    code: impl Into<BypassCode>,
) -> impl FnOnce(ControlSignal) -> Result<(), ControlSignal> {
    let code = code.into();
    move |signal| match signal {
        ControlSignal::Assertion(failure) => {
            tracing::debug!(code = %code, failure = %failure, "bypass opened");
            Err(ControlSignal::Bypass(code))
        }
        other => {
            tracing::warn!(
                code = %code,
                kind = ?other.kind(),
                signal = %other,
                "refusing to open bypass for a non-assertion signal"
            );
            Err(other)
        }
    }
}

/// Returns a handler that resolves only a bypass carrying exactly `code`.
pub fn resume_bypass(
    code: impl Into<BypassCode>,
) -> impl FnOnce(ControlSignal) -> Result<(), ControlSignal> {
    let code = code.into();
    move |signal| {
        if signal.is_bypass_for(&code) {
            tracing::debug!(code = %code, "bypass resumed");
            Ok(())
        } else {
            Err(signal)
        }
    }
}
