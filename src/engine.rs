//! Sequential check execution, indented reporting, and the bypass protocol
//! that lets a failed check skip the checks depending on it.

pub mod bypass;
pub mod chain;
pub mod executor;
pub mod report;
pub mod signal;
