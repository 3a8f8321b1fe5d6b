//! Closed error kinds, shared by every component.
//!
//! Grounded on `av1an-core::broker::EncoderCrash`'s `thiserror` style: one
//! enum, one `#[error(...)]` message per variant, enough context embedded to
//! make the message useful without a backtrace.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// All error kinds a caller of this crate can match on. See spec §7.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Validation, range, missing template, or missing required key. Always
    /// raised before any work is scheduled; fatal to the whole batch.
    #[error("config error: {0}")]
    Config(String),

    /// A file, directory, or external tool could not be located.
    #[error("not found: {0}")]
    NotFound(String),

    /// A numeric or enum value fell outside its allowed set.
    #[error("range error: value {value} not in allowed range {allowed}")]
    Range { value: String, allowed: String },

    /// Non-fatal warning from an external tool (e.g. mkvmerge exit 1).
    /// Logged by the caller; the pipeline continues.
    #[error("tool warning ({tool}): {message}")]
    ToolWarn { tool: String, message: String },

    /// An external tool returned an unexpected non-zero exit.
    #[error("tool failure ({tool}, exit {exit_status}): {stderr_tail}")]
    ToolFail {
        tool: String,
        exit_status: ExitStatus,
        stderr_tail: String,
    },

    /// Post-encode frame count did not match the source frame count beyond
    /// tolerance (a difference of 1 or 2 frames is a warning, not this).
    #[error("integrity error: expected {expected} frames, got {actual}")]
    Integrity { expected: usize, actual: usize },

    #[error("missing template placeholder: {0}")]
    MissingTemplate(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OrchestratorError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn range(value: impl std::fmt::Display, allowed: impl Into<String>) -> Self {
        Self::Range {
            value: value.to_string(),
            allowed: allowed.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
