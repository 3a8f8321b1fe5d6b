//! Exit-code mapping (spec §6): `0` ok, `2` config/validation error, `3`
//! tool not found, `4` encode/mux failure surviving retries.
//!
//! Grounded on `av1an-cli::run`'s `anyhow::Result<()>` return convention,
//! generalized with an explicit classification step since this spec's
//! error surface (`OrchestratorError`) is closed where the teacher's is
//! `anyhow::Error`.

use orchestrator_core::OrchestratorError;

pub const EXIT_OK: i32 = 0;
pub const EXIT_CONFIG: i32 = 2;
pub const EXIT_TOOL_NOT_FOUND: i32 = 3;
pub const EXIT_ENCODE_FAILURE: i32 = 4;

pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<OrchestratorError>() {
        Some(OrchestratorError::Config(_) | OrchestratorError::Range { .. } | OrchestratorError::MissingTemplate(_)) => {
            EXIT_CONFIG
        }
        Some(OrchestratorError::NotFound(_)) => EXIT_TOOL_NOT_FOUND,
        Some(OrchestratorError::ToolFail { .. } | OrchestratorError::Integrity { .. }) => EXIT_ENCODE_FAILURE,
        Some(OrchestratorError::ToolWarn { .. } | OrchestratorError::Io { .. }) | None => EXIT_ENCODE_FAILURE,
    }
}
