//! Core transcoding pipeline engine.
//!
//! This crate never touches the logging backend: it only calls
//! [`log::debug!`]/[`log::info!`]/[`log::warn!`]/[`log::error!`]. The binary
//! crate is responsible for installing a logger exactly once.

pub mod audio;
pub mod error;
pub mod extractor;
pub mod mission_planner;
pub mod muxer;
pub mod probe;
pub mod progress;
pub mod segmented_encoder;
pub mod state;
pub mod template;
pub mod title_pipeline;
pub mod tool_invoker;
pub mod video_encoder;

pub use error::OrchestratorError;

use std::path::Path;

use sha2::{Digest, Sha256};

/// Build a `Vec<String>` from a mix of `&str` and `String` arguments, the way
/// argv vectors are assembled throughout this crate.
#[macro_export]
macro_rules! into_vec {
    ($($x:expr),* $(,)?) => {
        vec![$($x.to_string()),*]
    };
}

/// Create a directory (and parents) if it does not already exist.
pub fn create_dir(path: impl AsRef<Path>) -> std::io::Result<()> {
    let path = path.as_ref();
    if !path.is_dir() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Deterministic short hash of a path, used to derive per-title and
/// per-shard cache directory names.
pub fn hash_path(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}
