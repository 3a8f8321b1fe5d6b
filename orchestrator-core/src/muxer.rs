//! Muxer (C5): assemble an output container from a track-file list
//! (spec §4.5).
//!
//! Grounded on `av1an-core::concat::ConcatMethod` (a closed `strum` enum
//! selecting a backend) generalized from "concat method" to "container
//! kind".

use std::path::{Path, PathBuf};

use crate::error::{OrchestratorError, Result};
use crate::state::enums::PackageFormat;
use crate::tool_invoker::{self, ExitPolicy};

#[derive(Debug, Clone)]
pub struct MuxTrackInput {
    pub path: PathBuf,
    /// Sentinel `-1` means "all default tracks of this file"; `< -1` is an
    /// error (spec §4.5).
    pub track_id: i64,
    pub track_type: Option<String>,
    pub delay_ms: i64,
    pub track_name: String,
    pub language: String,
    /// Only set (and only passed through `--timestamps`) when the source
    /// is VFR.
    pub timestamp_path: Option<PathBuf>,
}

impl MuxTrackInput {
    pub fn new(path: PathBuf, track_id: i64) -> Self {
        Self {
            path,
            track_id,
            track_type: None,
            delay_ms: 0,
            track_name: String::new(),
            language: String::new(),
            timestamp_path: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.track_id < -1 {
            return Err(OrchestratorError::range(self.track_id, "track_id == -1 or >= 0"));
        }
        Ok(())
    }
}

pub struct MuxRequest<'a> {
    pub tracks: &'a [MuxTrackInput],
    pub output_dir: &'a Path,
    pub name: &'a str,
    pub kind: PackageFormat,
    pub title: Option<&'a str>,
    pub chapters: Option<&'a Path>,
    pub attachments: &'a [PathBuf],
    pub add_valid_mark: bool,
}

const VALID_MARK_SUFFIX: &str = ".done";

/// Assemble the output container described by `request`, returning its
/// final path. MKV uses the Matroska multiplexer's per-track selectors;
/// MP4 uses the MP4 authoring tool's `-add` syntax. Subtitles may not
/// appear in MP4 outputs (spec §4.5).
pub fn mux(tool_path: &Path, request: &MuxRequest<'_>) -> Result<PathBuf> {
    for track in request.tracks {
        track.validate()?;
    }

    let extension = match request.kind {
        PackageFormat::Mkv => "mkv",
        PackageFormat::Mp4 => "mp4",
    };
    let raw_output = request.output_dir.join(format!("{}.{extension}", request.name));

    let argv = match request.kind {
        PackageFormat::Mkv => build_mkv_argv(tool_path, request, &raw_output),
        PackageFormat::Mp4 => build_mp4_argv(tool_path, request, &raw_output),
    };

    let info = tool_invoker::run(&argv, &[], None, None, ExitPolicy { warn_on_code_1: true }, vec![], vec![])?;
    tool_invoker::require_ok("mux", info)?;

    if request.add_valid_mark {
        let marked = raw_output.with_extension(format!("{extension}{VALID_MARK_SUFFIX}"));
        if marked.exists() {
            std::fs::remove_file(&marked).map_err(|e| OrchestratorError::Io {
                path: marked.clone(),
                source: e,
            })?;
        }
        std::fs::rename(&raw_output, &marked).map_err(|e| OrchestratorError::Io {
            path: marked.clone(),
            source: e,
        })?;
        Ok(marked)
    } else {
        Ok(raw_output)
    }
}

fn build_mkv_argv(tool_path: &Path, request: &MuxRequest<'_>, output: &Path) -> Vec<String> {
    let mut argv = vec![tool_path.to_string_lossy().into_owned(), "--output".to_owned(), output.to_string_lossy().into_owned()];

    for track in request.tracks {
        let id = track.track_id;
        match track.track_type.as_deref() {
            Some("audio") => argv.extend(["--audio-tracks".to_owned(), id.to_string()]),
            Some("video") => argv.extend(["--video-tracks".to_owned(), id.to_string()]),
            Some("subtitle") => argv.extend(["--subtitle-tracks".to_owned(), id.to_string()]),
            _ => {}
        }
        if track.delay_ms != 0 {
            argv.extend(["--sync".to_owned(), format!("{id}:{}", track.delay_ms)]);
        }
        if !track.track_name.is_empty() {
            argv.extend(["--track-name".to_owned(), format!("{id}:{}", track.track_name)]);
        }
        if !track.language.is_empty() {
            argv.extend(["--language".to_owned(), format!("{id}:{}", track.language)]);
        }
        if let Some(ts) = &track.timestamp_path {
            argv.extend(["--timestamps".to_owned(), format!("{id}:{}", ts.display())]);
        }
        argv.push(track.path.to_string_lossy().into_owned());
    }

    if let Some(chapters) = request.chapters {
        argv.extend(["--chapters".to_owned(), chapters.to_string_lossy().into_owned()]);
    }
    for attachment in request.attachments {
        argv.extend(["--attach-file".to_owned(), attachment.to_string_lossy().into_owned()]);
    }
    if let Some(title) = request.title {
        argv.extend(["--title".to_owned(), title.to_owned()]);
    }

    argv
}

fn build_mp4_argv(tool_path: &Path, request: &MuxRequest<'_>, output: &Path) -> Vec<String> {
    let mut argv = vec![tool_path.to_string_lossy().into_owned(), "-new".to_owned(), output.to_string_lossy().into_owned()];

    for track in request.tracks {
        let mut spec = format!("{}#trackID={}", track.path.display(), track.track_id);
        if !track.track_name.is_empty() {
            spec.push_str(&format!(":name={}", track.track_name));
        }
        spec.push_str(&format!(":delay={}", track.delay_ms));
        if !track.language.is_empty() {
            spec.push_str(&format!(":lang={}", track.language));
        }
        argv.extend(["-add".to_owned(), spec]);
    }

    if let Some(chapters) = request.chapters {
        argv.extend(["-chap".to_owned(), chapters.to_string_lossy().into_owned()]);
    }

    argv
}
