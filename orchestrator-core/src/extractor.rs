//! TrackExtractor (C4): demux a single track to a file (spec §4.4).
//!
//! Grounded on `av1an-core::split::segment` (spawn an external tool, assert
//! or classify exit) and `av1an-core::concat::sort_files_by_filename`-style
//! file bookkeeping. Matroska vs. generic extractor selection is a `match`
//! on [`crate::state::enums::ContainerKind`], not a class hierarchy, per
//! the Redesign Flags in spec §9.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::state::enums::{ChapterFormat, ContainerKind};
use crate::tool_invoker::{self, ExitPolicy};

/// Maps a codec short name to the track-file extension used on disk
/// (spec §4.4).
pub fn extension_for_codec(codec: &str) -> &'static str {
    match codec.to_ascii_lowercase().as_str() {
        "hevc" => "265",
        "avc" => "264",
        "mpeg-4 visual" => "263",
        "mpeg video" => "mpeg",
        "pgs" => "sup",
        "vobsub" => "idx",
        "utf-8" => "srt",
        "mpeg audio layer 3" => "mp3",
        "layer 2" => "mp2",
        "e-ac-3" => "ec3",
        "ac-3" => "ac3",
        "pcm" => "wav",
        "mlp fba" => "thd",
        "wma" => "wma",
        _ => "bin",
    }
}

struct Tools<'a> {
    matroska_extractor: &'a Path,
    generic_extractor: &'a Path,
}

fn extractor_for(container: ContainerKind, tools: &Tools<'_>) -> (PathBuf, bool) {
    if container.is_matroska() {
        (tools.matroska_extractor.to_path_buf(), true)
    } else {
        (tools.generic_extractor.to_path_buf(), false)
    }
}

/// `mkvextract tracks <container> <id>:<output>`. Exit 1 is
/// success-with-warnings (spec §4.4).
pub fn extract_video(
    matroska_extractor: &Path,
    generic_extractor: &Path,
    container: ContainerKind,
    container_path: &Path,
    track_id: i64,
    output_path: &Path,
) -> Result<()> {
    extract_single_track(matroska_extractor, generic_extractor, container, container_path, track_id, output_path, "video")
}

pub fn extract_subtitles(
    matroska_extractor: &Path,
    generic_extractor: &Path,
    container: ContainerKind,
    container_path: &Path,
    track_id: i64,
    output_path: &Path,
) -> Result<()> {
    extract_single_track(matroska_extractor, generic_extractor, container, container_path, track_id, output_path, "subtitle")
}

pub fn extract_audio(
    matroska_extractor: &Path,
    generic_extractor: &Path,
    container: ContainerKind,
    container_path: &Path,
    track_id: i64,
    output_path: &Path,
) -> Result<()> {
    extract_single_track(matroska_extractor, generic_extractor, container, container_path, track_id, output_path, "audio")
}

fn extract_single_track(
    matroska_extractor: &Path,
    generic_extractor: &Path,
    container: ContainerKind,
    container_path: &Path,
    track_id: i64,
    output_path: &Path,
    kind_label: &str,
) -> Result<()> {
    let tools = Tools {
        matroska_extractor,
        generic_extractor,
    };
    let (tool, is_matroska) = extractor_for(container, &tools);

    let argv: Vec<String> = if is_matroska {
        vec![
            tool.to_string_lossy().into_owned(),
            "tracks".to_owned(),
            container_path.to_string_lossy().into_owned(),
            format!("{track_id}:{}", output_path.display()),
        ]
    } else {
        vec![
            tool.to_string_lossy().into_owned(),
            container_path.to_string_lossy().into_owned(),
            "-o".to_owned(),
            output_path.to_string_lossy().into_owned(),
        ]
    };

    let policy = ExitPolicy {
        warn_on_code_1: is_matroska,
    };
    let info = tool_invoker::run(&argv, &[], None, None, policy, vec![], vec![])?;
    tool_invoker::require_ok(&format!("extract_{kind_label}"), info)
}

/// Extracts video timecodes v2 (MKV only). The tool's output header
/// `"timestamp format"` is normalized to `"timecode format"` as spec §4.4
/// requires.
pub fn extract_video_timecodes(
    matroska_extractor: &Path,
    container_path: &Path,
    track_id: i64,
    output_path: &Path,
) -> Result<()> {
    let argv = vec![
        matroska_extractor.to_string_lossy().into_owned(),
        "timestamps_v2".to_owned(),
        container_path.to_string_lossy().into_owned(),
        format!("{track_id}:{}", output_path.display()),
    ];
    let info = tool_invoker::run(&argv, &[], None, None, ExitPolicy { warn_on_code_1: true }, vec![], vec![])?;
    tool_invoker::require_ok("extract_video_timecodes", info)?;

    let contents = std::fs::read_to_string(output_path).map_err(|e| crate::error::OrchestratorError::Io {
        path: output_path.to_path_buf(),
        source: e,
    })?;
    let normalized = contents.replacen("timestamp format", "timecode format", 1);
    std::fs::write(output_path, normalized).map_err(|e| crate::error::OrchestratorError::Io {
        path: output_path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// `mkvextract chapters <container> [--simple [--simple-language=X]]`,
/// format selected by `format` (spec §4.4). `mkvextract` always writes
/// chapters to stdout; we capture it here and write `output_path`
/// ourselves, since the tool has no destination argument of its own.
pub fn extract_chapters(
    matroska_extractor: &Path,
    container_path: &Path,
    format: ChapterFormat,
    language: &str,
    output_path: &Path,
) -> Result<Option<()>> {
    let language = if language.is_empty() { "eng" } else { language };
    let mut argv = vec![
        matroska_extractor.to_string_lossy().into_owned(),
        "chapters".to_owned(),
        container_path.to_string_lossy().into_owned(),
    ];
    match format {
        ChapterFormat::Matroska => {}
        ChapterFormat::Ogm | ChapterFormat::Simple | ChapterFormat::Pot | ChapterFormat::Tab => {
            // mkvextract only natively emits matroska-XML or its own simple
            // format; OGM/POT/tab are simple-format variants the caller's
            // downstream conversion step reshapes further.
            argv.push("--simple".to_owned());
            argv.push(format!("--simple-language={language}"));
        }
    }

    let stdout_buf = std::cell::RefCell::new(String::new());
    let info = tool_invoker::run(
        &argv,
        &[],
        None,
        None,
        ExitPolicy { warn_on_code_1: true },
        vec![Box::new(|line: &str| {
            let mut buf = stdout_buf.borrow_mut();
            buf.push_str(line);
            buf.push('\n');
        })],
        vec![],
    )?;
    tool_invoker::require_ok("extract_chapters", info)?;

    let contents = stdout_buf.into_inner();
    if contents.trim().is_empty() {
        return Ok(None);
    }
    std::fs::write(output_path, contents).map_err(|e| crate::error::OrchestratorError::Io {
        path: output_path.to_path_buf(),
        source: e,
    })?;
    Ok(Some(()))
}

/// `mkvextract attachments <container> <n:path>...`.
pub fn extract_attachments(
    matroska_extractor: &Path,
    container_path: &Path,
    targets: &[(u32, PathBuf)],
) -> Result<()> {
    let mut argv = vec![
        matroska_extractor.to_string_lossy().into_owned(),
        "attachments".to_owned(),
        container_path.to_string_lossy().into_owned(),
    ];
    for (n, path) in targets {
        argv.push(format!("{n}:{}", path.display()));
    }
    let info = tool_invoker::run(&argv, &[], None, None, ExitPolicy { warn_on_code_1: true }, vec![], vec![])?;
    tool_invoker::require_ok("extract_attachments", info)
}
