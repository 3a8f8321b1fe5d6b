//! MediaProbe (C2): parse container metadata into the internal
//! [`crate::state::TrackInfo`] model (spec §4.2).
//!
//! Grounded on `av1an-core::ffmpeg`'s "invoke a tool, parse its output"
//! shape, adapted to parse the probe tool's JSON via `serde_json` (the
//! probe tool is a subprocess per spec §6, not a linked library).

use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::error::{OrchestratorError, Result};
use crate::state::enums::{ColorMatrix, ColorPrimaries, ColorRange, FrameRateMode, Transfer};
use crate::state::rational::Rational;
use crate::state::track::{
    AudioTrack, ChapterEntry, ContainerInfo, Hdr10Metadata, MenuTrack, SubtitleTrack, TrackCommon,
    TrackInfo, VideoTrack,
};
use crate::tool_invoker::{self, ExitPolicy};

/// Raw shape of one track entry as emitted by the probe tool. Fields are
/// deliberately loose (`Option`/`String`) because probe tools disagree on
/// presence and typing; normalization happens in [`normalize_track`].
#[derive(Debug, Deserialize)]
struct RawTrack {
    #[serde(rename = "type")]
    kind: String,
    streamorder: Option<String>,
    codec: Option<String>,
    #[serde(default)]
    duration_ms: Option<i64>,
    #[serde(default)]
    bitrate_bps: Option<i64>,
    #[serde(default)]
    delay_ms: Option<i64>,
    #[serde(default)]
    stream_size_bytes: Option<i64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    default: Option<bool>,
    #[serde(default)]
    forced: Option<bool>,

    // video
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    frame_rate_mode: Option<String>,
    #[serde(default)]
    framerate_num: Option<i64>,
    #[serde(default)]
    framerate_den: Option<i64>,
    #[serde(default)]
    framerate: Option<f64>,
    #[serde(default)]
    original_framerate_num: Option<i64>,
    #[serde(default)]
    original_framerate_den: Option<i64>,
    #[serde(default)]
    frame_count: Option<u64>,
    #[serde(default)]
    color_range: Option<String>,
    #[serde(default)]
    color_matrix: Option<String>,
    #[serde(default)]
    color_primaries: Option<String>,
    #[serde(default)]
    transfer: Option<String>,
    #[serde(default)]
    chroma_subsampling: Option<String>,
    #[serde(default)]
    bit_depth: Option<serde_json::Value>,
    #[serde(default)]
    sar_num: Option<i64>,
    #[serde(default)]
    sar_den: Option<i64>,
    #[serde(default)]
    hdr_format: Option<String>,
    #[serde(default)]
    mastering_display_luminance: Option<String>,
    #[serde(default)]
    mastering_display_primaries: Option<String>,
    #[serde(default)]
    max_cll: Option<i64>,
    #[serde(default)]
    max_fall: Option<i64>,

    // chapters
    #[serde(default)]
    entries: Option<Vec<RawChapterEntry>>,
}

#[derive(Debug, Deserialize)]
struct RawChapterEntry {
    start_time: String,
    end_time: Option<String>,
    title: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProbeOutput {
    tracks: Vec<RawTrack>,
    #[serde(default)]
    attachments: Vec<RawAttachment>,
    #[serde(default)]
    writing_application: String,
}

#[derive(Debug, Deserialize)]
struct RawAttachment {
    file_name: String,
}

/// Invoke the external probe tool on `path` and parse its JSON output into
/// a [`ContainerInfo`].
pub fn probe(tool_path: &Path, path: &Path) -> Result<ContainerInfo> {
    let argv = vec![
        tool_path.to_string_lossy().into_owned(),
        path.to_string_lossy().into_owned(),
    ];
    let handler_buf = std::cell::RefCell::new(String::new());
    let info = tool_invoker::run(
        &argv,
        &[],
        None,
        None,
        ExitPolicy::default(),
        vec![Box::new(|line: &str| {
            handler_buf.borrow_mut().push_str(line);
            handler_buf.borrow_mut().push('\n');
        })],
        vec![],
    )?;
    tool_invoker::require_ok("probe", info)?;
    let stdout_lines = handler_buf.into_inner();

    let raw: RawProbeOutput = serde_json::from_str(&stdout_lines)
        .map_err(|e| OrchestratorError::config(format!("failed to parse probe output: {e}")))?;

    let mut tracks = Vec::with_capacity(raw.tracks.len());
    for raw_track in raw.tracks {
        tracks.push(normalize_track(raw_track)?);
    }

    Ok(ContainerInfo {
        tracks,
        attachment_filenames: raw.attachments.into_iter().map(|a| a.file_name).collect(),
        writing_application: raw.writing_application,
    })
}

/// Extract the track id from a `streamorder` value, which may be `"N"` or
/// `"X-N"`; the track id is the last integer component (spec §4.2).
fn parse_streamorder_track_id(streamorder: &str) -> i64 {
    streamorder
        .rsplit('-')
        .next()
        .unwrap_or(streamorder)
        .trim()
        .parse()
        .unwrap_or(0)
}

/// Derive color_matrix/primaries/transfer by picture size and bit depth
/// when the probe tool didn't report them (spec §4.2).
fn derive_color_tags(width: u32, height: u32, hdr_format_present: bool) -> (ColorMatrix, ColorPrimaries, Transfer) {
    if width <= 1024 && height <= 576 {
        (ColorMatrix::Bt601, ColorPrimaries::Smpte170M, Transfer::Smpte170M)
    } else if width <= 2048 && height <= 1536 {
        (ColorMatrix::Bt709, ColorPrimaries::Bt709, Transfer::Bt709)
    } else if hdr_format_present {
        (ColorMatrix::Bt2020Nc, ColorPrimaries::Bt2020, Transfer::Smpte2084)
    } else {
        (ColorMatrix::Bt2020Nc, ColorPrimaries::Bt2020, Transfer::Bt709)
    }
}

/// Parse a `"min: X cd/m2, max: Y cd/m2"` mastering-display luminance
/// string (spec §4.2).
fn parse_mastering_luminance(s: &str) -> Option<(i64, i64)> {
    let re = Regex::new(r"min:\s*([0-9.]+)\s*cd/m2,\s*max:\s*([0-9.]+)\s*cd/m2").ok()?;
    let caps = re.captures(s)?;
    let min: f64 = caps.get(1)?.as_str().parse().ok()?;
    let max: f64 = caps.get(2)?.as_str().parse().ok()?;
    Some((min.round() as i64, max.round() as i64))
}

/// Parse a `"N cd/m2"` light-level field (spec §4.2).
fn parse_light_level(value: Option<i64>) -> i64 {
    value.unwrap_or(-1)
}

/// Audio `bit_depth` may be an `int` or a `"16"`/`"24-bit"` string in probe
/// output. Non-integer strings resolve to `-1` (Open Question 3, spec §9).
fn parse_audio_bit_depth(value: &Option<serde_json::Value>) -> i64 {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(-1),
        Some(serde_json::Value::String(s)) => s.parse::<i64>().unwrap_or(-1),
        _ => -1,
    }
}

fn normalize_frame_rate(raw: &RawTrack) -> Rational {
    if let (Some(num), Some(den)) = (raw.framerate_num, raw.framerate_den) {
        Rational::new(num, den)
    } else if let Some(f) = raw.framerate {
        // Scalar fallback: approximate to a /1000 rational before fixups.
        Rational::new((f * 1000.0).round() as i64, 1000)
    } else {
        Rational::new(0, 1)
    }
}

fn normalize_track(raw: RawTrack) -> Result<TrackInfo> {
    let track_id = raw
        .streamorder
        .as_deref()
        .map(parse_streamorder_track_id)
        .unwrap_or(0);

    let common = TrackCommon {
        track_id,
        format: raw.codec.clone().unwrap_or_default(),
        duration_ms: raw.duration_ms.unwrap_or(-1),
        bitrate_bps: raw.bitrate_bps.unwrap_or(-1),
        delay_ms: raw.delay_ms.unwrap_or(0),
        stream_size_bytes: raw.stream_size_bytes.unwrap_or(-1),
        title: raw.title.clone().unwrap_or_default(),
        language: raw.language.clone().unwrap_or_default(),
        default: raw.default.unwrap_or(false),
        forced: raw.forced.unwrap_or(false),
    };

    match raw.kind.as_str() {
        "video" => {
            let width = raw.width.unwrap_or(0);
            let height = raw.height.unwrap_or(0);
            let color_range = match raw.color_range.as_deref() {
                Some("full") => ColorRange::Full,
                _ => ColorRange::Limited, // missing => limited (spec §4.2)
            };
            let hdr_format_present = raw.hdr_format.as_deref().map(|s| !s.is_empty()).unwrap_or(false);
            let (default_matrix, default_primaries, default_transfer) =
                derive_color_tags(width, height, hdr_format_present);
            let color_matrix = raw
                .color_matrix
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default_matrix);
            let color_primaries = raw
                .color_primaries
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default_primaries);
            let transfer = raw
                .transfer
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default_transfer);

            let frame_rate = normalize_frame_rate(&raw);
            let original_frame_rate = if let (Some(n), Some(d)) =
                (raw.original_framerate_num, raw.original_framerate_den)
            {
                Rational::new(n, d)
            } else {
                frame_rate
            };

            let sar = match (raw.sar_num, raw.sar_den) {
                (Some(n), Some(d)) if d != 0 => Rational::new(n, d),
                _ => Rational::new(1, 1),
            };

            let hdr10 = if hdr_format_present {
                let (min_mdl, max_mdl) = raw
                    .mastering_display_luminance
                    .as_deref()
                    .and_then(parse_mastering_luminance)
                    .unwrap_or((-1, -1));
                Some(Hdr10Metadata {
                    mdcp: (
                        Rational::new(1, 1),
                        Rational::new(1, 1),
                        Rational::new(1, 1),
                        Rational::new(1, 1),
                    ),
                    min_mdl,
                    max_mdl,
                    max_cll: parse_light_level(raw.max_cll),
                    max_fall: parse_light_level(raw.max_fall),
                })
            } else {
                None
            };

            let bit_depth = match &raw.bit_depth {
                Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(8) as u8,
                _ => 8,
            };

            Ok(TrackInfo::Video(VideoTrack {
                common,
                width,
                height,
                frame_rate_mode: match raw.frame_rate_mode.as_deref() {
                    Some("vfr") => FrameRateMode::Vfr,
                    _ => FrameRateMode::Cfr,
                },
                frame_rate,
                original_frame_rate,
                frame_count: raw.frame_count.unwrap_or(1),
                color_range,
                color_matrix,
                color_primaries,
                transfer,
                chroma_subsampling: raw.chroma_subsampling.unwrap_or_default(),
                bit_depth,
                sample_aspect_ratio: sar,
                hdr10,
            }))
        }
        "audio" => Ok(TrackInfo::Audio(AudioTrack {
            common,
            bit_depth: parse_audio_bit_depth(&raw.bit_depth),
        })),
        "subtitles" | "subtitle" => Ok(TrackInfo::Subtitle(SubtitleTrack { common })),
        "chapters" | "menu" => Ok(TrackInfo::Menu(MenuTrack {
            common,
            entries: raw
                .entries
                .unwrap_or_default()
                .into_iter()
                .map(|e| ChapterEntry {
                    start_time: e.start_time,
                    end_time: e.end_time,
                    title: e.title.unwrap_or_default(),
                    language: e.language,
                })
                .collect(),
        })),
        other => Err(OrchestratorError::config(format!("unknown track kind: {other}"))),
    }
}

/// mkvmerge version string, e.g. `"17.0.0"`.
fn parse_mkvmerge_major_version(writing_application: &str) -> Option<u32> {
    let re = Regex::new(r"mkvmerge v?(\d+)\.").ok()?;
    re.captures(writing_application)?.get(1)?.as_str().parse().ok()
}

/// `is_reliable_metadata` trust policy (spec §4.2): MP4, VOB, M2TS and
/// unknown containers are untrusted. MKV is trusted only if
/// `writing_application` names mkvmerge at version >= 10, or Voukoder.
pub fn is_reliable_metadata(container: crate::state::enums::ContainerKind, writing_application: &str) -> bool {
    use crate::state::enums::ContainerKind;
    if !container.is_matroska() {
        return false;
    }
    if writing_application.contains("Voukoder") {
        return true;
    }
    parse_mkvmerge_major_version(writing_application)
        .map(|v| v >= 10)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::enums::ContainerKind;

    #[test]
    fn streamorder_plain_integer() {
        assert_eq!(parse_streamorder_track_id("2"), 2);
    }

    #[test]
    fn streamorder_prefixed() {
        assert_eq!(parse_streamorder_track_id("1-3"), 3);
    }

    #[test]
    fn derives_sd_color_tags() {
        let (m, p, t) = derive_color_tags(720, 480, false);
        assert_eq!(m, ColorMatrix::Bt601);
        assert_eq!(p, ColorPrimaries::Smpte170M);
        assert_eq!(t, Transfer::Smpte170M);
    }

    #[test]
    fn derives_hd_color_tags() {
        let (m, p, t) = derive_color_tags(1920, 1080, false);
        assert_eq!(m, ColorMatrix::Bt709);
        assert_eq!(p, ColorPrimaries::Bt709);
        assert_eq!(t, Transfer::Bt709);
    }

    #[test]
    fn derives_uhd_hdr_color_tags() {
        let (m, p, t) = derive_color_tags(3840, 2160, true);
        assert_eq!(m, ColorMatrix::Bt2020Nc);
        assert_eq!(p, ColorPrimaries::Bt2020);
        assert_eq!(t, Transfer::Smpte2084);
    }

    #[test]
    fn derives_uhd_sdr_color_tags_with_bt709_transfer() {
        let (_, _, t) = derive_color_tags(3840, 2160, false);
        assert_eq!(t, Transfer::Bt709);
    }

    #[test]
    fn parses_mastering_luminance() {
        assert_eq!(
            parse_mastering_luminance("min: 0.0050 cd/m2, max: 1000 cd/m2"),
            Some((0, 1000))
        );
    }

    #[test]
    fn non_integer_audio_bit_depth_is_unknown() {
        assert_eq!(
            parse_audio_bit_depth(&Some(serde_json::Value::String("24-bit".to_owned()))),
            -1
        );
        assert_eq!(
            parse_audio_bit_depth(&Some(serde_json::Value::String("24".to_owned()))),
            24
        );
        assert_eq!(
            parse_audio_bit_depth(&Some(serde_json::Value::String("unknown".to_owned()))),
            -1
        );
    }

    #[test]
    fn mp4_is_never_trusted() {
        assert!(!is_reliable_metadata(ContainerKind::Mp4, "mkvmerge v20.0.0"));
    }

    #[test]
    fn mkv_trusted_only_above_version_threshold() {
        assert!(is_reliable_metadata(ContainerKind::Mkv, "mkvmerge v10.0.0"));
        assert!(!is_reliable_metadata(ContainerKind::Mkv, "mkvmerge v9.9.0"));
        assert!(is_reliable_metadata(ContainerKind::Mkv, "Voukoder 11.0"));
    }
}
