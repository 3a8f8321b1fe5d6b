//! Mission configuration data model (spec §3, §4.10, §6).
//!
//! Redesign Flag: "dynamic dict-based mission config" is replaced with a
//! tagged-variant record and explicit option structs whose enumerated
//! fields are validated once at load, per spec §9.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::state::enums::{PackageFormat, PriorOption, ProcessOption};

/// One input companion file sitting outside the primary container (an
/// external subtitle or audio track, see spec §4.9 SUBS/§4.4).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExternalFile {
    pub path: PathBuf,
    /// Explicit internal track indices to pull from this external
    /// container; if empty, the whole file is treated as one track.
    #[serde(default)]
    pub track_index_list: Vec<i64>,
    #[serde(default)]
    pub delay_ms: i64,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub track_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRelatedConfig {
    pub video_process_option: ProcessOption,
    pub video_transcoding_method: Option<crate::state::enums::VideoTranscodingMethod>,
    pub frame_server: Option<crate::state::enums::FrameServer>,
    pub output_frame_rate_mode: Option<crate::state::enums::OutputFrameRateMode>,
    #[serde(default)]
    pub output_fps: Option<String>,
    pub output_dynamic_range_mode: Option<crate::state::enums::OutputDynamicRangeMode>,
    #[serde(default)]
    pub output_full_range: Option<bool>,
    #[serde(default = "default_sar")]
    pub output_sar: String,
    #[serde(default)]
    pub segmented_transcode_config_list: Vec<String>,
    #[serde(default)]
    pub encoder_argv_template: Vec<String>,
    #[serde(default)]
    pub frame_server_template: Option<String>,
}

fn default_sar() -> String {
    "unchange".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioRelatedConfig {
    pub internal_audio_process_option: ProcessOption,
    #[serde(default)]
    pub external_audio_process_option: Option<ProcessOption>,
    pub audio_prior_option: PriorOption,
    #[serde(default)]
    pub audio_codec: Option<crate::state::enums::AudioCodec>,
    #[serde(default)]
    pub external_audio_files: Vec<ExternalFile>,
    #[serde(default)]
    pub per_track_delay_delta_ms: Vec<(i64, i64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleRelatedConfig {
    pub subtitle_process_option: ProcessOption,
    pub subtitle_prior_option: PriorOption,
    #[serde(default)]
    pub external_subtitle_files: Vec<ExternalFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChapterRelatedConfig {
    #[serde(default)]
    pub external_chapter_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AttachmentRelatedConfig {
    #[serde(default)]
    pub external_attachment_files: Vec<PathBuf>,
    #[serde(default = "default_true")]
    pub copy_internal_attachments: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniversalConfig {
    pub cache_dir: PathBuf,
    pub package_format: PackageFormat,
    #[serde(default)]
    pub thread_bool: bool,
    pub video: VideoRelatedConfig,
    pub audio: AudioRelatedConfig,
    pub subtitle: SubtitleRelatedConfig,
    #[serde(default)]
    pub chapter: ChapterRelatedConfig,
    #[serde(default)]
    pub attachment: AttachmentRelatedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    pub dir: PathBuf,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleMission {
    pub input: PathBuf,
    pub output: OutputSpec,
    pub universal: UniversalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesMission {
    pub input_dir: PathBuf,
    /// First capture group holds the integer episode number.
    pub filename_regex: String,
    /// Contains a `{episode}` placeholder.
    pub output_template: String,
    /// Either an explicit list, or `"first~last"` shorthand (spec §4.10).
    pub episode_list: String,
    pub universal: UniversalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mission {
    Single(SingleMission),
    Series(SeriesMission),
}

/// `episode_list: "A~B"` expands to `[A, A±1, ..., B]` with the step sign
/// inferred from `sign(B - A)` (spec §4.10).
pub fn expand_episode_list(spec: &str) -> crate::error::Result<Vec<i64>> {
    if let Some((first, last)) = spec.split_once('~') {
        let first: i64 = first
            .trim()
            .parse()
            .map_err(|_| crate::error::OrchestratorError::config(format!("bad episode bound: {first}")))?;
        let last: i64 = last
            .trim()
            .parse()
            .map_err(|_| crate::error::OrchestratorError::config(format!("bad episode bound: {last}")))?;
        let step: i64 = match (last - first).signum() {
            0 => 1,
            s => s,
        };
        let mut out = Vec::new();
        let mut cur = first;
        loop {
            out.push(cur);
            if cur == last {
                break;
            }
            cur += step;
        }
        Ok(out)
    } else {
        spec.split(',')
            .map(|s| {
                s.trim()
                    .parse::<i64>()
                    .map_err(|_| crate::error::OrchestratorError::config(format!("bad episode number: {s}")))
            })
            .collect()
    }
}

/// The full mission-config document (spec §6): `basic_config` plus the
/// array of missions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionConfigDocument {
    pub basic_config: BasicConfig,
    pub all_mission_config: Vec<Mission>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BasicConfig {
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub tool_directory: Option<PathBuf>,
}

/// Named presets referenced by string from mission config, e.g.
/// `audio_transcoding_cmd_param_template = { "opus_128k": [...] }`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParameterTemplatesDocument {
    #[serde(default)]
    pub audio_transcoding_cmd_param_template: std::collections::HashMap<String, Vec<String>>,
    #[serde(default)]
    pub video_transcoding_cmd_param_template: std::collections::HashMap<String, Vec<String>>,
    #[serde(default)]
    pub frame_server_template: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub segmented_transcode_config_template:
        std::collections::HashMap<String, Vec<crate::segmented_encoder::SegmentConfigInterval>>,
}
