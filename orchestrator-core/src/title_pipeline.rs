//! TitlePipeline (C9): orchestrate all five stream classes for one output
//! title with the cross-stream barrier (spec §4.9, §5).
//!
//! Grounded on `av1an-core::broker::Broker`'s per-chunk worker dispatch,
//! generalized from "one chunk, one encode" to "one title, five
//! cooperating sub-flows with a barrier". The barrier is a single-fire
//! `crossbeam_channel::bounded(0)` signal: the teacher's broker uses
//! `std::sync::mpsc::Sender` for worker-to-main progress signaling in the
//! same file; we use `crossbeam-channel` here because both the Audio task
//! and a completion observer need to see the one-shot event.

use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::bounded;

use crate::audio;
use crate::error::{OrchestratorError, Result};
use crate::extractor;
use crate::mission_planner::ResolvedTitle;
use crate::muxer;
use crate::probe;
use crate::segmented_encoder;
use crate::state::enums::{
    AudioCodec, ChapterFormat, ColorRange, ContainerKind, FrameRateMode, FrameServer, OutputDynamicRangeMode,
    OutputFrameRateMode, PackageFormat, PriorOption, ProcessOption, VideoTranscodingMethod,
};
use crate::state::mission::{
    AttachmentRelatedConfig, AudioRelatedConfig, ChapterRelatedConfig, ExternalFile, ParameterTemplatesDocument,
    SubtitleRelatedConfig, UniversalConfig, VideoRelatedConfig,
};
use crate::state::track::{AudioTrack, SubtitleTrack, TrackCommon, TrackFile, TrackInfo, VideoTrack};
use crate::tool_invoker;
use crate::video_encoder::{self, EncodePlan, VideoEncodeBackend, NO_TRIM};

/// State machine stages, in the order spec §4.9 describes:
/// `NEW -> PRE_MUX -> (SUBS || CHAPTERS || ATTACH || VIDEO_IO) -> AUDIO -> MUX -> CLEAN -> DONE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    New,
    PreMux,
    StreamFanOut,
    Audio,
    Mux,
    Clean,
    Done,
}

/// Why a title was pre-muxed into a cache-local MKV before any extraction
/// (ambient diagnostic field from SPEC_FULL §3; never changes behavior).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreMuxReason {
    None,
    UntrustedMetadata,
    UnsupportedContainer,
    PathTooLong,
}

/// Longest path the filesystem/tool invocation is presumed to handle
/// reliably; longer paths are pre-copied into the cache directory under a
/// shorter name (spec §4.9).
const MAX_RELIABLE_PATH_LEN: usize = 255;

pub fn needs_path_shortening(path: &Path) -> bool {
    path.as_os_str().len() > MAX_RELIABLE_PATH_LEN
}

/// The one-shot cross-stream barrier (spec §5): set after the source video
/// has been extracted or copied -- not after encoding -- and observed by
/// the Audio task before any demux begins.
pub struct IoCompleteBarrier {
    sender: crossbeam_channel::Sender<()>,
    receiver: crossbeam_channel::Receiver<()>,
}

impl IoCompleteBarrier {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(1);
        Self { sender, receiver }
    }

    pub fn signal(&self) {
        // A bounded(1) channel makes this idempotent: a second signal is a
        // no-op send error we deliberately ignore.
        let _ = self.sender.try_send(());
    }

    pub fn wait(&self) {
        let _ = self.receiver.recv();
    }
}

impl Default for IoCompleteBarrier {
    fn default() -> Self {
        Self::new()
    }
}

/// `resort`: apply a prior-option permutation list across a paired
/// internal/external track set. An order list shorter than the input
/// leaves unspecified positions in source order at the tail (Open
/// Question 2, spec §9).
pub fn resort<T: Clone>(items: &[T], order: &[usize]) -> Vec<T> {
    let mut used = vec![false; items.len()];
    let mut result = Vec::with_capacity(items.len());
    for &idx in order {
        if let Some(item) = items.get(idx) {
            if !used[idx] {
                used[idx] = true;
                result.push(item.clone());
            }
        }
    }
    for (idx, item) in items.iter().enumerate() {
        if !used[idx] {
            result.push(item.clone());
        }
    }
    result
}

/// Order internal-vs-external track sets by a [`PriorOption`]: the
/// preferred side comes first (spec Glossary: "Prior option").
pub fn order_by_prior<T>(internal: Vec<T>, external: Vec<T>, prior: PriorOption) -> Vec<T> {
    match prior {
        PriorOption::Internal => internal.into_iter().chain(external).collect(),
        PriorOption::External => external.into_iter().chain(internal).collect(),
    }
}

#[derive(Debug, Clone)]
pub struct TitleOutcome {
    pub output_path: PathBuf,
    pub removed_files: Vec<PathBuf>,
}

/// A title's working set: populated by the fan-out stage, consumed by
/// MUX. Plain struct (no dynamic dict), per the Redesign Flags.
#[derive(Default)]
pub struct TitleAssembly {
    pub video: Option<TrackFile>,
    pub audios: Vec<TrackFile>,
    pub subtitles: Vec<TrackFile>,
    pub chapters: Option<PathBuf>,
    pub attachments: Vec<PathBuf>,
}

/// GOP length used for the segmented-encode default driver when no
/// per-title value is configured (spec §4.8 has no config field for this;
/// SPEC_FULL supplement).
const DEFAULT_GOP_FRAME_CNT: u64 = 240;

/// Every external tool binary [`TitlePipeline::run_title`] needs, resolved
/// once per batch via [`tool_invoker::resolve_tool`] (spec §4.1, §6).
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub prober: PathBuf,
    pub matroska_extractor: PathBuf,
    pub generic_extractor: PathBuf,
    pub matroska_muxer: PathBuf,
    pub mp4_muxer: PathBuf,
    pub x265_encoder: PathBuf,
    pub x264_encoder: PathBuf,
    pub nvenc_encoder: PathBuf,
    pub frame_server: PathBuf,
    pub flac_encoder: PathBuf,
    pub opus_encoder: PathBuf,
    pub opus_decoder: PathBuf,
    pub aac_encoder: PathBuf,
}

impl ToolPaths {
    pub fn resolve(tool_directory: Option<&Path>) -> Result<Self> {
        let dir = tool_directory;
        Ok(Self {
            prober: tool_invoker::resolve_tool("mediainfo", dir)?,
            matroska_extractor: tool_invoker::resolve_tool("mkvextract", dir)?,
            generic_extractor: tool_invoker::resolve_tool("ffmpeg", dir)?,
            matroska_muxer: tool_invoker::resolve_tool("mkvmerge", dir)?,
            mp4_muxer: tool_invoker::resolve_tool("mp4box", dir)?,
            x265_encoder: tool_invoker::resolve_tool("x265", dir)?,
            x264_encoder: tool_invoker::resolve_tool("x264", dir)?,
            nvenc_encoder: tool_invoker::resolve_tool("nvencc", dir)?,
            frame_server: tool_invoker::resolve_tool("vspipe", dir)?,
            flac_encoder: tool_invoker::resolve_tool("flac", dir)?,
            opus_encoder: tool_invoker::resolve_tool("opusenc", dir)?,
            opus_decoder: tool_invoker::resolve_tool("opusdec", dir)?,
            aac_encoder: tool_invoker::resolve_tool("ffmpeg", dir)?,
        })
    }
}

/// Collaborators the pipeline needs in order to do real work, injected so
/// tests can supply fakes (see spec §8's acceptance scenarios, which are
/// driven against fake [`crate::tool_invoker`] implementations).
pub struct TitlePipeline<'a> {
    pub cache_dir: PathBuf,
    pub universal: &'a UniversalConfig,
}

impl<'a> TitlePipeline<'a> {
    pub fn new(cache_dir: PathBuf, universal: &'a UniversalConfig) -> Self {
        Self { cache_dir, universal }
    }

    /// Drive one title end to end: probe, fan out across the five stream
    /// classes, mux, clean (spec §4.9). This is the default production
    /// driver; tests that need fake tools call [`Self::run_fan_out`]
    /// directly instead.
    pub fn run_title(&self, tools: &ToolPaths, templates: &ParameterTemplatesDocument, title: &ResolvedTitle) -> Result<TitleOutcome> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|e| OrchestratorError::Io {
            path: self.cache_dir.clone(),
            source: e,
        })?;

        let container = container_kind_from_extension(&title.input);
        let container_info = probe::probe(&tools.prober, &title.input)?;
        let video = container_info
            .tracks
            .iter()
            .find_map(|t| match t {
                TrackInfo::Video(v) => Some(v.clone()),
                _ => None,
            })
            .ok_or_else(|| OrchestratorError::config(format!("{} has no video track", title.input.display())))?;

        let output_hint_name = crate::hash_path(&title.input.to_string_lossy());

        let assembly = self.run_fan_out(
            || {
                extract_subtitles_for_title(
                    tools,
                    &self.cache_dir,
                    container,
                    &title.input,
                    &container_info.tracks,
                    &self.universal.subtitle,
                    &output_hint_name,
                )
            },
            || {
                extract_chapters_for_title(
                    tools,
                    &self.cache_dir,
                    container,
                    &title.input,
                    &container_info.tracks,
                    &self.universal.chapter,
                    &output_hint_name,
                )
            },
            || {
                extract_attachments_for_title(
                    tools,
                    &self.cache_dir,
                    container,
                    &title.input,
                    &container_info.attachment_filenames,
                    &self.universal.attachment,
                    &output_hint_name,
                )
            },
            |barrier| {
                extract_or_encode_video(
                    tools,
                    templates,
                    &self.cache_dir,
                    container,
                    &title.input,
                    &video,
                    &self.universal.video,
                    &output_hint_name,
                    barrier,
                )
            },
            |barrier| {
                extract_or_transcode_audio(
                    tools,
                    &self.cache_dir,
                    container,
                    &title.input,
                    &container_info.tracks,
                    &self.universal.audio,
                    &output_hint_name,
                    barrier,
                )
            },
        )?;

        let video_file = match &assembly.video {
            Some(v) => v,
            None => return Err(OrchestratorError::config("video task produced no output")),
        };
        let mut tracks = vec![mux_track_for(video_file, "video")];
        for audio_file in &assembly.audios {
            tracks.push(mux_track_for(audio_file, "audio"));
        }
        for sub_file in &assembly.subtitles {
            tracks.push(mux_track_for(sub_file, "subtitle"));
        }

        let mux_tool = match self.universal.package_format {
            PackageFormat::Mkv => &tools.matroska_muxer,
            PackageFormat::Mp4 => &tools.mp4_muxer,
        };
        let request = muxer::MuxRequest {
            tracks: &tracks,
            output_dir: &title.output_dir,
            name: &title.output_name,
            kind: self.universal.package_format,
            title: Some(title.output_name.as_str()),
            chapters: assembly.chapters.as_deref(),
            attachments: &assembly.attachments,
            add_valid_mark: true,
        };
        let output_path = muxer::mux(mux_tool, &request)?;

        let mut remove_set: Vec<PathBuf> = tracks.iter().map(|t| t.path.clone()).collect();
        if let Some(chapters) = &assembly.chapters {
            if chapters.starts_with(&self.cache_dir) {
                remove_set.push(chapters.clone());
            }
        }
        let removed_files = self.clean(&remove_set);

        Ok(TitleOutcome { output_path, removed_files })
    }

    /// Run the five-task fan-out with the cross-stream barrier (spec §5):
    /// audio must not start until video I/O signals `io_complete`. Other
    /// sub-tasks proceed independently of the barrier.
    pub fn run_fan_out(
        &self,
        subs: impl FnOnce() -> Result<Vec<TrackFile>> + Send,
        chapters: impl FnOnce() -> Result<Option<PathBuf>> + Send,
        attach: impl FnOnce() -> Result<Vec<PathBuf>> + Send,
        video_io: impl FnOnce(&IoCompleteBarrier) -> Result<TrackFile> + Send,
        audio: impl FnOnce(&IoCompleteBarrier) -> Result<Vec<TrackFile>> + Send,
    ) -> Result<TitleAssembly> {
        let barrier = IoCompleteBarrier::new();

        thread::scope(|scope| {
            let subs_handle = scope.spawn(subs);
            let chapters_handle = scope.spawn(chapters);
            let attach_handle = scope.spawn(attach);
            let video_handle = scope.spawn(|| video_io(&barrier));
            let audio_handle = scope.spawn(|| audio(&barrier));

            let video = video_handle.join().map_err(|_| OrchestratorError::config("video task panicked"))??;
            let subtitles = subs_handle.join().map_err(|_| OrchestratorError::config("subs task panicked"))??;
            let chapters = chapters_handle.join().map_err(|_| OrchestratorError::config("chapters task panicked"))??;
            let attachments = attach_handle.join().map_err(|_| OrchestratorError::config("attach task panicked"))??;
            let audios = audio_handle.join().map_err(|_| OrchestratorError::config("audio task panicked"))??;

            Ok(TitleAssembly {
                video: Some(video),
                audios,
                subtitles,
                chapters,
                attachments,
            })
        })
    }

    /// `CLEAN` (spec §4.9): delete every file in the remove-set. Outputs
    /// and logs are kept.
    pub fn clean(&self, remove_set: &[PathBuf]) -> Vec<PathBuf> {
        let mut removed = Vec::new();
        for path in remove_set {
            if std::fs::remove_file(path).is_ok() {
                removed.push(path.clone());
            }
        }
        removed
    }

    /// Whether the VFR/MP4 combination requires a first muxing pass through
    /// MKV to carry timestamps (spec §4.9 VIDEO_IO, §4.9 MUX).
    pub fn requires_mkv_first_pass(&self, is_vfr: bool) -> bool {
        is_vfr && self.universal.package_format == PackageFormat::Mp4
    }

    /// Whether the configured `.wmv`-style unsupported input must be
    /// re-remuxed via the generic transcoder before being wrapped into
    /// MKV (spec §4.9 PRE_MUX).
    pub fn requires_generic_reremux(&self, extension: &str) -> bool {
        matches!(extension.to_ascii_lowercase().as_str(), "wmv" | "avi" | "flv")
    }
}

fn container_kind_from_extension(path: &Path) -> ContainerKind {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
        Some("mkv") => ContainerKind::Mkv,
        Some("mka") => ContainerKind::Mka,
        Some("mks") => ContainerKind::Mks,
        Some("mp4") | Some("m4v") | Some("mov") => ContainerKind::Mp4,
        _ => ContainerKind::Unknown,
    }
}

fn mux_track_for(file: &TrackFile, track_type: &str) -> muxer::MuxTrackInput {
    let common = file.info.common();
    muxer::MuxTrackInput {
        path: file.filepath.clone(),
        track_id: 0,
        track_type: Some(track_type.to_owned()),
        delay_ms: common.delay_ms,
        track_name: common.title.clone(),
        language: common.language.clone(),
        timestamp_path: None,
    }
}

fn synthetic_external_common(file: &ExternalFile, idx: usize) -> TrackCommon {
    TrackCommon {
        track_id: idx as i64,
        format: file.path.extension().and_then(|e| e.to_str()).unwrap_or("").to_owned(),
        duration_ms: -1,
        bitrate_bps: -1,
        delay_ms: file.delay_ms,
        stream_size_bytes: -1,
        title: file.track_name.clone(),
        language: file.language.clone(),
        default: false,
        forced: false,
    }
}

fn extract_subtitles_for_title(
    tools: &ToolPaths,
    cache_dir: &Path,
    container: ContainerKind,
    input_path: &Path,
    container_tracks: &[TrackInfo],
    subtitle_cfg: &SubtitleRelatedConfig,
    output_hint_name: &str,
) -> Result<Vec<TrackFile>> {
    if subtitle_cfg.subtitle_process_option == ProcessOption::Skip {
        return Ok(Vec::new());
    }

    let mut internal = Vec::new();
    for track in container_tracks {
        if let TrackInfo::Subtitle(sub) = track {
            let ext = extractor::extension_for_codec(&sub.common.format);
            let output_path = cache_dir.join(format!("{output_hint_name}.sub.{}.{ext}", sub.common.track_id));
            extractor::extract_subtitles(
                &tools.matroska_extractor,
                &tools.generic_extractor,
                container,
                input_path,
                sub.common.track_id,
                &output_path,
            )?;
            internal.push(TrackFile::bind(TrackInfo::Subtitle(sub.clone()), output_path)?);
        }
    }

    let mut external = Vec::new();
    for (idx, file) in subtitle_cfg.external_subtitle_files.iter().enumerate() {
        let common = synthetic_external_common(file, idx);
        external.push(TrackFile::bind(TrackInfo::Subtitle(SubtitleTrack { common }), file.path.clone())?);
    }

    Ok(order_by_prior(internal, external, subtitle_cfg.subtitle_prior_option))
}

fn extract_chapters_for_title(
    tools: &ToolPaths,
    cache_dir: &Path,
    container: ContainerKind,
    input_path: &Path,
    container_tracks: &[TrackInfo],
    chapter_cfg: &ChapterRelatedConfig,
    output_hint_name: &str,
) -> Result<Option<PathBuf>> {
    if let Some(external) = &chapter_cfg.external_chapter_file {
        return Ok(Some(external.clone()));
    }
    let has_menu = container_tracks.iter().any(|t| matches!(t, TrackInfo::Menu(_)));
    if !has_menu || !container.is_matroska() {
        return Ok(None);
    }
    let output_path = cache_dir.join(format!("{output_hint_name}.chapters.xml"));
    let written = extractor::extract_chapters(&tools.matroska_extractor, input_path, ChapterFormat::Matroska, "eng", &output_path)?;
    Ok(written.map(|()| output_path))
}

fn extract_attachments_for_title(
    tools: &ToolPaths,
    cache_dir: &Path,
    container: ContainerKind,
    input_path: &Path,
    attachment_filenames: &[String],
    attachment_cfg: &AttachmentRelatedConfig,
    output_hint_name: &str,
) -> Result<Vec<PathBuf>> {
    let mut outputs = Vec::new();
    if attachment_cfg.copy_internal_attachments && container.is_matroska() && !attachment_filenames.is_empty() {
        let mut targets = Vec::new();
        for (idx, name) in attachment_filenames.iter().enumerate() {
            let output_path = cache_dir.join(format!("{output_hint_name}.attach.{name}"));
            targets.push(((idx + 1) as u32, output_path.clone()));
            outputs.push(output_path);
        }
        extractor::extract_attachments(&tools.matroska_extractor, input_path, &targets)?;
    }
    outputs.extend(attachment_cfg.external_attachment_files.iter().cloned());
    Ok(outputs)
}

fn default_argv_template_for(method: VideoTranscodingMethod) -> Vec<String> {
    let _ = method;
    vec![
        "{{encoder_exe}}".to_owned(),
        "--input".to_owned(),
        "{{input_filepath}}".to_owned(),
        "--output".to_owned(),
        "{{output_path}}".to_owned(),
    ]
}

fn resolve_segment_intervals(
    names: &[String],
    templates: &ParameterTemplatesDocument,
) -> Result<Vec<segmented_encoder::SegmentConfigInterval>> {
    let mut out = Vec::new();
    for name in names {
        let intervals = templates
            .segmented_transcode_config_template
            .get(name)
            .ok_or_else(|| OrchestratorError::config(format!("unknown segmented_transcode_config_template: {name}")))?;
        out.extend(intervals.iter().cloned());
    }
    Ok(out)
}

fn build_backend(tools: &ToolPaths, method: VideoTranscodingMethod, frame_server: Option<FrameServer>) -> Box<dyn VideoEncodeBackend> {
    let encoder_exe = match method {
        VideoTranscodingMethod::X265 => tools.x265_encoder.clone(),
        VideoTranscodingMethod::X264 => tools.x264_encoder.clone(),
        VideoTranscodingMethod::Nvenc => tools.nvenc_encoder.clone(),
    };
    match frame_server {
        Some(kind) if kind != FrameServer::None => {
            let frame_server_backend = video_encoder::FrameServerX26x::new(encoder_exe, tools.frame_server.clone(), kind);
            if method == VideoTranscodingMethod::Nvenc {
                Box::new(video_encoder::FrameServerNvenc { inner: frame_server_backend })
            } else {
                Box::new(frame_server_backend)
            }
        }
        _ => Box::new(video_encoder::DirectNvenc::new(encoder_exe)),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_encode_plan(
    video: &VideoTrack,
    video_cfg: &VideoRelatedConfig,
    method: VideoTranscodingMethod,
    input_filepath: PathBuf,
    output_path: PathBuf,
    timecode_filepath: Option<PathBuf>,
    first_frame_index: i64,
    last_frame_index: i64,
    encoder_argv_template: Vec<String>,
    frame_server_template: Option<String>,
) -> EncodePlan {
    let input_frame_rate_mode = video.frame_rate_mode;
    let output_frame_rate_mode = video_cfg
        .output_frame_rate_mode
        .map(|m| match m {
            OutputFrameRateMode::Cfr => FrameRateMode::Cfr,
            OutputFrameRateMode::Vfr => FrameRateMode::Vfr,
        })
        .unwrap_or(input_frame_rate_mode);
    let requested_output_fps_numerator = video_cfg
        .output_fps
        .as_deref()
        .and_then(|s| s.trim_end_matches("fps").trim().parse::<i64>().ok());

    let input_full_range = video.color_range == ColorRange::Full;
    let output_full_range = video_cfg.output_full_range.unwrap_or(input_full_range);

    let hdr10 = match video_cfg.output_dynamic_range_mode {
        Some(OutputDynamicRangeMode::Sdr) => None,
        _ => video.hdr10,
    };

    EncodePlan {
        input_filepath,
        output_path,
        width: video.width,
        height: video.height,
        bit_depth: video.bit_depth,
        input_frame_rate_mode,
        input_fps: video.frame_rate,
        input_original_fps: video.original_frame_rate,
        output_frame_rate_mode,
        requested_output_fps_numerator,
        timecode_filepath,
        first_frame_index,
        last_frame_index,
        input_full_range,
        output_full_range,
        input_color: video_encoder::ColorTags {
            matrix: video.color_matrix,
            primaries: video.color_primaries,
            transfer: video.transfer,
        },
        output_sar: video_cfg.output_sar.clone(),
        source_sar: video.sample_aspect_ratio,
        hdr10,
        encoder_argv_template,
        frame_server_template,
        method,
    }
}

#[allow(clippy::too_many_arguments)]
fn extract_or_encode_video(
    tools: &ToolPaths,
    templates: &ParameterTemplatesDocument,
    cache_dir: &Path,
    container: ContainerKind,
    input_path: &Path,
    video: &VideoTrack,
    video_cfg: &VideoRelatedConfig,
    output_hint_name: &str,
    barrier: &IoCompleteBarrier,
) -> Result<TrackFile> {
    match video_cfg.video_process_option {
        ProcessOption::Skip => Err(OrchestratorError::config("a title's video track cannot be skipped")),
        ProcessOption::Copy => {
            let ext = extractor::extension_for_codec(&video.common.format);
            let output_path = cache_dir.join(format!("{output_hint_name}.video.{ext}"));
            extractor::extract_video(
                &tools.matroska_extractor,
                &tools.generic_extractor,
                container,
                input_path,
                video.common.track_id,
                &output_path,
            )?;
            barrier.signal();
            TrackFile::bind(TrackInfo::Video(video.clone()), output_path)
        }
        ProcessOption::Transcode => {
            let method = video_cfg
                .video_transcoding_method
                .ok_or_else(|| OrchestratorError::config("video_transcoding_method is required to transcode"))?;
            let ext = match method {
                VideoTranscodingMethod::X265 | VideoTranscodingMethod::Nvenc => "265",
                VideoTranscodingMethod::X264 => "264",
            };
            let output_path = cache_dir.join(format!("{output_hint_name}.video.{ext}"));

            let timecode_filepath = if video.frame_rate_mode == FrameRateMode::Vfr && container.is_matroska() {
                let tc_path = cache_dir.join(format!("{output_hint_name}.timecodes.txt"));
                extractor::extract_video_timecodes(&tools.matroska_extractor, input_path, video.common.track_id, &tc_path)?;
                Some(tc_path)
            } else {
                None
            };

            let argv_template = if video_cfg.encoder_argv_template.is_empty() {
                default_argv_template_for(method)
            } else {
                video_cfg.encoder_argv_template.clone()
            };

            let result = if video_cfg.segmented_transcode_config_list.is_empty() {
                let backend = build_backend(tools, method, video_cfg.frame_server);
                let plan = build_encode_plan(
                    video,
                    video_cfg,
                    method,
                    input_path.to_path_buf(),
                    output_path.clone(),
                    timecode_filepath.clone(),
                    NO_TRIM,
                    NO_TRIM,
                    argv_template,
                    video_cfg.frame_server_template.clone(),
                );
                video_encoder::encode(backend.as_ref(), &plan, video.frame_count)?
            } else {
                let last_index = video.frame_count.saturating_sub(1);
                let intervals = resolve_segment_intervals(&video_cfg.segmented_transcode_config_list, templates)?;
                let default_interval = segmented_encoder::SegmentConfigInterval {
                    first_frame_index: 0,
                    last_frame_index: last_index,
                    encoder_argv_template: argv_template,
                    frame_server_template: video_cfg.frame_server_template.clone(),
                };
                let seg_plan = segmented_encoder::build_plan((0, last_index), intervals, &default_interval, DEFAULT_GOP_FRAME_CNT)?;
                let shard_config = seg_plan.shard_config.clone();

                let status_path = cache_dir.join(format!("{output_hint_name}.shard-status.json"));
                let store = segmented_encoder::ShardStatusStore::load_or_create(status_path, DEFAULT_GOP_FRAME_CNT)?;

                let video_for_shard = video.clone();
                let method_for_shard = method;
                let input_for_shard = input_path.to_path_buf();
                let cache_dir_for_shard = cache_dir.to_path_buf();
                let timecode_for_shard = timecode_filepath.clone();
                let hint = output_hint_name.to_owned();
                let output_sar = video_cfg.output_sar.clone();
                let output_full_range = video_cfg.output_full_range;
                let output_frame_rate_mode = video_cfg.output_frame_rate_mode;
                let output_fps = video_cfg.output_fps.clone();
                let output_dynamic_range_mode = video_cfg.output_dynamic_range_mode;

                let make_plan_for_shard = move |shard: &segmented_encoder::Shard| {
                    let interval = shard_config.get(&shard.id());
                    let shard_video_cfg = VideoRelatedConfig {
                        video_process_option: ProcessOption::Transcode,
                        video_transcoding_method: Some(method_for_shard),
                        frame_server: None,
                        output_frame_rate_mode,
                        output_fps: output_fps.clone(),
                        output_dynamic_range_mode,
                        output_full_range,
                        output_sar: output_sar.clone(),
                        segmented_transcode_config_list: vec![],
                        encoder_argv_template: vec![],
                        frame_server_template: None,
                    };
                    let shard_output = cache_dir_for_shard.join(format!("{hint}.shard.{}.{ext}", shard.id()));
                    build_encode_plan(
                        &video_for_shard,
                        &shard_video_cfg,
                        method_for_shard,
                        input_for_shard.clone(),
                        shard_output,
                        timecode_for_shard.clone(),
                        shard.first as i64,
                        shard.last as i64,
                        interval.map(|i| i.encoder_argv_template.clone()).unwrap_or_default(),
                        interval.and_then(|i| i.frame_server_template.clone()),
                    )
                };
                let frame_server_kind = video_cfg.frame_server;
                let backend_for_shard = move |_shard: &segmented_encoder::Shard| build_backend(tools, method_for_shard, frame_server_kind);

                segmented_encoder::run(&seg_plan, &store, make_plan_for_shard, backend_for_shard, &tools.matroska_muxer, &output_path)?;
                video_encoder::EncodeResult {
                    output_path: output_path.clone(),
                    avg_fps: 0.0,
                    avg_bitrate_kbps: 0.0,
                }
            };

            barrier.signal();
            TrackFile::bind(TrackInfo::Video(video.clone()), result.output_path)
        }
    }
}

fn default_audio_argv_template(codec: AudioCodec) -> Vec<String> {
    match codec {
        AudioCodec::Opus => vec!["{{encoder_exe}}".to_owned(), "{{input_audio_path}}".to_owned(), "{{output_path}}".to_owned()],
        AudioCodec::Flac => vec![
            "{{encoder_exe}}".to_owned(),
            "-i".to_owned(),
            "{{input_audio_path}}".to_owned(),
            "-c:a".to_owned(),
            "flac".to_owned(),
            "{{output_path}}".to_owned(),
        ],
        AudioCodec::Aac => vec![
            "{{encoder_exe}}".to_owned(),
            "-i".to_owned(),
            "{{input_audio_path}}".to_owned(),
            "-c:a".to_owned(),
            "aac".to_owned(),
            "{{output_path}}".to_owned(),
        ],
        AudioCodec::Passthrough => vec![
            "{{encoder_exe}}".to_owned(),
            "-i".to_owned(),
            "{{input_audio_path}}".to_owned(),
            "-c".to_owned(),
            "copy".to_owned(),
            "{{output_path}}".to_owned(),
        ],
    }
}

#[allow(clippy::too_many_arguments)]
fn transcode_audio_track(
    tools: &ToolPaths,
    cache_dir: &Path,
    container: ContainerKind,
    source_path: &Path,
    audio_track: &AudioTrack,
    audio_cfg: &AudioRelatedConfig,
    output_hint_name: &str,
    is_external: bool,
) -> Result<TrackFile> {
    let process_option = if is_external {
        audio_cfg.external_audio_process_option.unwrap_or(ProcessOption::Copy)
    } else {
        audio_cfg.internal_audio_process_option
    };
    let delay_delta = audio_cfg
        .per_track_delay_delta_ms
        .iter()
        .find(|(id, _)| *id == audio_track.common.track_id)
        .map(|(_, delta)| *delta)
        .unwrap_or(0);

    match process_option {
        ProcessOption::Skip => Err(OrchestratorError::config("cannot skip an enumerated audio track")),
        ProcessOption::Copy => {
            let ext = extractor::extension_for_codec(&audio_track.common.format);
            let output_path = cache_dir.join(format!("{output_hint_name}.audio.{}.{ext}", audio_track.common.track_id));
            if is_external {
                std::fs::copy(source_path, &output_path).map_err(|e| OrchestratorError::Io {
                    path: output_path.clone(),
                    source: e,
                })?;
            } else {
                extractor::extract_audio(
                    &tools.matroska_extractor,
                    &tools.generic_extractor,
                    container,
                    source_path,
                    audio_track.common.track_id,
                    &output_path,
                )?;
            }
            let mut bound = audio_track.clone();
            bound.common.delay_ms += delay_delta;
            TrackFile::bind(TrackInfo::Audio(bound), output_path)
        }
        ProcessOption::Transcode => {
            let codec = audio_cfg
                .audio_codec
                .ok_or_else(|| OrchestratorError::config("audio_codec is required to transcode"))?;

            let extracted = if is_external {
                source_path.to_path_buf()
            } else {
                let src_ext = extractor::extension_for_codec(&audio_track.common.format);
                let raw_path = cache_dir.join(format!("{output_hint_name}.audio.{}.src.{src_ext}", audio_track.common.track_id));
                extractor::extract_audio(
                    &tools.matroska_extractor,
                    &tools.generic_extractor,
                    container,
                    source_path,
                    audio_track.common.track_id,
                    &raw_path,
                )?;
                raw_path
            };

            let ext = match codec {
                AudioCodec::Opus => "opus",
                AudioCodec::Flac => "flac",
                AudioCodec::Aac => "aac",
                AudioCodec::Passthrough => extractor::extension_for_codec(&audio_track.common.format),
            };
            let output_path = cache_dir.join(format!("{output_hint_name}.audio.{}.{ext}", audio_track.common.track_id));

            let request = audio::AudioTranscodeRequest {
                encoder_exe: match codec {
                    AudioCodec::Opus => tools.opus_encoder.clone(),
                    AudioCodec::Flac => tools.flac_encoder.clone(),
                    AudioCodec::Aac => tools.aac_encoder.clone(),
                    AudioCodec::Passthrough => tools.generic_extractor.clone(),
                },
                decoder_exe: matches!(codec, AudioCodec::Opus).then(|| tools.opus_decoder.clone()),
                input_audio_path: extracted,
                output_path: output_path.clone(),
                argv_template: default_audio_argv_template(codec),
                ffmpeg_wav_audio_codec: String::new(),
                delete_input: !is_external,
            };

            let produced = match codec {
                AudioCodec::Opus => audio::to_opus(request, &tools.flac_encoder)?,
                AudioCodec::Flac => audio::to_flac(request, audio_track.bit_depth)?,
                AudioCodec::Aac => audio::to_aac(request, audio_track.bit_depth)?,
                AudioCodec::Passthrough => audio::passthrough_convert(request)?,
            };

            let mut bound = audio_track.clone();
            bound.common.delay_ms += delay_delta;
            TrackFile::bind(TrackInfo::Audio(bound), produced)
        }
    }
}

fn extract_or_transcode_audio(
    tools: &ToolPaths,
    cache_dir: &Path,
    container: ContainerKind,
    input_path: &Path,
    container_tracks: &[TrackInfo],
    audio_cfg: &AudioRelatedConfig,
    output_hint_name: &str,
    barrier: &IoCompleteBarrier,
) -> Result<Vec<TrackFile>> {
    barrier.wait();

    let mut internal = Vec::new();
    for track in container_tracks {
        if let TrackInfo::Audio(audio_track) = track {
            internal.push(transcode_audio_track(
                tools,
                cache_dir,
                container,
                input_path,
                audio_track,
                audio_cfg,
                output_hint_name,
                false,
            )?);
        }
    }

    let mut external = Vec::new();
    for (idx, file) in audio_cfg.external_audio_files.iter().enumerate() {
        let synthetic = AudioTrack {
            common: synthetic_external_common(file, idx),
            bit_depth: -1,
        };
        external.push(transcode_audio_track(
            tools,
            cache_dir,
            container,
            &file.path,
            &synthetic,
            audio_cfg,
            output_hint_name,
            true,
        )?);
    }

    Ok(order_by_prior(internal, external, audio_cfg.audio_prior_option))
}
