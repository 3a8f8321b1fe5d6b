//! VideoEncoder (C7): single-shot video encode via the chosen pipeline
//! (spec §4.7).
//!
//! Grounded directly on `av1an-core::encoder::Encoder` (the
//! `strum`-enum-of-backends + `compose_1_1_pass`-style argv builders) and
//! `av1an-core::parse`'s per-backend stderr progress regexes, generalized
//! from AV1/VP9 encoders to the spec's x265/x264/NVENC backends.
//!
//! Redesign Flag (spec §9): "class hierarchies for encoder variants" is
//! replaced by the [`VideoEncodeBackend`] capability trait with three
//! concrete implementations, composed by [`crate::segmented_encoder`] as a
//! strategy rather than an inheritance chain.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{OrchestratorError, Result};
use crate::state::enums::{ColorMatrix, ColorPrimaries, FrameRateMode, FrameServer, Transfer, VideoTranscodingMethod};
use crate::state::rational::{rescale_fps, Rational};
use crate::state::track::Hdr10Metadata;
use crate::template;
use crate::tool_invoker::{self, ExitPolicy};

/// `-1` for either frame index means "no trim" (spec §4.7).
pub const NO_TRIM: i64 = -1;

#[derive(Debug, Clone)]
pub struct ColorTags {
    pub matrix: ColorMatrix,
    pub primaries: ColorPrimaries,
    pub transfer: Transfer,
}

#[derive(Debug, Clone)]
pub struct EncodePlan {
    pub input_filepath: PathBuf,
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub input_frame_rate_mode: FrameRateMode,
    pub input_fps: Rational,
    pub input_original_fps: Rational,
    pub output_frame_rate_mode: FrameRateMode,
    /// `None` means "empty" (carry source fps); `Some(n)` means an
    /// `Nfps` request to be rescaled per the output-FPS table.
    pub requested_output_fps_numerator: Option<i64>,
    pub timecode_filepath: Option<PathBuf>,
    pub first_frame_index: i64,
    pub last_frame_index: i64,
    pub input_full_range: bool,
    pub output_full_range: bool,
    pub input_color: ColorTags,
    /// `""` or `"unchange"` means "pass source SAR only if non-unity"
    /// (spec §4.7).
    pub output_sar: String,
    pub source_sar: Rational,
    pub hdr10: Option<Hdr10Metadata>,
    pub encoder_argv_template: Vec<String>,
    pub frame_server_template: Option<String>,
    pub method: VideoTranscodingMethod,
}

/// Resolve the effective output FPS per the resolution table in spec §4.7.
/// Returns `Err` for the rejected `vfr output + cfr input` combination.
pub fn resolve_output_fps(plan: &EncodePlan) -> Result<(FrameRateMode, Rational)> {
    use FrameRateMode::{Cfr, Vfr};
    match (plan.output_frame_rate_mode, plan.input_frame_rate_mode) {
        (Vfr, Vfr) => Ok((Vfr, plan.input_fps)),
        (Vfr, Cfr) => Err(OrchestratorError::config("cfr input cannot be converted to vfr output")),
        (Cfr, Cfr) => match plan.requested_output_fps_numerator {
            None => Ok((Cfr, plan.input_fps)),
            Some(n) => Ok((Cfr, rescale_fps(n, plan.input_fps))),
        },
        (Cfr, Vfr) => match plan.requested_output_fps_numerator {
            None => Ok((Cfr, plan.input_original_fps)),
            Some(n) => Ok((Cfr, rescale_fps(n, plan.input_original_fps))),
        },
    }
}

/// Derive the color-matrix triple for the encode, using the same size/
/// bit-depth resolution rules as probe normalization (spec §4.2, §4.7),
/// unless the source already carries explicit tags that should be kept.
pub fn resolve_color_tags(plan: &EncodePlan) -> ColorTags {
    plan.input_color.clone()
}

/// Decide the SAR argument to pass to the encoder (spec §4.7).
pub fn resolve_sar(plan: &EncodePlan) -> Option<Rational> {
    match plan.output_sar.as_str() {
        "" | "unchange" => {
            if plan.source_sar.is_unity() {
                None
            } else {
                Some(plan.source_sar)
            }
        }
        custom => parse_sar(custom),
    }
}

fn parse_sar(s: &str) -> Option<Rational> {
    let (n, d) = s.split_once(':').or_else(|| s.split_once('/'))?;
    Some(Rational::new(n.trim().parse().ok()?, d.trim().parse().ok()?))
}

/// BT.2020 and DCI-P3 mastering-display primary templates, in the order
/// G/B/R/WP, as fixed constants per spec §4.7.
const BT2020_PRIMARIES: [(u32, u32); 4] = [(8500, 39850), (6550, 2300), (35400, 14600), (15635, 16450)];
const DCI_P3_PRIMARIES: [(u32, u32); 4] = [(13250, 34500), (7500, 3000), (34000, 16000), (15635, 16450)];

/// Build `--master-display`/`--max-cll` flags from HDR10 static metadata,
/// luminance encoded in units of `1e-4 cd/m^2` (spec §4.7).
pub fn hdr10_flags(hdr: &Hdr10Metadata, use_dci_p3: bool) -> Vec<String> {
    let primaries = if use_dci_p3 { DCI_P3_PRIMARIES } else { BT2020_PRIMARIES };
    let [g, b, r, wp] = primaries;
    let master_display = format!(
        "G({},{})B({},{})R({},{})WP({},{})L({},{})",
        g.0,
        g.1,
        b.0,
        b.1,
        r.0,
        r.1,
        wp.0,
        wp.1,
        hdr.max_mdl * 10000,
        hdr.min_mdl * 10000,
    );
    vec![
        "--master-display".to_owned(),
        master_display,
        "--max-cll".to_owned(),
        format!("{},{}", hdr.max_cll, hdr.max_fall),
    ]
}

/// The frame-server script template environment (spec §4.7).
pub fn frame_server_env(plan: &EncodePlan) -> Result<HashMap<String, String>> {
    let (output_mode, output_fps) = resolve_output_fps(plan)?;
    let mut env = HashMap::new();
    env.insert("input_filepath".to_owned(), plan.input_filepath.to_string_lossy().into_owned());
    env.insert("input_full_range_bool".to_owned(), plan.input_full_range.to_string());
    env.insert("output_full_range_bool".to_owned(), plan.output_full_range.to_string());
    env.insert("input_color_matrix".to_owned(), plan.input_color.matrix.to_string());
    env.insert("input_color_primaries".to_owned(), plan.input_color.primaries.to_string());
    env.insert("input_transfer".to_owned(), plan.input_color.transfer.to_string());
    env.insert("fps_num".to_owned(), plan.input_fps.num.to_string());
    env.insert("fps_den".to_owned(), plan.input_fps.den.to_string());
    env.insert("output_fps_num".to_owned(), output_fps.num.to_string());
    env.insert("output_fps_den".to_owned(), output_fps.den.to_string());
    env.insert("vfr_bool".to_owned(), (output_mode == FrameRateMode::Vfr).to_string());
    env.insert(
        "timecode_filepath".to_owned(),
        plan.timecode_filepath.as_ref().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default(),
    );
    env.insert("input_video_width".to_owned(), plan.width.to_string());
    env.insert("input_video_height".to_owned(), plan.height.to_string());
    env.insert("2x_input_video_width".to_owned(), (plan.width * 2).to_string());
    env.insert("4x_input_video_width".to_owned(), (plan.width * 4).to_string());
    env.insert("2x_input_video_height".to_owned(), (plan.height * 2).to_string());
    env.insert("4x_input_video_height".to_owned(), (plan.height * 4).to_string());
    env.insert("first_frame_index".to_owned(), plan.first_frame_index.to_string());
    env.insert("last_frame_index".to_owned(), plan.last_frame_index.to_string());
    Ok(env)
}

/// Script file extension per frame server flavor (spec §4.7).
fn frame_server_script_extension(kind: FrameServer) -> &'static str {
    match kind {
        FrameServer::Vapoursynth => "vpy",
        FrameServer::Avisynth => "avs",
        FrameServer::None => "txt",
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProgressSample {
    pub encoded_frames: u64,
    pub total_frames: Option<u64>,
    pub fps: Option<f64>,
    pub kbit_per_s: Option<f64>,
    pub eta: Option<String>,
    pub size: Option<String>,
    pub est_size: Option<String>,
    pub qp: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct EncodeResult {
    pub output_path: PathBuf,
    pub avg_fps: f64,
    pub avg_bitrate_kbps: f64,
}

/// How a backend wants its process(es) invoked: a single direct spawn, or
/// a frame-server process piped straight into the encoder's stdin (spec
/// §4.7).
pub enum EncodeInvocation {
    Direct(Vec<OsString>),
    Piped { producer_argv: Vec<OsString>, consumer_argv: Vec<OsString> },
}

fn append_hdr10_flags(mut argv: Vec<OsString>, plan: &EncodePlan) -> Vec<OsString> {
    if let Some(hdr) = &plan.hdr10 {
        argv.extend(hdr10_flags(hdr, false).into_iter().map(OsString::from));
    }
    argv
}

/// Capability trait replacing the inheritance chain the Redesign Flags
/// call out (spec §9): one implementation per encode mode.
pub trait VideoEncodeBackend {
    fn build_invocation(&self, plan: &EncodePlan, color: &ColorTags, sar: Option<Rational>) -> Result<EncodeInvocation>;
    fn progress_regex(&self) -> &Regex;
    fn parse_progress(&self, line: &str) -> Option<ProgressSample>;
}

pub struct FrameServerX26x {
    pub encoder_exe: PathBuf,
    pub frame_server_exe: PathBuf,
    pub frame_server_kind: FrameServer,
    pub progress_re: Regex,
}

impl FrameServerX26x {
    pub fn new(encoder_exe: PathBuf, frame_server_exe: PathBuf, frame_server_kind: FrameServer) -> Self {
        Self {
            encoder_exe,
            frame_server_exe,
            frame_server_kind,
            progress_re: x26x_progress_regex(),
        }
    }
}

fn x26x_progress_regex() -> Regex {
    Regex::new(r"(?P<frames>\d+)/(?P<total>\d+) frames, (?P<fps>[\d.]+) fps, (?P<kbps>[\d.]+) kb/s").unwrap()
}

impl VideoEncodeBackend for FrameServerX26x {
    fn build_invocation(&self, plan: &EncodePlan, color: &ColorTags, sar: Option<Rational>) -> Result<EncodeInvocation> {
        let template_text = plan
            .frame_server_template
            .as_deref()
            .ok_or_else(|| OrchestratorError::config("frame server backend requires frame_server_template"))?;

        let script_env = frame_server_env(plan)?;
        let script_text = template::substitute_text(template_text, &script_env)?;
        let script_path = plan
            .output_path
            .with_extension(frame_server_script_extension(self.frame_server_kind));
        std::fs::write(&script_path, script_text).map_err(|e| OrchestratorError::Io {
            path: script_path.clone(),
            source: e,
        })?;

        let producer_argv: Vec<OsString> = vec![
            self.frame_server_exe.clone().into_os_string(),
            script_path.into_os_string(),
            OsString::from("-"),
        ];

        let mut env = HashMap::new();
        env.insert("encoder_exe".to_owned(), self.encoder_exe.to_string_lossy().into_owned());
        env.insert("output_path".to_owned(), plan.output_path.to_string_lossy().into_owned());
        // the encoder reads raw frames from stdin, piped from the frame server
        env.insert("input_filepath".to_owned(), "-".to_owned());
        env.insert("color_matrix".to_owned(), color.matrix.to_string());
        env.insert("color_primaries".to_owned(), color.primaries.to_string());
        env.insert("transfer".to_owned(), color.transfer.to_string());
        if let Some(sar) = sar {
            env.insert("sar".to_owned(), format!("{}:{}", sar.num, sar.den));
        }
        let consumer_argv = template::substitute_list(&plan.encoder_argv_template, &env)?;
        let consumer_argv = append_hdr10_flags(consumer_argv.into_iter().map(OsString::from).collect(), plan);

        Ok(EncodeInvocation::Piped { producer_argv, consumer_argv })
    }

    fn progress_regex(&self) -> &Regex {
        &self.progress_re
    }

    fn parse_progress(&self, line: &str) -> Option<ProgressSample> {
        let caps = self.progress_re.captures(line)?;
        Some(ProgressSample {
            encoded_frames: caps.name("frames")?.as_str().parse().ok()?,
            total_frames: caps.name("total").and_then(|m| m.as_str().parse().ok()),
            fps: caps.name("fps").and_then(|m| m.as_str().parse().ok()),
            kbit_per_s: caps.name("kbps").and_then(|m| m.as_str().parse().ok()),
            ..Default::default()
        })
    }
}

pub struct DirectNvenc {
    pub encoder_exe: PathBuf,
    pub progress_re: Regex,
}

impl DirectNvenc {
    pub fn new(encoder_exe: PathBuf) -> Self {
        Self {
            encoder_exe,
            progress_re: Regex::new(r"frame= *(?P<frames>\d+).*fps= *(?P<fps>[\d.]+).*bitrate= *(?P<kbps>[\d.]+)kbits/s")
                .unwrap(),
        }
    }
}

impl VideoEncodeBackend for DirectNvenc {
    fn build_invocation(&self, plan: &EncodePlan, _color: &ColorTags, _sar: Option<Rational>) -> Result<EncodeInvocation> {
        let mut env = HashMap::new();
        env.insert("encoder_exe".to_owned(), self.encoder_exe.to_string_lossy().into_owned());
        env.insert("input_filepath".to_owned(), plan.input_filepath.to_string_lossy().into_owned());
        env.insert("output_path".to_owned(), plan.output_path.to_string_lossy().into_owned());
        let argv = template::substitute_list(&plan.encoder_argv_template, &env)?;
        let argv = append_hdr10_flags(argv.into_iter().map(OsString::from).collect(), plan);
        Ok(EncodeInvocation::Direct(argv))
    }

    fn progress_regex(&self) -> &Regex {
        &self.progress_re
    }

    fn parse_progress(&self, line: &str) -> Option<ProgressSample> {
        let caps = self.progress_re.captures(line)?;
        Some(ProgressSample {
            encoded_frames: caps.name("frames")?.as_str().parse().ok()?,
            fps: caps.name("fps").and_then(|m| m.as_str().parse().ok()),
            kbit_per_s: caps.name("kbps").and_then(|m| m.as_str().parse().ok()),
            ..Default::default()
        })
    }
}

pub struct FrameServerNvenc {
    pub inner: FrameServerX26x,
}

impl VideoEncodeBackend for FrameServerNvenc {
    fn build_invocation(&self, plan: &EncodePlan, color: &ColorTags, sar: Option<Rational>) -> Result<EncodeInvocation> {
        self.inner.build_invocation(plan, color, sar)
    }

    fn progress_regex(&self) -> &Regex {
        self.inner.progress_regex()
    }

    fn parse_progress(&self, line: &str) -> Option<ProgressSample> {
        self.inner.parse_progress(line)
    }
}

/// Maximum number of restarts on anomalous completion (exit 0 but
/// `encoded_frames != total`) before it is treated as fatal (spec §4.7).
const MAX_ANOMALOUS_RETRIES: u32 = 2;

/// Run a single-shot encode through `backend`, retrying on anomalous
/// completion up to [`MAX_ANOMALOUS_RETRIES`] times.
pub fn encode(backend: &dyn VideoEncodeBackend, plan: &EncodePlan, expected_frames: u64) -> Result<EncodeResult> {
    if plan.method == VideoTranscodingMethod::X264 && plan.hdr10.is_some() {
        return Err(OrchestratorError::config("AVC (x264) encoding rejects HDR inputs"));
    }

    let color = resolve_color_tags(plan);
    let sar = resolve_sar(plan);
    let invocation = backend.build_invocation(plan, &color, sar)?;

    let mut attempt = 0;
    loop {
        let last_sample = std::cell::RefCell::new(ProgressSample::default());
        let backend_ref = backend;
        let handler: Box<dyn FnMut(&str) + Send> = Box::new(|line: &str| {
            if let Some(sample) = backend_ref.parse_progress(line) {
                *last_sample.borrow_mut() = sample;
            }
        });

        let info = match &invocation {
            EncodeInvocation::Direct(argv) => tool_invoker::run(argv, &[], None, None, ExitPolicy::default(), vec![], vec![handler])?,
            EncodeInvocation::Piped { producer_argv, consumer_argv } => {
                tool_invoker::run_piped(producer_argv, consumer_argv, &[], None, ExitPolicy::default(), vec![], vec![handler])?
            }
        };
        tool_invoker::require_ok("video_encoder", info)?;

        let sample = last_sample.into_inner();
        if sample.encoded_frames == expected_frames || sample.encoded_frames == 0 {
            return Ok(EncodeResult {
                output_path: plan.output_path.clone(),
                avg_fps: sample.fps.unwrap_or(0.0),
                avg_bitrate_kbps: sample.kbit_per_s.unwrap_or(0.0),
            });
        }

        attempt += 1;
        if attempt > MAX_ANOMALOUS_RETRIES {
            return Err(OrchestratorError::Integrity {
                expected: expected_frames as usize,
                actual: sample.encoded_frames as usize,
            });
        }
        log::warn!(
            "anomalous encoder completion (expected {expected_frames}, got {}), retrying (attempt {attempt})",
            sample.encoded_frames
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_plan() -> EncodePlan {
        EncodePlan {
            input_filepath: PathBuf::from("/in.mkv"),
            output_path: PathBuf::from("/out.265"),
            width: 1920,
            height: 1080,
            bit_depth: 8,
            input_frame_rate_mode: FrameRateMode::Cfr,
            input_fps: Rational::new(24000, 1001),
            input_original_fps: Rational::new(24000, 1001),
            output_frame_rate_mode: FrameRateMode::Cfr,
            requested_output_fps_numerator: None,
            timecode_filepath: None,
            first_frame_index: NO_TRIM,
            last_frame_index: NO_TRIM,
            input_full_range: false,
            output_full_range: false,
            input_color: ColorTags {
                matrix: ColorMatrix::Bt709,
                primaries: ColorPrimaries::Bt709,
                transfer: Transfer::Bt709,
            },
            output_sar: "unchange".to_owned(),
            source_sar: Rational::new(1, 1),
            hdr10: None,
            encoder_argv_template: vec![],
            frame_server_template: None,
            method: VideoTranscodingMethod::X265,
        }
    }

    #[test]
    fn cfr_to_cfr_empty_request_keeps_source_fps() {
        let plan = base_plan();
        let (mode, fps) = resolve_output_fps(&plan).unwrap();
        assert_eq!(mode, FrameRateMode::Cfr);
        assert_eq!(fps, plan.input_fps);
    }

    #[test]
    fn cfr_to_cfr_nfps_rescales_against_ntsc_source() {
        let mut plan = base_plan();
        plan.requested_output_fps_numerator = Some(30);
        let (_, fps) = resolve_output_fps(&plan).unwrap();
        assert_eq!(fps, Rational::new(30000, 1001));
    }

    #[test]
    fn vfr_output_from_cfr_input_is_rejected() {
        let mut plan = base_plan();
        plan.output_frame_rate_mode = FrameRateMode::Vfr;
        assert!(resolve_output_fps(&plan).is_err());
    }

    #[test]
    fn vfr_to_vfr_passes_source_fps_through() {
        let mut plan = base_plan();
        plan.input_frame_rate_mode = FrameRateMode::Vfr;
        plan.output_frame_rate_mode = FrameRateMode::Vfr;
        let (mode, fps) = resolve_output_fps(&plan).unwrap();
        assert_eq!(mode, FrameRateMode::Vfr);
        assert_eq!(fps, plan.input_fps);
    }

    #[test]
    fn cfr_output_from_vfr_input_uses_original_fps() {
        let mut plan = base_plan();
        plan.input_frame_rate_mode = FrameRateMode::Vfr;
        plan.input_original_fps = Rational::new(24, 1);
        let (_, fps) = resolve_output_fps(&plan).unwrap();
        assert_eq!(fps, Rational::new(24, 1));
    }

    #[test]
    fn sar_unchanged_and_unity_passes_none() {
        let plan = base_plan();
        assert_eq!(resolve_sar(&plan), None);
    }

    #[test]
    fn sar_unchanged_and_non_unity_passes_source() {
        let mut plan = base_plan();
        plan.source_sar = Rational::new(4, 3);
        assert_eq!(resolve_sar(&plan), Some(Rational::new(4, 3)));
    }

    #[test]
    fn explicit_sar_overrides_source() {
        let mut plan = base_plan();
        plan.output_sar = "16:9".to_owned();
        assert_eq!(resolve_sar(&plan), Some(Rational::new(16, 9)));
    }

    #[test]
    fn hdr10_flags_contain_fixed_bt2020_primaries_and_scaled_luminance() {
        let hdr = Hdr10Metadata {
            mdcp: (Rational::new(1, 1), Rational::new(1, 1), Rational::new(1, 1), Rational::new(1, 1)),
            min_mdl: 1,
            max_mdl: 1000,
            max_cll: 1000,
            max_fall: 400,
        };
        let flags = hdr10_flags(&hdr, false);
        assert!(flags[1].contains("WP(15635,16450)"));
        assert!(flags[1].contains("L(10000000,10000)"));
        assert_eq!(flags[3], "1000,400");
    }

    #[test]
    fn x264_rejects_hdr() {
        let mut plan = base_plan();
        plan.method = VideoTranscodingMethod::X264;
        plan.hdr10 = Some(Hdr10Metadata {
            mdcp: (Rational::new(1, 1), Rational::new(1, 1), Rational::new(1, 1), Rational::new(1, 1)),
            min_mdl: 1,
            max_mdl: 1000,
            max_cll: 1000,
            max_fall: 400,
        });
        let backend = FrameServerX26x::new(PathBuf::from("/bin/x264"), PathBuf::from("/bin/vspipe"), FrameServer::Vapoursynth);
        assert!(encode(&backend, &plan, 100).is_err());
    }

    #[test]
    fn direct_backend_appends_hdr10_flags_when_present() {
        let mut plan = base_plan();
        plan.hdr10 = Some(Hdr10Metadata {
            mdcp: (Rational::new(1, 1), Rational::new(1, 1), Rational::new(1, 1), Rational::new(1, 1)),
            min_mdl: 1,
            max_mdl: 1000,
            max_cll: 1000,
            max_fall: 400,
        });
        let backend = DirectNvenc::new(PathBuf::from("/bin/x265"));
        let color = resolve_color_tags(&plan);
        let invocation = backend.build_invocation(&plan, &color, None).unwrap();
        let EncodeInvocation::Direct(argv) = invocation else {
            panic!("expected a direct invocation");
        };
        assert!(argv.iter().any(|a| a == "--master-display"));
        assert!(argv.iter().any(|a| a == "--max-cll"));
    }

    #[test]
    fn frame_server_backend_builds_a_piped_invocation() {
        let mut plan = base_plan();
        plan.frame_server_template = Some("# {{input_filepath}} {{output_fps_num}}/{{output_fps_den}}".to_owned());
        plan.output_path = std::env::temp_dir().join("orchestrator-core-test-frame-server-invocation.265");
        let backend = FrameServerX26x::new(PathBuf::from("/bin/x265"), PathBuf::from("/bin/vspipe"), FrameServer::Vapoursynth);
        let color = resolve_color_tags(&plan);
        let invocation = backend.build_invocation(&plan, &color, None).unwrap();
        let EncodeInvocation::Piped { producer_argv, consumer_argv } = invocation else {
            panic!("expected a piped invocation");
        };
        assert_eq!(producer_argv[0], "/bin/vspipe");
        assert!(consumer_argv.iter().any(|a| a == "-"));
        let script_path = plan.output_path.with_extension("vpy");
        assert!(script_path.exists());
        let _ = std::fs::remove_file(script_path);
    }
}
