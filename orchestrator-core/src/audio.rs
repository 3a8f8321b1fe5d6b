//! AudioTranscoder (C6): dispatch to a codec-specific encoder (spec §4.6).
//!
//! Grounded on `av1an-core::ffmpeg::encode_audio`'s `Command`-based audio
//! encode and the teacher's `Encoder` `strum` enum pattern, generalized to
//! a closed [`crate::state::enums::AudioCodec`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{OrchestratorError, Result};
use crate::template;
use crate::tool_invoker::{self, ExitPolicy};

const OPUS_NATIVE_EXTENSIONS: &[&str] = &[".opus", ".flac", ".wav"];

#[derive(Debug, Clone)]
pub struct AudioTranscodeRequest {
    pub encoder_exe: PathBuf,
    pub decoder_exe: Option<PathBuf>,
    pub input_audio_path: PathBuf,
    pub output_path: PathBuf,
    pub argv_template: Vec<String>,
    pub ffmpeg_wav_audio_codec: String,
    pub delete_input: bool,
}

fn pcm_codec_for_bit_depth(bit_depth: i64) -> &'static str {
    if bit_depth <= 16 {
        "pcm_s16le"
    } else {
        // caller substitutes the exact depth into `pcm_s{depth}le`; 16 is
        // the only special-cased width (spec §4.6)
        "pcm_s24le"
    }
}

/// `true` when the source extension is one Opus can ingest without a FLAC
/// intermediate (spec §4.6).
fn is_opus_native_source(input: &Path) -> bool {
    let ext = input
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    OPUS_NATIVE_EXTENSIONS.contains(&ext.as_str())
}

fn is_opus_source(input: &Path) -> bool {
    input
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("opus"))
        .unwrap_or(false)
}

/// Render `argv_template` against `request`'s placeholder environment and
/// run it, returning the produced output path.
fn run_codec_argv(request: &AudioTranscodeRequest) -> Result<PathBuf> {
    let mut env = HashMap::new();
    env.insert("encoder_exe".to_owned(), request.encoder_exe.to_string_lossy().into_owned());
    if let Some(decoder) = &request.decoder_exe {
        env.insert("decoder_exe".to_owned(), decoder.to_string_lossy().into_owned());
    }
    env.insert("input_audio_path".to_owned(), request.input_audio_path.to_string_lossy().into_owned());
    env.insert("output_path".to_owned(), request.output_path.to_string_lossy().into_owned());
    env.insert("ffmpeg_wav_audio_codec".to_owned(), request.ffmpeg_wav_audio_codec.clone());

    let argv = template::substitute_list(&request.argv_template, &env)?;
    let info = tool_invoker::run(&argv, &[], None, None, ExitPolicy::default(), vec![], vec![])?;
    tool_invoker::require_ok("audio_transcode", info)?;

    if request.delete_input && request.input_audio_path != request.output_path {
        let _ = std::fs::remove_file(&request.input_audio_path);
    }

    Ok(request.output_path.clone())
}

/// Runs the re-encode leg of an Opus source through a genuine two-process
/// `opus-decode | opus-encode` pipe: the decoder writes raw PCM to its
/// stdout, which is wired directly into the encoder's stdin, so re-encode
/// options (bitrate, channel layout) take effect without a lossy on-disk
/// intermediate (spec §4.6).
fn run_decode_encode_pipe(decoder_exe: &Path, request: &AudioTranscodeRequest) -> Result<PathBuf> {
    let producer_argv = vec![
        decoder_exe.to_string_lossy().into_owned(),
        request.input_audio_path.to_string_lossy().into_owned(),
        "-".to_owned(),
    ];

    let mut env = HashMap::new();
    env.insert("encoder_exe".to_owned(), request.encoder_exe.to_string_lossy().into_owned());
    env.insert("input_audio_path".to_owned(), "-".to_owned());
    env.insert("output_path".to_owned(), request.output_path.to_string_lossy().into_owned());
    env.insert("ffmpeg_wav_audio_codec".to_owned(), request.ffmpeg_wav_audio_codec.clone());
    let consumer_argv = template::substitute_list(&request.argv_template, &env)?;

    let info = tool_invoker::run_piped(&producer_argv, &consumer_argv, &[], None, ExitPolicy::default(), vec![], vec![])?;
    tool_invoker::require_ok("audio_transcode", info)?;

    if request.delete_input && request.input_audio_path != request.output_path {
        let _ = std::fs::remove_file(&request.input_audio_path);
    }

    Ok(request.output_path.clone())
}

/// Opus encode. If the source isn't already Opus/FLAC/WAV, a FLAC
/// intermediate is produced first. If the source is already Opus, it is
/// decoded then re-encoded through a genuine `opus-decode | opus-encode`
/// pipe so re-encode options take effect (spec §4.6).
pub fn to_opus(request: AudioTranscodeRequest, flac_encoder_exe: &Path) -> Result<PathBuf> {
    if is_opus_source(&request.input_audio_path) {
        let decoder_exe = request
            .decoder_exe
            .as_deref()
            .ok_or_else(|| OrchestratorError::config("re-encoding an opus source requires decoder_exe"))?;
        return run_decode_encode_pipe(decoder_exe, &request);
    }
    let mut request = request;
    if !is_opus_native_source(&request.input_audio_path) {
        let flac_intermediate = request.input_audio_path.with_extension("flac");
        let flac_request = AudioTranscodeRequest {
            encoder_exe: flac_encoder_exe.to_path_buf(),
            decoder_exe: None,
            input_audio_path: request.input_audio_path.clone(),
            output_path: flac_intermediate.clone(),
            argv_template: vec![
                "{{encoder_exe}}".to_owned(),
                "{{input_audio_path}}".to_owned(),
                "-o".to_owned(),
                "{{output_path}}".to_owned(),
            ],
            ffmpeg_wav_audio_codec: String::new(),
            delete_input: request.delete_input,
        };
        run_codec_argv(&flac_request)?;
        request.input_audio_path = flac_intermediate;
    }
    run_codec_argv(&request)
}

/// FLAC/AAC encode: 16-bit sources go via PCM s16le, higher bit depths via
/// `pcm_s{depth}le` (spec §4.6).
pub fn to_flac(mut request: AudioTranscodeRequest, source_bit_depth: i64) -> Result<PathBuf> {
    request.ffmpeg_wav_audio_codec = pcm_codec_for_depth(source_bit_depth);
    run_codec_argv(&request)
}

pub fn to_aac(mut request: AudioTranscodeRequest, source_bit_depth: i64) -> Result<PathBuf> {
    request.ffmpeg_wav_audio_codec = pcm_codec_for_depth(source_bit_depth);
    run_codec_argv(&request)
}

fn pcm_codec_for_depth(bit_depth: i64) -> String {
    if bit_depth <= 16 {
        "pcm_s16le".to_owned()
    } else {
        format!("pcm_s{bit_depth}le")
    }
}

/// Container/format change without re-encoding, via the generic tool
/// (e.g. to WAV).
pub fn passthrough_convert(request: AudioTranscodeRequest) -> Result<PathBuf> {
    run_codec_argv(&request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opus_native_extensions_recognized() {
        assert!(is_opus_native_source(Path::new("a.flac")));
        assert!(is_opus_native_source(Path::new("a.WAV")));
        assert!(!is_opus_native_source(Path::new("a.aac")));
    }

    #[test]
    fn pcm_codec_routes_by_bit_depth() {
        assert_eq!(pcm_codec_for_depth(16), "pcm_s16le");
        assert_eq!(pcm_codec_for_depth(24), "pcm_s24le");
        assert_eq!(pcm_codec_for_bit_depth(16), "pcm_s16le");
    }

    #[test]
    fn opus_source_detected() {
        assert!(is_opus_source(Path::new("track.opus")));
        assert!(!is_opus_source(Path::new("track.flac")));
    }
}
