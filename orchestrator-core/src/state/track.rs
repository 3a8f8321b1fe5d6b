//! TrackInfo / TrackFile data model (spec §3).
//!
//! Grounded on `av1an-core::chunk::Chunk`'s plain-`pub`-field,
//! `serde`-derived struct style.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};
use crate::state::enums::{ColorMatrix, ColorPrimaries, ColorRange, FrameRateMode, Transfer};
use crate::state::rational::Rational;

/// Fields common to every elementary stream, regardless of kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackCommon {
    /// Non-negative, unique within its container.
    pub track_id: i64,
    /// Codec short name, e.g. `"hevc"`, `"aac"`, `"pgs"`.
    pub format: String,
    /// Positive, or `-1` for unknown.
    pub duration_ms: i64,
    /// Positive, or `-1` for unknown.
    pub bitrate_bps: i64,
    /// Millisecond offset relative to container zero; may be negative.
    pub delay_ms: i64,
    /// Positive, or `-1` for unknown.
    pub stream_size_bytes: i64,
    pub title: String,
    /// ISO-639 code, or empty.
    pub language: String,
    pub default: bool,
    pub forced: bool,
}

impl TrackCommon {
    pub fn validate(&self) -> Result<()> {
        if self.track_id < 0 {
            return Err(OrchestratorError::range(self.track_id, "track_id >= 0"));
        }
        for (name, value) in [
            ("duration_ms", self.duration_ms),
            ("bitrate_bps", self.bitrate_bps),
            ("stream_size_bytes", self.stream_size_bytes),
        ] {
            if value != -1 && value <= 0 {
                return Err(OrchestratorError::range(
                    value,
                    format!("{name} > 0 or == -1"),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Hdr10Metadata {
    pub mdcp: (Rational, Rational, Rational, Rational),
    pub min_mdl: i64,
    pub max_mdl: i64,
    pub max_cll: i64,
    pub max_fall: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoTrack {
    pub common: TrackCommon,
    pub width: u32,
    pub height: u32,
    pub frame_rate_mode: FrameRateMode,
    pub frame_rate: Rational,
    pub original_frame_rate: Rational,
    /// Positive.
    pub frame_count: u64,
    pub color_range: ColorRange,
    pub color_matrix: ColorMatrix,
    pub color_primaries: ColorPrimaries,
    pub transfer: Transfer,
    pub chroma_subsampling: String,
    pub bit_depth: u8,
    pub sample_aspect_ratio: Rational,
    pub hdr10: Option<Hdr10Metadata>,
}

impl VideoTrack {
    pub fn validate(&self) -> Result<()> {
        self.common.validate()?;
        if self.width == 0 {
            return Err(OrchestratorError::range(self.width, "width > 0"));
        }
        if self.height == 0 {
            return Err(OrchestratorError::range(self.height, "height > 0"));
        }
        if self.frame_count == 0 {
            return Err(OrchestratorError::range(self.frame_count, "frame_count > 0"));
        }
        if self.bit_depth == 0 {
            return Err(OrchestratorError::range(self.bit_depth, "bit_depth > 0"));
        }
        Ok(())
    }

    pub fn is_hdr(&self) -> bool {
        self.hdr10.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioTrack {
    pub common: TrackCommon,
    /// Positive, or `-1` for unknown (see Open Question 3 in spec §9).
    pub bit_depth: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub common: TrackCommon,
}

/// A single chapter entry. `start_time` is `HH:MM:SS.mmm`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub start_time: String,
    pub end_time: Option<String>,
    pub title: String,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuTrack {
    pub common: TrackCommon,
    pub entries: Vec<ChapterEntry>,
}

impl MenuTrack {
    /// Validate that `start_time` is non-decreasing across entries (spec §3).
    pub fn validate(&self) -> Result<()> {
        self.common.validate()?;
        for pair in self.entries.windows(2) {
            if pair[1].start_time < pair[0].start_time {
                return Err(OrchestratorError::config(format!(
                    "chapter start_time must be non-decreasing: {} then {}",
                    pair[0].start_time, pair[1].start_time
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrackInfo {
    Video(VideoTrack),
    Audio(AudioTrack),
    Subtitle(SubtitleTrack),
    Menu(MenuTrack),
}

impl TrackInfo {
    pub fn common(&self) -> &TrackCommon {
        match self {
            Self::Video(t) => &t.common,
            Self::Audio(t) => &t.common,
            Self::Subtitle(t) => &t.common,
            Self::Menu(t) => &t.common,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Video(t) => t.validate(),
            Self::Audio(t) => t.common.validate(),
            Self::Subtitle(t) => t.common.validate(),
            Self::Menu(t) => t.validate(),
        }
    }
}

/// A [`TrackInfo`] bound to a filesystem path. `filepath` is checked to
/// exist at bind time (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackFile {
    pub info: TrackInfo,
    pub filepath: PathBuf,
}

impl TrackFile {
    pub fn bind(info: TrackInfo, filepath: impl Into<PathBuf>) -> Result<Self> {
        let filepath = filepath.into();
        if !filepath.exists() {
            return Err(OrchestratorError::not_found(filepath.display().to_string()));
        }
        Ok(Self { info, filepath })
    }

    pub fn path(&self) -> &Path {
        &self.filepath
    }
}

/// Container-level metadata returned by [`crate::title_pipeline`]'s probe
/// step (see `probe` module contract in spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub tracks: Vec<TrackInfo>,
    pub attachment_filenames: Vec<String>,
    pub writing_application: String,
}
