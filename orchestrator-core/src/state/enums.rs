//! Closed enumerations named in spec §4.11/§9's glossary of allowed option
//! sets, in the teacher's `strum::EnumString` + `IntoStaticStr` style (see
//! `av1an-core::encoder::Encoder`, `av1an-core::concat::ConcatMethod`).

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum PackageFormat {
    Mkv,
    Mp4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum FrameServer {
    Vapoursynth,
    Avisynth,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
pub enum VideoTranscodingMethod {
    #[strum(serialize = "x265")]
    X265,
    #[strum(serialize = "x264")]
    X264,
    #[strum(serialize = "nvenc")]
    Nvenc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFrameRateMode {
    Cfr,
    Vfr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum OutputDynamicRangeMode {
    Sdr,
    Hdr10,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum PriorOption {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ProcessOption {
    Copy,
    Transcode,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum FrameRateMode {
    Cfr,
    Vfr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ColorRange {
    Full,
    Limited,
}

/// Encoder-side color tags. See the glossary and §4.2's derivation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ColorMatrix {
    #[strum(serialize = "bt601")]
    Bt601,
    #[strum(serialize = "bt709")]
    Bt709,
    #[strum(serialize = "bt2020nc")]
    Bt2020Nc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ColorPrimaries {
    #[strum(serialize = "smpte170m")]
    Smpte170M,
    #[strum(serialize = "bt709")]
    Bt709,
    #[strum(serialize = "bt2020")]
    Bt2020,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Transfer {
    #[strum(serialize = "smpte170m")]
    Smpte170M,
    #[strum(serialize = "bt709")]
    Bt709,
    #[strum(serialize = "smpte2084")]
    Smpte2084,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ChapterFormat {
    Matroska,
    Ogm,
    Pot,
    Simple,
    Tab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum AudioCodec {
    Flac,
    Opus,
    Aac,
    /// Container/format change without re-encoding.
    Passthrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ContainerKind {
    Mkv,
    Mp4,
    /// MKV/MKA/MKS share the Matroska extractor/muxer codepath.
    Mka,
    Mks,
    Unknown,
}

impl ContainerKind {
    pub fn is_matroska(self) -> bool {
        matches!(self, Self::Mkv | Self::Mka | Self::Mks)
    }
}

/// Exit classification for a tool invocation (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Ok,
    Warn,
    Fail,
}

macro_rules! impl_display_via_static_str {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Display for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.write_str(<&'static str>::from(self))
                }
            }
        )*
    };
}

impl_display_via_static_str!(
    PackageFormat,
    VideoTranscodingMethod,
    ColorMatrix,
    ColorPrimaries,
    Transfer,
    AudioCodec,
    ChapterFormat,
    ContainerKind
);
