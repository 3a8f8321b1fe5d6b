//! Shared progress-line parsing helpers.
//!
//! Grounded on `av1an-core::parse`'s per-backend stderr progress regexes
//! (`parse_aom_vpx_frames` and siblings): small, independently-testable
//! regex extraction functions, one per tool family.

use once_cell::sync::Lazy;
use regex::Regex;

/// Opus encoder progress sample: percent, time, and instantaneous bitrate
/// (spec §4.6).
#[derive(Debug, Clone, PartialEq)]
pub struct OpusProgress {
    pub percent: f64,
    pub time: String,
    pub bitrate_kbps: f64,
}

static OPUS_PROGRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((?P<percent>[\d.]+)%\)\s+(?P<time>[\d:.]+)\s+\[(?P<kbps>[\d.]+) kbit/s\]").unwrap());

pub fn parse_opus_progress(line: &str) -> Option<OpusProgress> {
    let caps = OPUS_PROGRESS_RE.captures(line)?;
    Some(OpusProgress {
        percent: caps.name("percent")?.as_str().parse().ok()?,
        time: caps.name("time")?.as_str().to_owned(),
        bitrate_kbps: caps.name("kbps")?.as_str().parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_opus_progress_line() {
        let line = "(42.5%) 00:01:23.45 [128.0 kbit/s]";
        let parsed = parse_opus_progress(line).unwrap();
        assert_eq!(parsed.percent, 42.5);
        assert_eq!(parsed.time, "00:01:23.45");
        assert_eq!(parsed.bitrate_kbps, 128.0);
    }

    #[test]
    fn non_matching_line_is_none() {
        assert!(parse_opus_progress("not a progress line").is_none());
    }
}
