//! Reduced-rational helpers shared by frame-rate and SAR handling.
//!
//! Grounded on `av1an-core`'s numeric option handling style: small, pure,
//! heavily unit-tested free functions rather than a generic `Ratio` newtype
//! wrapper, since only a handful of operations (reduce, rescale, the three
//! NTSC fixups) are ever needed.

use std::fmt;

use num_integer::Integer;
use serde::{Deserialize, Serialize};

/// A reduced `num/den` rational, as used for frame rates and SAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    pub const fn new_unreduced(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    /// Construct and reduce to lowest terms, then apply the three
    /// NTSC fixups mandated by spec §3/§4.2:
    /// `23976/1000 -> 24000/1001`, `29970/1000 -> 30000/1001`,
    /// `59940/1000 -> 60000/1001`.
    pub fn new(num: i64, den: i64) -> Self {
        reduce(num, den).fixup_ntsc()
    }

    pub fn is_unity(&self) -> bool {
        self.num == self.den
    }

    fn fixup_ntsc(self) -> Self {
        match (self.num, self.den) {
            (23976, 1000) => Self { num: 24000, den: 1001 },
            (29970, 1000) => Self { num: 30000, den: 1001 },
            (59940, 1000) => Self { num: 60000, den: 1001 },
            _ => self,
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Reduce `num/den` to lowest terms. Idempotent: `reduce(reduce(x)) ==
/// reduce(x)` (spec §8 invariant 2), and normalizes a negative denominator
/// into the numerator's sign.
pub fn reduce(num: i64, den: i64) -> Rational {
    assert!(den != 0, "zero denominator");
    let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
    let g = num.gcd(&den).max(1);
    Rational {
        num: num / g,
        den: den / g,
    }
}

/// Rescale an `Nfps` request against a source frame rate, per the
/// output-FPS resolution table in spec §4.7: `N*1000/1001` if the source
/// denominator is 1001, else a plain `N/1`.
pub fn rescale_fps(target_fps_numerator: i64, source: Rational) -> Rational {
    if source.den == 1001 {
        Rational::new(target_fps_numerator * 1000, 1001)
    } else {
        Rational::new(target_fps_numerator, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_to_lowest_terms() {
        assert_eq!(reduce(48000, 2002), Rational { num: 24000, den: 1001 });
    }

    #[test]
    fn ntsc_fixups_apply() {
        assert_eq!(Rational::new(23976, 1000), Rational { num: 24000, den: 1001 });
        assert_eq!(Rational::new(29970, 1000), Rational { num: 30000, den: 1001 });
        assert_eq!(Rational::new(59940, 1000), Rational { num: 60000, den: 1001 });
    }

    #[test]
    fn normalize_is_idempotent() {
        for (n, d) in [(23976, 1000), (30, 1), (24000, 1001), (59940, 1000)] {
            let once = Rational::new(n, d);
            let twice = Rational::new(once.num, once.den);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn rescale_applies_drop_frame_when_source_is_ntsc() {
        let source = Rational::new(24000, 1001);
        assert_eq!(rescale_fps(30, source), Rational::new(30000, 1001));
    }

    #[test]
    fn rescale_is_plain_when_source_is_integral() {
        let source = Rational::new(25, 1);
        assert_eq!(rescale_fps(30, source), Rational::new(30, 1));
    }
}
