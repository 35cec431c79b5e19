//! Small value types shared across the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rational number, used for sample aspect ratios.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    /// Square pixels.
    pub const ONE: Self = Self { num: 1, den: 1 };

    pub fn new(num: u32, den: u32) -> Self {
        assert!(den > 0, "Rational denominator must be > 0");
        Self { num, den }
    }

    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.num, self.den)
    }
}

/// Video frame rate as reported by the bitstream.
///
/// `fixed` is false when the stream declares a variable frame rate; in
/// that case `fps`/`fps_num`/`fps_den` describe the nominal rate only.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameRate {
    pub fixed: bool,
    pub fps: f64,
    pub fps_num: u32,
    pub fps_den: u32,
}

impl FrameRate {
    /// Fallback applied when a stream carries no usable timing info.
    pub const DEFAULT_23_976: Self = Self {
        fixed: true,
        fps: 23.976,
        fps_num: 23976,
        fps_den: 1000,
    };

    pub fn new(fps_num: u32, fps_den: u32, fixed: bool) -> Self {
        Self {
            fixed,
            fps: fps_num as f64 / fps_den as f64,
            fps_num,
            fps_den,
        }
    }

    /// True when the numerator or denominator is unusable.
    pub fn is_degenerate(self) -> bool {
        self.fps_num == 0 || self.fps_den == 0
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::DEFAULT_23_976
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fps_den == 1 {
            write!(f, "{}", self.fps_num)
        } else {
            write!(f, "{}/{}", self.fps_num, self.fps_den)
        }
    }
}
