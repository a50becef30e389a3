//! Colors and the color distance metric shared by every keying engine.
//!
//! There is exactly one metric in the engine: Euclidean distance in RGB
//! space (range `0..=441.7`). User thresholds are percentages in
//! `1..=100` and are scaled by [`THRESHOLD_SCALE`] onto the per-channel
//! `0..=255` range before comparison, so a threshold of 100 matches
//! colors up to 255 units apart (not the full RGB diagonal).

use std::fmt;
use std::str::FromStr;

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::types::EngineError;

/// Multiplier mapping a `1..=100` user threshold onto RGB distance units.
pub const THRESHOLD_SCALE: f32 = 2.55;

/// An opaque RGB color with 8-bit channels.
///
/// Serialized as a `#rrggbb` hex string so settings JSON matches what a
/// color picker produces. Parsing also accepts the `#rgb` short form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color {
    /// Pure white.
    pub const WHITE: Self = Self::new(255, 255, 255);
    /// Pure black.
    pub const BLACK: Self = Self::new(0, 0, 0);
    /// Pure red, used for speck highlighting.
    pub const RED: Self = Self::new(255, 0, 0);

    /// Create a color from its channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// The RGB part of a pixel (alpha is dropped).
    #[must_use]
    pub const fn from_pixel(pixel: Rgba<u8>) -> Self {
        let [r, g, b, _] = pixel.0;
        Self { r, g, b }
    }

    /// This color as a pixel with the given alpha.
    #[must_use]
    pub const fn with_alpha(self, alpha: u8) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, alpha])
    }

    /// Rec. 601 luma: `0.299*R + 0.587*G + 0.114*B`, in `0.0..=255.0`.
    #[must_use]
    pub fn luminance(self) -> f32 {
        luminance(self.r, self.g, self.b)
    }

    /// Lowercase `#rrggbb` form.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Parse `#rrggbb` or `#rgb` (surrounding whitespace is ignored).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidColor`] if the string has no `#`
    /// prefix, the wrong length, or non-hex digits.
    pub fn from_hex(s: &str) -> Result<Self, EngineError> {
        let s = s.trim();
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| EngineError::InvalidColor(format!("not a hex color: {s:?}")))?;
        match hex.len() {
            3 => {
                let mut rgb = [0u8; 3];
                for (slot, ch) in rgb.iter_mut().zip(hex.chars()) {
                    let n = ch
                        .to_digit(16)
                        .ok_or_else(|| EngineError::InvalidColor(format!("invalid hex char: {ch}")))?;
                    #[expect(clippy::cast_possible_truncation)]
                    {
                        *slot = (n * 17) as u8;
                    }
                }
                Ok(Self::new(rgb[0], rgb[1], rgb[2]))
            }
            6 if hex.is_ascii() => {
                let r = u8::from_str_radix(&hex[0..2], 16);
                let g = u8::from_str_radix(&hex[2..4], 16);
                let b = u8::from_str_radix(&hex[4..6], 16);
                match (r, g, b) {
                    (Ok(r), Ok(g), Ok(b)) => Ok(Self::new(r, g, b)),
                    _ => Err(EngineError::InvalidColor(format!("invalid hex color: {s:?}"))),
                }
            }
            _ => Err(EngineError::InvalidColor(format!(
                "unexpected hex length: {s:?}"
            ))),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Color {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for Color {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// Rec. 601 luma of an RGB triple.
#[must_use]
pub fn luminance(r: u8, g: u8, b: u8) -> f32 {
    0.114f32.mul_add(
        f32::from(b),
        0.299f32.mul_add(f32::from(r), 0.587 * f32::from(g)),
    )
}

/// Squared Euclidean RGB distance.
#[must_use]
pub fn distance_squared(a: Color, b: Color) -> f32 {
    let dr = f32::from(a.r) - f32::from(b.r);
    let dg = f32::from(a.g) - f32::from(b.g);
    let db = f32::from(a.b) - f32::from(b.b);
    dr.mul_add(dr, dg.mul_add(dg, db * db))
}

/// Euclidean RGB distance. Symmetric, zero iff the colors are equal.
#[must_use]
pub fn distance(a: Color, b: Color) -> f32 {
    distance_squared(a, b).sqrt()
}

/// Map a `1..=100` user threshold onto RGB distance units.
#[must_use]
pub fn scaled_threshold(threshold: u8) -> f32 {
    f32::from(threshold) * THRESHOLD_SCALE
}

/// Matches non-transparent pixels within a threshold of one target color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatcher {
    target: Color,
    max_distance_sq: f32,
}

impl ColorMatcher {
    /// Matcher for `target` with a `1..=100` user threshold.
    #[must_use]
    pub fn new(target: Color, threshold: u8) -> Self {
        let max = scaled_threshold(threshold);
        Self {
            target,
            max_distance_sq: max * max,
        }
    }

    /// The color this matcher keys on.
    #[must_use]
    pub const fn target(&self) -> Color {
        self.target
    }

    /// `true` if the pixel has `alpha > 0` and is within threshold.
    #[must_use]
    pub fn matches(&self, pixel: Rgba<u8>) -> bool {
        pixel.0[3] > 0 && distance_squared(Color::from_pixel(pixel), self.target) <= self.max_distance_sq
    }
}

/// A set of matchers; a pixel matches if ANY member matches.
///
/// Members are tried in insertion order and the first hit wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeySet(Vec<ColorMatcher>);

impl KeySet {
    /// Build from a list of matchers.
    #[must_use]
    pub const fn new(matchers: Vec<ColorMatcher>) -> Self {
        Self(matchers)
    }

    /// `true` if no target colors are configured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The configured matchers.
    #[must_use]
    pub fn matchers(&self) -> &[ColorMatcher] {
        &self.0
    }

    /// `true` if any matcher accepts the pixel.
    #[must_use]
    pub fn matches(&self, pixel: Rgba<u8>) -> bool {
        self.0.iter().any(|m| m.matches(pixel))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_long_hex() {
        assert_eq!(Color::from_hex("#1a2b3c").unwrap(), Color::new(0x1a, 0x2b, 0x3c));
    }

    #[test]
    fn parse_short_hex_expands_digits() {
        assert_eq!(Color::from_hex(" #fa0 ").unwrap(), Color::new(255, 170, 0));
    }

    #[test]
    fn parse_rejects_missing_hash_and_bad_digits() {
        assert!(matches!(Color::from_hex("ffffff"), Err(EngineError::InvalidColor(_))));
        assert!(matches!(Color::from_hex("#gggggg"), Err(EngineError::InvalidColor(_))));
        assert!(matches!(Color::from_hex("#ffff"), Err(EngineError::InvalidColor(_))));
    }

    #[test]
    fn hex_round_trips_through_serde() {
        let c = Color::new(1, 128, 255);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "\"#0180ff\"");
        let back: Color = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn distance_is_symmetric_and_zero_for_equal() {
        let a = Color::new(10, 20, 30);
        let b = Color::new(40, 60, 90);
        assert!((distance(a, b) - distance(b, a)).abs() < f32::EPSILON);
        assert!(distance(a, a).abs() < f32::EPSILON);
        assert!(distance(a, b) > 0.0);
    }

    #[test]
    fn distance_black_white_is_rgb_diagonal() {
        let d = distance(Color::BLACK, Color::WHITE);
        assert!((d - 441.673).abs() < 0.01, "got {d}");
    }

    #[test]
    fn matcher_scales_threshold() {
        // threshold 10 -> 25.5 units
        let m = ColorMatcher::new(Color::WHITE, 10);
        assert!(m.matches(Rgba([240, 240, 250, 255])));
        assert!(!m.matches(Rgba([200, 200, 200, 255])));
    }

    #[test]
    fn matcher_ignores_transparent_pixels() {
        let m = ColorMatcher::new(Color::WHITE, 100);
        assert!(!m.matches(Rgba([255, 255, 255, 0])));
    }

    #[test]
    fn key_set_matches_any_member() {
        let keys = KeySet::new(vec![
            ColorMatcher::new(Color::WHITE, 1),
            ColorMatcher::new(Color::new(0, 255, 0), 1),
        ]);
        assert!(keys.matches(Rgba([0, 255, 0, 255])));
        assert!(keys.matches(Rgba([255, 255, 255, 255])));
        assert!(!keys.matches(Rgba([0, 0, 255, 255])));
    }

    #[test]
    fn luminance_weights_green_highest() {
        assert!(Color::new(0, 255, 0).luminance() > Color::new(255, 0, 0).luminance());
        assert!(Color::new(255, 0, 0).luminance() > Color::new(0, 0, 255).luminance());
        assert!((Color::WHITE.luminance() - 255.0).abs() < 0.01);
    }
}
