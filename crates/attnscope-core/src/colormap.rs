//! Per-view color normalization and palette lookup.
//!
//! Palettes are described by a handful of RGBA stops and expanded into a
//! 256-entry lookup table. Tables are built once per palette on first use and
//! cached for the lifetime of the process, the same way the predefined
//! entropy tables are cached elsewhere in the workspace.
//!
//! Normalization is always local to the vector being drawn: min and max are
//! rescanned on every call so that weak layers stay legible.

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Number of entries in a lookup table.
pub const LUT_SIZE: usize = 256;

/// One color stop at position `t` in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub t: f32,
    pub rgba: [u8; 4],
}

const fn stop(t: f32, r: u8, g: u8, b: u8) -> ColorStop {
    ColorStop {
        t,
        rgba: [r, g, b, 255],
    }
}

/// 256-entry RGBA table.
#[derive(Clone, PartialEq, Eq)]
pub struct ColorLut {
    entries: [[u8; 4]; LUT_SIZE],
}

impl ColorLut {
    /// Entry for `bucket`.
    #[inline]
    pub fn get(&self, bucket: u8) -> [u8; 4] {
        self.entries[bucket as usize]
    }

    pub fn entries(&self) -> &[[u8; 4]; LUT_SIZE] {
        &self.entries
    }
}

impl fmt::Debug for ColorLut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColorLut")
            .field("first", &self.entries[0])
            .field("last", &self.entries[LUT_SIZE - 1])
            .finish()
    }
}

/// Expand palette stops into a lookup table.
///
/// Bucket `i` samples `t = i / 255`, finds the stops bracketing `t` and
/// interpolates every channel independently. A stop repeated at the same
/// position makes a hard edge: `t` up to that position resolves in the
/// bracket before it, anything past it in the bracket after. Positions before
/// the first or after the last stop clamp to it.
pub fn build_lut(stops: &[ColorStop]) -> ColorLut {
    let mut entries = [[0u8; 4]; LUT_SIZE];
    let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
        return ColorLut { entries };
    };

    for (i, entry) in entries.iter_mut().enumerate() {
        let t = i as f32 / (LUT_SIZE - 1) as f32;

        if t <= first.t {
            *entry = first.rgba;
            continue;
        }
        if t >= last.t {
            *entry = last.rgba;
            continue;
        }

        let (lo, hi) = stops
            .windows(2)
            .map(|w| (w[0], w[1]))
            .find(|(lo, hi)| lo.t <= t && t <= hi.t)
            .unwrap_or((*last, *last));

        let width = hi.t - lo.t;
        let local = if width > 0.0 { (t - lo.t) / width } else { 0.0 };

        for c in 0..4 {
            let a = lo.rgba[c] as f32;
            let b = hi.rgba[c] as f32;
            entry[c] = (a + (b - a) * local).round().clamp(0.0, 255.0) as u8;
        }
    }

    ColorLut { entries }
}

/// Named palettes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Palette {
    #[default]
    Viridis,
    Inferno,
    Magma,
    Plasma,
    Turbo,
    Grayscale,
}

const VIRIDIS: &[ColorStop] = &[
    stop(0.0, 68, 1, 84),
    stop(0.125, 71, 44, 122),
    stop(0.25, 59, 81, 139),
    stop(0.375, 44, 113, 142),
    stop(0.5, 33, 144, 141),
    stop(0.625, 39, 173, 129),
    stop(0.75, 92, 200, 99),
    stop(0.875, 170, 220, 50),
    stop(1.0, 253, 231, 37),
];

const INFERNO: &[ColorStop] = &[
    stop(0.0, 0, 0, 4),
    stop(0.125, 31, 12, 72),
    stop(0.25, 85, 15, 109),
    stop(0.375, 136, 34, 106),
    stop(0.5, 186, 54, 85),
    stop(0.625, 227, 89, 51),
    stop(0.75, 249, 140, 10),
    stop(0.875, 249, 201, 50),
    stop(1.0, 252, 255, 164),
];

const MAGMA: &[ColorStop] = &[
    stop(0.0, 0, 0, 4),
    stop(0.125, 28, 16, 68),
    stop(0.25, 79, 18, 123),
    stop(0.375, 129, 37, 129),
    stop(0.5, 181, 54, 122),
    stop(0.625, 229, 80, 100),
    stop(0.75, 251, 135, 97),
    stop(0.875, 254, 194, 135),
    stop(1.0, 252, 253, 191),
];

const PLASMA: &[ColorStop] = &[
    stop(0.0, 13, 8, 135),
    stop(0.125, 75, 3, 161),
    stop(0.25, 125, 3, 168),
    stop(0.375, 168, 34, 150),
    stop(0.5, 203, 70, 121),
    stop(0.625, 229, 107, 93),
    stop(0.75, 248, 148, 65),
    stop(0.875, 253, 195, 40),
    stop(1.0, 240, 249, 33),
];

const TURBO: &[ColorStop] = &[
    stop(0.0, 48, 18, 59),
    stop(0.125, 70, 107, 227),
    stop(0.25, 40, 188, 235),
    stop(0.375, 50, 241, 152),
    stop(0.5, 164, 252, 60),
    stop(0.625, 225, 221, 55),
    stop(0.75, 254, 155, 45),
    stop(0.875, 216, 55, 6),
    stop(1.0, 122, 4, 3),
];

const GRAYSCALE: &[ColorStop] = &[stop(0.0, 0, 0, 0), stop(1.0, 255, 255, 255)];

static LUTS: [OnceLock<ColorLut>; Palette::COUNT] = [const { OnceLock::new() }; Palette::COUNT];

impl Palette {
    pub const COUNT: usize = 6;

    pub const ALL: [Palette; Palette::COUNT] = [
        Palette::Viridis,
        Palette::Inferno,
        Palette::Magma,
        Palette::Plasma,
        Palette::Turbo,
        Palette::Grayscale,
    ];

    /// Registered name.
    pub fn name(self) -> &'static str {
        match self {
            Palette::Viridis => "viridis",
            Palette::Inferno => "inferno",
            Palette::Magma => "magma",
            Palette::Plasma => "plasma",
            Palette::Turbo => "turbo",
            Palette::Grayscale => "grayscale",
        }
    }

    /// Color stops defining this palette.
    pub fn stops(self) -> &'static [ColorStop] {
        match self {
            Palette::Viridis => VIRIDIS,
            Palette::Inferno => INFERNO,
            Palette::Magma => MAGMA,
            Palette::Plasma => PLASMA,
            Palette::Turbo => TURBO,
            Palette::Grayscale => GRAYSCALE,
        }
    }

    /// Cached lookup table, built on first access.
    #[inline]
    pub fn lut(self) -> &'static ColorLut {
        LUTS[self as usize].get_or_init(|| build_lut(self.stops()))
    }
}

impl fmt::Display for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Palette {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        Palette::ALL
            .into_iter()
            .find(|p| p.name() == lower)
            .ok_or_else(|| CoreError::UnknownPalette(s.to_string()))
    }
}

/// Min/max rescaling fitted to one vector.
///
/// Scans use strict comparisons, so NaN never becomes the min or max. A
/// zero range (uniform vector) is replaced by 1, which sends every element to
/// bucket 0. Values whose normalized position is NaN also land in bucket 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    min: f32,
    max: f32,
    range: f32,
}

impl Normalizer {
    /// Fit to the values of one view.
    pub fn fit(values: &[f32]) -> Self {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &v in values {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }
        let range = if max > min { max - min } else { 1.0 };
        Self { min, max, range }
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Whether the fitted vector had no spread.
    pub fn is_degenerate(&self) -> bool {
        !(self.max > self.min)
    }

    /// Lookup bucket for `value`: `round(255 * (value - min) / range)` clamped.
    #[inline]
    pub fn bucket(&self, value: f32) -> u8 {
        let scaled = ((value - self.min) / self.range * (LUT_SIZE - 1) as f32).round();
        if scaled.is_nan() {
            0
        } else {
            scaled.clamp(0.0, (LUT_SIZE - 1) as f32) as u8
        }
    }
}

/// Normalize `values` and map them through `lut` into packed RGBA bytes.
///
/// `opacity` (clamped to `[0, 1]`) scales only the alpha channel:
/// `alpha_out = round(alpha_lut * opacity)`.
pub fn normalize_and_map(values: &[f32], lut: &ColorLut, opacity: f32) -> Vec<u8> {
    let normalizer = Normalizer::fit(values);
    map_with(values, &normalizer, lut, opacity)
}

/// Map `values` through `lut` with an already fitted normalizer.
pub fn map_with(values: &[f32], normalizer: &Normalizer, lut: &ColorLut, opacity: f32) -> Vec<u8> {
    let opacity = if opacity.is_nan() { 0.0 } else { opacity.clamp(0.0, 1.0) };
    let mut out = Vec::with_capacity(values.len() * 4);
    for &v in values {
        let [r, g, b, a] = lut.get(normalizer.bucket(v));
        out.extend_from_slice(&[r, g, b, (a as f32 * opacity).round() as u8]);
    }
    out
}
