//! Deterministic per-track color assignment.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// An RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Used when a track reaches a renderer without an assigned color.
    pub const NEUTRAL: Color = Color::rgb(0x80, 0x80, 0x80);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// The inactive-track variant: same hue, mostly transparent.
    pub fn de_emphasized(self) -> Self {
        Self {
            a: (self.a as u16 * 2 / 5) as u8,
            ..self
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

/// Qualitative palette, readable on both satellite and terrain base maps.
pub const DEFAULT_PALETTE: [Color; 10] = [
    Color::rgb(0xe6, 0x19, 0x4b),
    Color::rgb(0x3c, 0xb4, 0x4b),
    Color::rgb(0x43, 0x63, 0xd8),
    Color::rgb(0xf5, 0x82, 0x31),
    Color::rgb(0x91, 0x1e, 0xb4),
    Color::rgb(0x42, 0xd4, 0xf4),
    Color::rgb(0xf0, 0x32, 0xe6),
    Color::rgb(0xbf, 0xef, 0x45),
    Color::rgb(0x46, 0x99, 0x90),
    Color::rgb(0x9a, 0x63, 0x24),
];

/// Hands out palette colors in order, wrapping around.
///
/// One allocator exists per loaded group, so the same load order always
/// yields the same colors.
#[derive(Debug, Clone)]
pub struct ColorAllocator {
    palette: Vec<Color>,
    index: usize,
}

impl ColorAllocator {
    /// Creates an allocator over `palette`; an empty palette falls back to
    /// [`DEFAULT_PALETTE`].
    pub fn new(palette: Vec<Color>) -> Self {
        let palette = if palette.is_empty() {
            warn!("Empty color palette, using the default palette");
            DEFAULT_PALETTE.to_vec()
        } else {
            palette
        };
        Self { palette, index: 0 }
    }

    /// Returns `palette[index % len]` and advances.
    pub fn next_color(&mut self) -> Color {
        let color = self.palette[self.index % self.palette.len()];
        self.index = self.index.wrapping_add(1);
        color
    }

    /// Rewinds to the first palette entry.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn palette(&self) -> &[Color] {
        &self.palette
    }
}

impl Default for ColorAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_PALETTE.to_vec())
    }
}
