use anyhow::{Result, anyhow};
use image::Rgba;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An opaque RGB highlight color, written as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl HighlightColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn with_alpha(self, alpha: u8) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, alpha])
    }
}

impl Default for HighlightColor {
    fn default() -> Self {
        Self::new(0xFF, 0xF1, 0x76)
    }
}

impl FromStr for HighlightColor {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(anyhow!(
                "invalid highlight color '{}' (expected #RRGGBB)",
                value
            ));
        }
        let channel = |idx: usize| u8::from_str_radix(&hex[idx..idx + 2], 16);
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl fmt::Display for HighlightColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl Serialize for HighlightColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Fill used for the highlight rectangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HighlightStyle {
    pub color: HighlightColor,
    pub alpha: u8,
}

impl HighlightStyle {
    pub fn fill(&self) -> Rgba<u8> {
        self.color.with_alpha(self.alpha)
    }
}

impl Default for HighlightStyle {
    fn default() -> Self {
        Self {
            color: HighlightColor::default(),
            alpha: 40,
        }
    }
}
