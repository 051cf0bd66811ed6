//! Configuration structures and loading logic.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// Smallest/largest accepted font size in pixels.
pub const MIN_FONT_SIZE: f32 = 6.0;
pub const MAX_FONT_SIZE: f32 = 96.0;

/// Line height relative to the font pixel size.
pub const LINE_HEIGHT_FACTOR: f32 = 1.35;

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub font: FontConfig,
    pub colors: ColorConfig,
    pub window: WindowConfig,
}

/// Font configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Nominal glyph size in pixels.
    pub size: f32,
    /// Face files in fallback priority order (primary text face first,
    /// color emoji face last). Empty means discover system defaults.
    pub faces: Vec<PathBuf>,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            size: 17.0,
            faces: Vec::new(),
        }
    }
}

impl FontConfig {
    /// Returns `size` clamped to the supported range.
    pub fn effective_size(&self) -> f32 {
        self.size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
    }

    /// Line advance in pixels.
    pub fn line_height(&self) -> usize {
        (self.effective_size() * LINE_HEIGHT_FACTOR).ceil() as usize
    }
}

/// Foreground/background colors, "#RRGGBB" hex.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub foreground: String,
    pub background: String,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            foreground: "#dcdaac".to_owned(),
            background: "#232323".to_owned(),
        }
    }
}

impl ColorConfig {
    pub fn foreground_rgba(&self) -> [f32; 4] {
        parse_hex_color(&self.foreground).unwrap_or([0.86, 0.85, 0.67, 1.0])
    }

    pub fn background_rgba(&self) -> [f32; 4] {
        parse_hex_color(&self.background).unwrap_or([0.14, 0.14, 0.14, 1.0])
    }
}

/// Initial window dimensions in logical pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
        }
    }
}

impl Config {
    /// Load `folio.toml` from the working directory, falling back to the
    /// defaults when the file does not exist. A file that exists but does
    /// not parse is a configuration error, not a silent fallback.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("folio.toml"))
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("could not parse {}", path.display()))
    }
}

/// Parse a "#RRGGBB" hex color into RGBA with alpha 1.0.
pub fn parse_hex_color(s: &str) -> Option<[f32; 4]> {
    let hex = s.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(hex.get(0..2)?, 16).ok()?;
    let g = u8::from_str_radix(hex.get(2..4)?, 16).ok()?;
    let b = u8::from_str_radix(hex.get(4..6)?, 16).ok()?;
    Some([
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
        1.0,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = Config::default();
        assert!(c.font.size > 0.0);
        assert!(c.font.faces.is_empty());
        assert!(c.window.width > 0 && c.window.height > 0);
        assert!(c.font.line_height() > c.font.effective_size() as usize);
    }

    #[test]
    fn size_is_clamped() {
        let fc = FontConfig {
            size: 1000.0,
            faces: Vec::new(),
        };
        assert!((fc.effective_size() - MAX_FONT_SIZE).abs() < f32::EPSILON);
    }

    #[test]
    fn hex_color_parsing() {
        assert_eq!(parse_hex_color("#000000"), Some([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(parse_hex_color("#ff0000"), Some([1.0, 0.0, 0.0, 1.0]));
        assert!(parse_hex_color("ff0000").is_none());
        assert!(parse_hex_color("#ff00").is_none());
        assert!(parse_hex_color("#zzzzzz").is_none());
    }

    #[test]
    fn roundtrips_through_toml() {
        let c = Config::default();
        let text = toml::to_string_pretty(&c).expect("serialize");
        let back: Config = toml::from_str(&text).expect("parse");
        assert_eq!(back.font.size, c.font.size);
        assert_eq!(back.colors.background, c.colors.background);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let c: Config = toml::from_str("[font]\nsize = 21.0\n").expect("parse");
        assert_eq!(c.font.size, 21.0);
        assert_eq!(c.window.width, WindowConfig::default().width);
    }
}
