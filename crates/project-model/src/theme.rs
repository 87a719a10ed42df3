//! Slide themes: colours, background and typography.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Straight (non-premultiplied) 8-bit RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Alpha as a `0.0..=1.0` fraction.
    pub fn opacity(&self) -> f32 {
        self.a as f32 / 255.0
    }

    /// `#rrggbb` without alpha, as used in SVG paint attributes.
    pub fn hex_rgb(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "{}", self.hex_rgb())
        } else {
            write!(f, "{}{:02x}", self.hex_rgb(), self.a)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid colour '{0}' (expected #rrggbb or #rrggbbaa)")]
pub struct InvalidColor(pub String);

impl FromStr for Rgba {
    type Err = InvalidColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || InvalidColor(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(err)?;
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(err());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| err());
        let a = if hex.len() == 8 { byte(6)? } else { 255 };
        Ok(Rgba::rgba(byte(0)?, byte(2)?, byte(4)?, a))
    }
}

impl TryFrom<String> for Rgba {
    type Error = InvalidColor;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgba> for String {
    fn from(value: Rgba) -> Self {
        value.to_string()
    }
}

/// Slide background fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Background {
    Solid {
        color: Rgba,
    },
    /// Linear gradient, CSS angle convention (180 = top to bottom).
    Gradient {
        angle_deg: f32,
        stops: Vec<Rgba>,
    },
}

impl Background {
    /// Colour forced behind every rasterization.
    pub fn fallback_color(&self) -> Rgba {
        match self {
            Background::Solid { color } => *color,
            Background::Gradient { stops, .. } => stops.first().copied().unwrap_or(Rgba::BLACK),
        }
    }
}

/// Generic family used when the theme font is not available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenericFamily {
    #[default]
    Sans,
    Serif,
    Mono,
}

impl GenericFamily {
    pub fn css_name(&self) -> &'static str {
        match self {
            GenericFamily::Sans => "sans-serif",
            GenericFamily::Serif => "serif",
            GenericFamily::Mono => "monospace",
        }
    }
}

/// Theme typography.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeFont {
    /// Family name looked up in the font database.
    pub family: String,
    pub generic: GenericFamily,
    /// Font file shipped alongside the app, relative to the fonts directory.
    #[serde(default)]
    pub file: Option<String>,
}

impl ThemeFont {
    fn custom(family: &str, file: &str, generic: GenericFamily) -> Self {
        Self {
            family: family.to_string(),
            generic,
            file: Some(file.to_string()),
        }
    }

    fn system(generic: GenericFamily) -> Self {
        Self {
            family: generic.css_name().to_string(),
            generic,
            file: None,
        }
    }
}

/// Visual style applied to a slide before rasterization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub id: String,
    pub name: String,
    pub font: ThemeFont,
    pub background: Background,
    pub text_color: Rgba,
    pub accent_color: Rgba,
    pub heading_color: Rgba,
    pub code_bg: Rgba,
    pub code_text: Rgba,
}

/// Theme id used when nothing else is selected.
pub const DEFAULT_THEME_ID: &str = "tiktok-dark";

/// Look up a built-in theme, falling back to the default one.
pub fn find_theme(id: &str) -> Theme {
    let mut themes = builtin_themes();
    match themes.iter().position(|t| t.id == id) {
        Some(index) => themes.swap_remove(index),
        None => themes.swap_remove(0),
    }
}

/// The built-in theme catalogue. The first entry is the default.
pub fn builtin_themes() -> Vec<Theme> {
    use GenericFamily::{Mono, Sans, Serif};

    let poppins = || ThemeFont::custom("Poppins", "Poppins-Regular.ttf", Sans);
    let space = || ThemeFont::custom("Space Grotesk", "SpaceGrotesk-Regular.ttf", Sans);
    let solid = |hex: u32| Background::Solid { color: hex_rgb(hex) };
    let gradient = |angle_deg: f32, stops: &[u32]| Background::Gradient {
        angle_deg,
        stops: stops.iter().map(|h| hex_rgb(*h)).collect(),
    };
    let translucent = |hex: u32, alpha: u8| Rgba { a: alpha, ..hex_rgb(hex) };

    vec![
        Theme {
            id: "tiktok-dark".into(),
            name: "TikTok Dark".into(),
            font: poppins(),
            background: solid(0x000000),
            text_color: Rgba::WHITE,
            accent_color: hex_rgb(0xff0050),
            heading_color: Rgba::WHITE,
            code_bg: hex_rgb(0x111827),
            code_text: Rgba::WHITE,
        },
        Theme {
            id: "tiktok-light".into(),
            name: "TikTok Light".into(),
            font: poppins(),
            background: solid(0xffffff),
            text_color: Rgba::BLACK,
            accent_color: hex_rgb(0x00f2ea),
            heading_color: Rgba::BLACK,
            code_bg: hex_rgb(0xf3f4f6),
            code_text: Rgba::BLACK,
        },
        Theme {
            id: "neon-vibes".into(),
            name: "Neon Vibes".into(),
            font: space(),
            background: gradient(135.0, &[0x581c87, 0x1e3a8a]),
            text_color: hex_rgb(0xdbeafe),
            accent_color: hex_rgb(0xf472b6),
            heading_color: hex_rgb(0x67e8f9),
            code_bg: translucent(0x000000, 128),
            code_text: hex_rgb(0xdbeafe),
        },
        Theme {
            id: "vaporwave".into(),
            name: "Vaporwave".into(),
            font: space(),
            background: gradient(135.0, &[0x6366f1, 0xa855f7, 0xec4899]),
            text_color: Rgba::WHITE,
            accent_color: hex_rgb(0xfde047),
            heading_color: hex_rgb(0xcffafe),
            code_bg: translucent(0xffffff, 51),
            code_text: Rgba::WHITE,
        },
        Theme {
            id: "matrix-code".into(),
            name: "Matrix Code".into(),
            font: ThemeFont::system(Mono),
            background: solid(0x000000),
            text_color: hex_rgb(0x4ade80),
            accent_color: Rgba::WHITE,
            heading_color: hex_rgb(0x22c55e),
            code_bg: translucent(0x14532d, 77),
            code_text: hex_rgb(0x4ade80),
        },
        Theme {
            id: "forest-rain".into(),
            name: "Forest Rain".into(),
            font: ThemeFont::system(Sans),
            background: gradient(180.0, &[0x14532d, 0x134e4a]),
            text_color: hex_rgb(0xf0fdf4),
            accent_color: hex_rgb(0x4ade80),
            heading_color: Rgba::WHITE,
            code_bg: translucent(0x000000, 77),
            code_text: hex_rgb(0xf0fdf4),
        },
        Theme {
            id: "deep-ocean".into(),
            name: "Deep Ocean".into(),
            font: ThemeFont::system(Sans),
            background: gradient(180.0, &[0x1e3a8a, 0x0f172a]),
            text_color: hex_rgb(0xdbeafe),
            accent_color: hex_rgb(0x22d3ee),
            heading_color: Rgba::WHITE,
            code_bg: hex_rgb(0x172554),
            code_text: hex_rgb(0xdbeafe),
        },
        Theme {
            id: "sunset-dream".into(),
            name: "Sunset Dream".into(),
            font: poppins(),
            background: gradient(180.0, &[0xfb923c, 0xf43f5e]),
            text_color: Rgba::WHITE,
            accent_color: hex_rgb(0xfef08a),
            heading_color: Rgba::WHITE,
            code_bg: translucent(0xffffff, 51),
            code_text: Rgba::WHITE,
        },
        Theme {
            id: "desert-sand".into(),
            name: "Desert Sand".into(),
            font: poppins(),
            background: solid(0xd6c0b3),
            text_color: hex_rgb(0x493628),
            accent_color: hex_rgb(0xab886d),
            heading_color: hex_rgb(0x493628),
            code_bg: hex_rgb(0xe4e0e1),
            code_text: hex_rgb(0x493628),
        },
        Theme {
            id: "clean-white".into(),
            name: "Clean White".into(),
            font: ThemeFont::system(Sans),
            background: solid(0xffffff),
            text_color: hex_rgb(0x1f2937),
            accent_color: hex_rgb(0x2563eb),
            heading_color: Rgba::BLACK,
            code_bg: hex_rgb(0xf3f4f6),
            code_text: hex_rgb(0x1f2937),
        },
        Theme {
            id: "dark-mode-pro".into(),
            name: "Dark Mode Pro".into(),
            font: ThemeFont::system(Mono),
            background: solid(0x1e1e1e),
            text_color: hex_rgb(0xd4d4d4),
            accent_color: hex_rgb(0x569cd6),
            heading_color: Rgba::WHITE,
            code_bg: hex_rgb(0x252526),
            code_text: hex_rgb(0xd4d4d4),
        },
        Theme {
            id: "royal-gold".into(),
            name: "Royal Gold".into(),
            font: ThemeFont::system(Serif),
            background: gradient(135.0, &[0x0f172a, 0x000000]),
            text_color: hex_rgb(0xcbd5e1),
            accent_color: hex_rgb(0xfacc15),
            heading_color: hex_rgb(0xeab308),
            code_bg: hex_rgb(0x1e293b),
            code_text: hex_rgb(0xcbd5e1),
        },
        Theme {
            id: "cotton-candy".into(),
            name: "Cotton Candy".into(),
            font: poppins(),
            background: gradient(135.0, &[0xfbcfe8, 0xbfdbfe]),
            text_color: hex_rgb(0x334155),
            accent_color: hex_rgb(0xec4899),
            heading_color: hex_rgb(0x1e293b),
            code_bg: translucent(0xffffff, 153),
            code_text: hex_rgb(0x334155),
        },
        Theme {
            id: "halloween-night".into(),
            name: "Halloween Night".into(),
            font: poppins(),
            background: gradient(180.0, &[0xea580c, 0x581c87]),
            text_color: Rgba::WHITE,
            accent_color: hex_rgb(0x4ade80),
            heading_color: Rgba::WHITE,
            code_bg: translucent(0x000000, 153),
            code_text: Rgba::WHITE,
        },
    ]
}

const fn hex_rgb(hex: u32) -> Rgba {
    Rgba::rgb((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_parse_and_display() {
        let c: Rgba = "#FF0050".parse().unwrap();
        assert_eq!(c, Rgba::rgb(255, 0, 80));
        assert_eq!(c.to_string(), "#ff0050");

        let c: Rgba = "#00000080".parse().unwrap();
        assert_eq!(c.a, 128);
        assert_eq!(c.to_string(), "#00000080");

        assert!("ff0050".parse::<Rgba>().is_err());
        assert!("#ff00".parse::<Rgba>().is_err());
        assert!("#gg0000".parse::<Rgba>().is_err());
    }

    #[test]
    fn test_theme_serialization_uses_hex_strings() {
        let theme = find_theme("neon-vibes");
        let json = serde_json::to_value(&theme).unwrap();
        assert_eq!(json["text_color"], "#dbeafe");
        assert_eq!(json["background"]["kind"], "gradient");
        let back: Theme = serde_json::from_value(json).unwrap();
        assert_eq!(back, theme);
    }

    #[test]
    fn test_fallback_color() {
        assert_eq!(find_theme("sunset-dream").background.fallback_color(), hex_rgb(0xfb923c));
        assert_eq!(find_theme("clean-white").background.fallback_color(), Rgba::WHITE);
        let empty = Background::Gradient {
            angle_deg: 90.0,
            stops: vec![],
        };
        assert_eq!(empty.fallback_color(), Rgba::BLACK);
    }

    #[test]
    fn test_find_theme_falls_back_to_default() {
        assert_eq!(find_theme("does-not-exist").id, DEFAULT_THEME_ID);
        assert_eq!(find_theme("royal-gold").name, "Royal Gold");
    }

    #[test]
    fn test_builtin_ids_unique() {
        let themes = builtin_themes();
        let mut ids: Vec<_> = themes.iter().map(|t| t.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), themes.len());
        assert_eq!(themes[0].id, DEFAULT_THEME_ID);
    }
}
