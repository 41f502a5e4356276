//! 8-bit RGB colors and the sRGB/linear conversions used by the codecs.

use std::fmt;

/// RGB color with integer components in `0..=255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const WHITE: Color = Color::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    /// Build a color from float components in `[0, 1]`.
    pub fn from_float_components(r: f64, g: f64, b: f64) -> Self {
        Color {
            r: component_from_float(r),
            g: component_from_float(g),
            b: component_from_float(b),
        }
    }

    pub fn to_float_components(self) -> [f64; 3] {
        [
            component_to_float(self.r),
            component_to_float(self.g),
            component_to_float(self.b),
        ]
    }

    /// Float components converted from sRGB to linear space.
    pub fn to_linear(self) -> [f64; 3] {
        self.to_float_components().map(srgb_to_linear)
    }

    /// Build a color from linear-space float components.
    pub fn from_linear(rgb: [f64; 3]) -> Self {
        Color::from_float_components(
            linear_to_srgb(rgb[0]),
            linear_to_srgb(rgb[1]),
            linear_to_srgb(rgb[2]),
        )
    }

    /// Lowercase `rrggbb` hex form.
    pub fn to_hex_string(self) -> String {
        format!("{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Parse a six digit `rrggbb` hex string. A leading `#` is accepted.
    pub fn from_hex_string(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Color { r, g, b })
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.to_hex_string())
    }
}

/// Convert a float component in `[0, 1]` to `0..=255`, rounding to nearest.
pub fn component_from_float(component: f64) -> u8 {
    (component * 255.0).round().clamp(0.0, 255.0) as u8
}

pub fn component_to_float(component: u8) -> f64 {
    component as f64 / 255.0
}

pub fn srgb_to_linear(component: f64) -> f64 {
    if component < 0.04045 {
        component * 0.0773993808
    } else {
        (component * 0.9478672986 + 0.0521327014).powf(2.4)
    }
}

pub fn linear_to_srgb(component: f64) -> f64 {
    if component < 0.0031308 {
        component * 12.92
    } else {
        1.055 * component.powf(0.41666) - 0.055
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_string() {
        let color = Color::new(255, 8, 128);
        assert_eq!(color.to_hex_string(), "ff0880");
        assert_eq!(Color::from_hex_string("ff0880"), Some(color));
        assert_eq!(Color::from_hex_string("#FF0880"), Some(color));
        assert_eq!(Color::from_hex_string("ff08"), None);
        assert_eq!(Color::from_hex_string("gg0880"), None);
    }

    #[test]
    fn test_float_components() {
        assert_eq!(Color::from_float_components(1.0, 0.5, 0.0), Color::new(255, 128, 0));
        assert_eq!(Color::from_float_components(1.5, -0.2, 0.0), Color::new(255, 0, 0));
    }

    #[test]
    fn test_srgb_linear_round_trip() {
        for value in [0u8, 1, 10, 64, 128, 200, 255] {
            let color = Color::new(value, value, value);
            assert_eq!(Color::from_linear(color.to_linear()), color);
        }
    }
}
