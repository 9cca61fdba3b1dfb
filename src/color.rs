//! Color-mode converters. Everything returned here is linear RGBA.

use serde::{Deserialize, Serialize};

use crate::messages::ColorRgba;

pub type LinearRgba = [f32; 4];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    Flat,
    Gradient,
    Rainbow,
    Turbo,
    /// Packed color, alpha channel ignored.
    Rgb,
    /// Packed color including alpha.
    Rgba,
}

impl ColorMode {
    pub fn needs_range(self) -> bool {
        matches!(self, ColorMode::Gradient | ColorMode::Rainbow | ColorMode::Turbo)
    }

    pub fn is_packed(self) -> bool {
        matches!(self, ColorMode::Rgb | ColorMode::Rgba)
    }
}

/// Byte layout of a packed 32-bit color, named from the most significant byte down
/// (`Rgb` is `0x00RRGGBB`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOrder {
    Rgb,
    Rgba,
    Bgr,
    Bgra,
    Abgr,
}

impl ChannelOrder {
    /// Channel order implied by a composite color field name.
    pub fn from_field_name(name: &str) -> Option<Self> {
        match name {
            "rgb" | "color" => Some(ChannelOrder::Rgb),
            "rgba" => Some(ChannelOrder::Rgba),
            "bgr" => Some(ChannelOrder::Bgr),
            "bgra" => Some(ChannelOrder::Bgra),
            "abgr" => Some(ChannelOrder::Abgr),
            _ => None,
        }
    }

    pub fn has_alpha(self) -> bool {
        !matches!(self, ChannelOrder::Rgb | ChannelOrder::Bgr)
    }

    /// Splits `bits` into `[r, g, b, a]` bytes. Orders without alpha report 255.
    pub fn unpack(self, bits: u32) -> [u8; 4] {
        let [b3, b2, b1, b0] = bits.to_be_bytes();
        match self {
            ChannelOrder::Rgb => [b2, b1, b0, 255],
            ChannelOrder::Rgba => [b3, b2, b1, b0],
            ChannelOrder::Bgr => [b0, b1, b2, 255],
            ChannelOrder::Bgra => [b1, b2, b3, b0],
            ChannelOrder::Abgr => [b0, b1, b2, b3],
        }
    }
}

pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub fn linear_from_srgb(color: ColorRgba) -> LinearRgba {
    [
        srgb_to_linear(color.r),
        srgb_to_linear(color.g),
        srgb_to_linear(color.b),
        color.a,
    ]
}

fn linear_from_srgb_rgb(rgb: [f32; 3], alpha: f32) -> LinearRgba {
    [
        srgb_to_linear(rgb[0]),
        srgb_to_linear(rgb[1]),
        srgb_to_linear(rgb[2]),
        alpha,
    ]
}

/// Position of `value` in `[min, max]`, clamped to `[0, 1]`. Degenerate ranges and NaN map to 0.
pub fn normalize(value: f64, min: f64, max: f64) -> f32 {
    let span = max - min;
    if !(span > 0.0) || value.is_nan() {
        return 0.0;
    }
    ((value - min) / span).clamp(0.0, 1.0) as f32
}

fn lerp(a: LinearRgba, b: LinearRgba, t: f32) -> LinearRgba {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ]
}

/// Hue sweep from red (t = 0) through green and blue to magenta (t = 1).
pub fn rainbow(t: f32) -> LinearRgba {
    let h = (1.0 - t.clamp(0.0, 1.0)) * 5.0 + 1.0;
    let i = h.floor();
    let mut f = h - i;
    if (i as i32) % 2 == 0 {
        f = 1.0 - f;
    }
    let n = 1.0 - f;
    let rgb = match i as i32 {
        i32::MIN..=1 => [n, 0.0, 1.0],
        2 => [0.0, n, 1.0],
        3 => [0.0, 1.0, n],
        4 => [n, 1.0, 0.0],
        _ => [1.0, n, 0.0],
    };
    linear_from_srgb_rgb(rgb, 1.0)
}

/// Polynomial approximation of the Turbo colormap.
pub fn turbo(t: f32) -> LinearRgba {
    const RED4: [f32; 4] = [0.135_721_38, 4.615_392_6, -42.660_322_58, 132.131_082_34];
    const GREEN4: [f32; 4] = [0.091_402_61, 2.194_188_39, 4.842_966_58, -14.185_033_33];
    const BLUE4: [f32; 4] = [0.106_673_3, 12.641_946_08, -60.582_048_36, 110.362_767_71];
    const RED2: [f32; 2] = [-152.942_393_96, 59.286_379_43];
    const GREEN2: [f32; 2] = [4.277_298_57, 2.829_566_04];
    const BLUE2: [f32; 2] = [-89.903_109_12, 27.348_249_73];

    let x = t.clamp(0.0, 1.0);
    let v4 = [1.0, x, x * x, x * x * x];
    let v2 = [v4[2] * v4[2], v4[3] * v4[2]];
    let channel = |c4: [f32; 4], c2: [f32; 2]| {
        let v = c4[0] * v4[0]
            + c4[1] * v4[1]
            + c4[2] * v4[2]
            + c4[3] * v4[3]
            + c2[0] * v2[0]
            + c2[1] * v2[1];
        v.clamp(0.0, 1.0)
    };
    linear_from_srgb_rgb(
        [
            channel(RED4, RED2),
            channel(GREEN4, GREEN2),
            channel(BLUE4, BLUE2),
        ],
        1.0,
    )
}

/// Resolved per-message color conversion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColorMapper {
    Flat(LinearRgba),
    Gradient {
        min_color: LinearRgba,
        max_color: LinearRgba,
        min: f64,
        max: f64,
    },
    Rainbow {
        min: f64,
        max: f64,
    },
    Turbo {
        min: f64,
        max: f64,
    },
    Packed {
        order: ChannelOrder,
        use_alpha: bool,
    },
}

impl ColorMapper {
    /// Color for a numeric field value. Packed mappers reinterpret the value's bits.
    pub fn map_value(&self, value: f64) -> LinearRgba {
        match *self {
            ColorMapper::Flat(color) => color,
            ColorMapper::Gradient {
                min_color,
                max_color,
                min,
                max,
            } => lerp(min_color, max_color, normalize(value, min, max)),
            ColorMapper::Rainbow { min, max } => rainbow(normalize(value, min, max)),
            ColorMapper::Turbo { min, max } => turbo(normalize(value, min, max)),
            ColorMapper::Packed { .. } => self.map_packed(value as u32),
        }
    }

    pub fn map_packed(&self, bits: u32) -> LinearRgba {
        match *self {
            ColorMapper::Packed { order, use_alpha } => {
                let [r, g, b, a] = order.unpack(bits);
                let alpha = if use_alpha && order.has_alpha() {
                    a as f32 / 255.0
                } else {
                    1.0
                };
                linear_from_srgb_rgb(
                    [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0],
                    alpha,
                )
            }
            _ => self.map_value(bits as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_srgb_to_linear_endpoints() {
        assert_eq!(srgb_to_linear(0.0), 0.0);
        assert_relative_eq!(srgb_to_linear(1.0), 1.0, epsilon = 1e-6);
        assert_relative_eq!(srgb_to_linear(0.5), 0.214_041_14, epsilon = 1e-5);
    }

    #[test]
    fn test_normalize_degenerate_ranges() {
        assert_eq!(normalize(5.0, 0.0, 10.0), 0.5);
        assert_eq!(normalize(-3.0, 0.0, 10.0), 0.0);
        assert_eq!(normalize(30.0, 0.0, 10.0), 1.0);
        assert_eq!(normalize(4.0, 4.0, 4.0), 0.0);
        assert_eq!(normalize(f64::NAN, 0.0, 1.0), 0.0);
    }

    #[test]
    fn test_gradient_midpoint_blends_linear_endpoints() {
        let min_color = linear_from_srgb(ColorRgba::new(0.0, 0.0, 1.0, 1.0));
        let max_color = linear_from_srgb(ColorRgba::new(1.0, 0.0, 0.0, 1.0));
        let mapper = ColorMapper::Gradient {
            min_color,
            max_color,
            min: 0.0,
            max: 10.0,
        };
        let mid = mapper.map_value(5.0);
        assert_relative_eq!(mid[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(mid[2], 0.5, epsilon = 1e-6);
        assert_eq!(mapper.map_value(0.0), min_color);
        assert_eq!(mapper.map_value(10.0), max_color);
    }

    #[test]
    fn test_channel_orders() {
        assert_eq!(ChannelOrder::Rgb.unpack(0x00_11_22_33), [0x11, 0x22, 0x33, 255]);
        assert_eq!(ChannelOrder::Rgba.unpack(0x11_22_33_44), [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(ChannelOrder::Bgr.unpack(0x00_33_22_11), [0x11, 0x22, 0x33, 255]);
        assert_eq!(ChannelOrder::Bgra.unpack(0x33_22_11_44), [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(ChannelOrder::Abgr.unpack(0x44_33_22_11), [0x11, 0x22, 0x33, 0x44]);
        assert_eq!(ChannelOrder::from_field_name("color"), Some(ChannelOrder::Rgb));
        assert_eq!(ChannelOrder::from_field_name("intensity"), None);
    }

    #[test]
    fn test_packed_alpha_only_in_rgba_mode() {
        let rgb = ColorMapper::Packed {
            order: ChannelOrder::Rgba,
            use_alpha: false,
        };
        let rgba = ColorMapper::Packed {
            order: ChannelOrder::Rgba,
            use_alpha: true,
        };
        assert_eq!(rgb.map_packed(0xFF_00_00_00)[3], 1.0);
        assert_eq!(rgba.map_packed(0xFF_00_00_00)[3], 0.0);
        assert_relative_eq!(rgba.map_packed(0xFF_00_00_00)[0], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_colormaps_stay_in_unit_range() {
        for i in 0..=20 {
            let t = i as f32 / 20.0;
            for c in turbo(t).iter().chain(rainbow(t).iter()) {
                assert!((0.0..=1.0).contains(c));
            }
        }
        let low = rainbow(0.0);
        assert_relative_eq!(low[0], 1.0, epsilon = 1e-6);
        assert_eq!(low[1], 0.0);
        assert_eq!(low[2], 0.0);
        let high = rainbow(1.0);
        assert_relative_eq!(high[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(high[2], 1.0, epsilon = 1e-6);
    }
}
