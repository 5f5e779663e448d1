use super::{PdfError, PdfResult};

/// Color with components in 0.0..=1.0, as PDF operators expect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const RED: Rgb = Rgb { r: 1.0, g: 0.0, b: 0.0 };
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };

    pub fn from_u8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: f32::from(r) / 255.0,
            g: f32::from(g) / 255.0,
            b: f32::from(b) / 255.0,
        }
    }

    /// 8-bit channels for raster output
    pub fn to_u8(self) -> [u8; 3] {
        let c = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [c(self.r), c(self.g), c(self.b)]
    }
}

/// Parse `#RRGGBB`, `RRGGBB` or `#RGB`
pub fn parse_hex_color(input: &str) -> PdfResult<Rgb> {
    let hex = input.trim().trim_start_matches('#');
    let invalid = || PdfError::InvalidInput(format!("Invalid color: {}", input));

    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
    match hex.len() {
        6 => Ok(Rgb::from_u8(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        )),
        3 => {
            let expand = |i: usize| channel(&hex[i..i + 1].repeat(2));
            Ok(Rgb::from_u8(expand(0)?, expand(1)?, expand(2)?))
        }
        _ => Err(invalid()),
    }
}
