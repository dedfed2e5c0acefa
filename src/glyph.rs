use std::collections::HashMap;

use crate::content::ascii_hex_encode;

/// A bitmap glyph as delivered by the typesetter.
///
/// Pixels are stored row-major starting at the top row; any non-zero byte is ink.
/// `x_offset` is the distance from the glyph origin to the left edge of the bitmap
/// and `y_offset` the distance from the baseline up to the top row. `advance` is the
/// horizontal escapement in device units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glyph {
    pub width: u32,
    pub height: u32,
    pub x_offset: i32,
    pub y_offset: i32,
    pub advance: i32,
    pixels: Vec<u8>,
}

impl Glyph {
    /// Builds a glyph from row-major pixels. Missing pixels are treated as blank and
    /// extra ones are dropped.
    pub fn new(width: u32, height: u32, x_offset: i32, y_offset: i32, advance: i32, mut pixels: Vec<u8>) -> Self {
        pixels.resize(width as usize * height as usize, 0);
        Self {
            width,
            height,
            x_offset,
            y_offset,
            advance,
            pixels,
        }
    }

    /// A glyph with no bitmap, such as a space.
    pub fn blank(advance: i32) -> Self {
        Self::new(0, 0, 0, 0, advance, Vec::new())
    }

    /// Ink at column `x`, row `y` (row 0 is the top).
    pub fn ink(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.pixels[(y * self.width + x) as usize] != 0
    }

    pub fn has_ink(&self) -> bool {
        self.pixels.iter().any(|&p| p != 0)
    }

    /// Glyph-space box `(llx, lly, urx, ury)` of the bitmap relative to the origin.
    pub(crate) fn bounding_box(&self) -> (i32, i32, i32, i32) {
        let llx = -self.x_offset;
        let lly = self.y_offset - self.height as i32 + 1;
        let urx = self.width as i32 - self.x_offset + 1;
        let ury = self.y_offset + 1;
        (llx, lly, urx, ury)
    }

    /// One bit per pixel, rows padded to whole bytes, `1` where there is no ink, as
    /// ASCII hex. Suitable for an image mask with the default decode array.
    pub(crate) fn mask_hex(&self) -> String {
        let row_bytes = (self.width as usize).div_ceil(8);
        let mut packed = Vec::with_capacity(row_bytes * self.height as usize);
        for y in 0..self.height {
            for byte_index in 0..row_bytes {
                let mut byte = 0u8;
                for bit in 0..8 {
                    let x = (byte_index * 8 + bit) as u32;
                    if x < self.width && !self.ink(x, y) {
                        byte |= 0x80 >> bit;
                    }
                }
                packed.push(byte);
            }
        }
        ascii_hex_encode(&packed)
    }

    /// Eight-bit grey samples with ink as black (0) and background as white (255).
    pub(crate) fn gray_samples(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .map(|&p| if p != 0 { 0 } else { 255 })
            .collect()
    }
}

/// Supplies glyph bitmaps for a font name and character code.
pub trait GlyphSource {
    fn glyph(&self, font: &str, code: u8) -> Option<Glyph>;
}

/// In-memory glyph table.
#[derive(Debug, Clone, Default)]
pub struct StaticGlyphSource {
    glyphs: HashMap<(String, u8), Glyph>,
}

impl StaticGlyphSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, font: impl Into<String>, code: u8, glyph: Glyph) {
        self.glyphs.insert((font.into(), code), glyph);
    }

    pub fn with_glyph(mut self, font: impl Into<String>, code: u8, glyph: Glyph) -> Self {
        self.insert(font, code, glyph);
        self
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

impl GlyphSource for StaticGlyphSource {
    fn glyph(&self, font: &str, code: u8) -> Option<Glyph> {
        self.glyphs.get(&(font.to_string(), code)).cloned()
    }
}
