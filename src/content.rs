use fixed::types::I32F32;

use crate::types::{Color, Px, Transform};

/// One element of a `TJ` array.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TextItem {
    Run(Vec<u8>),
    /// Thousandths of text space; positive values move the pen left.
    Adjust(i64),
}

/// Accumulates content-stream operators for one page.
#[derive(Debug, Default)]
pub(crate) struct ContentStream {
    buf: String,
    ops: usize,
}

impl ContentStream {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn op(&mut self, line: &str) {
        self.buf.push_str(line);
        self.buf.push('\n');
        self.ops += 1;
    }

    pub(crate) fn operator_count(&self) -> usize {
        self.ops
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.buf
    }

    pub(crate) fn into_string(self) -> String {
        self.buf
    }

    pub(crate) fn save(&mut self) {
        self.op("q");
    }

    pub(crate) fn restore(&mut self) {
        self.op("Q");
    }

    pub(crate) fn concat(&mut self, m: &Transform) {
        self.op(&format!(
            "{} {} {} {} {} {} cm",
            fmt64(m.a),
            fmt64(m.b),
            fmt64(m.c),
            fmt64(m.d),
            fmt64(m.e),
            fmt64(m.f)
        ));
    }

    pub(crate) fn rect(&mut self, x: Px, y: Px, w: Px, h: Px) {
        self.op(&format!(
            "{} {} {} {} re",
            fmt_px(x),
            fmt_px(y),
            fmt_px(w),
            fmt_px(h)
        ));
    }

    pub(crate) fn move_to(&mut self, x: f64, y: f64) {
        self.op(&format!("{} {} m", fmt64(x), fmt64(y)));
    }

    pub(crate) fn line_to(&mut self, x: f64, y: f64) {
        self.op(&format!("{} {} l", fmt64(x), fmt64(y)));
    }

    pub(crate) fn curve_to(&mut self, c1: (f64, f64), c2: (f64, f64), end: (f64, f64)) {
        self.op(&format!(
            "{} {} {} {} {} {} c",
            fmt64(c1.0),
            fmt64(c1.1),
            fmt64(c2.0),
            fmt64(c2.1),
            fmt64(end.0),
            fmt64(end.1)
        ));
    }

    pub(crate) fn close_path(&mut self) {
        self.op("h");
    }

    pub(crate) fn fill(&mut self) {
        self.op("f");
    }

    pub(crate) fn stroke(&mut self) {
        self.op("S");
    }

    pub(crate) fn clip(&mut self) {
        self.op("W n");
    }

    pub(crate) fn fill_rgb(&mut self, color: Color) {
        let [r, g, b] = color.rgb_milli();
        self.op(&format!(
            "{} {} {} rg",
            format_milli(r),
            format_milli(g),
            format_milli(b)
        ));
    }

    pub(crate) fn stroke_rgb(&mut self, color: Color) {
        let [r, g, b] = color.rgb_milli();
        self.op(&format!(
            "{} {} {} RG",
            format_milli(r),
            format_milli(g),
            format_milli(b)
        ));
    }

    pub(crate) fn line_width(&mut self, width: Px) {
        self.op(&format!("{} w", fmt_px(width)));
    }

    pub(crate) fn ext_gstate(&mut self, name: &str) {
        self.op(&format!("/{} gs", name));
    }

    pub(crate) fn begin_text(&mut self) {
        self.op("BT");
    }

    pub(crate) fn end_text(&mut self) {
        self.op("ET");
    }

    pub(crate) fn font(&mut self, name: &str, size: Px) {
        self.op(&format!("/{} {} Tf", name, fmt_px(size)));
    }

    pub(crate) fn text_move(&mut self, dx: Px, dy: Px) {
        self.op(&format!("{} {} Td", fmt_px(dx), fmt_px(dy)));
    }

    pub(crate) fn show_positioned(&mut self, items: &[TextItem]) {
        let mut line = String::from("[");
        for item in items {
            match item {
                TextItem::Run(bytes) => {
                    line.push('(');
                    line.push_str(&escape_pdf_bytes(bytes));
                    line.push(')');
                }
                TextItem::Adjust(milli) => {
                    if !line.ends_with('[') {
                        line.push(' ');
                    }
                    line.push_str(&milli.to_string());
                    line.push(' ');
                }
            }
        }
        line.push_str("] TJ");
        self.op(&line);
    }

    pub(crate) fn xobject(&mut self, name: &str) {
        self.op(&format!("/{} Do", name));
    }
}

pub(crate) fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::saturating_from_num(value);
    let scaled = (fixed.saturating_mul(I32F32::from_num(1000))).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

pub(crate) fn fmt64(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    format_milli((value * 1000.0).round() as i64)
}

pub(crate) fn fmt_px(value: Px) -> String {
    format_milli(value.to_milli_i64())
}

pub(crate) fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

/// Escapes raw bytes for a literal string. Control bytes, space and bytes above
/// 127 are written as three-digit octal escapes.
pub(crate) fn escape_pdf_bytes(input: &[u8]) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    for &byte in input {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            0..=32 | 128..=255 => out.push_str(&format!("\\{:03o}", byte)),
            _ => out.push(byte as char),
        }
    }
    out
}

/// Escapes text for a literal string (titles, bookmarks). Non-ASCII text is written
/// as UTF-16BE with a byte-order mark so viewers show it correctly.
pub(crate) fn escape_pdf_text(input: &str) -> String {
    if input.is_ascii() {
        let mut out = String::with_capacity(input.len());
        for ch in input.chars() {
            match ch {
                '\\' => out.push_str("\\\\"),
                '(' => out.push_str("\\("),
                ')' => out.push_str("\\)"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                _ => out.push(ch),
            }
        }
        return out;
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in input.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    escape_pdf_bytes(&bytes)
}

pub(crate) fn ascii_hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2 + data.len() / 32);
    for (index, byte) in data.iter().enumerate() {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02X}", byte);
        if index % 32 == 31 {
            out.push('\n');
        }
    }
    out
}

pub(crate) fn flate_compress(data: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_drop_trailing_zeros() {
        assert_eq!(format_milli(0), "0");
        assert_eq!(format_milli(-1500), "-1.5");
        assert_eq!(format_milli(120), "0.12");
        assert_eq!(fmt(72.0 / 600.0), "0.12");
        assert_eq!(fmt64(f64::NAN), "0");
    }

    #[test]
    fn byte_strings_escape_controls_and_high_bytes_in_octal() {
        assert_eq!(escape_pdf_bytes(b"a(b)\\"), "a\\(b\\)\\\\");
        assert_eq!(escape_pdf_bytes(&[b' ', 0x0A, 0xE9]), "\\040\\012\\351");
    }

    #[test]
    fn text_outside_ascii_becomes_utf16() {
        assert_eq!(escape_pdf_text("Intro (1)"), "Intro \\(1\\)");
        assert!(escape_pdf_text("Über").starts_with("\\376\\377"));
    }

    #[test]
    fn positioned_text_interleaves_runs_and_adjustments() {
        let mut content = ContentStream::new();
        content.show_positioned(&[
            TextItem::Run(b"ab".to_vec()),
            TextItem::Adjust(-120),
            TextItem::Run(b"c".to_vec()),
        ]);
        assert_eq!(content.as_str(), "[(ab) -120 (c)] TJ\n");
        assert_eq!(content.operator_count(), 1);
    }

    #[test]
    fn colours_are_emitted_in_thousandths() {
        let mut content = ContentStream::new();
        content.fill_rgb(Color::rgb(255, 0, 51));
        content.stroke_rgb(Color::BLACK);
        assert_eq!(content.as_str(), "1 0 0.2 rg\n0 0 0 RG\n");
    }
}
