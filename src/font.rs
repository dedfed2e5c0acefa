use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::content::ascii_hex_encode;
use crate::error::RenderError;
use crate::registry::{AllocateId, ObjectId, ObjectRegistry, PdfVersion};
use crate::type3::Type3Font;

/// Request for a font at a given size in points. The part of `name` before a
/// `:` selects the font file; anything after it is a variant tag the renderer
/// passes to the glyph source untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FontSpec {
    pub name: String,
    pub size_milli_pt: i64,
}

impl FontSpec {
    pub fn new(name: impl Into<String>, size_pt: f32) -> Self {
        let size = if size_pt.is_finite() { size_pt } else { 0.0 };
        Self {
            name: name.into(),
            size_milli_pt: (size as f64 * 1000.0).round() as i64,
        }
    }

    pub fn size_pt(&self) -> f32 {
        self.size_milli_pt as f32 / 1000.0
    }

    /// Font file name, i.e. everything before the first `:`.
    pub fn file_name(&self) -> &str {
        self.name.split(':').next().unwrap_or(&self.name)
    }
}

/// Finds an outline font program for a font name.
pub trait FontLocator {
    fn locate(&self, name: &str) -> Option<Arc<OutlineFont>>;
}

/// Never finds anything, so every font is synthesized from bitmaps.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFontLocator;

impl FontLocator for NoFontLocator {
    fn locate(&self, _name: &str) -> Option<Arc<OutlineFont>> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontProgramKind {
    TrueType,
    OpenTypeCff,
}

impl FontProgramKind {
    /// OpenType CFF programs are embedded as `/FontFile3 /Subtype /OpenType`,
    /// which PDF 1.4 does not have.
    pub(crate) fn embeddable_in(self, version: PdfVersion) -> bool {
        !(self == FontProgramKind::OpenTypeCff && version == PdfVersion::Pdf14)
    }
}

/// Metrics in thousandths of an em, read once when the font is loaded.
#[derive(Debug, Clone)]
pub(crate) struct FontMetrics {
    widths: Vec<u16>, // one per byte code
    ascent: i16,
    descent: i16,
    cap_height: i16,
    italic_angle: i16,
    bbox: (i16, i16, i16, i16),
    is_fixed_pitch: bool,
    symbolic: bool,
}

/// A parsed TrueType or OpenType font program ready for embedding.
#[derive(Debug)]
pub struct OutlineFont {
    name: String,
    data: Vec<u8>,
    metrics: FontMetrics,
    program_kind: FontProgramKind,
}

impl OutlineFont {
    /// Parses font bytes. `fallback_name` is used when the font carries no name table.
    pub fn from_bytes(data: Vec<u8>, fallback_name: &str) -> Option<Self> {
        let face = ttf_parser::Face::parse(&data, 0).ok()?;
        let (name, _) = font_names(&face, fallback_name);
        let (metrics, program_kind) = FontMetrics::from_face(&face);
        drop(face);
        Some(Self {
            name,
            data,
            metrics,
            program_kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program_kind(&self) -> FontProgramKind {
        self.program_kind
    }

    /// Advance of a byte code in thousandths of an em.
    pub fn width(&self, code: u8) -> u16 {
        self.metrics.widths[code as usize]
    }
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> (Self, FontProgramKind) {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let (symbolic, symbol_subtable) = select_symbol_subtable(face);

        let widths = (0u16..=255)
            .map(|code| {
                let advance = glyph_index_for_code(face, code as u32, symbol_subtable)
                    .and_then(|id| face.glyph_hor_advance(id))
                    .unwrap_or(0);
                ((advance as f32 * scale).round() as i32).clamp(0, u16::MAX as i32) as u16
            })
            .collect();

        let ascent = scale_i16(face.ascender(), scale);
        let bbox = face.global_bounding_box();
        let program_kind = if face.tables().cff.is_some() {
            FontProgramKind::OpenTypeCff
        } else {
            FontProgramKind::TrueType
        };
        (
            Self {
                widths,
                ascent,
                descent: scale_i16(face.descender(), scale),
                cap_height: face
                    .capital_height()
                    .map(|value| scale_i16(value, scale))
                    .unwrap_or(ascent),
                italic_angle: face
                    .italic_angle()
                    .map(|value| value.round() as i16)
                    .unwrap_or(0),
                bbox: (
                    scale_i16(bbox.x_min, scale),
                    scale_i16(bbox.y_min, scale),
                    scale_i16(bbox.x_max, scale),
                    scale_i16(bbox.y_max, scale),
                ),
                is_fixed_pitch: face.is_monospaced(),
                symbolic,
            },
            program_kind,
        )
    }
}

/// Loads every `.ttf` and `.otf` file of the registered directories and resolves
/// names against file stems and the fonts' own family, full and PostScript names.
#[derive(Debug, Default)]
pub struct DirectoryFontLocator {
    fonts: Vec<Arc<OutlineFont>>,
    lookup: HashMap<String, usize>,
}

impl DirectoryFontLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.register_dir(path);
        self
    }

    pub fn register_dir(&mut self, path: impl AsRef<Path>) {
        let Ok(entries) = fs::read_dir(path.as_ref()) else {
            return;
        };
        let mut paths: Vec<_> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        paths.sort();
        for path in paths {
            self.register_file(path);
        }
    }

    /// Returns false when the file is not a readable font.
    pub fn register_file(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
            return false;
        };
        let ext = ext.to_ascii_lowercase();
        if ext != "ttf" && ext != "otf" {
            return false;
        }
        let Ok(data) = fs::read(path) else {
            return false;
        };
        let stem = path
            .file_stem()
            .and_then(|v| v.to_str())
            .unwrap_or("EmbeddedFont")
            .to_string();
        self.register_bytes(data, &stem)
    }

    /// Registers in-memory font bytes under `source_name` plus the font's own names.
    pub fn register_bytes(&mut self, data: Vec<u8>, source_name: &str) -> bool {
        let Ok(face) = ttf_parser::Face::parse(&data, 0) else {
            return false;
        };
        let (_, aliases) = font_names(&face, source_name);
        drop(face);
        let Some(font) = OutlineFont::from_bytes(data, source_name) else {
            return false;
        };
        let index = self.fonts.len();
        let mut keys = vec![source_name.to_string(), font.name.clone()];
        keys.extend(aliases);
        self.fonts.push(Arc::new(font));
        for key in keys {
            let key = normalize_name(&key);
            if key.is_empty() || self.lookup.contains_key(&key) {
                continue;
            }
            self.lookup.insert(key, index);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }
}

impl FontLocator for DirectoryFontLocator {
    fn locate(&self, name: &str) -> Option<Arc<OutlineFont>> {
        let file = name.split(':').next().unwrap_or(name);
        self.lookup
            .get(&normalize_name(file))
            .and_then(|&index| self.fonts.get(index))
            .cloned()
    }
}

/// How a pooled font is realised in the output.
#[derive(Debug)]
pub(crate) enum FontProgram {
    Outline(Arc<OutlineFont>),
    Synthesized(Type3Font),
}

/// A pooled font together with the byte codes drawn with it.
#[derive(Debug)]
pub(crate) struct FontResource {
    pub program: FontProgram,
    used: BTreeSet<u8>,
}

impl FontResource {
    pub(crate) fn outline(font: Arc<OutlineFont>) -> Self {
        Self {
            program: FontProgram::Outline(font),
            used: BTreeSet::new(),
        }
    }

    pub(crate) fn synthesized() -> Self {
        Self {
            program: FontProgram::Synthesized(Type3Font::new()),
            used: BTreeSet::new(),
        }
    }

    pub(crate) fn is_synthesized(&self) -> bool {
        matches!(self.program, FontProgram::Synthesized(_))
    }

    pub(crate) fn mark_used(&mut self, code: u8, glyph: &crate::glyph::Glyph) {
        self.used.insert(code);
        if let FontProgram::Synthesized(font) = &mut self.program {
            font.add_glyph(code, glyph);
        }
    }

    pub(crate) fn used_count(&self) -> usize {
        self.used.len()
    }

    pub(crate) fn write<W: Write>(
        &self,
        font_id: ObjectId,
        registry: &mut ObjectRegistry<W>,
    ) -> Result<(), RenderError> {
        match &self.program {
            FontProgram::Synthesized(font) => font.write(font_id, registry),
            FontProgram::Outline(font) => write_outline_font(font, &self.used, font_id, registry),
        }
    }
}

/// Simple TrueType font with the program embedded, widths over the used range.
fn write_outline_font<W: Write>(
    font: &OutlineFont,
    used: &BTreeSet<u8>,
    font_id: ObjectId,
    registry: &mut ObjectRegistry<W>,
) -> Result<(), RenderError> {
    let descriptor_id = registry.allocate();
    let file_id = registry.allocate();
    let base = sanitize_font_name(&font.name);
    let metrics = &font.metrics;

    let first = used.first().copied().unwrap_or(32);
    let last = used.last().copied().unwrap_or(first);
    let widths = (first..=last)
        .map(|code| {
            if used.contains(&code) {
                font.width(code).to_string()
            } else {
                "0".to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    let subtype = match font.program_kind {
        FontProgramKind::OpenTypeCff => "Type1",
        FontProgramKind::TrueType => "TrueType",
    };
    let encoding = if metrics.symbolic {
        ""
    } else {
        " /Encoding /WinAnsiEncoding"
    };
    registry.write_str(
        font_id,
        &format!(
            "<< /Type /Font /Subtype /{} /BaseFont /{} /FirstChar {} /LastChar {} /Widths [{}] /FontDescriptor {}{} >>",
            subtype,
            base,
            first,
            last,
            widths,
            descriptor_id.reference(),
            encoding
        ),
    )?;

    let mut flags = if metrics.symbolic { 4 } else { 32 };
    if metrics.is_fixed_pitch {
        flags |= 1;
    }
    let font_file_entry = match font.program_kind {
        FontProgramKind::OpenTypeCff => "FontFile3",
        FontProgramKind::TrueType => "FontFile2",
    };
    registry.write_str(
        descriptor_id,
        &format!(
            "<< /Type /FontDescriptor /FontName /{} /Flags {} /FontBBox [{} {} {} {}] /ItalicAngle {} /Ascent {} /Descent {} /CapHeight {} /StemV 80 /{} {} >>",
            base,
            flags,
            metrics.bbox.0,
            metrics.bbox.1,
            metrics.bbox.2,
            metrics.bbox.3,
            metrics.italic_angle,
            metrics.ascent,
            metrics.descent,
            metrics.cap_height,
            font_file_entry,
            file_id.reference()
        ),
    )?;

    let mut hex = ascii_hex_encode(&font.data);
    hex.push('>');
    let mut dict = format!("/Length1 {} /Filter /ASCIIHexDecode", font.data.len());
    if font.program_kind == FontProgramKind::OpenTypeCff {
        dict.push_str(" /Subtype /OpenType");
    }
    registry.write_stream(file_id, &dict, hex.as_bytes())
}

fn select_symbol_subtable<'a>(
    face: &'a ttf_parser::Face<'a>,
) -> (bool, Option<ttf_parser::cmap::Subtable<'a>>) {
    let Some(cmap) = face.tables().cmap else {
        return (false, None);
    };
    let mut first = None;
    let mut symbol = None;
    for subtable in cmap.subtables {
        if subtable.is_unicode() {
            return (false, None);
        }
        if first.is_none() {
            first = Some(subtable);
        }
        if subtable.platform_id == ttf_parser::name::PlatformId::Windows
            && subtable.encoding_id == 0
        {
            symbol = Some(subtable);
        }
    }
    (symbol.is_some(), symbol.or(first))
}

fn glyph_index_for_code<'a>(
    face: &'a ttf_parser::Face<'a>,
    code: u32,
    fallback: Option<ttf_parser::cmap::Subtable<'a>>,
) -> Option<ttf_parser::GlyphId> {
    if let Some(id) = winansi_char(code as u8).and_then(|ch| face.glyph_index(ch)) {
        return Some(id);
    }
    let subtable = fallback?;
    subtable
        .glyph_index(code)
        .or_else(|| subtable.glyph_index(code + 0xF000))
}

/// Unicode character of a WinAnsiEncoding byte code. Latin-1 except for
/// 0x80..=0x9F, where five codes are unassigned.
fn winansi_char(code: u8) -> Option<char> {
    let ch = match code {
        0x80 => '\u{20AC}',
        0x82 => '\u{201A}',
        0x83 => '\u{0192}',
        0x84 => '\u{201E}',
        0x85 => '\u{2026}',
        0x86 => '\u{2020}',
        0x87 => '\u{2021}',
        0x88 => '\u{02C6}',
        0x89 => '\u{2030}',
        0x8A => '\u{0160}',
        0x8B => '\u{2039}',
        0x8C => '\u{0152}',
        0x8E => '\u{017D}',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0x98 => '\u{02DC}',
        0x99 => '\u{2122}',
        0x9A => '\u{0161}',
        0x9B => '\u{203A}',
        0x9C => '\u{0153}',
        0x9E => '\u{017E}',
        0x9F => '\u{0178}',
        0x81 | 0x8D | 0x8F | 0x90 | 0x9D => return None,
        _ => code as char,
    };
    Some(ch)
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Primary name (PostScript, then full, then family, then `fallback`) and aliases.
fn font_names(face: &ttf_parser::Face<'_>, fallback: &str) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        let slot = match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => &mut family,
            name_id::FULL_NAME => &mut full,
            name_id::POST_SCRIPT_NAME => &mut post,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(name);
        }
    }

    let primary = post
        .clone()
        .or_else(|| full.clone())
        .or_else(|| family.clone())
        .unwrap_or_else(|| fallback.to_string());
    let aliases = [family, full, post]
        .into_iter()
        .flatten()
        .filter(|candidate| *candidate != primary)
        .collect();
    (primary, aliases)
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

pub(crate) fn sanitize_font_name(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if ch == ' ' {
            out.push('-');
        }
    }
    if out.is_empty() {
        "Embedded".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_request_splits_variant_tag_from_file_name() {
        let request = FontSpec::new("cmr10:slanted", 10.0);
        assert_eq!(request.file_name(), "cmr10");
        assert_eq!(request.size_milli_pt, 10_000);
        assert_eq!(FontSpec::new("ptmr", f32::NAN).size_pt(), 0.0);
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        let mut locator = DirectoryFontLocator::new();
        assert!(!locator.register_bytes(b"not a font".to_vec(), "broken"));
        assert!(locator.is_empty());
        assert!(locator.locate("broken").is_none());
    }

    #[test]
    fn missing_directory_registers_nothing() {
        let dir = std::env::temp_dir().join(format!("inkset_no_fonts_{}", std::process::id()));
        let locator = DirectoryFontLocator::new().with_dir(&dir);
        assert_eq!(locator.len(), 0);
        assert!(NoFontLocator.locate("cmr10").is_none());
    }

    #[test]
    fn font_names_are_sanitized_for_pdf() {
        assert_eq!(sanitize_font_name("Latin Modern/Roman"), "Latin-ModernRoman");
        assert_eq!(sanitize_font_name("()"), "Embedded");
    }

    #[test]
    fn winansi_codes_map_to_unicode() {
        assert_eq!(winansi_char(b'A'), Some('A'));
        assert_eq!(winansi_char(0x80), Some('\u{20AC}'));
        assert_eq!(winansi_char(0x97), Some('\u{2014}'));
        assert_eq!(winansi_char(0x8D), None);
        assert_eq!(winansi_char(0xE9), Some('\u{00E9}'));
    }

    #[test]
    fn cff_programs_need_pdf_1_6() {
        assert!(!FontProgramKind::OpenTypeCff.embeddable_in(PdfVersion::Pdf14));
        assert!(FontProgramKind::OpenTypeCff.embeddable_in(PdfVersion::Pdf17));
        assert!(FontProgramKind::TrueType.embeddable_in(PdfVersion::Pdf14));
    }

    #[test]
    fn synthesized_resource_collects_bitmaps() {
        let mut font = FontResource::synthesized();
        font.mark_used(b'a', &crate::glyph::Glyph::blank(10));
        font.mark_used(b'a', &crate::glyph::Glyph::blank(10));
        assert!(font.is_synthesized());
        assert_eq!(font.used_count(), 1);
        match &font.program {
            FontProgram::Synthesized(t3) => assert_eq!(t3.glyph_count(), 1),
            FontProgram::Outline(_) => panic!("expected a synthesized font"),
        }
    }
}
