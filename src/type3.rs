use std::collections::BTreeMap;
use std::io::Write;

use crate::error::RenderError;
use crate::glyph::Glyph;
use crate::registry::{AllocateId, ObjectId, ObjectRegistry};

/// Text set in a synthesized font always uses this `Tf` size; with the
/// `0.01` font matrix one glyph unit is one device unit.
pub(crate) const TYPE3_TEXT_SIZE: i32 = 100;

/// A Type 3 font assembled from the bitmaps of the codes actually used.
#[derive(Debug, Clone, Default)]
pub(crate) struct Type3Font {
    glyphs: BTreeMap<u8, Glyph>,
}

impl Type3Font {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a used code. The first bitmap seen for a code is kept.
    pub(crate) fn add_glyph(&mut self, code: u8, glyph: &Glyph) {
        self.glyphs.entry(code).or_insert_with(|| glyph.clone());
    }

    pub(crate) fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// Union of the boxes of all inked glyphs, `[0 0 0 0]` when nothing has ink.
    fn font_bbox(&self) -> (i32, i32, i32, i32) {
        self.glyphs
            .values()
            .filter(|glyph| glyph.has_ink())
            .map(Glyph::bounding_box)
            .reduce(|a, b| (a.0.min(b.0), a.1.min(b.1), a.2.max(b.2), a.3.max(b.3)))
            .unwrap_or((0, 0, 0, 0))
    }

    /// Writes the glyph procedures and the font dictionary into `font_id`.
    pub(crate) fn write<W: Write>(
        &self,
        font_id: ObjectId,
        registry: &mut ObjectRegistry<W>,
    ) -> Result<(), RenderError> {
        let mut procs = Vec::with_capacity(self.glyphs.len());
        for (&code, glyph) in &self.glyphs {
            let id = registry.allocate();
            registry.write_stream(id, "", char_proc(glyph).as_bytes())?;
            procs.push((code, id));
        }

        let codes: Vec<u8> = self.glyphs.keys().copied().collect();
        let (first, last) = match (codes.first(), codes.last()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => (0, 0),
        };

        let mut char_procs = String::from("<<");
        for (code, id) in &procs {
            char_procs.push_str(&format!(" /ch{} {}", code, id.reference()));
        }
        if let Some((_, id)) = procs.first() {
            char_procs.push_str(&format!(" /.notdef {}", id.reference()));
        }
        char_procs.push_str(" >>");

        let (llx, lly, urx, ury) = self.font_bbox();
        let body = format!(
            "<< /Type /Font /Subtype /Type3 /FontBBox [{} {} {} {}] /FontMatrix [0.01 0 0 0.01 0 0] /CharProcs {} /Encoding << /Type /Encoding /Differences [{}] >> /FirstChar {} /LastChar {} /Widths [{}] /Resources << >> >>",
            llx,
            lly,
            urx,
            ury,
            char_procs,
            differences(&codes),
            first,
            last,
            widths(&self.glyphs, first, last)
        );
        registry.write_str(font_id, &body)
    }
}

/// Glyph procedure: `d0` for blank glyphs, otherwise `d1` followed by an
/// inline image mask scaled onto the glyph's pixel box.
pub(crate) fn char_proc(glyph: &Glyph) -> String {
    if !glyph.has_ink() {
        return format!("{} 0 d0", glyph.advance);
    }
    let (llx, lly, urx, ury) = glyph.bounding_box();
    format!(
        "{} 0 {} {} {} {} d1\nq\n{} 0 0 {} {} {} cm\nBI\n/W {}\n/H {}\n/CS /G\n/BPC 1\n/F /AHx\n/D [0.0 1.0]\n/IM true\nID\n{}>\nEI\nQ",
        glyph.advance,
        llx,
        lly,
        urx,
        ury,
        glyph.width,
        glyph.height,
        llx,
        lly,
        glyph.width,
        glyph.height,
        glyph.mask_hex()
    )
}

/// Differences array over sorted codes: a code is written only where a run of
/// consecutive codes starts.
pub(crate) fn differences(codes: &[u8]) -> String {
    let mut out = Vec::with_capacity(codes.len() * 2);
    let mut previous: Option<u8> = None;
    for &code in codes {
        let continues = previous.is_some_and(|p| p as u16 + 1 == code as u16);
        if !continues {
            out.push(code.to_string());
        }
        out.push(format!("/ch{}", code));
        previous = Some(code);
    }
    out.join(" ")
}

/// Widths from `first` to `last`, zero for codes that were never used.
fn widths(glyphs: &BTreeMap<u8, Glyph>, first: u8, last: u8) -> String {
    (first..=last)
        .map(|code| {
            glyphs
                .get(&code)
                .map(|glyph| glyph.advance)
                .unwrap_or(0)
                .to_string()
        })
        .collect::<Vec<_>>()
        .join(" ")
}
