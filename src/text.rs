use crate::content::TextItem;
use crate::types::Px;

/// Gaps narrower than this are treated as rounding noise and absorbed.
pub(crate) const KERNING_TOLERANCE_PX: i32 = 4;

/// A glyph waiting to be emitted: character code, baseline origin and advance,
/// all in device units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GlyphRequest {
    pub code: u8,
    pub x: Px,
    pub y: Px,
    pub advance: Px,
}

/// One `Td` + `TJ` pair.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PositionedRow {
    pub dx: Px,
    pub dy: Px,
    pub items: Vec<TextItem>,
}

/// Groups glyphs into baseline rows and folds small gaps into string runs.
///
/// `cursor` is the last position set with `Td` inside the current text object; it
/// is updated to the start of the final row. `font_size` is the size given to `Tf`,
/// in device units, and scales the adjustments into thousandths of text space.
pub(crate) fn layout_rows(
    glyphs: &[GlyphRequest],
    font_size: Px,
    cursor: &mut (Px, Px),
) -> Vec<PositionedRow> {
    let tolerance = Px::from_i32(KERNING_TOLERANCE_PX);
    let size_milli = font_size.to_milli_i64().max(1);
    let mut rows = Vec::new();
    let mut i = 0;

    while i < glyphs.len() {
        let start = glyphs[i];
        let mut items = Vec::new();
        let mut run = vec![start.code];
        let mut x = start.x;
        let mut advance = start.advance;
        i += 1;

        while i < glyphs.len() && glyphs[i].y == start.y {
            let glyph = glyphs[i];
            let mut dx = glyph.x - x - advance;
            if dx.abs() >= tolerance {
                items.push(TextItem::Run(std::mem::take(&mut run)));
                items.push(TextItem::Adjust(adjustment(dx, size_milli)));
            } else {
                dx = Px::ZERO;
            }
            x = x + advance + dx;
            advance = glyph.advance;
            run.push(glyph.code);
            i += 1;
        }
        items.push(TextItem::Run(run));

        rows.push(PositionedRow {
            dx: start.x - cursor.0,
            dy: start.y - cursor.1,
            items,
        });
        *cursor = (start.x, start.y);
    }
    rows
}

/// `-dx * 1000 / size`, rounded to the nearest integer.
fn adjustment(dx: Px, size_milli: i64) -> i64 {
    let num = -(dx.to_milli_i64() as i128) * 1000;
    let den = size_milli as i128;
    let rounded = if num >= 0 {
        (num + den / 2) / den
    } else {
        -((-num + den / 2) / den)
    };
    rounded as i64
}
