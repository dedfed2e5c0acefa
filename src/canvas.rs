use crate::content::ContentStream;
use crate::registry::ObjectId;
use crate::text::{GlyphRequest, layout_rows};
use crate::types::{Color, Px, Rect, Transform};

/// Lifecycle of the page under construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageState {
    Building,
    TextOpen,
    Finalized,
}

/// Values last emitted into the content stream. `None` means nothing has been
/// emitted at this nesting level yet, so the next request always goes out.
#[derive(Debug, Clone, Default, PartialEq)]
struct GraphicsState {
    fill: Option<Color>,
    stroke: Option<Color>,
    alpha: Option<u16>,
    line_width: Option<Px>,
    font: Option<(String, Px)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveKind {
    Page,
    Clip,
    Transform,
}

/// Content and state of a finished page.
#[derive(Debug)]
pub(crate) struct FinishedPage {
    pub id: ObjectId,
    pub content: String,
    pub operator_count: usize,
    pub glyph_count: usize,
    /// Why the content was dropped, if it was.
    pub skipped: Option<String>,
}

/// Per-page graphics-state machine.
///
/// Drawing coordinates are device units with the origin at the bottom left. The
/// page opens with `q`, a `72/dpi` scale and a clip to the page; `finish` closes
/// every outstanding save so the stream is always balanced.
#[derive(Debug)]
pub(crate) struct PageCanvas {
    id: ObjectId,
    content: ContentStream,
    state: PageState,
    gs: GraphicsState,
    saved: Vec<(SaveKind, GraphicsState)>,
    pending: Vec<GlyphRequest>,
    text_cursor: (Px, Px),
    glyph_count: usize,
    poisoned: Option<String>,
}

impl PageCanvas {
    pub(crate) fn begin(id: ObjectId, scale: f64, width: Px, height: Px) -> Self {
        let mut canvas = Self {
            id,
            content: ContentStream::new(),
            state: PageState::Building,
            gs: GraphicsState::default(),
            saved: Vec::new(),
            pending: Vec::new(),
            text_cursor: (Px::ZERO, Px::ZERO),
            glyph_count: 0,
            poisoned: None,
        };
        canvas.content.save();
        canvas.content.concat(&Transform::scale(scale, scale));
        canvas.content.save();
        canvas.push(SaveKind::Page);
        canvas.content.rect(Px::ZERO, Px::ZERO, width, height);
        canvas.content.clip();
        canvas
    }

    /// Marks the page as unrepresentable. The first reason is kept.
    pub(crate) fn poison(&mut self, reason: impl Into<String>) {
        if self.poisoned.is_none() {
            self.poisoned = Some(reason.into());
        }
    }

    /// Validates a coordinate, poisoning the page when it is not finite.
    pub(crate) fn coord(&mut self, value: f32, what: &str) -> Option<Px> {
        let px = Px::try_from_f32(value);
        if px.is_none() {
            self.poison(format!("non-finite {} ({})", what, value));
        }
        px
    }

    fn push(&mut self, kind: SaveKind) {
        self.saved.push((kind, self.gs.clone()));
    }

    fn open_text(&mut self) {
        if self.state == PageState::Building {
            self.content.begin_text();
            self.text_cursor = (Px::ZERO, Px::ZERO);
            self.state = PageState::TextOpen;
        }
    }

    /// Flushes pending glyphs and leaves the text object, if one is open.
    pub(crate) fn close_text(&mut self) {
        if self.state == PageState::TextOpen {
            self.flush_glyphs();
            self.content.end_text();
            self.state = PageState::Building;
        }
    }

    fn flush_glyphs(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let size = self
            .gs
            .font
            .as_ref()
            .map(|(_, size)| *size)
            .unwrap_or(Px::from_i32(1));
        let glyphs = std::mem::take(&mut self.pending);
        for row in layout_rows(&glyphs, size, &mut self.text_cursor) {
            self.content.text_move(row.dx, row.dy);
            self.content.show_positioned(&row.items);
        }
    }

    /// Opens a text object if needed and makes `resource` at `size` the current font.
    pub(crate) fn select_font(&mut self, resource: &str, size: Px) {
        self.open_text();
        let wanted = (resource.to_string(), size);
        if self.gs.font.as_ref() != Some(&wanted) {
            self.flush_glyphs();
            self.content.font(resource, size);
            self.gs.font = Some(wanted);
        }
    }

    pub(crate) fn queue_glyph(&mut self, glyph: GlyphRequest) {
        self.open_text();
        self.pending.push(glyph);
        self.glyph_count += 1;
    }

    pub(crate) fn set_fill(&mut self, color: Color) {
        let rgb = color.opaque();
        if self.gs.fill != Some(rgb) {
            self.flush_glyphs();
            self.content.fill_rgb(rgb);
            self.gs.fill = Some(rgb);
        }
    }

    pub(crate) fn set_stroke(&mut self, color: Color) {
        let rgb = color.opaque();
        if self.gs.stroke != Some(rgb) {
            self.flush_glyphs();
            self.content.stroke_rgb(rgb);
            self.gs.stroke = Some(rgb);
        }
    }

    /// Pages start fully opaque.
    pub(crate) fn alpha_differs(&self, milli: u16) -> bool {
        self.gs.alpha.unwrap_or(1000) != milli
    }

    /// Emits `gs` for an alpha level whose ExtGState is pooled as `resource`.
    pub(crate) fn set_alpha(&mut self, milli: u16, resource: &str) {
        if self.alpha_differs(milli) {
            self.flush_glyphs();
            self.content.ext_gstate(resource);
            self.gs.alpha = Some(milli);
        }
    }

    pub(crate) fn set_line_width(&mut self, width: Px) {
        let width = width.max(Px::ZERO);
        if self.gs.line_width != Some(width) {
            self.content.line_width(width);
            self.gs.line_width = Some(width);
        }
    }

    pub(crate) fn push_clip(&mut self, rect: Rect) {
        self.close_text();
        self.content.save();
        self.push(SaveKind::Clip);
        self.content.rect(rect.x, rect.y, rect.width, rect.height);
        self.content.clip();
    }

    /// Restores the state saved by the most recent clip push, closing any
    /// transforms pushed after it. Does nothing without an outstanding clip.
    pub(crate) fn pop_clip(&mut self) -> bool {
        self.pop_through(SaveKind::Clip)
    }

    pub(crate) fn push_transform(&mut self, transform: &Transform) {
        self.close_text();
        self.content.save();
        self.push(SaveKind::Transform);
        self.content.concat(transform);
    }

    pub(crate) fn pop_transform(&mut self) -> bool {
        self.pop_through(SaveKind::Transform)
    }

    fn pop_through(&mut self, kind: SaveKind) -> bool {
        if !self.saved.iter().any(|(k, _)| *k == kind) {
            return false;
        }
        self.close_text();
        while let Some((k, state)) = self.saved.pop() {
            self.content.restore();
            self.gs = state;
            if k == kind {
                break;
            }
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn save_depth(&self) -> usize {
        self.saved.len()
    }

    pub(crate) fn line(&mut self, from: (Px, Px), to: (Px, Px)) {
        self.polyline(&[from, to]);
    }

    pub(crate) fn polyline(&mut self, points: &[(Px, Px)]) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        self.close_text();
        self.content.move_to(px64(first.0), px64(first.1));
        for point in rest {
            self.content.line_to(px64(point.0), px64(point.1));
        }
        self.content.stroke();
    }

    pub(crate) fn polygon(&mut self, points: &[(Px, Px)]) {
        let Some((first, rest)) = points.split_first() else {
            return;
        };
        self.close_text();
        self.content.move_to(px64(first.0), px64(first.1));
        for point in rest {
            self.content.line_to(px64(point.0), px64(point.1));
        }
        self.content.close_path();
        self.content.fill();
    }

    /// Fills a rectangle with the current fill colour. Empty rectangles draw nothing.
    pub(crate) fn fill_rect(&mut self, rect: Rect) {
        if rect.width == Px::ZERO || rect.height == Px::ZERO {
            return;
        }
        self.close_text();
        self.content.rect(rect.x, rect.y, rect.width, rect.height);
        self.content.fill();
    }

    /// Paints `rect` with `background` without touching the tracked fill colour.
    pub(crate) fn clear(&mut self, rect: Rect, background: Color) {
        self.close_text();
        self.content.save();
        self.content.fill_rgb(background.opaque());
        self.content.rect(rect.x, rect.y, rect.width, rect.height);
        self.content.fill();
        self.content.restore();
    }

    /// Elliptic arc inscribed in `rect`, starting at `start_deg` and sweeping
    /// counter-clockwise by `sweep_deg`. Partial arcs are closed through the centre.
    pub(crate) fn arc(&mut self, rect: Rect, start_deg: f64, sweep_deg: f64, filled: bool) {
        self.close_text();
        let rx = px64(rect.width) / 2.0;
        let ry = px64(rect.height) / 2.0;
        let local = Transform::rotate(start_deg.to_radians())
            .then(Transform::scale(rx, ry))
            .then(Transform::translate(px64(rect.x) + rx, px64(rect.y) + ry));

        let sweep = sweep_deg.clamp(-360.0, 360.0);
        let full = sweep.abs() >= 360.0;
        if full {
            let (x, y) = local.apply(1.0, 0.0);
            self.content.move_to(x, y);
        } else {
            let (cx, cy) = local.apply(0.0, 0.0);
            let (x, y) = local.apply(1.0, 0.0);
            self.content.move_to(cx, cy);
            self.content.line_to(x, y);
        }
        for (c1, c2, end) in arc_segments(sweep.to_radians()) {
            self.content
                .curve_to(local.apply(c1.0, c1.1), local.apply(c2.0, c2.1), local.apply(end.0, end.1));
        }
        self.content.close_path();
        if filled {
            self.content.fill();
        } else {
            self.content.stroke();
        }
    }

    /// Paints a pooled XObject under `placement`, clipped to `clip` when given.
    pub(crate) fn draw_xobject(&mut self, resource: &str, placement: &Transform, clip: Option<Rect>) {
        self.close_text();
        self.content.save();
        if let Some(rect) = clip {
            self.content.rect(rect.x, rect.y, rect.width, rect.height);
            self.content.clip();
        }
        self.content.concat(placement);
        self.content.xobject(resource);
        self.content.restore();
    }

    /// Closes the text object and every outstanding save, including the page-level one.
    pub(crate) fn finish(mut self) -> FinishedPage {
        self.close_text();
        while self.saved.pop().is_some() {
            self.content.restore();
        }
        // The scale transform's outer `q`.
        self.content.restore();
        self.state = PageState::Finalized;
        let operator_count = self.content.operator_count();
        let content = if self.poisoned.is_some() {
            String::new()
        } else {
            self.content.into_string()
        };
        FinishedPage {
            id: self.id,
            content,
            operator_count,
            glyph_count: self.glyph_count,
            skipped: self.poisoned,
        }
    }
}

fn px64(value: Px) -> f64 {
    value.to_milli_i64() as f64 / 1000.0
}

/// Cubic segments approximating a unit-circle arc from angle 0 to `sweep` radians,
/// each spanning at most a quarter turn. Returns `(control1, control2, end)`.
pub(crate) fn arc_segments(sweep: f64) -> Vec<((f64, f64), (f64, f64), (f64, f64))> {
    let quarter = std::f64::consts::FRAC_PI_2;
    let count = ((sweep.abs() / quarter).ceil() as usize).max(1);
    let step = sweep / count as f64;
    let k = 4.0 / 3.0 * libm::tan(step / 4.0);
    let mut out = Vec::with_capacity(count);
    let mut theta = 0.0f64;
    for _ in 0..count {
        let next = theta + step;
        let (s0, c0) = (libm::sin(theta), libm::cos(theta));
        let (s1, c1) = (libm::sin(next), libm::cos(next));
        out.push((
            (c0 - k * s0, s0 + k * c0),
            (c1 + k * s1, s1 - k * c1),
            (c1, s1),
        ));
        theta = next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> PageCanvas {
        PageCanvas::begin(ObjectId::from_raw(4), 72.0 / 600.0, Px::from_i32(4960), Px::from_i32(7016))
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.lines().filter(|line| *line == needle).count()
    }

    fn px(v: i32) -> Px {
        Px::from_i32(v)
    }

    #[test]
    fn page_prologue_scales_and_clips() {
        let page = canvas().finish();
        assert_eq!(
            page.content,
            "q\n0.12 0 0 0.12 0 0 cm\nq\n0 0 4960 7016 re\nW n\nQ\nQ\n"
        );
    }

    #[test]
    fn repeated_colour_is_emitted_once() {
        let mut c = canvas();
        c.set_fill(Color::rgb(255, 0, 0));
        c.set_fill(Color::rgba(255, 0, 0, 10));
        c.set_stroke(Color::BLACK);
        c.set_stroke(Color::BLACK);
        let page = c.finish();
        assert_eq!(count(&page.content, "1 0 0 rg"), 1);
        assert_eq!(count(&page.content, "0 0 0 RG"), 1);
    }

    #[test]
    fn unbalanced_pushes_are_closed_at_finish() {
        let mut c = canvas();
        c.push_clip(Rect::from_corners(px(0), px(0), px(10), px(10)));
        c.push_transform(&Transform::translate(5.0, 5.0));
        c.push_clip(Rect::from_corners(px(1), px(1), px(2), px(2)));
        assert_eq!(c.save_depth(), 4);
        let page = c.finish();
        assert_eq!(count(&page.content, "q"), count(&page.content, "Q"));
    }

    #[test]
    fn pop_clip_unwinds_intervening_transforms_and_restores_state() {
        let mut c = canvas();
        c.set_fill(Color::BLACK);
        c.push_clip(Rect::from_corners(px(0), px(0), px(10), px(10)));
        c.set_fill(Color::WHITE);
        c.push_transform(&Transform::IDENTITY);
        assert!(c.pop_clip());
        assert_eq!(c.save_depth(), 1);
        // Black is current again after the restore, so it is not re-emitted.
        c.set_fill(Color::BLACK);
        assert!(!c.pop_clip());
        assert!(!c.pop_transform());
        let page = c.finish();
        assert_eq!(count(&page.content, "0 0 0 rg"), 1);
    }

    #[test]
    fn glyph_runs_open_text_once_and_close_before_graphics() {
        let mut c = canvas();
        c.select_font("F1", px(100));
        for (i, code) in b"ab".iter().enumerate() {
            c.queue_glyph(GlyphRequest {
                code: *code,
                x: px(100 + 20 * i as i32),
                y: px(500),
                advance: px(20),
            });
        }
        c.select_font("F1", px(100));
        c.line((px(0), px(0)), (px(10), px(0)));
        let page = c.finish();
        assert_eq!(count(&page.content, "BT"), 1);
        assert_eq!(count(&page.content, "ET"), 1);
        assert_eq!(count(&page.content, "/F1 100 Tf"), 1);
        let tj = page.content.find("[(ab)] TJ").expect("run");
        let et = page.content.find("ET").expect("ET");
        let stroke = page.content.find("\nS\n").expect("stroke");
        assert!(tj < et && et < stroke);
        assert_eq!(page.glyph_count, 2);
    }

    #[test]
    fn colour_change_flushes_pending_glyphs_first() {
        let mut c = canvas();
        c.select_font("F2", px(100));
        c.queue_glyph(GlyphRequest {
            code: b'x',
            x: px(0),
            y: px(0),
            advance: px(10),
        });
        c.set_fill(Color::rgb(0, 0, 255));
        let page = c.finish();
        let run = page.content.find("(x)").expect("run");
        let colour = page.content.find("0 0 1 rg").expect("colour");
        assert!(run < colour);
        assert_eq!(count(&page.content, "BT"), 1);
    }

    #[test]
    fn poisoned_page_keeps_no_content() {
        let mut c = canvas();
        assert!(c.coord(f32::NAN, "x").is_none());
        c.fill_rect(Rect::from_corners(px(0), px(0), px(5), px(5)));
        let page = c.finish();
        assert!(page.content.is_empty());
        assert!(page.skipped.expect("reason").contains("non-finite x"));
    }

    #[test]
    fn quarter_arc_uses_one_segment_with_standard_handles() {
        let segments = arc_segments(std::f64::consts::FRAC_PI_2);
        assert_eq!(segments.len(), 1);
        let ((x1, y1), (x2, y2), (x3, y3)) = segments[0];
        let k = 0.5522847498;
        assert!((x1 - 1.0).abs() < 1e-9 && (y1 - k).abs() < 1e-6);
        assert!((x2 - k).abs() < 1e-6 && (y2 - 1.0).abs() < 1e-9);
        assert!(x3.abs() < 1e-9 && (y3 - 1.0).abs() < 1e-9);
        assert_eq!(arc_segments(std::f64::consts::PI * 2.0).len(), 4);
        assert_eq!(arc_segments(-std::f64::consts::PI).len(), 2);
    }

    #[test]
    fn partial_arc_is_closed_through_the_centre() {
        let mut c = canvas();
        c.arc(Rect::from_corners(px(0), px(0), px(200), px(100)), 0.0, 90.0, true);
        let page = c.finish();
        assert!(page.content.contains("100 50 m\n200 50 l\n"));
        assert!(page.content.contains("h\nf\n"));
        let mut full = canvas();
        full.arc(Rect::from_corners(px(0), px(0), px(200), px(100)), 0.0, 360.0, false);
        let page = full.finish();
        assert!(page.content.contains("200 50 m\n"));
        assert_eq!(page.content.matches(" c\n").count(), 4);
        assert!(page.content.contains("h\nS\n"));
    }
}
