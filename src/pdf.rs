use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use crate::canvas::{FinishedPage, PageCanvas};
use crate::content::{escape_pdf_text, format_milli};
use crate::convert::{BBox, ImageConverter};
use crate::debug::{DebugLogger, Field};
use crate::error::{RenderError, RenderWarning, WarningCode};
use crate::font::{FontLocator, FontResource, FontSpec, OutlineFont};
use crate::glyph::{Glyph, GlyphSource};
use crate::glyph_report::GlyphCoverageReport;
use crate::xobject::{EncodedImage, ImageKey, ImageResource, Picture, PictureKey, write_image_form};
use crate::link::{LinkAnnotation, LinkTarget, internal_label, padded};
use crate::metrics::{DocumentMetrics, PageMetrics};
use crate::outline::{DestinationTable, OutlineEntry, PagePoint, build_tree, normalize_levels, toc_level, write_outlines};
use crate::perf::PerfLogger;
use crate::pool::ResourcePool;
use crate::registry::{AllocateId, ObjectId, ObjectRegistry, PdfVersion};
use crate::text::GlyphRequest;
use crate::type3::TYPE3_TEXT_SIZE;
use crate::types::{Color, Px, Rect, Size, Transform};

/// How glyphs of fonts without an outline program are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlyphMode {
    /// One synthesized Type 3 font per font name.
    #[default]
    Type3Fonts,
    /// Every distinct glyph becomes a pooled grayscale image.
    BitmapImages,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOptions {
    pub pdf_version: PdfVersion,
    pub glyph_mode: GlyphMode,
    /// Draws link rectangles with a visible dashed border.
    pub preserve_link_borders: bool,
    pub title: Option<String>,
}

/// What `finish` reports back.
#[derive(Debug, Clone, Default)]
pub struct RenderSummary {
    pub bytes_written: usize,
    pub metrics: DocumentMetrics,
    pub warnings: Vec<RenderWarning>,
    pub glyph_coverage: GlyphCoverageReport,
}

/// Everything a renderer needs, assembled by the builder.
pub(crate) struct RendererParts {
    pub dpi: u32,
    pub page_size: Size,
    pub options: RenderOptions,
    pub glyph_source: Box<dyn GlyphSource>,
    pub font_locator: Box<dyn FontLocator>,
    pub image_converter: Box<dyn ImageConverter>,
    pub debug: Option<DebugLogger>,
    pub perf: Option<PerfLogger>,
}

/// Page under construction plus what the document needs to know about it.
struct OpenPage {
    canvas: PageCanvas,
    annots: Vec<ObjectId>,
    started: Instant,
}

/// Streaming PDF renderer.
///
/// Drawing calls take device units (pixels at the configured dpi) with the origin
/// at the bottom left of the page. Pages are written as soon as they end; fonts,
/// images and navigation objects are collected in pools and written by `finish`.
pub struct PdfRenderer<W: Write> {
    registry: ObjectRegistry<W>,
    options: RenderOptions,
    glyph_source: Box<dyn GlyphSource>,
    font_locator: Box<dyn FontLocator>,
    image_converter: Box<dyn ImageConverter>,
    debug: Option<DebugLogger>,
    perf: Option<PerfLogger>,

    dpi: u32,
    scale: f64,
    page_size: Size,
    page_width: Px,
    page_height: Px,

    catalog_id: ObjectId,
    pages_id: ObjectId,
    resources_id: ObjectId,

    page: Option<OpenPage>,
    page_ids: Vec<ObjectId>,

    fonts: ResourcePool<String, FontResource>,
    outline_fonts: HashMap<String, Option<Arc<OutlineFont>>>,
    images: ResourcePool<ImageKey, ImageResource>,
    pictures: ResourcePool<PictureKey, Picture>,
    glyph_bitmaps: ResourcePool<(String, u8), Glyph>,
    alpha_states: ResourcePool<u16, u16>,

    dests: DestinationTable,
    outlines: Vec<OutlineEntry>,
    annotations: Vec<LinkAnnotation>,

    fill: Color,
    stroke: Color,
    line_width: Px,
    background: Color,

    warnings: Vec<RenderWarning>,
    coverage: GlyphCoverageReport,
    metrics: DocumentMetrics,
}

impl<W: Write> PdfRenderer<W> {
    pub(crate) fn new(writer: W, parts: RendererParts) -> Result<Self, RenderError> {
        let mut registry = ObjectRegistry::new(writer, parts.options.pdf_version)?;
        let catalog_id = registry.allocate();
        let pages_id = registry.allocate();
        let resources_id = registry.allocate();
        let per_point = parts.dpi as f32 / 72.0;
        Ok(Self {
            registry,
            glyph_source: parts.glyph_source,
            font_locator: parts.font_locator,
            image_converter: parts.image_converter,
            debug: parts.debug,
            perf: parts.perf,
            dpi: parts.dpi,
            scale: 72.0 / parts.dpi as f64,
            page_size: parts.page_size,
            page_width: Px::from_f32(parts.page_size.width * per_point),
            page_height: Px::from_f32(parts.page_size.height * per_point),
            options: parts.options,
            catalog_id,
            pages_id,
            resources_id,
            page: None,
            page_ids: Vec::new(),
            fonts: ResourcePool::new("F"),
            outline_fonts: HashMap::new(),
            images: ResourcePool::new("Im"),
            pictures: ResourcePool::new("Pic"),
            glyph_bitmaps: ResourcePool::new("G"),
            alpha_states: ResourcePool::new("GS"),
            dests: DestinationTable::default(),
            outlines: Vec::new(),
            annotations: Vec::new(),
            fill: Color::BLACK,
            stroke: Color::BLACK,
            line_width: Px::from_i32(1),
            background: Color::WHITE,
            warnings: Vec::new(),
            coverage: GlyphCoverageReport::default(),
            metrics: DocumentMetrics::default(),
        })
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Page size in points.
    pub fn page_size(&self) -> Size {
        self.page_size
    }

    /// Page size in device units.
    pub fn page_extent(&self) -> (f32, f32) {
        (self.page_width.to_f32(), self.page_height.to_f32())
    }

    /// Number of pages written or in progress.
    pub fn page_count(&self) -> usize {
        self.page_ids.len() + usize::from(self.page.is_some())
    }

    pub fn warnings(&self) -> &[RenderWarning] {
        &self.warnings
    }

    /// Starts a new page, ending the current one first.
    pub fn begin_page(&mut self) -> Result<(), RenderError> {
        self.end_page()?;
        let id = self.registry.allocate();
        let mut canvas = PageCanvas::begin(id, self.scale, self.page_width, self.page_height);
        canvas.set_fill(self.fill);
        canvas.set_stroke(self.stroke);
        canvas.set_line_width(self.line_width);
        self.page = Some(OpenPage {
            canvas,
            annots: Vec::new(),
            started: Instant::now(),
        });
        let alpha = self.fill.alpha_milli();
        self.apply_alpha(alpha);
        Ok(())
    }

    /// Writes the current page, if any.
    pub fn end_page(&mut self) -> Result<(), RenderError> {
        let Some(open) = self.page.take() else {
            return Ok(());
        };
        let page_number = self.page_ids.len() + 1;
        let finished = open.canvas.finish();
        if let Some(reason) = &finished.skipped {
            let message = format!("page {}: {}", page_number, reason);
            if let Some(debug) = &self.debug {
                debug.event(
                    "pdf.page.skipped",
                    &[("page", Field::Int(page_number as i64)), ("reason", Field::Str(reason))],
                );
            }
            self.warn(WarningCode::PageWriteFailure, message);
        }
        let content_bytes = self.write_page(&finished, &open.annots)?;
        self.page_ids.push(finished.id);

        let render_ms = open.started.elapsed().as_secs_f64() * 1000.0;
        if let Some(perf) = &self.perf {
            perf.log_span_ms("pdf.page", Some(page_number), render_ms);
            perf.log_counts(
                "pdf.page",
                Some(page_number),
                &[
                    ("operators", finished.operator_count as u64),
                    ("glyphs", finished.glyph_count as u64),
                    ("bytes", content_bytes as u64),
                ],
            );
        }
        self.metrics.pages.push(PageMetrics {
            page_number,
            render_ms,
            operator_count: finished.operator_count,
            glyph_count: finished.glyph_count,
            content_bytes,
            skipped: finished.skipped.is_some(),
        });
        Ok(())
    }

    /// Ends the current page and starts the next one.
    pub fn next_page(&mut self) -> Result<(), RenderError> {
        self.begin_page()
    }

    fn write_page(&mut self, page: &FinishedPage, annots: &[ObjectId]) -> Result<usize, RenderError> {
        let content_id = self.registry.allocate();
        self.registry
            .write_stream(content_id, "", page.content.as_bytes())?;
        let mut body = format!(
            "<< /Type /Page /Parent {} /MediaBox [0 0 {} {}] /Resources {} /Contents {}",
            self.pages_id.reference(),
            format_milli(points_milli(self.page_size.width)),
            format_milli(points_milli(self.page_size.height)),
            self.resources_id.reference(),
            content_id.reference()
        );
        if !annots.is_empty() {
            let refs = annots
                .iter()
                .map(|id| id.reference())
                .collect::<Vec<_>>()
                .join(" ");
            body.push_str(&format!(" /Annots [{}]", refs));
        }
        body.push_str(" >>");
        self.registry.write_str(page.id, &body)?;
        Ok(page.content.len())
    }

    fn canvas(&mut self) -> Result<&mut PageCanvas, RenderError> {
        if self.page.is_none() {
            self.begin_page()?;
        }
        match self.page.as_mut() {
            Some(open) => Ok(&mut open.canvas),
            None => Err(RenderError::InvalidConfiguration("page could not be opened".to_string())),
        }
    }

    /// Zero-based index of the page being drawn.
    fn current_page_index(&self) -> usize {
        self.page_ids.len()
    }

    fn point(&mut self, x: f32, y: f32) -> Result<Option<(Px, Px)>, RenderError> {
        let canvas = self.canvas()?;
        let x = canvas.coord(x, "x");
        let y = canvas.coord(y, "y");
        Ok(x.zip(y))
    }

    fn rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> Result<Option<Rect>, RenderError> {
        let canvas = self.canvas()?;
        let x = canvas.coord(x, "x");
        let y = canvas.coord(y, "y");
        let w = canvas.coord(width, "width");
        let h = canvas.coord(height, "height");
        Ok(match (x, y, w, h) {
            (Some(x), Some(y), Some(width), Some(height)) => Some(Rect { x, y, width, height }),
            _ => None,
        })
    }

    fn points(&mut self, points: &[(f32, f32)]) -> Result<Option<Vec<(Px, Px)>>, RenderError> {
        let mut out = Vec::with_capacity(points.len());
        for &(x, y) in points {
            match self.point(x, y)? {
                Some(point) => out.push(point),
                None => return Ok(None),
            }
        }
        Ok(Some(out))
    }

    fn apply_alpha(&mut self, milli: u16) {
        let Some(open) = self.page.as_mut() else {
            return;
        };
        if !open.canvas.alpha_differs(milli) {
            return;
        }
        let entry = self
            .alpha_states
            .get_or_create(milli, &mut self.registry, || milli);
        open.canvas.set_alpha(milli, &entry.name);
    }

    /// Fill colour for shapes and text. The alpha channel selects an opacity state.
    pub fn set_fill_color(&mut self, color: Color) -> Result<(), RenderError> {
        self.fill = color;
        self.canvas()?.set_fill(color);
        self.apply_alpha(color.alpha_milli());
        Ok(())
    }

    pub fn set_stroke_color(&mut self, color: Color) -> Result<(), RenderError> {
        self.stroke = color;
        self.canvas()?.set_stroke(color);
        self.apply_alpha(color.alpha_milli());
        Ok(())
    }

    pub fn set_line_width(&mut self, width: f32) -> Result<(), RenderError> {
        let canvas = self.canvas()?;
        if let Some(width) = canvas.coord(width, "line width") {
            canvas.set_line_width(width);
            self.line_width = width;
        }
        Ok(())
    }

    /// Fill colour, stroke colour and line width in one call.
    pub fn set_pen(&mut self, color: Color, width: f32) -> Result<(), RenderError> {
        self.set_fill_color(color)?;
        self.set_stroke_color(color)?;
        self.set_line_width(width)
    }

    /// Colour used by `clear`.
    pub fn set_background(&mut self, color: Color) {
        self.background = color;
    }

    /// Replaces the current clip rectangle with the one spanned by the two corners.
    pub fn set_clipping(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Result<(), RenderError> {
        let corners = (self.point(x1, y1)?, self.point(x2, y2)?);
        let canvas = self.canvas()?;
        canvas.pop_clip();
        if let (Some((x1, y1)), Some((x2, y2))) = corners {
            canvas.push_clip(Rect::from_corners(x1, y1, x2, y2));
        }
        Ok(())
    }

    pub fn reset_clipping(&mut self) -> Result<(), RenderError> {
        self.canvas()?.pop_clip();
        Ok(())
    }

    pub fn push_transform(&mut self, transform: Transform) -> Result<(), RenderError> {
        let canvas = self.canvas()?;
        if !transform.is_finite() {
            canvas.poison("non-finite transform");
            return Ok(());
        }
        canvas.push_transform(&transform);
        Ok(())
    }

    /// Returns false when no transform was outstanding.
    pub fn pop_transform(&mut self) -> Result<bool, RenderError> {
        Ok(self.canvas()?.pop_transform())
    }

    pub fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Result<(), RenderError> {
        if let (Some(from), Some(to)) = (self.point(x1, y1)?, self.point(x2, y2)?) {
            self.canvas()?.line(from, to);
        }
        Ok(())
    }

    /// Open polyline through `points`.
    pub fn lines(&mut self, points: &[(f32, f32)]) -> Result<(), RenderError> {
        if let Some(points) = self.points(points)? {
            self.canvas()?.polyline(&points);
        }
        Ok(())
    }

    /// Filled closed polygon.
    pub fn polygon(&mut self, points: &[(f32, f32)]) -> Result<(), RenderError> {
        if let Some(points) = self.points(points)? {
            self.canvas()?.polygon(&points);
        }
        Ok(())
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> Result<(), RenderError> {
        if let Some(rect) = self.rect(x, y, width, height)? {
            self.canvas()?.fill_rect(rect);
        }
        Ok(())
    }

    /// Paints the rectangle with the background colour.
    pub fn clear(&mut self, x: f32, y: f32, width: f32, height: f32) -> Result<(), RenderError> {
        let background = self.background;
        if let Some(rect) = self.rect(x, y, width, height)? {
            self.canvas()?.clear(rect, background);
        }
        Ok(())
    }

    /// Stroked elliptic arc inscribed in the rectangle; angles in degrees,
    /// counter-clockwise from the positive x axis.
    pub fn arc(&mut self, x: f32, y: f32, width: f32, height: f32, start: f32, sweep: f32) -> Result<(), RenderError> {
        self.draw_arc(x, y, width, height, start, sweep, false)
    }

    pub fn fill_arc(&mut self, x: f32, y: f32, width: f32, height: f32, start: f32, sweep: f32) -> Result<(), RenderError> {
        self.draw_arc(x, y, width, height, start, sweep, true)
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_arc(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        start: f32,
        sweep: f32,
        filled: bool,
    ) -> Result<(), RenderError> {
        let Some(rect) = self.rect(x, y, width, height)? else {
            return Ok(());
        };
        let canvas = self.canvas()?;
        if !(start.is_finite() && sweep.is_finite()) {
            canvas.poison("non-finite arc angle");
            return Ok(());
        }
        canvas.arc(rect, start as f64, sweep as f64, filled);
        Ok(())
    }

    fn outline_font(&mut self, file_name: &str) -> Option<Arc<OutlineFont>> {
        if let Some(cached) = self.outline_fonts.get(file_name) {
            return cached.clone();
        }
        let mut found = self.font_locator.locate(file_name);
        if let Some(program) = &found {
            if !program.program_kind().embeddable_in(self.options.pdf_version) {
                if let Some(debug) = &self.debug {
                    debug.event(
                        "pdf.font.unsupported",
                        &[("font", Field::Str(file_name)), ("reason", Field::Str("OpenType CFF needs PDF 1.6"))],
                    );
                }
                found = None;
            }
        }
        self.outline_fonts.insert(file_name.to_string(), found.clone());
        found
    }

    /// Draws the glyph for byte `code` with its origin on the baseline at (x, y).
    pub fn draw_glyph(&mut self, code: u8, font: &FontSpec, x: f32, y: f32) -> Result<(), RenderError> {
        let Some((x, y)) = self.point(x, y)? else {
            return Ok(());
        };
        let page_number = self.current_page_index() + 1;
        let Some(glyph) = self.glyph_source.glyph(&font.name, code) else {
            if self.coverage.record_missing(&font.name, code, page_number) {
                self.warn(
                    WarningCode::MissingGlyph,
                    format!("{} has no glyph for code {} (page {})", font.name, code, page_number),
                );
            }
            if let Some(debug) = &self.debug {
                debug.increment("pdf.glyph.missing", 1);
            }
            return Ok(());
        };

        let outline = self.outline_font(font.file_name());
        if outline.is_none() && self.options.glyph_mode == GlyphMode::BitmapImages {
            self.draw_glyph_bitmap(font, code, glyph, x, y)?;
            return Ok(());
        }

        let created = self.fonts.get(&font.name).is_none();
        let entry = self.fonts.get_or_create(font.name.clone(), &mut self.registry, || match &outline {
            Some(program) => FontResource::outline(program.clone()),
            None => FontResource::synthesized(),
        });
        entry.value.mark_used(code, &glyph);
        let resource = entry.name.clone();
        if created && outline.is_none() {
            if let Some(debug) = &self.debug {
                debug.event(
                    "pdf.font.synthesized",
                    &[("font", Field::Str(&font.name)), ("resource", Field::Str(&resource))],
                );
            }
        }

        let (size, advance) = match &outline {
            Some(program) => {
                let size = Px::from_f32(font.size_pt() * self.dpi as f32 / 72.0);
                let advance = size.mul_ratio(program.width(code) as i64, 1000);
                (size, advance)
            }
            None => (Px::from_i32(TYPE3_TEXT_SIZE), Px::from_i32(glyph.advance)),
        };
        let canvas = self.canvas()?;
        canvas.select_font(&resource, size);
        canvas.queue_glyph(GlyphRequest { code, x, y, advance });
        Ok(())
    }

    fn draw_glyph_bitmap(&mut self, font: &FontSpec, code: u8, glyph: Glyph, x: Px, y: Px) -> Result<(), RenderError> {
        if !glyph.has_ink() {
            return Ok(());
        }
        let (width, height) = (glyph.width as f64, glyph.height as f64);
        let left = px64(x) - glyph.x_offset as f64;
        let bottom = px64(y) + glyph.y_offset as f64 - height + 1.0;
        let entry = self
            .glyph_bitmaps
            .get_or_create((font.name.clone(), code), &mut self.registry, || glyph);
        let resource = entry.name.clone();
        let placement = Transform::new(width, 0.0, 0.0, height, left, bottom);
        self.canvas()?.draw_xobject(&resource, &placement, None);
        Ok(())
    }

    /// Draws an external image into the target box. `crop`, in the source's own
    /// coordinates, selects the part of the image that fills the box; by default the
    /// whole bounding box is used.
    pub fn image(
        &mut self,
        source: &str,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        crop: Option<BBox>,
    ) -> Result<(), RenderError> {
        let Some(target) = self.rect(x, y, width, height)? else {
            return Ok(());
        };
        let converter = &self.image_converter;
        let entry = self
            .images
            .get_or_create(ImageKey::for_source(source), &mut self.registry, || ImageResource {
                source: source.to_string(),
                bbox: converter.bounding_box(source).filter(BBox::is_valid),
            });
        let resource = entry.name.clone();
        let Some(bbox) = entry.value.bbox else {
            if let Some(debug) = &self.debug {
                debug.event("pdf.image.unplaced", &[("resource", Field::Str(&resource))]);
            }
            return Ok(());
        };
        let crop = crop.filter(BBox::is_valid).unwrap_or(bbox);
        let sx = px64(target.width) / crop.width() as f64;
        let sy = px64(target.height) / crop.height() as f64;
        let placement = Transform::translate(-(crop.llx - bbox.llx) as f64, -(crop.lly - bbox.lly) as f64)
            .then(Transform::scale(sx, sy))
            .then(Transform::translate(px64(target.x), px64(target.y)));
        self.canvas()?.draw_xobject(&resource, &placement, Some(target));
        Ok(())
    }

    /// Draws an in-memory raster at one pixel per device unit with its origin on (x, y).
    pub fn picture(&mut self, picture: &Picture, x: f32, y: f32) -> Result<(), RenderError> {
        let Some((x, y)) = self.point(x, y)? else {
            return Ok(());
        };
        if picture.width == 0 || picture.height == 0 {
            return Ok(());
        }
        let entry = self
            .pictures
            .get_or_create(PictureKey::for_picture(picture), &mut self.registry, || picture.clone());
        let resource = entry.name.clone();
        let placement = Transform::new(
            picture.width as f64,
            0.0,
            0.0,
            picture.height as f64,
            px64(x) - picture.origin_x as f64,
            px64(y) - picture.origin_y as f64,
        );
        self.canvas()?.draw_xobject(&resource, &placement, None);
        Ok(())
    }

    /// Makes `label` a jump target at (x, y) on the current page. The first anchor
    /// of a label wins.
    pub fn anchor(&mut self, label: &str, x: f32, y: f32) -> Result<(), RenderError> {
        let Some((x, y)) = self.point(x, y)? else {
            return Ok(());
        };
        let page = self.current_page_index();
        self.dests.anchor(label, PagePoint { page, x, y });
        Ok(())
    }

    /// Adds a clickable area. `#label` targets jump inside the document; anything
    /// else is opened as a URI.
    pub fn href(&mut self, target: &str, x1: f32, y1: f32, x2: f32, y2: f32) -> Result<(), RenderError> {
        let (Some((x1, y1)), Some((x2, y2))) = (self.point(x1, y1)?, self.point(x2, y2)?) else {
            return Ok(());
        };
        let link_target = match internal_label(target) {
            Some(label) => LinkTarget::Internal {
                label: label.to_string(),
                id: self.dests.label_id(label),
            },
            None => LinkTarget::Uri(target.to_string()),
        };
        let id = self.registry.allocate();
        let page = self.current_page_index();
        if let Some(open) = self.page.as_mut() {
            open.annots.push(id);
        }
        if let Some(debug) = &self.debug {
            debug.event(
                "pdf.link",
                &[
                    ("target", Field::Str(target)),
                    ("page", Field::Int(page as i64 + 1)),
                    ("internal", Field::Bool(matches!(link_target, LinkTarget::Internal { .. }))),
                ],
            );
        }
        self.annotations.push(LinkAnnotation {
            id,
            page,
            rect: padded(Rect::from_corners(x1, y1, x2, y2)),
            target: link_target,
        });
        Ok(())
    }

    /// Adds a bookmark pointing at (x, y) on the current page. Levels start at 1.
    pub fn outline_entry(&mut self, title: &str, level: i32, x: f32, y: f32) -> Result<(), RenderError> {
        let Some((x, y)) = self.point(x, y)? else {
            return Ok(());
        };
        let page = self.current_page_index();
        self.outlines.push(OutlineEntry {
            title: title.to_string(),
            target: PagePoint { page, x, y },
            level,
        });
        Ok(())
    }

    /// Bookmark whose level is derived from a table-of-contents entry kind.
    pub fn toc_entry(&mut self, kind: &str, title: &str, x: f32, y: f32) -> Result<(), RenderError> {
        self.outline_entry(title, toc_level(kind), x, y)
    }

    fn warn(&mut self, code: WarningCode, message: impl Into<String>) {
        let warning = RenderWarning::new(code, message);
        if let Some(debug) = &self.debug {
            debug.event(
                "pdf.warning",
                &[("code", Field::Str(code.as_str())), ("message", Field::Str(&warning.message))],
            );
        }
        self.warnings.push(warning);
    }

    /// Writes the pending page, every pooled resource, the page tree, the catalog
    /// and the cross-reference table, then returns the summary.
    pub fn finish(self) -> Result<RenderSummary, RenderError> {
        self.finish_into_inner().map(|(summary, _)| summary)
    }

    /// Like `finish`, but also hands back the output sink.
    pub fn finish_into_inner(mut self) -> Result<(RenderSummary, W), RenderError> {
        let started = Instant::now();
        self.end_page()?;
        if self.page_ids.is_empty() {
            self.begin_page()?;
            self.end_page()?;
        }

        let resources = self.resources_dict();

        let started_images = Instant::now();
        self.flush_images()?;
        self.flush_glyph_bitmaps()?;
        self.log_stage("pdf.flush.images", started_images);

        let started_nav = Instant::now();
        let dests_id = self.flush_dests()?;
        let outlines_id = self.flush_outlines()?;
        self.log_stage("pdf.flush.navigation", started_nav);

        let started_fonts = Instant::now();
        self.flush_fonts()?;
        self.flush_alpha_states()?;
        self.log_stage("pdf.flush.fonts", started_fonts);

        self.flush_annotations()?;
        self.registry.write_str(self.resources_id, &resources)?;

        let kids = self
            .page_ids
            .iter()
            .map(|id| id.reference())
            .collect::<Vec<_>>()
            .join(" ");
        self.registry.write_str(
            self.pages_id,
            &format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, self.page_ids.len()),
        )?;

        let mut catalog = format!("<< /Type /Catalog /Pages {}", self.pages_id.reference());
        if let Some(id) = dests_id {
            catalog.push_str(&format!(" /Dests {}", id.reference()));
        }
        if let Some(id) = outlines_id {
            catalog.push_str(&format!(" /Outlines {} /PageMode /UseOutlines", id.reference()));
        }
        catalog.push_str(" >>");
        self.registry.write_str(self.catalog_id, &catalog)?;

        let info_id = match self.options.title.clone() {
            Some(title) => {
                let id = self.registry.allocate();
                self.registry.write_str(
                    id,
                    &format!("<< /Title ({}) /Producer (inkset) >>", escape_pdf_text(&title)),
                )?;
                Some(id)
            }
            None => None,
        };

        let started_xref = Instant::now();
        let total = self.registry.close(self.catalog_id, info_id)?;
        self.log_stage("pdf.flush.xref", started_xref);

        self.metrics.total_bytes = total;
        self.metrics.object_count = self.registry.allocated_count();
        self.metrics.total_render_ms = started.elapsed().as_secs_f64() * 1000.0
            + self.metrics.pages.iter().map(|page| page.render_ms).sum::<f64>();

        if let Some(debug) = &self.debug {
            debug.increment("pdf.pages", self.page_ids.len() as u64);
            debug.increment("pdf.objects", self.metrics.object_count as u64);
            debug.increment("pdf.warnings", self.warnings.len() as u64);
            debug.emit_summary("pdf.finish");
            debug.flush();
        }
        if let Some(perf) = &self.perf {
            perf.log_counts(
                "pdf.document",
                None,
                &[
                    ("pages", self.page_ids.len() as u64),
                    ("objects", self.metrics.object_count as u64),
                    ("bytes", total as u64),
                ],
            );
            perf.flush();
        }

        let summary = RenderSummary {
            bytes_written: total,
            metrics: self.metrics,
            warnings: self.warnings,
            glyph_coverage: self.coverage,
        };
        Ok((summary, self.registry.into_writer()))
    }

    fn log_stage(&self, name: &str, started: Instant) {
        if let Some(perf) = &self.perf {
            perf.log_span_ms(name, None, started.elapsed().as_secs_f64() * 1000.0);
        }
    }

    fn resources_dict(&self) -> String {
        let mut dict = String::from("<< /ProcSet [/PDF /Text /ImageB /ImageC]");
        if !self.fonts.is_empty() {
            dict.push_str(&format!(" /Font << {} >>", self.fonts.resource_entries()));
        }
        let xobjects: Vec<String> = [
            self.images.resource_entries(),
            self.pictures.resource_entries(),
            self.glyph_bitmaps.resource_entries(),
        ]
        .into_iter()
        .filter(|entries| !entries.is_empty())
        .collect();
        if !xobjects.is_empty() {
            dict.push_str(&format!(" /XObject << {} >>", xobjects.join(" ")));
        }
        if !self.alpha_states.is_empty() {
            dict.push_str(&format!(" /ExtGState << {} >>", self.alpha_states.resource_entries()));
        }
        dict.push_str(" >>");
        dict
    }

    fn flush_images(&mut self) -> Result<(), RenderError> {
        self.metrics.image_count = self.images.len();
        for entry in self.images.drain() {
            let failure = write_image_form(
                entry.id,
                &entry.value,
                self.image_converter.as_ref(),
                &mut self.registry,
            )?;
            if let Some(reason) = failure {
                if let Some(debug) = &self.debug {
                    debug.event(
                        "pdf.image.failed",
                        &[("resource", Field::Str(&entry.name)), ("reason", Field::Str(&reason))],
                    );
                }
                self.warn(WarningCode::ImageConversion, reason);
            }
        }
        self.metrics.picture_count = self.pictures.len();
        for entry in self.pictures.drain() {
            let picture = &entry.value;
            EncodedImage::from_rgba(picture.width, picture.height, picture.pixels())
                .write(entry.id, &mut self.registry)?;
        }
        Ok(())
    }

    fn flush_glyph_bitmaps(&mut self) -> Result<(), RenderError> {
        self.metrics.glyph_bitmap_count = self.glyph_bitmaps.len();
        for entry in self.glyph_bitmaps.drain() {
            EncodedImage::from_glyph(&entry.value).write(entry.id, &mut self.registry)?;
        }
        Ok(())
    }

    fn flush_dests(&mut self) -> Result<Option<ObjectId>, RenderError> {
        let unresolved: BTreeSet<String> = self
            .annotations
            .iter()
            .filter_map(|annot| match &annot.target {
                LinkTarget::Internal { label, id } if !self.dests.is_anchored(*id) => Some(label.clone()),
                _ => None,
            })
            .collect();
        for label in unresolved {
            self.warn(
                WarningCode::UnresolvedLink,
                format!("link target #{} is never anchored", label),
            );
        }

        self.metrics.destination_count = self.dests.len();
        if self.dests.is_empty() {
            return Ok(None);
        }
        let id = self.registry.allocate();
        self.dests.write(id, &self.page_ids, self.scale, &mut self.registry)?;
        Ok(Some(id))
    }

    fn flush_outlines(&mut self) -> Result<Option<ObjectId>, RenderError> {
        self.metrics.outline_count = self.outlines.len();
        if self.outlines.is_empty() {
            return Ok(None);
        }
        let levels: Vec<i32> = self.outlines.iter().map(|entry| entry.level).collect();
        let (levels, changed) = normalize_levels(&levels);
        if changed > 0 {
            if let Some(debug) = &self.debug {
                debug.event("pdf.outline.clamped", &[("entries", Field::Int(changed as i64))]);
            }
        }
        let tree = build_tree(&levels);
        let root = self.registry.allocate();
        write_outlines(&self.outlines, &tree, root, &self.page_ids, self.scale, &mut self.registry)?;
        Ok(Some(root))
    }

    fn flush_fonts(&mut self) -> Result<(), RenderError> {
        self.metrics.font_count = self.fonts.len();
        for entry in self.fonts.drain() {
            if entry.value.is_synthesized() {
                self.metrics.synthesized_font_count += 1;
            }
            if let Some(debug) = &self.debug {
                debug.increment("pdf.font.glyphs", entry.value.used_count() as u64);
            }
            entry.value.write(entry.id, &mut self.registry)?;
        }
        Ok(())
    }

    fn flush_alpha_states(&mut self) -> Result<(), RenderError> {
        self.metrics.alpha_state_count = self.alpha_states.len();
        for entry in self.alpha_states.drain() {
            let alpha = format_milli(entry.value as i64);
            self.registry.write_str(
                entry.id,
                &format!("<< /Type /ExtGState /CA {} /ca {} >>", alpha, alpha),
            )?;
        }
        Ok(())
    }

    fn flush_annotations(&mut self) -> Result<(), RenderError> {
        self.metrics.annotation_count = self.annotations.len();
        let preserve = self.options.preserve_link_borders;
        for annot in std::mem::take(&mut self.annotations) {
            self.registry
                .write_str(annot.id, &annot.object(self.scale, preserve))?;
        }
        Ok(())
    }
}

fn px64(value: Px) -> f64 {
    value.to_milli_i64() as f64 / 1000.0
}

fn points_milli(points: f32) -> i64 {
    (points as f64 * 1000.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::BuiltinConverter;
    use crate::font::{DirectoryFontLocator, NoFontLocator};
    use crate::glyph::StaticGlyphSource;

    fn count_token(bytes: &[u8], token: &[u8]) -> usize {
        if token.is_empty() || bytes.len() < token.len() {
            return 0;
        }
        bytes.windows(token.len()).filter(|w| *w == token).count()
    }

    fn glyph(advance: i32) -> Glyph {
        Glyph::new(4, 6, 0, 5, advance, vec![1; 24])
    }

    fn glyphs() -> StaticGlyphSource {
        StaticGlyphSource::new()
            .with_glyph("cmr10", b'a', glyph(30))
            .with_glyph("cmr10", b'b', glyph(32))
            .with_glyph("cmr10", b' ', Glyph::blank(20))
            .with_glyph("testserif", b'A', glyph(60))
            .with_glyph("testserif", b'V', glyph(60))
    }

    fn renderer(options: RenderOptions) -> PdfRenderer<Vec<u8>> {
        renderer_with_fonts(options, Box::new(NoFontLocator))
    }

    fn renderer_with_fonts(options: RenderOptions, fonts: Box<dyn FontLocator>) -> PdfRenderer<Vec<u8>> {
        PdfRenderer::new(
            Vec::new(),
            RendererParts {
                dpi: 600,
                page_size: Size::from_cm(21.0, 29.7),
                options,
                glyph_source: Box::new(glyphs()),
                font_locator: fonts,
                image_converter: Box::new(BuiltinConverter::new().without_postscript()),
                debug: None,
                perf: None,
            },
        )
        .unwrap()
    }

    /// Smallest TrueType program ttf-parser accepts: three glyphs (.notdef, `A`
    /// and `V`, both 722 units wide) and a byte cmap.
    fn tiny_truetype() -> Vec<u8> {
        fn put16(buf: &mut [u8], at: usize, value: u16) {
            buf[at..at + 2].copy_from_slice(&value.to_be_bytes());
        }
        fn put32(buf: &mut [u8], at: usize, value: u32) {
            buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
        }

        let mut cmap = vec![0u8; 12 + 6 + 256];
        put16(&mut cmap, 2, 1);
        put16(&mut cmap, 6, 3);
        put32(&mut cmap, 8, 12);
        put16(&mut cmap, 14, 262);
        cmap[18 + b'A' as usize] = 1;
        cmap[18 + b'V' as usize] = 2;

        let mut head = vec![0u8; 54];
        put32(&mut head, 0, 0x0001_0000);
        put32(&mut head, 12, 0x5F0F_3CF5);
        put16(&mut head, 18, 1000);
        put16(&mut head, 38, (-200i16) as u16);
        put16(&mut head, 40, 722);
        put16(&mut head, 42, 800);

        let mut hhea = vec![0u8; 36];
        put32(&mut hhea, 0, 0x0001_0000);
        put16(&mut hhea, 4, 800);
        put16(&mut hhea, 6, (-200i16) as u16);
        put16(&mut hhea, 10, 722);
        put16(&mut hhea, 34, 3);

        let mut hmtx = vec![0u8; 12];
        put16(&mut hmtx, 0, 500);
        put16(&mut hmtx, 4, 722);
        put16(&mut hmtx, 8, 722);

        let mut maxp = vec![0u8; 6];
        put32(&mut maxp, 0, 0x0000_5000);
        put16(&mut maxp, 4, 3);

        // Table records must be sorted by tag.
        let tables: [(&[u8; 4], Vec<u8>); 5] =
            [(b"cmap", cmap), (b"head", head), (b"hhea", hhea), (b"hmtx", hmtx), (b"maxp", maxp)];
        let mut font = vec![0u8; 12 + 16 * tables.len()];
        put32(&mut font, 0, 0x0001_0000);
        put16(&mut font, 4, tables.len() as u16);
        for (index, (tag, data)) in tables.iter().enumerate() {
            let record = 12 + 16 * index;
            let offset = font.len();
            font[record..record + 4].copy_from_slice(*tag);
            put32(&mut font, record + 8, offset as u32);
            put32(&mut font, record + 12, data.len() as u32);
            font.extend_from_slice(data);
        }
        font
    }

    fn png_data_uri(width: u32, height: u32) -> String {
        use base64::Engine;
        let mut src = image::RgbaImage::new(width, height);
        for pixel in src.pixels_mut() {
            *pixel = image::Rgba([0, 128, 0, 255]);
        }
        let mut png = Vec::new();
        src.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        )
    }

    /// Finishes and returns the bytes, the summary and the parsed document.
    fn finish(renderer: PdfRenderer<Vec<u8>>) -> (Vec<u8>, RenderSummary, lopdf::Document) {
        let (summary, bytes) = renderer.finish_into_inner().unwrap();
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        (bytes, summary, doc)
    }

    #[test]
    fn two_pages_with_shapes_and_text_flush_completely() {
        let mut r = renderer(RenderOptions::default());
        let font = FontSpec::new("cmr10", 10.0);
        r.line(100.0, 100.0, 900.0, 100.0).unwrap();
        r.fill_rect(100.0, 200.0, 300.0, 150.0).unwrap();
        r.draw_glyph(b'a', &font, 100.0, 500.0).unwrap();
        r.draw_glyph(b'b', &font, 130.0, 500.0).unwrap();
        r.next_page().unwrap();
        r.draw_glyph(b'a', &font, 100.0, 500.0).unwrap();
        let (bytes, summary, doc) = finish(r);

        assert_eq!(doc.get_pages().len(), 2);
        assert_eq!(summary.metrics.pages.len(), 2);
        assert_eq!(summary.metrics.glyph_count(), 3);
        assert_eq!(summary.metrics.synthesized_font_count, 1);
        assert!(summary.warnings.is_empty());
        assert_eq!(count_token(&bytes, b"/Type /Page "), 2);
        assert_eq!(count_token(&bytes, b"/Type /Font /Subtype /Type3"), 1);
        // Exact placement: one string token, no adjustments.
        assert_eq!(count_token(&bytes, b"[(ab)] TJ"), 1);
        assert_eq!(count_token(&bytes, b"/F1 100 Tf"), 2);
    }

    #[test]
    fn every_page_content_is_balanced() {
        let mut r = renderer(RenderOptions::default());
        r.set_clipping(0.0, 0.0, 500.0, 500.0).unwrap();
        r.push_transform(Transform::translate(10.0, 10.0)).unwrap();
        r.set_clipping(0.0, 0.0, 400.0, 400.0).unwrap();
        r.fill_rect(0.0, 0.0, 10.0, 10.0).unwrap();
        let (bytes, _, doc) = finish(r);
        let page_id = *doc.get_pages().values().next().unwrap();
        let content = doc.get_page_content(page_id).unwrap();
        assert_eq!(count_token(&content, b"q\n"), count_token(&content, b"Q\n"));
        assert!(count_token(&bytes, b"re\nW n") >= 2);
    }

    #[test]
    fn two_links_to_one_label_share_a_destination() {
        let mut r = renderer(RenderOptions::default());
        r.anchor("intro", 600.0, 6000.0).unwrap();
        r.href("#intro", 100.0, 100.0, 200.0, 150.0).unwrap();
        r.next_page().unwrap();
        r.href("#intro", 100.0, 100.0, 200.0, 150.0).unwrap();
        r.href("https://example.org/", 100.0, 300.0, 200.0, 350.0).unwrap();
        let (bytes, summary, _) = finish(r);
        assert_eq!(count_token(&bytes, b"/label1 ["), 1);
        assert_eq!(count_token(&bytes, b"/Dest /label1"), 2);
        assert_eq!(count_token(&bytes, b"/S /URI"), 1);
        assert_eq!(count_token(&bytes, b"/Dests "), 1);
        assert_eq!(summary.metrics.annotation_count, 3);
        assert!(summary.warnings.is_empty());
    }

    #[test]
    fn unanchored_internal_link_is_reported() {
        let mut r = renderer(RenderOptions::default());
        r.href("#nowhere", 100.0, 100.0, 200.0, 150.0).unwrap();
        r.href("#nowhere", 300.0, 100.0, 400.0, 150.0).unwrap();
        let (_, summary, _) = finish(r);
        let unresolved: Vec<_> = summary
            .warnings
            .iter()
            .filter(|w| w.code == WarningCode::UnresolvedLink)
            .collect();
        assert_eq!(unresolved.len(), 1);
        assert!(unresolved[0].message.contains("#nowhere"));
    }

    #[test]
    fn outline_hierarchy_is_written_with_page_mode() {
        let mut r = renderer(RenderOptions::default());
        r.outline_entry("A", 1, 0.0, 0.0).unwrap();
        r.outline_entry("B", 2, 0.0, 0.0).unwrap();
        r.outline_entry("C", 2, 0.0, 0.0).unwrap();
        r.outline_entry("D", 1, 0.0, 0.0).unwrap();
        let (bytes, summary, _) = finish(r);
        assert_eq!(summary.metrics.outline_count, 4);
        assert_eq!(count_token(&bytes, b"/Count -2"), 1);
        assert_eq!(count_token(&bytes, b"/Type /Outlines"), 1);
        assert_eq!(count_token(&bytes, b"/PageMode /UseOutlines"), 1);
    }

    #[test]
    fn alpha_levels_are_pooled() {
        let mut r = renderer(RenderOptions::default());
        r.set_fill_color(Color::rgba(255, 0, 0, 128)).unwrap();
        r.fill_rect(0.0, 0.0, 10.0, 10.0).unwrap();
        r.set_fill_color(Color::BLACK).unwrap();
        r.fill_rect(0.0, 0.0, 10.0, 10.0).unwrap();
        r.set_fill_color(Color::rgba(0, 0, 255, 128)).unwrap();
        r.fill_rect(0.0, 0.0, 10.0, 10.0).unwrap();
        let (bytes, summary, _) = finish(r);
        assert_eq!(summary.metrics.alpha_state_count, 2);
        assert_eq!(count_token(&bytes, b"/Type /ExtGState"), 2);
        assert_eq!(count_token(&bytes, b"/GS1 gs"), 2);
        assert_eq!(count_token(&bytes, b"/GS2 gs"), 1);
    }

    #[test]
    fn failed_image_conversion_leaves_a_valid_file() {
        let mut r = renderer(RenderOptions::default());
        r.image("/nonexistent/figure.png", 0.0, 0.0, 100.0, 100.0, None).unwrap();
        let (bytes, summary, _) = finish(r);
        assert_eq!(summary.metrics.image_count, 1);
        assert_eq!(summary.warnings.len(), 1);
        assert_eq!(summary.warnings[0].code, WarningCode::ImageConversion);
        assert_eq!(count_token(&bytes, b"/Subtype /Form /BBox [0 0 0 0]"), 1);
    }

    #[test]
    fn images_are_pooled_by_source_and_scaled_into_the_target() {
        let uri = png_data_uri(2, 4);
        let mut r = renderer(RenderOptions::default());
        r.image(&uri, 100.0, 200.0, 20.0, 40.0, None).unwrap();
        r.image(&uri, 300.0, 200.0, 20.0, 40.0, None).unwrap();
        let (bytes, summary, _) = finish(r);
        assert!(summary.warnings.is_empty());
        assert_eq!(summary.metrics.image_count, 1);
        assert_eq!(count_token(&bytes, b"/Subtype /Form /FormType 1 /BBox [0 0 2 4]"), 1);
        assert_eq!(count_token(&bytes, b"10 0 0 10 100 200 cm"), 1);
        assert_eq!(count_token(&bytes, b"/Im1 Do"), 2);
        assert_eq!(count_token(&bytes, b"/Subtype /Image"), 1);
    }

    #[test]
    fn crop_box_is_mapped_onto_the_target() {
        let uri = png_data_uri(100, 100);
        let mut r = renderer(RenderOptions::default());
        let crop = BBox::new(50.0, 50.0, 100.0, 100.0);
        r.image(&uri, 1000.0, 1000.0, 200.0, 200.0, Some(crop)).unwrap();
        let (bytes, summary, _) = finish(r);
        assert!(summary.warnings.is_empty());
        assert_eq!(count_token(&bytes, b"/BBox [0 0 100 100]"), 1);
        assert_eq!(count_token(&bytes, b"1000 1000 200 200 re\nW n\n4 0 0 4 800 800 cm\n/Im1 Do"), 1);
    }

    #[test]
    fn outline_font_is_embedded_with_used_widths() {
        let mut fonts = DirectoryFontLocator::new();
        assert!(fonts.register_bytes(tiny_truetype(), "testserif"));
        let mut r = renderer_with_fonts(RenderOptions::default(), Box::new(fonts));
        let font = FontSpec::new("testserif", 10.0);
        r.draw_glyph(b'A', &font, 100.0, 500.0).unwrap();
        // 83.333 * 722 / 1000 device units after the first glyph.
        r.draw_glyph(b'V', &font, 160.166, 500.0).unwrap();
        let (bytes, summary, doc) = finish(r);

        assert!(summary.warnings.is_empty());
        assert_eq!(summary.metrics.font_count, 1);
        assert_eq!(summary.metrics.synthesized_font_count, 0);
        assert_eq!(doc.get_pages().len(), 1);
        assert_eq!(count_token(&bytes, b"/FontFile2 "), 1);
        assert_eq!(count_token(&bytes, b"/Subtype /Type3"), 0);
        assert_eq!(count_token(&bytes, b"/Subtype /TrueType /BaseFont /testserif"), 1);
        assert_eq!(count_token(&bytes, b"/Encoding /WinAnsiEncoding"), 1);
        let widths = format!("/FirstChar 65 /LastChar 86 /Widths [722 {}722]", "0 ".repeat(20));
        assert_eq!(count_token(&bytes, widths.as_bytes()), 1);
        assert_eq!(count_token(&bytes, b"/F1 83.333 Tf"), 1);
        assert_eq!(count_token(&bytes, b"[(AV)] TJ"), 1);
    }

    #[test]
    fn pictures_are_pooled_by_content() {
        let mut r = renderer(RenderOptions::default());
        let picture = Picture::new(2, 2, 1, 1, vec![255; 16]);
        r.picture(&picture, 50.0, 50.0).unwrap();
        r.picture(&picture.clone(), 80.0, 50.0).unwrap();
        let translucent = Picture::new(1, 1, 0, 0, vec![0, 0, 0, 10]);
        r.picture(&translucent, 10.0, 10.0).unwrap();
        let (bytes, summary, _) = finish(r);
        assert_eq!(summary.metrics.picture_count, 2);
        assert_eq!(count_token(&bytes, b"2 0 0 2 49 49 cm"), 1);
        assert_eq!(count_token(&bytes, b"/SMask"), 1);
    }

    #[test]
    fn bitmap_glyph_mode_draws_pooled_images() {
        let mut r = renderer(RenderOptions {
            glyph_mode: GlyphMode::BitmapImages,
            ..RenderOptions::default()
        });
        let font = FontSpec::new("cmr10", 10.0);
        r.draw_glyph(b'a', &font, 100.0, 500.0).unwrap();
        r.draw_glyph(b'a', &font, 140.0, 500.0).unwrap();
        r.draw_glyph(b' ', &font, 170.0, 500.0).unwrap();
        let (bytes, summary, _) = finish(r);
        assert_eq!(summary.metrics.glyph_bitmap_count, 1);
        assert_eq!(summary.metrics.font_count, 0);
        assert_eq!(count_token(&bytes, b"/G1 Do"), 2);
        assert_eq!(count_token(&bytes, b"/ColorSpace /DeviceGray"), 1);
        // 4x6 bitmap, y_offset 5: bottom row sits on y + 5 - 6 + 1.
        assert_eq!(count_token(&bytes, b"4 0 0 6 100 500 cm"), 1);
    }

    #[test]
    fn missing_glyphs_warn_once_per_font_and_code() {
        let mut r = renderer(RenderOptions::default());
        let font = FontSpec::new("cmr10", 10.0);
        r.draw_glyph(b'z', &font, 0.0, 0.0).unwrap();
        r.draw_glyph(b'z', &font, 10.0, 0.0).unwrap();
        let (_, summary, _) = finish(r);
        assert_eq!(summary.warnings.len(), 1);
        assert_eq!(summary.warnings[0].code, WarningCode::MissingGlyph);
        assert_eq!(summary.glyph_coverage.total(), 2);
    }

    #[test]
    fn non_finite_coordinate_skips_the_page_only() {
        let mut r = renderer(RenderOptions::default());
        r.fill_rect(f32::NAN, 0.0, 10.0, 10.0).unwrap();
        r.next_page().unwrap();
        r.fill_rect(0.0, 0.0, 10.0, 10.0).unwrap();
        let (_, summary, doc) = finish(r);
        assert_eq!(doc.get_pages().len(), 2);
        assert!(summary.metrics.pages[0].skipped);
        assert!(!summary.metrics.pages[1].skipped);
        assert_eq!(summary.warnings.len(), 1);
        assert_eq!(summary.warnings[0].code, WarningCode::PageWriteFailure);
        let first = doc.get_pages()[&1];
        assert!(doc.get_page_content(first).unwrap().is_empty());
    }

    #[test]
    fn empty_document_still_has_one_page() {
        let r = renderer(RenderOptions {
            title: Some("Empty".into()),
            ..RenderOptions::default()
        });
        let (bytes, _, doc) = finish(r);
        assert_eq!(doc.get_pages().len(), 1);
        assert_eq!(count_token(&bytes, b"/Title (Empty)"), 1);
        assert!(bytes.starts_with(b"%PDF-1.7"));
    }
}
