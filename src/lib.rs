mod canvas;
mod content;
mod convert;
mod debug;
mod error;
mod font;
mod glyph;
mod glyph_report;
mod link;
mod metrics;
mod outline;
mod paper;
mod pdf;
mod perf;
mod pool;
mod registry;
mod text;
mod type3;
mod types;
mod xobject;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub use convert::{BBox, BuiltinConverter, ConvertError, ImageConverter};
use debug::{DebugLogger, Field};
pub use error::{RegistryError, RenderError, RenderWarning, WarningCode};
pub use font::{DirectoryFontLocator, FontLocator, FontProgramKind, FontSpec, NoFontLocator, OutlineFont};
pub use glyph::{Glyph, GlyphSource, StaticGlyphSource};
pub use glyph_report::{GlyphCoverageReport, MissingGlyph};
pub use xobject::{ImageKey, Picture, PictureKey};
pub use metrics::{DocumentMetrics, PageMetrics};
pub use outline::toc_level;
pub use paper::{PaperChoice, PaperGeometry, StandardPapers};
pub use pdf::{GlyphMode, PdfRenderer, RenderOptions, RenderSummary};
use pdf::RendererParts;
use perf::PerfLogger;
pub use registry::{ObjectId, PdfVersion};
pub use types::{Color, Px, Rect, Size, Transform};

/// Device resolution used when none is configured.
pub const DEFAULT_DPI: u32 = 600;

/// Configures and creates a [`PdfRenderer`].
pub struct RendererBuilder {
    dpi: u32,
    paper: PaperChoice,
    landscape: bool,
    paper_geometry: Box<dyn PaperGeometry>,
    options: RenderOptions,
    glyph_source: Box<dyn GlyphSource>,
    font_locator: Box<dyn FontLocator>,
    image_converter: Box<dyn ImageConverter>,
    debug_path: Option<PathBuf>,
    perf_path: Option<PathBuf>,
}

impl Default for RendererBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RendererBuilder {
    pub fn new() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            paper: PaperChoice::default(),
            landscape: false,
            paper_geometry: Box::new(StandardPapers),
            options: RenderOptions::default(),
            glyph_source: Box::new(StaticGlyphSource::new()),
            font_locator: Box::new(NoFontLocator),
            image_converter: Box::new(BuiltinConverter::new()),
            debug_path: None,
            perf_path: None,
        }
    }

    // Device units per inch; every drawing coordinate is in these units.
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    // Paper by name, resolved through the paper geometry at build time.
    pub fn paper(mut self, name: impl Into<String>) -> Self {
        self.paper = PaperChoice::Named(name.into());
        self
    }

    pub fn paper_size_cm(mut self, width: f32, height: f32) -> Self {
        self.paper = PaperChoice::Centimetres { width, height };
        self
    }

    pub fn landscape(mut self, landscape: bool) -> Self {
        self.landscape = landscape;
        self
    }

    pub fn paper_geometry(mut self, geometry: impl PaperGeometry + 'static) -> Self {
        self.paper_geometry = Box::new(geometry);
        self
    }

    // PDF version selector (default: PDF 1.7).
    pub fn pdf_version(mut self, version: PdfVersion) -> Self {
        self.options.pdf_version = version;
        self
    }

    pub fn glyph_mode(mut self, mode: GlyphMode) -> Self {
        self.options.glyph_mode = mode;
        self
    }

    // Draw link rectangles with a visible border.
    pub fn preserve_link_borders(mut self, preserve: bool) -> Self {
        self.options.preserve_link_borders = preserve;
        self
    }

    // Document title for the Info dictionary.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.options.title = Some(title.into());
        self
    }

    pub fn glyph_source(mut self, source: impl GlyphSource + 'static) -> Self {
        self.glyph_source = Box::new(source);
        self
    }

    pub fn font_locator(mut self, locator: impl FontLocator + 'static) -> Self {
        self.font_locator = Box::new(locator);
        self
    }

    pub fn image_converter(mut self, converter: impl ImageConverter + 'static) -> Self {
        self.image_converter = Box::new(converter);
        self
    }

    // Enable debug logging to a JSONL file.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    // Enable performance logging to a JSONL file; a `_hot` summary is written next to it.
    pub fn perf_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.perf_path = Some(path.into());
        self
    }

    /// Validates the configuration and starts a document on `writer`.
    pub fn build<W: Write>(self, writer: W) -> Result<PdfRenderer<W>, RenderError> {
        if self.dpi == 0 {
            return Err(RenderError::InvalidConfiguration(
                "dpi must be greater than zero".to_string(),
            ));
        }
        let page_size = self
            .paper
            .resolve(self.paper_geometry.as_ref(), self.landscape)
            .ok_or_else(|| {
                RenderError::InvalidConfiguration(match &self.paper {
                    PaperChoice::Named(name) => format!("unknown paper `{}`", name),
                    PaperChoice::Centimetres { width, height } => {
                        format!("invalid paper size {}cm x {}cm", width, height)
                    }
                })
            })?;
        let debug = match &self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        let perf = match &self.perf_path {
            Some(path) => Some(PerfLogger::new(path)?),
            None => None,
        };
        if let Some(debug) = &debug {
            debug.event(
                "renderer.config",
                &[
                    ("dpi", Field::Int(self.dpi as i64)),
                    ("width_pt", Field::Num(page_size.width as f64)),
                    ("height_pt", Field::Num(page_size.height as f64)),
                    ("bitmap_glyphs", Field::Bool(self.options.glyph_mode == GlyphMode::BitmapImages)),
                ],
            );
        }
        PdfRenderer::new(
            writer,
            RendererParts {
                dpi: self.dpi,
                page_size,
                options: self.options,
                glyph_source: self.glyph_source,
                font_locator: self.font_locator,
                image_converter: self.image_converter,
                debug,
                perf,
            },
        )
    }

    /// Creates `path` and starts a document on it.
    pub fn create(self, path: impl AsRef<Path>) -> Result<PdfRenderer<BufWriter<File>>, RenderError> {
        let file = File::create(path.as_ref()).map_err(RenderError::Init)?;
        self.build(BufWriter::new(file))
    }
}
