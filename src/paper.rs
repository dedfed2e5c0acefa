use crate::types::Size;

/// Maps a paper name to its portrait size in centimetres.
pub trait PaperGeometry {
    fn paper_size(&self, name: &str) -> Option<(f32, f32)>;
}

/// ISO A and B series plus the common North American sizes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPapers;

const STANDARD_PAPERS: &[(&str, f32, f32)] = &[
    ("a0", 84.1, 118.9),
    ("a1", 59.4, 84.1),
    ("a2", 42.0, 59.4),
    ("a3", 29.7, 42.0),
    ("a4", 21.0, 29.7),
    ("a5", 14.8, 21.0),
    ("a6", 10.5, 14.8),
    ("b4", 25.0, 35.3),
    ("b5", 17.6, 25.0),
    ("letter", 21.59, 27.94),
    ("legal", 21.59, 35.56),
    ("executive", 18.415, 26.67),
    ("ledger", 27.94, 43.18),
];

impl PaperGeometry for StandardPapers {
    fn paper_size(&self, name: &str) -> Option<(f32, f32)> {
        let key = name.trim().to_ascii_lowercase();
        STANDARD_PAPERS
            .iter()
            .find(|(paper, _, _)| *paper == key)
            .map(|&(_, w, h)| (w, h))
    }
}

/// Page size chosen by the caller, resolved to points when the renderer is built.
#[derive(Debug, Clone, PartialEq)]
pub enum PaperChoice {
    Named(String),
    Centimetres { width: f32, height: f32 },
}

impl Default for PaperChoice {
    fn default() -> Self {
        PaperChoice::Named("a4".to_string())
    }
}

impl PaperChoice {
    pub(crate) fn resolve(&self, papers: &dyn PaperGeometry, landscape: bool) -> Option<Size> {
        let (width, height) = match self {
            PaperChoice::Named(name) => papers.paper_size(name)?,
            PaperChoice::Centimetres { width, height } => (*width, *height),
        };
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return None;
        }
        let size = Size::from_cm(width, height);
        Some(if landscape { size.landscape() } else { size })
    }
}
