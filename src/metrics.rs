#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetrics {
    pub page_number: usize,
    pub render_ms: f64,
    pub operator_count: usize,
    pub glyph_count: usize,
    pub content_bytes: usize,
    /// Content was dropped because a drawing call could not be represented.
    pub skipped: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetrics {
    pub pages: Vec<PageMetrics>,
    pub total_render_ms: f64,
    pub total_bytes: usize,
    pub object_count: usize,
    pub font_count: usize,
    pub synthesized_font_count: usize,
    pub image_count: usize,
    pub picture_count: usize,
    pub glyph_bitmap_count: usize,
    pub alpha_state_count: usize,
    pub annotation_count: usize,
    pub destination_count: usize,
    pub outline_count: usize,
}

impl DocumentMetrics {
    pub fn glyph_count(&self) -> usize {
        self.pages.iter().map(|page| page.glyph_count).sum()
    }
}
