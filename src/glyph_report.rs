use std::collections::BTreeMap;

/// Glyphs the glyph source could not supply, aggregated per font and code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlyphCoverageReport {
    missing: BTreeMap<(String, u8), MissingGlyph>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingGlyph {
    pub font: String,
    pub code: u8,
    /// One-based page of the first failed request.
    pub first_page: usize,
    pub count: usize,
}

impl GlyphCoverageReport {
    /// Records a miss and returns true the first time this font and code are seen.
    pub fn record_missing(&mut self, font: &str, code: u8, page: usize) -> bool {
        let mut first = false;
        let entry = self
            .missing
            .entry((font.to_string(), code))
            .or_insert_with(|| {
                first = true;
                MissingGlyph {
                    font: font.to_string(),
                    code,
                    first_page: page,
                    count: 0,
                }
            });
        entry.count = entry.count.saturating_add(1);
        first
    }

    pub fn missing(&self) -> Vec<MissingGlyph> {
        self.missing.values().cloned().collect()
    }

    pub fn total(&self) -> usize {
        self.missing.values().map(|m| m.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_misses_are_counted_once_per_key() {
        let mut report = GlyphCoverageReport::default();
        assert!(report.record_missing("cmr10", 0x7B, 2));
        assert!(!report.record_missing("cmr10", 0x7B, 5));
        assert!(report.record_missing("cmmi10", 0x7B, 5));
        let missing = report.missing();
        assert_eq!(missing.len(), 2);
        assert_eq!(report.total(), 3);
        let cmr = missing.iter().find(|m| m.font == "cmr10").expect("cmr10");
        assert_eq!((cmr.count, cmr.first_page), (2, 2));
    }
}
