use crate::content::{escape_pdf_bytes, fmt64};
use crate::registry::ObjectId;
use crate::types::{Px, Rect};

const PAD_X: i32 = 5;
const PAD_Y: i32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LinkTarget {
    /// Dense label id in the destination table.
    Internal { label: String, id: usize },
    Uri(String),
}

/// A link annotation waiting for the close-time flush.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LinkAnnotation {
    pub id: ObjectId,
    pub page: usize,
    /// Rectangle in device units, already padded.
    pub rect: Rect,
    pub target: LinkTarget,
}

/// Label of an internal target (`#name`), or `None` for anything else.
pub(crate) fn internal_label(target: &str) -> Option<&str> {
    target.strip_prefix('#')
}

/// Grows the clickable area by the fixed padding.
pub(crate) fn padded(rect: Rect) -> Rect {
    let (px, py) = (Px::from_i32(PAD_X), Px::from_i32(PAD_Y));
    Rect {
        x: rect.x - px,
        y: rect.y - py,
        width: rect.width + px + px,
        height: rect.height + py + py,
    }
}

/// URI strings are 7-bit ASCII: other bytes of the UTF-8 form, and spaces, are
/// percent-encoded.
fn ascii_uri(uri: &str) -> String {
    let mut out = String::with_capacity(uri.len());
    for &byte in uri.as_bytes() {
        if byte.is_ascii_graphic() {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

impl LinkAnnotation {
    pub(crate) fn object(&self, scale: f64, preserve_border: bool) -> String {
        let coord = |v: Px| fmt64(v.to_milli_i64() as f64 / 1000.0 * scale);
        let action = match &self.target {
            LinkTarget::Internal { id, .. } => format!("/Dest /label{}", id),
            LinkTarget::Uri(uri) => format!("/A << /S /URI /URI ({}) >>", escape_pdf_bytes(ascii_uri(uri).as_bytes())),
        };
        format!(
            "<< /Type /Annot /Subtype /Link /Rect [{} {} {} {}] /Border [16 16 {} [3 10]] /C [0.75 0.5 1] {} >>",
            coord(self.rect.x),
            coord(self.rect.y),
            coord(self.rect.right()),
            coord(self.rect.top()),
            if preserve_border { 1 } else { 0 },
            action
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> Rect {
        Rect::from_corners(Px::from_i32(105), Px::from_i32(110), Px::from_i32(195), Px::from_i32(190))
    }

    #[test]
    fn hash_prefix_marks_internal_targets() {
        assert_eq!(internal_label("#sec-2"), Some("sec-2"));
        assert_eq!(internal_label("https://example.org/#x"), None);
    }

    #[test]
    fn internal_link_references_the_label() {
        let annot = LinkAnnotation {
            id: ObjectId::from_raw(9),
            page: 0,
            rect: padded(rect()),
            target: LinkTarget::Internal {
                label: "sec-2".into(),
                id: 3,
            },
        };
        assert_eq!(
            annot.object(0.5, false),
            "<< /Type /Annot /Subtype /Link /Rect [50 50 100 100] /Border [16 16 0 [3 10]] /C [0.75 0.5 1] /Dest /label3 >>"
        );
    }

    #[test]
    fn external_link_uses_a_uri_action() {
        let annot = LinkAnnotation {
            id: ObjectId::from_raw(9),
            page: 0,
            rect: rect(),
            target: LinkTarget::Uri("https://example.org/a(b)".into()),
        };
        let object = annot.object(1.0, true);
        assert!(object.contains("/Border [16 16 1 [3 10]]"));
        assert!(object.ends_with("/A << /S /URI /URI (https://example.org/a\\(b\\)) >> >>"));
    }

    #[test]
    fn non_ascii_uri_is_percent_encoded() {
        assert_eq!(ascii_uri("https://example.org/café"), "https://example.org/caf%C3%A9");
        assert_eq!(ascii_uri("a b"), "a%20b");
        let annot = LinkAnnotation {
            id: ObjectId::from_raw(9),
            page: 0,
            rect: rect(),
            target: LinkTarget::Uri("https://example.org/café".into()),
        };
        let object = annot.object(1.0, false);
        assert!(object.contains("/URI (https://example.org/caf%C3%A9)"));
        assert!(object.is_ascii());
    }
}
