use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use crate::content::{escape_pdf_text, fmt64};
use crate::error::RenderError;
use crate::registry::{AllocateId, ObjectId, ObjectRegistry};
use crate::types::Px;

/// Position on a page, in device units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PagePoint {
    pub page: usize,
    pub x: Px,
    pub y: Px,
}

impl PagePoint {
    /// `[N 0 R /XYZ x y null]` with device units scaled to points.
    fn xyz(&self, page_ids: &[ObjectId], scale: f64) -> Option<String> {
        let page = page_ids.get(self.page)?;
        Some(format!(
            "[{} /XYZ {} {} null]",
            page.reference(),
            fmt64(px64(self.x) * scale),
            fmt64(px64(self.y) * scale)
        ))
    }
}

fn px64(value: Px) -> f64 {
    value.to_milli_i64() as f64 / 1000.0
}

/// Named destinations. Labels get dense ids from 1 in order of first mention,
/// whether that mention is an anchor or a link.
#[derive(Debug, Default)]
pub(crate) struct DestinationTable {
    ids: HashMap<String, usize>,
    anchors: BTreeMap<usize, PagePoint>,
}

impl DestinationTable {
    pub(crate) fn label_id(&mut self, label: &str) -> usize {
        let next = self.ids.len() + 1;
        *self.ids.entry(label.to_string()).or_insert(next)
    }

    /// Records an anchor. The first anchor of a label wins; returns false for later ones.
    pub(crate) fn anchor(&mut self, label: &str, point: PagePoint) -> bool {
        let id = self.label_id(label);
        if self.anchors.contains_key(&id) {
            return false;
        }
        self.anchors.insert(id, point);
        true
    }

    pub(crate) fn is_anchored(&self, id: usize) -> bool {
        self.anchors.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.anchors.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Writes the `/Dests` dictionary.
    pub(crate) fn write<W: Write>(
        &self,
        id: ObjectId,
        page_ids: &[ObjectId],
        scale: f64,
        registry: &mut ObjectRegistry<W>,
    ) -> Result<(), RenderError> {
        let mut body = String::from("<<");
        for (label, point) in &self.anchors {
            if let Some(dest) = point.xyz(page_ids, scale) {
                body.push_str(&format!("\n/label{} {}", label, dest));
            }
        }
        body.push_str("\n>>");
        registry.write_str(id, &body)
    }
}

/// A bookmark as requested, before the hierarchy is rebuilt.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OutlineEntry {
    pub title: String,
    pub target: PagePoint,
    pub level: i32,
}

/// Clamps levels so the first is 1, none is below 1 and none is deeper than its
/// predecessor plus one. Returns the levels and how many entries were changed.
pub(crate) fn normalize_levels(levels: &[i32]) -> (Vec<u32>, usize) {
    let mut out = Vec::with_capacity(levels.len());
    let mut changed = 0;
    let mut previous = 0u32;
    for &level in levels {
        let clamped = level.clamp(1, previous as i32 + 1) as u32;
        if clamped as i32 != level {
            changed += 1;
        }
        out.push(clamped);
        previous = clamped;
    }
    (out, changed)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct OutlineNode {
    pub parent: Option<usize>,
    pub prev: Option<usize>,
    pub next: Option<usize>,
    pub children: Vec<usize>,
}

/// Arena of nodes in document order; node `i` is entry `i`.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct OutlineTree {
    pub nodes: Vec<OutlineNode>,
    pub roots: Vec<usize>,
}

/// Rebuilds the hierarchy from normalized levels by recursive descent.
pub(crate) fn build_tree(levels: &[u32]) -> OutlineTree {
    let mut nodes = Vec::with_capacity(levels.len());
    let mut pos = 0;
    let roots = parse_siblings(levels, &mut pos, 1, None, &mut nodes);
    OutlineTree { nodes, roots }
}

fn parse_siblings(
    levels: &[u32],
    pos: &mut usize,
    level: u32,
    parent: Option<usize>,
    nodes: &mut Vec<OutlineNode>,
) -> Vec<usize> {
    let mut siblings: Vec<usize> = Vec::new();
    while *pos < levels.len() && levels[*pos] == level {
        let index = nodes.len();
        nodes.push(OutlineNode {
            parent,
            prev: siblings.last().copied(),
            ..OutlineNode::default()
        });
        if let Some(&previous) = siblings.last() {
            nodes[previous].next = Some(index);
        }
        *pos += 1;
        if *pos < levels.len() && levels[*pos] == level + 1 {
            let children = parse_siblings(levels, pos, level + 1, Some(index), nodes);
            nodes[index].children = children;
        }
        siblings.push(index);
    }
    siblings
}

/// Writes the outline root into `root_id` and one object per entry, with ids
/// allocated in document order.
pub(crate) fn write_outlines<W: Write>(
    entries: &[OutlineEntry],
    tree: &OutlineTree,
    root_id: ObjectId,
    page_ids: &[ObjectId],
    scale: f64,
    registry: &mut ObjectRegistry<W>,
) -> Result<(), RenderError> {
    let ids: Vec<ObjectId> = tree.nodes.iter().map(|_| registry.allocate()).collect();

    for (index, node) in tree.nodes.iter().enumerate() {
        let entry = &entries[index];
        let parent = node.parent.map(|p| ids[p]).unwrap_or(root_id);
        let mut body = format!(
            "<< /Title ({}) /Parent {}",
            escape_pdf_text(&entry.title),
            parent.reference()
        );
        if let Some(prev) = node.prev {
            body.push_str(&format!(" /Prev {}", ids[prev].reference()));
        }
        if let Some(next) = node.next {
            body.push_str(&format!(" /Next {}", ids[next].reference()));
        }
        if let (Some(&first), Some(&last)) = (node.children.first(), node.children.last()) {
            body.push_str(&format!(
                " /First {} /Last {} /Count -{}",
                ids[first].reference(),
                ids[last].reference(),
                node.children.len()
            ));
        }
        if let Some(dest) = entry.target.xyz(page_ids, scale) {
            body.push_str(&format!(" /Dest {}", dest));
        }
        body.push_str(" >>");
        registry.write_str(ids[index], &body)?;
    }

    let mut root = String::from("<< /Type /Outlines");
    if let (Some(&first), Some(&last)) = (tree.roots.first(), tree.roots.last()) {
        root.push_str(&format!(
            " /First {} /Last {}",
            ids[first].reference(),
            ids[last].reference()
        ));
    }
    root.push_str(&format!(" /Count {} >>", tree.roots.len()));
    registry.write_str(root_id, &root)
}

/// Outline level for a table-of-contents entry kind; unknown kinds are top level.
pub fn toc_level(kind: &str) -> i32 {
    match kind {
        "toc-strong-1" => 1,
        "toc-strong-2" => 2,
        "toc-1" => 3,
        "toc-2" => 4,
        "toc-3" => 5,
        "toc-4" => 6,
        "toc-5" => 7,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PdfVersion;

    fn entry(title: &str, level: i32) -> OutlineEntry {
        OutlineEntry {
            title: title.to_string(),
            target: PagePoint {
                page: 0,
                x: Px::from_i32(600),
                y: Px::from_i32(1200),
            },
            level,
        }
    }

    #[test]
    fn levels_are_clamped_into_a_valid_sequence() {
        assert_eq!(normalize_levels(&[3, 3, 5, 0, 2]), (vec![1, 2, 3, 1, 2], 4));
        assert_eq!(normalize_levels(&[1, 2, 2, 1]), (vec![1, 2, 2, 1], 0));
    }

    #[test]
    fn siblings_and_children_are_linked() {
        // A{B,C}, D
        let tree = build_tree(&[1, 2, 2, 1]);
        assert_eq!(tree.roots, vec![0, 3]);
        assert_eq!(tree.nodes[0].children, vec![1, 2]);
        assert_eq!(tree.nodes[1].parent, Some(0));
        assert_eq!((tree.nodes[1].prev, tree.nodes[1].next), (None, Some(2)));
        assert_eq!((tree.nodes[2].prev, tree.nodes[2].next), (Some(1), None));
        assert_eq!((tree.nodes[0].next, tree.nodes[3].prev), (Some(3), Some(0)));
        assert!(tree.nodes[3].children.is_empty());
    }

    #[test]
    fn deep_returns_close_every_open_level() {
        let tree = build_tree(&[1, 2, 3, 4, 1]);
        assert_eq!(tree.roots, vec![0, 4]);
        assert_eq!(tree.nodes[2].children, vec![3]);
    }

    #[test]
    fn written_outline_counts_direct_children_negatively() {
        let entries = vec![entry("A", 1), entry("B", 2), entry("C", 2), entry("D", 1)];
        let levels: Vec<i32> = entries.iter().map(|e| e.level).collect();
        let (levels, _) = normalize_levels(&levels);
        let tree = build_tree(&levels);

        let mut registry = ObjectRegistry::new(Vec::new(), PdfVersion::Pdf14).expect("registry");
        let page = registry.allocate();
        let root = registry.allocate();
        write_outlines(&entries, &tree, root, &[page], 0.12, &mut registry).expect("outlines");
        let text = String::from_utf8_lossy(&registry.into_writer()).into_owned();
        // Ids: page 1, root 2, A 3, B 4, C 5, D 6.
        assert!(text.contains("<< /Title (A) /Parent 2 0 R /Next 6 0 R /First 4 0 R /Last 5 0 R /Count -2 /Dest [1 0 R /XYZ 72 144 null] >>"));
        assert!(text.contains("<< /Title (C) /Parent 3 0 R /Prev 4 0 R /Dest"));
        assert!(text.contains("<< /Type /Outlines /First 3 0 R /Last 6 0 R /Count 2 >>"));
    }

    #[test]
    fn first_anchor_wins_and_labels_are_dense() {
        let mut dests = DestinationTable::default();
        let at = |page| PagePoint {
            page,
            x: Px::ZERO,
            y: Px::ZERO,
        };
        assert_eq!(dests.label_id("intro"), 1);
        assert!(dests.anchor("intro", at(0)));
        assert!(!dests.anchor("intro", at(1)));
        assert_eq!(dests.label_id("later"), 2);
        assert!(!dests.is_anchored(2));
        assert_eq!(dests.len(), 1);

        let mut registry = ObjectRegistry::new(Vec::new(), PdfVersion::Pdf14).expect("registry");
        let page = registry.allocate();
        let id = registry.allocate();
        dests.write(id, &[page], 0.12, &mut registry).expect("dests");
        let text = String::from_utf8_lossy(&registry.into_writer()).into_owned();
        assert!(text.contains("/label1 [1 0 R /XYZ 0 0 null]"));
        assert!(!text.contains("/label2"));
    }

    #[test]
    fn toc_kinds_map_to_levels() {
        assert_eq!(toc_level("toc-strong-1"), 1);
        assert_eq!(toc_level("toc-2"), 4);
        assert_eq!(toc_level("toc-5"), 7);
        assert_eq!(toc_level("index-1"), 1);
    }
}
