use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write;

use lopdf::{Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, StringFormat};
use sha2::{Digest, Sha256};

use crate::content::{escape_pdf_bytes, fmt, fmt64};
use crate::convert::{BBox, ImageConverter};
use crate::error::RenderError;
use crate::glyph::Glyph;
use crate::registry::{AllocateId, ObjectId, ObjectRegistry};

/// Pool key for an external image, derived once from the source reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageKey([u8; 32]);

impl ImageKey {
    pub fn for_source(source: &str) -> Self {
        Self(Sha256::digest(source.as_bytes()).into())
    }
}

/// An external image drawn at least once: the source and its probed bounding box.
/// Conversion is deferred to the close-time flush.
#[derive(Debug, Clone)]
pub(crate) struct ImageResource {
    pub source: String,
    pub bbox: Option<BBox>,
}

/// An in-memory RGBA raster whose `origin` pixel is placed on the drawing position.
/// Rows run top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    pub width: u32,
    pub height: u32,
    pub origin_x: i32,
    pub origin_y: i32,
    pixels: Vec<u8>,
}

impl Picture {
    /// `rgba` is padded with transparent pixels or truncated to `width * height * 4`.
    pub fn new(width: u32, height: u32, origin_x: i32, origin_y: i32, mut rgba: Vec<u8>) -> Self {
        rgba.resize(width as usize * height as usize * 4, 0);
        Self {
            width,
            height,
            origin_x,
            origin_y,
            pixels: rgba,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Content hash of a picture: dimensions, origin and pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PictureKey([u8; 32]);

impl PictureKey {
    pub fn for_picture(picture: &Picture) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(picture.width.to_be_bytes());
        hasher.update(picture.height.to_be_bytes());
        hasher.update(picture.origin_x.to_be_bytes());
        hasher.update(picture.origin_y.to_be_bytes());
        hasher.update(&picture.pixels);
        Self(hasher.finalize().into())
    }
}

/// Image XObject payload ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EncodedImage {
    pub width: u32,
    pub height: u32,
    pub color_space: &'static str,
    pub filter: &'static str,
    pub data: Vec<u8>,
    /// Flate-compressed 8-bit soft mask.
    pub alpha: Option<Vec<u8>>,
}

impl EncodedImage {
    pub(crate) fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Self {
        let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
        let mut alpha = Vec::with_capacity(width as usize * height as usize);
        let mut translucent = false;
        for pixel in rgba.chunks_exact(4) {
            rgb.extend_from_slice(&pixel[..3]);
            alpha.push(pixel[3]);
            translucent |= pixel[3] != 255;
        }
        Self {
            width,
            height,
            color_space: "DeviceRGB",
            filter: "FlateDecode",
            data: crate::content::flate_compress(&rgb),
            alpha: translucent.then(|| crate::content::flate_compress(&alpha)),
        }
    }

    pub(crate) fn from_glyph(glyph: &Glyph) -> Self {
        Self {
            width: glyph.width,
            height: glyph.height,
            color_space: "DeviceGray",
            filter: "FlateDecode",
            data: crate::content::flate_compress(&glyph.gray_samples()),
            alpha: None,
        }
    }

    /// Writes the image into `id`, plus a soft-mask object when there is alpha.
    pub(crate) fn write<W: Write>(
        &self,
        id: ObjectId,
        registry: &mut ObjectRegistry<W>,
    ) -> Result<(), RenderError> {
        let mut dict = format!(
            "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /{} /BitsPerComponent 8 /Filter /{}",
            self.width, self.height, self.color_space, self.filter
        );
        if let Some(alpha) = &self.alpha {
            let mask_id = registry.allocate();
            registry.write_stream(
                mask_id,
                &format!(
                    "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8 /Filter /FlateDecode",
                    self.width, self.height
                ),
                alpha,
            )?;
            dict.push_str(&format!(" /SMask {}", mask_id.reference()));
        }
        registry.write_stream(id, &dict, &self.data)
    }
}

/// First page of an intermediate document, gathered before anything is written so
/// that a malformed document leaves the registry untouched.
struct ImportedPage {
    content: Vec<u8>,
    bbox: BBox,
    resources: LoObject,
    reachable: Vec<(LoObjectId, LoObject)>,
}

fn import_first_page(doc: &LoDocument, fallback: Option<BBox>) -> Result<ImportedPage, String> {
    if doc.is_encrypted() {
        return Err("document is encrypted".to_string());
    }
    let page_id = doc
        .get_pages()
        .values()
        .next()
        .copied()
        .ok_or_else(|| "document has no pages".to_string())?;
    let page = doc
        .get_object(page_id)
        .and_then(LoObject::as_dict)
        .map_err(|err| format!("page object: {err}"))?;
    let content = doc
        .get_page_content(page_id)
        .map_err(|err| format!("page content: {err}"))?;
    let bbox = page_box(doc, page)
        .or(fallback)
        .filter(BBox::is_valid)
        .ok_or_else(|| "page has no usable bounding box".to_string())?;
    let resources = match page.get(b"Resources") {
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .cloned()
            .unwrap_or(LoObject::Dictionary(lopdf::Dictionary::new())),
        Ok(obj) => obj.clone(),
        Err(_) => LoObject::Dictionary(lopdf::Dictionary::new()),
    };
    let reachable = reachable_objects(doc, &resources);
    Ok(ImportedPage {
        content,
        bbox,
        resources,
        reachable,
    })
}

fn page_box(doc: &LoDocument, page: &lopdf::Dictionary) -> Option<BBox> {
    let from_dict = |dict: &lopdf::Dictionary| {
        [b"CropBox".as_slice(), b"MediaBox".as_slice()]
            .iter()
            .find_map(|key| dict.get(key).ok().and_then(|obj| bbox_from_object(doc, obj)))
    };
    from_dict(page).or_else(|| {
        let parent = match page.get(b"Parent").ok()? {
            LoObject::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok()?,
            _ => return None,
        };
        from_dict(parent)
    })
}

fn bbox_from_object(doc: &LoDocument, obj: &LoObject) -> Option<BBox> {
    let obj = match obj {
        LoObject::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let values: Vec<f32> = obj.as_array().ok()?.iter().filter_map(number).collect();
    match values.as_slice() {
        [a, b, c, d] => Some(BBox::new(a.min(*c), b.min(*d), a.max(*c), b.max(*d))),
        _ => None,
    }
}

fn number(obj: &LoObject) -> Option<f32> {
    match obj {
        LoObject::Integer(i) => Some(*i as f32),
        LoObject::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Indirect objects reachable from `root`, in breadth-first order. `/Parent` links
/// are not followed so page trees are never dragged in.
fn reachable_objects(doc: &LoDocument, root: &LoObject) -> Vec<(LoObjectId, LoObject)> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::new();
    collect_references(root, &mut queue);
    while let Some(id) = queue.pop_front() {
        if seen.contains(&id) {
            continue;
        }
        let Ok(obj) = doc.get_object(id) else {
            continue;
        };
        seen.insert(id);
        collect_references(obj, &mut queue);
        order.push((id, obj.clone()));
    }
    order
}

fn collect_references(obj: &LoObject, out: &mut VecDeque<LoObjectId>) {
    match obj {
        LoObject::Reference(id) => out.push_back(*id),
        LoObject::Array(items) => items.iter().for_each(|item| collect_references(item, out)),
        LoObject::Dictionary(dict) => collect_dict_references(dict, out),
        LoObject::Stream(stream) => collect_dict_references(&stream.dict, out),
        _ => {}
    }
}

fn collect_dict_references(dict: &lopdf::Dictionary, out: &mut VecDeque<LoObjectId>) {
    for (key, value) in dict.iter() {
        if key.as_slice() != b"Parent" {
            collect_references(value, out);
        }
    }
}

/// Serializes a foreign object with references renumbered through `map`.
/// References outside the map become `null`.
fn serialize_object(obj: &LoObject, map: &HashMap<LoObjectId, ObjectId>, out: &mut Vec<u8>) {
    match obj {
        LoObject::Null => out.extend_from_slice(b"null"),
        LoObject::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        LoObject::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
        LoObject::Real(r) => out.extend_from_slice(fmt64(*r as f64).as_bytes()),
        LoObject::Name(name) => {
            out.push(b'/');
            out.extend_from_slice(escape_name_bytes(name).as_bytes());
        }
        LoObject::String(bytes, StringFormat::Literal) => {
            out.push(b'(');
            out.extend_from_slice(escape_pdf_bytes(bytes).as_bytes());
            out.push(b')');
        }
        LoObject::String(bytes, StringFormat::Hexadecimal) => {
            out.push(b'<');
            for byte in bytes {
                out.extend_from_slice(format!("{:02X}", byte).as_bytes());
            }
            out.push(b'>');
        }
        LoObject::Array(items) => {
            out.push(b'[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(b' ');
                }
                serialize_object(item, map, out);
            }
            out.push(b']');
        }
        LoObject::Dictionary(dict) => serialize_dict(dict, map, None, out),
        LoObject::Stream(stream) => {
            serialize_dict(&stream.dict, map, Some(stream.content.len()), out);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&stream.content);
            out.extend_from_slice(b"\nendstream");
        }
        LoObject::Reference(id) => match map.get(id) {
            Some(new_id) => out.extend_from_slice(new_id.reference().as_bytes()),
            None => out.extend_from_slice(b"null"),
        },
    }
}

fn serialize_dict(
    dict: &lopdf::Dictionary,
    map: &HashMap<LoObjectId, ObjectId>,
    length: Option<usize>,
    out: &mut Vec<u8>,
) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        if length.is_some() && key.as_slice() == b"Length" {
            continue;
        }
        out.extend_from_slice(b" /");
        out.extend_from_slice(escape_name_bytes(key).as_bytes());
        out.push(b' ');
        serialize_object(value, map, out);
    }
    if let Some(length) = length {
        out.extend_from_slice(format!(" /Length {}", length).as_bytes());
    }
    out.extend_from_slice(b" >>");
}

fn escape_name_bytes(name: &[u8]) -> String {
    let mut out = String::with_capacity(name.len());
    for &byte in name {
        let regular = byte.is_ascii_graphic()
            && !matches!(byte, b'#' | b'/' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'%');
        if regular {
            out.push(byte as char);
        } else {
            out.push_str(&format!("#{:02X}", byte));
        }
    }
    out
}

/// Converts `resource` and writes it as a Form XObject into `id`.
///
/// Returns `Ok(Some(reason))` when conversion or import failed; an empty form has
/// then been written so every reference to `id` stays valid.
pub(crate) fn write_image_form<W: Write>(
    id: ObjectId,
    resource: &ImageResource,
    converter: &dyn ImageConverter,
    registry: &mut ObjectRegistry<W>,
) -> Result<Option<String>, RenderError> {
    let imported = converter
        .convert(&resource.source)
        .map_err(|err| err.to_string())
        .and_then(|doc| import_first_page(&doc, resource.bbox));
    let page = match imported {
        Ok(page) => page,
        Err(reason) => {
            registry.write_stream(id, "/Type /XObject /Subtype /Form /BBox [0 0 0 0]", b"")?;
            return Ok(Some(reason));
        }
    };

    let map: HashMap<LoObjectId, ObjectId> = page
        .reachable
        .iter()
        .map(|(old, _)| (*old, registry.allocate()))
        .collect();
    for (old, object) in &page.reachable {
        let mut body = Vec::new();
        serialize_object(object, &map, &mut body);
        registry.write(map[old], &body)?;
    }
    let mut resources = Vec::new();
    serialize_object(&page.resources, &map, &mut resources);
    let resources = String::from_utf8_lossy(&resources).into_owned();

    let bbox = page.bbox;
    let dict = format!(
        "/Type /XObject /Subtype /Form /FormType 1 /BBox [{} {} {} {}] /Matrix [1 0 0 1 {} {}] /Resources {}",
        fmt(bbox.llx),
        fmt(bbox.lly),
        fmt(bbox.urx),
        fmt(bbox.ury),
        fmt(-bbox.llx),
        fmt(-bbox.lly),
        resources
    );
    registry.write_stream(id, &dict, &page.content)?;
    Ok(None)
}
