use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use base64::Engine;
use image::GenericImageView;
use lopdf::{Document as LoDocument, Object as LoObject, Stream as LoStream, dictionary};

use crate::xobject::EncodedImage;

/// Rectangle in the source's own coordinate space (points for PDF and EPS,
/// pixels for raster images).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub llx: f32,
    pub lly: f32,
    pub urx: f32,
    pub ury: f32,
}

impl BBox {
    pub fn new(llx: f32, lly: f32, urx: f32, ury: f32) -> Self {
        Self { llx, lly, urx, ury }
    }

    pub fn width(&self) -> f32 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f32 {
        self.ury - self.lly
    }

    /// Finite with a positive area.
    pub fn is_valid(&self) -> bool {
        [self.llx, self.lly, self.urx, self.ury].iter().all(|v| v.is_finite())
            && self.width() > 0.0
            && self.height() > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertError {
    pub source: String,
    pub message: String,
}

impl ConvertError {
    pub fn new(source: &str, message: impl Into<String>) -> Self {
        Self {
            source: abbreviate(source),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

impl std::error::Error for ConvertError {}

/// Data URIs are shortened in messages; the payload is noise.
fn abbreviate(source: &str) -> String {
    if source.starts_with("data:") && source.len() > 48 {
        let cut = source
            .char_indices()
            .take_while(|(i, _)| *i < 40)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &source[..cut])
    } else {
        source.to_string()
    }
}

/// Turns an image reference into a one-page intermediate document.
///
/// `bounding_box` is called when an image is first drawn and must be cheap enough
/// for that; `convert` runs once per distinct image when the document closes.
pub trait ImageConverter {
    fn bounding_box(&self, source: &str) -> Option<BBox>;
    fn convert(&self, source: &str) -> Result<LoDocument, ConvertError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Pdf,
    Raster,
    PostScript,
    Unknown,
}

fn classify_mime(mime: &str) -> SourceKind {
    match mime {
        "application/pdf" => SourceKind::Pdf,
        "application/postscript" | "image/x-eps" | "application/eps" => SourceKind::PostScript,
        m if m.starts_with("image/") => SourceKind::Raster,
        _ => SourceKind::Unknown,
    }
}

fn classify_path(path: &Path) -> SourceKind {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => SourceKind::Pdf,
        "eps" | "ps" | "epsf" => SourceKind::PostScript,
        "png" | "jpg" | "jpeg" => SourceKind::Raster,
        _ => SourceKind::Unknown,
    }
}

/// Falls back to sniffing the leading bytes when the name says nothing.
fn sniff(bytes: &[u8]) -> SourceKind {
    if bytes.starts_with(b"%PDF") {
        SourceKind::Pdf
    } else if bytes.starts_with(b"%!") {
        SourceKind::PostScript
    } else if image::guess_format(bytes).is_ok() {
        SourceKind::Raster
    } else {
        SourceKind::Unknown
    }
}

/// Decoded source: its kind and raw bytes.
struct Loaded {
    kind: SourceKind,
    bytes: Vec<u8>,
}

fn load(source: &str) -> Result<Loaded, ConvertError> {
    if let Some((mime, bytes)) = parse_data_uri(source) {
        let kind = match classify_mime(&mime) {
            SourceKind::Unknown => sniff(&bytes),
            kind => kind,
        };
        return Ok(Loaded { kind, bytes });
    }
    if source.starts_with("data:") {
        return Err(ConvertError::new(source, "malformed data URI"));
    }
    let path = Path::new(source);
    let bytes = std::fs::read(path).map_err(|err| ConvertError::new(source, err.to_string()))?;
    let kind = match classify_path(path) {
        SourceKind::Unknown => sniff(&bytes),
        kind => kind,
    };
    Ok(Loaded { kind, bytes })
}

pub(crate) fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    if !uri.starts_with("data:") {
        return None;
    }
    let (header, payload) = uri.split_once(',')?;
    let mime = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_ascii_lowercase();
    let data = if header.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, data))
}

/// `%%BoundingBox: llx lly urx ury` from a PostScript header. `(atend)` entries are
/// skipped so the trailer copy is picked up instead.
pub(crate) fn postscript_bounding_box(bytes: &[u8]) -> Option<BBox> {
    let text = String::from_utf8_lossy(bytes);
    text.lines().find_map(|line| {
        let rest = line.strip_prefix("%%BoundingBox:")?;
        let values: Vec<f32> = rest
            .split_whitespace()
            .map(str::parse::<f32>)
            .collect::<Result<_, _>>()
            .ok()?;
        match values.as_slice() {
            [llx, lly, urx, ury] => Some(BBox::new(*llx, *lly, *urx, *ury)).filter(BBox::is_valid),
            _ => None,
        }
    })
}

fn decode_raster(bytes: &[u8]) -> Option<EncodedImage> {
    let format = image::guess_format(bytes).ok();
    let decoded = image::load_from_memory(bytes).ok()?;
    let (width, height) = decoded.dimensions();
    if matches!(format, Some(image::ImageFormat::Jpeg)) {
        let color_space = match decoded.color() {
            image::ColorType::L8 | image::ColorType::La8 => "DeviceGray",
            _ => "DeviceRGB",
        };
        return Some(EncodedImage {
            width,
            height,
            color_space,
            filter: "DCTDecode",
            data: bytes.to_vec(),
            alpha: None,
        });
    }
    Some(EncodedImage::from_rgba(width, height, decoded.to_rgba8().as_raw()))
}

fn raster_dimensions(bytes: &[u8]) -> Option<BBox> {
    let decoded = image::load_from_memory(bytes).ok()?;
    let (width, height) = decoded.dimensions();
    Some(BBox::new(0.0, 0.0, width as f32, height as f32)).filter(BBox::is_valid)
}

/// One page the size of the image at one point per pixel, with the image filling it.
fn wrap_raster(image: &EncodedImage) -> LoDocument {
    let mut doc = LoDocument::with_version("1.5");
    let pages_id = doc.new_object_id();

    let (w, h) = (image.width as i64, image.height as i64);
    let mut image_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => w,
        "Height" => h,
        "ColorSpace" => image.color_space,
        "BitsPerComponent" => 8,
        "Filter" => image.filter,
    };
    if let Some(alpha) = &image.alpha {
        let mask = LoStream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w,
                "Height" => h,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            alpha.clone(),
        );
        let mask_id = doc.add_object(mask);
        image_dict.set("SMask", mask_id);
    }
    let image_id = doc.add_object(LoStream::new(image_dict, image.data.clone()));

    let content = format!("q {} 0 0 {} 0 0 cm /Im0 Do Q", w, h);
    let content_id = doc.add_object(LoStream::new(lopdf::Dictionary::new(), content.into_bytes()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
    });
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

fn first_page_box(doc: &LoDocument) -> Option<BBox> {
    let page_id = *doc.get_pages().values().next()?;
    let page = doc.get_object(page_id).ok()?.as_dict().ok()?;
    let entry = [b"CropBox".as_slice(), b"MediaBox".as_slice()]
        .iter()
        .find_map(|key| page.get(key).ok())?;
    let values: Vec<f32> = entry
        .as_array()
        .ok()?
        .iter()
        .filter_map(|v| match v {
            LoObject::Integer(i) => Some(*i as f32),
            LoObject::Real(r) => Some(*r as f32),
            _ => None,
        })
        .collect();
    match values.as_slice() {
        [a, b, c, d] => Some(BBox::new(a.min(*c), b.min(*d), a.max(*c), b.max(*d))).filter(BBox::is_valid),
        _ => None,
    }
}

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Converter for PDF, PNG, JPEG and (through an external interpreter) EPS sources.
#[derive(Debug, Clone)]
pub struct BuiltinConverter {
    postscript_program: Option<String>,
    temp_dir: PathBuf,
}

impl Default for BuiltinConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinConverter {
    /// Uses `gs` for PostScript sources and the system temp directory.
    pub fn new() -> Self {
        Self {
            postscript_program: Some("gs".to_string()),
            temp_dir: std::env::temp_dir(),
        }
    }

    pub fn with_postscript_program(mut self, program: impl Into<String>) -> Self {
        self.postscript_program = Some(program.into());
        self
    }

    /// PostScript sources then fail to convert; their bounding box is still read.
    pub fn without_postscript(mut self) -> Self {
        self.postscript_program = None;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    fn temp_path(&self, ext: &str) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.temp_dir
            .join(format!("inkset-{}-{}.{}", std::process::id(), n, ext))
    }

    fn convert_postscript(&self, source: &str, bytes: &[u8]) -> Result<LoDocument, ConvertError> {
        let program = self
            .postscript_program
            .as_deref()
            .ok_or_else(|| ConvertError::new(source, "no PostScript interpreter configured"))?;
        let bbox = postscript_bounding_box(bytes)
            .ok_or_else(|| ConvertError::new(source, "missing %%BoundingBox"))?;

        let input = self.temp_path("eps");
        let output = self.temp_path("pdf");
        std::fs::write(&input, bytes).map_err(|err| ConvertError::new(source, err.to_string()))?;
        let status = Command::new(program)
            .arg("-q")
            .arg("-dSAFER")
            .arg("-dNOPAUSE")
            .arg("-dBATCH")
            .arg("-sDEVICE=pdfwrite")
            .arg(format!("-dDEVICEWIDTHPOINTS={}", bbox.width().ceil()))
            .arg(format!("-dDEVICEHEIGHTPOINTS={}", bbox.height().ceil()))
            .arg("-dFIXEDMEDIA")
            .arg(format!("-sOutputFile={}", output.display()))
            .arg("-c")
            .arg(format!("<< /PageOffset [{} {}] >> setpagedevice", -bbox.llx, -bbox.lly))
            .arg("-f")
            .arg(&input)
            .status();
        let _ = std::fs::remove_file(&input);

        let result = match status {
            Ok(status) if status.success() => LoDocument::load(&output)
                .map_err(|err| ConvertError::new(source, format!("interpreter output: {err}"))),
            Ok(status) => Err(ConvertError::new(source, format!("{program} exited with {status}"))),
            Err(err) => Err(ConvertError::new(source, format!("{program}: {err}"))),
        };
        let _ = std::fs::remove_file(&output);
        result
    }
}

impl ImageConverter for BuiltinConverter {
    fn bounding_box(&self, source: &str) -> Option<BBox> {
        let loaded = load(source).ok()?;
        match loaded.kind {
            SourceKind::Pdf => first_page_box(&LoDocument::load_mem(&loaded.bytes).ok()?),
            SourceKind::Raster => raster_dimensions(&loaded.bytes),
            SourceKind::PostScript => postscript_bounding_box(&loaded.bytes),
            SourceKind::Unknown => None,
        }
    }

    fn convert(&self, source: &str) -> Result<LoDocument, ConvertError> {
        let loaded = load(source)?;
        match loaded.kind {
            SourceKind::Pdf => LoDocument::load_mem(&loaded.bytes)
                .map_err(|err| ConvertError::new(source, err.to_string())),
            SourceKind::Raster => decode_raster(&loaded.bytes)
                .map(|image| wrap_raster(&image))
                .ok_or_else(|| ConvertError::new(source, "undecodable raster image")),
            SourceKind::PostScript => self.convert_postscript(source, &loaded.bytes),
            SourceKind::Unknown => Err(ConvertError::new(source, "unrecognized image format")),
        }
    }
}
