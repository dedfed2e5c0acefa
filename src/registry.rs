use std::fmt;
use std::io::Write;

use crate::error::{RegistryError, RenderError};

/// Number of an indirect object in the output document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u32);

impl ObjectId {
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// `N 0 R`
    pub(crate) fn reference(self) -> String {
        format!("{} 0 R", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anything that can hand out fresh object ids.
pub(crate) trait AllocateId {
    fn allocate(&mut self) -> ObjectId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DocumentState {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PdfVersion {
    Pdf14,
    #[default]
    Pdf17,
}

impl PdfVersion {
    fn header(self) -> &'static [u8] {
        match self {
            PdfVersion::Pdf14 => b"%PDF-1.4\n",
            PdfVersion::Pdf17 => b"%PDF-1.7\n",
        }
    }
}

/// Streams indirect objects to the sink as soon as they are written and keeps the
/// byte offsets needed for the cross-reference table.
///
/// Ids may be referenced before their object exists; `close` refuses to finish a
/// document with ids that were allocated but never written.
pub(crate) struct ObjectRegistry<W: Write> {
    writer: W,
    offset: usize,
    offsets: Vec<Option<usize>>, // index by object id; 0 is the free object.
    state: DocumentState,
}

impl<W: Write> ObjectRegistry<W> {
    pub(crate) fn new(mut writer: W, version: PdfVersion) -> Result<Self, RenderError> {
        let mut offset = 0;
        write_bytes(&mut writer, version.header(), &mut offset).map_err(RenderError::Init)?;
        write_bytes(&mut writer, b"%\xE2\xE3\xCF\xD3\n", &mut offset).map_err(RenderError::Init)?;
        Ok(Self {
            writer,
            offset,
            offsets: vec![Some(0)],
            state: DocumentState::Open,
        })
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> DocumentState {
        self.state
    }

    /// Ids handed out so far, excluding the free object.
    pub(crate) fn allocated_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub(crate) fn unwritten(&self) -> Vec<ObjectId> {
        self.offsets
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, slot)| slot.is_none())
            .map(|(id, _)| ObjectId(id as u32))
            .collect()
    }

    pub(crate) fn write(&mut self, id: ObjectId, body: &[u8]) -> Result<(), RenderError> {
        if self.state == DocumentState::Closed {
            return Err(RegistryError::Closed.into());
        }
        if id.0 == 0 {
            return Err(RegistryError::UnknownObject(id).into());
        }
        match self.offsets.get(id.0 as usize) {
            None => return Err(RegistryError::UnknownObject(id).into()),
            Some(Some(_)) => return Err(RegistryError::DoubleWrite(id).into()),
            Some(None) => {}
        }
        self.offsets[id.0 as usize] = Some(self.offset);
        write_bytes(&mut self.writer, format!("{} 0 obj\n", id.0).as_bytes(), &mut self.offset)?;
        write_bytes(&mut self.writer, body, &mut self.offset)?;
        write_bytes(&mut self.writer, b"\nendobj\n", &mut self.offset)?;
        Ok(())
    }

    pub(crate) fn write_str(&mut self, id: ObjectId, body: &str) -> Result<(), RenderError> {
        self.write(id, body.as_bytes())
    }

    /// Writes a stream object; `/Length` is appended to `dict_entries`.
    pub(crate) fn write_stream(
        &mut self,
        id: ObjectId,
        dict_entries: &str,
        data: &[u8],
    ) -> Result<(), RenderError> {
        let mut body = Vec::with_capacity(data.len() + dict_entries.len() + 48);
        let head = if dict_entries.is_empty() {
            format!("<< /Length {} >>\nstream\n", data.len())
        } else {
            format!("<< {} /Length {} >>\nstream\n", dict_entries, data.len())
        };
        body.extend_from_slice(head.as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.write(id, &body)
    }

    /// Writes the cross-reference table and trailer. Returns the total number of bytes
    /// produced for the document.
    pub(crate) fn close(
        &mut self,
        root: ObjectId,
        info: Option<ObjectId>,
    ) -> Result<usize, RenderError> {
        if self.state == DocumentState::Closed {
            return Err(RegistryError::Closed.into());
        }
        let unresolved = self.unwritten();
        if !unresolved.is_empty() {
            return Err(RegistryError::Unresolved(unresolved).into());
        }

        let total = self.offsets.len();
        let xref_start = self.offset;
        let mut xref = format!("xref\n0 {}\n", total);
        xref.push_str("0000000000 65535 f \n");
        for slot in self.offsets.iter().skip(1) {
            xref.push_str(&format!("{:010} 00000 n \n", slot.unwrap_or(0)));
        }
        let mut trailer = format!("trailer\n<< /Size {} /Root {}", total, root.reference());
        if let Some(info) = info {
            trailer.push_str(&format!(" /Info {}", info.reference()));
        }
        trailer.push_str(&format!(" >>\nstartxref\n{}\n%%EOF\n", xref_start));
        write_bytes(&mut self.writer, xref.as_bytes(), &mut self.offset)?;
        write_bytes(&mut self.writer, trailer.as_bytes(), &mut self.offset)?;
        self.writer.flush()?;
        self.state = DocumentState::Closed;
        Ok(self.offset)
    }

    pub(crate) fn into_writer(self) -> W {
        self.writer
    }
}

impl<W: Write> AllocateId for ObjectRegistry<W> {
    fn allocate(&mut self) -> ObjectId {
        self.offsets.push(None);
        ObjectId((self.offsets.len() - 1) as u32)
    }
}

fn write_bytes<W: Write>(writer: &mut W, data: &[u8], offset: &mut usize) -> std::io::Result<()> {
    writer.write_all(data)?;
    *offset += data.len();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ObjectRegistry<Vec<u8>> {
        ObjectRegistry::new(Vec::new(), PdfVersion::Pdf17).expect("header")
    }

    #[test]
    fn ids_are_dense_and_start_at_one() {
        let mut reg = registry();
        let a = reg.allocate();
        let b = reg.allocate();
        assert_eq!((a.get(), b.get()), (1, 2));
        assert_eq!(reg.allocated_count(), 2);
        assert_eq!(reg.unwritten(), vec![a, b]);
    }

    #[test]
    fn second_write_of_an_id_is_rejected() {
        let mut reg = registry();
        let id = reg.allocate();
        reg.write_str(id, "<< >>").expect("first write");
        let err = reg.write_str(id, "<< >>").expect_err("second write");
        assert!(matches!(
            err,
            RenderError::Registry(RegistryError::DoubleWrite(found)) if found == id
        ));
    }

    #[test]
    fn writing_an_unallocated_id_is_rejected() {
        let mut reg = registry();
        let err = reg
            .write_str(ObjectId::from_raw(7), "null")
            .expect_err("unknown id");
        assert!(matches!(
            err,
            RenderError::Registry(RegistryError::UnknownObject(_))
        ));
    }

    #[test]
    fn close_refuses_unwritten_ids() {
        let mut reg = registry();
        let root = reg.allocate();
        let dangling = reg.allocate();
        reg.write_str(root, "<< /Type /Catalog >>").expect("root");
        let err = reg.close(root, None).expect_err("unresolved");
        assert!(matches!(
            err,
            RenderError::Registry(RegistryError::Unresolved(ref ids)) if ids == &vec![dangling]
        ));
    }

    #[test]
    fn closed_document_parses_and_rejects_further_writes() {
        let mut reg = registry();
        let catalog = reg.allocate();
        let pages = reg.allocate();
        let late = reg.allocate();
        // Forward reference: the catalog points at an id written afterwards.
        reg.write_str(
            catalog,
            &format!("<< /Type /Catalog /Pages {} >>", pages.reference()),
        )
        .expect("catalog");
        reg.write_str(pages, "<< /Type /Pages /Kids [] /Count 0 >>")
            .expect("pages");
        reg.write_stream(late, "", b"0 0 m").expect("stream");
        let total = reg.close(catalog, None).expect("close");
        assert_eq!(reg.state(), DocumentState::Closed);
        assert!(reg.write_str(late, "null").is_err());

        let bytes = reg.into_writer();
        assert_eq!(bytes.len(), total);
        assert!(bytes.starts_with(b"%PDF-1.7\n"));
        let doc = lopdf::Document::load_mem(&bytes).expect("parse");
        let root = doc.trailer.get(b"Root").expect("root");
        assert_eq!(root.as_reference().expect("ref"), (catalog.get(), 0));
    }
}
