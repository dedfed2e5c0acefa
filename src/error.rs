use std::fmt;

use crate::registry::ObjectId;

#[derive(Debug)]
pub enum RenderError {
    /// The output target could not be created or the header could not be written.
    Init(std::io::Error),
    Registry(RegistryError),
    InvalidConfiguration(String),
    Io(std::io::Error),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Init(err) => write!(f, "cannot initialise output: {}", err),
            RenderError::Registry(err) => write!(f, "object registry error: {}", err),
            RenderError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            RenderError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Init(err) | RenderError::Io(err) => Some(err),
            RenderError::Registry(err) => Some(err),
            RenderError::InvalidConfiguration(_) => None,
        }
    }
}

impl From<std::io::Error> for RenderError {
    fn from(value: std::io::Error) -> Self {
        RenderError::Io(value)
    }
}

impl From<RegistryError> for RenderError {
    fn from(value: RegistryError) -> Self {
        RenderError::Registry(value)
    }
}

/// Violations of the allocate-once, write-once object discipline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DoubleWrite(ObjectId),
    UnknownObject(ObjectId),
    Unresolved(Vec<ObjectId>),
    Closed,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DoubleWrite(id) => write!(f, "object {} written twice", id),
            RegistryError::UnknownObject(id) => write!(f, "object {} was never allocated", id),
            RegistryError::Unresolved(ids) => {
                let list = ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "objects allocated but never written: {}", list)
            }
            RegistryError::Closed => write!(f, "document already closed"),
        }
    }
}

impl std::error::Error for RegistryError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningCode {
    PageWriteFailure,
    ImageConversion,
    MissingGlyph,
    UnresolvedLink,
}

impl WarningCode {
    pub fn as_str(self) -> &'static str {
        match self {
            WarningCode::PageWriteFailure => "PAGE_WRITE_FAILURE",
            WarningCode::ImageConversion => "IMAGE_CONVERSION",
            WarningCode::MissingGlyph => "MISSING_GLYPH",
            WarningCode::UnresolvedLink => "UNRESOLVED_LINK",
        }
    }
}

/// A recoverable problem. Generation continues and the warning is reported in the summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderWarning {
    pub code: WarningCode,
    pub message: String,
}

impl RenderWarning {
    pub(crate) fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for RenderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn registry_errors_chain_through_render_error() {
        let err = RenderError::from(RegistryError::Unresolved(vec![
            ObjectId::from_raw(4),
            ObjectId::from_raw(9),
        ]));
        assert_eq!(
            err.to_string(),
            "object registry error: objects allocated but never written: 4, 9"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn warnings_display_their_code() {
        let warning = RenderWarning::new(WarningCode::UnresolvedLink, "#intro");
        assert_eq!(warning.to_string(), "UNRESOLVED_LINK: #intro");
    }
}
