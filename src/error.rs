use std::fmt;

/// Failure inside one of the rendering components.
#[derive(Debug)]
pub enum CertError {
    Font(String),
    Config(String),
    Pdf(String),
    Template(String),
    Raster(String),
    Json(serde_json::Error),
    Io(std::io::Error),
}

impl fmt::Display for CertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertError::Font(message) => write!(f, "font error: {}", message),
            CertError::Config(message) => write!(f, "config error: {}", message),
            CertError::Pdf(message) => write!(f, "pdf error: {}", message),
            CertError::Template(message) => write!(f, "template error: {}", message),
            CertError::Raster(message) => write!(f, "raster error: {}", message),
            CertError::Json(err) => write!(f, "json error: {}", err),
            CertError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for CertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CertError::Json(err) => Some(err),
            CertError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CertError {
    fn from(value: std::io::Error) -> Self {
        CertError::Io(value)
    }
}

impl From<serde_json::Error> for CertError {
    fn from(value: serde_json::Error) -> Self {
        CertError::Json(value)
    }
}

impl From<tempfile::PersistError> for CertError {
    fn from(value: tempfile::PersistError) -> Self {
        CertError::Io(value.error)
    }
}

impl From<lopdf::Error> for CertError {
    fn from(value: lopdf::Error) -> Self {
        lopdf_err(value)
    }
}

pub(crate) fn lopdf_err(err: lopdf::Error) -> CertError {
    CertError::Pdf(err.to_string())
}

/// Outcome of a certificate request that did not produce a file. The
/// `Display` text is meant to be shown to the person who asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateError {
    EmptyName,
    MissingTemplate,
    InvalidTemplate,
    TemplateNotFound,
    GenerationFailed,
}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            GenerateError::EmptyName => "Please provide a recipient name.",
            GenerateError::MissingTemplate => "Please select a template.",
            GenerateError::InvalidTemplate => "Invalid template selected.",
            GenerateError::TemplateNotFound => "Selected template not found.",
            GenerateError::GenerationFailed => "Error generating certificate. Please try again.",
        };
        f.write_str(message)
    }
}

impl std::error::Error for GenerateError {}
