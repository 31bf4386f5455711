use crate::catalog::TEMPLATE_EXTENSION;
use crate::error::GenerateError;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A checked certificate request. Holding one means the name is non-empty
/// and the template file existed when the request was validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    name: String,
    template_id: String,
    template_path: PathBuf,
}

impl RenderRequest {
    /// Checks run in order and stop at the first failure; only the last
    /// one touches the filesystem.
    pub fn validate(
        name: &str,
        template_id: &str,
        template_dir: &Path,
    ) -> Result<Self, GenerateError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GenerateError::EmptyName);
        }
        let template_id = template_id.trim();
        if template_id.is_empty() {
            return Err(GenerateError::MissingTemplate);
        }
        if !template_id.ends_with(TEMPLATE_EXTENSION) || template_id.contains(['/', '\\']) {
            return Err(GenerateError::InvalidTemplate);
        }
        let template_path = template_dir.join(template_id);
        if !template_path.is_file() {
            return Err(GenerateError::TemplateNotFound);
        }
        Ok(Self {
            name: name.to_string(),
            template_id: template_id.to_string(),
            template_path,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    /// On-disk name: `<safe name>_<YYYYmmdd_HHMMSS>_certificate.pdf`.
    pub fn output_file_name(&self, timestamp: NaiveDateTime) -> String {
        format!(
            "{}_{}_certificate.pdf",
            safe_file_stem(&self.name),
            timestamp.format(TIMESTAMP_FORMAT)
        )
    }

    /// Name offered to whoever downloads the certificate.
    pub fn download_name(&self) -> String {
        format!("{}_Certificate.pdf", self.name)
    }
}

/// Keeps letters, digits, spaces and underscores, then turns spaces into
/// underscores.
pub fn safe_file_stem(name: &str) -> String {
    name.chars()
        .filter(|ch| ch.is_alphanumeric() || *ch == ' ' || *ch == '_')
        .map(|ch| if ch == ' ' { '_' } else { ch })
        .collect()
}
