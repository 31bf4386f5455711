use crate::catalog::{list_templates, preview_file_name};
use crate::error::CertError;
use crate::pdf_raster::rasterize_first_page;
use rayon::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_PREVIEW_DPI: u32 = 150;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewOutcome {
    Generated(PathBuf),
    /// A preview was already on disk and was left alone.
    Existing(PathBuf),
}

/// Writes first-page PNG thumbnails of templates into `preview_dir`.
#[derive(Debug, Clone)]
pub struct PreviewGenerator {
    preview_dir: PathBuf,
    dpi: u32,
}

impl PreviewGenerator {
    pub fn new(preview_dir: impl Into<PathBuf>, dpi: u32) -> Self {
        Self {
            preview_dir: preview_dir.into(),
            dpi,
        }
    }

    pub fn preview_path_for(&self, template_id: &str) -> PathBuf {
        self.preview_dir.join(preview_file_name(template_id))
    }

    pub fn ensure_preview(&self, template_path: &Path) -> Result<PreviewOutcome, CertError> {
        let template_id = template_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                CertError::Template(format!(
                    "template path has no usable file name: {}",
                    template_path.display()
                ))
            })?;
        let target = self.preview_path_for(template_id);
        if target.exists() {
            return Ok(PreviewOutcome::Existing(target));
        }

        let png = rasterize_first_page(template_path, self.dpi)?;
        std::fs::create_dir_all(&self.preview_dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.preview_dir)?;
        tmp.write_all(&png)?;
        tmp.flush()?;
        tmp.persist(&target)?;
        tracing::info!(template = template_id, preview = %target.display(), "generated preview");
        Ok(PreviewOutcome::Generated(target))
    }

    /// Makes sure every template in `template_dir` has a preview and
    /// returns how many were newly written. Failures are logged per
    /// template and do not stop the batch.
    pub fn generate_all(&self, template_dir: &Path) -> usize {
        let templates = match list_templates(template_dir, &self.preview_dir) {
            Ok(templates) => templates,
            Err(err) => {
                tracing::error!(dir = %template_dir.display(), error = %err, "failed to list templates");
                return 0;
            }
        };

        templates
            .par_iter()
            .filter(|entry| entry.preview_path.is_none())
            .map(|entry| match self.ensure_preview(&entry.pdf_path) {
                Ok(PreviewOutcome::Generated(_)) => 1,
                Ok(PreviewOutcome::Existing(_)) => 0,
                Err(err) => {
                    tracing::error!(template = %entry.id, error = %err, "failed to generate preview");
                    0
                }
            })
            .sum()
    }
}
