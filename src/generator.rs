use crate::catalog::{TemplateEntry, list_templates};
use crate::compose::{ComposeSummary, TemplateDocument, compose_certificate};
use crate::config::{PlacementConfig, TemplateConfigStore};
use crate::error::{CertError, GenerateError};
use crate::font::FontRegistry;
use crate::layout::resolve_layout;
use crate::overlay::render_overlay;
use crate::preview::PreviewGenerator;
use crate::request::RenderRequest;
use crate::settings::Settings;
use std::path::{Path, PathBuf};

/// A certificate that made it to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCertificate {
    pub path: PathBuf,
    pub download_name: String,
    pub pages: usize,
}

/// Owns the fonts and placement store and runs the whole pipeline:
/// validate, look up placement, lay out, draw the overlay, compose.
#[derive(Debug)]
pub struct CertificateGenerator {
    settings: Settings,
    fonts: FontRegistry,
    store: TemplateConfigStore,
}

impl CertificateGenerator {
    /// Creates the directory layout, then loads fonts and the placement
    /// store. Missing fonts and a missing or broken config file are not
    /// errors; only failing to create directories is.
    pub fn new(settings: Settings) -> Result<Self, CertError> {
        settings.ensure_dirs()?;
        let fonts = FontRegistry::load_dir(&settings.font_dir);
        let store = TemplateConfigStore::load(&settings.config_file);
        Ok(Self {
            settings,
            fonts,
            store,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn fonts(&self) -> &FontRegistry {
        &self.fonts
    }

    pub fn store(&self) -> &TemplateConfigStore {
        &self.store
    }

    pub fn placement(&self, template_id: &str) -> Result<PlacementConfig, CertError> {
        self.store.get(template_id)
    }

    pub fn update_placement(
        &mut self,
        template_id: &str,
        config: PlacementConfig,
    ) -> Result<(), CertError> {
        self.store.set(template_id, &config)
    }

    pub fn update_placement_json(&mut self, template_id: &str, json: &str) -> Result<(), CertError> {
        self.store.set_json(template_id, json)
    }

    pub fn templates(&self) -> Result<Vec<TemplateEntry>, CertError> {
        list_templates(&self.settings.template_dir, &self.settings.preview_dir)
    }

    pub fn previews(&self) -> PreviewGenerator {
        PreviewGenerator::new(&self.settings.preview_dir, self.settings.preview_dpi)
    }

    /// Produces one certificate in the output directory. Every failure past
    /// validation collapses into `GenerationFailed`; the cause is logged.
    pub fn generate(
        &self,
        name: &str,
        template_id: &str,
    ) -> Result<GeneratedCertificate, GenerateError> {
        let request = RenderRequest::validate(name, template_id, &self.settings.template_dir)
            .inspect_err(|err| {
                tracing::warn!(template = template_id, reason = %err, "rejected certificate request");
            })?;
        let file_name = request.output_file_name(chrono::Local::now().naive_local());
        let out = self.settings.output_dir.join(file_name);

        match self.render(&request, &out) {
            Ok(summary) => {
                tracing::info!(
                    name = request.name(),
                    template = request.template_id(),
                    path = %out.display(),
                    "certificate generated"
                );
                Ok(GeneratedCertificate {
                    path: out,
                    download_name: request.download_name(),
                    pages: summary.pages_written,
                })
            }
            Err(err) => {
                tracing::error!(
                    name = request.name(),
                    template = request.template_id(),
                    error = %err,
                    "certificate generation failed"
                );
                Err(GenerateError::GenerationFailed)
            }
        }
    }

    /// The overlay is sized from the template's own first page. A stored
    /// placement that does not parse fails here, before anything is written.
    pub fn render(&self, request: &RenderRequest, out: &Path) -> Result<ComposeSummary, CertError> {
        let config = self.store.get(request.template_id())?;
        let template = TemplateDocument::open(request.template_path())?;
        let page = template.first_page_size();
        let layout = resolve_layout(&self.fonts, &config, page, request.name());
        let overlay = render_overlay(&self.fonts, request.name(), &layout, page)?;
        compose_certificate(template, overlay, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::obj_to_f32;
    use crate::compose::tests::{make_template_pdf, temp_dir};
    use crate::config::{NamePosition, TextAlignment};
    use lopdf::content::Content;
    use lopdf::{Document as LoDocument, Object as LoObject};
    use std::fs;

    fn generator(tag: &str) -> CertificateGenerator {
        let settings = Settings::rooted_at(&temp_dir(tag));
        let generator = CertificateGenerator::new(settings).expect("generator");
        make_template_pdf(
            &generator.settings().template_dir.join("black_template.pdf"),
            2,
            800,
            600,
        );
        generator
    }

    fn output_count(generator: &CertificateGenerator) -> usize {
        fs::read_dir(&generator.settings().output_dir)
            .expect("list")
            .count()
    }

    /// Td operands of the single form XObject in a composed file.
    fn overlay_origin(path: &Path) -> (f32, f32) {
        let doc = LoDocument::load(path).expect("load");
        let form = doc
            .objects
            .values()
            .filter_map(|obj| obj.as_stream().ok())
            .find(|stream| {
                stream.dict.get(b"Subtype").and_then(LoObject::as_name).ok()
                    == Some(b"Form".as_slice())
            })
            .expect("form");
        let bytes = form
            .decompressed_content()
            .unwrap_or_else(|_| form.content.clone());
        let content = Content::decode(&bytes).expect("decode");
        let td = content
            .operations
            .iter()
            .find(|op| op.operator == "Td")
            .expect("Td");
        (
            obj_to_f32(&td.operands[0]).expect("x"),
            obj_to_f32(&td.operands[1]).expect("y"),
        )
    }

    #[test]
    fn generates_certificate_with_expected_names() {
        let generator = generator("gen_ok");
        let cert = generator
            .generate(" Jane Doe ", "black_template.pdf")
            .expect("generate");
        assert!(cert.path.is_file());
        assert_eq!(cert.pages, 2);
        assert_eq!(cert.download_name, "Jane Doe_Certificate.pdf");
        let file_name = cert
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .expect("file name");
        assert!(file_name.starts_with("Jane_Doe_"));
        assert!(file_name.ends_with("_certificate.pdf"));
        assert_eq!(cert.path.parent(), Some(generator.settings().output_dir.as_path()));
    }

    #[test]
    fn centered_default_uses_template_geometry() {
        let generator = generator("gen_center");
        let cert = generator
            .generate("Jane Doe", "black_template.pdf")
            .expect("generate");
        let (x, y) = overlay_origin(&cert.path);
        assert!((x - 303.7).abs() < 0.01, "x = {x}");
        assert!((y - 270.0).abs() < 0.01, "y = {y}");
    }

    #[test]
    fn updated_placement_is_used_for_next_certificate() {
        let mut generator = generator("gen_update");
        generator
            .update_placement(
                "black_template.pdf",
                PlacementConfig {
                    name_position: NamePosition { x: 0.1, y: 0.2 },
                    font_size: 20.0,
                    font_color: [0.0, 0.0, 0.0],
                    font_name: "Times-Roman".to_string(),
                    text_alignment: TextAlignment::Left,
                },
            )
            .expect("update");
        let cert = generator
            .generate("Ada", "black_template.pdf")
            .expect("generate");
        let (x, y) = overlay_origin(&cert.path);
        assert!((x - 80.0).abs() < 0.01);
        assert!((y - 120.0).abs() < 0.01);
    }

    #[test]
    fn empty_name_creates_no_output() {
        let generator = generator("gen_empty");
        let err = generator
            .generate("  ", "black_template.pdf")
            .expect_err("rejected");
        assert_eq!(err, GenerateError::EmptyName);
        assert_eq!(output_count(&generator), 0);
    }

    #[test]
    fn missing_template_creates_no_output() {
        let generator = generator("gen_missing");
        let err = generator
            .generate("Ada", "gone.pdf")
            .expect_err("rejected");
        assert_eq!(err, GenerateError::TemplateNotFound);
        assert_eq!(output_count(&generator), 0);
    }

    #[test]
    fn template_vanishing_after_validation_fails_cleanly() {
        let generator = generator("gen_vanish");
        let request = RenderRequest::validate(
            "Ada",
            "black_template.pdf",
            &generator.settings().template_dir,
        )
        .expect("valid");
        fs::remove_file(request.template_path()).expect("remove");
        let out = generator.settings().output_dir.join("out.pdf");
        assert!(generator.render(&request, &out).is_err());
        assert!(!out.exists());
        assert_eq!(output_count(&generator), 0);
    }

    #[test]
    fn broken_template_reports_generation_failure() {
        let generator = generator("gen_broken");
        fs::write(
            generator.settings().template_dir.join("broken.pdf"),
            b"%PDF-1.4 nope",
        )
        .expect("write");
        let err = generator
            .generate("Ada", "broken.pdf")
            .expect_err("fails");
        assert_eq!(err, GenerateError::GenerationFailed);
        assert_eq!(err.to_string(), "Error generating certificate. Please try again.");
        assert_eq!(output_count(&generator), 0);
    }

    #[test]
    fn malformed_placement_fails_only_its_template() {
        let mut generator = generator("gen_bad_record");
        make_template_pdf(
            &generator.settings().template_dir.join("brown_floral_template.pdf"),
            1,
            612,
            792,
        );
        generator
            .update_placement_json("black_template.pdf", r#"{"font_size": 30}"#)
            .expect("stored unchecked");
        assert!(generator.placement("black_template.pdf").is_err());

        let err = generator
            .generate("Ada", "black_template.pdf")
            .expect_err("bad record");
        assert_eq!(err, GenerateError::GenerationFailed);
        assert_eq!(output_count(&generator), 0);

        let cert = generator
            .generate("Ada", "brown_floral_template.pdf")
            .expect("other template still renders");
        assert!(cert.path.is_file());
    }
}
