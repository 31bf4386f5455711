use crate::error::{CertError, lopdf_err};
use lopdf::Document as LoDocument;
use std::path::{Path, PathBuf};

pub const TEMPLATE_EXTENSION: &str = ".pdf";
const PREVIEW_EXTENSION: &str = ".png";

/// One selectable template found in the template directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    /// File name, e.g. `black_template.pdf`. Doubles as the config key.
    pub id: String,
    pub display_name: String,
    pub pdf_path: PathBuf,
    /// Set only when the preview image is already on disk.
    pub preview_path: Option<PathBuf>,
}

impl TemplateEntry {
    pub fn page_count(&self) -> Result<usize, CertError> {
        template_page_count(&self.pdf_path)
    }
}

/// Every `*.pdf` in `template_dir`, sorted by id.
pub fn list_templates(
    template_dir: &Path,
    preview_dir: &Path,
) -> Result<Vec<TemplateEntry>, CertError> {
    let mut ids: Vec<String> = Vec::new();
    for entry in std::fs::read_dir(template_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if name.ends_with(TEMPLATE_EXTENSION) {
            ids.push(name);
        }
    }
    ids.sort();

    Ok(ids
        .into_iter()
        .map(|id| {
            let preview = preview_dir.join(preview_file_name(&id));
            TemplateEntry {
                display_name: display_name(&id),
                pdf_path: template_dir.join(&id),
                preview_path: preview.is_file().then_some(preview),
                id,
            }
        })
        .collect())
}

/// `black_template.pdf` -> `black_template.png`.
pub fn preview_file_name(template_id: &str) -> String {
    let stem = template_id
        .strip_suffix(TEMPLATE_EXTENSION)
        .unwrap_or(template_id);
    format!("{stem}{PREVIEW_EXTENSION}")
}

/// `brown_floral_template.pdf` -> `Brown Floral Template`.
pub fn display_name(template_id: &str) -> String {
    let stem = template_id
        .strip_suffix(TEMPLATE_EXTENSION)
        .unwrap_or(template_id);
    title_case(&stem.replace('_', " "))
}

// Uppercase after any non-letter, lowercase otherwise.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

pub fn template_page_count(path: &Path) -> Result<usize, CertError> {
    let doc = LoDocument::load(path).map_err(lopdf_err)?;
    Ok(doc.get_pages().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::tests::{make_template_pdf, temp_dir};
    use std::fs;

    #[test]
    fn display_names_follow_file_names() {
        assert_eq!(display_name("black_template.pdf"), "Black Template");
        assert_eq!(
            display_name("brown_floral_template.pdf"),
            "Brown Floral Template"
        );
        assert_eq!(display_name("GOLD_award2x.pdf"), "Gold Award2X");
    }

    #[test]
    fn preview_name_swaps_extension() {
        assert_eq!(preview_file_name("black_template.pdf"), "black_template.png");
    }

    #[test]
    fn listing_is_sorted_and_filters_non_pdfs() {
        let root = temp_dir("catalog_list");
        let templates = root.join("templates");
        let previews = root.join("previews");
        fs::create_dir_all(&templates).expect("mkdir");
        fs::create_dir_all(&previews).expect("mkdir");
        make_template_pdf(&templates.join("zeta_award.pdf"), 1, 612, 792);
        make_template_pdf(&templates.join("alpha_award.pdf"), 2, 612, 792);
        fs::write(templates.join("notes.txt"), b"ignore me").expect("write");
        fs::create_dir_all(templates.join("nested.pdf")).expect("mkdir");
        fs::write(previews.join("zeta_award.png"), b"png").expect("write");

        let entries = list_templates(&templates, &previews).expect("list");
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha_award.pdf", "zeta_award.pdf"]);
        assert_eq!(entries[0].preview_path, None);
        assert_eq!(
            entries[1].preview_path.as_deref(),
            Some(previews.join("zeta_award.png").as_path())
        );
        assert_eq!(entries[0].page_count().expect("pages"), 2);
        assert_eq!(entries[1].display_name, "Zeta Award");
    }

    #[test]
    fn missing_template_dir_is_an_error() {
        let root = temp_dir("catalog_missing");
        assert!(list_templates(&root.join("nope"), &root).is_err());
    }
}
