use crate::error::{CertError, lopdf_err};
use crate::overlay::Overlay;
use crate::types::Size;
use lopdf::{Dictionary, Document as LoDocument, Object as LoObject, ObjectId as LoObjectId};
use lopdf::{Stream as LoStream, dictionary};
use std::io::Write;
use std::path::{Path, PathBuf};

const OVERLAY_XOBJECT_NAME: &str = "CS_OVL";
const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeSummary {
    pub pages_written: usize,
}

/// A parsed template PDF. Opening checks everything composition relies
/// on, so a `TemplateDocument` always has at least one page.
#[derive(Debug)]
pub struct TemplateDocument {
    document: LoDocument,
    first_page: LoObjectId,
}

impl TemplateDocument {
    pub fn open(path: &Path) -> Result<Self, CertError> {
        if !path.is_file() {
            return Err(CertError::Template(format!(
                "template not found: {}",
                path.display()
            )));
        }
        let document = LoDocument::load(path).map_err(lopdf_err)?;
        if document.is_encrypted() {
            return Err(CertError::Template(format!(
                "template PDF is encrypted: {}",
                path.display()
            )));
        }
        let first_page = document
            .get_pages()
            .values()
            .next()
            .copied()
            .ok_or_else(|| {
                CertError::Template(format!("template has no pages: {}", path.display()))
            })?;
        Ok(Self {
            document,
            first_page,
        })
    }

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Width and height of the first page's MediaBox, inherited through
    /// the page tree when the page itself has none. Letter if absent.
    pub fn first_page_size(&self) -> Size {
        media_box(&self.document, self.first_page)
            .and_then(|[x0, y0, x1, y1]| {
                let width = (x1 - x0).abs();
                let height = (y1 - y0).abs();
                (width > 0.0 && height > 0.0).then(|| Size::new(width, height))
            })
            .unwrap_or_else(Size::letter)
    }

    pub(crate) fn document(&self) -> &LoDocument {
        &self.document
    }

    pub(crate) fn first_page_id(&self) -> LoObjectId {
        self.first_page
    }
}

/// Draws `overlay` on top of the template's first page and writes the whole
/// document to `out`. The output only appears once it is complete; on any
/// error nothing is left at `out`.
pub fn compose_certificate(
    template: TemplateDocument,
    overlay: Overlay,
    out: &Path,
) -> Result<ComposeSummary, CertError> {
    let TemplateDocument {
        document: mut doc,
        first_page,
        ..
    } = template;

    let form_id = import_overlay_form(&mut doc, overlay.into_document())?;

    let mut resources = page_resources(&doc, first_page);
    let mut xobjects = match resources.get(b"XObject") {
        Ok(obj) => resolve_object(&doc, obj).as_dict().cloned().unwrap_or_default(),
        Err(_) => Dictionary::new(),
    };
    xobjects.set(OVERLAY_XOBJECT_NAME, LoObject::Reference(form_id));
    resources.set("XObject", LoObject::Dictionary(xobjects));

    let original = doc.get_page_content(first_page).map_err(lopdf_err)?;
    let mut content = Vec::with_capacity(original.len() + 32);
    content.extend_from_slice(b"q\n");
    content.extend_from_slice(&original);
    content.extend_from_slice(b"\nQ\n");
    content.extend_from_slice(format!("q /{} Do Q\n", OVERLAY_XOBJECT_NAME).as_bytes());
    let mut content_stream = LoStream::new(dictionary! {}, content);
    content_stream.compress().map_err(lopdf_err)?;
    let content_id = doc.add_object(content_stream);

    {
        let page = doc
            .get_object_mut(first_page)
            .and_then(LoObject::as_dict_mut)
            .map_err(lopdf_err)?;
        page.set("Resources", LoObject::Dictionary(resources));
        page.set("Contents", LoObject::Reference(content_id));
    }

    // Only the replaced page-1 content goes away; every other object keeps
    // its id and its bytes.
    doc.prune_objects();
    let pages_written = doc.get_pages().len();

    let dir = match out.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    doc.save_to(tmp.as_file_mut())?;
    tmp.flush()?;
    tmp.persist(out)?;

    Ok(ComposeSummary { pages_written })
}

/// Moves every object of the overlay into `doc` and wraps the overlay
/// page's content as a Form XObject. Returns the form's id.
fn import_overlay_form(
    doc: &mut LoDocument,
    mut overlay: LoDocument,
) -> Result<LoObjectId, CertError> {
    overlay.renumber_objects_with(doc.max_id + 1);
    let overlay_page = overlay
        .get_pages()
        .values()
        .next()
        .copied()
        .ok_or_else(|| CertError::Pdf("overlay has no pages".to_string()))?;
    let page_dict = overlay
        .get_object(overlay_page)
        .and_then(LoObject::as_dict)
        .map_err(lopdf_err)?
        .clone();
    let content = overlay.get_page_content(overlay_page).map_err(lopdf_err)?;
    let bbox = match page_dict.get(b"MediaBox").and_then(LoObject::as_array) {
        Ok(arr) => arr.clone(),
        Err(_) => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    let form_resources = match page_dict.get(b"Resources") {
        Ok(obj) => resolve_object(&overlay, obj).clone(),
        Err(_) => LoObject::Dictionary(Dictionary::new()),
    };

    for object in overlay.objects.values_mut() {
        if let LoObject::Stream(stream) = object {
            stream.compress().map_err(lopdf_err)?;
        }
    }
    if overlay.max_id > doc.max_id {
        doc.max_id = overlay.max_id;
    }
    doc.objects.extend(overlay.objects);

    let mut form = LoStream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "FormType" => 1,
            "BBox" => LoObject::Array(bbox),
            "Resources" => form_resources,
        },
        content,
    );
    form.compress().map_err(lopdf_err)?;
    Ok(doc.add_object(form))
}

/// The page's effective resource dictionary, copied out so it can be set
/// directly on the page.
pub(crate) fn page_resources(doc: &LoDocument, page_id: LoObjectId) -> Dictionary {
    inherited_attribute(doc, page_id, b"Resources")
        .and_then(|obj| resolve_object(doc, obj).as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

fn inherited_attribute<'a>(
    doc: &'a LoDocument,
    page_id: LoObjectId,
    key: &[u8],
) -> Option<&'a LoObject> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent = node.get(b"Parent").and_then(LoObject::as_reference).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

pub(crate) fn resolve_object<'a>(doc: &'a LoDocument, obj: &'a LoObject) -> &'a LoObject {
    let mut current = obj;
    for _ in 0..MAX_TREE_DEPTH {
        match current {
            LoObject::Reference(id) => match doc.get_object(*id) {
                Ok(next) => current = next,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

pub(crate) fn obj_to_f32(obj: &LoObject) -> Option<f32> {
    match obj {
        LoObject::Integer(v) => Some(*v as f32),
        LoObject::Real(v) => Some(*v),
        _ => None,
    }
}

/// `[llx, lly, urx, ury]` of the page's MediaBox, inherited if needed.
pub(crate) fn media_box(doc: &LoDocument, page_id: LoObjectId) -> Option<[f32; 4]> {
    let arr = inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|obj| resolve_object(doc, obj).as_array().ok())?;
    if arr.len() != 4 {
        return None;
    }
    let mut values = [0.0f32; 4];
    for (slot, obj) in values.iter_mut().zip(arr) {
        *slot = obj_to_f32(resolve_object(doc, obj))?;
    }
    Some(values)
}
