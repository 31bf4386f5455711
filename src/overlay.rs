use crate::error::{CertError, lopdf_err};
use crate::font::{FontHandle, FontProgramKind, FontRegistry, RegisteredFont};
use crate::layout::ResolvedLayout;
use crate::types::Size;
use crate::winansi;
use lopdf::content::{Content, Operation};
use lopdf::{
    Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream,
    StringFormat, dictionary,
};

pub(crate) const OVERLAY_FONT_RESOURCE: &str = "FName";

/// A standalone one-page PDF holding nothing but the name text.
#[derive(Debug, Clone)]
pub struct Overlay {
    document: LoDocument,
}

impl Overlay {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CertError> {
        let mut document = self.document.clone();
        let mut out = Vec::new();
        document.save_to(&mut out)?;
        Ok(out)
    }

    pub(crate) fn into_document(self) -> LoDocument {
        self.document
    }
}

/// Draws `text` at the resolved baseline on a blank page of `page_size`.
/// The content stream has exactly one text-showing operator and no
/// background.
pub fn render_overlay(
    fonts: &FontRegistry,
    text: &str,
    layout: &ResolvedLayout,
    page_size: Size,
) -> Result<Overlay, CertError> {
    let mut doc = LoDocument::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = match fonts.registered(layout.font) {
        Some(font) => embed_registered_font(&mut doc, font),
        None => {
            let base = match layout.font {
                FontHandle::Builtin(builtin) => builtin.base_font(),
                FontHandle::Registered(_) => "Helvetica",
            };
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => base,
                "Encoding" => "WinAnsiEncoding",
            })
        }
    };

    let color = layout.color;
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    LoObject::Name(OVERLAY_FONT_RESOURCE.as_bytes().to_vec()),
                    layout.font_size.to_f32().into(),
                ],
            ),
            Operation::new("rg", vec![color.r.into(), color.g.into(), color.b.into()]),
            Operation::new("Td", vec![layout.x.to_f32().into(), layout.y.to_f32().into()]),
            Operation::new(
                "Tj",
                vec![LoObject::String(
                    winansi::encode_text(text),
                    StringFormat::Literal,
                )],
            ),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(LoStream::new(
        dictionary! {},
        content.encode().map_err(lopdf_err)?,
    ));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { OVERLAY_FONT_RESOURCE => font_id },
        },
        "MediaBox" => vec![
            0.into(),
            0.into(),
            page_size.width.to_f32().into(),
            page_size.height.to_f32().into(),
        ],
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

    Ok(Overlay { document: doc })
}

fn embed_registered_font(doc: &mut LoDocument, font: &RegisteredFont) -> LoObjectId {
    let base = sanitize_font_name(&font.postscript_name);
    let metrics = &font.metrics;

    let (file_key, file_stream) = match font.program_kind {
        FontProgramKind::TrueType => (
            "FontFile2",
            LoStream::new(
                dictionary! { "Length1" => font.data.len() as i64 },
                font.data.clone(),
            ),
        ),
        FontProgramKind::OpenTypeCff => (
            "FontFile3",
            LoStream::new(dictionary! { "Subtype" => "OpenType" }, font.data.clone()),
        ),
    };
    let file_id = doc.add_object(file_stream);

    let mut flags: i64 = 32;
    if metrics.is_fixed_pitch {
        flags |= 1;
    }
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => base.as_str(),
        "Flags" => flags,
        "FontBBox" => vec![
            metrics.bbox.0.into(),
            metrics.bbox.1.into(),
            metrics.bbox.2.into(),
            metrics.bbox.3.into(),
        ],
        "ItalicAngle" => metrics.italic_angle,
        "Ascent" => metrics.ascent,
        "Descent" => metrics.descent,
        "CapHeight" => metrics.cap_height,
        "StemV" => metrics.stem_v,
        "MissingWidth" => metrics.missing_width,
        file_key => file_id,
    });

    let subtype = match font.program_kind {
        FontProgramKind::TrueType => "TrueType",
        FontProgramKind::OpenTypeCff => "Type1",
    };
    let widths: Vec<LoObject> = metrics.widths.iter().map(|w| (*w).into()).collect();
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => subtype,
        "BaseFont" => base.as_str(),
        "FirstChar" => metrics.first_char,
        "LastChar" => metrics.last_char,
        "Widths" => widths,
        "FontDescriptor" => descriptor_id,
        "Encoding" => "WinAnsiEncoding",
    })
}

fn sanitize_font_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .collect();
    if cleaned.is_empty() {
        "CertstampFont".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::obj_to_f32;
    use crate::font::BuiltinFont;
    use crate::types::{Color, Pt};

    fn layout(font: FontHandle) -> ResolvedLayout {
        ResolvedLayout {
            x: Pt::from_f32(303.7),
            y: Pt::from_f32(270.0),
            font,
            font_size: Pt::from_f32(45.0),
            color: Color::rgb(1.0, 0.84, 0.0),
        }
    }

    fn single_page_operations(overlay: &Overlay) -> Vec<Operation> {
        let doc = overlay.clone().into_document();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let page_id = *pages.values().next().expect("page");
        let content = doc.get_page_content(page_id).expect("content");
        Content::decode(&content).expect("decode").operations
    }

    #[test]
    fn overlay_contains_exactly_one_text_show() {
        let fonts = FontRegistry::new();
        let overlay = render_overlay(
            &fonts,
            "Jane Doe",
            &layout(FontHandle::default()),
            Size::new(800.0, 600.0),
        )
        .expect("render");
        let ops = single_page_operations(&overlay);
        let operators: Vec<&str> = ops.iter().map(|op| op.operator.as_str()).collect();
        assert_eq!(operators, vec!["BT", "Tf", "rg", "Td", "Tj", "ET"]);
        let shown = ops[4].operands[0].as_str().expect("string");
        assert_eq!(shown, b"Jane Doe");
    }

    #[test]
    fn overlay_page_matches_requested_size() {
        let fonts = FontRegistry::new();
        let overlay = render_overlay(
            &fonts,
            "A",
            &layout(FontHandle::Builtin(BuiltinFont::TimesRoman)),
            Size::new(842.0, 595.0),
        )
        .expect("render");
        let doc = overlay.into_document();
        let page_id = *doc.get_pages().values().next().expect("page");
        let page = doc.get_dictionary(page_id).expect("page dict");
        let media_box = page.get(b"MediaBox").and_then(LoObject::as_array).expect("box");
        let dims: Vec<f32> = media_box
            .iter()
            .map(|v| obj_to_f32(v).expect("number"))
            .collect();
        assert_eq!(dims, vec![0.0, 0.0, 842.0, 595.0]);
    }

    #[test]
    fn builtin_font_is_referenced_not_embedded() {
        let fonts = FontRegistry::new();
        let overlay = render_overlay(
            &fonts,
            "A",
            &layout(FontHandle::Builtin(BuiltinFont::TimesRoman)),
            Size::letter(),
        )
        .expect("render");
        let doc = overlay.into_document();
        let base_fonts: Vec<Vec<u8>> = doc
            .objects
            .values()
            .filter_map(|obj| obj.as_dict().ok())
            .filter_map(|dict| dict.get(b"BaseFont").ok())
            .filter_map(|name| name.as_name().ok().map(|n| n.to_vec()))
            .collect();
        assert_eq!(base_fonts, vec![b"Times-Roman".to_vec()]);
    }

    #[test]
    fn overlay_serializes_to_loadable_pdf() {
        let fonts = FontRegistry::new();
        let overlay = render_overlay(
            &fonts,
            "Zoë (QA)",
            &layout(FontHandle::default()),
            Size::letter(),
        )
        .expect("render");
        let bytes = overlay.to_bytes().expect("bytes");
        let reloaded = LoDocument::load_mem(&bytes).expect("reload");
        assert_eq!(reloaded.get_pages().len(), 1);
    }

    #[test]
    fn renders_are_independent() {
        let fonts = FontRegistry::new();
        let first = render_overlay(&fonts, "One", &layout(FontHandle::default()), Size::letter())
            .expect("first");
        let second = render_overlay(&fonts, "Two", &layout(FontHandle::default()), Size::letter())
            .expect("second");
        let a = single_page_operations(&first);
        let b = single_page_operations(&second);
        assert_eq!(a[4].operands[0].as_str().expect("a"), b"One");
        assert_eq!(b[4].operands[0].as_str().expect("b"), b"Two");
    }
}
