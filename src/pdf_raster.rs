use crate::compose::{TemplateDocument, media_box, obj_to_f32, page_resources, resolve_object};
use crate::error::{CertError, lopdf_err};
use crate::font::BuiltinFont;
use crate::types::{Color, Pt};
use crate::winansi;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary as LoDictionary, Document as LoDocument, Object as LoObject, ObjectId};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tiny_skia::{
    FillRule, LineCap, LineJoin, Paint, Path as SkPath, PathBuilder, Pixmap, Stroke, StrokeDash,
    Transform,
};
use ttf_parser::{Face, GlyphId, OutlineBuilder};

const MAX_FORM_DEPTH: usize = 16;

/// Renders page one of the PDF at `path` to PNG bytes.
///
/// Covers what certificate templates are made of: filled and stroked
/// paths, device colors, constant alpha, nested forms and text set in
/// embedded TrueType/OpenType programs. Images, shadings and clipping are
/// skipped, as is text in fonts without an embedded program.
pub fn rasterize_first_page(path: &Path, dpi: u32) -> Result<Vec<u8>, CertError> {
    let template = TemplateDocument::open(path)?;
    rasterize_page(template.document(), template.first_page_id(), dpi)
}

pub(crate) fn rasterize_page(
    doc: &LoDocument,
    page_id: ObjectId,
    dpi: u32,
) -> Result<Vec<u8>, CertError> {
    let [x0, y0, x1, y1] = media_box(doc, page_id).unwrap_or([0.0, 0.0, 612.0, 792.0]);
    let (left, right) = (x0.min(x1), x0.max(x1));
    let (bottom, top) = (y0.min(y1), y0.max(y1));
    let width_px = pt_to_px(Pt::from_f32(right - left), dpi)?;
    let height_px = pt_to_px(Pt::from_f32(top - bottom), dpi)?;
    let scale = dpi as f32 / 72.0;
    let base = Transform::from_row(scale, 0.0, 0.0, -scale, -left * scale, top * scale);

    let mut pixmap = Pixmap::new(width_px, height_px).ok_or_else(|| {
        CertError::Raster(format!(
            "invalid raster size {}x{} at {} DPI",
            width_px, height_px, dpi
        ))
    })?;
    pixmap.fill(tiny_skia::Color::from_rgba8(255, 255, 255, 255));

    let bytes = doc.get_page_content(page_id).map_err(lopdf_err)?;
    let content = Content::decode(&bytes).map_err(lopdf_err)?;
    let resources = page_resources(doc, page_id);

    let mut painter = Painter {
        doc,
        pixmap,
        base,
        fonts: HashMap::new(),
        active_forms: HashSet::new(),
    };
    painter.run(&content.operations, &resources, GraphicsState::default(), 0)?;

    painter
        .pixmap
        .encode_png()
        .map_err(|e| CertError::Raster(format!("png encode failed: {e}")))
}

#[derive(Clone)]
struct GraphicsState {
    ctm: Transform,
    fill: Color,
    stroke: Color,
    fill_alpha: f32,
    stroke_alpha: f32,
    line_width: f32,
    line_cap: LineCap,
    line_join: LineJoin,
    miter_limit: f32,
    dash: Option<(Vec<f32>, f32)>,
    text: TextState,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Transform::identity(),
            fill: Color::BLACK,
            stroke: Color::BLACK,
            fill_alpha: 1.0,
            stroke_alpha: 1.0,
            line_width: 1.0,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            miter_limit: 10.0,
            dash: None,
            text: TextState::default(),
        }
    }
}

#[derive(Clone)]
struct TextState {
    font: Option<Arc<SimpleFont>>,
    size: f32,
    char_spacing: f32,
    word_spacing: f32,
    h_scale: f32,
    leading: f32,
    rise: f32,
    render_mode: i64,
    matrix: Transform,
    line_matrix: Transform,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font: None,
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            render_mode: 0,
            matrix: Transform::identity(),
            line_matrix: Transform::identity(),
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = self.line_matrix.pre_concat(Transform::from_translate(tx, ty));
        self.matrix = self.line_matrix;
    }
}

/// A single-byte font as far as drawing needs it.
struct SimpleFont {
    program: Option<Vec<u8>>,
    first_char: usize,
    widths: Vec<f32>,
    missing_width: f32,
    builtin: Option<BuiltinFont>,
}

impl SimpleFont {
    fn load(doc: &LoDocument, dict: &LoDictionary) -> Self {
        let number = |key: &[u8]| {
            dict.get(key)
                .ok()
                .and_then(|obj| obj_to_f32(resolve_object(doc, obj)))
        };
        let first_char = number(b"FirstChar").unwrap_or(0.0).max(0.0) as usize;
        let widths = dict
            .get(b"Widths")
            .ok()
            .and_then(|obj| resolve_object(doc, obj).as_array().ok())
            .map(|arr| {
                arr.iter()
                    .map(|w| obj_to_f32(resolve_object(doc, w)).unwrap_or(0.0))
                    .collect()
            })
            .unwrap_or_default();
        let descriptor = dict
            .get(b"FontDescriptor")
            .ok()
            .and_then(|obj| resolve_object(doc, obj).as_dict().ok());
        let missing_width = descriptor
            .and_then(|d| d.get(b"MissingWidth").ok())
            .and_then(|obj| obj_to_f32(resolve_object(doc, obj)))
            .unwrap_or(0.0);
        let program = descriptor.and_then(|d| embedded_program(doc, d));
        let builtin = dict
            .get(b"BaseFont")
            .and_then(LoObject::as_name)
            .ok()
            .map(|name| String::from_utf8_lossy(name).to_string())
            .and_then(|name| {
                let base = name.split_once('+').map(|(_, rest)| rest).unwrap_or(name.as_str());
                BuiltinFont::from_name(base)
            });

        Self {
            program,
            first_char,
            widths,
            missing_width,
            builtin,
        }
    }

    fn glyph(&self, face: &Face<'_>, code: u8) -> Option<GlyphId> {
        winansi::decode_byte(code)
            .and_then(|ch| face.glyph_index(ch))
            .or_else(|| char::from_u32(0xF000 + code as u32).and_then(|ch| face.glyph_index(ch)))
            .filter(|gid| gid.0 != 0)
    }

    /// Advance in 1/1000 em.
    fn width(&self, code: u8, face: Option<&Face<'_>>) -> f32 {
        let index = (code as usize).checked_sub(self.first_char);
        if let Some(width) = index.and_then(|i| self.widths.get(i)) {
            return *width;
        }
        if let Some(builtin) = self.builtin {
            return builtin.advance(code) as f32;
        }
        if let Some(face) = face {
            let advance = self
                .glyph(face, code)
                .and_then(|gid| face.glyph_hor_advance(gid));
            if let Some(advance) = advance {
                return advance as f32 * 1000.0 / face.units_per_em().max(1) as f32;
            }
        }
        self.missing_width
    }
}

fn embedded_program(doc: &LoDocument, descriptor: &LoDictionary) -> Option<Vec<u8>> {
    for key in [b"FontFile2".as_slice(), b"FontFile3".as_slice()] {
        let Ok(obj) = descriptor.get(key) else {
            continue;
        };
        if let Ok(stream) = resolve_object(doc, obj).as_stream() {
            return stream.get_plain_content().ok();
        }
    }
    None
}

struct PathState {
    builder: PathBuilder,
    has_segments: bool,
    current: (f32, f32),
    start: (f32, f32),
}

impl PathState {
    fn new() -> Self {
        Self {
            builder: PathBuilder::new(),
            has_segments: false,
            current: (0.0, 0.0),
            start: (0.0, 0.0),
        }
    }

    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(x, y);
        self.current = (x, y);
        self.start = (x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(x, y);
        self.current = (x, y);
        self.has_segments = true;
    }

    fn cubic_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
        self.current = (x, y);
        self.has_segments = true;
    }

    fn close(&mut self) {
        self.builder.close();
        self.current = self.start;
    }

    fn take(&mut self) -> Option<SkPath> {
        let builder = std::mem::replace(&mut self.builder, PathBuilder::new());
        let had_segments = std::mem::replace(&mut self.has_segments, false);
        if !had_segments {
            return None;
        }
        builder.finish()
    }
}

struct Painter<'a> {
    doc: &'a LoDocument,
    pixmap: Pixmap,
    base: Transform,
    fonts: HashMap<ObjectId, Option<Arc<SimpleFont>>>,
    active_forms: HashSet<ObjectId>,
}

impl<'a> Painter<'a> {
    fn run(
        &mut self,
        operations: &[Operation],
        resources: &LoDictionary,
        mut state: GraphicsState,
        depth: usize,
    ) -> Result<(), CertError> {
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut path = PathState::new();

        for op in operations {
            match op.operator.as_str() {
                "q" => stack.push(state.clone()),
                "Q" => {
                    if let Some(prev) = stack.pop() {
                        state = prev;
                    }
                }
                "cm" => {
                    if let Some([a, b, c, d, e, f]) = op_f32_6(op) {
                        state.ctm = state.ctm.pre_concat(Transform::from_row(a, b, c, d, e, f));
                    }
                }
                "w" => {
                    if let Some(width) = op_f32(op, 0) {
                        state.line_width = width.max(0.0);
                    }
                }
                "J" => {
                    state.line_cap = match op_f32(op, 0).map(|v| v as i64) {
                        Some(1) => LineCap::Round,
                        Some(2) => LineCap::Square,
                        _ => LineCap::Butt,
                    };
                }
                "j" => {
                    state.line_join = match op_f32(op, 0).map(|v| v as i64) {
                        Some(1) => LineJoin::Round,
                        Some(2) => LineJoin::Bevel,
                        _ => LineJoin::Miter,
                    };
                }
                "M" => {
                    if let Some(limit) = op_f32(op, 0) {
                        state.miter_limit = limit.max(1.0);
                    }
                }
                "d" => {
                    let pattern: Vec<f32> = op
                        .operands
                        .first()
                        .and_then(|o| o.as_array().ok())
                        .map(|arr| arr.iter().filter_map(obj_to_f32).map(f32::abs).collect())
                        .unwrap_or_default();
                    let phase = op_f32(op, 1).unwrap_or(0.0);
                    state.dash = (!pattern.is_empty()).then_some((pattern, phase));
                }
                "gs" => {
                    if let Some(name) = op_name(op, 0) {
                        self.apply_ext_gstate(resources, name, &mut state);
                    }
                }
                "rg" => {
                    if let Some([r, g, b]) = op_f32_3(op) {
                        state.fill = Color::rgb(r, g, b);
                    }
                }
                "RG" => {
                    if let Some([r, g, b]) = op_f32_3(op) {
                        state.stroke = Color::rgb(r, g, b);
                    }
                }
                "g" => {
                    if let Some(gray) = op_f32(op, 0) {
                        state.fill = Color::rgb(gray, gray, gray);
                    }
                }
                "G" => {
                    if let Some(gray) = op_f32(op, 0) {
                        state.stroke = Color::rgb(gray, gray, gray);
                    }
                }
                "k" => {
                    if let Some([c, m, y, k]) = op_f32_4(op) {
                        state.fill = cmyk_to_rgb(c, m, y, k);
                    }
                }
                "K" => {
                    if let Some([c, m, y, k]) = op_f32_4(op) {
                        state.stroke = cmyk_to_rgb(c, m, y, k);
                    }
                }
                "cs" => state.fill = Color::BLACK,
                "CS" => state.stroke = Color::BLACK,
                "sc" | "scn" => {
                    if let Some(color) = color_from_components(op) {
                        state.fill = color;
                    }
                }
                "SC" | "SCN" => {
                    if let Some(color) = color_from_components(op) {
                        state.stroke = color;
                    }
                }
                "m" => {
                    if let Some([x, y]) = op_f32_2(op) {
                        path.move_to(x, y);
                    }
                }
                "l" => {
                    if let Some([x, y]) = op_f32_2(op) {
                        path.line_to(x, y);
                    }
                }
                "c" => {
                    if let Some([x1, y1, x2, y2, x, y]) = op_f32_6(op) {
                        path.cubic_to(x1, y1, x2, y2, x, y);
                    }
                }
                "v" => {
                    if let Some([x2, y2, x, y]) = op_f32_4(op) {
                        let (x1, y1) = path.current;
                        path.cubic_to(x1, y1, x2, y2, x, y);
                    }
                }
                "y" => {
                    if let Some([x1, y1, x, y]) = op_f32_4(op) {
                        path.cubic_to(x1, y1, x, y, x, y);
                    }
                }
                "re" => {
                    if let Some([x, y, w, h]) = op_f32_4(op) {
                        path.move_to(x, y);
                        path.line_to(x + w, y);
                        path.line_to(x + w, y + h);
                        path.line_to(x, y + h);
                        path.close();
                    }
                }
                "h" => path.close(),
                "f" | "F" => self.paint(&mut path, &state, Some(FillRule::Winding), false),
                "f*" => self.paint(&mut path, &state, Some(FillRule::EvenOdd), false),
                "S" => self.paint(&mut path, &state, None, true),
                "s" => {
                    path.close();
                    self.paint(&mut path, &state, None, true);
                }
                "B" => self.paint(&mut path, &state, Some(FillRule::Winding), true),
                "B*" => self.paint(&mut path, &state, Some(FillRule::EvenOdd), true),
                "b" => {
                    path.close();
                    self.paint(&mut path, &state, Some(FillRule::Winding), true);
                }
                "b*" => {
                    path.close();
                    self.paint(&mut path, &state, Some(FillRule::EvenOdd), true);
                }
                "n" => {
                    path.take();
                }
                "BT" => {
                    state.text.matrix = Transform::identity();
                    state.text.line_matrix = Transform::identity();
                }
                "Tf" => {
                    if let Some(name) = op_name(op, 0) {
                        state.text.font = self.font(resources, name);
                    }
                    state.text.size = op_f32(op, 1).unwrap_or(0.0);
                }
                "Tc" => state.text.char_spacing = op_f32(op, 0).unwrap_or(0.0),
                "Tw" => state.text.word_spacing = op_f32(op, 0).unwrap_or(0.0),
                "Tz" => state.text.h_scale = op_f32(op, 0).unwrap_or(100.0) / 100.0,
                "TL" => state.text.leading = op_f32(op, 0).unwrap_or(0.0),
                "Ts" => state.text.rise = op_f32(op, 0).unwrap_or(0.0),
                "Tr" => state.text.render_mode = op_f32(op, 0).map(|v| v as i64).unwrap_or(0),
                "Td" => {
                    if let Some([tx, ty]) = op_f32_2(op) {
                        state.text.move_line(tx, ty);
                    }
                }
                "TD" => {
                    if let Some([tx, ty]) = op_f32_2(op) {
                        state.text.leading = -ty;
                        state.text.move_line(tx, ty);
                    }
                }
                "Tm" => {
                    if let Some([a, b, c, d, e, f]) = op_f32_6(op) {
                        state.text.matrix = Transform::from_row(a, b, c, d, e, f);
                        state.text.line_matrix = state.text.matrix;
                    }
                }
                "T*" => {
                    let leading = state.text.leading;
                    state.text.move_line(0.0, -leading);
                }
                "Tj" => {
                    if let Some(bytes) = op.operands.first().and_then(|o| o.as_str().ok()) {
                        self.show_text(&mut state, bytes);
                    }
                }
                "'" => {
                    let leading = state.text.leading;
                    state.text.move_line(0.0, -leading);
                    if let Some(bytes) = op.operands.first().and_then(|o| o.as_str().ok()) {
                        self.show_text(&mut state, bytes);
                    }
                }
                "\"" => {
                    state.text.word_spacing = op_f32(op, 0).unwrap_or(state.text.word_spacing);
                    state.text.char_spacing = op_f32(op, 1).unwrap_or(state.text.char_spacing);
                    let leading = state.text.leading;
                    state.text.move_line(0.0, -leading);
                    if let Some(bytes) = op.operands.get(2).and_then(|o| o.as_str().ok()) {
                        self.show_text(&mut state, bytes);
                    }
                }
                "TJ" => {
                    let Some(items) = op.operands.first().and_then(|o| o.as_array().ok()) else {
                        continue;
                    };
                    for item in items {
                        if let Ok(bytes) = item.as_str() {
                            self.show_text(&mut state, bytes);
                        } else if let Some(adjust) = obj_to_f32(item) {
                            let text = &mut state.text;
                            let tx = -(adjust / 1000.0) * text.size * text.h_scale;
                            text.matrix = text.matrix.pre_concat(Transform::from_translate(tx, 0.0));
                        }
                    }
                }
                "Do" => {
                    if let Some(name) = op_name(op, 0) {
                        self.paint_xobject(resources, name, &state, depth)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn paint(
        &mut self,
        path: &mut PathState,
        state: &GraphicsState,
        fill: Option<FillRule>,
        stroke: bool,
    ) {
        let Some(sk_path) = path.take() else {
            return;
        };
        let transform = self.base.pre_concat(state.ctm);
        if let Some(rule) = fill {
            let paint = solid_paint(state.fill, state.fill_alpha);
            self.pixmap.fill_path(&sk_path, &paint, rule, transform, None);
        }
        if stroke {
            let paint = solid_paint(state.stroke, state.stroke_alpha);
            self.pixmap
                .stroke_path(&sk_path, &paint, &build_stroke(state), transform, None);
        }
    }

    fn show_text(&mut self, state: &mut GraphicsState, bytes: &[u8]) {
        let ctm = state.ctm;
        let paint = solid_paint(state.fill, state.fill_alpha);
        let text = &mut state.text;
        let Some(font) = text.font.clone() else {
            return;
        };
        let face = font
            .program
            .as_deref()
            .and_then(|data| Face::parse(data, 0).ok());
        let visible = !matches!(text.render_mode, 3 | 7) && text.size != 0.0;
        let units = face
            .as_ref()
            .map(|f| f.units_per_em().max(1) as f32)
            .unwrap_or(1000.0);

        for &code in bytes {
            if let (true, Some(face)) = (visible, face.as_ref()) {
                if let Some(gid) = font.glyph(face, code) {
                    let glyph_space = Transform::from_row(
                        text.size * text.h_scale,
                        0.0,
                        0.0,
                        text.size,
                        0.0,
                        text.rise,
                    );
                    let transform = self
                        .base
                        .pre_concat(ctm)
                        .pre_concat(text.matrix)
                        .pre_concat(glyph_space);
                    let mut builder = GlyphPathBuilder::new(1.0 / units);
                    if face.outline_glyph(gid, &mut builder).is_some() {
                        if let Some(glyph_path) = builder.finish() {
                            self.pixmap.fill_path(
                                &glyph_path,
                                &paint,
                                FillRule::Winding,
                                transform,
                                None,
                            );
                        }
                    }
                }
            }

            let mut tx = font.width(code, face.as_ref()) / 1000.0 * text.size + text.char_spacing;
            if code == b' ' {
                tx += text.word_spacing;
            }
            tx *= text.h_scale;
            text.matrix = text.matrix.pre_concat(Transform::from_translate(tx, 0.0));
        }
    }

    fn font(&mut self, resources: &LoDictionary, name: &[u8]) -> Option<Arc<SimpleFont>> {
        let doc = self.doc;
        let fonts = resources
            .get(b"Font")
            .ok()
            .and_then(|obj| resolve_object(doc, obj).as_dict().ok())?;
        let entry = fonts.get(name).ok()?;
        let id = entry.as_reference().ok();
        if let Some(cached) = id.and_then(|id| self.fonts.get(&id)) {
            return cached.clone();
        }
        let loaded = resolve_object(doc, entry)
            .as_dict()
            .ok()
            .map(|dict| Arc::new(SimpleFont::load(doc, dict)));
        if let Some(id) = id {
            self.fonts.insert(id, loaded.clone());
        }
        loaded
    }

    fn apply_ext_gstate(&self, resources: &LoDictionary, name: &[u8], state: &mut GraphicsState) {
        let doc = self.doc;
        let Some(gstate) = resources
            .get(b"ExtGState")
            .ok()
            .and_then(|obj| resolve_object(doc, obj).as_dict().ok())
            .and_then(|dict| dict.get(name).ok())
            .and_then(|obj| resolve_object(doc, obj).as_dict().ok())
        else {
            return;
        };
        let number = |key: &[u8]| gstate.get(key).ok().and_then(obj_to_f32);
        if let Some(alpha) = number(b"ca") {
            state.fill_alpha = alpha;
        }
        if let Some(alpha) = number(b"CA") {
            state.stroke_alpha = alpha;
        }
        if let Some(width) = number(b"LW") {
            state.line_width = width.max(0.0);
        }
    }

    fn paint_xobject(
        &mut self,
        resources: &LoDictionary,
        name: &[u8],
        state: &GraphicsState,
        depth: usize,
    ) -> Result<(), CertError> {
        let doc = self.doc;
        let Some(xobjects) = resources
            .get(b"XObject")
            .ok()
            .and_then(|obj| resolve_object(doc, obj).as_dict().ok())
        else {
            return Ok(());
        };
        let Ok(&LoObject::Reference(id)) = xobjects.get(name) else {
            return Ok(());
        };
        let Ok(stream) = doc.get_object(id).and_then(LoObject::as_stream) else {
            return Ok(());
        };
        let subtype = stream.dict.get(b"Subtype").and_then(LoObject::as_name).ok();
        if subtype != Some(b"Form".as_slice()) {
            tracing::debug!(object = ?id, "skipping non-form xobject in preview");
            return Ok(());
        }
        if depth >= MAX_FORM_DEPTH || !self.active_forms.insert(id) {
            return Ok(());
        }

        let bytes = stream.get_plain_content().map_err(lopdf_err)?;
        let content = Content::decode(&bytes).map_err(lopdf_err)?;
        let form_resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|obj| resolve_object(doc, obj).as_dict().ok())
            .cloned()
            .unwrap_or_else(|| resources.clone());
        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|obj| matrix_from_object(doc, obj))
            .unwrap_or_else(Transform::identity);

        let mut nested = state.clone();
        nested.ctm = nested.ctm.pre_concat(matrix);
        let result = self.run(&content.operations, &form_resources, nested, depth + 1);
        self.active_forms.remove(&id);
        result
    }
}

struct GlyphPathBuilder {
    builder: PathBuilder,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            scale,
        }
    }

    fn finish(self) -> Option<SkPath> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(x * self.scale, y * self.scale);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(x * self.scale, y * self.scale);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let s = self.scale;
        self.builder.quad_to(x1 * s, y1 * s, x * s, y * s);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let s = self.scale;
        self.builder
            .cubic_to(x1 * s, y1 * s, x2 * s, y2 * s, x * s, y * s);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn build_stroke(state: &GraphicsState) -> Stroke {
    let mut stroke = Stroke {
        width: state.line_width,
        miter_limit: state.miter_limit,
        line_cap: state.line_cap,
        line_join: state.line_join,
        ..Stroke::default()
    };
    if let Some((pattern, phase)) = &state.dash {
        let mut pattern = pattern.clone();
        if pattern.len() % 2 == 1 {
            pattern.extend_from_within(..);
        }
        stroke.dash = StrokeDash::new(pattern, *phase);
    }
    stroke
}

fn solid_paint(color: Color, alpha: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    let sk_color = tiny_skia::Color::from_rgba(
        color.r.clamp(0.0, 1.0),
        color.g.clamp(0.0, 1.0),
        color.b.clamp(0.0, 1.0),
        alpha.clamp(0.0, 1.0),
    )
    .unwrap_or(tiny_skia::Color::BLACK);
    paint.set_color(sk_color);
    paint.anti_alias = true;
    paint
}

fn color_from_components(op: &Operation) -> Option<Color> {
    let values: Vec<f32> = op.operands.iter().filter_map(obj_to_f32).collect();
    match values.as_slice() {
        [gray] => Some(Color::rgb(*gray, *gray, *gray)),
        [r, g, b] => Some(Color::rgb(*r, *g, *b)),
        [c, m, y, k] => Some(cmyk_to_rgb(*c, *m, *y, *k)),
        _ => None,
    }
}

fn cmyk_to_rgb(c: f32, m: f32, y: f32, k: f32) -> Color {
    let k = k.clamp(0.0, 1.0);
    Color::rgb(
        (1.0 - c.clamp(0.0, 1.0)) * (1.0 - k),
        (1.0 - m.clamp(0.0, 1.0)) * (1.0 - k),
        (1.0 - y.clamp(0.0, 1.0)) * (1.0 - k),
    )
}

fn matrix_from_object(doc: &LoDocument, obj: &LoObject) -> Option<Transform> {
    let arr = resolve_object(doc, obj).as_array().ok()?;
    let values: Vec<f32> = arr
        .iter()
        .map(|v| obj_to_f32(resolve_object(doc, v)))
        .collect::<Option<_>>()?;
    match values.as_slice() {
        [a, b, c, d, e, f] => Some(Transform::from_row(*a, *b, *c, *d, *e, *f)),
        _ => None,
    }
}

fn op_name(op: &Operation, idx: usize) -> Option<&[u8]> {
    op.operands.get(idx)?.as_name().ok()
}

fn op_f32(op: &Operation, idx: usize) -> Option<f32> {
    obj_to_f32(op.operands.get(idx)?)
}

fn op_f32_2(op: &Operation) -> Option<[f32; 2]> {
    Some([op_f32(op, 0)?, op_f32(op, 1)?])
}

fn op_f32_3(op: &Operation) -> Option<[f32; 3]> {
    Some([op_f32(op, 0)?, op_f32(op, 1)?, op_f32(op, 2)?])
}

fn op_f32_4(op: &Operation) -> Option<[f32; 4]> {
    Some([
        op_f32(op, 0)?,
        op_f32(op, 1)?,
        op_f32(op, 2)?,
        op_f32(op, 3)?,
    ])
}

fn op_f32_6(op: &Operation) -> Option<[f32; 6]> {
    Some([
        op_f32(op, 0)?,
        op_f32(op, 1)?,
        op_f32(op, 2)?,
        op_f32(op, 3)?,
        op_f32(op, 4)?,
        op_f32(op, 5)?,
    ])
}

/// Page extent in pixels, rounded half away from zero.
fn pt_to_px(extent: Pt, dpi: u32) -> Result<u32, CertError> {
    if dpi == 0 {
        return Err(CertError::Raster("dpi must be > 0".to_string()));
    }
    let num = (extent.to_milli_i64() as i128).saturating_mul(dpi as i128);
    let den = 72_000_i128;
    let px = (num + den / 2) / den;
    if px <= 0 {
        return Err(CertError::Raster(format!(
            "invalid non-positive pixel dimension {px} at {dpi} DPI"
        )));
    }
    u32::try_from(px)
        .map_err(|_| CertError::Raster(format!("pixel dimension out of range: {px}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::tests::{make_template_pdf, temp_dir};
    use crate::compose::compose_certificate;
    use crate::font::tests::system_font;
    use crate::font::{FontHandle, FontRegistry};
    use crate::layout::ResolvedLayout;
    use crate::overlay::render_overlay;
    use crate::types::Size;
    use lopdf::{Stream as LoStream, dictionary};
    use std::path::PathBuf;

    fn decode(png: &[u8]) -> Pixmap {
        Pixmap::decode_png(png).expect("png")
    }

    fn rgb_at(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8) {
        let px = pixmap.pixel(x, y).expect("pixel in bounds");
        (px.red(), px.green(), px.blue())
    }

    fn write_form_pdf(path: &Path, form_content: &[u8]) {
        let mut doc = LoDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let form_id = doc.new_object_id();
        doc.objects.insert(
            form_id,
            LoObject::Stream(LoStream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                    "Resources" => dictionary! {
                        "XObject" => dictionary! { "Fx" => form_id },
                    },
                },
                form_content.to_vec(),
            )),
        );
        let content_id = doc.add_object(LoStream::new(
            dictionary! {},
            b"q 1 0 0 1 100 100 cm /Fx Do Q".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Fx" => form_id },
            },
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
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
        doc.save(path).expect("save");
    }

    fn template(tag: &str) -> PathBuf {
        let dir = temp_dir(tag);
        let path = dir.join("tpl.pdf");
        make_template_pdf(&path, 1, 612, 792);
        path
    }

    #[test]
    fn filled_rectangle_lands_in_device_space() {
        let png = rasterize_first_page(&template("raster_rect"), 72).expect("raster");
        let pixmap = decode(&png);
        assert_eq!((pixmap.width(), pixmap.height()), (612, 792));
        // Rectangle spans x 36..236, y 36..136 in page space.
        assert_eq!(rgb_at(&pixmap, 100, 700), (0, 0, 255));
        assert_eq!(rgb_at(&pixmap, 300, 300), (255, 255, 255));
        assert_eq!(rgb_at(&pixmap, 100, 600), (255, 255, 255));
    }

    #[test]
    fn output_size_follows_dpi() {
        let png = rasterize_first_page(&template("raster_dpi"), 150).expect("raster");
        let pixmap = decode(&png);
        assert_eq!((pixmap.width(), pixmap.height()), (1275, 1650));
    }

    #[test]
    fn zero_dpi_is_rejected() {
        let err = rasterize_first_page(&template("raster_zero"), 0).expect_err("dpi");
        assert!(matches!(err, CertError::Raster(_)));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = temp_dir("raster_missing");
        assert!(rasterize_first_page(&dir.join("nope.pdf"), 72).is_err());
    }

    #[test]
    fn form_xobjects_follow_the_current_matrix() {
        let dir = temp_dir("raster_form");
        let path = dir.join("form.pdf");
        write_form_pdf(&path, b"1 0 0 rg 0 0 50 50 re f");
        let pixmap = decode(&rasterize_first_page(&path, 72).expect("raster"));
        assert_eq!(rgb_at(&pixmap, 125, 667), (255, 0, 0));
        assert_eq!(rgb_at(&pixmap, 25, 767), (255, 255, 255));
    }

    #[test]
    fn self_referencing_form_terminates() {
        let dir = temp_dir("raster_cycle");
        let path = dir.join("cycle.pdf");
        write_form_pdf(&path, b"0 g 0 0 10 10 re f /Fx Do");
        let pixmap = decode(&rasterize_first_page(&path, 72).expect("raster"));
        assert_eq!(rgb_at(&pixmap, 105, 687), (0, 0, 0));
    }

    #[test]
    fn composed_certificate_keeps_template_artwork() {
        let dir = temp_dir("raster_composed");
        let template_path = dir.join("tpl.pdf");
        let out_path = dir.join("out.pdf");
        make_template_pdf(&template_path, 2, 612, 792);
        let template = TemplateDocument::open(&template_path).expect("open");
        let fonts = FontRegistry::new();
        let layout = ResolvedLayout {
            x: Pt::from_f32(300.0),
            y: Pt::from_f32(400.0),
            font: FontHandle::default(),
            font_size: Pt::from_f32(40.0),
            color: Color::BLACK,
        };
        let overlay =
            render_overlay(&fonts, "Jane Doe", &layout, template.first_page_size()).expect("ovl");
        compose_certificate(template, overlay, &out_path).expect("compose");
        let pixmap = decode(&rasterize_first_page(&out_path, 72).expect("raster"));
        assert_eq!(rgb_at(&pixmap, 100, 700), (0, 0, 255));
    }

    #[test]
    fn embedded_truetype_text_is_drawn() {
        let Some(font_path) = system_font() else {
            return;
        };
        let mut fonts = FontRegistry::new();
        fonts.register("Sample", &font_path).expect("register");
        let layout = ResolvedLayout {
            x: Pt::from_f32(100.0),
            y: Pt::from_f32(300.0),
            font: fonts.resolve("Sample"),
            font_size: Pt::from_f32(200.0),
            color: Color::BLACK,
        };
        let overlay =
            render_overlay(&fonts, "HH", &layout, Size::new(612.0, 792.0)).expect("overlay");
        let dir = temp_dir("raster_text");
        let path = dir.join("text.pdf");
        std::fs::write(&path, overlay.to_bytes().expect("bytes")).expect("write");

        let pixmap = decode(&rasterize_first_page(&path, 72).expect("raster"));
        let dark = (0..pixmap.height())
            .flat_map(|y| (0..pixmap.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| rgb_at(&pixmap, x, y).0 < 64)
            .count();
        assert!(dark > 1000, "expected glyph coverage, got {dark} dark pixels");
        // Glyphs sit above the baseline at y=300, i.e. above row 492.
        assert_eq!(rgb_at(&pixmap, 50, 600), (255, 255, 255));
    }
}
