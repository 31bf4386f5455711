use crate::base14;
use crate::error::CertError;
use crate::types::Pt;
use crate::winansi;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Font files looked up in the fonts directory at startup.
pub const FONT_CANDIDATES: [&str; 3] = [
    "PinyonScript-Regular.ttf",
    "Dancing-Script.ttf",
    "Great-Vibes.ttf",
];

const FIRST_CHAR: u8 = 32;
const LAST_CHAR: u8 = 255;

/// Standard PDF faces that need no font file. Helvetica is the fallback
/// for every name that does not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFont {
    Helvetica,
    TimesRoman,
}

impl BuiltinFont {
    pub const ALL: [BuiltinFont; 2] = [BuiltinFont::Helvetica, BuiltinFont::TimesRoman];

    pub fn base_font(self) -> &'static str {
        match self {
            BuiltinFont::Helvetica => "Helvetica",
            BuiltinFont::TimesRoman => "Times-Roman",
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<Self> {
        let key = normalize_name(name);
        Self::ALL
            .into_iter()
            .find(|font| normalize_name(font.base_font()) == key)
    }

    pub(crate) fn advance(self, code: u8) -> u16 {
        let (table, default) = match self {
            BuiltinFont::Helvetica => (&base14::HELVETICA_ASCII, base14::HELVETICA_DEFAULT),
            BuiltinFont::TimesRoman => (&base14::TIMES_ROMAN_ASCII, base14::TIMES_ROMAN_DEFAULT),
        };
        match code {
            0..=31 => 0,
            32..=126 => table[(code - 32) as usize],
            _ => default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontHandle {
    Registered(usize),
    Builtin(BuiltinFont),
}

impl Default for FontHandle {
    fn default() -> Self {
        FontHandle::Builtin(BuiltinFont::Helvetica)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FontProgramKind {
    TrueType,
    OpenTypeCff,
}

#[derive(Debug)]
pub(crate) struct RegisteredFont {
    pub(crate) name: String,
    pub(crate) postscript_name: String,
    pub(crate) data: Vec<u8>,
    pub(crate) metrics: FontMetrics,
    pub(crate) program_kind: FontProgramKind,
}

/// Metrics in 1/1000 em, indexed by WinAnsi code.
#[derive(Debug)]
pub(crate) struct FontMetrics {
    pub(crate) first_char: u8,
    pub(crate) last_char: u8,
    pub(crate) widths: Vec<u16>,
    pub(crate) ascent: i16,
    pub(crate) descent: i16,
    pub(crate) cap_height: i16,
    pub(crate) italic_angle: i16,
    pub(crate) stem_v: i16,
    pub(crate) bbox: (i16, i16, i16, i16),
    pub(crate) missing_width: u16,
    pub(crate) is_fixed_pitch: bool,
}

#[derive(Debug, Default)]
pub struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    lookup: HashMap<String, usize>,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every candidate found in `dir`. Missing or unreadable
    /// files are logged and skipped.
    pub fn load_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let mut registry = Self::new();
        for file_name in FONT_CANDIDATES {
            let path = dir.join(file_name);
            if !path.is_file() {
                tracing::debug!(font = file_name, "font file not present");
                continue;
            }
            let name = registry_name(file_name);
            match registry.register(&name, &path) {
                Ok(()) => tracing::info!(font = %name, "loaded font"),
                Err(err) => tracing::warn!(font = file_name, error = %err, "failed to load font"),
            }
        }
        if !registry.has_registered_fonts() {
            tracing::warn!(
                dir = %dir.display(),
                "no custom fonts loaded, using built-in faces"
            );
        }
        registry
    }

    pub fn register(&mut self, name: &str, path: impl AsRef<Path>) -> Result<(), CertError> {
        let path = path.as_ref();
        let key = normalize_name(name);
        if key.is_empty() {
            return Err(CertError::Font("font name cannot be empty".to_string()));
        }
        let data = fs::read(path)
            .map_err(|err| CertError::Font(format!("{}: {err}", path.display())))?;
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|err| CertError::Font(format!("invalid font data in {}: {err}", path.display())))?;

        let (postscript_name, aliases) = font_names(&face, path);
        let (metrics, program_kind) = FontMetrics::from_face(&face);

        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            name: name.to_string(),
            postscript_name,
            data,
            metrics,
            program_kind,
        });
        self.lookup.insert(key, index);
        for alias in aliases {
            let alias_key = normalize_name(&alias);
            if alias_key.is_empty() || self.lookup.contains_key(&alias_key) {
                continue;
            }
            self.lookup.insert(alias_key, index);
        }
        Ok(())
    }

    /// Never fails: unknown names come back as Helvetica.
    pub fn resolve(&self, name: &str) -> FontHandle {
        if let Some(index) = self.lookup.get(&normalize_name(name)) {
            return FontHandle::Registered(*index);
        }
        match BuiltinFont::from_name(name) {
            Some(builtin) => FontHandle::Builtin(builtin),
            None => FontHandle::default(),
        }
    }

    /// Names the registry reports as available. Falls back to the built-in
    /// faces when nothing was registered.
    pub fn font_names(&self) -> Vec<String> {
        if self.fonts.is_empty() {
            return BuiltinFont::ALL
                .iter()
                .map(|font| font.base_font().to_string())
                .collect();
        }
        self.fonts.iter().map(|font| font.name.clone()).collect()
    }

    pub fn has_registered_fonts(&self) -> bool {
        !self.fonts.is_empty()
    }

    pub(crate) fn registered(&self, handle: FontHandle) -> Option<&RegisteredFont> {
        match handle {
            FontHandle::Registered(index) => self.fonts.get(index),
            FontHandle::Builtin(_) => None,
        }
    }

    /// Width of `text` as it will be drawn: WinAnsi-encoded, one advance
    /// per byte, no kerning.
    pub fn measure_text_width(&self, handle: FontHandle, font_size: Pt, text: &str) -> Pt {
        let codes = winansi::encode_text(text);
        let total_units: i32 = match self.registered(handle) {
            Some(font) => codes
                .iter()
                .map(|code| font.metrics.advance(*code) as i32)
                .sum(),
            None => {
                let builtin = match handle {
                    FontHandle::Builtin(builtin) => builtin,
                    FontHandle::Registered(_) => BuiltinFont::Helvetica,
                };
                codes.iter().map(|code| builtin.advance(*code) as i32).sum()
            }
        };
        if total_units <= 0 {
            return Pt::ZERO;
        }
        font_size.mul_ratio(total_units, 1000)
    }
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> (Self, FontProgramKind) {
        let units_per_em = face.units_per_em().max(1);
        let scale = 1000.0 / units_per_em as f32;
        let widths = (FIRST_CHAR..=LAST_CHAR)
            .map(|code| {
                let advance = winansi::decode_byte(code)
                    .and_then(|ch| face.glyph_index(ch))
                    .and_then(|id| face.glyph_hor_advance(id))
                    .unwrap_or(0);
                let scaled = (advance as f32 * scale).round() as i32;
                scaled.clamp(0, u16::MAX as i32) as u16
            })
            .collect::<Vec<_>>();
        let missing_width = widths
            .get((b' ' - FIRST_CHAR) as usize)
            .copied()
            .unwrap_or(0);

        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let bbox = face.global_bounding_box();
        let bbox = (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        );
        let italic_angle = face
            .italic_angle()
            .map(|value| value.round() as i16)
            .unwrap_or(0);
        let program_kind = if face.tables().cff.is_some() {
            FontProgramKind::OpenTypeCff
        } else {
            FontProgramKind::TrueType
        };

        (
            Self {
                first_char: FIRST_CHAR,
                last_char: LAST_CHAR,
                widths,
                ascent,
                descent,
                cap_height,
                italic_angle,
                stem_v: 80,
                bbox,
                missing_width,
                is_fixed_pitch: face.is_monospaced(),
            },
            program_kind,
        )
    }

    fn advance(&self, code: u8) -> u16 {
        if code < self.first_char || code > self.last_char {
            return 0;
        }
        self.widths
            .get((code - self.first_char) as usize)
            .copied()
            .unwrap_or(self.missing_width)
    }
}

/// `PinyonScript-Regular.ttf` -> `PinyonScriptRegular`.
pub fn registry_name(file_name: &str) -> String {
    file_name
        .split('.')
        .next()
        .unwrap_or_default()
        .replace('-', "")
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn font_names(face: &ttf_parser::Face<'_>, path: &Path) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                family.get_or_insert(name);
            }
            name_id::FULL_NAME => {
                full.get_or_insert(name);
            }
            name_id::POST_SCRIPT_NAME => {
                post.get_or_insert(name);
            }
            _ => {}
        }
    }

    let stem = path
        .file_stem()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string());
    let postscript = post
        .clone()
        .or_else(|| full.clone().map(|v| v.replace(' ', "")))
        .or_else(|| stem.clone())
        .unwrap_or_else(|| "EmbeddedFont".to_string());

    let aliases = [family, full, post, stem].into_iter().flatten().collect();
    (postscript, aliases)
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}
