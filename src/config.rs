use crate::error::CertError;
use crate::types::Color;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Name anchor as fractions of the page size, origin bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NamePosition {
    pub x: f64,
    pub y: f64,
}

/// Only `center` shifts the text; every other stored value reads back as
/// `Left` and leaves the anchor untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TextAlignment {
    #[default]
    Center,
    Left,
}

impl From<String> for TextAlignment {
    fn from(value: String) -> Self {
        if value == "center" {
            TextAlignment::Center
        } else {
            TextAlignment::Left
        }
    }
}

impl From<TextAlignment> for String {
    fn from(value: TextAlignment) -> Self {
        match value {
            TextAlignment::Center => "center".to_string(),
            TextAlignment::Left => "left".to_string(),
        }
    }
}

/// Where and how the recipient name is drawn on one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementConfig {
    pub name_position: NamePosition,
    pub font_size: f64,
    #[serde(deserialize_with = "color_or_black")]
    pub font_color: [f64; 3],
    #[serde(default = "default_font_name")]
    pub font_name: String,
    #[serde(default)]
    pub text_alignment: TextAlignment,
}

fn default_font_name() -> String {
    "Helvetica".to_string()
}

// Anything but exactly three channels draws in black.
fn color_or_black<'de, D>(deserializer: D) -> Result<[f64; 3], D::Error>
where
    D: serde::Deserializer<'de>,
{
    let channels = Vec::<f64>::deserialize(deserializer)?;
    Ok(match channels.as_slice() {
        [r, g, b] => [*r, *g, *b],
        _ => [0.0, 0.0, 0.0],
    })
}

impl PlacementConfig {
    pub fn color(&self) -> Color {
        let [r, g, b] = self.font_color;
        Color::rgb(r as f32, g as f32, b as f32)
    }

    /// Reads a stored record. Shape errors only show up here, when the
    /// record is about to be used.
    pub fn from_record(template_id: &str, record: &Value) -> Result<Self, CertError> {
        Self::deserialize(record).map_err(|err| {
            CertError::Config(format!("placement for {template_id} is unusable: {err}"))
        })
    }

    pub fn to_record(&self) -> Result<Value, CertError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Built-in placements, in table order. The first entry is the last-resort
/// fallback for unknown templates.
pub fn builtin_defaults() -> Vec<(String, PlacementConfig)> {
    vec![
        (
            "black_template.pdf".to_string(),
            PlacementConfig {
                name_position: NamePosition { x: 0.5, y: 0.45 },
                font_size: 45.0,
                font_color: [1.0, 0.84, 0.0],
                font_name: "PinyonScriptRegular".to_string(),
                text_alignment: TextAlignment::Center,
            },
        ),
        (
            "brown_floral_template.pdf".to_string(),
            PlacementConfig {
                name_position: NamePosition { x: 0.5, y: 0.55 },
                font_size: 40.0,
                font_color: [0.4, 0.2, 0.0],
                font_name: "PinyonScriptRegular".to_string(),
                text_alignment: TextAlignment::Center,
            },
        ),
    ]
}

/// Template id -> placement record, mirrored to a JSON file. Records are
/// kept as raw JSON so one bad record never costs the others; reads never
/// touch the file and `set` rewrites it whole.
#[derive(Debug)]
pub struct TemplateConfigStore {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
    defaults: Vec<(String, PlacementConfig)>,
}

impl TemplateConfigStore {
    /// Opens the store at `path`. A file that is absent, or is not a JSON
    /// object, is replaced by the built-in defaults, which are written back
    /// immediately.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let defaults = builtin_defaults();
        let loaded = match read_entries(&path) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to load config file");
                None
            }
        };
        let seeded = loaded.is_none();
        let entries = match loaded {
            Some(entries) => entries,
            None => defaults
                .iter()
                .filter_map(|(id, config)| Some((id.clone(), config.to_record().ok()?)))
                .collect(),
        };
        let store = Self {
            path,
            entries,
            defaults,
        };
        if seeded {
            tracing::info!(path = %store.path.display(), "seeding template config with defaults");
            if let Err(err) = store.save() {
                tracing::error!(path = %store.path.display(), error = %err, "failed to save config");
            }
        }
        store
    }

    pub fn entries(&self) -> &BTreeMap<String, Value> {
        &self.entries
    }

    /// Stored record only, exactly as saved, without falling back to
    /// defaults.
    pub fn stored(&self, template_id: &str) -> Option<&Value> {
        self.entries.get(template_id)
    }

    /// Stored record, then the built-in default for the same id, then the
    /// first built-in default. Fails only when the stored record for
    /// `template_id` does not describe a placement.
    pub fn get(&self, template_id: &str) -> Result<PlacementConfig, CertError> {
        if let Some(record) = self.entries.get(template_id) {
            return PlacementConfig::from_record(template_id, record);
        }
        let config = self
            .defaults
            .iter()
            .find(|(id, _)| id == template_id)
            .or_else(|| self.defaults.first())
            .map(|(_, config)| config.clone())
            .ok_or_else(|| CertError::Config("no built-in placements".to_string()))?;
        Ok(config)
    }

    /// Replaces the whole record for `template_id` and persists the store.
    pub fn set(&mut self, template_id: &str, config: &PlacementConfig) -> Result<(), CertError> {
        let record = config.to_record()?;
        self.set_record(template_id, record)
    }

    /// Stores `record` as given. Its shape is not checked until a
    /// certificate is rendered with it.
    pub fn set_record(&mut self, template_id: &str, record: Value) -> Result<(), CertError> {
        self.entries.insert(template_id.to_string(), record);
        self.save()
    }

    /// Like `set_record`, for raw JSON text coming from an outer surface.
    /// Only the JSON syntax is checked.
    pub fn set_json(&mut self, template_id: &str, json: &str) -> Result<(), CertError> {
        let record: Value = serde_json::from_str(json)?;
        self.set_record(template_id, record)
    }

    pub fn save(&self) -> Result<(), CertError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.entries)?;
        tmp.write_all(b"\n")?;
        tmp.flush()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<Option<BTreeMap<String, Value>>, CertError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    let entries = serde_json::from_str(&raw)
        .map_err(|err| CertError::Config(format!("{}: {err}", path.display())))?;
    Ok(Some(entries))
}
