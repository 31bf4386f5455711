use crate::error::CertError;
use crate::preview::DEFAULT_PREVIEW_DPI;
use std::path::{Path, PathBuf};

/// Directory layout and preview resolution for one generator instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub template_dir: PathBuf,
    pub preview_dir: PathBuf,
    pub output_dir: PathBuf,
    pub font_dir: PathBuf,
    pub config_file: PathBuf,
    pub preview_dpi: u32,
}

impl Settings {
    /// Reads `CERTSTAMP_*` variables, after loading `.env` if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::from_lookup(&base_dir, |key| std::env::var(key).ok())
    }

    /// Every directory lives under `base_dir`.
    pub fn rooted_at(base_dir: &Path) -> Self {
        Self::from_lookup(base_dir, |_| None)
    }

    fn from_lookup(base_dir: &Path, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str, default: &str| {
            base_dir.join(lookup(key).unwrap_or_else(|| default.to_string()))
        };
        let preview_dpi = lookup("CERTSTAMP_PREVIEW_DPI")
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(DEFAULT_PREVIEW_DPI);

        Self {
            template_dir: path("CERTSTAMP_TEMPLATE_DIR", "static/templates"),
            preview_dir: path("CERTSTAMP_PREVIEW_DIR", "static/previews"),
            output_dir: path("CERTSTAMP_OUTPUT_DIR", "certificates"),
            font_dir: path("CERTSTAMP_FONT_DIR", "static/fonts"),
            config_file: path("CERTSTAMP_CONFIG_FILE", "template_config.json"),
            preview_dpi,
        }
    }

    pub fn ensure_dirs(&self) -> Result<(), CertError> {
        for dir in [
            &self.template_dir,
            &self.preview_dir,
            &self.output_dir,
            &self.font_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::tests::temp_dir;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_relative_to_base() {
        let base = PathBuf::from("/srv/certs");
        let settings = Settings::rooted_at(&base);
        assert_eq!(settings.template_dir, base.join("static/templates"));
        assert_eq!(settings.preview_dir, base.join("static/previews"));
        assert_eq!(settings.output_dir, base.join("certificates"));
        assert_eq!(settings.font_dir, base.join("static/fonts"));
        assert_eq!(settings.config_file, base.join("template_config.json"));
        assert_eq!(settings.preview_dpi, 150);
    }

    #[test]
    fn overrides_and_bad_dpi() {
        let vars: HashMap<&str, &str> = [
            ("CERTSTAMP_OUTPUT_DIR", "/tmp/out"),
            ("CERTSTAMP_TEMPLATE_DIR", "tpl"),
            ("CERTSTAMP_PREVIEW_DPI", "lots"),
        ]
        .into_iter()
        .collect();
        let base = PathBuf::from("/srv/certs");
        let settings = Settings::from_lookup(&base, |key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(settings.template_dir, base.join("tpl"));
        assert_eq!(settings.preview_dpi, 150);
    }

    #[test]
    fn custom_dpi_is_parsed() {
        let settings = Settings::from_lookup(Path::new("."), |key| {
            (key == "CERTSTAMP_PREVIEW_DPI").then(|| " 96 ".to_string())
        });
        assert_eq!(settings.preview_dpi, 96);
    }

    #[test]
    fn ensure_dirs_creates_layout() {
        let base = temp_dir("settings_dirs");
        let settings = Settings::rooted_at(&base);
        settings.ensure_dirs().expect("dirs");
        assert!(settings.template_dir.is_dir());
        assert!(settings.preview_dir.is_dir());
        assert!(settings.output_dir.is_dir());
        assert!(settings.font_dir.is_dir());
    }
}
