mod base14;
mod catalog;
mod compose;
mod config;
mod error;
mod font;
mod generator;
mod layout;
mod overlay;
mod pdf_raster;
mod preview;
mod request;
mod settings;
mod types;
mod winansi;

pub use catalog::{
    TEMPLATE_EXTENSION, TemplateEntry, display_name, list_templates, preview_file_name,
    template_page_count,
};
pub use compose::{ComposeSummary, TemplateDocument, compose_certificate};
pub use config::{
    NamePosition, PlacementConfig, TemplateConfigStore, TextAlignment, builtin_defaults,
};
pub use error::{CertError, GenerateError};
pub use font::{BuiltinFont, FONT_CANDIDATES, FontHandle, FontRegistry, registry_name};
pub use generator::{CertificateGenerator, GeneratedCertificate};
pub use layout::{ResolvedLayout, resolve_layout};
pub use overlay::{Overlay, render_overlay};
pub use pdf_raster::rasterize_first_page;
pub use preview::{DEFAULT_PREVIEW_DPI, PreviewGenerator, PreviewOutcome};
pub use request::{RenderRequest, TIMESTAMP_FORMAT, safe_file_stem};
pub use settings::Settings;
pub use types::{Color, Pt, Size};
