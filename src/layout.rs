use crate::config::{PlacementConfig, TextAlignment};
use crate::font::{FontHandle, FontRegistry};
use crate::types::{Color, Pt, Size};

/// Absolute drawing parameters for one name on one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedLayout {
    /// Baseline start, in page points from the bottom-left corner.
    pub x: Pt,
    pub y: Pt,
    pub font: FontHandle,
    pub font_size: Pt,
    pub color: Color,
}

/// Turns a fractional placement into page coordinates. Centered text is
/// shifted left by half its measured width; the baseline is never moved.
/// Nothing is validated: fractions outside 0..1 land off the page and
/// non-positive sizes are handed to the PDF as-is.
pub fn resolve_layout(
    fonts: &FontRegistry,
    config: &PlacementConfig,
    page: Size,
    text: &str,
) -> ResolvedLayout {
    let font = fonts.resolve(&config.font_name);
    let font_size = Pt::from_f32(config.font_size as f32);

    let mut x = page.width * config.name_position.x as f32;
    let y = page.height * config.name_position.y as f32;

    if config.text_alignment == TextAlignment::Center {
        let width = fonts.measure_text_width(font, font_size, text);
        x = x - width / 2;
    }

    ResolvedLayout {
        x,
        y,
        font,
        font_size,
        color: config.color(),
    }
}
