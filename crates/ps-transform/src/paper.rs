//! Paper size lookup by name.

use crate::error::{Result, TransformError};
use crate::spec::{dimension, PT_PER_IN, PT_PER_MM};
use crate::types::Rectangle;

/// Common paper sizes in millimetres (ISO) or inches (US).
const PAPER_SIZES_MM: [(&str, f64, f64); 5] = [
    ("a3", 297.0, 420.0),
    ("a4", 210.0, 297.0),
    ("a5", 148.0, 210.0),
    ("b5", 176.0, 250.0),
    ("b4", 250.0, 353.0),
];

const PAPER_SIZES_IN: [(&str, f64, f64); 4] = [
    ("letter", 8.5, 11.0),
    ("legal", 8.5, 14.0),
    ("tabloid", 11.0, 17.0),
    ("ledger", 17.0, 11.0),
];

/// Look up a paper size by name, in points.
pub fn get_paper_size(name: &str) -> Option<Rectangle> {
    let name = name.to_ascii_lowercase();
    PAPER_SIZES_MM
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|&(_, w, h)| Rectangle::new(w * PT_PER_MM, h * PT_PER_MM))
        .or_else(|| {
            PAPER_SIZES_IN
                .iter()
                .find(|(n, _, _)| *n == name)
                .map(|&(_, w, h)| Rectangle::new(w * PT_PER_IN, h * PT_PER_IN))
        })
}

/// The fallback output size when neither the document nor the user names one.
pub fn default_size() -> Rectangle {
    Rectangle::new(210.0 * PT_PER_MM, 297.0 * PT_PER_MM)
}

/// Parse a paper argument: a known name or an explicit `WIDTHxHEIGHT` pair
/// of dimension literals.
pub fn parse_paper(text: &str) -> Result<Rectangle> {
    if let Some(size) = get_paper_size(text) {
        return Ok(size);
    }
    if let Some((width_text, height_text)) = text.split_once('x') {
        let width = dimension(width_text, None)?;
        let height = dimension(height_text, None)?;
        return Ok(Rectangle::new(width, height));
    }
    Err(TransformError::UnknownPaper(text.to_string()))
}
