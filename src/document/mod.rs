//! Document-rendering collaborator.
//!
//! The engine only talks to documents through [`DocumentLoader`], [`Document`]
//! and [`PageSurface`]. Two backends ship with the crate:
//!
//! - [`PdfLoader`]: PDF files, edited at the content-stream level via `lopdf`
//! - [`LayoutLoader`]: JSON layout documents (spans with boxes and fonts)

mod json;
mod layout;
mod pdf;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Point, Rect};

pub use json::{LayoutDocument, LayoutLoader, LayoutPage};
pub use pdf::{PdfDocument, PdfLoader, STANDARD_FONTS};

pub const PDF_MIME: &str = "application/pdf";
pub const LAYOUT_MIME: &str = "application/json";

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("failed to parse document: {0}")]
    Parse(String),

    #[error("unsupported font: {0}")]
    UnsupportedFont(String),

    #[error("text cannot be encoded for font {font}: {text}")]
    Encoding { font: String, text: String },

    #[error("failed to write document: {0}")]
    Write(String),
}

/// A run of text sharing font attributes, in point space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub bbox: Rect,
    pub font_name: String,
    pub font_size: f32,
}

/// Spans sharing a baseline, in reading order.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutLine {
    pub text: String,
    pub bbox: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    pub name: String,
    pub size: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0.0, 0.0, 0.0);
    pub const WHITE: Rgb = Rgb(1.0, 1.0, 1.0);
}

/// One mutable page of a loaded document.
pub trait PageSurface: Send {
    fn index(&self) -> usize;
    /// Width and height in points.
    fn size(&self) -> (f32, f32);
    fn extract_layout(&self) -> Vec<Span>;
    fn extract_lines(&self) -> Vec<LayoutLine>;
    /// Page text, lines separated by `\n`, whitespace runs collapsed to one space.
    fn extract_text(&self) -> String;
    /// Boxes of every non-overlapping occurrence of `needle`, one per line it touches.
    fn search_literal(&self, needle: &str) -> Vec<Rect>;
    /// Removes text content whose glyph centers fall inside `rect`.
    fn erase(&mut self, rect: &Rect) -> Result<(), DocumentError>;
    fn paint_opaque(&mut self, rect: &Rect) -> Result<(), DocumentError>;
    /// Draws `text` with its baseline starting at `origin`.
    fn insert_text(
        &mut self,
        origin: Point,
        text: &str,
        font: &FontSpec,
        color: Rgb,
    ) -> Result<(), DocumentError>;
}

pub trait Document: Send {
    fn page_count(&self) -> usize;
    fn pages_mut(&mut self) -> Vec<&mut dyn PageSurface>;
    fn serialize(&mut self) -> Result<Vec<u8>, DocumentError>;
    fn mime(&self) -> &'static str;
}

pub trait DocumentLoader: Send + Sync {
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn Document>, DocumentError>;
}

/// Chooses a backend from the content of `bytes`.
pub fn open_loader(bytes: &[u8]) -> Result<Arc<dyn DocumentLoader>, DocumentError> {
    if let Some(kind) = infer::get(bytes) {
        if kind.mime_type() == PDF_MIME {
            return Ok(Arc::new(PdfLoader));
        }
    }
    if bytes.starts_with(b"%PDF") {
        return Ok(Arc::new(PdfLoader));
    }
    let first = bytes.iter().find(|b| !b.is_ascii_whitespace());
    if first == Some(&b'{') {
        return Ok(Arc::new(LayoutLoader));
    }
    Err(DocumentError::Parse(
        "unrecognized document format (expected PDF or JSON layout)".to_string(),
    ))
}

/// File extension used for generated copies of a document with this mime type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        PDF_MIME => "pdf",
        LAYOUT_MIME => "json",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_loader_sniffs_pdf_and_json() {
        assert!(open_loader(b"%PDF-1.7\n%...").is_ok());
        assert!(open_loader(b"  {\"pages\": []}").is_ok());
        assert!(matches!(
            open_loader(b"GIF89a"),
            Err(DocumentError::Parse(_))
        ));
    }
}
