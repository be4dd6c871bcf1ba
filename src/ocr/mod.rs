mod coords;
mod engine;
mod geom;
mod segment;

use serde::{Deserialize, Serialize};

pub use coords::CoordinateMapper;
pub use engine::{
    CommandRasterizer, OcrPipeline, Rasterizer, RecognizedWord, Recognizer, Tesseract,
    list_tesseract_languages,
};
pub use segment::{SegmentOptions, segment_tokens};

/// Pixel-space box: origin top-left, y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBoxPx {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// One recognized word as reported by the OCR engine.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrToken {
    pub text: String,
    pub bbox: BBoxPx,
    /// Engine confidence in `[0, 100]`.
    pub conf: f32,
    pub page: usize,
}

/// A grouped line of recognized tokens, in pixel space at the OCR resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSection {
    pub id: String,
    pub text: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub page: usize,
}

impl TextSection {
    pub fn bbox(&self) -> BBoxPx {
        BBoxPx {
            x: self.x,
            y: self.y,
            w: self.width,
            h: self.height,
        }
    }
}
