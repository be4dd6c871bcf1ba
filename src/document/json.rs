use serde::{Deserialize, Serialize};

use super::layout::{GlyphRun, PlacedGlyph, TextLayout};
use super::{
    Document, DocumentError, DocumentLoader, FontSpec, LAYOUT_MIME, LayoutLine, PageSurface, Rgb,
    Span,
};
use crate::geometry::{Point, Rect};

/// Width of one character as a fraction of the font size, used for inserted text.
const CHAR_WIDTH_EM: f32 = 0.5;

/// Loads JSON layout documents: pages of positioned spans.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutLoader;

impl DocumentLoader for LayoutLoader {
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn Document>, DocumentError> {
        Ok(Box::new(LayoutDocument::from_slice(bytes)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutPage {
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub spans: Vec<Span>,
    /// Opaque white rectangles painted over the page.
    #[serde(default)]
    pub covers: Vec<Rect>,
    #[serde(skip)]
    index: usize,
    #[serde(skip)]
    layout: TextLayout,
}

impl LayoutPage {
    pub fn new(width: f32, height: f32, spans: Vec<Span>) -> Self {
        let mut page = Self {
            width,
            height,
            spans,
            covers: Vec::new(),
            index: 0,
            layout: TextLayout::default(),
        };
        page.relayout();
        page
    }

    fn relayout(&mut self) {
        let runs = self.spans.iter().map(span_run).collect();
        self.layout = TextLayout::build(runs);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutDocument {
    pub pages: Vec<LayoutPage>,
}

impl LayoutDocument {
    pub fn new(pages: Vec<LayoutPage>) -> Self {
        let mut doc = Self { pages };
        doc.prepare();
        doc
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, DocumentError> {
        let mut doc: LayoutDocument =
            serde_json::from_slice(bytes).map_err(|err| DocumentError::Parse(err.to_string()))?;
        for (idx, page) in doc.pages.iter().enumerate() {
            if !(page.width > 0.0 && page.height > 0.0) {
                return Err(DocumentError::Parse(format!(
                    "page {} has invalid size {}x{}",
                    idx, page.width, page.height
                )));
            }
        }
        doc.prepare();
        Ok(doc)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, DocumentError> {
        serde_json::to_vec_pretty(self).map_err(|err| DocumentError::Write(err.to_string()))
    }

    fn prepare(&mut self) {
        for (idx, page) in self.pages.iter_mut().enumerate() {
            page.index = idx;
            page.relayout();
        }
    }
}

impl Document for LayoutDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn pages_mut(&mut self) -> Vec<&mut dyn PageSurface> {
        self.pages
            .iter_mut()
            .map(|page| page as &mut dyn PageSurface)
            .collect()
    }

    fn serialize(&mut self) -> Result<Vec<u8>, DocumentError> {
        self.to_vec()
    }

    fn mime(&self) -> &'static str {
        LAYOUT_MIME
    }
}

impl PageSurface for LayoutPage {
    fn index(&self) -> usize {
        self.index
    }

    fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    fn extract_layout(&self) -> Vec<Span> {
        self.layout.spans()
    }

    fn extract_lines(&self) -> Vec<LayoutLine> {
        self.layout.lines()
    }

    fn extract_text(&self) -> String {
        self.layout.text()
    }

    fn search_literal(&self, needle: &str) -> Vec<Rect> {
        self.layout.search(needle)
    }

    fn erase(&mut self, rect: &Rect) -> Result<(), DocumentError> {
        let mut next = Vec::with_capacity(self.spans.len());
        for span in self.spans.drain(..) {
            next.extend(split_span(span, rect));
        }
        self.spans = next;
        self.relayout();
        Ok(())
    }

    fn paint_opaque(&mut self, rect: &Rect) -> Result<(), DocumentError> {
        self.covers.push(*rect);
        Ok(())
    }

    fn insert_text(
        &mut self,
        origin: Point,
        text: &str,
        font: &FontSpec,
        _color: Rgb,
    ) -> Result<(), DocumentError> {
        if font.name.trim().is_empty() {
            return Err(DocumentError::UnsupportedFont(font.name.clone()));
        }
        let count = text.chars().count() as f32;
        let descent = font.size * 0.2;
        let bbox = Rect::new(
            origin.x,
            origin.y - descent,
            origin.x + count * font.size * CHAR_WIDTH_EM,
            origin.y - descent + font.size,
        );
        self.spans.push(Span {
            text: text.to_string(),
            bbox,
            font_name: font.name.clone(),
            font_size: font.size,
        });
        self.relayout();
        Ok(())
    }
}

fn span_run(span: &Span) -> GlyphRun {
    let baseline = span.bbox.y0 + span.bbox.height() * 0.2;
    let count = span.text.chars().count().max(1) as f32;
    let advance = span.bbox.width() / count;
    GlyphRun {
        font_name: span.font_name.clone(),
        font_size: span.font_size,
        baseline,
        glyphs: span
            .text
            .chars()
            .enumerate()
            .map(|(idx, ch)| {
                let x0 = span.bbox.x0 + advance * idx as f32;
                PlacedGlyph {
                    ch,
                    bbox: Rect::new(x0, span.bbox.y0, x0 + advance, span.bbox.y1),
                }
            })
            .collect(),
    }
}

/// Drops the chars of `span` whose slot center lies in `rect`, keeping the
/// surviving pieces at their original positions.
fn split_span(span: Span, rect: &Rect) -> Vec<Span> {
    let run = span_run(&span);
    let mut pieces = Vec::new();
    let mut current: Option<(String, Rect)> = None;
    for glyph in run.glyphs {
        if rect.contains(glyph.bbox.center()) {
            if let Some(piece) = current.take() {
                pieces.push(piece);
            }
            continue;
        }
        match current.as_mut() {
            Some((text, bbox)) => {
                text.push(glyph.ch);
                *bbox = bbox.union(&glyph.bbox);
            }
            None => current = Some((glyph.ch.to_string(), glyph.bbox)),
        }
    }
    if let Some(piece) = current {
        pieces.push(piece);
    }
    pieces
        .into_iter()
        .filter(|(text, _)| !text.trim().is_empty())
        .map(|(text, bbox)| Span {
            text,
            bbox,
            font_name: span.font_name.clone(),
            font_size: span.font_size,
        })
        .collect()
}
