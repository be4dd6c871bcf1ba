//! PDF backend: pages are edited by rewriting their content streams.

mod edit;
mod fonts;
mod text;

use std::collections::{HashMap, HashSet};

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document as LoDocument, Object, ObjectId, StringFormat};

use self::edit::{Removals, remove_glyphs};
use self::fonts::{FontInfo, encode_win_ansi, inherited, number, page_fonts, resolve};
use self::text::{GlyphSource, ShowState, interpret};
use super::layout::TextLayout;
use super::{
    Document, DocumentError, DocumentLoader, FontSpec, LayoutLine, PDF_MIME, PageSurface, Rgb,
    Span,
};
use crate::geometry::{Point, Rect};

pub use fonts::STANDARD_FONTS;

const LETTER: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn Document>, DocumentError> {
        Ok(Box::new(PdfDocument::load(bytes)?))
    }
}

pub struct PdfDocument {
    doc: LoDocument,
    pages: Vec<PdfPage>,
}

impl PdfDocument {
    pub fn load(bytes: &[u8]) -> Result<Self, DocumentError> {
        let doc = LoDocument::load_mem(bytes).map_err(|err| DocumentError::Parse(err.to_string()))?;
        let mut pages = Vec::new();
        for (index, (_, page_id)) in doc.get_pages().into_iter().enumerate() {
            pages.push(PdfPage::load(&doc, index, page_id)?);
        }
        if pages.is_empty() {
            return Err(DocumentError::Parse("document has no pages".to_string()));
        }
        tracing::debug!(pages = pages.len(), "pdf loaded");
        Ok(Self { doc, pages })
    }
}

impl Document for PdfDocument {
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
        let write = |err: lopdf::Error| DocumentError::Write(err.to_string());
        for page in &mut self.pages {
            if !page.dirty {
                continue;
            }
            let pending = std::mem::take(&mut page.pending_fonts);
            install_fonts(&mut self.doc, page.id, &pending)?;
            let content = Content {
                operations: page.ops.clone(),
            }
            .encode()
            .map_err(write)?;
            self.doc
                .change_page_content(page.id, content)
                .map_err(write)?;
            page.dirty = false;
        }
        let mut out = Vec::new();
        self.doc.save_to(&mut out).map_err(|err| DocumentError::Write(err.to_string()))?;
        Ok(out)
    }

    fn mime(&self) -> &'static str {
        PDF_MIME
    }
}

struct PdfPage {
    index: usize,
    id: ObjectId,
    origin: (f32, f32),
    width: f32,
    height: f32,
    ops: Vec<Operation>,
    fonts: HashMap<Vec<u8>, FontInfo>,
    /// base font name -> resource key of fonts this crate added
    added_fonts: HashMap<String, Vec<u8>>,
    pending_fonts: Vec<(Vec<u8>, String)>,
    wrapped: bool,
    dirty: bool,
    layout: TextLayout,
    sources: Vec<GlyphSource>,
    states: HashMap<usize, ShowState>,
}

impl PdfPage {
    fn load(doc: &LoDocument, index: usize, id: ObjectId) -> Result<Self, DocumentError> {
        let parse = |err: lopdf::Error| DocumentError::Parse(format!("page {}: {}", index, err));
        let media = media_box(doc, id);
        let raw = doc.get_page_content(id).map_err(parse)?;
        let content = Content::decode(&raw).map_err(parse)?;
        let mut page = Self {
            index,
            id,
            origin: (media[0], media[1]),
            width: media[2] - media[0],
            height: media[3] - media[1],
            ops: content.operations,
            fonts: page_fonts(doc, id),
            added_fonts: HashMap::new(),
            pending_fonts: Vec::new(),
            wrapped: false,
            dirty: false,
            layout: TextLayout::default(),
            sources: Vec::new(),
            states: HashMap::new(),
        };
        page.relayout();
        Ok(page)
    }

    fn relayout(&mut self) {
        let extraction = interpret(&self.ops, &self.fonts, self.origin);
        self.layout = TextLayout::build(extraction.runs);
        self.sources = extraction.sources;
        self.states = extraction.states;
    }

    /// Isolates the original content in `q .. Q` so appended drawing starts
    /// from the default graphics state.
    fn ensure_wrapped(&mut self) {
        if self.wrapped {
            return;
        }
        self.ops.insert(0, Operation::new("q", vec![]));
        self.ops.push(Operation::new("Q", vec![]));
        self.wrapped = true;
    }

    fn font_key(&mut self, base_font: &str) -> Vec<u8> {
        if let Some(key) = self.added_fonts.get(base_font) {
            return key.clone();
        }
        let mut n = self.added_fonts.len() + 1;
        let key = loop {
            let candidate = format!("DF{}", n).into_bytes();
            if !self.fonts.contains_key(&candidate) {
                break candidate;
            }
            n += 1;
        };
        self.fonts
            .insert(key.clone(), FontInfo::standard(base_font));
        self.added_fonts.insert(base_font.to_string(), key.clone());
        self.pending_fonts.push((key.clone(), base_font.to_string()));
        key
    }
}

impl PageSurface for PdfPage {
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
        let hits = self.layout.glyphs_within(rect);
        if hits.is_empty() {
            return Ok(());
        }
        let mut removed: HashMap<usize, Removals> = HashMap::new();
        for glyph in hits {
            if let Some(source) = self.sources.get(glyph) {
                removed
                    .entry(source.op)
                    .or_insert_with(HashSet::new)
                    .insert((source.element, source.code));
            }
        }
        self.ops = remove_glyphs(&self.ops, &removed, &self.states, &self.fonts);
        self.dirty = true;
        self.relayout();
        Ok(())
    }

    fn paint_opaque(&mut self, rect: &Rect) -> Result<(), DocumentError> {
        self.ensure_wrapped();
        let (ox, oy) = self.origin;
        self.ops.extend([
            Operation::new("q", vec![]),
            Operation::new("rg", rgb_operands(Rgb::WHITE)),
            Operation::new(
                "re",
                vec![
                    real(rect.x0 + ox),
                    real(rect.y0 + oy),
                    real(rect.width()),
                    real(rect.height()),
                ],
            ),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ]);
        self.dirty = true;
        self.relayout();
        Ok(())
    }

    fn insert_text(
        &mut self,
        origin: Point,
        text: &str,
        font: &FontSpec,
        color: Rgb,
    ) -> Result<(), DocumentError> {
        if !STANDARD_FONTS.contains(&font.name.as_str()) {
            return Err(DocumentError::UnsupportedFont(font.name.clone()));
        }
        let bytes = encode_win_ansi(text).ok_or_else(|| DocumentError::Encoding {
            font: font.name.clone(),
            text: text.to_string(),
        })?;
        let key = self.font_key(&font.name);
        self.ensure_wrapped();
        let (ox, oy) = self.origin;
        self.ops.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(key), real(font.size)]),
            Operation::new("rg", rgb_operands(color)),
            Operation::new("Td", vec![real(origin.x + ox), real(origin.y + oy)]),
            Operation::new("Tj", vec![Object::String(bytes, StringFormat::Literal)]),
            Operation::new("ET", vec![]),
        ]);
        self.dirty = true;
        self.relayout();
        Ok(())
    }
}

fn real(value: f32) -> Object {
    Object::Real(value.into())
}

fn rgb_operands(color: Rgb) -> Vec<Object> {
    vec![real(color.0), real(color.1), real(color.2)]
}

fn media_box(doc: &LoDocument, page_id: ObjectId) -> [f32; 4] {
    let Some(items) = inherited(doc, page_id, b"MediaBox").and_then(|o| o.as_array().ok()) else {
        return LETTER;
    };
    let values: Vec<f32> = items
        .iter()
        .filter_map(|item| resolve(doc, item).and_then(number))
        .collect();
    match values.as_slice() {
        [x0, y0, x1, y1] if x1 > x0 && y1 > y0 => [*x0, *y0, *x1, *y1],
        _ => LETTER,
    }
}

/// Adds font dictionaries for `fonts` and links them from the page's own
/// `Resources`, inlining inherited resources so sibling pages are untouched.
fn install_fonts(
    doc: &mut LoDocument,
    page_id: ObjectId,
    fonts: &[(Vec<u8>, String)],
) -> Result<(), DocumentError> {
    if fonts.is_empty() {
        return Ok(());
    }
    let mut resources = inherited(doc, page_id, b"Resources")
        .and_then(|o| o.as_dict().ok())
        .cloned()
        .unwrap_or_else(Dictionary::new);
    let mut font_dict = resources
        .get(b"Font")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok())
        .cloned()
        .unwrap_or_else(Dictionary::new);
    for (key, base_font) in fonts {
        let id = doc.add_object(Object::Dictionary(fonts::standard_font_dictionary(base_font)));
        font_dict.set(key.clone(), Object::Reference(id));
    }
    resources.set("Font", Object::Dictionary(font_dict));
    let page = doc
        .get_object_mut(page_id)
        .and_then(|obj| obj.as_dict_mut())
        .map_err(|err| DocumentError::Write(err.to_string()))?;
    page.set("Resources", Object::Dictionary(resources));
    Ok(())
}
