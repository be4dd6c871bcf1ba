use std::collections::HashMap;

use lopdf::Object;
use lopdf::content::Operation;

use super::fonts::{FontInfo, number};
use crate::document::layout::{GlyphRun, PlacedGlyph};
use crate::geometry::Rect;

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn multiply(m1: &Matrix, m2: &Matrix) -> Matrix {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

fn translate(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

fn apply(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

/// Where a glyph lives in the content stream: operation index, operand
/// element (array index for `TJ`, 0 otherwise) and code index in that string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) struct GlyphSource {
    pub op: usize,
    pub element: usize,
    pub code: usize,
}

/// Text state in effect when a show operation ran.
#[derive(Debug, Clone, Default)]
pub(super) struct ShowState {
    pub font_key: Vec<u8>,
    pub font_size: f32,
    pub char_spacing: f32,
    pub word_spacing: f32,
}

#[derive(Debug, Default)]
pub(super) struct Extraction {
    pub runs: Vec<GlyphRun>,
    pub sources: Vec<GlyphSource>,
    pub states: HashMap<usize, ShowState>,
}

#[derive(Debug, Clone)]
struct TextParams {
    font_key: Vec<u8>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    scale: f32,
    leading: f32,
    rise: f32,
}

impl Default for TextParams {
    fn default() -> Self {
        Self {
            font_key: Vec::new(),
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

struct Interpreter<'a> {
    fonts: &'a HashMap<Vec<u8>, FontInfo>,
    origin: (f32, f32),
    ctm: Matrix,
    tm: Matrix,
    tlm: Matrix,
    params: TextParams,
    stack: Vec<(Matrix, TextParams)>,
    out: Extraction,
    fallback: FontInfo,
}

/// Walks a page's operations and records every shown glyph with its box in
/// page space (relative to the MediaBox origin).
pub(super) fn interpret(
    ops: &[Operation],
    fonts: &HashMap<Vec<u8>, FontInfo>,
    origin: (f32, f32),
) -> Extraction {
    let mut interp = Interpreter {
        fonts,
        origin,
        ctm: IDENTITY,
        tm: IDENTITY,
        tlm: IDENTITY,
        params: TextParams::default(),
        stack: Vec::new(),
        out: Extraction::default(),
        fallback: FontInfo::standard("Helvetica"),
    };
    for (idx, op) in ops.iter().enumerate() {
        interp.step(idx, op);
    }
    interp.out
}

fn operand(op: &Operation, idx: usize) -> Option<f32> {
    op.operands.get(idx).and_then(number)
}

impl Interpreter<'_> {
    fn step(&mut self, idx: usize, op: &Operation) {
        match op.operator.as_str() {
            "q" => self.stack.push((self.ctm, self.params.clone())),
            "Q" => {
                if let Some((ctm, params)) = self.stack.pop() {
                    self.ctm = ctm;
                    self.params = params;
                }
            }
            "cm" => {
                if let Some(m) = matrix_operands(op) {
                    self.ctm = multiply(&m, &self.ctm);
                }
            }
            "BT" => {
                self.tm = IDENTITY;
                self.tlm = IDENTITY;
            }
            "Tf" => {
                if let Some(Object::Name(key)) = op.operands.first() {
                    self.params.font_key = key.clone();
                }
                if let Some(size) = operand(op, 1) {
                    self.params.font_size = size;
                }
            }
            "Tc" => self.params.char_spacing = operand(op, 0).unwrap_or(0.0),
            "Tw" => self.params.word_spacing = operand(op, 0).unwrap_or(0.0),
            "Tz" => self.params.scale = operand(op, 0).unwrap_or(100.0) / 100.0,
            "TL" => self.params.leading = operand(op, 0).unwrap_or(0.0),
            "Ts" => self.params.rise = operand(op, 0).unwrap_or(0.0),
            "Td" => {
                let tx = operand(op, 0).unwrap_or(0.0);
                let ty = operand(op, 1).unwrap_or(0.0);
                self.move_line(tx, ty);
            }
            "TD" => {
                let tx = operand(op, 0).unwrap_or(0.0);
                let ty = operand(op, 1).unwrap_or(0.0);
                self.params.leading = -ty;
                self.move_line(tx, ty);
            }
            "Tm" => {
                if let Some(m) = matrix_operands(op) {
                    self.tm = m;
                    self.tlm = m;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    let mut run = self.begin_run(idx);
                    self.show(idx, 0, bytes, &mut run);
                    self.finish_run(run);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    let mut run = self.begin_run(idx);
                    for (element, item) in items.iter().enumerate() {
                        match item {
                            Object::String(bytes, _) => self.show(idx, element, bytes, &mut run),
                            other => {
                                if let Some(adjust) = number(other) {
                                    let tx = -adjust / 1000.0
                                        * self.params.font_size
                                        * self.params.scale;
                                    self.tm = multiply(&translate(tx, 0.0), &self.tm);
                                }
                            }
                        }
                    }
                    self.finish_run(run);
                }
            }
            "'" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    let mut run = self.begin_run(idx);
                    self.show(idx, 0, bytes, &mut run);
                    self.finish_run(run);
                }
            }
            "\"" => {
                self.params.word_spacing = operand(op, 0).unwrap_or(0.0);
                self.params.char_spacing = operand(op, 1).unwrap_or(0.0);
                self.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                    let mut run = self.begin_run(idx);
                    self.show(idx, 0, bytes, &mut run);
                    self.finish_run(run);
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = multiply(&translate(tx, ty), &self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.params.leading);
    }

    fn font(&self) -> &FontInfo {
        self.fonts
            .get(&self.params.font_key)
            .unwrap_or(&self.fallback)
    }

    fn effective_size(&self) -> f32 {
        let trm = multiply(&self.tm, &self.ctm);
        (self.params.font_size * (trm[2] * trm[2] + trm[3] * trm[3]).sqrt()).abs()
    }

    fn begin_run(&mut self, idx: usize) -> GlyphRun {
        self.out.states.insert(
            idx,
            ShowState {
                font_key: self.params.font_key.clone(),
                font_size: self.params.font_size,
                char_spacing: self.params.char_spacing,
                word_spacing: self.params.word_spacing,
            },
        );
        let trm = multiply(&self.tm, &self.ctm);
        let (_, baseline) = apply(&trm, 0.0, self.params.rise);
        GlyphRun {
            font_name: self.font().base_font.clone(),
            font_size: self.effective_size(),
            baseline: baseline - self.origin.1,
            glyphs: Vec::new(),
        }
    }

    fn finish_run(&mut self, run: GlyphRun) {
        self.out.runs.push(run);
    }

    fn show(&mut self, op: usize, element: usize, bytes: &[u8], run: &mut GlyphRun) {
        let font = self.font().clone();
        let size = self.effective_size();
        let fs = self.params.font_size;
        for (code_idx, code) in font.codes(bytes).into_iter().enumerate() {
            let w0 = font.width(code);
            let trm = multiply(&self.tm, &self.ctm);
            let visible = w0 / 1000.0 * fs * self.params.scale;
            let (x0, y0) = apply(&trm, 0.0, self.params.rise);
            let (x1, _) = apply(&trm, visible, self.params.rise);
            let x0 = x0 - self.origin.0;
            let x1 = x1 - self.origin.0;
            let baseline = y0 - self.origin.1;
            run.glyphs.push(PlacedGlyph {
                ch: font.decode(code),
                bbox: Rect::new(x0, baseline - size * 0.2, x1, baseline + size * 0.8),
            });
            self.out.sources.push(GlyphSource {
                op,
                element,
                code: code_idx,
            });

            let word = if code == 32 && !font.two_byte {
                self.params.word_spacing
            } else {
                0.0
            };
            let advance =
                (w0 / 1000.0 * fs + self.params.char_spacing + word) * self.params.scale;
            self.tm = multiply(&translate(advance, 0.0), &self.tm);
        }
    }
}

fn matrix_operands(op: &Operation) -> Option<Matrix> {
    if op.operands.len() < 6 {
        return None;
    }
    let mut m = [0.0; 6];
    for (idx, slot) in m.iter_mut().enumerate() {
        *slot = operand(op, idx)?;
    }
    Some(m)
}
