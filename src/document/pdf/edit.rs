use std::collections::{HashMap, HashSet};

use lopdf::content::Operation;
use lopdf::{Object, StringFormat};

use super::fonts::{FontInfo, number};
use super::text::ShowState;

/// Codes to drop from one show operation, as `(element, code)` pairs.
pub(super) type Removals = HashSet<(usize, usize)>;

/// Rewrites show operations so the listed glyphs are no longer painted.
///
/// Every affected operation becomes a `TJ` whose kerning entries advance the
/// text position exactly as the removed glyphs would have, so the remaining
/// glyphs keep their positions.
pub(super) fn remove_glyphs(
    ops: &[Operation],
    removed: &HashMap<usize, Removals>,
    states: &HashMap<usize, ShowState>,
    fonts: &HashMap<Vec<u8>, FontInfo>,
) -> Vec<Operation> {
    let fallback = FontInfo::standard("Helvetica");
    let mut out = Vec::with_capacity(ops.len() + removed.len() * 3);
    for (idx, op) in ops.iter().enumerate() {
        let (Some(codes), Some(state)) = (removed.get(&idx), states.get(&idx)) else {
            out.push(op.clone());
            continue;
        };
        let font = fonts.get(&state.font_key).unwrap_or(&fallback);
        let splitter = Splitter {
            codes,
            state,
            font,
        };
        match op.operator.as_str() {
            "Tj" => {
                if let Some(Object::String(bytes, format)) = op.operands.first() {
                    out.push(show_array(splitter.split(0, bytes, format.clone())));
                } else {
                    out.push(op.clone());
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    let mut elements = Vec::with_capacity(items.len());
                    for (element, item) in items.iter().enumerate() {
                        match item {
                            Object::String(bytes, format) => {
                                for part in splitter.split(element, bytes, format.clone()) {
                                    push_element(&mut elements, part);
                                }
                            }
                            other => push_element(&mut elements, other.clone()),
                        }
                    }
                    out.push(show_array(elements));
                } else {
                    out.push(op.clone());
                }
            }
            "'" => {
                if let Some(Object::String(bytes, format)) = op.operands.first() {
                    out.push(Operation::new("T*", vec![]));
                    out.push(show_array(splitter.split(0, bytes, format.clone())));
                } else {
                    out.push(op.clone());
                }
            }
            "\"" => {
                if let (Some(aw), Some(ac), Some(Object::String(bytes, format))) = (
                    op.operands.first(),
                    op.operands.get(1),
                    op.operands.get(2),
                ) {
                    out.push(Operation::new("Tw", vec![aw.clone()]));
                    out.push(Operation::new("Tc", vec![ac.clone()]));
                    out.push(Operation::new("T*", vec![]));
                    out.push(show_array(splitter.split(0, bytes, format.clone())));
                } else {
                    out.push(op.clone());
                }
            }
            _ => out.push(op.clone()),
        }
    }
    out
}

struct Splitter<'a> {
    codes: &'a Removals,
    state: &'a ShowState,
    font: &'a FontInfo,
}

impl Splitter<'_> {
    fn split(&self, element: usize, bytes: &[u8], format: StringFormat) -> Vec<Object> {
        let mut parts = Vec::new();
        let mut kept = Vec::new();
        for (code_idx, code) in self.font.codes(bytes).into_iter().enumerate() {
            if !self.codes.contains(&(element, code_idx)) {
                kept.extend(self.font.code_bytes(code));
                continue;
            }
            if !kept.is_empty() {
                parts.push(Object::String(std::mem::take(&mut kept), format.clone()));
            }
            parts.push(Object::Real(self.compensation(code).into()));
        }
        if !kept.is_empty() {
            parts.push(Object::String(kept, format));
        }
        parts
    }

    /// `TJ` adjustment that moves the text position by the removed glyph's advance.
    fn compensation(&self, code: u32) -> f32 {
        let w0 = self.font.width(code);
        let word = if code == 32 && !self.font.two_byte {
            self.state.word_spacing
        } else {
            0.0
        };
        let fs = self.state.font_size;
        if fs == 0.0 {
            return -w0;
        }
        -(w0 + (self.state.char_spacing + word) * 1000.0 / fs)
    }
}

fn push_element(elements: &mut Vec<Object>, next: Object) {
    if let (Some(add), Some(last)) = (number(&next), elements.last_mut()) {
        if let Some(prev) = number(last) {
            *last = Object::Real((prev + add).into());
            return;
        }
    }
    elements.push(next);
}

fn show_array(elements: Vec<Object>) -> Operation {
    Operation::new("TJ", vec![Object::Array(elements)])
}
