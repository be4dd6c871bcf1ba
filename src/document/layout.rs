use crate::document::{LayoutLine, Span};
use crate::geometry::Rect;

/// Fraction of the font size a horizontal gap must exceed before a space is
/// inserted between two runs on one line.
const SPACE_GAP: f32 = 0.15;
/// Fraction of the font size within which two baselines count as one line.
const BASELINE_TOLERANCE: f32 = 0.5;

#[derive(Debug, Clone)]
pub(crate) struct PlacedGlyph {
    pub ch: char,
    pub bbox: Rect,
}

/// A run of glyphs drawn with one font, as produced by a backend.
#[derive(Debug, Clone)]
pub(crate) struct GlyphRun {
    pub font_name: String,
    pub font_size: f32,
    pub baseline: f32,
    pub glyphs: Vec<PlacedGlyph>,
}

impl GlyphRun {
    fn bbox(&self) -> Option<Rect> {
        self.glyphs
            .iter()
            .map(|g| g.bbox)
            .reduce(|acc, next| acc.union(&next))
    }
}

#[derive(Debug, Clone)]
struct Line {
    bbox: Rect,
    /// char range of this line inside `TextLayout::chars`
    start: usize,
    end: usize,
}

/// Reading-order view over a page's glyph runs.
///
/// Glyphs are addressed by their position in the flattened run order, so a
/// backend can keep a parallel table of where each glyph came from.
#[derive(Debug, Clone, Default)]
pub(crate) struct TextLayout {
    runs: Vec<GlyphRun>,
    offsets: Vec<usize>,
    lines: Vec<Line>,
    chars: Vec<char>,
    /// glyph index for every char in `chars`; `None` for synthesized separators
    char_glyph: Vec<Option<usize>>,
}

impl TextLayout {
    pub fn build(runs: Vec<GlyphRun>) -> Self {
        let mut offsets = Vec::with_capacity(runs.len());
        let mut total = 0;
        for run in &runs {
            offsets.push(total);
            total += run.glyphs.len();
        }

        let mut order: Vec<usize> = (0..runs.len())
            .filter(|&idx| !runs[idx].glyphs.is_empty())
            .collect();
        order.sort_by(|&a, &b| {
            runs[b]
                .baseline
                .total_cmp(&runs[a].baseline)
                .then_with(|| first_x(&runs[a]).total_cmp(&first_x(&runs[b])))
        });

        let mut grouped: Vec<(f32, f32, Vec<usize>)> = Vec::new();
        for idx in order {
            let run = &runs[idx];
            let joins = grouped.last().is_some_and(|(baseline, size, _)| {
                let tolerance = (size.min(run.font_size) * BASELINE_TOLERANCE).max(1.0);
                (baseline - run.baseline).abs() <= tolerance
            });
            if joins {
                if let Some((_, _, members)) = grouped.last_mut() {
                    members.push(idx);
                }
            } else {
                grouped.push((run.baseline, run.font_size, vec![idx]));
            }
        }

        let mut layout = TextLayout {
            runs,
            offsets,
            ..Default::default()
        };
        for (_, _, mut members) in grouped {
            members.sort_by(|&a, &b| first_x(&layout.runs[a]).total_cmp(&first_x(&layout.runs[b])));
            layout.push_line(&members);
        }
        layout
    }

    fn push_line(&mut self, members: &[usize]) {
        if !self.lines.is_empty() {
            self.chars.push('\n');
            self.char_glyph.push(None);
        }
        let start = self.chars.len();
        let mut bbox: Option<Rect> = None;
        let mut prev_right: Option<f32> = None;

        for &run_idx in members {
            let run = &self.runs[run_idx];
            let Some(run_box) = run.bbox() else { continue };
            if let Some(right) = prev_right {
                let gap = run_box.x0 - right;
                let last_is_space = self.chars.last().is_some_and(|c| *c == ' ');
                let first_is_space = run.glyphs.first().is_some_and(|g| g.ch.is_whitespace());
                if gap > run.font_size * SPACE_GAP && !last_is_space && !first_is_space {
                    self.chars.push(' ');
                    self.char_glyph.push(None);
                }
            }
            for (offset, glyph) in run.glyphs.iter().enumerate() {
                let ch = if glyph.ch.is_whitespace() { ' ' } else { glyph.ch };
                let at_line_start = self.chars.len() == start;
                if ch == ' ' && (at_line_start || self.chars.last() == Some(&' ')) {
                    continue;
                }
                self.chars.push(ch);
                self.char_glyph.push(Some(self.offsets[run_idx] + offset));
            }
            prev_right = Some(run_box.x1);
            bbox = Some(match bbox {
                Some(acc) => acc.union(&run_box),
                None => run_box,
            });
        }

        while self.chars.len() > start && self.chars.last() == Some(&' ') {
            self.chars.pop();
            self.char_glyph.pop();
        }

        self.lines.push(Line {
            bbox: bbox.unwrap_or_default(),
            start,
            end: self.chars.len(),
        });
    }

    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn spans(&self) -> Vec<Span> {
        self.runs
            .iter()
            .filter_map(|run| {
                let text: String = run.glyphs.iter().map(|g| g.ch).collect();
                if text.trim().is_empty() {
                    return None;
                }
                Some(Span {
                    text,
                    bbox: run.bbox()?,
                    font_name: run.font_name.clone(),
                    font_size: run.font_size,
                })
            })
            .collect()
    }

    pub fn lines(&self) -> Vec<LayoutLine> {
        self.lines
            .iter()
            .filter(|line| line.end > line.start)
            .map(|line| LayoutLine {
                text: self.chars[line.start..line.end].iter().collect(),
                bbox: line.bbox,
            })
            .collect()
    }

    /// Non-overlapping occurrences of `needle`, one rect per line touched.
    pub fn search(&self, needle: &str) -> Vec<Rect> {
        let needle: Vec<char> = needle.chars().collect();
        if needle.is_empty() || needle.len() > self.chars.len() {
            return Vec::new();
        }
        let mut rects = Vec::new();
        let mut pos = 0;
        while pos + needle.len() <= self.chars.len() {
            if self.chars[pos..pos + needle.len()] == needle[..] {
                rects.extend(self.match_rects(pos, pos + needle.len()));
                pos += needle.len();
            } else {
                pos += 1;
            }
        }
        rects
    }

    fn match_rects(&self, start: usize, end: usize) -> Vec<Rect> {
        let mut per_line: Vec<Rect> = Vec::new();
        let mut current_line: Option<usize> = None;
        for idx in start..end {
            let Some(glyph_idx) = self.char_glyph[idx] else { continue };
            let Some(bbox) = self.glyph_bbox(glyph_idx) else { continue };
            let line = self
                .lines
                .iter()
                .position(|line| idx >= line.start && idx < line.end);
            if line == current_line {
                if let Some(last) = per_line.last_mut() {
                    *last = last.union(&bbox);
                    continue;
                }
            }
            current_line = line;
            per_line.push(bbox);
        }
        per_line
    }

    fn glyph_bbox(&self, glyph_idx: usize) -> Option<Rect> {
        let run_idx = match self.offsets.binary_search(&glyph_idx) {
            Ok(mut idx) => {
                // skip empty runs sharing the same offset
                while idx + 1 < self.offsets.len() && self.offsets[idx + 1] == glyph_idx {
                    idx += 1;
                }
                idx
            }
            Err(idx) => idx.checked_sub(1)?,
        };
        let run = self.runs.get(run_idx)?;
        run.glyphs
            .get(glyph_idx - self.offsets[run_idx])
            .map(|g| g.bbox)
    }

    /// Flattened indices of glyphs whose center lies inside `rect`.
    pub fn glyphs_within(&self, rect: &Rect) -> Vec<usize> {
        let mut hits = Vec::new();
        for (run_idx, run) in self.runs.iter().enumerate() {
            for (offset, glyph) in run.glyphs.iter().enumerate() {
                if rect.contains(glyph.bbox.center()) {
                    hits.push(self.offsets[run_idx] + offset);
                }
            }
        }
        hits
    }

    #[cfg(test)]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

fn first_x(run: &GlyphRun) -> f32 {
    run.glyphs.first().map(|g| g.bbox.x0).unwrap_or(0.0)
}
