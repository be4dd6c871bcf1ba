use crate::ocr::{BBoxPx, OcrToken, TextSection};

use super::geom::{top_distance, union_bbox};

#[derive(Debug, Clone, Copy)]
pub struct SegmentOptions {
    /// Tokens at or below this confidence are dropped.
    pub min_confidence: f32,
    /// Maximum difference between token top and section top, in pixels (exclusive).
    pub line_threshold: f32,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            min_confidence: 30.0,
            line_threshold: 10.0,
        }
    }
}

struct Pending {
    text: String,
    bbox: BBoxPx,
    page: usize,
}

/// Groups tokens, in the engine's scan order, into line-level sections.
///
/// Section ids are numbered across the whole input, so a multi-page document
/// yields `section_0..section_n` without restarting per page.
pub fn segment_tokens(tokens: &[OcrToken], options: SegmentOptions) -> Vec<TextSection> {
    let mut sections = Vec::new();
    let mut current: Option<Pending> = None;

    for token in tokens {
        let text = token.text.trim();
        if text.is_empty() || token.conf <= options.min_confidence {
            continue;
        }
        match current.as_mut() {
            Some(pending)
                if pending.page == token.page
                    && top_distance(&pending.bbox, &token.bbox) < options.line_threshold =>
            {
                pending.text.push(' ');
                pending.text.push_str(text);
                pending.bbox = union_bbox(&pending.bbox, &token.bbox);
            }
            _ => {
                if let Some(done) = current.take() {
                    flush(&mut sections, done);
                }
                current = Some(Pending {
                    text: text.to_string(),
                    bbox: token.bbox,
                    page: token.page,
                });
            }
        }
    }
    if let Some(done) = current.take() {
        flush(&mut sections, done);
    }
    sections
}

fn flush(sections: &mut Vec<TextSection>, pending: Pending) {
    let id = format!("section_{}", sections.len());
    sections.push(TextSection {
        id,
        text: pending.text,
        x: pending.bbox.x,
        y: pending.bbox.y,
        width: pending.bbox.w,
        height: pending.bbox.h,
        page: pending.page,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str, x: u32, y: u32, w: u32, h: u32, conf: f32, page: usize) -> OcrToken {
        OcrToken {
            text: text.to_string(),
            bbox: BBoxPx { x, y, w, h },
            conf,
            page,
        }
    }

    #[test]
    fn tokens_on_same_line_merge_with_union_box() {
        let tokens = vec![
            token("Invoice", 100, 100, 80, 20, 95.0, 0),
            token("#1234", 190, 104, 60, 22, 90.0, 0),
        ];
        let sections = segment_tokens(&tokens, SegmentOptions::default());
        assert_eq!(sections.len(), 1);
        let section = &sections[0];
        assert_eq!(section.id, "section_0");
        assert_eq!(section.text, "Invoice #1234");
        assert_eq!(section.bbox(), BBoxPx { x: 100, y: 100, w: 150, h: 26 });
    }

    #[test]
    fn distant_token_starts_new_section_and_trailing_is_flushed() {
        let tokens = vec![
            token("Total", 50, 100, 40, 20, 80.0, 0),
            token("Due", 50, 110, 30, 20, 80.0, 0),
            token("42", 60, 300, 20, 20, 80.0, 0),
        ];
        let sections = segment_tokens(&tokens, SegmentOptions::default());
        let texts: Vec<_> = sections.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Total", "Due", "42"]);
        assert_eq!(sections[2].id, "section_2");
    }

    #[test]
    fn low_confidence_and_blank_tokens_are_dropped() {
        let tokens = vec![
            token("noise", 0, 0, 10, 10, 30.0, 0),
            token("  ", 0, 0, 10, 10, 99.0, 0),
            token("kept", 0, 2, 10, 10, 31.0, 0),
        ];
        let sections = segment_tokens(&tokens, SegmentOptions::default());
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].text, "kept");
    }

    #[test]
    fn page_change_flushes_even_when_tops_align() {
        let tokens = vec![
            token("first", 10, 50, 30, 10, 90.0, 0),
            token("second", 10, 50, 30, 10, 90.0, 1),
        ];
        let sections = segment_tokens(&tokens, SegmentOptions::default());
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].page, 1);
        assert_eq!(sections[1].id, "section_1");
    }

    #[test]
    fn sections_render_as_stable_listing() {
        let tokens = vec![
            token("SERIAL001", 120, 80, 140, 24, 96.0, 0),
            token("Date:", 120, 140, 60, 24, 91.0, 0),
            token("2024-01-01", 190, 142, 120, 24, 88.0, 0),
        ];
        let listing = segment_tokens(&tokens, SegmentOptions::default())
            .iter()
            .map(|s| format!("{} p{} {}x{}+{}+{} {}", s.id, s.page, s.width, s.height, s.x, s.y, s.text))
            .collect::<Vec<_>>()
            .join("\n");
        insta::assert_snapshot!(listing, @r"
        section_0 p0 140x24+120+80 SERIAL001
        section_1 p0 190x26+120+140 Date: 2024-01-01
        ");
    }
}
