//! Font attribute resolution for matched regions.

use serde::Serialize;

use crate::document::Span;
use crate::geometry::Rect;

pub const DEFAULT_FONT: &str = "Helvetica";

const NEARBY_DX: f32 = 20.0;
const NEARBY_DY: f32 = 50.0;
const MIN_SIZE: f32 = 6.0;
const MAX_SIZE: f32 = 72.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FontSource {
    Overlap,
    Nearby,
    Estimated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedFont {
    pub name: String,
    pub size: f32,
    pub source: FontSource,
}

impl ResolvedFont {
    pub fn is_estimate(&self) -> bool {
        self.source == FontSource::Estimated
    }
}

/// Picks the font for `region` from the page's spans: the span overlapping it
/// most, else the nearest span close to its center, else an estimate from the
/// region height. Ties go to the earliest span.
pub fn resolve_font(spans: &[Span], region: &Rect) -> ResolvedFont {
    let mut best: Option<(&Span, f32)> = None;
    for span in spans {
        let overlap = span.bbox.overlap_area(region);
        if overlap > 0.0 && best.is_none_or(|(_, area)| overlap > area) {
            best = Some((span, overlap));
        }
    }
    if let Some((span, _)) = best {
        return from_span(span, FontSource::Overlap);
    }

    let center = region.center();
    let mut nearest: Option<(&Span, f32)> = None;
    for span in spans {
        let other = span.bbox.center();
        let dx = other.x - center.x;
        let dy = other.y - center.y;
        if dx.abs() >= NEARBY_DX || dy.abs() >= NEARBY_DY {
            continue;
        }
        let distance = dx.hypot(dy);
        if nearest.is_none_or(|(_, d)| distance < d) {
            nearest = Some((span, distance));
        }
    }
    if let Some((span, _)) = nearest {
        return from_span(span, FontSource::Nearby);
    }

    let size = (region.height() * 0.75).clamp(MIN_SIZE, MAX_SIZE);
    ResolvedFont {
        name: DEFAULT_FONT.to_string(),
        size: (size * 2.0).round() / 2.0,
        source: FontSource::Estimated,
    }
}

fn from_span(span: &Span, source: FontSource) -> ResolvedFont {
    ResolvedFont {
        name: span.font_name.clone(),
        size: span.font_size,
        source,
    }
}

/// Maps an embedded or system font name onto one of the 14 standard PDF fonts.
pub fn standard_font_for(name: &str) -> &'static str {
    let base = strip_subset_prefix(name).to_ascii_lowercase();
    let bold = ["bold", "black", "heavy", "demi"]
        .iter()
        .any(|marker| base.contains(marker));
    let italic = base.contains("italic") || base.contains("oblique");

    if base.contains("symbol") {
        return "Symbol";
    }
    if base.contains("dingbat") {
        return "ZapfDingbats";
    }
    let mono = ["courier", "mono", "consol", "typewriter"]
        .iter()
        .any(|marker| base.contains(marker));
    let serif = !base.contains("sans")
        && ["times", "serif", "roman", "georgia", "garamond", "cambria", "minion"]
            .iter()
            .any(|marker| base.contains(marker));

    match (mono, serif, bold, italic) {
        (true, _, false, false) => "Courier",
        (true, _, true, false) => "Courier-Bold",
        (true, _, false, true) => "Courier-Oblique",
        (true, _, true, true) => "Courier-BoldOblique",
        (false, true, false, false) => "Times-Roman",
        (false, true, true, false) => "Times-Bold",
        (false, true, false, true) => "Times-Italic",
        (false, true, true, true) => "Times-BoldItalic",
        (false, false, false, false) => "Helvetica",
        (false, false, true, false) => "Helvetica-Bold",
        (false, false, false, true) => "Helvetica-Oblique",
        (false, false, true, true) => "Helvetica-BoldOblique",
    }
}

/// Drops the `ABCDEF+` tag PDF producers put in front of subset fonts.
fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.chars().all(|c| c.is_ascii_uppercase()) => {
            rest
        }
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(name: &str, size: f32, bbox: Rect) -> Span {
        Span {
            text: "x".to_string(),
            bbox,
            font_name: name.to_string(),
            font_size: size,
        }
    }

    #[test]
    fn overlap_wins_and_ties_go_to_earliest() {
        let region = Rect::new(100.0, 100.0, 150.0, 112.0);
        let spans = vec![
            span("Near", 9.0, Rect::new(160.0, 100.0, 170.0, 112.0)),
            span("First", 11.0, Rect::new(90.0, 100.0, 110.0, 112.0)),
            span("Second", 12.0, Rect::new(140.0, 100.0, 160.0, 112.0)),
        ];
        let font = resolve_font(&spans, &region);
        assert_eq!(font.name, "First");
        assert_eq!(font.source, FontSource::Overlap);
    }

    #[test]
    fn nearby_span_used_without_overlap() {
        let region = Rect::new(100.0, 100.0, 120.0, 110.0);
        let spans = vec![
            span("Far", 8.0, Rect::new(400.0, 100.0, 420.0, 110.0)),
            span("Below", 10.0, Rect::new(100.0, 70.0, 120.0, 80.0)),
        ];
        let font = resolve_font(&spans, &region);
        assert_eq!(font.name, "Below");
        assert_eq!(font.size, 10.0);
        assert_eq!(font.source, FontSource::Nearby);
    }

    #[test]
    fn repeated_resolution_gives_the_same_font() {
        let region = Rect::new(100.0, 100.0, 120.0, 110.0);
        // equidistant left and right of the region
        let spans = vec![
            span("Left", 9.0, Rect::new(92.0, 100.0, 98.0, 110.0)),
            span("Right", 14.0, Rect::new(122.0, 100.0, 128.0, 110.0)),
        ];
        let first = resolve_font(&spans, &region);
        for _ in 0..10 {
            assert_eq!(resolve_font(&spans, &region), first);
        }
        assert_eq!(first.name, "Left");
        assert_eq!(first.source, FontSource::Nearby);

        let overlapping = vec![
            span("A", 10.0, Rect::new(100.0, 100.0, 110.0, 110.0)),
            span("B", 12.0, Rect::new(110.0, 100.0, 120.0, 110.0)),
        ];
        let tied = resolve_font(&overlapping, &region);
        assert_eq!(resolve_font(&overlapping, &region), tied);
        assert_eq!(tied.name, "A");
    }

    #[test]
    fn estimate_from_height_is_clamped_and_rounded() {
        let font = resolve_font(&[], &Rect::new(0.0, 0.0, 50.0, 15.0));
        assert_eq!(font.name, DEFAULT_FONT);
        assert_eq!(font.size, 11.5);
        assert!(font.is_estimate());

        let tiny = resolve_font(&[], &Rect::new(0.0, 0.0, 50.0, 2.0));
        assert_eq!(tiny.size, 6.0);
        let huge = resolve_font(&[], &Rect::new(0.0, 0.0, 50.0, 400.0));
        assert_eq!(huge.size, 72.0);
    }

    #[test]
    fn standard_equivalents() {
        assert_eq!(standard_font_for("ABCDEF+Arial-BoldMT"), "Helvetica-Bold");
        assert_eq!(standard_font_for("TimesNewRomanPS-ItalicMT"), "Times-Italic");
        assert_eq!(standard_font_for("CourierNewPSMT"), "Courier");
        assert_eq!(standard_font_for("DejaVuSans-Oblique"), "Helvetica-Oblique");
        assert_eq!(standard_font_for("NotoSerif-BoldItalic"), "Times-BoldItalic");
        assert_eq!(standard_font_for("Helvetica"), "Helvetica");
    }
}
