//! Erase-and-insert of one rule's value over its located regions.

use crate::document::{DocumentError, FontSpec, PageSurface, Rgb};
use crate::font::{ResolvedFont, resolve_font, standard_font_for};
use crate::geometry::Point;
use crate::locate::MatchRegion;
use crate::report::{Diagnostic, DiagnosticKind};

/// Baseline offset above the region bottom, as a fraction of the font size.
const BASELINE_RATIO: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Erase,
    Verify,
    FallbackCover,
    Insert,
    VerifyInsert,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::Erase => "erase",
            Stage::Verify => "verify",
            Stage::FallbackCover => "fallback_cover",
            Stage::Insert => "insert",
            Stage::VerifyInsert => "verify_insert",
        }
    }
}

/// What is being replaced, for diagnostics.
pub struct Replacement<'a> {
    pub rule: usize,
    pub original: &'a str,
    pub value: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceResult {
    pub covered: bool,
    /// Font actually used for the inserted text.
    pub font: Option<FontSpec>,
}

impl InstanceResult {
    pub fn inserted(&self) -> bool {
        self.font.is_some()
    }
}

/// Replaces `replacement.original` by its value in every region.
///
/// Every region is erased (and covered where erasing did not take) before
/// any value is inserted, so a value wider than the text it replaces is
/// never clipped by the erasure of a neighbouring instance. Fonts are
/// resolved from the page as it was before any region was erased.
/// Problems with one region are recorded in `diagnostics` and do not stop
/// the others.
pub fn replace_regions(
    page: &mut dyn PageSurface,
    replacement: &Replacement<'_>,
    regions: &[MatchRegion],
    default_font: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<InstanceResult> {
    let spans = page.extract_layout();
    let fonts: Vec<ResolvedFont> = regions
        .iter()
        .map(|region| resolve_font(&spans, &region.rect))
        .collect();

    let mut ctx = Pass {
        page,
        replacement,
        diagnostics,
    };
    for region in regions {
        ctx.erase(region);
    }
    let covered: Vec<bool> = regions.iter().map(|region| ctx.verify(region)).collect();

    regions
        .iter()
        .zip(fonts)
        .zip(covered)
        .map(|((region, font), covered)| InstanceResult {
            covered,
            font: ctx.insert(region, &font, default_font),
        })
        .collect()
}

struct Pass<'p, 'r> {
    page: &'p mut dyn PageSurface,
    replacement: &'r Replacement<'r>,
    diagnostics: &'p mut Vec<Diagnostic>,
}

impl Pass<'_, '_> {
    fn erase(&mut self, region: &MatchRegion) {
        if let Err(err) = self.page.erase(&region.rect) {
            self.fail(region, DiagnosticKind::EraseVerificationMismatch, Stage::Erase, &err);
        }
    }

    /// Covers the region when the original still shows through. Returns
    /// whether a cover was painted.
    fn verify(&mut self, region: &MatchRegion) -> bool {
        let rect = region.rect;
        let still_present = self
            .page
            .search_literal(self.replacement.original)
            .iter()
            .any(|found| found.overlap_area(&rect) > 0.0);
        if !still_present {
            return false;
        }
        self.note(
            region,
            DiagnosticKind::EraseVerificationMismatch,
            format!("original text still present after {}", Stage::Erase.as_str()),
        );
        match self.page.paint_opaque(&rect) {
            Ok(()) => true,
            Err(err) => {
                self.fail(
                    region,
                    DiagnosticKind::EraseVerificationMismatch,
                    Stage::FallbackCover,
                    &err,
                );
                false
            }
        }
    }

    /// Draws the value over the region. Returns the font it was drawn with.
    fn insert(
        &mut self,
        region: &MatchRegion,
        font: &ResolvedFont,
        default_font: &str,
    ) -> Option<FontSpec> {
        let rect = region.rect;
        if font.is_estimate() {
            self.note(
                region,
                DiagnosticKind::FontResolutionFallback,
                format!(
                    "no span near region, estimated {} {}pt",
                    font.name, font.size
                ),
            );
        }

        let origin = Point {
            x: rect.x0,
            y: rect.y0 + font.size * BASELINE_RATIO,
        };
        let mut inserted = None;
        let mut last_error = None;
        for (attempt, name) in insertion_fonts(&font.name, default_font)
            .into_iter()
            .enumerate()
        {
            let spec = FontSpec {
                name,
                size: font.size,
            };
            match self
                .page
                .insert_text(origin, self.replacement.value, &spec, Rgb::BLACK)
            {
                Ok(()) => {
                    if attempt > 0 {
                        self.note(
                            region,
                            DiagnosticKind::FontResolutionFallback,
                            format!("inserted with {} instead of {}", spec.name, font.name),
                        );
                    }
                    inserted = Some(spec);
                    break;
                }
                Err(err) => {
                    tracing::debug!(font = %spec.name, error = %err, "insertion attempt failed");
                    last_error = Some(err);
                }
            }
        }
        if inserted.is_none() {
            let detail = last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "no font available".to_string());
            self.note(
                region,
                DiagnosticKind::InsertionFailure,
                format!("{} failed: {}", Stage::Insert.as_str(), detail),
            );
            return None;
        }

        if !self.page.extract_text().contains(self.replacement.value) {
            self.note(
                region,
                DiagnosticKind::InsertVerificationMismatch,
                format!(
                    "{}: inserted value not found in page text",
                    Stage::VerifyInsert.as_str()
                ),
            );
        }
        inserted
    }

    fn fail(
        &mut self,
        region: &MatchRegion,
        kind: DiagnosticKind,
        stage: Stage,
        err: &DocumentError,
    ) {
        self.note(region, kind, format!("{} failed: {}", stage.as_str(), err));
    }

    fn note(&mut self, region: &MatchRegion, kind: DiagnosticKind, message: String) {
        self.diagnostics.push(Diagnostic::new(
            kind,
            self.replacement.rule,
            self.replacement.original,
            Some(region.page),
            message,
        ));
    }
}

/// Resolved font, then its standard equivalent, then the default font.
fn insertion_fonts(resolved: &str, default_font: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(3);
    for name in [resolved, standard_font_for(resolved), default_font] {
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{LayoutLine, LayoutPage, Span};
    use crate::geometry::Rect;
    use crate::locate::{Confidence, Strategy};

    fn region(rect: Rect) -> MatchRegion {
        MatchRegion {
            rect,
            page: 0,
            strategy: Strategy::Exact,
            confidence: Confidence::Exact,
        }
    }

    fn serial_page(font: &str) -> LayoutPage {
        LayoutPage::new(
            612.0,
            792.0,
            vec![Span {
                text: "SERIAL001".to_string(),
                bbox: Rect::new(100.0, 700.0, 154.0, 712.0),
                font_name: font.to_string(),
                font_size: 12.0,
            }],
        )
    }

    #[test]
    fn replaces_text_in_place() {
        let mut page = serial_page("Helvetica");
        let regions = vec![region(page.search_literal("SERIAL001")[0])];
        let mut diagnostics = Vec::new();
        let replacement = Replacement {
            rule: 0,
            original: "SERIAL001",
            value: "00100",
        };
        let results = replace_regions(&mut page, &replacement, &regions, "Helvetica", &mut diagnostics);
        assert!(results[0].inserted());
        assert!(!results[0].covered);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        assert_eq!(page.extract_text(), "00100");
        let inserted = page.extract_layout();
        assert_eq!(inserted[0].font_size, 12.0);
    }

    #[test]
    fn wider_values_survive_neighbouring_instances_on_one_line() {
        use crate::document::{DocumentLoader, PdfLoader};

        let bytes = crate::test_util::simple_pdf(&[&[("ID AB AB end", 72.0, 700.0)]]);
        let mut doc = PdfLoader.load(&bytes).expect("load");
        let mut pages = doc.pages_mut();
        let page = &mut *pages[0];
        let regions: Vec<MatchRegion> = page.search_literal("AB").into_iter().map(region).collect();
        assert_eq!(regions.len(), 2);

        let mut diagnostics = Vec::new();
        let replacement = Replacement {
            rule: 0,
            original: "AB",
            value: "12345678",
        };
        let results = replace_regions(page, &replacement, &regions, "Helvetica", &mut diagnostics);

        assert!(results.iter().all(InstanceResult::inserted));
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        let text = page.extract_text();
        assert_eq!(text.matches("12345678").count(), 2, "{}", text);
        assert!(!text.contains("AB"), "{}", text);
    }

    #[test]
    fn insertion_fonts_are_ordered_and_deduplicated() {
        assert_eq!(
            insertion_fonts("ABCDEF+Arial-BoldMT", "Helvetica"),
            vec!["ABCDEF+Arial-BoldMT", "Helvetica-Bold", "Helvetica"]
        );
        assert_eq!(insertion_fonts("Helvetica", "Helvetica"), vec!["Helvetica"]);
    }

    /// Page whose erase does nothing and which only accepts one font.
    struct Stubborn {
        inner: LayoutPage,
        accepted: &'static str,
        covers: usize,
        fail_erase: bool,
    }

    impl PageSurface for Stubborn {
        fn index(&self) -> usize {
            0
        }
        fn size(&self) -> (f32, f32) {
            self.inner.size()
        }
        fn extract_layout(&self) -> Vec<Span> {
            self.inner.extract_layout()
        }
        fn extract_lines(&self) -> Vec<LayoutLine> {
            self.inner.extract_lines()
        }
        fn extract_text(&self) -> String {
            self.inner.extract_text()
        }
        fn search_literal(&self, needle: &str) -> Vec<Rect> {
            self.inner.search_literal(needle)
        }
        fn erase(&mut self, _rect: &Rect) -> Result<(), DocumentError> {
            if self.fail_erase {
                return Err(DocumentError::Write("content stream is locked".to_string()));
            }
            Ok(())
        }
        fn paint_opaque(&mut self, _rect: &Rect) -> Result<(), DocumentError> {
            self.covers += 1;
            Ok(())
        }
        fn insert_text(
            &mut self,
            origin: Point,
            text: &str,
            font: &FontSpec,
            color: Rgb,
        ) -> Result<(), DocumentError> {
            if font.name != self.accepted {
                return Err(DocumentError::UnsupportedFont(font.name.clone()));
            }
            self.inner.insert_text(origin, text, font, color)
        }
    }

    #[test]
    fn failed_erase_is_covered_and_font_falls_back() {
        let mut page = Stubborn {
            inner: serial_page("ABCDEF+Arial-BoldMT"),
            accepted: "Helvetica-Bold",
            covers: 0,
            fail_erase: false,
        };
        let regions = vec![region(page.search_literal("SERIAL001")[0])];
        let mut diagnostics = Vec::new();
        let replacement = Replacement {
            rule: 3,
            original: "SERIAL001",
            value: "00100",
        };
        let results = replace_regions(&mut page, &replacement, &regions, "Helvetica", &mut diagnostics);
        assert!(results[0].covered);
        assert_eq!(page.covers, 1);
        assert_eq!(
            results[0].font.as_ref().map(|f| f.name.as_str()),
            Some("Helvetica-Bold")
        );
        let kinds: Vec<_> = diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiagnosticKind::EraseVerificationMismatch,
                DiagnosticKind::FontResolutionFallback
            ]
        );
        assert!(diagnostics.iter().all(|d| d.rule == 3));
    }

    #[test]
    fn insertion_failure_is_recorded() {
        let mut page = Stubborn {
            inner: serial_page("Helvetica"),
            accepted: "Nothing",
            covers: 0,
            fail_erase: false,
        };
        let regions = vec![region(page.search_literal("SERIAL001")[0])];
        let mut diagnostics = Vec::new();
        let replacement = Replacement {
            rule: 0,
            original: "SERIAL001",
            value: "1",
        };
        let results = replace_regions(&mut page, &replacement, &regions, "Helvetica", &mut diagnostics);
        assert!(!results[0].inserted());
        assert_eq!(
            diagnostics.last().map(|d| d.kind),
            Some(DiagnosticKind::InsertionFailure)
        );
    }

    #[test]
    fn failed_erase_is_an_erase_diagnostic() {
        let mut page = Stubborn {
            inner: serial_page("Helvetica"),
            accepted: "Helvetica",
            covers: 0,
            fail_erase: true,
        };
        let regions = vec![region(page.search_literal("SERIAL001")[0])];
        let mut diagnostics = Vec::new();
        let replacement = Replacement {
            rule: 1,
            original: "SERIAL001",
            value: "00100",
        };
        let results = replace_regions(&mut page, &replacement, &regions, "Helvetica", &mut diagnostics);
        assert!(results[0].covered);
        assert!(results[0].inserted());
        let kinds: Vec<_> = diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiagnosticKind::EraseVerificationMismatch,
                DiagnosticKind::EraseVerificationMismatch
            ]
        );
        assert!(diagnostics[0].message.starts_with("erase failed"));
    }
}
