//! Finds the on-page regions a rule's original text occupies.

use serde::Serialize;

use crate::document::PageSurface;
use crate::geometry::Rect;
use crate::ocr::{CoordinateMapper, TextSection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Exact,
    Approximate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    OcrSection,
    Exact,
    NormalizedWhitespace,
    CaseFolded,
    FirstWords,
    LongestWord,
    NumericVariant,
    LayoutLine,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::OcrSection => "ocr_section",
            Strategy::Exact => "exact",
            Strategy::NormalizedWhitespace => "normalized_whitespace",
            Strategy::CaseFolded => "case_folded",
            Strategy::FirstWords => "first_words",
            Strategy::LongestWord => "longest_word",
            Strategy::NumericVariant => "numeric_variant",
            Strategy::LayoutLine => "layout_line",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchRegion {
    pub rect: Rect,
    pub page: usize,
    pub strategy: Strategy,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Copy)]
pub struct LocateOptions {
    /// Pixel resolution the OCR sections were produced at.
    pub ocr_dpi: u32,
    pub allow_approximate: bool,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            ocr_dpi: 200,
            allow_approximate: true,
        }
    }
}

type StrategyFn = fn(&mut Search<'_>, &str) -> Vec<Rect>;

const STRATEGIES: [(Strategy, Confidence, StrategyFn); 7] = [
    (Strategy::Exact, Confidence::Exact, exact),
    (
        Strategy::NormalizedWhitespace,
        Confidence::Exact,
        normalized_whitespace,
    ),
    (Strategy::CaseFolded, Confidence::Exact, case_folded),
    (Strategy::FirstWords, Confidence::Approximate, first_words),
    (Strategy::LongestWord, Confidence::Approximate, longest_word),
    (Strategy::NumericVariant, Confidence::Exact, numeric_variant),
    (Strategy::LayoutLine, Confidence::Approximate, layout_line),
];

/// Literal searches against one page, remembering which needles were tried.
struct Search<'a> {
    page: &'a dyn PageSurface,
    tried: Vec<String>,
}

impl Search<'_> {
    fn literal(&mut self, needle: &str) -> Vec<Rect> {
        if needle.is_empty() || self.tried.iter().any(|t| t == needle) {
            return Vec::new();
        }
        self.tried.push(needle.to_string());
        self.page.search_literal(needle)
    }
}

/// Locates `target` on `page`.
///
/// A referenced OCR section on this page whose text matches the target wins
/// outright; otherwise the strategy table runs in order and the first
/// strategy producing any region decides. Returns an empty list when
/// nothing matches.
pub fn locate(
    page: &dyn PageSurface,
    target: &str,
    section: Option<&TextSection>,
    options: LocateOptions,
) -> Vec<MatchRegion> {
    let index = page.index();
    if let Some(section) = section {
        if section.page == index
            && normalize_whitespace(&section.text) == normalize_whitespace(target)
        {
            let (width, height) = page.size();
            let mapper = CoordinateMapper::new(options.ocr_dpi, width, height);
            tracing::debug!(page = index, section = %section.id, "matched via ocr section");
            return vec![MatchRegion {
                rect: mapper.to_points(&section.bbox()),
                page: index,
                strategy: Strategy::OcrSection,
                confidence: Confidence::Exact,
            }];
        }
    }

    let mut search = Search {
        page,
        tried: Vec::new(),
    };
    for (strategy, confidence, run) in STRATEGIES {
        if confidence == Confidence::Approximate && !options.allow_approximate {
            continue;
        }
        let rects = run(&mut search, target);
        if rects.is_empty() {
            continue;
        }
        tracing::debug!(
            page = index,
            strategy = strategy.as_str(),
            regions = rects.len(),
            "text located"
        );
        return rects
            .into_iter()
            .map(|rect| MatchRegion {
                rect,
                page: index,
                strategy,
                confidence,
            })
            .collect();
    }
    Vec::new()
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn exact(search: &mut Search<'_>, target: &str) -> Vec<Rect> {
    search.literal(target)
}

fn normalized_whitespace(search: &mut Search<'_>, target: &str) -> Vec<Rect> {
    search.literal(&normalize_whitespace(target))
}

fn case_folded(search: &mut Search<'_>, target: &str) -> Vec<Rect> {
    let target = normalize_whitespace(target);
    let upper = search.literal(&target.to_uppercase());
    if !upper.is_empty() {
        return upper;
    }
    search.literal(&target.to_lowercase())
}

fn first_words(search: &mut Search<'_>, target: &str) -> Vec<Rect> {
    let words: Vec<&str> = target.split_whitespace().collect();
    let needle = match words.as_slice() {
        [] => return Vec::new(),
        [first, second, ..] if first.chars().count() <= 3 => format!("{} {}", first, second),
        [first, ..] => first.to_string(),
    };
    search.literal(&needle)
}

fn longest_word(search: &mut Search<'_>, target: &str) -> Vec<Rect> {
    let mut longest: Option<&str> = None;
    for word in target.split_whitespace() {
        let len = word.chars().count();
        if len > 3 && longest.is_none_or(|best| len > best.chars().count()) {
            longest = Some(word);
        }
    }
    match longest {
        Some(word) => search.literal(word),
        None => Vec::new(),
    }
}

fn numeric_variant(search: &mut Search<'_>, target: &str) -> Vec<Rect> {
    let visible: Vec<char> = target.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = visible.iter().filter(|c| c.is_ascii_digit()).count();
    if visible.is_empty() || digits * 2 <= visible.len() {
        return Vec::new();
    }
    let trimmed = target.trim();
    let variants = [
        trimmed.to_string(),
        trimmed.replace(' ', ""),
        trimmed.replace('-', ""),
    ];
    for variant in variants {
        let rects = search.literal(&variant);
        if !rects.is_empty() {
            return rects;
        }
    }
    Vec::new()
}

fn layout_line(search: &mut Search<'_>, target: &str) -> Vec<Rect> {
    let folded = normalize_whitespace(target).to_lowercase();
    if folded.is_empty() || !search.page.extract_text().to_lowercase().contains(&folded) {
        return Vec::new();
    }
    search
        .page
        .extract_lines()
        .into_iter()
        .find(|line| line.text.to_lowercase().contains(&folded))
        .map(|line| vec![line.bbox])
        .unwrap_or_default()
}
