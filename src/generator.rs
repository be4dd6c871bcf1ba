//! Replacement orchestration and multi-copy generation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};

use crate::document::{Document, DocumentLoader, PageSurface, extension_for_mime};
use crate::error::EngineError;
use crate::locate::{LocateOptions, locate};
use crate::ocr::TextSection;
use crate::redact::{Replacement, replace_regions};
use crate::rules::{ReplacementRule, RuleEvaluator, RuleSet};
use crate::settings::Settings;

pub use crate::report::{CopyReport, Diagnostic, DiagnosticKind, Outcome, PageReport, RuleStatus};

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub copy_workers: usize,
    pub page_workers: usize,
    pub locate: LocateOptions,
    pub default_font: String,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            copy_workers: num_cpus::get().max(1),
            page_workers: 1,
            locate: LocateOptions::default(),
            default_font: crate::font::DEFAULT_FONT.to_string(),
        }
    }
}

impl GenerateOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            copy_workers: settings.generate.copy_workers.max(1),
            page_workers: settings.generate.page_workers.max(1),
            locate: LocateOptions {
                ocr_dpi: settings.ocr.dpi,
                allow_approximate: settings.generate.allow_approximate,
            },
            default_font: settings.generate.default_font.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub rules: RuleSet,
    pub num_copies: usize,
    /// OCR sections rules may reference through `section_id`.
    pub sections: Vec<TextSection>,
    /// File name stem for generated copies.
    pub stem: String,
}

/// One rule's value for a copy.
#[derive(Debug, Clone)]
pub struct PlannedReplacement {
    pub rule_index: usize,
    pub rule: ReplacementRule,
    pub value: String,
}

/// Original text -> value mapping for one copy, in rule order.
#[derive(Debug, Clone, Default)]
pub struct ReplacementSet {
    pub entries: Vec<PlannedReplacement>,
}

impl ReplacementSet {
    pub fn values(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|entry| (entry.rule.original_text.clone(), entry.value.clone()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub index: usize,
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
    pub report: CopyReport,
}

#[derive(Clone)]
pub struct CopyGenerator {
    loader: Arc<dyn DocumentLoader>,
    evaluator: RuleEvaluator,
    options: GenerateOptions,
}

impl CopyGenerator {
    pub fn new(loader: Arc<dyn DocumentLoader>, options: GenerateOptions) -> Self {
        Self {
            loader,
            evaluator: RuleEvaluator::new(),
            options,
        }
    }

    pub fn with_evaluator(mut self, evaluator: RuleEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Evaluates every rule for copy `index`.
    pub fn plan(&self, rules: &RuleSet, index: usize) -> (ReplacementSet, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let entries = rules
            .rules()
            .iter()
            .enumerate()
            .map(|(rule_index, rule)| {
                let evaluated = self.evaluator.evaluate(rule, index);
                if evaluated.format_mismatch {
                    diagnostics.push(Diagnostic::new(
                        DiagnosticKind::FormatTemplateMismatch,
                        rule_index,
                        &rule.original_text,
                        None,
                        format!(
                            "template {:?} does not fit, used plain decimal",
                            rule.format.as_deref().unwrap_or_default()
                        ),
                    ));
                }
                PlannedReplacement {
                    rule_index,
                    rule: rule.clone(),
                    value: evaluated.value,
                }
            })
            .collect();
        (ReplacementSet { entries }, diagnostics)
    }

    /// Produces copy `index` from a fresh load of `source`.
    pub fn generate_copy(
        &self,
        source: &[u8],
        request: &GenerationRequest,
        index: usize,
    ) -> Result<GeneratedDocument, EngineError> {
        let mut document = self.loader.load(source)?;
        let (set, mut diagnostics) = self.plan(&request.rules, index);
        let sections: HashMap<&str, &TextSection> = request
            .sections
            .iter()
            .map(|section| (section.id.as_str(), section))
            .collect();

        let pages = self.apply_pages(document.as_mut(), &set, &sections);

        for entry in &set.entries {
            let found = pages.iter().any(|page| {
                page.rules.iter().any(|status| {
                    status.rule == entry.rule_index && status.outcome != Outcome::NotFound
                })
            });
            if !found {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::PerInstanceMatchFailure,
                    entry.rule_index,
                    &entry.rule.original_text,
                    None,
                    "text not found on any page",
                ));
            }
        }

        let bytes = document.serialize()?;
        let mime = document.mime();
        let report = CopyReport {
            copy: index,
            values: set.values(),
            pages,
            diagnostics,
        };
        tracing::info!(
            copy = index + 1,
            replaced = report.replaced(),
            diagnostics = report.all_diagnostics().count(),
            "copy generated"
        );
        Ok(GeneratedDocument {
            index,
            file_name: format!(
                "{}_copy_{}.{}",
                request.stem,
                index + 1,
                extension_for_mime(mime)
            ),
            mime,
            bytes,
            report,
        })
    }

    fn apply_pages(
        &self,
        document: &mut dyn Document,
        set: &ReplacementSet,
        sections: &HashMap<&str, &TextSection>,
    ) -> Vec<PageReport> {
        let pages = document.pages_mut();
        let workers = self.options.page_workers.min(pages.len()).max(1);
        if workers == 1 {
            return pages
                .into_iter()
                .map(|page| self.apply_page(page, set, sections))
                .collect();
        }

        let mut buckets: Vec<Vec<&mut dyn PageSurface>> = (0..workers).map(|_| Vec::new()).collect();
        for (idx, page) in pages.into_iter().enumerate() {
            buckets[idx % workers].push(page);
        }
        let mut reports: Vec<PageReport> = std::thread::scope(|scope| {
            let handles: Vec<_> = buckets
                .into_iter()
                .map(|bucket| {
                    scope.spawn(move || {
                        bucket
                            .into_iter()
                            .map(|page| self.apply_page(page, set, sections))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(reports) => reports,
                    Err(_) => {
                        tracing::error!("page worker panicked");
                        Vec::new()
                    }
                })
                .collect()
        });
        reports.sort_by_key(|report| report.page);
        reports
    }

    /// Applies every rule, in rule order, to one page.
    fn apply_page(
        &self,
        page: &mut dyn PageSurface,
        set: &ReplacementSet,
        sections: &HashMap<&str, &TextSection>,
    ) -> PageReport {
        let index = page.index();
        let mut diagnostics = Vec::new();
        let mut rules = Vec::with_capacity(set.entries.len());
        for entry in &set.entries {
            let section = entry
                .rule
                .section()
                .and_then(|id| sections.get(id).copied());
            let regions = locate(&*page, &entry.rule.original_text, section, self.options.locate);
            if regions.is_empty() {
                tracing::debug!(page = index, rule = entry.rule_index, "rule not found on page");
                rules.push(RuleStatus {
                    rule: entry.rule_index,
                    original_text: entry.rule.original_text.clone(),
                    value: entry.value.clone(),
                    outcome: Outcome::NotFound,
                    strategy: None,
                    instances: 0,
                    replaced: 0,
                });
                continue;
            }
            let replacement = Replacement {
                rule: entry.rule_index,
                original: &entry.rule.original_text,
                value: &entry.value,
            };
            let results = replace_regions(
                page,
                &replacement,
                &regions,
                &self.options.default_font,
                &mut diagnostics,
            );
            let replaced = results.iter().filter(|r| r.inserted()).count();
            let outcome = if replaced == results.len() {
                Outcome::Replaced
            } else if replaced == 0 {
                Outcome::Failed
            } else {
                Outcome::Partial
            };
            rules.push(RuleStatus {
                rule: entry.rule_index,
                original_text: entry.rule.original_text.clone(),
                value: entry.value.clone(),
                outcome,
                strategy: regions.first().map(|region| region.strategy),
                instances: regions.len(),
                replaced,
            });
        }
        PageReport {
            page: index,
            rules,
            diagnostics,
        }
    }

    /// Generates `request.num_copies` copies on a bounded pool, in copy order.
    /// The first document-level error aborts the batch.
    pub async fn generate(
        &self,
        source: Arc<[u8]>,
        request: Arc<GenerationRequest>,
    ) -> Result<Vec<GeneratedDocument>, EngineError> {
        if request.num_copies == 0 {
            return Err(EngineError::InvalidRequest(
                "num_copies must be at least 1".to_string(),
            ));
        }
        tracing::info!(
            copies = request.num_copies,
            rules = request.rules.len(),
            workers = self.options.copy_workers,
            "generating copies"
        );
        let results = stream::iter(0..request.num_copies)
            .map(|index| {
                let generator = self.clone();
                let source = source.clone();
                let request = request.clone();
                async move {
                    tokio::task::spawn_blocking(move || {
                        generator.generate_copy(&source, &request, index)
                    })
                    .await
                    .map_err(|err| EngineError::Task(format!("copy {}: {}", index + 1, err)))?
                }
            })
            .buffered(self.options.copy_workers.max(1))
            .collect::<Vec<_>>()
            .await;

        let mut documents = Vec::with_capacity(results.len());
        for result in results {
            documents.push(result?);
        }
        documents.sort_by_key(|doc| doc.index);
        Ok(documents)
    }
}
