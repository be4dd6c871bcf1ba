use std::collections::BTreeMap;

use serde::Serialize;

use crate::locate::Strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    PerInstanceMatchFailure,
    FontResolutionFallback,
    EraseVerificationMismatch,
    InsertionFailure,
    FormatTemplateMismatch,
    InsertVerificationMismatch,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::PerInstanceMatchFailure => "per_instance_match_failure",
            DiagnosticKind::FontResolutionFallback => "font_resolution_fallback",
            DiagnosticKind::EraseVerificationMismatch => "erase_verification_mismatch",
            DiagnosticKind::InsertionFailure => "insertion_failure",
            DiagnosticKind::FormatTemplateMismatch => "format_template_mismatch",
            DiagnosticKind::InsertVerificationMismatch => "insert_verification_mismatch",
        }
    }
}

/// A non-fatal problem met while producing one copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub rule: usize,
    pub original_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        rule: usize,
        original_text: &str,
        page: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        let diagnostic = Self {
            kind,
            rule,
            original_text: original_text.to_string(),
            page,
            message: message.into(),
        };
        tracing::warn!(
            kind = diagnostic.kind.as_str(),
            rule,
            page = ?diagnostic.page,
            original = %diagnostic.original_text,
            "{}",
            diagnostic.message
        );
        diagnostic
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every located instance was erased and the value inserted.
    Replaced,
    /// Some instances failed.
    Partial,
    NotFound,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleStatus {
    pub rule: usize,
    pub original_text: String,
    pub value: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    pub instances: usize,
    pub replaced: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageReport {
    pub page: usize,
    pub rules: Vec<RuleStatus>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CopyReport {
    pub copy: usize,
    /// original text -> value used in this copy
    pub values: BTreeMap<String, String>,
    pub pages: Vec<PageReport>,
    /// Diagnostics not tied to a page, such as template mismatches.
    pub diagnostics: Vec<Diagnostic>,
}

impl CopyReport {
    pub fn replaced(&self) -> usize {
        self.statuses().map(|status| status.replaced).sum()
    }

    pub fn statuses(&self) -> impl Iterator<Item = &RuleStatus> {
        self.pages.iter().flat_map(|page| page.rules.iter())
    }

    pub fn all_diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .chain(self.pages.iter().flat_map(|page| page.diagnostics.iter()))
    }

    /// Original texts that were not found on any page.
    pub fn missing(&self) -> Vec<&str> {
        self.values
            .keys()
            .filter(|original| {
                !self.statuses().any(|status| {
                    &status.original_text == *original && status.outcome != Outcome::NotFound
                })
            })
            .map(String::as_str)
            .collect()
    }

    /// One line per copy for CLI output.
    pub fn summary(&self) -> String {
        let missing = self.missing();
        let mut line = format!(
            "copy {}: {} replacement(s), {} diagnostic(s)",
            self.copy + 1,
            self.replaced(),
            self.all_diagnostics().count()
        );
        if !missing.is_empty() {
            line.push_str(&format!(", not found: {}", missing.join(", ")));
        }
        line
    }
}
