use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub mod archive;
pub mod document;
pub mod error;
pub mod font;
pub mod generator;
pub mod geometry;
pub mod locate;
pub mod logging;
pub mod ocr;
pub mod redact;
pub mod report;
pub mod rules;
pub mod server;
pub mod settings;
#[cfg(test)]
mod test_util;

pub use error::EngineError;
pub use generator::{CopyGenerator, GenerateOptions, GeneratedDocument, GenerationRequest};
pub use ocr::TextSection;
pub use rules::{ReplacementRule, RuleEvaluator, RuleSet};
pub use settings::Settings;

/// Reads a source document from disk.
pub fn load_source(path: &Path) -> Result<Vec<u8>, EngineError> {
    if !path.is_file() {
        return Err(EngineError::SourceNotFound(path.to_path_buf()));
    }
    Ok(std::fs::read(path)?)
}

/// File name stem used for generated copies, `document` when the path has none.
pub fn source_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .filter(|stem| !stem.trim().is_empty())
        .unwrap_or_else(|| "document".to_string())
}

pub fn build_ocr_pipeline(settings: &Settings) -> Result<ocr::OcrPipeline> {
    let rasterizer = ocr::CommandRasterizer::detect(&settings.ocr.rasterizer)
        .with_context(|| "failed to select a pdf rasterizer")?;
    let recognizer = ocr::Tesseract::new(settings.ocr.tesseract.clone(), &settings.ocr.languages)
        .with_context(|| "failed to set up tesseract")?;
    Ok(ocr::OcrPipeline::new(
        Arc::new(rasterizer),
        Arc::new(recognizer),
        settings.ocr.dpi,
        settings.ocr.workers,
        settings.segment_options(),
    ))
}

/// Runs OCR over every page of `source` and returns the grouped sections.
pub async fn run_ocr(settings: &Settings, source: Arc<[u8]>) -> Result<Vec<TextSection>> {
    let page_count = document::open_loader(&source)
        .and_then(|loader| loader.load(&source))
        .map(|doc| doc.page_count())
        .map_err(EngineError::from)?;
    let pipeline = build_ocr_pipeline(settings)?;
    let sections = pipeline.extract_sections(source, page_count).await?;
    Ok(sections)
}

/// Generates `request.num_copies` copies of `source` with the loader its
/// content calls for.
pub async fn generate_copies(
    options: GenerateOptions,
    source: Arc<[u8]>,
    request: GenerationRequest,
) -> Result<Vec<GeneratedDocument>, EngineError> {
    let loader = document::open_loader(&source)?;
    CopyGenerator::new(loader, options)
        .generate(source, Arc::new(request))
        .await
}

/// Original text -> value copy 0 would receive.
pub fn preview_values(rules: &RuleSet) -> BTreeMap<String, String> {
    let evaluator = RuleEvaluator::new();
    rules
        .rules()
        .iter()
        .map(|rule| (rule.original_text.clone(), evaluator.preview(rule)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_source_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_source(&dir.path().join("absent.pdf")).expect_err("missing");
        assert!(matches!(err, EngineError::SourceNotFound(_)));
    }

    #[test]
    fn stem_falls_back_for_bare_paths() {
        assert_eq!(source_stem(Path::new("forms/invoice.pdf")), "invoice");
        assert_eq!(source_stem(Path::new("")), "document");
    }

    #[test]
    fn preview_shows_first_copy_values() {
        let rules = RuleSet::from_json(
            r#"[
                {"original_text": "INV-0001", "type": "serial", "start_value": 5, "format": "INV-%04d"},
                {"original_text": "LOT", "type": "random", "random_min": 10, "random_max": 10, "prefix": "L"}
            ]"#,
        )
        .expect("rules");
        insta::assert_json_snapshot!(preview_values(&rules), @r###"
        {
          "INV-0001": "INV-0005",
          "LOT": "L10"
        }
        "###);
    }
}
