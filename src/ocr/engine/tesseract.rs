use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::process::Command;

use super::parse::parse_tsv_words;
use super::{RecognizedWord, Recognizer};

pub fn list_tesseract_languages(command: &str) -> Result<Vec<String>> {
    let output = Command::new(command)
        .arg("--list-langs")
        .output()
        .with_context(|| "failed to run tesseract --list-langs")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut langs = Vec::new();
    for (idx, line) in stdout.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let value = line.trim();
        if !value.is_empty() {
            langs.push(value.to_string());
        }
    }
    Ok(langs)
}

/// Word recognizer backed by the `tesseract` binary's TSV output.
#[derive(Debug, Clone)]
pub struct Tesseract {
    command: String,
    languages: String,
}

impl Tesseract {
    pub fn new(command: impl Into<String>, languages: &str) -> Result<Self> {
        let command = command.into();
        let languages = normalize_ocr_languages(&command, languages)?;
        Ok(Self { command, languages })
    }

    fn run_tsv(&self, path: &Path, dpi: u32) -> Result<String> {
        let output = Command::new(&self.command)
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .arg("--dpi")
            .arg(dpi.to_string())
            .arg("tsv")
            .output()
            .with_context(|| "failed to run tesseract (is it installed?)")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("tesseract failed: {}", stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Recognizer for Tesseract {
    fn recognize(&self, image_png: &[u8], dpi: u32) -> Result<Vec<RecognizedWord>> {
        let tmp = tempfile::Builder::new()
            .prefix("docfill-ocr-")
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        std::fs::write(tmp.path(), image_png)
            .with_context(|| "failed to write temp image for OCR")?;
        let tsv = self.run_tsv(tmp.path(), dpi)?;
        Ok(parse_tsv_words(&tsv))
    }
}

fn normalize_ocr_languages(command: &str, requested: &str) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }

    let available = match list_tesseract_languages(command) {
        Ok(list) => list,
        Err(_) => return Ok(trimmed.to_string()),
    };

    let mut chosen = Vec::new();
    let mut missing = Vec::new();
    for raw in trimmed.split(['+', ',', ' ']) {
        let lang = raw.trim();
        if lang.is_empty() {
            continue;
        }
        if available.iter().any(|value| value == lang) {
            chosen.push(lang.to_string());
        } else {
            missing.push(lang.to_string());
        }
    }

    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        tracing::warn!(
            missing = %missing.join(", "),
            available = %available.join(", "),
            "some ocr languages are not installed"
        );
    }

    Ok(chosen.join("+"))
}
