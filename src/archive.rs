use std::io::{Cursor, Write};

use serde::Serialize;
use time::{OffsetDateTime, format_description};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::EngineError;
use crate::generator::GeneratedDocument;
use crate::report::CopyReport;

pub const MANIFEST_NAME: &str = "manifest.json";

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    source: &'a str,
    generated_at: String,
    copies: Vec<ManifestEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct ManifestEntry<'a> {
    file_name: &'a str,
    report: &'a CopyReport,
}

/// Zips generated copies together with a `manifest.json` of their reports.
pub fn package(stem: &str, docs: &[GeneratedDocument]) -> Result<Vec<u8>, EngineError> {
    let packaging = |what: &str, err: &dyn std::fmt::Display| {
        EngineError::Packaging(format!("{}: {}", what, err))
    };
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for doc in docs {
        writer
            .start_file(doc.file_name.as_str(), options)
            .map_err(|err| packaging("failed to write zip entry", &err))?;
        writer
            .write_all(&doc.bytes)
            .map_err(|err| packaging("failed to write zip content", &err))?;
    }

    let generated_at = OffsetDateTime::now_utc()
        .format(&format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string());
    let manifest = Manifest {
        source: stem,
        generated_at,
        copies: docs
            .iter()
            .map(|doc| ManifestEntry {
                file_name: &doc.file_name,
                report: &doc.report,
            })
            .collect(),
    };
    let manifest = serde_json::to_vec_pretty(&manifest)
        .map_err(|err| packaging("failed to encode manifest", &err))?;
    writer
        .start_file(MANIFEST_NAME, options)
        .map_err(|err| packaging("failed to write manifest entry", &err))?;
    writer
        .write_all(&manifest)
        .map_err(|err| packaging("failed to write manifest", &err))?;

    let bytes = writer
        .finish()
        .map_err(|err| packaging("failed to finalize zip output", &err))?
        .into_inner();
    tracing::debug!(copies = docs.len(), bytes = bytes.len(), "archive packaged");
    Ok(bytes)
}
