use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ocr::TextSection;
use crate::rules::ReplacementRule;

#[derive(Debug, Deserialize)]
pub(crate) struct UploadRequest {
    pub(crate) filename: String,
    pub(crate) data_base64: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadResponse {
    pub(crate) pdf_id: String,
    pub(crate) filename: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct OcrResponse {
    pub(crate) sections: Vec<TextSection>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateRequest {
    pub(crate) pdf_id: String,
    pub(crate) rules: Vec<ReplacementRule>,
    pub(crate) num_copies: usize,
    /// Sections from a previous `/api/ocr` call, for rules with a `section_id`.
    #[serde(default)]
    pub(crate) sections: Vec<TextSection>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PreviewRequest {
    pub(crate) rules: Vec<ReplacementRule>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PreviewResponse {
    pub(crate) values: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
