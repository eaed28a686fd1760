//! PDF → plain text via `lopdf`.
//!
//! Text is pulled page by page so one damaged content stream costs only its
//! own page. A document whose pages all come back blank is almost always a
//! scan; it is reported as [`SkipReason::EmptyDocument`] and the source is
//! kept for a later OCR pass instead of producing an empty artifact.

use super::{Converter, OutputDir};
use crate::error::ConvertError;
use crate::output::{ConversionResult, InputFile, SkipReason};
use crate::pipeline::naming::unique_output_name;
use lopdf::Document;
use tracing::{debug, info, warn};

pub struct PdfConverter;

impl Converter for PdfConverter {
    fn name(&self) -> &'static str {
        "pdf"
    }

    fn convert(&self, input: &InputFile, out: &OutputDir) -> ConversionResult {
        let doc = match Document::load(&input.path) {
            Ok(doc) => doc,
            Err(e) => {
                return ConversionResult::Failed(ConvertError::Extraction {
                    path: input.path.clone(),
                    detail: e.to_string(),
                })
            }
        };

        let text = extract_pages(&doc, input);
        if text.trim().is_empty() {
            info!("{}: no extractable text, leaving in place", input.path.display());
            return ConversionResult::Skipped(SkipReason::EmptyDocument);
        }

        let name = unique_output_name(&input.path, "txt");
        match out.write_artifact(&name, text.as_bytes()) {
            Ok(path) => ConversionResult::Success(vec![path]),
            Err(e) => ConversionResult::Failed(ConvertError::io(&input.path, e)),
        }
    }
}

/// Concatenate page texts in page order, one newline between pages.
fn extract_pages(doc: &Document, input: &InputFile) -> String {
    let pages = doc.get_pages();
    debug!("{}: {} pages", input.path.display(), pages.len());

    let texts: Vec<String> = pages
        .keys()
        .map(|&page_no| match doc.extract_text(&[page_no]) {
            Ok(text) => text.trim_end().to_string(),
            Err(e) => {
                warn!(
                    "{}: page {} extraction failed: {}",
                    input.path.display(),
                    page_no,
                    e
                );
                String::new()
            }
        })
        .collect();

    texts.join("\n")
}
