use async_trait::async_trait;
use pdf_extract::extract_text_from_mem;

use super::{has_extension, TextExtractor};
use crate::IndexingError;

/// Extractor for `.pdf` files. Text comes out in page order; pages that
/// yield nothing are skipped.
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        PdfExtractor
    }

    /// Collapse the blank-page separators the extractor leaves behind.
    fn drop_empty_pages(text: &str) -> String {
        text.split("\n\n")
            .filter(|page| !page.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextExtractor for PdfExtractor {
    async fn extract(&self, content: &[u8], path: &str) -> Result<String, IndexingError> {
        // pdf-extract is synchronous; run it on a blocking thread.
        let content = content.to_vec();
        let path = path.to_string();

        let text = tokio::task::spawn_blocking(move || {
            extract_text_from_mem(&content).map_err(|e| {
                IndexingError::Extraction(format!("PDF extraction failed for {path}: {e}"))
            })
        })
        .await
        .map_err(|e| IndexingError::Extraction(format!("task join error: {e}")))??;

        Ok(Self::drop_empty_pages(&text))
    }

    fn supports(&self, path: &str) -> bool {
        has_extension(path, "pdf")
    }

    fn name(&self) -> &'static str {
        "pdf"
    }
}
