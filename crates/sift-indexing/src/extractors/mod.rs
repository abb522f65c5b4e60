mod docx;
mod hwp;
mod pdf;
mod plaintext;

pub use docx::DocxExtractor;
pub use hwp::HwpExtractor;
pub use pdf::PdfExtractor;
pub use plaintext::PlainTextExtractor;

use async_trait::async_trait;

use crate::IndexingError;

/// Trait for extracting text from file bytes.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract plain text from raw bytes.
    async fn extract(&self, content: &[u8], path: &str) -> Result<String, IndexingError>;

    /// Check if this extractor handles the given file.
    fn supports(&self, path: &str) -> bool;

    fn name(&self) -> &'static str;
}

/// The full extractor set, one per supported format.
pub fn create_extractors() -> Vec<Box<dyn TextExtractor>> {
    vec![
        Box::new(PlainTextExtractor::new()),
        Box::new(DocxExtractor::new()),
        Box::new(PdfExtractor::new()),
        Box::new(HwpExtractor::new()),
    ]
}

/// Pick the extractor for a path, if any supports it.
pub fn extractor_for<'a>(
    extractors: &'a [Box<dyn TextExtractor>],
    path: &str,
) -> Option<&'a dyn TextExtractor> {
    extractors
        .iter()
        .find(|e| e.supports(path))
        .map(|e| e.as_ref())
}

pub(crate) fn has_extension(path: &str, extension: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .map(|e| e.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}
