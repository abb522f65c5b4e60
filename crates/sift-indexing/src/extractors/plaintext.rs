use async_trait::async_trait;

use super::{has_extension, TextExtractor};
use crate::IndexingError;

/// Extractor for `.txt` files. UTF-8 first; on decode failure, retries
/// with EUC-KR, the legacy encoding of the corpus this pipeline grew up
/// on.
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self {
        PlainTextExtractor
    }
}

impl Default for PlainTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, content: &[u8], path: &str) -> Result<String, IndexingError> {
        if let Ok(text) = std::str::from_utf8(content) {
            return Ok(text.to_string());
        }

        let (decoded, _, had_errors) = encoding_rs::EUC_KR.decode(content);
        if had_errors {
            return Err(IndexingError::Extraction(format!(
                "{path} is neither UTF-8 nor EUC-KR text"
            )));
        }
        Ok(decoded.into_owned())
    }

    fn supports(&self, path: &str) -> bool {
        has_extension(path, "txt")
    }

    fn name(&self) -> &'static str {
        "txt"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_extract_utf8() {
        let extractor = PlainTextExtractor::new();
        let content = "Hello world. 안녕하세요.";
        let result = extractor
            .extract(content.as_bytes(), "docs/a.txt")
            .await
            .unwrap();
        assert_eq!(result, content);
    }

    #[tokio::test]
    async fn test_extract_euc_kr_fallback() {
        // "안녕" in EUC-KR
        let bytes = [0xbe, 0xc8, 0xb3, 0xe7];
        let extractor = PlainTextExtractor::new();
        let result = extractor.extract(&bytes, "docs/legacy.txt").await.unwrap();
        assert_eq!(result, "안녕");
    }

    #[tokio::test]
    async fn test_undecodable_bytes_fail() {
        let bytes = [0xff, 0xfe, 0x00, 0x9f, 0xff];
        let extractor = PlainTextExtractor::new();
        assert!(extractor.extract(&bytes, "docs/bad.txt").await.is_err());
    }

    #[test]
    fn test_supports() {
        let extractor = PlainTextExtractor::new();
        assert!(extractor.supports("a.txt"));
        assert!(extractor.supports("a.TXT"));
        assert!(!extractor.supports("a.md"));
    }
}
