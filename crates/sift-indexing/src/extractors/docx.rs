use std::io::{Cursor, Read};

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;

use super::{has_extension, TextExtractor};
use crate::IndexingError;

/// Extractor for `.docx` files: paragraph texts from
/// `word/document.xml`, joined with newlines in document order.
pub struct DocxExtractor;

impl DocxExtractor {
    pub fn new() -> Self {
        DocxExtractor
    }

    fn extract_sync(content: &[u8], path: &str) -> Result<String, IndexingError> {
        let cursor = Cursor::new(content);
        let mut archive = zip::ZipArchive::new(cursor)
            .map_err(|e| IndexingError::Extraction(format!("{path} is not a docx archive: {e}")))?;

        let mut xml = Vec::new();
        archive
            .by_name("word/document.xml")
            .map_err(|e| IndexingError::Extraction(format!("{path} has no document body: {e}")))?
            .read_to_end(&mut xml)?;

        Self::paragraphs_from_xml(&xml)
            .map(|paragraphs| paragraphs.join("\n"))
            .map_err(|e| IndexingError::Extraction(format!("{path}: {e}")))
    }

    fn paragraphs_from_xml(xml: &[u8]) -> Result<Vec<String>, quick_xml::Error> {
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();

        let mut paragraphs = Vec::new();
        let mut current = String::new();
        let mut in_text = false;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
                Event::End(e) => match e.name().as_ref() {
                    b"w:t" => in_text = false,
                    b"w:p" => paragraphs.push(std::mem::take(&mut current)),
                    _ => {}
                },
                Event::Text(t) if in_text => {
                    let text = t.unescape().map_err(quick_xml::Error::from)?;
                    current.push_str(&text);
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !current.is_empty() {
            paragraphs.push(current);
        }
        Ok(paragraphs)
    }
}

impl Default for DocxExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextExtractor for DocxExtractor {
    async fn extract(&self, content: &[u8], path: &str) -> Result<String, IndexingError> {
        let content = content.to_vec();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || Self::extract_sync(&content, &path))
            .await
            .map_err(|e| IndexingError::Extraction(format!("task join error: {e}")))?
    }

    fn supports(&self, path: &str) -> bool {
        has_extension(path, "docx")
    }

    fn name(&self) -> &'static str {
        "docx"
    }
}
