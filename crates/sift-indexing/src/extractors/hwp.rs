use std::io::{Cursor, Read};

use async_trait::async_trait;
use flate2::read::DeflateDecoder;

use super::{has_extension, TextExtractor};
use crate::IndexingError;

const FILE_HEADER: &str = "/FileHeader";
const SUMMARY: &str = "/\u{5}HwpSummaryInformation";
const BODY_TEXT: &str = "/BodyText";
/// Record tag carrying paragraph text.
const TEXT_TAG: u32 = 67;

/// Extractor for `.hwp` files (CFB structured storage). Sections are
/// raw-deflate compressed when the header flags say so; text lives in
/// tag-67 records as UTF-16LE.
pub struct HwpExtractor;

impl HwpExtractor {
    pub fn new() -> Self {
        HwpExtractor
    }

    fn extract_sync(content: &[u8], path: &str) -> Result<String, IndexingError> {
        let cursor = Cursor::new(content.to_vec());
        let mut storage = cfb::CompoundFile::open(cursor)
            .map_err(|e| IndexingError::Extraction(format!("{path} is not CFB storage: {e}")))?;

        if !storage.exists(FILE_HEADER) || !storage.exists(SUMMARY) {
            return Err(IndexingError::Extraction(format!(
                "{path} is not a valid HWP file"
            )));
        }

        let mut header = Vec::new();
        storage
            .open_stream(FILE_HEADER)
            .and_then(|mut s| s.read_to_end(&mut header))
            .map_err(|e| IndexingError::Extraction(format!("{path} header unreadable: {e}")))?;
        let compressed = header.get(36).map(|b| b & 1 == 1).unwrap_or(false);

        let mut section_numbers: Vec<u32> = storage
            .read_storage(BODY_TEXT)
            .map_err(|e| IndexingError::Extraction(format!("{path} has no body text: {e}")))?
            .filter_map(|entry| entry.name().strip_prefix("Section")?.parse().ok())
            .collect();
        section_numbers.sort_unstable();

        let mut text = String::new();
        for number in section_numbers {
            let mut raw = Vec::new();
            storage
                .open_stream(format!("{BODY_TEXT}/Section{number}"))
                .and_then(|mut s| s.read_to_end(&mut raw))
                .map_err(|e| {
                    IndexingError::Extraction(format!("{path} section {number} unreadable: {e}"))
                })?;

            let unpacked = if compressed {
                let mut decoder = DeflateDecoder::new(raw.as_slice());
                let mut out = Vec::new();
                if decoder.read_to_end(&mut out).is_err() {
                    // A section that fails to decompress contributes nothing.
                    continue;
                }
                out
            } else {
                raw
            };

            text.push_str(&Self::section_text(&unpacked));
            text.push('\n');
        }

        Ok(text.trim().to_string())
    }

    /// Walk a section's record stream and decode every text record.
    fn section_text(data: &[u8]) -> String {
        let mut text = String::new();
        let mut position = 0usize;

        while position + 4 <= data.len() {
            let header = u32::from_le_bytes([
                data[position],
                data[position + 1],
                data[position + 2],
                data[position + 3],
            ]);
            let tag = header & 0x3FF;
            let length = ((header >> 20) & 0xFFF) as usize;

            if position + 4 + length > data.len() {
                // Malformed record; step forward and resync.
                position += 1;
                continue;
            }

            if tag == TEXT_TAG {
                let record = &data[position + 4..position + 4 + length];
                if let Some(decoded) = Self::decode_record(record) {
                    if !decoded.is_empty() {
                        text.push_str(&decoded);
                        text.push('\n');
                    }
                }
            }
            position += 4 + length;
        }
        text
    }

    /// UTF-16LE record payload → cleaned text: hanja stripped, control
    /// characters removed, whitespace collapsed.
    fn decode_record(record: &[u8]) -> Option<String> {
        if record.len() % 2 != 0 {
            return None;
        }
        let units: Vec<u16> = record
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let decoded = String::from_utf16(&units).ok()?;

        let filtered: String = decoded
            .chars()
            .filter(|&c| !('\u{4e00}'..='\u{9fff}').contains(&c))
            .filter(|c| !c.is_control())
            .collect();

        let collapsed = filtered.split_whitespace().collect::<Vec<_>>().join(" ");
        Some(collapsed)
    }
}

impl Default for HwpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextExtractor for HwpExtractor {
    async fn extract(&self, content: &[u8], path: &str) -> Result<String, IndexingError> {
        let content = content.to_vec();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || Self::extract_sync(&content, &path))
            .await
            .map_err(|e| IndexingError::Extraction(format!("task join error: {e}")))?
    }

    fn supports(&self, path: &str) -> bool {
        has_extension(path, "hwp")
    }

    fn name(&self) -> &'static str {
        "hwp"
    }
}
