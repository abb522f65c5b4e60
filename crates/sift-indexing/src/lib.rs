//! Text extraction and chunking.
//!
//! Extraction turns heterogeneous file formats into plain text; chunking
//! partitions that text into the units that get embedded and indexed.
//! All offsets are Unicode scalar (char) offsets into the extracted
//! content. Every consumer slices with [`text::char_slice`], which keeps
//! chunk text and index records byte-for-byte consistent.

pub mod chunkers;
pub mod extractors;
pub mod text;

pub use chunkers::{create_chunker, BoundaryChunker, Chunker, OutlineChunker, RuleChunker};
pub use extractors::{create_extractors, extractor_for, TextExtractor};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum IndexingError {
    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Model error: {0}")]
    Model(#[from] sift_models::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A contiguous span of a file's extracted text, the unit of embedding
/// and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based ordinal within the file's current version.
    pub chunk_index: usize,
    /// Half-open char offsets into the extracted content.
    pub char_start: usize,
    pub char_end: usize,
    /// Inclusive whitespace-split word offsets, best effort.
    pub word_start: usize,
    pub word_end: usize,
    /// Exactly `content[char_start..char_end]`.
    pub text: String,
}
