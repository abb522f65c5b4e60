//! The ingestion services: the preprocessor turns raw file events into
//! extracted documents, the postprocessor turns extracted documents
//! into embedding records and notifications.

mod postprocessor;
mod preprocessor;

pub use postprocessor::PostprocessorService;
pub use preprocessor::PreprocessorService;

/// Ingestion failures.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Transport error: {0}")]
    Wire(#[from] sift_wire::WireError),

    #[error("Indexing error: {0}")]
    Indexing(#[from] sift_indexing::IndexingError),

    #[error("Model error: {0}")]
    Model(#[from] sift_models::ModelError),

    #[error("Index error: {0}")]
    Index(#[from] sift_index::IndexError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Final path component, for human-readable notifications.
pub(crate) fn file_name(relative_path: &str) -> &str {
    relative_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(relative_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("docs/intro.txt"), "intro.txt");
        assert_eq!(file_name("docs\\intro.txt"), "intro.txt");
        assert_eq!(file_name("intro.txt"), "intro.txt");
    }
}
