use std::path::PathBuf;

use thiserror::Error;

/// The document could not be opened. Fatal to the session; shown in the content area.
#[derive(Debug, Error)]
#[error("failed to open {}: {source:#}", .path.display())]
pub struct LoadError {
    pub path: PathBuf,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page {index} is out of range (document has {page_count} pages)")]
    OutOfRange { index: usize, page_count: usize },
    #[error("fetch of page {index} was cancelled")]
    Cancelled { index: usize },
    #[error("failed to fetch page {index}: {source:#}")]
    Backend {
        index: usize,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render cancelled")]
    Cancelled,
    #[error("render failed: {0:#}")]
    Failed(#[from] anyhow::Error),
}

impl RenderError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RenderError::Cancelled)
    }
}

#[derive(Debug, Error)]
#[error("unknown fit mode `{0}` (expected `width` or `height`)")]
pub struct ParseFitModeError(pub String);
