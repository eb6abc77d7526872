//! Viewport-anchored lazy rendering engine.
//!
//! A [`Viewer`] owns a [`Surface`] (the host's scrollable canvas) and, once a document is
//! open, a [`RenderScheduler`] that rasterizes pages on demand as they come near the
//! viewport. Every layout-affecting change goes through [`Viewer::commit_view_change`] so
//! the user's scroll anchor survives zoom, fit and double-page changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

mod anchor;
pub mod cancel;
pub mod config;
pub mod error;
pub mod geometry;
mod scheduler;
pub mod surface;
mod view_state;
mod viewer;
mod visibility;

#[cfg(test)]
mod test_support;

pub use anchor::{capture_anchor, restore_anchor, ViewportAnchor};
pub use cancel::CancellationToken;
pub use config::Config;
pub use error::{FetchError, LoadError, RenderError};
pub use geometry::{FitMode, Point, Rect, Size};
pub use scheduler::{PageSnapshot, RenderOutcome, RenderScheduler, SCALE_EPSILON};
pub use surface::{FlowSurface, Surface};
pub use view_state::{ViewState, ZOOM_MAX, ZOOM_MIN, ZOOM_STEP};
pub use viewer::{ViewTransaction, Viewer};
pub use visibility::{Debouncer, VisibilityTracker};

#[derive(Debug, Clone, Default)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub page_count: usize,
    pub title: Option<String>,
}

/// RGBA pixels produced by a rasterizer.
#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum ViewerEvent {
    DocumentLoaded { page_count: usize },
    LoadFailed(String),
    PageRendered(usize),
}

/// An open document. Page indices are 1-based.
#[async_trait::async_trait]
pub trait Document: Send + Sync {
    fn info(&self) -> &DocumentInfo;

    fn page_count(&self) -> usize {
        self.info().page_count
    }

    async fn page(&self, index: usize) -> Result<Arc<dyn PageDescriptor>>;
}

#[async_trait::async_trait]
pub trait PageDescriptor: Send + Sync {
    /// Unscaled page size, as reported by the document at scale 1.
    fn intrinsic_size(&self) -> Size;

    /// Rasterizes the page. Implementations should check `cancel` cooperatively and
    /// return [`RenderError::Cancelled`] once it fires.
    async fn render(
        &self,
        scale: f32,
        cancel: CancellationToken,
    ) -> std::result::Result<RenderImage, RenderError>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn Document>>;
}

/// Requests the core may send back to the host. Fire-and-forget.
pub trait HostShell {
    fn request_fullscreen_toggle(&self);
}
