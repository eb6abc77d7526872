use std::convert::TryFrom;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::RgbaImage;
use lazypdf_core::{
    CancellationToken, Document, DocumentInfo, DocumentProvider, PageDescriptor, RenderError,
    RenderImage, Size,
};
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

/// Opens PDF files through a shared pdfium binding.
pub struct PdfiumRenderFactory {
    pdfium: Arc<Pdfium>,
}

impl PdfiumRenderFactory {
    /// Binds pdfium from `library` (a shared library file or the directory holding it),
    /// falling back to the working directory and then the system library.
    pub fn new(library: Option<&Path>) -> Result<Self> {
        let pdfium = match library {
            Some(path) => bind_pdfium_at(path)?,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumRenderFactory {
    #[instrument(skip(self))]
    async fn open(&self, path: &Path) -> Result<Arc<dyn Document>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let shared = Arc::new(PdfiumShared {
            document: Mutex::new(None),
            pdfium: Arc::clone(&self.pdfium),
            path: absolute,
        });

        let info = {
            let shared = Arc::clone(&shared);
            tokio::task::spawn_blocking(move || shared.read_info())
                .await
                .context("document loader task failed")??
        };
        debug!(path = %info.path.display(), pages = info.page_count, "opened with pdfium");
        Ok(Arc::new(PdfiumDocument { info, shared }))
    }
}

/// The lazily opened pdfium document of one file.
struct PdfiumShared {
    // fields drop in declaration order, so the document is released before the binding
    // it borrows from
    document: Mutex<Option<PdfDocument<'static>>>,
    pdfium: Arc<Pdfium>,
    path: PathBuf,
}

impl PdfiumShared {
    fn open_document(&self) -> Result<PdfDocument<'static>> {
        let document = self
            .pdfium
            .load_pdf_from_file(&self.path, None)
            .with_context(|| format!("failed to open {:?}", self.path))?;
        // SAFETY: the document borrows the bindings owned by `self.pdfium`. It is only ever
        // stored in `self.document`, which is declared before `pdfium` and therefore dropped
        // first, and the `Arc<Pdfium>` keeps the bindings alive for as long as `self` lives.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        Ok(document)
    }

    fn with_document<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&PdfDocument<'static>) -> Result<R>,
    {
        let mut guard = self.document.lock();
        let document = match guard.take() {
            Some(document) => document,
            None => self.open_document()?,
        };
        let result = f(&document);
        *guard = Some(document);
        result
    }

    fn read_info(&self) -> Result<DocumentInfo> {
        self.with_document(|document| {
            let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
            let title = document
                .metadata()
                .get(PdfDocumentMetadataTagType::Title)
                .map(|tag| tag.value().trim().to_owned())
                .filter(|title| !title.is_empty());
            Ok(DocumentInfo {
                path: self.path.clone(),
                page_count,
                title,
            })
        })
    }

    fn page_size(&self, index: usize) -> Result<Size> {
        self.with_document(|document| {
            let page = load_page(document, index)?;
            Ok(Size::new(page.width().value, page.height().value))
        })
    }

    fn render_page(&self, index: usize, scale: f32) -> Result<RenderImage> {
        self.with_document(|document| {
            let page = load_page(document, index)?;
            let config = PdfRenderConfig::new().scale_page_by_factor(scale.max(0.01));
            let bitmap = page
                .render_with_config(&config)
                .with_context(|| format!("failed to render page {index}"))?;
            let image: RgbaImage = bitmap.as_image().to_rgba8();

            Ok(RenderImage {
                width: image.width(),
                height: image.height(),
                pixels: image.into_raw(),
            })
        })
    }
}

fn load_page<'a>(document: &'a PdfDocument<'static>, index: usize) -> Result<PdfPage<'a>> {
    let page_index = index
        .checked_sub(1)
        .and_then(|slot| PdfPageIndex::try_from(slot).ok())
        .ok_or_else(|| anyhow!("page {index} is out of supported range"))?;
    document
        .pages()
        .get(page_index)
        .with_context(|| format!("page {index} out of range"))
}

struct PdfiumDocument {
    info: DocumentInfo,
    shared: Arc<PdfiumShared>,
}

#[async_trait]
impl Document for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    async fn page(&self, index: usize) -> Result<Arc<dyn PageDescriptor>> {
        let shared = Arc::clone(&self.shared);
        let size = tokio::task::spawn_blocking(move || shared.page_size(index))
            .await
            .context("page loader task failed")??;
        Ok(Arc::new(PdfiumPage {
            shared: Arc::clone(&self.shared),
            index,
            size,
        }))
    }
}

struct PdfiumPage {
    shared: Arc<PdfiumShared>,
    index: usize,
    size: Size,
}

#[async_trait]
impl PageDescriptor for PdfiumPage {
    fn intrinsic_size(&self) -> Size {
        self.size
    }

    #[instrument(skip(self, cancel), fields(page = self.index))]
    async fn render(
        &self,
        scale: f32,
        cancel: CancellationToken,
    ) -> std::result::Result<RenderImage, RenderError> {
        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }

        let shared = Arc::clone(&self.shared);
        let index = self.index;
        let token = cancel.clone();
        let image = tokio::task::spawn_blocking(move || {
            // pdfium cannot be interrupted; skip work that was superseded while queued
            if token.is_cancelled() {
                return Err(RenderError::Cancelled);
            }
            shared.render_page(index, scale).map_err(RenderError::from)
        })
        .await
        .map_err(|err| RenderError::Failed(anyhow!("render task failed: {err}")))??;

        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }
        Ok(image)
    }
}

fn library_candidate(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}

fn bind_pdfium_at(path: &Path) -> Result<Pdfium> {
    let library = library_candidate(path);
    let bindings = Pdfium::bind_to_library(&library)
        .map_err(|err| anyhow!("failed to bind pdfium at {}: {err}", library.display()))?;
    Ok(Pdfium::new(bindings))
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            warn!(path = %cwd_path.display(), %err, "pdfium not found in working directory");
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; install it or set `pdfium_library` ({})",
                errors.join(", ")
            ))
        }
    }
}
