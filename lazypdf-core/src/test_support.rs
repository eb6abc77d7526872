//! Scriptable in-memory document used by the engine tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::cancel::CancellationToken;
use crate::error::RenderError;
use crate::geometry::Size;
use crate::{Document, DocumentInfo, DocumentProvider, PageDescriptor, RenderImage};

#[derive(Default)]
struct Counters {
    fetches: HashMap<usize, usize>,
    renders: HashMap<usize, usize>,
    completed: HashMap<usize, Vec<f32>>,
    fail_fetch: HashSet<usize>,
    fail_render: HashSet<usize>,
    ignore_cancel: bool,
}

struct Shared {
    sizes: Vec<Size>,
    counters: Mutex<Counters>,
    render_gate: watch::Sender<bool>,
    fetch_gate: watch::Sender<bool>,
}

#[derive(Clone)]
pub(crate) struct FakeDocument {
    info: DocumentInfo,
    shared: Arc<Shared>,
}

impl FakeDocument {
    pub(crate) fn new(sizes: Vec<Size>) -> Self {
        let info = DocumentInfo {
            path: PathBuf::from("fake.pdf"),
            page_count: sizes.len(),
            title: None,
        };
        Self {
            info,
            shared: Arc::new(Shared {
                sizes,
                counters: Mutex::new(Counters::default()),
                render_gate: watch::channel(true).0,
                fetch_gate: watch::channel(true).0,
            }),
        }
    }

    pub(crate) fn uniform(pages: usize, size: Size) -> Self {
        Self::new(vec![size; pages])
    }

    pub(crate) fn hold_renders(&self) {
        self.shared.render_gate.send_replace(false);
    }

    pub(crate) fn release_renders(&self) {
        self.shared.render_gate.send_replace(true);
    }

    pub(crate) fn hold_fetches(&self) {
        self.shared.fetch_gate.send_replace(false);
    }

    pub(crate) fn release_fetches(&self) {
        self.shared.fetch_gate.send_replace(true);
    }

    /// Renders run to completion even after their token fires.
    pub(crate) fn ignore_cancellation(&self, ignore: bool) {
        self.shared.counters.lock().ignore_cancel = ignore;
    }

    pub(crate) fn fail_fetch(&self, index: usize, fail: bool) {
        toggle(&mut self.shared.counters.lock().fail_fetch, index, fail);
    }

    pub(crate) fn fail_render(&self, index: usize, fail: bool) {
        toggle(&mut self.shared.counters.lock().fail_render, index, fail);
    }

    pub(crate) fn fetch_calls(&self, index: usize) -> usize {
        self.shared.counters.lock().fetches.get(&index).copied().unwrap_or(0)
    }

    pub(crate) fn render_calls(&self, index: usize) -> usize {
        self.shared.counters.lock().renders.get(&index).copied().unwrap_or(0)
    }

    pub(crate) fn total_render_calls(&self) -> usize {
        self.shared.counters.lock().renders.values().sum()
    }

    pub(crate) fn completed_renders(&self, index: usize) -> Vec<f32> {
        self.shared
            .counters
            .lock()
            .completed
            .get(&index)
            .cloned()
            .unwrap_or_default()
    }
}

fn toggle(set: &mut HashSet<usize>, index: usize, on: bool) {
    if on {
        set.insert(index);
    } else {
        set.remove(&index);
    }
}

async fn wait_open(gate: &watch::Sender<bool>) {
    let mut rx = gate.subscribe();
    let _ = rx.wait_for(|open| *open).await;
}

#[async_trait]
impl Document for FakeDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    async fn page(&self, index: usize) -> Result<Arc<dyn PageDescriptor>> {
        *self
            .shared
            .counters
            .lock()
            .fetches
            .entry(index)
            .or_default() += 1;
        wait_open(&self.shared.fetch_gate).await;

        if self.shared.counters.lock().fail_fetch.contains(&index) {
            bail!("page {index} is unreadable");
        }
        let size = index
            .checked_sub(1)
            .and_then(|slot| self.shared.sizes.get(slot))
            .copied()
            .ok_or_else(|| anyhow!("page {index} does not exist"))?;
        Ok(Arc::new(FakePage {
            index,
            size,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct FakePage {
    index: usize,
    size: Size,
    shared: Arc<Shared>,
}

#[async_trait]
impl PageDescriptor for FakePage {
    fn intrinsic_size(&self) -> Size {
        self.size
    }

    async fn render(
        &self,
        scale: f32,
        cancel: CancellationToken,
    ) -> Result<RenderImage, RenderError> {
        let ignore_cancel = {
            let mut counters = self.shared.counters.lock();
            *counters.renders.entry(self.index).or_default() += 1;
            counters.ignore_cancel
        };

        if ignore_cancel {
            wait_open(&self.shared.render_gate).await;
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RenderError::Cancelled),
                _ = wait_open(&self.shared.render_gate) => {}
            }
        }

        let mut counters = self.shared.counters.lock();
        if counters.fail_render.contains(&self.index) {
            return Err(RenderError::Failed(anyhow!(
                "rasterizer rejected page {}",
                self.index
            )));
        }
        counters.completed.entry(self.index).or_default().push(scale);
        drop(counters);

        // pixel payload is irrelevant to the engine
        Ok(RenderImage {
            width: (self.size.width * scale).floor().max(1.0) as u32,
            height: (self.size.height * scale).floor().max(1.0) as u32,
            pixels: Vec::new(),
        })
    }
}

/// Hands out a [`FakeDocument`], or fails every open.
pub(crate) struct FakeProvider {
    document: Option<FakeDocument>,
}

impl FakeProvider {
    pub(crate) fn serving(document: &FakeDocument) -> Self {
        Self {
            document: Some(document.clone()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self { document: None }
    }
}

#[async_trait]
impl DocumentProvider for FakeProvider {
    async fn open(&self, path: &Path) -> Result<Arc<dyn Document>> {
        let mut document = self
            .document
            .clone()
            .ok_or_else(|| anyhow!("not a PDF file"))?;
        document.info.path = path.to_path_buf();
        Ok(Arc::new(document))
    }
}

/// Yields to spawned tasks until `condition` holds.
pub(crate) async fn settle_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached after yielding");
}
