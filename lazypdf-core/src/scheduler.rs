//! Page cache and render scheduler.
//!
//! Owns one [`PageState`] per page and decides when a page must be rasterized again.
//! Staleness is detected twice: starting a render cancels the page's previous one, and a
//! finished render is committed only if both the render generation and the page's ticket
//! are still the ones it started with.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, error, instrument, trace};

use crate::cancel::CancellationToken;
use crate::error::{FetchError, RenderError};
use crate::geometry::{region_size, Size};
use crate::view_state::ViewState;
use crate::{Document, PageDescriptor, RenderImage, ViewerEvent};

/// Scale differences below this are treated as float jitter.
pub const SCALE_EPSILON: f32 = 0.0005;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderOutcome {
    /// Already rendered at the target scale.
    UpToDate,
    /// A render for the same target is already running.
    InFlight,
    Rendered { scale: f32 },
    /// Finished, but the view moved on while it ran.
    Discarded,
    Cancelled,
    Failed,
    UnknownPage,
}

#[derive(Debug)]
struct RenderTicket {
    id: u64,
    scale: f32,
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct PageState {
    region: Size,
    placeholder: Size,
    intrinsic: Option<Size>,
    rendered_scale: Option<f32>,
    in_flight: Option<RenderTicket>,
    image: Option<Arc<RenderImage>>,
}

impl PageState {
    fn new(placeholder: Size, region: Size) -> Self {
        Self {
            region,
            placeholder,
            intrinsic: None,
            rendered_scale: None,
            in_flight: None,
            image: None,
        }
    }

    fn layout_size(&self) -> Size {
        self.intrinsic.unwrap_or(self.placeholder)
    }
}

/// Read-only view of a page's state.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pub region: Size,
    pub intrinsic: Option<Size>,
    pub rendered_scale: Option<f32>,
    pub rendering: bool,
    pub image: Option<Arc<RenderImage>>,
}

/// Everything guarded by the scheduler lock. Never held across an await.
#[derive(Debug)]
pub(crate) struct EngineState {
    pub(crate) view: ViewState,
    pub(crate) viewport: Size,
    pages: Vec<PageState>,
    next_ticket: u64,
}

impl EngineState {
    pub(crate) fn mark_all_dirty(&mut self) -> u64 {
        let generation = self.view.advance_generation();
        for page in &mut self.pages {
            let size = page.layout_size();
            page.region = region_size(size, self.view.scale_for(size, self.viewport));
        }
        generation
    }
}

struct SchedulerInner {
    document: Arc<dyn Document>,
    descriptors: Vec<OnceCell<Arc<dyn PageDescriptor>>>,
    teardown: CancellationToken,
    state: Mutex<EngineState>,
    events: Arc<Mutex<Vec<ViewerEvent>>>,
}

/// Cheap to clone; clones drive the same document.
#[derive(Clone)]
pub struct RenderScheduler {
    inner: Arc<SchedulerInner>,
}

impl RenderScheduler {
    /// Builds page states sized from `placeholder` until each page's own size is known.
    pub fn new(
        document: Arc<dyn Document>,
        view: ViewState,
        viewport: Size,
        placeholder: Size,
        events: Arc<Mutex<Vec<ViewerEvent>>>,
    ) -> Self {
        let page_count = document.page_count();
        let region = region_size(placeholder, view.scale_for(placeholder, viewport));
        let pages = (0..page_count)
            .map(|_| PageState::new(placeholder, region))
            .collect();
        let descriptors = (0..page_count).map(|_| OnceCell::new()).collect();

        Self {
            inner: Arc::new(SchedulerInner {
                document,
                descriptors,
                teardown: CancellationToken::new(),
                state: Mutex::new(EngineState {
                    view,
                    viewport,
                    pages,
                    next_ticket: 0,
                }),
                events,
            }),
        }
    }

    pub fn page_count(&self) -> usize {
        self.inner.descriptors.len()
    }

    pub fn document(&self) -> &Arc<dyn Document> {
        &self.inner.document
    }

    pub fn view(&self) -> ViewState {
        self.inner.state.lock().view.clone()
    }

    pub fn viewport(&self) -> Size {
        self.inner.state.lock().viewport
    }

    pub fn page(&self, index: usize) -> Option<PageSnapshot> {
        let state = self.inner.state.lock();
        let page = state.pages.get(index.checked_sub(1)?)?;
        Some(PageSnapshot {
            region: page.region,
            intrinsic: page.intrinsic,
            rendered_scale: page.rendered_scale,
            rendering: page.in_flight.is_some(),
            image: page.image.clone(),
        })
    }

    pub fn region_sizes(&self) -> Vec<Size> {
        let state = self.inner.state.lock();
        state.pages.iter().map(|page| page.region).collect()
    }

    pub(crate) fn transact<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let mut state = self.inner.state.lock();
        f(&mut state)
    }

    /// Invalidates every in-flight render and resizes all regions to their new targets.
    pub fn mark_all_dirty(&self) -> u64 {
        self.inner.state.lock().mark_all_dirty()
    }

    /// Memoizes a descriptor fetched outside the scheduler. Returns `false` if the page
    /// already had one.
    pub fn seed_descriptor(&self, index: usize, descriptor: Arc<dyn PageDescriptor>) -> bool {
        let Some(slot) = index
            .checked_sub(1)
            .and_then(|slot| self.inner.descriptors.get(slot))
        else {
            return false;
        };
        let intrinsic = descriptor.intrinsic_size();
        if slot.set(descriptor).is_err() {
            return false;
        }
        if let Some(page) = self.inner.state.lock().pages.get_mut(index - 1) {
            page.intrinsic.get_or_insert(intrinsic);
        }
        true
    }

    /// Fetches a page descriptor once; concurrent callers share the in-flight fetch.
    /// Failures are not memoized.
    pub async fn ensure_page_descriptor(
        &self,
        index: usize,
    ) -> Result<Arc<dyn PageDescriptor>, FetchError> {
        let inner = &self.inner;
        let slot = index
            .checked_sub(1)
            .and_then(|slot| inner.descriptors.get(slot))
            .ok_or(FetchError::OutOfRange {
                index,
                page_count: inner.descriptors.len(),
            })?;

        let descriptor = slot
            .get_or_try_init(|| async move {
                if inner.teardown.is_cancelled() {
                    return Err(FetchError::Cancelled { index });
                }
                tokio::select! {
                    biased;
                    _ = inner.teardown.cancelled() => Err(FetchError::Cancelled { index }),
                    fetched = inner.document.page(index) => {
                        fetched.map_err(|source| FetchError::Backend { index, source })
                    }
                }
            })
            .await?;
        Ok(Arc::clone(descriptor))
    }

    /// Rasterizes `index` unless it is already rendered (or rendering) at its target scale.
    ///
    /// Failures are logged here and reported only through the outcome.
    #[instrument(skip(self), level = "debug")]
    pub async fn render_if_needed(&self, index: usize) -> RenderOutcome {
        let descriptor = match self.ensure_page_descriptor(index).await {
            Ok(descriptor) => descriptor,
            Err(FetchError::OutOfRange { .. }) => return RenderOutcome::UnknownPage,
            Err(FetchError::Cancelled { .. }) => {
                trace!(page = index, "page fetch cancelled");
                return RenderOutcome::Cancelled;
            }
            Err(err) => {
                error!(page = index, error = %err, "failed to fetch page");
                return RenderOutcome::Failed;
            }
        };

        let (ticket_id, scale, generation, cancel) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let Some(page) = state.pages.get_mut(index - 1) else {
                return RenderOutcome::UnknownPage;
            };
            let intrinsic = *page
                .intrinsic
                .get_or_insert_with(|| descriptor.intrinsic_size());
            let target = state.view.scale_for(intrinsic, state.viewport);
            let generation = state.view.generation();

            if page
                .rendered_scale
                .is_some_and(|rendered| (rendered - target).abs() < SCALE_EPSILON)
            {
                if let Some(stale) = page.in_flight.take() {
                    stale.cancel.cancel();
                }
                return RenderOutcome::UpToDate;
            }

            if let Some(current) = page.in_flight.take() {
                if current.generation == generation
                    && (current.scale - target).abs() < SCALE_EPSILON
                {
                    page.in_flight = Some(current);
                    return RenderOutcome::InFlight;
                }
                trace!(page = index, ticket = current.id, "superseding render");
                current.cancel.cancel();
            }

            state.next_ticket += 1;
            let ticket = RenderTicket {
                id: state.next_ticket,
                scale: target,
                generation,
                cancel: CancellationToken::new(),
            };
            let handle = (ticket.id, ticket.scale, ticket.generation, ticket.cancel.clone());
            page.in_flight = Some(ticket);
            handle
        };

        let result = descriptor.render(scale, cancel).await;

        let outcome = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let current_generation = state.view.generation();
            let Some(page) = state.pages.get_mut(index - 1) else {
                return RenderOutcome::UnknownPage;
            };
            let is_current = page
                .in_flight
                .as_ref()
                .is_some_and(|ticket| ticket.id == ticket_id);
            if is_current {
                page.in_flight = None;
            }

            match result {
                Ok(image) if is_current && generation == current_generation => {
                    page.region = region_size(page.layout_size(), scale);
                    page.rendered_scale = Some(scale);
                    page.image = Some(Arc::new(image));
                    RenderOutcome::Rendered { scale }
                }
                Ok(_) => {
                    debug!(
                        page = index,
                        generation,
                        current_generation,
                        "discarding stale render"
                    );
                    RenderOutcome::Discarded
                }
                Err(RenderError::Cancelled) => {
                    trace!(page = index, "render cancelled");
                    RenderOutcome::Cancelled
                }
                Err(err) => {
                    error!(page = index, scale, error = %err, "failed to render page");
                    RenderOutcome::Failed
                }
            }
        };

        if matches!(outcome, RenderOutcome::Rendered { .. }) {
            self.inner
                .events
                .lock()
                .push(ViewerEvent::PageRendered(index));
        }
        outcome
    }

    /// Cancels all in-flight renders and pending descriptor fetches.
    pub fn shutdown(&self) {
        self.inner.teardown.cancel();
        let mut state = self.inner.state.lock();
        for page in &mut state.pages {
            if let Some(ticket) = page.in_flight.take() {
                ticket.cancel.cancel();
            }
        }
    }
}
