use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use parking_lot::Mutex;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, instrument, warn};

use crate::anchor::{capture_anchor, restore_anchor, ViewportAnchor};
use crate::config::Config;
use crate::error::LoadError;
use crate::geometry::{FitMode, Size};
use crate::scheduler::{EngineState, PageSnapshot, RenderOutcome, RenderScheduler};
use crate::surface::Surface;
use crate::view_state::{ViewState, ZOOM_EPSILON, ZOOM_STEP};
use crate::visibility::{Debouncer, VisibilityTracker};
use crate::{DocumentInfo, DocumentProvider, HostShell, ViewerEvent};

/// How long the reason of the last view change stays in the status line.
pub const HUD_TIMEOUT: Duration = Duration::from_millis(900);

/// Mutable access to the view inside [`Viewer::commit_view_change`].
pub struct ViewTransaction<'a> {
    state: &'a mut EngineState,
}

impl ViewTransaction<'_> {
    pub fn view(&self) -> &ViewState {
        &self.state.view
    }

    pub fn viewport(&self) -> Size {
        self.state.viewport
    }

    pub fn set_fit_mode(&mut self, fit_mode: FitMode) {
        self.state.view.set_fit_mode(fit_mode);
    }

    /// Clamps to the zoom range. Returns whether the zoom changed.
    pub fn set_zoom(&mut self, zoom: f32) -> bool {
        self.state.view.set_zoom(zoom)
    }

    pub fn set_double_page(&mut self, double_page: bool) {
        self.state.view.set_double_page(double_page);
    }

    pub fn set_viewport(&mut self, viewport: Size) {
        self.state.viewport = viewport;
    }

    /// Advances the render generation and resizes every region to its new target.
    pub fn mark_all_dirty(&mut self) -> u64 {
        self.state.mark_all_dirty()
    }
}

/// Orchestrates one document on one surface.
///
/// The host drives it with [`on_frame`](Self::on_frame) after each batch of input and
/// whenever [`next_deadline`](Self::next_deadline) elapses.
pub struct Viewer<S: Surface> {
    surface: S,
    /// View used for the next document, and reported while none is open.
    preferences: ViewState,
    scheduler: Option<RenderScheduler>,
    load_error: Option<String>,
    tracker: VisibilityTracker,
    debouncer: Debouncer,
    pending_anchor: Option<ViewportAnchor>,
    sweep_now: bool,
    last_layout: Vec<Size>,
    last_viewport: Size,
    last_reason: Option<(&'static str, Instant)>,
    events: Arc<Mutex<Vec<ViewerEvent>>>,
    renders: JoinSet<RenderOutcome>,
}

impl<S: Surface> Viewer<S> {
    pub fn new(surface: S, config: &Config) -> Self {
        Self {
            surface,
            preferences: ViewState::default(),
            scheduler: None,
            load_error: None,
            tracker: VisibilityTracker::new(config.prefetch_ratio, config.sweep_margin_px),
            debouncer: Debouncer::new(config.debounce),
            pending_anchor: None,
            sweep_now: false,
            last_layout: Vec::new(),
            last_viewport: Size::default(),
            last_reason: None,
            events: Arc::new(Mutex::new(Vec::new())),
            renders: JoinSet::new(),
        }
    }

    /// Fit, zoom and layout applied to the next opened document.
    pub fn with_initial_view(mut self, view: ViewState) -> Self {
        self.preferences = view;
        self
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Scrolling through this is picked up by passive observation on the next frame.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn drain_events(&self) -> Vec<ViewerEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn is_loaded(&self) -> bool {
        self.scheduler.is_some()
    }

    pub fn document_info(&self) -> Option<&DocumentInfo> {
        self.scheduler
            .as_ref()
            .map(|scheduler| scheduler.document().info())
    }

    pub fn page_count(&self) -> usize {
        self.scheduler
            .as_ref()
            .map_or(0, RenderScheduler::page_count)
    }

    /// Message to show in place of the document after a failed open.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    pub fn view(&self) -> ViewState {
        match &self.scheduler {
            Some(scheduler) => scheduler.view(),
            None => self.preferences.clone(),
        }
    }

    pub fn page(&self, index: usize) -> Option<PageSnapshot> {
        self.scheduler.as_ref()?.page(index)
    }

    /// Page under the top of the viewport.
    pub fn current_page(&self) -> Option<usize> {
        self.scheduler.as_ref()?;
        Some(capture_anchor(&self.surface).page)
    }

    /// Tears down the current document, then opens `path`.
    ///
    /// On failure the viewer stays empty and [`load_error`](Self::load_error) holds the
    /// message for the content area.
    #[instrument(skip(self, provider))]
    pub async fn open<P>(&mut self, provider: &P, path: &Path) -> Result<(), LoadError>
    where
        P: DocumentProvider + ?Sized,
    {
        self.close();

        match self.load(provider, path).await {
            Ok(scheduler) => {
                let page_count = scheduler.page_count();
                info!(path = ?path, page_count, "document loaded");
                self.scheduler = Some(scheduler);
                self.sweep_now = true;
                self.events
                    .lock()
                    .push(ViewerEvent::DocumentLoaded { page_count });
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "failed to load document");
                let message = err.to_string();
                self.load_error = Some(message.clone());
                self.events.lock().push(ViewerEvent::LoadFailed(message));
                Err(err)
            }
        }
    }

    async fn load<P>(&self, provider: &P, path: &Path) -> Result<RenderScheduler, LoadError>
    where
        P: DocumentProvider + ?Sized,
    {
        let wrap = |source: anyhow::Error| LoadError {
            path: path.to_path_buf(),
            source,
        };

        let document = provider.open(path).await.map_err(wrap)?;
        if document.page_count() == 0 {
            return Err(wrap(anyhow!("document has no pages")));
        }
        let first = document
            .page(1)
            .await
            .context("failed to read the first page")
            .map_err(wrap)?;

        let view = ViewState::new(
            self.preferences.fit_mode(),
            self.preferences.zoom(),
            self.preferences.double_page(),
        );
        let scheduler = RenderScheduler::new(
            document,
            view,
            self.surface.viewport(),
            first.intrinsic_size(),
            Arc::clone(&self.events),
        );
        scheduler.seed_descriptor(1, first);
        Ok(scheduler)
    }

    /// Cancels outstanding work and forgets the document. The view settings are kept for
    /// the next open.
    pub fn close(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            let view = scheduler.view();
            self.preferences = ViewState::new(view.fit_mode(), view.zoom(), view.double_page());
            scheduler.shutdown();
            debug!("document closed");
        }
        self.renders.abort_all();
        self.load_error = None;
        self.tracker.reset();
        self.debouncer.cancel();
        self.pending_anchor = None;
        self.sweep_now = false;
        self.last_layout.clear();
        self.last_viewport = Size::default();
        self.surface.apply_layout(&[], false);
        self.surface.scroll_to(Default::default());
    }

    /// Runs `mutate` as one view change: the scroll anchor is captured before and
    /// restored on the next frame, followed by a debounced sweep.
    ///
    /// Returns `false`, without calling `mutate`, when no document is loaded.
    pub fn commit_view_change(
        &mut self,
        reason: &'static str,
        mutate: impl FnOnce(&mut ViewTransaction<'_>),
    ) -> bool {
        self.commit(reason, true, mutate)
    }

    fn commit(
        &mut self,
        reason: &'static str,
        show: bool,
        mutate: impl FnOnce(&mut ViewTransaction<'_>),
    ) -> bool {
        let Some(scheduler) = &self.scheduler else {
            return false;
        };
        // an anchor still waiting for its frame is more accurate than a fresh capture
        let anchor = self
            .pending_anchor
            .take()
            .unwrap_or_else(|| capture_anchor(&self.surface));

        let view = scheduler.transact(|state| {
            mutate(&mut ViewTransaction { state });
            state.view.clone()
        });
        debug!(
            reason,
            generation = view.generation(),
            zoom = view.zoom(),
            fit = %view.fit_mode(),
            double_page = view.double_page(),
            page = anchor.page,
            "view change"
        );

        self.pending_anchor = Some(anchor);
        if show {
            self.last_reason = Some((reason, Instant::now()));
        }
        true
    }

    /// Choosing a fit mode resets zoom to 100%.
    pub fn set_fit_mode(&mut self, fit_mode: FitMode) -> bool {
        let reason = match fit_mode {
            FitMode::Width => "fit width",
            FitMode::Height => "fit height",
        };
        self.commit_view_change(reason, |tx| {
            tx.set_fit_mode(fit_mode);
            tx.set_zoom(1.0);
            tx.mark_all_dirty();
        })
    }

    pub fn toggle_fit_mode(&mut self) -> bool {
        let fit_mode = self.view().fit_mode().toggled();
        self.set_fit_mode(fit_mode)
    }

    /// Also resets zoom to 100%.
    pub fn toggle_double_page(&mut self) -> bool {
        let double_page = !self.view().double_page();
        let reason = if double_page { "double page" } else { "single page" };
        self.commit_view_change(reason, |tx| {
            tx.set_double_page(double_page);
            tx.set_zoom(1.0);
            tx.mark_all_dirty();
        })
    }

    /// Clamped to the zoom range; changes below the zoom epsilon are ignored.
    pub fn set_zoom(&mut self, zoom: f32) -> bool {
        self.apply_zoom("zoom", zoom)
    }

    pub fn zoom_in(&mut self) -> bool {
        let zoom = self.view().zoom() * ZOOM_STEP;
        self.apply_zoom("zoom in", zoom)
    }

    pub fn zoom_out(&mut self) -> bool {
        let zoom = self.view().zoom() / ZOOM_STEP;
        self.apply_zoom("zoom out", zoom)
    }

    pub fn reset_zoom(&mut self) -> bool {
        self.apply_zoom("zoom reset", 1.0)
    }

    fn apply_zoom(&mut self, reason: &'static str, zoom: f32) -> bool {
        let current = self.view().zoom();
        if (ViewState::clamp_zoom(zoom) - current).abs() < ZOOM_EPSILON {
            return false;
        }
        self.commit_view_change(reason, |tx| {
            tx.set_zoom(zoom);
            tx.mark_all_dirty();
        })
    }

    /// Host resize, including entering or leaving fullscreen.
    pub fn viewport_changed(&mut self, viewport: Size) -> bool {
        if self.surface.viewport() == viewport {
            return false;
        }
        let committed = self.commit("resize", false, |tx| {
            tx.set_viewport(viewport);
            tx.mark_all_dirty();
        });
        self.surface.set_viewport(viewport);
        committed
    }

    /// Fire-and-forget; the host reports the resulting resize through
    /// [`viewport_changed`](Self::viewport_changed).
    pub fn toggle_fullscreen(&mut self, host: &dyn HostShell) {
        debug!("fullscreen toggle requested");
        host.request_fullscreen_toggle();
        self.last_reason = Some(("fullscreen", Instant::now()));
    }

    /// Scrolls `page` to the top of the viewport on the next frame.
    pub fn go_to_page(&mut self, page: usize) -> bool {
        let page_count = self.page_count();
        if page_count == 0 {
            return false;
        }
        let mut anchor = capture_anchor(&self.surface);
        anchor.page = page.clamp(1, page_count);
        anchor.rel_y = 0.0;
        self.pending_anchor = Some(anchor);
        true
    }

    /// One host frame: lays out the surface, restores a pending anchor, then starts
    /// renders for pages that came into range.
    pub fn on_frame(&mut self, now: Instant) {
        self.reap_renders();
        let Some(scheduler) = self.scheduler.clone() else {
            return;
        };

        let regions = scheduler.region_sizes();
        let viewport = self.surface.viewport();
        if regions != self.last_layout || viewport != self.last_viewport {
            // committed renders and resizes both move regions; keep the reader's place
            let anchor = match self.pending_anchor.take() {
                Some(anchor) => Some((anchor, true)),
                None if !self.last_layout.is_empty() => {
                    Some((capture_anchor(&self.surface), false))
                }
                None => None,
            };
            self.surface
                .apply_layout(&regions, scheduler.view().double_page());
            self.last_layout = regions;
            self.last_viewport = viewport;
            self.pending_anchor = None;
            if let Some((anchor, from_transaction)) = anchor {
                self.restore(&anchor, from_transaction, now);
            }
        } else if let Some(anchor) = self.pending_anchor.take() {
            self.restore(&anchor, true, now);
        }

        let mut wanted: BTreeSet<usize> = self.tracker.observe(&self.surface).into_iter().collect();
        let sweep_due = self.debouncer.fire(now);
        if std::mem::take(&mut self.sweep_now) || sweep_due {
            wanted.extend(self.tracker.sweep(&self.surface));
        }

        for page in wanted {
            let scheduler = scheduler.clone();
            self.renders
                .spawn(async move { scheduler.render_if_needed(page).await });
        }
    }

    fn restore(&mut self, anchor: &ViewportAnchor, from_transaction: bool, now: Instant) {
        restore_anchor(&mut self.surface, anchor);
        if from_transaction {
            self.debouncer.schedule(now);
        }
    }

    fn reap_renders(&mut self) {
        while let Some(joined) = self.renders.try_join_next() {
            log_join(joined);
        }
    }

    /// Waits for every render started so far.
    pub async fn settle(&mut self) {
        while let Some(joined) = self.renders.join_next().await {
            log_join(joined);
        }
    }

    pub fn has_pending_renders(&self) -> bool {
        !self.renders.is_empty()
    }

    /// Time until the viewer needs another frame without new input.
    pub fn next_deadline(&self, now: Instant) -> Option<Duration> {
        let sweep = self.debouncer.time_until_due(now);
        let hud = self
            .last_reason
            .map(|(_, at)| (at + HUD_TIMEOUT).saturating_duration_since(now))
            .filter(|left| !left.is_zero());
        match (sweep, hud) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Status line: layout, fit and zoom, prefixed with the last change while it is fresh.
    pub fn status(&self, now: Instant) -> String {
        let view = self.view();
        let line = format!(
            "{} | fit:{} | zoom:{}%",
            if view.double_page() { "2p" } else { "1p" },
            view.fit_mode(),
            (view.zoom() * 100.0).round() as i32
        );
        match self.last_reason {
            Some((reason, at)) if now.saturating_duration_since(at) < HUD_TIMEOUT => {
                format!("{reason} | {line}")
            }
            _ => line,
        }
    }
}

impl<S: Surface> Drop for Viewer<S> {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown();
        }
    }
}

fn log_join(joined: Result<RenderOutcome, JoinError>) {
    match joined {
        Ok(outcome) => debug!(?outcome, "render task finished"),
        Err(err) if err.is_cancelled() => {}
        Err(err) => warn!(error = %err, "render task panicked"),
    }
}
