use crate::geometry::{self, FitMode, Size};

pub const ZOOM_MIN: f32 = 0.4;
pub const ZOOM_MAX: f32 = 3.5;
/// Multiplicative step used by zoom in / zoom out.
pub const ZOOM_STEP: f32 = 1.12;
pub(crate) const ZOOM_EPSILON: f32 = 0.0001;

/// Zoom, fit and layout of the viewer plus the render generation.
///
/// Mutators are crate-private: outside code changes the view only through
/// [`crate::Viewer::commit_view_change`].
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    fit_mode: FitMode,
    zoom: f32,
    double_page: bool,
    generation: u64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            fit_mode: FitMode::Width,
            zoom: 1.0,
            double_page: false,
            generation: 0,
        }
    }
}

impl ViewState {
    pub fn new(fit_mode: FitMode, zoom: f32, double_page: bool) -> Self {
        Self {
            fit_mode,
            zoom: Self::clamp_zoom(zoom),
            double_page,
            generation: 0,
        }
    }

    pub fn clamp_zoom(zoom: f32) -> f32 {
        if zoom.is_nan() {
            1.0
        } else {
            zoom.clamp(ZOOM_MIN, ZOOM_MAX)
        }
    }

    pub fn fit_mode(&self) -> FitMode {
        self.fit_mode
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn double_page(&self) -> bool {
        self.double_page
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pages_per_row(&self) -> u32 {
        geometry::pages_per_row(self.double_page)
    }

    pub fn scale_for(&self, intrinsic: Size, viewport: Size) -> f32 {
        geometry::compute_scale(
            intrinsic,
            viewport,
            self.fit_mode,
            self.zoom,
            self.pages_per_row(),
        )
    }

    pub(crate) fn set_fit_mode(&mut self, fit_mode: FitMode) {
        self.fit_mode = fit_mode;
    }

    /// Returns whether the stored zoom changed.
    pub(crate) fn set_zoom(&mut self, zoom: f32) -> bool {
        let clamped = Self::clamp_zoom(zoom);
        let changed = (clamped - self.zoom).abs() >= ZOOM_EPSILON;
        self.zoom = clamped;
        changed
    }

    pub(crate) fn set_double_page(&mut self, double_page: bool) {
        self.double_page = double_page;
    }

    pub(crate) fn advance_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}
