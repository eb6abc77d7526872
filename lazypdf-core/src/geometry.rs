//! Scale computation and the small geometric types shared by the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseFitModeError;

/// Gap between page regions, in surface pixels.
pub const PAGE_GAP: f32 = 24.0;

/// Fraction of the viewport a fitted page may occupy.
pub const VIEWPORT_MARGIN: f32 = 0.96;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    #[default]
    Width,
    Height,
}

impl FitMode {
    pub fn toggled(self) -> Self {
        match self {
            FitMode::Width => FitMode::Height,
            FitMode::Height => FitMode::Width,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FitMode::Width => "width",
            FitMode::Height => "height",
        }
    }
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FitMode {
    type Err = ParseFitModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "width" | "w" => Ok(FitMode::Width),
            "height" | "h" => Ok(FitMode::Height),
            _ => Err(ParseFitModeError(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// True when the rect overlaps the open vertical band `(top, bottom)`.
    pub fn overlaps_band(&self, top: f32, bottom: f32) -> bool {
        self.bottom() > top && self.y < bottom
    }
}

pub fn pages_per_row(double_page: bool) -> u32 {
    if double_page {
        2
    } else {
        1
    }
}

/// Target render scale for a page of `intrinsic` size shown in `viewport`.
///
/// Width mode splits the usable width between the pages of a row (minus the gaps
/// between them); height mode fits one page height. Both are multiplied by `zoom`.
/// Non-positive or non-finite inputs are treated as 1 so the result is always > 0.
pub fn compute_scale(
    intrinsic: Size,
    viewport: Size,
    fit: FitMode,
    zoom: f32,
    pages_per_row: u32,
) -> f32 {
    let per_row = pages_per_row.max(1) as f32;
    let zoom = positive_or_one(zoom);
    let base = match fit {
        FitMode::Width => {
            let available = (positive_or_one(viewport.width) * VIEWPORT_MARGIN
                - (per_row - 1.0) * PAGE_GAP)
                .max(1.0);
            (available / per_row) / positive_or_one(intrinsic.width)
        }
        FitMode::Height => {
            let available = (positive_or_one(viewport.height) * VIEWPORT_MARGIN).max(1.0);
            available / positive_or_one(intrinsic.height)
        }
    };
    base * zoom
}

/// Pixel size of a page region at `scale`, floored and never smaller than 1×1.
pub fn region_size(intrinsic: Size, scale: f32) -> Size {
    Size::new(
        (intrinsic.width * scale).floor().max(1.0),
        (intrinsic.height * scale).floor().max(1.0),
    )
}

fn positive_or_one(value: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LETTER: Size = Size::new(612.0, 792.0);

    #[test]
    fn width_fit_uses_viewport_margin() {
        let scale = compute_scale(LETTER, Size::new(1000.0, 800.0), FitMode::Width, 1.0, 1);
        assert!((scale - 960.0 / 612.0).abs() < 1e-6);
    }

    #[test]
    fn double_page_subtracts_gap_and_splits_width() {
        let scale = compute_scale(LETTER, Size::new(1000.0, 800.0), FitMode::Width, 1.0, 2);
        let expected = ((1000.0 * 0.96 - PAGE_GAP) / 2.0) / 612.0;
        assert!((scale - expected).abs() < 1e-6);
    }

    #[test]
    fn height_fit_ignores_pages_per_row() {
        let single = compute_scale(LETTER, Size::new(1000.0, 800.0), FitMode::Height, 1.5, 1);
        let double = compute_scale(LETTER, Size::new(1000.0, 800.0), FitMode::Height, 1.5, 2);
        assert_eq!(single, double);
        assert!((single - 768.0 / 792.0 * 1.5).abs() < 1e-6);
    }

    #[test]
    fn scale_is_monotonic_in_zoom_and_viewport() {
        for fit in [FitMode::Width, FitMode::Height] {
            let mut previous = 0.0;
            for step in 1..=30 {
                let zoom = 0.4 + step as f32 * 0.1;
                let scale = compute_scale(LETTER, Size::new(900.0, 700.0), fit, zoom, 2);
                assert!(scale > previous, "{fit} zoom {zoom}");
                previous = scale;
            }

            let mut previous = 0.0;
            for step in 1..=30 {
                let extent = 200.0 + step as f32 * 50.0;
                let scale = compute_scale(LETTER, Size::new(extent, extent), fit, 1.0, 1);
                assert!(scale > previous, "{fit} extent {extent}");
                previous = scale;
            }
        }
    }

    #[test]
    fn degenerate_inputs_still_give_positive_scale() {
        let tiny = compute_scale(Size::new(0.0, -3.0), Size::new(0.0, 0.0), FitMode::Width, 0.0, 2);
        assert!(tiny > 0.0);
        let nan = compute_scale(LETTER, Size::new(f32::NAN, 10.0), FitMode::Height, f32::NAN, 1);
        assert!(nan > 0.0 && nan.is_finite());
    }

    #[test]
    fn region_size_floors_and_clamps() {
        assert_eq!(region_size(LETTER, 0.5), Size::new(306.0, 396.0));
        assert_eq!(region_size(Size::new(10.7, 3.3), 1.0), Size::new(10.0, 3.0));
        assert_eq!(region_size(LETTER, 0.0), Size::new(1.0, 1.0));
    }

    #[test]
    fn fit_mode_parses_and_toggles() {
        assert_eq!("Height".parse::<FitMode>().unwrap(), FitMode::Height);
        assert_eq!("w".parse::<FitMode>().unwrap(), FitMode::Width);
        assert!("page".parse::<FitMode>().is_err());
        assert_eq!(FitMode::Width.toggled(), FitMode::Height);
    }
}
