use crate::geometry::Point;
use crate::surface::Surface;

/// Page-relative scroll reference that survives region resizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportAnchor {
    /// 1-based page index.
    pub page: usize,
    /// Vertical position of the scroll top within the page region, `0..=1`.
    pub rel_y: f32,
    /// Horizontal centre of the viewport as a fraction of the content width.
    pub x_ratio: f32,
}

impl Default for ViewportAnchor {
    fn default() -> Self {
        Self {
            page: 1,
            rel_y: 0.0,
            x_ratio: 0.5,
        }
    }
}

/// Anchors on the first region whose bottom edge lies below the scroll top.
///
/// A scroll top sitting in the gap above that region yields `rel_y == 0`.
pub fn capture_anchor<S: Surface + ?Sized>(surface: &S) -> ViewportAnchor {
    let scroll = surface.scroll_offset();
    let viewport = surface.viewport();
    let content_width = surface.content_size().width.max(1.0);
    let x_ratio = (scroll.x + viewport.width / 2.0) / content_width;

    surface
        .regions()
        .iter()
        .enumerate()
        .find(|(_, rect)| rect.bottom() > scroll.y)
        .map(|(slot, rect)| {
            let height = if rect.height > 0.0 { rect.height } else { 1.0 };
            ViewportAnchor {
                page: slot + 1,
                rel_y: ((scroll.y - rect.y) / height).clamp(0.0, 1.0),
                x_ratio,
            }
        })
        .unwrap_or_default()
}

/// Scrolls so the anchor's page-relative point is back at the scroll top and the
/// horizontal centre ratio is preserved. Returns `false` when the page has no region.
pub fn restore_anchor<S: Surface + ?Sized>(surface: &mut S, anchor: &ViewportAnchor) -> bool {
    let Some(rect) = surface.region(anchor.page) else {
        return false;
    };

    let viewport = surface.viewport();
    let content_width = surface.content_size().width.max(1.0);
    let max = surface.max_scroll();

    let height = if rect.height > 0.0 { rect.height } else { 1.0 };
    let top = (rect.y + anchor.rel_y * height).clamp(0.0, max.y);
    let left = (anchor.x_ratio * content_width - viewport.width / 2.0).clamp(0.0, max.x);

    surface.scroll_to(Point::new(left, top));
    true
}
