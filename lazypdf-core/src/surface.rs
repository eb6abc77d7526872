//! The host's scrollable canvas, as seen by the engine.

use crate::geometry::{Point, Rect, Size, PAGE_GAP};

/// Viewport geometry provider implemented by the host.
///
/// Region rectangles are in content coordinates and reflect the sizes last passed to
/// [`apply_layout`](Surface::apply_layout), which the viewer calls once per frame.
pub trait Surface {
    /// Inner size of the visible area.
    fn viewport(&self) -> Size;

    /// Host-side resize. Region positions are refreshed by the next layout pass.
    fn set_viewport(&mut self, viewport: Size);

    fn scroll_offset(&self) -> Point;

    /// Scrolls to `offset`, clamped to the valid range.
    fn scroll_to(&mut self, offset: Point);

    /// Total scrollable extent. Never smaller than the viewport.
    fn content_size(&self) -> Size;

    /// Measured page regions in document order; slot `i` holds page `i + 1`.
    fn regions(&self) -> &[Rect];

    fn apply_layout(&mut self, region_sizes: &[Size], double_page: bool);

    fn region(&self, page: usize) -> Option<Rect> {
        page.checked_sub(1)
            .and_then(|slot| self.regions().get(slot))
            .copied()
    }

    fn max_scroll(&self) -> Point {
        let viewport = self.viewport();
        let content = self.content_size();
        Point::new(
            (content.width - viewport.width).max(0.0),
            (content.height - viewport.height).max(0.0),
        )
    }
}

/// Continuous vertical flow of page regions.
///
/// Rows hold one page, or two in double-page mode, and are centred horizontally. Rows are
/// separated by [`PAGE_GAP`]; the content is padded by the same gap on the sides and at
/// the bottom, while the first row starts at the very top.
#[derive(Debug, Clone, Default)]
pub struct FlowSurface {
    viewport: Size,
    scroll: Point,
    content: Size,
    rects: Vec<Rect>,
}

impl FlowSurface {
    pub fn new(viewport: Size) -> Self {
        Self {
            viewport,
            content: viewport,
            ..Self::default()
        }
    }

    pub fn scroll_by(&mut self, dx: f32, dy: f32) {
        let offset = Point::new(self.scroll.x + dx, self.scroll.y + dy);
        self.scroll_to(offset);
    }

    fn clamp_scroll(&mut self) {
        let max = self.max_scroll();
        self.scroll.x = self.scroll.x.clamp(0.0, max.x);
        self.scroll.y = self.scroll.y.clamp(0.0, max.y);
    }
}

impl Surface for FlowSurface {
    fn viewport(&self) -> Size {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
        self.content.width = self.content.width.max(viewport.width);
        self.content.height = self.content.height.max(viewport.height);
        self.clamp_scroll();
    }

    fn scroll_offset(&self) -> Point {
        self.scroll
    }

    fn scroll_to(&mut self, offset: Point) {
        let x = if offset.x.is_finite() { offset.x } else { 0.0 };
        let y = if offset.y.is_finite() { offset.y } else { 0.0 };
        self.scroll = Point::new(x, y);
        self.clamp_scroll();
    }

    fn content_size(&self) -> Size {
        self.content
    }

    fn regions(&self) -> &[Rect] {
        &self.rects
    }

    fn apply_layout(&mut self, region_sizes: &[Size], double_page: bool) {
        let per_row = if double_page { 2 } else { 1 };
        let rows: Vec<&[Size]> = region_sizes.chunks(per_row).collect();

        let row_width = |row: &[Size]| -> f32 {
            row.iter().map(|size| size.width).sum::<f32>()
                + PAGE_GAP * row.len().saturating_sub(1) as f32
        };
        let widest = rows.iter().map(|row| row_width(row)).fold(0.0, f32::max);
        let content_width = (widest + 2.0 * PAGE_GAP).max(self.viewport.width);

        self.rects.clear();
        self.rects.reserve(region_sizes.len());
        let mut y = 0.0;
        for row in &rows {
            let mut x = (content_width - row_width(row)) / 2.0;
            let mut row_height: f32 = 0.0;
            for size in row.iter() {
                self.rects.push(Rect::new(x, y, size.width, size.height));
                x += size.width + PAGE_GAP;
                row_height = row_height.max(size.height);
            }
            y += row_height + PAGE_GAP;
        }

        self.content = Size::new(content_width, y.max(self.viewport.height));
        self.clamp_scroll();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_column_stacks_regions_with_gaps() {
        let mut surface = FlowSurface::new(Size::new(1000.0, 800.0));
        surface.apply_layout(&[Size::new(600.0, 700.0); 3], false);

        let regions = surface.regions();
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0], Rect::new(200.0, 0.0, 600.0, 700.0));
        assert_eq!(regions[1].y, 700.0 + PAGE_GAP);
        assert_eq!(regions[2].y, 2.0 * (700.0 + PAGE_GAP));
        assert_eq!(surface.content_size().height, 3.0 * (700.0 + PAGE_GAP));
        assert_eq!(surface.region(2), Some(regions[1]));
        assert_eq!(surface.region(0), None);
        assert_eq!(surface.region(4), None);
    }

    #[test]
    fn double_page_rows_are_centred_side_by_side() {
        let mut surface = FlowSurface::new(Size::new(1000.0, 800.0));
        surface.apply_layout(&[Size::new(400.0, 500.0); 3], true);

        let regions = surface.regions();
        let row_width = 2.0 * 400.0 + PAGE_GAP;
        let left = (1000.0 - row_width) / 2.0;
        assert_eq!(regions[0], Rect::new(left, 0.0, 400.0, 500.0));
        assert_eq!(regions[1], Rect::new(left + 400.0 + PAGE_GAP, 0.0, 400.0, 500.0));
        // the odd page out sits alone, centred, on the second row
        assert_eq!(regions[2], Rect::new(300.0, 500.0 + PAGE_GAP, 400.0, 500.0));
    }

    #[test]
    fn wide_content_grows_scrollable_width() {
        let mut surface = FlowSurface::new(Size::new(500.0, 400.0));
        surface.apply_layout(&[Size::new(900.0, 1200.0)], false);
        assert_eq!(surface.content_size().width, 900.0 + 2.0 * PAGE_GAP);
        assert_eq!(surface.regions()[0].x, PAGE_GAP);
        assert_eq!(surface.max_scroll().x, 900.0 + 2.0 * PAGE_GAP - 500.0);
    }

    #[test]
    fn scrolling_clamps_to_content() {
        let mut surface = FlowSurface::new(Size::new(1000.0, 800.0));
        surface.apply_layout(&[Size::new(600.0, 700.0); 2], false);
        surface.scroll_by(0.0, 10_000.0);
        assert_eq!(surface.scroll_offset().y, surface.max_scroll().y);
        surface.scroll_to(Point::new(-5.0, f32::NAN));
        assert_eq!(surface.scroll_offset(), Point::new(0.0, 0.0));
    }

    #[test]
    fn shrinking_layout_pulls_scroll_back_into_range() {
        let mut surface = FlowSurface::new(Size::new(1000.0, 800.0));
        surface.apply_layout(&[Size::new(600.0, 2000.0); 4], false);
        surface.scroll_to(Point::new(0.0, 6000.0));
        surface.apply_layout(&[Size::new(300.0, 1000.0); 4], false);
        assert_eq!(surface.scroll_offset().y, surface.max_scroll().y);
    }
}
