//! Paints the visible part of the page flow into one RGBA frame.

use std::sync::Arc;

use lazypdf_core::{Rect, RenderImage, Surface};
use rayon::prelude::*;

pub const BACKGROUND: [u8; 4] = [0x0b, 0x0b, 0x0f, 0xff];
/// Fill for pages that have no pixels yet.
pub const PLACEHOLDER: [u8; 4] = [0x2a, 0x2a, 0x31, 0xff];

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// One page region intersecting the viewport, with its committed pixels if any.
#[derive(Debug, Clone)]
pub struct VisiblePage {
    pub rect: Rect,
    pub image: Option<Arc<RenderImage>>,
}

/// Regions of `surface` overlapping the viewport, paired with their images.
pub fn visible_pages<S, F>(surface: &S, mut image_for: F) -> Vec<VisiblePage>
where
    S: Surface + ?Sized,
    F: FnMut(usize) -> Option<Arc<RenderImage>>,
{
    let scroll = surface.scroll_offset();
    let viewport = surface.viewport();
    surface
        .regions()
        .iter()
        .enumerate()
        .filter(|(_, rect)| {
            rect.overlaps_band(scroll.y, scroll.y + viewport.height)
                && rect.right() > scroll.x
                && rect.x < scroll.x + viewport.width
        })
        .map(|(slot, rect)| VisiblePage {
            rect: *rect,
            image: image_for(slot + 1),
        })
        .collect()
}

/// Composes a `width`×`height` frame of the viewport at `origin` (content coordinates).
///
/// Images whose size differs from their region, e.g. after a zoom that has not been
/// re-rendered yet, are stretched with nearest-neighbour sampling.
pub fn compose(width: u32, height: u32, origin: (f32, f32), pages: &[VisiblePage]) -> Frame {
    let width = width.max(1);
    let height = height.max(1);
    let stride = width as usize * 4;
    let mut pixels = vec![0u8; stride * height as usize];

    pixels
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(row, line)| {
            for px in line.chunks_exact_mut(4) {
                px.copy_from_slice(&BACKGROUND);
            }
            let y = origin.1 + row as f32;
            for page in pages {
                let rect = page.rect;
                if y < rect.y || y >= rect.bottom() || rect.width <= 0.0 {
                    continue;
                }
                let first = (rect.x - origin.0).max(0.0).floor() as usize;
                let last = ((rect.right() - origin.0).min(width as f32)).ceil().max(0.0) as usize;
                if first >= last {
                    continue;
                }
                paint_span(line, first, last, y, origin.0, rect, page.image.as_deref());
            }
        });

    Frame {
        width,
        height,
        pixels,
    }
}

fn paint_span(
    line: &mut [u8],
    first: usize,
    last: usize,
    y: f32,
    origin_x: f32,
    rect: Rect,
    image: Option<&RenderImage>,
) {
    let source = image.filter(|image| {
        image.width > 0
            && image.height > 0
            && image.pixels.len() >= image.width as usize * image.height as usize * 4
    });
    let Some(image) = source else {
        for px in line[first * 4..last * 4].chunks_exact_mut(4) {
            px.copy_from_slice(&PLACEHOLDER);
        }
        return;
    };

    let sy = (((y - rect.y) / rect.height) * image.height as f32) as usize;
    let sy = sy.min(image.height as usize - 1);
    let src_row = &image.pixels[sy * image.width as usize * 4..][..image.width as usize * 4];
    for x in first..last {
        let cx = origin_x + x as f32 - rect.x;
        let sx = ((cx / rect.width) * image.width as f32).max(0.0) as usize;
        let sx = sx.min(image.width as usize - 1);
        line[x * 4..x * 4 + 4].copy_from_slice(&src_row[sx * 4..sx * 4 + 4]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazypdf_core::{FlowSurface, Point, Size};

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Arc<RenderImage> {
        Arc::new(RenderImage {
            width,
            height,
            pixels: rgba.repeat((width * height) as usize),
        })
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 4] {
        let offset = ((y * frame.width + x) * 4) as usize;
        frame.pixels[offset..offset + 4].try_into().unwrap()
    }

    #[test]
    fn regions_outside_viewport_are_skipped() {
        let mut surface = FlowSurface::new(Size::new(100.0, 100.0));
        surface.apply_layout(&[Size::new(50.0, 80.0); 4], false);
        surface.scroll_to(Point::new(0.0, 90.0));

        let visible = visible_pages(&surface, |_| None);
        let pages: Vec<f32> = visible.iter().map(|page| page.rect.y).collect();
        // rows start every 104px: pages 1 (0..80) and 3 (208..) are out of view
        assert_eq!(pages, vec![104.0]);
    }

    #[test]
    fn pages_paint_over_background() {
        let pages = vec![
            VisiblePage {
                rect: Rect::new(2.0, 0.0, 4.0, 4.0),
                image: Some(solid(4, 4, [255, 0, 0, 255])),
            },
            VisiblePage {
                rect: Rect::new(2.0, 6.0, 4.0, 4.0),
                image: None,
            },
        ];
        let frame = compose(8, 8, (0.0, 0.0), &pages);
        assert_eq!(pixel(&frame, 0, 0), BACKGROUND);
        assert_eq!(pixel(&frame, 3, 1), [255, 0, 0, 255]);
        assert_eq!(pixel(&frame, 6, 1), BACKGROUND);
        assert_eq!(pixel(&frame, 3, 4), BACKGROUND);
        assert_eq!(pixel(&frame, 3, 7), PLACEHOLDER);
    }

    #[test]
    fn stale_image_is_stretched_to_region() {
        let mut pixels = Vec::new();
        for color in [[10, 10, 10, 255], [200, 200, 200, 255]] {
            pixels.extend_from_slice(&color);
        }
        let image = Arc::new(RenderImage {
            width: 2,
            height: 1,
            pixels,
        });
        let pages = vec![VisiblePage {
            rect: Rect::new(0.0, 0.0, 8.0, 2.0),
            image: Some(image),
        }];
        let frame = compose(8, 2, (0.0, 0.0), &pages);
        assert_eq!(pixel(&frame, 0, 0), [10, 10, 10, 255]);
        assert_eq!(pixel(&frame, 3, 1), [10, 10, 10, 255]);
        assert_eq!(pixel(&frame, 4, 0), [200, 200, 200, 255]);
        assert_eq!(pixel(&frame, 7, 1), [200, 200, 200, 255]);
    }

    #[test]
    fn scroll_origin_shifts_content() {
        let pages = vec![VisiblePage {
            rect: Rect::new(0.0, 100.0, 10.0, 10.0),
            image: Some(solid(10, 10, [1, 2, 3, 255])),
        }];
        let frame = compose(4, 4, (0.0, 98.0), &pages);
        assert_eq!(pixel(&frame, 0, 1), BACKGROUND);
        assert_eq!(pixel(&frame, 0, 2), [1, 2, 3, 255]);
    }
}
