//! Kitty-graphics terminal host for the lazypdf engine.

use std::io::{self, Write};

use crossterm::terminal::WindowSize;
use lazypdf_core::Size;

mod compose;
mod input;
mod kitty;

pub use compose::{compose, visible_pages, Frame, VisiblePage, BACKGROUND, PLACEHOLDER};
pub use input::{Action, EventMapper};
pub use kitty::{DrawParams, KittyRenderer};

/// Cell size assumed when the terminal does not report its pixel size.
const FALLBACK_CELL: (u16, u16) = (8, 16);

/// Split of the terminal into the image area and an optional status row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminalLayout {
    pub columns: u16,
    pub rows: u16,
    pub cell_width: f32,
    pub cell_height: f32,
    pub status_row: Option<u16>,
}

impl TerminalLayout {
    pub fn new(window: WindowSize, show_status: bool) -> Self {
        let columns = window.columns.max(1);
        let rows = window.rows.max(1);
        let cell_width = match window.width {
            0 => FALLBACK_CELL.0 as f32,
            width => width as f32 / columns as f32,
        };
        let cell_height = match window.height {
            0 => FALLBACK_CELL.1 as f32,
            height => height as f32 / rows as f32,
        };
        let status_row = (show_status && rows > 1).then(|| rows - 1);
        Self {
            columns,
            rows,
            cell_width,
            cell_height,
            status_row,
        }
    }

    pub fn image_rows(&self) -> u16 {
        match self.status_row {
            Some(row) => row,
            None => self.rows,
        }
    }

    /// Pixel size of the image area; this is the engine's viewport.
    pub fn viewport(&self) -> Size {
        Size::new(
            (self.columns as f32 * self.cell_width).floor(),
            (self.image_rows() as f32 * self.cell_height).floor(),
        )
    }

    pub fn draw_params(&self) -> DrawParams {
        DrawParams::clamped(self.columns as u32, self.image_rows() as u32)
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str, columns: u16) -> io::Result<()> {
    let mut line: String = label.chars().take(columns as usize).collect();
    let padding = (columns as usize).saturating_sub(line.chars().count());
    line.extend(std::iter::repeat(' ').take(padding));
    write!(writer, "{line}")?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(columns: u16, rows: u16, width: u16, height: u16) -> WindowSize {
        WindowSize {
            rows,
            columns,
            width,
            height,
        }
    }

    #[test]
    fn layout_reserves_status_row() {
        let layout = TerminalLayout::new(window(100, 40, 1000, 800), true);
        assert_eq!(layout.status_row, Some(39));
        assert_eq!(layout.viewport(), Size::new(1000.0, 780.0));
        assert_eq!(layout.draw_params(), DrawParams::clamped(100, 39));
    }

    #[test]
    fn fullscreen_layout_uses_every_row() {
        let layout = TerminalLayout::new(window(100, 40, 1000, 800), false);
        assert_eq!(layout.status_row, None);
        assert_eq!(layout.viewport(), Size::new(1000.0, 800.0));
    }

    #[test]
    fn missing_pixel_size_falls_back_to_default_cells() {
        let layout = TerminalLayout::new(window(80, 25, 0, 0), true);
        assert_eq!(layout.viewport(), Size::new(640.0, 384.0));
    }

    #[test]
    fn status_line_is_padded_and_truncated() {
        let mut out = Vec::new();
        write_status_line(&mut out, "zoom", 6).unwrap();
        assert_eq!(out, b"zoom  ");

        let mut out = Vec::new();
        write_status_line(&mut out, "1p | fit:width", 4).unwrap();
        assert_eq!(out, b"1p |");
    }
}
