use std::io::Write;

use anyhow::{ensure, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    terminal::{Clear, ClearType},
};
use png::{BitDepth, ColorType, Encoder};
use tracing::trace;

use crate::compose::Frame;

const CHUNK_SIZE: usize = 4096;

/// Cell box the frame image is stretched over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

/// Writes frames with the kitty graphics protocol, replacing one image in place.
pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Transmits `frame` as PNG and places it at the cursor.
    pub fn draw(&mut self, frame: &Frame, params: DrawParams) -> Result<()> {
        ensure!(
            frame.pixels.len() == frame.width as usize * frame.height as usize * 4,
            "frame buffer does not match {}x{}",
            frame.width,
            frame.height
        );

        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, frame.width, frame.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&frame.pixels)?;
        writer.finish()?;

        let header = format!(
            "a=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1",
            self.image_id, self.placement_id, params.columns, params.rows, frame.width, frame.height
        );
        let payload = BASE64.encode(&buffer);
        trace!(
            width = frame.width,
            height = frame.height,
            bytes = payload.len(),
            "sending kitty frame"
        );
        self.write_chunked(&header, &payload)?;
        self.writer.flush()?;
        Ok(())
    }

    fn write_chunked(&mut self, header: &str, payload: &str) -> Result<()> {
        let mut chunks = payload.as_bytes().chunks(CHUNK_SIZE).peekable();
        let mut first = true;
        while let Some(chunk) = chunks.next() {
            let more = u8::from(chunks.peek().is_some());
            if first {
                write!(self.writer, "\u{1b}_G{header},m={more}")?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={more},q=2")?;
            }
            self.writer.write_all(b";")?;
            self.writer.write_all(chunk)?;
            write!(self.writer, "\u{1b}\\")?;
        }
        Ok(())
    }

    /// Removes the image and frees its data in the terminal.
    pub fn delete_image(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=I,i={},q=2\u{1b}\\", self.image_id)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Ends a synchronized update; the terminal shows all buffered changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}
