//! Terminal emission of a raster buffer.
//!
//! Design invariants:
//! * Commands preserve ordering; one flush per frame.
//! * All positions are absolute (0,0) origin; the buffer defines bounds.
//! * Color changes are emitted only on transitions to keep the byte
//!   stream small on mostly-monochrome frames.
//! * The writer owns no global state; it is a short-lived object per
//!   frame.

use crate::raster::RasterBuffer;
use crate::style::ColorTag;
use anyhow::Result;
use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::Write;

/// Abstract rendering sink: anything that can present a finished raster.
/// Widget workers receive one of these; the supervisor side never draws.
pub trait RenderSink {
    fn present(&mut self, buffer: &RasterBuffer) -> Result<()>;
}

fn crossterm_color(tag: ColorTag) -> Color {
    match tag {
        ColorTag::Black => Color::Black,
        ColorTag::Red => Color::DarkRed,
        ColorTag::Green => Color::DarkGreen,
        ColorTag::Yellow => Color::DarkYellow,
        ColorTag::Blue => Color::DarkBlue,
        ColorTag::Magenta => Color::DarkMagenta,
        ColorTag::Cyan => Color::DarkCyan,
        ColorTag::White => Color::White,
        ColorTag::Gray => Color::DarkGrey,
    }
}

/// Crossterm-backed sink writing to any `Write` (stdout in production,
/// a byte buffer in tests).
pub struct TerminalSink<W: Write> {
    out: W,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RenderSink for TerminalSink<W> {
    fn present(&mut self, buffer: &RasterBuffer) -> Result<()> {
        let mut current: Option<ColorTag> = None;
        for (y, row) in buffer.rows().enumerate() {
            queue!(self.out, MoveTo(0, y as u16))?;
            let mut run = String::with_capacity(buffer.width());
            for cell in row {
                let color = cell.color;
                if current != Some(color) && cell.ch != ' ' {
                    if !run.is_empty() {
                        queue!(self.out, Print(std::mem::take(&mut run)))?;
                    }
                    queue!(self.out, SetForegroundColor(crossterm_color(color)))?;
                    current = Some(color);
                }
                run.push(cell.ch);
            }
            queue!(self.out, Print(run))?;
        }
        queue!(self.out, ResetColor)?;
        self.out.flush()?;
        Ok(())
    }
}

/// Plain ANSI rendering of the buffer, one SGR-colored string per frame.
/// Used by the headless path and by tests that assert on escape codes
/// without a terminal.
pub fn to_ansi_string(buffer: &RasterBuffer) -> String {
    let mut out = String::with_capacity(buffer.width() * buffer.height() * 2);
    let mut current: Option<ColorTag> = None;
    for row in buffer.rows() {
        for cell in row {
            if cell.ch != ' ' && current != Some(cell.color) {
                out.push_str(&format!("\x1b[{}m", cell.color.sgr_code()));
                current = Some(cell.color);
            }
            out.push(cell.ch);
        }
        out.push('\n');
    }
    out.push_str("\x1b[0m");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::ColorTag;

    fn buffer_with_dot() -> RasterBuffer {
        let mut buf = RasterBuffer::new(4, 2);
        buf.plot(1, 0, '█', ColorTag::Red, 1.0);
        buf.plot(2, 1, '·', ColorTag::Gray, 1.0);
        buf
    }

    #[test]
    fn ansi_string_contains_sgr_transitions() {
        let s = to_ansi_string(&buffer_with_dot());
        assert!(s.contains("\x1b[31m█"));
        assert!(s.contains("\x1b[90m·"));
        assert!(s.ends_with("\x1b[0m"));
        // Two rows -> two newlines.
        assert_eq!(s.matches('\n').count(), 2);
    }

    #[test]
    fn sink_writes_every_row() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.present(&buffer_with_dot()).unwrap();
        let bytes = sink.into_inner();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains('█'));
        assert!(text.contains('·'));
    }
}
