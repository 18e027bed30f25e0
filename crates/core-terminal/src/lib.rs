//! Screen ownership for the dashboard display.
//!
//! The display loop is write-only: rotating raster frames are repainted
//! from the top-left and no input is read, so the terminal stays in
//! cooked mode throughout (frames carry plain newlines). What the
//! dashboard does need is a claim on the screen for as long as frames
//! are streaming — title set, cursor hidden so it does not flicker
//! across the wireframe, viewport measured for the rasterizer — and a
//! guarantee that the cursor comes back even when the display loop
//! panics mid-frame.
//!
//! [`ScreenClaim`] is that claim. Acquiring prepares the screen for the
//! first raster; dropping releases it. `release` is explicit and
//! idempotent so a clean shutdown can surface write errors instead of
//! swallowing them in drop.

use anyhow::Result;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    terminal::{Clear, ClearType, SetTitle, size},
};
use std::io::stdout;

pub mod capabilities;
pub use capabilities::TerminalCapabilities;

/// Fallback viewport when the hosting terminal cannot report one
/// (detached stdout, CI).
pub const DEFAULT_VIEWPORT: (u16, u16) = (80, 24);

pub struct ScreenClaim {
    released: bool,
}

impl ScreenClaim {
    /// Take the screen for the display loop: set the title, hide the
    /// cursor, and wipe whatever the shell left behind so the first
    /// raster frame paints onto a blank page.
    pub fn acquire(title: &str) -> Result<Self> {
        execute!(
            stdout(),
            SetTitle(title),
            Hide,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;
        Ok(Self { released: false })
    }

    /// Current `(columns, rows)`, falling back to [`DEFAULT_VIEWPORT`]
    /// when stdout is not a terminal. The rasterizer sizes its buffer
    /// from this.
    pub fn viewport(&self) -> (u16, u16) {
        size().unwrap_or(DEFAULT_VIEWPORT)
    }

    /// Hand the screen back: cursor shown, frame area left in place for
    /// the shell to scroll past. Safe to call more than once; only the
    /// first call writes.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        execute!(stdout(), Show)?;
        Ok(())
    }
}

impl Drop for ScreenClaim {
    fn drop(&mut self) {
        // Last-resort cursor restore on panic or early return; errors
        // here have nowhere to go.
        self.release().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_is_idempotent() {
        let mut claim = ScreenClaim::acquire("test").expect("acquire writes escapes");
        claim.release().unwrap();
        // Second release is a no-op, and drop after release stays quiet.
        claim.release().unwrap();
    }

    #[test]
    fn viewport_always_reports_something() {
        let claim = ScreenClaim::acquire("test").unwrap();
        let (cols, rows) = claim.viewport();
        assert!(cols > 0);
        assert!(rows > 0);
    }
}
