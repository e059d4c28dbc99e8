use anyhow::Context;
use crossterm::{
    cursor, execute,
    style::ResetColor,
    terminal::{
        self, Clear, ClearType, EnableLineWrap, EndSynchronizedUpdate, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use std::io::{Stdout, stdout};

/// Owns the terminal while the view runs: raw mode, alternate screen and a
/// hidden cursor. Dropping it restores all three.
pub struct TerminalGuard {
    out: Stdout,
}

impl TerminalGuard {
    pub fn enter() -> anyhow::Result<Self> {
        terminal::enable_raw_mode().context("enable raw mode")?;
        let mut guard = Self { out: stdout() };
        execute!(
            guard.out,
            EnterAlternateScreen,
            Clear(ClearType::All),
            cursor::Hide
        )
        .context("prepare alternate screen")?;
        Ok(guard)
    }

    /// Current layout for the live terminal size.
    pub fn layout(&self, wanted_hud_rows: u16) -> anyhow::Result<Option<ScreenLayout>> {
        let size = terminal::size().context("get terminal size")?;
        Ok(ScreenLayout::new(size, wanted_hud_rows))
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let _ = execute!(
            self.out,
            EndSynchronizedUpdate,
            EnableLineWrap,
            ResetColor,
            cursor::Show,
            LeaveAlternateScreen
        );
    }
}

/// Split of the terminal into the particle view and the HUD strip below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenLayout {
    pub cols: u16,
    pub rows: u16,
    pub visual_rows: u16,
    pub hud_rows: u16,
}

impl ScreenLayout {
    /// Smallest terminal the view is drawn in.
    pub const MIN_COLS: u16 = 4;
    pub const MIN_ROWS: u16 = 2;

    /// Keeps at least one row for the view; the HUD gets what is left, up to
    /// `wanted_hud_rows`.
    pub fn new(size: (u16, u16), wanted_hud_rows: u16) -> Option<Self> {
        let (cols, rows) = size;
        if cols < Self::MIN_COLS || rows < Self::MIN_ROWS {
            return None;
        }
        let hud_rows = wanted_hud_rows.min(rows - 1);
        Some(Self {
            cols,
            rows,
            visual_rows: rows - hud_rows,
            hud_rows,
        })
    }

    /// Pixel raster behind the view: one column per cell, two pixels per row.
    pub fn raster_size(&self) -> (usize, usize) {
        (self.cols as usize, self.visual_rows as usize * 2)
    }
}
