mod halfblock;
mod projector;

pub use halfblock::HalfBlockPresenter;
pub use projector::PointProjector;

use crate::field::ParticleField;
use crate::terminal::ScreenLayout;
use std::io::Write;

/// Consumer of the particle field buffers.
///
/// Implementations re-read whichever buffers are flagged dirty, draw, and
/// clear the flags. The update loop never talks to a graphics API directly.
pub trait FieldRenderer {
    fn draw(&mut self, field: &mut ParticleField) -> anyhow::Result<()>;

    /// Called on ticks where no field exists yet.
    fn draw_idle(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Renderer that only acknowledges dirty buffers. Used by headless runs.
#[derive(Debug, Default)]
pub struct NullRenderer {
    pub draws: u64,
    pub idle_draws: u64,
    pub position_uploads: u64,
    pub color_uploads: u64,
}

impl FieldRenderer for NullRenderer {
    fn draw(&mut self, field: &mut ParticleField) -> anyhow::Result<()> {
        self.draws += 1;
        self.position_uploads += u64::from(field.positions_dirty);
        self.color_uploads += u64::from(field.colors_dirty);
        field.clear_dirty();
        Ok(())
    }

    fn draw_idle(&mut self) -> anyhow::Result<()> {
        self.idle_draws += 1;
        Ok(())
    }
}

/// One terminal frame: an RGBA raster plus the text drawn over it.
pub struct Frame<'a> {
    pub layout: ScreenLayout,
    pub pixel_width: usize,
    pub pixel_height: usize,
    pub pixels_rgba: &'a [u8],
    pub hud: &'a str,
    pub overlay: Option<&'a str>,
    pub sync_updates: bool,
}

/// Turns a raster into terminal output.
pub trait Presenter {
    /// Short label shown in the HUD.
    fn name(&self) -> &'static str;
    fn present(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()>;
}

/// Centered notice box. The first line is drawn as a highlighted title.
pub fn draw_notice(
    out: &mut dyn Write,
    term_cols: u16,
    term_rows: u16,
    text: &str,
) -> anyhow::Result<()> {
    let cols = term_cols as usize;
    let rows = term_rows as usize;
    if text.trim().is_empty() || cols < 8 || rows < 4 {
        return Ok(());
    }

    let max_inner = cols.saturating_sub(6).max(1);
    let mut lines: Vec<String> = Vec::new();
    for raw in text.lines() {
        let chars = raw.chars().collect::<Vec<_>>();
        if chars.is_empty() {
            lines.push(String::new());
            continue;
        }
        for chunk in chars.chunks(max_inner) {
            lines.push(chunk.iter().collect());
        }
    }

    let inner = lines
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(1)
        .clamp(1, max_inner);
    let box_w = inner + 4;
    let body_h = lines.len().min(rows.saturating_sub(3).max(1));
    let box_h = body_h + 2;
    let left = (cols.saturating_sub(box_w)) / 2 + 1;
    let top = (rows.saturating_sub(box_h)) / 2 + 1;
    let edge = "-".repeat(box_w - 2);

    out.write_all(b"\x1b[0m\x1b[38;2;236;242;255m\x1b[48;2;10;14;24m")?;
    write!(out, "\x1b[{};{}H+{}+", top, left, edge)?;
    for (i, line) in lines.iter().take(body_h).enumerate() {
        let row = top + 1 + i;
        write!(out, "\x1b[{};{}H| {:<inner$} |", row, left, "")?;
        if i == 0 {
            write!(
                out,
                "\x1b[{};{}H\x1b[1m\x1b[38;2;255;236;160m{}\x1b[22m\x1b[38;2;236;242;255m",
                row,
                left + 2,
                line
            )?;
        } else {
            write!(out, "\x1b[{};{}H{}", row, left + 2, line)?;
        }
    }
    write!(out, "\x1b[{};{}H+{}+", top + box_h - 1, left, edge)?;
    out.write_all(b"\x1b[0m")?;
    Ok(())
}
