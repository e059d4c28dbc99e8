use crate::render::{Frame, Presenter, draw_notice};
use std::io::Write;

const UPPER_HALF: &[u8] = "\u{2580}".as_bytes();

/// Two vertically stacked pixels per cell: foreground paints the upper half,
/// background the lower. A whole frame is assembled in memory and written
/// with one call.
#[derive(Default)]
pub struct HalfBlockPresenter {
    buf: Vec<u8>,
}

impl HalfBlockPresenter {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Last colors sent, so runs of equal cells skip the escape.
#[derive(Default)]
struct Pen {
    fg: Option<[u8; 3]>,
    bg: Option<[u8; 3]>,
}

impl Pen {
    fn cell(&mut self, buf: &mut Vec<u8>, up: &[u8], down: &[u8]) -> std::io::Result<()> {
        let up = [up[0], up[1], up[2]];
        let down = [down[0], down[1], down[2]];
        if self.fg != Some(up) {
            write!(buf, "\x1b[38;2;{};{};{}m", up[0], up[1], up[2])?;
            self.fg = Some(up);
        }
        if self.bg != Some(down) {
            write!(buf, "\x1b[48;2;{};{};{}m", down[0], down[1], down[2])?;
            self.bg = Some(down);
        }
        buf.extend_from_slice(UPPER_HALF);
        Ok(())
    }
}

impl Presenter for HalfBlockPresenter {
    fn name(&self) -> &'static str {
        "halfblock"
    }

    fn present(&mut self, frame: &Frame<'_>, out: &mut dyn Write) -> anyhow::Result<()> {
        let layout = frame.layout;
        let (w, h) = layout.raster_size();
        if w == 0
            || (frame.pixel_width, frame.pixel_height) != (w, h)
            || frame.pixels_rgba.len() < w * h * 4
        {
            return Ok(());
        }

        let buf = &mut self.buf;
        buf.clear();
        if frame.sync_updates {
            buf.extend_from_slice(b"\x1b[?2026h");
        }
        // Autowrap off while painting full-width rows.
        buf.extend_from_slice(b"\x1b[0m\x1b[?7l");

        // Each row is addressed explicitly; a line feed on the bottom row
        // would scroll the screen.
        let mut pen = Pen::default();
        for (row, pair) in frame.pixels_rgba.chunks_exact(w * 8).take(h / 2).enumerate() {
            write!(buf, "\x1b[{};1H", row + 1)?;
            let (top, bottom) = pair.split_at(w * 4);
            for (up, down) in top.chunks_exact(4).zip(bottom.chunks_exact(4)) {
                pen.cell(buf, up, down)?;
            }
        }

        let mut hud = frame.hud.lines();
        for row in layout.visual_rows..layout.visual_rows + layout.hud_rows {
            write!(buf, "\x1b[{};1H\x1b[0m\x1b[2K", row + 1)?;
            if let Some(line) = hud.next() {
                let clipped: String = line.chars().take(w).collect();
                buf.extend_from_slice(clipped.as_bytes());
            }
        }

        if let Some(text) = frame.overlay {
            draw_notice(&mut *buf, layout.cols, layout.rows, text)?;
        }

        buf.extend_from_slice(b"\x1b[?7h");
        if frame.sync_updates {
            buf.extend_from_slice(b"\x1b[?2026l");
        }
        out.write_all(buf)?;
        out.flush()?;
        Ok(())
    }
}
