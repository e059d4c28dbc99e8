use crate::audio::{AudioSystem, SharedSpectrum, SpectrumSource};
use crate::config::{AudioInput, Config};
use crate::field::ParticleField;
use crate::reactive::{LoopState, ReactiveLoop, TickInputs, TickOutcome, TickReport};
use crate::render::{FieldRenderer, Frame, HalfBlockPresenter, PointProjector, Presenter};
use crate::terminal::{ScreenLayout, TerminalGuard};
use crate::video::{BoxedVideo, MediaError, MediaRequest, VideoSource, request_video};
use anyhow::Context;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use std::io::{BufWriter, Stdout, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const HUD_ROWS: u16 = 3;

pub fn run(cfg: Config) -> anyhow::Result<()> {
    let settings = cfg.settings().context("load settings")?;
    info!(
        video = ?cfg.video,
        audio = ?cfg.audio,
        density = settings.reactive.density,
        color_mode = settings.reactive.color_mode.label(),
        "starting"
    );

    // The cpal stream must stay on this thread, so audio is opened up front.
    let audio = match cfg.audio {
        AudioInput::Mic => match AudioSystem::new(cfg.device.as_deref(), settings.analyser) {
            Ok(a) => {
                debug!(
                    device_rate = a.sample_rate_hz,
                    nominal_rate = settings.reactive.sample_rate_hz,
                    "audio ready"
                );
                Some(a)
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "audio unavailable; continuing without it");
                None
            }
        },
        AudioInput::Off => None,
    };
    let spectrum: Option<Arc<SharedSpectrum>> = audio.as_ref().map(AudioSystem::spectrum);

    let mut video_request =
        request_video(cfg.video, cfg.video_width, cfg.video_height, cfg.camera_index);
    let mut video: Option<BoxedVideo> = None;

    let mut reactive = ReactiveLoop::new(settings.reactive).context("reactive config")?;
    if let Some(seed) = cfg.seed {
        reactive = reactive.with_seed(seed);
    }

    let term = TerminalGuard::enter()?;
    let Some(initial) = term.layout(0)? else {
        return Err(anyhow::anyhow!(
            "terminal too small (need at least {}x{})",
            ScreenLayout::MIN_COLS,
            ScreenLayout::MIN_ROWS
        ));
    };

    let mut stage = TerminalStage::new((initial.cols, initial.rows), cfg.sync_updates);
    let mut show_hud = true;
    let mut fps = FpsCounter::new();
    let mut last_report: Option<TickReport> = None;
    let start = Instant::now();

    loop {
        let now = Instant::now();

        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(k) if k.kind != KeyEventKind::Release => {
                    if stage.overlay.take().is_some() {
                        continue;
                    }
                    match key_action(k.code, k.modifiers) {
                        Some(KeyAction::Quit) => {
                            info!(ticks = reactive.ticks(), "quit");
                            return Ok(());
                        }
                        Some(KeyAction::ToggleHud) => show_hud = !show_hud,
                        Some(KeyAction::ToggleColorMode) => {
                            let mode = reactive.config().color_mode.toggled();
                            reactive.set_color_mode(mode);
                        }
                        Some(KeyAction::Density(step)) => {
                            let d = reactive.config().density as isize + step;
                            reactive.set_density(d.clamp(1, 64) as usize);
                        }
                        None => {}
                    }
                }
                Event::Resize(c, r) => stage.resize((c, r)),
                _ => {}
            }
        }

        if video.is_none() {
            if let Some(result) = video_request.poll() {
                match result {
                    Ok(source) => {
                        info!(dimensions = ?source.dimensions(), "video source attached");
                        video = Some(source);
                    }
                    Err(err) => {
                        warn!(error = %err, "video acquisition failed");
                        stage.overlay = Some(media_notice(&err));
                    }
                }
            }
        }

        stage.hud_rows = if show_hud { HUD_ROWS } else { 0 };
        stage.hud = if show_hud {
            build_hud(
                &reactive,
                last_report.as_ref(),
                &video_request,
                fps.fps(),
                spectrum.as_deref(),
                stage.presenter.name(),
            )
        } else {
            String::new()
        };

        let inputs = TickInputs {
            elapsed: start.elapsed(),
            video: video.as_deref_mut().map(|v| v as &mut dyn VideoSource),
            spectrum: spectrum.as_deref().map(|s| s as &dyn SpectrumSource),
        };
        last_report = Some(reactive.tick(inputs, &mut stage)?);
        fps.tick();

        let target = Duration::from_secs_f32(1.0 / cfg.fps.max(1) as f32);
        let elapsed = now.elapsed();
        if elapsed < target {
            std::thread::sleep(target - elapsed);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Quit,
    ToggleHud,
    ToggleColorMode,
    Density(isize),
}

fn key_action(code: KeyCode, mods: KeyModifiers) -> Option<KeyAction> {
    match code {
        KeyCode::Char('c') if mods.contains(KeyModifiers::CONTROL) => Some(KeyAction::Quit),
        KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
        KeyCode::Char('i') => Some(KeyAction::ToggleHud),
        KeyCode::Char('c') => Some(KeyAction::ToggleColorMode),
        KeyCode::Char('+') | KeyCode::Char('=') => Some(KeyAction::Density(1)),
        KeyCode::Char('-') | KeyCode::Char('_') => Some(KeyAction::Density(-1)),
        _ => None,
    }
}

fn media_notice(err: &MediaError) -> String {
    let hint = match err {
        MediaError::PermissionDenied(_) => {
            "Allow camera access for this terminal, or run with --video pattern."
        }
        MediaError::Unavailable(_) => "Check the device or run with --video pattern.",
    };
    format!("Camera unavailable\n{err}\n{hint}\nPress any key to dismiss")
}

fn build_hud(
    reactive: &ReactiveLoop,
    report: Option<&TickReport>,
    video_request: &MediaRequest<BoxedVideo>,
    fps: f32,
    spectrum: Option<&SharedSpectrum>,
    output: &str,
) -> String {
    let cfg = reactive.config();
    let state = reactive.state();
    let video_label = match (state, video_request.is_pending()) {
        (LoopState::Active, _) => match reactive.sampler().resolution() {
            Some((w, h)) => format!("{w}x{h}"),
            None => "attached".to_string(),
        },
        (LoopState::AwaitingSource, true) => "requesting".to_string(),
        (LoopState::AwaitingSource, false) => "none".to_string(),
    };
    let audio_label = match spectrum {
        Some(s) => format!("mic ({:.0} ms)", s.age_ms()),
        None => "off".to_string(),
    };

    let mut lines = vec![format!(
        "State: {} | FPS: {:>4.1} | Video: {} | Audio: {} | Density: {} | Color: {}",
        state.label(),
        fps,
        video_label,
        audio_label,
        cfg.density,
        cfg.color_mode.label()
    )];

    if let Some(r) = report {
        let stall = match r.outcome {
            TickOutcome::Stalled(err) => format!(" | Stalled: {err}"),
            _ => String::new(),
        };
        lines.push(format!(
            "Energy L/M/H: {:.2}/{:.2}/{:.2} | Tiers L/M/H: {}/{}/{} | Hidden: {} bright, {} stride{}",
            r.energies.low,
            r.energies.mid,
            r.energies.high,
            r.counts.low,
            r.counts.mid,
            r.counts.high,
            r.counts.too_bright,
            r.counts.skipped,
            stall
        ));
        lines.push(format!(
            "Cache: {} | Captures: {} | Output: {} | Keys: q quit  i HUD  c color  +/- density",
            if r.use_cache { "reuse" } else { "capture" },
            reactive.sampler().captures(),
            output
        ));
    } else {
        lines.push(format!("Output: {output} | Keys: q quit  i HUD  c color  +/- density"));
    }
    lines.join("\n")
}

/// Draws the field into the terminal: project points, then present as
/// half-block cells with the HUD underneath.
struct TerminalStage {
    out: BufWriter<Stdout>,
    projector: PointProjector,
    presenter: HalfBlockPresenter,
    size: (u16, u16),
    sync_updates: bool,
    hud: String,
    hud_rows: u16,
    overlay: Option<String>,
}

impl TerminalStage {
    fn new(size: (u16, u16), sync_updates: bool) -> Self {
        Self {
            out: BufWriter::new(std::io::stdout()),
            projector: PointProjector::new(0, 0),
            presenter: HalfBlockPresenter::new(),
            size,
            sync_updates,
            hud: String::new(),
            hud_rows: HUD_ROWS,
            overlay: None,
        }
    }

    fn resize(&mut self, size: (u16, u16)) {
        if size != self.size {
            debug!(cols = size.0, rows = size.1, "terminal resized");
            self.size = size;
            // Clears leftovers from a larger previous frame.
            let _ = self.out.write_all(b"\x1b[2J");
        }
    }

    fn present(&mut self, layout: ScreenLayout) -> anyhow::Result<()> {
        let frame = Frame {
            layout,
            pixel_width: self.projector.width(),
            pixel_height: self.projector.height(),
            pixels_rgba: self.projector.pixels(),
            hud: &self.hud,
            overlay: self.overlay.as_deref(),
            sync_updates: self.sync_updates,
        };
        self.presenter.present(&frame, &mut self.out)
    }

    fn layout(&mut self) -> Option<ScreenLayout> {
        let layout = ScreenLayout::new(self.size, self.hud_rows)?;
        let (w, h) = layout.raster_size();
        self.projector.resize(w, h);
        Some(layout)
    }
}

impl FieldRenderer for TerminalStage {
    fn draw(&mut self, field: &mut ParticleField) -> anyhow::Result<()> {
        let Some(layout) = self.layout() else {
            return Ok(());
        };
        self.projector.project(field);
        field.clear_dirty();
        self.present(layout)
    }

    fn draw_idle(&mut self) -> anyhow::Result<()> {
        let Some(layout) = self.layout() else {
            return Ok(());
        };
        self.projector.clear();
        self.present(layout)
    }
}

struct FpsCounter {
    last: Instant,
    frames: u32,
    fps: f32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            last: Instant::now(),
            frames: 0,
            fps: 0.0,
        }
    }

    fn tick(&mut self) {
        self.frames += 1;
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f32();
        if dt >= 0.5 {
            self.fps = self.frames as f32 / dt;
            self.frames = 0;
            self.last = now;
        }
    }

    fn fps(&self) -> f32 {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_actions() {
        let none = KeyModifiers::NONE;
        assert_eq!(key_action(KeyCode::Char('q'), none), Some(KeyAction::Quit));
        assert_eq!(key_action(KeyCode::Esc, none), Some(KeyAction::Quit));
        assert_eq!(
            key_action(KeyCode::Char('c'), KeyModifiers::CONTROL),
            Some(KeyAction::Quit)
        );
        assert_eq!(key_action(KeyCode::Char('c'), none), Some(KeyAction::ToggleColorMode));
        assert_eq!(key_action(KeyCode::Char('i'), none), Some(KeyAction::ToggleHud));
        assert_eq!(key_action(KeyCode::Char('+'), none), Some(KeyAction::Density(1)));
        assert_eq!(key_action(KeyCode::Char('-'), none), Some(KeyAction::Density(-1)));
        assert_eq!(key_action(KeyCode::Char('x'), none), None);
    }

    #[test]
    fn notice_leads_with_title() {
        let text = media_notice(&MediaError::Unavailable("video input disabled".to_string()));
        assert_eq!(text.lines().next(), Some("Camera unavailable"));
        assert!(text.contains("video input disabled"));
        assert!(text.contains("--video pattern"));
    }

    #[test]
    fn denied_camera_asks_for_access() {
        let text = media_notice(&MediaError::PermissionDenied("not authorized".to_string()));
        assert!(text.contains("media permission denied: not authorized"));
        assert!(text.contains("Allow camera access"));
    }
}
