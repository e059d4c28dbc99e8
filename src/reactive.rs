//! Per-tick mapping of video luminance and audio band energy onto the
//! particle field.
//!
//! [`ReactiveLoop`] is the whole session: it owns the frame sampler, the field
//! once one exists, and the RNG used for color flicker. The host calls
//! [`ReactiveLoop::tick`] once per display frame with whatever sources are
//! attached at that moment.

use crate::audio::SpectrumSource;
use crate::config::{ColorMode, ConfigError, ReactiveConfig, Tier};
use crate::field::ParticleField;
use crate::frame::{FrameSampler, PixelBuffer, SampleError, cache_bucket};
use crate::render::FieldRenderer;
use crate::spectrum::BandEnergies;
use crate::video::VideoSource;
use anyhow::Context;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No frame has been captured yet. Nothing is updated.
    AwaitingSource,
    /// The field exists and is updated every tick.
    Active,
}

impl LoopState {
    pub fn label(self) -> &'static str {
        match self {
            Self::AwaitingSource => "awaiting",
            Self::Active => "active",
        }
    }
}

/// Where a particle ends up for a given luminance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Offscreen,
    Tier(Tier),
}

/// Tier of a luminance value. Values at or above the threshold are hidden.
pub fn classify(lum: f32, cfg: &ReactiveConfig) -> Placement {
    let t = cfg.threshold;
    if lum >= t {
        Placement::Offscreen
    } else if lum < t / cfg.low_divisor {
        Placement::Tier(Tier::Low)
    } else if lum < t / cfg.mid_divisor {
        Placement::Tier(Tier::Mid)
    } else {
        Placement::Tier(Tier::High)
    }
}

/// Depth for one particle: `lum * weight * scale + energy * boost` of its
/// tier, or the offscreen sentinel.
pub fn depth_for(lum: f32, energies: &BandEnergies, cfg: &ReactiveConfig) -> (Placement, f32) {
    match classify(lum, cfg) {
        Placement::Offscreen => (Placement::Offscreen, cfg.offscreen_z),
        Placement::Tier(tier) => {
            let p = cfg.tier(tier);
            let z = lum * p.weight * p.scale + energies.get(tier) * p.boost;
            (Placement::Tier(tier), z)
        }
    }
}

/// Sources attached for one tick. Either may be missing.
pub struct TickInputs<'a> {
    pub elapsed: Duration,
    pub video: Option<&'a mut dyn VideoSource>,
    pub spectrum: Option<&'a dyn SpectrumSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still waiting for the first frame.
    Idle,
    Updated,
    /// Active, but no frame could be sampled. Buffers were left as they were.
    Stalled(SampleError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub low: usize,
    pub mid: usize,
    pub high: usize,
    pub too_bright: usize,
    /// Hidden by the density stride.
    pub skipped: usize,
}

impl TierCounts {
    fn record(&mut self, placement: Placement) {
        match placement {
            Placement::Offscreen => self.too_bright += 1,
            Placement::Tier(Tier::Low) => self.low += 1,
            Placement::Tier(Tier::Mid) => self.mid += 1,
            Placement::Tier(Tier::High) => self.high += 1,
        }
    }

    pub fn visible(&self) -> usize {
        self.low + self.mid + self.high
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub state: LoopState,
    pub outcome: TickOutcome,
    pub use_cache: bool,
    /// A new frame was captured rather than served from the cache.
    pub captured: bool,
    pub energies: BandEnergies,
    /// A spectrum source was attached.
    pub audio: bool,
    pub counts: TierCounts,
}

pub struct ReactiveLoop {
    cfg: ReactiveConfig,
    sampler: FrameSampler,
    field: Option<ParticleField>,
    rng: fastrand::Rng,
    spectrum: Vec<u8>,
    stalled: bool,
    colors_at_baseline: bool,
    ticks: u64,
}

impl ReactiveLoop {
    pub fn new(cfg: ReactiveConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            sampler: FrameSampler::new(),
            field: None,
            rng: fastrand::Rng::new(),
            spectrum: Vec::new(),
            stalled: false,
            colors_at_baseline: true,
            ticks: 0,
        })
    }

    /// Reseeds the flicker RNG so runs are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    pub fn state(&self) -> LoopState {
        if self.field.is_some() {
            LoopState::Active
        } else {
            LoopState::AwaitingSource
        }
    }

    pub fn field(&self) -> Option<&ParticleField> {
        self.field.as_ref()
    }

    pub fn config(&self) -> &ReactiveConfig {
        &self.cfg
    }

    pub fn sampler(&self) -> &FrameSampler {
        &self.sampler
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn set_color_mode(&mut self, mode: ColorMode) {
        if mode != self.cfg.color_mode {
            debug!(mode = mode.label(), "color mode changed");
        }
        self.cfg.color_mode = mode;
    }

    pub fn set_density(&mut self, density: usize) {
        let density = density.max(1);
        if density != self.cfg.density {
            debug!(density, "density changed");
        }
        self.cfg.density = density;
    }

    pub fn tick(
        &mut self,
        inputs: TickInputs<'_>,
        renderer: &mut dyn FieldRenderer,
    ) -> anyhow::Result<TickReport> {
        self.ticks += 1;
        let use_cache = cache_bucket(inputs.elapsed, self.cfg.cache_bucket_ms);
        let audio = inputs.spectrum.is_some();
        let mut report = TickReport {
            state: self.state(),
            outcome: TickOutcome::Idle,
            use_cache,
            captured: false,
            energies: BandEnergies::default(),
            audio,
            counts: TierCounts::default(),
        };

        let captures_before = self.sampler.captures();
        let sampled = match inputs.video {
            Some(video) => self.sampler.sample(video, use_cache),
            None => Err(SampleError::SourceUnavailable),
        };
        report.captured = self.sampler.captures() > captures_before;

        let buffer = match (sampled, self.field.is_some()) {
            (Ok(buffer), _) => buffer,
            (Err(_), false) => {
                renderer.draw_idle()?;
                return Ok(report);
            }
            (Err(err), true) => {
                if !self.stalled {
                    warn!(error = %err, "video stalled; keeping last field");
                    self.stalled = true;
                }
                report.outcome = TickOutcome::Stalled(err);
                if let Some(field) = self.field.as_mut() {
                    renderer.draw(field)?;
                }
                return Ok(report);
            }
        };

        if self.stalled {
            info!("video resumed");
            self.stalled = false;
        }

        if self.field.is_none() {
            let field = ParticleField::new(buffer.width(), buffer.height(), &self.cfg.field)
                .context("build particle field")?;
            info!(
                width = buffer.width(),
                height = buffer.height(),
                particles = field.len(),
                "first frame captured; field active"
            );
            self.field = Some(field);
            self.colors_at_baseline = true;
        }
        report.state = LoopState::Active;

        if let Some(spectrum) = inputs.spectrum {
            let bins = spectrum.bin_count();
            if self.spectrum.capacity() < bins {
                debug!(bins, "spectrum scratch resized");
                self.spectrum.reserve_exact(bins - self.spectrum.len());
            }
            spectrum.read_spectrum(&mut self.spectrum);
            report.energies = BandEnergies::measure(&self.spectrum, &self.cfg);
        }

        let flicker = audio && self.cfg.color_mode == ColorMode::Flicker;
        report.counts = self.apply(&buffer, &report.energies, flicker);
        report.outcome = TickOutcome::Updated;

        if let Some(field) = self.field.as_mut() {
            renderer.draw(field)?;
        }
        Ok(report)
    }

    fn apply(&mut self, buffer: &PixelBuffer, energies: &BandEnergies, flicker: bool) -> TierCounts {
        let mut counts = TierCounts::default();
        let Some(field) = self.field.as_mut() else {
            return counts;
        };
        let cfg = &self.cfg;
        let density = cfg.density.max(1);
        let n = field.len().min(buffer.width() * buffer.height());

        for i in 0..n {
            if i % density != 0 {
                field.set_z(i, cfg.offscreen_z);
                counts.skipped += 1;
                continue;
            }
            let (placement, z) = depth_for(buffer.luminance(i), energies, cfg);
            field.set_z(i, z);
            counts.record(placement);
        }

        if flicker {
            let g = cfg.color_gain;
            let bound = [
                (energies.low * g).min(1.0),
                (energies.mid * g).min(1.0),
                (energies.high * g).min(1.0),
            ];
            for i in 0..field.len() {
                let rgb = [
                    self.rng.f32() * bound[0],
                    self.rng.f32() * bound[1],
                    self.rng.f32() * bound[2],
                ];
                field.set_color(i, rgb);
            }
            self.colors_at_baseline = false;
        } else if !self.colors_at_baseline {
            field.reset_colors();
            self.colors_at_baseline = true;
        }
        // Both buffers are re-read every updated tick.
        field.mark_dirty(true, true);
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_uses_threshold_fractions() {
        let cfg = ReactiveConfig::default();
        assert_eq!(classify(0.0, &cfg), Placement::Tier(Tier::Low));
        assert_eq!(classify(99.9, &cfg), Placement::Tier(Tier::Low));
        assert_eq!(classify(100.0, &cfg), Placement::Tier(Tier::Mid));
        assert_eq!(classify(149.9, &cfg), Placement::Tier(Tier::Mid));
        assert_eq!(classify(150.0, &cfg), Placement::Tier(Tier::High));
        assert_eq!(classify(299.9, &cfg), Placement::Tier(Tier::High));
        assert_eq!(classify(300.0, &cfg), Placement::Offscreen);
    }

    #[test]
    fn reference_luminances_at_default_threshold() {
        let cfg = ReactiveConfig::default();
        let silent = BandEnergies::default();
        assert_eq!(depth_for(50.0, &silent, &cfg).0, Placement::Tier(Tier::Low));
        assert_eq!(depth_for(120.0, &silent, &cfg).0, Placement::Tier(Tier::Mid));
        // The mid tier is half-open, so T/2 itself is high.
        assert_eq!(depth_for(150.0, &silent, &cfg).0, Placement::Tier(Tier::High));
        assert_eq!(depth_for(250.0, &silent, &cfg).0, Placement::Tier(Tier::High));
        assert_eq!(depth_for(305.0, &silent, &cfg), (Placement::Offscreen, 10_000.0));
    }

    #[test]
    fn depth_adds_band_boost() {
        let cfg = ReactiveConfig::default();
        let energies = BandEnergies {
            low: 0.5,
            mid: 0.0,
            high: 1.0,
        };
        let (p, z) = depth_for(60.0, &energies, &cfg);
        assert_eq!(p, Placement::Tier(Tier::Low));
        assert!((z - (60.0 * 0.05 * 5.0 + 0.5 * 2.0)).abs() < 1e-5);

        let (p, z) = depth_for(200.0, &energies, &cfg);
        assert_eq!(p, Placement::Tier(Tier::High));
        assert!((z - (200.0 * 0.25 + 2.0)).abs() < 1e-4);

        let (p, z) = depth_for(400.0, &energies, &cfg);
        assert_eq!(p, Placement::Offscreen);
        assert_eq!(z, cfg.offscreen_z);
    }
}
