use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use particle_mirror::audio::FixedSpectrum;
use particle_mirror::config::{AnalyserConfig, ReactiveConfig};
use particle_mirror::field::ParticleField;
use particle_mirror::logging::{self, LogTarget};
use particle_mirror::reactive::{ReactiveLoop, TickInputs};
use particle_mirror::render::{FieldRenderer, NullRenderer, PointProjector};
use particle_mirror::video::TestPatternSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CacheMode {
    /// Every tick reuses the first capture.
    Reuse,
    /// Real 60 Hz timeline, so the cache alternates per bucket.
    Alternate,
    /// Every tick captures.
    Capture,
}

impl CacheMode {
    fn label(self) -> &'static str {
        match self {
            Self::Reuse => "reuse",
            Self::Alternate => "alternate",
            Self::Capture => "capture",
        }
    }

    fn elapsed(self, tick: usize, bucket_ms: u64) -> Duration {
        match self {
            Self::Reuse => Duration::ZERO,
            Self::Alternate => Duration::from_secs_f64(tick as f64 / 60.0),
            // An odd bucket never reuses.
            Self::Capture => Duration::from_millis(bucket_ms),
        }
    }
}

#[derive(Debug, PartialEq)]
struct Args {
    ticks: usize,
    sizes: Vec<(usize, usize)>,
    density: usize,
    project: bool,
    ci_smoke: bool,
    quick: bool,
    max_ms: f64,
    log_level: String,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            ticks: 240,
            sizes: vec![(160, 120), (320, 240), (640, 480)],
            density: 1,
            project: false,
            ci_smoke: false,
            quick: false,
            max_ms: 16.0,
            log_level: "warn".to_string(),
        }
    }
}

fn parse_args(argv: &[String]) -> Args {
    let mut args = Args::default();
    let mut custom_sizes = false;

    let mut i = 0usize;
    while i < argv.len() {
        let k = argv[i].as_str();
        let v = argv.get(i + 1).map(|s| s.as_str());
        match (k, v) {
            ("--ticks", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.ticks = n.max(1);
                }
                i += 2;
            }
            ("--size", Some(x)) => {
                if let Some(size) = parse_size(x) {
                    if !custom_sizes {
                        args.sizes.clear();
                        custom_sizes = true;
                    }
                    args.sizes.push(size);
                }
                i += 2;
            }
            ("--density", Some(x)) => {
                if let Ok(n) = x.parse::<usize>() {
                    args.density = n.max(1);
                }
                i += 2;
            }
            ("--project", Some(x)) if !x.starts_with("--") => {
                args.project = parse_bool(x).unwrap_or(true);
                i += 2;
            }
            ("--project", _) => {
                args.project = true;
                i += 1;
            }
            ("--ci-smoke", Some(x)) if !x.starts_with("--") => {
                args.ci_smoke = parse_bool(x).unwrap_or(true);
                i += 2;
            }
            ("--ci-smoke", _) => {
                args.ci_smoke = true;
                i += 1;
            }
            ("--quick", Some(x)) if !x.starts_with("--") => {
                args.quick = parse_bool(x).unwrap_or(true);
                i += 2;
            }
            ("--quick", _) => {
                args.quick = true;
                i += 1;
            }
            ("--max-ms", Some(x)) => {
                if let Ok(v) = x.parse::<f64>() {
                    args.max_ms = v.max(0.1);
                }
                i += 2;
            }
            ("--log-level", Some(x)) => {
                args.log_level = x.to_string();
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    if args.quick {
        args.ticks = args.ticks.min(60);
    }
    args
}

fn parse_size(s: &str) -> Option<(usize, usize)> {
    let (w, h) = s.trim().split_once(['x', 'X'])?;
    let w = w.trim().parse::<usize>().ok()?;
    let h = h.trim().parse::<usize>().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Shapes a moving spectrum so band energies change every tick.
fn synth_spectrum(spectrum: &mut FixedSpectrum, tick: usize) {
    let t = tick as f32 / 60.0;
    let bins = spectrum.bins_mut();
    let n = bins.len().max(1) as f32;
    for (i, b) in bins.iter_mut().enumerate() {
        let f = i as f32 / n;
        let bass = ((t * 1.9).sin() * 0.5 + 0.5) * (1.0 - f * 8.0).max(0.0);
        let mid = ((t * 2.8 + 0.7).sin() * 0.5 + 0.5) * (1.0 - (f - 0.05).abs() * 10.0).max(0.0);
        let treble = ((t * 5.2 + 1.3).sin() * 0.5 + 0.5) * (f * 2.0).min(1.0) * 0.4;
        *b = ((bass + mid + treble).min(1.0) * 255.0) as u8;
    }
}

/// Projects every drawn frame, as the terminal host does, without
/// presenting it.
struct ProjectingRenderer {
    projector: PointProjector,
    drawn: usize,
}

impl FieldRenderer for ProjectingRenderer {
    fn draw(&mut self, field: &mut ParticleField) -> Result<()> {
        self.projector.project(field);
        self.drawn += self.projector.drawn();
        field.clear_dirty();
        Ok(())
    }
}

struct RunStats {
    ms_per_tick: f64,
    captures: u64,
    visible: usize,
    projected: usize,
}

fn bench_one(args: &Args, size: (usize, usize), mode: CacheMode) -> Result<RunStats> {
    let cfg = ReactiveConfig {
        density: args.density,
        ..ReactiveConfig::default()
    };
    let bucket_ms = cfg.cache_bucket_ms;
    let mut reactive = ReactiveLoop::new(cfg)
        .context("benchmark config")?
        .with_seed(7);
    let mut video = TestPatternSource::new(size.0, size.1, 60.0);
    let mut spectrum = FixedSpectrum::silent(AnalyserConfig::default().bin_count());

    let mut null = NullRenderer::default();
    let mut projecting = ProjectingRenderer {
        projector: PointProjector::new(160, 96),
        drawn: 0,
    };
    let mut visible = 0usize;

    let start = Instant::now();
    for tick in 0..args.ticks {
        synth_spectrum(&mut spectrum, tick);
        let inputs = TickInputs {
            elapsed: mode.elapsed(tick, bucket_ms),
            video: Some(&mut video),
            spectrum: Some(&spectrum),
        };
        let renderer: &mut dyn FieldRenderer = if args.project {
            &mut projecting
        } else {
            &mut null
        };
        let report = reactive.tick(inputs, renderer)?;
        visible += report.counts.visible();
    }
    let elapsed = start.elapsed();

    Ok(RunStats {
        ms_per_tick: elapsed.as_secs_f64() * 1000.0 / args.ticks as f64,
        captures: reactive.sampler().captures(),
        visible: visible / args.ticks,
        projected: projecting.drawn / args.ticks,
    })
}

fn main() -> Result<()> {
    let argv = std::env::args().skip(1).collect::<Vec<_>>();
    let args = parse_args(&argv);
    logging::init(&args.log_level, LogTarget::Stderr)?;

    println!(
        "Reactive loop benchmark: ticks={} density={} project={} quick={}",
        args.ticks, args.density, args.project, args.quick
    );

    let mut slow = Vec::<(String, f64)>::new();
    for &size in &args.sizes {
        for mode in [CacheMode::Reuse, CacheMode::Alternate, CacheMode::Capture] {
            let stats = bench_one(&args, size, mode)?;
            let label = format!("{}x{} {}", size.0, size.1, mode.label());
            print!(
                "{:<22} {:>8.3} ms/tick  captures={:>4}  visible={:>7}",
                label, stats.ms_per_tick, stats.captures, stats.visible
            );
            if args.project {
                print!("  projected={:>6}", stats.projected);
            }
            println!();
            if args.ci_smoke && stats.ms_per_tick > args.max_ms {
                slow.push((label, stats.ms_per_tick));
            }
        }
    }

    if args.ci_smoke {
        if !slow.is_empty() {
            eprintln!("CI smoke: FAIL");
            for (label, ms) in slow {
                eprintln!("  slow run: {} ({:.3} ms/tick > {:.3})", label, ms, args.max_ms);
            }
            anyhow::bail!("ci smoke failed");
        }
        println!("CI smoke: PASS (max_ms={:.3})", args.max_ms);
    }
    Ok(())
}
