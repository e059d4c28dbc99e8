use particle_mirror::audio::{FixedSpectrum, SpectrumSource};
use particle_mirror::config::{ColorMode, ReactiveConfig};
use particle_mirror::frame::SampleError;
use particle_mirror::reactive::{LoopState, ReactiveLoop, TickInputs, TickOutcome, TickReport};
use particle_mirror::render::NullRenderer;
use particle_mirror::video::{StillFrameSource, VideoSource};
use std::time::Duration;

const BINS: usize = 1024;

fn gray(lum: u8) -> [u8; 4] {
    [lum, lum, lum, 255]
}

fn run(
    lp: &mut ReactiveLoop,
    video: Option<&mut StillFrameSource>,
    spectrum: Option<&FixedSpectrum>,
    ms: u64,
    renderer: &mut NullRenderer,
) -> TickReport {
    let inputs = TickInputs {
        elapsed: Duration::from_millis(ms),
        video: video.map(|v| v as &mut dyn VideoSource),
        spectrum: spectrum.map(|s| s as &dyn SpectrumSource),
    };
    lp.tick(inputs, renderer).unwrap()
}

fn zs(lp: &ReactiveLoop) -> Vec<f32> {
    let field = lp.field().expect("field should exist");
    (0..field.len()).map(|i| field.position(i)[2]).collect()
}

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

// ── Depth mapping ───────────────────────────────────────────────────────────

#[test]
fn uniform_gray_lands_in_mid_tier() {
    let mut lp = ReactiveLoop::new(ReactiveConfig::default()).unwrap();
    let mut video = StillFrameSource::uniform(6, 4, [140, 140, 140]);
    let silent = FixedSpectrum::silent(BINS);
    let mut r = NullRenderer::default();

    let report = run(&mut lp, Some(&mut video), Some(&silent), 0, &mut r);
    assert_eq!(report.outcome, TickOutcome::Updated);
    assert_eq!(report.counts.mid, 24);
    assert_eq!(report.counts.visible(), 24);
    // 140 * 0.05 * 5 + 0 * 2
    assert!(zs(&lp).iter().all(|&z| approx(z, 35.0)));
}

#[test]
fn tiers_split_on_threshold_fractions() {
    let cfg = ReactiveConfig {
        threshold: 240.0,
        ..ReactiveConfig::default()
    };
    let mut lp = ReactiveLoop::new(cfg).unwrap();
    // T/3 = 80, T/2 = 120.
    let rgba = [gray(30), gray(100), gray(200), gray(250)].concat();
    let mut video = StillFrameSource::from_rgba(4, 1, rgba).unwrap();
    let mut r = NullRenderer::default();

    let report = run(&mut lp, Some(&mut video), None, 0, &mut r);
    assert_eq!(report.counts.low, 1);
    assert_eq!(report.counts.mid, 1);
    assert_eq!(report.counts.high, 1);
    assert_eq!(report.counts.too_bright, 1);

    // The buffer is mirrored, so particle 0 reads the rightmost pixel.
    let z = zs(&lp);
    assert_eq!(z[0], 10_000.0);
    assert!(approx(z[1], 200.0 * 0.25));
    assert!(approx(z[2], 100.0 * 0.25));
    assert!(approx(z[3], 30.0 * 0.25));
}

#[test]
fn default_threshold_keeps_every_byte_visible() {
    let mut lp = ReactiveLoop::new(ReactiveConfig::default()).unwrap();
    let mut video = StillFrameSource::uniform(2, 2, [255, 255, 255]);
    let mut r = NullRenderer::default();
    let report = run(&mut lp, Some(&mut video), None, 0, &mut r);
    assert_eq!(report.counts.too_bright, 0);
    assert_eq!(report.counts.high, 4);
}

#[test]
fn density_stride_hides_skipped_particles() {
    let cfg = ReactiveConfig {
        density: 2,
        ..ReactiveConfig::default()
    };
    let mut lp = ReactiveLoop::new(cfg).unwrap();
    let mut video = StillFrameSource::uniform(5, 2, [140, 140, 140]);
    let mut r = NullRenderer::default();

    for ms in [0, 16, 32] {
        let report = run(&mut lp, Some(&mut video), None, ms, &mut r);
        assert_eq!(report.counts.skipped, 5);
        assert_eq!(report.counts.visible(), 5);
    }
    for (i, z) in zs(&lp).into_iter().enumerate() {
        if i % 2 == 0 {
            assert!(approx(z, 35.0), "particle {i} at {z}");
        } else {
            assert_eq!(z, 10_000.0, "particle {i} should be offscreen");
        }
    }
}

#[test]
fn band_energy_boosts_depth() {
    let mut lp = ReactiveLoop::new(ReactiveConfig::default()).unwrap();
    let mut video = StillFrameSource::uniform(3, 3, [140, 140, 140]);
    let loud = FixedSpectrum::uniform(BINS, 255);
    let mut r = NullRenderer::default();

    let report = run(&mut lp, Some(&mut video), Some(&loud), 0, &mut r);
    assert!(approx(report.energies.mid, 1.0));
    assert!(zs(&lp).iter().all(|&z| approx(z, 37.0)));
}

#[test]
fn cached_frame_still_follows_audio() {
    let mut lp = ReactiveLoop::new(ReactiveConfig::default()).unwrap();
    let mut video = StillFrameSource::uniform(3, 3, [140, 140, 140]);
    let mut spectrum = FixedSpectrum::silent(BINS);
    let mut r = NullRenderer::default();

    run(&mut lp, Some(&mut video), Some(&spectrum), 0, &mut r);
    assert!(approx(zs(&lp)[0], 35.0));

    spectrum.bins_mut().fill(255);
    let report = run(&mut lp, Some(&mut video), Some(&spectrum), 100, &mut r);
    assert!(report.use_cache);
    assert!(!report.captured);
    assert!(approx(zs(&lp)[0], 37.0));
}

// ── Colors ──────────────────────────────────────────────────────────────────

#[test]
fn silent_spectrum_flickers_to_black() {
    let mut lp = ReactiveLoop::new(ReactiveConfig::default()).unwrap().with_seed(1);
    let mut video = StillFrameSource::uniform(4, 4, [90, 90, 90]);
    let silent = FixedSpectrum::silent(BINS);
    let mut r = NullRenderer::default();

    run(&mut lp, Some(&mut video), Some(&silent), 0, &mut r);
    let field = lp.field().unwrap();
    assert!((0..field.len()).all(|i| field.color(i) == [0.0, 0.0, 0.0]));
}

#[test]
fn flicker_is_bounded_and_seeded() {
    let colors = |seed: u64| {
        let mut lp = ReactiveLoop::new(ReactiveConfig::default()).unwrap().with_seed(seed);
        let mut video = StillFrameSource::uniform(8, 8, [90, 90, 90]);
        let loud = FixedSpectrum::uniform(BINS, 128);
        let mut r = NullRenderer::default();
        run(&mut lp, Some(&mut video), Some(&loud), 0, &mut r);
        lp.field().unwrap().colors().to_vec()
    };
    let a = colors(42);
    let bound = 128.0 / 255.0;
    assert!(a.iter().all(|&c| (0.0..=bound).contains(&c)));
    assert_eq!(a, colors(42));
    assert_ne!(a, colors(43));
}

#[test]
fn without_audio_colors_stay_at_baseline() {
    let mut lp = ReactiveLoop::new(ReactiveConfig::default()).unwrap();
    let mut video = StillFrameSource::uniform(4, 4, [90, 90, 90]);
    let mut r = NullRenderer::default();

    for ms in [0, 16, 32] {
        let report = run(&mut lp, Some(&mut video), None, ms, &mut r);
        assert!(!report.audio);
        assert!(report.energies.is_silent());
    }
    let field = lp.field().unwrap();
    assert!((0..field.len()).all(|i| field.color(i) == field.base_color()));
    // Both buffers are handed over on every updated tick.
    assert_eq!(r.color_uploads, 3);
    assert_eq!(r.position_uploads, 3);
}

#[test]
fn switching_to_baseline_restores_colors() {
    let mut lp = ReactiveLoop::new(ReactiveConfig::default()).unwrap();
    let mut video = StillFrameSource::uniform(4, 4, [90, 90, 90]);
    let loud = FixedSpectrum::uniform(BINS, 255);
    let mut r = NullRenderer::default();

    run(&mut lp, Some(&mut video), Some(&loud), 0, &mut r);
    lp.set_color_mode(ColorMode::Baseline);
    run(&mut lp, Some(&mut video), Some(&loud), 16, &mut r);

    let field = lp.field().unwrap();
    assert!((0..field.len()).all(|i| field.color(i) == field.base_color()));
    assert_eq!(r.color_uploads, 2);
}

// ── State machine ───────────────────────────────────────────────────────────

#[test]
fn waits_for_a_source_and_draws_idle() {
    let mut lp = ReactiveLoop::new(ReactiveConfig::default()).unwrap();
    let mut r = NullRenderer::default();

    let report = run(&mut lp, None, None, 0, &mut r);
    assert_eq!(report.state, LoopState::AwaitingSource);
    assert_eq!(report.outcome, TickOutcome::Idle);
    assert!(lp.field().is_none());
    assert_eq!((r.idle_draws, r.draws), (1, 0));

    // A source without a live stream does not activate the loop either.
    let mut ended = StillFrameSource::uniform(2, 2, [10, 10, 10]);
    ended.end_stream();
    let report = run(&mut lp, Some(&mut ended), None, 16, &mut r);
    assert_eq!(report.state, LoopState::AwaitingSource);
    assert_eq!(r.idle_draws, 2);
}

#[test]
fn first_frame_activates_for_good() {
    let mut lp = ReactiveLoop::new(ReactiveConfig::default()).unwrap();
    let mut video = StillFrameSource::uniform(7, 3, [60, 60, 60]);
    let mut r = NullRenderer::default();

    let report = run(&mut lp, Some(&mut video), None, 0, &mut r);
    assert_eq!(report.state, LoopState::Active);
    assert!(report.captured);
    assert_eq!(lp.field().unwrap().len(), 21);
    assert_eq!(r.draws, 1);

    let report = run(&mut lp, None, None, 16, &mut r);
    assert_eq!(report.state, LoopState::Active);
    assert_eq!(lp.state(), LoopState::Active);
}

#[test]
fn lost_stream_stalls_without_touching_buffers() {
    let mut lp = ReactiveLoop::new(ReactiveConfig::default()).unwrap();
    let mut video = StillFrameSource::uniform(4, 4, [60, 60, 60]);
    let mut r = NullRenderer::default();

    run(&mut lp, Some(&mut video), None, 0, &mut r);
    let before = zs(&lp);
    let uploads = r.position_uploads;

    video.end_stream();
    let report = run(&mut lp, Some(&mut video), None, 600, &mut r);
    assert_eq!(report.outcome, TickOutcome::Stalled(SampleError::SourceUnavailable));
    assert_eq!(report.state, LoopState::Active);
    assert_eq!(zs(&lp), before);
    assert_eq!(r.draws, 2);
    assert_eq!(r.position_uploads, uploads);

    let report = run(&mut lp, None, None, 700, &mut r);
    assert!(matches!(report.outcome, TickOutcome::Stalled(_)));
}

#[test]
fn cache_bucket_decides_capture() {
    let mut lp = ReactiveLoop::new(ReactiveConfig::default()).unwrap();
    let mut video = StillFrameSource::uniform(2, 2, [60, 60, 60]);
    let mut r = NullRenderer::default();

    assert!(run(&mut lp, Some(&mut video), None, 0, &mut r).captured);
    assert!(!run(&mut lp, Some(&mut video), None, 100, &mut r).captured);
    let report = run(&mut lp, Some(&mut video), None, 600, &mut r);
    assert!(!report.use_cache);
    assert!(report.captured);
    assert_eq!(lp.sampler().captures(), 2);
}

#[test]
fn invalid_config_is_rejected() {
    let cfg = ReactiveConfig {
        density: 0,
        ..ReactiveConfig::default()
    };
    assert!(ReactiveLoop::new(cfg).is_err());
}

#[test]
fn density_setter_never_drops_below_one() {
    let mut lp = ReactiveLoop::new(ReactiveConfig::default()).unwrap();
    lp.set_density(0);
    assert_eq!(lp.config().density, 1);
    lp.set_density(3);
    assert_eq!(lp.config().density, 3);
}
