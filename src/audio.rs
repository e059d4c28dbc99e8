use crate::config::AnalyserConfig;
use anyhow::{Context, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer as _, Producer as _, Split as _};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering, fence};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Anything that can hand out the current 8-bit magnitude spectrum.
pub trait SpectrumSource {
    /// Replaces `out` with the latest spectrum (`fft_size / 2` bins).
    fn read_spectrum(&self, out: &mut Vec<u8>);

    fn bin_count(&self) -> usize;
}

/// A spectrum that never changes. Handy for tests and benchmarks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedSpectrum {
    bins: Vec<u8>,
}

impl FixedSpectrum {
    pub fn new(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    pub fn uniform(len: usize, magnitude: u8) -> Self {
        Self {
            bins: vec![magnitude; len],
        }
    }

    pub fn silent(len: usize) -> Self {
        Self::uniform(len, 0)
    }

    pub fn bins_mut(&mut self) -> &mut [u8] {
        &mut self.bins
    }
}

impl SpectrumSource for FixedSpectrum {
    fn read_spectrum(&self, out: &mut Vec<u8>) {
        out.clear();
        out.extend_from_slice(&self.bins);
    }

    fn bin_count(&self) -> usize {
        self.bins.len()
    }
}

/// Spectrum published by the analyzer thread and read by the tick loop
/// without locking (sequence lock over atomic bins).
pub struct SharedSpectrum {
    seq: AtomicU64,
    bins: Box<[AtomicU8]>,
    updated_ms: AtomicU64,
}

impl SharedSpectrum {
    pub fn new(bin_count: usize) -> Self {
        Self {
            seq: AtomicU64::new(0),
            bins: (0..bin_count).map(|_| AtomicU8::new(0)).collect(),
            updated_ms: AtomicU64::new(0),
        }
    }

    pub fn store(&self, spectrum: &[u8]) {
        self.seq.fetch_add(1, Ordering::Relaxed); // odd => write in progress
        // Keeps the bin stores below from moving ahead of the odd mark.
        fence(Ordering::Release);
        for (dst, &src) in self.bins.iter().zip(spectrum) {
            dst.store(src, Ordering::Relaxed);
        }
        self.updated_ms.store(now_ms(), Ordering::Relaxed);
        self.seq.fetch_add(1, Ordering::Release); // even => stable
    }

    pub fn load_into(&self, out: &mut Vec<u8>) {
        loop {
            let v1 = self.seq.load(Ordering::Acquire);
            if v1 & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            out.clear();
            out.extend(self.bins.iter().map(|b| b.load(Ordering::Relaxed)));
            // Keeps the bin loads above from moving past the second read.
            fence(Ordering::Acquire);
            let v2 = self.seq.load(Ordering::Relaxed);
            if v1 == v2 {
                return;
            }
        }
    }

    pub fn age_ms(&self) -> f32 {
        let t = self.updated_ms.load(Ordering::Relaxed);
        if t == 0 {
            return 0.0;
        }
        now_ms().saturating_sub(t) as f32
    }
}

impl SpectrumSource for SharedSpectrum {
    fn read_spectrum(&self, out: &mut Vec<u8>) {
        self.load_into(out);
    }

    fn bin_count(&self) -> usize {
        self.bins.len()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_millis(0))
        .as_millis() as u64
}

/// Turns a window of mono samples into a byte spectrum the way a browser
/// `AnalyserNode` does: Blackman window, magnitude / N, exponential smoothing
/// across calls, then a linear map of `[min_db, max_db]` onto `0..=255`.
pub struct SpectrumAnalyser {
    cfg: AnalyserConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buf: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyser {
    pub fn new(cfg: AnalyserConfig) -> Self {
        let n = cfg.fft_size.max(2);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let window = (0..n)
            .map(|i| {
                let p = i as f32 / n as f32;
                0.42 - 0.5 * (2.0 * PI * p).cos() + 0.08 * (4.0 * PI * p).cos()
            })
            .collect();
        Self {
            cfg,
            fft,
            window,
            buf: vec![Complex { re: 0.0, im: 0.0 }; n],
            smoothed: vec![0.0; n / 2],
        }
    }

    pub fn bin_count(&self) -> usize {
        self.smoothed.len()
    }

    /// `samples` is one time-ordered window; missing samples count as silence.
    pub fn process(&mut self, samples: &[f32], out: &mut [u8]) {
        let n = self.buf.len();
        for (i, c) in self.buf.iter_mut().enumerate() {
            let s = samples.get(i).copied().unwrap_or(0.0);
            *c = Complex {
                re: s * self.window[i],
                im: 0.0,
            };
        }
        self.fft.process(&mut self.buf);

        let tau = self.cfg.smoothing.clamp(0.0, 1.0);
        let range = (self.cfg.max_db - self.cfg.min_db).max(1e-3);
        for (k, (s, c)) in self.smoothed.iter_mut().zip(&self.buf).enumerate() {
            let mag = c.norm() / n as f32;
            *s = tau * *s + (1.0 - tau) * mag;
            if let Some(dst) = out.get_mut(k) {
                *dst = if *s > 0.0 {
                    let db = 20.0 * s.log10();
                    (255.0 / range * (db - self.cfg.min_db)).clamp(0.0, 255.0) as u8
                } else {
                    0
                };
            }
        }
    }
}

pub fn list_input_devices() -> anyhow::Result<()> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .context("enumerate input devices")?;

    let mut out = io::stdout();
    writeln!(out, "Input devices:")?;
    for dev in devices {
        let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
        writeln!(out, "  - {}", name)?;
    }
    Ok(())
}

/// Microphone capture feeding a background spectrum analyzer.
pub struct AudioSystem {
    _stream: cpal::Stream,
    stop: Arc<AtomicBool>,
    analyzer_handle: Option<thread::JoinHandle<()>>,
    spectrum: Arc<SharedSpectrum>,
    pub sample_rate_hz: u32,
}

impl AudioSystem {
    pub fn new(device_query: Option<&str>, cfg: AnalyserConfig) -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = select_mic_input_device(&host, device_query)?;
        let supported = device
            .default_input_config()
            .context("get default input config")?;
        let sample_rate_hz = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.clone().into();

        let rb_capacity = (sample_rate_hz as usize).saturating_mul(2);
        let rb = HeapRb::<f32>::new(rb_capacity);
        let (mut prod, mut cons) = rb.split();

        let stop = Arc::new(AtomicBool::new(false));
        let spectrum = Arc::new(SharedSpectrum::new(cfg.bin_count()));
        let spectrum_for_thread = Arc::clone(&spectrum);
        let stop_for_thread = Arc::clone(&stop);

        let err_fn = |err: cpal::StreamError| warn!(%err, "audio stream error");

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            fmt => return Err(anyhow!("unsupported sample format: {fmt:?}")),
        };

        stream.play().context("start input stream")?;

        let analyzer_handle = thread::Builder::new()
            .name("spectrum-analyzer".to_string())
            .spawn(move || {
                analyze_loop(&mut cons, cfg, &stop_for_thread, &spectrum_for_thread)
            })
            .context("spawn analyzer thread")?;

        info!(
            device = %device.name().unwrap_or_default(),
            sample_rate_hz,
            channels,
            fft_size = cfg.fft_size,
            "microphone capture started"
        );

        Ok(Self {
            _stream: stream,
            stop,
            analyzer_handle: Some(analyzer_handle),
            spectrum,
            sample_rate_hz,
        })
    }

    pub fn spectrum(&self) -> Arc<SharedSpectrum> {
        Arc::clone(&self.spectrum)
    }
}

impl Drop for AudioSystem {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.analyzer_handle.take() {
            let _ = h.join();
        }
    }
}

fn select_mic_input_device(
    host: &cpal::Host,
    device_query: Option<&str>,
) -> anyhow::Result<cpal::Device> {
    let devices = host
        .input_devices()
        .context("enumerate input devices")?
        .collect::<Vec<_>>();

    if let Some(want) = device_query.map(str::to_lowercase) {
        return devices
            .into_iter()
            .find(|d| {
                d.name()
                    .map(|n| n.to_lowercase().contains(&want))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("no input device matching: {want}"));
    }

    host.default_input_device()
        .ok_or_else(|| anyhow!("no default input device found"))
}

fn push_interleaved<T: Sample<Float = f32> + Copy>(
    data: &[T],
    channels: usize,
    prod: &mut ringbuf::HeapProd<f32>,
) {
    let channels = channels.max(1);
    for frame in data.chunks(channels) {
        let acc: f32 = frame.iter().map(|s| s.to_float_sample()).sum();
        let _ = prod.try_push(acc / channels as f32);
    }
}

fn analyze_loop(
    cons: &mut ringbuf::HeapCons<f32>,
    cfg: AnalyserConfig,
    stop: &AtomicBool,
    spectrum: &SharedSpectrum,
) {
    let n = cfg.fft_size.max(2);
    let hop = (n / 4).max(1);

    let mut analyser = SpectrumAnalyser::new(cfg);
    let mut ring = vec![0.0f32; n];
    let mut ordered = vec![0.0f32; n];
    let mut bytes = vec![0u8; analyser.bin_count()];
    let mut write_pos = 0usize;
    let mut since_last = 0usize;
    let mut windows = 0u64;

    while !stop.load(Ordering::Relaxed) {
        let mut got_any = false;
        while let Some(s) = cons.try_pop() {
            got_any = true;
            ring[write_pos] = s;
            write_pos = (write_pos + 1) % n;
            since_last += 1;
            if since_last >= hop {
                since_last = 0;
                let (tail, head) = ring.split_at(write_pos);
                ordered[..head.len()].copy_from_slice(head);
                ordered[head.len()..].copy_from_slice(tail);
                analyser.process(&ordered, &mut bytes);
                spectrum.store(&bytes);
                windows += 1;
            }
        }

        if !got_any {
            thread::sleep(Duration::from_millis(1));
        }
    }
    debug!(windows, "spectrum analyzer stopped");
}
