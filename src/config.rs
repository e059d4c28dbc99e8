use crate::spectrum::{BandRange, BandTable, FrequencyBand};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Parser, Debug, Clone)]
#[command(name = "particle-mirror", version, about = "Webcam + audio reactive particle field for the terminal")]
pub struct Config {
    #[arg(long, value_enum, default_value_t = VideoInput::preferred())]
    pub video: VideoInput,

    /// Device index used with `--video camera`.
    #[arg(long, default_value_t = 0)]
    pub camera_index: u32,

    #[arg(long, default_value_t = 160)]
    pub video_width: usize,

    #[arg(long, default_value_t = 120)]
    pub video_height: usize,

    #[arg(long, value_enum, default_value_t = AudioInput::Mic)]
    pub audio: AudioInput,

    #[arg(long)]
    pub device: Option<String>,

    #[arg(long, default_value_t = false)]
    pub list_devices: bool,

    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// `key = value` file layered over the built-in defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub density: Option<usize>,

    #[arg(long)]
    pub threshold: Option<f32>,

    #[arg(long)]
    pub centering: Option<f32>,

    #[arg(long)]
    pub cache_bucket_ms: Option<u64>,

    #[arg(long, value_enum)]
    pub color_mode: Option<ColorMode>,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub sync_updates: bool,
}

impl Config {
    /// Defaults, then the config file, then command line overrides.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let mut settings = Settings::load(self.config.as_deref())?;
        let r = &mut settings.reactive;
        if let Some(v) = self.density {
            r.density = v;
        }
        if let Some(v) = self.threshold {
            r.threshold = v;
        }
        if let Some(v) = self.centering {
            r.field.centering = v;
        }
        if let Some(v) = self.cache_bucket_ms {
            r.cache_bucket_ms = v;
        }
        if let Some(v) = self.color_mode {
            r.color_mode = v;
        }
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VideoInput {
    #[value(alias = "webcam")]
    Camera,
    #[value(alias = "test", alias = "synthetic")]
    Pattern,
    #[value(alias = "none")]
    Off,
}

impl VideoInput {
    /// The webcam when the build can open one, the test pattern otherwise.
    pub const fn preferred() -> Self {
        if cfg!(feature = "camera") {
            Self::Camera
        } else {
            Self::Pattern
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AudioInput {
    #[value(alias = "microphone")]
    Mic,
    #[value(alias = "none")]
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Every particle keeps the baseline color.
    Baseline,
    /// Channels flicker randomly, bounded by the tier band energies.
    #[value(alias = "audio")]
    Flicker,
}

impl ColorMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" | "fixed" => Some(Self::Baseline),
            "flicker" | "audio" => Some(Self::Flicker),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Baseline => Self::Flicker,
            Self::Flicker => Self::Baseline,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Flicker => "flicker",
        }
    }
}

/// Luminance tier, darkest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Low,
    Mid,
    High,
}

impl Tier {
    pub const fn all() -> [Self; 3] {
        [Self::Low, Self::Mid, Self::High]
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "mid" => Some(Self::Mid),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Self::Low => 0,
            Self::Mid => 1,
            Self::High => 2,
        }
    }
}

/// Depth mapping constants of one tier: `z = lum * weight * scale + energy * boost`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierParams {
    pub weight: f32,
    pub scale: f32,
    pub boost: f32,
}

impl Default for TierParams {
    fn default() -> Self {
        Self {
            weight: 0.05,
            scale: 5.0,
            boost: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldConfig {
    /// `k` in the initial `y = -row + height / k`.
    pub centering: f32,
    pub particle_size: f32,
    pub base_color: [f32; 3],
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            centering: 2.0,
            particle_size: 20.0,
            base_color: rgb_hex(0xff3b6c),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReactiveConfig {
    pub bands: BandTable,
    /// Band feeding the low, mid and high tier, in that order.
    pub tier_bands: [FrequencyBand; 3],
    /// Nominal rate used to map Hz onto spectrum bins.
    pub sample_rate_hz: f32,
    pub density: usize,
    pub threshold: f32,
    pub low_divisor: f32,
    pub mid_divisor: f32,
    pub tiers: [TierParams; 3],
    pub offscreen_z: f32,
    pub cache_bucket_ms: u64,
    pub field: FieldConfig,
    pub color_mode: ColorMode,
    pub color_gain: f32,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            bands: BandTable::default(),
            tier_bands: [FrequencyBand::Bass, FrequencyBand::Mid, FrequencyBand::Treble],
            sample_rate_hz: 48_000.0,
            density: 1,
            threshold: 300.0,
            low_divisor: 3.0,
            mid_divisor: 2.0,
            tiers: [TierParams::default(); 3],
            offscreen_z: 10_000.0,
            cache_bucket_ms: 500,
            field: FieldConfig::default(),
            color_mode: ColorMode::Flicker,
            color_gain: 1.0,
        }
    }
}

impl ReactiveConfig {
    pub fn tier(&self, tier: Tier) -> &TierParams {
        &self.tiers[tier.index()]
    }

    pub fn tier_mut(&mut self, tier: Tier) -> &mut TierParams {
        &mut self.tiers[tier.index()]
    }

    pub fn tier_band(&self, tier: Tier) -> FrequencyBand {
        self.tier_bands[tier.index()]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.density == 0 {
            return Err(ConfigError::Invalid("density must be at least 1".to_string()));
        }
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(ConfigError::Invalid("threshold must be > 0".to_string()));
        }
        if !(self.mid_divisor >= 1.0 && self.low_divisor > self.mid_divisor) {
            return Err(ConfigError::Invalid(format!(
                "tier divisors must satisfy low > mid >= 1 (got {}, {})",
                self.low_divisor, self.mid_divisor
            )));
        }
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(ConfigError::Invalid("sample_rate_hz must be > 0".to_string()));
        }
        if self.cache_bucket_ms == 0 {
            return Err(ConfigError::Invalid("cache_bucket_ms must be at least 1".to_string()));
        }
        if !(self.field.centering.is_finite() && self.field.centering > 0.0) {
            return Err(ConfigError::Invalid("centering must be > 0".to_string()));
        }
        if !(self.field.particle_size.is_finite() && self.field.particle_size > 0.0) {
            return Err(ConfigError::Invalid("particle_size must be > 0".to_string()));
        }
        if !(self.color_gain.is_finite() && self.color_gain >= 0.0) {
            return Err(ConfigError::Invalid("color_gain must be >= 0".to_string()));
        }
        for tier in Tier::all() {
            let p = self.tier(tier);
            if !(p.weight.is_finite() && p.scale.is_finite() && p.boost.is_finite()) {
                return Err(ConfigError::Invalid(format!(
                    "{} tier parameters must be finite",
                    tier.as_str()
                )));
            }
        }
        for (band, range) in self.bands.iter() {
            if !(range.low_hz >= 0.0 && range.low_hz < range.high_hz) {
                return Err(ConfigError::Invalid(format!(
                    "band {} must satisfy 0 <= low < high (got {}..{})",
                    band.as_str(),
                    range.low_hz,
                    range.high_hz
                )));
            }
        }
        Ok(())
    }
}

/// Web-audio style analyser settings for the byte spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserConfig {
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_db: f32,
    pub max_db: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
        }
    }
}

impl AnalyserConfig {
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fft_size.is_power_of_two() || !(32..=32_768).contains(&self.fft_size) {
            return Err(ConfigError::Invalid(format!(
                "fft_size must be a power of two in 32..=32768 (got {})",
                self.fft_size
            )));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(ConfigError::Invalid("smoothing must be in [0, 1]".to_string()));
        }
        if !(self.min_db < self.max_db) {
            return Err(ConfigError::Invalid("min_db must be below max_db".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub reactive: ReactiveConfig,
    pub analyser: AnalyserConfig,
}

impl Settings {
    /// Reads a config file; a missing path or file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = match std::fs::read_to_string(path) {
            Ok(v) => v,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(ConfigError::Io(err.to_string())),
        };
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        for (line_idx, raw) in text.lines().enumerate() {
            let line_no = line_idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key_raw, value_raw)) = line.split_once('=') else {
                return Err(ConfigError::Parse {
                    line: line_no,
                    message: "expected <key> = <value>".to_string(),
                });
            };
            settings
                .apply(key_raw.trim(), value_raw.trim())
                .map_err(|message| ConfigError::Parse { line: line_no, message })?;
        }
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.reactive.validate()?;
        self.analyser.validate()
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        let r = &mut self.reactive;
        match key {
            "sample_rate_hz" => r.sample_rate_hz = parse_f32(key, value)?,
            "density" => r.density = parse_usize(key, value)?,
            "threshold" => r.threshold = parse_f32(key, value)?,
            "tier_divisors" => {
                let [low, mid] = parse_pair(key, value)?;
                r.low_divisor = low;
                r.mid_divisor = mid;
            }
            "offscreen_z" => r.offscreen_z = parse_f32(key, value)?,
            "cache_bucket_ms" => {
                r.cache_bucket_ms = value
                    .parse::<u64>()
                    .map_err(|_| format!("{key} must be an integer"))?
            }
            "centering" => r.field.centering = parse_f32(key, value)?,
            "particle_size" => r.field.particle_size = parse_f32(key, value)?,
            "base_color" => {
                r.field.base_color =
                    parse_color(value).ok_or_else(|| format!("{key} must be #rrggbb or r, g, b"))?
            }
            "color_mode" => {
                r.color_mode =
                    ColorMode::parse(value).ok_or_else(|| format!("{key} must be baseline/flicker"))?
            }
            "color_gain" => r.color_gain = parse_f32(key, value)?,
            "fft_size" => self.analyser.fft_size = parse_usize(key, value)?,
            "smoothing" => self.analyser.smoothing = parse_f32(key, value)?,
            "min_db" => self.analyser.min_db = parse_f32(key, value)?,
            "max_db" => self.analyser.max_db = parse_f32(key, value)?,
            _ => {
                if let Some(name) = key.strip_prefix("band.") {
                    let band = FrequencyBand::parse(name)
                        .ok_or_else(|| format!("unknown band: {name}"))?;
                    let [low, high] = parse_pair(key, value)?;
                    r.bands.set(band, BandRange::new(low, high));
                } else if let Some(name) = key.strip_prefix("tier_band.") {
                    let tier = Tier::parse(name).ok_or_else(|| format!("unknown tier: {name}"))?;
                    let band = FrequencyBand::parse(value)
                        .ok_or_else(|| format!("unknown band: {value}"))?;
                    r.tier_bands[tier.index()] = band;
                } else if let Some((tier, field)) = key.split_once('.') {
                    let tier = Tier::parse(tier).ok_or_else(|| format!("unknown key: {key}"))?;
                    let v = parse_f32(key, value)?;
                    let params = r.tier_mut(tier);
                    match field {
                        "weight" => params.weight = v,
                        "scale" => params.scale = v,
                        "boost" => params.boost = v,
                        _ => return Err(format!("unknown key: {key}")),
                    }
                } else {
                    return Err(format!("unknown key: {key}"));
                }
            }
        }
        Ok(())
    }
}

pub const fn rgb_hex(rgb: u32) -> [f32; 3] {
    [
        ((rgb >> 16) & 0xff) as f32 / 255.0,
        ((rgb >> 8) & 0xff) as f32 / 255.0,
        (rgb & 0xff) as f32 / 255.0,
    ]
}

fn parse_f32(key: &str, raw: &str) -> Result<f32, String> {
    raw.parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("{key} must be a number"))
}

fn parse_usize(key: &str, raw: &str) -> Result<usize, String> {
    raw.parse::<usize>()
        .map_err(|_| format!("{key} must be a non-negative integer"))
}

fn parse_pair(key: &str, raw: &str) -> Result<[f32; 2], String> {
    let mut parts = raw.split(',').map(str::trim);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => Ok([parse_f32(key, a)?, parse_f32(key, b)?]),
        _ => Err(format!("{key} expects two comma-separated numbers")),
    }
}

fn parse_color(raw: &str) -> Option<[f32; 3]> {
    if let Some(hex) = raw.strip_prefix('#') {
        if hex.len() != 6 {
            return None;
        }
        return u32::from_str_radix(hex, 16).ok().map(rgb_hex);
    }
    let parts = raw
        .split(',')
        .map(|p| p.trim().parse::<f32>().ok())
        .collect::<Option<Vec<_>>>()?;
    match parts.as_slice() {
        [r, g, b] => Some([r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0)]),
        _ => None,
    }
}
