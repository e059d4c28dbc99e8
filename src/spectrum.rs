//! Frequency band analysis over an 8-bit magnitude spectrum.
//!
//! The spectrum is the half-size output of an FFT where each bin holds a
//! magnitude in `0..=255`. Band energies are the mean magnitude over the bins a
//! frequency range maps onto, normalized to `[0, 1]`.

use crate::config::{ReactiveConfig, Tier};

/// Largest magnitude an 8-bit spectrum bin can hold.
pub const MAX_MAGNITUDE: f32 = 255.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrequencyBand {
    Bass,
    LowMid,
    Mid,
    HighMid,
    Treble,
}

impl FrequencyBand {
    pub const fn all() -> [Self; 5] {
        [
            Self::Bass,
            Self::LowMid,
            Self::Mid,
            Self::HighMid,
            Self::Treble,
        ]
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bass" => Some(Self::Bass),
            "low_mid" | "lowmid" | "low-mid" => Some(Self::LowMid),
            "mid" => Some(Self::Mid),
            "high_mid" | "highmid" | "high-mid" => Some(Self::HighMid),
            "treble" => Some(Self::Treble),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bass => "bass",
            Self::LowMid => "low_mid",
            Self::Mid => "mid",
            Self::HighMid => "high_mid",
            Self::Treble => "treble",
        }
    }

    pub const fn default_range(self) -> BandRange {
        match self {
            Self::Bass => BandRange::new(20.0, 140.0),
            Self::LowMid => BandRange::new(140.0, 400.0),
            Self::Mid => BandRange::new(400.0, 2600.0),
            Self::HighMid => BandRange::new(2600.0, 5200.0),
            Self::Treble => BandRange::new(5200.0, 14000.0),
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Bass => 0,
            Self::LowMid => 1,
            Self::Mid => 2,
            Self::HighMid => 3,
            Self::Treble => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandRange {
    pub low_hz: f32,
    pub high_hz: f32,
}

impl BandRange {
    pub const fn new(low_hz: f32, high_hz: f32) -> Self {
        Self { low_hz, high_hz }
    }
}

/// Frequency range assigned to every named band.
#[derive(Debug, Clone, PartialEq)]
pub struct BandTable {
    ranges: [BandRange; 5],
}

impl Default for BandTable {
    fn default() -> Self {
        Self {
            ranges: FrequencyBand::all().map(FrequencyBand::default_range),
        }
    }
}

impl BandTable {
    pub fn get(&self, band: FrequencyBand) -> BandRange {
        self.ranges[band.index()]
    }

    pub fn set(&mut self, band: FrequencyBand, range: BandRange) {
        self.ranges[band.index()] = range;
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrequencyBand, BandRange)> + '_ {
        FrequencyBand::all()
            .into_iter()
            .map(|band| (band, self.get(band)))
    }
}

/// Inclusive bin range a frequency range maps onto, or `None` when nothing can
/// be measured (empty spectrum, unusable sample rate or bounds).
///
/// Both ends are clamped to valid bins. An inverted range collapses onto the
/// single bin at its upper end so the average always covers at least one bin.
pub fn band_bins(len: usize, low_hz: f32, high_hz: f32, sample_rate_hz: f32) -> Option<(usize, usize)> {
    if len == 0 || !sample_rate_hz.is_finite() || sample_rate_hz <= 0.0 {
        return None;
    }
    if !low_hz.is_finite() || !high_hz.is_finite() {
        return None;
    }

    let nyquist = sample_rate_hz / 2.0;
    let last = len - 1;
    let to_bin = |hz: f32| -> usize {
        let b = (hz / nyquist * len as f32).round();
        if b <= 0.0 { 0 } else { (b as usize).min(last) }
    };

    let hi = to_bin(high_hz);
    let lo = to_bin(low_hz).min(hi);
    Some((lo, hi))
}

/// Normalized mean magnitude of `spectrum` between `low_hz` and `high_hz`.
pub fn band_energy(spectrum: &[u8], low_hz: f32, high_hz: f32, sample_rate_hz: f32) -> f32 {
    let Some((lo, hi)) = band_bins(spectrum.len(), low_hz, high_hz, sample_rate_hz) else {
        return 0.0;
    };

    let bins = &spectrum[lo..=hi];
    let total: u32 = bins.iter().map(|&m| m as u32).sum();
    let mean = total as f32 / bins.len() as f32;
    (mean / MAX_MAGNITUDE).clamp(0.0, 1.0)
}

pub fn band_energy_for(spectrum: &[u8], band: BandRange, sample_rate_hz: f32) -> f32 {
    band_energy(spectrum, band.low_hz, band.high_hz, sample_rate_hz)
}

/// Energies driving the three luminance tiers for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandEnergies {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl BandEnergies {
    pub fn measure(spectrum: &[u8], cfg: &ReactiveConfig) -> Self {
        let energy = |tier: Tier| {
            let range = cfg.bands.get(cfg.tier_band(tier));
            band_energy_for(spectrum, range, cfg.sample_rate_hz)
        };
        Self {
            low: energy(Tier::Low),
            mid: energy(Tier::Mid),
            high: energy(Tier::High),
        }
    }

    pub fn get(&self, tier: Tier) -> f32 {
        match tier {
            Tier::Low => self.low,
            Tier::Mid => self.mid,
            Tier::High => self.high,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.low == 0.0 && self.mid == 0.0 && self.high == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bass_maps_to_low_bins_of_a_1024_bin_spectrum() {
        // 20 Hz -> 0.85 -> 1, 140 Hz -> 5.97 -> 6 at a 48 kHz nominal rate.
        assert_eq!(band_bins(1024, 20.0, 140.0, 48_000.0), Some((1, 6)));
    }

    #[test]
    fn ranges_past_nyquist_clamp_to_last_bin() {
        assert_eq!(band_bins(16, 10_000.0, 96_000.0, 48_000.0), Some((7, 15)));
        assert_eq!(band_bins(16, 30_000.0, 40_000.0, 48_000.0), Some((15, 15)));
    }

    #[test]
    fn inverted_range_collapses_to_one_bin() {
        assert_eq!(band_bins(1024, 5000.0, 100.0, 48_000.0), Some((4, 4)));
    }

    #[test]
    fn unusable_inputs_measure_nothing() {
        assert_eq!(band_bins(0, 20.0, 140.0, 48_000.0), None);
        assert_eq!(band_bins(1024, 20.0, 140.0, 0.0), None);
        assert_eq!(band_bins(1024, f32::NAN, 140.0, 48_000.0), None);
        assert_eq!(band_energy(&[], 20.0, 140.0, 48_000.0), 0.0);
    }

    #[test]
    fn band_names_round_trip() {
        for band in FrequencyBand::all() {
            assert_eq!(FrequencyBand::parse(band.as_str()), Some(band));
        }
        assert_eq!(FrequencyBand::parse("High-Mid"), Some(FrequencyBand::HighMid));
        assert_eq!(FrequencyBand::parse("sub"), None);
    }
}
