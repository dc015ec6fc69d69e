// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Level and spectrum metering of the master output.
//!
//! The engine pushes every rendered block into a [`MeterTap`]. Readers on other threads
//! clone the tap and poll it; the FFT only runs when a reader asks for the spectrum.

use std::f32::consts::PI;
use std::sync::Arc;

use parking_lot::Mutex;
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

/// Number of log-spaced spectrum bands.
pub const NUM_BANDS: usize = 32;

/// FFT size in frames.
const FFT_SIZE: usize = 2048;

/// How much of the previous spectrum survives each read.
const SMOOTHING: f32 = 0.7;

const MIN_FREQ: f32 = 20.0;
const MAX_FREQ: f32 = 20000.0;

/// Peak and RMS of the most recent block, per channel pair.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeterLevels {
    pub peak: f32,
    pub rms: f32,
}

struct Analyzer {
    fft: Arc<dyn RealToComplex<f32>>,
    /// Mono history, written as a ring.
    history: Vec<f32>,
    write_pos: usize,
    windowed: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    window: Vec<f32>,
    band_frequencies: [f32; NUM_BANDS],
    bands: [f32; NUM_BANDS],
    sample_rate: u32,
}

impl Analyzer {
    fn new(sample_rate: u32) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let spectrum = fft.make_output_vec();

        let window = (0..FFT_SIZE)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / FFT_SIZE as f32).cos()))
            .collect();

        let log_min = MIN_FREQ.ln();
        let log_max = MAX_FREQ.min(sample_rate as f32 / 2.0).ln();
        let mut band_frequencies = [0.0; NUM_BANDS];
        for (i, freq) in band_frequencies.iter_mut().enumerate() {
            let t = i as f32 / (NUM_BANDS - 1) as f32;
            *freq = (log_min + t * (log_max - log_min)).exp();
        }

        Self {
            fft,
            history: vec![0.0; FFT_SIZE],
            write_pos: 0,
            windowed: vec![0.0; FFT_SIZE],
            spectrum,
            window,
            band_frequencies,
            bands: [0.0; NUM_BANDS],
            sample_rate,
        }
    }

    fn push(&mut self, left: &[f32], right: &[f32]) {
        for (l, r) in left.iter().zip(right) {
            self.history[self.write_pos] = (l + r) * 0.5;
            self.write_pos = (self.write_pos + 1) % FFT_SIZE;
        }
    }

    fn analyze(&mut self) -> [f32; NUM_BANDS] {
        // Unroll the ring oldest-first so the window lines up with time.
        let (newest, oldest) = self.history.split_at(self.write_pos);
        for ((out, sample), w) in self
            .windowed
            .iter_mut()
            .zip(oldest.iter().chain(newest))
            .zip(&self.window)
        {
            *out = sample * w;
        }

        if self
            .fft
            .process(&mut self.windowed, &mut self.spectrum)
            .is_err()
        {
            return self.bands;
        }

        let bin_freq = self.sample_rate as f32 / FFT_SIZE as f32;
        let last_bin = self.spectrum.len() - 1;
        let nyquist = self.sample_rate as f32 / 2.0;

        for band in 0..NUM_BANDS {
            let center = self.band_frequencies[band];
            let low = match band.checked_sub(1) {
                Some(prev) => (self.band_frequencies[prev] + center) / 2.0,
                None => MIN_FREQ,
            };
            let high = match self.band_frequencies.get(band + 1) {
                Some(next) => (center + next) / 2.0,
                None => nyquist,
            };

            let low_bin = ((low / bin_freq) as usize).max(1);
            let high_bin = ((high / bin_freq) as usize).clamp(low_bin, last_bin);
            let bins = &self.spectrum[low_bin..=high_bin];
            let average = bins.iter().map(|c| c.norm()).sum::<f32>() / bins.len() as f32;
            let normalized = (average / (FFT_SIZE as f32 / 4.0)).min(1.0);

            self.bands[band] = self.bands[band] * SMOOTHING + normalized * (1.0 - SMOOTHING);
        }

        self.bands
    }
}

struct MeterState {
    levels: MeterLevels,
    analyzer: Analyzer,
}

/// A cloneable view of the engine's master output levels.
#[derive(Clone)]
pub struct MeterTap {
    state: Arc<Mutex<MeterState>>,
}

impl MeterTap {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(MeterState {
                levels: MeterLevels::default(),
                analyzer: Analyzer::new(sample_rate),
            })),
        }
    }

    /// Records one rendered block.
    pub fn push(&self, left: &[f32], right: &[f32]) {
        let frames = left.len().min(right.len());
        if frames == 0 {
            return;
        }

        let mut peak = 0.0f32;
        let mut sum_squares = 0.0f32;
        for (l, r) in left.iter().zip(right) {
            peak = peak.max(l.abs()).max(r.abs());
            sum_squares += l * l + r * r;
        }
        let rms = (sum_squares / (2 * frames) as f32).sqrt();

        let mut state = self.state.lock();
        state.levels = MeterLevels { peak, rms };
        state.analyzer.push(&left[..frames], &right[..frames]);
    }

    /// Levels of the most recent block.
    pub fn levels(&self) -> MeterLevels {
        self.state.lock().levels
    }

    /// Smoothed band magnitudes in [0, 1], low to high.
    pub fn spectrum(&self) -> [f32; NUM_BANDS] {
        self.state.lock().analyzer.analyze()
    }

    /// Center frequency of each spectrum band.
    pub fn band_frequencies(&self) -> [f32; NUM_BANDS] {
        self.state.lock().analyzer.band_frequencies
    }
}

impl std::fmt::Debug for MeterTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeterTap")
            .field("levels", &self.levels())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::generate_sine;

    #[test]
    fn test_levels() {
        let tap = MeterTap::new(48000);
        assert_eq!(tap.levels(), MeterLevels::default());

        tap.push(&[0.5, -0.5, 0.5, -0.5], &[0.5, -0.5, 0.5, -0.5]);
        let levels = tap.levels();
        assert_eq!(levels.peak, 0.5);
        assert!((levels.rms - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_spectrum_finds_tone() {
        let tap = MeterTap::new(48000);
        let tone = generate_sine(1000.0, 48000, FFT_SIZE);
        tap.push(&tone, &tone);

        let bands = tap.spectrum();
        let freqs = tap.band_frequencies();
        let loudest = (0..NUM_BANDS)
            .max_by(|a, b| bands[*a].total_cmp(&bands[*b]))
            .unwrap();
        // The loudest band sits next to 1 kHz.
        assert!(freqs[loudest] > 700.0 && freqs[loudest] < 1400.0);
        assert!(bands.iter().all(|b| (0.0..=1.0).contains(b)));
    }

    #[test]
    fn test_clones_share_state() {
        let tap = MeterTap::new(48000);
        let reader = tap.clone();
        tap.push(&[0.25], &[0.0]);
        assert_eq!(reader.levels().peak, 0.25);
    }
}
