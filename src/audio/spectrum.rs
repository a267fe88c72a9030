use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::Deserialize;
use std::sync::Arc;

use super::decode::AudioData;

/// Anything that can hand the engine a byte magnitude spectrum on demand:
/// a live capture, a decoded file, or fixed test data.
pub trait SpectrumSource {
    fn bin_count(&self) -> usize;

    /// Writes the current magnitudes into `bins` (`bins.len() == bin_count()`).
    fn fill(&mut self, bins: &mut [u8]);
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct AnalyserSettings {
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    /// Weight of the previous frame in the time smoothing (0.0-1.0)
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_min_decibels")]
    pub min_decibels: f32,
    #[serde(default = "default_max_decibels")]
    pub max_decibels: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            smoothing: default_smoothing(),
            min_decibels: default_min_decibels(),
            max_decibels: default_max_decibels(),
        }
    }
}

fn default_fft_size() -> usize { 1024 }
fn default_smoothing() -> f32 { 0.8 }
fn default_min_decibels() -> f32 { -100.0 }
fn default_max_decibels() -> f32 { -30.0 }

/// Byte spectrum analyser with the conventions of a browser `AnalyserNode`:
/// Blackman window, magnitude divided by N, exponential time smoothing, then
/// a linear map of decibels in `[min_decibels, max_decibels]` onto 0-255.
pub struct Analyser {
    settings: AnalyserSettings,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    buffer: Vec<Complex<f32>>,
}

impl Analyser {
    pub fn new(mut settings: AnalyserSettings) -> Self {
        settings.fft_size = settings.fft_size.max(32).next_power_of_two();
        settings.smoothing = settings.smoothing.clamp(0.0, 1.0);

        let n = settings.fft_size;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);

        Self {
            settings,
            fft,
            window: blackman_window(n),
            smoothed: vec![0.0; n / 2],
            buffer: vec![Complex::new(0.0, 0.0); n],
        }
    }

    pub fn settings(&self) -> &AnalyserSettings {
        &self.settings
    }

    pub fn fft_size(&self) -> usize {
        self.settings.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.settings.fft_size / 2
    }

    /// Analyses the most recent `fft_size` samples of `window_samples`
    /// (zero-padded at the front when shorter).
    pub fn process(&mut self, window_samples: &[f32], bins: &mut [u8]) {
        let n = self.settings.fft_size;
        let take = window_samples.len().min(n);
        let recent = &window_samples[window_samples.len() - take..];
        let pad = n - take;

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = if i < pad { 0.0 } else { recent[i - pad] };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buffer);

        let tau = self.settings.smoothing;
        let range = (self.settings.max_decibels - self.settings.min_decibels).max(f32::EPSILON);
        let scale = 1.0 / n as f32;

        for (k, out) in bins.iter_mut().enumerate().take(self.smoothed.len()) {
            let magnitude = self.buffer[k].norm() * scale;
            let value = tau * self.smoothed[k] + (1.0 - tau) * magnitude;
            self.smoothed[k] = if value.is_finite() { value } else { 0.0 };
            *out = decibels_to_byte(self.smoothed[k], self.settings.min_decibels, range);
        }
    }
}

fn decibels_to_byte(magnitude: f32, min_decibels: f32, range: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = (255.0 / range) * (db - min_decibels);
    scaled.floor().clamp(0.0, 255.0) as u8
}

fn blackman_window(size: usize) -> Vec<f32> {
    let a0 = 0.42;
    let a1 = 0.5;
    let a2 = 0.08;
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
            a0 - a1 * phase.cos() + a2 * (2.0 * phase).cos()
        })
        .collect()
}

/// Spectrum of a decoded file at a movable playback position.
pub struct PcmSpectrum {
    audio: AudioData,
    analyser: Analyser,
    position: usize,
}

impl PcmSpectrum {
    pub fn new(audio: AudioData, settings: AnalyserSettings) -> Self {
        Self {
            audio,
            analyser: Analyser::new(settings),
            position: 0,
        }
    }

    /// Moves the playback head to `seconds` (clamped to the end of the file).
    pub fn seek(&mut self, seconds: f32) {
        let sample = (seconds.max(0.0) * self.audio.sample_rate as f32) as usize;
        self.position = sample.min(self.audio.samples.len());
    }

    pub fn duration(&self) -> f32 {
        self.audio.duration()
    }

    pub fn audio(&self) -> &AudioData {
        &self.audio
    }
}

impl SpectrumSource for PcmSpectrum {
    fn bin_count(&self) -> usize {
        self.analyser.bin_count()
    }

    fn fill(&mut self, bins: &mut [u8]) {
        let window = &self.audio.samples[..self.position];
        self.analyser.process(window, bins);
    }
}

/// Fixed spectrum, replaced wholesale by `set`.
#[derive(Clone, Debug)]
pub struct StaticSpectrum {
    bins: Vec<u8>,
}

impl StaticSpectrum {
    pub fn new(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    pub fn silent(bin_count: usize) -> Self {
        Self { bins: vec![0; bin_count] }
    }

    pub fn set(&mut self, bins: Vec<u8>) {
        self.bins = bins;
    }

    /// Sets the five bass bins to `level` (0.0-1.0), leaving the rest alone.
    pub fn set_bass(&mut self, level: f32) {
        let byte = (level.clamp(0.0, 1.0) * 255.0).round() as u8;
        for bin in self.bins.iter_mut().take(super::features::BASS_BINS) {
            *bin = byte;
        }
    }
}

impl SpectrumSource for StaticSpectrum {
    fn bin_count(&self) -> usize {
        self.bins.len()
    }

    fn fill(&mut self, bins: &mut [u8]) {
        let n = bins.len().min(self.bins.len());
        bins[..n].copy_from_slice(&self.bins[..n]);
        bins[n..].fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn silence_maps_to_zero() {
        let mut analyser = Analyser::new(AnalyserSettings::default());
        let mut bins = vec![1u8; analyser.bin_count()];
        analyser.process(&vec![0.0; 1024], &mut bins);
        assert!(bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn tone_peaks_at_its_bin() {
        let settings = AnalyserSettings { smoothing: 0.0, ..AnalyserSettings::default() };
        let mut analyser = Analyser::new(settings);
        let mut bins = vec![0u8; analyser.bin_count()];
        // 1024-point FFT at 48 kHz: bin 20 sits at 937.5 Hz
        let samples = sine(937.5, 48_000, 1024, 0.05);
        analyser.process(&samples, &mut bins);

        let peak = bins.iter().enumerate().max_by_key(|(_, &b)| b).map(|(i, _)| i);
        assert_eq!(peak, Some(20));
        assert!(bins[20] > 200);
        assert!(bins[200] < bins[20]);
    }

    #[test]
    fn smoothing_carries_previous_frame() {
        let mut analyser = Analyser::new(AnalyserSettings::default());
        let mut bins = vec![0u8; analyser.bin_count()];
        analyser.process(&sine(937.5, 48_000, 1024, 0.05), &mut bins);
        let loud = bins[20];
        analyser.process(&vec![0.0; 1024], &mut bins);
        assert!(bins[20] > 0);
        assert!(bins[20] < loud);
    }

    #[test]
    fn fft_size_rounds_to_power_of_two() {
        let analyser = Analyser::new(AnalyserSettings { fft_size: 1000, ..AnalyserSettings::default() });
        assert_eq!(analyser.fft_size(), 1024);
        assert_eq!(analyser.bin_count(), 512);
    }

    #[test]
    fn pcm_source_reads_up_to_playhead() {
        let audio = AudioData {
            samples: sine(937.5, 48_000, 48_000, 0.05),
            sample_rate: 48_000,
        };
        let mut source = PcmSpectrum::new(audio, AnalyserSettings { smoothing: 0.0, ..AnalyserSettings::default() });
        let mut bins = vec![0u8; source.bin_count()];

        source.fill(&mut bins);
        assert!(bins.iter().all(|&b| b == 0));

        source.seek(0.5);
        source.fill(&mut bins);
        assert!(bins[20] > 200);
    }

    #[test]
    fn static_source_pads_with_zero() {
        let mut source = StaticSpectrum::new(vec![9, 9]);
        source.set_bass(1.0);
        let mut bins = vec![7u8; 4];
        source.fill(&mut bins);
        assert_eq!(bins, vec![255, 255, 0, 0]);
    }
}
