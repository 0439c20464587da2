//! # Display-path spectral marker check
//!
//! A second, slower look at the minute marker from the display-rate
//! stream: long FFT frames put fine bins on the 1000 Hz region, and every
//! frame's bucket energy is reported against a self-tracked baseline as
//! an advisory [`SlowMarkerFrame`].
//!
//! These frames carry no detection authority of their own. Their only
//! consumer is the marker correlator, which uses them to cross-check the
//! fast detector's markers.

use crate::events::SlowMarkerFrame;
use crate::fft::{FftProcessor, WindowKind};
use crate::station::Station;

const SLOW_FFT_SIZE: usize = 2048;
const SLOW_BANDWIDTH_HZ: f32 = 50.0;

const THRESHOLD_MULT: f32 = 3.0;
const NOISE_ADAPT_RATE: f32 = 0.005;
const BASELINE_MIN: f32 = 1.0e-5;
const WARMUP_FRAMES: u64 = 20;
const WARMUP_ADAPT_RATE: f32 = 0.05;

const PANIC_FFT_BLOCK: &str = "slow-marker FFT block length invariant broken";

/// Advisory spectral observer for the minute marker
#[derive(Debug)]
pub struct SlowMarkerDetector {
    fft: FftProcessor,
    frame_ms: f32,
    tick_freq_hz: f32,

    i_buffer: Vec<f32>,
    q_buffer: Vec<f32>,
    buffer_idx: usize,

    baseline: f32,
    frame_count: u64,
}

impl SlowMarkerDetector {
    /// Create for the given display-path sampling rate and station
    pub fn new(sample_rate: f32, station: Station) -> Self {
        let fft = FftProcessor::new(SLOW_FFT_SIZE, sample_rate, WindowKind::Hann)
            .expect(PANIC_FFT_BLOCK);
        let frame_ms = fft.frame_duration_ms();

        Self {
            fft,
            frame_ms,
            tick_freq_hz: station.tick_freq_hz(),
            i_buffer: vec![0.0; SLOW_FFT_SIZE],
            q_buffer: vec![0.0; SLOW_FFT_SIZE],
            buffer_idx: 0,
            baseline: 0.01,
            frame_count: 0,
        }
    }

    /// Process one display-path sample
    ///
    /// Emits one advisory frame per completed FFT after warmup.
    pub fn process(&mut self, i: f32, q: f32) -> Option<SlowMarkerFrame> {
        self.i_buffer[self.buffer_idx] = i;
        self.q_buffer[self.buffer_idx] = q;
        self.buffer_idx += 1;
        if self.buffer_idx < SLOW_FFT_SIZE {
            return None;
        }
        self.buffer_idx = 0;

        self.fft
            .process(&self.i_buffer, &self.q_buffer)
            .expect(PANIC_FFT_BLOCK);
        let energy = self.fft.bucket_energy(self.tick_freq_hz, SLOW_BANDWIDTH_HZ);

        let frame = self.frame_count;
        self.frame_count += 1;
        let timestamp_ms = frame as f32 * self.frame_ms;

        if frame < WARMUP_FRAMES {
            self.baseline += WARMUP_ADAPT_RATE * (energy - self.baseline);
            self.baseline = self.baseline.max(BASELINE_MIN);
            return None;
        }

        let threshold = self.baseline * THRESHOLD_MULT;
        let above_threshold = energy > threshold;

        // baseline learns only from sub-threshold frames
        if !above_threshold {
            self.baseline += NOISE_ADAPT_RATE * (energy - self.baseline);
            self.baseline = self.baseline.max(BASELINE_MIN);
        }

        let snr_db = 10.0 * (energy / (self.baseline + 1.0e-10)).log10();

        Some(SlowMarkerFrame {
            timestamp_ms,
            energy,
            snr_db,
            above_threshold,
        })
    }

    /// Current baseline
    pub fn baseline(&self) -> f32 {
        self.baseline
    }

    /// FFT frame duration (ms)
    pub fn frame_duration_ms(&self) -> f32 {
        self.frame_ms
    }
}
