//! # Minute-marker detection
//!
//! The 800 ms minute marker carries far more energy than a 5 ms tick, so
//! this detector integrates: per-frame bucket energy at the tick frequency
//! is summed over a sliding window of about one second, and the
//! accumulated sum is compared against a self-tracked baseline. The
//! baseline adapts only while idle, which keeps the marker itself from
//! poisoning the reference it is measured against.
//!
//! Two quiet periods guard startup: a fast-adapting warmup learns the
//! initial baseline, and no markers at all are accepted during the first
//! ten seconds while the accumulator fills with representative data.
//! Markers recur every 60 s, so a 30 s cooldown follows each detection.

#[cfg(not(test))]
use log::{debug, info};

#[cfg(test)]
use std::{println as debug, println as info};

use crate::builder::{check_range, TunableError};
use crate::events::MarkerEvent;
use crate::fft::{FftProcessor, WindowKind};
use crate::filter::MovingSum;
use crate::logsink::EventLog;
use crate::station::Station;

const MARKER_FFT_SIZE: usize = 256;
const MARKER_BANDWIDTH_HZ: f32 = 100.0;
const WINDOW_MS: f32 = 1000.0;

const THRESHOLD_MULT: f32 = 3.0;
const NOISE_ADAPT_RATE: f32 = 0.001;
const MIN_DURATION_MS: f32 = 500.0;
const MAX_DURATION_MS: f32 = 5_000.0;
const COOLDOWN_MS: f32 = 30_000.0;
const BASELINE_MIN: f32 = 0.001;

const WARMUP_FRAMES: u64 = 200;
const WARMUP_ADAPT_RATE: f32 = 0.02;
const MIN_STARTUP_MS: f32 = 10_000.0;

const PANIC_FFT_BLOCK: &str = "marker FFT block length invariant broken";

/// Fixed field order of the marker log stream
const LOG_HEADER: &str = "marker_num,peak_energy,duration_ms,since_last_sec,baseline,threshold";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    InMarker,
    Cooldown,
}

/// Sliding-window minute-marker detector
#[derive(Debug)]
pub struct MarkerDetector {
    fft: FftProcessor,
    frame_ms: f32,
    tick_freq_hz: f32,

    i_buffer: Vec<f32>,
    q_buffer: Vec<f32>,
    buffer_idx: usize,

    window: MovingSum,
    baseline: f32,
    threshold: f32,
    current_energy: f32,

    state: State,
    marker_start_frame: u64,
    peak_energy: f32,
    duration_frames: u32,
    cooldown_frames: u32,

    markers_detected: u32,
    markers_rejected: u32,
    last_marker_frame: u64,
    frame_count: u64,
    warmup_complete: bool,
    enabled: bool,

    threshold_multiplier: f32,
    noise_adapt_rate: f32,
    min_duration_ms: f32,

    subcarrier_advisory: Option<f32>,

    log: Option<EventLog>,
}

impl MarkerDetector {
    /// Create for the given sampling rate and station
    pub fn new(sample_rate: f32, station: Station) -> Self {
        let fft = FftProcessor::new(MARKER_FFT_SIZE, sample_rate, WindowKind::Hann)
            .expect(PANIC_FFT_BLOCK);
        let frame_ms = fft.frame_duration_ms();
        let window_frames = (WINDOW_MS / frame_ms + 0.5) as usize;

        let baseline = 0.01f32;
        Self {
            fft,
            frame_ms,
            tick_freq_hz: station.tick_freq_hz(),
            i_buffer: vec![0.0; MARKER_FFT_SIZE],
            q_buffer: vec![0.0; MARKER_FFT_SIZE],
            buffer_idx: 0,
            window: MovingSum::new(window_frames),
            baseline,
            threshold: baseline * THRESHOLD_MULT,
            current_energy: 0.0,
            state: State::Idle,
            marker_start_frame: 0,
            peak_energy: 0.0,
            duration_frames: 0,
            cooldown_frames: 0,
            markers_detected: 0,
            markers_rejected: 0,
            last_marker_frame: 0,
            frame_count: 0,
            warmup_complete: false,
            enabled: true,
            threshold_multiplier: THRESHOLD_MULT,
            noise_adapt_rate: NOISE_ADAPT_RATE,
            min_duration_ms: MIN_DURATION_MS,
            subcarrier_advisory: None,
            log: None,
        }
    }

    /// Attach a log sink for this detector's records
    pub fn set_log(&mut self, sink: Box<dyn std::io::Write + Send>) {
        self.log = Some(EventLog::new("marker", LOG_HEADER, sink));
    }

    /// Process one sync-channel sample
    pub fn process(&mut self, i: f32, q: f32) -> Option<MarkerEvent> {
        if !self.enabled {
            return None;
        }

        self.i_buffer[self.buffer_idx] = i;
        self.q_buffer[self.buffer_idx] = q;
        self.buffer_idx += 1;
        if self.buffer_idx < MARKER_FFT_SIZE {
            return None;
        }
        self.buffer_idx = 0;

        self.fft
            .process(&self.i_buffer, &self.q_buffer)
            .expect(PANIC_FFT_BLOCK);
        self.current_energy = self
            .fft
            .bucket_energy(self.tick_freq_hz, MARKER_BANDWIDTH_HZ);

        let out = self.step_state_machine();
        self.frame_count += 1;
        out
    }

    fn step_state_machine(&mut self) -> Option<MarkerEvent> {
        let frame = self.frame_count;
        let accumulated = self.window.push(self.current_energy);

        if !self.warmup_complete {
            self.baseline += WARMUP_ADAPT_RATE * (accumulated - self.baseline);
            self.threshold = self.baseline * self.threshold_multiplier;
            if frame + 1 >= WARMUP_FRAMES {
                self.warmup_complete = true;
                debug!(
                    "marker: warmup complete: baseline {:.3}, threshold {:.3}",
                    self.baseline, self.threshold
                );
            }
            return None;
        }

        // baseline still stabilizing: track, but emit nothing yet
        let timestamp_ms = frame as f32 * self.frame_ms;
        if timestamp_ms < MIN_STARTUP_MS {
            self.baseline += self.noise_adapt_rate * (accumulated - self.baseline);
            self.threshold = self.baseline * self.threshold_multiplier;
            return None;
        }

        if self.state == State::Idle {
            self.baseline += self.noise_adapt_rate * (accumulated - self.baseline);
            self.baseline = self.baseline.max(BASELINE_MIN);
            self.threshold = self.baseline * self.threshold_multiplier;
        }

        match self.state {
            State::Idle => {
                if accumulated > self.threshold {
                    self.state = State::InMarker;
                    self.marker_start_frame = frame;
                    self.peak_energy = accumulated;
                    self.duration_frames = 1;
                }
                None
            }

            State::InMarker => {
                self.duration_frames += 1;
                if accumulated > self.peak_energy {
                    self.peak_energy = accumulated;
                }

                let duration_ms = self.duration_frames as f32 * self.frame_ms;
                let timed_out = duration_ms > MAX_DURATION_MS;

                if accumulated < self.threshold || timed_out {
                    let out = if duration_ms >= self.min_duration_ms && !timed_out {
                        Some(self.emit_marker(duration_ms, timestamp_ms, accumulated))
                    } else {
                        self.markers_rejected += 1;
                        if timed_out {
                            debug!("marker: timed out after {:.0} ms", duration_ms);
                        }
                        None
                    };
                    self.state = State::Cooldown;
                    self.cooldown_frames = (COOLDOWN_MS / self.frame_ms + 0.5) as u32;
                    out
                } else {
                    None
                }
            }

            State::Cooldown => {
                self.cooldown_frames = self.cooldown_frames.saturating_sub(1);
                if self.cooldown_frames == 0 {
                    self.state = State::Idle;
                }
                None
            }
        }
    }

    fn emit_marker(&mut self, duration_ms: f32, timestamp_ms: f32, accumulated: f32) -> MarkerEvent {
        self.markers_detected += 1;

        let since_last_sec = if self.last_marker_frame > 0 {
            (self.marker_start_frame - self.last_marker_frame) as f32 * self.frame_ms / 1000.0
        } else {
            0.0
        };
        self.last_marker_frame = self.marker_start_frame;

        info!(
            "marker: #{} duration {:.0} ms, {:.1} s since last, accumulated {:.2}",
            self.markers_detected, duration_ms, since_last_sec, accumulated
        );

        if let Some(log) = self.log.as_mut() {
            log.record(
                timestamp_ms,
                format_args!(
                    "M{},{:.6},{:.1},{:.1},{:.6},{:.6}",
                    self.markers_detected,
                    self.peak_energy,
                    duration_ms,
                    since_last_sec,
                    self.baseline,
                    self.threshold
                ),
            );
        }

        MarkerEvent {
            marker_number: self.markers_detected,
            timestamp_ms,
            duration_ms,
            peak_energy: self.peak_energy,
            baseline: self.baseline,
            since_last_sec,
        }
    }

    /// Record the tone tracker's advisory subcarrier noise floor
    ///
    /// The value is informational: this detector tracks its own baseline
    /// and tolerates arbitrarily stale advisories.
    pub fn note_subcarrier_noise(&mut self, floor: f32) {
        self.subcarrier_advisory = Some(floor);
    }

    /// Last advisory subcarrier noise floor, if one arrived
    pub fn subcarrier_advisory(&self) -> Option<f32> {
        self.subcarrier_advisory
    }

    /// Threshold over baseline; range `[2, 5]`
    pub fn set_threshold_multiplier(&mut self, value: f32) -> Result<(), TunableError> {
        self.threshold_multiplier = check_range("marker threshold_multiplier", value, 2.0, 5.0)?;
        self.threshold = self.baseline * self.threshold_multiplier;
        Ok(())
    }

    /// Baseline adaptation rate; range `[1e-4, 1e-2]`
    pub fn set_noise_adapt_rate(&mut self, value: f32) -> Result<(), TunableError> {
        self.noise_adapt_rate = check_range("marker noise_adapt_rate", value, 1.0e-4, 1.0e-2)?;
        Ok(())
    }

    /// Minimum accepted marker duration (ms); range `[300, 700]`
    pub fn set_min_duration_ms(&mut self, value: f32) -> Result<(), TunableError> {
        self.min_duration_ms = check_range("marker min_duration_ms", value, 300.0, 700.0)?;
        Ok(())
    }

    /// Enable or disable detection
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Current accumulated window energy
    pub fn accumulated_energy(&self) -> f32 {
        self.window.sum()
    }

    /// Current baseline
    pub fn baseline(&self) -> f32 {
        self.baseline
    }

    /// Current detection threshold
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Accepted marker count
    pub fn marker_count(&self) -> u32 {
        self.markers_detected
    }

    /// Rejected marker count
    pub fn rejected_count(&self) -> u32 {
        self.markers_rejected
    }

    /// True once warmup has elapsed
    pub fn warmup_complete(&self) -> bool {
        self.warmup_complete
    }

    /// FFT frame duration (ms)
    pub fn frame_duration_ms(&self) -> f32 {
        self.frame_ms
    }

    /// Summarize counters through the log facade
    pub fn log_stats(&self) {
        let elapsed = self.frame_count as f32 * self.frame_ms / 1000.0;
        info!(
            "marker stats: {:.1} s elapsed, {} markers ({} rejected), baseline {:.4}",
            elapsed, self.markers_detected, self.markers_rejected, self.baseline
        );
    }
}
