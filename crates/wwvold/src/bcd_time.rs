//! # BCD time-domain detection
//!
//! Short-frame FFT on the data channel, tuned for edge timing rather than
//! sensitivity: ~5 ms frames resolve the leading and trailing edges of
//! 100 Hz subcarrier pulses to a few milliseconds. The FSM mirrors the
//! tick detector's energy pipeline with wider pulse bounds and a debounce
//! of three consecutive sub-threshold frames before a pulse is closed,
//! since the 100 Hz envelope ripples near threshold.
//!
//! Works in parallel with the frequency-domain detector; the symbol
//! windower fuses both.

#[cfg(not(test))]
use log::debug;

#[cfg(test)]
use std::println as debug;

use crate::events::{BcdPulseEvent, PulseSource};
use crate::fft::{FftProcessor, WindowKind};
use crate::logsink::EventLog;
use crate::station::BCD_SUBCARRIER_HZ;

const BCD_TIME_FFT_SIZE: usize = 256;
const BCD_TIME_BANDWIDTH_HZ: f32 = 50.0;

const THRESHOLD_MULT: f32 = 2.0;
const HYSTERESIS_RATIO: f32 = 0.7;
const NOISE_ADAPT_DOWN: f32 = 0.002;
const NOISE_ADAPT_UP: f32 = 0.0002;
const NOISE_FLOOR_MIN: f32 = 1.0e-4;
const NOISE_FLOOR_MAX: f32 = 5.0;

const PULSE_MIN_MS: f32 = 100.0;
const PULSE_MAX_MS: f32 = 900.0;
const COOLDOWN_MS: f32 = 200.0;

/// Consecutive sub-threshold frames required to close a pulse
const MIN_LOW_FRAMES: u32 = 3;

const WARMUP_FRAMES: u64 = 50;
const WARMUP_ADAPT_RATE: f32 = 0.05;

const PANIC_FFT_BLOCK: &str = "bcd-time FFT block length invariant broken";

/// Fixed field order of the bcd-time log stream
const LOG_HEADER: &str = "pulse_num,peak_energy,duration_ms,noise_floor,snr_db";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    InPulse,
    Cooldown,
}

/// Edge-precise 100 Hz pulse detector
#[derive(Debug)]
pub struct BcdTimeDetector {
    fft: FftProcessor,
    frame_ms: f32,

    i_buffer: Vec<f32>,
    q_buffer: Vec<f32>,
    buffer_idx: usize,

    state: State,
    noise_floor: f32,
    threshold_high: f32,
    threshold_low: f32,
    current_energy: f32,

    pulse_start_frame: u64,
    peak_energy: f32,
    duration_frames: u32,
    cooldown_frames: u32,
    consecutive_low_frames: u32,

    pulses_detected: u32,
    pulses_rejected: u32,
    frame_count: u64,
    warmup_complete: bool,
    enabled: bool,

    log: Option<EventLog>,
}

impl BcdTimeDetector {
    /// Create for the given sampling rate
    pub fn new(sample_rate: f32) -> Self {
        let fft = FftProcessor::new(BCD_TIME_FFT_SIZE, sample_rate, WindowKind::Hann)
            .expect(PANIC_FFT_BLOCK);
        let frame_ms = fft.frame_duration_ms();

        let noise_floor = 1.0e-4f32;
        let threshold_high = noise_floor * THRESHOLD_MULT;

        Self {
            fft,
            frame_ms,
            i_buffer: vec![0.0; BCD_TIME_FFT_SIZE],
            q_buffer: vec![0.0; BCD_TIME_FFT_SIZE],
            buffer_idx: 0,
            state: State::Idle,
            noise_floor,
            threshold_high,
            threshold_low: threshold_high * HYSTERESIS_RATIO,
            current_energy: 0.0,
            pulse_start_frame: 0,
            peak_energy: 0.0,
            duration_frames: 0,
            cooldown_frames: 0,
            consecutive_low_frames: 0,
            pulses_detected: 0,
            pulses_rejected: 0,
            frame_count: 0,
            warmup_complete: false,
            enabled: true,
            log: None,
        }
    }

    /// Attach a log sink for this detector's records
    pub fn set_log(&mut self, sink: Box<dyn std::io::Write + Send>) {
        self.log = Some(EventLog::new("bcd-time", LOG_HEADER, sink));
    }

    /// Process one data-channel sample
    pub fn process(&mut self, i: f32, q: f32) -> Option<BcdPulseEvent> {
        if !self.enabled {
            return None;
        }

        self.i_buffer[self.buffer_idx] = i;
        self.q_buffer[self.buffer_idx] = q;
        self.buffer_idx += 1;
        if self.buffer_idx < BCD_TIME_FFT_SIZE {
            return None;
        }
        self.buffer_idx = 0;

        self.fft
            .process(&self.i_buffer, &self.q_buffer)
            .expect(PANIC_FFT_BLOCK);
        self.current_energy = self
            .fft
            .bucket_energy(BCD_SUBCARRIER_HZ, BCD_TIME_BANDWIDTH_HZ);

        let out = self.step_state_machine();
        self.frame_count += 1;
        out
    }

    fn update_thresholds(&mut self) {
        self.threshold_high = self.noise_floor * THRESHOLD_MULT;
        self.threshold_low = self.threshold_high * HYSTERESIS_RATIO;
    }

    fn step_state_machine(&mut self) -> Option<BcdPulseEvent> {
        let energy = self.current_energy;
        let frame = self.frame_count;

        if !self.warmup_complete {
            self.noise_floor += WARMUP_ADAPT_RATE * (energy - self.noise_floor);
            self.noise_floor = self.noise_floor.max(NOISE_FLOOR_MIN);
            self.update_thresholds();
            if frame + 1 >= WARMUP_FRAMES {
                self.warmup_complete = true;
                debug!(
                    "bcd-time: warmup complete: noise {:.6}, threshold {:.6}",
                    self.noise_floor, self.threshold_high
                );
            }
            return None;
        }

        if self.state == State::Idle && energy < self.threshold_high {
            if energy < self.noise_floor {
                self.noise_floor += NOISE_ADAPT_DOWN * (energy - self.noise_floor);
            } else {
                self.noise_floor += NOISE_ADAPT_UP * (energy - self.noise_floor);
            }
            self.noise_floor = self.noise_floor.clamp(NOISE_FLOOR_MIN, NOISE_FLOOR_MAX);
            self.update_thresholds();
        }

        match self.state {
            State::Idle => {
                if energy > self.threshold_high {
                    self.state = State::InPulse;
                    self.pulse_start_frame = frame;
                    self.peak_energy = energy;
                    self.duration_frames = 1;
                    self.consecutive_low_frames = 0;
                }
                None
            }

            State::InPulse => {
                self.duration_frames += 1;
                if energy > self.peak_energy {
                    self.peak_energy = energy;
                }

                if energy < self.threshold_low {
                    self.consecutive_low_frames += 1;
                } else {
                    self.consecutive_low_frames = 0;
                }

                if self.consecutive_low_frames >= MIN_LOW_FRAMES {
                    let out = self.close_pulse();
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

    fn close_pulse(&mut self) -> Option<BcdPulseEvent> {
        let duration_ms = self.duration_frames as f32 * self.frame_ms;
        let start_ms = self.pulse_start_frame as f32 * self.frame_ms;

        if !(PULSE_MIN_MS..=PULSE_MAX_MS).contains(&duration_ms) {
            self.pulses_rejected += 1;
            if duration_ms > PULSE_MAX_MS {
                debug!("bcd-time: rejected {:.0} ms pulse", duration_ms);
            }
            return None;
        }

        self.pulses_detected += 1;
        let snr_db = 10.0 * (self.peak_energy / self.noise_floor).log10();

        debug!(
            "bcd-time: pulse #{} at {:.1} ms, duration {:.0} ms, {:.1} dB",
            self.pulses_detected, start_ms, duration_ms, snr_db
        );

        if let Some(log) = self.log.as_mut() {
            log.record(
                start_ms,
                format_args!(
                    "{},{:.6},{:.0},{:.6},{:.1}",
                    self.pulses_detected, self.peak_energy, duration_ms, self.noise_floor, snr_db
                ),
            );
        }

        Some(BcdPulseEvent {
            source: PulseSource::Time,
            start_ms,
            duration_ms,
            peak_energy: self.peak_energy,
            baseline: self.noise_floor,
            snr_db,
        })
    }

    /// Enable or disable detection
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Current noise floor
    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }

    /// Current entry threshold
    pub fn threshold(&self) -> f32 {
        self.threshold_high
    }

    /// Accepted pulse count
    pub fn pulse_count(&self) -> u32 {
        self.pulses_detected
    }

    /// Rejected pulse count
    pub fn rejected_count(&self) -> u32 {
        self.pulses_rejected
    }

    /// True once warmup has elapsed
    pub fn warmup_complete(&self) -> bool {
        self.warmup_complete
    }

    /// FFT frame duration (ms)
    pub fn frame_duration_ms(&self) -> f32 {
        self.frame_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use num_complex::Complex;

    use crate::station;

    const RATE: f32 = 50_000.0;

    fn feed(det: &mut BcdTimeDetector, samples: &[Complex<f32>]) -> Vec<BcdPulseEvent> {
        samples
            .iter()
            .filter_map(|sa| det.process(sa.re, sa.im))
            .collect()
    }

    fn warmed_detector() -> BcdTimeDetector {
        let mut det = BcdTimeDetector::new(RATE);
        let out = feed(&mut det, &station::silence(60 * BCD_TIME_FFT_SIZE));
        assert!(out.is_empty());
        assert!(det.warmup_complete());
        det
    }

    #[test]
    fn test_zero_pulse() {
        let mut det = warmed_detector();
        let pulse = station::single_pulse(100.0, 1.0, RATE, 100.0, 200.0, 500.0);
        let out = feed(&mut det, &pulse);

        assert_eq!(out.len(), 1, "events: {:?}", out);
        let evt = out[0];
        assert_eq!(evt.source, PulseSource::Time);
        assert!(
            (150.0..=300.0).contains(&evt.duration_ms),
            "duration {}",
            evt.duration_ms
        );
        // leading edge lands near the true pulse start
        assert!((evt.start_ms - 407.0).abs() < 30.0, "start {}", evt.start_ms);
        assert!(evt.snr_db > 10.0);
    }

    #[test]
    fn test_short_noise_blip_rejected() {
        let mut det = warmed_detector();
        let blip = station::single_pulse(100.0, 1.0, RATE, 100.0, 40.0, 500.0);
        let out = feed(&mut det, &blip);

        assert!(out.is_empty());
        assert_eq!(det.rejected_count(), 1);
    }

    #[test]
    fn test_overlong_pulse_rejected() {
        let mut det = warmed_detector();
        let long = station::single_pulse(100.0, 1.0, RATE, 100.0, 1200.0, 500.0);
        let out = feed(&mut det, &long);

        assert!(out.is_empty());
        assert_eq!(det.rejected_count(), 1);
    }

    #[test]
    fn test_debounce_bridges_ripple() {
        // two bursts separated by a single silent frame read as one pulse
        let mut det = warmed_detector();

        let mut signal = station::single_pulse(100.0, 1.0, RATE, 100.0, 150.0, 0.0);
        signal.extend(station::silence(BCD_TIME_FFT_SIZE));
        signal.extend(station::single_pulse(100.0, 1.0, RATE, 0.0, 150.0, 500.0));

        let out = feed(&mut det, &signal);
        assert_eq!(out.len(), 1, "events: {:?}", out);
        assert!(out[0].duration_ms > 250.0, "duration {}", out[0].duration_ms);
    }
}
