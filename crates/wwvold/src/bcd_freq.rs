//! # BCD frequency-domain detection
//!
//! The companion to the time-domain detector: a 2048-point FFT on the
//! data channel puts narrow (~24 Hz) bins around the 100 Hz subcarrier,
//! trading edge precision for confidence that the energy really is the
//! subcarrier and not wideband noise. Frame energies accumulate through
//! the same ~1 s sliding window the minute-marker detector uses, against
//! a self-tracked baseline.
//!
//! A pulse that refuses to end within two seconds means the baseline has
//! fallen out from under the signal; the FSM then adopts the current
//! accumulator as the new baseline and counts the episode as a rejection.

#[cfg(not(test))]
use log::debug;

#[cfg(test)]
use std::println as debug;

use crate::events::{BcdPulseEvent, PulseSource};
use crate::fft::{FftProcessor, WindowKind};
use crate::filter::MovingSum;
use crate::logsink::EventLog;
use crate::station::BCD_SUBCARRIER_HZ;

const BCD_FREQ_FFT_SIZE: usize = 2048;
const BCD_FREQ_BANDWIDTH_HZ: f32 = 25.0;
const WINDOW_MS: f32 = 1000.0;

const THRESHOLD_MULT: f32 = 2.5;
const NOISE_ADAPT_RATE: f32 = 0.001;
const BASELINE_MIN: f32 = 1.0e-4;

const PULSE_MIN_MS: f32 = 100.0;
const MAX_DURATION_MS: f32 = 2_000.0;
const COOLDOWN_MS: f32 = 500.0;

/// Consecutive sub-threshold frames required to close a pulse
const MIN_LOW_FRAMES: u32 = 3;

const WARMUP_FRAMES: u64 = 50;
const WARMUP_ADAPT_RATE: f32 = 0.02;
const MIN_STARTUP_MS: f32 = 5_000.0;

const PANIC_FFT_BLOCK: &str = "bcd-freq FFT block length invariant broken";

/// Fixed field order of the bcd-freq log stream
const LOG_HEADER: &str = "pulse_num,peak_energy,duration_ms,baseline,snr_db";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    InPulse,
    Cooldown,
}

/// Confident 100 Hz presence detector
#[derive(Debug)]
pub struct BcdFreqDetector {
    fft: FftProcessor,
    frame_ms: f32,

    i_buffer: Vec<f32>,
    q_buffer: Vec<f32>,
    buffer_idx: usize,

    window: MovingSum,
    baseline: f32,
    threshold: f32,
    current_energy: f32,

    state: State,
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

impl BcdFreqDetector {
    /// Create for the given sampling rate
    pub fn new(sample_rate: f32) -> Self {
        let fft = FftProcessor::new(BCD_FREQ_FFT_SIZE, sample_rate, WindowKind::Hann)
            .expect(PANIC_FFT_BLOCK);
        let frame_ms = fft.frame_duration_ms();
        let window_frames = ((WINDOW_MS / frame_ms) as usize).max(1);

        let baseline = 0.01f32;
        Self {
            fft,
            frame_ms,
            i_buffer: vec![0.0; BCD_FREQ_FFT_SIZE],
            q_buffer: vec![0.0; BCD_FREQ_FFT_SIZE],
            buffer_idx: 0,
            window: MovingSum::new(window_frames),
            baseline,
            threshold: baseline * THRESHOLD_MULT,
            current_energy: 0.0,
            state: State::Idle,
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
        self.log = Some(EventLog::new("bcd-freq", LOG_HEADER, sink));
    }

    /// Process one data-channel sample
    pub fn process(&mut self, i: f32, q: f32) -> Option<BcdPulseEvent> {
        if !self.enabled {
            return None;
        }

        self.i_buffer[self.buffer_idx] = i;
        self.q_buffer[self.buffer_idx] = q;
        self.buffer_idx += 1;
        if self.buffer_idx < BCD_FREQ_FFT_SIZE {
            return None;
        }
        self.buffer_idx = 0;

        self.fft
            .process(&self.i_buffer, &self.q_buffer)
            .expect(PANIC_FFT_BLOCK);
        self.current_energy = self
            .fft
            .bucket_energy(BCD_SUBCARRIER_HZ, BCD_FREQ_BANDWIDTH_HZ);

        let out = self.step_state_machine();
        self.frame_count += 1;
        out
    }

    fn step_state_machine(&mut self) -> Option<BcdPulseEvent> {
        let frame = self.frame_count;
        let accumulated = self.window.push(self.current_energy);

        if !self.warmup_complete {
            self.baseline += WARMUP_ADAPT_RATE * (accumulated - self.baseline);
            self.threshold = self.baseline * THRESHOLD_MULT;
            if frame + 1 >= WARMUP_FRAMES {
                self.warmup_complete = true;
                debug!(
                    "bcd-freq: warmup complete: baseline {:.4}, threshold {:.4}",
                    self.baseline, self.threshold
                );
            }
            return None;
        }

        let timestamp_ms = frame as f32 * self.frame_ms;
        if timestamp_ms < MIN_STARTUP_MS {
            self.baseline += NOISE_ADAPT_RATE * (accumulated - self.baseline);
            self.threshold = self.baseline * THRESHOLD_MULT;
            return None;
        }

        if self.state == State::Idle {
            self.baseline += NOISE_ADAPT_RATE * (accumulated - self.baseline);
            self.baseline = self.baseline.max(BASELINE_MIN);
            self.threshold = self.baseline * THRESHOLD_MULT;
        }

        match self.state {
            State::Idle => {
                if accumulated > self.threshold {
                    self.state = State::InPulse;
                    self.pulse_start_frame = frame;
                    self.peak_energy = accumulated;
                    self.duration_frames = 1;
                    self.consecutive_low_frames = 0;
                }
                None
            }

            State::InPulse => {
                self.duration_frames += 1;
                if accumulated > self.peak_energy {
                    self.peak_energy = accumulated;
                }

                let duration_ms = self.duration_frames as f32 * self.frame_ms;
                let timed_out = duration_ms > MAX_DURATION_MS;

                if accumulated < self.threshold {
                    self.consecutive_low_frames += 1;
                } else {
                    self.consecutive_low_frames = 0;
                }

                if self.consecutive_low_frames >= MIN_LOW_FRAMES || timed_out {
                    let out = if timed_out {
                        // baseline has drifted under the signal; adopt
                        // the accumulator and start over
                        debug!(
                            "bcd-freq: timeout after {:.0} ms, baseline reset",
                            duration_ms
                        );
                        self.baseline = accumulated;
                        self.threshold = self.baseline * THRESHOLD_MULT;
                        self.pulses_rejected += 1;
                        None
                    } else {
                        self.close_pulse(duration_ms)
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

    fn close_pulse(&mut self, duration_ms: f32) -> Option<BcdPulseEvent> {
        let start_ms = self.pulse_start_frame as f32 * self.frame_ms;

        if duration_ms < PULSE_MIN_MS {
            self.pulses_rejected += 1;
            return None;
        }

        self.pulses_detected += 1;
        let snr_db = 10.0 * (self.peak_energy / self.baseline).log10();

        debug!(
            "bcd-freq: pulse #{} at {:.1} ms, duration {:.0} ms, {:.1} dB",
            self.pulses_detected, start_ms, duration_ms, snr_db
        );

        if let Some(log) = self.log.as_mut() {
            log.record(
                start_ms,
                format_args!(
                    "{},{:.6},{:.0},{:.6},{:.1}",
                    self.pulses_detected, self.peak_energy, duration_ms, self.baseline, snr_db
                ),
            );
        }

        Some(BcdPulseEvent {
            source: PulseSource::Freq,
            start_ms,
            duration_ms,
            peak_energy: self.peak_energy,
            baseline: self.baseline,
            snr_db,
        })
    }

    /// Enable or disable detection
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Current baseline
    pub fn baseline(&self) -> f32 {
        self.baseline
    }

    /// Current accumulated window energy
    pub fn accumulated_energy(&self) -> f32 {
        self.window.sum()
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

    fn feed(det: &mut BcdFreqDetector, samples: &[Complex<f32>]) -> Vec<BcdPulseEvent> {
        samples
            .iter()
            .filter_map(|sa| det.process(sa.re, sa.im))
            .collect()
    }

    fn settled_detector() -> BcdFreqDetector {
        let mut det = BcdFreqDetector::new(RATE);
        // warmup plus the 5 s startup stabilization
        let out = feed(&mut det, &station::silence((5.5 * RATE) as usize));
        assert!(out.is_empty());
        assert!(det.warmup_complete());
        det
    }

    #[test]
    fn test_subcarrier_pulse_detected() {
        let mut det = settled_detector();

        let pulse = station::single_pulse(100.0, 1.0, RATE, 200.0, 500.0, 2500.0);
        let out = feed(&mut det, &pulse);

        assert_eq!(out.len(), 1, "events: {:?}", out);
        let evt = out[0];
        assert_eq!(evt.source, PulseSource::Freq);
        assert!(
            (100.0..=2000.0).contains(&evt.duration_ms),
            "duration {}",
            evt.duration_ms
        );
        assert!(evt.snr_db > 10.0);
        assert_eq!(det.pulse_count(), 1);
    }

    #[test]
    fn test_sustained_tone_times_out_and_resets_baseline() {
        let mut det = settled_detector();
        let baseline_before = det.baseline();

        // a tone that never drops: the FSM must bail at the timeout and
        // adopt the elevated accumulator as the new baseline
        let sustained = station::tone(100.0, 1.0, RATE, (3.0 * RATE) as usize);
        let out = feed(&mut det, &sustained);

        assert!(out.is_empty(), "timeout leaked {:?}", out);
        assert_eq!(det.rejected_count(), 1);
        assert!(
            det.baseline() > baseline_before * 10.0,
            "baseline {} -> {}",
            baseline_before,
            det.baseline()
        );
    }

    #[test]
    fn test_window_sizing() {
        let det = BcdFreqDetector::new(RATE);
        // 2048-point frames at 50 kHz: 40.96 ms, ~24 per second
        assert_eq!(det.window.len(), 24);
    }
}
