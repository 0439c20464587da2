//! # Tick pulse detection
//!
//! The hot path of the engine: every sync-channel sample at the full
//! detector rate runs through two parallel pipelines.
//!
//! * **Correlation** — a circular I/Q buffer feeds a 5 ms Hann-windowed
//!   complex matched filter at the tick frequency, computed every 8th
//!   sample. A slowly adapting correlation noise floor turns the peak into
//!   a ratio that separates true tone bursts from broadband static.
//! * **Energy** — samples are blocked into 256-point FFT frames and the
//!   bucket energy at the tick frequency drives a three-state FSM
//!   (IDLE → IN_TICK → COOLDOWN) under an adaptive threshold.
//!
//! Completed pulses are classified by duration: a few milliseconds with a
//! confirming correlation peak is a second tick; 600–1500 ms at a sane
//! minute spacing is the minute marker; anything in the gap between is
//! rejected and counted.
//!
//! Once a second-boundary epoch is installed, a timing gate admits
//! IDLE→IN_TICK transitions only in the first 100 ms of each second,
//! exploiting the broadcast's protected zone to ignore BCD harmonics. If
//! the gate starves for five seconds it steps aside until a tick is
//! reacquired.

use num_complex::Complex;

use arraydeque::{ArrayDeque, Wrapping};

#[cfg(not(test))]
use log::{debug, info};

#[cfg(test)]
use std::{println as debug, println as info};

use crate::builder::{check_range, TunableError};
use crate::comb::{CombFilter, COMB_DEFAULT_ALPHA};
use crate::events::{EpochSource, TickEvent, TickMarkerEvent};
use crate::fft::{FftProcessor, WindowKind};
use crate::filter::FilterCoeff;
use crate::logsink::EventLog;
use crate::station::Station;

/// FFT frame length; ~5.1 ms at 50 kHz, matched to the 5 ms tick
pub(crate) const TICK_FFT_SIZE: usize = 256;

const TICK_BANDWIDTH_HZ: f32 = 100.0;
const TEMPLATE_MS: f32 = 5.0;

/// Compute the matched-filter correlation every this many samples
const CORR_DECIMATION: u64 = 8;
const CORR_NOISE_ADAPT: f32 = 0.01;
const CORR_THRESHOLD_MULT: f32 = 5.0;
const CORR_FLOOR_EPSILON: f32 = 0.001;

const WARMUP_FRAMES: u64 = 50;
const WARMUP_ADAPT_RATE: f32 = 0.05;

const NOISE_ADAPT_DOWN: f32 = 0.002;
const NOISE_ADAPT_UP: f32 = 0.0002;
const NOISE_FLOOR_MIN: f32 = 1.0e-4;
const NOISE_FLOOR_MAX: f32 = 5.0;
const THRESHOLD_MULT: f32 = 2.0;
const HYSTERESIS_RATIO: f32 = 0.7;

const TICK_MIN_DURATION_MS: f32 = 2.0;
const TICK_MAX_DURATION_MS: f32 = 50.0;
const MARKER_MIN_DURATION_MS: f32 = 600.0;
const MARKER_MAX_DURATION_MS: f32 = 1500.0;
const MARKER_MIN_INTERVAL_MS: f32 = 55_000.0;
const COOLDOWN_MS: f32 = 500.0;

const GATE_START_MS: f32 = 0.0;
const GATE_END_MS: f32 = 100.0;
const GATE_RECOVERY_MS: f32 = 5_000.0;

const HISTORY_LEN: usize = 30;
const AVG_WINDOW_MS: f32 = 15_000.0;

const PANIC_FFT_BLOCK: &str = "tick FFT block length invariant broken";

/// Fixed field order of the tick log stream
const LOG_HEADER: &str =
    "label,peak_energy,duration_ms,interval_ms,avg_interval_ms,noise_floor,corr_peak,corr_ratio";

/// Detection FSM state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    InTick,
    Cooldown,
}

/// Epoch-relative admission gate
#[derive(Clone, Copy, Debug, Default)]
struct TimingGate {
    epoch_ms: f32,
    enabled: bool,
    recovery: bool,
    last_gated_tick_frame: u64,
}

/// A completed pulse classified by the tick detector
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TickOutput {
    /// A second tick
    Tick(TickEvent),

    /// A minute marker recognized by its duration
    Marker(TickMarkerEvent),
}

/// Second-tick and tick-channel-marker detector
///
/// Feed it sync-band I/Q one sample at a time; at most one [`TickOutput`]
/// is produced per FFT frame. The detector owns its buffers, template,
/// and FFT exclusively.
#[derive(Debug)]
pub struct TickDetector {
    fft: FftProcessor,
    frame_ms: f32,
    tick_freq_hz: f32,
    group_delay_ms: f32,

    i_buffer: Vec<f32>,
    q_buffer: Vec<f32>,
    buffer_idx: usize,
    comb: Option<(CombFilter, CombFilter)>,

    template: FilterCoeff<Complex<f32>>,
    corr_ring: Vec<Complex<f32>>,
    corr_idx: usize,
    corr_samples: u64,
    corr_noise_floor: f32,
    corr_peak: f32,

    state: State,
    noise_floor: f32,
    threshold_high: f32,
    threshold_low: f32,
    current_energy: f32,

    tick_start_frame: u64,
    peak_energy: f32,
    duration_frames: u32,
    cooldown_frames: u32,

    ticks_detected: u32,
    ticks_rejected: u32,
    markers_detected: u32,
    last_tick_frame: u64,
    last_marker_frame: u64,
    frame_count: u64,
    warmup_complete: bool,
    enabled: bool,

    history: ArrayDeque<[f32; HISTORY_LEN], Wrapping>,

    threshold_multiplier: f32,
    adapt_down: f32,
    adapt_up: f32,
    min_duration_ms: f32,

    gate: TimingGate,
    epoch_source: Option<EpochSource>,
    epoch_confidence: f32,

    log: Option<EventLog>,
}

impl TickDetector {
    /// Create for the given sampling rate and station
    pub fn new(sample_rate: f32, station: Station) -> Self {
        let fft = FftProcessor::new(TICK_FFT_SIZE, sample_rate, WindowKind::Hann)
            .expect(PANIC_FFT_BLOCK);
        let frame_ms = fft.frame_duration_ms();
        let tick_freq_hz = station.tick_freq_hz();

        let template_len = (TEMPLATE_MS * sample_rate / 1000.0) as usize;
        let template = make_template(tick_freq_hz, sample_rate, template_len);

        let noise_floor = 0.01f32;
        let threshold_high = noise_floor * THRESHOLD_MULT;

        Self {
            fft,
            frame_ms,
            tick_freq_hz,
            group_delay_ms: 3.0,
            i_buffer: vec![0.0; TICK_FFT_SIZE],
            q_buffer: vec![0.0; TICK_FFT_SIZE],
            buffer_idx: 0,
            comb: None,
            template,
            corr_ring: vec![Complex::new(0.0, 0.0); template_len * 2],
            corr_idx: 0,
            corr_samples: 0,
            corr_noise_floor: 0.0,
            corr_peak: 0.0,
            state: State::Idle,
            noise_floor,
            threshold_high,
            threshold_low: threshold_high * HYSTERESIS_RATIO,
            current_energy: 0.0,
            tick_start_frame: 0,
            peak_energy: 0.0,
            duration_frames: 0,
            cooldown_frames: 0,
            ticks_detected: 0,
            ticks_rejected: 0,
            markers_detected: 0,
            last_tick_frame: 0,
            last_marker_frame: 0,
            frame_count: 0,
            warmup_complete: false,
            enabled: true,
            history: ArrayDeque::new(),
            threshold_multiplier: THRESHOLD_MULT,
            adapt_down: NOISE_ADAPT_DOWN,
            adapt_up: NOISE_ADAPT_UP,
            min_duration_ms: TICK_MIN_DURATION_MS,
            gate: TimingGate::default(),
            epoch_source: None,
            epoch_confidence: 0.0,
            log: None,
        }
    }

    /// Attach a log sink for this detector's records
    pub fn set_log(&mut self, sink: Box<dyn std::io::Write + Send>) {
        self.log = Some(EventLog::new("tick", LOG_HEADER, sink));
    }

    /// Enable the comb enhancer on the energy pipeline
    ///
    /// The delay line is sized to one tick-tone period.
    pub fn set_comb_enabled(&mut self, enabled: bool, sample_rate: f32) {
        if enabled {
            let period = (sample_rate / self.tick_freq_hz).round().max(1.0) as usize;
            self.comb = Some((
                CombFilter::new(period, COMB_DEFAULT_ALPHA),
                CombFilter::new(period, COMB_DEFAULT_ALPHA),
            ));
        } else {
            self.comb = None;
        }
    }

    /// Group delay subtracted when deriving marker leading edges (ms)
    pub fn set_group_delay_ms(&mut self, delay_ms: f32) {
        self.group_delay_ms = delay_ms.clamp(0.0, 20.0);
    }

    /// Process one sync-channel sample
    pub fn process(&mut self, i: f32, q: f32) -> Option<TickOutput> {
        if !self.enabled {
            return None;
        }

        // correlation pipeline runs at the full sample rate
        let ring_len = self.corr_ring.len();
        self.corr_ring[self.corr_idx] = Complex::new(i, q);
        self.corr_idx = (self.corr_idx + 1) % ring_len;
        self.corr_samples += 1;

        if self.corr_samples >= self.template.len() as u64
            && self.corr_samples % CORR_DECIMATION == 0
        {
            let corr = self.correlate();
            self.track_corr_floor(corr);
            if self.state == State::InTick && corr > self.corr_peak {
                self.corr_peak = corr;
            }
        }

        // energy pipeline blocks samples into FFT frames
        let (ei, eq) = match self.comb.as_mut() {
            Some((ci, cq)) => (ci.process(i), cq.process(q)),
            None => (i, q),
        };
        self.i_buffer[self.buffer_idx] = ei;
        self.q_buffer[self.buffer_idx] = eq;
        self.buffer_idx += 1;

        if self.buffer_idx < TICK_FFT_SIZE {
            return None;
        }
        self.buffer_idx = 0;

        self.fft
            .process(&self.i_buffer, &self.q_buffer)
            .expect(PANIC_FFT_BLOCK);
        self.current_energy = self.fft.bucket_energy(self.tick_freq_hz, TICK_BANDWIDTH_HZ);

        let out = self.step_state_machine();
        self.frame_count += 1;
        out
    }

    /// Matched-filter magnitude over the newest template-length window
    fn correlate(&self) -> f32 {
        let len = self.template.len();
        let ring_len = self.corr_ring.len();
        let end = self.corr_idx;
        let start = (end + ring_len - len) % ring_len;

        let sum: Complex<f32> = if start < end {
            self.template.filter(&self.corr_ring[start..end])
        } else {
            self.template
                .filter_parts(&self.corr_ring[start..], &self.corr_ring[..end])
        };
        sum.norm()
    }

    // Correlation noise floor: adapt downward freely, upward only while
    // idle and ten times slower, so the floor learns static but not ticks
    fn track_corr_floor(&mut self, corr: f32) {
        if corr < self.corr_noise_floor || self.corr_noise_floor < CORR_FLOOR_EPSILON {
            self.corr_noise_floor += CORR_NOISE_ADAPT * (corr - self.corr_noise_floor);
        } else if self.state == State::Idle {
            self.corr_noise_floor += CORR_NOISE_ADAPT * 0.1 * (corr - self.corr_noise_floor);
        }
    }

    fn update_thresholds(&mut self) {
        self.threshold_high = self.noise_floor * self.threshold_multiplier;
        self.threshold_low = self.threshold_high * HYSTERESIS_RATIO;
    }

    fn gate_open(&self, current_ms: f32) -> bool {
        if !self.gate.enabled || self.gate.recovery {
            return true;
        }
        let mut into = (current_ms - self.gate.epoch_ms) % 1000.0;
        if into < 0.0 {
            into += 1000.0;
        }
        (GATE_START_MS..=GATE_END_MS).contains(&into)
    }

    fn step_state_machine(&mut self) -> Option<TickOutput> {
        let energy = self.current_energy;
        let frame = self.frame_count;

        if !self.warmup_complete {
            self.noise_floor += WARMUP_ADAPT_RATE * (energy - self.noise_floor);
            self.noise_floor = self.noise_floor.max(NOISE_FLOOR_MIN);
            self.update_thresholds();

            if frame + 1 >= WARMUP_FRAMES {
                self.warmup_complete = true;
                debug!(
                    "tick: warmup complete: noise {:.4}, threshold {:.4}",
                    self.noise_floor, self.threshold_high
                );
            }
            return None;
        }

        // starved gate steps aside until a tick is reacquired
        if self.gate.enabled && !self.gate.recovery && self.state == State::Idle {
            let since_ms = frame.saturating_sub(self.gate.last_gated_tick_frame) as f32
                * self.frame_ms;
            if since_ms >= GATE_RECOVERY_MS {
                self.gate.recovery = true;
                debug!("tick: gate recovery mode after {:.1} s without tick", since_ms / 1000.0);
            }
        }

        // asymmetric noise floor: fast decay, very slow rise
        if self.state == State::Idle && energy < self.threshold_high {
            if energy < self.noise_floor {
                self.noise_floor += self.adapt_down * (energy - self.noise_floor);
            } else {
                self.noise_floor += self.adapt_up * (energy - self.noise_floor);
            }
            self.noise_floor = self.noise_floor.clamp(NOISE_FLOOR_MIN, NOISE_FLOOR_MAX);
            self.update_thresholds();
        }

        match self.state {
            State::Idle => {
                if energy > self.threshold_high {
                    let current_ms = frame as f32 * self.frame_ms;
                    if !self.gate_open(current_ms) {
                        // gate closed: BCD harmonic or off-schedule burst
                        return None;
                    }
                    self.state = State::InTick;
                    self.tick_start_frame = frame;
                    self.peak_energy = energy;
                    self.duration_frames = 1;
                    self.corr_peak = 0.0;
                }
                None
            }

            State::InTick => {
                self.duration_frames += 1;
                if energy > self.peak_energy {
                    self.peak_energy = energy;
                }

                if energy < self.threshold_low {
                    let out = self.classify_pulse();
                    self.state = State::Cooldown;
                    self.cooldown_frames = self.ms_to_frames(COOLDOWN_MS);
                    out
                } else if self.duration_frames as f32 * self.frame_ms > MARKER_MAX_DURATION_MS {
                    // pulse far too long; bail out
                    self.ticks_rejected += 1;
                    debug!(
                        "tick: rejected pulse exceeding {:.0} ms",
                        MARKER_MAX_DURATION_MS
                    );
                    self.state = State::Cooldown;
                    self.cooldown_frames = self.ms_to_frames(COOLDOWN_MS);
                    None
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

    // Classify a completed pulse by duration: marker first, then tick,
    // otherwise reject
    fn classify_pulse(&mut self) -> Option<TickOutput> {
        let frame = self.frame_count;
        let duration_ms = self.duration_frames as f32 * self.frame_ms;
        let timestamp_ms = frame as f32 * self.frame_ms;
        let interval_ms = if self.last_tick_frame > 0 {
            (self.tick_start_frame - self.last_tick_frame) as f32 * self.frame_ms
        } else {
            0.0
        };
        let corr_ratio = if self.corr_noise_floor > CORR_FLOOR_EPSILON {
            self.corr_peak / self.corr_noise_floor
        } else {
            0.0
        };
        let valid_correlation = self.corr_peak > self.corr_noise_floor * CORR_THRESHOLD_MULT;

        let is_marker_duration =
            (MARKER_MIN_DURATION_MS..=MARKER_MAX_DURATION_MS).contains(&duration_ms);

        // the first marker is always allowed; later ones must be a near
        // minute apart, which rides out fades that swallow a marker
        let since_last_marker_ms = if self.last_marker_frame > 0 {
            (self.tick_start_frame - self.last_marker_frame) as f32 * self.frame_ms
        } else {
            MARKER_MIN_INTERVAL_MS + 1000.0
        };
        let valid_marker_interval = since_last_marker_ms >= MARKER_MIN_INTERVAL_MS;

        if is_marker_duration && valid_marker_interval {
            self.markers_detected += 1;
            self.last_marker_frame = self.tick_start_frame;

            let leading_edge_ms = timestamp_ms - duration_ms - self.group_delay_ms;
            info!(
                "tick: minute marker #{} duration {:.0} ms, leading edge {:.1} ms",
                self.markers_detected, duration_ms, leading_edge_ms
            );

            if let Some(log) = self.log.as_mut() {
                log.record(
                    timestamp_ms,
                    format_args!(
                        "M{},{:.6},{:.1},{:.0},{:.0},{:.6},{:.2},{:.1}",
                        self.markers_detected,
                        self.peak_energy,
                        duration_ms,
                        since_last_marker_ms,
                        0.0,
                        self.noise_floor,
                        self.corr_peak,
                        corr_ratio
                    ),
                );
            }

            Some(TickOutput::Marker(TickMarkerEvent {
                marker_number: self.markers_detected,
                timestamp_ms,
                leading_edge_ms,
                duration_ms,
                corr_ratio,
                interval_ms: since_last_marker_ms,
            }))
        } else if duration_ms >= self.min_duration_ms
            && duration_ms <= TICK_MAX_DURATION_MS
            && valid_correlation
        {
            self.ticks_detected += 1;

            if self.gate.enabled {
                self.gate.last_gated_tick_frame = frame;
                if self.gate.recovery {
                    self.gate.recovery = false;
                    debug!("tick: gate recovery cleared, tick reacquired");
                }
            }

            let avg_interval_ms = self.avg_interval_ms(timestamp_ms);
            self.history.push_back(timestamp_ms);
            self.last_tick_frame = self.tick_start_frame;

            debug!(
                "tick: #{} interval {:.0} ms avg {:.0} ms corr {:.1}",
                self.ticks_detected, interval_ms, avg_interval_ms, corr_ratio
            );

            if let Some(log) = self.log.as_mut() {
                log.record(
                    timestamp_ms,
                    format_args!(
                        "{},{:.6},{:.1},{:.0},{:.0},{:.6},{:.2},{:.1}",
                        self.ticks_detected,
                        self.peak_energy,
                        duration_ms,
                        interval_ms,
                        avg_interval_ms,
                        self.noise_floor,
                        self.corr_peak,
                        corr_ratio
                    ),
                );
            }

            Some(TickOutput::Tick(TickEvent {
                tick_number: self.ticks_detected,
                timestamp_ms,
                interval_ms,
                avg_interval_ms,
                duration_ms,
                peak_energy: self.peak_energy,
                noise_floor: self.noise_floor,
                corr_peak: self.corr_peak,
                corr_ratio,
            }))
        } else {
            self.ticks_rejected += 1;
            if is_marker_duration && !valid_marker_interval {
                debug!(
                    "tick: rejected marker-like pulse only {:.1} s after last marker",
                    since_last_marker_ms / 1000.0
                );
            } else if duration_ms > TICK_MAX_DURATION_MS {
                debug!("tick: rejected {:.0} ms pulse in gap zone", duration_ms);
            }
            None
        }
    }

    // Mean of consecutive tick intervals inside the averaging window
    fn avg_interval_ms(&self, now_ms: f32) -> f32 {
        let cutoff = now_ms - AVG_WINDOW_MS;
        let mut prev = None;
        let mut sum = 0.0f32;
        let mut count = 0u32;
        for &t in self.history.iter() {
            if t >= cutoff {
                if let Some(p) = prev {
                    sum += t - p;
                    count += 1;
                }
                prev = Some(t);
            }
        }
        if count > 0 {
            sum / count as f32
        } else {
            0.0
        }
    }

    #[inline]
    fn ms_to_frames(&self, ms: f32) -> u32 {
        (ms / self.frame_ms + 0.5) as u32
    }

    /// Install a second-boundary epoch for the timing gate
    ///
    /// `epoch_ms` is normalized modulo 1000.
    pub fn set_epoch(&mut self, epoch_ms: f32, source: EpochSource, confidence: f32) {
        let mut normalized = epoch_ms % 1000.0;
        if normalized < 0.0 {
            normalized += 1000.0;
        }
        self.gate.epoch_ms = normalized;
        self.epoch_source = Some(source);
        self.epoch_confidence = confidence;
        debug!(
            "tick: epoch {:.1} ms from {:?}, confidence {:.3}",
            normalized, source, confidence
        );
    }

    /// Enable or disable the timing gate
    pub fn set_gating_enabled(&mut self, enabled: bool) {
        self.gate.enabled = enabled;
        self.gate.recovery = false;
        if enabled {
            self.gate.last_gated_tick_frame = self.frame_count;
            debug!(
                "tick: timing gate enabled, window {:.0}..{:.0} ms into second",
                GATE_START_MS, GATE_END_MS
            );
        } else {
            debug!("tick: timing gate disabled");
        }
    }

    /// Installed epoch phase, ms modulo 1000
    pub fn epoch_ms(&self) -> f32 {
        self.gate.epoch_ms
    }

    /// True when the timing gate is active
    pub fn gating_enabled(&self) -> bool {
        self.gate.enabled
    }

    /// Source of the installed epoch, if any
    pub fn epoch_source(&self) -> Option<EpochSource> {
        self.epoch_source
    }

    /// Confidence reported with the installed epoch
    pub fn epoch_confidence(&self) -> f32 {
        self.epoch_confidence
    }

    /// Detection sensitivity, threshold over noise floor; range `[1, 5]`
    pub fn set_threshold_multiplier(&mut self, value: f32) -> Result<(), TunableError> {
        self.threshold_multiplier = check_range("tick threshold_multiplier", value, 1.0, 5.0)?;
        self.update_thresholds();
        Ok(())
    }

    /// Noise-floor decay rate; range `[0.001, 0.1]`
    pub fn set_adapt_down(&mut self, value: f32) -> Result<(), TunableError> {
        self.adapt_down = check_range("tick adapt_down", value, 0.001, 0.1)?;
        Ok(())
    }

    /// Noise-floor rise rate; range `[0.0001, 0.01]`
    pub fn set_adapt_up(&mut self, value: f32) -> Result<(), TunableError> {
        self.adapt_up = check_range("tick adapt_up", value, 0.0001, 0.01)?;
        Ok(())
    }

    /// Minimum accepted pulse width (ms); range `[1, 10]`
    pub fn set_min_duration_ms(&mut self, value: f32) -> Result<(), TunableError> {
        self.min_duration_ms = check_range("tick min_duration_ms", value, 1.0, 10.0)?;
        Ok(())
    }

    /// Enable or disable detection entirely
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// True while detection is enabled
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Current energy noise floor
    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }

    /// Current high (entry) threshold
    pub fn threshold(&self) -> f32 {
        self.threshold_high
    }

    /// Most recent frame's bucket energy
    pub fn current_energy(&self) -> f32 {
        self.current_energy
    }

    /// Correlation noise floor
    pub fn corr_noise_floor(&self) -> f32 {
        self.corr_noise_floor
    }

    /// Accepted tick count
    pub fn tick_count(&self) -> u32 {
        self.ticks_detected
    }

    /// Rejected pulse count
    pub fn rejected_count(&self) -> u32 {
        self.ticks_rejected
    }

    /// Tick-channel marker count
    pub fn marker_count(&self) -> u32 {
        self.markers_detected
    }

    /// True once the warmup frames have elapsed
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
            "tick stats: {:.1} s elapsed, {} ticks, {} markers, {} rejected, noise {:.4}, corr noise {:.2}",
            elapsed,
            self.ticks_detected,
            self.markers_detected,
            self.ticks_rejected,
            self.noise_floor,
            self.corr_noise_floor
        );
    }
}

// Hann-windowed complex tone, conjugated so the multiply-accumulate
// implements correlation directly
fn make_template(freq_hz: f32, sample_rate: f32, len: usize) -> FilterCoeff<Complex<f32>> {
    let w = 2.0 * std::f32::consts::PI * freq_hz / sample_rate;
    let template: Vec<Complex<f32>> = (0..len)
        .map(|n| {
            let window =
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * n as f32 / (len - 1) as f32).cos());
            Complex::from_polar(window, w * n as f32).conj()
        })
        .collect();
    FilterCoeff::from_slice(template)
}
