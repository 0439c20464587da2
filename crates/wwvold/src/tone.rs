//! # Reference tone tracking
//!
//! WWV fills most minutes with 500 or 600 Hz standard-frequency tones,
//! and the carrier itself sits at 0 Hz in complex baseband. Measuring
//! these precisely gives a frequency-offset estimate for the whole
//! receive chain.
//!
//! Per frame: a 4096-point Blackman-Harris FFT at the display rate, then
//! a peak search in both sidebands around the nominal bin. Each peak is
//! refined by parabolic interpolation and the two are averaged, which
//! cancels the interpolator's systematic bias (the fractional offsets of
//! the two sidebands are mirror images). A spectral noise floor taken
//! away from the tone gates validity at 10 dB SNR.
//!
//! The carrier case (nominal 0 Hz) needs its own search: the peak may sit
//! in the low positive bins or wrap into the top of the spectrum.

#[cfg(not(test))]
use log::debug;

#[cfg(test)]
use std::println as debug;

use crate::events::ToneMeasurement;
use crate::fft::{parabolic_peak, peak_bin_in, FftProcessor, WindowKind};
use crate::logsink::EventLog;

const TONE_FFT_SIZE: usize = 4096;

/// Peak search half-width around the nominal bin
const SEARCH_BINS: isize = 10;

/// Extra bins excluded around the tone when estimating the noise floor
const NOISE_EXCLUSION_PAD: isize = 5;

/// Minimum SNR for a measurement to be reported valid
const MIN_SNR_DB: f32 = 10.0;

const PANIC_FFT_BLOCK: &str = "tone FFT block length invariant broken";

/// Fixed field order of the tone log stream
const LOG_HEADER: &str = "measured_hz,offset_hz,offset_ppm,snr_db,valid";

/// Single-tone frequency tracker
#[derive(Debug)]
pub struct ToneTracker {
    fft: FftProcessor,
    frame_ms: f32,
    nominal_hz: f32,

    ring_i: Vec<f32>,
    ring_q: Vec<f32>,
    ring_idx: usize,
    samples_collected: usize,

    scratch_i: Vec<f32>,
    scratch_q: Vec<f32>,
    magnitudes: Vec<f32>,

    measured_hz: f32,
    offset_hz: f32,
    offset_ppm: f32,
    snr_db: f32,
    noise_floor: f32,
    valid: bool,

    frame_count: u64,
    log: Option<EventLog>,
}

impl ToneTracker {
    /// Create a tracker for `nominal_hz` (0 for the carrier) at the given
    /// sampling rate
    pub fn new(nominal_hz: f32, sample_rate: f32) -> Self {
        let fft = FftProcessor::new(TONE_FFT_SIZE, sample_rate, WindowKind::BlackmanHarris)
            .expect(PANIC_FFT_BLOCK);
        let frame_ms = fft.frame_duration_ms();

        Self {
            fft,
            frame_ms,
            nominal_hz,
            ring_i: vec![0.0; TONE_FFT_SIZE],
            ring_q: vec![0.0; TONE_FFT_SIZE],
            ring_idx: 0,
            samples_collected: 0,
            scratch_i: vec![0.0; TONE_FFT_SIZE],
            scratch_q: vec![0.0; TONE_FFT_SIZE],
            magnitudes: vec![0.0; TONE_FFT_SIZE],
            measured_hz: nominal_hz,
            offset_hz: 0.0,
            offset_ppm: 0.0,
            snr_db: 0.0,
            noise_floor: 0.0,
            valid: false,
            frame_count: 0,
            log: None,
        }
    }

    /// Attach a log sink for this tracker's records
    pub fn set_log(&mut self, sink: Box<dyn std::io::Write + Send>) {
        self.log = Some(EventLog::new("tone", LOG_HEADER, sink));
    }

    /// Process one display-path sample
    ///
    /// Emits one measurement per full FFT frame.
    pub fn process(&mut self, i: f32, q: f32) -> Option<ToneMeasurement> {
        self.ring_i[self.ring_idx] = i;
        self.ring_q[self.ring_idx] = q;
        self.ring_idx = (self.ring_idx + 1) % TONE_FFT_SIZE;
        self.samples_collected += 1;

        if self.samples_collected < TONE_FFT_SIZE {
            return None;
        }
        self.samples_collected = 0;

        self.measure();
        let timestamp_ms = self.frame_count as f32 * self.frame_ms;
        self.frame_count += 1;

        if let Some(log) = self.log.as_mut() {
            log.record(
                timestamp_ms,
                format_args!(
                    "{:.3},{:.3},{:.2},{:.1},{}",
                    self.measured_hz,
                    self.offset_hz,
                    self.offset_ppm,
                    self.snr_db,
                    if self.valid { "YES" } else { "NO" }
                ),
            );
        }

        Some(ToneMeasurement {
            nominal_hz: self.nominal_hz,
            timestamp_ms,
            measured_hz: self.measured_hz,
            offset_hz: self.offset_hz,
            offset_ppm: self.offset_ppm,
            snr_db: self.snr_db,
            valid: self.valid,
        })
    }

    fn measure(&mut self) {
        // linearize the ring so the window applies in time order
        for n in 0..TONE_FFT_SIZE {
            let idx = (self.ring_idx + n) % TONE_FFT_SIZE;
            self.scratch_i[n] = self.ring_i[idx];
            self.scratch_q[n] = self.ring_q[idx];
        }
        self.fft
            .process(&self.scratch_i, &self.scratch_q)
            .expect(PANIC_FFT_BLOCK);
        self.fft
            .magnitudes_into(&mut self.magnitudes)
            .expect(PANIC_FFT_BLOCK);

        if self.nominal_hz < 1.0 {
            self.measure_carrier();
        } else {
            self.measure_tone();
        }
    }

    // Carrier: single peak that may straddle DC into the top bins
    fn measure_carrier(&mut self) {
        let size = TONE_FFT_SIZE;
        let hz_per_bin = self.fft.hz_per_bin();
        let mag = &self.magnitudes;

        let mut peak_bin = 0usize;
        let mut peak_mag = mag[0];
        for (i, &m) in mag.iter().enumerate().take(SEARCH_BINS as usize + 1).skip(1) {
            if m > peak_mag {
                peak_mag = m;
                peak_bin = i;
            }
        }
        for (i, &m) in mag.iter().enumerate().skip(size - SEARCH_BINS as usize) {
            if m > peak_mag {
                peak_mag = m;
                peak_bin = i;
            }
        }

        let peak_frac = parabolic_peak(mag, peak_bin);
        let measured_hz = if peak_bin < size / 2 {
            peak_frac * hz_per_bin
        } else {
            (peak_frac - size as f32) * hz_per_bin
        };

        self.noise_floor = self.estimate_noise_floor(0);
        self.snr_db = 20.0 * (peak_mag / (self.noise_floor + 1.0e-10)).log10();
        self.valid = self.snr_db >= MIN_SNR_DB;

        if self.valid {
            self.measured_hz = measured_hz;
            self.offset_hz = measured_hz;
            // the RF carrier frequency is outside this engine's view, so
            // no ppm scaling is defined for the carrier case
            self.offset_ppm = 0.0;
        } else {
            self.measured_hz = 0.0;
            self.offset_hz = 0.0;
            self.offset_ppm = 0.0;
        }
    }

    // 500/600 Hz: find both sidebands, refine each, average
    fn measure_tone(&mut self) {
        let size = TONE_FFT_SIZE as isize;
        let hz_per_bin = self.fft.hz_per_bin();
        let mag = &self.magnitudes;

        let nominal_bin = (self.nominal_hz / hz_per_bin + 0.5) as isize;
        let lsb_center = size - nominal_bin;

        let usb_peak_bin = peak_bin_in(mag, nominal_bin - SEARCH_BINS, nominal_bin + SEARCH_BINS);
        let usb_peak_frac = parabolic_peak(mag, usb_peak_bin);
        let usb_peak_mag = mag[usb_peak_bin];

        let lsb_peak_bin = peak_bin_in(mag, lsb_center - SEARCH_BINS, lsb_center + SEARCH_BINS);
        let lsb_peak_frac = parabolic_peak(mag, lsb_peak_bin);
        let lsb_peak_mag = mag[lsb_peak_bin];

        self.noise_floor = self.estimate_noise_floor(nominal_bin);

        let peak_mag = usb_peak_mag.max(lsb_peak_mag);
        self.snr_db = 20.0 * (peak_mag / (self.noise_floor + 1.0e-10)).log10();
        self.valid = self.snr_db >= MIN_SNR_DB;

        if self.valid {
            let usb_hz = usb_peak_frac * hz_per_bin;
            let lsb_hz = (TONE_FFT_SIZE as f32 - lsb_peak_frac) * hz_per_bin;

            self.measured_hz = (usb_hz + lsb_hz) / 2.0;
            self.offset_hz = self.measured_hz - self.nominal_hz;
            self.offset_ppm = self.offset_hz / self.nominal_hz * 1.0e6;

            debug!(
                "tone {:.0}: usb {:.3} Hz, lsb {:.3} Hz, snr {:.1} dB",
                self.nominal_hz, usb_hz, lsb_hz, self.snr_db
            );
        } else {
            self.measured_hz = self.nominal_hz;
            self.offset_hz = 0.0;
            self.offset_ppm = 0.0;
        }
    }

    // Mean magnitude over a fixed band away from DC, both sidebands,
    // skipping the tone's exclusion zone
    fn estimate_noise_floor(&self, exclude_bin: isize) -> f32 {
        let size = TONE_FFT_SIZE as isize;
        let exclusion = SEARCH_BINS + NOISE_EXCLUSION_PAD;
        let mag = &self.magnitudes;

        let mut sum = 0.0f32;
        let mut count = 0u32;

        for i in 50..150isize {
            if (i - exclude_bin).abs() > exclusion {
                sum += mag[i as usize];
                count += 1;
            }
        }

        let neg_exclude = size - exclude_bin;
        for i in (size - 150)..(size - 50) {
            if (i - neg_exclude).abs() > exclusion {
                sum += mag[i as usize];
                count += 1;
            }
        }

        if count > 0 {
            sum / count as f32
        } else {
            1.0e-10
        }
    }

    /// Nominal tone frequency
    pub fn nominal_hz(&self) -> f32 {
        self.nominal_hz
    }

    /// Latest measured frequency
    pub fn measured_hz(&self) -> f32 {
        self.measured_hz
    }

    /// Latest frequency offset
    pub fn offset_hz(&self) -> f32 {
        self.offset_hz
    }

    /// Latest SNR
    pub fn snr_db(&self) -> f32 {
        self.snr_db
    }

    /// Latest linear spectral noise floor
    ///
    /// Published as the advisory subcarrier noise floor.
    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }

    /// True when the latest measurement passed the SNR gate
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Completed frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    const RATE: f32 = 12_000.0;

    #[test]
    fn test_500hz_sine_with_noise() {
        let mut tracker = ToneTracker::new(500.0, RATE);
        let mut rng = StdRng::seed_from_u64(0x70_e7);
        let normal = Normal::new(0.0f32, 0.01).unwrap();

        let mut last = None;
        for n in 0..(2 * TONE_FFT_SIZE) {
            let t = n as f32 / RATE;
            let i = 0.5 * (2.0 * std::f32::consts::PI * 500.0 * t).sin()
                + normal.sample(&mut rng);
            let q = normal.sample(&mut rng);
            if let Some(m) = tracker.process(i, q) {
                last = Some(m);
            }
        }

        let m = last.expect("no measurement");
        assert!(m.valid);
        assert!(
            (m.measured_hz - 500.0).abs() < 0.1,
            "measured {}",
            m.measured_hz
        );
        assert!(m.snr_db >= 20.0, "snr {}", m.snr_db);
        assert!(m.offset_ppm.abs() < 200.0, "ppm {}", m.offset_ppm);
    }

    #[test]
    fn test_offset_tone_measured() {
        // 600 Hz tracker fed a tone 2 Hz high
        let mut tracker = ToneTracker::new(600.0, RATE);

        let mut last = None;
        for n in 0..TONE_FFT_SIZE {
            let t = n as f32 / RATE;
            let i = 0.5 * (2.0 * std::f32::consts::PI * 602.0 * t).sin();
            if let Some(m) = tracker.process(i, 0.0) {
                last = Some(m);
            }
        }

        let m = last.expect("no measurement");
        assert!(m.valid);
        assert!((m.offset_hz - 2.0).abs() < 0.1, "offset {}", m.offset_hz);
    }

    #[test]
    fn test_carrier_near_dc() {
        // carrier tracker on a complex tone 5 Hz below zero
        let mut tracker = ToneTracker::new(0.0, RATE);
        let samples = crate::station::tone(-5.0, 0.5, RATE, TONE_FFT_SIZE);

        let mut last = None;
        for sa in samples {
            if let Some(m) = tracker.process(sa.re, sa.im) {
                last = Some(m);
            }
        }

        let m = last.expect("no measurement");
        assert!(m.valid);
        assert!(
            (m.measured_hz + 5.0).abs() < 0.5,
            "measured {}",
            m.measured_hz
        );
    }

    #[test]
    fn test_noise_only_is_invalid() {
        let mut tracker = ToneTracker::new(500.0, RATE);
        let mut rng = StdRng::seed_from_u64(99);
        let normal = Normal::new(0.0f32, 0.01).unwrap();

        let mut last = None;
        for _ in 0..TONE_FFT_SIZE {
            if let Some(m) = tracker.process(normal.sample(&mut rng), normal.sample(&mut rng)) {
                last = Some(m);
            }
        }

        let m = last.expect("no measurement");
        assert!(!m.valid);
        assert_eq!(m.measured_hz, 500.0);
        assert_eq!(m.offset_hz, 0.0);
    }
}
