//! # Channel filter bank
//!
//! Splits the incoming complex baseband into the two bands the detectors
//! work on:
//!
//! * **sync band** — 800–1400 Hz bandpass, carrying the 1000/1200 Hz tick
//!   and marker tones. Built as a 2nd-order Butterworth highpass at 800 Hz
//!   followed by a 2nd-order lowpass at 1400 Hz.
//! * **data band** — 0–150 Hz lowpass, isolating the 100 Hz BCD
//!   subcarrier. A 4th-order Butterworth lowpass as two paired sections.
//!
//! I and Q run through independent cascades with identical coefficients;
//! the bank owns all four cascades and shares nothing with the detectors
//! downstream.

use crate::filter::{Biquad, BiquadCascade};

/// Lower edge of the sync band (Hz)
pub const SYNC_BAND_LOW_HZ: f32 = 800.0;

/// Upper edge of the sync band (Hz)
pub const SYNC_BAND_HIGH_HZ: f32 = 1400.0;

/// Data band cutoff (Hz)
pub const DATA_BAND_CUTOFF_HZ: f32 = 150.0;

/// One filtered sample pair from the bank
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChannelSample {
    /// Sync-band I/Q
    pub sync: (f32, f32),
    /// Data-band I/Q
    pub data: (f32, f32),
}

/// 800–1400 Hz bandpass for the tick/marker tones
#[derive(Clone, Debug)]
pub struct SyncBandFilter {
    i: BiquadCascade,
    q: BiquadCascade,
}

impl SyncBandFilter {
    /// Design for the given sampling rate
    pub fn new(sample_rate: f32) -> Self {
        let sections = || {
            BiquadCascade::new(vec![
                Biquad::highpass(SYNC_BAND_LOW_HZ, sample_rate, std::f32::consts::FRAC_1_SQRT_2),
                Biquad::lowpass(SYNC_BAND_HIGH_HZ, sample_rate, std::f32::consts::FRAC_1_SQRT_2),
            ])
        };
        Self {
            i: sections(),
            q: sections(),
        }
    }

    /// Filter one I/Q pair
    #[inline]
    pub fn filter(&mut self, i: f32, q: f32) -> (f32, f32) {
        (self.i.filter(i), self.q.filter(q))
    }

    /// Reset to zero initial conditions
    pub fn reset(&mut self) {
        self.i.reset();
        self.q.reset();
    }
}

/// 150 Hz lowpass for the BCD subcarrier
#[derive(Clone, Debug)]
pub struct DataBandFilter {
    i: BiquadCascade,
    q: BiquadCascade,
}

impl DataBandFilter {
    /// Design for the given sampling rate
    pub fn new(sample_rate: f32) -> Self {
        Self {
            i: BiquadCascade::butterworth_lowpass_4th(DATA_BAND_CUTOFF_HZ, sample_rate),
            q: BiquadCascade::butterworth_lowpass_4th(DATA_BAND_CUTOFF_HZ, sample_rate),
        }
    }

    /// Filter one I/Q pair
    #[inline]
    pub fn filter(&mut self, i: f32, q: f32) -> (f32, f32) {
        (self.i.filter(i), self.q.filter(q))
    }

    /// Reset to zero initial conditions
    pub fn reset(&mut self) {
        self.i.reset();
        self.q.reset();
    }
}

/// Both channel paths behind one entry point
#[derive(Clone, Debug)]
pub struct ChannelFilterBank {
    sync: SyncBandFilter,
    data: DataBandFilter,
}

impl ChannelFilterBank {
    /// Design both paths for the given sampling rate
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sync: SyncBandFilter::new(sample_rate),
            data: DataBandFilter::new(sample_rate),
        }
    }

    /// Filter one I/Q pair through both paths
    #[inline]
    pub fn process(&mut self, i: f32, q: f32) -> ChannelSample {
        ChannelSample {
            sync: self.sync.filter(i, q),
            data: self.data.filter(i, q),
        }
    }

    /// Reset both paths to zero initial conditions
    pub fn reset(&mut self) {
        self.sync.reset();
        self.data.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::station;

    // RMS over the second half of a filtered tone, after transients settle
    fn settled_rms(samples: &[(f32, f32)]) -> f32 {
        let tail = &samples[samples.len() / 2..];
        let power: f32 = tail.iter().map(|(i, q)| i * i + q * q).sum::<f32>() / tail.len() as f32;
        power.sqrt()
    }

    fn run_bank(freq_hz: f32) -> (Vec<(f32, f32)>, Vec<(f32, f32)>) {
        const RATE: f32 = 50_000.0;
        let mut bank = ChannelFilterBank::new(RATE);

        let input = station::tone(freq_hz, 1.0, RATE, RATE as usize);
        let mut sync_out = Vec::with_capacity(input.len());
        let mut data_out = Vec::with_capacity(input.len());
        for sa in input {
            let out = bank.process(sa.re, sa.im);
            sync_out.push(out.sync);
            data_out.push(out.data);
        }
        (sync_out, data_out)
    }

    #[test]
    fn test_tick_tone_splits_cleanly() {
        // 1 kHz: nearly unity on the sync path, gone on the data path
        let (sync_out, data_out) = run_bank(1000.0);

        let sync_rms = settled_rms(&sync_out);
        let data_rms = settled_rms(&data_out);

        assert!(sync_rms > 0.6, "sync-band rms {}", sync_rms);
        assert!(data_rms < 0.02, "data-band rms {}", data_rms);
    }

    #[test]
    fn test_subcarrier_splits_cleanly() {
        // 100 Hz: unity on the data path, rejected by the sync path
        let (sync_out, data_out) = run_bank(100.0);

        let sync_rms = settled_rms(&sync_out);
        let data_rms = settled_rms(&data_out);

        assert!(data_rms > 0.6, "data-band rms {}", data_rms);
        assert!(sync_rms < 0.05, "sync-band rms {}", sync_rms);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut bank = ChannelFilterBank::new(50_000.0);
        for _ in 0..1000 {
            bank.process(1.0, -1.0);
        }
        bank.reset();
        let out = bank.process(0.0, 0.0);
        assert!(out.sync.0.abs() < 1.0e-9);
        assert!(out.data.1.abs() < 1.0e-9);
    }
}
