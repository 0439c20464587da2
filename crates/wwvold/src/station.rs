//! WWV/WWVH broadcast format constants and reference waveforms
//!
//! The NIST stations modulate a simple, rigid schedule onto their carriers:
//!
//! * a 5 ms tick pulse at the top of every second (1000 Hz from WWV,
//!   1200 Hz from WWVH), omitted at seconds :29 and :59;
//! * an 800 ms marker pulse at second :00 of every minute;
//! * a 100 Hz subcarrier carrying a 60-bit pulse-width BCD time code
//!   (200 ms = binary 0, 500 ms = binary 1, 800 ms = position marker);
//! * 500/600 Hz reference tones during most minutes.
//!
//! A 40 ms protected zone brackets each tick: the BCD subcarrier is
//! suppressed there by the broadcast itself.
//!
//! The synthesis helpers at the bottom produce idealized complex-baseband
//! renditions of these elements for tests and demos.

use num_complex::Complex;

/// WWV tick tone frequency (Hz)
pub const WWV_TICK_FREQ_HZ: f32 = 1000.0;

/// WWVH tick tone frequency (Hz)
pub const WWVH_TICK_FREQ_HZ: f32 = 1200.0;

/// Hour marker tone, both stations (Hz)
pub const HOUR_FREQ_HZ: f32 = 1500.0;

/// BCD time code subcarrier (Hz)
pub const BCD_SUBCARRIER_HZ: f32 = 100.0;

/// Regular second tick duration (ms)
pub const TICK_DURATION_MS: f32 = 5.0;

/// Minute/hour marker duration (ms)
pub const MARKER_DURATION_MS: f32 = 800.0;

/// BCD binary 0 pulse width (ms)
pub const BCD_ZERO_MS: f32 = 200.0;

/// BCD binary 1 pulse width (ms)
pub const BCD_ONE_MS: f32 = 500.0;

/// BCD position marker pulse width (ms)
pub const BCD_MARKER_MS: f32 = 800.0;

/// Protected zone around each tick with no BCD modulation (ms)
///
/// 10 ms before the tick, the 5 ms tick itself, and 25 ms after.
pub const PROTECTED_ZONE_MS: f32 = 40.0;

/// 500 Hz reference tone
pub const TONE_500_HZ: f32 = 500.0;

/// 600 Hz reference tone
pub const TONE_600_HZ: f32 = 600.0;

/// Musical A, broadcast during minute 2 (Hz)
pub const TONE_440_HZ: f32 = 440.0;

/// Seconds of the minute that carry a BCD position marker
pub const P_MARKER_SECONDS: [u32; 7] = [0, 9, 19, 29, 39, 49, 59];

/// Seconds of the minute with no tick pulse
pub const TICK_HOLE_SECONDS: [u32; 2] = [29, 59];

/// True if `second` is a valid BCD position-marker slot
#[inline]
pub fn is_p_marker_second(second: u32) -> bool {
    P_MARKER_SECONDS.contains(&second)
}

/// Transmitting station
///
/// WWV (Fort Collins) and WWVH (Kauai) share the time code format but
/// use different tick tone frequencies so that listeners who receive
/// both can tell them apart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Station {
    /// WWV, Fort Collins, Colorado: 1000 Hz ticks
    #[default]
    Wwv,

    /// WWVH, Kauai, Hawaii: 1200 Hz ticks
    Wwvh,
}

impl Station {
    /// Tick tone frequency for this station, in Hz
    pub fn tick_freq_hz(&self) -> f32 {
        match self {
            Station::Wwv => WWV_TICK_FREQ_HZ,
            Station::Wwvh => WWVH_TICK_FREQ_HZ,
        }
    }
}

impl AsRef<str> for Station {
    fn as_ref(&self) -> &str {
        match self {
            Station::Wwv => "WWV",
            Station::Wwvh => "WWVH",
        }
    }
}

/// Synthesize a complex tone
///
/// Produces `num_samples` of `amplitude`·e^(j2πft) at the given sampling
/// rate. A zero `freq_hz` yields a DC (carrier) line.
pub fn tone(freq_hz: f32, amplitude: f32, sample_rate: f32, num_samples: usize) -> Vec<Complex<f32>> {
    let w = 2.0 * std::f32::consts::PI * freq_hz / sample_rate;
    (0..num_samples)
        .map(|n| Complex::from_polar(amplitude, w * n as f32))
        .collect()
}

/// Synthesize silence
pub fn silence(num_samples: usize) -> Vec<Complex<f32>> {
    vec![Complex::new(0.0, 0.0); num_samples]
}

/// Synthesize a gated pulse train
///
/// Each 1000 ms period starts with `on_ms` of tone at `freq_hz` followed
/// by silence. Seconds listed in `skip` are left entirely silent, which
/// reproduces the :29/:59 tick holes. Phase is continuous across gaps, as
/// it is in the broadcast.
pub fn pulse_train(
    freq_hz: f32,
    amplitude: f32,
    sample_rate: f32,
    on_ms: f32,
    seconds: u32,
    skip: &[u32],
) -> Vec<Complex<f32>> {
    let period = sample_rate as usize; // one second of samples
    let on_samples = (on_ms * sample_rate / 1000.0) as usize;
    let w = 2.0 * std::f32::consts::PI * freq_hz / sample_rate;

    let mut out = Vec::with_capacity(period * seconds as usize);
    for sec in 0..seconds {
        let gated = !skip.contains(&(sec % 60));
        for n in 0..period {
            let idx = (sec as usize * period + n) as f32;
            if gated && n < on_samples {
                out.push(Complex::from_polar(amplitude, w * idx));
            } else {
                out.push(Complex::new(0.0, 0.0));
            }
        }
    }
    out
}

/// Synthesize a single gated pulse bracketed by silence
///
/// `lead_ms` of silence, `on_ms` of tone, then `tail_ms` of silence.
pub fn single_pulse(
    freq_hz: f32,
    amplitude: f32,
    sample_rate: f32,
    lead_ms: f32,
    on_ms: f32,
    tail_ms: f32,
) -> Vec<Complex<f32>> {
    let ms_to_n = |ms: f32| (ms * sample_rate / 1000.0) as usize;
    let (lead, on, tail) = (ms_to_n(lead_ms), ms_to_n(on_ms), ms_to_n(tail_ms));
    let w = 2.0 * std::f32::consts::PI * freq_hz / sample_rate;

    let mut out = silence(lead);
    out.extend((0..on).map(|n| Complex::from_polar(amplitude, w * n as f32)));
    out.extend(silence(tail));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_station_freqs() {
        assert_eq!(Station::default(), Station::Wwv);
        assert_approx_eq!(Station::Wwv.tick_freq_hz(), 1000.0);
        assert_approx_eq!(Station::Wwvh.tick_freq_hz(), 1200.0);
        assert_eq!(Station::Wwvh.as_ref(), "WWVH");
    }

    #[test]
    fn test_p_marker_seconds() {
        assert!(is_p_marker_second(0));
        assert!(is_p_marker_second(9));
        assert!(is_p_marker_second(59));
        assert!(!is_p_marker_second(5));
        assert!(!is_p_marker_second(30));
    }

    #[test]
    fn test_tone_magnitude() {
        let samples = tone(1000.0, 0.5, 50_000.0, 64);
        assert_eq!(samples.len(), 64);
        for sa in samples {
            assert_approx_eq!(sa.norm(), 0.5, 1.0e-6);
        }
    }

    #[test]
    fn test_pulse_train_gating() {
        // 2 seconds at a tiny rate for inspection: 5 ms on = 5 samples at 1 kHz
        let train = pulse_train(100.0, 1.0, 1000.0, 5.0, 2, &[1]);
        assert_eq!(train.len(), 2000);

        // first second: 5 samples on, rest silent
        assert!(train[0].norm() > 0.9);
        assert!(train[4].norm() > 0.9);
        assert_approx_eq!(train[5].norm(), 0.0);

        // skipped second entirely silent
        for sa in &train[1000..2000] {
            assert_approx_eq!(sa.norm(), 0.0);
        }
    }

    #[test]
    fn test_single_pulse_extents() {
        let pulse = single_pulse(1000.0, 1.0, 10_000.0, 10.0, 5.0, 10.0);
        assert_eq!(pulse.len(), 100 + 50 + 100);
        assert_approx_eq!(pulse[0].norm(), 0.0);
        assert!(pulse[100].norm() > 0.9);
        assert!(pulse[149].norm() > 0.9);
        assert_approx_eq!(pulse[150].norm(), 0.0);
    }
}
