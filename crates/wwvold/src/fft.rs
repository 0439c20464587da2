//! # Windowed FFT processing
//!
//! Every detector in this crate owns one [`FftProcessor`]: a forward
//! complex FFT of fixed power-of-two size with an analysis window applied
//! on the way in. The processor also provides the two spectral reductions
//! the detectors live on:
//!
//! * [`bucket_energy`](FftProcessor::bucket_energy) — summed magnitude in a
//!   band around a target frequency, taken from both the positive-frequency
//!   bins and their mirrored negative-frequency counterparts. Complex
//!   baseband from a real modulation puts equal energy in both sidebands,
//!   so summing both roughly doubles the detection statistic.
//! * [`magnitudes_into`](FftProcessor::magnitudes_into) — the full
//!   magnitude spectrum, for peak-search consumers like the tone tracker.
//!
//! Peak refinement helpers ([`parabolic_peak`], [`peak_bin_in`]) live here
//! as well since they operate directly on magnitude spectra.

use std::sync::Arc;

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use thiserror::Error;

/// FFT configuration or input errors
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FftError {
    /// FFT sizes must be powers of two
    #[error("FFT size {0} is not a power of two")]
    NotPowerOfTwo(usize),

    /// The sample rate must be positive
    #[error("sample rate must be positive")]
    BadSampleRate,

    /// An input block did not match the configured FFT size
    #[error("input block of {got} samples does not match FFT size {want}")]
    WrongLength {
        /// Configured FFT size
        want: usize,
        /// Offered block length
        got: usize,
    },
}

/// Analysis window applied before the transform
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WindowKind {
    /// Hann (raised cosine); the default everywhere a detector just wants
    /// bucket energies
    #[default]
    Hann,

    /// 4-term Blackman-Harris; much lower sidelobes, used where leakage
    /// would corrupt a neighboring-bin measurement
    BlackmanHarris,
}

impl WindowKind {
    /// Compute window coefficients of the given length
    pub fn coefficients(self, size: usize) -> Vec<f32> {
        let denom = (size - 1) as f32;
        match self {
            WindowKind::Hann => (0..size)
                .map(|i| {
                    0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / denom).cos())
                })
                .collect(),
            WindowKind::BlackmanHarris => {
                const A0: f32 = 0.35875;
                const A1: f32 = 0.48829;
                const A2: f32 = 0.14128;
                const A3: f32 = 0.01168;
                (0..size)
                    .map(|i| {
                        let n = 2.0 * std::f32::consts::PI * i as f32 / denom;
                        A0 - A1 * n.cos() + A2 * (2.0 * n).cos() - A3 * (3.0 * n).cos()
                    })
                    .collect()
            }
        }
    }
}

/// Windowed forward FFT with bucket-energy extraction
///
/// Owns its plan, window coefficients, and working buffers; one instance
/// per detector, never shared. Stateless per [`process`](Self::process)
/// call: each call overwrites the previous spectrum.
pub struct FftProcessor {
    size: usize,
    sample_rate: f32,
    hz_per_bin: f32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl std::fmt::Debug for FftProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftProcessor")
            .field("size", &self.size)
            .field("sample_rate", &self.sample_rate)
            .field("hz_per_bin", &self.hz_per_bin)
            .finish()
    }
}

impl FftProcessor {
    /// Create a processor of the given power-of-two `size`
    pub fn new(size: usize, sample_rate: f32, window: WindowKind) -> Result<Self, FftError> {
        if size == 0 || size & (size - 1) != 0 {
            return Err(FftError::NotPowerOfTwo(size));
        }
        if sample_rate <= 0.0 {
            return Err(FftError::BadSampleRate);
        }

        let fft = FftPlanner::new().plan_fft_forward(size);
        let scratch_len = fft.get_inplace_scratch_len();

        Ok(Self {
            size,
            sample_rate,
            hz_per_bin: sample_rate / size as f32,
            fft,
            window: window.coefficients(size),
            buffer: vec![Complex::new(0.0, 0.0); size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        })
    }

    /// FFT size
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Frequency resolution, Hz per bin
    #[inline]
    pub fn hz_per_bin(&self) -> f32 {
        self.hz_per_bin
    }

    /// Frame duration in milliseconds
    #[inline]
    pub fn frame_duration_ms(&self) -> f32 {
        self.size as f32 * 1000.0 / self.sample_rate
    }

    /// Window and transform one block of I/Q samples
    ///
    /// Both blocks must be exactly [`size`](Self::size) samples long. The
    /// resulting spectrum stays valid until the next call.
    pub fn process(&mut self, i_block: &[f32], q_block: &[f32]) -> Result<(), FftError> {
        if i_block.len() != self.size {
            return Err(FftError::WrongLength {
                want: self.size,
                got: i_block.len(),
            });
        }
        if q_block.len() != self.size {
            return Err(FftError::WrongLength {
                want: self.size,
                got: q_block.len(),
            });
        }

        for (out, ((i, q), w)) in self
            .buffer
            .iter_mut()
            .zip(i_block.iter().zip(q_block.iter()).zip(self.window.iter()))
        {
            *out = Complex::new(i * w, q * w);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);
        Ok(())
    }

    /// Magnitude of one output bin
    #[inline]
    pub fn magnitude(&self, bin: usize) -> f32 {
        self.buffer[bin].norm()
    }

    /// Fill `out` with the magnitude spectrum
    ///
    /// `out` must be [`size`](Self::size) elements long.
    pub fn magnitudes_into(&self, out: &mut [f32]) -> Result<(), FftError> {
        if out.len() != self.size {
            return Err(FftError::WrongLength {
                want: self.size,
                got: out.len(),
            });
        }
        for (m, c) in out.iter_mut().zip(self.buffer.iter()) {
            *m = c.norm();
        }
        Ok(())
    }

    /// Summed magnitude around `center_hz`, both sidebands
    ///
    /// Sums `magnitude / size` over `center ± ceil(bandwidth/hz_per_bin)`
    /// bins around the positive-frequency bin for `center_hz` and around
    /// its mirrored negative-frequency bin. A bandwidth below one bin
    /// clamps to one bin each side.
    pub fn bucket_energy(&self, center_hz: f32, bandwidth_hz: f32) -> f32 {
        let center_bin = (center_hz / self.hz_per_bin + 0.5) as isize;
        let mut bin_span = (bandwidth_hz / self.hz_per_bin + 0.5) as isize;
        if bin_span < 1 {
            bin_span = 1;
        }

        let size = self.size as isize;
        let norm = 1.0 / self.size as f32;
        let mut energy = 0.0f32;

        for b in -bin_span..=bin_span {
            let pos_bin = center_bin + b;
            let neg_bin = size - center_bin + b;

            if (0..size).contains(&pos_bin) {
                energy += self.buffer[pos_bin as usize].norm() * norm;
            }
            if (0..size).contains(&neg_bin) {
                energy += self.buffer[neg_bin as usize].norm() * norm;
            }
        }

        energy
    }
}

/// Refine a peak location by parabolic interpolation
///
/// Fits a parabola through the magnitudes at `peak_bin` and its two
/// neighbors and returns the fractional bin of the vertex. Returns the
/// integer bin unchanged at the spectrum edges or when the three points
/// are too close to collinear for a stable fit.
pub(crate) fn parabolic_peak(mag: &[f32], peak_bin: usize) -> f32 {
    if peak_bin == 0 || peak_bin >= mag.len() - 1 {
        return peak_bin as f32;
    }

    let alpha = mag[peak_bin - 1];
    let beta = mag[peak_bin];
    let gamma = mag[peak_bin + 1];

    let denom = alpha - 2.0 * beta + gamma;
    if denom.abs() < 1.0e-10 {
        return peak_bin as f32;
    }

    peak_bin as f32 + 0.5 * (alpha - gamma) / denom
}

/// Index of the largest magnitude in `[start, end]`, clamped to bounds
pub(crate) fn peak_bin_in(mag: &[f32], start: isize, end: isize) -> usize {
    let start = start.clamp(0, mag.len() as isize - 1) as usize;
    let end = end.clamp(0, mag.len() as isize - 1) as usize;

    let mut peak_bin = start;
    let mut peak_val = mag[start];
    for (i, &m) in mag.iter().enumerate().take(end + 1).skip(start + 1) {
        if m > peak_val {
            peak_val = m;
            peak_bin = i;
        }
    }
    peak_bin
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;

    use crate::station;

    #[test]
    fn test_rejects_bad_config() {
        assert_eq!(
            FftProcessor::new(100, 50_000.0, WindowKind::Hann).unwrap_err(),
            FftError::NotPowerOfTwo(100)
        );
        assert_eq!(
            FftProcessor::new(256, 0.0, WindowKind::Hann).unwrap_err(),
            FftError::BadSampleRate
        );
    }

    #[test]
    fn test_rejects_wrong_length() {
        let mut fft = FftProcessor::new(256, 50_000.0, WindowKind::Hann).unwrap();
        let short = vec![0.0f32; 100];
        let full = vec![0.0f32; 256];
        assert!(matches!(
            fft.process(&short, &full),
            Err(FftError::WrongLength { want: 256, got: 100 })
        ));
        assert!(fft.process(&full, &full).is_ok());
    }

    #[test]
    fn test_windows() {
        let hann = WindowKind::Hann.coefficients(256);
        assert_approx_eq!(hann[0], 0.0, 1.0e-6);
        assert_approx_eq!(hann[128], 1.0, 1.0e-3);

        let bh = WindowKind::BlackmanHarris.coefficients(256);
        // 4-term Blackman-Harris endpoint: a0 - a1 + a2 - a3 = 6e-5
        assert_approx_eq!(bh[0], 6.0e-5, 1.0e-5);
        assert_approx_eq!(bh[128], 1.0, 1.0e-3);
    }

    #[test]
    fn test_bucket_energy_tone() {
        let mut fft = FftProcessor::new(256, 50_000.0, WindowKind::Hann).unwrap();

        let samples = station::tone(1000.0, 1.0, 50_000.0, 256);
        let i: Vec<f32> = samples.iter().map(|s| s.re).collect();
        let q: Vec<f32> = samples.iter().map(|s| s.im).collect();
        fft.process(&i, &q).unwrap();

        let on_target = fft.bucket_energy(1000.0, 100.0);
        let off_target = fft.bucket_energy(10_000.0, 100.0);

        // windowed unit tone: peak magnitude ≈ Σw/2·2 = size/2, /size = 0.5
        assert!(on_target > 0.3, "on-target energy {}", on_target);
        assert!(
            off_target < on_target / 100.0,
            "off-target energy {} vs {}",
            off_target,
            on_target
        );
    }

    #[test]
    fn test_bucket_energy_counts_both_sidebands() {
        // a real 1 kHz signal (q = 0) splits evenly between ±1 kHz
        let mut fft = FftProcessor::new(256, 50_000.0, WindowKind::Hann).unwrap();

        let i: Vec<f32> = (0..256)
            .map(|n| (2.0 * std::f32::consts::PI * 1000.0 * n as f32 / 50_000.0).cos())
            .collect();
        let q = vec![0.0f32; 256];
        fft.process(&i, &q).unwrap();

        let both = fft.bucket_energy(1000.0, 100.0);
        assert!(both > 0.3, "dual-sideband energy {}", both);
    }

    #[test]
    fn test_silence_has_no_energy() {
        let mut fft = FftProcessor::new(256, 50_000.0, WindowKind::Hann).unwrap();
        let zeros = vec![0.0f32; 256];
        fft.process(&zeros, &zeros).unwrap();
        assert_approx_eq!(fft.bucket_energy(1000.0, 100.0), 0.0, 1.0e-9);
    }

    #[test]
    fn test_parabolic_peak_triplet() {
        // α = 9.91, β = 10.0, γ = 9.73:
        // p = 0.5·(9.91 − 9.73)/(9.91 − 20.0 + 9.73) = −0.25
        let mag = [9.91f32, 10.0, 9.73];
        let p = parabolic_peak(&mag, 1) - 1.0;
        assert_approx_eq!(p, -0.25, 0.01);
    }

    #[test]
    fn test_parabolic_peak_degenerate() {
        // edges and flat triplets return the integer bin
        let mag = [1.0f32, 2.0, 3.0];
        assert_approx_eq!(parabolic_peak(&mag, 0), 0.0);
        assert_approx_eq!(parabolic_peak(&mag, 2), 2.0);

        let flat = [1.0f32, 1.0, 1.0];
        assert_approx_eq!(parabolic_peak(&flat, 1), 1.0);
    }

    #[test]
    fn test_peak_bin_in_range() {
        let mag = [0.0f32, 1.0, 5.0, 2.0, 9.0, 0.0];
        assert_eq!(peak_bin_in(&mag, 0, 3), 2);
        assert_eq!(peak_bin_in(&mag, 0, 5), 4);
        // out-of-bounds requests clamp
        assert_eq!(peak_bin_in(&mag, -10, 100), 4);
    }
}
