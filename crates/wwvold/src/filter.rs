//! # Filter primitives
//!
//! Three small building blocks shared by the detectors:
//!
//! * [`FilterCoeff`] — multiply-accumulate coefficients for FIR filtering
//!   and matched-filter correlation. Coefficients are stored *reversed* so
//!   the accumulate runs forward over a sample history slice; the history
//!   may arrive split in two parts, as it does when it lives in a circular
//!   buffer.
//! * [`Biquad`] / [`BiquadCascade`] — second-order IIR sections in
//!   direct-form II transposed, with Butterworth lowpass/highpass design.
//!   The channel filter bank builds its 4th-order paths from these.
//! * [`MovingSum`] — an exact sliding-window accumulator. The minute-marker
//!   and BCD frequency detectors integrate about a second of per-frame
//!   energies through one of these.

use nalgebra::base::Scalar;
use nalgebra::DVector;
use num_traits::Zero;

/// FIR / matched-filter coefficients
///
/// Stores an impulse response (or correlation template) with the
/// coefficients reversed internally, which lets the multiply-accumulate
/// walk both slices front to back.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterCoeff<T>(DVector<T>)
where
    T: Copy + Scalar + Zero;

impl<T> FilterCoeff<T>
where
    T: Copy + Scalar + Zero,
{
    /// Create from an impulse response
    ///
    /// `h[0]` is the coefficient applied to the *oldest* sample of the
    /// history window.
    pub fn from_slice<S>(h: S) -> Self
    where
        S: AsRef<[T]>,
    {
        let inp = h.as_ref();
        FilterCoeff(DVector::from_iterator(
            inp.len(),
            inp.iter().rev().copied(),
        ))
    }

    /// Number of coefficients
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no coefficients
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Multiply-accumulate against a contiguous sample history
    ///
    /// `history[history.len() - 1]` must be the most recent sample. If the
    /// history is shorter than the coefficients, the missing (oldest)
    /// samples are treated as zero.
    pub fn filter<I, In, Out>(&self, history: I) -> Out
    where
        I: AsRef<[In]>,
        In: Copy + Scalar + std::ops::Mul<T, Output = Out>,
        Out: Copy + Zero + std::ops::AddAssign,
    {
        self.filter_parts(&[], history.as_ref())
    }

    /// Multiply-accumulate against a history split in two parts
    ///
    /// The logical history is `older` followed by `newer`, with the last
    /// element of `newer` being the most recent sample. This is the shape
    /// a circular buffer hands out when the window wraps its end.
    pub fn filter_parts<In, Out>(&self, older: &[In], newer: &[In]) -> Out
    where
        In: Copy + Scalar + std::ops::Mul<T, Output = Out>,
        Out: Copy + Zero + std::ops::AddAssign,
    {
        let coeff = self.0.as_slice();
        let total = older.len() + newer.len();
        let take = usize::min(total, coeff.len());

        // align the *end* of the history with the end of the coefficients
        let coeff = &coeff[coeff.len() - take..];
        let skip = total - take;

        let mut out = Out::zero();
        for (co, hi) in coeff
            .iter()
            .zip(older.iter().chain(newer.iter()).skip(skip))
        {
            out += *hi * *co;
        }
        out
    }
}

impl<T> AsRef<[T]> for FilterCoeff<T>
where
    T: Copy + Scalar + Zero,
{
    /// Coefficients in internal (reversed) order
    #[inline]
    fn as_ref(&self) -> &[T] {
        self.0.as_slice()
    }
}

/// One second-order IIR section, direct-form II transposed
///
/// `y = b0·x + s1; s1 = b1·x − a1·y + s2; s2 = b2·x − a2·y` with the
/// denominator normalized to `a0 = 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    s1: f32,
    s2: f32,
}

impl Biquad {
    /// Create from normalized coefficients
    pub fn new(b0: f32, b1: f32, b2: f32, a1: f32, a2: f32) -> Self {
        Self {
            b0,
            b1,
            b2,
            a1,
            a2,
            s1: 0.0,
            s2: 0.0,
        }
    }

    /// Design a 2nd-order Butterworth-style lowpass section
    ///
    /// `q` selects the section's pole pairing; 1/√2 gives a plain
    /// 2nd-order Butterworth response.
    pub fn lowpass(cutoff_hz: f32, sample_rate: f32, q: f32) -> Self {
        let w = 2.0 * std::f32::consts::PI * cutoff_hz / sample_rate;
        let (sin_w, cos_w) = w.sin_cos();
        let alpha = sin_w / (2.0 * q);

        let a0 = 1.0 + alpha;
        Self::new(
            (1.0 - cos_w) / (2.0 * a0),
            (1.0 - cos_w) / a0,
            (1.0 - cos_w) / (2.0 * a0),
            (-2.0 * cos_w) / a0,
            (1.0 - alpha) / a0,
        )
    }

    /// Design a 2nd-order Butterworth-style highpass section
    pub fn highpass(cutoff_hz: f32, sample_rate: f32, q: f32) -> Self {
        let w = 2.0 * std::f32::consts::PI * cutoff_hz / sample_rate;
        let (sin_w, cos_w) = w.sin_cos();
        let alpha = sin_w / (2.0 * q);

        let a0 = 1.0 + alpha;
        Self::new(
            (1.0 + cos_w) / (2.0 * a0),
            -(1.0 + cos_w) / a0,
            (1.0 + cos_w) / (2.0 * a0),
            (-2.0 * cos_w) / a0,
            (1.0 - alpha) / a0,
        )
    }

    /// Filter one sample
    #[inline]
    pub fn filter(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.s1;
        self.s1 = self.b1 * x - self.a1 * y + self.s2;
        self.s2 = self.b2 * x - self.a2 * y;
        y
    }

    /// Reset to zero initial conditions
    pub fn reset(&mut self) {
        self.s1 = 0.0;
        self.s2 = 0.0;
    }
}

/// Cascade of biquad sections applied in order
#[derive(Clone, Debug, PartialEq)]
pub struct BiquadCascade {
    sections: Vec<Biquad>,
}

impl BiquadCascade {
    /// Build a cascade from individual sections
    pub fn new(sections: Vec<Biquad>) -> Self {
        Self { sections }
    }

    /// 4th-order Butterworth lowpass as two paired sections
    ///
    /// The standard 4th-order Butterworth pole pairing: section Qs of
    /// 0.5412 and 1.3066.
    pub fn butterworth_lowpass_4th(cutoff_hz: f32, sample_rate: f32) -> Self {
        Self::new(vec![
            Biquad::lowpass(cutoff_hz, sample_rate, 0.541_196_1),
            Biquad::lowpass(cutoff_hz, sample_rate, 1.306_563_0),
        ])
    }

    /// Filter one sample through every section
    #[inline]
    pub fn filter(&mut self, x: f32) -> f32 {
        self.sections.iter_mut().fold(x, |sa, sec| sec.filter(sa))
    }

    /// Reset every section to zero initial conditions
    pub fn reset(&mut self) {
        for sec in self.sections.iter_mut() {
            sec.reset();
        }
    }
}

/// Exact sliding-window sum
///
/// Keeps the last `len` pushed values in a ring and maintains their sum
/// by adding each new value and subtracting the one it evicts. Until the
/// ring has filled, nothing is evicted, so the sum always equals the sum
/// of everything currently buffered.
#[derive(Clone, Debug)]
pub struct MovingSum {
    ring: Vec<f32>,
    idx: usize,
    count: usize,
    sum: f32,
}

impl MovingSum {
    /// Create with window length `len > 0`
    pub fn new(len: usize) -> Self {
        assert!(len > 0);
        Self {
            ring: vec![0.0; len],
            idx: 0,
            count: 0,
            sum: 0.0,
        }
    }

    /// Push a value, returning the updated window sum
    #[inline]
    pub fn push(&mut self, value: f32) -> f32 {
        if self.count >= self.ring.len() {
            self.sum -= self.ring[self.idx];
        } else {
            self.count += 1;
        }
        self.ring[self.idx] = value;
        self.sum += value;
        self.idx = (self.idx + 1) % self.ring.len();
        self.sum
    }

    /// Current window sum
    #[inline]
    pub fn sum(&self) -> f32 {
        self.sum
    }

    /// Window length
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// True if nothing has been pushed yet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// True once the window has seen `len` values
    #[inline]
    pub fn is_full(&self) -> bool {
        self.count >= self.ring.len()
    }

    /// Reset to zero initial conditions
    pub fn reset(&mut self) {
        self.ring.iter_mut().for_each(|v| *v = 0.0);
        self.idx = 0;
        self.count = 0;
        self.sum = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_approx_eq::assert_approx_eq;
    use num_complex::Complex;

    #[test]
    fn test_filter_coeff_identity() {
        let ident = FilterCoeff::from_slice([0.0f32, 0.0, 1.0]);
        let out: f32 = ident.filter([5.0f32, 6.0, 7.0]);
        assert_approx_eq!(out, 7.0);
    }

    #[test]
    fn test_filter_coeff_short_history() {
        // missing old samples are zero
        let coeff = FilterCoeff::from_slice([1.0f32, 1.0, 1.0, 1.0]);
        let out: f32 = coeff.filter([2.0f32, 3.0]);
        assert_approx_eq!(out, 5.0);
    }

    #[test]
    fn test_filter_parts_matches_contiguous() {
        let coeff = FilterCoeff::from_slice([1.0f32, -2.0, 3.0, 0.5]);
        let history = [4.0f32, -1.0, 2.0, 8.0];

        let whole: f32 = coeff.filter(history);
        let split: f32 = coeff.filter_parts(&history[..1], &history[1..]);
        let split2: f32 = coeff.filter_parts(&history[..3], &history[3..]);

        assert_approx_eq!(whole, split);
        assert_approx_eq!(whole, split2);
    }

    #[test]
    fn test_filter_coeff_complex_correlation() {
        // correlating a tone against its own conjugate template gives
        // a purely real sum equal to the sample count
        let n = 16usize;
        let w = 2.0 * std::f32::consts::PI * 3.0 / n as f32;
        let tone: Vec<Complex<f32>> =
            (0..n).map(|k| Complex::from_polar(1.0, w * k as f32)).collect();
        let template: Vec<Complex<f32>> = tone.iter().map(|c| c.conj()).collect();

        let coeff = FilterCoeff::from_slice(&template);
        let out: Complex<f32> = coeff.filter(&tone);
        assert_approx_eq!(out.re, n as f32, 1.0e-3);
        assert_approx_eq!(out.im, 0.0, 1.0e-3);
    }

    #[test]
    fn test_biquad_lowpass_dc_gain() {
        let mut lp = Biquad::lowpass(1000.0, 50_000.0, std::f32::consts::FRAC_1_SQRT_2);
        let mut y = 0.0;
        for _ in 0..2000 {
            y = lp.filter(1.0);
        }
        assert_approx_eq!(y, 1.0, 1.0e-3);

        lp.reset();
        assert!(lp.filter(0.0).abs() < 1.0e-9);
    }

    #[test]
    fn test_biquad_highpass_blocks_dc() {
        let mut hp = Biquad::highpass(800.0, 50_000.0, std::f32::consts::FRAC_1_SQRT_2);
        let mut y = 1.0;
        for _ in 0..5000 {
            y = hp.filter(1.0);
        }
        assert_approx_eq!(y, 0.0, 1.0e-3);
    }

    #[test]
    fn test_cascade_lowpass_attenuates_high_freq() {
        // 1 kHz into a 150 Hz 4th-order lowpass should essentially vanish
        let mut lp = BiquadCascade::butterworth_lowpass_4th(150.0, 50_000.0);
        let w = 2.0 * std::f32::consts::PI * 1000.0 / 50_000.0;

        let mut peak = 0.0f32;
        for n in 0..50_000 {
            let y = lp.filter((w * n as f32).sin());
            if n > 25_000 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak < 0.01, "stopband peak {}", peak);
    }

    #[test]
    fn test_moving_sum_exact() {
        // insert W zeros then W ones: sum must be exactly W
        const W: usize = 64;
        let mut acc = MovingSum::new(W);
        for _ in 0..W {
            acc.push(0.0);
        }
        assert!(acc.is_full());
        for _ in 0..W {
            acc.push(1.0);
        }
        assert_eq!(acc.sum(), W as f32);
    }

    #[test]
    fn test_moving_sum_partial_and_reset() {
        let mut acc = MovingSum::new(4);
        assert!(acc.is_empty());
        acc.push(1.0);
        acc.push(2.0);
        assert_approx_eq!(acc.sum(), 3.0);
        assert!(!acc.is_full());

        acc.push(3.0);
        acc.push(4.0);
        acc.push(5.0); // evicts the 1.0
        assert_approx_eq!(acc.sum(), 14.0);

        acc.reset();
        assert_approx_eq!(acc.sum(), 0.0);
        assert!(acc.is_empty());
    }
}
