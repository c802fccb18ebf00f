use rustfft::{num_complex::Complex, FftPlanner};

use super::windowing;

/// Compute the magnitude spectrum of a frame.
///
/// The frame is Hamming-windowed and zero-padded to the next power of two
/// before the FFT. Returns the first half of the spectrum (bins 0..N/2);
/// the second half is the mirror image for real input.
pub fn magnitude_spectrum(frame: &[f32]) -> Vec<f32> {
    if frame.is_empty() {
        return Vec::new();
    }

    let fft_size = frame.len().next_power_of_two();
    let windowed = windowing::hamming(frame);

    let mut buf: Vec<Complex<f32>> = windowed.iter().map(|&s| Complex::new(s, 0.0)).collect();
    buf.resize(fft_size, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(fft_size).process(&mut buf);

    buf.iter().take(fft_size / 2).map(|c| c.norm()).collect()
}

/// Frequency of a spectrum bin given the FFT size it came from.
pub fn bin_to_hz(bin: f32, fft_size: usize, sample_rate: u32) -> f32 {
    bin * sample_rate as f32 / fft_size as f32
}

/// Spectral centroid in Hz: the power-weighted mean frequency.
/// Voiced singing sits in the few-hundred-Hz to few-kHz range; broadband
/// noise pushes the centroid much higher.
///
/// Weighting by power (magnitude squared) rather than raw magnitude keeps
/// the window-leakage floor from dragging the centroid toward Nyquist; on
/// a pure tone the centroid lands on the tone instead of hundreds of Hz
/// sharp of it.
pub fn spectral_centroid(spectrum: &[f32], fft_size: usize, sample_rate: u32) -> f32 {
    let total: f32 = spectrum.iter().map(|&m| m * m).sum();
    if total <= 0.0 {
        return 0.0;
    }

    let weighted: f32 = spectrum
        .iter()
        .enumerate()
        .map(|(i, &m)| bin_to_hz(i as f32, fft_size, sample_rate) * m * m)
        .sum();

    weighted / total
}

/// Spectral flatness: geometric mean over arithmetic mean of the magnitude
/// spectrum, in [0, 1]. Near 1 for white noise, near 0 for tonal content.
pub fn spectral_flatness(spectrum: &[f32]) -> f32 {
    if spectrum.is_empty() {
        return 0.0;
    }

    // Work in log space for the geometric mean; floor magnitudes so a
    // single zero bin doesn't collapse the product.
    let floor = 1e-10f32;
    let log_sum: f32 = spectrum.iter().map(|&m| m.max(floor).ln()).sum();
    let geometric = (log_sum / spectrum.len() as f32).exp();
    let arithmetic = spectrum.iter().sum::<f32>() / spectrum.len() as f32;

    if arithmetic <= floor {
        return 0.0;
    }

    (geometric / arithmetic).clamp(0.0, 1.0)
}

/// Parabolic interpolation around a peak at index `i`.
///
/// Fits a parabola through (i-1, i, i+1) and returns the fractional offset
/// of the true peak from `i`, in [-0.5, 0.5]. Returns 0 at the edges or
/// when the three points are degenerate.
pub fn parabolic_offset(values: &[f32], i: usize) -> f32 {
    if i == 0 || i + 1 >= values.len() {
        return 0.0;
    }

    let left = values[i - 1];
    let center = values[i];
    let right = values[i + 1];
    let denom = left - 2.0 * center + right;

    if denom.abs() < 1e-12 {
        return 0.0;
    }

    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
}

/// Estimate pitch by picking the strongest magnitude-spectrum peak inside
/// the vocal band, refined with parabolic interpolation across bins.
///
/// Simple and fast, but fooled by a dominant harmonic; the ensemble
/// median in the estimator absorbs those octave errors.
pub fn spectral_peak_pitch(
    frame: &[f32],
    sample_rate: u32,
    fmin_hz: f32,
    fmax_hz: f32,
) -> Option<f64> {
    let spectrum = magnitude_spectrum(frame);
    if spectrum.is_empty() {
        return None;
    }

    let fft_size = frame.len().next_power_of_two();
    let hz_per_bin = sample_rate as f32 / fft_size as f32;
    let lo = ((fmin_hz / hz_per_bin).floor() as usize).max(1);
    let hi = ((fmax_hz / hz_per_bin).ceil() as usize).min(spectrum.len().saturating_sub(1));

    if lo >= hi {
        return None;
    }

    let (peak_bin, peak_mag) = spectrum[lo..hi]
        .iter()
        .enumerate()
        .fold((lo, 0.0f32), |(bi, bm), (i, &m)| {
            if m > bm {
                (lo + i, m)
            } else {
                (bi, bm)
            }
        });

    // A peak indistinguishable from the noise floor is not a pitch.
    let mean_mag = spectrum.iter().sum::<f32>() / spectrum.len() as f32;
    if peak_mag < 1e-6 || peak_mag < 4.0 * mean_mag {
        return None;
    }

    let refined = peak_bin as f32 + parabolic_offset(&spectrum, peak_bin);
    Some(bin_to_hz(refined, fft_size, sample_rate) as f64)
}
