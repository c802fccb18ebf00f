use rustfft::{num_complex::Complex, FftPlanner};

use super::windowing;

/// Configuration for cepstral pitch estimation.
#[derive(Debug, Clone)]
pub struct CepstrumConfig {
    /// Lowest candidate frequency in Hz (highest quefrency).
    pub fmin_hz: f32,
    /// Highest candidate frequency in Hz (lowest quefrency).
    pub fmax_hz: f32,
    /// Minimum ratio of the quefrency peak to the mean cepstrum level in
    /// the search band; below this the frame is called unvoiced.
    pub min_peak_ratio: f32,
}

impl Default for CepstrumConfig {
    fn default() -> Self {
        Self {
            fmin_hz: 80.0,
            fmax_hz: 1000.0,
            min_peak_ratio: 3.0,
        }
    }
}

/// Cepstral pitch estimation.
///
/// The cepstrum is the inverse FFT of the log-magnitude spectrum. A
/// periodic voice excitation shows up as ripple across the harmonics in
/// the log spectrum, which the inverse transform collects into a single
/// peak at the quefrency (lag) of the fundamental period. Slower to fool
/// with strong formants than raw spectral peak picking.
pub fn cepstral_pitch(frame: &[f32], sample_rate: u32, config: &CepstrumConfig) -> Option<f64> {
    if frame.is_empty() {
        return None;
    }

    let fft_size = frame.len().next_power_of_two();
    let windowed = windowing::hann(frame);

    let mut buf: Vec<Complex<f32>> = windowed.iter().map(|&s| Complex::new(s, 0.0)).collect();
    buf.resize(fft_size, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(fft_size).process(&mut buf);

    // Log magnitude, floored to keep log finite on empty bins.
    for c in buf.iter_mut() {
        *c = Complex::new(c.norm().max(1e-10).ln(), 0.0);
    }

    planner.plan_fft_inverse(fft_size).process(&mut buf);

    // Real cepstrum; quefrency axis is in samples of period.
    let cepstrum: Vec<f32> = buf.iter().map(|c| c.re / fft_size as f32).collect();

    let q_min = ((sample_rate as f32 / config.fmax_hz).floor() as usize).max(2);
    let q_max = ((sample_rate as f32 / config.fmin_hz).ceil() as usize).min(fft_size / 2);

    if q_max <= q_min {
        return None;
    }

    let band = &cepstrum[q_min..q_max];
    let (peak_idx, peak_val) = band
        .iter()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        });

    // Peak must stand clear of the band's average level, and clear of the
    // numerical noise a flat (silent) log spectrum leaves behind.
    let mean_abs: f32 = band.iter().map(|v| v.abs()).sum::<f32>() / band.len() as f32;
    if peak_val < 0.05 || mean_abs < 1e-12 || peak_val / mean_abs < config.min_peak_ratio {
        return None;
    }

    let quefrency = (q_min + peak_idx) as f64;
    Some(sample_rate as f64 / quefrency)
}
