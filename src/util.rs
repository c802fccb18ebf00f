/// Compute RMS of a sample buffer (linear, not dB).
/// Returns 0.0 for empty input.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Compute peak amplitude in dB (relative to full scale).
/// Returns -infinity for all-zero input.
pub fn peak_db(samples: &[f32]) -> f32 {
    let peak = samples.iter().fold(0.0_f32, |max, &s| max.max(s.abs()));

    if peak == 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * peak.log10()
    }
}

/// Compute RMS level in dB (relative to full scale).
/// Returns -infinity for all-zero input.
pub fn rms_db(samples: &[f32]) -> f32 {
    let value = rms(samples);
    if value == 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * value.log10()
    }
}

/// Median of a slice of f64 values. Returns None for empty input.
///
/// Sorts a copy; callers pass short vectors (estimator ensembles,
/// smoothing histories), so the copy is cheap.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(sorted[sorted.len() / 2])
}

/// Zero-crossing rate of a frame: sign changes per sample pair, in [0, 1].
pub fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}
