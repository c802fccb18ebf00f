use super::spectrum;

/// Configuration for normalized-autocorrelation pitch estimation.
#[derive(Debug, Clone)]
pub struct AutocorrConfig {
    /// Lowest candidate frequency in Hz.
    pub fmin_hz: f32,
    /// Highest candidate frequency in Hz.
    pub fmax_hz: f32,
    /// Minimum normalized correlation for a lag to count as periodic.
    pub min_correlation: f32,
}

impl Default for AutocorrConfig {
    fn default() -> Self {
        Self {
            fmin_hz: 80.0,
            fmax_hz: 2000.0,
            min_correlation: 0.3,
        }
    }
}

/// Normalized autocorrelation pitch estimation.
///
/// Correlates the frame with lagged copies of itself over the lag range
/// corresponding to the configured frequency band, normalizing each lag's
/// product by the energy of the two segments involved, so the correlation
/// is a true cosine similarity in [-1, 1] regardless of signal level. The
/// best lag above the correlation threshold wins, refined with parabolic
/// interpolation.
pub fn autocorr_pitch(frame: &[f32], sample_rate: u32, config: &AutocorrConfig) -> Option<f64> {
    let n = frame.len();

    let lag_min = ((sample_rate as f32 / config.fmax_hz).floor() as usize).max(2);
    let lag_max = ((sample_rate as f32 / config.fmin_hz).ceil() as usize).min(n / 2);

    if lag_max <= lag_min {
        return None;
    }

    let mut correlations = vec![0.0f32; lag_max + 1];
    let mut best_lag = 0usize;
    let mut best_corr = 0.0f32;

    for lag in lag_min..=lag_max {
        let len = n - lag;
        let mut product = 0.0f32;
        let mut energy_a = 0.0f32;
        let mut energy_b = 0.0f32;

        for i in 0..len {
            let a = frame[i];
            let b = frame[i + lag];
            product += a * b;
            energy_a += a * a;
            energy_b += b * b;
        }

        let denom = (energy_a * energy_b).sqrt();
        if denom < 1e-12 {
            continue;
        }

        let corr = product / denom;
        correlations[lag] = corr;

        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }

    if best_lag == 0 || best_corr < config.min_correlation {
        return None;
    }

    let refined = best_lag as f32 + spectrum::parabolic_offset(&correlations, best_lag);
    if refined <= 0.0 {
        return None;
    }

    Some(sample_rate as f64 / refined as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine_wave(freq_hz: f32, sample_rate: u32, num_samples: usize) -> Vec<f32> {
        (0..num_samples)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                0.5 * (2.0 * PI * freq_hz * t).sin()
            })
            .collect()
    }

    #[test]
    fn detects_220hz() {
        let frame = sine_wave(220.0, 48000, 2048);
        let pitch = autocorr_pitch(&frame, 48000, &AutocorrConfig::default())
            .expect("Autocorrelation should lock onto a pure tone");
        assert!(
            (pitch - 220.0).abs() < 2.0,
            "Expected ~220 Hz, got {pitch:.2}"
        );
    }

    #[test]
    fn amplitude_invariant() {
        // Normalization should make a quiet tone correlate as well as a
        // loud one.
        let loud = sine_wave(330.0, 48000, 2048);
        let quiet: Vec<f32> = loud.iter().map(|&s| s * 0.05).collect();

        let config = AutocorrConfig::default();
        let p1 = autocorr_pitch(&loud, 48000, &config).unwrap();
        let p2 = autocorr_pitch(&quiet, 48000, &config).unwrap();
        assert!((p1 - p2).abs() < 1.0, "Got {p1:.2} vs {p2:.2}");
    }

    #[test]
    fn silence_is_unvoiced() {
        let frame = vec![0.0; 2048];
        assert_eq!(autocorr_pitch(&frame, 48000, &AutocorrConfig::default()), None);
    }

    #[test]
    fn out_of_band_frequency_rejected() {
        // 40 Hz is below the 80 Hz floor; its true lag is outside the
        // search range, so nothing should correlate strongly.
        let frame = sine_wave(40.0, 48000, 2048);
        let result = autocorr_pitch(&frame, 48000, &AutocorrConfig::default());
        if let Some(pitch) = result {
            assert!(
                pitch >= 75.0,
                "Any reported pitch must be inside the band, got {pitch:.1}"
            );
        }
    }
}
