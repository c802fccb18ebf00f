use super::spectrum;

/// Configuration for YIN pitch estimation.
#[derive(Debug, Clone)]
pub struct YinConfig {
    /// Lowest detectable frequency in Hz.
    pub fmin_hz: f32,
    /// Highest detectable frequency in Hz.
    pub fmax_hz: f32,
    /// Absolute threshold on the cumulative-mean-normalized difference.
    /// The first lag dipping below this is taken as the period.
    pub threshold: f32,
}

impl Default for YinConfig {
    fn default() -> Self {
        Self {
            fmin_hz: 80.0,
            fmax_hz: 2000.0,
            threshold: 0.15,
        }
    }
}

/// YIN fundamental-frequency estimation (de Cheveigné & Kawahara).
///
/// Computes the squared difference function over candidate lags, normalizes
/// it by its cumulative mean (so short lags aren't unfairly cheap), and
/// takes the first lag whose normalized difference dips below the
/// threshold, refined by parabolic interpolation. Returns None when no lag
/// qualifies — an unvoiced frame.
pub fn yin_pitch(frame: &[f32], sample_rate: u32, config: &YinConfig) -> Option<f64> {
    let n = frame.len();
    let max_lag = n / 2;

    let lag_min = ((sample_rate as f32 / config.fmax_hz).floor() as usize).max(2);
    let lag_max = ((sample_rate as f32 / config.fmin_hz).ceil() as usize).min(max_lag);

    if lag_max <= lag_min {
        return None;
    }

    // Squared difference function d(τ) for τ in 0..max_lag.
    let mut diff = vec![0.0f32; max_lag];
    for (tau, d) in diff.iter_mut().enumerate().skip(1) {
        let mut sum = 0.0f32;
        for i in 0..(n - tau) {
            let delta = frame[i] - frame[i + tau];
            sum += delta * delta;
        }
        *d = sum;
    }

    // Cumulative-mean normalization: d'(τ) = d(τ) · τ / Σ_{1..τ} d(j).
    // d'(0) is defined as 1 so it can never be picked.
    let mut cmndf = vec![1.0f32; max_lag];
    let mut running_sum = 0.0f32;
    for tau in 1..max_lag {
        running_sum += diff[tau];
        cmndf[tau] = if running_sum > 0.0 {
            diff[tau] * tau as f32 / running_sum
        } else {
            1.0
        };
    }

    // First lag under threshold, then walk to its local minimum before
    // refining — the dip can keep falling for a few samples.
    let mut tau = lag_min;
    while tau < lag_max {
        if cmndf[tau] < config.threshold {
            while tau + 1 < lag_max && cmndf[tau + 1] < cmndf[tau] {
                tau += 1;
            }
            let refined = tau as f32 + parabolic_min_offset(&cmndf, tau);
            if refined <= 0.0 {
                return None;
            }
            return Some(sample_rate as f64 / refined as f64);
        }
        tau += 1;
    }

    None
}

/// Parabolic interpolation of a minimum: negate and reuse the peak fit.
fn parabolic_min_offset(values: &[f32], i: usize) -> f32 {
    if i == 0 || i + 1 >= values.len() {
        return 0.0;
    }
    let negated = [-values[i - 1], -values[i], -values[i + 1]];
    spectrum::parabolic_offset(&negated, 1)
}
