use crate::util;

/// Configuration for frame preprocessing.
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// RMS below this is treated as silence; the frame is flagged and
    /// returned untouched so callers can skip analysis entirely.
    pub silence_rms_threshold: f32,
    /// High-pass cutoff in Hz. Removes DC offset and room rumble without
    /// touching the lowest sung fundamentals.
    pub highpass_cutoff_hz: f32,
    /// Target RMS after normalization.
    pub target_rms: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            silence_rms_threshold: 0.01,
            highpass_cutoff_hz: 80.0,
            target_rms: 0.3,
        }
    }
}

/// A preprocessed frame: the conditioned samples plus the silence flag.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Filtered and normalized samples, same length as the input.
    pub samples: Vec<f32>,
    /// True when the input RMS was below the silence threshold.
    /// Callers must skip pitch analysis for silent frames.
    pub is_silent: bool,
}

/// Condition a raw sample buffer for pitch analysis.
///
/// Steps, in order:
///   1. Silence check — below the RMS threshold, return the input with
///      `is_silent = true` and do no further work.
///   2. Single-pole high-pass at the configured cutoff:
///      `y[n] = α·(y[n-1] + x[n] − x[n-1])`
///   3. RMS normalization to the target level, clamped to [-1, 1].
///
/// Never fails: a buffer whose RMS is too small to normalize safely is
/// returned unchanged rather than divided toward infinity. Windowing is
/// not applied here; YIN and autocorrelation want the unwindowed signal,
/// and the spectral estimators window their own copies.
pub fn preprocess(samples: &[f32], sample_rate: u32, config: &PreprocessConfig) -> Preprocessed {
    let input_rms = util::rms(samples);

    if input_rms < config.silence_rms_threshold {
        log::trace!("Frame gated as silence at {:.1} dB", util::rms_db(samples));
        return Preprocessed {
            samples: samples.to_vec(),
            is_silent: true,
        };
    }

    let filtered = highpass(samples, sample_rate, config.highpass_cutoff_hz);

    // Re-measure after filtering; the high-pass can only remove energy.
    let filtered_rms = util::rms(&filtered);
    if filtered_rms < 1e-6 {
        return Preprocessed {
            samples: filtered,
            is_silent: false,
        };
    }

    let gain = config.target_rms / filtered_rms;
    let normalized = filtered
        .iter()
        .map(|&s| (s * gain).clamp(-1.0, 1.0))
        .collect();

    Preprocessed {
        samples: normalized,
        is_silent: false,
    }
}

/// Single-pole IIR high-pass filter.
///
/// α = RC / (RC + dt) with RC = 1 / (2π·cutoff). At 80 Hz and 48 kHz,
/// α ≈ 0.990 — a gentle slope that kills DC and rumble.
fn highpass(samples: &[f32], sample_rate: u32, cutoff_hz: f32) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let dt = 1.0 / sample_rate as f32;
    let alpha = rc / (rc + dt);

    let mut out = Vec::with_capacity(samples.len());
    let mut prev_y = 0.0f32;
    let mut prev_x = samples[0];
    out.push(0.0);

    for &x in &samples[1..] {
        let y = alpha * (prev_y + x - prev_x);
        out.push(y);
        prev_y = y;
        prev_x = x;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine_wave(freq_hz: f32, sample_rate: u32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
        let num_samples = (sample_rate as f32 * duration_secs) as usize;
        (0..num_samples)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                amplitude * (2.0 * PI * freq_hz * t).sin()
            })
            .collect()
    }

    #[test]
    fn silence_is_flagged_and_untouched() {
        let samples = vec![0.001; 2048];
        let result = preprocess(&samples, 48000, &PreprocessConfig::default());
        assert!(result.is_silent);
        assert_eq!(result.samples, samples);
    }

    #[test]
    fn all_zero_buffer_never_panics() {
        let samples = vec![0.0; 4096];
        let result = preprocess(&samples, 48000, &PreprocessConfig::default());
        assert!(result.is_silent);
    }

    #[test]
    fn normalization_hits_target_rms() {
        let samples = sine_wave(220.0, 48000, 0.1, 0.1);
        let config = PreprocessConfig::default();
        let result = preprocess(&samples, 48000, &config);

        assert!(!result.is_silent);
        let out_rms = crate::util::rms(&result.samples);
        assert!(
            (out_rms - config.target_rms).abs() < 0.02,
            "Expected RMS near {}, got {out_rms:.3}",
            config.target_rms
        );
    }

    #[test]
    fn preprocessing_is_idempotent() {
        // A second pass over already-normalized audio should barely move
        // the RMS — normalization converges.
        let samples = sine_wave(220.0, 48000, 0.1, 0.5);
        let config = PreprocessConfig::default();

        let once = preprocess(&samples, 48000, &config);
        let twice = preprocess(&once.samples, 48000, &config);

        let rms_once = crate::util::rms(&once.samples);
        let rms_twice = crate::util::rms(&twice.samples);
        assert!(
            (rms_once - rms_twice).abs() < 0.01,
            "RMS moved from {rms_once:.4} to {rms_twice:.4} on second pass"
        );
    }

    #[test]
    fn highpass_removes_dc_offset() {
        // Pure DC at 0.5: after the high-pass the mean should be ~0
        let samples = vec![0.5; 4800];
        let filtered = highpass(&samples, 48000, 80.0);
        let tail = &filtered[2400..];
        let mean: f32 = tail.iter().sum::<f32>() / tail.len() as f32;
        assert!(mean.abs() < 0.01, "Residual DC: {mean:.4}");
    }

    #[test]
    fn highpass_passes_vocal_band() {
        // A 220 Hz tone is well above the 80 Hz cutoff and should keep
        // most of its energy.
        let samples = sine_wave(220.0, 48000, 0.2, 0.5);
        let filtered = highpass(&samples, 48000, 80.0);
        let in_rms = crate::util::rms(&samples[4800..]);
        let out_rms = crate::util::rms(&filtered[4800..]);
        assert!(
            out_rms > 0.8 * in_rms,
            "220 Hz attenuated too much: {in_rms:.3} -> {out_rms:.3}"
        );
    }

    #[test]
    fn output_stays_in_range() {
        // Loud, clipped-ish input must not overshoot [-1, 1] after gain
        let samples = sine_wave(220.0, 48000, 0.1, 0.05);
        let result = preprocess(&samples, 48000, &PreprocessConfig::default());
        assert!(result.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn empty_buffer_is_silent() {
        let result = preprocess(&[], 48000, &PreprocessConfig::default());
        assert!(result.is_silent);
        assert!(result.samples.is_empty());
    }
}
