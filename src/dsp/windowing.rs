use std::f32::consts::PI;

/// Apply a Hann window to a slice of samples, returning a new Vec.
///
/// The Hann window smoothly tapers a frame of audio to zero at both edges,
/// preventing spectral leakage — the artifacts you'd get from abruptly
/// chopping a signal in the middle of a cycle.
///
/// Formula: w(n) = 0.5 * (1 - cos(2π * n / (N - 1)))
pub fn hann(samples: &[f32]) -> Vec<f32> {
    let n = samples.len();
    if n <= 1 {
        return samples.to_vec();
    }

    let scale = 2.0 * PI / (n - 1) as f32;

    samples
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let w = 0.5 * (1.0 - (scale * i as f32).cos());
            s * w
        })
        .collect()
}

/// Apply a Hamming window: like Hann but with a small pedestal at the
/// edges (w = 0.08 instead of 0), trading side-lobe height for a narrower
/// main lobe. The spectral-peak estimator prefers it for that reason.
///
/// Formula: w(n) = 0.54 - 0.46 * cos(2π * n / (N - 1))
pub fn hamming(samples: &[f32]) -> Vec<f32> {
    let n = samples.len();
    if n <= 1 {
        return samples.to_vec();
    }

    let scale = 2.0 * PI / (n - 1) as f32;

    samples
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let w = 0.54 - 0.46 * (scale * i as f32).cos();
            s * w
        })
        .collect()
}
