//! Pitch-estimate and pitch-contour types shared across the pipeline.

use serde::{Deserialize, Serialize};

/// Which algorithm (or fusion of algorithms) produced an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PitchMethod {
    Yin,
    Autocorr,
    SpectralPeak,
    Cepstrum,
    RemoteCrepe,
    RemoteSpice,
    Fused,
    /// Local estimator standing in for failed or timed-out remote engines.
    LocalFallback,
}

/// A single pitch estimate for one analysis frame.
///
/// `frequency_hz == 0.0` means the frame was unvoiced, and only then;
/// voiced estimates are strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchEstimate {
    pub frequency_hz: f64,
    /// Estimator confidence in [0, 1].
    pub confidence: f64,
    pub method: PitchMethod,
    /// Frame start time in seconds from the start of the session.
    pub timestamp_sec: f64,
}

impl PitchEstimate {
    /// An unvoiced estimate at a given timestamp.
    pub fn unvoiced(method: PitchMethod, timestamp_sec: f64) -> Self {
        Self {
            frequency_hz: 0.0,
            confidence: 0.0,
            method,
            timestamp_sec,
        }
    }

    pub fn is_voiced(&self) -> bool {
        self.frequency_hz > 0.0
    }
}

/// An ordered pitch contour: estimates at strictly increasing timestamps.
///
/// Built incrementally during a singing session, then handed to the
/// aligner. `push` enforces the ordering invariant so a finished contour
/// never needs re-sorting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PitchContour {
    estimates: Vec<PitchEstimate>,
}

impl PitchContour {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an estimate. Estimates arriving at or before the last
    /// timestamp are dropped rather than corrupting the ordering; the
    /// drop is logged since it indicates a misbehaving producer.
    pub fn push(&mut self, estimate: PitchEstimate) {
        if let Some(last) = self.estimates.last() {
            if estimate.timestamp_sec <= last.timestamp_sec {
                log::warn!(
                    "Dropping out-of-order pitch estimate at {:.4}s (last was {:.4}s)",
                    estimate.timestamp_sec,
                    last.timestamp_sec
                );
                return;
            }
        }
        self.estimates.push(estimate);
    }

    pub fn estimates(&self) -> &[PitchEstimate] {
        &self.estimates
    }

    pub fn len(&self) -> usize {
        self.estimates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimates.is_empty()
    }

    /// Frequencies only, 0.0 for unvoiced frames — the shape the aligner
    /// consumes.
    pub fn frequencies(&self) -> Vec<f64> {
        self.estimates.iter().map(|e| e.frequency_hz).collect()
    }

    /// Fraction of frames that are voiced.
    pub fn voiced_fraction(&self) -> f64 {
        if self.estimates.is_empty() {
            return 0.0;
        }
        let voiced = self.estimates.iter().filter(|e| e.is_voiced()).count();
        voiced as f64 / self.estimates.len() as f64
    }

    /// Summary statistics over the voiced frames, or None if none exist.
    pub fn statistics(&self) -> Option<ContourStatistics> {
        let voiced: Vec<f64> = self
            .estimates
            .iter()
            .filter(|e| e.is_voiced())
            .map(|e| e.frequency_hz)
            .collect();

        if voiced.is_empty() {
            return None;
        }

        let mean = voiced.iter().sum::<f64>() / voiced.len() as f64;
        let median = crate::util::median(&voiced).unwrap_or(mean);
        let min = voiced.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = voiced.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        Some(ContourStatistics {
            mean_hz: mean,
            median_hz: median,
            min_hz: min,
            max_hz: max,
            voiced_frames: voiced.len(),
            total_frames: self.estimates.len(),
        })
    }
}

/// Voiced-frame statistics for a contour, mirroring what the remote
/// engines report alongside their frame arrays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContourStatistics {
    pub mean_hz: f64,
    pub median_hz: f64,
    pub min_hz: f64,
    pub max_hz: f64,
    pub voiced_frames: usize,
    pub total_frames: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voiced(freq: f64, t: f64) -> PitchEstimate {
        PitchEstimate {
            frequency_hz: freq,
            confidence: 0.9,
            method: PitchMethod::Fused,
            timestamp_sec: t,
        }
    }

    #[test]
    fn push_keeps_timestamps_strictly_increasing() {
        let mut contour = PitchContour::new();
        contour.push(voiced(220.0, 0.00));
        contour.push(voiced(221.0, 0.01));
        contour.push(voiced(222.0, 0.01)); // duplicate timestamp, dropped
        contour.push(voiced(223.0, 0.005)); // regression, dropped
        contour.push(voiced(224.0, 0.02));

        assert_eq!(contour.len(), 3);
        let times: Vec<f64> = contour
            .estimates()
            .iter()
            .map(|e| e.timestamp_sec)
            .collect();
        assert!(times.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn unvoiced_constructor_holds_invariant() {
        let e = PitchEstimate::unvoiced(PitchMethod::Yin, 1.0);
        assert_eq!(e.frequency_hz, 0.0);
        assert_eq!(e.confidence, 0.0);
        assert!(!e.is_voiced());
    }

    #[test]
    fn voiced_fraction_counts_nonzero_frequencies() {
        let mut contour = PitchContour::new();
        contour.push(voiced(220.0, 0.0));
        contour.push(PitchEstimate::unvoiced(PitchMethod::Fused, 0.01));
        contour.push(voiced(220.0, 0.02));
        contour.push(voiced(220.0, 0.03));

        assert!((contour.voiced_fraction() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn statistics_over_voiced_frames_only() {
        let mut contour = PitchContour::new();
        contour.push(voiced(200.0, 0.0));
        contour.push(PitchEstimate::unvoiced(PitchMethod::Fused, 0.01));
        contour.push(voiced(300.0, 0.02));

        let stats = contour.statistics().unwrap();
        assert_eq!(stats.voiced_frames, 2);
        assert_eq!(stats.total_frames, 3);
        assert!((stats.mean_hz - 250.0).abs() < 1e-9);
        assert_eq!(stats.min_hz, 200.0);
        assert_eq!(stats.max_hz, 300.0);
    }

    #[test]
    fn empty_contour_has_no_statistics() {
        let contour = PitchContour::new();
        assert!(contour.statistics().is_none());
        assert_eq!(contour.voiced_fraction(), 0.0);
    }
}
