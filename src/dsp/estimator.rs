use std::collections::VecDeque;

use crate::contour::{PitchEstimate, PitchMethod};
use crate::note;
use crate::util;

use super::autocorr::{autocorr_pitch, AutocorrConfig};
use super::cepstrum::{cepstral_pitch, CepstrumConfig};
use super::preprocess::{preprocess, PreprocessConfig};
use super::spectrum::spectral_peak_pitch;
use super::yin::{yin_pitch, YinConfig};

/// Configuration for the multi-algorithm local pitch estimator.
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    pub yin: YinConfig,
    pub autocorr: AutocorrConfig,
    pub cepstrum: CepstrumConfig,
    pub preprocess: PreprocessConfig,
    /// Vocal band for the spectral-peak estimator.
    pub spectral_fmin_hz: f32,
    pub spectral_fmax_hz: f32,
    /// Run the cepstral estimator as a fourth ensemble member. It needs a
    /// larger window to resolve low fundamentals, so it's optional for
    /// small frames.
    pub enable_cepstrum: bool,
    /// Rolling-history length for temporal median smoothing.
    pub smoothing_frames: usize,
    /// Snap to the nearest equal-tempered note when within this many
    /// cents. Zero disables snapping.
    pub snap_threshold_cents: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            yin: YinConfig::default(),
            autocorr: AutocorrConfig::default(),
            cepstrum: CepstrumConfig::default(),
            preprocess: PreprocessConfig::default(),
            spectral_fmin_hz: 80.0,
            spectral_fmax_hz: 2000.0,
            enable_cepstrum: false,
            smoothing_frames: 5,
            snap_threshold_cents: 50.0,
        }
    }
}

/// A frame estimate plus the detail the fusion step worked from.
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    pub estimate: PitchEstimate,
    /// Per-algorithm raw frequencies that went into the ensemble
    /// (unvoiced members excluded).
    pub ensemble: Vec<(PitchMethod, f64)>,
    /// Nearest-note name when voiced, e.g. "A3".
    pub note_name: Option<String>,
    /// Signed cents deviation from the nearest note, before any snap.
    pub cents_off_note: Option<f64>,
}

/// Multi-algorithm pitch estimator with temporal smoothing.
///
/// Per frame it preprocesses, runs YIN, normalized autocorrelation, and
/// spectral-peak picking (plus the cepstral estimator when enabled), and
/// median-fuses the voiced results. Confidence comes from ensemble
/// agreement: `exp(-variance/100)`, so tight agreement scores near 1 and
/// scattered estimates decay toward 0. The emitted frequency is the median
/// of a short rolling history, which rejects single-frame octave errors.
///
/// One estimator per session: the smoothing history is stream state.
pub struct PitchEstimator {
    config: EstimatorConfig,
    history: VecDeque<f64>,
    frames_processed: u64,
}

impl PitchEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
            frames_processed: 0,
        }
    }

    /// Estimate the pitch of one frame.
    ///
    /// Never fails: silent or indeterminate frames produce an unvoiced
    /// estimate with zero confidence.
    pub fn estimate(
        &mut self,
        samples: &[f32],
        sample_rate: u32,
        timestamp_sec: f64,
    ) -> FrameAnalysis {
        self.frames_processed += 1;

        let pre = preprocess(samples, sample_rate, &self.config.preprocess);
        if pre.is_silent {
            self.history.push_back(0.0);
            self.trim_history();
            return FrameAnalysis {
                estimate: PitchEstimate::unvoiced(PitchMethod::Fused, timestamp_sec),
                ensemble: Vec::new(),
                note_name: None,
                cents_off_note: None,
            };
        }

        let frame = &pre.samples;
        let mut ensemble: Vec<(PitchMethod, f64)> = Vec::with_capacity(4);

        if let Some(f) = yin_pitch(frame, sample_rate, &self.config.yin) {
            ensemble.push((PitchMethod::Yin, f));
        }
        if let Some(f) = autocorr_pitch(frame, sample_rate, &self.config.autocorr) {
            ensemble.push((PitchMethod::Autocorr, f));
        }
        if let Some(f) = spectral_peak_pitch(
            frame,
            sample_rate,
            self.config.spectral_fmin_hz,
            self.config.spectral_fmax_hz,
        ) {
            ensemble.push((PitchMethod::SpectralPeak, f));
        }
        if self.config.enable_cepstrum {
            if let Some(f) = cepstral_pitch(frame, sample_rate, &self.config.cepstrum) {
                ensemble.push((PitchMethod::Cepstrum, f));
            }
        }

        if ensemble.is_empty() {
            self.history.push_back(0.0);
            self.trim_history();
            return FrameAnalysis {
                estimate: PitchEstimate::unvoiced(PitchMethod::Fused, timestamp_sec),
                ensemble,
                note_name: None,
                cents_off_note: None,
            };
        }

        let freqs: Vec<f64> = ensemble.iter().map(|(_, f)| *f).collect();
        let fused = util::median(&freqs).unwrap_or(0.0);
        let confidence = agreement_confidence(&freqs);

        // Temporal smoothing: median of the recent history including this
        // frame. Unvoiced history entries (0.0) pull the median down only
        // when the majority of recent frames were unvoiced.
        self.history.push_back(fused);
        self.trim_history();
        let history: Vec<f64> = self.history.iter().copied().collect();
        let smoothed = util::median(&history).unwrap_or(fused);

        if smoothed <= 0.0 {
            return FrameAnalysis {
                estimate: PitchEstimate::unvoiced(PitchMethod::Fused, timestamp_sec),
                ensemble,
                note_name: None,
                cents_off_note: None,
            };
        }

        // Note snap: report the deviation either way, snap only when close
        // enough.
        let (frequency, note_name, cents_off) = match note::nearest_note(smoothed) {
            Some(n) => {
                let snapped = if self.config.snap_threshold_cents > 0.0
                    && n.cents_offset.abs() < self.config.snap_threshold_cents
                {
                    n.frequency_hz
                } else {
                    smoothed
                };
                (snapped, Some(n.name), Some(n.cents_offset))
            }
            None => (smoothed, None, None),
        };

        FrameAnalysis {
            estimate: PitchEstimate {
                frequency_hz: frequency,
                confidence,
                method: PitchMethod::Fused,
                timestamp_sec,
            },
            ensemble,
            note_name,
            cents_off_note: cents_off,
        }
    }

    fn trim_history(&mut self) {
        while self.history.len() > self.config.smoothing_frames {
            self.history.pop_front();
        }
    }

    /// Frames seen so far in this session.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Clear the smoothing history, keeping the configuration.
    pub fn reset(&mut self) {
        self.history.clear();
        self.frames_processed = 0;
    }
}

/// Ensemble agreement confidence: `exp(-variance/100)` clamped to [0, 1].
/// One lone estimate has zero variance and full confidence; wildly
/// disagreeing estimators decay it toward zero.
fn agreement_confidence(freqs: &[f64]) -> f64 {
    if freqs.is_empty() {
        return 0.0;
    }
    let mean = freqs.iter().sum::<f64>() / freqs.len() as f64;
    let variance = freqs.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / freqs.len() as f64;
    (-variance / 100.0).exp().clamp(0.0, 1.0)
}
