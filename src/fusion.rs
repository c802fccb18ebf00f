//! Combines local and remote pitch estimates for one time window into a
//! single estimate, weighting by source reliability and rewarding
//! cross-source agreement.

use crate::contour::{PitchEstimate, PitchMethod};
use crate::note;

/// Configuration for estimate fusion.
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// Reliability weight for the remote neural engines.
    pub remote_weight: f64,
    /// Reliability weight for the local DSP estimator.
    pub local_weight: f64,
    /// Sources agreeing within this many cents earn a confidence bonus.
    pub agreement_cents: f64,
    /// Sources disagreeing beyond this many cents take a confidence
    /// penalty — the signal is ambiguous or chord-like.
    pub disagreement_cents: f64,
    /// Bonus/penalty applied to the combined confidence.
    pub agreement_bonus: f64,
    pub disagreement_penalty: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            remote_weight: 0.7,
            local_weight: 0.3,
            agreement_cents: 30.0,
            disagreement_cents: 100.0,
            agreement_bonus: 0.1,
            disagreement_penalty: 0.2,
        }
    }
}

/// One source's contribution to fusion.
#[derive(Debug, Clone)]
pub struct SourceEstimate {
    pub estimate: PitchEstimate,
    /// Whether the source reported multiple concurrent pitches for this
    /// window (polyphonic engine only).
    pub multiple_pitches: bool,
}

impl SourceEstimate {
    pub fn new(estimate: PitchEstimate) -> Self {
        Self {
            estimate,
            multiple_pitches: false,
        }
    }
}

/// The fused estimate plus advisory polyphony metadata.
#[derive(Debug, Clone)]
pub struct FusedEstimate {
    pub estimate: PitchEstimate,
    /// True when any engine detected more than one concurrent pitch. The
    /// melody aligner assumes monophonic contours; consumers that care
    /// about chords should treat this frame specially.
    pub non_monophonic: bool,
}

/// Fuse the available source estimates for one time window.
///
/// Policy:
///   - no voiced sources → unvoiced result
///   - one voiced source → passed through unchanged
///   - several → confidence-and-reliability-weighted frequency average,
///     weighted-mean confidence, adjusted by an agreement bonus or a
///     disagreement penalty
///
/// Remote engines outrank the local estimator when both are confident;
/// `local_only` sessions simply pass a single local source here.
pub fn fuse(sources: &[SourceEstimate], config: &FusionConfig) -> FusedEstimate {
    let non_monophonic = sources.iter().any(|s| s.multiple_pitches);

    let voiced: Vec<&SourceEstimate> = sources
        .iter()
        .filter(|s| s.estimate.is_voiced())
        .collect();

    let timestamp = sources
        .first()
        .map(|s| s.estimate.timestamp_sec)
        .unwrap_or(0.0);

    match voiced.len() {
        0 => FusedEstimate {
            estimate: PitchEstimate::unvoiced(PitchMethod::Fused, timestamp),
            non_monophonic,
        },
        1 => FusedEstimate {
            estimate: voiced[0].estimate.clone(),
            non_monophonic,
        },
        _ => {
            let mut weighted_freq = 0.0;
            let mut weighted_conf = 0.0;
            let mut total_weight = 0.0;

            for source in &voiced {
                let reliability = source_reliability(source.estimate.method, config);
                let weight = reliability * source.estimate.confidence.max(1e-3);
                weighted_freq += weight * source.estimate.frequency_hz;
                weighted_conf += weight * source.estimate.confidence;
                total_weight += weight;
            }

            let frequency = weighted_freq / total_weight;
            let mut confidence = weighted_conf / total_weight;

            // Cross-source spread in cents drives the bonus/penalty.
            let spread = max_spread_cents(&voiced);
            if spread <= config.agreement_cents {
                confidence += config.agreement_bonus;
            } else if spread >= config.disagreement_cents {
                confidence -= config.disagreement_penalty;
            }

            FusedEstimate {
                estimate: PitchEstimate {
                    frequency_hz: frequency,
                    confidence: confidence.clamp(0.0, 1.0),
                    method: PitchMethod::Fused,
                    timestamp_sec: timestamp,
                },
                non_monophonic,
            }
        }
    }
}

fn source_reliability(method: PitchMethod, config: &FusionConfig) -> f64 {
    match method {
        PitchMethod::RemoteCrepe | PitchMethod::RemoteSpice => config.remote_weight,
        _ => config.local_weight,
    }
}

/// Largest pairwise interval among the voiced sources, in cents.
fn max_spread_cents(voiced: &[&SourceEstimate]) -> f64 {
    let mut spread = 0.0f64;
    for (i, a) in voiced.iter().enumerate() {
        for b in &voiced[i + 1..] {
            let cents = note::cents_between(
                a.estimate.frequency_hz,
                b.estimate.frequency_hz,
            )
            .abs();
            spread = spread.max(cents);
        }
    }
    spread
}
