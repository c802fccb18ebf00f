//! Melody alignment by dynamic time warping.
//!
//! Aligns a user-sung pitch contour against a reference melody under a
//! Sakoe–Chiba band constraint, backtracks the optimal warp path, and
//! derives per-note pitch/timing errors and an overall quality score.

use anyhow::{bail, Result};

use crate::note;

/// Configuration for melody alignment.
#[derive(Debug, Clone)]
pub struct AlignConfig {
    /// Sakoe–Chiba band half-width as a fraction of sequence length.
    /// Cells further than this from the diagonal are unreachable, which
    /// bounds runtime and forbids implausible time warps.
    pub band_fraction: f64,
    /// Fixed local cost for any pair where either side is unvoiced, so
    /// silence never cheaply aligns against pitched content.
    pub unvoiced_penalty: f64,
    /// Contours longer than this are truncated (prefix taken) before the
    /// dynamic program, bounding memory.
    pub max_frames: usize,
    /// A note match is correct when |pitch error| is under this many cents
    /// and the timing error is under `timing_correct_sec`.
    pub pitch_correct_cents: f64,
    pub timing_correct_sec: f64,
    /// Quality-score weights: correct-match fraction, pitch error, timing
    /// error, global distance. Should sum to 1.
    pub weight_correct: f64,
    pub weight_pitch: f64,
    pub weight_timing: f64,
    pub weight_distance: f64,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            band_fraction: 0.1,
            unvoiced_penalty: 1000.0,
            max_frames: 5000,
            pitch_correct_cents: 50.0,
            timing_correct_sec: 0.2,
            weight_correct: 0.4,
            weight_pitch: 0.3,
            weight_timing: 0.2,
            weight_distance: 0.1,
        }
    }
}

/// One step of the warp path.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentPoint {
    pub reference_index: usize,
    pub user_index: usize,
    pub reference_time_sec: f64,
    pub user_time_sec: f64,
    /// Local cost of this pairing (cents distance or unvoiced penalty).
    pub local_cost: f64,
}

/// A matched note pair where both contours were voiced.
#[derive(Debug, Clone)]
pub struct NoteMatch {
    pub reference_freq: f64,
    pub user_freq: f64,
    pub reference_time_sec: f64,
    pub user_time_sec: f64,
    /// Signed pitch error in cents (positive = user sang sharp).
    pub pitch_error_cents: f64,
    pub timing_error_sec: f64,
    pub is_correct: bool,
}

/// The complete alignment outcome.
#[derive(Debug, Clone)]
pub struct AlignmentResult {
    /// Chronological warp path from (0,0) to (last_ref, last_user).
    /// Empty when alignment was not attempted.
    pub path: Vec<AlignmentPoint>,
    pub total_cost: f64,
    /// Total cost divided by path length.
    pub normalized_cost: f64,
    pub note_matches: Vec<NoteMatch>,
    /// Overall quality in [0, 1].
    pub quality_score: f64,
    /// Human-readable note on degenerate inputs or truncation.
    pub feedback: String,
    /// True when either contour was truncated to `max_frames`.
    pub truncated: bool,
}

impl AlignmentResult {
    fn degenerate(feedback: &str) -> Self {
        Self {
            path: Vec::new(),
            total_cost: 0.0,
            normalized_cost: 0.0,
            note_matches: Vec::new(),
            quality_score: 0.0,
            feedback: feedback.to_string(),
            truncated: false,
        }
    }
}

/// Cost matrix restricted to the Sakoe–Chiba band: each row stores only
/// its in-band window. Reads outside the band return infinity.
struct BandMatrix {
    starts: Vec<usize>,
    rows: Vec<Vec<f64>>,
}

impl BandMatrix {
    fn get(&self, i: usize, j: usize) -> f64 {
        let start = self.starts[i];
        let row = &self.rows[i];
        if j < start || j >= start + row.len() {
            f64::INFINITY
        } else {
            row[j - start]
        }
    }

    fn set(&mut self, i: usize, j: usize, value: f64) {
        let start = self.starts[i];
        self.rows[i][j - start] = value;
    }
}

/// Align a user contour against a reference melody.
///
/// Both contours are frequency sequences in Hz with 0.0 marking unvoiced
/// frames, sampled at `frame_rate_hz`. The local distance between voiced
/// pairs is the absolute cents difference; any pair involving an unvoiced
/// frame costs the fixed penalty.
///
/// Empty inputs return a zero-quality result with an explanatory feedback
/// string; a non-positive frame rate is a contract violation and fails.
pub fn align(
    reference: &[f64],
    user: &[f64],
    frame_rate_hz: f64,
    config: &AlignConfig,
) -> Result<AlignmentResult> {
    if frame_rate_hz <= 0.0 {
        bail!("frame_rate_hz must be positive, got {frame_rate_hz}");
    }
    if config.band_fraction <= 0.0 || config.max_frames == 0 {
        bail!("band_fraction and max_frames must be positive");
    }

    if reference.is_empty() {
        return Ok(AlignmentResult::degenerate(
            "Reference melody is empty; nothing to align against.",
        ));
    }
    if user.is_empty() {
        return Ok(AlignmentResult::degenerate(
            "User contour is empty; no singing was captured.",
        ));
    }

    let truncated = reference.len() > config.max_frames || user.len() > config.max_frames;
    if truncated {
        log::warn!(
            "Truncating contours to {} frames for alignment (ref {}, user {})",
            config.max_frames,
            reference.len(),
            user.len()
        );
    }
    let reference = &reference[..reference.len().min(config.max_frames)];
    let user = &user[..user.len().min(config.max_frames)];

    let m = reference.len();
    let n = user.len();

    // Band window per reference row, centered on the proportional
    // diagonal, never narrower than 2 cells so the corner cells are
    // always reachable even for very different lengths.
    let half_width = (config.band_fraction * n as f64).max(2.0);
    let mut starts = Vec::with_capacity(m);
    let mut rows = Vec::with_capacity(m);
    for i in 0..m {
        let center = i as f64 * n as f64 / m as f64;
        let lo = ((center - half_width).floor().max(0.0)) as usize;
        let hi = (((center + half_width).ceil()) as usize + 1).min(n);
        starts.push(lo);
        rows.push(vec![f64::INFINITY; hi - lo]);
    }
    let mut cost = BandMatrix { starts, rows };

    // DP fill. Row 0 / column 0 seed as cumulative sums along the border;
    // interior cells take the minimum predecessor.
    for i in 0..m {
        let start = cost.starts[i];
        let end = start + cost.rows[i].len();
        for j in start..end {
            let local = local_distance(reference[i], user[j], config.unvoiced_penalty);
            let best_prev = match (i, j) {
                (0, 0) => 0.0,
                (0, _) => cost.get(0, j - 1),
                (_, 0) => cost.get(i - 1, 0),
                _ => cost
                    .get(i - 1, j - 1)
                    .min(cost.get(i - 1, j))
                    .min(cost.get(i, j - 1)),
            };
            if best_prev.is_finite() {
                cost.set(i, j, local + best_prev);
            }
        }
    }

    if !cost.get(m - 1, n - 1).is_finite() {
        // Should not happen with the widened band, but degrade rather
        // than panic if the corridor has no feasible path.
        return Ok(AlignmentResult::degenerate(
            "No feasible alignment path inside the band constraint.",
        ));
    }

    // Backtrack from the corner, preferring the cheapest predecessor
    // (diagonal wins ties so the path stays compact).
    let mut path_rev = Vec::new();
    let (mut i, mut j) = (m - 1, n - 1);
    loop {
        path_rev.push(AlignmentPoint {
            reference_index: i,
            user_index: j,
            reference_time_sec: i as f64 / frame_rate_hz,
            user_time_sec: j as f64 / frame_rate_hz,
            local_cost: local_distance(reference[i], user[j], config.unvoiced_penalty),
        });

        match (i, j) {
            (0, 0) => break,
            (0, _) => j -= 1,
            (_, 0) => i -= 1,
            _ => {
                let diag = cost.get(i - 1, j - 1);
                let up = cost.get(i - 1, j);
                let left = cost.get(i, j - 1);
                if diag <= up && diag <= left {
                    i -= 1;
                    j -= 1;
                } else if up <= left {
                    i -= 1;
                } else {
                    j -= 1;
                }
            }
        }
    }
    path_rev.reverse();
    let path = path_rev;

    let total_cost = cost.get(m - 1, n - 1);
    let normalized_cost = total_cost / path.len() as f64;

    // Note matches wherever both sides are voiced.
    let note_matches: Vec<NoteMatch> = path
        .iter()
        .filter(|p| reference[p.reference_index] > 0.0 && user[p.user_index] > 0.0)
        .map(|p| {
            let ref_freq = reference[p.reference_index];
            let user_freq = user[p.user_index];
            let pitch_error_cents = note::cents_between(ref_freq, user_freq);
            let timing_error_sec = (p.reference_time_sec - p.user_time_sec).abs();
            NoteMatch {
                reference_freq: ref_freq,
                user_freq,
                reference_time_sec: p.reference_time_sec,
                user_time_sec: p.user_time_sec,
                pitch_error_cents,
                timing_error_sec,
                is_correct: pitch_error_cents.abs() < config.pitch_correct_cents
                    && timing_error_sec < config.timing_correct_sec,
            }
        })
        .collect();

    let quality_score = quality(&note_matches, normalized_cost, config);

    let feedback = if truncated {
        format!(
            "Contours truncated to {} frames before alignment.",
            config.max_frames
        )
    } else {
        String::new()
    };

    Ok(AlignmentResult {
        path,
        total_cost,
        normalized_cost,
        note_matches,
        quality_score,
        feedback,
        truncated,
    })
}

/// Local DTW distance: absolute cents difference between voiced pairs,
/// fixed penalty when either frame is unvoiced.
fn local_distance(ref_freq: f64, user_freq: f64, unvoiced_penalty: f64) -> f64 {
    if ref_freq <= 0.0 || user_freq <= 0.0 {
        unvoiced_penalty
    } else {
        note::cents_between(ref_freq, user_freq).abs()
    }
}

/// Weighted quality score, clamped to [0, 1].
///
/// 40% correct-match fraction, 30% average-pitch-error score, 20%
/// average-timing-error score, 10% global-distance score (defaults).
fn quality(matches: &[NoteMatch], normalized_cost: f64, config: &AlignConfig) -> f64 {
    let (correct_score, pitch_score, timing_score) = if matches.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let correct = matches.iter().filter(|m| m.is_correct).count();
        let avg_cents = matches
            .iter()
            .map(|m| m.pitch_error_cents.abs())
            .sum::<f64>()
            / matches.len() as f64;
        let avg_timing = matches.iter().map(|m| m.timing_error_sec).sum::<f64>()
            / matches.len() as f64;

        (
            correct as f64 / matches.len() as f64,
            (1.0 - avg_cents / 100.0).max(0.0),
            (1.0 - avg_timing / 0.5).max(0.0),
        )
    };

    let distance_score = (1.0 - normalized_cost / config.unvoiced_penalty).max(0.0);

    let score = config.weight_correct * correct_score
        + config.weight_pitch * pitch_score
        + config.weight_timing * timing_score
        + config.weight_distance * distance_score;

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AlignConfig {
        AlignConfig::default()
    }

    #[test]
    fn identity_alignment_is_diagonal() {
        let contour = vec![220.0, 220.0, 246.94, 261.63, 261.63, 293.66];
        let result = align(&contour, &contour, 10.0, &config()).unwrap();

        assert!(
            result.normalized_cost < 1e-9,
            "Self-alignment cost should be ~0, got {}",
            result.normalized_cost
        );
        assert!(
            result.quality_score > 0.95,
            "Self-alignment quality should be near 1, got {:.3}",
            result.quality_score
        );
        for point in &result.path {
            assert_eq!(
                point.reference_index, point.user_index,
                "Self-alignment path must stay on the diagonal"
            );
        }
    }

    #[test]
    fn path_is_monotonic_and_spans_both_sequences() {
        let reference = vec![220.0, 246.94, 261.63, 293.66, 329.63];
        let user = vec![218.0, 218.0, 248.0, 262.0, 290.0, 330.0, 332.0];
        let result = align(&reference, &user, 10.0, &config()).unwrap();

        let first = result.path.first().unwrap();
        let last = result.path.last().unwrap();
        assert_eq!((first.reference_index, first.user_index), (0, 0));
        assert_eq!(
            (last.reference_index, last.user_index),
            (reference.len() - 1, user.len() - 1)
        );

        for pair in result.path.windows(2) {
            assert!(pair[1].reference_index >= pair[0].reference_index);
            assert!(pair[1].user_index >= pair[0].user_index);
            let advanced = (pair[1].reference_index - pair[0].reference_index)
                + (pair[1].user_index - pair[0].user_index);
            assert!(advanced >= 1, "Path must advance at every step");
        }
    }

    #[test]
    fn empty_reference_returns_zero_quality() {
        let result = align(&[], &[220.0, 220.0], 10.0, &config()).unwrap();
        assert_eq!(result.quality_score, 0.0);
        assert!(result.path.is_empty());
        assert!(!result.feedback.is_empty());
    }

    #[test]
    fn empty_user_returns_zero_quality() {
        let result = align(&[220.0], &[], 10.0, &config()).unwrap();
        assert_eq!(result.quality_score, 0.0);
        assert!(!result.feedback.is_empty());
    }

    #[test]
    fn invalid_frame_rate_is_a_contract_error() {
        assert!(align(&[220.0], &[220.0], 0.0, &config()).is_err());
        assert!(align(&[220.0], &[220.0], -10.0, &config()).is_err());
    }

    #[test]
    fn leading_silence_shift_still_scores_well() {
        // A3 A3 A3 B3 B3 B3 vs the same melody delayed by one silent
        // frame: every pitched pairing is still within 50 cents, and the
        // 0.1 s offset is inside the timing tolerance.
        let reference = vec![220.0, 220.0, 220.0, 246.94, 246.94, 246.94];
        let mut user = vec![0.0];
        user.extend_from_slice(&reference);

        let result = align(&reference, &user, 10.0, &config()).unwrap();

        assert!(
            result.quality_score > 0.8,
            "Expected a high score despite the shift, got {:.3}",
            result.quality_score
        );
        let pitch_misses = result
            .note_matches
            .iter()
            .filter(|m| m.pitch_error_cents.abs() >= 50.0)
            .count();
        assert_eq!(pitch_misses, 0, "No pitch errors should be reported");
    }

    #[test]
    fn unvoiced_pairs_carry_the_fixed_penalty() {
        let reference = vec![0.0, 220.0];
        let user = vec![0.0, 220.0];
        let result = align(&reference, &user, 10.0, &config()).unwrap();

        // The (0,0) silence pairing costs the fixed penalty; the voiced
        // diagonal step costs 0.
        assert!((result.total_cost - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn oversized_contours_are_truncated_not_failed() {
        let config = AlignConfig {
            max_frames: 50,
            ..AlignConfig::default()
        };
        let reference = vec![220.0; 200];
        let user = vec![220.0; 200];
        let result = align(&reference, &user, 100.0, &config).unwrap();

        assert!(result.truncated);
        assert!(result.feedback.contains("50"));
        let last = result.path.last().unwrap();
        assert_eq!(last.reference_index, 49);
        assert_eq!(last.user_index, 49);
    }

    #[test]
    fn wrong_melody_scores_poorly() {
        // User sings a fifth too high everywhere (~700 cents off).
        let reference = vec![220.0; 10];
        let user = vec![329.63; 10];
        let result = align(&reference, &user, 10.0, &config()).unwrap();

        assert!(
            result.quality_score < 0.3,
            "A wrong melody should score low, got {:.3}",
            result.quality_score
        );
        assert!(result.note_matches.iter().all(|m| !m.is_correct));
    }
}
