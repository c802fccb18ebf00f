//! Audio analysis core for vocal training.
//!
//! The crate turns raw microphone frames into pitch contours and scores
//! a sung take against a reference melody. The pipeline, front to back:
//!
//! 1. [`dsp::preprocess`] — silence gating, high-pass filtering, and
//!    level normalization so downstream detectors see a consistent
//!    signal.
//! 2. [`dsp::vad`] — multi-feature voice activity detection with
//!    hysteresis, so brief consonant gaps do not chop a phrase apart.
//! 3. [`dsp::estimator`] — an ensemble of local pitch detectors (YIN,
//!    autocorrelation, spectral peak, optional cepstrum) fused by
//!    median, smoothed, and snapped to the nearest note.
//! 4. [`remote`] — an async client for two remote analysis engines
//!    (monophonic and polyphonic), with request batching, result
//!    caching, and a local fallback when the network lets us down.
//! 5. [`fusion`] — combines remote and local estimates, weighting by
//!    source reliability and cross-source agreement.
//! 6. [`mod@align`] — banded dynamic time warping of the sung contour
//!    against the reference melody, producing per-note matches and an
//!    overall quality score.
//!
//! Everything is tunable through [`config::AppConfig`], loaded from a
//! TOML file with sensible defaults for every field.

pub mod align;
pub mod config;
pub mod contour;
pub mod dsp;
pub mod fusion;
pub mod note;
pub mod remote;
pub mod util;

pub use align::{align, AlignConfig, AlignmentResult};
pub use config::{load_config, AppConfig};
pub use contour::{PitchContour, PitchEstimate, PitchMethod};
pub use dsp::estimator::{EstimatorConfig, FrameAnalysis, PitchEstimator};
pub use dsp::vad::{VadConfig, VoiceActivityDetector};
pub use fusion::{fuse, FusedEstimate, FusionConfig};
pub use note::{cents_between, nearest_note, Note};
pub use remote::{DualEngineClient, RemoteAnalysis, RemoteConfig};
