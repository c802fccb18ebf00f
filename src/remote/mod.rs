//! Remote dual-engine pitch analysis: request batching, result caching,
//! health probes, and timeout-driven local fallback.

pub mod cache;
pub mod client;
pub mod protocol;

pub use client::{
    DualEngineClient, EngineHealth, EngineKind, EngineTransport, HttpTransport, RemoteConfig,
};

use crate::contour::PitchMethod;

/// Per-frame analysis of one buffer as produced by the remote engines (or
/// the local fallback). `frequencies` and `confidences` are parallel.
#[derive(Debug, Clone)]
pub struct RemoteAnalysis {
    pub frequencies: Vec<f64>,
    pub confidences: Vec<f64>,
    /// Which source produced this: `Fused` when both engines answered,
    /// a single engine's tag when only one did, `LocalFallback` when the
    /// local estimator stood in.
    pub method: PitchMethod,
    /// True when the polyphonic engine saw more than one concurrent
    /// pitch anywhere in the buffer.
    pub non_monophonic: bool,
}
