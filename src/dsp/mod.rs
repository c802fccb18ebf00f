//! Signal-processing stages of the pipeline: frame conditioning, voice
//! activity detection, and the local pitch estimators.

pub mod autocorr;
pub mod cepstrum;
pub mod estimator;
pub mod preprocess;
pub mod spectrum;
pub mod vad;
pub mod windowing;
pub mod yin;
