use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::align::AlignConfig;
use crate::dsp::estimator::EstimatorConfig;
use crate::dsp::preprocess::PreprocessConfig;
use crate::dsp::vad::VadConfig;
use crate::fusion::FusionConfig;
use crate::remote::RemoteConfig;

/// Application configuration, loadable from a TOML file.
///
/// serde's `default` attribute means: if a field is missing from the TOML
/// file, use the value from the Default implementation instead of failing
/// to parse. This makes the config file optional — every field has a
/// sensible default, and every empirically-tuned constant in the pipeline
/// is reachable here for recalibration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub vad: VadSection,
    pub estimator: EstimatorSection,
    pub remote: RemoteSection,
    pub fusion: FusionSection,
    pub alignment: AlignmentSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Analysis window in samples.
    pub frame_size: usize,
    /// Hop between frames in samples (overlap = 1 - hop/frame).
    pub hop_size: usize,
    pub silence_rms_threshold: f32,
    pub highpass_cutoff_hz: f32,
    pub target_rms: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadSection {
    pub energy_floor_ratio: f32,
    pub zcr_min: f32,
    pub zcr_max: f32,
    pub centroid_min_hz: f32,
    pub centroid_max_hz: f32,
    pub flatness_max: f32,
    pub noise_floor_alpha: f32,
    pub hangover_frames: u32,
    pub smoothing_frames: usize,
    pub skip_after_silent_frames: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorSection {
    pub fmin_hz: f32,
    pub fmax_hz: f32,
    pub yin_threshold: f32,
    pub min_correlation: f32,
    pub enable_cepstrum: bool,
    pub smoothing_frames: usize,
    pub snap_threshold_cents: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSection {
    pub monophonic_url: String,
    pub polyphonic_url: String,
    pub connect_timeout_sec: f64,
    pub request_timeout_sec: f64,
    pub batch_interval_ms: u64,
    pub cache_capacity: usize,
    pub deadline_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSection {
    pub remote_weight: f64,
    pub local_weight: f64,
    pub agreement_cents: f64,
    pub disagreement_cents: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentSection {
    pub band_fraction: f64,
    pub unvoiced_penalty: f64,
    pub max_frames: usize,
    pub pitch_correct_cents: f64,
    pub timing_correct_sec: f64,
}

// --- Default implementations ---
// The factory settings; each mirrors the matching internal config so the
// two can never silently drift apart.

impl Default for AudioConfig {
    fn default() -> Self {
        let pre = PreprocessConfig::default();
        Self {
            sample_rate: 48000,
            frame_size: 2048,
            hop_size: 512,
            silence_rms_threshold: pre.silence_rms_threshold,
            highpass_cutoff_hz: pre.highpass_cutoff_hz,
            target_rms: pre.target_rms,
        }
    }
}

impl Default for VadSection {
    fn default() -> Self {
        let vad = VadConfig::default();
        Self {
            energy_floor_ratio: vad.energy_floor_ratio,
            zcr_min: vad.zcr_min,
            zcr_max: vad.zcr_max,
            centroid_min_hz: vad.centroid_min_hz,
            centroid_max_hz: vad.centroid_max_hz,
            flatness_max: vad.flatness_max,
            noise_floor_alpha: vad.noise_floor_alpha,
            hangover_frames: vad.hangover_frames,
            smoothing_frames: vad.smoothing_frames,
            skip_after_silent_frames: vad.skip_after_silent_frames,
        }
    }
}

impl Default for EstimatorSection {
    fn default() -> Self {
        let est = EstimatorConfig::default();
        Self {
            fmin_hz: est.yin.fmin_hz,
            fmax_hz: est.yin.fmax_hz,
            yin_threshold: est.yin.threshold,
            min_correlation: est.autocorr.min_correlation,
            enable_cepstrum: est.enable_cepstrum,
            smoothing_frames: est.smoothing_frames,
            snap_threshold_cents: est.snap_threshold_cents,
        }
    }
}

impl Default for RemoteSection {
    fn default() -> Self {
        let remote = RemoteConfig::default();
        Self {
            monophonic_url: remote.monophonic_url,
            polyphonic_url: remote.polyphonic_url,
            connect_timeout_sec: remote.connect_timeout_sec,
            request_timeout_sec: remote.request_timeout_sec,
            batch_interval_ms: remote.batch_interval_ms,
            cache_capacity: remote.cache_capacity,
            deadline_sec: remote.deadline_sec,
        }
    }
}

impl Default for FusionSection {
    fn default() -> Self {
        let fusion = FusionConfig::default();
        Self {
            remote_weight: fusion.remote_weight,
            local_weight: fusion.local_weight,
            agreement_cents: fusion.agreement_cents,
            disagreement_cents: fusion.disagreement_cents,
        }
    }
}

impl Default for AlignmentSection {
    fn default() -> Self {
        let align = AlignConfig::default();
        Self {
            band_fraction: align.band_fraction,
            unvoiced_penalty: align.unvoiced_penalty,
            max_frames: align.max_frames,
            pitch_correct_cents: align.pitch_correct_cents,
            timing_correct_sec: align.timing_correct_sec,
        }
    }
}

// --- Bridges from the user-facing sections to the internal configs ---

impl From<&AudioConfig> for PreprocessConfig {
    fn from(cfg: &AudioConfig) -> Self {
        PreprocessConfig {
            silence_rms_threshold: cfg.silence_rms_threshold,
            highpass_cutoff_hz: cfg.highpass_cutoff_hz,
            target_rms: cfg.target_rms,
        }
    }
}

impl From<&VadSection> for VadConfig {
    fn from(cfg: &VadSection) -> Self {
        VadConfig {
            energy_floor_ratio: cfg.energy_floor_ratio,
            zcr_min: cfg.zcr_min,
            zcr_max: cfg.zcr_max,
            centroid_min_hz: cfg.centroid_min_hz,
            centroid_max_hz: cfg.centroid_max_hz,
            flatness_max: cfg.flatness_max,
            noise_floor_alpha: cfg.noise_floor_alpha,
            hangover_frames: cfg.hangover_frames,
            smoothing_frames: cfg.smoothing_frames,
            skip_after_silent_frames: cfg.skip_after_silent_frames,
        }
    }
}

impl AppConfig {
    /// Build the estimator config from the [estimator] and [audio]
    /// sections.
    pub fn estimator_config(&self) -> EstimatorConfig {
        let mut est = EstimatorConfig::default();
        est.yin.fmin_hz = self.estimator.fmin_hz;
        est.yin.fmax_hz = self.estimator.fmax_hz;
        est.yin.threshold = self.estimator.yin_threshold;
        est.autocorr.fmin_hz = self.estimator.fmin_hz;
        est.autocorr.fmax_hz = self.estimator.fmax_hz;
        est.autocorr.min_correlation = self.estimator.min_correlation;
        est.spectral_fmin_hz = self.estimator.fmin_hz;
        est.spectral_fmax_hz = self.estimator.fmax_hz;
        est.enable_cepstrum = self.estimator.enable_cepstrum;
        est.smoothing_frames = self.estimator.smoothing_frames;
        est.snap_threshold_cents = self.estimator.snap_threshold_cents;
        est.preprocess = PreprocessConfig::from(&self.audio);
        est
    }

    pub fn vad_config(&self) -> VadConfig {
        VadConfig::from(&self.vad)
    }

    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            monophonic_url: self.remote.monophonic_url.clone(),
            polyphonic_url: self.remote.polyphonic_url.clone(),
            connect_timeout_sec: self.remote.connect_timeout_sec,
            request_timeout_sec: self.remote.request_timeout_sec,
            batch_interval_ms: self.remote.batch_interval_ms,
            cache_capacity: self.remote.cache_capacity,
            deadline_sec: self.remote.deadline_sec,
            ..RemoteConfig::default()
        }
    }

    pub fn fusion_config(&self) -> FusionConfig {
        FusionConfig {
            remote_weight: self.fusion.remote_weight,
            local_weight: self.fusion.local_weight,
            agreement_cents: self.fusion.agreement_cents,
            disagreement_cents: self.fusion.disagreement_cents,
            ..FusionConfig::default()
        }
    }

    pub fn align_config(&self) -> AlignConfig {
        AlignConfig {
            band_fraction: self.alignment.band_fraction,
            unvoiced_penalty: self.alignment.unvoiced_penalty,
            max_frames: self.alignment.max_frames,
            pitch_correct_cents: self.alignment.pitch_correct_cents,
            timing_correct_sec: self.alignment.timing_correct_sec,
            ..AlignConfig::default()
        }
    }

    /// Validate the contract-level invariants that should fail fast at
    /// construction rather than degrade at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            anyhow::bail!("sample_rate must be positive");
        }
        if self.audio.frame_size == 0 {
            anyhow::bail!("frame_size must be positive");
        }
        if self.audio.hop_size == 0 || self.audio.hop_size > self.audio.frame_size {
            anyhow::bail!(
                "hop_size must be in 1..=frame_size, got {} vs {}",
                self.audio.hop_size,
                self.audio.frame_size
            );
        }
        if self.estimator.fmin_hz <= 0.0 || self.estimator.fmax_hz <= self.estimator.fmin_hz {
            anyhow::bail!("Estimator frequency band is empty");
        }
        Ok(())
    }
}

/// Load configuration from a TOML file, or defaults when the file does
/// not exist.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
