//! Wire types for the remote pitch-estimation engines.
//!
//! Both engines speak the same protocol: HTTP POST `/analyze` with a JSON
//! body carrying base64-encoded little-endian f32 samples, returning
//! parallel per-frame arrays; GET `/health` for a liveness probe. Fields
//! are typed and validated — a missing or mistyped field is a parse error
//! that triggers the local fallback, never a silent default.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Request body for `/analyze`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest {
    pub audio_base64: String,
    pub sample_rate: u32,
}

impl AnalyzeRequest {
    /// Encode a sample buffer as little-endian f32 bytes in base64.
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * 4);
        for &s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        Self {
            audio_base64: BASE64.encode(&bytes),
            sample_rate,
        }
    }
}

/// Response body from `/analyze`: parallel per-frame arrays.
///
/// The older servers named the arrays `pitches`/`confidences`; the aliases
/// accept both spellings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyzeResponse {
    #[serde(alias = "pitches")]
    pub frequencies: Vec<f64>,
    #[serde(alias = "confidences")]
    pub confidence: Vec<f64>,
    /// Frame timestamps in seconds. Optional; clients derive them from
    /// the frame index when absent.
    #[serde(default)]
    pub timestamps: Option<Vec<f64>>,
    /// Concurrent-pitch groups per frame, reported only by the polyphonic
    /// engine. A frame with more than one entry is chord-like.
    #[serde(default)]
    pub multiple_pitches: Option<Vec<Vec<f64>>>,
}

impl AnalyzeResponse {
    /// Validate the parallel-array invariant. Length mismatches are
    /// treated the same as a parse failure upstream.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.frequencies.len() != self.confidence.len() {
            anyhow::bail!(
                "Mismatched array lengths: {} frequencies vs {} confidence values",
                self.frequencies.len(),
                self.confidence.len()
            );
        }
        if let Some(ts) = &self.timestamps {
            if ts.len() != self.frequencies.len() {
                anyhow::bail!("Timestamps array length does not match frequencies");
            }
        }
        Ok(())
    }

    /// Whether any frame carries more than one concurrent pitch.
    pub fn has_multiple_pitches(&self) -> bool {
        self.multiple_pitches
            .as_ref()
            .is_some_and(|frames| frames.iter().any(|f| f.len() > 1))
    }
}

/// Response body from `/health`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_encodes_f32_le_base64() {
        let request = AnalyzeRequest::from_samples(&[0.0, 1.0], 48000);
        let bytes = BASE64.decode(&request.audio_base64).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[0..4], &0.0f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &1.0f32.to_le_bytes());
        assert_eq!(request.sample_rate, 48000);
    }

    #[test]
    fn response_parses_canonical_fields() {
        let json = r#"{"frequencies": [220.0, 0.0], "confidence": [0.9, 0.0]}"#;
        let response: AnalyzeResponse = serde_json::from_str(json).unwrap();
        assert!(response.validate().is_ok());
        assert_eq!(response.frequencies, vec![220.0, 0.0]);
        assert!(response.timestamps.is_none());
    }

    #[test]
    fn response_accepts_legacy_field_names() {
        let json = r#"{"pitches": [220.0], "confidences": [0.9]}"#;
        let response: AnalyzeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.frequencies, vec![220.0]);
        assert_eq!(response.confidence, vec![0.9]);
    }

    #[test]
    fn missing_field_is_a_parse_error() {
        let json = r#"{"frequencies": [220.0]}"#;
        assert!(serde_json::from_str::<AnalyzeResponse>(json).is_err());
    }

    #[test]
    fn mistyped_field_is_a_parse_error() {
        let json = r#"{"frequencies": "not-an-array", "confidence": []}"#;
        assert!(serde_json::from_str::<AnalyzeResponse>(json).is_err());
    }

    #[test]
    fn mismatched_lengths_fail_validation() {
        let json = r#"{"frequencies": [220.0, 330.0], "confidence": [0.9]}"#;
        let response: AnalyzeResponse = serde_json::from_str(json).unwrap();
        assert!(response.validate().is_err());
    }

    #[test]
    fn chord_detection_flag() {
        let json = r#"{
            "frequencies": [220.0],
            "confidence": [0.9],
            "multiple_pitches": [[220.0, 277.18, 329.63]]
        }"#;
        let response: AnalyzeResponse = serde_json::from_str(json).unwrap();
        assert!(response.has_multiple_pitches());
    }

    #[test]
    fn health_status() {
        let healthy: HealthResponse = serde_json::from_str(r#"{"status": "healthy"}"#).unwrap();
        assert!(healthy.is_healthy());
        let sick: HealthResponse = serde_json::from_str(r#"{"status": "degraded"}"#).unwrap();
        assert!(!sick.is_healthy());
    }
}
