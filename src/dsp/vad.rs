use std::collections::VecDeque;

use crate::util;

use super::spectrum;

/// Configuration for multimodal voice activity detection.
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Energy must exceed the adaptive noise floor by this factor to vote
    /// voiced.
    pub energy_floor_ratio: f32,
    /// Zero-crossing-rate band for voiced content. Singing sits well below
    /// the ZCR of fricatives and hiss.
    pub zcr_min: f32,
    pub zcr_max: f32,
    /// Spectral-centroid band (Hz) for voiced content.
    pub centroid_min_hz: f32,
    pub centroid_max_hz: f32,
    /// Spectral flatness above this votes unvoiced (noise-like).
    pub flatness_max: f32,
    /// EWMA coefficient for the noise floor; closer to 1 adapts slower.
    pub noise_floor_alpha: f32,
    /// Frames to hold the voiced state after votes stop passing, so the
    /// decaying tail of a note isn't chopped off.
    pub hangover_frames: u32,
    /// Majority-vote smoothing window over recent raw decisions, absorbing
    /// one-frame transients at note onsets.
    pub smoothing_frames: usize,
    /// Consecutive silent frames before downstream processing may be
    /// skipped entirely.
    pub skip_after_silent_frames: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            energy_floor_ratio: 3.0,
            zcr_min: 0.002,
            zcr_max: 0.35,
            centroid_min_hz: 200.0,
            centroid_max_hz: 3000.0,
            flatness_max: 0.4,
            noise_floor_alpha: 0.95,
            hangover_frames: 10,
            smoothing_frames: 5,
            skip_after_silent_frames: 3,
        }
    }
}

/// Per-frame VAD output.
#[derive(Debug, Clone)]
pub struct VadDecision {
    /// Final (smoothed, hangover-extended) voiced flag.
    pub is_voiced: bool,
    /// Vote strength in [0, 1]: fraction of features that voted voiced.
    pub confidence: f64,
    /// Consecutive frames classified voiced, including this one.
    pub consecutive_voiced: u32,
    /// Consecutive frames classified silent, including this one.
    pub consecutive_silence: u32,
}

/// Voice activity detector with adaptive noise-floor tracking and
/// hysteresis.
///
/// Four features vote independently each frame:
///   1. RMS energy against an adaptive noise floor
///   2. Zero-crossing rate inside the voiced band
///   3. Spectral centroid inside the vocal band
///   4. Spectral flatness below the noise threshold
///
/// Two or more votes classify the frame voiced. The raw decision is then
/// majority-smoothed over a short window, and a hangover counter keeps the
/// state voiced for a few frames after votes stop passing, so decisions
/// don't chatter at note edges.
///
/// The noise floor is an EWMA of frame energy updated only while the
/// detector is in silence; voiced energy never inflates the floor.
///
/// One detector per audio stream: the floor, hangover, and history are
/// session state and must not be shared across concurrent sessions.
pub struct VoiceActivityDetector {
    config: VadConfig,
    noise_floor: f32,
    hangover_remaining: u32,
    raw_history: VecDeque<bool>,
    consecutive_voiced: u32,
    consecutive_silence: u32,
}

impl VoiceActivityDetector {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            // Start from a quiet default so the first loud frame votes
            // voiced immediately; silence refines it within a few frames.
            noise_floor: 1e-4,
            hangover_remaining: 0,
            raw_history: VecDeque::new(),
            consecutive_voiced: 0,
            consecutive_silence: 0,
        }
    }

    /// Classify one frame. Frames should arrive in stream order; the
    /// detector's hysteresis depends on it.
    pub fn process_frame(&mut self, samples: &[f32], sample_rate: u32) -> VadDecision {
        let energy = util::rms(samples);
        let zcr = util::zero_crossing_rate(samples);

        let spectrum = spectrum::magnitude_spectrum(samples);
        let fft_size = samples.len().next_power_of_two().max(1);
        let centroid = spectrum::spectral_centroid(&spectrum, fft_size, sample_rate);
        let flatness = spectrum::spectral_flatness(&spectrum);

        let votes = [
            energy > self.config.energy_floor_ratio * self.noise_floor,
            zcr >= self.config.zcr_min && zcr <= self.config.zcr_max,
            centroid >= self.config.centroid_min_hz && centroid <= self.config.centroid_max_hz,
            flatness > 0.0 && flatness < self.config.flatness_max,
        ];
        let vote_count = votes.iter().filter(|&&v| v).count();
        let raw_voiced = vote_count >= 2;

        // Majority smoothing over the recent raw decisions.
        self.raw_history.push_back(raw_voiced);
        while self.raw_history.len() > self.config.smoothing_frames {
            self.raw_history.pop_front();
        }
        let voiced_in_window = self.raw_history.iter().filter(|&&v| v).count();
        let smoothed = voiced_in_window * 2 > self.raw_history.len();

        // Hangover: hold the voiced state for a while after votes fail.
        let is_voiced = if smoothed {
            self.hangover_remaining = self.config.hangover_frames;
            true
        } else if self.hangover_remaining > 0 {
            self.hangover_remaining -= 1;
            true
        } else {
            false
        };

        if is_voiced {
            self.consecutive_voiced += 1;
            self.consecutive_silence = 0;
        } else {
            self.consecutive_silence += 1;
            self.consecutive_voiced = 0;

            // Update the adaptive floor only in silence.
            let alpha = self.config.noise_floor_alpha;
            self.noise_floor = alpha * self.noise_floor + (1.0 - alpha) * energy;
        }

        VadDecision {
            is_voiced,
            confidence: vote_count as f64 / votes.len() as f64,
            consecutive_voiced: self.consecutive_voiced,
            consecutive_silence: self.consecutive_silence,
        }
    }

    /// True when silence has persisted long enough that downstream pitch
    /// estimation can be skipped outright. This gate is the pipeline's
    /// dominant performance optimization.
    pub fn should_skip_processing(&self) -> bool {
        self.consecutive_silence > self.config.skip_after_silent_frames
    }

    /// Current adaptive noise floor (linear RMS), for diagnostics.
    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }

    /// Reset all session state, keeping the configuration.
    pub fn reset(&mut self) {
        self.noise_floor = 1e-4;
        self.hangover_remaining = 0;
        self.raw_history.clear();
        self.consecutive_voiced = 0;
        self.consecutive_silence = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SR: u32 = 48000;
    const FRAME: usize = 2048;

    fn voiced_frame(freq_hz: f32) -> Vec<f32> {
        (0..FRAME)
            .map(|i| {
                let t = i as f32 / SR as f32;
                0.5 * (2.0 * PI * freq_hz * t).sin()
            })
            .collect()
    }

    fn silent_frame() -> Vec<f32> {
        vec![0.0; FRAME]
    }

    #[test]
    fn tone_is_voiced() {
        let mut vad = VoiceActivityDetector::new(VadConfig::default());
        let frame = voiced_frame(220.0);

        let mut last = None;
        for _ in 0..5 {
            last = Some(vad.process_frame(&frame, SR));
        }
        let decision = last.unwrap();
        assert!(decision.is_voiced, "A loud 220 Hz tone should be voiced");
        assert!(decision.confidence >= 0.5);
    }

    #[test]
    fn silence_is_unvoiced_and_skippable() {
        let mut vad = VoiceActivityDetector::new(VadConfig::default());
        let frame = silent_frame();

        for _ in 0..6 {
            let decision = vad.process_frame(&frame, SR);
            assert!(!decision.is_voiced, "Silence should never be voiced");
        }
        assert!(
            vad.should_skip_processing(),
            "Extended silence should enable the skip gate"
        );
    }

    #[test]
    fn short_gap_bridged_by_hangover() {
        // Loud for 5 frames, silent for 2, loud again: the 2-frame gap is
        // inside the 10-frame hangover, so the state stays voiced.
        let mut vad = VoiceActivityDetector::new(VadConfig::default());
        let tone = voiced_frame(220.0);
        let gap = silent_frame();

        for _ in 0..5 {
            vad.process_frame(&tone, SR);
        }
        for _ in 0..2 {
            let decision = vad.process_frame(&gap, SR);
            assert!(decision.is_voiced, "2-frame gap should stay voiced");
        }
        let decision = vad.process_frame(&tone, SR);
        assert!(decision.is_voiced);
    }

    #[test]
    fn long_gap_transitions_to_silence() {
        let mut vad = VoiceActivityDetector::new(VadConfig::default());
        let tone = voiced_frame(220.0);
        let gap = silent_frame();

        for _ in 0..5 {
            vad.process_frame(&tone, SR);
        }
        let mut last = None;
        for _ in 0..15 {
            last = Some(vad.process_frame(&gap, SR));
        }
        assert!(
            !last.unwrap().is_voiced,
            "15 silent frames must exhaust the hangover"
        );
    }

    #[test]
    fn noise_floor_only_adapts_in_silence() {
        let mut vad = VoiceActivityDetector::new(VadConfig::default());
        let tone = voiced_frame(220.0);

        for _ in 0..3 {
            vad.process_frame(&tone, SR);
        }
        let floor_after_voiced = vad.noise_floor();
        assert!(
            floor_after_voiced < 1e-3,
            "Voiced energy must not inflate the noise floor, got {floor_after_voiced}"
        );
    }

    #[test]
    fn consecutive_counters_track_state() {
        let mut vad = VoiceActivityDetector::new(VadConfig::default());
        let tone = voiced_frame(220.0);

        let mut last = None;
        for _ in 0..4 {
            last = Some(vad.process_frame(&tone, SR));
        }
        let decision = last.unwrap();
        assert!(decision.consecutive_voiced >= 3);
        assert_eq!(decision.consecutive_silence, 0);
    }

    #[test]
    fn reset_clears_session_state() {
        let mut vad = VoiceActivityDetector::new(VadConfig::default());
        for _ in 0..6 {
            vad.process_frame(&silent_frame(), SR);
        }
        assert!(vad.should_skip_processing());

        vad.reset();
        assert!(!vad.should_skip_processing());
    }
}
