//! Environment evidence handling
//!
//! The environment estimator is external; this module validates its output and
//! derives the categorical flags (lighting, noise, voice strain) that feed the
//! coercion model, guidance and alerts.

use serde::{Deserialize, Serialize};

use crate::config::EnvironmentThresholds;
use crate::error::GuardError;
use crate::types::EnvironmentEvidence;

/// Categorical environment conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvironmentFlags {
    pub dark: bool,
    pub very_dark: bool,
    pub noisy: bool,
    pub very_loud: bool,
    pub high_pitch: bool,
    pub voice_tremor: bool,
    pub shouting: bool,
}

impl EnvironmentFlags {
    /// Derive flags from raw context. Absent context never raises a flag,
    /// except `shouting`, which the estimator may report directly.
    pub fn derive(env: &EnvironmentEvidence, thresholds: &EnvironmentThresholds) -> Self {
        let brightness = env.brightness;
        let loudness = env.loudness;
        let pitch = env.pitch_hz;

        let dark = brightness.is_some_and(|b| b < thresholds.dark_brightness);
        let very_dark = brightness.is_some_and(|b| b < thresholds.very_dark_brightness);
        let noisy = loudness.is_some_and(|l| l > thresholds.noisy_loudness);
        let very_loud = loudness.is_some_and(|l| l > thresholds.very_loud_loudness);
        let high_pitch = pitch.is_some_and(|p| p > thresholds.high_pitch_hz);
        let voice_tremor = env
            .zero_crossing_rate
            .is_some_and(|z| z > thresholds.tremor_zcr);
        let acoustic_shouting = match (loudness, pitch) {
            (Some(l), Some(p)) => l > thresholds.shouting_loudness && p > thresholds.shouting_pitch_hz,
            _ => false,
        };

        Self {
            dark,
            very_dark,
            noisy,
            very_loud,
            high_pitch,
            voice_tremor,
            shouting: env.shouting || acoustic_shouting,
        }
    }

    /// Remediation hints for significant issues only
    pub fn recommendations(&self) -> Vec<String> {
        let mut recommendations = Vec::new();
        if self.very_dark {
            recommendations.push("Improve lighting conditions".to_string());
        }
        if self.very_loud {
            recommendations.push("Move to a quieter location".to_string());
        }
        if self.shouting {
            recommendations.push("Speak in a normal tone".to_string());
        }
        if self.dark && !self.very_dark {
            recommendations.push("Consider improving lighting".to_string());
        }
        if self.noisy && !self.very_loud {
            recommendations.push("Environment is somewhat noisy".to_string());
        }
        recommendations
    }
}

/// Reject environment evidence that would corrupt scoring
pub fn validate(env: &EnvironmentEvidence) -> Result<(), GuardError> {
    for (name, value) in [
        ("quality_score", env.quality_score),
        ("stability_score", env.stability_score),
    ] {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(GuardError::InvalidEvidence(format!(
                "environment {} must be within [0, 1], got {}",
                name, value
            )));
        }
    }

    let optional = [
        ("brightness", env.brightness),
        ("contrast", env.contrast),
        ("loudness", env.loudness),
        ("pitch_hz", env.pitch_hz),
        ("zero_crossing_rate", env.zero_crossing_rate),
    ];
    for (name, value) in optional {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                return Err(GuardError::InvalidEvidence(format!(
                    "environment {} must be a non-negative number, got {}",
                    name, v
                )));
            }
        }
    }

    Ok(())
}
