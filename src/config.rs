//! Runtime configuration
//!
//! Every threshold the pipeline uses lives here so that deployments can tune
//! policy without code changes. All sections default to the reference policy
//! and any subset of fields may be supplied in JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::GuardError;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub fusion: FusionPolicy,
    pub coercion: CoercionWeights,
    pub environment: EnvironmentThresholds,
    pub keystroke: KeystrokeConfig,
    pub alerts: AlertPolicy,
    pub audit: AuditPolicy,
}

/// What an attempt against an identity without a usable template yields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnenrolledPolicy {
    #[default]
    Deny,
    Delay,
}

/// Predicate and bucket thresholds for the fusion engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionPolicy {
    /// Anomaly above which the attempt is denied outright
    pub anomaly_deny: f64,
    /// Match below this together with anomaly above `low_match_anomaly` denies
    pub low_match_deny: f64,
    pub low_match_anomaly: f64,
    /// Damping applied to the averaged facial/voice stress
    pub stress_damping: f64,
    /// Coercion risk above which the attempt is denied
    pub coercion_deny: f64,
    /// Stress above which shouting denies
    pub shouting_stress_deny: f64,
    /// Stress above which a very loud environment denies
    pub very_loud_stress_deny: f64,
    /// Auth score below which graded scoring denies
    pub deny_auth_floor: f64,
    /// Stress above which graded scoring delays
    pub stress_delay: f64,
    /// Coercion risk above which graded scoring delays
    pub coercion_delay: f64,
    /// Stress above which an unstable environment delays
    pub unstable_stress_delay: f64,
    /// Environment stability considered unstable
    pub unstable_stability: f64,
    /// Stress above which very poor lighting delays
    pub dark_stress_delay: f64,
    /// Stress above which a high-pitched trembling voice delays
    pub tremor_stress_delay: f64,
    /// Keystroke match below which graded scoring delays
    pub match_delay: f64,
    /// Environment score considered low
    pub env_low: f64,
    /// Stress considered high (for the stress∧low-environment rules)
    pub stress_high: f64,
    /// Minimum auth score for a permit
    pub permit_min_auth: f64,
    /// Outcome for identities without a usable template
    pub unenrolled: UnenrolledPolicy,
}

impl Default for FusionPolicy {
    fn default() -> Self {
        Self {
            anomaly_deny: 0.85,
            low_match_deny: 0.2,
            low_match_anomaly: 0.8,
            stress_damping: 0.7,
            coercion_deny: 0.85,
            shouting_stress_deny: 0.8,
            very_loud_stress_deny: 0.85,
            deny_auth_floor: 0.25,
            stress_delay: 0.9,
            coercion_delay: 0.7,
            unstable_stress_delay: 0.85,
            unstable_stability: 0.3,
            dark_stress_delay: 0.7,
            tremor_stress_delay: 0.8,
            match_delay: 0.15,
            env_low: 0.4,
            stress_high: 0.6,
            permit_min_auth: 0.7,
            unenrolled: UnenrolledPolicy::Deny,
        }
    }
}

/// Weights of the noisy-OR coercion model.
///
/// `coercion_risk = 1 - Π(1 - wᵢ·sᵢ)` over the indicator signals, so each
/// weight is the risk contributed by its signal alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoercionWeights {
    pub multiple_subjects: f64,
    pub stress_in_poor_environment: f64,
    pub shouting: f64,
    pub very_loud: f64,
    pub very_dark: f64,
    pub tremor_high_pitch: f64,
}

impl Default for CoercionWeights {
    fn default() -> Self {
        Self {
            multiple_subjects: 0.9,
            stress_in_poor_environment: 0.35,
            shouting: 0.4,
            very_loud: 0.3,
            very_dark: 0.1,
            tremor_high_pitch: 0.2,
        }
    }
}

/// Thresholds for deriving environment flags from raw context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentThresholds {
    pub dark_brightness: f64,
    pub very_dark_brightness: f64,
    pub noisy_loudness: f64,
    pub very_loud_loudness: f64,
    pub shouting_loudness: f64,
    pub shouting_pitch_hz: f64,
    pub high_pitch_hz: f64,
    pub tremor_zcr: f64,
}

impl Default for EnvironmentThresholds {
    fn default() -> Self {
        Self {
            dark_brightness: 0.2,
            very_dark_brightness: 0.1,
            noisy_loudness: 0.75,
            very_loud_loudness: 0.9,
            shouting_loudness: 0.85,
            shouting_pitch_hz: 270.0,
            high_pitch_hz: 280.0,
            tremor_zcr: 0.7,
        }
    }
}

/// Keystroke template settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystrokeConfig {
    /// Samples required before a template is built
    pub min_enrollment_samples: usize,
    /// Most recent samples kept per identity
    pub max_enrollment_samples: usize,
    /// z-distance charged for a missing or unmatched key/digraph
    pub missing_feature_penalty: f64,
    /// Mean z-distance that maps to a match score of 0
    pub match_z_scale: f64,
    /// Std floor as a fraction of the feature mean
    pub relative_std_floor: f64,
    /// Std floor in feature units
    pub absolute_std_floor: f64,
    /// Lower bound for the outlier detector's inlier radius
    pub min_inlier_radius: f64,
}

impl Default for KeystrokeConfig {
    fn default() -> Self {
        Self {
            min_enrollment_samples: 3,
            max_enrollment_samples: 20,
            missing_feature_penalty: 3.0,
            match_z_scale: 3.0,
            relative_std_floor: 0.15,
            absolute_std_floor: 1e-3,
            min_inlier_radius: 1.0,
        }
    }
}

/// Alert emission thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertPolicy {
    pub coercion_critical: f64,
    pub shouting_stress_critical: f64,
    pub anomaly_high: f64,
    pub wellness_stress: f64,
    pub low_quality: f64,
    /// Oldest alerts beyond this count are dropped
    pub max_retained: usize,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            coercion_critical: 0.85,
            shouting_stress_critical: 0.8,
            anomaly_high: 0.7,
            wellness_stress: 0.7,
            low_quality: 0.4,
            max_retained: 1000,
        }
    }
}

/// Attempt log retention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditPolicy {
    pub max_records: usize,
}

impl Default for AuditPolicy {
    fn default() -> Self {
        Self { max_records: 10_000 }
    }
}

impl GuardConfig {
    /// Parse configuration from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, GuardError> {
        let config: GuardConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, GuardError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| GuardError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, GuardError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check ranges and the deny < delay < permit ordering of thresholds
    pub fn validate(&self) -> Result<(), GuardError> {
        let f = &self.fusion;
        let unit = [
            ("fusion.anomaly_deny", f.anomaly_deny),
            ("fusion.low_match_deny", f.low_match_deny),
            ("fusion.low_match_anomaly", f.low_match_anomaly),
            ("fusion.stress_damping", f.stress_damping),
            ("fusion.coercion_deny", f.coercion_deny),
            ("fusion.shouting_stress_deny", f.shouting_stress_deny),
            ("fusion.very_loud_stress_deny", f.very_loud_stress_deny),
            ("fusion.deny_auth_floor", f.deny_auth_floor),
            ("fusion.stress_delay", f.stress_delay),
            ("fusion.coercion_delay", f.coercion_delay),
            ("fusion.unstable_stress_delay", f.unstable_stress_delay),
            ("fusion.unstable_stability", f.unstable_stability),
            ("fusion.dark_stress_delay", f.dark_stress_delay),
            ("fusion.tremor_stress_delay", f.tremor_stress_delay),
            ("fusion.match_delay", f.match_delay),
            ("fusion.env_low", f.env_low),
            ("fusion.stress_high", f.stress_high),
            ("fusion.permit_min_auth", f.permit_min_auth),
            ("coercion.multiple_subjects", self.coercion.multiple_subjects),
            (
                "coercion.stress_in_poor_environment",
                self.coercion.stress_in_poor_environment,
            ),
            ("coercion.shouting", self.coercion.shouting),
            ("coercion.very_loud", self.coercion.very_loud),
            ("coercion.very_dark", self.coercion.very_dark),
            ("coercion.tremor_high_pitch", self.coercion.tremor_high_pitch),
            ("alerts.coercion_critical", self.alerts.coercion_critical),
            (
                "alerts.shouting_stress_critical",
                self.alerts.shouting_stress_critical,
            ),
            ("alerts.anomaly_high", self.alerts.anomaly_high),
            ("alerts.wellness_stress", self.alerts.wellness_stress),
            ("alerts.low_quality", self.alerts.low_quality),
        ];
        for (name, value) in unit {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(GuardError::InvalidConfig(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if f.coercion_delay > f.coercion_deny {
            return Err(GuardError::InvalidConfig(
                "fusion.coercion_delay must not exceed fusion.coercion_deny".to_string(),
            ));
        }
        if f.deny_auth_floor >= f.permit_min_auth {
            return Err(GuardError::InvalidConfig(
                "fusion.deny_auth_floor must be below fusion.permit_min_auth".to_string(),
            ));
        }

        if self.alerts.max_retained == 0 || self.audit.max_records == 0 {
            return Err(GuardError::InvalidConfig(
                "alerts.max_retained and audit.max_records must be positive".to_string(),
            ));
        }

        let k = &self.keystroke;
        if k.min_enrollment_samples < 2 {
            return Err(GuardError::InvalidConfig(
                "keystroke.min_enrollment_samples must be at least 2".to_string(),
            ));
        }
        if k.max_enrollment_samples < k.min_enrollment_samples {
            return Err(GuardError::InvalidConfig(
                "keystroke.max_enrollment_samples must be >= min_enrollment_samples".to_string(),
            ));
        }
        let positive = [
            ("keystroke.missing_feature_penalty", k.missing_feature_penalty),
            ("keystroke.match_z_scale", k.match_z_scale),
            ("keystroke.absolute_std_floor", k.absolute_std_floor),
            ("keystroke.min_inlier_radius", k.min_inlier_radius),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(GuardError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if !k.relative_std_floor.is_finite() || k.relative_std_floor < 0.0 {
            return Err(GuardError::InvalidConfig(
                "keystroke.relative_std_floor must be non-negative".to_string(),
            ));
        }

        let e = &self.environment;
        let env = [
            ("environment.dark_brightness", e.dark_brightness),
            ("environment.very_dark_brightness", e.very_dark_brightness),
            ("environment.noisy_loudness", e.noisy_loudness),
            ("environment.very_loud_loudness", e.very_loud_loudness),
            ("environment.shouting_loudness", e.shouting_loudness),
            ("environment.shouting_pitch_hz", e.shouting_pitch_hz),
            ("environment.high_pitch_hz", e.high_pitch_hz),
            ("environment.tremor_zcr", e.tremor_zcr),
        ];
        for (name, value) in env {
            if !value.is_finite() || value < 0.0 {
                return Err(GuardError::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_is_valid() {
        assert!(GuardConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = GuardConfig::from_json(r#"{"fusion": {"permit_min_auth": 0.6}}"#).unwrap();
        assert_eq!(config.fusion.permit_min_auth, 0.6);
        assert_eq!(config.fusion.anomaly_deny, 0.85);
        assert_eq!(config.keystroke, KeystrokeConfig::default());
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let err = GuardConfig::from_json(r#"{"fusion": {"anomaly_deny": 1.5}}"#).unwrap_err();
        assert!(matches!(err, GuardError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_inverted_bucket_order() {
        let mut config = GuardConfig::default();
        config.fusion.coercion_delay = 0.9;
        config.fusion.coercion_deny = 0.8;
        assert!(config.validate().is_err());

        let mut config = GuardConfig::default();
        config.fusion.deny_auth_floor = 0.8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_tiny_enrollment_minimum() {
        let mut config = GuardConfig::default();
        config.keystroke.min_enrollment_samples = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = GuardConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(GuardConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_unenrolled_policy_parse() {
        let config = GuardConfig::from_json(r#"{"fusion": {"unenrolled": "delay"}}"#).unwrap();
        assert_eq!(config.fusion.unenrolled, UnenrolledPolicy::Delay);
    }
}
