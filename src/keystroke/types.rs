//! Keystroke data types
//!
//! Raw timing samples supplied by the caller and the scores produced by
//! verification.

use serde::{Deserialize, Serialize};

use crate::error::GuardError;

/// One key press/release pair. Times are in milliseconds on any monotonic clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeystrokeEvent {
    /// Key identifier (character, key code name, ...)
    #[serde(alias = "key_id")]
    pub key: String,
    /// Key-down time (ms)
    #[serde(alias = "t_down", alias = "press_time")]
    pub press_ms: f64,
    /// Key-up time (ms)
    #[serde(alias = "t_up", alias = "release_time")]
    pub release_ms: f64,
}

impl KeystrokeEvent {
    pub fn new(key: impl Into<String>, press_ms: f64, release_ms: f64) -> Self {
        Self {
            key: key.into(),
            press_ms,
            release_ms,
        }
    }

    /// Hold (dwell) time in ms
    pub fn hold_ms(&self) -> f64 {
        self.release_ms - self.press_ms
    }
}

/// An ordered typing sample (one entry of the secret)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeystrokeSample {
    pub events: Vec<KeystrokeEvent>,
}

/// Fewest keys a sample may contain (one digraph)
pub const MIN_SAMPLE_KEYS: usize = 2;

impl KeystrokeSample {
    pub fn new(events: Vec<KeystrokeEvent>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Check timings are usable: enough keys, finite non-negative times,
    /// release not before press.
    pub fn validate(&self) -> Result<(), GuardError> {
        if self.events.len() < MIN_SAMPLE_KEYS {
            return Err(GuardError::InvalidSample(format!(
                "sample has {} keys, need at least {}",
                self.events.len(),
                MIN_SAMPLE_KEYS
            )));
        }
        for (i, event) in self.events.iter().enumerate() {
            if event.key.is_empty() {
                return Err(GuardError::InvalidSample(format!("event {} has no key", i)));
            }
            if !event.press_ms.is_finite() || !event.release_ms.is_finite() {
                return Err(GuardError::InvalidSample(format!(
                    "event {} has non-finite timing",
                    i
                )));
            }
            if event.press_ms < 0.0 || event.release_ms < event.press_ms {
                return Err(GuardError::InvalidSample(format!(
                    "event {} released before press ({} < {})",
                    i, event.release_ms, event.press_ms
                )));
            }
        }
        Ok(())
    }

    /// Events ordered by press time (stable for equal presses)
    pub fn by_press_time(&self) -> Vec<&KeystrokeEvent> {
        let mut events: Vec<&KeystrokeEvent> = self.events.iter().collect();
        events.sort_by(|a, b| a.press_ms.total_cmp(&b.press_ms));
        events
    }
}

/// Verification result for one live sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeystrokeScore {
    /// Similarity to the template (1 = identical timing)
    pub match_score: f64,
    /// Outlier score (1 = most anomalous)
    pub anomaly_score: f64,
    /// `(match_score + (1 - anomaly_score)) / 2`
    pub confidence: f64,
    /// Scored against the last-known-good template while a rebuild was running
    #[serde(default)]
    pub template_stale: bool,
    /// Enrollment samples behind the template
    #[serde(default)]
    pub template_samples: u32,
}

impl KeystrokeScore {
    /// Build a score from its two components
    pub fn new(match_score: f64, anomaly_score: f64) -> Self {
        let match_score = match_score.clamp(0.0, 1.0);
        let anomaly_score = anomaly_score.clamp(0.0, 1.0);
        Self {
            match_score,
            anomaly_score,
            confidence: (match_score + (1.0 - anomaly_score)) / 2.0,
            template_stale: false,
            template_samples: 0,
        }
    }

    /// Reject scores that did not come from a scorer (e.g. deserialized input)
    pub fn validate(&self) -> Result<(), GuardError> {
        for (name, value) in [
            ("match_score", self.match_score),
            ("anomaly_score", self.anomaly_score),
            ("confidence", self.confidence),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(GuardError::InvalidEvidence(format!(
                    "keystroke {} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Enrollment state of an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Unenrolled,
    Enrolling { samples: usize, required: usize },
    Enrolled { samples: usize },
}

impl EnrollmentStatus {
    pub fn is_enrolled(&self) -> bool {
        matches!(self, EnrollmentStatus::Enrolled { .. })
    }
}

/// Result of an enrollment call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollOutcome {
    pub ok: bool,
    /// Samples retained for the identity after this call
    pub samples_count: usize,
    pub status: EnrollmentStatus,
    /// Whether this call (re)built the template
    pub template_rebuilt: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_json_aliases() {
        let json = r#"[
            {"key": "a", "t_down": 0.0, "t_up": 80.0},
            {"key_id": "b", "press_time": 120.0, "release_time": 190.0}
        ]"#;
        let sample: KeystrokeSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.len(), 2);
        assert_eq!(sample.events[1].key, "b");
        assert_eq!(sample.events[0].hold_ms(), 80.0);
        assert!(sample.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_sample() {
        let sample = KeystrokeSample::new(vec![KeystrokeEvent::new("a", 0.0, 50.0)]);
        assert!(matches!(
            sample.validate(),
            Err(GuardError::InvalidSample(_))
        ));
    }

    #[test]
    fn test_validate_rejects_release_before_press() {
        let sample = KeystrokeSample::new(vec![
            KeystrokeEvent::new("a", 100.0, 50.0),
            KeystrokeEvent::new("b", 200.0, 260.0),
        ]);
        assert!(sample.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nan() {
        let sample = KeystrokeSample::new(vec![
            KeystrokeEvent::new("a", 0.0, f64::NAN),
            KeystrokeEvent::new("b", 200.0, 260.0),
        ]);
        assert!(sample.validate().is_err());
    }

    #[test]
    fn test_score_confidence() {
        let score = KeystrokeScore::new(0.8, 0.1);
        assert!((score.confidence - 0.85).abs() < 1e-12);
        assert!(score.validate().is_ok());

        let mut bad = KeystrokeScore::new(0.8, 0.1);
        bad.anomaly_score = 1.4;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_by_press_time_orders_events() {
        let sample = KeystrokeSample::new(vec![
            KeystrokeEvent::new("b", 150.0, 200.0),
            KeystrokeEvent::new("a", 0.0, 60.0),
        ]);
        let ordered: Vec<&str> = sample
            .by_press_time()
            .iter()
            .map(|e| e.key.as_str())
            .collect();
        assert_eq!(ordered, vec!["a", "b"]);
    }
}
