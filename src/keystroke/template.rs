//! Per-identity keystroke template and live-sample scoring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::KeystrokeConfig;
use crate::error::GuardError;
use crate::keystroke::detector::{floored_scale, OutlierDetector};
use crate::keystroke::features::{
    mean, population_std, TimingFeatureExtractor, TimingFeatures, AGGREGATE_DIM,
};
use crate::keystroke::types::{KeystrokeSample, KeystrokeScore};

/// Enrollment statistics for one hold or flight feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureStat {
    pub mean: f64,
    pub std: f64,
    /// Enrollment samples containing this feature
    pub count: u32,
}

impl FeatureStat {
    fn from_values(values: &[f64]) -> Self {
        Self {
            mean: mean(values),
            std: population_std(values),
            count: values.len() as u32,
        }
    }

    /// Capped z-distance of a live value
    fn z(&self, value: f64, config: &KeystrokeConfig) -> f64 {
        let scale = floored_scale(self.mean, self.std, config);
        ((value - self.mean).abs() / scale).min(config.missing_feature_penalty)
    }
}

/// Statistical baseline of an identity's typing.
///
/// Rebuilt from scratch on every enrollment at or above the minimum sample
/// count and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeystrokeTemplate {
    pub hold_stats: BTreeMap<String, FeatureStat>,
    pub flight_stats: BTreeMap<String, FeatureStat>,
    pub sample_count: u32,
    pub detector: OutlierDetector,
    pub built_at: DateTime<Utc>,
}

impl KeystrokeTemplate {
    /// Fit a template on enrollment samples
    pub fn build(samples: &[KeystrokeSample], config: &KeystrokeConfig) -> Result<Self, GuardError> {
        if samples.len() < config.min_enrollment_samples {
            return Err(GuardError::UnenrolledIdentity(format!(
                "{} enrollment samples, need at least {}",
                samples.len(),
                config.min_enrollment_samples
            )));
        }

        let mut features = Vec::with_capacity(samples.len());
        for sample in samples {
            sample.validate()?;
            features.push(TimingFeatureExtractor::extract(sample));
        }

        let aggregates: Vec<[f64; AGGREGATE_DIM]> = features.iter().map(|f| f.aggregate).collect();

        Ok(Self {
            hold_stats: collect_stats(features.iter().map(|f| &f.holds)),
            flight_stats: collect_stats(features.iter().map(|f| &f.flights)),
            sample_count: samples.len() as u32,
            detector: OutlierDetector::fit(&aggregates, config),
            built_at: Utc::now(),
        })
    }

    /// Score a live sample against this template.
    ///
    /// Deterministic: the same sample and template always give the same score.
    pub fn score(&self, sample: &KeystrokeSample, config: &KeystrokeConfig) -> Result<KeystrokeScore, GuardError> {
        sample.validate()?;
        let features = TimingFeatureExtractor::extract(sample);

        let match_score = self.match_score(&features, config);
        let anomaly_score = self.detector.score(&features.aggregate);

        let mut score = KeystrokeScore::new(match_score, anomaly_score);
        score.template_samples = self.sample_count;
        Ok(score)
    }

    /// `1 - clip(mean_z / z_scale, 0, 1)` over the union of template and
    /// live features
    fn match_score(&self, features: &TimingFeatures, config: &KeystrokeConfig) -> f64 {
        let mut distances = Vec::new();
        compare(&self.hold_stats, &features.holds, config, &mut distances);
        compare(&self.flight_stats, &features.flights, config, &mut distances);

        if distances.is_empty() {
            return 0.0;
        }
        let normalized = mean(&distances) / config.match_z_scale;
        1.0 - normalized.clamp(0.0, 1.0)
    }
}

fn collect_stats<'a>(
    per_sample: impl Iterator<Item = &'a BTreeMap<String, f64>>,
) -> BTreeMap<String, FeatureStat> {
    let mut values: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for features in per_sample {
        for (key, value) in features {
            values.entry(key.clone()).or_default().push(*value);
        }
    }
    values
        .into_iter()
        .map(|(key, v)| (key, FeatureStat::from_values(&v)))
        .collect()
}

fn compare(
    template: &BTreeMap<String, FeatureStat>,
    live: &BTreeMap<String, f64>,
    config: &KeystrokeConfig,
    out: &mut Vec<f64>,
) {
    for (key, stat) in template {
        match live.get(key) {
            Some(value) => out.push(stat.z(*value, config)),
            None => out.push(config.missing_feature_penalty),
        }
    }
    // Live features the template never saw
    let unmatched = live.keys().filter(|k| !template.contains_key(*k)).count();
    out.extend(std::iter::repeat(config.missing_feature_penalty).take(unmatched));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystroke::testing::typed;

    fn enrollment() -> Vec<KeystrokeSample> {
        vec![
            typed("secret", 0.96),
            typed("secret", 1.0),
            typed("secret", 1.04),
        ]
    }

    #[test]
    fn test_build_requires_minimum_samples() {
        let err = KeystrokeTemplate::build(&enrollment()[..2], &KeystrokeConfig::default())
            .unwrap_err();
        assert!(matches!(err, GuardError::UnenrolledIdentity(_)));
    }

    #[test]
    fn test_build_collects_statistics() {
        let template = KeystrokeTemplate::build(&enrollment(), &KeystrokeConfig::default()).unwrap();
        assert_eq!(template.sample_count, 3);
        // "secret" has keys s, e, c, r, t and digraphs s>e, e>c, c>r, r>e, e>t
        assert_eq!(template.hold_stats.len(), 5);
        assert_eq!(template.flight_stats.len(), 5);
        assert_eq!(template.hold_stats["s"].count, 3);
        assert!(template.hold_stats["s"].std > 0.0);
    }

    #[test]
    fn test_genuine_sample_scores_high() {
        let config = KeystrokeConfig::default();
        let template = KeystrokeTemplate::build(&enrollment(), &config).unwrap();
        let score = template.score(&typed("secret", 1.0), &config).unwrap();

        assert!(score.match_score > 0.95, "match {}", score.match_score);
        assert_eq!(score.anomaly_score, 0.0);
        assert!(score.confidence > 0.95);
        assert_eq!(score.template_samples, 3);
        assert!(!score.template_stale);
    }

    #[test]
    fn test_impostor_timing_scores_low() {
        let config = KeystrokeConfig::default();
        let template = KeystrokeTemplate::build(&enrollment(), &config).unwrap();
        let score = template.score(&typed("secret", 2.2), &config).unwrap();

        assert!(score.match_score < 0.15, "match {}", score.match_score);
        assert!(score.anomaly_score > 0.85, "anomaly {}", score.anomaly_score);
    }

    #[test]
    fn test_unmatched_keys_are_penalized() {
        let config = KeystrokeConfig::default();
        let template = KeystrokeTemplate::build(&enrollment(), &config).unwrap();

        let same_text = template.score(&typed("secret", 1.0), &config).unwrap();
        let other_text = template.score(&typed("qwzxyu", 1.0), &config).unwrap();

        assert!(other_text.match_score < same_text.match_score);
        assert_eq!(other_text.match_score, 0.0);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let config = KeystrokeConfig::default();
        let template = KeystrokeTemplate::build(&enrollment(), &config).unwrap();
        let live = typed("secret", 1.3);
        assert_eq!(
            template.score(&live, &config).unwrap(),
            template.score(&live, &config).unwrap()
        );
    }

    #[test]
    fn test_invalid_live_sample_is_rejected() {
        let config = KeystrokeConfig::default();
        let template = KeystrokeTemplate::build(&enrollment(), &config).unwrap();
        let err = template
            .score(&KeystrokeSample::default(), &config)
            .unwrap_err();
        assert!(matches!(err, GuardError::InvalidSample(_)));
    }
}
