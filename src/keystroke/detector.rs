//! Outlier detection over aggregate timing vectors
//!
//! A diagonal elliptic envelope: each dimension is standardized by its
//! enrollment mean and (floored) standard deviation, and a sample's distance
//! is the RMS of its z-scores. The inlier radius is calibrated on the
//! enrollment vectors themselves, so a template built from very consistent
//! typing is stricter than one built from noisy typing.
//!
//! Fitting and scoring are both deterministic.

use serde::{Deserialize, Serialize};

use crate::config::KeystrokeConfig;
use crate::keystroke::features::{mean, population_std, AGGREGATE_DIM};

/// Fitted detector state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierDetector {
    /// Per-dimension location
    pub center: Vec<f64>,
    /// Per-dimension scale (floored std)
    pub scale: Vec<f64>,
    /// RMS z-distance at or below which a sample is a full inlier
    pub inlier_radius: f64,
}

impl OutlierDetector {
    /// Fit on enrollment vectors. Callers guarantee at least one vector.
    pub fn fit(vectors: &[[f64; AGGREGATE_DIM]], config: &KeystrokeConfig) -> Self {
        let mut center = Vec::with_capacity(AGGREGATE_DIM);
        let mut scale = Vec::with_capacity(AGGREGATE_DIM);

        for dim in 0..AGGREGATE_DIM {
            let column: Vec<f64> = vectors.iter().map(|v| v[dim]).collect();
            let m = mean(&column);
            let s = population_std(&column);
            center.push(m);
            scale.push(floored_scale(m, s, config));
        }

        let mut detector = Self {
            center,
            scale,
            inlier_radius: config.min_inlier_radius,
        };

        let calibrated = vectors
            .iter()
            .map(|v| detector.distance(v))
            .fold(0.0_f64, f64::max);
        detector.inlier_radius = calibrated.max(config.min_inlier_radius);
        detector
    }

    /// RMS z-distance of a vector from the center
    pub fn distance(&self, vector: &[f64; AGGREGATE_DIM]) -> f64 {
        let sum_sq: f64 = vector
            .iter()
            .zip(self.center.iter().zip(self.scale.iter()))
            .map(|(x, (c, s))| ((x - c) / s).powi(2))
            .sum();
        (sum_sq / AGGREGATE_DIM as f64).sqrt()
    }

    /// Anomaly score in [0, 1]; 0 inside the inlier radius, approaching 1
    /// as the distance grows.
    ///
    /// Formula: `1 - exp(-max(0, d - r) / r)`
    pub fn score(&self, vector: &[f64; AGGREGATE_DIM]) -> f64 {
        let d = self.distance(vector);
        if !d.is_finite() {
            return 1.0;
        }
        let excess = (d - self.inlier_radius).max(0.0);
        (1.0 - (-excess / self.inlier_radius).exp()).clamp(0.0, 1.0)
    }
}

/// Standard deviation floored relative to the mean and absolutely
pub(crate) fn floored_scale(mean: f64, std: f64, config: &KeystrokeConfig) -> f64 {
    std.max(config.relative_std_floor * mean.abs())
        .max(config.absolute_std_floor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(base: f64) -> [f64; AGGREGATE_DIM] {
        [
            base,
            10.0,
            base - 10.0,
            base + 10.0,
            120.0,
            20.0,
            105.0,
            135.0,
            8.0,
            1.6,
            5.0,
        ]
    }

    fn training() -> Vec<[f64; AGGREGATE_DIM]> {
        vec![vector(95.0), vector(100.0), vector(105.0), vector(98.0)]
    }

    #[test]
    fn test_training_vectors_are_inliers() {
        let detector = OutlierDetector::fit(&training(), &KeystrokeConfig::default());
        for v in training() {
            assert_eq!(detector.score(&v), 0.0);
        }
    }

    #[test]
    fn test_distant_vector_is_anomalous() {
        let detector = OutlierDetector::fit(&training(), &KeystrokeConfig::default());
        let mut slow = vector(200.0);
        slow[4] = 300.0;
        slow[9] = 4.0;
        slow[10] = 2.0;
        assert!(detector.score(&slow) > 0.9);
    }

    #[test]
    fn test_score_is_monotonic_in_distance() {
        let detector = OutlierDetector::fit(&training(), &KeystrokeConfig::default());
        let mut previous = 0.0;
        for base in [100.0, 120.0, 140.0, 180.0, 260.0] {
            let score = detector.score(&vector(base));
            assert!(score >= previous);
            previous = score;
        }
    }

    #[test]
    fn test_identical_training_uses_floors() {
        let same = vec![vector(100.0); 3];
        let config = KeystrokeConfig::default();
        let detector = OutlierDetector::fit(&same, &config);

        assert!(detector.scale.iter().all(|s| *s > 0.0));
        assert_eq!(detector.inlier_radius, config.min_inlier_radius);
        assert_eq!(detector.score(&vector(100.0)), 0.0);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let config = KeystrokeConfig::default();
        assert_eq!(
            OutlierDetector::fit(&training(), &config),
            OutlierDetector::fit(&training(), &config)
        );
    }
}
