//! Evidence normalization
//!
//! Converts a raw per-modality probability vector into a canonical
//! `AffectEvidence` record: validated probabilities over the full label set,
//! the dominant label, and the weighted stress estimate. Malformed estimator
//! output is rejected here so that no NaN or out-of-range value can reach
//! the fusion formulas.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::GuardError;
use crate::types::{AffectEvidence, AffectLabel, EstimatorKind};

/// Allowed deviation of the probability sum from 1
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Normalizer for per-modality affect evidence
pub struct EvidenceNormalizer;

impl EvidenceNormalizer {
    /// Normalize a typed probability vector.
    ///
    /// Labels missing from `probabilities` are taken as 0. Fails with
    /// `InvalidEvidence` on duplicates, non-finite or negative values, or a
    /// sum outside `1 ± PROBABILITY_TOLERANCE`.
    pub fn normalize<L: AffectLabel>(
        probabilities: &[(L, f64)],
        source: EstimatorKind,
    ) -> Result<AffectEvidence<L>, GuardError> {
        let modality = L::MODALITY.as_str();
        let mut class_probabilities: BTreeMap<L, f64> =
            L::ALL.iter().map(|&label| (label, 0.0)).collect();
        let mut seen = Vec::with_capacity(probabilities.len());

        for &(label, p) in probabilities {
            if seen.contains(&label) {
                return Err(GuardError::InvalidEvidence(format!(
                    "{} label '{}' given more than once",
                    modality,
                    label.as_str()
                )));
            }
            seen.push(label);
            check_probability(modality, label.as_str(), p)?;
            class_probabilities.insert(label, p);
        }

        let sum: f64 = class_probabilities.values().sum();
        if (sum - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(GuardError::InvalidEvidence(format!(
                "{} probabilities sum to {:.8}, expected 1",
                modality, sum
            )));
        }

        let dominant_label = dominant_label(&class_probabilities);
        let stress_estimate = stress_estimate(&class_probabilities);

        debug!(
            modality,
            dominant = dominant_label.as_str(),
            stress = stress_estimate,
            ?source,
            "normalized affect evidence"
        );

        Ok(AffectEvidence {
            class_probabilities,
            dominant_label,
            stress_estimate,
            source,
        })
    }

    /// Normalize a probability map keyed by label name (estimator wire format).
    ///
    /// Unknown label names are rejected rather than ignored.
    pub fn normalize_named<L: AffectLabel>(
        probabilities: &BTreeMap<String, f64>,
        source: EstimatorKind,
    ) -> Result<AffectEvidence<L>, GuardError> {
        let mut typed = Vec::with_capacity(probabilities.len());
        for (name, &p) in probabilities {
            let label = L::parse(name).ok_or_else(|| {
                GuardError::InvalidEvidence(format!(
                    "unknown {} label '{}'",
                    L::MODALITY.as_str(),
                    name
                ))
            })?;
            typed.push((label, p));
        }
        Self::normalize(&typed, source)
    }

    /// Re-check evidence that did not come through `normalize` (e.g. deserialized)
    pub fn validate<L: AffectLabel>(evidence: &AffectEvidence<L>) -> Result<(), GuardError> {
        let typed: Vec<(L, f64)> = evidence
            .class_probabilities
            .iter()
            .map(|(&label, &p)| (label, p))
            .collect();
        let canonical = Self::normalize(&typed, evidence.source)?;
        if canonical.dominant_label != evidence.dominant_label {
            return Err(GuardError::InvalidEvidence(format!(
                "{} dominant label '{}' does not match probabilities (expected '{}')",
                L::MODALITY.as_str(),
                evidence.dominant_label.as_str(),
                canonical.dominant_label.as_str()
            )));
        }
        if !evidence.stress_estimate.is_finite()
            || (canonical.stress_estimate - evidence.stress_estimate).abs() > PROBABILITY_TOLERANCE
        {
            return Err(GuardError::InvalidEvidence(format!(
                "{} stress estimate {} does not match probabilities",
                L::MODALITY.as_str(),
                evidence.stress_estimate
            )));
        }
        Ok(())
    }
}

fn check_probability(modality: &str, label: &str, p: f64) -> Result<(), GuardError> {
    if !p.is_finite() {
        return Err(GuardError::InvalidEvidence(format!(
            "{} probability for '{}' is not finite",
            modality, label
        )));
    }
    if p < 0.0 || p > 1.0 + PROBABILITY_TOLERANCE {
        return Err(GuardError::InvalidEvidence(format!(
            "{} probability for '{}' out of range: {}",
            modality, label, p
        )));
    }
    Ok(())
}

/// Argmax over the label set; exact ties go to the label earliest in
/// `TIE_PRIORITY`.
fn dominant_label<L: AffectLabel>(probabilities: &BTreeMap<L, f64>) -> L {
    let mut best = L::TIE_PRIORITY[0];
    let mut best_p = f64::NEG_INFINITY;
    for &label in L::TIE_PRIORITY {
        let p = probabilities.get(&label).copied().unwrap_or(0.0);
        if p > best_p {
            best = label;
            best_p = p;
        }
    }
    best
}

/// Weighted sum over the negative-affect labels
fn stress_estimate<L: AffectLabel>(probabilities: &BTreeMap<L, f64>) -> f64 {
    probabilities
        .iter()
        .map(|(label, p)| p * label.stress_weight())
        .sum::<f64>()
        .clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FacialLabel, VoiceLabel};

    #[test]
    fn test_normalize_fills_missing_labels() {
        let evidence = EvidenceNormalizer::normalize(
            &[(FacialLabel::Happy, 0.7), (FacialLabel::Neutral, 0.3)],
            EstimatorKind::Trained,
        )
        .unwrap();

        assert_eq!(evidence.class_probabilities.len(), 7);
        assert_eq!(evidence.probability(FacialLabel::Angry), 0.0);
        assert_eq!(evidence.dominant_label, FacialLabel::Happy);
        assert_eq!(evidence.stress_estimate, 0.0);
        let sum: f64 = evidence.class_probabilities.values().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_facial_stress_weights() {
        let evidence = EvidenceNormalizer::normalize(
            &[
                (FacialLabel::Angry, 0.25),
                (FacialLabel::Fear, 0.25),
                (FacialLabel::Disgust, 0.25),
                (FacialLabel::Sad, 0.25),
            ],
            EstimatorKind::Trained,
        )
        .unwrap();

        // 0.25 * (0.8 + 0.7 + 0.6 + 0.3) = 0.6
        assert!((evidence.stress_estimate - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_voice_stress_weights() {
        let evidence = EvidenceNormalizer::normalize(
            &[(VoiceLabel::Angry, 0.5), (VoiceLabel::Sad, 0.5)],
            EstimatorKind::Heuristic,
        )
        .unwrap();

        // 0.5 * 0.9 + 0.5 * 0.4 = 0.65
        assert!((evidence.stress_estimate - 0.65).abs() < 1e-9);
        assert_eq!(evidence.source, EstimatorKind::Heuristic);
    }

    #[test]
    fn test_tie_break_is_deterministic_and_conservative() {
        let forward = EvidenceNormalizer::normalize(
            &[(FacialLabel::Happy, 0.5), (FacialLabel::Angry, 0.5)],
            EstimatorKind::Trained,
        )
        .unwrap();
        let reversed = EvidenceNormalizer::normalize(
            &[(FacialLabel::Angry, 0.5), (FacialLabel::Happy, 0.5)],
            EstimatorKind::Trained,
        )
        .unwrap();

        assert_eq!(forward.dominant_label, FacialLabel::Angry);
        assert_eq!(reversed.dominant_label, FacialLabel::Angry);

        let voice = EvidenceNormalizer::normalize(
            &[(VoiceLabel::Calm, 0.5), (VoiceLabel::Neutral, 0.5)],
            EstimatorKind::Trained,
        )
        .unwrap();
        assert_eq!(voice.dominant_label, VoiceLabel::Neutral);
    }

    #[test]
    fn test_uniform_distribution_tie() {
        let p = 1.0 / 8.0;
        let probs: Vec<(VoiceLabel, f64)> = VoiceLabel::ALL.iter().map(|&l| (l, p)).collect();
        let evidence = EvidenceNormalizer::normalize(&probs, EstimatorKind::Trained).unwrap();
        assert_eq!(evidence.dominant_label, VoiceLabel::Angry);
    }

    #[test]
    fn test_rejects_bad_sum() {
        let result = EvidenceNormalizer::normalize(
            &[(FacialLabel::Happy, 0.7), (FacialLabel::Sad, 0.2)],
            EstimatorKind::Trained,
        );
        assert!(matches!(result, Err(GuardError::InvalidEvidence(_))));
    }

    #[test]
    fn test_rejects_negative_and_nan() {
        let negative = EvidenceNormalizer::normalize(
            &[(FacialLabel::Happy, 1.2), (FacialLabel::Sad, -0.2)],
            EstimatorKind::Trained,
        );
        assert!(matches!(negative, Err(GuardError::InvalidEvidence(_))));

        let nan = EvidenceNormalizer::normalize(
            &[(FacialLabel::Happy, f64::NAN)],
            EstimatorKind::Trained,
        );
        assert!(matches!(nan, Err(GuardError::InvalidEvidence(_))));
    }

    #[test]
    fn test_rejects_duplicate_labels() {
        let result = EvidenceNormalizer::normalize(
            &[(FacialLabel::Happy, 0.5), (FacialLabel::Happy, 0.5)],
            EstimatorKind::Trained,
        );
        assert!(matches!(result, Err(GuardError::InvalidEvidence(_))));
    }

    #[test]
    fn test_normalize_named() {
        let mut probs = BTreeMap::new();
        probs.insert("calm".to_string(), 0.7);
        probs.insert("happy".to_string(), 0.2);
        probs.insert("sad".to_string(), 0.1);

        let evidence: AffectEvidence<VoiceLabel> =
            EvidenceNormalizer::normalize_named(&probs, EstimatorKind::Trained).unwrap();
        assert_eq!(evidence.dominant_label, VoiceLabel::Calm);
        assert!((evidence.stress_estimate - 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_named_rejects_unknown_label() {
        let mut probs = BTreeMap::new();
        probs.insert("contempt".to_string(), 1.0);
        let result: Result<AffectEvidence<FacialLabel>, _> =
            EvidenceNormalizer::normalize_named(&probs, EstimatorKind::Trained);
        assert!(matches!(result, Err(GuardError::InvalidEvidence(_))));
    }

    #[test]
    fn test_validate_detects_tampered_dominant_label() {
        let mut evidence = EvidenceNormalizer::normalize(
            &[(FacialLabel::Sad, 0.8), (FacialLabel::Happy, 0.2)],
            EstimatorKind::Trained,
        )
        .unwrap();
        assert!(EvidenceNormalizer::validate(&evidence).is_ok());

        evidence.dominant_label = FacialLabel::Happy;
        assert!(EvidenceNormalizer::validate(&evidence).is_err());
    }
}
