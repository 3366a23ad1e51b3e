//! Affect estimator abstraction
//!
//! Classifiers that turn video frames or audio features into probability
//! vectors live outside this crate. They plug in through `AffectEstimator`,
//! which reports whether it is a trained model or a heuristic; the evidence
//! it yields is stamped with that kind and is otherwise indistinguishable to
//! the fusion engine.

use crate::error::GuardError;
use crate::normalizer::EvidenceNormalizer;
use crate::types::{AffectEvidence, AffectLabel, EstimatorKind};

/// A per-modality affect estimator
pub trait AffectEstimator<L: AffectLabel> {
    /// Raw input the estimator consumes (frame, audio features, ...)
    type Input: ?Sized;

    /// Trained model or heuristic
    fn kind(&self) -> EstimatorKind;

    /// Produce a raw probability vector
    fn estimate(&self, input: &Self::Input) -> Result<Vec<(L, f64)>, GuardError>;

    /// Estimate and normalize in one step
    fn evidence(&self, input: &Self::Input) -> Result<AffectEvidence<L>, GuardError> {
        let probabilities = self.estimate(input)?;
        EvidenceNormalizer::normalize(&probabilities, self.kind())
    }
}

/// Estimator that replays a fixed probability vector.
///
/// Used for simulation and for replaying recorded estimator output.
#[derive(Debug, Clone)]
pub struct FixedEstimator<L: AffectLabel> {
    kind: EstimatorKind,
    probabilities: Vec<(L, f64)>,
}

impl<L: AffectLabel> FixedEstimator<L> {
    pub fn new(kind: EstimatorKind, probabilities: Vec<(L, f64)>) -> Self {
        Self {
            kind,
            probabilities,
        }
    }
}

impl<L: AffectLabel> AffectEstimator<L> for FixedEstimator<L> {
    type Input = ();

    fn kind(&self) -> EstimatorKind {
        self.kind
    }

    fn estimate(&self, _input: &()) -> Result<Vec<(L, f64)>, GuardError> {
        Ok(self.probabilities.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FacialLabel, VoiceLabel};

    #[test]
    fn test_fixed_estimator_stamps_kind() {
        let trained = FixedEstimator::new(
            EstimatorKind::Trained,
            vec![(FacialLabel::Neutral, 0.6), (FacialLabel::Happy, 0.4)],
        );
        let heuristic = FixedEstimator::new(
            EstimatorKind::Heuristic,
            vec![(FacialLabel::Neutral, 0.6), (FacialLabel::Happy, 0.4)],
        );

        let a = trained.evidence(&()).unwrap();
        let b = heuristic.evidence(&()).unwrap();

        assert_eq!(a.source, EstimatorKind::Trained);
        assert_eq!(b.source, EstimatorKind::Heuristic);
        assert_eq!(a.class_probabilities, b.class_probabilities);
        assert_eq!(a.dominant_label, b.dominant_label);
    }

    #[test]
    fn test_fixed_estimator_propagates_invalid_output() {
        let broken = FixedEstimator::new(EstimatorKind::Heuristic, vec![(VoiceLabel::Calm, 0.4)]);
        assert!(matches!(
            broken.evidence(&()),
            Err(GuardError::InvalidEvidence(_))
        ));
    }
}
