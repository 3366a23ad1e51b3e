//! Immediate-denial predicates
//!
//! Checked in a fixed order; the first that holds decides the attempt
//! regardless of any computed score.

use crate::config::FusionPolicy;
use crate::fusion::scoring::Evidence;
use crate::types::{AffectLabel, DenialPredicate, FacialEvidence, VoiceEvidence};

/// First predicate (b–g) that holds for complete evidence.
///
/// Credential mismatch (a) is checked by the caller before evidence is
/// required at all.
pub fn first_denial(evidence: &Evidence<'_>, policy: &FusionPolicy) -> Option<DenialPredicate> {
    if let Some(predicate) = subject_denial(evidence.face_count, evidence.facial, evidence.voice) {
        return Some(predicate);
    }

    let keystroke = evidence.keystroke;
    if keystroke.anomaly_score > policy.anomaly_deny {
        return Some(DenialPredicate::BehavioralAnomaly);
    }
    if keystroke.match_score < policy.low_match_deny
        && keystroke.anomaly_score > policy.low_match_anomaly
    {
        return Some(DenialPredicate::LowMatchHighAnomaly);
    }
    None
}

/// Predicates b–e. They need no keystroke score, so they also apply when
/// the identity has no usable template.
pub fn subject_denial(
    face_count: u32,
    facial: &FacialEvidence,
    voice: &VoiceEvidence,
) -> Option<DenialPredicate> {
    if face_count == 0 {
        return Some(DenialPredicate::NoSubject);
    }
    if face_count > 1 {
        return Some(DenialPredicate::MultipleSubjects);
    }
    if !facial.dominant_label.is_permissive() {
        return Some(DenialPredicate::NegativeFacialAffect);
    }
    if !voice.dominant_label.is_permissive() {
        return Some(DenialPredicate::NegativeVoiceAffect);
    }
    None
}

/// Both dominant labels pass the emotion check
pub fn emotion_check(facial: &FacialEvidence, voice: &VoiceEvidence) -> bool {
    facial.dominant_label.is_permissive() && voice.dominant_label.is_permissive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystroke::KeystrokeScore;
    use crate::normalizer::EvidenceNormalizer;
    use crate::types::{
        EnvironmentEvidence, EstimatorKind, FacialEvidence, FacialLabel, VoiceEvidence, VoiceLabel,
    };

    fn facial(label: FacialLabel) -> FacialEvidence {
        EvidenceNormalizer::normalize(&[(label, 1.0)], EstimatorKind::Trained).unwrap()
    }

    fn voice(label: VoiceLabel) -> VoiceEvidence {
        EvidenceNormalizer::normalize(&[(label, 1.0)], EstimatorKind::Trained).unwrap()
    }

    fn check(
        face_count: u32,
        f: FacialLabel,
        v: VoiceLabel,
        keystroke: KeystrokeScore,
    ) -> Option<DenialPredicate> {
        let facial = facial(f);
        let voice = voice(v);
        let environment = EnvironmentEvidence::new(0.8, 0.8);
        let evidence = Evidence {
            face_count,
            facial: &facial,
            voice: &voice,
            keystroke: &keystroke,
            environment: &environment,
        };
        first_denial(&evidence, &FusionPolicy::default())
    }

    #[test]
    fn test_clean_evidence_passes() {
        assert_eq!(
            check(1, FacialLabel::Happy, VoiceLabel::Calm, KeystrokeScore::new(0.8, 0.1)),
            None
        );
    }

    #[test]
    fn test_predicate_order() {
        // Face count is checked before affect
        assert_eq!(
            check(0, FacialLabel::Angry, VoiceLabel::Angry, KeystrokeScore::new(0.0, 1.0)),
            Some(DenialPredicate::NoSubject)
        );
        assert_eq!(
            check(3, FacialLabel::Angry, VoiceLabel::Angry, KeystrokeScore::new(0.0, 1.0)),
            Some(DenialPredicate::MultipleSubjects)
        );
        // Facial affect before voice affect
        assert_eq!(
            check(1, FacialLabel::Fear, VoiceLabel::Angry, KeystrokeScore::new(0.8, 0.1)),
            Some(DenialPredicate::NegativeFacialAffect)
        );
        assert_eq!(
            check(1, FacialLabel::Neutral, VoiceLabel::Sad, KeystrokeScore::new(0.0, 1.0)),
            Some(DenialPredicate::NegativeVoiceAffect)
        );
    }

    #[test]
    fn test_subject_denial_ignores_keystrokes() {
        assert_eq!(
            subject_denial(2, &facial(FacialLabel::Happy), &voice(VoiceLabel::Calm)),
            Some(DenialPredicate::MultipleSubjects)
        );
        assert_eq!(
            subject_denial(1, &facial(FacialLabel::Happy), &voice(VoiceLabel::Fearful)),
            Some(DenialPredicate::NegativeVoiceAffect)
        );
        assert_eq!(
            subject_denial(1, &facial(FacialLabel::Surprised), &voice(VoiceLabel::Neutral)),
            None
        );
    }

    #[test]
    fn test_keystroke_predicates() {
        assert_eq!(
            check(1, FacialLabel::Happy, VoiceLabel::Calm, KeystrokeScore::new(0.9, 0.9)),
            Some(DenialPredicate::BehavioralAnomaly)
        );
        assert_eq!(
            check(1, FacialLabel::Happy, VoiceLabel::Calm, KeystrokeScore::new(0.1, 0.82)),
            Some(DenialPredicate::LowMatchHighAnomaly)
        );
        // Low match alone is left to graded scoring
        assert_eq!(
            check(1, FacialLabel::Happy, VoiceLabel::Calm, KeystrokeScore::new(0.1, 0.5)),
            None
        );
    }
}
