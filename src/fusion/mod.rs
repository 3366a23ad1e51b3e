//! Decision fusion
//!
//! Combines credential, face-count, affect, keystroke and environment
//! evidence into one categorical decision:
//!
//! 1. credential mismatch short-circuits
//! 2. missing or malformed evidence fails closed
//! 3. immediate-denial predicates, in fixed priority order
//! 4. graded scoring and bucket thresholds
//! 5. confidence/stress rescaling into the chosen bucket's band
//!
//! All scores are computed even when a predicate decides, so every result
//! is fully populated for audit.

pub mod guidance;
pub mod predicates;
pub mod scoring;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{GuardConfig, UnenrolledPolicy};
use crate::environment::{self, EnvironmentFlags};
use crate::error::{ErrorKind, GuardError};
use crate::keystroke::KeystrokeScore;
use crate::normalizer::EvidenceNormalizer;
use crate::types::{
    Decision, DecisionBasis, DenialPredicate, EmotionalState, EnvironmentEvidence, FacialEvidence,
    FusionResult, VoiceEvidence,
};

use guidance::GuidanceContext;
use scoring::{Evidence, GradedScores};

pub use scoring::{coercion_risk, CoercionSignals};

/// Everything the engine consumes for one attempt. Any field may be absent;
/// absence fails closed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionInputs {
    pub credential_match: Option<bool>,
    pub face_count: Option<u32>,
    pub facial: Option<FacialEvidence>,
    pub voice: Option<VoiceEvidence>,
    pub keystroke: Option<KeystrokeScore>,
    pub environment: Option<EnvironmentEvidence>,
}

impl FusionInputs {
    /// Borrow the evidence when every field is present
    fn complete(&self) -> Result<Evidence<'_>, GuardError> {
        let missing = |what: &str| GuardError::MissingEvidence(what.to_string());
        Ok(Evidence {
            face_count: self.face_count.ok_or_else(|| missing("face_count"))?,
            facial: self.facial.as_ref().ok_or_else(|| missing("facial"))?,
            voice: self.voice.as_ref().ok_or_else(|| missing("voice"))?,
            keystroke: self.keystroke.as_ref().ok_or_else(|| missing("keystroke"))?,
            environment: self
                .environment
                .as_ref()
                .ok_or_else(|| missing("environment"))?,
        })
    }
}

fn validate(evidence: &Evidence<'_>) -> Result<(), GuardError> {
    EvidenceNormalizer::validate(evidence.facial)?;
    EvidenceNormalizer::validate(evidence.voice)?;
    evidence.keystroke.validate()?;
    environment::validate(evidence.environment)
}

/// Affect and keystroke evidence reported on a result
#[derive(Clone, Copy)]
struct Observed<'a> {
    facial: &'a FacialEvidence,
    voice: &'a VoiceEvidence,
    keystroke: Option<&'a KeystrokeScore>,
}

impl<'a> From<&Evidence<'a>> for Observed<'a> {
    fn from(evidence: &Evidence<'a>) -> Self {
        Self {
            facial: evidence.facial,
            voice: evidence.voice,
            keystroke: Some(evidence.keystroke),
        }
    }
}

/// The decision-fusion engine. Stateless apart from its policy.
#[derive(Debug, Clone, Default)]
pub struct FusionEngine {
    config: GuardConfig,
}

impl FusionEngine {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Fuse evidence into a result.
    ///
    /// Errors only for missing or malformed evidence; callers that need a
    /// decision either way use [`FusionEngine::decide`].
    pub fn fuse(&self, inputs: &FusionInputs) -> Result<FusionResult, GuardError> {
        if inputs.credential_match == Some(false) {
            return Ok(self.credential_mismatch(inputs));
        }
        if inputs.credential_match.is_none() {
            return Err(GuardError::MissingEvidence("credential_match".to_string()));
        }

        let evidence = inputs.complete()?;
        validate(&evidence)?;

        let flags = EnvironmentFlags::derive(evidence.environment, &self.config.environment);
        let scores = self.scores(&evidence, &flags);

        debug!(
            stress = scores.stress,
            coercion_risk = scores.coercion_risk,
            biometric_score = scores.biometric_score,
            env_score = scores.env_score,
            auth_score = scores.auth_score,
            "graded scores"
        );

        let basis = match predicates::first_denial(&evidence, &self.config.fusion) {
            Some(predicate) => DecisionBasis::Predicate(predicate),
            None => DecisionBasis::Graded(scoring::select_rule(
                &scores,
                &flags,
                &self.config.fusion,
            )),
        };

        let result = self.assemble(basis, &scores, Some(Observed::from(&evidence)), flags);
        info!(
            decision = result.decision.as_str(),
            reason = %result.reason,
            confidence = result.confidence,
            "fusion decision"
        );
        Ok(result)
    }

    /// Fuse evidence, mapping every error to a fail-closed result
    pub fn decide(&self, inputs: &FusionInputs) -> FusionResult {
        match self.fuse(inputs) {
            Ok(result) => result,
            Err(err) => self.fail_closed_with_evidence(inputs, &err),
        }
    }

    /// Fail closed, but report a subject-level denial (predicates b–e) when
    /// the face and affect evidence alone are enough to decide it.
    ///
    /// An unenrolled identity still denies on multiple subjects or negative
    /// affect, whatever the unenrolled policy says.
    pub fn fail_closed_with_evidence(&self, inputs: &FusionInputs, err: &GuardError) -> FusionResult {
        let subject = match (inputs.face_count, &inputs.facial, &inputs.voice) {
            (Some(face_count), Some(facial), Some(voice))
                if EvidenceNormalizer::validate(facial).is_ok()
                    && EvidenceNormalizer::validate(voice).is_ok() =>
            {
                predicates::subject_denial(face_count, facial, voice)
                    .map(|predicate| (predicate, face_count, facial, voice))
            }
            _ => None,
        };
        let Some((predicate, face_count, facial, voice)) = subject else {
            return self.fail_closed(err);
        };

        let room = inputs
            .environment
            .as_ref()
            .filter(|env| environment::validate(env).is_ok());
        let flags = room
            .map(|env| EnvironmentFlags::derive(env, &self.config.environment))
            .unwrap_or_default();
        let scores = scoring::compute_subject(
            face_count,
            facial,
            voice,
            room,
            &flags,
            &self.config.fusion,
            &self.config.coercion,
        );

        let result = self.assemble(
            DecisionBasis::Predicate(predicate),
            &scores,
            Some(Observed {
                facial,
                voice,
                keystroke: None,
            }),
            flags,
        );
        warn!(
            error = %err,
            reason = %result.reason,
            "subject denial on incomplete evidence"
        );
        result
    }

    /// Result for an attempt that could not be scored.
    ///
    /// `UnenrolledIdentity` follows the configured policy (deny or delay);
    /// every other error denies. Never permits.
    pub fn fail_closed(&self, err: &GuardError) -> FusionResult {
        let kind = err.kind();
        let decision = match (kind, self.config.fusion.unenrolled) {
            (ErrorKind::Enrollment, UnenrolledPolicy::Delay) => Decision::Delay,
            _ => Decision::Deny,
        };
        warn!(error = %err, decision = decision.as_str(), "fail-closed decision");

        let (confidence, stress) = scoring::rescale(decision, 0.0, 0.0);
        let guidance = match (kind, decision) {
            (ErrorKind::Enrollment, Decision::Delay) => {
                "Authentication delayed. Please complete keystroke enrollment and try again."
            }
            (ErrorKind::Enrollment, _) => {
                "Access denied. Please complete keystroke enrollment before signing in."
            }
            (ErrorKind::Input, _) => {
                "Access denied. Some authentication signals could not be read. Please try again."
            }
            _ => "Access denied. Authentication could not be completed. Please contact support.",
        };
        let basis = DecisionBasis::SystemError(kind);

        FusionResult {
            decision,
            confidence,
            stress,
            stress_facial: 0.0,
            stress_voice: 0.0,
            coercion_risk: 0.0,
            biometric_score: 0.0,
            env_score: 0.0,
            auth_score: 0.0,
            reason: basis.reason(),
            basis,
            guidance: guidance.to_string(),
            facial_emotion: None,
            voice_emotion: None,
            emotion_check_passed: false,
            emotional_state: EmotionalState::Unknown,
            ui_adaptation: guidance::ui_adaptation(stress, decision, &EnvironmentFlags::default()),
            wellness_alert: false,
            environment_flags: EnvironmentFlags::default(),
            recommendations: Vec::new(),
            keystroke: None,
            computed_at: Utc::now(),
        }
    }

    fn credential_mismatch(&self, inputs: &FusionInputs) -> FusionResult {
        let basis = DecisionBasis::Predicate(DenialPredicate::CredentialMismatch);
        // Scores are reported when the rest of the evidence is usable
        let evidence = inputs
            .complete()
            .ok()
            .filter(|evidence| validate(evidence).is_ok());

        let result = match evidence {
            Some(evidence) => {
                let flags =
                    EnvironmentFlags::derive(evidence.environment, &self.config.environment);
                let scores = self.scores(&evidence, &flags);
                self.assemble(basis, &scores, Some(Observed::from(&evidence)), flags)
            }
            None => self.assemble(basis, &GradedScores::default(), None, EnvironmentFlags::default()),
        };
        info!(decision = result.decision.as_str(), reason = %result.reason, "fusion decision");
        result
    }

    fn scores(&self, evidence: &Evidence<'_>, flags: &EnvironmentFlags) -> GradedScores {
        scoring::compute(evidence, flags, &self.config.fusion, &self.config.coercion)
    }

    fn assemble(
        &self,
        basis: DecisionBasis,
        scores: &GradedScores,
        observed: Option<Observed<'_>>,
        flags: EnvironmentFlags,
    ) -> FusionResult {
        let decision = match basis {
            DecisionBasis::Predicate(_) | DecisionBasis::SystemError(_) => Decision::Deny,
            DecisionBasis::Graded(rule) => rule.bucket(),
        };
        let (confidence, stress) = scoring::rescale(decision, scores.auth_score, scores.stress);

        let facial_emotion = observed.map(|o| o.facial.dominant_label);
        let voice_emotion = observed.map(|o| o.voice.dominant_label);

        let mut recommendations = flags.recommendations();
        if scores.coercion_risk > 0.5 {
            recommendations
                .push("Environmental conditions suggest potential duress".to_string());
        }

        let emotional_state = match (basis, observed) {
            (DecisionBasis::Predicate(DenialPredicate::MultipleSubjects), _) => {
                EmotionalState::SecurityBreach
            }
            (_, Some(o)) => guidance::emotional_state(
                scores.stress_facial,
                scores.stress_voice,
                o.facial.dominant_label,
                o.voice.dominant_label,
            ),
            (_, None) => EmotionalState::Unknown,
        };

        let guidance = guidance::guidance(&GuidanceContext {
            decision,
            stress,
            coercion_risk: scores.coercion_risk,
            flags: &flags,
            recommendations: &recommendations,
            facial: facial_emotion,
            voice: voice_emotion,
        });

        FusionResult {
            decision,
            confidence,
            stress,
            stress_facial: scores.stress_facial,
            stress_voice: scores.stress_voice,
            coercion_risk: scores.coercion_risk,
            biometric_score: scores.biometric_score,
            env_score: scores.env_score,
            auth_score: scores.auth_score,
            reason: basis.reason(),
            basis,
            guidance,
            facial_emotion,
            voice_emotion,
            emotion_check_passed: observed
                .is_some_and(|o| predicates::emotion_check(o.facial, o.voice)),
            emotional_state,
            ui_adaptation: guidance::ui_adaptation(stress, decision, &flags),
            wellness_alert: guidance::wellness_alert(stress, decision),
            environment_flags: flags,
            recommendations,
            keystroke: observed.and_then(|o| o.keystroke.cloned()),
            computed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::FusionInputs;
    use crate::keystroke::KeystrokeScore;
    use crate::normalizer::EvidenceNormalizer;
    use crate::types::{
        EnvironmentEvidence, EstimatorKind, FacialEvidence, FacialLabel, VoiceEvidence, VoiceLabel,
    };

    /// Mostly happy face (stress 0.03)
    pub fn happy_face() -> FacialEvidence {
        EvidenceNormalizer::normalize(
            &[
                (FacialLabel::Happy, 0.7),
                (FacialLabel::Neutral, 0.2),
                (FacialLabel::Sad, 0.1),
            ],
            EstimatorKind::Trained,
        )
        .unwrap()
    }

    /// Mostly sad face
    pub fn sad_face() -> FacialEvidence {
        EvidenceNormalizer::normalize(
            &[
                (FacialLabel::Sad, 0.6),
                (FacialLabel::Neutral, 0.3),
                (FacialLabel::Fear, 0.1),
            ],
            EstimatorKind::Trained,
        )
        .unwrap()
    }

    /// Mostly calm voice (stress 0.04)
    pub fn calm_voice() -> VoiceEvidence {
        EvidenceNormalizer::normalize(
            &[
                (VoiceLabel::Calm, 0.7),
                (VoiceLabel::Happy, 0.2),
                (VoiceLabel::Sad, 0.1),
            ],
            EstimatorKind::Heuristic,
        )
        .unwrap()
    }

    /// Scenario A evidence: everything nominal
    pub fn nominal() -> FusionInputs {
        FusionInputs {
            credential_match: Some(true),
            face_count: Some(1),
            facial: Some(happy_face()),
            voice: Some(calm_voice()),
            keystroke: Some(KeystrokeScore::new(0.8, 0.1)),
            environment: Some(EnvironmentEvidence::new(0.8, 0.8)),
        }
    }
}
