//! Graded scoring: stress, coercion risk, composite scores and bucket selection

use serde::{Deserialize, Serialize};

use crate::config::{CoercionWeights, FusionPolicy};
use crate::environment::EnvironmentFlags;
use crate::keystroke::KeystrokeScore;
use crate::types::{Decision, EnvironmentEvidence, FacialEvidence, GradedRule, VoiceEvidence};

/// Intermediate scores of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GradedScores {
    pub stress_facial: f64,
    pub stress_voice: f64,
    /// Damped average of the two modality stress estimates
    pub stress: f64,
    pub coercion_risk: f64,
    pub biometric_score: f64,
    pub env_score: f64,
    pub auth_score: f64,
    pub match_score: f64,
    pub stability_score: f64,
}

/// Binary indicators feeding the coercion model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoercionSignals {
    pub multiple_subjects: bool,
    pub stress_in_poor_environment: bool,
    pub shouting: bool,
    pub very_loud: bool,
    pub very_dark: bool,
    pub tremor_high_pitch: bool,
}

impl CoercionSignals {
    pub fn any(&self) -> bool {
        self.multiple_subjects
            || self.stress_in_poor_environment
            || self.shouting
            || self.very_loud
            || self.very_dark
            || self.tremor_high_pitch
    }
}

/// Noisy-OR over the active signals: `1 - Π(1 - wᵢ)`.
///
/// Monotonic: raising a signal or a weight never lowers the risk.
pub fn coercion_risk(signals: &CoercionSignals, weights: &CoercionWeights) -> f64 {
    let terms = [
        (signals.multiple_subjects, weights.multiple_subjects),
        (
            signals.stress_in_poor_environment,
            weights.stress_in_poor_environment,
        ),
        (signals.shouting, weights.shouting),
        (signals.very_loud, weights.very_loud),
        (signals.very_dark, weights.very_dark),
        (signals.tremor_high_pitch, weights.tremor_high_pitch),
    ];
    let survive: f64 = terms
        .iter()
        .filter(|(active, _)| *active)
        .map(|(_, w)| 1.0 - w.clamp(0.0, 1.0))
        .product();
    (1.0 - survive).clamp(0.0, 1.0)
}

/// Complete, validated evidence for one attempt
#[derive(Debug, Clone, Copy)]
pub struct Evidence<'a> {
    pub face_count: u32,
    pub facial: &'a FacialEvidence,
    pub voice: &'a VoiceEvidence,
    pub keystroke: &'a KeystrokeScore,
    pub environment: &'a EnvironmentEvidence,
}

/// Compute every graded score. Pure; inputs are assumed validated.
pub fn compute(
    evidence: &Evidence<'_>,
    flags: &EnvironmentFlags,
    policy: &FusionPolicy,
    weights: &CoercionWeights,
) -> GradedScores {
    let keystroke = evidence.keystroke;
    let mut scores = compute_subject(
        evidence.face_count,
        evidence.facial,
        evidence.voice,
        Some(evidence.environment),
        flags,
        policy,
        weights,
    );

    scores.biometric_score = 0.4 * (1.0 - scores.stress)
        + 0.4 * keystroke.match_score
        + 0.2 * (1.0 - keystroke.anomaly_score);
    scores.auth_score = 0.7 * scores.biometric_score + 0.3 * scores.env_score;
    scores.match_score = keystroke.match_score;
    scores
}

/// Scores that need no keystroke score: stress, environment and coercion.
/// Biometric, auth and match scores stay zero.
pub fn compute_subject(
    face_count: u32,
    facial: &FacialEvidence,
    voice: &VoiceEvidence,
    environment: Option<&EnvironmentEvidence>,
    flags: &EnvironmentFlags,
    policy: &FusionPolicy,
    weights: &CoercionWeights,
) -> GradedScores {
    let stress_facial = facial.stress_estimate;
    let stress_voice = voice.stress_estimate;
    let stress = policy.stress_damping * (0.5 * stress_facial + 0.5 * stress_voice);

    let (env_score, stability_score) = match environment {
        Some(env) => (
            0.6 * env.stability_score + 0.4 * env.quality_score,
            env.stability_score,
        ),
        None => (0.0, 0.0),
    };

    let signals = CoercionSignals {
        multiple_subjects: face_count > 1,
        stress_in_poor_environment: environment.is_some()
            && stress > policy.stress_high
            && env_score < policy.env_low,
        shouting: flags.shouting,
        very_loud: flags.very_loud,
        very_dark: flags.very_dark,
        tremor_high_pitch: flags.voice_tremor && flags.high_pitch,
    };

    GradedScores {
        stress_facial,
        stress_voice,
        stress,
        coercion_risk: coercion_risk(&signals, weights),
        env_score,
        stability_score,
        ..GradedScores::default()
    }
}

/// First bucket rule that holds, deny rules before delay rules
pub fn select_rule(scores: &GradedScores, flags: &EnvironmentFlags, policy: &FusionPolicy) -> GradedRule {
    let s = scores;

    if s.coercion_risk > policy.coercion_deny {
        return GradedRule::CoercionRisk;
    }
    if flags.shouting && s.stress > policy.shouting_stress_deny {
        return GradedRule::ShoutingUnderStress;
    }
    if flags.very_loud && s.stress > policy.very_loud_stress_deny {
        return GradedRule::LoudUnderStress;
    }
    if s.auth_score < policy.deny_auth_floor {
        return GradedRule::AuthScoreFloor;
    }

    if s.stress > policy.stress_delay {
        return GradedRule::VeryHighStress;
    }
    if s.coercion_risk > policy.coercion_delay {
        return GradedRule::ElevatedCoercion;
    }
    if s.stress > policy.unstable_stress_delay && s.stability_score < policy.unstable_stability {
        return GradedRule::StressedUnstableEnvironment;
    }
    if flags.very_dark && s.stress > policy.dark_stress_delay {
        return GradedRule::StressedInDarkness;
    }
    if flags.high_pitch && flags.voice_tremor && s.stress > policy.tremor_stress_delay {
        return GradedRule::DistressedVoice;
    }
    if s.match_score < policy.match_delay {
        return GradedRule::WeakKeystrokeMatch;
    }
    if s.env_score < policy.env_low && s.stress > policy.stress_high {
        return GradedRule::StressedPoorEnvironment;
    }
    if s.auth_score < policy.permit_min_auth {
        return GradedRule::BelowPermitThreshold;
    }

    GradedRule::AllChecksPassed
}

/// Map auth score and stress into the band of the chosen bucket.
///
/// Returns `(confidence, stress)`. Both are continuous and monotonic in
/// their input within a bucket.
pub fn rescale(decision: Decision, auth_score: f64, stress: f64) -> (f64, f64) {
    let auth = auth_score.clamp(0.0, 1.0);
    let stress = stress.clamp(0.0, 1.0);
    let (conf_lo, conf_hi, stress_lo, stress_hi) = match decision {
        Decision::Permit => (0.75, 0.95, 0.0, 0.3),
        Decision::Delay => (0.45, 0.65, 0.3, 0.6),
        Decision::Deny => (0.15, 0.45, 0.5, 0.9),
    };
    let confidence = conf_lo + (conf_hi - conf_lo) * auth;
    let stress = stress_lo + (stress_hi - stress_lo) * stress;
    (
        confidence.clamp(conf_lo, conf_hi),
        stress.clamp(stress_lo, stress_hi),
    )
}
