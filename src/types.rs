//! Core types for the Affect Guard pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: per-modality affect labels, normalized evidence, environment
//! evidence, fusion decisions, and security alerts.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;

use crate::environment::EnvironmentFlags;
use crate::error::ErrorKind;
use crate::keystroke::KeystrokeScore;

/// Evidence modality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Facial,
    Voice,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Facial => "facial",
            Modality::Voice => "voice",
        }
    }
}

/// Which kind of estimator produced a piece of evidence.
///
/// Recorded for audit only; fusion treats both identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    #[default]
    Trained,
    Heuristic,
}

/// A closed, per-modality affect label set.
///
/// Each label carries its stress weight and whether it passes the emotion
/// check, so no string matching happens past the normalizer boundary.
pub trait AffectLabel:
    Copy + Eq + Ord + Hash + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Modality this label set belongs to
    const MODALITY: Modality;

    /// Every label, in canonical order
    const ALL: &'static [Self];

    /// Tie-break order for the dominant label: earlier entries win exact ties.
    ///
    /// Negative labels come first so that an exact tie never resolves toward
    /// a permissive label.
    const TIE_PRIORITY: &'static [Self];

    /// Weight of this label in the stress estimate (0 for non-negative labels)
    fn stress_weight(self) -> f64;

    /// Whether this label passes the emotion check when dominant
    fn is_permissive(self) -> bool;

    /// Canonical lowercase name
    fn as_str(self) -> &'static str;

    /// Parse a label name, accepting common estimator spellings
    fn parse(name: &str) -> Option<Self>;
}

/// Facial affect labels (7-class estimator output)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacialLabel {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    #[serde(alias = "surprise")]
    Surprised,
    Neutral,
}

impl AffectLabel for FacialLabel {
    const MODALITY: Modality = Modality::Facial;

    const ALL: &'static [Self] = &[
        FacialLabel::Angry,
        FacialLabel::Disgust,
        FacialLabel::Fear,
        FacialLabel::Happy,
        FacialLabel::Sad,
        FacialLabel::Surprised,
        FacialLabel::Neutral,
    ];

    const TIE_PRIORITY: &'static [Self] = &[
        FacialLabel::Angry,
        FacialLabel::Fear,
        FacialLabel::Disgust,
        FacialLabel::Sad,
        FacialLabel::Surprised,
        FacialLabel::Neutral,
        FacialLabel::Happy,
    ];

    fn stress_weight(self) -> f64 {
        match self {
            FacialLabel::Angry => 0.8,
            FacialLabel::Fear => 0.7,
            FacialLabel::Disgust => 0.6,
            FacialLabel::Sad => 0.3,
            FacialLabel::Happy | FacialLabel::Surprised | FacialLabel::Neutral => 0.0,
        }
    }

    fn is_permissive(self) -> bool {
        matches!(
            self,
            FacialLabel::Happy | FacialLabel::Surprised | FacialLabel::Neutral
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            FacialLabel::Angry => "angry",
            FacialLabel::Disgust => "disgust",
            FacialLabel::Fear => "fear",
            FacialLabel::Happy => "happy",
            FacialLabel::Sad => "sad",
            FacialLabel::Surprised => "surprised",
            FacialLabel::Neutral => "neutral",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "angry" | "anger" => Some(FacialLabel::Angry),
            "disgust" | "disgusted" => Some(FacialLabel::Disgust),
            "fear" | "fearful" => Some(FacialLabel::Fear),
            "happy" | "happiness" => Some(FacialLabel::Happy),
            "sad" | "sadness" => Some(FacialLabel::Sad),
            "surprise" | "surprised" => Some(FacialLabel::Surprised),
            "neutral" => Some(FacialLabel::Neutral),
            _ => None,
        }
    }
}

/// Vocal affect labels (8-class estimator output)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceLabel {
    Neutral,
    Calm,
    Happy,
    Sad,
    Angry,
    #[serde(alias = "fear")]
    Fearful,
    Disgust,
    #[serde(alias = "surprise")]
    Surprised,
}

impl AffectLabel for VoiceLabel {
    const MODALITY: Modality = Modality::Voice;

    const ALL: &'static [Self] = &[
        VoiceLabel::Neutral,
        VoiceLabel::Calm,
        VoiceLabel::Happy,
        VoiceLabel::Sad,
        VoiceLabel::Angry,
        VoiceLabel::Fearful,
        VoiceLabel::Disgust,
        VoiceLabel::Surprised,
    ];

    const TIE_PRIORITY: &'static [Self] = &[
        VoiceLabel::Angry,
        VoiceLabel::Fearful,
        VoiceLabel::Disgust,
        VoiceLabel::Sad,
        VoiceLabel::Surprised,
        VoiceLabel::Neutral,
        VoiceLabel::Calm,
        VoiceLabel::Happy,
    ];

    fn stress_weight(self) -> f64 {
        match self {
            VoiceLabel::Angry => 0.9,
            VoiceLabel::Fearful => 0.8,
            VoiceLabel::Disgust => 0.6,
            VoiceLabel::Sad => 0.4,
            VoiceLabel::Neutral | VoiceLabel::Calm | VoiceLabel::Happy | VoiceLabel::Surprised => {
                0.0
            }
        }
    }

    fn is_permissive(self) -> bool {
        matches!(
            self,
            VoiceLabel::Happy | VoiceLabel::Calm | VoiceLabel::Surprised | VoiceLabel::Neutral
        )
    }

    fn as_str(self) -> &'static str {
        match self {
            VoiceLabel::Neutral => "neutral",
            VoiceLabel::Calm => "calm",
            VoiceLabel::Happy => "happy",
            VoiceLabel::Sad => "sad",
            VoiceLabel::Angry => "angry",
            VoiceLabel::Fearful => "fearful",
            VoiceLabel::Disgust => "disgust",
            VoiceLabel::Surprised => "surprised",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "neutral" => Some(VoiceLabel::Neutral),
            "calm" => Some(VoiceLabel::Calm),
            "happy" => Some(VoiceLabel::Happy),
            "sad" | "sadness" => Some(VoiceLabel::Sad),
            "angry" | "anger" => Some(VoiceLabel::Angry),
            "fear" | "fearful" => Some(VoiceLabel::Fearful),
            "disgust" | "disgusted" => Some(VoiceLabel::Disgust),
            "surprise" | "surprised" => Some(VoiceLabel::Surprised),
            _ => None,
        }
    }
}

/// Canonical evidence record for one modality and one capture cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "L: AffectLabel", deserialize = "L: AffectLabel"))]
pub struct AffectEvidence<L: AffectLabel> {
    /// Probability per label; every label of the set is present
    pub class_probabilities: BTreeMap<L, f64>,
    /// Most probable label (ties broken by `AffectLabel::TIE_PRIORITY`)
    pub dominant_label: L,
    /// Weighted sum over the negative-affect labels (0-1)
    pub stress_estimate: f64,
    /// Estimator variant that produced the probabilities
    #[serde(default)]
    pub source: EstimatorKind,
}

impl<L: AffectLabel> AffectEvidence<L> {
    /// Probability of a single label (0 when absent)
    pub fn probability(&self, label: L) -> f64 {
        self.class_probabilities.get(&label).copied().unwrap_or(0.0)
    }

    /// Probability of the dominant label
    pub fn dominant_confidence(&self) -> f64 {
        self.probability(self.dominant_label)
    }
}

pub type FacialEvidence = AffectEvidence<FacialLabel>;
pub type VoiceEvidence = AffectEvidence<VoiceLabel>;

/// Ambient environment evidence (read-only input from the environment estimator)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentEvidence {
    /// Overall capture quality (0-1)
    pub quality_score: f64,
    /// Environmental stability (0-1)
    pub stability_score: f64,
    /// Frame brightness (0-1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
    /// Frame contrast (grey-level std, 0-255 scale)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f64>,
    /// Audio loudness (RMS, 0-1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loudness: Option<f64>,
    /// Voice fundamental frequency (Hz)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch_hz: Option<f64>,
    /// Audio zero-crossing rate (0-1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zero_crossing_rate: Option<f64>,
    /// Shouting reported directly by the estimator
    #[serde(default)]
    pub shouting: bool,
}

impl EnvironmentEvidence {
    /// Evidence with only the two required scores
    pub fn new(quality_score: f64, stability_score: f64) -> Self {
        Self {
            quality_score,
            stability_score,
            brightness: None,
            contrast: None,
            loudness: None,
            pitch_hz: None,
            zero_crossing_rate: None,
            shouting: false,
        }
    }
}

/// Categorical authentication decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Permit,
    Delay,
    Deny,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Permit => "permit",
            Decision::Delay => "delay",
            Decision::Deny => "deny",
        }
    }
}

/// Immediate-denial predicates, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialPredicate {
    CredentialMismatch,
    NoSubject,
    MultipleSubjects,
    NegativeFacialAffect,
    NegativeVoiceAffect,
    BehavioralAnomaly,
    LowMatchHighAnomaly,
}

impl DenialPredicate {
    pub fn reason(&self) -> &'static str {
        match self {
            DenialPredicate::CredentialMismatch => "credential mismatch",
            DenialPredicate::NoSubject => "no subject present",
            DenialPredicate::MultipleSubjects => "multiple subjects present",
            DenialPredicate::NegativeFacialAffect => "negative facial affect",
            DenialPredicate::NegativeVoiceAffect => "negative voice affect",
            DenialPredicate::BehavioralAnomaly => "behavioral anomaly",
            DenialPredicate::LowMatchHighAnomaly => "low match + high anomaly",
        }
    }
}

/// Graded bucket rules, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradedRule {
    CoercionRisk,
    ShoutingUnderStress,
    LoudUnderStress,
    AuthScoreFloor,
    VeryHighStress,
    ElevatedCoercion,
    StressedUnstableEnvironment,
    StressedInDarkness,
    DistressedVoice,
    WeakKeystrokeMatch,
    StressedPoorEnvironment,
    BelowPermitThreshold,
    AllChecksPassed,
}

impl GradedRule {
    /// Bucket this rule places the attempt in
    pub fn bucket(&self) -> Decision {
        match self {
            GradedRule::CoercionRisk
            | GradedRule::ShoutingUnderStress
            | GradedRule::LoudUnderStress
            | GradedRule::AuthScoreFloor => Decision::Deny,
            GradedRule::VeryHighStress
            | GradedRule::ElevatedCoercion
            | GradedRule::StressedUnstableEnvironment
            | GradedRule::StressedInDarkness
            | GradedRule::DistressedVoice
            | GradedRule::WeakKeystrokeMatch
            | GradedRule::StressedPoorEnvironment
            | GradedRule::BelowPermitThreshold => Decision::Delay,
            GradedRule::AllChecksPassed => Decision::Permit,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            GradedRule::CoercionRisk => "high coercion risk",
            GradedRule::ShoutingUnderStress => "shouting under stress",
            GradedRule::LoudUnderStress => "very loud environment with elevated stress",
            GradedRule::AuthScoreFloor => "authentication score below deny floor",
            GradedRule::VeryHighStress => "very high stress",
            GradedRule::ElevatedCoercion => "elevated coercion risk",
            GradedRule::StressedUnstableEnvironment => "elevated stress in unstable environment",
            GradedRule::StressedInDarkness => "very poor lighting with high stress",
            GradedRule::DistressedVoice => "voice characteristics suggest distress",
            GradedRule::WeakKeystrokeMatch => "weak keystroke match",
            GradedRule::StressedPoorEnvironment => "stress in poor environment",
            GradedRule::BelowPermitThreshold => "authentication score below permit threshold",
            GradedRule::AllChecksPassed => "all checks passed",
        }
    }
}

/// What produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DecisionBasis {
    /// An immediate-denial predicate fired
    Predicate(DenialPredicate),
    /// Graded scoring placed the attempt in a bucket
    Graded(GradedRule),
    /// Evidence could not be scored; fail-closed
    SystemError(ErrorKind),
}

impl DecisionBasis {
    /// Human-readable reason naming the triggering predicate or bucket
    pub fn reason(&self) -> String {
        match self {
            DecisionBasis::Predicate(p) => p.reason().to_string(),
            DecisionBasis::Graded(rule) => {
                format!("graded: {} ({})", rule.bucket().as_str(), rule.describe())
            }
            DecisionBasis::SystemError(ErrorKind::Enrollment) => {
                "identity not enrolled".to_string()
            }
            DecisionBasis::SystemError(kind) => {
                format!("system error ({})", error_kind_str(*kind))
            }
        }
    }

    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            DecisionBasis::Predicate(DenialPredicate::CredentialMismatch)
        )
    }

    pub fn is_system_error(&self) -> bool {
        matches!(self, DecisionBasis::SystemError(_))
    }
}

fn error_kind_str(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Input => "invalid or missing evidence",
        ErrorKind::Enrollment => "enrollment",
        ErrorKind::Lookup => "lookup",
        ErrorKind::System => "internal",
    }
}

/// Overall emotional state category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalState {
    HighlyStressed,
    ModeratelyStressed,
    Positive,
    Calm,
    Negative,
    Agitated,
    Neutral,
    SecurityBreach,
    Unknown,
}

/// Color scheme hint for the client UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorScheme {
    #[default]
    Default,
    Soft,
    Calming,
    HighContrast,
}

/// UI adaptation recommendations derived from user state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UiAdaptation {
    pub color_scheme: ColorScheme,
    pub reduce_animations: bool,
    pub show_wellness_tips: bool,
    pub restrict_features: bool,
    pub suggest_break: bool,
    pub calming_mode: bool,
}

/// Result of one authentication attempt. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub decision: Decision,
    /// Decision confidence, rescaled into the band of the chosen bucket
    pub confidence: f64,
    /// Reported stress, rescaled into the band of the chosen bucket
    pub stress: f64,
    /// Facial stress estimate before damping
    pub stress_facial: f64,
    /// Voice stress estimate before damping
    pub stress_voice: f64,
    pub coercion_risk: f64,
    pub biometric_score: f64,
    pub env_score: f64,
    pub auth_score: f64,
    /// Triggering predicate, or "graded: <bucket> (...)"
    pub reason: String,
    pub basis: DecisionBasis,
    pub guidance: String,
    pub facial_emotion: Option<FacialLabel>,
    pub voice_emotion: Option<VoiceLabel>,
    /// True iff neither the facial nor the voice affect check fails
    pub emotion_check_passed: bool,
    pub emotional_state: EmotionalState,
    pub ui_adaptation: UiAdaptation,
    /// Stress high enough to suggest wellness support
    pub wellness_alert: bool,
    pub environment_flags: EnvironmentFlags,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystroke: Option<KeystrokeScore>,
    pub computed_at: DateTime<Utc>,
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Low => "low",
            AlertLevel::Medium => "medium",
            AlertLevel::High => "high",
            AlertLevel::Critical => "critical",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "low" => Some(AlertLevel::Low),
            "medium" => Some(AlertLevel::Medium),
            "high" => Some(AlertLevel::High),
            "critical" => Some(AlertLevel::Critical),
            _ => None,
        }
    }
}

/// Alert type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    MultipleSubjects,
    Coercion,
    Shouting,
    CredentialMismatch,
    KeystrokeAnomaly,
    AccessDenied,
    HighStress,
    WellnessSupport,
    UnsuitableEnvironment,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::MultipleSubjects => "multiple_subjects",
            AlertType::Coercion => "coercion",
            AlertType::Shouting => "shouting",
            AlertType::CredentialMismatch => "credential_mismatch",
            AlertType::KeystrokeAnomaly => "keystroke_anomaly",
            AlertType::AccessDenied => "access_denied",
            AlertType::HighStress => "high_stress",
            AlertType::WellnessSupport => "wellness_support",
            AlertType::UnsuitableEnvironment => "unsuitable_environment",
        }
    }
}

/// A security or wellness alert.
///
/// Append-only; acknowledge and resolve are the only mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    pub level: AlertLevel,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub identity_id: String,
    pub message: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_note: Option<String>,
}
