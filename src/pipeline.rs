//! Pipeline orchestration
//!
//! `Guardian` is the public entry point. It owns the template store, alert
//! log, attempt log and credential store, and runs each authentication
//! attempt through the full pipeline:
//!
//! 1. credential check
//! 2. evidence normalization (facial, voice) and keystroke verification
//! 3. fusion (predicates, graded scoring, rescaling)
//! 4. alert emission
//! 5. attempt logging
//!
//! Every method takes `&self`; a `Guardian` can be shared across threads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::alerts::{AlertEmitter, AlertLog, AlertLogSnapshot, AlertStatistics, AttemptContext};
use crate::audit::{AttemptRecord, AuditLog, AuthStatistics};
use crate::config::GuardConfig;
use crate::credentials::{CredentialVerifier, InMemoryCredentials, SecretDigest};
use crate::error::GuardError;
use crate::estimator::{AffectEstimator, FixedEstimator};
use crate::fusion::{FusionEngine, FusionInputs};
use crate::keystroke::{
    EnrollOutcome, EnrollmentStatus, IdentityRecord, KeystrokeSample, KeystrokeScore, TemplateStore,
};
use crate::normalizer::EvidenceNormalizer;
use crate::types::{
    Alert, AlertLevel, EnvironmentEvidence, EstimatorKind, FacialEvidence, FacialLabel,
    FusionResult, VoiceEvidence, VoiceLabel,
};

/// Snapshot format version written by `save_state`
pub const SNAPSHOT_VERSION: u32 = 1;

/// Facial estimator output as received from the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacialInput {
    /// Faces detected in the frame
    pub face_count: u32,
    /// Probability per label name
    pub probabilities: BTreeMap<String, f64>,
    #[serde(default)]
    pub source: EstimatorKind,
}

/// Voice estimator output as received from the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceInput {
    pub probabilities: BTreeMap<String, f64>,
    #[serde(default)]
    pub source: EstimatorKind,
}

/// One authentication attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub identity_id: String,
    pub secret: String,
    #[serde(default)]
    pub facial: Option<FacialInput>,
    #[serde(default)]
    pub voice: Option<VoiceInput>,
    #[serde(default)]
    pub keystrokes: Option<KeystrokeSample>,
    #[serde(default)]
    pub environment: Option<EnvironmentEvidence>,
}

/// Result of `Guardian::authenticate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthOutcome {
    pub attempt_id: Uuid,
    pub result: FusionResult,
    /// Alerts created by this attempt
    pub alerts: Vec<Alert>,
}

/// Synthetic scenario for `Guardian::simulate`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    /// Share of negative affect in both modalities (0-1)
    pub stress_level: f64,
    pub match_score: f64,
    pub brightness: f64,
    /// Ambient loudness (0-1)
    pub noise: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            stress_level: 0.5,
            match_score: 0.5,
            brightness: 0.5,
            noise: 0.3,
        }
    }
}

/// Everything `save_state` persists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardSnapshot {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub templates: BTreeMap<String, IdentityRecord>,
    #[serde(default)]
    pub credentials: BTreeMap<String, SecretDigest>,
    #[serde(default)]
    pub alerts: AlertLogSnapshot,
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
}

/// Stateful authentication service
pub struct Guardian {
    config: GuardConfig,
    engine: FusionEngine,
    emitter: AlertEmitter,
    templates: TemplateStore,
    credentials: InMemoryCredentials,
    external_verifier: Option<Arc<dyn CredentialVerifier>>,
    alerts: AlertLog,
    audit: AuditLog,
}

impl Default for Guardian {
    fn default() -> Self {
        Self::build(GuardConfig::default())
    }
}

impl Guardian {
    /// Create a service with a validated configuration
    pub fn new(config: GuardConfig) -> Result<Self, GuardError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: GuardConfig) -> Self {
        Self {
            engine: FusionEngine::new(config.clone()),
            emitter: AlertEmitter::new(config.alerts.clone()),
            templates: TemplateStore::new(config.keystroke.clone()),
            credentials: InMemoryCredentials::new(),
            external_verifier: None,
            alerts: AlertLog::new(config.alerts.max_retained),
            audit: AuditLog::new(config.audit.max_records),
            config,
        }
    }

    /// Check secrets against an external store instead of the built-in one
    pub fn with_credential_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.external_verifier = Some(verifier);
        self
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn engine(&self) -> &FusionEngine {
        &self.engine
    }

    /// Register or replace an identity's secret in the built-in store
    pub fn register_secret(&self, identity_id: &str, secret: &str) {
        self.credentials.register(identity_id, secret);
    }

    /// Append keystroke enrollment samples for an identity
    pub fn enroll(
        &self,
        identity_id: &str,
        samples: &[KeystrokeSample],
    ) -> Result<EnrollOutcome, GuardError> {
        self.templates.enroll(identity_id, samples)
    }

    /// Enroll samples and, when given, register the secret. The secret is
    /// stored only if the samples were accepted.
    pub fn enroll_with_secret(
        &self,
        identity_id: &str,
        samples: &[KeystrokeSample],
        secret: Option<&str>,
    ) -> Result<EnrollOutcome, GuardError> {
        let outcome = self.templates.enroll(identity_id, samples)?;
        if let Some(secret) = secret {
            self.credentials.register(identity_id, secret);
        }
        info!(
            identity_id,
            samples = outcome.samples_count,
            enrolled = outcome.status.is_enrolled(),
            "enrollment"
        );
        Ok(outcome)
    }

    pub fn enrollment_status(&self, identity_id: &str) -> EnrollmentStatus {
        self.templates.status(identity_id)
    }

    fn verify_secret(&self, identity_id: &str, secret: &str) -> bool {
        match &self.external_verifier {
            Some(verifier) => verifier.verify(identity_id, secret),
            None => self.credentials.verify(identity_id, secret),
        }
    }

    /// Run one attempt through the pipeline.
    ///
    /// Never fails: malformed or missing evidence and unenrolled identities
    /// produce a fail-closed result. A credential mismatch takes priority
    /// over every evidence problem.
    pub fn authenticate(&self, request: &AuthRequest) -> AuthOutcome {
        let identity_id = request.identity_id.as_str();
        let credential_match = self.verify_secret(identity_id, &request.secret);

        let facial: Option<Result<FacialEvidence, GuardError>> = request.facial.as_ref().map(|f| {
            EvidenceNormalizer::normalize_named::<FacialLabel>(&f.probabilities, f.source)
        });
        let voice: Option<Result<VoiceEvidence, GuardError>> = request.voice.as_ref().map(|v| {
            EvidenceNormalizer::normalize_named::<VoiceLabel>(&v.probabilities, v.source)
        });
        let keystroke: Option<Result<KeystrokeScore, GuardError>> = request
            .keystrokes
            .as_ref()
            .map(|sample| self.templates.verify(identity_id, sample));

        let boundary_error = [
            facial.as_ref().and_then(|r| r.as_ref().err()),
            voice.as_ref().and_then(|r| r.as_ref().err()),
            keystroke.as_ref().and_then(|r| r.as_ref().err()),
        ]
        .into_iter()
        .flatten()
        .next();

        let inputs = FusionInputs {
            credential_match: Some(credential_match),
            face_count: request.facial.as_ref().map(|f| f.face_count),
            facial: facial.as_ref().and_then(|r| r.as_ref().ok().cloned()),
            voice: voice.as_ref().and_then(|r| r.as_ref().ok().cloned()),
            keystroke: keystroke.as_ref().and_then(|r| r.as_ref().ok().cloned()),
            environment: request.environment.clone(),
        };

        let result = match boundary_error {
            Some(err) if credential_match => {
                warn!(identity_id, error = %err, "evidence rejected at boundary");
                self.engine.fail_closed_with_evidence(&inputs, err)
            }
            _ => self.engine.decide(&inputs),
        };

        self.record(request, &inputs, result)
    }

    fn record(&self, request: &AuthRequest, inputs: &FusionInputs, result: FusionResult) -> AuthOutcome {
        let identity_id = request.identity_id.as_str();
        let ctx = AttemptContext {
            identity_id,
            credential_match: inputs.credential_match,
            face_count: inputs.face_count,
            environment: request.environment.as_ref(),
        };
        let drafts = self.emitter.emit(&ctx, &result);
        let alerts = self.alerts.append(identity_id, drafts);

        let attempt_id = Uuid::new_v4();
        self.audit.append(AttemptRecord {
            id: attempt_id,
            identity_id: identity_id.to_string(),
            timestamp: result.computed_at,
            result: result.clone(),
            face_count: inputs.face_count,
            facial: inputs.facial.clone(),
            voice: inputs.voice.clone(),
            keystroke: inputs.keystroke.clone(),
            environment: request.environment.clone(),
            alerts_created: alerts.iter().map(|a| a.id).collect(),
        });

        info!(
            identity_id,
            attempt_id = %attempt_id,
            decision = result.decision.as_str(),
            reason = %result.reason,
            alerts = alerts.len(),
            "authentication attempt"
        );

        AuthOutcome {
            attempt_id,
            result,
            alerts,
        }
    }

    /// Fuse a synthetic scenario. Nothing is logged or alerted.
    pub fn simulate(&self, params: &SimulationParams) -> Result<FusionResult, GuardError> {
        for (name, value) in [
            ("stress_level", params.stress_level),
            ("match_score", params.match_score),
            ("brightness", params.brightness),
            ("noise", params.noise),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(GuardError::InvalidEvidence(format!(
                    "simulation {} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        // Negative affect takes `stress_level` of the mass; the rest is mostly calm
        let s = params.stress_level;
        let facial = FixedEstimator::new(
            EstimatorKind::Heuristic,
            vec![
                (FacialLabel::Angry, 0.5 * s),
                (FacialLabel::Fear, 0.5 * s),
                (FacialLabel::Neutral, 0.75 * (1.0 - s)),
                (FacialLabel::Happy, 0.25 * (1.0 - s)),
            ],
        )
        .evidence(&())?;
        let voice = FixedEstimator::new(
            EstimatorKind::Heuristic,
            vec![
                (VoiceLabel::Angry, 0.5 * s),
                (VoiceLabel::Fearful, 0.5 * s),
                (VoiceLabel::Calm, 0.75 * (1.0 - s)),
                (VoiceLabel::Happy, 0.25 * (1.0 - s)),
            ],
        )
        .evidence(&())?;

        let lighting = (1.0 - (params.brightness - 0.5).abs() * 2.0).clamp(0.0, 1.0);
        let environment = EnvironmentEvidence {
            brightness: Some(params.brightness),
            loudness: Some(params.noise),
            pitch_hz: Some(180.0),
            zero_crossing_rate: Some(0.3),
            ..EnvironmentEvidence::new(
                0.5 * lighting + 0.5 * (1.0 - params.noise),
                1.0 - params.noise,
            )
        };

        self.engine.fuse(&FusionInputs {
            credential_match: Some(true),
            face_count: Some(1),
            facial: Some(facial),
            voice: Some(voice),
            keystroke: Some(KeystrokeScore::new(
                params.match_score,
                1.0 - params.match_score,
            )),
            environment: Some(environment),
        })
    }

    /// Alerts newest first
    pub fn list_alerts(&self, level: Option<AlertLevel>, limit: usize, offset: usize) -> Vec<Alert> {
        self.alerts.list(level, limit, offset)
    }

    pub fn acknowledge_alert(&self, id: u64) -> Result<Alert, GuardError> {
        self.alerts.acknowledge(id)
    }

    pub fn resolve_alert(&self, id: u64, note: Option<String>) -> Result<Alert, GuardError> {
        self.alerts.resolve(id, note)
    }

    pub fn critical_alerts(&self) -> Vec<Alert> {
        self.alerts.critical_alerts()
    }

    pub fn alert_statistics(&self) -> AlertStatistics {
        self.alerts.statistics()
    }

    pub fn recent_attempts(&self, limit: usize) -> Vec<AttemptRecord> {
        self.audit.recent(limit)
    }

    pub fn auth_statistics(&self) -> AuthStatistics {
        self.audit.statistics()
    }

    /// Save templates, credentials, alerts and attempts to JSON
    pub fn save_state(&self) -> Result<String, GuardError> {
        let snapshot = GuardSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Some(Utc::now()),
            templates: self.templates.snapshot(),
            credentials: self.credentials.snapshot(),
            alerts: self.alerts.snapshot(),
            attempts: self.audit.snapshot(),
        };
        Ok(serde_json::to_string(&snapshot)?)
    }

    /// Replace all state with a snapshot produced by `save_state`
    pub fn load_state(&self, json: &str) -> Result<(), GuardError> {
        let snapshot: GuardSnapshot = serde_json::from_str(json)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(GuardError::Persistence(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        let identities = snapshot.templates.len();
        self.templates.restore(snapshot.templates);
        self.credentials.restore(snapshot.credentials);
        self.alerts.restore(snapshot.alerts);
        self.audit.restore(snapshot.attempts);
        info!(identities, "state loaded");
        Ok(())
    }
}
