//! Security and wellness alerts
//!
//! `AlertEmitter` is a pure mapping from an attempt's result and raw
//! metadata to alert drafts. `AlertLog` is the append-only store; its only
//! mutations are acknowledge and resolve, both idempotent.

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::AlertPolicy;
use crate::error::GuardError;
use crate::types::{Alert, AlertLevel, AlertType, Decision, EnvironmentEvidence, FusionResult};

/// An alert before it is assigned an id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDraft {
    pub level: AlertLevel,
    pub alert_type: AlertType,
    pub message: String,
    pub details: serde_json::Value,
}

/// Raw attempt metadata alongside the fusion result
#[derive(Debug, Clone, Copy)]
pub struct AttemptContext<'a> {
    pub identity_id: &'a str,
    pub credential_match: Option<bool>,
    pub face_count: Option<u32>,
    pub environment: Option<&'a EnvironmentEvidence>,
}

/// Deterministic alert rules
#[derive(Debug, Clone, Default)]
pub struct AlertEmitter {
    policy: AlertPolicy,
}

impl AlertEmitter {
    pub fn new(policy: AlertPolicy) -> Self {
        Self { policy }
    }

    /// Alerts for one attempt, most severe first
    pub fn emit(&self, ctx: &AttemptContext<'_>, result: &FusionResult) -> Vec<AlertDraft> {
        let p = &self.policy;
        let id = ctx.identity_id;
        let mut drafts = Vec::new();
        let mut push = |level, alert_type, message: String, details| {
            drafts.push(AlertDraft {
                level,
                alert_type,
                message,
                details,
            })
        };

        // Critical
        if let Some(count) = ctx.face_count.filter(|c| *c > 1) {
            push(
                AlertLevel::Critical,
                AlertType::MultipleSubjects,
                format!("Multiple subjects present during authentication by {}", id),
                json!({ "face_count": count, "decision": result.decision }),
            );
        }
        if result.coercion_risk > p.coercion_critical {
            push(
                AlertLevel::Critical,
                AlertType::Coercion,
                format!("High coercion risk detected for {}", id),
                json!({
                    "coercion_risk": result.coercion_risk,
                    "environment_flags": result.environment_flags,
                    "stress": result.stress,
                    "decision": result.decision,
                }),
            );
        }
        if result.environment_flags.shouting && result.stress > p.shouting_stress_critical {
            push(
                AlertLevel::Critical,
                AlertType::Shouting,
                format!("Shouting detected during authentication by {}", id),
                json!({
                    "stress": result.stress,
                    "loudness": ctx.environment.and_then(|e| e.loudness),
                    "pitch_hz": ctx.environment.and_then(|e| e.pitch_hz),
                }),
            );
        }

        // High
        if ctx.credential_match == Some(false) {
            push(
                AlertLevel::High,
                AlertType::CredentialMismatch,
                format!("Credential mismatch for {}", id),
                json!({ "reason": result.reason }),
            );
        }
        if let Some(keystroke) = result
            .keystroke
            .as_ref()
            .filter(|k| k.anomaly_score > p.anomaly_high)
        {
            push(
                AlertLevel::High,
                AlertType::KeystrokeAnomaly,
                format!("Keystroke pattern anomaly detected for {}", id),
                json!({
                    "anomaly_score": keystroke.anomaly_score,
                    "match_score": keystroke.match_score,
                    "confidence": keystroke.confidence,
                }),
            );
        }
        if result.decision == Decision::Deny {
            push(
                AlertLevel::High,
                AlertType::AccessDenied,
                format!("Authentication denied for {}", id),
                json!({
                    "reason": result.reason,
                    "basis": result.basis,
                    "confidence": result.confidence,
                }),
            );
        }

        // Medium
        if result.stress > p.wellness_stress {
            push(
                AlertLevel::Medium,
                AlertType::HighStress,
                format!("High stress level detected for {}", id),
                json!({
                    "stress": result.stress,
                    "stress_facial": result.stress_facial,
                    "stress_voice": result.stress_voice,
                    "emotional_state": result.emotional_state,
                }),
            );
        }
        if result.wellness_alert {
            push(
                AlertLevel::Medium,
                AlertType::WellnessSupport,
                format!("Wellness support may be needed for {}", id),
                json!({
                    "stress": result.stress,
                    "emotional_state": result.emotional_state,
                    "guidance": result.guidance,
                }),
            );
        }

        // Low
        if let Some(env) = ctx.environment.filter(|e| e.quality_score < p.low_quality) {
            push(
                AlertLevel::Low,
                AlertType::UnsuitableEnvironment,
                format!("Unsuitable environment detected for {}", id),
                json!({
                    "quality_score": env.quality_score,
                    "stability_score": env.stability_score,
                    "recommendations": result.recommendations,
                }),
            );
        }

        drafts
    }
}

/// Alert counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertStatistics {
    pub total: usize,
    pub by_level: BTreeMap<AlertLevel, usize>,
    pub by_type: BTreeMap<AlertType, usize>,
    pub unacknowledged: usize,
    pub unresolved: usize,
    pub critical_unacknowledged: usize,
}

/// Serialized alert log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertLogSnapshot {
    pub alerts: Vec<Alert>,
    pub next_id: u64,
}

#[derive(Debug)]
struct Inner {
    alerts: Vec<Alert>,
    next_id: u64,
}

impl Inner {
    fn find_mut(&mut self, id: u64) -> Result<&mut Alert, GuardError> {
        // Ids are assigned in ascending order
        match self.alerts.binary_search_by_key(&id, |a| a.id) {
            Ok(index) => Ok(&mut self.alerts[index]),
            Err(_) => Err(GuardError::NotFound(format!("alert {}", id))),
        }
    }
}

/// Append-only alert store shared across attempts
#[derive(Debug)]
pub struct AlertLog {
    inner: RwLock<Inner>,
    max_retained: usize,
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(AlertPolicy::default().max_retained)
    }
}

impl AlertLog {
    pub fn new(max_retained: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                alerts: Vec::new(),
                next_id: 1,
            }),
            max_retained: max_retained.max(1),
        }
    }

    /// Append drafts for one identity. Ids are allocated inside the write
    /// lock, so alerts of one attempt are contiguous and ordered.
    pub fn append(&self, identity_id: &str, drafts: Vec<AlertDraft>) -> Vec<Alert> {
        if drafts.is_empty() {
            return Vec::new();
        }
        let now = Utc::now();
        let mut inner = self.inner.write();
        let mut created = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let alert = Alert {
                id: inner.next_id,
                level: draft.level,
                alert_type: draft.alert_type,
                identity_id: identity_id.to_string(),
                message: draft.message,
                details: draft.details,
                timestamp: now,
                acknowledged: false,
                resolved: false,
                acknowledged_at: None,
                resolved_at: None,
                resolution_note: None,
            };
            inner.next_id += 1;
            if alert.level == AlertLevel::Critical {
                warn!(identity_id, alert_type = alert.alert_type.as_str(), "critical alert");
            }
            inner.alerts.push(alert.clone());
            created.push(alert);
        }

        let excess = inner.alerts.len().saturating_sub(self.max_retained);
        if excess > 0 {
            inner.alerts.drain(..excess);
        }
        created
    }

    /// Alerts newest first, optionally filtered by level, then paginated
    pub fn list(&self, level: Option<AlertLevel>, limit: usize, offset: usize) -> Vec<Alert> {
        let inner = self.inner.read();
        inner
            .alerts
            .iter()
            .rev()
            .filter(|a| level.map_or(true, |l| a.level == l))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: u64) -> Option<Alert> {
        let inner = self.inner.read();
        inner
            .alerts
            .binary_search_by_key(&id, |a| a.id)
            .ok()
            .map(|index| inner.alerts[index].clone())
    }

    /// Mark an alert acknowledged. Repeated calls keep the first timestamp.
    pub fn acknowledge(&self, id: u64) -> Result<Alert, GuardError> {
        let mut inner = self.inner.write();
        let alert = inner.find_mut(id)?;
        if !alert.acknowledged {
            alert.acknowledged = true;
            alert.acknowledged_at = Some(Utc::now());
            debug!(alert_id = id, "alert acknowledged");
        }
        Ok(alert.clone())
    }

    /// Mark an alert resolved. Repeated calls keep the first timestamp and note.
    pub fn resolve(&self, id: u64, note: Option<String>) -> Result<Alert, GuardError> {
        let mut inner = self.inner.write();
        let alert = inner.find_mut(id)?;
        if !alert.resolved {
            alert.resolved = true;
            alert.resolved_at = Some(Utc::now());
            alert.resolution_note = note.filter(|n| !n.is_empty());
            debug!(alert_id = id, "alert resolved");
        }
        Ok(alert.clone())
    }

    /// Unacknowledged critical alerts, newest first
    pub fn critical_alerts(&self) -> Vec<Alert> {
        let inner = self.inner.read();
        inner
            .alerts
            .iter()
            .rev()
            .filter(|a| a.level == AlertLevel::Critical && !a.acknowledged)
            .cloned()
            .collect()
    }

    /// Alerts of one identity, oldest first
    pub fn for_identity(&self, identity_id: &str) -> Vec<Alert> {
        let inner = self.inner.read();
        inner
            .alerts
            .iter()
            .filter(|a| a.identity_id == identity_id)
            .cloned()
            .collect()
    }

    pub fn statistics(&self) -> AlertStatistics {
        let inner = self.inner.read();
        let mut stats = AlertStatistics {
            total: inner.alerts.len(),
            ..Default::default()
        };
        for alert in &inner.alerts {
            *stats.by_level.entry(alert.level).or_default() += 1;
            *stats.by_type.entry(alert.alert_type).or_default() += 1;
            if !alert.acknowledged {
                stats.unacknowledged += 1;
                if alert.level == AlertLevel::Critical {
                    stats.critical_unacknowledged += 1;
                }
            }
            if !alert.resolved {
                stats.unresolved += 1;
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.inner.read().alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().alerts.is_empty()
    }

    pub fn snapshot(&self) -> AlertLogSnapshot {
        let inner = self.inner.read();
        AlertLogSnapshot {
            alerts: inner.alerts.clone(),
            next_id: inner.next_id,
        }
    }

    /// Replace the log with a snapshot. `next_id` never moves backwards past
    /// a restored alert.
    pub fn restore(&self, snapshot: AlertLogSnapshot) {
        let mut alerts = snapshot.alerts;
        alerts.sort_by_key(|a| a.id);
        let floor = alerts.last().map_or(1, |a| a.id + 1);
        let mut inner = self.inner.write();
        inner.next_id = snapshot.next_id.max(floor);
        inner.alerts = alerts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardConfig;
    use crate::fusion::testing::nominal;
    use crate::fusion::FusionEngine;
    use crate::keystroke::KeystrokeScore;
    use pretty_assertions::assert_eq;

    fn ctx<'a>(face_count: u32, environment: Option<&'a EnvironmentEvidence>) -> AttemptContext<'a> {
        AttemptContext {
            identity_id: "alice",
            credential_match: Some(true),
            face_count: Some(face_count),
            environment,
        }
    }

    fn draft(level: AlertLevel, alert_type: AlertType) -> AlertDraft {
        AlertDraft {
            level,
            alert_type,
            message: "test".to_string(),
            details: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_nominal_attempt_emits_nothing() {
        let inputs = nominal();
        let result = FusionEngine::new(GuardConfig::default()).decide(&inputs);
        let drafts = AlertEmitter::default().emit(&ctx(1, inputs.environment.as_ref()), &result);
        assert!(drafts.is_empty());
    }

    #[test]
    fn test_multiple_subjects_is_critical() {
        let mut inputs = nominal();
        inputs.face_count = Some(2);
        let result = FusionEngine::new(GuardConfig::default()).decide(&inputs);
        let drafts = AlertEmitter::default().emit(&ctx(2, inputs.environment.as_ref()), &result);

        let types: Vec<AlertType> = drafts.iter().map(|d| d.alert_type).collect();
        assert_eq!(
            types,
            vec![
                AlertType::MultipleSubjects,
                AlertType::Coercion,
                AlertType::AccessDenied
            ]
        );
        assert_eq!(drafts[0].level, AlertLevel::Critical);
        assert_eq!(drafts[0].details["face_count"], 2);
    }

    #[test]
    fn test_anomaly_and_low_quality_alerts() {
        let mut inputs = nominal();
        inputs.keystroke = Some(KeystrokeScore::new(0.8, 0.75));
        let env = EnvironmentEvidence::new(0.3, 0.9);
        inputs.environment = Some(env.clone());
        let result = FusionEngine::new(GuardConfig::default()).decide(&inputs);
        let drafts = AlertEmitter::default().emit(&ctx(1, Some(&env)), &result);

        assert!(drafts
            .iter()
            .any(|d| d.alert_type == AlertType::KeystrokeAnomaly && d.level == AlertLevel::High));
        assert!(drafts
            .iter()
            .any(|d| d.alert_type == AlertType::UnsuitableEnvironment && d.level == AlertLevel::Low));
    }

    #[test]
    fn test_credential_mismatch_alert() {
        let mut inputs = nominal();
        inputs.credential_match = Some(false);
        let result = FusionEngine::new(GuardConfig::default()).decide(&inputs);
        let mut context = ctx(1, inputs.environment.as_ref());
        context.credential_match = Some(false);
        let drafts = AlertEmitter::default().emit(&context, &result);

        let types: Vec<AlertType> = drafts.iter().map(|d| d.alert_type).collect();
        assert_eq!(
            types,
            vec![AlertType::CredentialMismatch, AlertType::AccessDenied]
        );
    }

    #[test]
    fn test_list_newest_first_with_filter_and_pagination() {
        let log = AlertLog::default();
        log.append("a", vec![draft(AlertLevel::Low, AlertType::UnsuitableEnvironment)]);
        log.append("b", vec![draft(AlertLevel::Critical, AlertType::Coercion)]);
        log.append("c", vec![draft(AlertLevel::Low, AlertType::UnsuitableEnvironment)]);
        log.append("d", vec![draft(AlertLevel::Critical, AlertType::Shouting)]);

        let ids: Vec<u64> = log.list(None, 10, 0).iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);

        let critical: Vec<u64> = log
            .list(Some(AlertLevel::Critical), 10, 0)
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(critical, vec![4, 2]);

        let page: Vec<u64> = log.list(None, 2, 1).iter().map(|a| a.id).collect();
        assert_eq!(page, vec![3, 2]);
        assert!(log.list(None, 10, 10).is_empty());
    }

    #[test]
    fn test_acknowledge_is_idempotent() {
        let log = AlertLog::default();
        let created = log.append("a", vec![draft(AlertLevel::Critical, AlertType::Coercion)]);
        let id = created[0].id;

        let first = log.acknowledge(id).unwrap();
        let second = log.acknowledge(id).unwrap();
        assert!(first.acknowledged);
        assert_eq!(first, second);
        assert_eq!(log.get(id).unwrap(), first);
        assert!(log.critical_alerts().is_empty());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let log = AlertLog::default();
        let created = log.append("a", vec![draft(AlertLevel::High, AlertType::AccessDenied)]);
        let id = created[0].id;

        let first = log.resolve(id, Some("false positive".to_string())).unwrap();
        let second = log.resolve(id, Some("other note".to_string())).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.resolution_note.as_deref(), Some("false positive"));
    }

    #[test]
    fn test_unknown_alert_is_not_found() {
        let log = AlertLog::default();
        assert!(matches!(log.acknowledge(42), Err(GuardError::NotFound(_))));
        assert!(matches!(log.resolve(42, None), Err(GuardError::NotFound(_))));
    }

    #[test]
    fn test_statistics() {
        let log = AlertLog::default();
        log.append(
            "a",
            vec![
                draft(AlertLevel::Critical, AlertType::Coercion),
                draft(AlertLevel::High, AlertType::AccessDenied),
            ],
        );
        log.append("b", vec![draft(AlertLevel::High, AlertType::AccessDenied)]);
        log.acknowledge(2).unwrap();
        log.resolve(3, None).unwrap();

        let stats = log.statistics();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_level[&AlertLevel::High], 2);
        assert_eq!(stats.by_type[&AlertType::AccessDenied], 2);
        assert_eq!(stats.unacknowledged, 2);
        assert_eq!(stats.unresolved, 2);
        assert_eq!(stats.critical_unacknowledged, 1);
    }

    #[test]
    fn test_retention_drops_oldest() {
        let log = AlertLog::new(3);
        for i in 0..5 {
            log.append(
                &format!("user-{}", i),
                vec![draft(AlertLevel::Low, AlertType::UnsuitableEnvironment)],
            );
        }
        let ids: Vec<u64> = log.list(None, 10, 0).iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
        assert!(matches!(log.acknowledge(1), Err(GuardError::NotFound(_))));
    }

    #[test]
    fn test_snapshot_restore_keeps_ids_moving_forward() {
        let log = AlertLog::default();
        log.append("a", vec![draft(AlertLevel::Low, AlertType::UnsuitableEnvironment)]);
        log.append("b", vec![draft(AlertLevel::Low, AlertType::UnsuitableEnvironment)]);

        let restored = AlertLog::default();
        restored.restore(log.snapshot());
        let next = restored.append("c", vec![draft(AlertLevel::Low, AlertType::UnsuitableEnvironment)]);
        assert_eq!(next[0].id, 3);
        assert_eq!(restored.len(), 3);
    }

    #[test]
    fn test_concurrent_appends_keep_per_identity_order() {
        let log = AlertLog::default();
        std::thread::scope(|s| {
            for t in 0..4 {
                let log = &log;
                s.spawn(move || {
                    let identity = format!("user-{}", t);
                    for _ in 0..25 {
                        log.append(
                            &identity,
                            vec![draft(AlertLevel::Low, AlertType::UnsuitableEnvironment)],
                        );
                    }
                });
            }
        });

        assert_eq!(log.len(), 100);
        for t in 0..4 {
            let alerts = log.for_identity(&format!("user-{}", t));
            assert_eq!(alerts.len(), 25);
            assert!(alerts.windows(2).all(|w| w[0].id < w[1].id));
        }
    }
}
