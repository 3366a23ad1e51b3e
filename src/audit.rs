//! Authentication attempt log

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::keystroke::KeystrokeScore;
use crate::types::{Decision, EnvironmentEvidence, FacialEvidence, FusionResult, VoiceEvidence};

/// One authentication attempt, as decided
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: Uuid,
    pub identity_id: String,
    pub timestamp: DateTime<Utc>,
    pub result: FusionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facial: Option<FacialEvidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<VoiceEvidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystroke: Option<KeystrokeScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentEvidence>,
    /// Ids of the alerts this attempt created
    #[serde(default)]
    pub alerts_created: Vec<u64>,
}

/// Decision counts over the retained attempts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthStatistics {
    pub total: usize,
    pub permits: usize,
    pub delays: usize,
    pub denies: usize,
    /// Fraction of attempts permitted (0 when empty)
    pub success_rate: f64,
}

/// Append-only, bounded attempt log
#[derive(Debug)]
pub struct AuditLog {
    records: RwLock<VecDeque<AttemptRecord>>,
    max_records: usize,
}

impl AuditLog {
    pub fn new(max_records: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            max_records: max_records.max(1),
        }
    }

    pub fn append(&self, record: AttemptRecord) {
        let mut records = self.records.write();
        records.push_back(record);
        while records.len() > self.max_records {
            records.pop_front();
        }
    }

    /// Most recent attempts, newest first
    pub fn recent(&self, limit: usize) -> Vec<AttemptRecord> {
        self.records.read().iter().rev().take(limit).cloned().collect()
    }

    /// Most recent attempts of one identity, newest first
    pub fn for_identity(&self, identity_id: &str, limit: usize) -> Vec<AttemptRecord> {
        self.records
            .read()
            .iter()
            .rev()
            .filter(|r| r.identity_id == identity_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<AttemptRecord> {
        self.records.read().iter().find(|r| r.id == id).cloned()
    }

    pub fn statistics(&self) -> AuthStatistics {
        let records = self.records.read();
        let mut stats = AuthStatistics {
            total: records.len(),
            ..Default::default()
        };
        for record in records.iter() {
            match record.result.decision {
                Decision::Permit => stats.permits += 1,
                Decision::Delay => stats.delays += 1,
                Decision::Deny => stats.denies += 1,
            }
        }
        if stats.total > 0 {
            stats.success_rate = stats.permits as f64 / stats.total as f64;
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<AttemptRecord> {
        self.records.read().iter().cloned().collect()
    }

    pub fn restore(&self, records: Vec<AttemptRecord>) {
        let mut guard = self.records.write();
        *guard = records.into_iter().collect();
        while guard.len() > self.max_records {
            guard.pop_front();
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(crate::config::AuditPolicy::default().max_records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuardConfig;
    use crate::error::GuardError;
    use crate::fusion::testing::{happy_face, nominal};
    use crate::fusion::FusionEngine;
    use pretty_assertions::assert_eq;

    fn record(identity_id: &str, result: FusionResult) -> AttemptRecord {
        AttemptRecord {
            id: Uuid::new_v4(),
            identity_id: identity_id.to_string(),
            timestamp: Utc::now(),
            face_count: None,
            facial: None,
            voice: None,
            keystroke: result.keystroke.clone(),
            environment: None,
            result,
            alerts_created: Vec::new(),
        }
    }

    fn permit() -> FusionResult {
        FusionEngine::new(GuardConfig::default()).decide(&nominal())
    }

    fn deny() -> FusionResult {
        FusionEngine::new(GuardConfig::default())
            .fail_closed(&GuardError::MissingEvidence("voice".to_string()))
    }

    #[test]
    fn test_recent_is_newest_first() {
        let log = AuditLog::default();
        let first = record("alice", permit());
        let second = record("bob", deny());
        let (first_id, second_id) = (first.id, second.id);
        log.append(first);
        log.append(second);

        let ids: Vec<Uuid> = log.recent(10).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second_id, first_id]);
        assert_eq!(log.recent(1).len(), 1);
        assert_eq!(log.for_identity("alice", 10).len(), 1);
        assert!(log.get(first_id).is_some());
    }

    #[test]
    fn test_statistics() {
        let log = AuditLog::default();
        assert_eq!(log.statistics().success_rate, 0.0);

        log.append(record("alice", permit()));
        log.append(record("alice", permit()));
        log.append(record("alice", permit()));
        log.append(record("bob", deny()));

        let stats = log.statistics();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.permits, 3);
        assert_eq!(stats.denies, 1);
        assert_eq!(stats.delays, 0);
        assert!((stats.success_rate - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_bounded() {
        let log = AuditLog::new(2);
        for _ in 0..5 {
            log.append(record("alice", permit()));
        }
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_snapshot_roundtrip_through_json() {
        let log = AuditLog::default();
        log.append(record("alice", permit()));
        let json = serde_json::to_string(&log.snapshot()).unwrap();

        let restored = AuditLog::default();
        restored.restore(serde_json::from_str(&json).unwrap());
        let (before, after) = (log.snapshot(), restored.snapshot());
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, before[0].id);
        assert_eq!(after[0].result.decision, before[0].result.decision);
        assert_eq!(after[0].result.reason, before[0].result.reason);
        assert!((after[0].result.auth_score - before[0].result.auth_score).abs() < 1e-12);
    }

    #[test]
    fn test_affect_evidence_is_kept_in_json() {
        let mut with_evidence = record("alice", permit());
        with_evidence.face_count = Some(1);
        with_evidence.facial = Some(happy_face());
        let json = serde_json::to_value(&with_evidence).unwrap();
        assert_eq!(json["face_count"], 1);
        assert_eq!(json["facial"]["dominant_label"], "happy");
        assert!(json.get("voice").is_none());

        // Records written without affect evidence still load
        let bare = serde_json::to_string(&record("bob", deny())).unwrap();
        let loaded: AttemptRecord = serde_json::from_str(&bare).unwrap();
        assert_eq!(loaded.face_count, None);
        assert_eq!(loaded.facial, None);
    }
}
