//! Per-identity template store
//!
//! Enrollment and verification for the same identity are serialized by a
//! per-identity writer lock; different identities never contend. Template
//! fitting runs outside the state lock, so a verification that races a
//! rebuild scores against the last-known-good template and reports
//! `template_stale = true`.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::KeystrokeConfig;
use crate::error::GuardError;
use crate::keystroke::template::KeystrokeTemplate;
use crate::keystroke::types::{EnrollOutcome, EnrollmentStatus, KeystrokeSample, KeystrokeScore};

#[derive(Debug, Default)]
struct IdentityState {
    samples: VecDeque<KeystrokeSample>,
    template: Option<Arc<KeystrokeTemplate>>,
    rebuilding: bool,
}

#[derive(Debug, Default)]
struct IdentityEntry {
    /// Serializes enrollment for this identity
    writer: Mutex<()>,
    state: RwLock<IdentityState>,
}

/// Serialized form of one identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub samples: Vec<KeystrokeSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<KeystrokeTemplate>,
}

/// Concurrent store of enrollment samples and templates
pub struct TemplateStore {
    config: KeystrokeConfig,
    identities: DashMap<String, Arc<IdentityEntry>>,
}

impl TemplateStore {
    pub fn new(config: KeystrokeConfig) -> Self {
        Self {
            config,
            identities: DashMap::new(),
        }
    }

    pub fn config(&self) -> &KeystrokeConfig {
        &self.config
    }

    fn entry(&self, identity_id: &str) -> Arc<IdentityEntry> {
        if let Some(entry) = self.identities.get(identity_id) {
            return Arc::clone(entry.value());
        }
        Arc::clone(
            self.identities
                .entry(identity_id.to_string())
                .or_default()
                .value(),
        )
    }

    fn existing(&self, identity_id: &str) -> Option<Arc<IdentityEntry>> {
        self.identities
            .get(identity_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Append enrollment samples and rebuild the template once the minimum
    /// sample count is reached.
    ///
    /// All samples are validated before any is stored.
    pub fn enroll(
        &self,
        identity_id: &str,
        samples: &[KeystrokeSample],
    ) -> Result<EnrollOutcome, GuardError> {
        if identity_id.is_empty() {
            return Err(GuardError::InvalidSample("identity id is empty".to_string()));
        }
        if samples.is_empty() {
            return Err(GuardError::InvalidSample("no samples supplied".to_string()));
        }
        for sample in samples {
            sample.validate()?;
        }

        let entry = self.entry(identity_id);
        let _writer = entry.writer.lock();

        let snapshot: Vec<KeystrokeSample> = {
            let mut state = entry.state.write();
            for sample in samples {
                state.samples.push_back(sample.clone());
            }
            while state.samples.len() > self.config.max_enrollment_samples {
                state.samples.pop_front();
            }
            if state.samples.len() < self.config.min_enrollment_samples {
                let count = state.samples.len();
                drop(state);
                debug!(identity_id, samples = count, "enrollment pending");
                return Ok(EnrollOutcome {
                    ok: true,
                    samples_count: count,
                    status: self.status_for(count, false),
                    template_rebuilt: false,
                });
            }
            state.rebuilding = true;
            state.samples.iter().cloned().collect()
        };

        let built = KeystrokeTemplate::build(&snapshot, &self.config);

        let mut state = entry.state.write();
        state.rebuilding = false;
        let template = built?;
        state.template = Some(Arc::new(template));
        let count = state.samples.len();
        drop(state);

        info!(identity_id, samples = count, "keystroke template rebuilt");
        Ok(EnrollOutcome {
            ok: true,
            samples_count: count,
            status: self.status_for(count, true),
            template_rebuilt: true,
        })
    }

    /// Score a live sample against the identity's template.
    ///
    /// Fails with `UnenrolledIdentity` when no template has been built.
    pub fn verify(
        &self,
        identity_id: &str,
        sample: &KeystrokeSample,
    ) -> Result<KeystrokeScore, GuardError> {
        let entry = self
            .existing(identity_id)
            .ok_or_else(|| GuardError::UnenrolledIdentity(identity_id.to_string()))?;

        let (template, stale) = {
            let state = entry.state.read();
            (state.template.clone(), state.rebuilding)
        };
        let template =
            template.ok_or_else(|| GuardError::UnenrolledIdentity(identity_id.to_string()))?;

        let mut score = template.score(sample, &self.config)?;
        if stale {
            warn!(identity_id, "verified against last-known-good template during rebuild");
            score.template_stale = true;
        }
        Ok(score)
    }

    /// Enrollment state of an identity
    pub fn status(&self, identity_id: &str) -> EnrollmentStatus {
        match self.existing(identity_id) {
            None => EnrollmentStatus::Unenrolled,
            Some(entry) => {
                let state = entry.state.read();
                self.status_for(state.samples.len(), state.template.is_some())
            }
        }
    }

    fn status_for(&self, samples: usize, has_template: bool) -> EnrollmentStatus {
        if has_template {
            EnrollmentStatus::Enrolled { samples }
        } else if samples == 0 {
            EnrollmentStatus::Unenrolled
        } else {
            EnrollmentStatus::Enrolling {
                samples,
                required: self.config.min_enrollment_samples,
            }
        }
    }

    /// Drop an identity's samples and template. Returns whether it existed.
    pub fn remove(&self, identity_id: &str) -> bool {
        self.identities.remove(identity_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Copy of every identity's samples and template
    pub fn snapshot(&self) -> BTreeMap<String, IdentityRecord> {
        self.identities
            .iter()
            .map(|item| {
                let state = item.value().state.read();
                (
                    item.key().clone(),
                    IdentityRecord {
                        samples: state.samples.iter().cloned().collect(),
                        template: state.template.as_deref().cloned(),
                    },
                )
            })
            .collect()
    }

    /// Replace the store contents with a snapshot
    pub fn restore(&self, records: BTreeMap<String, IdentityRecord>) {
        self.identities.clear();
        for (identity_id, record) in records {
            let state = IdentityState {
                samples: record.samples.into_iter().collect(),
                template: record.template.map(Arc::new),
                rebuilding: false,
            };
            self.identities.insert(
                identity_id,
                Arc::new(IdentityEntry {
                    writer: Mutex::new(()),
                    state: RwLock::new(state),
                }),
            );
        }
    }
}
