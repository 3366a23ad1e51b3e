//! Affect Guard - fail-closed decision fusion for emotion-aware MFA
//!
//! Each authentication attempt combines a shared-secret check, facial and
//! vocal affect evidence, keystroke-timing verification and environment
//! quality into one categorical decision through a fixed pipeline:
//! credential check → evidence normalization → keystroke verification
//! → denial predicates → graded scoring → alerts and attempt log.
//!
//! Any missing or malformed evidence yields a non-permit decision.
//!
//! ## Modules
//!
//! - **Evidence**: estimator outputs normalized to closed label sets
//! - **Keystroke**: per-identity timing templates and verification
//! - **Fusion**: predicates, graded scores, guidance and UI adaptation
//! - **Alerts / Audit**: security alerts and the attempt log

pub mod alerts;
pub mod audit;
pub mod config;
pub mod credentials;
pub mod environment;
pub mod error;
pub mod estimator;
pub mod fusion;
pub mod keystroke;
pub mod normalizer;
pub mod pipeline;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use alerts::{AlertEmitter, AlertLog, AlertStatistics};
pub use audit::{AttemptRecord, AuditLog, AuthStatistics};
pub use config::GuardConfig;
pub use credentials::{CredentialVerifier, InMemoryCredentials};
pub use error::{ErrorKind, GuardError};
pub use fusion::{FusionEngine, FusionInputs};
pub use keystroke::{KeystrokeEvent, KeystrokeSample, KeystrokeScore, TemplateStore};
pub use normalizer::EvidenceNormalizer;
pub use pipeline::{AuthOutcome, AuthRequest, Guardian, SimulationParams};
pub use types::{Decision, DecisionBasis, FusionResult};

/// Library version
pub const AFFECT_GUARD_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported in diagnostics
pub const PRODUCER_NAME: &str = "affect-guard";
