//! Keystroke dynamics
//!
//! Builds a per-identity timing template from a handful of enrollment
//! samples and scores live samples against it:
//!
//! ```text
//! KeystrokeSample → TimingFeatures → KeystrokeTemplate → KeystrokeScore
//! ```

pub mod detector;
pub mod features;
pub mod store;
pub mod template;
pub mod types;

pub use detector::OutlierDetector;
pub use features::{TimingFeatureExtractor, TimingFeatures};
pub use store::{IdentityRecord, TemplateStore};
pub use template::{FeatureStat, KeystrokeTemplate};
pub use types::{
    EnrollOutcome, EnrollmentStatus, KeystrokeEvent, KeystrokeSample, KeystrokeScore,
};
