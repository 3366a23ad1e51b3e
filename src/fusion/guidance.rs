//! User-facing guidance, emotional state and UI adaptation
//!
//! Everything here is derived from an already-made decision and never feeds
//! back into it.

use crate::environment::EnvironmentFlags;
use crate::types::{
    AffectLabel, ColorScheme, Decision, EmotionalState, FacialLabel, UiAdaptation, VoiceLabel,
};

/// Context for guidance text
#[derive(Debug, Clone, Copy)]
pub struct GuidanceContext<'a> {
    pub decision: Decision,
    /// Reported (rescaled) stress
    pub stress: f64,
    pub coercion_risk: f64,
    pub flags: &'a EnvironmentFlags,
    pub recommendations: &'a [String],
    pub facial: Option<FacialLabel>,
    pub voice: Option<VoiceLabel>,
}

/// Context-aware guidance for the user
pub fn guidance(ctx: &GuidanceContext<'_>) -> String {
    let flags = ctx.flags;
    match ctx.decision {
        Decision::Deny => {
            if let (Some(facial), Some(voice)) = (ctx.facial, ctx.voice) {
                if !facial.is_permissive() || !voice.is_permissive() {
                    return format!(
                        "Access denied. Negative emotions detected (Facial: {}, Voice: {}). \
                         Please relax and try again when you feel calm.",
                        facial.as_str(),
                        voice.as_str()
                    );
                }
            }
            if ctx.coercion_risk > 0.5 {
                "Access denied. Environmental conditions suggest potential duress. \
                 Please contact support if you need assistance."
                    .to_string()
            } else if flags.very_loud || flags.shouting {
                "Access denied. Please move to a quieter, calmer location and try again."
                    .to_string()
            } else if flags.very_dark {
                "Access denied. Please ensure adequate lighting and try again.".to_string()
            } else {
                "Access denied. Please verify your credentials and ensure you're in a \
                 suitable environment."
                    .to_string()
            }
        }
        Decision::Delay => {
            if ctx.stress > 0.7 {
                "High stress detected. Take a few deep breaths, relax for a moment, and try again."
                    .to_string()
            } else if ctx.stress > 0.5 && flags.noisy {
                "Elevated stress in a noisy environment. Find a quieter space and try again \
                 when you feel calmer."
                    .to_string()
            } else if flags.dark {
                "Poor lighting detected. Please improve lighting conditions and try again."
                    .to_string()
            } else if !ctx.recommendations.is_empty() {
                let first: Vec<&str> = ctx
                    .recommendations
                    .iter()
                    .take(2)
                    .map(String::as_str)
                    .collect();
                format!("Please address: {} and try again.", first.join(", "))
            } else {
                "Authentication delayed. Please wait a moment and try again.".to_string()
            }
        }
        Decision::Permit => {
            if ctx.stress > 0.6 {
                "Access granted. You seem a bit stressed - consider taking a break soon."
                    .to_string()
            } else if ctx.stress > 0.4 {
                "Access granted. Welcome! Remember to take care of yourself.".to_string()
            } else {
                "Access granted. Welcome! You're doing great!".to_string()
            }
        }
    }
}

/// Overall emotional state from the raw (undamped) modality stress
pub fn emotional_state(
    stress_facial: f64,
    stress_voice: f64,
    facial: FacialLabel,
    voice: VoiceLabel,
) -> EmotionalState {
    let avg = (stress_facial + stress_voice) / 2.0;

    if avg > 0.75 {
        EmotionalState::HighlyStressed
    } else if avg > 0.6 {
        EmotionalState::ModeratelyStressed
    } else if matches!(facial, FacialLabel::Happy | FacialLabel::Surprised)
        || matches!(voice, VoiceLabel::Happy | VoiceLabel::Calm)
    {
        EmotionalState::Positive
    } else if avg < 0.3 {
        EmotionalState::Calm
    } else if matches!(facial, FacialLabel::Sad | FacialLabel::Fear) && avg > 0.5 {
        EmotionalState::Negative
    } else if facial == FacialLabel::Angry || voice == VoiceLabel::Angry {
        EmotionalState::Agitated
    } else {
        EmotionalState::Neutral
    }
}

/// UI hints from reported stress, decision and lighting
pub fn ui_adaptation(stress: f64, decision: Decision, flags: &EnvironmentFlags) -> UiAdaptation {
    let mut ui = UiAdaptation::default();

    if stress > 0.7 {
        ui.color_scheme = ColorScheme::Calming;
        ui.reduce_animations = true;
        ui.show_wellness_tips = true;
        ui.suggest_break = true;
        ui.calming_mode = true;
    } else if stress > 0.5 {
        ui.color_scheme = ColorScheme::Soft;
        ui.show_wellness_tips = true;
    }

    if decision == Decision::Deny {
        ui.restrict_features = true;
    }
    if flags.dark || flags.very_dark {
        ui.color_scheme = ColorScheme::HighContrast;
    }
    ui
}

/// Stress high enough to offer wellness support
pub fn wellness_alert(stress: f64, decision: Decision) -> bool {
    stress > 0.75 || (stress > 0.6 && decision == Decision::Delay)
}
