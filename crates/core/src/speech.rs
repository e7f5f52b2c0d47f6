//! Speech source and style parameters for a talking-head job.
//!
//! A job speaks either a pre-recorded audio clip, a text script voiced by
//! the text-to-speech provider, or a short default filler line when the
//! caller supplies neither.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Utterance spoken when a job carries no audio and no script.
pub const DEFAULT_FILLER_TEXT: &str = "Hello! This is a preview of your talking avatar.";

/// Voice used for the filler utterance (provider built-in voice).
pub const DEFAULT_FILLER_VOICE: &str = "en-US-JennyNeural";

/// Upper bound on script length accepted for text-to-speech.
pub const MAX_SCRIPT_CHARS: usize = 5_000;

// ---------------------------------------------------------------------------
// SpeechSpec
// ---------------------------------------------------------------------------

/// What the avatar says.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpeechSpec {
    /// A pre-recorded audio file reachable by URL.
    Audio { audio_url: String },
    /// Text voiced through the text-to-speech provider.
    Text { text: String, voice_id: String },
    /// The built-in filler utterance.
    Filler,
}

impl SpeechSpec {
    /// Pick the speech source from optional request fields.
    ///
    /// Audio wins over text; text needs a voice; with neither the filler
    /// utterance is used.
    pub fn resolve(
        audio_url: Option<String>,
        text: Option<String>,
        voice_id: Option<String>,
    ) -> Result<Self, CoreError> {
        let audio_url = audio_url.filter(|s| !s.trim().is_empty());
        let text = text.filter(|s| !s.trim().is_empty());

        match (audio_url, text) {
            (Some(audio_url), _) => Ok(Self::Audio { audio_url }),
            (None, Some(text)) => {
                if text.chars().count() > MAX_SCRIPT_CHARS {
                    return Err(CoreError::Validation(format!(
                        "Script exceeds {MAX_SCRIPT_CHARS} characters"
                    )));
                }
                let voice_id = voice_id
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| {
                        CoreError::Validation("A voice_id is required for text scripts".into())
                    })?;
                Ok(Self::Text { text, voice_id })
            }
            (None, None) => Ok(Self::Filler),
        }
    }

    /// Validate a speech source received as-is (e.g. deserialized from a request body).
    pub fn check(&self) -> Result<(), CoreError> {
        match self {
            Self::Audio { audio_url } if audio_url.trim().is_empty() => Err(
                CoreError::Validation("audio_url must not be empty".into()),
            ),
            Self::Text { text, voice_id } => {
                if text.trim().is_empty() {
                    return Err(CoreError::Validation("Script text must not be empty".into()));
                }
                if text.chars().count() > MAX_SCRIPT_CHARS {
                    return Err(CoreError::Validation(format!(
                        "Script exceeds {MAX_SCRIPT_CHARS} characters"
                    )));
                }
                if voice_id.trim().is_empty() {
                    return Err(CoreError::Validation(
                        "A voice_id is required for text scripts".into(),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Audio { .. } => "audio",
            Self::Text { .. } => "text",
            Self::Filler => "filler",
        }
    }
}

// ---------------------------------------------------------------------------
// StyleParams
// ---------------------------------------------------------------------------

/// Rendering options forwarded to the provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct StyleParams {
    /// Keep the full source frame instead of cropping to the face.
    #[serde(default)]
    pub stitch: bool,
    /// Expression intensity, 0.0 to 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub expression_intensity: Option<f32>,
    /// Named expression (e.g. `"happy"`, `"serious"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 32))]
    pub expression: Option<String>,
}

impl StyleParams {
    /// Run field validation, mapping failures into [`CoreError::Validation`].
    pub fn check(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(format!("Invalid style parameters: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
