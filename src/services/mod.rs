//! Boundaries to upstream services: chat completion, transcription and
//! speech synthesis, with HTTP implementations.

/// Anthropic Messages API chat client
pub mod chat;

/// Whisper transcription and `OpenAI` speech synthesis
pub mod speech;

use crate::{
    audio::{PcmAudio, SpeechAudio},
    Result,
};
use serde::{Deserialize, Serialize};

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Chat completion: role-tagged messages and a fixed system instruction in,
/// one reply out
pub trait ChatClient: Send + Sync {
    /// Generate the next assistant reply
    ///
    /// # Errors
    ///
    /// Returns an error if the service fails; callers substitute an apology
    fn complete(&self, system: &str, messages: &[ChatMessage]) -> Result<String>;
}

/// Speech-to-text
pub trait Transcriber: Send + Sync {
    /// Transcribe mono PCM; `None` when nothing intelligible was said
    ///
    /// # Errors
    ///
    /// Returns an error if the service fails
    fn transcribe(&self, audio: &PcmAudio) -> Result<Option<String>>;
}

/// Text-to-speech
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text`
    ///
    /// # Errors
    ///
    /// Returns an error if the service fails
    fn synthesize(&self, text: &str) -> Result<SpeechAudio>;
}
