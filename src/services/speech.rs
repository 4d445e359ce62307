use super::{SpeechSynthesizer, Transcriber};
use crate::{
    audio::{PcmAudio, SpeechAudio},
    config::SpeechConfig,
    Error, Result,
};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

fn http_client(timeout_secs: f64) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs_f64(timeout_secs))
        .build()
        .map_err(|e| Error::ConfigError(format!("failed to create HTTP client: {e}")))
}

fn require_key(api_key: &str, service: &str) -> Result<()> {
    if api_key.is_empty() {
        return Err(Error::ConfigError(format!("OpenAI API key required for {service}")));
    }
    Ok(())
}

/// Transcribes speech with the Whisper HTTP API
pub struct WhisperTranscriber {
    client: reqwest::blocking::Client,
    api_key: String,
    url: String,
    model: String,
    language: Option<String>,
}

impl WhisperTranscriber {
    /// Create a transcriber
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty
    pub fn new(api_key: String, config: &SpeechConfig) -> Result<Self> {
        require_key(&api_key, "Whisper")?;
        Ok(Self {
            client: http_client(config.request_timeout_secs)?,
            api_key,
            url: config.transcription_url.clone(),
            model: config.transcription_model.clone(),
            language: config.language.clone(),
        })
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &PcmAudio) -> Result<Option<String>> {
        let wav = audio.to_wav()?;
        debug!("Starting Whisper transcription of {} bytes", wav.len());

        let file = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| Error::Service(e.to_string()))?;
        let mut form = reqwest::blocking::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone());
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            error!("Whisper API error {status}: {body}");
            return Err(Error::Service(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json()?;
        let text = result.text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        info!("Transcribed: '{text}'");
        Ok(Some(text.to_string()))
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Synthesizes speech with the `OpenAI` speech API as raw 16-bit PCM
pub struct OpenAiSpeech {
    client: reqwest::blocking::Client,
    api_key: String,
    url: String,
    model: String,
    voice: String,
    sample_rate: u32,
}

impl OpenAiSpeech {
    /// Create a synthesizer
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty
    pub fn new(api_key: String, config: &SpeechConfig) -> Result<Self> {
        require_key(&api_key, "speech synthesis")?;
        Ok(Self {
            client: http_client(config.request_timeout_secs)?,
            api_key,
            url: config.synthesis_url.clone(),
            model: config.synthesis_model.clone(),
            voice: config.voice.clone(),
            sample_rate: config.output_sample_rate,
        })
    }
}

impl SpeechSynthesizer for OpenAiSpeech {
    fn synthesize(&self, text: &str) -> Result<SpeechAudio> {
        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "pcm",
        };
        debug!("Synthesizing {} characters", text.len());

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            error!("Speech API error {status}: {body}");
            return Err(Error::Service(format!("Speech API error {status}: {body}")));
        }

        let bytes = response.bytes()?;
        let speech = SpeechAudio::from_pcm(PcmAudio::from_le_bytes(&bytes, self.sample_rate));
        debug!("Synthesized {:.2}s of speech", speech.duration.as_secs_f64());
        Ok(speech)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_required() {
        let config = SpeechConfig::default();
        assert!(WhisperTranscriber::new(String::new(), &config).is_err());
        assert!(OpenAiSpeech::new(String::new(), &config).is_err());
    }

    #[test]
    fn test_speech_request_asks_for_pcm() {
        let request = SpeechRequest {
            model: "tts-1",
            input: "hello",
            voice: "alloy",
            response_format: "pcm",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"], "pcm");
        assert_eq!(json["input"], "hello");
    }
}
