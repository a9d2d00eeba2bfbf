use crate::{error::ProviderError, speech::SpeechSynthesizer};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

const PROVIDER: &str = "Groq";
const TTS_MODEL: &str = "playai-tts";
const RESPONSE_FORMAT: &str = "mp3";

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

/// `SpeechSynthesizer` backed by Groq's PlayAI voices.
pub struct GroqSpeechClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GroqSpeechClient {
    /// Without an `api_key` every synthesis fails fast with `Unauthorized`.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for GroqSpeechClient {
    async fn synthesize(&self, voice: &str, text: &str) -> Result<Bytes, ProviderError> {
        let Some(api_key) = &self.api_key else {
            return Err(ProviderError::unauthorized(
                "No Groq API key configured. Please add your API key in settings.",
            ));
        };

        let body = SpeechRequest {
            model: TTS_MODEL,
            voice,
            input: text,
            response_format: RESPONSE_FORMAT,
        };
        debug!(voice, chars = text.len(), "Requesting speech synthesis");

        let response = self
            .http
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(%status, voice, "Speech synthesis request failed");
            return Err(ProviderError::from_status(PROVIDER, status, &text));
        }

        response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_transport(PROVIDER, e))
    }
}
