use crate::error::ProviderError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Token an agent emits when it wants the whole conversation to end.
pub const END_MARKER: &str = "#END#";

/// Standing instruction sent ahead of every agent prompt so that models know
/// when (and only when) to emit the end marker.
pub const END_MARKER_INSTRUCTIONS: &str = "As for emojis use UTF-8 emoji, now, track entire conversation and if you decide this is final end and no need to respond further, USE #END# ONLY AND ONLY THEN if all conversation should be ended. DONT ADD #END# to every single message, add end only conversation indicates good bye, see you etc!";

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

const PROVIDER: &str = "OpenRouter";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One prior turn as seen by the agent being asked.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub role: ChatRole,
    pub text: String,
    /// Speaker name, attached to turns authored by the other agent.
    pub name: Option<String>,
}

/// A single completion request for one agent turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system_prompt: String,
    pub history: Vec<HistoryEntry>,
    /// The newest user turn, i.e. the message being answered.
    pub prompt: HistoryEntry,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A model the provider can route requests to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
}

/// A chat completion provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Returns the assistant text for `request`.
    async fn complete(&self, request: ChatRequest) -> Result<String, ProviderError>;

    /// Models available for agent configuration, sorted by id.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError>;
}

/// `ChatClient` for OpenRouter's OpenAI-compatible completions endpoint.
pub struct OpenRouterClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenRouterClient {
    /// # Arguments
    ///
    /// * `base_url` - API root without trailing slash, e.g. [`OPENROUTER_BASE_URL`].
    /// * `api_key` - OpenRouter key (`sk-or-...`).
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

// Only the fields we read; providers add plenty of extras.
#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct ModelsBody {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Lays out the provider messages: end-marker rules, the agent's system
/// prompt, the bounded history and finally the turn being answered.
pub fn build_messages(request: &ChatRequest) -> Result<Vec<ChatCompletionRequestMessage>, ProviderError> {
    let mut messages = Vec::with_capacity(request.history.len() + 3);
    messages.push(system_message(END_MARKER_INSTRUCTIONS)?);
    messages.push(system_message(&request.system_prompt)?);
    for entry in request.history.iter().chain(std::iter::once(&request.prompt)) {
        messages.push(to_provider_message(entry)?);
    }
    Ok(messages)
}

fn system_message(text: &str) -> Result<ChatCompletionRequestMessage, ProviderError> {
    Ok(ChatCompletionRequestSystemMessageArgs::default()
        .content(text)
        .build()
        .map_err(invalid_request)?
        .into())
}

fn to_provider_message(entry: &HistoryEntry) -> Result<ChatCompletionRequestMessage, ProviderError> {
    match entry.role {
        ChatRole::System => system_message(&entry.text),
        ChatRole::User => {
            let mut args = ChatCompletionRequestUserMessageArgs::default();
            args.content(entry.text.clone());
            if let Some(name) = &entry.name {
                args.name(name.clone());
            }
            Ok(args.build().map_err(invalid_request)?.into())
        }
        ChatRole::Assistant => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            args.content(entry.text.clone());
            if let Some(name) = &entry.name {
                args.name(name.clone());
            }
            Ok(args.build().map_err(invalid_request)?.into())
        }
    }
}

fn invalid_request(err: impl std::fmt::Display) -> ProviderError {
    ProviderError::new(
        crate::error::ProviderErrorKind::BadRequest,
        format!("Could not build chat request: {err}"),
    )
}

#[async_trait]
impl ChatClient for OpenRouterClient {
    // Posted through reqwest rather than `async_openai::Client` so the HTTP
    // status survives for `ProviderErrorKind` classification.
    #[allow(deprecated)]
    async fn complete(&self, request: ChatRequest) -> Result<String, ProviderError> {
        let body = CreateChatCompletionRequestArgs::default()
            .model(&request.model)
            .messages(build_messages(&request)?)
            .max_tokens(request.max_tokens)
            .temperature(request.temperature)
            .build()
            .map_err(invalid_request)?;

        debug!(model = %request.model, history = request.history.len(), "Sending chat completion request");
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("X-Title", "Duologue")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(%status, model = %request.model, "Chat completion request failed");
            return Err(ProviderError::from_status(PROVIDER, status, &text));
        }

        let completion: CompletionBody = response.json().await.map_err(|e| {
            ProviderError::unavailable(format!("Invalid response format from {PROVIDER}: {e}"))
        })?;
        let choice = completion.choices.into_iter().next().ok_or_else(|| {
            ProviderError::unavailable(format!("Invalid response format from {PROVIDER}: no choices"))
        })?;

        Ok(choice.message.content.unwrap_or_default().trim().to_string())
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .header("X-Title", "Duologue")
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(%status, "Model listing request failed");
            return Err(ProviderError::from_status(PROVIDER, status, &text));
        }

        let body: ModelsBody = response.json().await.map_err(|e| {
            ProviderError::unavailable(format!("Invalid response format from {PROVIDER}: {e}"))
        })?;
        let mut models = body.data;
        models.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(count = models.len(), "Fetched model list");
        Ok(models)
    }
}
