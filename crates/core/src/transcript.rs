//! Transcript Documents
//!
//! The persisted form of a conversation: its settings at the time it ran plus
//! the full message list. Shared transcripts are kept for [`SHARE_TTL_DAYS`]
//! and may have one audio asset per message, named after the message index.

use crate::{
    agent::{AgentPair, Direction, PerAgent, TtsConfig},
    error::StoreError,
    message::Message,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const SHARE_TTL_DAYS: i64 = 30;

const TITLE_CHARS: usize = 50;
const DEFAULT_TITLE: &str = "Shared Conversation";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingParameters {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Per-agent settings captured alongside a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSettings {
    pub message_direction: Direction,
    pub models: PerAgent<String>,
    pub names: PerAgent<String>,
    pub prompts: PerAgent<String>,
    pub tts: PerAgent<TtsConfig>,
    pub parameters: PerAgent<SamplingParameters>,
}

impl TranscriptSettings {
    pub fn new(direction: Direction, agents: &AgentPair) -> Self {
        let pick = |f: fn(&crate::agent::AgentConfig) -> String| PerAgent {
            ai1: f(&agents.ai1),
            ai2: f(&agents.ai2),
        };
        Self {
            message_direction: direction,
            models: pick(|a| a.model.clone()),
            names: pick(|a| a.name.clone()),
            prompts: pick(|a| a.prompt.clone()),
            tts: PerAgent {
                ai1: agents.ai1.tts.clone(),
                ai2: agents.ai2.tts.clone(),
            },
            parameters: PerAgent {
                ai1: SamplingParameters {
                    max_tokens: agents.ai1.max_tokens,
                    temperature: agents.ai1.temperature,
                },
                ai2: SamplingParameters {
                    max_tokens: agents.ai2.max_tokens,
                    temperature: agents.ai2.temperature,
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptDocument {
    pub id: String,
    pub settings: TranscriptSettings,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub shared: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_at: Option<DateTime<Utc>>,
}

impl TranscriptDocument {
    pub fn new(
        id: impl Into<String>,
        direction: Direction,
        agents: &AgentPair,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            id: id.into(),
            settings: TranscriptSettings::new(direction, agents),
            messages,
            created_at: Utc::now(),
            shared: false,
            shared_at: None,
        }
    }

    /// First 50 characters of the opening message, or a generic title.
    pub fn title(&self) -> String {
        match self.messages.first() {
            Some(first) => {
                let head: String = first.content.chars().take(TITLE_CHARS).collect();
                format!("{head}...")
            }
            None => DEFAULT_TITLE.to_string(),
        }
    }
}

/// Where a shared transcript can be fetched, and until when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareReference {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// One entry of the share index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedConversation {
    pub conversation_id: String,
    pub shared_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub has_audio: bool,
    pub title: String,
}

impl SharedConversation {
    pub fn new(document: &TranscriptDocument, shared_at: DateTime<Utc>, has_audio: bool) -> Self {
        Self {
            conversation_id: document.id.clone(),
            shared_at,
            expires_at: share_expiry(shared_at),
            has_audio,
            title: document.title(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

pub fn share_expiry(shared_at: DateTime<Utc>) -> DateTime<Utc> {
    shared_at + Duration::days(SHARE_TTL_DAYS)
}

pub fn new_conversation_id() -> String {
    format!("conv_{}", Uuid::new_v4().simple())
}

/// Ids double as directory names, so only `[A-Za-z0-9_]` is accepted.
pub fn is_valid_conversation_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn audio_asset_name(message_index: usize) -> String {
    format!("message_{message_index}.mp3")
}

/// Message index encoded in an audio asset name, if it has one.
pub fn audio_asset_index(name: &str) -> Option<usize> {
    let stem = name.strip_suffix(".mp3")?;
    let (_, index) = stem.rsplit_once('_')?;
    index.parse().ok()
}

/// Keeps `.mp3` assets only, ordered by message index. Names without an index
/// sort first.
pub fn order_audio_assets(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut assets: Vec<String> = names
        .into_iter()
        .filter(|name| name.ends_with(".mp3"))
        .collect();
    assets.sort_by_key(|name| audio_asset_index(name).unwrap_or(0));
    assets
}

/// Durable storage for transcripts and their audio.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Stores `document` as shared and returns where it can be fetched.
    async fn persist(&self, document: &TranscriptDocument) -> Result<ShareReference, StoreError>;

    /// Audio asset names for a conversation ordered by message index. Unknown
    /// conversations yield an empty list.
    async fn list_audio_assets(&self, conversation_id: &str) -> Result<Vec<String>, StoreError>;

    async fn save_audio(
        &self,
        conversation_id: &str,
        message_index: usize,
        audio: &[u8],
    ) -> Result<(), StoreError>;

    /// The shared document, unless it is missing or has expired.
    async fn load_shared(
        &self,
        conversation_id: &str,
    ) -> Result<Option<TranscriptDocument>, StoreError>;
}
