//! API Models
//!
//! Request and response bodies for the REST API, annotated for OpenAPI
//! generation with `utoipa`. Transcript documents are defined by the core
//! crate and appear in the schema as free-form objects.

use chrono::{DateTime, Utc};
use duologue_core::{TranscriptDocument, llm_client::ModelInfo};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema, Debug)]
pub struct SharePayload {
    #[schema(example = "conv_5f1c2a9e8b7d4c3a")]
    pub conversation_id: String,
    /// The transcript document to publish.
    #[schema(value_type = Object)]
    pub data: TranscriptDocument,
}

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ShareResponse {
    pub success: bool,
    #[schema(example = "http://localhost:3000/conversations/conv_5f1c2a9e8b7d4c3a")]
    pub share_url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize, IntoParams, Debug)]
pub struct AudioListQuery {
    /// Conversation whose audio assets to list.
    pub conversation_id: Option<String>,
}

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AudioListResponse {
    pub success: bool,
    #[schema(example = json!(["message_0.mp3", "message_1.mp3"]))]
    pub audio_files: Vec<String>,
}

/// A shared conversation as served to read-only viewers.
#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SharedConversationView {
    #[schema(value_type = Object)]
    pub conversation: TranscriptDocument,
    pub audio_files: Vec<String>,
}

/// A model that can be assigned to an agent.
#[derive(Serialize, ToSchema, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
    #[schema(example = "openai/gpt-4o-mini")]
    pub id: String,
    #[schema(example = "OpenAI: GPT-4o-mini")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
}

impl From<ModelInfo> for ModelSummary {
    fn from(model: ModelInfo) -> Self {
        // Some providers leave the display name blank.
        let name = if model.name.trim().is_empty() {
            model.id.clone()
        } else {
            model.name
        };
        Self {
            id: model.id,
            name,
            description: model.description,
            context_length: model.context_length,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ModelListResponse {
    pub success: bool,
    pub models: Vec<ModelSummary>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
