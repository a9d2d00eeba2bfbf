//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests for sharing
//! transcripts and reading shared transcripts and their audio back.
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use duologue_core::{
    ProviderError, ProviderErrorKind, StoreError, TranscriptStore,
    transcript::is_valid_conversation_id,
};
use std::sync::Arc;
use tracing::{error, warn};

use crate::{
    models::{
        AudioListQuery, AudioListResponse, ErrorResponse, ModelListResponse, SharePayload,
        ShareResponse, SharedConversationView,
    },
    state::AppState,
};

const INVALID_ID: &str = "Invalid conversation ID format";

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// An upstream provider refused or failed the request.
    BadGateway(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::BadGateway(message) => {
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::InvalidId => ApiError::BadRequest(INVALID_ID.to_string()),
        other => ApiError::InternalServerError(other.into()),
    }
}

fn provider_error(err: ProviderError) -> ApiError {
    warn!(kind = ?err.kind, error = %err, "Provider request failed");
    match err.kind {
        ProviderErrorKind::BadRequest => ApiError::BadRequest(err.message),
        _ => ApiError::BadGateway(err.message),
    }
}

fn validate_id(id: &str) -> Result<(), ApiError> {
    if is_valid_conversation_id(id) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(INVALID_ID.to_string()))
    }
}

/// Publish a conversation transcript for 30 days.
#[utoipa::path(
    post,
    path = "/conversations/share",
    request_body = SharePayload,
    responses(
        (status = 200, description = "Conversation shared", body = ShareResponse),
        (status = 400, description = "Invalid conversation ID", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn share_conversation(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SharePayload>,
) -> Result<Json<ShareResponse>, ApiError> {
    validate_id(&payload.conversation_id)?;

    let mut document = payload.data;
    document.id = payload.conversation_id;
    let reference = state.store.persist(&document).await.map_err(store_error)?;

    Ok(Json(ShareResponse {
        success: true,
        share_url: reference.url,
        expires_at: reference.expires_at,
    }))
}

/// List the archived audio files of a conversation, in message order.
#[utoipa::path(
    get,
    path = "/conversations/audio",
    params(AudioListQuery),
    responses(
        (status = 200, description = "Audio files, possibly empty", body = AudioListResponse),
        (status = 400, description = "Missing or invalid conversation ID", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_audio(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AudioListQuery>,
) -> Result<Json<AudioListResponse>, ApiError> {
    let conversation_id = query
        .conversation_id
        .ok_or_else(|| ApiError::BadRequest("Missing conversation ID".to_string()))?;
    validate_id(&conversation_id)?;

    let audio_files = state
        .store
        .list_audio_assets(&conversation_id)
        .await
        .map_err(store_error)?;

    Ok(Json(AudioListResponse {
        success: true,
        audio_files,
    }))
}

/// Get a shared conversation for read-only viewing.
#[utoipa::path(
    get,
    path = "/conversations/{id}",
    responses(
        (status = 200, description = "Shared conversation", body = SharedConversationView),
        (status = 400, description = "Invalid conversation ID", body = ErrorResponse),
        (status = 404, description = "Not shared, or the share has expired", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Conversation ID")
    )
)]
pub async fn get_shared_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SharedConversationView>, ApiError> {
    validate_id(&id)?;

    let conversation = state
        .store
        .load_shared(&id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Shared conversation '{}' not found", id)))?;
    let audio_files = state
        .store
        .list_audio_assets(&id)
        .await
        .map_err(store_error)?;

    Ok(Json(SharedConversationView {
        conversation,
        audio_files,
    }))
}

/// Download one archived audio file of a shared conversation.
#[utoipa::path(
    get,
    path = "/conversations/{id}/audio/{file}",
    responses(
        (status = 200, description = "MP3 audio", content_type = "audio/mpeg"),
        (status = 400, description = "Invalid conversation ID", body = ErrorResponse),
        (status = 404, description = "Audio file not found", body = ErrorResponse)
    ),
    params(
        ("id" = String, Path, description = "Conversation ID"),
        ("file" = String, Path, description = "Audio file name, e.g. message_1.mp3")
    )
)]
pub async fn get_audio_file(
    State(state): State<Arc<AppState>>,
    Path((id, file)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    validate_id(&id)?;

    let audio = state
        .store
        .read_audio(&id, &file)
        .await
        .map_err(store_error)?
        .ok_or_else(|| ApiError::NotFound(format!("Audio file '{}' not found", file)))?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio))
}

/// List the models that can be assigned to either agent, sorted by id.
#[utoipa::path(
    get,
    path = "/models",
    responses(
        (status = 200, description = "Available models", body = ModelListResponse),
        (status = 502, description = "The model provider rejected or failed the request", body = ErrorResponse)
    )
)]
pub async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ModelListResponse>, ApiError> {
    let models = state.chat.list_models().await.map_err(provider_error)?;

    Ok(Json(ModelListResponse {
        success: true,
        models: models.into_iter().map(Into::into).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, store::FsTranscriptStore};
    use async_trait::async_trait;
    use bytes::Bytes;
    use duologue_core::{
        SpeechSynthesizer,
        llm_client::{ChatClient, ChatRequest, ModelInfo},
    };
    use tempfile::TempDir;

    struct CatalogChat(Result<Vec<ModelInfo>, ProviderError>);

    #[async_trait]
    impl ChatClient for CatalogChat {
        async fn complete(&self, _: ChatRequest) -> Result<String, ProviderError> {
            Err(ProviderError::unavailable("not used"))
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
            self.0.clone()
        }
    }

    struct NoSpeech;

    #[async_trait]
    impl SpeechSynthesizer for NoSpeech {
        async fn synthesize(&self, _: &str, _: &str) -> Result<Bytes, ProviderError> {
            Err(ProviderError::unauthorized("no key"))
        }
    }

    fn state(dir: &TempDir, chat: CatalogChat) -> Arc<AppState> {
        let config = Config {
            bind_address: "127.0.0.1:3000".parse().unwrap(),
            openrouter_api_key: "sk-or-test".to_string(),
            openrouter_base_url: "http://localhost:9000/v1".to_string(),
            groq_api_key: None,
            groq_base_url: "http://localhost:9001/v1".to_string(),
            data_dir: dir.path().to_path_buf(),
            public_base_url: "http://localhost:3000".to_string(),
            log_level: tracing::Level::INFO,
        };
        Arc::new(AppState {
            store: Arc::new(FsTranscriptStore::new(dir.path(), "http://localhost:3000")),
            chat: Arc::new(chat),
            synthesizer: Arc::new(NoSpeech),
            config: Arc::new(config),
        })
    }

    #[tokio::test]
    async fn test_list_models_returns_catalog() {
        let dir = TempDir::new().unwrap();
        let chat = CatalogChat(Ok(vec![ModelInfo {
            id: "openai/gpt-4o-mini".to_string(),
            name: "OpenAI: GPT-4o-mini".to_string(),
            description: None,
            context_length: Some(128000),
        }]));

        let Ok(Json(response)) = list_models(State(state(&dir, chat))).await else {
            panic!("expected a model list");
        };

        assert!(response.success);
        assert_eq!(response.models.len(), 1);
        assert_eq!(response.models[0].id, "openai/gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_list_models_maps_provider_failure_to_bad_gateway() {
        let dir = TempDir::new().unwrap();
        let chat = CatalogChat(Err(ProviderError::unauthorized(
            "Invalid OpenRouter API key. Please check your API key in settings.",
        )));

        let response = match list_models(State(state(&dir, chat))).await {
            Ok(_) => panic!("expected an error"),
            Err(err) => err.into_response(),
        };

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_invalid_id_is_a_bad_request() {
        let response = validate_id("../etc").unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
