//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the transcript store and provider clients.

use crate::{config::Config, store::FsTranscriptStore};
use duologue_core::{SpeechSynthesizer, llm_client::ChatClient};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// Each WebSocket connection builds its own conversation session on top of it.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FsTranscriptStore>,
    pub chat: Arc<dyn ChatClient>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub config: Arc<Config>,
}
