//! Defines the WebSocket message protocol between the browser client and the API server.

use chrono::{DateTime, Utc};
use duologue_core::{AgentId, AgentPair, ConversationRun, Direction, LogEvent};
use serde::{Deserialize, Serialize};

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Replaces both agents' configuration. Applies from the next start.
    Configure { agents: AgentPair },
    /// Starts a conversation in `direction`, opened by `message`.
    Start {
        direction: Direction,
        message: String,
    },
    /// Stops the running conversation.
    Stop,
    /// The browser finished playing the audio for a message.
    PlaybackFinished {
        agent: AgentId,
        message_index: usize,
    },
    /// The browser could not play the audio for a message.
    PlaybackFailed {
        agent: AgentId,
        message_index: usize,
        #[serde(default)]
        reason: Option<String>,
    },
    /// Publishes the current conversation.
    Share,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once on connect with the session's starting state.
    Initialized {
        agents: AgentPair,
        run: ConversationRun,
    },
    /// A new conversation was accepted.
    Started { conversation_id: String },
    /// One mutation of the conversation log.
    Event { event: LogEvent },
    /// Audio (base64 encoded MP3) for the client to play and acknowledge.
    Audio {
        agent: AgentId,
        message_index: usize,
        data: String,
    },
    /// The conversation was shared.
    Shared {
        url: String,
        expires_at: DateTime<Utc>,
    },
    /// Reports an error to the client.
    Error { message: String },
}
