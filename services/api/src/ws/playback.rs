//! Browser-side audio playback.
//!
//! Audio is pushed to the client as a `ServerMessage::Audio` and the matching
//! `play` call stays pending until the client acknowledges it with
//! `playback_finished` or `playback_failed`. Each agent has a single slot; a
//! newer clip for the same agent replaces an unacknowledged one.

use super::protocol::ServerMessage;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use duologue_core::{AgentId, AudioOutput, PlaybackError};
use std::{collections::HashMap, sync::Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

struct PendingClip {
    message_index: usize,
    done: oneshot::Sender<Result<(), PlaybackError>>,
}

pub struct WsAudioOutput {
    outbound: mpsc::UnboundedSender<ServerMessage>,
    pending: Mutex<HashMap<AgentId, PendingClip>>,
}

impl WsAudioOutput {
    pub fn new(outbound: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the pending clip for `agent` if it is the one for `message_index`.
    pub fn acknowledge(
        &self,
        agent: AgentId,
        message_index: usize,
        result: Result<(), PlaybackError>,
    ) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        match pending.remove(&agent) {
            Some(clip) if clip.message_index == message_index => {
                // The waiter may already have timed out.
                let _ = clip.done.send(result);
            }
            Some(clip) => {
                debug!(%agent, message_index, expected = clip.message_index, "Ignoring stale playback acknowledgement");
                pending.insert(agent, clip);
            }
            None => debug!(%agent, message_index, "Playback acknowledgement with nothing pending"),
        }
    }

    /// Fails every pending clip; used when the client goes away.
    pub fn close(&self) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[async_trait]
impl AudioOutput for WsAudioOutput {
    async fn play(
        &self,
        agent: AgentId,
        message_index: usize,
        audio: Bytes,
    ) -> Result<(), PlaybackError> {
        let (done, finished) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(agent, PendingClip { message_index, done });

        let message = ServerMessage::Audio {
            agent,
            message_index,
            data: STANDARD.encode(&audio),
        };
        if self.outbound.send(message).is_err() {
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&agent);
            return Err(PlaybackError::Disconnected);
        }

        // A dropped sender means the slot was replaced or the client left.
        finished.await.unwrap_or(Err(PlaybackError::Disconnected))
    }
}
