//! Manages the WebSocket connection lifecycle for one browser session.
//!
//! Each connection owns a [`ConversationSession`]. Log events, audio clips and
//! replies are funneled through one outbound channel so the socket has a
//! single writer.

use super::{
    playback::WsAudioOutput,
    protocol::{ClientMessage, ServerMessage},
};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use duologue_core::{
    ConversationLog, ConversationSession, PlaybackError, STOPPED_BY_USER, SpeechPlayback,
    TranscriptStore,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast::error::RecvError, mpsc};
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

const CLIENT_DISCONNECTED: &str = "Client disconnected";

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Everything a connection needs to act on client messages.
struct Connection {
    state: Arc<AppState>,
    session: Arc<ConversationSession>,
    output: Arc<WsAudioOutput>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
}

#[instrument(name = "ws_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id: u32 = rand::random();
    tracing::Span::current().record("session_id", session_id);
    info!("New WebSocket connection");

    let (socket_tx, socket_rx) = socket.split();
    let socket_tx = Arc::new(Mutex::new(socket_tx));

    if let Err(e) = run_session(state, socket_tx, socket_rx).await {
        error!(error = ?e, "WebSocket session terminated with error");
    }
    info!("WebSocket session finished");
}

async fn run_session(
    state: Arc<AppState>,
    socket_tx: Arc<Mutex<SplitSink<WebSocket, Message>>>,
    mut socket_rx: SplitStream<WebSocket>,
) -> Result<()> {
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel();
    let log = ConversationLog::new();
    let output = Arc::new(WsAudioOutput::new(outbound.clone()));
    let speech = Arc::new(
        SpeechPlayback::new(log.clone(), state.synthesizer.clone(), output.clone())
            .with_archive(state.store.clone()),
    );
    let session = Arc::new(ConversationSession::new(
        log.clone(),
        state.chat.clone(),
        speech,
    ));

    send_msg(
        &mut *socket_tx.lock().await,
        ServerMessage::Initialized {
            agents: session.agents().await,
            run: log.snapshot().await,
        },
    )
    .await?;

    // Subscribed before any run can start, so no event is missed.
    let mut events = log.subscribe();
    let event_tx = outbound.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if event_tx.send(ServerMessage::Event { event }).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Client fell behind the conversation log");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let connection = Connection {
        state,
        session: session.clone(),
        output: output.clone(),
        outbound,
    };

    loop {
        tokio::select! {
            msg_result = socket_rx.next() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => connection.handle_client_message(msg).await,
                            Err(e) => {
                                warn!(error = %e, "Ignoring malformed client message");
                                connection.reply(ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                });
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Client closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("Error receiving from client WebSocket: {:?}", e);
                        break;
                    }
                }
            },
            Some(msg) = outbound_rx.recv() => {
                if let Err(e) = send_msg(&mut *socket_tx.lock().await, msg).await {
                    error!(error = ?e, "Failed to write to client WebSocket");
                    break;
                }
            },
        }
    }

    shutdown(&session, &output).await;
    forwarder.abort();
    Ok(())
}

/// Ends whatever the departed client left running.
async fn shutdown(session: &ConversationSession, output: &WsAudioOutput) {
    if session.stop(Some(CLIENT_DISCONNECTED.to_string())).await {
        info!("Stopped the running conversation after disconnect");
    }
    output.close();
}

impl Connection {
    fn reply(&self, msg: ServerMessage) {
        if self.outbound.send(msg).is_err() {
            debug!("Dropping reply for a closed connection");
        }
    }

    async fn handle_client_message(&self, msg: ClientMessage) {
        match msg {
            ClientMessage::Configure { agents } => {
                info!(ai1 = %agents.ai1.model, ai2 = %agents.ai2.model, "Agents configured");
                self.session.configure(agents).await;
            }
            ClientMessage::Start { direction, message } => {
                match self.session.start(direction, &message).await {
                    Ok(handle) => {
                        self.reply(ServerMessage::Started {
                            conversation_id: handle.conversation_id.clone(),
                        });
                        let span = info_span!("conversation", conversation_id = %handle.conversation_id);
                        tokio::spawn(
                            async move {
                                let outcome = handle.outcome().await;
                                info!(?outcome, "Conversation run ended");
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => {
                        warn!(error = %e, "Conversation start rejected");
                        self.reply(ServerMessage::Error {
                            message: e.to_string(),
                        });
                    }
                }
            }
            ClientMessage::Stop => {
                if !self.session.stop(Some(STOPPED_BY_USER.to_string())).await {
                    debug!("Stop requested with no conversation running");
                }
            }
            ClientMessage::PlaybackFinished {
                agent,
                message_index,
            } => self.output.acknowledge(agent, message_index, Ok(())),
            ClientMessage::PlaybackFailed {
                agent,
                message_index,
                reason,
            } => {
                let reason = reason.unwrap_or_else(|| "playback failed".to_string());
                warn!(%agent, message_index, %reason, "Client could not play audio");
                self.output
                    .acknowledge(agent, message_index, Err(PlaybackError::Failed(reason)));
            }
            ClientMessage::Share => self.share().await,
        }
    }

    async fn share(&self) {
        let Some(document) = self.session.transcript().await else {
            self.reply(ServerMessage::Error {
                message: "There is no conversation to share yet".to_string(),
            });
            return;
        };
        match self.state.store.persist(&document).await {
            Ok(reference) => self.reply(ServerMessage::Shared {
                url: reference.url,
                expires_at: reference.expires_at,
            }),
            Err(e) => {
                error!(conversation_id = %document.id, error = %e, "Failed to share conversation");
                self.reply(ServerMessage::Error {
                    message: "Failed to share conversation".to_string(),
                });
            }
        }
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
