pub mod agent;
pub mod engine;
pub mod error;
pub mod llm_client;
pub mod log;
pub mod message;
pub mod session;
pub mod speech;
pub mod transcript;
pub mod tts_client;

#[cfg(test)]
mod testing;

pub use agent::{AgentConfig, AgentId, AgentPair, Direction, PerAgent, TtsConfig};
pub use engine::{RunOutcome, STOPPED_BY_USER, TurnEngine};
pub use error::{PlaybackError, ProviderError, ProviderErrorKind, SessionError, StoreError};
pub use log::{ConversationLog, ConversationRun, LogEvent};
pub use message::{Message, MessageRole};
pub use session::{ConversationSession, RunHandle};
pub use speech::{AudioOutput, SpeechPlayback, SpeechSynthesizer};
pub use transcript::{TranscriptDocument, TranscriptStore};
