//! Conversation Log
//!
//! The single source of truth for a run: the ordered transcript plus the live
//! indicator flags the UI binds to. All state sits behind one async mutex and
//! every mutation is broadcast as a [`LogEvent`] while the lock is still held,
//! so subscribers observe mutations in the exact order they were applied.
//!
//! Each `start()` bumps a run generation. Operations suffixed with a
//! generation (`is_live`, `begin_thinking`, `append_to`, `finish`, ...) only act
//! when that generation is still the active run, which is how a turn left
//! over from a stopped run is kept from touching its successor.

use crate::{
    agent::{AgentId, PerAgent},
    message::{Message, MessageDraft},
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 256;

/// Point-in-time copy of the run state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationRun {
    pub active: bool,
    pub generation: u64,
    pub messages: Vec<Message>,
    pub thinking: PerAgent<bool>,
    pub speaking: PerAgent<bool>,
}

impl ConversationRun {
    fn is_live(&self, generation: u64) -> bool {
        self.active && self.generation == generation
    }
}

#[derive(Debug, Clone, Copy)]
enum Indicator {
    Thinking,
    Speaking,
}

/// One observable mutation of the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEvent {
    Started {
        generation: u64,
    },
    MessageAdded {
        index: usize,
        message: Message,
    },
    Thinking {
        agent: AgentId,
        value: bool,
    },
    Speaking {
        agent: AgentId,
        value: bool,
    },
    /// The run went inactive; every indicator flag is now false.
    Stopped {
        reason: Option<String>,
    },
}

/// Shared handle to the conversation state. Cloning is cheap and every clone
/// refers to the same run.
#[derive(Clone)]
pub struct ConversationLog {
    state: Arc<Mutex<ConversationRun>>,
    events: broadcast::Sender<LogEvent>,
}

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationLog {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(ConversationRun::default())),
            events,
        }
    }

    /// Subscribes to every mutation applied from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> ConversationRun {
        self.state.lock().await.clone()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.messages.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.active
    }

    /// True while `generation` is the run currently in progress.
    pub async fn is_live(&self, generation: u64) -> bool {
        self.state.lock().await.is_live(generation)
    }

    /// Appends a message and returns its index.
    pub async fn append(&self, draft: MessageDraft) -> usize {
        let mut state = self.state.lock().await;
        self.push(&mut state, draft)
    }

    /// Appends only while `generation` is still live.
    pub async fn append_to(&self, generation: u64, draft: MessageDraft) -> Option<usize> {
        let mut state = self.state.lock().await;
        if !state.is_live(generation) {
            return None;
        }
        Some(self.push(&mut state, draft))
    }

    /// Raising the flag outside an active run is ignored.
    pub async fn set_thinking(&self, agent: AgentId, value: bool) {
        let mut state = self.state.lock().await;
        if value && !state.active {
            return;
        }
        self.flag(&mut state, Indicator::Thinking, agent, value);
    }

    /// Raising the flag outside an active run is ignored.
    pub async fn set_speaking(&self, agent: AgentId, value: bool) {
        let mut state = self.state.lock().await;
        if value && !state.active {
            return;
        }
        self.flag(&mut state, Indicator::Speaking, agent, value);
    }

    /// Marks `agent` as thinking if `generation` is live; returns whether it did.
    pub async fn begin_thinking(&self, generation: u64, agent: AgentId) -> bool {
        self.flag_in(generation, Indicator::Thinking, agent, true).await
    }

    pub async fn end_thinking(&self, generation: u64, agent: AgentId) -> bool {
        self.flag_in(generation, Indicator::Thinking, agent, false).await
    }

    /// Marks `agent` as speaking if `generation` is live; returns whether it did.
    pub async fn begin_speaking(&self, generation: u64, agent: AgentId) -> bool {
        self.flag_in(generation, Indicator::Speaking, agent, true).await
    }

    pub async fn end_speaking(&self, generation: u64, agent: AgentId) -> bool {
        self.flag_in(generation, Indicator::Speaking, agent, false).await
    }

    /// Clears the transcript, activates a new run and returns its generation.
    pub async fn start(&self) -> u64 {
        let mut state = self.state.lock().await;
        let generation = state.generation + 1;
        *state = ConversationRun {
            active: true,
            generation,
            ..ConversationRun::default()
        };
        info!(generation, "Conversation run started");
        self.emit(LogEvent::Started { generation });
        generation
    }

    /// Ends the current run. Only the active to inactive transition records
    /// `reason`; stopping an inactive log is a no-op and returns `false`.
    pub async fn stop(&self, reason: Option<String>) -> bool {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state, reason)
    }

    /// Ends the run identified by `generation` if it is still live.
    pub async fn finish(&self, generation: u64, reason: impl Into<String>) -> bool {
        let mut state = self.state.lock().await;
        if !state.is_live(generation) {
            return false;
        }
        self.stop_locked(&mut state, Some(reason.into()))
    }

    fn stop_locked(&self, state: &mut ConversationRun, reason: Option<String>) -> bool {
        if !state.active {
            debug!(?reason, "Stop requested while inactive, ignoring");
            return false;
        }
        if let Some(reason) = &reason {
            self.push(state, MessageDraft::system(reason.clone()));
        }
        state.active = false;
        state.thinking = PerAgent::default();
        state.speaking = PerAgent::default();
        info!(generation = state.generation, ?reason, "Conversation run stopped");
        self.emit(LogEvent::Stopped { reason });
        true
    }

    // A stopped run already had its flags reset, so a stale generation has
    // nothing left to clear.
    async fn flag_in(&self, generation: u64, indicator: Indicator, agent: AgentId, value: bool) -> bool {
        let mut state = self.state.lock().await;
        if !state.is_live(generation) {
            return false;
        }
        self.flag(&mut state, indicator, agent, value);
        true
    }

    fn flag(&self, state: &mut ConversationRun, indicator: Indicator, agent: AgentId, value: bool) {
        match indicator {
            Indicator::Thinking => {
                state.thinking.set(agent, value);
                self.emit(LogEvent::Thinking { agent, value });
            }
            Indicator::Speaking => {
                state.speaking.set(agent, value);
                self.emit(LogEvent::Speaking { agent, value });
            }
        }
    }

    fn push(&self, state: &mut ConversationRun, draft: MessageDraft) -> usize {
        let message = draft.into_message();
        let index = state.messages.len();
        debug!(index, role = %message.role, agent = ?message.agent, "Message appended");
        state.messages.push(message.clone());
        self.emit(LogEvent::MessageAdded { index, message });
        index
    }

    fn emit(&self, event: LogEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageRole;

    #[tokio::test]
    async fn test_new_log_is_empty_and_inactive() {
        let log = ConversationLog::new();
        let run = log.snapshot().await;
        assert!(!run.active);
        assert!(run.messages.is_empty());
        assert_eq!(run.generation, 0);
    }

    #[tokio::test]
    async fn test_append_returns_sequential_indices() {
        let log = ConversationLog::new();
        log.start().await;
        assert_eq!(log.append(MessageDraft::human("one")).await, 0);
        assert_eq!(log.append(MessageDraft::human("two")).await, 1);
        let messages = log.messages().await;
        assert_eq!(messages[1].content, "two");
    }

    #[tokio::test]
    async fn test_start_clears_messages_and_flags() {
        let log = ConversationLog::new();
        let first = log.start().await;
        log.append(MessageDraft::human("old")).await;
        log.set_thinking(AgentId::Ai1, true).await;
        log.set_speaking(AgentId::Ai2, true).await;

        let second = log.start().await;
        let run = log.snapshot().await;
        assert_eq!(second, first + 1);
        assert!(run.active);
        assert!(run.messages.is_empty());
        assert_eq!(run.thinking, PerAgent::default());
        assert_eq!(run.speaking, PerAgent::default());
    }

    #[tokio::test]
    async fn test_stop_appends_reason_then_clears_flags() {
        let log = ConversationLog::new();
        log.start().await;
        log.set_thinking(AgentId::Ai2, true).await;

        assert!(log.stop(Some("Conversation ended".to_string())).await);

        let run = log.snapshot().await;
        assert!(!run.active);
        assert!(!run.thinking.ai2);
        let last = run.messages.last().unwrap();
        assert_eq!(last.role, MessageRole::System);
        assert_eq!(last.content, "Conversation ended");
    }

    #[tokio::test]
    async fn test_double_stop_appends_reason_once() {
        let log = ConversationLog::new();
        log.start().await;

        assert!(log.stop(Some("first".to_string())).await);
        assert!(!log.stop(Some("second".to_string())).await);

        let run = log.snapshot().await;
        assert!(!run.active);
        assert_eq!(run.messages.len(), 1);
        assert_eq!(run.messages[0].content, "first");
        assert_eq!(run.thinking, PerAgent::default());
        assert_eq!(run.speaking, PerAgent::default());
    }

    #[tokio::test]
    async fn test_stop_without_reason_appends_nothing() {
        let log = ConversationLog::new();
        log.start().await;
        assert!(log.stop(None).await);
        assert!(log.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_flags_cannot_be_raised_while_inactive() {
        let log = ConversationLog::new();
        log.set_thinking(AgentId::Ai1, true).await;
        log.set_speaking(AgentId::Ai1, true).await;
        let run = log.snapshot().await;
        assert!(!run.thinking.ai1);
        assert!(!run.speaking.ai1);
    }

    #[tokio::test]
    async fn test_setters_are_idempotent_and_observable() {
        let log = ConversationLog::new();
        log.start().await;
        let mut events = log.subscribe();

        log.set_thinking(AgentId::Ai1, true).await;
        log.set_thinking(AgentId::Ai1, true).await;

        assert!(log.snapshot().await.thinking.ai1);
        for _ in 0..2 {
            assert_eq!(
                events.recv().await.unwrap(),
                LogEvent::Thinking {
                    agent: AgentId::Ai1,
                    value: true
                }
            );
        }
    }

    #[tokio::test]
    async fn test_generation_scoped_operations_ignore_stale_runs() {
        let log = ConversationLog::new();
        let stale = log.start().await;
        log.stop(None).await;
        let current = log.start().await;

        assert!(!log.is_live(stale).await);
        assert!(log.is_live(current).await);
        assert!(!log.begin_thinking(stale, AgentId::Ai1).await);
        assert_eq!(log.append_to(stale, MessageDraft::human("late")).await, None);
        assert!(!log.finish(stale, "stale stop").await);

        let run = log.snapshot().await;
        assert!(run.active);
        assert!(run.messages.is_empty());
        assert!(!run.thinking.ai1);
    }

    #[tokio::test]
    async fn test_stale_generation_cannot_clear_new_run_flags() {
        let log = ConversationLog::new();
        let stale = log.start().await;
        assert!(log.begin_speaking(stale, AgentId::Ai2).await);
        log.stop(None).await;

        let current = log.start().await;
        assert!(log.begin_speaking(current, AgentId::Ai2).await);
        assert!(!log.end_speaking(stale, AgentId::Ai2).await);
        assert!(log.snapshot().await.speaking.ai2);

        assert!(log.end_speaking(current, AgentId::Ai2).await);
        assert!(!log.snapshot().await.speaking.ai2);
    }

    #[tokio::test]
    async fn test_events_follow_mutation_order() {
        let log = ConversationLog::new();
        let mut events = log.subscribe();

        let generation = log.start().await;
        log.append(MessageDraft::human("Hi")).await;
        log.finish(generation, "done").await;

        assert_eq!(events.recv().await.unwrap(), LogEvent::Started { generation });
        assert!(matches!(
            events.recv().await.unwrap(),
            LogEvent::MessageAdded { index: 0, .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            LogEvent::MessageAdded { index: 1, .. }
        ));
        assert_eq!(
            events.recv().await.unwrap(),
            LogEvent::Stopped {
                reason: Some("done".to_string())
            }
        );
    }
}
