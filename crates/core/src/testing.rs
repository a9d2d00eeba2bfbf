//! Test doubles shared by the unit tests of this crate.

use crate::{
    agent::{AgentId, AgentPair, PerAgent},
    error::{PlaybackError, ProviderError},
    llm_client::{ChatClient, ChatRequest, ModelInfo},
    log::{ConversationLog, LogEvent},
    speech::{AudioOutput, MockAudioOutput, MockSpeechSynthesizer, SpeechPlayback},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::{Notify, broadcast},
    time::Instant,
};

/// Both agents with models set and speech disabled.
pub fn ready_agents() -> AgentPair {
    let mut agents = AgentPair::default();
    agents.ai1.model = "openai/gpt-4o-mini".to_string();
    agents.ai2.model = "anthropic/claude-3-haiku".to_string();
    agents
}

/// Playback whose providers panic if speech is ever attempted.
pub fn silent_speech(log: &ConversationLog) -> Arc<SpeechPlayback> {
    Arc::new(SpeechPlayback::new(
        log.clone(),
        Arc::new(MockSpeechSynthesizer::new()),
        Arc::new(MockAudioOutput::new()),
    ))
}

/// Chat client that answers from a script, in order, and records requests.
/// Individual calls can be held open on a gate until the test releases them.
#[derive(Default)]
pub struct ScriptedChat {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    gates: Mutex<HashMap<usize, Arc<Notify>>>,
    entered: Arc<Notify>,
}

impl ScriptedChat {
    pub fn new<'a>(replies: impl IntoIterator<Item = Result<&'a str, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    /// Holds the `call`-th request (0-based) until `gate` is notified.
    pub fn gate_call(self, call: usize, gate: Arc<Notify>) -> Self {
        self.gates.lock().unwrap().insert(call, gate);
        self
    }

    /// Notified each time a request reaches the client.
    pub fn entered(&self) -> Arc<Notify> {
        self.entered.clone()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn complete(&self, request: ChatRequest) -> Result<String, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::unavailable("script exhausted")));
        let gate = self.gates.lock().unwrap().remove(&call);

        self.entered.notify_one();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        reply
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Audio output that never reports completion.
pub struct StalledOutput;

#[async_trait]
impl AudioOutput for StalledOutput {
    async fn play(&self, _: AgentId, _: usize, _: Bytes) -> Result<(), PlaybackError> {
        std::future::pending().await
    }
}

/// Audio output that holds every clip until `release` is notified.
#[derive(Default)]
pub struct GatedOutput {
    /// Notified when a clip starts playing.
    pub entered: Notify,
    pub release: Notify,
    plays: AtomicUsize,
}

impl GatedOutput {
    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioOutput for GatedOutput {
    async fn play(&self, _: AgentId, _: usize, _: Bytes) -> Result<(), PlaybackError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

pub fn drain_events(events: &mut broadcast::Receiver<LogEvent>) -> Vec<LogEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Paused-clock timers fire on millisecond ticks.
pub fn assert_elapsed(started: Instant, expected: Duration) {
    let elapsed = started.elapsed();
    assert!(
        elapsed >= expected && elapsed <= expected + Duration::from_millis(5),
        "expected ~{expected:?}, got {elapsed:?}"
    );
}

/// Replays `events` and panics if the indicator flags ever break the
/// single-speaker rules, or if message indices are not append-only.
pub fn assert_run_invariants(events: &[LogEvent]) {
    let mut active = true;
    let mut thinking = PerAgent::<bool>::default();
    let mut speaking = PerAgent::<bool>::default();
    let mut next_index: Option<usize> = None;

    for (i, event) in events.iter().enumerate() {
        match event {
            LogEvent::Started { .. } => {
                active = true;
                thinking = PerAgent::default();
                speaking = PerAgent::default();
                next_index = Some(0);
            }
            LogEvent::MessageAdded { index, .. } => {
                if let Some(expected) = next_index {
                    assert_eq!(*index, expected, "event {i}: out-of-order append");
                }
                next_index = Some(index + 1);
            }
            LogEvent::Thinking { agent, value } => thinking.set(*agent, *value),
            LogEvent::Speaking { agent, value } => speaking.set(*agent, *value),
            LogEvent::Stopped { .. } => {
                active = false;
                thinking = PerAgent::default();
                speaking = PerAgent::default();
            }
        }

        assert!(
            !(thinking.ai1 && thinking.ai2),
            "event {i}: both agents thinking"
        );
        assert!(
            !(speaking.ai1 && speaking.ai2),
            "event {i}: both agents speaking"
        );
        for agent in [AgentId::Ai1, AgentId::Ai2] {
            assert!(
                !(*thinking.get(agent) && *speaking.get(agent)),
                "event {i}: {agent} thinking and speaking at once"
            );
        }
        if !active {
            assert!(
                !thinking.ai1 && !thinking.ai2 && !speaking.ai1 && !speaking.ai2,
                "event {i}: flag raised while inactive"
            );
        }
    }
}
