//! Turn Engine
//!
//! Drives the alternating-turn protocol for one run. Each turn the engine
//! marks the agent as thinking, waits a short randomized delay, asks the chat
//! provider for a reply, commits it to the log, speaks it, pauses and hands
//! the reply to the other agent. A run ends when an agent emits the end
//! marker, when a human-initiated direction has been answered, when a turn
//! fails, or when someone stops the run.
//!
//! Liveness is re-read from the log after every suspension point (thinking
//! delay, chat call, playback, inter-turn pause), always scoped to the run's generation so that
//! a stop followed by a fresh start can never be mistaken for the old run.

use crate::{
    agent::{AgentId, AgentPair, Direction, Participant},
    error::TurnError,
    llm_client::{ChatClient, ChatRequest, ChatRole, END_MARKER, HistoryEntry},
    log::ConversationLog,
    message::{Message, MessageDraft, MessageRole},
    speech::SpeechPlayback,
};
use rand::Rng;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info};

/// Number of prior transcript entries sent along with each request.
pub const HISTORY_LIMIT: usize = 10;

pub const ENDED_BY_AGENT: &str = "Conversation has ended";
pub const ENDED_AFTER_REPLY: &str = "Conversation ended";
pub const STOPPED_BY_USER: &str = "Conversation stopped by user";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnTiming {
    pub thinking_min: Duration,
    /// Exclusive upper bound of the thinking delay.
    pub thinking_max: Duration,
    /// Pause between one agent's playback ending and the next turn.
    pub pause: Duration,
}

impl Default for TurnTiming {
    fn default() -> Self {
        Self {
            thinking_min: Duration::from_millis(1000),
            thinking_max: Duration::from_millis(3000),
            pause: Duration::from_millis(800),
        }
    }
}

impl TurnTiming {
    fn thinking_delay(&self) -> Duration {
        let min = self.thinking_min.as_millis() as u64;
        let max = self.thinking_max.as_millis() as u64;
        if max <= min {
            return self.thinking_min;
        }
        Duration::from_millis(rand::rng().random_range(min..max))
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// An agent emitted the end marker.
    Terminated,
    /// The addressed agent answered a human-initiated conversation.
    Completed,
    /// The run was stopped from outside, or superseded by a newer run.
    Cancelled,
    Failed(String),
}

/// Everything fixed for the lifetime of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub conversation_id: String,
    pub generation: u64,
    pub direction: Direction,
    /// Agent configuration as of the start of the run.
    pub agents: AgentPair,
}

enum Step {
    Next(String),
    Done(RunOutcome),
}

pub struct TurnEngine {
    log: ConversationLog,
    chat: Arc<dyn ChatClient>,
    speech: Arc<SpeechPlayback>,
    run: RunContext,
    timing: TurnTiming,
}

impl TurnEngine {
    pub fn new(
        log: ConversationLog,
        chat: Arc<dyn ChatClient>,
        speech: Arc<SpeechPlayback>,
        run: RunContext,
    ) -> Self {
        Self {
            log,
            chat,
            speech,
            run,
            timing: TurnTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: TurnTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn context(&self) -> &RunContext {
        &self.run
    }

    /// Runs turns starting with `first`, who answers `incoming`, until the
    /// run ends.
    pub async fn run(&self, first: AgentId, incoming: String) -> RunOutcome {
        let mut agent = first;
        let mut from = self.run.direction.sender();
        let mut incoming = incoming;

        loop {
            match self.take_turn(agent, from, &incoming).await {
                Ok(Step::Next(reply)) => {
                    from = Participant::Agent(agent);
                    agent = agent.other();
                    incoming = reply;
                }
                Ok(Step::Done(outcome)) => {
                    info!(?outcome, "Conversation run finished");
                    return outcome;
                }
                Err(e) => return self.fail(agent, e).await,
            }
        }
    }

    async fn take_turn(
        &self,
        agent: AgentId,
        from: Participant,
        incoming: &str,
    ) -> Result<Step, TurnError> {
        let generation = self.run.generation;
        if !self.log.begin_thinking(generation, agent).await {
            return Ok(Step::Done(RunOutcome::Cancelled));
        }

        let delay = self.timing.thinking_delay();
        debug!(agent = %agent, ?delay, "Thinking");
        tokio::time::sleep(delay).await;
        if !self.log.is_live(generation).await {
            return Ok(Step::Done(RunOutcome::Cancelled));
        }

        let request = self.request_for(agent, from, incoming).await;
        let result = self.chat.complete(request).await;
        if !self.log.is_live(generation).await {
            debug!(agent = %agent, "Run stopped while waiting for a reply, discarding it");
            return Ok(Step::Done(RunOutcome::Cancelled));
        }
        let reply = result?;

        if reply.contains(END_MARKER) {
            info!(agent = %agent, "Agent ended the conversation");
            self.log.end_thinking(generation, agent).await;
            return Ok(Step::Done(self.finish(ENDED_BY_AGENT, RunOutcome::Terminated).await));
        }

        self.log.end_thinking(generation, agent).await;
        if reply.trim().is_empty() {
            return Err(TurnError::EmptyResponse(agent));
        }

        let config = self.run.agents.get(agent);
        let Some(index) = self
            .log
            .append_to(generation, MessageDraft::assistant(config, reply.clone()))
            .await
        else {
            return Ok(Step::Done(RunOutcome::Cancelled));
        };

        self.speech
            .speak(config, &reply, &self.run.conversation_id, generation, index)
            .await;
        if !self.log.is_live(generation).await {
            return Ok(Step::Done(RunOutcome::Cancelled));
        }

        tokio::time::sleep(self.timing.pause).await;
        if !self.log.is_live(generation).await {
            return Ok(Step::Done(RunOutcome::Cancelled));
        }

        if self.run.direction.ends_after(agent) {
            return Ok(Step::Done(self.finish(ENDED_AFTER_REPLY, RunOutcome::Completed).await));
        }
        Ok(Step::Next(reply))
    }

    async fn request_for(&self, agent: AgentId, from: Participant, incoming: &str) -> ChatRequest {
        let config = self.run.agents.get(agent);
        let other = self.run.agents.get(agent.other());
        let messages = self.log.messages().await;
        // The newest message is `incoming` itself.
        let prior = messages.split_last().map_or(&[][..], |(_, prior)| prior);

        ChatRequest {
            model: config.model.clone(),
            system_prompt: format!(
                "{} You are {} and you are talking to {}. Keep your responses concise and engaging.",
                config.prompt, config.name, other.name
            ),
            history: bounded_history(prior, &self.run.agents, agent, HISTORY_LIMIT),
            prompt: HistoryEntry {
                role: ChatRole::User,
                text: incoming.to_string(),
                name: speaker_name(&self.run.agents, from),
            },
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    async fn finish(&self, reason: &str, outcome: RunOutcome) -> RunOutcome {
        if self.log.finish(self.run.generation, reason).await {
            outcome
        } else {
            RunOutcome::Cancelled
        }
    }

    async fn fail(&self, agent: AgentId, err: TurnError) -> RunOutcome {
        error!(agent = %agent, error = %err, "Turn failed, stopping conversation");
        let generation = self.run.generation;
        self.log.end_thinking(generation, agent).await;
        self.log.end_speaking(generation, agent).await;
        let reason = format!("An error occurred: {err}. Stopping conversation.");
        self.finish(&reason, RunOutcome::Failed(err.to_string())).await
    }
}

fn speaker_name(agents: &AgentPair, participant: Participant) -> Option<String> {
    match participant {
        Participant::Human => None,
        Participant::Agent(id) => Some(agents.get(id).name.clone()),
    }
}

/// The most recent `limit` transcript entries as seen by `speaker`: its own
/// turns are assistant turns, everyone else's are user turns. System notices
/// are not part of the dialogue and are skipped.
pub fn bounded_history(
    prior: &[Message],
    agents: &AgentPair,
    speaker: AgentId,
    limit: usize,
) -> Vec<HistoryEntry> {
    let mut entries: Vec<HistoryEntry> = prior
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .map(|m| match m.agent {
            Some(id) if id == speaker => HistoryEntry {
                role: ChatRole::Assistant,
                text: m.content.clone(),
                name: None,
            },
            Some(id) => HistoryEntry {
                role: ChatRole::User,
                text: m.content.clone(),
                name: Some(agents.get(id).name.clone()),
            },
            None => HistoryEntry {
                role: ChatRole::User,
                text: m.content.clone(),
                name: None,
            },
        })
        .collect();
    let start = entries.len().saturating_sub(limit);
    entries.split_off(start)
}
