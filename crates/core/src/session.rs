//! Conversation Session
//!
//! Owns one conversation log and brackets each run of the [`TurnEngine`]:
//! validates and seeds a new run, spawns the engine on its own task and lets
//! an operator stop it at any time.

use crate::{
    agent::{AgentPair, Direction, Participant},
    engine::{RunContext, RunOutcome, TurnEngine, TurnTiming},
    error::SessionError,
    llm_client::ChatClient,
    log::ConversationLog,
    message::MessageDraft,
    speech::SpeechPlayback,
    transcript::{TranscriptDocument, new_conversation_id},
};
use std::sync::Arc;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{Instrument, error, info, info_span};

/// A run in progress. Dropping the handle does not stop the run.
pub struct RunHandle {
    pub conversation_id: String,
    pub generation: u64,
    task: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Waits for the run to end.
    pub async fn outcome(self) -> RunOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(conversation_id = %self.conversation_id, error = %e, "Conversation task panicked");
                RunOutcome::Failed(e.to_string())
            }
        }
    }
}

pub struct ConversationSession {
    log: ConversationLog,
    chat: Arc<dyn ChatClient>,
    speech: Arc<SpeechPlayback>,
    agents: Mutex<AgentPair>,
    current: Mutex<Option<RunContext>>,
    timing: TurnTiming,
}

impl ConversationSession {
    /// `speech` must drive the same `log`.
    pub fn new(log: ConversationLog, chat: Arc<dyn ChatClient>, speech: Arc<SpeechPlayback>) -> Self {
        Self {
            log,
            chat,
            speech,
            agents: Mutex::new(AgentPair::default()),
            current: Mutex::new(None),
            timing: TurnTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: TurnTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Replaces the agent configuration. A run already in progress keeps the
    /// configuration it started with.
    pub async fn configure(&self, agents: AgentPair) {
        *self.agents.lock().await = agents;
    }

    pub async fn agents(&self) -> AgentPair {
        self.agents.lock().await.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.log.is_active().await
    }

    /// Starts a new run in `direction` opened by `seed`.
    ///
    /// Nothing is mutated when validation fails.
    pub async fn start(&self, direction: Direction, seed: &str) -> Result<RunHandle, SessionError> {
        // Held for the whole start so two starts cannot interleave.
        let mut current = self.current.lock().await;

        let agents = self.agents.lock().await.clone();
        for agent in [&agents.ai1, &agents.ai2] {
            if !agent.has_model() {
                return Err(SessionError::MissingModel(agent.id));
            }
        }
        let seed = seed.trim();
        if seed.is_empty() {
            return Err(SessionError::EmptySeed);
        }
        if self.log.is_active().await {
            return Err(SessionError::AlreadyActive);
        }

        let generation = self.log.start().await;
        let conversation_id = new_conversation_id();
        let draft = match direction.sender() {
            Participant::Human => MessageDraft::human(seed),
            Participant::Agent(id) => MessageDraft::assistant(agents.get(id), seed),
        };
        self.log.append_to(generation, draft).await;

        let run = RunContext {
            conversation_id: conversation_id.clone(),
            generation,
            direction,
            agents,
        };
        *current = Some(run.clone());
        info!(%conversation_id, generation, ?direction, "Starting conversation");

        let engine = TurnEngine::new(self.log.clone(), self.chat.clone(), self.speech.clone(), run)
            .with_timing(self.timing);
        let speech = self.speech.clone();
        let seed = seed.to_string();
        let span = info_span!("conversation_run", %conversation_id, generation);
        let task = tokio::spawn(
            async move {
                let run = engine.context();
                if let Participant::Agent(sender) = direction.sender() {
                    speech
                        .speak(run.agents.get(sender), &seed, &run.conversation_id, generation, 0)
                        .await;
                }
                engine.run(direction.receiver(), seed).await
            }
            .instrument(span),
        );

        Ok(RunHandle {
            conversation_id,
            generation,
            task,
        })
    }

    /// Stops the current run, recording `reason` as a final system message.
    /// Returns `false` when no run was active.
    pub async fn stop(&self, reason: Option<String>) -> bool {
        self.log.stop(reason).await
    }

    /// The most recent conversation as a shareable document, if one was started.
    pub async fn transcript(&self) -> Option<TranscriptDocument> {
        let current = self.current.lock().await;
        let run = current.as_ref()?;
        Some(TranscriptDocument::new(
            run.conversation_id.clone(),
            run.direction,
            &run.agents,
            self.log.messages().await,
        ))
    }
}
