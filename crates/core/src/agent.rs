//! Agent Configuration
//!
//! Each conversation is driven by exactly two agents, `ai1` and `ai2`. This
//! module defines their identity, their per-agent configuration and the fixed
//! set of conversation directions that decide who opens and who answers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one of the two conversation participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentId {
    Ai1,
    Ai2,
}

impl AgentId {
    /// Returns the agent that takes the next turn after this one.
    pub fn other(self) -> Self {
        match self {
            AgentId::Ai1 => AgentId::Ai2,
            AgentId::Ai2 => AgentId::Ai1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentId::Ai1 => "ai1",
            AgentId::Ai2 => "ai2",
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text-to-speech settings for a single agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsConfig {
    pub enabled: bool,
    pub voice: String,
}

/// Everything needed to let one agent take a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub id: AgentId,
    pub name: String,
    /// Provider model identifier. An empty string means "not configured yet".
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub tts: TtsConfig,
}

impl AgentConfig {
    /// The opening agent's defaults: curious, brief, asks follow-up questions.
    pub fn default_ai1() -> Self {
        Self {
            id: AgentId::Ai1,
            name: "AI-1".to_string(),
            model: String::new(),
            prompt: "You are a curious and friendly AI who loves asking questions. You're having a conversation with another AI. Keep your responses brief and engaging. Ask follow-up questions. Answer short to the point.".to_string(),
            max_tokens: 1200,
            temperature: 0.5,
            tts: TtsConfig {
                enabled: false,
                voice: "Arista-PlayAI".to_string(),
            },
        }
    }

    /// The answering agent's defaults: knowledgeable, concise.
    pub fn default_ai2() -> Self {
        Self {
            id: AgentId::Ai2,
            name: "AI-2".to_string(),
            model: String::new(),
            prompt: "You are a knowledgeable and thoughtful AI. You're having a conversation with another AI. Respond to questions with interesting facts and insights. Keep responses concise. Answer short to the point.".to_string(),
            max_tokens: 1200,
            temperature: 0.5,
            tts: TtsConfig {
                enabled: false,
                voice: "Angelo-PlayAI".to_string(),
            },
        }
    }

    pub fn has_model(&self) -> bool {
        !self.model.trim().is_empty()
    }
}

/// The pair of agents taking part in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPair {
    pub ai1: AgentConfig,
    pub ai2: AgentConfig,
}

impl AgentPair {
    pub fn new(ai1: AgentConfig, ai2: AgentConfig) -> Self {
        Self { ai1, ai2 }
    }

    pub fn get(&self, id: AgentId) -> &AgentConfig {
        match id {
            AgentId::Ai1 => &self.ai1,
            AgentId::Ai2 => &self.ai2,
        }
    }
}

impl Default for AgentPair {
    fn default() -> Self {
        Self::new(AgentConfig::default_ai1(), AgentConfig::default_ai2())
    }
}

/// A value kept separately for each agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerAgent<T> {
    pub ai1: T,
    pub ai2: T,
}

impl<T> PerAgent<T> {
    pub fn get(&self, agent: AgentId) -> &T {
        match agent {
            AgentId::Ai1 => &self.ai1,
            AgentId::Ai2 => &self.ai2,
        }
    }

    pub fn set(&mut self, agent: AgentId, value: T) {
        match agent {
            AgentId::Ai1 => self.ai1 = value,
            AgentId::Ai2 => self.ai2 = value,
        }
    }
}

/// Whoever writes the opening message of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    Human,
    Agent(AgentId),
}

/// The configured initiator/responder pairing for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "human-to-ai1")]
    HumanToAi1,
    #[serde(rename = "human-to-ai2")]
    HumanToAi2,
    #[serde(rename = "ai1-to-ai2")]
    Ai1ToAi2,
    #[serde(rename = "ai2-to-ai1")]
    Ai2ToAi1,
}

impl Direction {
    pub fn sender(self) -> Participant {
        match self {
            Direction::HumanToAi1 | Direction::HumanToAi2 => Participant::Human,
            Direction::Ai1ToAi2 => Participant::Agent(AgentId::Ai1),
            Direction::Ai2ToAi1 => Participant::Agent(AgentId::Ai2),
        }
    }

    /// The agent answering the seed message.
    pub fn receiver(self) -> AgentId {
        match self {
            Direction::HumanToAi1 | Direction::Ai2ToAi1 => AgentId::Ai1,
            Direction::HumanToAi2 | Direction::Ai1ToAi2 => AgentId::Ai2,
        }
    }

    /// Human-initiated directions end once the addressed agent has replied.
    pub fn ends_after(self, agent: AgentId) -> bool {
        matches!(
            (self, agent),
            (Direction::HumanToAi1, AgentId::Ai1) | (Direction::HumanToAi2, AgentId::Ai2)
        )
    }
}
