use crate::agent::{AgentConfig, AgentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    Human,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::Human => write!(f, "human"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A transcript entry. Immutable once appended; its position in the log is
/// the turn number used to correlate audio assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// A message before the log has assigned it an id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub role: MessageRole,
    pub content: String,
    pub agent: Option<AgentId>,
    pub model: Option<String>,
}

impl MessageDraft {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            agent: None,
            model: None,
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Human,
            content: content.into(),
            agent: None,
            model: None,
        }
    }

    /// An utterance attributed to `agent`, tagged with the model that produced it.
    pub fn assistant(agent: &AgentConfig, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            agent: Some(agent.id),
            model: Some(agent.model.clone()),
        }
    }

    /// Assigns a fresh id and the current time.
    pub fn into_message(self) -> Message {
        Message {
            id: format!("msg_{}", Uuid::new_v4().simple()),
            role: self.role,
            content: self.content,
            timestamp: Utc::now(),
            agent: self.agent,
            model: self.model,
        }
    }
}
