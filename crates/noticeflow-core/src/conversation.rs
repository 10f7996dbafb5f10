//! Dispatch history: inbound message, oracle decisions and action results.

use serde::{Deserialize, Serialize};

/// Recipients given either as one comma-separated string or as a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecipientList {
    Joined(String),
    List(Vec<String>),
}

impl RecipientList {
    /// Trimmed, non-empty addresses in the order given.
    pub fn addresses(&self) -> Vec<String> {
        let parts: Vec<&str> = match self {
            Self::Joined(s) => s.split(',').collect(),
            Self::List(items) => items.iter().flat_map(|s| s.split(',')).collect(),
        };
        parts
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl From<&str> for RecipientList {
    fn from(s: &str) -> Self {
        Self::Joined(s.to_string())
    }
}

/// One action the dispatch oracle may request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRequest {
    /// Forward the message to internal departments.
    ForwardMessage {
        message: String,
        recipients: RecipientList,
    },
    /// Tell the sender they wrote to the wrong address.
    NotifyWrongRecipient {
        sender_email: String,
        correct_department: String,
    },
    /// Run the notice workflow on a regulatory notice.
    InvokeNoticeWorkflow {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        escalation_criteria: Option<String>,
    },
}

impl ActionRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ForwardMessage { .. } => "forward_message",
            Self::NotifyWrongRecipient { .. } => "notify_wrong_recipient",
            Self::InvokeNoticeWorkflow { .. } => "invoke_notice_workflow",
        }
    }
}

/// The oracle's answer for one iteration. No actions means "done".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub actions: Vec<ActionRequest>,
}

impl Decision {
    pub fn is_final(&self) -> bool {
        self.actions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    Inbound { content: String },
    Decision(Decision),
    ActionResult { action: String, output: String },
    /// Loop-generated note, e.g. an unparsable decision.
    Note { content: String },
}

impl Turn {
    fn text(&self) -> Option<&str> {
        match self {
            Self::Inbound { content } | Self::Note { content } => Some(content.as_str()),
            Self::Decision(d) => d.message.as_deref().filter(|m| !m.trim().is_empty()),
            Self::ActionResult { output, .. } => Some(output.as_str()),
        }
    }
}

/// Append-only turn log for one dispatch session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new(inbound: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::Inbound {
                content: inbound.into(),
            }],
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Most recent turn carrying text.
    pub fn last_text(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(Turn::text)
    }
}
