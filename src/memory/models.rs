//! Data models for session memory

use crate::context::completion::ChatMessage;
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One user message / agent response exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub agent: String,
    pub message: String,
    /// Full agent payload; `response` holds the reply text
    pub response: Value,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(agent: impl Into<String>, message: impl Into<String>, response: Value) -> Self {
        Self {
            agent: agent.into(),
            message: message.into(),
            response,
            timestamp: Utc::now(),
        }
    }

    /// Reply text carried by the response payload, empty if absent
    pub fn response_text(&self) -> &str {
        match &self.response {
            Value::String(text) => text,
            other => other.get("response").and_then(Value::as_str).unwrap_or(""),
        }
    }
}

/// Persisted state of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    /// Live turns, oldest first
    #[serde(default)]
    pub messages: Vec<Turn>,
    /// Summary of the live turns at the last compaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Agents that answered in this session, in first-use order
    #[serde(default)]
    pub agents_used: IndexSet<String>,
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            created_at: Utc::now(),
            messages: Vec::new(),
            summary: None,
            agents_used: IndexSet::new(),
        }
    }

    /// Last `max_messages` live turns
    pub fn recent(&self, max_messages: usize) -> &[Turn] {
        let start = self.messages.len().saturating_sub(max_messages);
        &self.messages[start..]
    }

    pub fn descriptor(&self) -> SessionDescriptor {
        SessionDescriptor {
            session_id: self.session_id.clone(),
            created_at: self.created_at,
            summary: self.summary.clone(),
            agents_used: self.agents_used.iter().cloned().collect(),
            message_count: self.messages.len(),
        }
    }
}

/// Listing entry for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub summary: Option<String>,
    pub agents_used: Vec<String>,
    pub message_count: usize,
}

/// Stored summary plus the latest live turns of a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentContext {
    /// Empty when the session is unknown or was never summarized
    pub summary: String,
    pub recent_messages: Vec<Turn>,
}

impl RecentContext {
    pub fn to_messages(&self, format: ModelFormat) -> Vec<ChatMessage> {
        let summary = Some(self.summary.as_str()).filter(|s| !s.is_empty());
        format_context_for_model(summary, &self.recent_messages, format)
    }
}

/// Freshly compressed older turns plus the untouched recent suffix
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompactContext {
    /// `None` when no compression was needed
    pub summary: Option<String>,
    pub recent_messages: Vec<Turn>,
}

impl CompactContext {
    pub fn to_messages(&self, format: ModelFormat) -> Vec<ChatMessage> {
        format_context_for_model(self.summary.as_deref(), &self.recent_messages, format)
    }
}

/// Provider message conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// Summary travels as a `system` message
    OpenAi,
    /// Summary travels as an `assistant` message
    Anthropic,
}

/// Turn a summary and recent turns into a role/content message list
pub fn format_context_for_model(
    summary: Option<&str>,
    turns: &[Turn],
    format: ModelFormat,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turns.len() * 2 + 1);

    if let Some(summary) = summary.filter(|s| !s.is_empty()) {
        let content = format!("Summary of the previous conversation:\n{}", summary);
        messages.push(match format {
            ModelFormat::OpenAi => ChatMessage::system(content),
            ModelFormat::Anthropic => ChatMessage::assistant(content),
        });
    }

    for turn in turns {
        messages.push(ChatMessage::user(turn.message.clone()));
        messages.push(ChatMessage::assistant(turn.response_text()));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_text_extraction() {
        let turn = Turn::new("coder", "hi", json!({"response": "hello", "tokens": 3}));
        assert_eq!(turn.response_text(), "hello");

        let plain = Turn::new("coder", "hi", json!("plain reply"));
        assert_eq!(plain.response_text(), "plain reply");

        let missing = Turn::new("coder", "hi", json!({"other": 1}));
        assert_eq!(missing.response_text(), "");
    }

    #[test]
    fn test_agents_used_round_trips_as_list() {
        let mut record = SessionRecord::new("s1");
        record.agents_used.insert("planner".to_string());
        record.agents_used.insert("coder".to_string());
        record.agents_used.insert("planner".to_string());

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["agents_used"], json!(["planner", "coder"]));
        assert!(value.get("summary").is_none());

        let raw = json!({
            "session_id": "s1",
            "created_at": "2024-05-01T10:00:00Z",
            "agents_used": ["data", "data", "debugger"]
        });
        let loaded: SessionRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(loaded.agents_used.len(), 2);
        assert!(loaded.messages.is_empty());
        assert!(loaded.summary.is_none());
    }

    #[test]
    fn test_recent_slices_tail() {
        let mut record = SessionRecord::new("s1");
        for i in 0..4 {
            record.messages.push(Turn::new("a", format!("m{}", i), json!({"response": ""})));
        }
        let recent = record.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "m2");
        assert_eq!(record.recent(10).len(), 4);
    }

    #[test]
    fn test_format_for_openai_and_anthropic() {
        let turns = vec![Turn::new("coder", "question", json!({"response": "answer"}))];

        let openai = format_context_for_model(Some("earlier stuff"), &turns, ModelFormat::OpenAi);
        assert_eq!(openai.len(), 3);
        assert_eq!(openai[0].role, "system");
        assert!(openai[0].content.contains("earlier stuff"));
        assert_eq!(openai[1], ChatMessage::user("question"));
        assert_eq!(openai[2], ChatMessage::assistant("answer"));

        let anthropic = format_context_for_model(Some("earlier stuff"), &turns, ModelFormat::Anthropic);
        assert_eq!(anthropic[0].role, "assistant");

        let no_summary = format_context_for_model(Some(""), &turns, ModelFormat::OpenAi);
        assert_eq!(no_summary.len(), 2);
    }
}
