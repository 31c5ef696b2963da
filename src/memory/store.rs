//! Session memory store
//!
//! Sessions live in a concurrent map of per-session locks. Every operation on
//! one session runs under that session's lock, so appends, summarization and
//! deletes of the same session are serialized while different sessions
//! proceed in parallel. Listing reads a descriptor snapshot refreshed under
//! each session's lock, so it never waits on a session that is summarizing.
//! Persistence is best effort: storage failures are logged and counted, and
//! the in-memory record stays authoritative.

use super::models::{RecentContext, SessionDescriptor, SessionRecord, Turn};
use super::storage::SessionStorage;
use crate::config::MemoryConfig;
use crate::context::ContextCompressor;
use crate::error::{ContextError, Result};
use crate::metrics::METRICS;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

struct SessionSlot {
    record: SessionRecord,
    /// Set under the lock when the session is removed, so a writer that
    /// fetched the handle earlier does not write into a dead record
    deleted: bool,
}

type SessionHandle = Arc<Mutex<SessionSlot>>;

/// Result of appending one turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendOutcome {
    /// Session the turn landed in (generated when the caller passed none)
    pub session_id: String,
    /// Live turns after the append
    pub message_count: usize,
    /// Whether this append triggered a summarization pass
    pub summarized: bool,
}

/// Authoritative per-session conversation history
pub struct SessionMemoryStore {
    sessions: DashMap<String, SessionHandle>,
    descriptors: DashMap<String, SessionDescriptor>,
    storage: Arc<dyn SessionStorage>,
    compressor: Arc<ContextCompressor>,
    config: MemoryConfig,
}

impl SessionMemoryStore {
    /// Build the store and load every persisted session
    pub async fn load(
        storage: Arc<dyn SessionStorage>,
        compressor: Arc<ContextCompressor>,
        config: MemoryConfig,
    ) -> Result<Self> {
        let records = storage.load_all().await?;
        let sessions = DashMap::with_capacity(records.len());
        let descriptors = DashMap::with_capacity(records.len());
        for record in records {
            descriptors.insert(record.session_id.clone(), record.descriptor());
            sessions.insert(
                record.session_id.clone(),
                Arc::new(Mutex::new(SessionSlot { record, deleted: false })),
            );
        }

        info!(
            "Session memory ready: {} sessions, summarize above {} turns, keep {}",
            sessions.len(),
            config.summarize_threshold,
            config.keep_recent
        );

        Ok(Self {
            sessions,
            descriptors,
            storage,
            compressor,
            config,
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Number of known sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn handle(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    /// Append one turn, creating the session on first use.
    ///
    /// An empty `session_id` starts a new session under a generated ID.
    pub async fn append(&self, session_id: &str, agent: &str, message: &str, response: Value) -> AppendOutcome {
        let session_id = if session_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            session_id.to_string()
        };

        loop {
            let mut created = false;
            let handle = self
                .sessions
                .entry(session_id.clone())
                .or_insert_with(|| {
                    created = true;
                    Arc::new(Mutex::new(SessionSlot {
                        record: SessionRecord::new(session_id.clone()),
                        deleted: false,
                    }))
                })
                .value()
                .clone();

            let mut slot = handle.lock().await;
            if slot.deleted {
                // lost a race with delete; the next lookup creates a fresh session
                continue;
            }

            if created {
                METRICS.sessions_created.inc();
                info!("Created session {}", session_id);
            }

            slot.record.messages.push(Turn::new(agent, message, response));
            slot.record.agents_used.insert(agent.to_string());
            METRICS.session_appends.inc();
            self.persist(&slot.record).await;
            self.publish(&slot.record);

            let summarized = slot.record.messages.len() > self.config.summarize_threshold;
            if summarized {
                self.summarize(&mut slot.record).await;
                self.persist(&slot.record).await;
                self.publish(&slot.record);
            }

            debug!(
                "Appended turn to {}: agent={}, live turns={}",
                session_id,
                agent,
                slot.record.messages.len()
            );

            return AppendOutcome {
                session_id,
                message_count: slot.record.messages.len(),
                summarized,
            };
        }
    }

    /// Re-summarize every live turn, then keep only the newest `keep_recent`
    async fn summarize(&self, record: &mut SessionRecord) {
        let conversation = format_conversation(&record.messages);
        let summary = self
            .compressor
            .compress(&conversation, self.config.summary_max_tokens)
            .await;
        record.summary = Some(summary);

        let excess = record.messages.len().saturating_sub(self.config.keep_recent);
        record.messages.drain(..excess);

        METRICS.summarizations.inc();
        info!(
            "Summarized session {}: {} turns evicted, {} kept",
            record.session_id,
            excess,
            record.messages.len()
        );
    }

    async fn persist(&self, record: &SessionRecord) {
        if let Err(e) = self.storage.save(record).await {
            error!("Failed to persist session {}: {}", record.session_id, e);
            METRICS.record_persistence_failure("save");
        }
    }

    /// Refresh the listing snapshot; callers hold the session's lock
    fn publish(&self, record: &SessionRecord) {
        self.descriptors.insert(record.session_id.clone(), record.descriptor());
    }

    /// Stored summary plus the last `max_messages` live turns; empty for
    /// unknown sessions
    pub async fn recent_context(&self, session_id: &str, max_messages: usize) -> RecentContext {
        let Some(handle) = self.handle(session_id) else {
            return RecentContext::default();
        };
        let slot = handle.lock().await;
        if slot.deleted {
            return RecentContext::default();
        }
        RecentContext {
            summary: slot.record.summary.clone().unwrap_or_default(),
            recent_messages: slot.record.recent(max_messages).to_vec(),
        }
    }

    /// Snapshot of a whole session record
    pub async fn session(&self, session_id: &str) -> Option<SessionRecord> {
        let handle = self.handle(session_id)?;
        let slot = handle.lock().await;
        (!slot.deleted).then(|| slot.record.clone())
    }

    /// Like [`Self::session`], but unknown sessions are an error
    pub async fn require_session(&self, session_id: &str) -> Result<SessionRecord> {
        self.session(session_id)
            .await
            .ok_or_else(|| ContextError::NotFound(session_id.to_string()))
    }

    /// Live turns of a session
    pub async fn session_messages(&self, session_id: &str) -> Option<Vec<Turn>> {
        self.session(session_id).await.map(|record| record.messages)
    }

    /// Stored summary of a session, if it was ever summarized
    pub async fn session_summary(&self, session_id: &str) -> Option<String> {
        self.session(session_id).await.and_then(|record| record.summary)
    }

    /// Every known session, newest first
    pub async fn list_sessions(&self) -> Vec<SessionDescriptor> {
        let mut descriptors: Vec<SessionDescriptor> =
            self.descriptors.iter().map(|entry| entry.value().clone()).collect();
        descriptors.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        descriptors
    }

    /// Remove a session from memory and storage; returns whether it existed
    pub async fn delete(&self, session_id: &str) -> bool {
        let Some(handle) = self.handle(session_id) else {
            return false;
        };

        let mut slot = handle.lock().await;
        if slot.deleted {
            return false;
        }
        slot.deleted = true;

        // storage goes first; a racing append queues on this lock and
        // persists its fresh record afterwards
        if let Err(e) = self.storage.delete(session_id).await {
            error!("Failed to delete stored session {}: {}", session_id, e);
            METRICS.record_persistence_failure("delete");
        }

        self.descriptors.remove(session_id);
        self.sessions.remove_if(session_id, |_, current| Arc::ptr_eq(current, &handle));
        drop(slot);

        METRICS.sessions_deleted.inc();
        info!("Deleted session {}", session_id);
        true
    }
}

/// Conversation text handed to the compressor during summarization
fn format_conversation(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| {
            format!(
                "USER: {}\nAGENT({}): {}",
                turn.message,
                turn.agent,
                turn.response_text()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
