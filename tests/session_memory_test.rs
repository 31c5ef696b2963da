//! End-to-end tests for the session memory store on real storage

use agent_memory::{
    config::MemoryConfig,
    context::{ChatMessage, CompletionClient, CompletionError, ContextCompressor},
    memory::{InMemoryStorage, JsonFileStorage, SessionMemoryStore, SessionRecord, SessionStorage},
    Result,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn open_store(storage: Arc<dyn SessionStorage>, config: MemoryConfig) -> SessionMemoryStore {
    tokio_test::assert_ok!(SessionMemoryStore::load(storage, Arc::new(ContextCompressor::offline()), config).await)
}

#[tokio::test]
async fn test_eleven_appends_trigger_one_summarization() {
    let store = open_store(Arc::new(InMemoryStorage::new()), MemoryConfig::default()).await;

    let mut summarized = 0;
    for i in 0..11 {
        let outcome = store
            .append("session", "coder", &format!("Explain ownership rule {}", i), json!({"response": "Borrowing explanation"}))
            .await;
        if outcome.summarized {
            summarized += 1;
        }
    }

    assert_eq!(summarized, 1);
    let context = store.recent_context("session", 15).await;
    assert!(!context.summary.is_empty());
    assert!(context.recent_messages.len() <= 15);
}

#[tokio::test]
async fn test_live_turns_never_exceed_keep_recent() {
    let store = open_store(Arc::new(InMemoryStorage::new()), MemoryConfig::default()).await;
    for i in 0..40 {
        let outcome = store.append("long", "planner", &format!("step {}", i), json!("ok")).await;
        assert!(outcome.message_count <= 15);
    }
    let messages = store.session_messages("long").await.unwrap();
    assert_eq!(messages.len(), 15);
    assert_eq!(messages.last().unwrap().message, "step 39");
}

#[tokio::test]
async fn test_append_monotonicity_and_agent_set() {
    let store = open_store(Arc::new(InMemoryStorage::new()), MemoryConfig::default()).await;
    let agents = ["planner", "coder", "coder", "data", "debugger", "planner"];
    for (i, agent) in agents.iter().enumerate() {
        store.append("s", agent, &format!("q{}", i), json!({"response": "a"})).await;
    }

    let context = store.recent_context("s", 15).await;
    assert_eq!(context.recent_messages.len(), agents.len());

    let sessions = store.list_sessions().await;
    let used: HashSet<&str> = sessions[0].agents_used.iter().map(String::as_str).collect();
    assert_eq!(used, agents.iter().copied().collect::<HashSet<_>>());
    assert!(sessions[0].agents_used.len() <= agents.len());
}

#[tokio::test]
async fn test_delete_round_trip_on_disk() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(JsonFileStorage::open(dir.path()).await.unwrap());
    let store = open_store(storage.clone(), MemoryConfig::default()).await;

    store.append("gone", "coder", "hello", json!({"response": "hi"})).await;
    assert!(storage.path_for("gone").exists());

    assert!(store.delete("gone").await);
    assert!(!storage.path_for("gone").exists());

    let context = store.recent_context("gone", 5).await;
    assert!(context.summary.is_empty());
    assert!(context.recent_messages.is_empty());
    assert!(store.list_sessions().await.iter().all(|s| s.session_id != "gone"));
    assert!(!store.delete("gone").await);
}

#[tokio::test]
async fn test_sessions_survive_restart() {
    let dir = TempDir::new().unwrap();

    {
        let storage = Arc::new(JsonFileStorage::open(dir.path()).await.unwrap());
        let store = open_store(storage, MemoryConfig::default()).await;
        for i in 0..12 {
            store.append("persisted", "data", &format!("row {}", i), json!({"response": "value"})).await;
        }
        store.append("other/session id", "coder", "x", json!({"response": "y"})).await;
    }

    let storage = Arc::new(JsonFileStorage::open(dir.path()).await.unwrap());
    let store = open_store(storage, MemoryConfig::default()).await;

    assert_eq!(store.session_count(), 2);
    let messages = store.session_messages("persisted").await.unwrap();
    assert_eq!(messages.len(), 12);
    assert!(store.session_summary("persisted").await.is_some());
    assert!(store.session("other/session id").await.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_keep_every_turn() {
    let config = MemoryConfig {
        summarize_threshold: 1000,
        keep_recent: 1000,
        ..Default::default()
    };
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(JsonFileStorage::open(dir.path()).await.unwrap());
    let store = Arc::new(open_store(storage.clone(), config).await);

    let mut tasks = Vec::new();
    for i in 0..32 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let session = if i % 2 == 0 { "even" } else { "odd" };
            store.append(session, "coder", &format!("turn {}", i), json!("ok")).await
        }));
    }
    for task in futures::future::join_all(tasks).await {
        task.unwrap();
    }

    assert_eq!(store.session_messages("even").await.unwrap().len(), 16);
    assert_eq!(store.session_messages("odd").await.unwrap().len(), 16);

    let reloaded = storage.load_all().await.unwrap();
    let even = reloaded.iter().find(|r| r.session_id == "even").unwrap();
    assert_eq!(even.messages.len(), 16);
}

/// LLM backend that takes a while to answer
struct SlowCompletion(Duration);

#[async_trait]
impl CompletionClient for SlowCompletion {
    async fn complete(&self, _messages: &[ChatMessage], _max_tokens: usize) -> std::result::Result<String, CompletionError> {
        tokio::time::sleep(self.0).await;
        Ok("slow summary".to_string())
    }
}

/// Storage whose deletes lag behind the caller
struct SlowDeleteStorage {
    inner: InMemoryStorage,
    delay: Duration,
}

#[async_trait]
impl SessionStorage for SlowDeleteStorage {
    async fn save(&self, record: &SessionRecord) -> Result<()> {
        self.inner.save(record).await
    }

    async fn load_all(&self) -> Result<Vec<SessionRecord>> {
        self.inner.load_all().await
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete(session_id).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_other_sessions_stay_responsive_during_summarization() {
    let config = MemoryConfig {
        summarize_threshold: 1,
        keep_recent: 1,
        ..Default::default()
    };
    let compressor = ContextCompressor::new(Some(Arc::new(SlowCompletion(Duration::from_secs(2)))), Duration::from_secs(10));
    let store = Arc::new(tokio_test::assert_ok!(
        SessionMemoryStore::load(Arc::new(InMemoryStorage::new()), Arc::new(compressor), config).await
    ));

    store.append("a", "coder", "first", json!("ok")).await;
    store.append("b", "data", "other", json!("ok")).await;

    let summarizing = {
        let store = store.clone();
        tokio::spawn(async move { store.append("a", "coder", "second", json!("ok")).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!summarizing.is_finished());

    let budget = Duration::from_secs(1);
    let sessions = tokio_test::assert_ok!(tokio::time::timeout(budget, store.list_sessions()).await);
    assert_eq!(sessions.len(), 2);
    let listed = tokio_test::assert_ok!(tokio::time::timeout(budget, store.list_sessions()).await);
    assert_eq!(listed.len(), 2);

    let context = tokio_test::assert_ok!(tokio::time::timeout(budget, store.recent_context("b", 5)).await);
    assert_eq!(context.recent_messages.len(), 1);

    let outcome = summarizing.await.unwrap();
    assert!(outcome.summarized);
    assert_eq!(store.session_summary("a").await.as_deref(), Some("slow summary"));
    let a = store.list_sessions().await.into_iter().find(|s| s.session_id == "a").unwrap();
    assert_eq!(a.message_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_append_racing_delete_is_persisted() {
    let storage = Arc::new(SlowDeleteStorage {
        inner: InMemoryStorage::new(),
        delay: Duration::from_millis(200),
    });
    let store = Arc::new(open_store(storage.clone(), MemoryConfig::default()).await);
    store.append("s", "coder", "before delete", json!("ok")).await;

    let deleting = {
        let store = store.clone();
        tokio::spawn(async move { store.delete("s").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcome = store.append("s", "data", "after delete", json!("ok")).await;
    assert!(deleting.await.unwrap());
    assert_eq!(outcome.message_count, 1);

    let persisted = storage.inner.get("s").unwrap();
    assert_eq!(persisted.messages.len(), 1);
    assert_eq!(persisted.messages[0].message, "after delete");

    let restarted = open_store(storage, MemoryConfig::default()).await;
    let messages = restarted.session_messages("s").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message, "after delete");
}
