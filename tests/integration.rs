//! Integration tests for Halcyon

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use halcyon::api::{self, AppState};
use halcyon::config::{FailurePolicy, HalcyonConfig};
use halcyon::generation::{GenerationClient, SamplingConfig};
use halcyon::memory::{ExchangeRecord, FileBackend, MemoryBackend, MemoryStore};
use halcyon::orchestrator::{InteractionOrchestrator, OrchestratorSettings};
use halcyon::HalcyonError;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

/// Provider that always answers with the same text
struct FixedClient(&'static str);

#[async_trait]
impl GenerationClient for FixedClient {
    async fn generate(
        &self,
        _prompt: &str,
        _context: &[ExchangeRecord],
        _sampling: &SamplingConfig,
        _timeout: Duration,
    ) -> halcyon::Result<String> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok(self.0.to_string())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Provider that always fails
struct BrokenClient;

#[async_trait]
impl GenerationClient for BrokenClient {
    async fn generate(
        &self,
        _prompt: &str,
        _context: &[ExchangeRecord],
        _sampling: &SamplingConfig,
        _timeout: Duration,
    ) -> halcyon::Result<String> {
        Err(HalcyonError::Generation("connection refused".to_string()))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

fn settings(policy: FailurePolicy) -> OrchestratorSettings {
    OrchestratorSettings {
        failure_policy: policy,
        ..Default::default()
    }
}

async fn open_store(path: &Path, max_size: usize) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::open(Arc::new(FileBackend::new(path)), max_size).await)
}

fn read_document(path: &Path) -> Vec<serde_json::Value> {
    let raw = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&raw).unwrap()
}

/// "hi" with a provider answering "hello" is recorded and reported as-is
#[tokio::test]
async fn test_single_exchange_is_persisted() {
    let dir = TempDir::new().unwrap();
    let config = HalcyonConfig::new(dir.path());
    let path = config.memory.file.clone();
    let store = open_store(&path, config.memory.max_size).await;
    let orchestrator = InteractionOrchestrator::new(
        store.clone(),
        Arc::new(FixedClient("hello")),
        OrchestratorSettings::from_config(&config),
    );

    let interaction = orchestrator.interact("hi").await.unwrap();
    assert_eq!(interaction.response, "hello");
    assert_eq!(interaction.input_length, 2);
    assert_eq!(interaction.response_length, 5);

    let document = read_document(&path);
    assert_eq!(document.len(), 1);
    assert_eq!(document[0]["user"], "hi");
    assert_eq!(document[0]["ai"], "hello");
    assert!(document[0]["timestamp"].is_string());
}

/// Memory survives a restart
#[tokio::test]
async fn test_memory_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("halcyon_memory.json");

    {
        let store = open_store(&path, 1000).await;
        let orchestrator = InteractionOrchestrator::new(
            store,
            Arc::new(FixedClient("first reply")),
            settings(FailurePolicy::Mask),
        );
        orchestrator.interact("one").await.unwrap();
        orchestrator.interact("two").await.unwrap();
    }

    let reopened = open_store(&path, 1000).await;
    let log = reopened.snapshot().await;
    let users: Vec<&str> = log.iter().map(|r| r.user_text.as_str()).collect();
    assert_eq!(users, vec!["one", "two"]);
}

/// The bound holds across appends and across reloads with a smaller bound
#[tokio::test]
async fn test_log_stays_bounded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("halcyon_memory.json");
    let store = open_store(&path, 3).await;
    let orchestrator = InteractionOrchestrator::new(
        store.clone(),
        Arc::new(FixedClient("ok, noted")),
        settings(FailurePolicy::Mask),
    );

    for i in 0..5 {
        orchestrator.interact(&format!("message {i}")).await.unwrap();
    }
    let document = read_document(&path);
    assert_eq!(document.len(), 3);
    assert_eq!(document[0]["user"], "message 2");

    let smaller = open_store(&path, 2).await;
    let log = smaller.snapshot().await;
    assert_eq!(log.len(), 2);
    assert_eq!(log.iter().next().unwrap().user_text, "message 3");
}

/// A corrupt document starts an empty log and is replaced on the next write
#[tokio::test]
async fn test_corrupt_document_recovers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("halcyon_memory.json");
    std::fs::write(&path, "{ this is not a list").unwrap();

    let store = open_store(&path, 1000).await;
    assert!(store.is_empty().await);

    let orchestrator = InteractionOrchestrator::new(
        store,
        Arc::new(FixedClient("fresh start")),
        settings(FailurePolicy::Mask),
    );
    orchestrator.interact("hello again").await.unwrap();
    assert_eq!(read_document(&path).len(), 1);
}

/// Legacy records written without a timestamp still load
#[tokio::test]
async fn test_legacy_records_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("halcyon_memory.json");
    std::fs::write(&path, r#"[{"user": "old question", "ai": "old answer"}]"#).unwrap();

    let store = open_store(&path, 1000).await;
    let log = store.snapshot().await;
    assert_eq!(log.len(), 1);
    assert_eq!(log.last().unwrap().ai_text, "old answer");
}

/// Concurrent interactions never lose an exchange
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_interactions_all_recorded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("halcyon_memory.json");
    let store = open_store(&path, 1000).await;
    let orchestrator = Arc::new(InteractionOrchestrator::new(
        store.clone(),
        Arc::new(FixedClient("concurrent reply")),
        settings(FailurePolicy::Mask),
    ));

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.interact(&format!("utterance {i}")).await })
        })
        .collect();
    for result in futures::future::join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(store.len().await, 32);
    assert_eq!(read_document(&path).len(), 32);
}

/// Provider failures are masked and leave memory untouched
#[tokio::test]
async fn test_failed_generation_records_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("halcyon_memory.json");
    let store = open_store(&path, 1000).await;

    let masked = InteractionOrchestrator::new(
        store.clone(),
        Arc::new(BrokenClient),
        settings(FailurePolicy::Mask),
    );
    let interaction = masked.interact("are you there?").await.unwrap();
    assert!(interaction.fallback);
    assert_eq!(
        interaction.response,
        "I'm having trouble generating a response right now. Please try again."
    );

    let strict = InteractionOrchestrator::new(
        store.clone(),
        Arc::new(BrokenClient),
        settings(FailurePolicy::Strict),
    );
    let err = strict.interact("are you there?").await.unwrap_err();
    assert!(matches!(err, HalcyonError::Generation(_)));

    assert!(store.is_empty().await);
    assert!(!path.exists());
}

/// Full HTTP round trip against a file-backed store
#[tokio::test]
async fn test_http_interact_list_clear() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("halcyon_memory.json");
    let backup_path = dir.path().join("halcyon_backup.json");
    let store = open_store(&path, 1000).await;
    let orchestrator = Arc::new(InteractionOrchestrator::new(
        store,
        Arc::new(FixedClient("hello")),
        settings(FailurePolicy::Mask),
    ));
    let backup: Arc<dyn MemoryBackend> = Arc::new(FileBackend::new(&backup_path));
    let app = api::build_app(AppState::new(orchestrator, backup), true);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/interact")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"input": "hi"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/memory").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let listing: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["entries"][0]["user"], "hi");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/memory/backup")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_document(&backup_path).len(), 1);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/memory/clear")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!path.exists());
    assert!(backup_path.exists());
}
