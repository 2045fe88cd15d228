pub mod remote;

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::RuleCache;
use crate::config::Config;
use crate::domain::{DecisionRequest, DecisionResult, Rulepack};
use crate::error::{GovernorError, Result};
use crate::evaluator::RuleEvaluator;
use crate::observability::MetricsRegistry;
use crate::storage::{AuditRecord, AuditStore};

use remote::ControlPlaneClient;

/// Orchestrates the decision pipeline: rulepack cache, remote fetch on miss,
/// rule evaluation, best-effort audit persistence, and offline replay.
///
/// Foreground callers invoke `evaluate` concurrently; at most one background
/// replay worker exists, started at construction when offline mode is enabled
/// at that moment.
pub struct Governor {
    config: Config,
    remote: ControlPlaneClient,
    cache: RuleCache<Arc<Rulepack>>,
    evaluator: RuleEvaluator,
    store: Arc<dyn AuditStore>,
    offline: RwLock<bool>,
    replay_tx: mpsc::Sender<DecisionRequest>,
    /// Held until the replay worker takes it; keeping it alive means queued
    /// requests are accepted even when nothing drains them.
    replay_rx: Mutex<Option<mpsc::Receiver<DecisionRequest>>>,
    shutdown: CancellationToken,
    metrics: Arc<MetricsRegistry>,
}

impl std::fmt::Debug for Governor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Governor").finish_non_exhaustive()
    }
}

impl Governor {
    /// Build a governor from a validated configuration and an audit store.
    ///
    /// Fails fast on invalid configuration; a partially built governor is
    /// never returned. When `offline_mode` is set the replay worker is
    /// spawned onto the current Tokio runtime.
    pub fn new(config: Config, store: Arc<dyn AuditStore>) -> Result<Arc<Self>> {
        config.validate()?;

        let remote = ControlPlaneClient::new(&config)?;
        let cache = RuleCache::new(config.cache_ttl());
        let (replay_tx, replay_rx) = mpsc::channel(config.offline_queue_size);
        let offline = config.offline_mode;

        let governor = Arc::new(Governor {
            config,
            remote,
            cache,
            evaluator: RuleEvaluator::new(),
            store,
            offline: RwLock::new(offline),
            replay_tx,
            replay_rx: Mutex::new(Some(replay_rx)),
            shutdown: CancellationToken::new(),
            metrics: Arc::new(MetricsRegistry::new()),
        });

        if offline {
            governor.start_replay_worker();
        }

        Ok(governor)
    }

    /// Perform a governance decision.
    ///
    /// The cancellation token is honored before the rulepack fetch and before
    /// each rule check. Once evaluation succeeds the audit write completes
    /// regardless of cancellation; audit failures never fail the decision.
    pub async fn evaluate(
        &self,
        cancel: &CancellationToken,
        request: DecisionRequest,
    ) -> Result<DecisionResult> {
        let start = Instant::now();

        if cancel.is_cancelled() {
            return Err(GovernorError::Cancelled);
        }

        let pack = self.load_rulepack(&request.rulepack_id).await?;
        let verdict = self.evaluator.evaluate(cancel, &pack, &request.payload)?;

        let result = DecisionResult {
            allowed: verdict.allowed,
            reason: verdict.reason,
            latency: start.elapsed(),
        };

        self.metrics.record_decision(result.allowed);
        self.persist_audit(&request, &result).await;

        Ok(result)
    }

    /// Enqueue a request for later replay. Requires offline mode; never
    /// blocks the caller and fails immediately when the queue is saturated.
    pub fn queue(&self, request: DecisionRequest) -> Result<()> {
        if !*self.offline.read() {
            return Err(GovernorError::QueueDisabled);
        }
        match self.replay_tx.try_send(request) {
            Ok(()) => {
                self.metrics.record_queue(true);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.record_queue(false);
                Err(GovernorError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(GovernorError::QueueClosed),
        }
    }

    /// Flip the offline flag consulted on cache misses.
    ///
    /// This does not start or stop the replay worker: enabling offline mode
    /// after construction accepts queued requests, but nothing drains them
    /// unless the worker was already running from construction-time offline
    /// mode.
    pub fn with_offline(&self, enabled: bool) {
        *self.offline.write() = enabled;
        info!(enabled, "offline mode toggled");
    }

    /// Seed the cache with a rulepack under the default TTL and compile its
    /// rules. Supports air-gapped deployments that never fetch remotely.
    pub fn install_rulepack(&self, pack: Rulepack) -> Result<()> {
        self.evaluator.preload(&pack.id, &pack.rules)?;
        self.cache.set(pack.id.clone(), Arc::new(pack));
        Ok(())
    }

    /// Number of cached rulepacks (including lazily-unevicted expired ones).
    pub fn cached_rulepacks(&self) -> usize {
        self.cache.len()
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Stop the replay worker and close the audit store.
    pub async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        self.store.close().await?;
        Ok(())
    }

    /// Resolve a rulepack from cache, or fetch it when online.
    ///
    /// Reads never extend an entry's TTL. There is no per-id coalescing of
    /// concurrent misses: simultaneous callers may each fetch the same
    /// rulepack, and each stores its own copy.
    async fn load_rulepack(&self, id: &str) -> Result<Arc<Rulepack>> {
        if let Some(pack) = self.cache.get(id) {
            self.metrics.record_cache_lookup(true);
            return Ok(pack);
        }
        self.metrics.record_cache_lookup(false);

        if *self.offline.read() {
            return Err(GovernorError::OfflineUnavailable {
                rulepack_id: id.to_string(),
            });
        }

        let fetched = self.remote.fetch_rulepack(id).await;
        self.metrics.record_fetch(fetched.is_ok());
        let pack = Arc::new(fetched?);

        self.cache.set(id.to_string(), pack.clone());
        Ok(pack)
    }

    /// Persist an audit snapshot of the decision. Errors are swallowed; the
    /// caller's result is unaffected.
    async fn persist_audit(&self, request: &DecisionRequest, result: &DecisionResult) {
        let key = format!(
            "{}:{}",
            request.rulepack_id,
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );

        // Evaluation already succeeded, so a non-empty payload is valid JSON.
        let payload: Value = if request.payload.is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_slice(&request.payload).unwrap_or(Value::Null)
        };

        let snapshot = serde_json::json!({
            "rulepack_id": request.rulepack_id,
            "payload": payload,
            "allowed": result.allowed,
            "reason": result.reason,
            "latency_ms": result.latency_ms(),
        });
        let value = serde_json::to_vec(&snapshot).unwrap_or_else(|_| b"{}".to_vec());

        match self.store.put(AuditRecord { key, value }).await {
            Ok(()) => self.metrics.record_audit_write(true),
            Err(e) => {
                self.metrics.record_audit_write(false);
                warn!(error = %e, rulepack_id = %request.rulepack_id, "audit write failed");
            }
        }
    }

    /// Take the queue receiver and spawn the replay worker. Idempotent: the
    /// second call finds the receiver gone and does nothing.
    fn start_replay_worker(self: &Arc<Self>) {
        let receiver = self.replay_rx.lock().take();
        let Some(mut receiver) = receiver else {
            return;
        };

        let governor = Arc::clone(self);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            debug!("replay worker started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("replay worker stopping");
                        return;
                    }
                    maybe = receiver.recv() => {
                        let Some(request) = maybe else { return };
                        governor.metrics.record_replay();
                        // Replay is fire-and-forget, detached from any
                        // original caller's cancellation.
                        let detached = CancellationToken::new();
                        let _ = governor.evaluate(&detached, request).await;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RuleDefinition;
    use crate::storage::{MemoryStore, StorageError};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn local_pack() -> Rulepack {
        Rulepack {
            id: "local".to_string(),
            version: "1".to_string(),
            rules: vec![RuleDefinition {
                id: "rule-1".to_string(),
                description: "blocks secret".to_string(),
                pattern: "^secret".to_string(),
                allow: false,
            }],
            updated_at: Utc::now(),
        }
    }

    fn offline_governor(store: Arc<dyn AuditStore>) -> Arc<Governor> {
        let config = Config {
            api_key: "test-key".to_string(),
            offline_mode: true,
            offline_queue_size: 2,
            ..Default::default()
        };
        Governor::new(config, store).unwrap()
    }

    /// Serve one canned HTTP response on an ephemeral local port.
    async fn stub_control_plane(body: String) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}", addr)
    }

    async fn stub_status(status_line: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status_line
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_offline_cold_cache_fails_without_network() {
        let governor = offline_governor(Arc::new(MemoryStore::new()));

        let err = governor
            .evaluate(
                &CancellationToken::new(),
                DecisionRequest::new("local", br#"{"rule-1":"value"}"#.to_vec()),
            )
            .await
            .unwrap_err();

        match err {
            GovernorError::OfflineUnavailable { rulepack_id } => {
                assert_eq!(rulepack_id, "local")
            }
            other => panic!("expected offline error, got {:?}", other),
        }
        assert_eq!(governor.metrics().fetches_total.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_offline_warm_cache_succeeds() {
        let governor = offline_governor(Arc::new(MemoryStore::new()));
        governor.install_rulepack(local_pack()).unwrap();

        let result = governor
            .evaluate(
                &CancellationToken::new(),
                DecisionRequest::new("local", br#"{"rule-1":"secret-data"}"#.to_vec()),
            )
            .await
            .unwrap();

        assert!(!result.allowed);
        assert_eq!(result.reason, "blocks secret");
    }

    #[tokio::test]
    async fn test_scenario_rulepack_local() {
        let store = Arc::new(MemoryStore::new());
        let governor = offline_governor(store.clone());
        governor.install_rulepack(local_pack()).unwrap();
        let cancel = CancellationToken::new();

        let cases: &[(&[u8], bool, &str)] = &[
            (br#"{"rule-1":"secret-data"}"#, false, "blocks secret"),
            (br#"{"rule-1":"public-data"}"#, false, "no matching rule"),
            (br#"{}"#, false, "no matching rule"),
        ];
        for (payload, allowed, reason) in cases {
            let result = governor
                .evaluate(&cancel, DecisionRequest::new("local", payload.to_vec()))
                .await
                .unwrap();
            assert_eq!(result.allowed, *allowed);
            assert_eq!(result.reason, *reason);
        }

        let records_before = store.len();
        let err = governor
            .evaluate(&cancel, DecisionRequest::new("local", b"{not json".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, GovernorError::PayloadParse(_)));
        // No audit record for a failed evaluation.
        assert_eq!(store.len(), records_before);
    }

    #[tokio::test]
    async fn test_audit_record_written_on_success() {
        let store = Arc::new(MemoryStore::new());
        let governor = offline_governor(store.clone());
        governor.install_rulepack(local_pack()).unwrap();

        governor
            .evaluate(
                &CancellationToken::new(),
                DecisionRequest::new("local", br#"{"rule-1":"secret-data"}"#.to_vec()),
            )
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        let mut keys = Vec::new();
        store
            .iter(&mut |record| {
                keys.push(record.key.clone());
                let snapshot: Value = serde_json::from_slice(&record.value).unwrap();
                assert_eq!(snapshot["rulepack_id"], "local");
                assert_eq!(snapshot["allowed"], false);
                assert_eq!(snapshot["reason"], "blocks secret");
                Ok(())
            })
            .await
            .unwrap();
        assert!(keys[0].starts_with("local:"));
    }

    /// Store whose puts always fail, to prove audit errors are swallowed.
    #[derive(Debug, Default)]
    struct FailingStore {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl AuditStore for FailingStore {
        async fn put(&self, _record: AuditRecord) -> std::result::Result<(), StorageError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Backend("disk full".to_string()))
        }
        async fn get(&self, key: &str) -> std::result::Result<AuditRecord, StorageError> {
            Err(StorageError::NotFound(key.to_string()))
        }
        async fn iter(
            &self,
            _visit: &mut crate::storage::traits::Visitor<'_>,
        ) -> std::result::Result<(), StorageError> {
            Ok(())
        }
        async fn delete(&self, _key: &str) -> std::result::Result<(), StorageError> {
            Ok(())
        }
        async fn close(&self) -> std::result::Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_audit_failure_never_fails_decision() {
        let store = Arc::new(FailingStore::default());
        let governor = offline_governor(store.clone());
        governor.install_rulepack(local_pack()).unwrap();

        let result = governor
            .evaluate(
                &CancellationToken::new(),
                DecisionRequest::new("local", br#"{"rule-1":"secret-data"}"#.to_vec()),
            )
            .await
            .unwrap();

        assert_eq!(result.reason, "blocks secret");
        assert_eq!(store.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(
            governor
                .metrics()
                .audit_write_errors
                .load(Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn test_queue_requires_offline_mode() {
        let config = Config {
            api_key: "test-key".to_string(),
            ..Default::default()
        };
        let governor = Governor::new(config, Arc::new(MemoryStore::new())).unwrap();

        let err = governor
            .queue(DecisionRequest::new("local", Vec::new()))
            .unwrap_err();
        assert!(matches!(err, GovernorError::QueueDisabled));
    }

    #[tokio::test]
    async fn test_queue_full_fails_fast() {
        // Offline flag enabled post-construction: the queue accepts requests
        // but no worker drains them, so capacity 2 fills deterministically.
        let config = Config {
            api_key: "test-key".to_string(),
            offline_queue_size: 2,
            ..Default::default()
        };
        let governor = Governor::new(config, Arc::new(MemoryStore::new())).unwrap();
        governor.with_offline(true);

        governor
            .queue(DecisionRequest::new("local", Vec::new()))
            .unwrap();
        governor
            .queue(DecisionRequest::new("local", Vec::new()))
            .unwrap();

        let err = governor
            .queue(DecisionRequest::new("local", Vec::new()))
            .unwrap_err();
        assert!(matches!(err, GovernorError::QueueFull));
    }

    #[tokio::test]
    async fn test_replay_worker_drains_queue() {
        crate::observability::tracing::init_test_tracing();
        let store = Arc::new(MemoryStore::new());
        let governor = offline_governor(store.clone());
        governor.install_rulepack(local_pack()).unwrap();

        governor
            .queue(DecisionRequest::new(
                "local",
                br#"{"rule-1":"secret-data"}"#.to_vec(),
            ))
            .unwrap();

        // The worker replays in the background and persists an audit record.
        for _ in 0..50 {
            if store.len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.len(), 1);
        assert_eq!(governor.metrics().replays_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_fetch_and_cache_then_offline() {
        let body = serde_json::to_string(&local_pack()).unwrap();
        let base_url = stub_control_plane(body).await;

        let config = Config {
            api_base_url: base_url,
            api_key: "test-key".to_string(),
            http_timeout_secs: 5,
            ..Default::default()
        };
        let governor = Governor::new(config, Arc::new(MemoryStore::new())).unwrap();
        let cancel = CancellationToken::new();

        let result = governor
            .evaluate(
                &cancel,
                DecisionRequest::new("local", br#"{"rule-1":"secret-data"}"#.to_vec()),
            )
            .await
            .unwrap();
        assert_eq!(result.reason, "blocks secret");
        assert_eq!(governor.cached_rulepacks(), 1);

        // The stub only serves one request; a second evaluation must come
        // from the cache even after going offline.
        governor.with_offline(true);
        let result = governor
            .evaluate(
                &cancel,
                DecisionRequest::new("local", br#"{"rule-1":"public"}"#.to_vec()),
            )
            .await
            .unwrap();
        assert_eq!(result.reason, "no matching rule");
        assert_eq!(governor.metrics().fetches_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_non_200_status_is_fetch_error() {
        let base_url = stub_status("503 Service Unavailable").await;
        let config = Config {
            api_base_url: base_url,
            api_key: "test-key".to_string(),
            http_timeout_secs: 5,
            ..Default::default()
        };
        let governor = Governor::new(config, Arc::new(MemoryStore::new())).unwrap();

        let err = governor
            .evaluate(
                &CancellationToken::new(),
                DecisionRequest::new("local", Vec::new()),
            )
            .await
            .unwrap_err();
        match err {
            GovernorError::FetchStatus { status, .. } => assert_eq!(status, 503),
            other => panic!("expected fetch status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_token_rejected_before_fetch() {
        let governor = offline_governor(Arc::new(MemoryStore::new()));
        governor.install_rulepack(local_pack()).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = governor
            .evaluate(&cancel, DecisionRequest::new("local", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, GovernorError::Cancelled));
    }

    #[tokio::test]
    async fn test_invalid_config_is_fatal() {
        let config = Config {
            api_key: String::new(),
            ..Default::default()
        };
        let err = Governor::new(config, Arc::new(MemoryStore::new())).unwrap_err();
        assert!(matches!(err, GovernorError::Config(_)));
    }

    #[tokio::test]
    async fn test_close_shuts_down_worker() {
        let governor = offline_governor(Arc::new(MemoryStore::new()));
        governor.close().await.unwrap();

        // Give the worker a beat to observe the cancellation; the queue then
        // reports closed instead of accepting silently-dropped requests.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = governor
            .queue(DecisionRequest::new("local", Vec::new()))
            .unwrap_err();
        assert!(matches!(err, GovernorError::QueueClosed));
    }
}
