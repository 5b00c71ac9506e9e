//! Inline-vs-worker serialization routing with request correlation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::config::PersistenceConfig;
use crate::error::{PersistenceError, Result};
use crate::worker::{self, WorkerOutput, WorkerRequest, WorkerResponse};
use flowdeck_model::StateDocument;

type PendingTable = Arc<Mutex<HashMap<u64, oneshot::Sender<std::result::Result<WorkerOutput, String>>>>>;

/// Counts of how many jobs took each path. Readable at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub inline: u64,
    pub offloaded: u64,
}

/// Routes each serialization job inline or to the worker.
///
/// Small payloads are cheaper to encode on the caller's task than to pay
/// the worker's message-passing overhead; large ones must not block
/// interactive code. The dispatcher owns the pending-request table and the
/// id generator — both are instance state, so independent engines (and
/// tests) never share a table.
///
/// If the worker dies, every pending job is rejected once, and all later
/// jobs run inline. The worker is never respawned.
pub struct SerializationDispatcher {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    pending: PendingTable,
    next_request_id: AtomicU64,
    worker_alive: Arc<AtomicBool>,
    large_payload_threshold: usize,
    worker_timeout: Duration,
    inline_count: AtomicU64,
    offload_count: AtomicU64,
}

impl SerializationDispatcher {
    /// Spawn a worker and its response router. Must be called from within
    /// a tokio runtime.
    pub fn new(config: &PersistenceConfig) -> Self {
        let (requests, responses) = worker::spawn_worker();
        Self::with_channels(requests, responses, config)
    }

    /// Wire the dispatcher to externally supplied worker channels.
    ///
    /// Tests use this to stand in a worker that stalls, replies with the
    /// wrong id, or dies.
    pub(crate) fn with_channels(
        requests: mpsc::UnboundedSender<WorkerRequest>,
        responses: mpsc::UnboundedReceiver<WorkerResponse>,
        config: &PersistenceConfig,
    ) -> Self {
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let worker_alive = Arc::new(AtomicBool::new(true));

        tokio::spawn(route_responses(
            responses,
            Arc::clone(&pending),
            Arc::clone(&worker_alive),
        ));

        Self {
            requests,
            pending,
            next_request_id: AtomicU64::new(1),
            worker_alive,
            large_payload_threshold: config.large_payload_threshold,
            worker_timeout: config.worker_timeout(),
            inline_count: AtomicU64::new(0),
            offload_count: AtomicU64::new(0),
        }
    }

    /// Whether the worker is still accepting jobs.
    pub fn worker_available(&self) -> bool {
        self.worker_alive.load(Ordering::SeqCst)
    }

    /// How many jobs ran inline vs. on the worker.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            inline: self.inline_count.load(Ordering::SeqCst),
            offloaded: self.offload_count.load(Ordering::SeqCst),
        }
    }

    /// Encode a state document to wire text.
    pub async fn serialize(&self, state: StateDocument) -> Result<String> {
        if state.estimate_wire_size() > self.large_payload_threshold && self.worker_available() {
            let request_id = self.next_id();
            let output = self
                .round_trip(
                    WorkerRequest::Serialize { request_id, state },
                    "serialize",
                )
                .await?;
            match output {
                WorkerOutput::Serialized(payload) => Ok(payload),
                other => Err(unexpected_output("serialize", &other)),
            }
        } else {
            self.inline_count.fetch_add(1, Ordering::SeqCst);
            serde_json::to_string(&state).map_err(PersistenceError::serialize_fault)
        }
    }

    /// Decode wire text to a raw JSON value.
    ///
    /// Routing uses the payload's byte length directly; shape validation
    /// is the caller's concern.
    pub async fn parse(&self, payload: String) -> Result<Value> {
        if payload.len() > self.large_payload_threshold && self.worker_available() {
            let request_id = self.next_id();
            let output = self
                .round_trip(WorkerRequest::Parse { request_id, payload }, "parse")
                .await?;
            match output {
                WorkerOutput::Parsed(value) => Ok(value),
                other => Err(unexpected_output("parse", &other)),
            }
        } else {
            self.inline_count.fetch_add(1, Ordering::SeqCst);
            serde_json::from_str(&payload).map_err(PersistenceError::parse_fault)
        }
    }

    /// Gzip wire text to a base64 archive string.
    ///
    /// Compression is always worth offloading; the inline path exists only
    /// as the dead-worker fallback.
    pub async fn compress(&self, payload: String) -> Result<String> {
        if self.worker_available() {
            let request_id = self.next_id();
            let output = self
                .round_trip(WorkerRequest::Compress { request_id, payload }, "compress")
                .await?;
            match output {
                WorkerOutput::Compressed(archived) => Ok(archived),
                other => Err(unexpected_output("compress", &other)),
            }
        } else {
            self.inline_count.fetch_add(1, Ordering::SeqCst);
            worker::gzip_base64(&payload).map_err(PersistenceError::serialize_fault)
        }
    }

    fn next_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Send one job to the worker and await its correlated response.
    ///
    /// The pending-table entry is removed on response, on timeout, and on
    /// worker death; a response arriving after removal is discarded by the
    /// router as an expected race.
    async fn round_trip(
        &self,
        request: WorkerRequest,
        operation: &'static str,
    ) -> Result<WorkerOutput> {
        let request_id = request.request_id();
        self.offload_count.fetch_add(1, Ordering::SeqCst);

        let (result_tx, result_rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending table lock poisoned")
            .insert(request_id, result_tx);

        if self.requests.send(request).is_err() {
            self.pending
                .lock()
                .expect("pending table lock poisoned")
                .remove(&request_id);
            self.worker_alive.store(false, Ordering::SeqCst);
            return Err(worker_terminated(operation));
        }

        match tokio::time::timeout(self.worker_timeout, result_rx).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(message))) => Err(PersistenceError::Serialization {
                operation,
                source: Box::new(std::io::Error::other(message)),
            }),
            // Sender dropped without a value: the router cleared the table
            // while this job was in flight.
            Ok(Err(_)) => Err(worker_terminated(operation)),
            Err(_) => {
                self.pending
                    .lock()
                    .expect("pending table lock poisoned")
                    .remove(&request_id);
                Err(PersistenceError::SerializationTimeout {
                    request_id,
                    timeout_ms: self.worker_timeout.as_millis() as u64,
                })
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending table lock poisoned").len()
    }
}

/// Deliver worker responses to their waiting callers.
///
/// Runs until the worker's response channel closes, which only happens
/// when the worker dies; at that point every still-pending job is
/// rejected and the dispatcher switches to inline-only.
async fn route_responses(
    mut responses: mpsc::UnboundedReceiver<WorkerResponse>,
    pending: PendingTable,
    worker_alive: Arc<AtomicBool>,
) {
    while let Some(response) = responses.recv().await {
        let waiter = pending
            .lock()
            .expect("pending table lock poisoned")
            .remove(&response.request_id);
        match waiter {
            Some(result_tx) => {
                // Caller may have timed out between removal and here.
                let _ = result_tx.send(response.result);
            }
            None => {
                tracing::debug!(
                    request_id = response.request_id,
                    "discarding worker response with no pending request"
                );
            }
        }
    }

    worker_alive.store(false, Ordering::SeqCst);
    let drained: Vec<_> = pending
        .lock()
        .expect("pending table lock poisoned")
        .drain()
        .collect();
    if !drained.is_empty() {
        tracing::warn!(
            rejected = drained.len(),
            "serialization worker terminated; rejecting pending jobs"
        );
    }
    for (_, result_tx) in drained {
        let _ = result_tx.send(Err("serialization worker terminated".to_string()));
    }
}

fn worker_terminated(operation: &'static str) -> PersistenceError {
    PersistenceError::Serialization {
        operation,
        source: Box::new(std::io::Error::other("serialization worker terminated")),
    }
}

fn unexpected_output(operation: &'static str, output: &WorkerOutput) -> PersistenceError {
    PersistenceError::Unknown {
        message: format!("worker returned mismatched output for {operation}: {output:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn small_doc() -> StateDocument {
        StateDocument::from_value(json!({"projects": [{"name": "p"}]})).unwrap()
    }

    fn large_doc() -> StateDocument {
        StateDocument::from_value(json!({
            "projects": [{"blob": "x".repeat(3000)}]
        }))
        .unwrap()
    }

    fn test_config() -> PersistenceConfig {
        PersistenceConfig {
            large_payload_threshold: 1024,
            worker_timeout_ms: 200,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_small_payload_never_routed_to_worker() {
        let dispatcher = SerializationDispatcher::new(&test_config());

        for _ in 0..5 {
            dispatcher.serialize(small_doc()).await.unwrap();
        }

        let stats = dispatcher.stats();
        assert_eq!(stats.inline, 5);
        assert_eq!(stats.offloaded, 0);
    }

    #[tokio::test]
    async fn test_large_payload_routed_to_worker() {
        let dispatcher = SerializationDispatcher::new(&test_config());

        let payload = dispatcher.serialize(large_doc()).await.unwrap();
        assert!(payload.contains("xxx"));

        let stats = dispatcher.stats();
        assert_eq!(stats.inline, 0);
        assert_eq!(stats.offloaded, 1);
    }

    #[tokio::test]
    async fn test_timeout_rejects_and_clears_pending() {
        // A worker that never responds: keep its channels alive but idle.
        let (request_tx, _request_rx) = mpsc::unbounded_channel();
        let (_response_tx, response_rx) = mpsc::unbounded_channel();
        let dispatcher =
            SerializationDispatcher::with_channels(request_tx, response_rx, &test_config());

        let result = dispatcher.serialize(large_doc()).await;
        assert!(matches!(
            result,
            Err(PersistenceError::SerializationTimeout { .. })
        ));
        assert_eq!(dispatcher.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_unknown_request_id_response_is_discarded() {
        let (request_tx, _request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let dispatcher =
            SerializationDispatcher::with_channels(request_tx, response_rx, &test_config());

        // Nothing pending under this id; the router must drop it quietly.
        response_tx
            .send(WorkerResponse {
                request_id: 999,
                result: Ok(WorkerOutput::Serialized("{}".to_string())),
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dispatcher.pending_len(), 0);
        assert!(dispatcher.worker_available());
    }

    #[tokio::test]
    async fn test_worker_death_rejects_pending_then_falls_back_inline() {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let dispatcher =
            SerializationDispatcher::with_channels(request_tx, response_rx, &test_config());

        // Kill the worker while a job is pending.
        let pending_job = dispatcher.serialize(large_doc());
        let killer = async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(request_rx);
            drop(response_tx);
        };
        let (result, ()) = tokio::join!(pending_job, killer);

        assert!(matches!(
            result,
            Err(PersistenceError::Serialization { .. })
        ));
        assert_eq!(dispatcher.pending_len(), 0);
        assert!(!dispatcher.worker_available());

        // Later jobs serialize inline, even above the threshold.
        dispatcher.serialize(large_doc()).await.unwrap();
        assert_eq!(dispatcher.stats().inline, 1);
    }

    #[tokio::test]
    async fn test_parse_routes_by_payload_length() {
        let dispatcher = SerializationDispatcher::new(&test_config());

        let small = "{\"projects\":[]}".to_string();
        dispatcher.parse(small).await.unwrap();

        let large = serde_json::to_string(&json!({
            "projects": ["y".repeat(4000)]
        }))
        .unwrap();
        dispatcher.parse(large).await.unwrap();

        let stats = dispatcher.stats();
        assert_eq!(stats.inline, 1);
        assert_eq!(stats.offloaded, 1);
    }

    #[tokio::test]
    async fn test_compress_round_trip_via_worker() {
        let dispatcher = SerializationDispatcher::new(&test_config());

        let payload = "{\"projects\":[\"zzzzzzzz\"]}".to_string();
        let archived = dispatcher.compress(payload.clone()).await.unwrap();
        assert_eq!(crate::worker::gunzip_base64(&archived).unwrap(), payload);
    }
}
