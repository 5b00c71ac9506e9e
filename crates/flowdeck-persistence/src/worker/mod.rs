//! Serialization worker and its message protocol.
//!
//! The worker keeps large-payload encode/decode work off the caller's
//! task. Requests go in over one channel, responses come back over
//! another, and the only correlation between them is the `request_id`:
//! each request is executed on the blocking pool independently, so
//! responses may arrive in any order relative to submission.
//!
//! The worker holds no state between requests. If either channel closes,
//! the worker is dead for good — the dispatcher notices and falls back to
//! inline serialization rather than respawning.

mod dispatcher;

pub use dispatcher::{DispatchStats, SerializationDispatcher};

use std::io::Write;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::Value;
use tokio::sync::mpsc;

use flowdeck_model::StateDocument;

/// A job sent to the worker. Every variant carries its correlation id.
#[derive(Debug)]
pub enum WorkerRequest {
    /// Encode a state document to wire text.
    Serialize {
        request_id: u64,
        state: StateDocument,
    },
    /// Decode wire text to a raw JSON value. Shape validation stays with
    /// the caller.
    Parse { request_id: u64, payload: String },
    /// Gzip wire text and return it base64-encoded.
    Compress { request_id: u64, payload: String },
}

impl WorkerRequest {
    /// The correlation id this request carries.
    pub fn request_id(&self) -> u64 {
        match self {
            Self::Serialize { request_id, .. }
            | Self::Parse { request_id, .. }
            | Self::Compress { request_id, .. } => *request_id,
        }
    }
}

/// Successful worker result, one variant per request kind.
#[derive(Debug)]
pub enum WorkerOutput {
    Serialized(String),
    Parsed(Value),
    Compressed(String),
}

/// A worker reply, correlated to its request by id.
#[derive(Debug)]
pub struct WorkerResponse {
    pub request_id: u64,
    pub result: Result<WorkerOutput, String>,
}

/// Spawn the worker task and return its request/response channels.
///
/// Must be called from within a tokio runtime.
pub(crate) fn spawn_worker() -> (
    mpsc::UnboundedSender<WorkerRequest>,
    mpsc::UnboundedReceiver<WorkerResponse>,
) {
    let (request_tx, mut request_rx) = mpsc::unbounded_channel::<WorkerRequest>();
    let (response_tx, response_rx) = mpsc::unbounded_channel::<WorkerResponse>();

    tokio::spawn(async move {
        while let Some(request) = request_rx.recv().await {
            let response_tx = response_tx.clone();
            tokio::task::spawn_blocking(move || {
                let request_id = request.request_id();
                let result = execute(request);
                // The dispatcher may already be gone; nothing to do then.
                let _ = response_tx.send(WorkerResponse { request_id, result });
            });
        }
    });

    (request_tx, response_rx)
}

fn execute(request: WorkerRequest) -> Result<WorkerOutput, String> {
    match request {
        WorkerRequest::Serialize { state, .. } => serde_json::to_string(&state)
            .map(WorkerOutput::Serialized)
            .map_err(|e| e.to_string()),
        WorkerRequest::Parse { payload, .. } => serde_json::from_str::<Value>(&payload)
            .map(WorkerOutput::Parsed)
            .map_err(|e| e.to_string()),
        WorkerRequest::Compress { payload, .. } => gzip_base64(&payload)
            .map(WorkerOutput::Compressed)
            .map_err(|e| e.to_string()),
    }
}

/// Gzip text and encode the result as base64.
pub(crate) fn gzip_base64(payload: &str) -> std::io::Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload.as_bytes())?;
    let bytes = encoder.finish()?;
    Ok(BASE64.encode(bytes))
}

/// Decode base64 text and gunzip it. Inverse of [`gzip_base64`].
pub(crate) fn gunzip_base64(archived: &str) -> std::io::Result<String> {
    let bytes = BASE64
        .decode(archived.trim())
        .map_err(std::io::Error::other)?;
    let mut decoder = flate2::read::GzDecoder::new(bytes.as_slice());
    let mut text = String::new();
    std::io::Read::read_to_string(&mut decoder, &mut text)?;
    Ok(text)
}
