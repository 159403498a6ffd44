//! HTTP surface of a node.
//!
//! | Route | Behaviour |
//! |-------|-----------|
//! | `GET /get` | Current document. |
//! | `POST /replace` | Submit a JSON Patch as a local transaction. 200 when applied or duplicate, 400 when rejected. |
//! | `GET /vclock` | Highest processed sequence number per source. |
//! | `GET /ws` | Replication upgrade; this node writes its log. |
//! | `GET /ws/push` | Replication upgrade; this node reads the dialer's log. |
//!
//! `/replace` bodies are taken as raw bytes so that a body which is not UTF-8
//! still reaches the sequencer and consumes a sequence number. Bodies above
//! [`MAX_PATCH_BYTES`] are refused with 413 before sequencing.

use axum::{
    body::Bytes,
    extract::{ws::WebSocketUpgrade, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::frames;
use crate::replication::{self, PULL_PATH, PUSH_PATH};
use crate::sequencer::{Outcome, Receipt, SequencerHandle, VectorClock};
use crate::shutdown::Shutdown;

/// Largest `/replace` body accepted.
pub const MAX_PATCH_BYTES: usize = 2 * 1024 * 1024;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub sequencer: SequencerHandle,
    pub shutdown: Shutdown,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/get", get(get_document))
        .route(
            "/replace",
            post(replace).layer(DefaultBodyLimit::max(MAX_PATCH_BYTES)),
        )
        .route("/vclock", get(vclock))
        .route(PULL_PATH, get(serve_log))
        .route(PUSH_PATH, get(receive_log))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ReplaceResponse {
    pub source: String,
    pub id: u64,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Receipt> for ReplaceResponse {
    fn from(receipt: Receipt) -> Self {
        let status = receipt.outcome.label();
        let error = match receipt.outcome {
            Outcome::Rejected(err) => Some(err.to_string()),
            Outcome::Applied | Outcome::Duplicate => None,
        };
        Self {
            source: receipt.source,
            id: receipt.id,
            status,
            error,
        }
    }
}

async fn get_document(State(state): State<AppState>) -> Json<Value> {
    Json(Value::clone(&state.sequencer.document()))
}

async fn replace(State(state): State<AppState>, body: Bytes) -> Response {
    match state.sequencer.submit_local(body.to_vec()).await {
        Ok(receipt) => {
            let code = if receipt.outcome.is_success() {
                StatusCode::OK
            } else {
                StatusCode::BAD_REQUEST
            };
            (code, Json(ReplaceResponse::from(receipt))).into_response()
        }
        Err(err) => error_response(StatusCode::SERVICE_UNAVAILABLE, err),
    }
}

async fn vclock(State(state): State<AppState>) -> Json<VectorClock> {
    Json(VectorClock::clone(&state.sequencer.vclock()))
}

async fn serve_log(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| async move {
        info!("replication writer attached");
        let (sink, incoming) = frames::split_accepted(socket);
        let log = std::sync::Arc::clone(state.sequencer.log());
        match replication::stream_log(log, sink, incoming, state.shutdown).await {
            Ok(stats) => info!(sent = stats.sent, "replication writer detached"),
            Err(err) => warn!(error = %err, "replication writer failed"),
        }
    })
}

async fn receive_log(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| async move {
        info!("replication reader attached");
        let (_sink, incoming) = frames::split_accepted(socket);
        match replication::apply_frames(&state.sequencer, incoming, state.shutdown).await {
            Ok(stats) => info!(
                applied = stats.applied,
                duplicates = stats.duplicates,
                rejected = stats.rejected,
                "replication reader detached"
            ),
            Err(err) => warn!(error = %err, "replication reader failed"),
        }
    })
}

fn error_response(code: StatusCode, err: impl std::fmt::Display) -> Response {
    (code, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}
