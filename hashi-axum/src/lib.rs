//! Axum endpoint adapter for AG-UI agents.
//!
//! The adapter is deliberately thin: it parses the run input, hands it
//! to the bridge, and streams the resulting events back as SSE frames
//! with the headers AG-UI clients expect. Errors raised once streaming
//! has begun surface in-band as `RunError` events; only pre-stream
//! failures produce the JSON error envelope.

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use futures::StreamExt;
use hashi::encoder::{EventEncoder, SSE_CONTENT_TYPE, SSE_HEADERS};
use hashi::{AgUiAgent, RunAgentInput};
use tracing::{debug, error};

/// The error envelope returned when a request fails before streaming.
const ERROR_BODY: &str = r#"{"error":"An internal error has occurred."}"#;

/// Build a router exposing the agent at the given path.
///
/// ```rust,ignore
/// let app = hashi_axum::ag_ui_router(agent, "/agent");
/// axum::serve(listener, app).await?;
/// ```
#[must_use]
pub fn ag_ui_router(agent: AgUiAgent, path: &str) -> Router {
    Router::new()
        .route(path, post(run_agent))
        .with_state(agent)
}

/// Handle one AG-UI run request with a streaming SSE response.
async fn run_agent(State(agent): State<AgUiAgent>, body: Bytes) -> Response {
    let input: RunAgentInput = match serde_json::from_slice(&body) {
        Ok(input) => input,
        Err(err) => {
            error!(error = %err, "failed to parse run input");
            return error_envelope();
        }
    };
    debug!(
        thread_id = input.thread_id.as_deref().unwrap_or("generated"),
        messages = input.messages.len(),
        "run request received"
    );

    let encoder = EventEncoder::new();
    let frames = agent.run(input).filter_map(move |event| {
        let frame = match encoder.encode(&event) {
            Ok(frame) => Some(Ok::<_, std::convert::Infallible>(frame)),
            Err(err) => {
                error!(error = %err, event = event.name(), "dropping unencodable event");
                None
            }
        };
        async move { frame }
    });

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, SSE_CONTENT_TYPE);
    for (name, value) in SSE_HEADERS {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from_stream(frames))
        .unwrap_or_else(|err| {
            error!(error = %err, "failed to build streaming response");
            error_envelope()
        })
}

fn error_envelope() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        ERROR_BODY,
    )
        .into_response()
}
