//! Webhook endpoint.
//!
//! Authenticates a delivery, parses it, applies the event filter and hands
//! accepted pull-request events to the dispatcher. Every delivery that
//! passes authentication and parsing gets 204, whether or not it was
//! actionable; processing happens after the response.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::dispatch::DispatchTask;
use crate::pr::PrActivity;
use crate::webhook::{
    should_process, PayloadError, WebhookPayload, HEADER_DELIVERY, HEADER_EVENT,
    HEADER_SIGNATURE,
};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// Outcome of a delivery that was authenticated and parsed.
#[derive(Debug, PartialEq, Eq)]
enum Delivery {
    Dispatched,
    Filtered,
    Dropped,
}

pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    app_state.record_received();
    match handle_delivery(&app_state, &headers, &body) {
        Ok(delivery) => {
            debug!(?delivery, "webhook handled");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            app_state.record_rejected();
            Err(e)
        }
    }
}

fn handle_delivery(
    app_state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Delivery, WebhookError> {
    let delivery = header_value(headers, HEADER_DELIVERY).map(str::to_string);

    // Authenticate before looking at the body.
    if !app_state
        .verifier()
        .verify(body, header_value(headers, HEADER_SIGNATURE))
    {
        warn!(delivery = ?delivery, bytes = body.len(), "rejected webhook with invalid signature");
        return Err(WebhookError::InvalidSignature);
    }

    let event = header_value(headers, HEADER_EVENT).ok_or_else(|| {
        warn!(delivery = ?delivery, "webhook without event header");
        WebhookError::MissingHeader(HEADER_EVENT)
    })?;

    let payload = WebhookPayload::parse(event, body).map_err(|e| {
        warn!(delivery = ?delivery, event, bytes = body.len(), error = %e, "malformed webhook payload");
        WebhookError::from(e)
    })?;

    if !should_process(event, payload.action().unwrap_or_default()) {
        app_state.record_filtered();
        info!(delivery = ?delivery, event, action = ?payload.action(), "webhook not actionable");
        return Ok(Delivery::Filtered);
    }

    // should_process only passes pull_request events with a known action
    let WebhookPayload::PullRequest(pr_event) = payload else {
        return Ok(Delivery::Filtered);
    };
    let Some(activity) = PrActivity::from_action(&pr_event.action) else {
        return Ok(Delivery::Filtered);
    };

    if let Some(watched) = app_state.watched_repo() {
        if *watched != pr_event.repository {
            warn!(
                delivery = ?delivery,
                watched = %watched,
                received = %pr_event.repository,
                "delivery for a repository other than the configured one"
            );
        }
    }

    let owner = pr_event.repository.owner.clone();
    let repo = pr_event.repository.name.clone();
    let number = pr_event.metadata.number;
    let task = DispatchTask {
        repo: pr_event.repository,
        metadata: pr_event.metadata,
        activity,
        delivery: delivery.clone(),
    };

    match app_state.dispatcher().dispatch(task) {
        Ok(()) => {
            app_state.record_dispatched();
            info!(delivery = ?delivery, %owner, %repo, pr = number, %activity, "pull request dispatched");
            Ok(Delivery::Dispatched)
        }
        Err(e) => {
            warn!(delivery = ?delivery, %owner, %repo, pr = number, error = %e, "dropped pull request event");
            Ok(Delivery::Dropped)
        }
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
