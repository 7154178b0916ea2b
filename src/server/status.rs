//! Operator-facing snapshot of what is configured and what the dispatcher
//! is doing. Reading it changes nothing.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::{AppState, ComponentStatus, WebhookStats};
use crate::dispatch::DispatcherStatus;

#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub service: &'static str,
    pub version: &'static str,
    pub configured: ConfiguredComponents,
    pub repository: Option<String>,
    pub dispatcher: DispatcherStatus,
    pub webhooks: WebhookStats,
}

#[derive(Debug, Serialize)]
pub struct ConfiguredComponents {
    #[serde(flatten)]
    pub components: ComponentStatus,
    pub signature_verification: bool,
}

pub async fn status_handler(State(app_state): State<AppState>) -> Json<StatusSnapshot> {
    Json(snapshot(&app_state))
}

pub fn snapshot(app_state: &AppState) -> StatusSnapshot {
    StatusSnapshot {
        service: "pr-diary",
        version: env!("CARGO_PKG_VERSION"),
        configured: ConfiguredComponents {
            components: app_state.components(),
            signature_verification: app_state.verifier().is_enabled(),
        },
        repository: app_state.watched_repo().map(ToString::to_string),
        dispatcher: app_state.dispatcher().status(),
        webhooks: app_state.stats(),
    }
}
