use crate::pr::PrActivity;

/// Event type carrying pull request activity.
pub const PULL_REQUEST_EVENT: &str = "pull_request";

/// Whether a verified delivery warrants a summary: a `pull_request` event
/// whose action maps to a [`PrActivity`]. `ready_for_review` covers drafts
/// being promoted, which GitHub does not report as `opened`.
pub fn should_process(event_type: &str, action: &str) -> bool {
    event_type == PULL_REQUEST_EVENT && PrActivity::from_action(action).is_some()
}
