//! Lifecycle event notifier.
//!
//! Subscribes to the event bus and renders each transition as a log line,
//! the same information a chat collaborator would post. When a webhook URL
//! is configured every event is also delivered there as JSON; delivery is
//! best-effort and never affects the workflow.

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::events::LifecycleEvent;

pub async fn run(
    mut events: broadcast::Receiver<LifecycleEvent>,
    approvers: Vec<String>,
    webhook_url: Option<String>,
) {
    let client = webhook_url.as_ref().map(|_| reqwest::Client::new());

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "notifier fell behind the event bus");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        info!("{}", describe_event(&event));
        if matches!(event, LifecycleEvent::Submitted { .. }) {
            if approvers.is_empty() {
                warn!("No approvers configured; request will wait indefinitely");
            } else {
                info!("Awaiting decision from: {}", approvers.join(", "));
            }
        }

        if let (Some(client), Some(url)) = (&client, &webhook_url) {
            match client.post(url).json(&event).send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "webhook rejected event");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "webhook delivery failed"),
            }
        }
    }
}

/// One human-readable line per lifecycle event.
fn describe_event(event: &LifecycleEvent) -> String {
    match event {
        LifecycleEvent::Submitted { request } => format!(
            "New image request {} from {}: \"{}\" on {} with {} package(s)",
            request.id,
            request.requester_id,
            request.request_name,
            request.base_image,
            request.packages.len()
        ),
        LifecycleEvent::Approved { request } => format!(
            "Request {} approved by {}",
            request.id,
            request.approver_id.as_deref().unwrap_or("unknown")
        ),
        LifecycleEvent::Checking { request } => {
            format!("Checking for existing images covering request {}", request.id)
        }
        LifecycleEvent::ExistingImageFound { request, matched } => format!(
            "Existing image {} already has every requested package for request {} ({}); pull {}",
            matched.repo_name,
            request.id,
            if matched.exact_match {
                "exact match"
            } else {
                "has all your packages plus more"
            },
            request.image_url.as_deref().unwrap_or("<unknown>")
        ),
        LifecycleEvent::Building { request } => {
            format!("Applying build configuration for request {}", request.id)
        }
        LifecycleEvent::AssemblyApplied { request, outcome } => {
            if outcome.created {
                format!(
                    "Custom image {} created for request {}; the build will complete on the provider's schedule",
                    outcome.custom_name, request.id
                )
            } else {
                format!(
                    "No changes were needed for request {}; the requested configuration is already applied",
                    request.id
                )
            }
        }
        LifecycleEvent::AssemblyFailed { request } => format!(
            "Assembly failed for request {}: {}",
            request.id,
            request.error.as_deref().unwrap_or("unknown error")
        ),
        LifecycleEvent::Rejected { request } => format!(
            "Request {} rejected by {}: {}",
            request.id,
            request.rejected_by.as_deref().unwrap_or("unknown"),
            request.rejection_reason.as_deref().unwrap_or("no reason given")
        ),
        LifecycleEvent::BuildComplete { request, build } => format!(
            "Custom image {} for request {} is built and available at {}",
            build.repo_name,
            request.id,
            request.image_url.as_deref().unwrap_or("<unknown>")
        ),
    }
}
