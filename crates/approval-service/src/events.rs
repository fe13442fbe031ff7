//! Lifecycle event bus.
//!
//! Every request transition publishes a structured event, so collaborators
//! (the notifier, a webhook consumer) can react without the workflow
//! knowing who is listening.

use chainctl_gateway::{AssemblyOutcome, BuildRecord, MatchResult};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::Request;

/// Maximum number of events buffered in the broadcast channel.
const EVENT_BUFFER_SIZE: usize = 64;

/// One request lifecycle transition, with a snapshot of the request as it
/// stood after the transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Submitted { request: Request },
    Approved { request: Request },
    Checking { request: Request },
    ExistingImageFound { request: Request, matched: MatchResult },
    Building { request: Request },
    AssemblyApplied { request: Request, outcome: AssemblyOutcome },
    AssemblyFailed { request: Request },
    Rejected { request: Request },
    BuildComplete { request: Request, build: BuildRecord },
}

impl LifecycleEvent {
    /// The request snapshot the event carries.
    pub fn request(&self) -> &Request {
        match self {
            LifecycleEvent::Submitted { request }
            | LifecycleEvent::Approved { request }
            | LifecycleEvent::Checking { request }
            | LifecycleEvent::ExistingImageFound { request, .. }
            | LifecycleEvent::Building { request }
            | LifecycleEvent::AssemblyApplied { request, .. }
            | LifecycleEvent::AssemblyFailed { request }
            | LifecycleEvent::Rejected { request }
            | LifecycleEvent::BuildComplete { request, .. } => request,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::Submitted { .. } => "submitted",
            LifecycleEvent::Approved { .. } => "approved",
            LifecycleEvent::Checking { .. } => "checking",
            LifecycleEvent::ExistingImageFound { .. } => "existing_image_found",
            LifecycleEvent::Building { .. } => "building",
            LifecycleEvent::AssemblyApplied { .. } => "assembly_applied",
            LifecycleEvent::AssemblyFailed { .. } => "assembly_failed",
            LifecycleEvent::Rejected { .. } => "rejected",
            LifecycleEvent::BuildComplete { .. } => "build_complete",
        }
    }
}

/// Broadcast bus for lifecycle events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { sender }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: LifecycleEvent) {
        debug!(
            kind = event.kind(),
            request_id = %event.request().id,
            "publishing lifecycle event"
        );
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
