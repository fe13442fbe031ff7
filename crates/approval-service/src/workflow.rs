//! Approval workflow: the request lifecycle state machine.
//!
//! Requests move pending -> approved/rejected, then approved requests run
//! the build pipeline: check for an existing image, otherwise apply an
//! assembly and (for newly created repos) watch for build completion.
//! Every transition lands in the store first and is then published on the
//! event bus.

use std::sync::Arc;

use chainctl_gateway::{AssemblyRequest, BuildTool, ImageMatcher, MatchResult};
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::events::{EventBus, LifecycleEvent};
use crate::models::{
    clip_tool_output, NewRequest, Request, RequestStatus, RequestUpdate, SubmitRequest,
};
use crate::monitor::BuildMonitor;
use crate::store::{RequestStore, StoreError};

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("request not found: {0}")]
    NotFound(String),

    #[error("request is already {current}")]
    InvalidState { current: RequestStatus },
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => WorkflowError::NotFound(id),
            StoreError::InvalidState { current, .. } => WorkflowError::InvalidState { current },
        }
    }
}

pub struct ApprovalWorkflow {
    store: Arc<dyn RequestStore>,
    tool: Arc<dyn BuildTool>,
    matcher: ImageMatcher,
    monitor: Arc<BuildMonitor>,
    events: EventBus,
    registry: String,
}

impl ApprovalWorkflow {
    pub fn new(
        store: Arc<dyn RequestStore>,
        tool: Arc<dyn BuildTool>,
        monitor: Arc<BuildMonitor>,
        events: EventBus,
        registry: impl Into<String>,
    ) -> Self {
        Self {
            store,
            matcher: ImageMatcher::new(Arc::clone(&tool)),
            tool,
            monitor,
            events,
            registry: registry.into(),
        }
    }

    /// Record a new pending request.
    pub async fn submit(&self, submission: SubmitRequest) -> Request {
        let base_image = format!("{}/{}:latest", self.registry, submission.base_repo);
        let request = self
            .store
            .create(NewRequest {
                request_name: submission.request_name,
                base_repo: submission.base_repo,
                base_image,
                packages: submission.packages,
                description: submission.description,
                justification: submission.justification,
                requester_id: submission.requester_id,
            })
            .await;
        info!(
            "Image request submitted: {} by {} for {}",
            request.id, request.requester_id, request.image_name
        );
        self.events.publish(LifecycleEvent::Submitted {
            request: request.clone(),
        });
        request
    }

    /// Approve a pending request and run the build pipeline to its next
    /// resting status.
    ///
    /// The pending -> approved step is atomic on the stored status, so a
    /// concurrent approve or reject gets `InvalidState` instead of running
    /// the pipeline twice. Build-tool failures are recorded on the request
    /// (status `failed`) and returned as a normal result; only a missing
    /// request or a lost race is an error.
    pub async fn approve(
        &self,
        request_id: &str,
        approver_id: &str,
    ) -> Result<Request, WorkflowError> {
        let request = self
            .store
            .transition(
                request_id,
                RequestStatus::Pending,
                RequestUpdate {
                    status: Some(RequestStatus::Approved),
                    approver_id: Some(approver_id.to_string()),
                    approved_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        info!("Request {} approved by {}", request_id, approver_id);
        self.events.publish(LifecycleEvent::Approved {
            request: request.clone(),
        });

        let request = self
            .store
            .update(request_id, RequestUpdate::status(RequestStatus::Checking))
            .await?;
        self.events.publish(LifecycleEvent::Checking {
            request: request.clone(),
        });

        if let Some(matched) = self.find_existing_image(&request).await {
            let request = self
                .store
                .update(
                    request_id,
                    RequestUpdate {
                        status: Some(RequestStatus::ExistingImageFound),
                        existing_image: Some(matched.repo_name.clone()),
                        image_url: Some(format!(
                            "{}/{}:latest",
                            self.registry, matched.repo_name
                        )),
                        ..Default::default()
                    },
                )
                .await?;
            info!(
                "Request {} satisfied by existing image {} (exact: {})",
                request_id, matched.repo_name, matched.exact_match
            );
            self.events.publish(LifecycleEvent::ExistingImageFound {
                request: request.clone(),
                matched,
            });
            return Ok(request);
        }

        let request = self
            .store
            .update(request_id, RequestUpdate::status(RequestStatus::Building))
            .await?;
        self.events.publish(LifecycleEvent::Building {
            request: request.clone(),
        });

        let assembly = AssemblyRequest {
            base_repo: request.image_name.clone(),
            request_name: request.request_name.clone(),
            packages: request.packages.clone(),
            description: request.description.clone(),
        };
        match self.tool.create_assembly(&assembly).await {
            Ok(outcome) => {
                let status = if outcome.created {
                    RequestStatus::Completed
                } else {
                    RequestStatus::NoChanges
                };
                let request = self
                    .store
                    .update(
                        request_id,
                        RequestUpdate {
                            status: Some(status),
                            assembly_id: Some(outcome.assembly_id.clone()),
                            image_url: Some(outcome.image_url.clone()),
                            completed_at: Some(Utc::now()),
                            chainctl_output: Some(clip_tool_output(&outcome.raw_output)),
                            ..Default::default()
                        },
                    )
                    .await?;
                info!(
                    "Assembly applied for request {}: {} ({})",
                    request_id, outcome.custom_name, request.status
                );
                self.events.publish(LifecycleEvent::AssemblyApplied {
                    request: request.clone(),
                    outcome: outcome.clone(),
                });

                // A brand-new repo builds on the provider's schedule;
                // watch for the image actually landing.
                if outcome.created && !outcome.custom_name.is_empty() {
                    let events = self.events.clone();
                    self.monitor
                        .start_monitoring(
                            &request.id,
                            &outcome.custom_name,
                            Box::new(move |request, build| {
                                events.publish(LifecycleEvent::BuildComplete { request, build });
                            }),
                        )
                        .await;
                }
                Ok(request)
            }
            Err(e) => {
                warn!("Assembly failed for request {}: {:#}", request_id, e);
                let request = self
                    .store
                    .update(
                        request_id,
                        RequestUpdate {
                            status: Some(RequestStatus::Failed),
                            error: Some(e.to_string()),
                            ..Default::default()
                        },
                    )
                    .await?;
                self.events.publish(LifecycleEvent::AssemblyFailed {
                    request: request.clone(),
                });
                Ok(request)
            }
        }
    }

    /// Reject a pending request with a reason.
    pub async fn reject(
        &self,
        request_id: &str,
        approver_id: &str,
        reason: &str,
    ) -> Result<Request, WorkflowError> {
        let request = self
            .store
            .transition(
                request_id,
                RequestStatus::Pending,
                RequestUpdate {
                    status: Some(RequestStatus::Rejected),
                    rejected_by: Some(approver_id.to_string()),
                    rejection_reason: Some(reason.to_string()),
                    rejected_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        info!("Request {} rejected by {}", request_id, approver_id);
        self.events.publish(LifecycleEvent::Rejected {
            request: request.clone(),
        });
        Ok(request)
    }

    /// Remove a request and any monitor task still watching it.
    pub async fn delete(&self, request_id: &str) -> bool {
        self.monitor.stop_monitoring(request_id).await;
        let deleted = self.store.delete(request_id).await;
        if deleted {
            info!("Request {} deleted", request_id);
        }
        deleted
    }

    async fn find_existing_image(&self, request: &Request) -> Option<MatchResult> {
        match self
            .matcher
            .find_matches(&request.image_name, &request.packages)
            .await
        {
            Ok(matches) => ImageMatcher::select(&matches).cloned(),
            Err(e) => {
                // No repo information is not a reason to fail the approval;
                // fall through to building.
                warn!(
                    "Duplicate-image scan unavailable for request {}: {:#}",
                    request.id, e
                );
                None
            }
        }
    }
}
