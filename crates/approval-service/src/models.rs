//! Data models for image requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest tool output retained on a request; the full text goes to the
/// logs, the stored copy is for display.
pub const MAX_TOOL_OUTPUT_BYTES: usize = 4096;

/// Image request lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Submitted, waiting for an approver
    Pending,
    /// An approver accepted the request
    Approved,
    /// An approver declined the request
    Rejected,
    /// Scanning existing repos for a duplicate image
    Checking,
    /// An existing image already satisfies the request; terminal
    ExistingImageFound,
    /// Assembly is being applied by the build tool
    Building,
    /// Assembly applied, new config in place
    Completed,
    /// Assembly applied, config already matched
    NoChanges,
    /// Assembly could not be applied; terminal
    Failed,
    /// The customized image finished building; terminal
    BuildComplete,
}

impl RequestStatus {
    /// Statuses no further transition leaves.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Rejected
                | RequestStatus::ExistingImageFound
                | RequestStatus::Failed
                | RequestStatus::BuildComplete
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Checking => "checking",
            RequestStatus::ExistingImageFound => "existing_image_found",
            RequestStatus::Building => "building",
            RequestStatus::Completed => "completed",
            RequestStatus::NoChanges => "no_changes",
            RequestStatus::Failed => "failed",
            RequestStatus::BuildComplete => "build_complete",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked request for a customized container image
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Unique request identifier
    pub id: String,

    /// Current lifecycle status
    pub status: RequestStatus,

    /// Base repository inside the organization
    pub image_name: String,

    /// Human-readable name the custom image name derives from
    pub request_name: String,

    /// Registry-qualified base image reference
    pub base_image: String,

    /// Requested extra packages, in submission order; never mutated
    /// after creation
    pub packages: Vec<String>,

    /// What the image is for
    pub description: String,

    /// Why the requester needs it
    pub justification: String,

    /// Who asked
    pub requester_id: String,

    /// Who approved (if anyone)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approver_id: Option<String>,

    /// Who rejected (if anyone)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,

    /// When the assembly finished applying
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// When the resulting image finished building
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_completed_at: Option<DateTime<Utc>>,

    /// Tracking id of the assembly attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assembly_id: Option<String>,

    /// Registry URL of the customized (or matched) image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Name of an existing repo that already satisfied the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_image: Option<String>,

    /// Clipped tool output, for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chainctl_output: Option<String>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Refreshed on every mutation
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// Create a pending request from submission data.
    pub fn new(id: String, new: NewRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: RequestStatus::Pending,
            image_name: new.base_repo,
            request_name: new.request_name,
            base_image: new.base_image,
            packages: new.packages,
            description: new.description,
            justification: new.justification,
            requester_id: new.requester_id,
            approver_id: None,
            rejected_by: None,
            rejection_reason: None,
            approved_at: None,
            rejected_at: None,
            completed_at: None,
            build_completed_at: None,
            assembly_id: None,
            image_url: None,
            existing_image: None,
            chainctl_output: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Everything a new request needs besides its id and timestamps.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub request_name: String,
    pub base_repo: String,
    pub base_image: String,
    pub packages: Vec<String>,
    pub description: String,
    pub justification: String,
    pub requester_id: String,
}

/// Partial update applied to a stored request.
///
/// Absent fields are left as-is. There is deliberately no `packages`
/// field here: the requested package list is immutable.
#[derive(Debug, Clone, Default)]
pub struct RequestUpdate {
    pub status: Option<RequestStatus>,
    pub approver_id: Option<String>,
    pub rejected_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub build_completed_at: Option<DateTime<Utc>>,
    pub assembly_id: Option<String>,
    pub image_url: Option<String>,
    pub existing_image: Option<String>,
    pub chainctl_output: Option<String>,
    pub error: Option<String>,
}

impl RequestUpdate {
    /// Shorthand for a bare status change.
    pub fn status(status: RequestStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Merge into `request`, refreshing its `updated_at`.
    pub fn apply(self, request: &mut Request) {
        if let Some(status) = self.status {
            request.status = status;
        }
        if self.approver_id.is_some() {
            request.approver_id = self.approver_id;
        }
        if self.rejected_by.is_some() {
            request.rejected_by = self.rejected_by;
        }
        if self.rejection_reason.is_some() {
            request.rejection_reason = self.rejection_reason;
        }
        if self.approved_at.is_some() {
            request.approved_at = self.approved_at;
        }
        if self.rejected_at.is_some() {
            request.rejected_at = self.rejected_at;
        }
        if self.completed_at.is_some() {
            request.completed_at = self.completed_at;
        }
        if self.build_completed_at.is_some() {
            request.build_completed_at = self.build_completed_at;
        }
        if self.assembly_id.is_some() {
            request.assembly_id = self.assembly_id;
        }
        if self.image_url.is_some() {
            request.image_url = self.image_url;
        }
        if self.existing_image.is_some() {
            request.existing_image = self.existing_image;
        }
        if self.chainctl_output.is_some() {
            request.chainctl_output = self.chainctl_output;
        }
        if self.error.is_some() {
            request.error = self.error;
        }
        request.updated_at = Utc::now();
    }
}

/// Submission payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Display name for the requested image
    pub request_name: String,

    /// Base repository to customize
    pub base_repo: String,

    /// Extra packages to include
    #[serde(default)]
    pub packages: Vec<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub justification: String,

    /// Who is asking
    pub requester_id: String,
}

/// Approval payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub approver_id: String,
}

/// Rejection payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    pub approver_id: String,
    pub reason: String,
}

/// Query filters for the request listing
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<RequestStatus>,
    pub user: Option<String>,
}

/// Query for package search
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

/// Clip tool output for storage, on a char boundary.
pub fn clip_tool_output(raw: &str) -> String {
    if raw.len() <= MAX_TOOL_OUTPUT_BYTES {
        return raw.to_string();
    }
    let mut end = MAX_TOOL_OUTPUT_BYTES;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    raw[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&RequestStatus::ExistingImageFound).unwrap();
        assert_eq!(json, "\"existing_image_found\"");
        let json = serde_json::to_string(&RequestStatus::BuildComplete).unwrap();
        assert_eq!(json, "\"build_complete\"");

        let status: RequestStatus = serde_json::from_str("\"no_changes\"").unwrap();
        assert_eq!(status, RequestStatus::NoChanges);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(RequestStatus::ExistingImageFound.is_terminal());
        assert!(RequestStatus::Failed.is_terminal());
        assert!(RequestStatus::BuildComplete.is_terminal());
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::Completed.is_terminal());
        assert!(!RequestStatus::NoChanges.is_terminal());
    }

    #[test]
    fn test_request_serializes_camel_case_and_skips_absent() {
        let request = Request::new(
            "req-1".to_string(),
            NewRequest {
                request_name: "My App".to_string(),
                base_repo: "python".to_string(),
                base_image: "cgr.dev/python:latest".to_string(),
                packages: vec!["curl".to_string()],
                description: String::new(),
                justification: String::new(),
                requester_id: "U123".to_string(),
            },
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["status"], "pending");
        assert_eq!(value["imageName"], "python");
        assert_eq!(value["requesterId"], "U123");
        assert!(value.get("approverId").is_none());
        assert!(value.get("error").is_none());
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn test_update_merges_and_refreshes_updated_at() {
        let mut request = Request::new(
            "req-1".to_string(),
            NewRequest {
                request_name: "My App".to_string(),
                base_repo: "python".to_string(),
                base_image: "cgr.dev/python:latest".to_string(),
                packages: vec!["curl".to_string(), "git".to_string()],
                description: "d".to_string(),
                justification: "j".to_string(),
                requester_id: "U123".to_string(),
            },
        );
        let before = request.updated_at;

        RequestUpdate {
            status: Some(RequestStatus::Approved),
            approver_id: Some("U999".to_string()),
            approved_at: Some(Utc::now()),
            ..Default::default()
        }
        .apply(&mut request);

        assert_eq!(request.status, RequestStatus::Approved);
        assert_eq!(request.approver_id.as_deref(), Some("U999"));
        assert!(request.updated_at >= before);
        // Untouched fields survive
        assert_eq!(request.requester_id, "U123");
        assert_eq!(request.packages, vec!["curl", "git"]);
    }

    #[test]
    fn test_clip_tool_output_char_safe() {
        let short = "done";
        assert_eq!(clip_tool_output(short), "done");

        // Multibyte char straddling the limit must not split
        let mut long = "a".repeat(MAX_TOOL_OUTPUT_BYTES - 1);
        long.push('é');
        long.push_str("tail");
        let clipped = clip_tool_output(&long);
        assert!(clipped.len() <= MAX_TOOL_OUTPUT_BYTES);
        assert!(clipped.ends_with('a'));
    }
}
