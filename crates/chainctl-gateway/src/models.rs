//! Data models for chainctl interactions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Input to a custom assembly: which repo to customize and with what.
#[derive(Debug, Clone)]
pub struct AssemblyRequest {
    /// Source repository inside the organization
    pub base_repo: String,

    /// Human-readable name the custom image name is derived from
    pub request_name: String,

    /// Extra packages to layer on top of the base
    pub packages: Vec<String>,

    /// Free-text description, embedded in the build config as comments
    pub description: String,
}

/// What happened when an assembly was applied.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyOutcome {
    /// Tracking identifier for this assembly attempt
    pub assembly_id: String,

    /// The tool reported creating a new repo or applying a new config
    pub created: bool,

    /// The tool reported the config already matched
    pub no_change: bool,

    /// Registry URL the customized image will be published under
    pub image_url: String,

    /// Sanitized repository name the image was saved as
    pub custom_name: String,

    /// Raw tool stdout, kept for diagnostics
    pub raw_output: String,
}

/// One repository in the organization listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSummary {
    pub name: String,
}

/// Wire shape of `chainctl images repos list -o json`.
#[derive(Debug, Deserialize)]
pub(crate) struct RepoListing {
    #[serde(default)]
    pub items: Vec<RepoSummary>,
}

/// Outcome of one historical build attempt for a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    /// Repository the build belongs to; stamped in by the gateway,
    /// the tool does not repeat it per record.
    #[serde(default)]
    pub repo_name: String,

    /// When the build finished, if it has
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,

    pub result: BuildResult,
}

/// Build verdict as reported by the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildResult {
    Success,
    Failure,
    Pending,
    /// Anything the tool reports that we do not recognize
    #[serde(other)]
    Unknown,
}

/// Wire shape of `chainctl images repos build list -o json`.
#[derive(Debug, Deserialize)]
pub(crate) struct BuildListing {
    #[serde(default)]
    pub reports: Vec<BuildRecord>,
}

/// Declarative build configuration of a repository, as parsed back
/// from the tool.
#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    pub packages: BTreeSet<String>,
}

/// A repository whose package set satisfies a request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub repo_name: String,

    /// Packages the repository already carries
    pub packages: BTreeSet<String>,

    /// True when the repository carries exactly the requested set,
    /// false when it is a strict superset
    pub exact_match: bool,
}
