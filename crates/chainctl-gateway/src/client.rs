//! chainctl client: drives the external build tool non-interactively.
//!
//! The tool only exposes build-config editing through `$EDITOR`, so both
//! the write and read paths swap in throwaway editor scripts: one that
//! copies a rendered config into place, one that prints the current config
//! and deliberately fails so nothing is saved.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempPath;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use crate::build_config::{parse_build_config, render_build_config};
use crate::error::{GatewayError, Result};
use crate::models::{
    AssemblyOutcome, AssemblyRequest, BuildConfig, BuildListing, BuildRecord, RepoListing,
    RepoSummary,
};

/// Budget for listings and config reads; assembly creation is unbounded
/// since the tool may push layers before returning.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on a generated custom image name.
const MAX_CUSTOM_NAME_LEN: usize = 50;

/// Abstraction over the external build tool.
///
/// The matcher, monitor and workflow all talk to this trait, so they can be
/// exercised against a fake without the real binary installed.
#[async_trait]
pub trait BuildTool: Send + Sync {
    /// Apply a customization, creating or updating the `--save-as` repo.
    async fn create_assembly(&self, request: &AssemblyRequest) -> Result<AssemblyOutcome>;

    /// Read back a repository's current build configuration.
    async fn get_build_config(&self, repo: &str) -> Result<BuildConfig>;

    /// List repositories in the organization.
    async fn list_repos(&self) -> Result<Vec<RepoSummary>>;

    /// List historical builds for a repository.
    async fn list_builds(&self, repo: &str) -> Result<Vec<BuildRecord>>;
}

/// How the tool reported an applied assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyDisposition {
    /// A new repo was created or a new config applied
    Created,
    /// The requested config was already in place
    NoChange,
    /// The tool succeeded but printed nothing we recognize
    Unclassified,
}

/// Classify assembly output by the tool's progress markers.
///
/// This is the only place those markers are known; when the tool grows a
/// structured output mode, this function is the seam to replace.
pub fn classify_assembly_output(stdout: &str) -> AssemblyDisposition {
    let haystack = stdout.to_lowercase();
    if haystack.contains("creating new repo") || haystack.contains("applying build config") {
        AssemblyDisposition::Created
    } else if haystack.contains("no changes detected") {
        AssemblyDisposition::NoChange
    } else {
        AssemblyDisposition::Unclassified
    }
}

/// Derive a registry-safe image name from a request name: lowercase,
/// strip everything outside `[a-z0-9 -]`, collapse whitespace runs to
/// single hyphens, cap the length.
pub fn sanitize_custom_name(request_name: &str) -> String {
    let mut name = String::with_capacity(request_name.len());
    let mut in_gap = false;
    for c in request_name.to_lowercase().chars() {
        if c.is_whitespace() {
            in_gap = true;
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
            if in_gap {
                name.push('-');
                in_gap = false;
            }
            name.push(c);
        }
    }
    if in_gap {
        name.push('-');
    }
    name.truncate(MAX_CUSTOM_NAME_LEN);
    name
}

/// Client for the `chainctl` binary.
pub struct ChainctlGateway {
    binary: PathBuf,
    org_id: String,
    registry: String,
    token: String,
}

impl ChainctlGateway {
    pub fn new(org_id: impl Into<String>, registry: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            binary: PathBuf::from("chainctl"),
            org_id: org_id.into(),
            registry: registry.into(),
            token: token.into(),
        }
    }

    /// Use a specific binary instead of resolving `chainctl` from PATH.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command.env("CHAINCTL_TOKEN", &self.token);
        command
    }

    /// Probe the installed tool; errors mean assemblies cannot be applied.
    pub async fn version(&self) -> Result<String> {
        let mut command = self.base_command();
        command.arg("version");
        let output =
            crate::exec::run_tool(command, "chainctl version", false, Some(COMMAND_TIMEOUT))
                .await?;
        if !output.status.success() {
            return Err(GatewayError::ExternalTool {
                message: format!("chainctl version exited with {:?}", output.status.code()),
                stderr: output.stderr,
            });
        }
        Ok(output.stdout.trim().to_string())
    }
}

#[async_trait]
impl BuildTool for ChainctlGateway {
    async fn create_assembly(&self, request: &AssemblyRequest) -> Result<AssemblyOutcome> {
        let custom_name = sanitize_custom_name(&request.request_name);
        let config = render_build_config(&request.description, &request.packages);
        debug!(
            repo = %request.base_repo,
            custom_name = %custom_name,
            "rendered build config:\n{config}"
        );

        // Both temp files are removed on drop, on every exit path.
        let mut config_file = tempfile::Builder::new()
            .prefix("build-config-")
            .suffix(".yaml")
            .tempfile()?;
        config_file.write_all(config.as_bytes())?;
        config_file.flush()?;
        let editor = stand_in_editor(&format!("cp '{}' \"$1\"\n", config_file.path().display()))?;

        let mut command = self.base_command();
        command
            .args(["images", "repos", "build", "edit"])
            .args(["--parent", &self.org_id])
            .args(["--repo", &request.base_repo])
            .args(["--save-as", &custom_name])
            .env("EDITOR", &editor);

        info!(repo = %request.base_repo, save_as = %custom_name, "applying custom assembly");
        let output = crate::exec::run_tool(command, "chainctl build edit", true, None).await?;
        if !output.status.success() {
            return Err(GatewayError::ExternalTool {
                message: format!("chainctl build edit exited with {:?}", output.status.code()),
                stderr: output.stderr,
            });
        }

        let disposition = classify_assembly_output(&output.stdout);
        Ok(AssemblyOutcome {
            assembly_id: format!("custom-{}", Uuid::new_v4()),
            created: disposition == AssemblyDisposition::Created,
            no_change: disposition == AssemblyDisposition::NoChange,
            image_url: format!("{}/{}:latest", self.registry, custom_name),
            custom_name,
            raw_output: output.stdout,
        })
    }

    async fn get_build_config(&self, repo: &str) -> Result<BuildConfig> {
        // The editor prints the config to stderr and fails, so the edit is
        // abandoned and the tool exits non-zero. That exit code carries no
        // signal here; the config text does.
        let editor = stand_in_editor("cat \"$1\" 1>&2\nexit 1\n")?;

        let mut command = self.base_command();
        command
            .args(["images", "repos", "build", "edit"])
            .args(["--parent", &self.org_id])
            .args(["--repo", repo])
            .env("EDITOR", &editor);

        let output =
            crate::exec::run_tool(command, "chainctl build edit", false, Some(COMMAND_TIMEOUT))
                .await?;
        let text = if output.stderr.trim().is_empty() {
            &output.stdout
        } else {
            &output.stderr
        };
        let packages = parse_build_config(text)?;
        Ok(BuildConfig { packages })
    }

    async fn list_repos(&self) -> Result<Vec<RepoSummary>> {
        let mut command = self.base_command();
        command
            .args(["images", "repos", "list"])
            .args(["--parent", &self.org_id])
            .args(["-o", "json"]);

        let output =
            crate::exec::run_tool(command, "chainctl repos list", false, Some(COMMAND_TIMEOUT))
                .await?;
        if !output.status.success() {
            return Err(GatewayError::ExternalTool {
                message: format!("chainctl repos list exited with {:?}", output.status.code()),
                stderr: output.stderr,
            });
        }
        let listing: RepoListing = serde_json::from_str(&output.stdout)
            .map_err(|e| GatewayError::Parse(format!("repo listing: {e}")))?;
        Ok(listing.items)
    }

    async fn list_builds(&self, repo: &str) -> Result<Vec<BuildRecord>> {
        let mut command = self.base_command();
        command
            .args(["images", "repos", "build", "list"])
            .args(["--parent", &self.org_id])
            .args(["--repo", repo])
            .args(["-o", "json"]);

        let output =
            crate::exec::run_tool(command, "chainctl build list", false, Some(COMMAND_TIMEOUT))
                .await?;
        if !output.status.success() {
            return Err(GatewayError::ExternalTool {
                message: format!("chainctl build list exited with {:?}", output.status.code()),
                stderr: output.stderr,
            });
        }
        let mut listing: BuildListing = serde_json::from_str(&output.stdout)
            .map_err(|e| GatewayError::Parse(format!("build listing: {e}")))?;
        for record in &mut listing.reports {
            record.repo_name = repo.to_string();
        }
        Ok(listing.reports)
    }
}

/// Write an executable stand-in `$EDITOR` script.
///
/// Returns a [`TempPath`] so the write handle is closed before the tool
/// execs the script; an open handle makes exec fail with ETXTBSY on Linux.
fn stand_in_editor(body: &str) -> Result<TempPath> {
    let mut script = tempfile::Builder::new()
        .prefix("chainctl-editor-")
        .suffix(".sh")
        .tempfile()?;
    script.write_all(format!("#!/bin/sh\n{body}").as_bytes())?;
    script.flush()?;
    let mut permissions = script.as_file().metadata()?.permissions();
    permissions.set_mode(0o755);
    script.as_file().set_permissions(permissions)?;
    Ok(script.into_temp_path())
}
