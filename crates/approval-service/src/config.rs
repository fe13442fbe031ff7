//! Configuration management for the approval service.
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use tracing::warn;

use crate::package_search;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    /// Chainguard organization the service manages repos for
    pub org_id: String,

    /// Registry host images are pulled from
    pub registry: String,

    /// Chainguard API token passed to chainctl
    pub api_token: String,

    /// Package index used for package search
    pub apk_repository: String,

    /// Users allowed to approve or reject requests
    pub approver_user_ids: Vec<String>,

    /// Optional webhook that receives lifecycle events as JSON
    pub notify_webhook_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        let config = Config {
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid API_PORT")?,

            org_id: env::var("CHAINGUARD_ORG_ID").unwrap_or_default(),

            registry: env::var("CHAINGUARD_REGISTRY").unwrap_or_else(|_| "cgr.dev".to_string()),

            api_token: env::var("CHAINGUARD_API_TOKEN").unwrap_or_default(),

            apk_repository: env::var("CHAINGUARD_APK_REPOSITORY")
                .unwrap_or_else(|_| package_search::DEFAULT_REPOSITORY.to_string()),

            approver_user_ids: parse_approvers(
                &env::var("APPROVER_USER_IDS").unwrap_or_default(),
            ),

            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.org_id.is_empty() {
            anyhow::bail!("CHAINGUARD_ORG_ID is required");
        }

        if self.api_token.is_empty() {
            anyhow::bail!("CHAINGUARD_API_TOKEN is required");
        }

        if self.api_port == 0 {
            anyhow::bail!("API_PORT must be greater than 0");
        }

        if self.approver_user_ids.is_empty() {
            warn!("No APPROVER_USER_IDS configured. No one will receive approval requests.");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

/// Split a comma-separated approver list, dropping blanks.
fn parse_approvers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            api_host: "127.0.0.1".to_string(),
            api_port: 9000,
            org_id: "org-123".to_string(),
            registry: "cgr.dev".to_string(),
            api_token: "token-abc".to_string(),
            apk_repository: package_search::DEFAULT_REPOSITORY.to_string(),
            approver_user_ids: vec!["U1".to_string()],
            notify_webhook_url: None,
        }
    }

    #[test]
    fn test_config_defaults() {
        // Clear any existing environment variables
        env::remove_var("API_HOST");
        env::remove_var("API_PORT");
        env::remove_var("CHAINGUARD_REGISTRY");
        env::remove_var("CHAINGUARD_APK_REPOSITORY");
        env::remove_var("APPROVER_USER_IDS");
        env::remove_var("NOTIFY_WEBHOOK_URL");

        // Set minimal environment for testing
        env::set_var("CHAINGUARD_ORG_ID", "org-123");
        env::set_var("CHAINGUARD_API_TOKEN", "token-abc");

        let config = Config::from_env().expect("Failed to load config");

        assert_eq!(config.api_host, "0.0.0.0");
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.registry, "cgr.dev");
        assert_eq!(config.apk_repository, package_search::DEFAULT_REPOSITORY);
        assert!(config.approver_user_ids.is_empty());
        assert!(config.notify_webhook_url.is_none());
    }

    #[test]
    fn test_api_address() {
        assert_eq!(test_config().api_address(), "127.0.0.1:9000");
    }

    #[test]
    fn test_validate_requires_org_and_token() {
        let mut config = test_config();
        config.org_id = String::new();
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.api_token = String::new();
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.api_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_approvers() {
        assert_eq!(parse_approvers("U1,U2"), vec!["U1", "U2"]);
        assert_eq!(parse_approvers(" U1 , U2 ,,U3"), vec!["U1", "U2", "U3"]);
        assert!(parse_approvers("").is_empty());
        assert!(parse_approvers(" , ").is_empty());
    }
}
