//! Duplicate-image matching.
//!
//! Before building anything new, scan the organization's existing
//! repositories for one that already carries every requested package.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::BuildTool;
use crate::error::Result;
use crate::models::MatchResult;

pub struct ImageMatcher {
    tool: Arc<dyn BuildTool>,
}

impl ImageMatcher {
    pub fn new(tool: Arc<dyn BuildTool>) -> Self {
        Self { tool }
    }

    /// Find repositories whose package set is a superset of `requested`.
    ///
    /// Repos are scanned in lexical name order so results do not depend on
    /// the tool's listing order. The base repo itself is excluded. A repo
    /// whose config cannot be fetched or parsed contributes no information
    /// and is skipped; only a failed repo listing aborts the scan.
    pub async fn find_matches(
        &self,
        base_repo: &str,
        requested: &[String],
    ) -> Result<Vec<MatchResult>> {
        let mut repos = self.tool.list_repos().await?;
        repos.sort_by(|a, b| a.name.cmp(&b.name));

        let requested_set: BTreeSet<&str> = requested.iter().map(String::as_str).collect();
        debug!(
            base_repo,
            requested = requested_set.len(),
            candidates = repos.len(),
            "scanning for existing images"
        );

        let mut matches = Vec::new();
        for repo in &repos {
            if repo.name == base_repo {
                continue;
            }
            let config = match self.tool.get_build_config(&repo.name).await {
                Ok(config) => config,
                Err(err) => {
                    warn!(repo = %repo.name, error = %err, "skipping repo: build config unavailable");
                    continue;
                }
            };
            let have: BTreeSet<&str> = config.packages.iter().map(String::as_str).collect();
            if requested_set.is_subset(&have) {
                debug!(repo = %repo.name, exact = have.len() == requested_set.len(), "candidate matches");
                matches.push(MatchResult {
                    repo_name: repo.name.clone(),
                    exact_match: have.len() == requested_set.len(),
                    packages: config.packages,
                });
            }
        }
        Ok(matches)
    }

    /// Pick the best match: the first exact match, else the first superset.
    pub fn select(matches: &[MatchResult]) -> Option<&MatchResult> {
        matches
            .iter()
            .find(|m| m.exact_match)
            .or_else(|| matches.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::models::{
        AssemblyOutcome, AssemblyRequest, BuildConfig, BuildRecord, RepoSummary,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FakeTool {
        /// Listing order as the tool would return it
        repos: Vec<&'static str>,
        /// Repo name -> packages; missing repos fail their config fetch
        configs: HashMap<&'static str, Vec<&'static str>>,
    }

    #[async_trait]
    impl BuildTool for FakeTool {
        async fn create_assembly(&self, _request: &AssemblyRequest) -> Result<AssemblyOutcome> {
            unreachable!("matcher never creates assemblies")
        }

        async fn get_build_config(&self, repo: &str) -> Result<BuildConfig> {
            match self.configs.get(repo) {
                Some(packages) => Ok(BuildConfig {
                    packages: packages.iter().map(|p| p.to_string()).collect(),
                }),
                None => Err(GatewayError::Parse(format!("no config for {repo}"))),
            }
        }

        async fn list_repos(&self) -> Result<Vec<RepoSummary>> {
            Ok(self
                .repos
                .iter()
                .map(|name| RepoSummary { name: name.to_string() })
                .collect())
        }

        async fn list_builds(&self, _repo: &str) -> Result<Vec<BuildRecord>> {
            Ok(Vec::new())
        }
    }

    fn matcher(tool: FakeTool) -> ImageMatcher {
        ImageMatcher::new(Arc::new(tool))
    }

    fn requested(packages: &[&str]) -> Vec<String> {
        packages.iter().map(|p| p.to_string()).collect()
    }

    #[tokio::test]
    async fn test_subset_and_exact_matches_found() {
        let m = matcher(FakeTool {
            repos: vec!["tools-extra", "tools-exact", "unrelated"],
            configs: HashMap::from([
                ("tools-exact", vec!["curl", "jq"]),
                ("tools-extra", vec!["curl", "git", "jq"]),
                ("unrelated", vec!["vim"]),
            ]),
        });

        let matches = m.find_matches("base", &requested(&["curl", "jq"])).await.unwrap();
        assert_eq!(matches.len(), 2);
        // Lexical scan order, not listing order
        assert_eq!(matches[0].repo_name, "tools-exact");
        assert!(matches[0].exact_match);
        assert_eq!(matches[1].repo_name, "tools-extra");
        assert!(!matches[1].exact_match);
    }

    #[tokio::test]
    async fn test_select_prefers_exact_regardless_of_name_order() {
        // Exact match sorts after the superset here
        let m = matcher(FakeTool {
            repos: vec!["zz-exact", "aa-extra"],
            configs: HashMap::from([
                ("zz-exact", vec!["curl", "jq"]),
                ("aa-extra", vec!["curl", "git", "jq"]),
            ]),
        });
        let matches = m.find_matches("base", &requested(&["curl", "jq"])).await.unwrap();
        let best = ImageMatcher::select(&matches).unwrap();
        assert_eq!(best.repo_name, "zz-exact");
        assert!(best.exact_match);

        // And before it here
        let m = matcher(FakeTool {
            repos: vec!["aa-exact", "zz-extra"],
            configs: HashMap::from([
                ("aa-exact", vec!["curl", "jq"]),
                ("zz-extra", vec!["curl", "git", "jq"]),
            ]),
        });
        let matches = m.find_matches("base", &requested(&["curl", "jq"])).await.unwrap();
        let best = ImageMatcher::select(&matches).unwrap();
        assert_eq!(best.repo_name, "aa-exact");
    }

    #[tokio::test]
    async fn test_select_falls_back_to_first_superset() {
        let m = matcher(FakeTool {
            repos: vec!["big-b", "big-a"],
            configs: HashMap::from([
                ("big-a", vec!["curl", "git", "jq"]),
                ("big-b", vec!["curl", "jq", "vim"]),
            ]),
        });
        let matches = m.find_matches("base", &requested(&["curl", "jq"])).await.unwrap();
        assert!(matches.iter().all(|m| !m.exact_match));
        assert_eq!(ImageMatcher::select(&matches).unwrap().repo_name, "big-a");
    }

    #[tokio::test]
    async fn test_unreadable_config_is_skipped_not_matched() {
        // "broken" has no fetchable config; it must not match anything,
        // not even an empty request.
        let m = matcher(FakeTool {
            repos: vec!["broken", "good"],
            configs: HashMap::from([("good", vec!["curl"])]),
        });
        let matches = m.find_matches("base", &requested(&["curl"])).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].repo_name, "good");
    }

    #[tokio::test]
    async fn test_base_repo_excluded() {
        let m = matcher(FakeTool {
            repos: vec!["python", "python-tools"],
            configs: HashMap::from([
                ("python", vec!["curl"]),
                ("python-tools", vec!["curl"]),
            ]),
        });
        let matches = m.find_matches("python", &requested(&["curl"])).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].repo_name, "python-tools");
    }

    #[tokio::test]
    async fn test_no_matches() {
        let m = matcher(FakeTool {
            repos: vec!["sparse"],
            configs: HashMap::from([("sparse", vec!["curl"])]),
        });
        let matches = m
            .find_matches("base", &requested(&["curl", "git", "rust"]))
            .await
            .unwrap();
        assert!(matches.is_empty());
        assert!(ImageMatcher::select(&matches).is_none());
    }
}
