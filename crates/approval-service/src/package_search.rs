//! Package discovery for request forms.
//!
//! Live searches go through `apk search` against the Wolfi package index.
//! When apk is missing, slow, or returns nothing useful we degrade to a
//! small curated catalog so the caller always gets suggestions back.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, warn};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RESULTS: usize = 20;

/// Package index Chainguard images install from.
pub const DEFAULT_REPOSITORY: &str = "https://packages.wolfi.dev/os";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageHit {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSearchOutcome {
    pub search_term: String,
    pub packages: Vec<PackageHit>,
    /// Matches before the result cap was applied.
    pub total: usize,
    /// True when results came from the curated catalog instead of apk.
    pub fallback: bool,
}

pub struct PackageSearch {
    repository: String,
}

impl PackageSearch {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
        }
    }

    /// Search the package index, falling back to the curated catalog.
    /// Never fails: a broken index is an empty-ish answer, not an error.
    pub async fn search(&self, term: &str) -> PackageSearchOutcome {
        match self.search_index(term).await {
            Ok(hits) if !hits.is_empty() => {
                let total = hits.len();
                debug!(term, total, "apk search returned packages");
                PackageSearchOutcome {
                    search_term: term.to_string(),
                    packages: hits.into_iter().take(MAX_RESULTS).collect(),
                    total,
                    fallback: false,
                }
            }
            Ok(_) => {
                debug!(term, "apk search returned nothing, using fallback catalog");
                self.fallback(term)
            }
            Err(e) => {
                warn!(term, error = %e, "apk search unavailable, using fallback catalog");
                self.fallback(term)
            }
        }
    }

    async fn search_index(&self, term: &str) -> std::io::Result<Vec<PackageHit>> {
        let mut command = Command::new("apk");
        command
            .arg("search")
            .arg("-v")
            .arg(term)
            .arg("--repository")
            .arg(&self.repository)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(SEARCH_TIMEOUT, command.output())
            .await
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "apk search timed out")
            })??;
        if !output.status.success() {
            return Ok(Vec::new());
        }
        Ok(parse_search_output(&String::from_utf8_lossy(&output.stdout)))
    }

    fn fallback(&self, term: &str) -> PackageSearchOutcome {
        let needle = term.to_lowercase();
        let packages: Vec<PackageHit> = FALLBACK_CATALOG
            .iter()
            .filter(|(name, description)| {
                name.contains(&needle) || description.to_lowercase().contains(&needle)
            })
            .map(|(name, description)| PackageHit {
                name: name.to_string(),
                version: "latest".to_string(),
                description: description.to_string(),
            })
            .collect();
        PackageSearchOutcome {
            search_term: term.to_string(),
            total: packages.len(),
            packages,
            fallback: true,
        }
    }
}

/// Curated suggestions grouped by category, for request forms opened
/// without a search term.
pub fn popular_packages() -> BTreeMap<&'static str, Vec<&'static str>> {
    BTreeMap::from([
        (
            "Development Tools",
            vec!["git", "vim", "nano", "curl", "wget", "jq", "make", "gcc", "cmake"],
        ),
        (
            "Programming Languages",
            vec!["python-3.14", "python-3.13", "nodejs-25", "nodejs-22", "go", "ruby", "php"],
        ),
        ("Databases", vec!["postgresql", "mysql", "redis", "mongodb"]),
        ("Web Servers", vec!["nginx", "apache", "caddy"]),
        ("Security", vec!["openssl", "openssh", "gnupg"]),
    ])
}

/// Parse `apk search -v` output: one `name-version description` per line.
fn parse_search_output(stdout: &str) -> Vec<PackageHit> {
    stdout.lines().filter_map(parse_search_line).collect()
}

fn parse_search_line(line: &str) -> Option<PackageHit> {
    static LINE: OnceLock<Regex> = OnceLock::new();
    let re = LINE.get_or_init(|| {
        Regex::new(r"^([a-z0-9._-]+)-(\d\S*)\s*(.*)$").unwrap()
    });
    let caps = re.captures(line.trim())?;
    let description = caps.get(3).map_or("", |m| m.as_str());
    Some(PackageHit {
        name: caps[1].to_string(),
        version: caps[2].to_string(),
        description: description
            .strip_prefix("- ")
            .unwrap_or(description)
            .to_string(),
    })
}

static FALLBACK_CATALOG: &[(&str, &str)] = &[
    ("curl", "Command line tool for transferring data with URLs"),
    ("wget", "Network utility to retrieve files from the Web"),
    ("git", "Distributed version control system"),
    ("bash", "GNU Bourne Again shell"),
    ("python-3.13", "Python programming language (3.13)"),
    ("python-3.14", "Python programming language (3.14)"),
    ("nodejs-22", "Node.js JavaScript runtime (v22)"),
    ("nodejs-25", "Node.js JavaScript runtime (v25)"),
    ("go", "Go programming language"),
    ("jq", "Command-line JSON processor"),
    ("vim", "Vi IMproved text editor"),
    ("nano", "Simple text editor"),
    ("openssh", "OpenSSH client and server"),
    ("openssl", "Toolkit for SSL/TLS protocols"),
    ("postgresql", "PostgreSQL database"),
    ("redis", "In-memory data structure store"),
    ("nginx", "HTTP and reverse proxy server"),
    ("gcc", "GNU Compiler Collection"),
    ("make", "GNU Make build automation tool"),
    ("cmake", "Cross-platform build system"),
];
