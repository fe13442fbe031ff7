//! chainctl Gateway
//!
//! Everything that talks to the external build tool: applying custom
//! assemblies through the `$EDITOR` trick, reading build configs back,
//! listing repos and builds, and matching requests against images that
//! already exist.

pub mod build_config;
pub mod client;
pub mod error;
pub mod matcher;
pub mod models;

mod exec;

pub use build_config::{parse_build_config, render_build_config};
pub use client::{
    classify_assembly_output, sanitize_custom_name, AssemblyDisposition, BuildTool,
    ChainctlGateway,
};
pub use error::{GatewayError, Result};
pub use matcher::ImageMatcher;
pub use models::{
    AssemblyOutcome, AssemblyRequest, BuildConfig, BuildRecord, BuildResult, MatchResult,
    RepoSummary,
};
