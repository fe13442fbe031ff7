//! Approval Service
//!
//! REST API for custom image requests + build-completion monitoring
//! + lifecycle notifications.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use approval_service::{
    create_router, notifier, AppState, ApprovalWorkflow, BuildMonitor, Config, EventBus,
    MemoryRequestStore, MonitorConfig, PackageSearch,
};
use chainctl_gateway::{BuildTool, ChainctlGateway};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "approval_service=debug,chainctl_gateway=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Approval Service");

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Organization: {}", config.org_id);
    info!("  Registry: {}", config.registry);
    info!("  Approvers configured: {}", config.approver_user_ids.len());
    info!("  API address: {}", config.api_address());

    // Probe the build tool once so a missing binary shows up at startup,
    // not on the first approval.
    let gateway = ChainctlGateway::new(&config.org_id, &config.registry, &config.api_token);
    match gateway.version().await {
        Ok(version) => info!("chainctl available: {}", version.trim()),
        Err(e) => warn!(
            "chainctl not available ({}); assembly operations will fail",
            e
        ),
    }
    let tool: Arc<dyn BuildTool> = Arc::new(gateway);

    // Wire the core
    let store = Arc::new(MemoryRequestStore::new());
    let events = EventBus::new();
    let monitor = Arc::new(BuildMonitor::new(
        tool.clone(),
        store.clone(),
        MonitorConfig::default(),
    ));
    let workflow = ApprovalWorkflow::new(
        store.clone(),
        tool,
        monitor.clone(),
        events.clone(),
        &config.registry,
    );

    // Notifier renders lifecycle events as logs (and webhook posts)
    let notifier_task = tokio::spawn(notifier::run(
        events.subscribe(),
        config.approver_user_ids.clone(),
        config.notify_webhook_url.clone(),
    ));

    let state = AppState {
        workflow,
        store,
        packages: PackageSearch::new(&config.apk_repository),
    };
    let app = create_router(state);

    // Start API server
    let api_addr = config.api_address();
    let listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .context("Failed to bind to address")?;
    info!("Approval Service API running on http://{}", api_addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("API server error: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down Approval Service");
    monitor.stop_all().await;
    notifier_task.abort();

    Ok(())
}
