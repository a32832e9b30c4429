use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use discourse_sync::config::SyncConfig;
use discourse_sync::discourse::DiscourseClient;
use discourse_sync::lock::FileLock;
use discourse_sync::multisite::{SiteRegistry, TopicSiteRouter};
use discourse_sync::publish::PublishCoordinator;
use discourse_sync::refresh::PullRefreshCache;
use discourse_sync::server::{AppState, build_router};
use discourse_sync::store::{FileStore, PostStore};
use discourse_sync::types::SiteId;
use discourse_sync::webhook::{DeferredNotifier, ExactTitleFallback, TracingSink, WebhookReceiver};

const STATE_DIR_VAR: &str = "DISCOURSE_SYNC_STATE_DIR";
const ADDR_VAR: &str = "DISCOURSE_SYNC_ADDR";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "discourse_sync=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(SyncConfig::from_env().context("loading configuration")?);
    let state_dir = PathBuf::from(std::env::var(STATE_DIR_VAR).unwrap_or_else(|_| "state".into()));
    let addr: SocketAddr = std::env::var(ADDR_VAR)
        .unwrap_or_else(|_| "0.0.0.0:3000".into())
        .parse()
        .with_context(|| format!("parsing {ADDR_VAR}"))?;

    if config.webhook_secret.is_none() {
        warn!("DISCOURSE_WEBHOOK_SECRET is not set; every webhook delivery will be rejected");
    }

    let local_site = config.local_site.unwrap_or(SiteId(1));
    let store: Arc<dyn PostStore> = Arc::new(open_site_store(&state_dir, local_site)?);
    let lock = Arc::new(FileLock::new(state_dir.join("locks"), config.lock_stale_after));
    let client = Arc::new(DiscourseClient::new(&config).context("building HTTP client")?);

    let notifier = DeferredNotifier::new(Arc::new(TracingSink), config.notification_debounce);
    let mut receiver = WebhookReceiver::new(config.clone(), store.clone(), notifier)
        .with_title_fallback(Arc::new(ExactTitleFallback));

    let mut publisher =
        PublishCoordinator::new(config.clone(), client.clone(), store.clone(), lock.clone());

    if config.multisite_routing {
        let router = Arc::new(
            TopicSiteRouter::open(state_dir.join("routes.log")).context("opening route log")?,
        );
        let sites = open_registry(&state_dir, local_site, store.clone())?;
        info!(routes = router.len(), local_site = %local_site, "Multisite routing enabled");
        receiver = receiver.with_routing(router.clone(), sites);
        publisher = publisher.with_router(router);
    }

    let refresher = PullRefreshCache::new(config.clone(), client, store.clone(), lock);
    let app = build_router(AppState::new(store, publisher, refresher, receiver));

    info!(%addr, base_url = %config.base_url, state_dir = %state_dir.display(), "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn site_posts_dir(state_dir: &Path, site: SiteId) -> PathBuf {
    state_dir.join("sites").join(site.to_string()).join("posts")
}

fn open_site_store(state_dir: &Path, site: SiteId) -> Result<FileStore> {
    let dir = site_posts_dir(state_dir, site);
    FileStore::open(&dir).with_context(|| format!("opening post store at {}", dir.display()))
}

/// Registers the local store plus every other site that has a directory
/// under `sites/`.
fn open_registry(
    state_dir: &Path,
    local_site: SiteId,
    local_store: Arc<dyn PostStore>,
) -> Result<SiteRegistry> {
    let mut registry = SiteRegistry::new().with_site(local_site, local_store);

    let sites_dir = state_dir.join("sites");
    let entries = match std::fs::read_dir(&sites_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(registry),
        Err(e) => return Err(e).with_context(|| format!("reading {}", sites_dir.display())),
    };

    for entry in entries {
        let entry = entry?;
        let Some(site) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u64>().ok())
            .map(SiteId)
        else {
            continue;
        };
        if site != local_site {
            registry = registry.with_site(site, Arc::new(open_site_store(state_dir, site)?));
        }
    }
    Ok(registry)
}
