//! Command implementations and their JSON output shapes.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use glimmer_client::{HttpRemote, HttpRemoteConfig};
use glimmer_core::store::StoreStats;
use glimmer_core::sync::FailedDownload;
use glimmer_core::{
    AppConfig, AssetRef, CollectionId, CollectionKey, FsStore, SyncMode, SyncOrchestrator, SyncOutcome, SyncReport,
    paginate,
};
use glimmer_viewer::{StoreAssetLoader, ViewConfig, ViewSession};

use crate::error::CommandError;

/// Everything a command needs, built once from configuration.
pub struct App {
    config: AppConfig,
    orchestrator: Arc<SyncOrchestrator>,
}

impl App {
    pub async fn open(config: AppConfig) -> anyhow::Result<Self> {
        let store = FsStore::open(&config.store_root).await?;
        let remote = HttpRemote::new(HttpRemoteConfig::from(&config))?;
        let orchestrator = SyncOrchestrator::new(Arc::new(store), Arc::new(remote), config.sync_config());

        tracing::info!(store_root = %config.store_root.display(), remote = %config.remote_base_url, "opened store");

        Ok(Self { config, orchestrator: Arc::new(orchestrator) })
    }
}

#[derive(Debug, Serialize)]
pub struct FailedOutput {
    pub locator: String,
    pub error: String,
}

impl From<FailedDownload> for FailedOutput {
    fn from(failed: FailedDownload) -> Self {
        Self { locator: failed.locator, error: failed.error.to_string() }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportOutput {
    pub listed: usize,
    pub required: usize,
    pub downloaded: usize,
    pub duplicates: usize,
    pub failed: Vec<FailedOutput>,
}

impl From<SyncReport> for ReportOutput {
    fn from(report: SyncReport) -> Self {
        Self {
            listed: report.listed,
            required: report.required,
            downloaded: report.downloaded,
            duplicates: report.duplicates,
            failed: report.failed.into_iter().map(FailedOutput::from).collect(),
        }
    }
}

/// Output of `glimmer sync`.
#[derive(Debug, Serialize)]
pub struct SyncOutput {
    pub collection: String,
    pub outcome: &'static str,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub items: usize,
    pub last_synced: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_error: Option<String>,
}

pub async fn sync(app: &App, key: &CollectionKey, force: bool) -> Result<SyncOutput, CommandError> {
    let mode = if force { SyncMode::Force } else { SyncMode::IfStale };
    let outcome = app.orchestrator.sync_with(key, mode).await?;

    let outcome_label = outcome.label();
    let from_cache = outcome.from_cache();
    let (snapshot, report, remote_error) = match outcome {
        SyncOutcome::Fresh(snapshot) => (snapshot, None, None),
        SyncOutcome::Refreshed { snapshot, report } => (snapshot, Some(report.into()), None),
        SyncOutcome::Stale { snapshot, error } => (snapshot, None, Some(error.to_string())),
        SyncOutcome::Unavailable { error } => return Err(CommandError::Unavailable(error)),
    };

    Ok(SyncOutput {
        collection: CollectionId::for_key(key).to_string(),
        outcome: outcome_label,
        from_cache,
        title: snapshot.meta.title,
        items: snapshot.items.len(),
        last_synced: snapshot.last_synced.to_rfc3339(),
        report,
        remote_error,
    })
}

/// Output of `glimmer list`.
#[derive(Debug, Serialize)]
pub struct ListOutput {
    pub collection: String,
    pub outcome: &'static str,
    pub page_index: usize,
    pub page_size: usize,
    pub total: usize,
    pub has_more: bool,
    pub items: Vec<AssetRef>,
}

pub async fn list(
    app: &App, key: &CollectionKey, page_index: usize, page_size: Option<usize>,
) -> Result<ListOutput, CommandError> {
    let page_size = page_size.unwrap_or(app.config.page_size);
    let outcome = app.orchestrator.sync_with_cache(key).await?;
    let label = outcome.label();

    let snapshot = match outcome {
        SyncOutcome::Fresh(snapshot)
        | SyncOutcome::Refreshed { snapshot, .. }
        | SyncOutcome::Stale { snapshot, .. } => snapshot,
        SyncOutcome::Unavailable { error } => return Err(CommandError::Unavailable(error)),
    };
    let page = paginate(&snapshot.items, page_index, page_size)?;

    Ok(ListOutput {
        collection: CollectionId::for_key(key).to_string(),
        outcome: label,
        page_index: page.page_index,
        page_size: page.page_size,
        total: page.total,
        has_more: page.has_more,
        items: page.items,
    })
}

/// Output of `glimmer evict`.
#[derive(Debug, Serialize)]
pub struct EvictOutput {
    pub max_idle_days: u64,
    pub evicted: usize,
    pub remaining: StoreStats,
}

pub async fn evict(app: &App, days: Option<u64>) -> Result<EvictOutput, CommandError> {
    let max_idle_days = days.unwrap_or(app.config.evict_after_days);
    let max_idle = Duration::from_secs(max_idle_days.saturating_mul(24 * 60 * 60));

    let evicted = app.orchestrator.evict_idle(max_idle).await?;
    let remaining = app.orchestrator.store().stats().await?;

    Ok(EvictOutput { max_idle_days, evicted, remaining })
}

#[derive(Debug, Serialize)]
pub struct ViewItem {
    pub index: usize,
    pub id: String,
    pub bytes: usize,
}

/// Output of `glimmer view`.
#[derive(Debug, Serialize)]
pub struct ViewOutput {
    pub seed: u64,
    pub total: usize,
    pub presented: usize,
    pub removed: usize,
    pub current_index: usize,
    pub window: [usize; 2],
    pub peak_in_flight: usize,
    pub resident: Vec<ViewItem>,
}

/// Page through a collection the way a viewer would, rendering from the store.
///
/// Ctrl-C tears the session down.
pub async fn view(
    app: &App, key: CollectionKey, max_pages: usize, seek: Option<usize>,
) -> Result<ViewOutput, CommandError> {
    let loader = Arc::new(StoreAssetLoader::new(Arc::clone(app.orchestrator.store())));
    let mut session = ViewSession::new(key, loader, ViewConfig::from(&app.config));

    let token = session.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, closing view session");
            token.cancel();
        }
    });

    let result = drive(&mut session, app.orchestrator.as_ref(), max_pages, seek).await;
    interrupt.abort();
    session.close().await;
    result?;

    let state = session.state();
    Ok(ViewOutput {
        seed: session.seed(),
        total: state.ordered_items.len(),
        presented: session.presented().count(),
        removed: session.loader().permanently_failed().len(),
        current_index: state.current_index,
        window: [state.window_start, state.window_end],
        peak_in_flight: session.loader().peak_in_flight(),
        resident: state
            .loaded_elements
            .iter()
            .map(|(index, bytes)| ViewItem {
                index: *index,
                id: state.ordered_items[*index].id.clone(),
                bytes: bytes.len(),
            })
            .collect(),
    })
}

async fn drive(
    session: &mut ViewSession<StoreAssetLoader>, source: &SyncOrchestrator, max_pages: usize, seek: Option<usize>,
) -> Result<(), CommandError> {
    for _ in 0..max_pages.max(1) {
        let added = session.load_more(source).await?;
        session.settle().await;
        tracing::debug!(added, total = session.state().ordered_items.len(), "loaded page");
        if session.is_exhausted() {
            break;
        }
    }

    if let Some(index) = seek {
        session.seek(index);
        session.settle().await;
    }

    if session.cancellation_token().is_cancelled() {
        return Err(CommandError::Interrupted);
    }
    Ok(())
}
