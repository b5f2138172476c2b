// src/pipeline/status.rs

//! Start-up pass and on-demand status reports.

use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use tokio::sync::watch;

use crate::error::{AppError, Result};
use crate::models::Site;
use crate::notify::Notifier;
use crate::services::Fetcher;
use crate::storage::SiteStore;

/// Search for sites, load their points, report and persist them.
///
/// Every matched site is refreshed concurrently. The state reports (skipped
/// when `quiet`) and the persistence write then run concurrently. Any
/// failure aborts the pass; there is no previous snapshot to fall back on.
pub async fn initial_pass(
    key: &str,
    fetcher: &dyn Fetcher,
    store: &dyn SiteStore,
    notifier: &dyn Notifier,
    quiet: bool,
) -> Result<Vec<Site>> {
    let found = fetcher.search(key).await?;
    if found.is_empty() {
        log::warn!("No sites matched '{key}'");
        return Ok(found);
    }

    let refreshed = try_join_all(found.iter().map(|site| async move {
        let points = fetcher.refresh_points(site).await?;
        Ok::<_, AppError>(site.with_points(points))
    }))
    .await?;

    let report = async {
        if quiet {
            return Ok(());
        }
        join_all(refreshed.iter().map(|site| notifier.notify_state(site)))
            .await
            .into_iter()
            .collect::<Result<()>>()
    };
    let (reported, persisted) = tokio::join!(report, store.put_sites(&refreshed));
    reported?;
    persisted?;

    let point_count: usize = refreshed.iter().map(|s| s.points.len()).sum();
    log::info!(
        "Loaded {} site(s) with {} point(s)",
        refreshed.len(),
        point_count
    );
    Ok(refreshed)
}

/// Reports the full state of every tracked site on request.
///
/// Reads the snapshot the watch loop publishes after each tick, so a report
/// can run at any time without touching loop state.
#[derive(Clone)]
pub struct StatusReporter {
    snapshot: watch::Receiver<Arc<[Site]>>,
    notifier: Arc<dyn Notifier>,
}

impl StatusReporter {
    pub fn new(snapshot: watch::Receiver<Arc<[Site]>>, notifier: Arc<dyn Notifier>) -> Self {
        Self { snapshot, notifier }
    }

    /// Latest published snapshot.
    pub fn current(&self) -> Arc<[Site]> {
        Arc::clone(&*self.snapshot.borrow())
    }

    /// Call `notify_state` for every site concurrently.
    pub async fn report(&self) -> Result<()> {
        let sites = self.current();
        log::info!("Reporting current state of {} site(s)", sites.len());
        join_all(sites.iter().map(|site| self.notifier.notify_state(site)))
            .await
            .into_iter()
            .collect()
    }
}
