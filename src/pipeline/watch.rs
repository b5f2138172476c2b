// src/pipeline/watch.rs

//! Watch loop.
//!
//! The loop owns the tracked sites. Each iteration waits out the period,
//! then runs a tick: every site is refreshed concurrently, and only once all
//! refreshes have finished are the new snapshots diffed against the old
//! ones. Notifications and the persistence write for a tick run in a
//! background task while the next delay elapses.
//!
//! Cancellation only interrupts the delay. A tick that has started always
//! finishes, including its dispatch, before [`Watcher::run`] returns, and no
//! new tick begins once a stop has been requested.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::diff::compare;
use super::status::StatusReporter;
use crate::error::Result;
use crate::models::{Site, SiteDiff};
use crate::notify::Notifier;
use crate::services::Fetcher;
use crate::storage::SiteStore;

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Sites whose refresh succeeded
    pub refreshed: usize,
    /// Sites whose refresh failed and kept their previous snapshot
    pub failures: usize,
    /// Sites with a non-empty diff
    pub changed_sites: usize,
    /// Changed attributes across all sites
    pub changes: usize,
}

/// A completed tick and the diffs it produced.
#[derive(Debug)]
pub struct Tick {
    pub report: TickReport,
    pub diffs: Vec<SiteDiff>,
}

/// Totals over the lifetime of a watch loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub ticks: usize,
    pub refresh_failures: usize,
    pub changed_sites: usize,
    pub changes: usize,
}

impl WatchSummary {
    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.refresh_failures += report.failures;
        self.changed_sites += report.changed_sites;
        self.changes += report.changes;
    }
}

/// Periodically refreshes tracked sites and reports what changed.
pub struct Watcher {
    sites: BTreeMap<String, Site>,
    period: Duration,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn SiteStore>,
    notifier: Arc<dyn Notifier>,
    snapshot: watch::Sender<Arc<[Site]>>,
}

impl Watcher {
    /// Create a watcher over sites that have already had a warm-up refresh.
    pub fn new(
        sites: Vec<Site>,
        period: Duration,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn SiteStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let sites: BTreeMap<String, Site> =
            sites.into_iter().map(|s| (s.guid.clone(), s)).collect();
        let initial: Arc<[Site]> = sites.values().cloned().collect();
        let (snapshot, _) = watch::channel(initial);

        Self {
            sites,
            period,
            fetcher,
            store,
            notifier,
            snapshot,
        }
    }

    /// Current tracked sites.
    pub fn sites(&self) -> impl Iterator<Item = &Site> {
        self.sites.values()
    }

    /// Handle that reports the latest snapshot on demand, from any task.
    pub fn reporter(&self) -> StatusReporter {
        StatusReporter::new(self.snapshot.subscribe(), Arc::clone(&self.notifier))
    }

    /// Refresh every site and diff against the previous snapshots.
    ///
    /// A failed refresh is logged and counted; that site keeps its previous
    /// snapshot and produces no diff.
    pub async fn tick(&mut self) -> Result<Tick> {
        let snapshots: Vec<Site> = self.sites.values().cloned().collect();

        let fetcher = &self.fetcher;
        let results = join_all(snapshots.iter().map(|site| fetcher.refresh_points(site))).await;

        let mut report = TickReport::default();
        let mut diffs = Vec::new();

        for (old, result) in snapshots.into_iter().zip(results) {
            let points = match result {
                Ok(points) => points,
                Err(e) => {
                    report.failures += 1;
                    log::warn!("Refresh of site {} failed: {}", old.display_name(), e);
                    continue;
                }
            };
            report.refreshed += 1;

            let new = old.with_points(points);
            let diff = compare(&old, &new)?;
            if !diff.is_empty() {
                report.changed_sites += 1;
                report.changes += diff.change_count();
                diffs.push(diff);
            }
            self.sites.insert(new.guid.clone(), new);
        }

        self.snapshot
            .send_replace(self.sites.values().cloned().collect());

        Ok(Tick { report, diffs })
    }

    /// Run until `cancel` fires, returning totals.
    ///
    /// The first action is the delay. A notification or persistence failure
    /// stops the loop with that error as soon as its dispatch finishes, without
    /// waiting out the rest of the delay.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<WatchSummary> {
        let mut summary = WatchSummary::default();
        let mut pending: Option<JoinHandle<Result<()>>> = None;

        log::info!(
            "Watching {} site(s) every {:?}",
            self.sites.len(),
            self.period
        );

        loop {
            let delay = tokio::time::sleep(self.period);
            tokio::pin!(delay);

            let stopped = loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break true,
                    joined = join_dispatch(&mut pending) => joined?,
                    _ = &mut delay => break false,
                }
            };

            if let Some(handle) = pending.take() {
                handle.await??;
            }
            // The join above may outlast the delay; a stop seen during it still counts
            if stopped || cancel.is_cancelled() {
                break;
            }

            let tick = self.tick().await?;
            summary.record(&tick.report);
            log::info!(
                "Tick {}: {} refreshed, {} failed, {} change(s) at {} site(s)",
                summary.ticks,
                tick.report.refreshed,
                tick.report.failures,
                tick.report.changes,
                tick.report.changed_sites
            );

            if !tick.diffs.is_empty() {
                pending = Some(tokio::spawn(dispatch(
                    Arc::clone(&self.notifier),
                    Arc::clone(&self.store),
                    tick.diffs,
                )));
            }
        }

        log::info!(
            "Watch loop stopped after {} tick(s), {} change(s)",
            summary.ticks,
            summary.changes
        );
        Ok(summary)
    }
}

/// Resolve once the pending dispatch finishes, clearing it. Never resolves
/// when nothing is pending.
async fn join_dispatch(pending: &mut Option<JoinHandle<Result<()>>>) -> Result<()> {
    match pending {
        Some(handle) => {
            let joined = handle.await;
            *pending = None;
            joined?
        }
        None => std::future::pending().await,
    }
}

/// Notify every diff and persist the changed sites in one write.
async fn dispatch(
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn SiteStore>,
    diffs: Vec<SiteDiff>,
) -> Result<()> {
    let changed: Vec<Site> = diffs.iter().map(|d| d.new_site().clone()).collect();

    let notify = join_all(diffs.iter().map(|diff| notifier.notify_changes(diff)));
    let (notified, persisted) = tokio::join!(notify, store.put_sites(&changed));

    notified.into_iter().collect::<Result<()>>()?;
    let written = persisted?;
    log::debug!("Persisted {} changed site(s)", written.len());
    Ok(())
}
