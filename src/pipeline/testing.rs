//! In-memory fetcher, store and notifier for pipeline tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{ConnectorType, Point, PointState, Site, SiteDiff};
use crate::notify::Notifier;
use crate::services::Fetcher;
use crate::storage::SiteStore;

pub type Points = BTreeMap<String, Point>;

pub fn point(guid: &str, state: PointState) -> Point {
    Point::new(guid, format!("UKEV-{guid}"), state, Decimal::new(18, 2), 22.0)
        .with_connector(ConnectorType::Type2)
}

pub fn points(entries: &[(&str, PointState)]) -> Points {
    entries
        .iter()
        .map(|(guid, state)| (guid.to_string(), point(guid, *state)))
        .collect()
}

pub fn site(guid: &str, points: Points) -> Site {
    let mut site = Site::new(guid);
    site.name = Some(format!("Site {guid}"));
    site.points = points;
    site
}

/// Serves scripted point sets per site. The last entry repeats; `None`
/// entries fail that refresh.
#[derive(Default)]
pub struct FakeFetcher {
    search_results: Vec<Site>,
    script: Mutex<HashMap<String, VecDeque<Option<Points>>>>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
    cancel_at: Option<(usize, CancellationToken)>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, sites: Vec<Site>) -> Self {
        self.search_results = sites;
        self
    }

    pub fn script(self, guid: &str, responses: Vec<Option<Points>>) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(guid.to_string(), responses.into());
        self
    }

    pub fn delay(mut self, guid: &str, delay: Duration) -> Self {
        self.delays.insert(guid.to_string(), delay);
        self
    }

    /// Cancel `token` when the `n`th refresh call starts.
    pub fn cancel_at(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_at = Some((n, token));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self, guid: &str) -> Option<Points> {
        let mut script = self.script.lock().unwrap();
        let queue = script.get_mut(guid)?;
        if queue.len() > 1 {
            queue.pop_front().flatten()
        } else {
            queue.front().cloned().flatten()
        }
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn search(&self, _key: &str) -> Result<Vec<Site>> {
        Ok(self.search_results.clone())
    }

    async fn refresh_points(&self, site: &Site) -> Result<Points> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, token)) = &self.cancel_at {
            if call == *n {
                token.cancel();
            }
        }
        if let Some(delay) = self.delays.get(&site.guid) {
            tokio::time::sleep(*delay).await;
        }
        self.next_response(&site.guid)
            .ok_or_else(|| AppError::parse(&site.guid, "scripted failure"))
    }
}

/// Records every `put_sites` call as the list of guids written.
#[derive(Default)]
pub struct FakeStore {
    pub puts: Mutex<Vec<Vec<String>>>,
    pub fail: bool,
}

impl FakeStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn puts(&self) -> Vec<Vec<String>> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SiteStore for FakeStore {
    async fn get_sites(&self, _guids: &[String]) -> Result<Vec<Site>> {
        Ok(Vec::new())
    }

    async fn put_sites(&self, sites: &[Site]) -> Result<Vec<Site>> {
        if self.fail {
            return Err(AppError::remote_store("store unavailable"));
        }
        let guids = sites.iter().map(|s| s.guid.clone()).collect();
        self.puts.lock().unwrap().push(guids);
        Ok(sites.to_vec())
    }
}

/// Records state reports by guid and every diff it is handed.
#[derive(Default)]
pub struct FakeNotifier {
    pub states: Mutex<Vec<String>>,
    pub diffs: Mutex<Vec<SiteDiff>>,
    pub changes_delay: Option<Duration>,
}

impl FakeNotifier {
    /// `notify_changes` sleeps for `delay` before recording.
    pub fn slow(delay: Duration) -> Self {
        Self {
            changes_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn states(&self) -> Vec<String> {
        let mut states = self.states.lock().unwrap().clone();
        states.sort();
        states
    }

    pub fn diffs(&self) -> Vec<SiteDiff> {
        self.diffs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify_state(&self, site: &Site) -> Result<()> {
        self.states.lock().unwrap().push(site.guid.clone());
        Ok(())
    }

    async fn notify_changes(&self, diff: &SiteDiff) -> Result<()> {
        if let Some(delay) = self.changes_delay {
            tokio::time::sleep(delay).await;
        }
        self.diffs.lock().unwrap().push(diff.clone());
        Ok(())
    }
}
