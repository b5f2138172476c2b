//! Fan-out notifier.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use super::Notifier;
use crate::error::Result;
use crate::models::{Site, SiteDiff};

/// Broadcasts every call to an ordered list of child notifiers.
///
/// Children run concurrently and are all awaited, even when one fails. The
/// first failure in child order is then returned.
#[derive(Clone, Default)]
pub struct MultiNotifier {
    children: Vec<Arc<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(children: Vec<Arc<dyn Notifier>>) -> Self {
        Self { children }
    }
}

fn first_error(results: Vec<Result<()>>) -> Result<()> {
    let failures = results.iter().filter(|r| r.is_err()).count();
    if failures > 1 {
        log::warn!("{failures} notifiers failed; reporting the first");
    }
    results.into_iter().collect()
}

#[async_trait]
impl Notifier for MultiNotifier {
    async fn notify_state(&self, site: &Site) -> Result<()> {
        let results = join_all(self.children.iter().map(|c| c.notify_state(site))).await;
        first_error(results)
    }

    async fn notify_changes(&self, diff: &SiteDiff) -> Result<()> {
        let results = join_all(self.children.iter().map(|c| c.notify_changes(diff))).await;
        first_error(results)
    }
}
