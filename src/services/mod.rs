//! External data sources.
//!
//! The [`Fetcher`] trait is the seam between the watch pipeline and the
//! charge network; [`EvChargeClient`] implements it by scraping
//! evcharge.online.

pub mod evcharge;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Point, Site};

pub use evcharge::{EvChargeClient, parse_points_page, parse_search_response};

/// Source of site metadata and point snapshots.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Find sites matching a free-text key. Returned sites have no points.
    async fn search(&self, key: &str) -> Result<Vec<Site>>;

    /// Fetch the current points of a site, keyed by point guid.
    async fn refresh_points(&self, site: &Site) -> Result<BTreeMap<String, Point>>;
}
