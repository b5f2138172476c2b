//! Storage abstractions for site snapshots.
//!
//! Two interchangeable backends hold the latest known state of each site:
//! - [`LocalStore`]: a single JSON document keyed by site guid
//! - `DynamoStore`: a DynamoDB table written in batches (feature `dynamodb`)
//!
//! ## Local document layout
//!
//! ```text
//! {
//!   "<site guid>": {
//!     "guid": "...", "name": "...", ...,
//!     "points": { "<point guid>": { "point_id": "...", ... } },
//!     "last_checked": 1760860800
//!   }
//! }
//! ```

#[cfg(feature = "dynamodb")]
pub mod dynamodb;
pub mod local;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{RetryConfig, Site};

// Re-export for convenience
#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoStore;
pub use local::LocalStore;
pub use retry::{BatchOutcome, RetryPolicy, drain_batch};

/// A site as persisted, with the time it was last written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    #[serde(flatten)]
    pub site: Site,

    /// Unix seconds of the last write; informational only
    #[serde(default)]
    pub last_checked: i64,
}

impl SiteRecord {
    /// Wrap a site stamped with the current time.
    pub fn now(site: Site) -> Self {
        Self {
            site,
            last_checked: Utc::now().timestamp(),
        }
    }
}

/// Trait for site snapshot storage backends.
#[async_trait]
pub trait SiteStore: Send + Sync {
    /// Load the given sites. Unknown guids are skipped; an empty list loads
    /// every stored site.
    async fn get_sites(&self, guids: &[String]) -> Result<Vec<Site>>;

    /// Persist the given sites, replacing any stored record per guid.
    ///
    /// Returns the sites that were durably written.
    async fn put_sites(&self, sites: &[Site]) -> Result<Vec<Site>>;
}

/// Open the store named by a URI.
///
/// - `site.json` or `file:///var/lib/site.json`: local document
/// - `dynamodb://table-name`: DynamoDB table
#[cfg_attr(not(feature = "dynamodb"), allow(unused_variables))]
pub async fn open_store(uri: &str, retry: &RetryConfig) -> Result<Arc<dyn SiteStore>> {
    let (scheme, rest) = match uri.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("file", uri),
    };

    match scheme {
        "file" => {
            let store = LocalStore::open(rest).await?;
            log::info!("Using local store at {}", store.path().display());
            Ok(Arc::new(store))
        }
        #[cfg(feature = "dynamodb")]
        "dynamodb" => {
            let store = DynamoStore::from_env(rest, RetryPolicy::from(retry)).await?;
            log::info!("Using DynamoDB table {rest}");
            Ok(Arc::new(store))
        }
        other => Err(AppError::config(format!(
            "Unsupported store scheme '{other}' in {uri}"
        ))),
    }
}
