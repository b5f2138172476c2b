//! Notification sinks.
//!
//! Every sink implements [`Notifier`]:
//! - [`FileNotifier`]: plain text lines to a file, stdout or any stream
//! - [`SlackNotifier`]: Block Kit messages via webhook or bot token
//! - [`MultiNotifier`]: broadcasts to a list of child sinks

pub mod file;
pub mod multi;
pub mod slack;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Site, SiteDiff};

// Re-export for convenience
pub use file::FileNotifier;
pub use multi::MultiNotifier;
pub use slack::SlackNotifier;

/// A destination for status reports and change notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Report the full current state of a site.
    async fn notify_state(&self, site: &Site) -> Result<()>;

    /// Report what changed between two snapshots.
    ///
    /// An empty diff produces no output.
    async fn notify_changes(&self, diff: &SiteDiff) -> Result<()>;
}
