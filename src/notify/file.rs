//! Line-oriented text notifier.
//!
//! Writes one line per fact. A call's lines are written in a single
//! `write_all` so concurrent reports do not interleave mid-block.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::Notifier;
use crate::error::Result;
use crate::models::{ConnectorType, Site, SiteDiff};

type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

enum Destination {
    /// Opened in append mode for each call
    Path(PathBuf),
    Stdout,
    Writer(SharedWriter),
}

/// Writes plain text reports to a file, stdout or a caller-supplied stream.
pub struct FileNotifier {
    destination: Destination,
}

impl FileNotifier {
    /// Append to the file at `path`, creating it when missing.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            destination: Destination::Path(path.into()),
        }
    }

    pub fn stdout() -> Self {
        Self {
            destination: Destination::Stdout,
        }
    }

    /// Write to an already open stream.
    pub fn writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        Self {
            destination: Destination::Writer(Arc::new(Mutex::new(boxed))),
        }
    }

    /// Pick a destination from an optional path; `None` or `-` is stdout.
    pub fn from_path_option(path: Option<PathBuf>) -> Self {
        match path {
            Some(p) if p.as_os_str() != "-" => Self::path(p),
            _ => Self::stdout(),
        }
    }

    async fn write_lines(&self, lines: &[String]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let mut text = lines.join("\n");
        text.push('\n');

        match &self.destination {
            Destination::Path(path) => {
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?;
                file.write_all(text.as_bytes()).await?;
                file.flush().await?;
            }
            Destination::Stdout => {
                let mut out = tokio::io::stdout();
                out.write_all(text.as_bytes()).await?;
                out.flush().await?;
            }
            Destination::Writer(writer) => {
                let mut writer = writer.lock().await;
                writer.write_all(text.as_bytes()).await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

/// Render the lines describing a diff.
pub fn render_changes(diff: &SiteDiff) -> Vec<String> {
    let site_name = diff.old().display_name();
    let mut lines = Vec::new();

    for (field, change) in diff.attributes() {
        lines.push(format!(
            "{site_name}: {field} changed from {} to {}",
            or_dash(change.old.as_deref()),
            or_dash(change.new.as_deref()),
        ));
    }

    for (guid, point) in diff.points() {
        let point_id = diff.point_id(guid).unwrap_or(guid);
        for (field, change) in &point.changes {
            lines.push(format!(
                "{point_id}: {field} changed from {} to {}",
                change.old, change.new
            ));
        }
    }

    lines
}

/// Render the full state block for a site.
pub fn render_state(site: &Site) -> Vec<String> {
    let mut lines = vec![
        format!("* {}:", site.display_name()),
        format!("  {}", or_dash(site.address.as_deref())),
        format!("  {}", or_dash(site.town.as_deref())),
        format!("  {}", or_dash(site.county.as_deref())),
        format!("  {}", or_dash(site.postcode.as_deref())),
        format!("  {}", or_dash(site.country.as_deref())),
        format!(
            "  ({}, {})",
            or_dash(site.latitude.as_deref()),
            or_dash(site.longitude.as_deref())
        ),
    ];

    for point in site.points.values() {
        lines.push(format!("  - {}", point.point_id));
        lines.push(format!("    {}", point.state.display_name()));
        if point.connector_type != ConnectorType::Unknown {
            lines.push(format!("    Connector: {}", point.connector_type.display_name()));
        }
        lines.push(format!("    {} kW", point.max_power));
        lines.push(format!("    £{}/kWh", point.price));
    }

    lines
}

#[async_trait]
impl Notifier for FileNotifier {
    async fn notify_state(&self, site: &Site) -> Result<()> {
        self.write_lines(&render_state(site)).await
    }

    async fn notify_changes(&self, diff: &SiteDiff) -> Result<()> {
        if diff.is_empty() {
            return Ok(());
        }
        self.write_lines(&render_changes(diff)).await
    }
}
