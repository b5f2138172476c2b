// src/models/mod.rs

//! Domain models for the status monitor.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod diff;
mod point;
mod site;

// Re-export all public types
pub use config::{
    Config, FetcherConfig, OutputConfig, RetryConfig, SlackConfig, StoreConfig, WatchConfig,
};
pub use diff::{Change, PointChangeKind, PointDiff, PointField, PointValue, SiteDiff};
pub use point::{ConnectorType, Point, PointState, UnrecognisedValue};
pub use site::{Site, SiteField};
