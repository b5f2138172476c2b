// src/lib.rs

//! evcharge.online status monitor library
//!
//! Polls charge sites, diffs successive snapshots, reports changes through
//! notification sinks and persists the latest state.

pub mod error;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
