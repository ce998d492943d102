// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Juxta: side-by-side asset comparison
//!
//! Loads several named file collections ("viewers"), aligns them into
//! comparison rows keyed by logical asset identity, and records per-category
//! votes and tags that can be exported to and imported from JSON.

pub mod align;
pub mod config;
pub mod error;
pub mod index;
pub mod judgment;
pub mod key;
pub mod loader;
pub mod snapshot;
pub mod watcher;
pub mod workspace;

pub use config::AppConfig;
pub use error::{JuxtaError, Result};
pub use workspace::Workspace;
