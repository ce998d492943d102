// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Juxta

use thiserror::Error;

/// Result type alias for Juxta operations
pub type Result<T> = std::result::Result<T, JuxtaError>;

/// Juxta error types
#[derive(Error, Debug)]
pub enum JuxtaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid include pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid results file: {0}")]
    InvalidSnapshot(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Could not find any valid names in the manifest")]
    EmptyManifest,

    #[error("No comparison row with key '{0}'")]
    UnknownRow(String),

    #[error("No viewer matching '{0}'")]
    UnknownViewer(String),

    #[error("Unknown vote category '{0}'")]
    UnknownCategory(String),

    #[error("Category '{0}' already exists")]
    DuplicateCategory(String),

    #[error("Row '{key}' already has tag '{tag}'")]
    DuplicateTag { key: String, tag: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
