// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error taxonomy for the mail processing pipeline.
//!
//! Each component gets its own `thiserror`-derived enum rather than one
//! monolithic error type, following the same per-module split the IMAP
//! layer uses internally.

use thiserror::Error;

/// Failure to derive a `ParsedMessage` from raw bytes. Always total: a
/// parse either succeeds completely or fails completely, never partially.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Failures writing to or reading from the on-disk staging queue.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("size verification failed: expected {expected}, wrote {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Outcome of a delivery attempt against the local mail store.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("permanent failure: {0}")]
    Permanent(String),
    #[error("temporary failure: {0}")]
    Temporary(String),
}

/// Anomalies from the external AI judge. All variants are fail-closed —
/// callers must map every one of these to `QUARANTINE`.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("rate limit exhausted")]
    RateLimited,
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("api error: {0}")]
    ApiStatus(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("unexpected content type in response")]
    UnexpectedContent,
}

/// Configuration load/validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(String),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
    #[error("config source error: {0}")]
    Source(#[from] config::ConfigError),
}
