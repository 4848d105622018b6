// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! IMAP-specific error taxonomy, mirrored after the teacher's flat
//! `ImapError` enum shape (one enum covering connect/fetch/delete faults
//! rather than one type per call site).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImapError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("tls handshake failed: {0}")]
    Tls(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("delete failed: {0}")]
    Delete(String),
    #[error("operation timed out")]
    Timeout,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<async_imap::error::Error> for ImapError {
    fn from(e: async_imap::error::Error) -> Self {
        ImapError::Protocol(e.to_string())
    }
}

impl From<native_tls::Error> for ImapError {
    fn from(e: native_tls::Error) -> Self {
        ImapError::Tls(e.to_string())
    }
}

/// Error surfaced when `connect()` or `reconnect()` fails outright.
#[derive(Debug, Error)]
#[error("imap connect error: {0}")]
pub struct ConnectError(pub ImapError);

/// Error surfaced mid-stream from `fetch_pending()`.
#[derive(Debug, Error)]
#[error("imap fetch error: {0}")]
pub struct FetchError(pub ImapError);

/// Error surfaced from `delete()`. Deliberately does not implement
/// `From<ImapError>` for the connection-state fields — deletion failure
/// must not cascade into `connected = false` per spec.
#[derive(Debug, Error)]
#[error("imap delete error: {0}")]
pub struct DeleteError(pub ImapError);
