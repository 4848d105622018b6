// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! IMAP Fetcher (C3): TLS IMAP client wrapping `async-imap`, following the
//! manual TCP→TLS→login connect sequence and the `Arc<TokioMutex<Session>>`
//! ownership pattern used by the reference client this crate is grounded on.

use crate::imap::error::{ConnectError, DeleteError, FetchError, ImapError};
use async_imap::Session;
use chrono::{DateTime, Utc};
use futures_util::stream::TryStreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex as TokioMutex;
use tokio::time::{timeout, Duration};
use tokio_native_tls::TlsStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

type ImapSession = Session<Compat<TlsStream<TcpStream>>>;

const IO_TIMEOUT: Duration = Duration::from_secs(30);
const RECONNECT_BASE_SECS: u64 = 5;
const RECONNECT_MAX_SECS: u64 = 300;
const RECONNECT_ATTEMPTS: u32 = 5;

/// `{connected, consecutive_failures, last_successful_fetch, last_error}`.
/// Updated by the fetcher only.
#[derive(Debug, Clone, Default)]
pub struct FetcherHealth {
    pub connected: bool,
    pub consecutive_failures: u32,
    pub last_successful_fetch: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

pub struct ImapFetcher {
    host: String,
    port: u16,
    username: String,
    password: String,
    session: Option<Arc<TokioMutex<ImapSession>>>,
    health: FetcherHealth,
}

/// A finite, non-restartable lazy sequence of `(uid, bytes)` pairs,
/// driven by the processor rather than hidden behind a coroutine.
/// Dropping the cursor mid-iteration is a valid way to abandon it.
pub struct FetchCursor {
    session: Arc<TokioMutex<ImapSession>>,
    pending_uids: VecDeque<u32>,
}

impl FetchCursor {
    pub async fn next(&mut self) -> Option<Result<(u32, Vec<u8>), ImapError>> {
        let uid = self.pending_uids.pop_front()?;
        let mut guard = self.session.lock().await;
        let result = fetch_uid_body(&mut guard, uid).await;
        Some(result.map(|bytes| (uid, bytes)))
    }
}

impl ImapFetcher {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            session: None,
            health: FetcherHealth::default(),
        }
    }

    pub fn health(&self) -> &FetcherHealth {
        &self.health
    }

    /// Opens a TLS IMAP connection with a 30 s I/O timeout, waits for the
    /// greeting implicitly via `Client::new`, authenticates. On success
    /// resets `consecutive_failures` and clears `last_error`.
    pub async fn connect(&mut self) -> Result<(), ConnectError> {
        match self.try_connect().await {
            Ok(session) => {
                self.session = Some(Arc::new(TokioMutex::new(session)));
                self.health.connected = true;
                self.health.consecutive_failures = 0;
                self.health.last_error = None;
                Ok(())
            }
            Err(e) => {
                self.health.connected = false;
                self.health.last_error = Some(e.to_string());
                Err(ConnectError(e))
            }
        }
    }

    async fn try_connect(&self) -> Result<ImapSession, ImapError> {
        let addr = format!("{}:{}", self.host, self.port);
        let tcp = timeout(IO_TIMEOUT, TcpStream::connect(&addr))
            .await
            .map_err(|_| ImapError::Timeout)??;
        let _ = tcp.set_nodelay(true);

        let tls_connector = native_tls::TlsConnector::builder().build()?;
        let tls_connector = tokio_native_tls::TlsConnector::from(tls_connector);
        let tls_stream = timeout(IO_TIMEOUT, tls_connector.connect(&self.host, tcp))
            .await
            .map_err(|_| ImapError::Timeout)?
            .map_err(|e| ImapError::Tls(e.to_string()))?;

        let client = async_imap::Client::new(tls_stream.compat());
        let session = timeout(IO_TIMEOUT, client.login(&self.username, &self.password))
            .await
            .map_err(|_| ImapError::Timeout)?
            .map_err(|(e, _client)| ImapError::Auth(e.to_string()))?;

        Ok(session)
    }

    /// Disconnects cleanly if needed, then retries `connect()` up to 5
    /// times with exponential backoff starting at 5 s, doubling, capped
    /// at 300 s.
    pub async fn reconnect(&mut self) -> Result<(), ConnectError> {
        self.disconnect().await;

        let mut delay = RECONNECT_BASE_SECS;
        for attempt in 1..=RECONNECT_ATTEMPTS {
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if attempt == RECONNECT_ATTEMPTS {
                        return Err(e);
                    }
                    log::warn!(
                        "imap reconnect attempt {} failed, retrying in {}s",
                        attempt,
                        delay
                    );
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                    delay = (delay * 2).min(RECONNECT_MAX_SECS);
                }
            }
        }
        unreachable!("loop always returns on final attempt")
    }

    /// Selects `INBOX`, searches `ALL`, and returns a cursor over the
    /// matched UIDs. The fetcher pulls all messages, not only unseen,
    /// because anything left in the upstream INBOX has not yet been
    /// durably captured locally.
    pub async fn fetch_pending(&mut self) -> Result<FetchCursor, FetchError> {
        let session_arc = self
            .session
            .clone()
            .ok_or_else(|| FetchError(ImapError::Protocol("not connected".into())))?;

        let uids: Vec<u32> = {
            let mut guard = session_arc.lock().await;
            guard
                .select("INBOX")
                .await
                .map_err(|e| FetchError(ImapError::from(e)))?;
            let set = guard
                .uid_search("ALL")
                .await
                .map_err(|e| FetchError(ImapError::from(e)))?;
            let mut v: Vec<u32> = set.into_iter().collect();
            v.sort_unstable();
            v
        };

        Ok(FetchCursor {
            session: session_arc,
            pending_uids: uids.into(),
        })
    }

    /// Records a successful yield from the cursor.
    pub fn mark_fetch_success(&mut self) {
        self.health.last_successful_fetch = Some(Utc::now());
    }

    /// Records a mid-stream fault from the cursor: transitions
    /// `connected=false` and increments `consecutive_failures`.
    pub fn mark_fetch_failed(&mut self, err: &ImapError) {
        self.health.connected = false;
        self.health.consecutive_failures += 1;
        self.health.last_error = Some(err.to_string());
    }

    /// Re-selects `INBOX`, flags `\Deleted`, expunges. Failure does not
    /// cascade to the connected flag — delete may fail for item-specific
    /// reasons.
    pub async fn delete(&mut self, uid: u32) -> Result<(), DeleteError> {
        let session_arc = self
            .session
            .clone()
            .ok_or_else(|| DeleteError(ImapError::Protocol("not connected".into())))?;
        let mut guard = session_arc.lock().await;

        guard
            .select("INBOX")
            .await
            .map_err(|e| DeleteError(ImapError::from(e)))?;

        let seq = uid.to_string();
        let mut store_stream = guard
            .uid_store(&seq, "+FLAGS (\\Deleted)")
            .await
            .map_err(|e| DeleteError(ImapError::from(e)))?;
        store_stream
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| DeleteError(ImapError::from(e)))?;

        let mut expunge_stream = guard
            .expunge()
            .await
            .map_err(|e| DeleteError(ImapError::from(e)))?;
        expunge_stream
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| DeleteError(ImapError::from(e)))?;

        Ok(())
    }

    /// Best-effort logout; resets client state.
    pub async fn disconnect(&mut self) {
        if let Some(session_arc) = self.session.take() {
            let mut guard = session_arc.lock().await;
            let _ = timeout(IO_TIMEOUT, guard.logout()).await;
        }
        self.health.connected = false;
    }
}

async fn fetch_uid_body(session: &mut ImapSession, uid: u32) -> Result<Vec<u8>, ImapError> {
    let seq = uid.to_string();
    let stream = timeout(IO_TIMEOUT, session.uid_fetch(&seq, "BODY[]"))
        .await
        .map_err(|_| ImapError::Timeout)?
        .map_err(ImapError::from)?;
    let fetches = timeout(IO_TIMEOUT, stream.try_collect::<Vec<_>>())
        .await
        .map_err(|_| ImapError::Timeout)?
        .map_err(ImapError::from)?;

    fetches
        .into_iter()
        .find_map(|f| f.body().map(|b| b.to_vec()))
        .ok_or_else(|| ImapError::Protocol(format!("no body for uid {}", uid)))
}
