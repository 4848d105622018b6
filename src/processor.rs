// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Processor (C7): orchestrates the pipeline cycle, retry counters, and
//! shutdown. Owns all invariants. Translates the original's broad
//! `try/except` fail-closed control flow into explicit `Result` sums
//! matched once per component boundary.

use crate::ai::{AiClassifier, ScanVerdict};
use crate::error::DeliveryError;
use crate::imap::ImapFetcher;
use crate::lmtp::{DeliveryOutcome, LmtpDeliverer};
use crate::maildir::MaildirStore;
use crate::message::{self, ParsedMessage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Duration;

pub struct Processor {
    maildir: MaildirStore,
    fetcher: ImapFetcher,
    lmtp: LmtpDeliverer,
    classifier: AiClassifier,
    retry_counts: HashMap<String, u32>,
    max_retries: u32,
    fetch_interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Processor {
    pub fn new(
        maildir: MaildirStore,
        fetcher: ImapFetcher,
        lmtp: LmtpDeliverer,
        classifier: AiClassifier,
        max_retries: u32,
        fetch_interval: Duration,
    ) -> Self {
        Self {
            maildir,
            fetcher,
            lmtp,
            classifier,
            retry_counts: HashMap::new(),
            max_retries,
            fetch_interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Runs until shutdown. Rescues any `.processing` files abandoned by
    /// a prior crash before the first cycle, connects IMAP, then loops:
    /// one cycle, then sleep until either `fetch_interval` elapses or
    /// shutdown is requested.
    pub async fn run(&mut self) -> Result<(), crate::imap::ConnectError> {
        self.maildir.ensure_layout().await.ok();
        match self.maildir.rescue_orphaned_processing().await {
            Ok(n) if n > 0 => log::info!("rescued {} abandoned processing items", n),
            Ok(_) => {}
            Err(e) => log::warn!("failed to rescue orphaned processing items: {}", e),
        }

        self.fetcher.connect().await?;

        while !self.is_shutting_down() {
            self.process_cycle().await;
            tokio::select! {
                _ = tokio::time::sleep(self.fetch_interval) => {}
                _ = wait_for_shutdown(self.shutdown.clone()) => {}
            }
        }

        self.fetcher.disconnect().await;
        Ok(())
    }

    /// (a) drain pre-existing staging items, (b) pull new messages from
    /// upstream, (c) persist + delete upstream + process each
    /// immediately. No exception escapes this function (G4); per-item
    /// failures are contained.
    async fn process_cycle(&mut self) {
        self.drain_staging().await;
        if self.is_shutting_down() {
            return;
        }
        self.fetch_new().await;
    }

    async fn drain_staging(&mut self) {
        let claimed = match self.maildir.claim_staging().await {
            Ok(items) => items,
            Err(e) => {
                log::error!("failed to claim staging items: {}", e);
                return;
            }
        };

        for (filename, raw) in claimed {
            if self.is_shutting_down() {
                break;
            }
            self.process_item(raw, Some(filename)).await;
        }
    }

    async fn fetch_new(&mut self) {
        let mut cursor = match self.fetcher.fetch_pending().await {
            Ok(c) => c,
            Err(e) => {
                log::error!("fetch_pending failed: {}", e);
                return;
            }
        };

        while let Some(result) = cursor.next().await {
            if self.is_shutting_down() {
                break;
            }
            let (uid, raw) = match result {
                Ok(pair) => {
                    self.fetcher.mark_fetch_success();
                    pair
                }
                Err(e) => {
                    log::error!("fetch stream terminated: {}", e);
                    self.fetcher.mark_fetch_failed(&e);
                    break;
                }
            };

            // Local durability precedes upstream deletion (G1).
            let filename = match self.maildir.save_to_staging(&raw).await {
                Ok(name) => name,
                Err(e) => {
                    log::warn!("failed to stage uid {}: {} — leaving upstream intact", uid, e);
                    continue;
                }
            };

            if let Err(e) = self.fetcher.delete(uid).await {
                log::warn!(
                    "failed to delete uid {} upstream: {} — local copy is durable",
                    uid,
                    e
                );
            }

            self.process_item(raw, Some(filename)).await;
        }
    }

    /// Parse -> scan -> deliver/quarantine, with identical semantics for
    /// drained and freshly-staged items.
    async fn process_item(&mut self, raw: Vec<u8>, staging_filename: Option<String>) {
        let parsed = match message::parse(&raw) {
            Ok(p) => p,
            Err(e) => {
                let placed = self
                    .maildir
                    .move_to_failed(&raw, &format!("Parse error: {}", e))
                    .await;
                self.finish_terminal_placement(placed, staging_filename.as_deref())
                    .await;
                return;
            }
        };

        let verdict = self.classifier.classify(&parsed).await;
        match verdict {
            ScanVerdict::Quarantine { reason } => {
                let placed = self.maildir.quarantine(&raw, &reason).await;
                self.finish_terminal_placement(placed, staging_filename.as_deref())
                    .await;
                self.clear_retry(&parsed.message_id);
            }
            ScanVerdict::Safe { .. } => {
                self.deliver_with_retry(raw, parsed, staging_filename).await;
            }
        }
    }

    /// Terminal placement precedes staging unlink (G2): only unlink the
    /// staging file once the write to the terminal folder has succeeded.
    async fn finish_terminal_placement(
        &self,
        placed: Result<String, crate::error::StagingError>,
        staging_filename: Option<&str>,
    ) {
        if let Err(e) = placed {
            log::error!("failed to place item in terminal folder: {}", e);
            return;
        }
        if let Some(name) = staging_filename {
            if let Err(e) = self.maildir.remove_staging(name).await {
                log::error!("failed to remove staging file {}: {}", name, e);
            }
        }
    }

    async fn deliver_with_retry(
        &mut self,
        raw: Vec<u8>,
        parsed: ParsedMessage,
        staging_filename: Option<String>,
    ) {
        let recipient = parsed.recipient_address();
        let outcome = self.lmtp.deliver(&raw, &recipient).await;

        match outcome {
            Ok(DeliveryOutcome::Success) => {
                self.maildir
                    .archive_delivered(&raw, &parsed.message_id)
                    .await;
                if let Some(name) = &staging_filename {
                    let _ = self.maildir.remove_staging(name).await;
                }
                self.clear_retry(&parsed.message_id);
            }
            Ok(DeliveryOutcome::TemporaryFailure) => {
                self.handle_delivery_failure(raw, parsed, staging_filename)
                    .await;
            }
            Err(DeliveryError::Permanent(_)) | Err(DeliveryError::Temporary(_)) => {
                self.handle_delivery_failure(raw, parsed, staging_filename)
                    .await;
            }
        }
    }

    async fn handle_delivery_failure(
        &mut self,
        raw: Vec<u8>,
        parsed: ParsedMessage,
        staging_filename: Option<String>,
    ) {
        let count = self.increment_retry(&parsed.message_id);

        if count >= self.max_retries {
            if let Err(e) = self
                .maildir
                .move_to_failed(&raw, &format!("Max retries ({}) exceeded", self.max_retries))
                .await
            {
                log::error!("failed to move item to failed: {}", e);
                return;
            }
            if let Some(name) = &staging_filename {
                let _ = self.maildir.remove_staging(name).await;
            }
            self.clear_retry(&parsed.message_id);
            return;
        }

        if let Some(name) = &staging_filename {
            if let Err(e) = self.maildir.release_to_staging(name).await {
                log::error!("failed to release item back to staging: {}", e);
            }
        }
    }

    fn increment_retry(&mut self, message_id: &str) -> u32 {
        let entry = self.retry_counts.entry(message_id.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    fn clear_retry(&mut self, message_id: &str) {
        self.retry_counts.remove(message_id);
    }
}

async fn wait_for_shutdown(flag: Arc<AtomicBool>) {
    loop {
        if flag.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
