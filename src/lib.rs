// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Library core for mailsentry: a personal mail-processing daemon that
//! fetches from an upstream IMAP mailbox, classifies each message with an
//! external AI judge, and delivers SAFE mail via LMTP while routing
//! QUARANTINE mail to a dedicated folder.

pub mod ai;
pub mod config;
pub mod error;
pub mod health;
pub mod imap;
pub mod lmtp;
pub mod maildir;
pub mod message;
pub mod processor;

pub mod prelude {
    pub use crate::ai::{AiClassifier, ScanVerdict};
    pub use crate::config::Settings;
    pub use crate::health::{HealthProbe, HealthReport, HealthStatus};
    pub use crate::imap::{FetcherHealth, ImapFetcher};
    pub use crate::lmtp::{DeliveryOutcome, LmtpDeliverer};
    pub use crate::maildir::MaildirStore;
    pub use crate::message::{ParsedMessage, RawMessage};
    pub use crate::processor::Processor;

    pub use log::{debug, error, info, trace, warn};
    pub use thiserror::Error;
}
