// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Health Probe (C8): read-only aggregator over C2/C3/C4 state. Formats
//! nothing itself — the briefing and health CLI (external) turn this
//! into HTML or console output.

use crate::imap::FetcherHealth;
use crate::lmtp::LmtpDeliverer;
use crate::maildir::MaildirStore;
use chrono::{DateTime, Utc};

const FETCH_STALE_THRESHOLD_SECS: i64 = 60 * 60;
const FETCH_CRITICAL_THRESHOLD_SECS: i64 = 6 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    /// Exit codes for the `health` CLI subcommand: 0 healthy, 1 warning,
    /// 2 critical.
    pub fn exit_code(self) -> i32 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Warning => 1,
            HealthStatus::Critical => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    pub staging_count: usize,
    pub failed_count: usize,
    pub lmtp_reachable: bool,
    pub imap_health: FetcherHealth,
    pub status: HealthStatus,
}

pub struct HealthProbe<'a> {
    maildir: &'a MaildirStore,
    lmtp: &'a LmtpDeliverer,
}

impl<'a> HealthProbe<'a> {
    pub fn new(maildir: &'a MaildirStore, lmtp: &'a LmtpDeliverer) -> Self {
        Self { maildir, lmtp }
    }

    pub async fn check(&self, imap_health: FetcherHealth) -> HealthReport {
        let staging_count = self.maildir.count_staging().await;
        let failed_count = self.maildir.count_failed().await;
        let lmtp_reachable = self.lmtp.check_connectivity().await;

        let status = compute_status(&imap_health, lmtp_reachable, failed_count);

        HealthReport {
            staging_count,
            failed_count,
            lmtp_reachable,
            imap_health,
            status,
        }
    }
}

fn compute_status(imap_health: &FetcherHealth, lmtp_reachable: bool, failed_count: usize) -> HealthStatus {
    if !lmtp_reachable {
        return HealthStatus::Critical;
    }

    let staleness = imap_health
        .last_successful_fetch
        .map(|last| seconds_since(last));

    match staleness {
        Some(secs) if secs >= FETCH_CRITICAL_THRESHOLD_SECS => HealthStatus::Critical,
        Some(secs) if secs >= FETCH_STALE_THRESHOLD_SECS => HealthStatus::Warning,
        None if !imap_health.connected => HealthStatus::Warning,
        _ if failed_count > 0 => HealthStatus::Warning,
        _ => HealthStatus::Healthy,
    }
}

fn seconds_since(ts: DateTime<Utc>) -> i64 {
    (Utc::now() - ts).num_seconds()
}

impl std::fmt::Display for HealthReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "status: {:?}", self.status)?;
        writeln!(f, "staging_count: {}", self.staging_count)?;
        writeln!(f, "failed_count: {}", self.failed_count)?;
        writeln!(f, "lmtp_reachable: {}", self.lmtp_reachable)?;
        writeln!(f, "imap_connected: {}", self.imap_health.connected)?;
        writeln!(
            f,
            "imap_consecutive_failures: {}",
            self.imap_health.consecutive_failures
        )?;
        if let Some(last_error) = &self.imap_health.last_error {
            writeln!(f, "imap_last_error: {}", last_error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(connected: bool, last_fetch: Option<DateTime<Utc>>) -> FetcherHealth {
        FetcherHealth {
            connected,
            consecutive_failures: 0,
            last_successful_fetch: last_fetch,
            last_error: None,
        }
    }

    #[test]
    fn lmtp_unreachable_is_always_critical() {
        let h = health(true, Some(Utc::now()));
        assert_eq!(compute_status(&h, false, 0), HealthStatus::Critical);
    }

    #[test]
    fn stale_fetch_over_six_hours_is_critical() {
        let h = health(true, Some(Utc::now() - chrono::Duration::hours(7)));
        assert_eq!(compute_status(&h, true, 0), HealthStatus::Critical);
    }

    #[test]
    fn stale_fetch_over_one_hour_is_warning() {
        let h = health(true, Some(Utc::now() - chrono::Duration::hours(2)));
        assert_eq!(compute_status(&h, true, 0), HealthStatus::Warning);
    }

    #[test]
    fn fresh_fetch_with_no_failures_is_healthy() {
        let h = health(true, Some(Utc::now()));
        assert_eq!(compute_status(&h, true, 0), HealthStatus::Healthy);
    }

    #[test]
    fn connected_with_no_fetch_yet_is_healthy() {
        // A freshly-connected session that has not run a fetch cycle yet
        // (e.g. the `health` subcommand's one-shot connectivity check)
        // must not be reported as Warning just because it never fetched.
        let h = health(true, None);
        assert_eq!(compute_status(&h, true, 0), HealthStatus::Healthy);
    }

    #[test]
    fn disconnected_with_no_fetch_is_warning() {
        let h = health(false, None);
        assert_eq!(compute_status(&h, true, 0), HealthStatus::Warning);
    }

    #[test]
    fn exit_codes_match_spec() {
        assert_eq!(HealthStatus::Healthy.exit_code(), 0);
        assert_eq!(HealthStatus::Warning.exit_code(), 1);
        assert_eq!(HealthStatus::Critical.exit_code(), 2);
    }
}
