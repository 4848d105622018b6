// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Maildir Store (C2): the durable on-disk queue. Owns the staging
//! directory tree and all terminal folders exclusively; no other
//! component touches these paths directly.

use crate::error::StagingError;
use md5::{Digest, Md5};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const MODE_0660: u32 = 0o660;

pub struct MaildirStore {
    root: PathBuf,
    user: String,
}

impl MaildirStore {
    pub fn new(root: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            user: user.into(),
        }
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(".staging")
    }

    fn delivered_dir(&self) -> PathBuf {
        self.staging_dir().join(".delivered")
    }

    fn failed_dir(&self) -> PathBuf {
        self.staging_dir().join(".failed")
    }

    fn quarantine_cur_dir(&self) -> PathBuf {
        self.root.join(&self.user).join(".Quarantine").join("cur")
    }

    /// Idempotently creates the directory layout described in spec.md §6.
    pub async fn ensure_layout(&self) -> Result<(), StagingError> {
        for dir in [
            self.root.join(&self.user).join(".Quarantine").join("cur"),
            self.root.join(&self.user).join(".Quarantine").join("new"),
            self.root.join(&self.user).join(".Quarantine").join("tmp"),
            self.staging_dir(),
            self.delivered_dir(),
            self.failed_dir(),
        ] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    /// `<microseconds>.<16 hex chars>.<short hostname>` — the hash's only
    /// role is uniqueness under concurrent writers and re-entry.
    fn generate_filename(message_id: Option<&str>) -> String {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros();
        let pid = std::process::id();
        let mid = message_id.unwrap_or("");
        let mut hasher = Md5::new();
        hasher.update(format!("{}{}{}", micros, pid, mid));
        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        let hex16 = &hex[..16];

        let hostname = gethostname::gethostname()
            .to_string_lossy()
            .chars()
            .take(16)
            .collect::<String>();

        format!("{}.{}.{}", micros, hex16, hostname)
    }

    async fn write_with_mode(path: &Path, raw: &[u8]) -> Result<(), StagingError> {
        tokio::fs::write(path, raw).await?;
        let perms = std::fs::Permissions::from_mode(MODE_0660);
        tokio::fs::set_permissions(path, perms).await?;
        Ok(())
    }

    /// Writes `<new-name>.mail` into staging. Size verification is
    /// mandatory: a mismatch deletes the partial file and fails. This is
    /// the commit point that authorizes upstream deletion (G1).
    pub async fn save_to_staging(&self, raw: &[u8]) -> Result<String, StagingError> {
        let filename = format!("{}.mail", Self::generate_filename(None));
        let path = self.staging_dir().join(&filename);
        Self::write_with_mode(&path, raw).await?;

        let meta = tokio::fs::metadata(&path).await?;
        if meta.len() as usize != raw.len() {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(StagingError::SizeMismatch {
                expected: raw.len(),
                actual: meta.len() as usize,
            });
        }
        Ok(filename)
    }

    /// Lists staging, filters `.mail` items, atomically renames each to
    /// `.processing`. Rename failures (already claimed, or vanished) are
    /// skipped silently — that is the mechanism that makes P2 hold.
    pub async fn claim_staging(&self) -> Result<Vec<(String, Vec<u8>)>, StagingError> {
        let dir = self.staging_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut mail_files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".mail") {
                mail_files.push(name);
            }
        }

        let mut claimed = Vec::new();
        for name in mail_files {
            let src = dir.join(&name);
            let new_name = format!("{}.processing", &name[..name.len() - ".mail".len()]);
            let dst = dir.join(&new_name);
            if tokio::fs::rename(&src, &dst).await.is_err() {
                continue;
            }
            match tokio::fs::read(&dst).await {
                Ok(bytes) => claimed.push((new_name, bytes)),
                Err(_) => continue,
            }
        }
        Ok(claimed)
    }

    /// Renames `.processing` → `.mail` to surrender a claim for later
    /// retry.
    pub async fn release_to_staging(&self, processing_filename: &str) -> Result<(), StagingError> {
        let dir = self.staging_dir();
        let src = dir.join(processing_filename);
        let stem = processing_filename
            .strip_suffix(".processing")
            .unwrap_or(processing_filename);
        let dst = dir.join(format!("{}.mail", stem));
        tokio::fs::rename(&src, &dst).await?;
        Ok(())
    }

    /// Unlinks the named staging file if present. Tolerates absence.
    pub async fn remove_staging(&self, filename: &str) -> Result<(), StagingError> {
        let path = self.staging_dir().join(filename);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes to `.Quarantine/cur/<new-name>` with mode 0660. Returns the
    /// filename.
    pub async fn quarantine(&self, raw: &[u8], _reason: &str) -> Result<String, StagingError> {
        let filename = Self::generate_filename(None);
        let path = self.quarantine_cur_dir().join(&filename);
        Self::write_with_mode(&path, raw).await?;
        Ok(filename)
    }

    /// Writes to `.staging/.delivered/<name>.mail`. Archival failure is
    /// logged and swallowed — non-critical per spec.
    pub async fn archive_delivered(&self, raw: &[u8], message_id: &str) -> String {
        let filename = format!(
            "{}.mail",
            Self::generate_filename(Some(message_id))
        );
        let path = self.delivered_dir().join(&filename);
        if let Err(e) = Self::write_with_mode(&path, raw).await {
            log::warn!("failed to archive delivered message {}: {}", message_id, e);
            return String::new();
        }
        filename
    }

    /// Writes to `.staging/.failed/<name>.mail`. Failure is fatal for the
    /// item (propagated to the caller).
    pub async fn move_to_failed(&self, raw: &[u8], reason: &str) -> Result<String, StagingError> {
        log::warn!("moving item to failed: {}", reason);
        let filename = format!("{}.mail", Self::generate_filename(None));
        let path = self.failed_dir().join(&filename);
        Self::write_with_mode(&path, raw).await?;
        Ok(filename)
    }

    /// Counts entries ending in `.mail` under a directory. Missing
    /// directories count as zero.
    async fn count_mail_entries(dir: &Path) -> usize {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(e) => e,
            Err(_) => return 0,
        };
        let mut count = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().ends_with(".mail") {
                count += 1;
            }
        }
        count
    }

    pub async fn count_staging(&self) -> usize {
        Self::count_mail_entries(&self.staging_dir()).await
    }

    pub async fn count_failed(&self) -> usize {
        Self::count_mail_entries(&self.failed_dir()).await
    }

    /// On startup, rename every leftover `.processing` file back to
    /// `.mail`, reclaiming items abandoned by a prior crash. Not part of
    /// the original source; added deliberately per spec.md §9.
    pub async fn rescue_orphaned_processing(&self) -> Result<usize, StagingError> {
        let dir = self.staging_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut processing_files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".processing") {
                processing_files.push(name);
            }
        }

        let mut rescued = 0;
        for name in processing_files {
            if self.release_to_staging(&name).await.is_ok() {
                rescued += 1;
            }
        }
        Ok(rescued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(dir: &Path) -> MaildirStore {
        MaildirStore::new(dir.to_path_buf(), "alice")
    }

    #[tokio::test]
    async fn ensure_layout_is_idempotent() {
        let dir = tempdir().unwrap();
        let s = store(dir.path());
        s.ensure_layout().await.unwrap();
        s.ensure_layout().await.unwrap();
        assert!(dir.path().join("alice/.Quarantine/cur").is_dir());
        assert!(dir.path().join(".staging/.delivered").is_dir());
    }

    #[tokio::test]
    async fn save_then_claim_round_trips_bytes() {
        let dir = tempdir().unwrap();
        let s = store(dir.path());
        s.ensure_layout().await.unwrap();
        let raw = b"hello world".to_vec();
        let filename = s.save_to_staging(&raw).await.unwrap();
        assert!(filename.ends_with(".mail"));

        let claimed = s.claim_staging().await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert!(claimed[0].0.ends_with(".processing"));
        assert_eq!(claimed[0].1, raw);

        // Second claim must not return the same item again.
        let claimed_again = s.claim_staging().await.unwrap();
        assert!(claimed_again.is_empty());
    }

    #[tokio::test]
    async fn release_returns_item_to_mail_suffix() {
        let dir = tempdir().unwrap();
        let s = store(dir.path());
        s.ensure_layout().await.unwrap();
        let raw = b"retry me".to_vec();
        s.save_to_staging(&raw).await.unwrap();
        let claimed = s.claim_staging().await.unwrap();
        let (processing_name, _) = &claimed[0];
        s.release_to_staging(processing_name).await.unwrap();

        let reclaimed = s.claim_staging().await.unwrap();
        assert_eq!(reclaimed.len(), 1);
    }

    #[tokio::test]
    async fn remove_staging_tolerates_absence() {
        let dir = tempdir().unwrap();
        let s = store(dir.path());
        s.ensure_layout().await.unwrap();
        s.remove_staging("does-not-exist.mail").await.unwrap();
    }

    #[tokio::test]
    async fn rescue_orphaned_processing_restores_mail_suffix() {
        let dir = tempdir().unwrap();
        let s = store(dir.path());
        s.ensure_layout().await.unwrap();
        s.save_to_staging(b"abandoned").await.unwrap();
        s.claim_staging().await.unwrap();

        let rescued = s.rescue_orphaned_processing().await.unwrap();
        assert_eq!(rescued, 1);
        assert_eq!(s.count_staging().await, 1);
    }

    #[tokio::test]
    async fn counts_are_zero_for_missing_directories() {
        let dir = tempdir().unwrap();
        let s = store(dir.path());
        assert_eq!(s.count_staging().await, 0);
        assert_eq!(s.count_failed().await, 0);
    }
}
