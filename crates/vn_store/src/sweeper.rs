//! Cleanup sweeper — deletes messages whose lifecycle has completed.
//!
//! A message is purged when it has been viewed, is not saved, and either
//! has no `expires_at` or one that lies before `now`. Unviewed messages are
//! never touched, whatever their timer says.
//!
//! Deletes go out per id, so an interrupted or concurrent sweep leaves the
//! store valid and the next run finishes the job. The report lists the blob
//! paths of purged media records so the caller can drop them too.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use vn_proto::{Lifecycle, MessageRecord};

use crate::error::StoreError;
use crate::traits::{BlobStore, MessageStore};

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub selected: usize,
    /// Rows actually removed; lower than `selected` when another sweep won.
    pub deleted: u64,
    /// `media_url`s of the selected records.
    pub media_urls: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct CleanupSweeper {
    batch_size: usize,
}

impl Default for CleanupSweeper {
    fn default() -> Self {
        Self { batch_size: DEFAULT_BATCH_SIZE }
    }
}

impl CleanupSweeper {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size: batch_size.max(1) }
    }

    pub fn is_purgeable(lifecycle: &Lifecycle, now: DateTime<Utc>) -> bool {
        lifecycle.is_viewed
            && !lifecycle.is_saved()
            && lifecycle.expires_at.map_or(true, |expires_at| expires_at < now)
    }

    /// Deduplicated ids of every record due for deletion at `now`.
    pub fn select(&self, snapshot: &[MessageRecord], now: DateTime<Utc>) -> BTreeSet<String> {
        snapshot
            .iter()
            .filter(|r| Self::is_purgeable(&r.lifecycle, now))
            .map(|r| r.id.clone())
            .collect()
    }

    pub async fn sweep<S>(&self, store: &S, now: DateTime<Utc>) -> Result<SweepReport, StoreError>
    where
        S: MessageStore + ?Sized,
    {
        let snapshot = store.snapshot().await?;
        let ids: Vec<String> = self.select(&snapshot, now).into_iter().collect();
        let media_urls = snapshot
            .iter()
            .filter(|r| ids.binary_search(&r.id).is_ok())
            .filter_map(|r| r.body.media_url().map(str::to_string))
            .collect();

        let mut report = SweepReport { scanned: snapshot.len(), selected: ids.len(), deleted: 0, media_urls };
        for chunk in ids.chunks(self.batch_size) {
            report.deleted += store.delete(chunk).await?;
        }

        if report.selected > 0 {
            tracing::info!(
                scanned = report.scanned,
                selected = report.selected,
                deleted = report.deleted,
                "cleanup sweep finished"
            );
        } else {
            tracing::debug!(scanned = report.scanned, "cleanup sweep found nothing to purge");
        }
        Ok(report)
    }

    /// Drop the blobs of the media records `report` purged. The rows are
    /// already gone, so a failed delete is logged and skipped. Returns how
    /// many blobs were removed.
    pub async fn purge_blobs<B>(&self, blobs: &B, report: &SweepReport) -> usize
    where
        B: BlobStore + ?Sized,
    {
        let mut removed = 0;
        for path in &report.media_urls {
            match blobs.delete(path).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(path = %path, error = %e, "could not remove purged blob"),
            }
        }
        if removed > 0 {
            tracing::info!(removed, "purged media blobs removed");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use vn_proto::AutoDeleteMode;

    use super::*;

    fn lifecycle(mode: AutoDeleteMode) -> Lifecycle {
        Lifecycle::at_send(mode, Utc::now())
    }

    #[test]
    fn unviewed_messages_are_never_purged() {
        for mode in AutoDeleteMode::ALL {
            let lc = lifecycle(mode);
            assert!(!CleanupSweeper::is_purgeable(&lc, Utc::now() + Duration::days(365)), "{mode}");
        }
    }

    #[test]
    fn viewed_without_expiry_is_purged() {
        let mut lc = lifecycle(AutoDeleteMode::None);
        lc.is_viewed = true;
        lc.viewed_at = Some(Utc::now());
        assert!(CleanupSweeper::is_purgeable(&lc, Utc::now()));
    }

    #[test]
    fn viewed_absolute_mode_waits_for_its_timer() {
        let mut lc = lifecycle(AutoDeleteMode::OneMinute);
        lc.is_viewed = true;
        assert!(!CleanupSweeper::is_purgeable(&lc, Utc::now()));
        assert!(CleanupSweeper::is_purgeable(&lc, Utc::now() + Duration::minutes(2)));
    }

    #[test]
    fn viewed_view_once_is_purged() {
        let mut lc = lifecycle(AutoDeleteMode::View);
        assert!(!CleanupSweeper::is_purgeable(&lc, Utc::now()));
        lc.is_viewed = true;
        lc.view_count = 1;
        assert!(CleanupSweeper::is_purgeable(&lc, Utc::now()));
    }

    #[test]
    fn saved_messages_survive() {
        let mut lc = lifecycle(AutoDeleteMode::OneMinute);
        lc.is_viewed = true;
        lc.view_count = 2;
        lc.is_saved = Some(true);
        assert!(!CleanupSweeper::is_purgeable(&lc, Utc::now() + Duration::days(1)));
    }

    #[test]
    fn pending_view_expiry_waits() {
        let mut lc = lifecycle(AutoDeleteMode::OneHourAfterView);
        lc.is_viewed = true;
        lc.expires_at = Some(Utc::now() + Duration::minutes(30));
        assert!(!CleanupSweeper::is_purgeable(&lc, Utc::now()));
        assert!(CleanupSweeper::is_purgeable(&lc, Utc::now() + Duration::minutes(31)));
    }
}
