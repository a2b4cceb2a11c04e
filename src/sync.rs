//! Sync engine: reconcile a fetched batch with the persisted set.
//!
//! Merge is by stable message id. The central invariant: a sync never erases
//! a previously computed or user-set category — content fields refresh from
//! the fetched copy, `tag` and `matched_rule` carry over from the persisted
//! one. Records absent from the batch are retained (soft retention, no
//! deletion), only their latest-fetch flag drops.

use std::collections::HashMap;

use crate::storage::{EmailStore, StoreError};
use crate::types::EmailRecord;

/// Result of a merge, before persistence.
#[derive(Debug)]
pub struct MergeResult {
    pub emails: Vec<EmailRecord>,
    /// Ids seen for the first time in this batch.
    pub added: usize,
    /// Existing ids whose content fields were refreshed.
    pub refreshed: usize,
}

/// Result of a full sync, including the persist step.
///
/// When the write fails the merged set is still here and usable; the error
/// is surfaced in `persist_error` instead of being swallowed, since the
/// unwritten sync will simply be redone (idempotently) on the next run.
#[derive(Debug)]
pub struct SyncOutcome {
    pub emails: Vec<EmailRecord>,
    pub added: usize,
    pub refreshed: usize,
    pub persist_error: Option<StoreError>,
}

/// Merge a fetched batch into the persisted set (pure, no I/O).
///
/// Every persisted record has `in_latest_fetch` cleared first; every record
/// present in the batch ends with it set. New ids are inserted with the
/// unclassified sentinel (the default tag). Never produces duplicate ids.
pub fn merge(persisted: Vec<EmailRecord>, fetched: Vec<EmailRecord>) -> MergeResult {
    let mut emails = persisted;
    for rec in emails.iter_mut() {
        rec.in_latest_fetch = false;
    }

    let mut index: HashMap<String, usize> = emails
        .iter()
        .enumerate()
        .map(|(i, e)| (e.id.clone(), i))
        .collect();

    let mut added = 0;
    let mut refreshed = 0;

    for mut incoming in fetched {
        incoming.normalize();
        match index.get(&incoming.id) {
            Some(&i) => {
                let existing = &mut emails[i];
                // Carry over the classification; refresh everything else.
                incoming.tag = existing.tag;
                incoming.matched_rule = std::mem::take(&mut existing.matched_rule);
                // A summary already generated is not discarded by a re-fetch,
                // and a batch without body content keeps the stored pointer.
                if incoming.ai_summary.is_empty() {
                    incoming.ai_summary = std::mem::take(&mut existing.ai_summary);
                }
                if incoming.body_file.is_empty() {
                    incoming.body_file = std::mem::take(&mut existing.body_file);
                    incoming.body_format = existing.body_format;
                }
                incoming.in_latest_fetch = true;
                *existing = incoming;
                refreshed += 1;
            }
            None => {
                incoming.in_latest_fetch = true;
                index.insert(incoming.id.clone(), emails.len());
                emails.push(incoming);
                added += 1;
            }
        }
    }

    MergeResult {
        emails,
        added,
        refreshed,
    }
}

/// Merge a fetched batch with the store's current contents and persist the
/// merged set in full.
pub fn sync(store: &EmailStore, fetched: Vec<EmailRecord>) -> SyncOutcome {
    let persisted = store.load();
    let result = merge(persisted, fetched);
    log::info!(
        "sync merged {} records ({} new, {} refreshed)",
        result.emails.len(),
        result.added,
        result.refreshed
    );

    let persist_error = match store.save(&result.emails) {
        Ok(()) => None,
        Err(e) => {
            log::warn!("sync merged in memory but persist failed: {}", e);
            Some(e)
        }
    };

    SyncOutcome {
        emails: result.emails,
        added: result.added,
        refreshed: result.refreshed,
        persist_error,
    }
}

// ============================================================================
// Tests
// ============================================================================
