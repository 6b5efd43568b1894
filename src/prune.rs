//! Age-based pruning of managed keys
//!
//! One invocation runs four steps:
//!
//! 1. **Collect** managed keys from the remote registry
//! 2. **Filter** by age when a threshold is given
//! 3. **Confirm** with the user unless running unattended
//! 4. **Delete** every candidate, recording failures instead of stopping
//!
//! A key that is already gone counts as pruned. Failed deletions are not
//! retried here; running the prune again picks them up.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{KeyError, Result};
use crate::inventory::KeyInventory;
use crate::keys::KeyRecord;
use crate::registry::RemoteKeyRegistry;

static DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+)d$").expect("valid duration pattern"));

/// Parse an age threshold like `30d` into days
pub fn parse_duration(input: &str) -> Result<u32> {
    let invalid = || {
        KeyError::Validation(format!(
            "Invalid duration format '{}'. Use a number of days like '30d'.",
            input
        ))
    };
    let caps = DURATION.captures(input.trim()).ok_or_else(invalid)?;
    caps[1].parse().map_err(|_| invalid())
}

/// A key selected for deletion
#[derive(Debug, Clone)]
pub struct PruneCandidate {
    pub record: KeyRecord,
    /// `None` when the remote did not report a creation time
    pub age_days: Option<i64>,
}

/// Ordered candidates for one prune run
#[derive(Debug, Clone, Default)]
pub struct PrunePlan {
    pub candidates: Vec<PruneCandidate>,
    pub threshold_days: Option<u32>,
}

impl PrunePlan {
    /// Select managed keys at least `threshold_days` old
    ///
    /// Without a threshold every managed key is selected. With one, keys of
    /// unknown age are skipped. Input order is preserved.
    pub fn build(records: Vec<KeyRecord>, threshold_days: Option<u32>, now: DateTime<Utc>) -> Self {
        let candidates = records
            .into_iter()
            .filter(KeyRecord::is_managed)
            .filter_map(|record| {
                let age_days = record.age_days(now);
                let keep = match (threshold_days, age_days) {
                    (None, _) => true,
                    (Some(threshold), Some(age)) => age >= i64::from(threshold),
                    (Some(_), None) => {
                        tracing::warn!(
                            "Key '{}' has no creation date, skipping age check",
                            record.title
                        );
                        false
                    }
                };
                keep.then_some(PruneCandidate { record, age_days })
            })
            .collect();

        Self {
            candidates,
            threshold_days,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}

/// Asks the user whether a plan may proceed
pub trait Confirm {
    fn confirm(&mut self, plan: &PrunePlan) -> Result<bool>;
}

/// Approves every plan (`--yes`)
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _plan: &PrunePlan) -> Result<bool> {
        Ok(true)
    }
}

/// Outcome of the delete step
#[derive(Debug, Default)]
pub struct PruneReport {
    pub deleted: Vec<KeyRecord>,
    /// Keys the remote no longer had
    pub already_gone: Vec<KeyRecord>,
    pub failed: Vec<(KeyRecord, KeyError)>,
}

impl PruneReport {
    pub fn all_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of candidates that attempted deletion
    pub fn total(&self) -> usize {
        self.deleted.len() + self.already_gone.len() + self.failed.len()
    }
}

/// How a prune run ended
#[derive(Debug)]
pub enum PruneOutcome {
    /// No managed key matched
    NothingToPrune,
    /// The user declined; nothing was deleted
    Cancelled(PrunePlan),
    Completed(PruneReport),
}

/// Runs collect, filter, confirm and delete against one registry
pub struct PruneEngine<'a> {
    registry: &'a dyn RemoteKeyRegistry,
}

impl<'a> PruneEngine<'a> {
    pub fn new(registry: &'a dyn RemoteKeyRegistry) -> Self {
        Self { registry }
    }

    /// Collect and filter
    pub fn plan(&self, threshold_days: Option<u32>, now: DateTime<Utc>) -> Result<PrunePlan> {
        let records = KeyInventory::new(self.registry).load_managed()?;
        Ok(PrunePlan::build(records, threshold_days, now))
    }

    /// Full run: plan, confirm, then delete
    pub fn run(
        &self,
        threshold_days: Option<u32>,
        confirm: &mut dyn Confirm,
        now: DateTime<Utc>,
    ) -> Result<PruneOutcome> {
        let plan = self.plan(threshold_days, now)?;
        if plan.is_empty() {
            return Ok(PruneOutcome::NothingToPrune);
        }

        if !confirm.confirm(&plan)? {
            tracing::info!("Prune of {} key(s) declined", plan.len());
            return Ok(PruneOutcome::Cancelled(plan));
        }

        Ok(PruneOutcome::Completed(self.execute(plan)))
    }

    /// Attempt every deletion once
    pub fn execute(&self, plan: PrunePlan) -> PruneReport {
        let mut report = PruneReport::default();

        for candidate in plan.candidates {
            let record = candidate.record;
            match self.registry.delete(&record.id) {
                Ok(()) => {
                    tracing::info!("Deleted {} key: {}", record.kind(), record.title);
                    report.deleted.push(record);
                }
                Err(e) if e.is_not_found() => {
                    tracing::info!("{} key already gone: {}", record.kind(), record.title);
                    report.already_gone.push(record);
                }
                Err(e) => {
                    tracing::warn!("Failed to delete {} key {}: {}", record.kind(), record.title, e);
                    report.failed.push((record, e));
                }
            }
        }

        report
    }
}
