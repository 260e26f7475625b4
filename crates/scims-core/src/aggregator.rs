//! Periodic entry points: completing ready crafts and usage statistics.
//!
//! The server drives both on fixed intervals. A single failing craft never
//! aborts a pass; it stays `in_progress` and is retried next time.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use scims_types::{Blueprint, BlueprintUsage, Craft, CraftId, CraftStatus, UsageStats};

use crate::craft::CompletionOutcome;
use crate::error::StoreError;
use crate::store::ScimsStore;

/// How many blueprints the usage snapshot lists.
pub const TOP_BLUEPRINTS: usize = 10;

/// A craft the completion pass could not finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedCompletion {
    /// The craft.
    pub craft_id: CraftId,
    /// Error message.
    pub error: String,
}

/// Outcome of one completion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    /// Crafts completed by this pass.
    pub completed: Vec<CraftId>,
    /// Crafts another worker completed first.
    pub already_completed: Vec<CraftId>,
    /// Crafts left `in_progress` after an error.
    pub failed: Vec<FailedCompletion>,
}

impl PassReport {
    /// Number of crafts the pass looked at.
    pub fn examined(&self) -> usize {
        self.completed
            .len()
            .saturating_add(self.already_completed.len())
            .saturating_add(self.failed.len())
    }
}

/// Complete every craft whose crafting time has elapsed at `now`.
///
/// # Errors
///
/// Only listing ready crafts can fail the pass. Per-craft errors are
/// logged and reported in [`PassReport::failed`].
pub async fn complete_ready_crafts<S: ScimsStore>(
    store: &S,
    now: DateTime<Utc>,
) -> Result<PassReport, StoreError> {
    let ready = store.ready_crafts(now).await?;
    let mut report = PassReport::default();

    for candidate in ready {
        match store.complete_craft(candidate.craft_id, now).await {
            Ok(CompletionOutcome::Completed(_)) => report.completed.push(candidate.craft_id),
            Ok(CompletionOutcome::AlreadyCompleted { craft_id }) => {
                report.already_completed.push(craft_id);
            }
            Err(e) => {
                tracing::warn!(
                    craft_id = %candidate.craft_id,
                    error = %e,
                    "ready craft failed to complete; will retry next pass"
                );
                report.failed.push(FailedCompletion {
                    craft_id: candidate.craft_id,
                    error: e.to_string(),
                });
            }
        }
    }

    if report.examined() > 0 {
        tracing::info!(
            completed = report.completed.len(),
            already_completed = report.already_completed.len(),
            failed = report.failed.len(),
            "completion pass finished"
        );
    }
    Ok(report)
}

/// Fetch a usage statistics snapshot from the store.
///
/// # Errors
///
/// Propagates store failures.
pub async fn aggregate_usage_stats<S: ScimsStore>(
    store: &S,
    now: DateTime<Utc>,
) -> Result<UsageStats, StoreError> {
    let stats = store.usage_stats(now).await?;
    tracing::debug!(
        planned = stats.planned,
        in_progress = stats.in_progress,
        completed = stats.completed,
        cancelled = stats.cancelled,
        outstanding_reserved = %stats.outstanding_reserved,
        "usage stats aggregated"
    );
    Ok(stats)
}

/// Build a snapshot from crafts, blueprints and the ledger's reserved total.
pub fn compute_usage_stats<'a, C>(
    crafts: C,
    blueprints: &[Blueprint],
    outstanding_reserved: Decimal,
    now: DateTime<Utc>,
) -> UsageStats
where
    C: IntoIterator<Item = &'a Craft>,
{
    let day_ago = TimeDelta::try_hours(24).and_then(|d| now.checked_sub_signed(d));
    let mut stats = UsageStats {
        generated_at: now,
        planned: 0,
        in_progress: 0,
        completed: 0,
        cancelled: 0,
        completed_last_24h: 0,
        top_blueprints: Vec::new(),
        outstanding_reserved,
    };

    for craft in crafts {
        let counter = match craft.status {
            CraftStatus::Planned => &mut stats.planned,
            CraftStatus::InProgress => &mut stats.in_progress,
            CraftStatus::Completed => &mut stats.completed,
            CraftStatus::Cancelled => &mut stats.cancelled,
        };
        *counter = counter.saturating_add(1);

        let recent = craft
            .completed_at
            .zip(day_ago)
            .is_some_and(|(at, cutoff)| at >= cutoff);
        if craft.status == CraftStatus::Completed && recent {
            stats.completed_last_24h = stats.completed_last_24h.saturating_add(1);
        }
    }

    stats.top_blueprints = top_blueprints(blueprints, TOP_BLUEPRINTS);
    stats
}

/// Most used blueprints, usage descending then ID ascending.
pub fn top_blueprints(blueprints: &[Blueprint], limit: usize) -> Vec<BlueprintUsage> {
    let mut used: Vec<&Blueprint> = blueprints.iter().filter(|b| b.usage_count > 0).collect();
    used.sort_by(|a, b| b.usage_count.cmp(&a.usage_count).then_with(|| a.id.cmp(&b.id)));
    used.into_iter()
        .take(limit)
        .map(|b| BlueprintUsage {
            blueprint_id: b.id,
            name: b.name.clone(),
            usage_count: b.usage_count,
        })
        .collect()
}
