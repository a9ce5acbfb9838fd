//! Migration job lifecycle
//!
//! ```text
//! pending ──> in_progress ──> completed | failed | cancelled
//!    └───────────────────────> completed | failed | cancelled
//! ```
//!
//! Terminal statuses never change again. Every status change appends one
//! history entry, persisted together with the job update. `started_at` and
//! `completed_at` are stamped on the first entry into `in_progress` and into a
//! terminal status respectively, and are never cleared.
//!
//! The transition rules live in [`apply_update`] and [`apply_cancel`], which
//! are pure; the async service functions load the job, run the rules and hand
//! the result to the store.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::domain::{
    JobVersion, MigrationHistoryEntry, MigrationJob, MigrationStatus, NewHistoryEntry,
    NewMigrationJob, UpdateMigrationJob,
};
use crate::error::{CoreError, Result};
use crate::query::MigrationJobFilter;
use crate::store::EntityStore;

pub const CANCELLED_ERROR_MESSAGE: &str = "Job cancelled by user";
pub const CANCELLED_HISTORY_MESSAGE: &str = "Migration job cancelled by user";

/// A job after a state machine step, plus the history entry the step produced
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub job: MigrationJob,
    pub history: Option<NewHistoryEntry>,
}

fn validate_progress(progress: i32) -> Result<()> {
    if (0..=100).contains(&progress) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "progress_percentage must be between 0 and 100, got {}",
            progress
        )))
    }
}

/// Apply a partial update to `current`
pub fn apply_update(
    current: &MigrationJob,
    update: &UpdateMigrationJob,
    now: DateTime<Utc>,
) -> Result<Transition> {
    if let Some(progress) = update.progress_percentage {
        validate_progress(progress)?;
    }

    let status_change = update.status.filter(|status| *status != current.status);
    if let Some(next) = status_change {
        if !current.status.can_transition_to(next) {
            return Err(CoreError::InvalidState(format!(
                "Cannot move migration job {} from '{}' to '{}'",
                current.id, current.status, next
            )));
        }
    }

    let mut job = current.clone();
    job.updated_at = now;
    if let Some(error_message) = &update.error_message {
        job.error_message = error_message.clone();
    }
    if let Some(progress) = update.progress_percentage {
        job.progress_percentage = progress;
    }
    if let Some(config) = &update.transformation_config {
        job.transformation_config = config.clone();
    }
    if let Some(config) = &update.mapping_config {
        job.mapping_config = config.clone();
    }

    let history = status_change.map(|next| {
        job.status = next;
        if next == MigrationStatus::InProgress && job.started_at.is_none() {
            job.started_at = Some(now);
        }
        if next.is_terminal() && job.completed_at.is_none() {
            job.completed_at = Some(now);
        }

        let message = update
            .error_message
            .clone()
            .flatten()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("Status changed to {}", next));

        NewHistoryEntry {
            migration_job_id: job.id,
            status: next,
            message: Some(message),
            created_at: now,
        }
    });

    Ok(Transition { job, history })
}

/// Cancel `current` if it has not finished yet
pub fn apply_cancel(current: &MigrationJob, now: DateTime<Utc>) -> Result<Transition> {
    if !current.status.is_cancellable() {
        return Err(CoreError::InvalidState(format!(
            "Cannot cancel migration job with status '{}'. Only pending or in_progress jobs can be cancelled.",
            current.status
        )));
    }

    let mut job = current.clone();
    job.status = MigrationStatus::Cancelled;
    job.error_message = Some(CANCELLED_ERROR_MESSAGE.to_string());
    job.completed_at = Some(now);
    job.updated_at = now;

    Ok(Transition {
        history: Some(NewHistoryEntry {
            migration_job_id: job.id,
            status: MigrationStatus::Cancelled,
            message: Some(CANCELLED_HISTORY_MESSAGE.to_string()),
            created_at: now,
        }),
        job,
    })
}

/// Create a job over existing assets. History starts with the first status
/// change, so none is written here.
pub async fn create_migration_job<S>(store: &S, input: NewMigrationJob) -> Result<MigrationJob>
where
    S: EntityStore + ?Sized,
{
    if input.name.trim().is_empty() {
        return Err(CoreError::Validation("name must not be empty".to_string()));
    }
    if input.source_asset_ids.is_empty() {
        return Err(CoreError::Validation(
            "source_asset_ids must contain at least one asset ID".to_string(),
        ));
    }

    let existing: HashSet<i32> = store
        .existing_asset_ids(&input.source_asset_ids)
        .await?
        .into_iter()
        .collect();

    let mut seen = HashSet::new();
    let missing: Vec<String> = input
        .source_asset_ids
        .iter()
        .filter(|id| !existing.contains(*id) && seen.insert(**id))
        .map(|id| id.to_string())
        .collect();

    if !missing.is_empty() {
        return Err(CoreError::Validation(format!(
            "The following asset IDs do not exist: {}",
            missing.join(", ")
        )));
    }

    let job = store.insert_migration_job(input, Utc::now()).await?;
    info!(
        "Created migration job {} over {} assets",
        job.id,
        job.source_asset_ids.len()
    );
    Ok(job)
}

pub async fn get_migration_job<S>(store: &S, id: i32) -> Result<MigrationJob>
where
    S: EntityStore + ?Sized,
{
    store
        .get_migration_job(id)
        .await?
        .ok_or_else(|| CoreError::migration_job_not_found(id))
}

pub async fn get_migration_jobs<S>(
    store: &S,
    filter: &MigrationJobFilter,
) -> Result<Vec<MigrationJob>>
where
    S: EntityStore + ?Sized,
{
    store.list_migration_jobs(filter).await
}

pub async fn update_migration_job<S>(
    store: &S,
    id: i32,
    update: UpdateMigrationJob,
) -> Result<MigrationJob>
where
    S: EntityStore + ?Sized,
{
    let current = get_migration_job(store, id).await?;
    let transition = apply_update(&current, &update, Utc::now())?;
    commit(store, &current, transition).await
}

pub async fn cancel_migration_job<S>(store: &S, id: i32) -> Result<MigrationJob>
where
    S: EntityStore + ?Sized,
{
    let current = get_migration_job(store, id).await?;
    let transition = apply_cancel(&current, Utc::now())?;
    commit(store, &current, transition).await
}

/// Save `transition` only if the job is still as it was when `current` was read
async fn commit<S>(store: &S, current: &MigrationJob, transition: Transition) -> Result<MigrationJob>
where
    S: EntityStore + ?Sized,
{
    let Transition { job, history } = transition;
    let saved = store
        .save_migration_job(&job, JobVersion::of(current), history)
        .await?;
    if saved.status != current.status {
        info!(
            "Migration job {} moved from {} to {}",
            saved.id, current.status, saved.status
        );
    }
    Ok(saved)
}

/// Status history of a job, oldest first. Unknown ids have no history.
pub async fn get_migration_history<S>(
    store: &S,
    migration_job_id: i32,
) -> Result<Vec<MigrationHistoryEntry>>
where
    S: EntityStore + ?Sized,
{
    store.list_history(migration_job_id).await
}
