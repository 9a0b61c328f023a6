use crate::actions::{incongruous_count, parse_actions, work_window, RawAction};
use crate::config::ListSettings;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::estimates::estimate_tasks;
use crate::models::{format_timestamp, parse_loose_timestamp, parse_timestamp, CardRecord, TaskCounts};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// One card as written to disk by the board fetcher.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardSnapshot {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub tasks: Option<TaskCounts>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub checklist: Vec<String>,
    #[serde(default)]
    pub work_began: Option<String>,
    #[serde(default)]
    pub work_ended: Option<String>,
    #[serde(default)]
    pub work_duration: Option<f64>,
    #[serde(default)]
    pub actions: Vec<SnapshotAction>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Snapshots carry either raw board actions or the fetcher's one-line
/// rendering of them. Only raw actions feed work-window derivation.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SnapshotAction {
    Structured(RawAction),
    Formatted(String),
}

impl CardSnapshot {
    /// Fills in what the snapshot left implicit: task counts from size markers,
    /// the work window from action history, canonical timestamp strings.
    /// Unparseable timestamps are passed through for storage to reject.
    pub fn into_record(self, lists: Option<&ListSettings>) -> AppResult<CardRecord> {
        let tasks = match self.tasks {
            Some(tasks) => tasks,
            None => {
                let estimate = estimate_tasks(self.description.as_deref(), self.checklist.iter().map(String::as_str));
                if estimate.unestimated_items > 0 {
                    tracing::warn!(
                        uuid = %self.uuid,
                        count = estimate.unestimated_items,
                        "checklist items with no estimate"
                    );
                }
                estimate.tasks
            }
        };

        if !self.warnings.is_empty() {
            tracing::debug!(uuid = %self.uuid, warnings = ?self.warnings, "snapshot carries fetcher warnings");
        }
        let structured = self
            .actions
            .into_iter()
            .filter_map(|action| match action {
                SnapshotAction::Structured(raw) => Some(raw),
                SnapshotAction::Formatted(_) => None,
            })
            .collect();
        let actions = parse_actions(structured)?;
        let incongruous = incongruous_count(&actions);
        if incongruous > 0 {
            tracing::warn!(uuid = %self.uuid, count = incongruous, "incongruous card actions");
        }
        let (derived_began, derived_ended) = match lists {
            Some(lists) => work_window(&actions, &lists.work_begins_in, &lists.work_ends_in),
            None => (None, None),
        };

        let work_began = self.work_began.map(normalize_timestamp).or(derived_began.map(format_timestamp));
        let work_ended = self.work_ended.map(normalize_timestamp).or(derived_ended.map(format_timestamp));
        let work_duration = self
            .work_duration
            .or_else(|| window_hours(work_began.as_deref(), work_ended.as_deref()));

        Ok(CardRecord {
            uuid: self.uuid,
            title: self.title,
            owner: self.owner,
            url: self.url,
            tasks,
            work_began,
            work_ended,
            work_duration,
        })
    }
}

/// Wall-clock hours between two canonical timestamps; `None` unless both
/// parse and the window is non-empty.
fn window_hours(began: Option<&str>, ended: Option<&str>) -> Option<f64> {
    let began = parse_timestamp(began?)?;
    let ended = parse_timestamp(ended?)?;
    let hours = (ended - began).num_seconds() as f64 / 3600.0;
    (hours > 0.0).then_some(hours)
}

fn normalize_timestamp(raw: String) -> String {
    parse_loose_timestamp(&raw).map(format_timestamp).unwrap_or(raw)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub rejected: usize,
}

impl ImportSummary {
    pub fn merge(self, other: ImportSummary) -> ImportSummary {
        ImportSummary {
            imported: self.imported + other.imported,
            rejected: self.rejected + other.rejected,
        }
    }
}

pub fn read_snapshot(path: &Path) -> AppResult<CardSnapshot> {
    let raw = fs::read_to_string(path).map_err(|error| AppError::Io(format!("{}: {}", path.display(), error)))?;
    serde_yaml::from_str(&raw).map_err(|error| AppError::Malformed(format!("{}: {}", path.display(), error)))
}

/// Imports every `*.yml` / `*.yaml` snapshot in `dir`. A bad card is logged
/// and counted, never fatal; only storage failures abort the batch.
pub fn import_dir(
    db: &Database,
    dir: &Path,
    is_complete: bool,
    lists: Option<&ListSettings>,
) -> AppResult<ImportSummary> {
    let mut summary = ImportSummary::default();
    if !dir.is_dir() {
        tracing::warn!(path = %dir.display(), "snapshot directory not found; nothing to import");
        return Ok(summary);
    }

    for path in snapshot_files(dir)? {
        tracing::info!(path = %path.display(), is_complete, "importing card snapshot");
        let outcome = read_snapshot(&path)
            .and_then(|snapshot| snapshot.into_record(lists))
            .and_then(|record| db.insert_or_replace(&record, is_complete));
        match outcome {
            Ok(()) => summary.imported += 1,
            Err(error @ AppError::Internal(_)) => return Err(error),
            Err(error) => {
                tracing::warn!(path = %path.display(), error = %error, "rejected card snapshot");
                summary.rejected += 1;
            }
        }
    }
    Ok(summary)
}

fn snapshot_files(dir: &Path) -> AppResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|error| AppError::Io(error.to_string()))? {
        let path = entry.map_err(|error| AppError::Io(error.to_string()))?.path();
        let is_snapshot = path
            .extension()
            .and_then(|value| value.to_str())
            .map(|value| value == "yml" || value == "yaml")
            .unwrap_or(false);
        if is_snapshot && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
