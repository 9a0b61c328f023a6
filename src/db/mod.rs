use crate::errors::{AppError, AppResult, ValidationError};
use crate::models::{
    format_timestamp, parse_timestamp, CardIdentity, CardRecord, CompletedCard, InProgressCard, SummaryRow,
    TaskCounts,
};
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, ErrorCode};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = include_str!("schema.sql");

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://.+$").expect("valid url regex"));

/// Card store. Every write goes through [`Database::insert_or_replace`], which
/// is the only place card invariants are enforced.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(AppError::from)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    /// Validates `record` and writes it, replacing any existing card with the
    /// same uuid. Nothing is written when validation fails.
    pub fn insert_or_replace(&self, record: &CardRecord, is_complete: bool) -> AppResult<()> {
        validate_card(record, is_complete)?;

        let complete_flag = i32::from(is_complete);
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO cards (
               uuid, title, owner, url,
               task_count_S, task_count_M, task_count_L,
               is_complete, work_duration,
               work_began, work_ended
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.uuid,
                record.title,
                record.owner,
                record.url,
                record.tasks.s,
                record.tasks.m,
                record.tasks.l,
                complete_flag,
                record.work_duration,
                record.work_began,
                record.work_ended,
            ],
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(failure, message) if failure.code == ErrorCode::ConstraintViolation => {
                AppError::Validation(validation_error(
                    record,
                    message.unwrap_or_else(|| "constraint violation".to_string()),
                ))
            }
            other => AppError::from(other),
        })?;
        Ok(())
    }

    /// Owners with at least one card, alphabetically.
    pub fn distinct_owners(&self) -> AppResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT owner FROM cards GROUP BY owner ORDER BY owner")?;
        let owners = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(owners)
    }

    pub fn completed_cards_for(&self, owner: &str, cutoff: NaiveDateTime) -> AppResult<Vec<CompletedCard>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT task_count_S, task_count_M, task_count_L, work_duration
             FROM cards
             WHERE is_complete = 1 AND owner = ?1 AND work_began >= ?2
             ORDER BY work_began, uuid",
        )?;
        let cards = stmt
            .query_map(params![owner, format_timestamp(cutoff)], |row| {
                Ok(CompletedCard {
                    tasks: TaskCounts::new(row.get(0)?, row.get(1)?, row.get(2)?),
                    work_duration: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cards)
    }

    /// Recorded work hours divided by the wall-clock hours spanned by the
    /// owner's completed cards since `cutoff`. Zero when there are none.
    /// Overlapping cards can push the ratio above one; it is not clamped.
    pub fn at_work_ratio_for(&self, owner: &str, cutoff: NaiveDateTime) -> AppResult<f64> {
        let conn = self.lock()?;
        let (count, worked, earliest, latest) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(work_duration), 0.0), MIN(work_began), MAX(work_ended)
             FROM cards
             WHERE is_complete = 1 AND owner = ?1 AND work_began >= ?2",
            params![owner, format_timestamp(cutoff)],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )?;
        if count == 0 {
            return Ok(0.0);
        }

        let (Some(earliest), Some(latest)) = (earliest, latest) else {
            return Err(AppError::Internal(format!(
                "completed cards for '{}' are missing work timestamps",
                owner
            )));
        };
        let elapsed_hours = hours_between(read_timestamp(&earliest)?, read_timestamp(&latest)?);
        if elapsed_hours <= 0.0 {
            return Err(AppError::Internal(format!(
                "completed cards for '{}' span no elapsed time",
                owner
            )));
        }
        Ok(worked / elapsed_hours)
    }

    pub fn in_progress_cards_for(&self, owner: &str) -> AppResult<Vec<InProgressCard>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT uuid, title, url, task_count_S, task_count_M, task_count_L, work_duration
             FROM cards
             WHERE is_complete = 0 AND owner = ?1
             ORDER BY uuid",
        )?;
        let cards = stmt
            .query_map(params![owner], |row| {
                Ok(InProgressCard {
                    identity: CardIdentity {
                        uuid: row.get(0)?,
                        title: row.get(1)?,
                        url: row.get(2)?,
                    },
                    tasks: TaskCounts::new(row.get(3)?, row.get(4)?, row.get(5)?),
                    hours_already_spent: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cards)
    }

    pub fn summary_report(&self) -> AppResult<Vec<SummaryRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT owner, is_complete,
               COUNT(*),
               AVG(task_count_S), AVG(task_count_M), AVG(task_count_L),
               COALESCE(SUM(work_duration), 0.0),
               MIN(work_began), MAX(work_ended)
             FROM cards
             GROUP BY owner, is_complete
             ORDER BY owner, is_complete",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let earliest_began = row
                    .get::<_, Option<String>>(7)?
                    .map(|raw| parse_time(&raw))
                    .transpose()?;
                let latest_ended = row
                    .get::<_, Option<String>>(8)?
                    .map(|raw| parse_time(&raw))
                    .transpose()?;
                let elapsed_hours = match (earliest_began, latest_ended) {
                    (Some(began), Some(ended)) => Some(hours_between(began, ended)),
                    _ => None,
                };
                Ok(SummaryRow {
                    owner: row.get(0)?,
                    is_complete: row.get::<_, i32>(1)? != 0,
                    card_count: row.get(2)?,
                    mean_s: row.get(3)?,
                    mean_m: row.get(4)?,
                    mean_l: row.get(5)?,
                    total_work_hours: row.get(6)?,
                    earliest_began,
                    latest_ended,
                    elapsed_hours,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn card_count(&self) -> AppResult<i64> {
        let conn = self.lock()?;
        let count = conn.query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Checks every card invariant. The schema repeats these as CHECK
/// constraints; this pass exists so failures carry a readable reason.
pub fn validate_card(record: &CardRecord, is_complete: bool) -> Result<(), ValidationError> {
    let fail = |reason: &str| -> Result<(), ValidationError> { Err(validation_error(record, reason.to_string())) };

    if record.uuid.trim().is_empty() {
        return fail("uuid must be non-empty");
    }
    if record.title.trim().is_empty() {
        return fail("title must be non-empty");
    }
    if record.owner.trim().is_empty() {
        return fail("owner must be non-empty");
    }
    if !URL_PATTERN.is_match(&record.url) {
        return fail("url must start with http:// or https://");
    }

    let tasks = record.tasks;
    if tasks.s < 0 || tasks.m < 0 || tasks.l < 0 {
        return fail("task counts must be non-negative");
    }
    if tasks.total() <= 0 {
        return fail("card must declare at least one sized task");
    }

    let began = match record.work_began.as_deref() {
        Some(raw) => match parse_timestamp(raw) {
            Some(value) => Some(value),
            None => return fail("work_began must be formatted YYYY-MM-DD HH:MM:SS"),
        },
        None => None,
    };
    let ended = match record.work_ended.as_deref() {
        Some(raw) => match parse_timestamp(raw) {
            Some(value) => Some(value),
            None => return fail("work_ended must be formatted YYYY-MM-DD HH:MM:SS"),
        },
        None => None,
    };
    if let (Some(began), Some(ended)) = (began, ended) {
        if began >= ended {
            return fail("work_began must precede work_ended");
        }
    }

    if is_complete {
        if began.is_none() {
            return fail("completed card requires work_began");
        }
        if ended.is_none() {
            return fail("completed card requires work_ended");
        }
        match record.work_duration {
            Some(hours) if hours.is_finite() && hours > 0.0 => {}
            Some(_) => return fail("work_duration must be positive"),
            None => return fail("completed card requires work_duration"),
        }
    } else if let Some(hours) = record.work_duration {
        if !hours.is_finite() || hours < 0.0 {
            return fail("work_duration must be non-negative");
        }
    }

    Ok(())
}

fn validation_error(record: &CardRecord, reason: String) -> ValidationError {
    ValidationError {
        reason,
        owner: record.owner.clone(),
        title: record.title.clone(),
        uuid: record.uuid.clone(),
    }
}

fn hours_between(began: NaiveDateTime, ended: NaiveDateTime) -> f64 {
    (ended - began).num_seconds() as f64 / 3600.0
}

fn read_timestamp(raw: &str) -> AppResult<NaiveDateTime> {
    parse_timestamp(raw).ok_or_else(|| AppError::Internal(format!("malformed stored timestamp '{}'", raw)))
}

fn parse_time(raw: &str) -> rusqlite::Result<NaiveDateTime> {
    parse_timestamp(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("malformed stored timestamp '{}'", raw),
            )),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::errors::AppError;
    use crate::models::{parse_timestamp, CardRecord, TaskCounts};
    use chrono::NaiveDateTime;

    fn completed_card() -> CardRecord {
        CardRecord {
            uuid: "54133ef4bfe96c5ca8a49446".to_string(),
            title: "Refill Honey Pot".to_string(),
            owner: "foobear".to_string(),
            url: "http://www.tired.com/".to_string(),
            tasks: TaskCounts::new(1, 0, 0),
            work_began: Some("1986-01-02 00:00:00".to_string()),
            work_ended: Some("1986-01-09 00:00:00".to_string()),
            work_duration: Some(40.0),
        }
    }

    fn in_progress_card() -> CardRecord {
        CardRecord {
            work_began: None,
            work_ended: None,
            work_duration: None,
            ..completed_card()
        }
    }

    fn cutoff(raw: &str) -> NaiveDateTime {
        parse_timestamp(raw).expect("cutoff")
    }

    fn assert_rejected(db: &Database, record: &CardRecord, is_complete: bool) {
        match db.insert_or_replace(record, is_complete) {
            Err(AppError::Validation(error)) => {
                assert_eq!(error.uuid, record.uuid);
                assert_eq!(error.owner, record.owner);
                assert_eq!(error.title, record.title);
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
        assert_eq!(db.card_count().expect("count"), 0);
    }

    #[test]
    fn accepts_completed_and_in_progress_cards() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("cards.db")).expect("db");

        db.insert_or_replace(&completed_card(), true).expect("insert completed");
        let mut other = in_progress_card();
        other.uuid = "in-progress-1".to_string();
        db.insert_or_replace(&other, false).expect("insert in progress");

        assert_eq!(db.card_count().expect("count"), 2);
    }

    #[test]
    fn rejects_missing_identity_fields() {
        let db = Database::open_in_memory().expect("db");

        assert_rejected(&db, &CardRecord { uuid: String::new(), ..completed_card() }, true);
        assert_rejected(&db, &CardRecord { owner: String::new(), ..completed_card() }, true);
        assert_rejected(&db, &CardRecord { title: "  ".to_string(), ..completed_card() }, true);
        assert_rejected(&db, &CardRecord { url: "ftp://example.com".to_string(), ..completed_card() }, true);
        assert_rejected(&db, &CardRecord { url: "https://".to_string(), ..completed_card() }, false);
    }

    #[test]
    fn rejects_bad_task_counts() {
        let db = Database::open_in_memory().expect("db");

        assert_rejected(&db, &CardRecord { tasks: TaskCounts::new(0, 0, 0), ..completed_card() }, true);
        assert_rejected(&db, &CardRecord { tasks: TaskCounts::new(0, 0, -1), ..completed_card() }, true);
        assert_rejected(&db, &CardRecord { tasks: TaskCounts::new(2, -1, 0), ..in_progress_card() }, false);
    }

    #[test]
    fn rejects_bad_completed_work_window() {
        let db = Database::open_in_memory().expect("db");

        assert_rejected(&db, &CardRecord { work_began: Some("bleep".to_string()), ..completed_card() }, true);
        assert_rejected(&db, &CardRecord { work_ended: Some("bloop".to_string()), ..completed_card() }, true);
        assert_rejected(&db, &CardRecord { work_began: None, ..completed_card() }, true);
        assert_rejected(&db, &CardRecord { work_ended: None, ..completed_card() }, true);
        assert_rejected(
            &db,
            &CardRecord {
                work_began: Some("1984-01-01 00:00:01".to_string()),
                work_ended: Some("1984-01-01 00:00:00".to_string()),
                ..completed_card()
            },
            true,
        );
        assert_rejected(
            &db,
            &CardRecord {
                work_began: Some("1984-01-01 00:00:00".to_string()),
                work_ended: Some("1984-01-01 00:00:00".to_string()),
                ..completed_card()
            },
            true,
        );
        assert_rejected(&db, &CardRecord { work_began: Some("1986-02-30 00:00:00".to_string()), ..completed_card() }, true);
    }

    #[test]
    fn rejects_bad_work_duration() {
        let db = Database::open_in_memory().expect("db");

        assert_rejected(&db, &CardRecord { work_duration: None, ..completed_card() }, true);
        assert_rejected(&db, &CardRecord { work_duration: Some(0.0), ..completed_card() }, true);
        assert_rejected(&db, &CardRecord { work_duration: Some(-3.0), ..completed_card() }, true);
        assert_rejected(&db, &CardRecord { work_duration: Some(f64::NAN), ..completed_card() }, true);
        assert_rejected(&db, &CardRecord { work_duration: Some(-1.0), ..in_progress_card() }, false);
    }

    #[test]
    fn same_uuid_replaces_instead_of_duplicating() {
        let db = Database::open_in_memory().expect("db");

        db.insert_or_replace(&in_progress_card(), false).expect("first insert");
        db.insert_or_replace(&completed_card(), true).expect("replace");

        assert_eq!(db.card_count().expect("count"), 1);
        assert!(db.in_progress_cards_for("foobear").expect("in progress").is_empty());
        assert_eq!(
            db.completed_cards_for("foobear", cutoff("1985-01-01 00:00:00"))
                .expect("completed")
                .len(),
            1
        );
    }

    #[test]
    fn owners_are_distinct_and_sorted() {
        let db = Database::open_in_memory().expect("db");
        for (uuid, owner) in [("c1", "zed"), ("c2", "amy"), ("c3", "zed"), ("c4", "bob")] {
            let record = CardRecord {
                uuid: uuid.to_string(),
                owner: owner.to_string(),
                ..in_progress_card()
            };
            db.insert_or_replace(&record, false).expect("insert");
        }

        assert_eq!(db.distinct_owners().expect("owners"), vec!["amy", "bob", "zed"]);
    }

    #[test]
    fn round_trips_task_counts_and_durations() {
        let db = Database::open_in_memory().expect("db");
        let completed = CardRecord {
            tasks: TaskCounts::new(2, 1, 3),
            work_duration: Some(12.5),
            ..completed_card()
        };
        let in_progress = CardRecord {
            uuid: "wip".to_string(),
            tasks: TaskCounts::new(0, 4, 1),
            work_duration: Some(3.25),
            ..in_progress_card()
        };
        db.insert_or_replace(&completed, true).expect("insert completed");
        db.insert_or_replace(&in_progress, false).expect("insert in progress");

        let done = db
            .completed_cards_for("foobear", cutoff("1986-01-01 00:00:00"))
            .expect("completed");
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].tasks, TaskCounts::new(2, 1, 3));
        assert_eq!(done[0].work_duration, 12.5);

        let open = db.in_progress_cards_for("foobear").expect("in progress");
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].identity.uuid, "wip");
        assert_eq!(open[0].identity.url, "http://www.tired.com/");
        assert_eq!(open[0].tasks, TaskCounts::new(0, 4, 1));
        assert_eq!(open[0].hours_already_spent, 3.25);
    }

    #[test]
    fn in_progress_without_duration_reports_zero_hours() {
        let db = Database::open_in_memory().expect("db");
        db.insert_or_replace(&in_progress_card(), false).expect("insert");

        let open = db.in_progress_cards_for("foobear").expect("in progress");
        assert_eq!(open[0].hours_already_spent, 0.0);
    }

    #[test]
    fn completed_cards_respect_cutoff() {
        let db = Database::open_in_memory().expect("db");
        db.insert_or_replace(&completed_card(), true).expect("insert");

        let after = db
            .completed_cards_for("foobear", cutoff("1986-01-03 00:00:00"))
            .expect("completed");
        assert!(after.is_empty());
        let on = db
            .completed_cards_for("foobear", cutoff("1986-01-02 00:00:00"))
            .expect("completed");
        assert_eq!(on.len(), 1);
    }

    #[test]
    fn at_work_ratio_is_zero_without_completed_cards() {
        let db = Database::open_in_memory().expect("db");
        db.insert_or_replace(&in_progress_card(), false).expect("insert");

        let ratio = db
            .at_work_ratio_for("foobear", cutoff("1980-01-01 00:00:00"))
            .expect("ratio");
        assert_eq!(ratio, 0.0);
        let ratio = db
            .at_work_ratio_for("nobody", cutoff("1980-01-01 00:00:00"))
            .expect("ratio");
        assert_eq!(ratio, 0.0);
    }

    #[test]
    fn at_work_ratio_spans_earliest_start_to_latest_end() {
        let db = Database::open_in_memory().expect("db");
        let first = CardRecord {
            uuid: "a".to_string(),
            work_began: Some("2024-03-01 00:00:00".to_string()),
            work_ended: Some("2024-03-02 00:00:00".to_string()),
            work_duration: Some(8.0),
            ..completed_card()
        };
        let second = CardRecord {
            uuid: "b".to_string(),
            work_began: Some("2024-03-03 00:00:00".to_string()),
            work_ended: Some("2024-03-05 00:00:00".to_string()),
            work_duration: Some(16.0),
            ..completed_card()
        };
        db.insert_or_replace(&first, true).expect("insert");
        db.insert_or_replace(&second, true).expect("insert");

        let ratio = db
            .at_work_ratio_for("foobear", cutoff("2024-01-01 00:00:00"))
            .expect("ratio");
        assert!((ratio - 24.0 / 96.0).abs() < 1e-12);
    }

    #[test]
    fn at_work_ratio_is_not_clamped() {
        let db = Database::open_in_memory().expect("db");
        let record = CardRecord {
            work_began: Some("2024-03-01 00:00:00".to_string()),
            work_ended: Some("2024-03-01 10:00:00".to_string()),
            work_duration: Some(20.0),
            ..completed_card()
        };
        db.insert_or_replace(&record, true).expect("insert");

        let ratio = db
            .at_work_ratio_for("foobear", cutoff("2024-01-01 00:00:00"))
            .expect("ratio");
        assert!((ratio - 2.0).abs() < 1e-12);
    }

    #[test]
    fn summary_groups_by_owner_and_state() {
        let db = Database::open_in_memory().expect("db");
        db.insert_or_replace(&completed_card(), true).expect("insert");
        let wip = CardRecord {
            uuid: "wip".to_string(),
            tasks: TaskCounts::new(0, 2, 0),
            ..in_progress_card()
        };
        db.insert_or_replace(&wip, false).expect("insert");

        let rows = db.summary_report().expect("summary");
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].is_complete);
        assert_eq!(rows[0].mean_m, 2.0);
        assert!(rows[0].elapsed_hours.is_none());
        assert!(rows[1].is_complete);
        assert_eq!(rows[1].card_count, 1);
        assert_eq!(rows[1].total_work_hours, 40.0);
        assert_eq!(rows[1].elapsed_hours, Some(168.0));
    }
}
