use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::TaskWeights;
use crate::velocity::{combined_size, VelocityModel};
use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta};
use rand::Rng;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

pub const DEFAULT_TRIAL_COUNT: usize = 10_000;
pub const DEFAULT_LOOKBACK_DAYS: i64 = 90;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// How the cumulative columns of the ship-date table are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableFormat {
    /// Running number of trials finished by each date.
    Count,
    /// Running share of trials finished by each date, rounded to whole percent.
    #[default]
    Percent,
}

/// Monte Carlo driver. `simulate` consumes the engine and yields a
/// [`ShipDateTable`]; writing the table consumes it in turn.
pub struct ForecastEngine<'a> {
    storage: &'a Database,
    weights: &'a TaskWeights,
    trial_count: usize,
    lookback_days: i64,
    now: NaiveDateTime,
}

impl<'a> ForecastEngine<'a> {
    pub fn new(storage: &'a Database, weights: &'a TaskWeights, trial_count: usize) -> Self {
        Self {
            storage,
            weights,
            trial_count,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            now: Local::now().naive_local(),
        }
    }

    /// Evaluation time; trials start from here and the lookback window ends here.
    pub fn at(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    pub fn lookback_days(mut self, days: i64) -> Self {
        self.lookback_days = days;
        self
    }

    pub fn simulate<R: Rng + ?Sized>(self, rng: &mut R) -> AppResult<ShipDateTable> {
        if self.trial_count == 0 {
            return Err(AppError::Config("trial count must be positive".to_string()));
        }
        let cutoff = TimeDelta::try_days(self.lookback_days)
            .and_then(|window| self.now.checked_sub_signed(window))
            .ok_or_else(|| AppError::Config(format!("lookback of {} days is out of range", self.lookback_days)))?;

        let mut owners = Vec::new();
        let mut counts = Vec::new();
        for owner in self.storage.distinct_owners()? {
            let model = VelocityModel::build(self.storage, self.weights, &owner, cutoff)?;
            let cards = self.storage.in_progress_cards_for(&owner)?;
            if !cards.is_empty() && model.count() == 0 {
                return Err(AppError::InsufficientData { owner });
            }
            tracing::info!(
                owner = %owner,
                trials = self.trial_count,
                in_progress = cards.len(),
                samples = model.count(),
                "simulating owner"
            );

            let sizes = cards
                .iter()
                .map(|card| (combined_size(&card.tasks, self.weights), card.hours_already_spent))
                .collect::<Vec<_>>();
            let mut by_date: BTreeMap<NaiveDate, u64> = BTreeMap::new();
            for _ in 0..self.trial_count {
                let date = if sizes.is_empty() {
                    self.now.date()
                } else {
                    let mut remaining_hours = 0.0;
                    for (size, spent) in &sizes {
                        remaining_hours += size / model.sample(rng)? - spent;
                    }
                    completion_date(self.now, remaining_hours, model.at_work_ratio())
                        .ok_or_else(|| AppError::UnboundedForecast { owner: owner.clone() })?
                };
                *by_date.entry(date).or_insert(0) += 1;
            }

            tracing::info!(owner = %owner, distinct_dates = by_date.len(), "finished owner");
            owners.push(owner);
            counts.push(by_date);
        }

        Ok(ShipDateTable {
            owners,
            counts,
            trial_count: self.trial_count,
        })
    }
}

/// Calendar date reached after `remaining_hours` of work at the given
/// at-work ratio. `None` when the offset is not finite or leaves the calendar.
fn completion_date(now: NaiveDateTime, remaining_hours: f64, at_work_ratio: f64) -> Option<NaiveDate> {
    let days = remaining_hours / at_work_ratio / 24.0;
    if !days.is_finite() {
        return None;
    }
    let offset = TimeDelta::try_milliseconds((days * MILLIS_PER_DAY).round() as i64)?;
    now.checked_add_signed(offset).map(|finished| finished.date())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CumulativeRow {
    pub date: NaiveDate,
    /// Trials finished on or before `date`, one entry per owner in discovery order.
    pub counts: Vec<u64>,
}

/// Per-owner trial counts keyed by completion date.
#[derive(Debug, Clone)]
pub struct ShipDateTable {
    owners: Vec<String>,
    counts: Vec<BTreeMap<NaiveDate, u64>>,
    trial_count: usize,
}

impl ShipDateTable {
    pub fn owners(&self) -> &[String] {
        &self.owners
    }

    pub fn trial_count(&self) -> usize {
        self.trial_count
    }

    /// Trials for `owner` that finished exactly on `date`.
    pub fn count_on(&self, date: NaiveDate, owner: &str) -> u64 {
        self.owners
            .iter()
            .position(|candidate| candidate == owner)
            .and_then(|index| self.counts[index].get(&date).copied())
            .unwrap_or(0)
    }

    pub fn cumulative_rows(&self) -> Vec<CumulativeRow> {
        let dates = self
            .counts
            .iter()
            .flat_map(|by_date| by_date.keys().copied())
            .collect::<BTreeSet<_>>();

        let mut running = vec![0u64; self.owners.len()];
        dates
            .into_iter()
            .map(|date| {
                for (total, by_date) in running.iter_mut().zip(&self.counts) {
                    *total += by_date.get(&date).copied().unwrap_or(0);
                }
                CumulativeRow {
                    date,
                    counts: running.clone(),
                }
            })
            .collect()
    }

    /// Tab-separated table: a `Date` header followed by owners, then one row
    /// per completion date (`MM/DD/YYYY`, ascending).
    pub fn write<W: Write + ?Sized>(self, out: &mut W, format: TableFormat) -> AppResult<()> {
        writeln!(out, "Date\t{}", self.owners.join("\t"))?;
        for row in self.cumulative_rows() {
            let cells = row
                .counts
                .iter()
                .map(|count| match format {
                    TableFormat::Count => count.to_string(),
                    TableFormat::Percent => {
                        ((*count as f64) * 100.0 / self.trial_count as f64).round().to_string()
                    }
                })
                .collect::<Vec<_>>();
            if cells.is_empty() {
                writeln!(out, "{}", row.date.format("%m/%d/%Y"))?;
            } else {
                writeln!(out, "{}\t{}", row.date.format("%m/%d/%Y"), cells.join("\t"))?;
            }
        }
        out.flush()?;
        Ok(())
    }
}
