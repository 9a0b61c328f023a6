use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{SizeClass, TaskCounts, TaskWeights};
use chrono::NaiveDateTime;
use rand::Rng;
use std::sync::Arc;

/// Weighted sum of a card's task counts.
pub fn combined_size(tasks: &TaskCounts, weights: &TaskWeights) -> f64 {
    SizeClass::ALL
        .iter()
        .map(|size| weights.get(*size) * tasks.get(*size) as f64)
        .sum()
}

/// Empirical points-per-hour distribution for one owner.
///
/// Samples are sorted ascending once at construction and never mutated, so
/// quantiles are plain index lookups and resampling is a uniform pick.
#[derive(Debug, Clone)]
pub struct VelocityModel {
    owner: String,
    samples: Arc<[f64]>,
    at_work_ratio: f64,
}

impl VelocityModel {
    pub fn build(storage: &Database, weights: &TaskWeights, owner: &str, cutoff: NaiveDateTime) -> AppResult<Self> {
        let samples = storage
            .completed_cards_for(owner, cutoff)?
            .iter()
            .map(|card| combined_size(&card.tasks, weights) / card.work_duration)
            .collect::<Vec<_>>();
        let at_work_ratio = storage.at_work_ratio_for(owner, cutoff)?;
        let model = Self::from_samples(owner, samples, at_work_ratio);
        tracing::debug!(
            owner = %owner,
            count = model.count(),
            median = ?model.median(),
            at_work_ratio = model.at_work_ratio,
            "built velocity model"
        );
        Ok(model)
    }

    pub fn from_samples(owner: &str, mut samples: Vec<f64>, at_work_ratio: f64) -> Self {
        samples.sort_by(|a, b| a.total_cmp(b));
        Self {
            owner: owner.to_string(),
            samples: samples.into(),
            at_work_ratio,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn at_work_ratio(&self) -> f64 {
        self.at_work_ratio
    }

    /// Bootstrap draw: one observed velocity, chosen uniformly.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> AppResult<f64> {
        if self.samples.is_empty() {
            return Err(AppError::InsufficientData {
                owner: self.owner.clone(),
            });
        }
        let index = rng.random_range(0..self.samples.len());
        Ok(self.samples[index])
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn min(&self) -> Option<f64> {
        self.samples.first().copied()
    }

    pub fn q1(&self) -> Option<f64> {
        self.at_index(self.samples.len() / 4)
    }

    pub fn median(&self) -> Option<f64> {
        self.at_index(self.samples.len() / 2)
    }

    pub fn q3(&self) -> Option<f64> {
        self.at_index(self.samples.len() * 3 / 4)
    }

    pub fn max(&self) -> Option<f64> {
        self.samples.last().copied()
    }

    fn at_index(&self, index: usize) -> Option<f64> {
        self.samples.get(index).copied()
    }
}
