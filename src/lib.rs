//! Ship-date forecasting for in-progress cards.
//!
//! Completed cards in [`db::Database`] give each owner an empirical velocity
//! distribution ([`velocity::VelocityModel`]); [`forecast::ForecastEngine`]
//! resamples it to simulate many futures and tabulates completion dates.

pub mod actions;
pub mod config;
pub mod db;
pub mod errors;
pub mod estimates;
pub mod forecast;
pub mod ingest;
pub mod models;
pub mod report;
pub mod telemetry;
pub mod velocity;

pub use crate::db::Database;
pub use crate::errors::{AppError, AppResult, ValidationError};
pub use crate::forecast::{ForecastEngine, ShipDateTable, TableFormat};
pub use crate::models::{CardRecord, TaskCounts, TaskWeights};
pub use crate::velocity::{combined_size, VelocityModel};
