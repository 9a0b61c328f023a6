use crate::errors::AppResult;
use crate::models::{format_timestamp, SummaryRow};
use crate::velocity::VelocityModel;
use chrono::NaiveDateTime;
use std::io::Write;

pub fn write_summary<W: Write + ?Sized>(out: &mut W, rows: &[SummaryRow]) -> AppResult<()> {
    writeln!(
        out,
        "{:<14} {:>4} {:>4} {:>4} {:>4} {:>4} {:>8} {:>8}  {:<19}  {:<19}",
        "owner", "N", "Nc", "mS", "mM", "mL", "hours", "elapsed", "earliest began", "latest end"
    )?;
    for row in rows {
        let completed = if row.is_complete { row.card_count } else { 0 };
        writeln!(
            out,
            "{:<14} {:>4} {:>4} {:>4.1} {:>4.1} {:>4.1} {:>8.1} {:>8}  {:<19}  {:<19}",
            row.owner,
            row.card_count,
            completed,
            row.mean_s,
            row.mean_m,
            row.mean_l,
            row.total_work_hours,
            row.elapsed_hours
                .map(|hours| format!("{:.1}", hours))
                .unwrap_or_else(|| "-".to_string()),
            timestamp_cell(row.earliest_began),
            timestamp_cell(row.latest_ended),
        )?;
    }
    Ok(())
}

fn timestamp_cell(value: Option<NaiveDateTime>) -> String {
    value.map(format_timestamp).unwrap_or_else(|| "-".to_string())
}

pub fn write_velocity_stats<W: Write + ?Sized>(out: &mut W, models: &[VelocityModel]) -> AppResult<()> {
    writeln!(out, "Owner\tMin\tQ1\tQ3\tMax\tMedian\tCount")?;
    for model in models {
        let cells = [model.min(), model.q1(), model.q3(), model.max(), model.median()]
            .iter()
            .map(|value| match value {
                Some(velocity) => format!("{:.4}", velocity),
                None => "-".to_string(),
            })
            .collect::<Vec<_>>();
        writeln!(out, "{}\t{}\t{}", model.owner(), cells.join("\t"), model.count())?;
    }
    Ok(())
}
