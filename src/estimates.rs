use crate::models::{SizeClass, TaskCounts};
use once_cell::sync::Lazy;
use regex::Regex;

static ESTIMATE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([SML])\]|\(([SML])\)").expect("valid estimate marker regex"));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskEstimate {
    pub tasks: TaskCounts,
    /// Checklist items that carried no size marker.
    pub unestimated_items: usize,
}

/// Counts `[S]`/`(S)`-style size markers in a card description and its
/// checklist items.
pub fn estimate_tasks<'a, I>(description: Option<&str>, checklist: I) -> TaskEstimate
where
    I: IntoIterator<Item = &'a str>,
{
    let mut estimate = TaskEstimate::default();
    if let Some(text) = description {
        count_markers(&mut estimate.tasks, text);
    }
    for item in checklist {
        if count_markers(&mut estimate.tasks, item) == 0 {
            estimate.unestimated_items += 1;
        }
    }
    estimate
}

fn count_markers(tasks: &mut TaskCounts, text: &str) -> usize {
    let mut found = 0;
    for captures in ESTIMATE_MARKER.captures_iter(text) {
        let marker = captures.get(1).or_else(|| captures.get(2)).map(|m| m.as_str());
        let size = match marker {
            Some("S") => SizeClass::S,
            Some("M") => SizeClass::M,
            Some("L") => SizeClass::L,
            _ => continue,
        };
        tasks.increment(size);
        found += 1;
    }
    found
}
