use crate::errors::{AppError, AppResult};
use crate::models::parse_loose_timestamp;
use chrono::NaiveDateTime;
use serde::Deserialize;

/// A board action as the fetcher stores it in a card snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub date: String,
    #[serde(default)]
    pub data: ActionData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionData {
    #[serde(default)]
    pub list: Option<ListRef>,
    #[serde(default, rename = "listBefore")]
    pub list_before: Option<ListRef>,
    #[serde(default, rename = "listAfter")]
    pub list_after: Option<ListRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Movement of a card between board lists. Action kinds outside this set
/// are rejected when parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListTransition {
    /// Card created, copied, or moved onto the board into `target`.
    CreatedOrMoved { target: ListRef },
    /// Card moved from `source` to `target`.
    Updated { source: ListRef, target: ListRef },
}

impl ListTransition {
    pub fn source_id(&self) -> Option<&str> {
        match self {
            Self::CreatedOrMoved { .. } => None,
            Self::Updated { source, .. } => Some(&source.id),
        }
    }

    pub fn target_id(&self) -> &str {
        match self {
            Self::CreatedOrMoved { target } | Self::Updated { target, .. } => &target.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardAction {
    pub date: NaiveDateTime,
    pub transition: ListTransition,
}

impl BoardAction {
    /// True when `next` happens later and starts from the list this action
    /// left the card in.
    pub fn followed_by(&self, next: &BoardAction) -> bool {
        self.date < next.date && next.transition.source_id() == Some(self.transition.target_id())
    }
}

impl TryFrom<RawAction> for BoardAction {
    type Error = AppError;

    fn try_from(raw: RawAction) -> AppResult<Self> {
        let date = parse_loose_timestamp(&raw.date)
            .ok_or_else(|| AppError::Malformed(format!("{} action has unreadable date '{}'", raw.kind, raw.date)))?;
        let missing = |field: &str| AppError::Malformed(format!("{} action is missing {}", raw.kind, field));

        let transition = match raw.kind.as_str() {
            "createCard" | "copyCard" | "moveCardToBoard" => ListTransition::CreatedOrMoved {
                target: raw.data.list.clone().ok_or_else(|| missing("list"))?,
            },
            "updateCard" => ListTransition::Updated {
                source: raw.data.list_before.clone().ok_or_else(|| missing("listBefore"))?,
                target: raw.data.list_after.clone().ok_or_else(|| missing("listAfter"))?,
            },
            other => return Err(AppError::UnknownAction(other.to_string())),
        };
        Ok(Self { date, transition })
    }
}

/// Parses every raw action and orders the result by date.
pub fn parse_actions(raw: Vec<RawAction>) -> AppResult<Vec<BoardAction>> {
    let mut actions = raw
        .into_iter()
        .map(BoardAction::try_from)
        .collect::<AppResult<Vec<_>>>()?;
    actions.sort_by_key(|action| action.date);
    Ok(actions)
}

/// First entry into `begins_list` and last entry into `ends_list`.
pub fn work_window(
    actions: &[BoardAction],
    begins_list: &str,
    ends_list: &str,
) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
    let began = actions
        .iter()
        .find(|action| action.transition.target_id() == begins_list)
        .map(|action| action.date);
    let ended = actions
        .iter()
        .rev()
        .find(|action| action.transition.target_id() == ends_list)
        .map(|action| action.date);
    (began, ended)
}

/// Consecutive pairs that do not chain list-to-list.
pub fn incongruous_count(actions: &[BoardAction]) -> usize {
    actions
        .windows(2)
        .filter(|pair| !pair[0].followed_by(&pair[1]))
        .count()
}
