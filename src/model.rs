use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use ts_rs::TS;

use crate::{
    error::{VALIDATION_HEADLINE_REQUIRED, VALIDATION_INVALID_ID, VALIDATION_LIST_ID},
    AppError, AppResult,
};

pub type TodoId = i64;

static LIST_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("list id pattern to compile"));

/// Identifies one ordered list. Positions are dense per list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(try_from = "String", into = "String")]
#[ts(export)]
pub struct ListId(String);

impl ListId {
    pub const DEFAULT: &'static str = "default";

    pub fn parse(raw: &str) -> AppResult<Self> {
        if LIST_ID_PATTERN.is_match(raw) {
            Ok(ListId(raw.to_string()))
        } else {
            Err(AppError::validation(
                VALIDATION_LIST_ID,
                "List ids use 1-64 letters, digits, '-' or '_'",
            )
            .with_context("list_id", raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ListId {
    fn default() -> Self {
        ListId(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ListId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ListId::parse(&value)
    }
}

impl From<ListId> for String {
    fn from(value: ListId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TodoItem {
    #[ts(type = "number")]
    pub id: TodoId,
    pub list_id: ListId,
    pub headline: String,
    pub description: String,
    pub done: bool,
    #[ts(type = "number")]
    pub position: i64,
    #[ts(type = "number")]
    pub created_at: i64,
}

impl TryFrom<&SqliteRow> for TodoItem {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let list_id: String = row.try_get("list_id").map_err(AppError::from)?;
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            list_id: ListId::parse(&list_id)?,
            headline: row.try_get("headline").map_err(AppError::from)?,
            description: row.try_get("description").map_err(AppError::from)?,
            done: row
                .try_get::<i64, _>("done")
                .map(|value| value != 0)
                .map_err(AppError::from)?,
            position: row.try_get("position").map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
        })
    }
}

/// Payload for creating a todo. The store assigns id, position and created_at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewTodo {
    pub headline: String,
    pub description: String,
    #[serde(default)]
    pub done: bool,
}

impl NewTodo {
    pub fn new(headline: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            description: description.into(),
            done: false,
        }
    }

    /// Trims the headline and rejects it when nothing is left.
    pub fn validated(mut self) -> AppResult<Self> {
        self.headline = validate_headline(&self.headline)?;
        Ok(self)
    }
}

/// Partial update. `id`, `position` and `created_at` are not patchable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct TodoPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub done: Option<bool>,
}

impl TodoPatch {
    pub fn done(done: bool) -> Self {
        Self {
            done: Some(done),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.headline.is_none() && self.description.is_none() && self.done.is_none()
    }

    pub fn validated(mut self) -> AppResult<Self> {
        if let Some(headline) = self.headline.take() {
            self.headline = Some(validate_headline(&headline)?);
        }
        Ok(self)
    }

    /// Applies the patch to an in-memory item.
    pub fn apply_to(&self, item: &mut TodoItem) {
        if let Some(headline) = &self.headline {
            item.headline = headline.clone();
        }
        if let Some(description) = &self.description {
            item.description = description.clone();
        }
        if let Some(done) = self.done {
            item.done = done;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MoveRequest {
    #[ts(type = "number")]
    pub from_id: TodoId,
    #[ts(type = "number")]
    pub to_id: TodoId,
}

pub fn validate_headline(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(
            VALIDATION_HEADLINE_REQUIRED,
            "A todo needs a headline",
        ));
    }
    Ok(trimmed.to_string())
}

pub fn validate_id(raw: TodoId, field: &str) -> AppResult<TodoId> {
    if raw > 0 {
        Ok(raw)
    } else {
        Err(
            AppError::validation(VALIDATION_INVALID_ID, "Ids are positive integers")
                .with_context("field", field.to_string())
                .with_context("value", raw.to_string()),
        )
    }
}
