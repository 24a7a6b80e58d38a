use bincode::{Decode, Encode};
use std::fmt;
use std::time::SystemTime;
use thiserror::Error;
use uuid::Uuid;

/// Identifier of a stored clip (UUID v4, hyphenated)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct ItemId(String);

impl ItemId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        ItemId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, enough to tell items apart in listings
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        ItemId(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        ItemId(value)
    }
}

/// A clip stored in the list
#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub struct ClipItem {
    /// Store-assigned identifier
    pub id: ItemId,
    /// Clipboard text exactly as it was copied
    pub text: String,
    /// Assigned by the store when the item is appended
    pub created_at: SystemTime,
    /// Owner the item belongs to
    pub owner_id: String,
}

impl ClipItem {
    /// Create a new item stamped with the current time
    pub fn new(text: impl Into<String>, owner_id: impl Into<String>) -> Self {
        ClipItem {
            id: ItemId::generate(),
            text: text.into(),
            created_at: SystemTime::now(),
            owner_id: owner_id.into(),
        }
    }

    /// Get a preview string (first line, truncated for display)
    pub fn preview(&self, max_chars: usize) -> String {
        let first_line = self.text.lines().next().unwrap_or("");
        let more_lines = self.text.trim_end().contains('\n');

        match first_line.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &first_line[..cut]),
            None if more_lines => format!("{} ...", first_line),
            None => first_line.to_string(),
        }
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }
}

/// Why an id lookup did not resolve to exactly one clip
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("clip id must not be empty")]
    EmptyId,

    #[error("no clip matching '{0}'")]
    NotFound(String),

    #[error("clip id '{prefix}' is ambiguous ({matches} matches); use more characters")]
    Ambiguous { prefix: String, matches: usize },
}

/// Find the single clip whose id is `query` or starts with it
pub fn find_by_id_prefix<'a>(items: &'a [ClipItem], query: &str) -> Result<&'a ClipItem, LookupError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(LookupError::EmptyId);
    }

    if let Some(exact) = items.iter().find(|item| item.id.as_str() == query) {
        return Ok(exact);
    }

    let matches: Vec<&ClipItem> = items
        .iter()
        .filter(|item| item.id.as_str().starts_with(query))
        .collect();

    match matches.as_slice() {
        [] => Err(LookupError::NotFound(query.to_string())),
        [item] => Ok(*item),
        _ => Err(LookupError::Ambiguous {
            prefix: query.to_string(),
            matches: matches.len(),
        }),
    }
}
