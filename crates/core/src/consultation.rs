//! Consultation domain types: users, chambers, and turns.
//!
//! A user owns chambers; a chamber owns an ordered list of turns.
//! Turns are immutable once appended and are destroyed only with their chamber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifier of a chamber (conversation thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChamberId(pub i64);

impl std::fmt::Display for ChamberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChamberId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(ChamberId)
    }
}

/// An authenticated user, keyed by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A named conversation thread owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chamber {
    pub id: ChamberId,

    /// Owner
    pub email: String,

    pub title: String,

    /// Overrides the configured default persona when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,

    /// Overrides the configured default answer language when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// The value stored in the `turns.role` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// A single user or assistant message within a chamber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub chamber_id: ChamberId,

    /// Position within the chamber, starting at 1 with no gaps
    pub seq: i64,

    pub role: Role,

    /// Stored verbatim as submitted or returned
    pub content: String,

    pub created_at: DateTime<Utc>,
}
