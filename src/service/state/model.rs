use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::service::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Inside,
    InsideSecret,
    Outside,
    Going,
}

impl UserStatus {
    pub fn is_inside(&self) -> bool {
        matches!(self, UserStatus::Inside | UserStatus::InsideSecret)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Inside => "inside",
            UserStatus::InsideSecret => "inside_secret",
            UserStatus::Outside => "outside",
            UserStatus::Going => "going",
        }
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inside" => Ok(UserStatus::Inside),
            "inside_secret" => Ok(UserStatus::InsideSecret),
            "outside" => Ok(UserStatus::Outside),
            "going" => Ok(UserStatus::Going),
            _ => Err(format!("Unknown user status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Manual,
    Force,
    Auto,
    Opened,
    Evicted,
    TimedOut,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Manual => "manual",
            ChangeType::Force => "force",
            ChangeType::Auto => "auto",
            ChangeType::Opened => "opened",
            ChangeType::Evicted => "evicted",
            ChangeType::TimedOut => "timed_out",
        }
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(ChangeType::Manual),
            "force" => Ok(ChangeType::Force),
            "auto" => Ok(ChangeType::Auto),
            "opened" => Ok(ChangeType::Opened),
            "evicted" => Ok(ChangeType::Evicted),
            "timed_out" => Ok(ChangeType::TimedOut),
            _ => Err(format!("Unknown change type: {}", s)),
        }
    }
}

/// One immutable presence fact. The newest record per user is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: u64,
    pub status: UserStatus,
    pub date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    pub change_type: ChangeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub user: User,
}

impl UserState {
    pub fn new(user: &User, status: UserStatus, change_type: ChangeType, date: DateTime<Utc>) -> Self {
        Self {
            id: None,
            user_id: user.id,
            status,
            date,
            until: None,
            change_type,
            note: None,
            user: user.clone(),
        }
    }

    pub fn until(mut self, until: Option<DateTime<Utc>>) -> Self {
        self.until = until;
        self
    }

    pub fn note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status.is_inside() && self.until.is_some_and(|until| until < now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub open: bool,
    pub date: DateTime<Utc>,
    pub changer_id: u64,
}

/// A closed `Inside -> Outside|Going` interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
    pub user_id: u64,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Visit {
    pub fn duration(&self) -> Duration {
        self.to - self.from
    }
}
