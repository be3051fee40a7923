//! Ledger rows and the punishment audit log
//!
//! The punishment log is append-only and is the source of truth. Warning
//! counts and ban rows are current-state caches that can always be rebuilt
//! from it with [`rebuild_ledger`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::moderation::escalation::WARNING_THRESHOLD;
use crate::moderation::{ChatId, TaskType, UserId};

/// Kind of action recorded in the punishment log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PunishmentKind {
    Ban,
    Kick,
    Mute,
    Warn,
    Unban,
    Unmute,
    Unwarn,
}

impl PunishmentKind {
    /// Map a task type to the log kind it writes, if any
    #[must_use]
    pub fn for_task(task_type: TaskType) -> Option<Self> {
        match task_type {
            TaskType::Ban => Some(Self::Ban),
            TaskType::Kick => Some(Self::Kick),
            TaskType::Mute => Some(Self::Mute),
            TaskType::Warn => Some(Self::Warn),
            TaskType::Unban => Some(Self::Unban),
            TaskType::Unmute => Some(Self::Unmute),
            TaskType::Unwarn => Some(Self::Unwarn),
            TaskType::Info => None,
        }
    }
}

impl fmt::Display for PunishmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ban => write!(f, "Ban"),
            Self::Kick => write!(f, "Kick"),
            Self::Mute => write!(f, "Mute"),
            Self::Warn => write!(f, "Warning"),
            Self::Unban => write!(f, "Unban"),
            Self::Unmute => write!(f, "Unmute"),
            Self::Unwarn => write!(f, "Warning removed"),
        }
    }
}

/// Current warning count of a user in one chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningRecord {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub count: u32,
}

/// A user banned in one chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub reason: String,
}

/// One immutable row of the audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunishmentEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub kind: PunishmentKind,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub duration_minutes: Option<u32>,
    pub moderator_id: Option<UserId>,
}

impl PunishmentEntry {
    pub fn new(
        user_id: UserId,
        chat_id: ChatId,
        kind: PunishmentKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            chat_id,
            kind,
            reason: reason.into(),
            timestamp: Utc::now(),
            duration_minutes: None,
            moderator_id: None,
        }
    }

    #[must_use]
    pub fn with_moderator(mut self, moderator_id: UserId) -> Self {
        self.moderator_id = Some(moderator_id);
        self
    }

    #[must_use]
    pub fn with_duration(mut self, minutes: Option<u32>) -> Self {
        self.duration_minutes = minutes;
        self
    }
}

/// Current state derived from a punishment log
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Ledger {
    pub warnings: HashMap<(UserId, ChatId), u32>,
    pub bans: HashMap<(UserId, ChatId), String>,
}

/// Replay a punishment log, oldest first, into warning counts and ban rows
pub fn rebuild_ledger<'a>(entries: impl IntoIterator<Item = &'a PunishmentEntry>) -> Ledger {
    let mut ledger = Ledger::default();

    for entry in entries {
        let key = (entry.user_id, entry.chat_id);
        match entry.kind {
            PunishmentKind::Warn => {
                let count = ledger.warnings.entry(key).or_insert(0);
                *count = (*count + 1).min(WARNING_THRESHOLD);
            }
            PunishmentKind::Unwarn => {
                if let Some(count) = ledger.warnings.get_mut(&key) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ledger.warnings.remove(&key);
                    }
                }
            }
            PunishmentKind::Ban => {
                ledger.bans.insert(key, entry.reason.clone());
            }
            PunishmentKind::Unban => {
                ledger.bans.remove(&key);
            }
            PunishmentKind::Kick | PunishmentKind::Mute | PunishmentKind::Unmute => {}
        }
    }

    ledger
}
