//! Doctor–patient conversation rows and their lifecycle.
//!
//! ```text
//!   active ──conclude──▶ concluded ──reopen (doctor|patient)──▶ active
//!     │                      │
//!     └──block──▶ blocked ◀──┘
//!                    │
//!                    └──reopen (doctor)──▶ active
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which side of the conversation is acting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    Doctor,
    Patient,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Doctor => "doctor",
            ActorKind::Patient => "patient",
        }
    }
}

impl FromStr for ActorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doctor" => Ok(ActorKind::Doctor),
            "patient" => Ok(ActorKind::Patient),
            other => Err(format!("unknown actor kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Concluded,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationAction {
    Conclude,
    Block,
    Reopen,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("A {actor} cannot {action} this conversation")]
    NotPermitted {
        action: ConversationAction,
        actor: &'static str,
    },
    #[error("Cannot {action} a conversation that is {from}")]
    Invalid {
        action: ConversationAction,
        from: ConversationStatus,
    },
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Concluded => "concluded",
            ConversationStatus::Blocked => "blocked",
        }
    }

    /// Applies `action` by `actor`. Actor permission is checked before the
    /// source state so a patient probing a blocked thread learns nothing.
    pub fn transition(
        self,
        action: ConversationAction,
        actor: ActorKind,
    ) -> Result<ConversationStatus, TransitionError> {
        use ConversationAction::*;
        use ConversationStatus::*;

        let permitted = match (action, actor) {
            (Conclude | Block, ActorKind::Doctor) => true,
            (Conclude | Block, ActorKind::Patient) => false,
            (Reopen, ActorKind::Doctor) => true,
            (Reopen, ActorKind::Patient) => self != Blocked,
        };
        if !permitted {
            return Err(TransitionError::NotPermitted {
                action,
                actor: actor.as_str(),
            });
        }

        match (self, action) {
            (Active, Conclude) => Ok(Concluded),
            (Active | Concluded, Block) => Ok(Blocked),
            (Concluded | Blocked, Reopen) => Ok(Active),
            (from, action) => Err(TransitionError::Invalid { action, from }),
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ConversationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConversationAction::Conclude => "conclude",
            ConversationAction::Block => "block",
            ConversationAction::Reopen => "reopen",
        })
    }
}

impl FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ConversationStatus::Active),
            "concluded" => Ok(ConversationStatus::Concluded),
            "blocked" => Ok(ConversationStatus::Blocked),
            other => Err(format!("unknown conversation status '{}'", other)),
        }
    }
}

/// Row as stored. `status` and `created_by` stay text at the SQL boundary.
#[derive(Debug, Clone, FromRow)]
pub struct ConversationRow {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub status: String,
    pub subject: Option<String>,
    pub created_by: String,
    pub concluded_at: Option<DateTime<Utc>>,
    pub blocked_at: Option<DateTime<Utc>>,
    pub blocked_by: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub status: ConversationStatus,
    pub subject: Option<String>,
    pub created_by: ActorKind,
    pub concluded_at: Option<DateTime<Utc>>,
    pub blocked_at: Option<DateTime<Utc>>,
    pub blocked_by: Option<Uuid>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ConversationRow> for Conversation {
    type Error = String;

    fn try_from(row: ConversationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            doctor_id: row.doctor_id,
            patient_id: row.patient_id,
            status: row.status.parse()?,
            subject: row.subject,
            created_by: row.created_by.parse()?,
            concluded_at: row.concluded_at,
            blocked_at: row.blocked_at,
            blocked_by: row.blocked_by,
            last_message_at: row.last_message_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl Conversation {
    pub fn has_participant(&self, actor: ActorKind, id: Uuid) -> bool {
        match actor {
            ActorKind::Doctor => self.doctor_id == id,
            ActorKind::Patient => self.patient_id == id,
        }
    }
}

/// List entry with the caller's unread count
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub unread_count: i64,
}
