//! Turn log — ordered conversation history with in-place transcript correction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single finalized utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID (stable across in-place transcript corrections).
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    /// Streaming transcript item this turn was finalized from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Create a new turn with a fresh ID.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            transcript_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Tag the turn with the transcript item it came from.
    pub fn with_transcript_id(mut self, transcript_id: impl Into<String>) -> Self {
        self.transcript_id = Some(transcript_id.into());
        self
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// What `TurnLog::append` did with a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new turn was added at this index.
    Inserted { index: usize, id: Uuid },
    /// An existing turn with the same transcript ID was corrected in place.
    Updated { index: usize, id: Uuid },
}

impl AppendOutcome {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Inserted { id, .. } | Self::Updated { id, .. } => *id,
        }
    }
}

/// Append-only ordered conversation history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnLog {
    turns: Vec<Turn>,
}

impl TurnLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn, or correct the text of the turn sharing its transcript ID.
    ///
    /// Out-of-order or duplicate finalization events for the same transcript
    /// item collapse onto one entry. A transcript ID with no match is appended.
    pub fn append(&mut self, turn: Turn) -> AppendOutcome {
        if let Some(ref transcript_id) = turn.transcript_id {
            if let Some(index) = self
                .turns
                .iter()
                .position(|t| t.transcript_id.as_deref() == Some(transcript_id.as_str()))
            {
                let existing = &mut self.turns[index];
                existing.text = turn.text;
                return AppendOutcome::Updated {
                    index,
                    id: existing.id,
                };
            }
        }

        let id = turn.id;
        self.turns.push(turn);
        AppendOutcome::Inserted {
            index: self.turns.len() - 1,
            id,
        }
    }

    /// Remove an optimistic turn that turned out to be premature.
    ///
    /// Returns `false` if the turn is already gone.
    pub fn retract(&mut self, id: Uuid) -> bool {
        let before = self.turns.len();
        self.turns.retain(|t| t.id != id);
        self.turns.len() != before
    }

    /// Explicit user edit of a turn's text.
    pub fn edit(&mut self, id: Uuid, text: impl Into<String>) -> Result<(), SessionError> {
        let turn = self
            .turns
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(SessionError::UnknownTurn { id })?;
        turn.text = text.into();
        Ok(())
    }

    /// Explicit user deletion of a turn.
    pub fn remove(&mut self, id: Uuid) -> Result<Turn, SessionError> {
        let index = self
            .turns
            .iter()
            .position(|t| t.id == id)
            .ok_or(SessionError::UnknownTurn { id })?;
        Ok(self.turns.remove(index))
    }

    pub fn get(&self, id: Uuid) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id == id)
    }

    /// The trailing `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn user_turn_count(&self) -> usize {
        self.turns.iter().filter(|t| t.is_user()).count()
    }

    pub fn last_id(&self) -> Option<Uuid> {
        self.turns.last().map(|t| t.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn as_slice(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
