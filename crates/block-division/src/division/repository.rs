use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::basis::{ParticipantIndex, RoundIndex};
use super::state::DivisionState;

/// Caller-chosen identifier of a hosted division.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DivisionId(pub String);

impl fmt::Display for DivisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Repository record wrapping a division with hosting metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivisionRecord {
    pub id: DivisionId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: DivisionState,
}

impl DivisionRecord {
    pub fn new(id: DivisionId, state: DivisionState) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            state,
        }
    }

    pub fn summary(&self) -> DivisionSummary {
        let basis = self.state.basis();
        DivisionSummary {
            id: self.id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            bucket_count: basis.bucket_count(),
            participant_count: basis.participant_count(),
            round_count: basis.round_count(),
            resolved_rounds: self.state.resolved_rounds(),
            current_open_round: self.state.current_open_round(),
            phases: self
                .state
                .round_phases()
                .iter()
                .map(|phase| phase.label())
                .collect(),
        }
    }
}

/// Listing row exposed by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DivisionSummary {
    pub id: DivisionId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub bucket_count: usize,
    pub participant_count: usize,
    pub round_count: usize,
    pub resolved_rounds: usize,
    pub current_open_round: Option<RoundIndex>,
    pub phases: Vec<&'static str>,
}

/// Storage abstraction so the service module can be exercised in isolation.
pub trait DivisionRepository: Send + Sync {
    fn insert(&self, record: DivisionRecord) -> Result<DivisionRecord, RepositoryError>;
    fn update(&self, record: DivisionRecord) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &DivisionId) -> Result<Option<DivisionRecord>, RepositoryError>;
    fn list(&self) -> Result<Vec<DivisionRecord>, RepositoryError>;
    fn delete(&self, id: &DivisionId) -> Result<(), RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("division already exists")]
    Conflict,
    #[error("division not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification hook (e-mail, chat, queue adapters).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, event: DivisionEvent) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionEvent {
    pub division_id: DivisionId,
    pub kind: DivisionEventKind,
    pub recipients: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DivisionEventKind {
    RoundOpened {
        round: RoundIndex,
        round_name: String,
    },
    RoundClosed {
        round: RoundIndex,
    },
    DivisionComplete,
    AccessInvite {
        participant: ParticipantIndex,
    },
}

impl DivisionEventKind {
    pub const fn label(&self) -> &'static str {
        match self {
            DivisionEventKind::RoundOpened { .. } => "round_opened",
            DivisionEventKind::RoundClosed { .. } => "round_closed",
            DivisionEventKind::DivisionComplete => "division_complete",
            DivisionEventKind::AccessInvite { .. } => "access_invite",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
