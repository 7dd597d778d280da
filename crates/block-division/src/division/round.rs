use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::basis::{AncillaryIndex, ParticipantIndex, RoundIndex};

/// Priority rank per contending participant; rank 1 is the strongest claim.
pub type Ranks = BTreeMap<ParticipantIndex, usize>;

/// Result of one round for one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoundState {
    /// Seated participants in assignment priority order.
    pub designations: Vec<ParticipantIndex>,
    pub ancillary_designations: BTreeMap<AncillaryIndex, ParticipantIndex>,
    /// `None` until the round is resolved.
    pub ranks: Option<Ranks>,
}

impl RoundState {
    pub fn holds(&self, participant: ParticipantIndex) -> bool {
        self.designations.contains(&participant)
    }

    pub fn rank_status(&self, participant: ParticipantIndex) -> RankStatus {
        match &self.ranks {
            None => RankStatus::Pending,
            Some(ranks) => match ranks.get(&participant) {
                Some(rank) => RankStatus::Ranked(*rank),
                None => RankStatus::NotContending,
            },
        }
    }

    pub fn ancillaries_held_by(
        &self,
        participant: ParticipantIndex,
    ) -> impl Iterator<Item = AncillaryIndex> + '_ {
        self.ancillary_designations
            .iter()
            .filter(move |(_, holder)| **holder == participant)
            .map(|(ancillary, _)| *ancillary)
    }
}

/// Per-round history of a single bucket. A round's entry exists once that round opens.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BucketState {
    pub round_states: Vec<RoundState>,
}

impl BucketState {
    pub fn round(&self, round: RoundIndex) -> Option<&RoundState> {
        self.round_states.get(round)
    }
}

/// Three-way answer to "where does this participant stand in this bucket".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "rank", rename_all = "snake_case")]
pub enum RankStatus {
    /// The round has not been resolved yet.
    Pending,
    Ranked(usize),
    NotContending,
}

/// Lifecycle of a selection round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Pending,
    Open,
    Resolved,
}

impl RoundPhase {
    pub const fn label(self) -> &'static str {
        match self {
            RoundPhase::Pending => "pending",
            RoundPhase::Open => "open",
            RoundPhase::Resolved => "resolved",
        }
    }
}
