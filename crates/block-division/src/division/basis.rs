use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub type BucketIndex = usize;
pub type ParticipantIndex = usize;
pub type RoundIndex = usize;
pub type AncillaryIndex = usize;

/// Capacity-limited resource participants are divided into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketDefinition {
    pub name: String,
    pub available_slots: u32,
    /// Single-claim sub-resources, addressed by position.
    #[serde(default)]
    pub available_ancillaries: Vec<String>,
}

impl BucketDefinition {
    pub fn has_ancillary(&self, ancillary: AncillaryIndex) -> bool {
        ancillary < self.available_ancillaries.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantDefinition {
    pub name: String,
    pub email: String,
    /// Picks allowed per round; zero marks the participant ineligible for that round.
    pub round_picks_allowed: Vec<u32>,
}

impl ParticipantDefinition {
    pub fn picks_allowed(&self, round: RoundIndex) -> u32 {
        self.round_picks_allowed.get(round).copied().unwrap_or(0)
    }
}

/// Unvalidated construction payload for a [`Basis`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasisDraft {
    pub bucket_definitions: Vec<BucketDefinition>,
    pub participant_definitions: Vec<ParticipantDefinition>,
    pub selection_round_names: Vec<String>,
}

/// Validation failures raised while constructing a [`Basis`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BasisError {
    #[error("invalid basis: at least one selection round is required")]
    NoRounds,
    #[error("invalid basis: at least one bucket is required")]
    NoBuckets,
    #[error("invalid basis: bucket {bucket} has no name")]
    UnnamedBucket { bucket: BucketIndex },
    #[error("invalid basis: bucket {bucket} must offer at least one slot")]
    NoSlots { bucket: BucketIndex },
    #[error("invalid basis: bucket {bucket} lists ancillary '{name}' more than once")]
    DuplicateAncillary { bucket: BucketIndex, name: String },
    #[error("invalid basis: participant {participant} has no name")]
    UnnamedParticipant { participant: ParticipantIndex },
    #[error(
        "invalid basis: participant {participant} declares picks for {found} rounds, expected {expected}"
    )]
    PicksLengthMismatch {
        participant: ParticipantIndex,
        expected: usize,
        found: usize,
    },
}

/// Immutable configuration for one division run.
///
/// Every index handed out by a basis is dense and stable, so downstream components
/// only bounds-check against the lengths exposed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BasisDraft")]
pub struct Basis {
    bucket_definitions: Vec<BucketDefinition>,
    participant_definitions: Vec<ParticipantDefinition>,
    selection_round_names: Vec<String>,
}

impl Basis {
    pub fn new(draft: BasisDraft) -> Result<Self, BasisError> {
        let BasisDraft {
            bucket_definitions,
            participant_definitions,
            selection_round_names,
        } = draft;

        if selection_round_names.is_empty() {
            return Err(BasisError::NoRounds);
        }
        if bucket_definitions.is_empty() {
            return Err(BasisError::NoBuckets);
        }

        for (bucket, definition) in bucket_definitions.iter().enumerate() {
            if definition.name.trim().is_empty() {
                return Err(BasisError::UnnamedBucket { bucket });
            }
            if definition.available_slots == 0 {
                return Err(BasisError::NoSlots { bucket });
            }
            let mut seen = BTreeSet::new();
            for name in &definition.available_ancillaries {
                if !seen.insert(name.as_str()) {
                    return Err(BasisError::DuplicateAncillary {
                        bucket,
                        name: name.clone(),
                    });
                }
            }
        }

        let expected = selection_round_names.len();
        for (participant, definition) in participant_definitions.iter().enumerate() {
            if definition.name.trim().is_empty() {
                return Err(BasisError::UnnamedParticipant { participant });
            }
            if definition.round_picks_allowed.len() != expected {
                return Err(BasisError::PicksLengthMismatch {
                    participant,
                    expected,
                    found: definition.round_picks_allowed.len(),
                });
            }
        }

        Ok(Self {
            bucket_definitions,
            participant_definitions,
            selection_round_names,
        })
    }

    pub fn bucket_definitions(&self) -> &[BucketDefinition] {
        &self.bucket_definitions
    }

    pub fn participant_definitions(&self) -> &[ParticipantDefinition] {
        &self.participant_definitions
    }

    pub fn selection_round_names(&self) -> &[String] {
        &self.selection_round_names
    }

    pub fn bucket(&self, index: BucketIndex) -> Option<&BucketDefinition> {
        self.bucket_definitions.get(index)
    }

    pub fn participant(&self, index: ParticipantIndex) -> Option<&ParticipantDefinition> {
        self.participant_definitions.get(index)
    }

    pub fn round_name(&self, index: RoundIndex) -> Option<&str> {
        self.selection_round_names.get(index).map(String::as_str)
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_definitions.len()
    }

    pub fn participant_count(&self) -> usize {
        self.participant_definitions.len()
    }

    pub fn round_count(&self) -> usize {
        self.selection_round_names.len()
    }

    /// Participants allowed at least one pick in `round`.
    pub fn eligible_participants(
        &self,
        round: RoundIndex,
    ) -> impl Iterator<Item = (ParticipantIndex, &ParticipantDefinition)> + '_ {
        self.participant_definitions
            .iter()
            .enumerate()
            .filter(move |(_, definition)| definition.picks_allowed(round) > 0)
    }
}

impl TryFrom<BasisDraft> for Basis {
    type Error = BasisError;

    fn try_from(draft: BasisDraft) -> Result<Self, Self::Error> {
        Self::new(draft)
    }
}

impl From<Basis> for BasisDraft {
    fn from(basis: Basis) -> Self {
        Self {
            bucket_definitions: basis.bucket_definitions,
            participant_definitions: basis.participant_definitions,
            selection_round_names: basis.selection_round_names,
        }
    }
}
