use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::basis::{AncillaryIndex, Basis, BucketIndex, ParticipantIndex, RoundIndex};

/// Terminal outcome of a selection once its round has been resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionState {
    Confirmed,
    RejectedOutranked,
    RejectedNoSelectionsThisRound,
    RejectedAncillaryUnavailable(Vec<AncillaryIndex>),
    /// A participant designated in an earlier round may not contend again.
    RejectedAlreadyDesignated,
    /// A more preferred entry was confirmed first, so this one was never evaluated.
    Superseded,
}

impl SelectionState {
    pub const fn label(&self) -> &'static str {
        match self {
            SelectionState::Confirmed => "confirmed",
            SelectionState::RejectedOutranked => "rejected_outranked",
            SelectionState::RejectedNoSelectionsThisRound => "rejected_no_selections_this_round",
            SelectionState::RejectedAncillaryUnavailable(_) => "rejected_ancillary_unavailable",
            SelectionState::RejectedAlreadyDesignated => "rejected_already_designated",
            SelectionState::Superseded => "superseded",
        }
    }
}

/// One ranked preference: a bucket plus the ancillaries requested with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub bucket_index: BucketIndex,
    #[serde(default)]
    pub ancillaries: Vec<AncillaryIndex>,
    #[serde(default)]
    pub state: Option<SelectionState>,
}

impl Selection {
    pub fn new(bucket_index: BucketIndex) -> Self {
        Self {
            bucket_index,
            ancillaries: Vec::new(),
            state: None,
        }
    }

    pub fn with_ancillaries(mut self, ancillaries: impl IntoIterator<Item = AncillaryIndex>) -> Self {
        self.ancillaries = ancillaries.into_iter().collect();
        self
    }
}

/// Rejections raised while validating a submission. The ledger is untouched on error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("round {round} is not open for selections")]
    RoundClosed { round: RoundIndex },
    #[error("participant {participant} is not part of this division")]
    UnknownParticipant { participant: ParticipantIndex },
    #[error(
        "participant {participant} may submit {allowed} picks in round {round}, received {submitted}"
    )]
    TooManyPicks {
        participant: ParticipantIndex,
        round: RoundIndex,
        allowed: u32,
        submitted: usize,
    },
    #[error("bucket {bucket} does not exist")]
    UnknownBucket { bucket: BucketIndex },
    #[error("bucket {bucket} appears more than once in the submission")]
    DuplicateBucket { bucket: BucketIndex },
    #[error("ancillary {ancillary} does not belong to bucket {bucket}")]
    InvalidAncillary {
        bucket: BucketIndex,
        ancillary: AncillaryIndex,
    },
    #[error("ancillary {ancillary} is requested twice for bucket {bucket}")]
    DuplicateAncillary {
        bucket: BucketIndex,
        ancillary: AncillaryIndex,
    },
}

pub type RoundSelections = BTreeMap<ParticipantIndex, Vec<Selection>>;

/// Per-round, per-participant ordered preferences.
///
/// Only participants that submitted appear in a round's map; an empty list is a
/// submission of "no picks" and is kept distinct from never having submitted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionLedger {
    rounds: Vec<RoundSelections>,
}

impl SelectionLedger {
    pub fn new(round_count: usize) -> Self {
        Self {
            rounds: vec![RoundSelections::new(); round_count],
        }
    }

    pub(crate) fn from_rounds(rounds: Vec<RoundSelections>) -> Self {
        Self { rounds }
    }

    /// Validate and record a submission, replacing any earlier one for the same
    /// participant and round.
    pub fn submit(
        &mut self,
        basis: &Basis,
        current_open_round: Option<RoundIndex>,
        round: RoundIndex,
        participant: ParticipantIndex,
        selections: Vec<Selection>,
    ) -> Result<(), SubmissionError> {
        if current_open_round != Some(round) {
            return Err(SubmissionError::RoundClosed { round });
        }
        validate_submission(basis, round, participant, &selections)?;

        let entries = self
            .rounds
            .get_mut(round)
            .ok_or(SubmissionError::RoundClosed { round })?;
        let cleared = selections
            .into_iter()
            .map(|selection| Selection {
                state: None,
                ..selection
            })
            .collect();
        entries.insert(participant, cleared);
        Ok(())
    }

    pub fn round(&self, round: RoundIndex) -> Option<&RoundSelections> {
        self.rounds.get(round)
    }

    pub fn entry(&self, round: RoundIndex, participant: ParticipantIndex) -> Option<&[Selection]> {
        self.rounds
            .get(round)
            .and_then(|entries| entries.get(&participant))
            .map(Vec::as_slice)
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    pub(crate) fn replace_round(&mut self, round: RoundIndex, entries: RoundSelections) {
        if let Some(slot) = self.rounds.get_mut(round) {
            *slot = entries;
        }
    }
}

pub(crate) fn validate_submission(
    basis: &Basis,
    round: RoundIndex,
    participant: ParticipantIndex,
    selections: &[Selection],
) -> Result<(), SubmissionError> {
    let definition = basis
        .participant(participant)
        .ok_or(SubmissionError::UnknownParticipant { participant })?;

    let allowed = definition.picks_allowed(round);
    if selections.len() > allowed as usize {
        return Err(SubmissionError::TooManyPicks {
            participant,
            round,
            allowed,
            submitted: selections.len(),
        });
    }

    let mut buckets = BTreeSet::new();
    for selection in selections {
        let bucket = selection.bucket_index;
        let bucket_definition = basis
            .bucket(bucket)
            .ok_or(SubmissionError::UnknownBucket { bucket })?;
        if !buckets.insert(bucket) {
            return Err(SubmissionError::DuplicateBucket { bucket });
        }

        let mut ancillaries = BTreeSet::new();
        for &ancillary in &selection.ancillaries {
            if !bucket_definition.has_ancillary(ancillary) {
                return Err(SubmissionError::InvalidAncillary { bucket, ancillary });
            }
            if !ancillaries.insert(ancillary) {
                return Err(SubmissionError::DuplicateAncillary { bucket, ancillary });
            }
        }
    }

    Ok(())
}
