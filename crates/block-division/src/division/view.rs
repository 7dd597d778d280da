use std::collections::BTreeMap;

use serde::Serialize;

use super::basis::{AncillaryIndex, BucketIndex, ParticipantIndex, RoundIndex};
use super::round::{RankStatus, RoundPhase};
use super::selection::{Selection, SelectionState};
use super::state::DivisionState;

/// What a single participant may see of a division.
///
/// Ranks are limited to the buckets the participant selected, so other
/// participants' standings never leak through this view.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantView {
    pub participant: ParticipantIndex,
    pub name: String,
    pub current_open_round: Option<RoundIndex>,
    pub rounds: Vec<ParticipantRoundView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantRoundView {
    pub round: RoundIndex,
    pub round_name: String,
    pub phase: RoundPhase,
    pub picks_allowed: u32,
    /// `None` when nothing has been submitted for the round.
    pub selections: Option<Vec<Selection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SelectionState>,
    pub designation: Option<BucketIndex>,
    pub ancillaries: Vec<AncillaryIndex>,
    pub ranks: BTreeMap<BucketIndex, RankStatus>,
}

impl DivisionState {
    pub fn participant_view(&self, participant: ParticipantIndex) -> Option<ParticipantView> {
        let definition = self.basis.participant(participant)?;

        let rounds = self
            .basis
            .selection_round_names()
            .iter()
            .enumerate()
            .map(|(round, round_name)| {
                let selections = self
                    .selections
                    .entry(round, participant)
                    .map(<[Selection]>::to_vec);

                let mut ranks = BTreeMap::new();
                for selection in selections.iter().flatten() {
                    if let Some(status) =
                        self.rank_status(selection.bucket_index, round, participant)
                    {
                        ranks.insert(selection.bucket_index, status);
                    }
                }

                let designation = (0..self.basis.bucket_count()).find(|bucket| {
                    self.round_state(*bucket, round)
                        .is_some_and(|state| state.holds(participant))
                });
                let ancillaries = designation
                    .and_then(|bucket| self.round_state(bucket, round))
                    .map(|state| state.ancillaries_held_by(participant).collect())
                    .unwrap_or_default();

                ParticipantRoundView {
                    round,
                    round_name: round_name.clone(),
                    phase: self.round_phase(round).unwrap_or(RoundPhase::Pending),
                    picks_allowed: definition.picks_allowed(round),
                    selections,
                    outcome: self
                        .round_outcomes(round)
                        .and_then(|outcomes| outcomes.get(&participant))
                        .cloned(),
                    designation,
                    ancillaries,
                    ranks,
                }
            })
            .collect();

        Some(ParticipantView {
            participant,
            name: definition.name.clone(),
            current_open_round: self.current_open_round,
            rounds,
        })
    }
}
