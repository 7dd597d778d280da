//! Round resolution: a single deterministic priority pass per round.
//!
//! Contenders are ordered once per round (more picks allowed first, then lower
//! participant index) and each walks their ranked list until a bucket accepts them.
//! There is no backtracking: a seat taken by a stronger contender is never revisited.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::basis::{AncillaryIndex, Basis, BucketIndex, ParticipantIndex, RoundIndex};
use super::round::{BucketState, Ranks, RoundState};
use super::selection::{RoundSelections, SelectionState};

/// Rules that change how earlier rounds constrain the one being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionPolicy {
    /// Participants holding a designation from an earlier round may not contend again.
    pub exclusive_across_rounds: bool,
    /// Slots and ancillaries claimed in earlier rounds stay claimed for the whole division.
    pub carry_over_claims: bool,
}

/// Failures raised while closing a round. State is never partially written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("no round is currently open")]
    NoOpenRound,
    #[error("round {round} has already been closed")]
    AlreadyClosed { round: RoundIndex },
    #[error("round {round} is not the open round")]
    RoundNotOpen { round: RoundIndex },
    #[error("round {round} does not exist in this division")]
    UnknownRound { round: RoundIndex },
    #[error("ledger entry for round {round} references unknown participant {participant}")]
    UnknownParticipant {
        round: RoundIndex,
        participant: ParticipantIndex,
    },
    #[error("participant {participant} selected unknown bucket {bucket} in round {round}")]
    UnknownBucket {
        round: RoundIndex,
        participant: ParticipantIndex,
        bucket: BucketIndex,
    },
    #[error("participant {participant} requested unknown ancillary {ancillary} of bucket {bucket}")]
    UnknownAncillary {
        participant: ParticipantIndex,
        bucket: BucketIndex,
        ancillary: AncillaryIndex,
    },
    #[error("bucket {bucket} has no state recorded for round {round}")]
    MissingHistory { bucket: BucketIndex, round: RoundIndex },
}

/// Detached output of a resolution pass, committed by the caller in one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResolution {
    pub round: RoundIndex,
    /// Indexed by bucket.
    pub round_states: Vec<RoundState>,
    /// The round's ledger with every selection carrying a terminal state.
    pub selections: RoundSelections,
    /// Round-level outcomes for participants that had nothing to resolve.
    pub outcomes: BTreeMap<ParticipantIndex, SelectionState>,
}

pub struct RoundResolver<'a> {
    basis: &'a Basis,
    policy: ResolutionPolicy,
}

impl<'a> RoundResolver<'a> {
    pub fn new(basis: &'a Basis, policy: ResolutionPolicy) -> Self {
        Self { basis, policy }
    }

    /// Priority order for a round: picks allowed descending, participant index ascending.
    pub fn priority_order(
        &self,
        round: RoundIndex,
        entries: &RoundSelections,
    ) -> Vec<ParticipantIndex> {
        let mut contenders: Vec<ParticipantIndex> = entries
            .iter()
            .filter(|(_, selections)| !selections.is_empty())
            .map(|(participant, _)| *participant)
            .collect();

        contenders.sort_by_key(|participant| {
            let allowed = self
                .basis
                .participant(*participant)
                .map(|definition| definition.picks_allowed(round))
                .unwrap_or(0);
            (Reverse(allowed), *participant)
        });
        contenders
    }

    /// Resolve `round` from its ledger entries and the bucket history of earlier rounds.
    pub fn resolve(
        &self,
        round: RoundIndex,
        entries: &RoundSelections,
        history: &[BucketState],
    ) -> Result<RoundResolution, ResolutionError> {
        if round >= self.basis.round_count() {
            return Err(ResolutionError::UnknownRound { round });
        }
        for participant in entries.keys() {
            if self.basis.participant(*participant).is_none() {
                return Err(ResolutionError::UnknownParticipant {
                    round,
                    participant: *participant,
                });
            }
        }

        let prior = PriorClaims::collect(self.basis, history, round)?;
        let bucket_count = self.basis.bucket_count();
        let mut round_states = vec![RoundState::default(); bucket_count];
        let mut ranks = vec![Ranks::new(); bucket_count];
        let mut selections = entries.clone();

        let (excluded, contenders): (Vec<_>, Vec<_>) = self
            .priority_order(round, entries)
            .into_iter()
            .partition(|participant| {
                self.policy.exclusive_across_rounds && prior.designated.contains(participant)
            });
        for participant in excluded {
            if let Some(list) = selections.get_mut(&participant) {
                for selection in list.iter_mut() {
                    selection.state = Some(SelectionState::RejectedAlreadyDesignated);
                }
            }
        }

        for (position, participant) in contenders.into_iter().enumerate() {
            let rank = position + 1;
            let Some(list) = selections.get_mut(&participant) else {
                continue;
            };

            let mut placed = false;
            for selection in list.iter_mut() {
                if placed {
                    selection.state = Some(SelectionState::Superseded);
                    continue;
                }

                let bucket = selection.bucket_index;
                let definition =
                    self.basis
                        .bucket(bucket)
                        .ok_or(ResolutionError::UnknownBucket {
                            round,
                            participant,
                            bucket,
                        })?;
                if let Some(&ancillary) = selection
                    .ancillaries
                    .iter()
                    .find(|ancillary| !definition.has_ancillary(**ancillary))
                {
                    return Err(ResolutionError::UnknownAncillary {
                        participant,
                        bucket,
                        ancillary,
                    });
                }

                ranks[bucket].insert(participant, rank);
                let state = &mut round_states[bucket];

                let mut capacity = definition.available_slots as usize;
                if self.policy.carry_over_claims {
                    capacity = capacity.saturating_sub(prior.taken_slots[bucket]);
                }
                if state.designations.len() >= capacity {
                    selection.state = Some(SelectionState::RejectedOutranked);
                    continue;
                }

                let claimed: Vec<AncillaryIndex> = selection
                    .ancillaries
                    .iter()
                    .copied()
                    .filter(|ancillary| {
                        state.ancillary_designations.contains_key(ancillary)
                            || (self.policy.carry_over_claims
                                && prior.claimed_ancillaries[bucket].contains(ancillary))
                    })
                    .collect();
                if !claimed.is_empty() {
                    selection.state = Some(SelectionState::RejectedAncillaryUnavailable(claimed));
                    continue;
                }

                state.designations.push(participant);
                for ancillary in &selection.ancillaries {
                    state.ancillary_designations.insert(*ancillary, participant);
                }
                selection.state = Some(SelectionState::Confirmed);
                placed = true;
            }
        }

        for (state, bucket_ranks) in round_states.iter_mut().zip(ranks) {
            state.ranks = Some(bucket_ranks);
        }

        let mut outcomes = BTreeMap::new();
        for (participant, list) in entries {
            if list.is_empty() {
                outcomes.insert(*participant, SelectionState::RejectedNoSelectionsThisRound);
            }
        }
        for (participant, _) in self.basis.eligible_participants(round) {
            if !entries.contains_key(&participant) {
                outcomes.insert(participant, SelectionState::RejectedNoSelectionsThisRound);
            }
        }

        Ok(RoundResolution {
            round,
            round_states,
            selections,
            outcomes,
        })
    }
}

/// What earlier rounds already hold, per bucket.
struct PriorClaims {
    taken_slots: Vec<usize>,
    claimed_ancillaries: Vec<BTreeSet<AncillaryIndex>>,
    designated: BTreeSet<ParticipantIndex>,
}

impl PriorClaims {
    fn collect(
        basis: &Basis,
        history: &[BucketState],
        round: RoundIndex,
    ) -> Result<Self, ResolutionError> {
        let bucket_count = basis.bucket_count();
        let mut prior = Self {
            taken_slots: vec![0; bucket_count],
            claimed_ancillaries: vec![BTreeSet::new(); bucket_count],
            designated: BTreeSet::new(),
        };

        for bucket in 0..bucket_count {
            let bucket_state = history
                .get(bucket)
                .ok_or(ResolutionError::MissingHistory { bucket, round })?;
            for earlier in 0..round {
                let state = bucket_state
                    .round(earlier)
                    .ok_or(ResolutionError::MissingHistory {
                        bucket,
                        round: earlier,
                    })?;
                prior.taken_slots[bucket] += state.designations.len();
                prior.claimed_ancillaries[bucket]
                    .extend(state.ancillary_designations.keys().copied());
                prior.designated.extend(state.designations.iter().copied());
            }
        }

        Ok(prior)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::division::basis::{BasisDraft, BucketDefinition, ParticipantDefinition};
    use crate::division::selection::Selection;

    fn basis(slots: u32, picks: &[u32]) -> Basis {
        Basis::new(BasisDraft {
            bucket_definitions: vec![BucketDefinition {
                name: "Week 1".to_string(),
                available_slots: slots,
                available_ancillaries: vec!["Cabin".to_string()],
            }],
            participant_definitions: picks
                .iter()
                .enumerate()
                .map(|(index, picks)| ParticipantDefinition {
                    name: format!("Participant {index}"),
                    email: format!("p{index}@example.com"),
                    round_picks_allowed: vec![*picks],
                })
                .collect(),
            selection_round_names: vec!["Round 1".to_string()],
        })
        .expect("valid basis")
    }

    fn empty_history(bucket_count: usize) -> Vec<BucketState> {
        vec![
            BucketState {
                round_states: vec![RoundState::default()],
            };
            bucket_count
        ]
    }

    #[test]
    fn priority_prefers_more_picks_then_lower_index() {
        let basis = basis(1, &[1, 2, 2, 1]);
        let resolver = RoundResolver::new(&basis, ResolutionPolicy::default());
        let mut entries = RoundSelections::new();
        for participant in 0..4 {
            entries.insert(participant, vec![Selection::new(0)]);
        }

        assert_eq!(resolver.priority_order(0, &entries), vec![1, 2, 0, 3]);
    }

    #[test]
    fn empty_lists_do_not_contend() {
        let basis = basis(1, &[1, 1]);
        let resolver = RoundResolver::new(&basis, ResolutionPolicy::default());
        let mut entries = RoundSelections::new();
        entries.insert(0, Vec::new());
        entries.insert(1, vec![Selection::new(0)]);

        let resolution = resolver
            .resolve(0, &entries, &empty_history(1))
            .expect("resolves");

        assert_eq!(resolution.round_states[0].designations, vec![1]);
        let ranks = resolution.round_states[0].ranks.as_ref().expect("ranked");
        assert_eq!(ranks.get(&1), Some(&1));
        assert!(!ranks.contains_key(&0));
        assert_eq!(
            resolution.outcomes.get(&0),
            Some(&SelectionState::RejectedNoSelectionsThisRound)
        );
    }

    #[test]
    fn unknown_bucket_fails_without_output() {
        let basis = basis(1, &[1]);
        let resolver = RoundResolver::new(&basis, ResolutionPolicy::default());
        let mut entries = RoundSelections::new();
        entries.insert(0, vec![Selection::new(4)]);

        assert_eq!(
            resolver.resolve(0, &entries, &empty_history(1)),
            Err(ResolutionError::UnknownBucket {
                round: 0,
                participant: 0,
                bucket: 4,
            })
        );
    }

    #[test]
    fn missing_history_is_reported() {
        let basis = basis(1, &[1]);
        let resolver = RoundResolver::new(&basis, ResolutionPolicy::default());

        assert_eq!(
            resolver.resolve(0, &RoundSelections::new(), &[]),
            Err(ResolutionError::MissingHistory {
                bucket: 0,
                round: 0
            })
        );
    }
}
