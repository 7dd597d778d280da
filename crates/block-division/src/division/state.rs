use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::basis::{Basis, BucketIndex, ParticipantIndex, RoundIndex};
use super::resolver::{ResolutionError, ResolutionPolicy, RoundResolution, RoundResolver};
use super::round::{BucketState, RankStatus, RoundPhase, RoundState};
use super::selection::{Selection, SelectionLedger, SelectionState, SubmissionError};

/// Round-level outcomes keyed by participant, for participants with nothing to resolve.
pub type RoundOutcomes = BTreeMap<ParticipantIndex, SelectionState>;

/// Errors raised while moving a division between rounds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DivisionError {
    #[error("every selection round has already been opened")]
    DivisionComplete,
    #[error("round {round} is still open")]
    RoundStillOpen { round: RoundIndex },
}

/// Single source of truth for one division run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionState {
    pub(crate) basis: Basis,
    pub(crate) bucket_states: Vec<BucketState>,
    pub(crate) current_open_round: Option<RoundIndex>,
    pub(crate) selections: SelectionLedger,
    pub(crate) round_phases: Vec<RoundPhase>,
    pub(crate) round_outcomes: Vec<RoundOutcomes>,
    #[serde(default)]
    pub(crate) policy: ResolutionPolicy,
}

impl DivisionState {
    pub fn new(basis: Basis, policy: ResolutionPolicy) -> Self {
        let rounds = basis.round_count();
        Self {
            bucket_states: vec![BucketState::default(); basis.bucket_count()],
            current_open_round: None,
            selections: SelectionLedger::new(rounds),
            round_phases: vec![RoundPhase::Pending; rounds],
            round_outcomes: vec![RoundOutcomes::new(); rounds],
            policy,
            basis,
        }
    }

    pub fn basis(&self) -> &Basis {
        &self.basis
    }

    pub fn bucket_states(&self) -> &[BucketState] {
        &self.bucket_states
    }

    pub fn current_open_round(&self) -> Option<RoundIndex> {
        self.current_open_round
    }

    pub fn selections(&self) -> &SelectionLedger {
        &self.selections
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    pub fn round_phases(&self) -> &[RoundPhase] {
        &self.round_phases
    }

    pub fn round_phase(&self, round: RoundIndex) -> Option<RoundPhase> {
        self.round_phases.get(round).copied()
    }

    pub fn round_outcomes(&self, round: RoundIndex) -> Option<&RoundOutcomes> {
        self.round_outcomes.get(round)
    }

    pub fn round_state(&self, bucket: BucketIndex, round: RoundIndex) -> Option<&RoundState> {
        self.bucket_states
            .get(bucket)
            .and_then(|state| state.round(round))
    }

    /// `None` when the bucket or round has no state yet (the round never opened).
    pub fn rank_status(
        &self,
        bucket: BucketIndex,
        round: RoundIndex,
        participant: ParticipantIndex,
    ) -> Option<RankStatus> {
        self.round_state(bucket, round)
            .map(|state| state.rank_status(participant))
    }

    pub fn resolved_rounds(&self) -> usize {
        self.round_phases
            .iter()
            .filter(|phase| **phase == RoundPhase::Resolved)
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.resolved_rounds() == self.round_phases.len()
    }

    /// Replace a participant's submission for the open round.
    pub fn submit(
        &mut self,
        round: RoundIndex,
        participant: ParticipantIndex,
        selections: Vec<Selection>,
    ) -> Result<(), SubmissionError> {
        let picks = selections.len();
        self.selections.submit(
            &self.basis,
            self.current_open_round,
            round,
            participant,
            selections,
        )?;
        debug!(round, participant, picks, "selection submission recorded");
        Ok(())
    }

    pub fn open_next_round(&mut self) -> Result<RoundIndex, DivisionError> {
        if let Some(round) = self.current_open_round {
            return Err(DivisionError::RoundStillOpen { round });
        }
        let round = self
            .round_phases
            .iter()
            .position(|phase| *phase == RoundPhase::Pending)
            .ok_or(DivisionError::DivisionComplete)?;

        for bucket in &mut self.bucket_states {
            bucket.round_states.resize(round + 1, RoundState::default());
        }
        self.round_phases[round] = RoundPhase::Open;
        self.current_open_round = Some(round);

        info!(round, "selection round opened");
        Ok(round)
    }

    pub fn close_current_round(&mut self) -> Result<RoundIndex, ResolutionError> {
        let round = self
            .current_open_round
            .ok_or(ResolutionError::NoOpenRound)?;
        self.close_round(round)
    }

    /// Close `round`, which must be the open round. Retrying on a resolved round fails
    /// with [`ResolutionError::AlreadyClosed`] and leaves the state untouched.
    pub fn close_round(&mut self, round: RoundIndex) -> Result<RoundIndex, ResolutionError> {
        match self.round_phase(round) {
            None => return Err(ResolutionError::UnknownRound { round }),
            Some(RoundPhase::Resolved) => return Err(ResolutionError::AlreadyClosed { round }),
            _ => {}
        }
        match self.current_open_round {
            None => return Err(ResolutionError::NoOpenRound),
            Some(open) if open != round => return Err(ResolutionError::RoundNotOpen { round }),
            Some(_) => {}
        }

        let entries = self
            .selections
            .round(round)
            .ok_or(ResolutionError::UnknownRound { round })?;
        let resolution = RoundResolver::new(&self.basis, self.policy).resolve(
            round,
            entries,
            &self.bucket_states,
        )?;
        self.commit(resolution)?;
        Ok(round)
    }

    /// Install a resolution. Every precondition is checked before the first write.
    fn commit(&mut self, resolution: RoundResolution) -> Result<(), ResolutionError> {
        let RoundResolution {
            round,
            round_states,
            selections,
            outcomes,
        } = resolution;

        if round_states.len() != self.bucket_states.len() {
            return Err(ResolutionError::MissingHistory {
                bucket: round_states.len().min(self.bucket_states.len()),
                round,
            });
        }
        if let Some(bucket) = self
            .bucket_states
            .iter()
            .position(|state| state.round_states.len() <= round)
        {
            return Err(ResolutionError::MissingHistory { bucket, round });
        }
        if round >= self.round_outcomes.len() {
            return Err(ResolutionError::UnknownRound { round });
        }

        let designated: usize = round_states.iter().map(|state| state.designations.len()).sum();
        for (bucket, state) in self.bucket_states.iter_mut().zip(round_states) {
            bucket.round_states[round] = state;
        }
        self.selections.replace_round(round, selections);
        let unplaced = outcomes.len();
        self.round_outcomes[round] = outcomes;
        self.round_phases[round] = RoundPhase::Resolved;
        self.current_open_round = None;

        info!(round, designated, unplaced, "selection round resolved");
        Ok(())
    }
}
