use super::common::*;
use std::collections::BTreeSet;

use crate::division::{
    BasisDraft, DivisionState, RankStatus, ResolutionPolicy, Selection, SelectionState,
};

fn states(
    state: &DivisionState,
    round: usize,
    participant: usize,
) -> Vec<Option<SelectionState>> {
    state
        .selections()
        .entry(round, participant)
        .unwrap_or_default()
        .iter()
        .map(|selection| selection.state.clone())
        .collect()
}

/// Round 0 of the two-round fixture: Blake outranks on picks, Avery loses Week 1.
fn resolve_predesignation(policy: ResolutionPolicy) -> DivisionState {
    let mut state = open_division(two_round_draft(), policy);
    state
        .submit(0, 0, vec![Selection::new(0).with_ancillaries([0])])
        .expect("avery submits");
    state.submit(0, 1, picks(&[0, 1])).expect("blake submits");
    state.submit(0, 2, picks(&[1])).expect("casey submits");
    state.close_current_round().expect("round 0 resolves");
    state
}

#[test]
fn oversubscribed_slot_goes_to_lowest_index_on_ties() {
    let mut state = open_division(oversubscribed_draft(), ResolutionPolicy::default());
    for participant in 0..3 {
        state.submit(0, participant, picks(&[0])).expect("submits");
    }

    state.close_current_round().expect("resolves");

    let round_state = state.round_state(0, 0).expect("round state");
    assert_eq!(round_state.designations, vec![0]);
    assert_eq!(states(&state, 0, 0), vec![Some(SelectionState::Confirmed)]);
    assert_eq!(
        states(&state, 0, 1),
        vec![Some(SelectionState::RejectedOutranked)]
    );
    assert_eq!(
        states(&state, 0, 2),
        vec![Some(SelectionState::RejectedOutranked)]
    );
    assert_eq!(state.rank_status(0, 0, 2), Some(RankStatus::Ranked(3)));
}

#[test]
fn contested_ancillary_goes_to_higher_priority() {
    let mut state = open_division(ancillary_draft(), ResolutionPolicy::default());
    state
        .submit(0, 0, vec![Selection::new(0).with_ancillaries([0])])
        .expect("avery submits");
    state
        .submit(0, 1, vec![Selection::new(0).with_ancillaries([0])])
        .expect("blake submits");

    state.close_current_round().expect("resolves");

    let week_one = state.round_state(0, 0).expect("round state");
    assert_eq!(week_one.designations, vec![1]);
    assert_eq!(week_one.ancillary_designations.get(&0), Some(&1));
    assert_eq!(states(&state, 0, 1), vec![Some(SelectionState::Confirmed)]);
    assert_eq!(
        states(&state, 0, 0),
        vec![Some(SelectionState::RejectedAncillaryUnavailable(vec![0]))]
    );
    assert_eq!(week_one.designations.len(), 1, "a slot remains unused");
}

#[test]
fn ancillary_loser_falls_back_to_next_entry() {
    let mut state = open_division(ancillary_draft(), ResolutionPolicy::default());
    state
        .submit(
            0,
            0,
            vec![Selection::new(0).with_ancillaries([0]), Selection::new(1)],
        )
        .expect("avery submits");
    state
        .submit(0, 1, vec![Selection::new(0).with_ancillaries([0])])
        .expect("blake submits");

    state.close_current_round().expect("resolves");

    assert_eq!(
        states(&state, 0, 0),
        vec![
            Some(SelectionState::RejectedAncillaryUnavailable(vec![0])),
            Some(SelectionState::Confirmed),
        ]
    );
    assert_eq!(state.round_state(1, 0).expect("week 2").designations, vec![0]);
}

#[test]
fn entries_after_a_confirmation_are_superseded() {
    let state = resolve_predesignation(ResolutionPolicy::default());

    assert_eq!(
        states(&state, 0, 1),
        vec![Some(SelectionState::Confirmed), Some(SelectionState::Superseded)]
    );
    assert_eq!(state.rank_status(1, 0, 1), Some(RankStatus::NotContending));
    assert_eq!(state.rank_status(0, 0, 1), Some(RankStatus::Ranked(1)));
    assert_eq!(state.rank_status(0, 0, 0), Some(RankStatus::Ranked(2)));
    assert_eq!(state.rank_status(1, 0, 2), Some(RankStatus::Ranked(3)));
}

#[test]
fn closed_rounds_are_exhaustive() {
    let state = resolve_predesignation(ResolutionPolicy::default());

    let entries = state.selections().round(0).expect("round 0");
    assert!(entries
        .values()
        .flatten()
        .all(|selection| selection.state.is_some()));
    assert!(state
        .round_outcomes(0)
        .expect("outcomes")
        .get(&3)
        .is_none(), "ineligible participants are not chased");
}

#[test]
fn capacity_holds_for_every_bucket() {
    let state = resolve_predesignation(ResolutionPolicy::default());

    for (bucket, definition) in state.basis().bucket_definitions().iter().enumerate() {
        let seated = state.round_state(bucket, 0).expect("state").designations.len();
        assert!(seated <= definition.available_slots as usize);
    }
}

#[test]
fn carried_over_claims_never_exceed_capacity_or_share_ancillaries() {
    let draft = BasisDraft {
        bucket_definitions: vec![
            bucket("Week 1", 2, &["Dock", "Kayak"]),
            bucket("Week 2", 2, &["Dock"]),
        ],
        participant_definitions: vec![
            participant("Avery", &[1, 2, 1]),
            participant("Blake", &[2, 1, 1]),
            participant("Casey", &[1, 1, 2]),
            participant("Dana", &[0, 2, 2]),
        ],
        selection_round_names: vec![
            "Predesignation".to_string(),
            "Round 1".to_string(),
            "Round 2".to_string(),
        ],
    };
    let policy = ResolutionPolicy {
        carry_over_claims: true,
        ..ResolutionPolicy::default()
    };
    let mut state = open_division(draft, policy);
    let wants_everything = |first: usize, second: usize| {
        vec![
            Selection::new(first).with_ancillaries([0]),
            Selection::new(second).with_ancillaries([0]),
        ]
    };

    for round in 0..3 {
        if round > 0 {
            state.open_next_round().expect("next round opens");
        }
        let eligible: Vec<(usize, u32)> = state
            .basis()
            .eligible_participants(round)
            .map(|(participant, definition)| (participant, definition.picks_allowed(round)))
            .collect();
        for (participant, allowed) in eligible {
            let mut selections = wants_everything(participant % 2, (participant + 1) % 2);
            selections.truncate(allowed as usize);
            state
                .submit(round, participant, selections)
                .expect("submission within allowance");
        }
        state.close_current_round().expect("round resolves");
    }

    for (bucket, definition) in state.basis().bucket_definitions().iter().enumerate() {
        let mut seated = 0;
        let mut claimed = BTreeSet::new();
        for round in 0..3 {
            let round_state = state.round_state(bucket, round).expect("round state");
            seated += round_state.designations.len();
            for (ancillary, holder) in &round_state.ancillary_designations {
                assert!(
                    claimed.insert(*ancillary),
                    "ancillary {ancillary} of bucket {bucket} held twice"
                );
                assert!(round_state.designations.contains(holder));
            }
        }
        assert!(seated <= definition.available_slots as usize);
    }
}

#[test]
fn empty_and_missing_submissions_get_round_outcomes() {
    let mut state = resolve_predesignation(ResolutionPolicy::default());
    state.open_next_round().expect("round 1 opens");
    state.submit(1, 1, Vec::new()).expect("blake passes");
    state.submit(1, 3, picks(&[0])).expect("dana submits");

    state.close_current_round().expect("round 1 resolves");

    let outcomes = state.round_outcomes(1).expect("outcomes");
    assert_eq!(
        outcomes.get(&1),
        Some(&SelectionState::RejectedNoSelectionsThisRound)
    );
    assert_eq!(
        outcomes.get(&2),
        Some(&SelectionState::RejectedNoSelectionsThisRound)
    );
    assert_eq!(
        outcomes.get(&0),
        Some(&SelectionState::RejectedNoSelectionsThisRound)
    );
    assert!(outcomes.get(&3).is_none());
    assert_eq!(state.rank_status(0, 1, 1), Some(RankStatus::NotContending));
}

#[test]
fn rounds_are_independent_by_default() {
    let mut state = resolve_predesignation(ResolutionPolicy::default());
    state.open_next_round().expect("round 1 opens");
    state
        .submit(1, 0, vec![Selection::new(0).with_ancillaries([0])])
        .expect("avery submits");
    state.submit(1, 3, picks(&[0])).expect("dana submits");

    state.close_current_round().expect("round 1 resolves");

    let week_one = state.round_state(0, 1).expect("round 1 state");
    assert_eq!(week_one.designations, vec![0]);
    assert_eq!(week_one.ancillary_designations.get(&0), Some(&0));
    assert_eq!(
        states(&state, 1, 3),
        vec![Some(SelectionState::RejectedOutranked)]
    );
}

#[test]
fn carried_over_claims_consume_later_capacity() {
    let policy = ResolutionPolicy {
        carry_over_claims: true,
        ..ResolutionPolicy::default()
    };
    let mut state = resolve_predesignation(policy);
    state.open_next_round().expect("round 1 opens");
    state
        .submit(1, 0, vec![Selection::new(0), Selection::new(1)])
        .expect_err("avery only has one pick");
    state.submit(1, 0, picks(&[0])).expect("avery submits");
    state.submit(1, 2, picks(&[1])).expect("casey submits");

    state.close_current_round().expect("round 1 resolves");

    assert!(state.round_state(0, 1).expect("state").designations.is_empty());
    assert_eq!(
        states(&state, 1, 0),
        vec![Some(SelectionState::RejectedOutranked)]
    );
    assert_eq!(state.round_state(1, 1).expect("state").designations, vec![2]);
}

#[test]
fn exclusive_policy_blocks_prior_designees() {
    let policy = ResolutionPolicy {
        exclusive_across_rounds: true,
        ..ResolutionPolicy::default()
    };
    let mut state = resolve_predesignation(policy);
    state.open_next_round().expect("round 1 opens");
    state.submit(1, 1, picks(&[1])).expect("blake submits");
    state.submit(1, 0, picks(&[1])).expect("avery submits");
    state.submit(1, 2, picks(&[1])).expect("casey submits");

    state.close_current_round().expect("round 1 resolves");

    assert_eq!(
        states(&state, 1, 1),
        vec![Some(SelectionState::RejectedAlreadyDesignated)]
    );
    assert_eq!(
        states(&state, 1, 2),
        vec![Some(SelectionState::RejectedAlreadyDesignated)]
    );
    assert_eq!(states(&state, 1, 0), vec![Some(SelectionState::Confirmed)]);
    assert_eq!(state.round_state(1, 1).expect("state").designations, vec![0]);
    assert_eq!(state.rank_status(1, 1, 0), Some(RankStatus::Ranked(1)));
    assert_eq!(state.rank_status(1, 1, 2), Some(RankStatus::NotContending));
}

#[test]
fn resolution_is_deterministic() {
    let first = resolve_predesignation(ResolutionPolicy::default());
    let second = resolve_predesignation(ResolutionPolicy::default());

    let encode = |state: &DivisionState| {
        serde_json::to_vec(state.bucket_states()).expect("bucket states serialize")
    };
    assert_eq!(encode(&first), encode(&second));
}

#[test]
fn overwritten_submission_resolves_like_a_single_one() {
    let mut repeated = open_division(oversubscribed_draft(), ResolutionPolicy::default());
    repeated.submit(0, 1, picks(&[0])).expect("submit");
    repeated.submit(0, 1, picks(&[0])).expect("submit again");
    repeated.close_current_round().expect("resolves");

    let mut single = open_division(oversubscribed_draft(), ResolutionPolicy::default());
    single.submit(0, 1, picks(&[0])).expect("submit");
    single.close_current_round().expect("resolves");

    assert_eq!(repeated, single);
}
