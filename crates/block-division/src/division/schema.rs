//! Versioned persisted form of a division.
//!
//! The schema only grows by adding fields with defaults. Anything that changes the
//! meaning of existing data bumps [`CURRENT_SCHEMA_VERSION`] and gets a migration here.
//!
//! * Version 1: the unversioned legacy document. Designations were stored as sets,
//!   ledger entries were optional slots keyed by round, and neither round phases nor a
//!   resolution policy were recorded. Capacity was shared across rounds.
//! * Version 2: the current [`DivisionState`] layout.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::basis::{AncillaryIndex, Basis, BucketIndex, ParticipantIndex, RoundIndex};
use super::resolver::ResolutionPolicy;
use super::round::{BucketState, RoundPhase, RoundState};
use super::selection::{RoundSelections, Selection, SelectionLedger, SelectionState};
use super::state::{DivisionState, RoundOutcomes};

pub const CURRENT_SCHEMA_VERSION: u32 = 2;
const LEGACY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("malformed division document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported schema version {found} (newest supported is 2)")]
    UnsupportedVersion { found: u64 },
    #[error("inconsistent division document: {0}")]
    Inconsistent(String),
}

/// Division as written to storage or exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivisionDocument {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub division_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    pub division: DivisionState,
}

impl DivisionDocument {
    pub fn current(division_id: impl Into<String>, division: DivisionState) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            division_id: Some(division_id.into()),
            exported_at: Some(Utc::now()),
            division,
        }
    }
}

pub fn encode(document: &DivisionDocument) -> Result<String, SchemaError> {
    Ok(serde_json::to_string_pretty(document)?)
}

/// Parse any supported version, migrating it forward and checking its invariants.
pub fn decode(raw: &str) -> Result<DivisionDocument, SchemaError> {
    let value: Value = serde_json::from_str(raw)?;
    let version = value
        .get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(u64::from(LEGACY_SCHEMA_VERSION));

    let document = match version {
        1 => {
            let legacy: LegacyDivisionV1 = serde_json::from_value(value)?;
            DivisionDocument {
                schema_version: CURRENT_SCHEMA_VERSION,
                division_id: None,
                exported_at: None,
                division: legacy.migrate()?,
            }
        }
        2 => serde_json::from_value(value)?,
        found => return Err(SchemaError::UnsupportedVersion { found }),
    };

    verify(&document.division)?;
    Ok(document)
}

/// Structural checks a deserialized division must pass before the engine trusts it.
pub fn verify(division: &DivisionState) -> Result<(), SchemaError> {
    let basis = &division.basis;
    let rounds = basis.round_count();

    if division.bucket_states.len() != basis.bucket_count() {
        return Err(inconsistent(format!(
            "{} bucket states for {} buckets",
            division.bucket_states.len(),
            basis.bucket_count()
        )));
    }
    if division.round_phases.len() != rounds
        || division.round_outcomes.len() != rounds
        || division.selections.round_count() != rounds
    {
        return Err(inconsistent(format!(
            "round bookkeeping does not cover {rounds} rounds"
        )));
    }

    let opened = division
        .round_phases
        .iter()
        .take_while(|phase| **phase != RoundPhase::Pending)
        .count();
    if division.round_phases[opened..]
        .iter()
        .any(|phase| *phase != RoundPhase::Pending)
    {
        return Err(inconsistent("rounds were opened out of order".to_string()));
    }
    let open_rounds: Vec<RoundIndex> = division
        .round_phases
        .iter()
        .enumerate()
        .filter(|(_, phase)| **phase == RoundPhase::Open)
        .map(|(round, _)| round)
        .collect();
    let expected_open = open_rounds.first().copied();
    if open_rounds.len() > 1 || expected_open != division.current_open_round {
        return Err(inconsistent(format!(
            "open round pointer {:?} does not match round phases",
            division.current_open_round
        )));
    }

    for (bucket, state) in division.bucket_states.iter().enumerate() {
        if state.round_states.len() != opened {
            return Err(inconsistent(format!(
                "bucket {bucket} records {} rounds, {opened} have opened",
                state.round_states.len()
            )));
        }
        let capacity = basis
            .bucket(bucket)
            .map(|definition| definition.available_slots as usize)
            .unwrap_or(0);
        for (round, round_state) in state.round_states.iter().enumerate() {
            if round_state.designations.len() > capacity {
                return Err(inconsistent(format!(
                    "bucket {bucket} round {round} seats more than {capacity} participants"
                )));
            }
        }
    }

    Ok(())
}

fn inconsistent(detail: String) -> SchemaError {
    SchemaError::Inconsistent(detail)
}

#[derive(Debug, Deserialize)]
struct LegacyDivisionV1 {
    basis: Basis,
    bucket_states: Vec<LegacyRoundStatesV1>,
    #[serde(default)]
    selections: LegacySelectionsV1,
    #[serde(default)]
    current_open_round: Option<RoundIndex>,
}

#[derive(Debug, Deserialize)]
struct LegacyRoundStatesV1 {
    #[serde(default)]
    round_states: Vec<LegacyRoundStateV1>,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyRoundStateV1 {
    #[serde(default)]
    designations: BTreeSet<ParticipantIndex>,
    #[serde(default)]
    ancillary_designations: BTreeMap<AncillaryIndex, ParticipantIndex>,
    #[serde(default)]
    ranks: Option<BTreeMap<ParticipantIndex, usize>>,
}

#[derive(Debug, Default, Deserialize)]
struct LegacySelectionsV1 {
    #[serde(default)]
    selections: BTreeMap<RoundIndex, BTreeMap<ParticipantIndex, Vec<Option<LegacySelectionV1>>>>,
}

#[derive(Debug, Deserialize)]
struct LegacySelectionV1 {
    bucket_index: BucketIndex,
    #[serde(default)]
    ancillaries: BTreeSet<AncillaryIndex>,
    #[serde(default)]
    state: Option<SelectionState>,
}

impl LegacyDivisionV1 {
    fn migrate(self) -> Result<DivisionState, SchemaError> {
        let LegacyDivisionV1 {
            basis,
            bucket_states,
            mut selections,
            current_open_round,
        } = self;
        let rounds = basis.round_count();

        if bucket_states.len() != basis.bucket_count() {
            return Err(inconsistent(format!(
                "legacy document has {} bucket states for {} buckets",
                bucket_states.len(),
                basis.bucket_count()
            )));
        }
        if let Some(round) = current_open_round.filter(|round| *round >= rounds) {
            return Err(inconsistent(format!("legacy open round {round} does not exist")));
        }

        let round_phases: Vec<RoundPhase> = match current_open_round {
            Some(open) => (0..rounds)
                .map(|round| match round.cmp(&open) {
                    std::cmp::Ordering::Less => RoundPhase::Resolved,
                    std::cmp::Ordering::Equal => RoundPhase::Open,
                    std::cmp::Ordering::Greater => RoundPhase::Pending,
                })
                .collect(),
            None => {
                let last_submitted = selections
                    .selections
                    .iter()
                    .filter(|(round, entries)| **round < rounds && !entries.is_empty())
                    .map(|(round, _)| *round)
                    .max();
                (0..rounds)
                    .map(|round| match last_submitted {
                        Some(last) if round <= last => RoundPhase::Resolved,
                        _ => RoundPhase::Pending,
                    })
                    .collect()
            }
        };
        let opened = round_phases
            .iter()
            .filter(|phase| **phase != RoundPhase::Pending)
            .count();

        let bucket_states = bucket_states
            .into_iter()
            .map(|legacy| {
                let mut states = legacy.round_states;
                states.resize_with(opened, LegacyRoundStateV1::default);
                BucketState {
                    round_states: states
                        .into_iter()
                        .enumerate()
                        .map(|(round, state)| RoundState {
                            designations: state.designations.into_iter().collect(),
                            ancillary_designations: state.ancillary_designations,
                            ranks: match round_phases[round] {
                                RoundPhase::Resolved => Some(state.ranks.unwrap_or_default()),
                                _ => None,
                            },
                        })
                        .collect(),
                }
            })
            .collect();

        let ledger_rounds: Vec<RoundSelections> = (0..rounds)
            .map(|round| {
                let resolved = round_phases[round] == RoundPhase::Resolved;
                selections
                    .selections
                    .remove(&round)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(participant, slots)| {
                        let entries = slots
                            .into_iter()
                            .flatten()
                            .map(|legacy| Selection {
                                bucket_index: legacy.bucket_index,
                                ancillaries: legacy.ancillaries.into_iter().collect(),
                                state: if resolved { legacy.state } else { None },
                            })
                            .collect();
                        (participant, entries)
                    })
                    .collect()
            })
            .collect();

        Ok(DivisionState {
            basis,
            bucket_states,
            current_open_round,
            selections: SelectionLedger::from_rounds(ledger_rounds),
            round_phases,
            round_outcomes: vec![RoundOutcomes::new(); rounds],
            policy: ResolutionPolicy {
                exclusive_across_rounds: false,
                carry_over_claims: true,
            },
        })
    }
}
