//! CSV roster import producing a validated [`Basis`].
//!
//! Buckets: `name,available_slots,ancillaries` with `;` separating ancillary names.
//! Participants: `name,email` followed by one column per round; the round column
//! headers become the round names and each cell is the picks allowed that round.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::basis::{Basis, BasisDraft, BasisError, BucketDefinition, ParticipantDefinition};

#[derive(Debug, thiserror::Error)]
pub enum RosterImportError {
    #[error("failed to read roster export: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid roster CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("participants CSV must start with name,email columns")]
    MissingParticipantColumns,
    #[error("participant row {row}: picks for round '{round}' must be a whole number, found '{value}'")]
    InvalidPicks {
        row: usize,
        round: String,
        value: String,
    },
    #[error(transparent)]
    Basis(#[from] BasisError),
}

pub struct RosterImporter;

impl RosterImporter {
    pub fn from_paths<B: AsRef<Path>, P: AsRef<Path>>(
        buckets: B,
        participants: P,
    ) -> Result<Basis, RosterImportError> {
        let buckets = std::fs::File::open(buckets)?;
        let participants = std::fs::File::open(participants)?;
        Self::from_readers(buckets, participants)
    }

    pub fn from_readers<B: Read, P: Read>(
        buckets: B,
        participants: P,
    ) -> Result<Basis, RosterImportError> {
        let bucket_definitions = parse_buckets(buckets)?;
        let (selection_round_names, participant_definitions) = parse_participants(participants)?;

        let basis = Basis::new(BasisDraft {
            bucket_definitions,
            participant_definitions,
            selection_round_names,
        })?;
        Ok(basis)
    }
}

#[derive(Debug, Deserialize)]
struct BucketRow {
    name: String,
    available_slots: u32,
    #[serde(default, deserialize_with = "split_ancillaries")]
    ancillaries: Vec<String>,
}

fn split_ancillaries<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .split(';')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect())
}

fn parse_buckets<R: Read>(reader: R) -> Result<Vec<BucketDefinition>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut buckets = Vec::new();

    for record in csv_reader.deserialize::<BucketRow>() {
        let row = record?;
        buckets.push(BucketDefinition {
            name: row.name,
            available_slots: row.available_slots,
            available_ancillaries: row.ancillaries,
        });
    }

    Ok(buckets)
}

fn parse_participants<R: Read>(
    reader: R,
) -> Result<(Vec<String>, Vec<ParticipantDefinition>), RosterImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let leading: Vec<String> = headers
        .iter()
        .take(2)
        .map(|header| header.to_ascii_lowercase())
        .collect();
    if leading != ["name", "email"] {
        return Err(RosterImportError::MissingParticipantColumns);
    }
    let rounds: Vec<String> = headers.iter().skip(2).map(str::to_string).collect();

    let mut participants = Vec::new();
    for (row, record) in csv_reader.records().enumerate() {
        let record = record?;
        let mut round_picks_allowed = Vec::with_capacity(rounds.len());
        for (offset, round) in rounds.iter().enumerate() {
            let value = record.get(offset + 2).unwrap_or("");
            let picks = if value.is_empty() {
                0
            } else {
                value
                    .parse::<u32>()
                    .map_err(|_| RosterImportError::InvalidPicks {
                        row: row + 1,
                        round: round.clone(),
                        value: value.to_string(),
                    })?
            };
            round_picks_allowed.push(picks);
        }

        participants.push(ParticipantDefinition {
            name: record.get(0).unwrap_or("").to_string(),
            email: record.get(1).unwrap_or("").to_string(),
            round_picks_allowed,
        });
    }

    Ok((rounds, participants))
}
