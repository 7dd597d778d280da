use crate::infra::{InMemoryDivisionRepository, LoggingNotifier};
use block_division::division::schema::{self, DivisionDocument};
use block_division::division::{
    Basis, BasisDraft, DivisionId, DivisionService, DivisionServiceError, DivisionState,
    ResolutionPolicy, RosterImporter, RoundIndex, Selection,
};
use block_division::error::AppError;
use chrono::Utc;
use clap::Args;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

const SAMPLE_BUCKETS: &str = "\
name,available_slots,ancillaries
June 6-13,2,Black Butte;Boathouse
June 13-20,2,Black Butte
June 20-27,1,
June 27-July 4,3,Boathouse
";

const SAMPLE_PARTICIPANTS: &str = "\
name,email,Predesignation,Round 1,Round 2
Avery,avery@example.com,1,2,1
Blake,blake@example.com,2,1,1
Casey,casey@example.com,0,2,2
Dana,dana@example.com,1,1,0
Emery,emery@example.com,1,3,1
";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Buckets CSV (name,available_slots,ancillaries). Defaults to a built-in sample.
    #[arg(long, requires = "participants")]
    pub(crate) buckets: Option<PathBuf>,
    /// Participants CSV (name,email,<one column per round>).
    #[arg(long, requires = "buckets")]
    pub(crate) participants: Option<PathBuf>,
    /// Participants designated in an earlier round may not contend again.
    #[arg(long)]
    pub(crate) exclusive_across_rounds: bool,
    /// Slots and ancillaries claimed in earlier rounds stay claimed.
    #[arg(long)]
    pub(crate) carry_over_claims: bool,
    /// Write the finished division as a versioned JSON document.
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct ResolveArgs {
    /// Exported division document whose open round should be closed
    #[arg(long)]
    pub(crate) state: PathBuf,
    /// Write the resolved document here instead of printing it
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let basis = match (&args.buckets, &args.participants) {
        (Some(buckets), Some(participants)) => RosterImporter::from_paths(buckets, participants)?,
        _ => RosterImporter::from_readers(
            Cursor::new(SAMPLE_BUCKETS.as_bytes()),
            Cursor::new(SAMPLE_PARTICIPANTS.as_bytes()),
        )?,
    };
    let policy = ResolutionPolicy {
        exclusive_across_rounds: args.exclusive_across_rounds,
        carry_over_claims: args.carry_over_claims,
    };

    let notifier = Arc::new(LoggingNotifier::default());
    let service = DivisionService::new(
        Arc::new(InMemoryDivisionRepository::default()),
        notifier.clone(),
        policy,
    );
    let id = DivisionId(format!("demo-{}", Utc::now().format("%Y%m%d%H%M%S")));
    service.create_division(id.clone(), BasisDraft::from(basis.clone()), None)?;

    println!("Division {id}");
    println!(
        "  {} buckets, {} participants, {} rounds",
        basis.bucket_count(),
        basis.participant_count(),
        basis.round_count()
    );

    for _ in 0..basis.round_count() {
        let round = service.open_next_round(&id)?;
        for (participant, definition) in basis.eligible_participants(round) {
            let selections = sample_selections(&basis, round, participant, definition.picks_allowed(round));
            service.submit(&id, round, participant, selections)?;
        }
        service.close_current_round(&id)?;

        let state = service.get_division_state(&id)?;
        print_round(&state, round);
    }

    println!();
    println!("Notifications sent: {}", notifier.events().len());

    if let Some(path) = args.output {
        std::fs::write(&path, service.export(&id)?)?;
        println!("Division document written to {}", path.display());
    }

    Ok(())
}

pub(crate) fn run_resolve(args: ResolveArgs) -> Result<(), AppError> {
    let raw = std::fs::read_to_string(&args.state)?;
    let mut document = schema::decode(&raw).map_err(DivisionServiceError::from)?;

    let round = document
        .division
        .close_current_round()
        .map_err(DivisionServiceError::from)?;
    let resolved = DivisionDocument {
        exported_at: Some(Utc::now()),
        ..document
    };
    let encoded = schema::encode(&resolved).map_err(DivisionServiceError::from)?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, encoded)?;
            print_round(&resolved.division, round);
            println!("Resolved document written to {}", path.display());
        }
        None => println!("{encoded}"),
    }
    Ok(())
}

/// Deterministic picks: start at a participant-specific bucket and walk forward,
/// asking for the first ancillary on even-numbered participants' top choice.
fn sample_selections(
    basis: &Basis,
    round: RoundIndex,
    participant: usize,
    allowed: u32,
) -> Vec<Selection> {
    let bucket_count = basis.bucket_count();
    let picks = (allowed as usize).min(bucket_count);

    (0..picks)
        .map(|offset| {
            let bucket = (participant + round + offset) % bucket_count;
            let wants_ancillary = offset == 0
                && participant % 2 == 0
                && basis
                    .bucket(bucket)
                    .is_some_and(|definition| !definition.available_ancillaries.is_empty());
            if wants_ancillary {
                Selection::new(bucket).with_ancillaries([0])
            } else {
                Selection::new(bucket)
            }
        })
        .collect()
}

fn print_round(state: &DivisionState, round: RoundIndex) {
    let basis = state.basis();
    println!();
    println!(
        "Round {round}: {}",
        basis.round_name(round).unwrap_or("unnamed")
    );

    for (bucket, definition) in basis.bucket_definitions().iter().enumerate() {
        let Some(round_state) = state.round_state(bucket, round) else {
            continue;
        };
        let seated: Vec<String> = round_state
            .designations
            .iter()
            .map(|participant| {
                let name = basis
                    .participant(*participant)
                    .map(|definition| definition.name.as_str())
                    .unwrap_or("?");
                let extras: Vec<&str> = round_state
                    .ancillaries_held_by(*participant)
                    .filter_map(|ancillary| definition.available_ancillaries.get(ancillary))
                    .map(String::as_str)
                    .collect();
                if extras.is_empty() {
                    name.to_string()
                } else {
                    format!("{name} (+{})", extras.join(", "))
                }
            })
            .collect();
        println!(
            "  {:<16} {}/{}  {}",
            definition.name,
            round_state.designations.len(),
            definition.available_slots,
            seated.join(", ")
        );
    }

    if let Some(outcomes) = state.round_outcomes(round) {
        for (participant, outcome) in outcomes {
            let name = basis
                .participant(*participant)
                .map(|definition| definition.name.as_str())
                .unwrap_or("?");
            println!("  {name}: {}", outcome.label());
        }
    }
}
