//! Multi-round division of participants into capacity-limited buckets.
//!
//! A [`Basis`] fixes the buckets, participants and rounds. Each round is opened,
//! collects ranked selections into the [`SelectionLedger`], and is closed by a
//! deterministic [`RoundResolver`] pass whose result is committed to the
//! [`DivisionState`] in one step. The service, router and repository layers wrap the
//! engine for multi-division hosting.

pub mod basis;
pub mod repository;
pub mod resolver;
pub mod roster;
pub mod round;
pub mod router;
pub mod schema;
pub mod selection;
pub mod service;
pub mod state;
pub mod view;

#[cfg(test)]
mod tests;

pub use basis::{
    AncillaryIndex, Basis, BasisDraft, BasisError, BucketDefinition, BucketIndex,
    ParticipantDefinition, ParticipantIndex, RoundIndex,
};
pub use repository::{
    DivisionEvent, DivisionEventKind, DivisionId, DivisionRecord, DivisionRepository,
    DivisionSummary, NotificationError, NotificationPublisher, RepositoryError,
};
pub use resolver::{ResolutionError, ResolutionPolicy, RoundResolution, RoundResolver};
pub use roster::{RosterImportError, RosterImporter};
pub use round::{BucketState, RankStatus, RoundPhase, RoundState};
pub use router::division_router;
pub use schema::{DivisionDocument, SchemaError, CURRENT_SCHEMA_VERSION};
pub use selection::{RoundSelections, Selection, SelectionLedger, SelectionState, SubmissionError};
pub use service::{DivisionService, DivisionServiceError};
pub use state::{DivisionError, DivisionState, RoundOutcomes};
pub use view::{ParticipantRoundView, ParticipantView};
