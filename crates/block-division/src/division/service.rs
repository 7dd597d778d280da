use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{info, warn};

use super::basis::{Basis, BasisDraft, BasisError, ParticipantIndex, RoundIndex};
use super::repository::{
    DivisionEvent, DivisionEventKind, DivisionId, DivisionRecord, DivisionRepository,
    DivisionSummary, NotificationPublisher, RepositoryError,
};
use super::resolver::{ResolutionError, ResolutionPolicy};
use super::schema::{self, DivisionDocument, SchemaError};
use super::selection::{Selection, SubmissionError};
use super::state::{DivisionError, DivisionState};
use super::view::ParticipantView;

/// Hosts any number of independent divisions behind a repository.
///
/// Every operation on a division runs under that division's own lock, so
/// concurrent callers never interleave a read-modify-write on the same division.
pub struct DivisionService<R, P> {
    repository: Arc<R>,
    notifier: Arc<P>,
    default_policy: ResolutionPolicy,
    locks: Mutex<HashMap<DivisionId, Arc<Mutex<()>>>>,
}

impl<R, P> DivisionService<R, P>
where
    R: DivisionRepository + 'static,
    P: NotificationPublisher + 'static,
{
    pub fn new(repository: Arc<R>, notifier: Arc<P>, default_policy: ResolutionPolicy) -> Self {
        Self {
            repository,
            notifier,
            default_policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_policy(&self) -> ResolutionPolicy {
        self.default_policy
    }

    /// Validate a basis and store a fresh division with every round pending.
    pub fn create_division(
        &self,
        id: DivisionId,
        draft: BasisDraft,
        policy: Option<ResolutionPolicy>,
    ) -> Result<DivisionRecord, DivisionServiceError> {
        validate_id(&id)?;
        let basis = Basis::new(draft)?;
        let policy = policy.unwrap_or(self.default_policy);

        let record = self.with_lock(&id, || {
            self.repository
                .insert(DivisionRecord::new(id.clone(), DivisionState::new(basis, policy)))
        })?;
        info!(division = %record.id, rounds = record.state.basis().round_count(), "division created");
        Ok(record)
    }

    pub fn get_division_state(&self, id: &DivisionId) -> Result<DivisionState, DivisionServiceError> {
        Ok(self.fetch(id)?.state)
    }

    pub fn list_divisions(&self) -> Result<Vec<DivisionSummary>, DivisionServiceError> {
        let mut summaries: Vec<DivisionSummary> = self
            .repository
            .list()?
            .iter()
            .map(DivisionRecord::summary)
            .collect();
        summaries.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(summaries)
    }

    pub fn delete_division(&self, id: &DivisionId) -> Result<(), DivisionServiceError> {
        self.with_lock(id, || self.repository.delete(id))?;
        info!(division = %id, "division deleted");
        Ok(())
    }

    /// Record a participant's ranked picks for the open round, replacing any earlier ones.
    pub fn submit(
        &self,
        id: &DivisionId,
        round: RoundIndex,
        participant: ParticipantIndex,
        selections: Vec<Selection>,
    ) -> Result<(), DivisionServiceError> {
        self.mutate(id, |state| Ok(state.submit(round, participant, selections)?))
            .map(|(_, ())| ())
    }

    pub fn open_next_round(&self, id: &DivisionId) -> Result<RoundIndex, DivisionServiceError> {
        let (state, round) = self.mutate(id, |state| Ok(state.open_next_round()?))?;

        let basis = state.basis();
        let recipients = basis
            .eligible_participants(round)
            .map(|(_, definition)| definition.email.clone())
            .collect();
        self.notify(
            id,
            DivisionEventKind::RoundOpened {
                round,
                round_name: basis.round_name(round).unwrap_or_default().to_string(),
            },
            recipients,
        );
        Ok(round)
    }

    pub fn close_current_round(&self, id: &DivisionId) -> Result<RoundIndex, DivisionServiceError> {
        let (state, round) = self.mutate(id, |state| Ok(state.close_current_round()?))?;
        self.announce_close(id, &state, round);
        Ok(round)
    }

    pub fn close_round(
        &self,
        id: &DivisionId,
        round: RoundIndex,
    ) -> Result<RoundIndex, DivisionServiceError> {
        let (state, round) = self.mutate(id, |state| Ok(state.close_round(round)?))?;
        self.announce_close(id, &state, round);
        Ok(round)
    }

    pub fn participant_view(
        &self,
        id: &DivisionId,
        participant: ParticipantIndex,
    ) -> Result<ParticipantView, DivisionServiceError> {
        let state = self.fetch(id)?.state;
        state
            .participant_view(participant)
            .ok_or(DivisionServiceError::UnknownParticipant { participant })
    }

    /// Send one participant their access details. Delivery is best effort.
    pub fn invite_participant(
        &self,
        id: &DivisionId,
        participant: ParticipantIndex,
    ) -> Result<DivisionEvent, DivisionServiceError> {
        let state = self.fetch(id)?.state;
        let definition = state
            .basis()
            .participant(participant)
            .ok_or(DivisionServiceError::UnknownParticipant { participant })?;

        Ok(self.notify(
            id,
            DivisionEventKind::AccessInvite { participant },
            vec![definition.email.clone()],
        ))
    }

    /// Versioned JSON document for backups and transfers between hosts.
    pub fn export(&self, id: &DivisionId) -> Result<String, DivisionServiceError> {
        let record = self.fetch(id)?;
        let document = DivisionDocument::current(record.id.0, record.state);
        Ok(schema::encode(&document)?)
    }

    /// Store a previously exported (or legacy) document. `id` overrides the embedded one.
    pub fn import(
        &self,
        raw: &str,
        id: Option<DivisionId>,
    ) -> Result<DivisionRecord, DivisionServiceError> {
        let document = schema::decode(raw)?;
        let id = id
            .or_else(|| document.division_id.clone().map(DivisionId))
            .ok_or(DivisionServiceError::MissingDivisionId)?;
        validate_id(&id)?;

        let record = self.with_lock(&id, || {
            self.repository
                .insert(DivisionRecord::new(id.clone(), document.division))
        })?;
        info!(
            division = %record.id,
            resolved_rounds = record.state.resolved_rounds(),
            "division imported"
        );
        Ok(record)
    }

    fn fetch(&self, id: &DivisionId) -> Result<DivisionRecord, DivisionServiceError> {
        let record = self
            .repository
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(record)
    }

    /// Run `operation` against a working copy under the division lock and persist it
    /// only when the operation succeeds.
    fn mutate<T>(
        &self,
        id: &DivisionId,
        operation: impl FnOnce(&mut DivisionState) -> Result<T, DivisionServiceError>,
    ) -> Result<(DivisionState, T), DivisionServiceError> {
        self.with_lock(id, || {
            let mut record = self.fetch(id)?;
            let output = operation(&mut record.state)?;
            record.updated_at = Utc::now();
            let state = record.state.clone();
            self.repository.update(record)?;
            Ok((state, output))
        })
    }

    /// Run `operation` while holding the lock for `id`.
    ///
    /// Registry entries live only while some caller holds a handle to them, so ids that
    /// never resolve to a division leave nothing behind.
    fn with_lock<T>(&self, id: &DivisionId, operation: impl FnOnce() -> T) -> T {
        let lock = self.lock_for(id);
        let output = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            operation()
        };
        self.release(id, lock);
        output
    }

    fn lock_for(&self, id: &DivisionId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(id.clone()).or_default().clone()
    }

    fn release(&self, id: &DivisionId, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks
            .get(id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(id);
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn announce_close(&self, id: &DivisionId, state: &DivisionState, round: RoundIndex) {
        let basis = state.basis();
        let recipients = basis
            .eligible_participants(round)
            .map(|(_, definition)| definition.email.clone())
            .collect();
        self.notify(id, DivisionEventKind::RoundClosed { round }, recipients);

        if state.is_complete() {
            let everyone = basis
                .participant_definitions()
                .iter()
                .map(|definition| definition.email.clone())
                .collect();
            self.notify(id, DivisionEventKind::DivisionComplete, everyone);
        }
    }

    fn notify(
        &self,
        id: &DivisionId,
        kind: DivisionEventKind,
        recipients: Vec<String>,
    ) -> DivisionEvent {
        let event = DivisionEvent {
            division_id: id.clone(),
            kind,
            recipients,
            occurred_at: Utc::now(),
        };
        if let Err(error) = self.notifier.publish(event.clone()) {
            warn!(
                division = %id,
                event = event.kind.label(),
                %error,
                "division notification was not delivered"
            );
        }
        event
    }
}

fn validate_id(id: &DivisionId) -> Result<(), DivisionServiceError> {
    let value = id.0.trim();
    if value.is_empty() || value.len() != id.0.len() || id.0.contains('/') {
        return Err(DivisionServiceError::InvalidDivisionId(id.0.clone()));
    }
    Ok(())
}

/// Error raised by the division service.
#[derive(Debug, thiserror::Error)]
pub enum DivisionServiceError {
    #[error(transparent)]
    Basis(#[from] BasisError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Division(#[from] DivisionError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("participant {participant} is not part of this division")]
    UnknownParticipant { participant: ParticipantIndex },
    #[error("division id '{0}' must be non-empty without surrounding whitespace or '/'")]
    InvalidDivisionId(String),
    #[error("imported document carries no division id")]
    MissingDivisionId,
}
