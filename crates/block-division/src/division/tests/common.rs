use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::division::repository::{
    DivisionEvent, DivisionId, DivisionRecord, DivisionRepository, NotificationError,
    NotificationPublisher, RepositoryError,
};
use crate::division::{
    division_router, Basis, BasisDraft, BucketDefinition, DivisionService, DivisionState,
    ParticipantDefinition, ResolutionPolicy, Selection,
};

pub(super) fn bucket(name: &str, slots: u32, ancillaries: &[&str]) -> BucketDefinition {
    BucketDefinition {
        name: name.to_string(),
        available_slots: slots,
        available_ancillaries: ancillaries.iter().map(|name| name.to_string()).collect(),
    }
}

pub(super) fn participant(name: &str, picks: &[u32]) -> ParticipantDefinition {
    ParticipantDefinition {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_ascii_lowercase()),
        round_picks_allowed: picks.to_vec(),
    }
}

/// Single bucket with one slot, three participants with one pick in one round.
pub(super) fn oversubscribed_draft() -> BasisDraft {
    BasisDraft {
        bucket_definitions: vec![bucket("Week 1", 1, &[])],
        participant_definitions: vec![
            participant("Avery", &[1]),
            participant("Blake", &[1]),
            participant("Casey", &[1]),
        ],
        selection_round_names: vec!["Round 1".to_string()],
    }
}

/// Two buckets; the first offers one ancillary. Blake outranks Avery on picks allowed.
pub(super) fn ancillary_draft() -> BasisDraft {
    BasisDraft {
        bucket_definitions: vec![bucket("Week 1", 2, &["Black Butte"]), bucket("Week 2", 2, &[])],
        participant_definitions: vec![participant("Avery", &[2]), participant("Blake", &[3])],
        selection_round_names: vec!["Round 1".to_string()],
    }
}

/// Two rounds over two buckets; Dana is only eligible in the second round.
pub(super) fn two_round_draft() -> BasisDraft {
    BasisDraft {
        bucket_definitions: vec![bucket("Week 1", 1, &["Dock"]), bucket("Week 2", 2, &[])],
        participant_definitions: vec![
            participant("Avery", &[1, 1]),
            participant("Blake", &[2, 1]),
            participant("Casey", &[1, 2]),
            participant("Dana", &[0, 1]),
        ],
        selection_round_names: vec!["Predesignation".to_string(), "Round 1".to_string()],
    }
}

pub(super) fn basis(draft: BasisDraft) -> Basis {
    Basis::new(draft).expect("fixture basis is valid")
}

pub(super) fn open_division(draft: BasisDraft, policy: ResolutionPolicy) -> DivisionState {
    let mut state = DivisionState::new(basis(draft), policy);
    state.open_next_round().expect("first round opens");
    state
}

pub(super) fn picks(buckets: &[usize]) -> Vec<Selection> {
    buckets.iter().copied().map(Selection::new).collect()
}

pub(super) fn division_id(value: &str) -> DivisionId {
    DivisionId(value.to_string())
}

pub(super) fn build_service() -> (
    DivisionService<MemoryRepository, MemoryNotifier>,
    Arc<MemoryRepository>,
    Arc<MemoryNotifier>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let service =
        DivisionService::new(repository.clone(), notifier.clone(), ResolutionPolicy::default());
    (service, repository, notifier)
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) records: Arc<Mutex<HashMap<DivisionId, DivisionRecord>>>,
}

impl DivisionRepository for MemoryRepository {
    fn insert(&self, record: DivisionRecord) -> Result<DivisionRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: DivisionRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if !guard.contains_key(&record.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(record.id.clone(), record);
        Ok(())
    }

    fn fetch(&self, id: &DivisionId) -> Result<Option<DivisionRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<DivisionRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn delete(&self, id: &DivisionId) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.remove(id).map(|_| ()).ok_or(RepositoryError::NotFound)
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifier {
    events: Arc<Mutex<Vec<DivisionEvent>>>,
}

impl MemoryNotifier {
    pub(super) fn events(&self) -> Vec<DivisionEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationPublisher for MemoryNotifier {
    fn publish(&self, event: DivisionEvent) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl NotificationPublisher for FailingNotifier {
    fn publish(&self, _event: DivisionEvent) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp offline".to_string()))
    }
}

pub(super) struct UnavailableRepository;

impl DivisionRepository for UnavailableRepository {
    fn insert(&self, _record: DivisionRecord) -> Result<DivisionRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _record: DivisionRecord) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &DivisionId) -> Result<Option<DivisionRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self) -> Result<Vec<DivisionRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn delete(&self, _id: &DivisionId) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn division_router_with_service(
    service: DivisionService<MemoryRepository, MemoryNotifier>,
) -> axum::Router {
    division_router(Arc::new(service))
}
