use block_division::division::{
    DivisionEvent, DivisionId, DivisionRecord, DivisionRepository, NotificationError,
    NotificationPublisher, RepositoryError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryDivisionRepository {
    records: Arc<Mutex<HashMap<DivisionId, DivisionRecord>>>,
}

impl DivisionRepository for InMemoryDivisionRepository {
    fn insert(&self, record: DivisionRecord) -> Result<DivisionRecord, RepositoryError> {
        let mut guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, record: DivisionRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.contains_key(&record.id) {
            guard.insert(record.id.clone(), record);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &DivisionId) -> Result<Option<DivisionRecord>, RepositoryError> {
        let guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<DivisionRecord>, RepositoryError> {
        let guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.values().cloned().collect())
    }

    fn delete(&self, id: &DivisionId) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}

/// Writes every division event to the log; stands in for a mail or chat transport.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotifier {
    events: Arc<Mutex<Vec<DivisionEvent>>>,
}

impl NotificationPublisher for LoggingNotifier {
    fn publish(&self, event: DivisionEvent) -> Result<(), NotificationError> {
        info!(
            division = %event.division_id,
            event = event.kind.label(),
            recipients = event.recipients.len(),
            occurred_at = %event.occurred_at.to_rfc3339(),
            "division notification"
        );
        let mut guard = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        guard.push(event);
        Ok(())
    }
}

impl LoggingNotifier {
    pub(crate) fn events(&self) -> Vec<DivisionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
