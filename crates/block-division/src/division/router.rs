use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::basis::{BasisDraft, ParticipantIndex, RoundIndex};
use super::repository::{DivisionId, DivisionRepository, NotificationPublisher, RepositoryError};
use super::resolver::{ResolutionError, ResolutionPolicy};
use super::selection::{Selection, SubmissionError};
use super::service::{DivisionService, DivisionServiceError};

/// Router builder exposing HTTP endpoints for hosting and running divisions.
pub fn division_router<R, P>(service: Arc<DivisionService<R, P>>) -> Router
where
    R: DivisionRepository + 'static,
    P: NotificationPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/divisions",
            post(create_handler::<R, P>).get(list_handler::<R, P>),
        )
        .route("/api/v1/divisions/import", post(import_handler::<R, P>))
        .route(
            "/api/v1/divisions/:division_id",
            get(state_handler::<R, P>).delete(delete_handler::<R, P>),
        )
        .route(
            "/api/v1/divisions/:division_id/export",
            get(export_handler::<R, P>),
        )
        .route(
            "/api/v1/divisions/:division_id/rounds/open",
            post(open_round_handler::<R, P>),
        )
        .route(
            "/api/v1/divisions/:division_id/rounds/close",
            post(close_current_round_handler::<R, P>),
        )
        .route(
            "/api/v1/divisions/:division_id/rounds/:round/close",
            post(close_round_handler::<R, P>),
        )
        .route(
            "/api/v1/divisions/:division_id/rounds/:round/participants/:participant/selections",
            put(submit_handler::<R, P>),
        )
        .route(
            "/api/v1/divisions/:division_id/participants/:participant",
            get(participant_view_handler::<R, P>),
        )
        .route(
            "/api/v1/divisions/:division_id/participants/:participant/invite",
            post(invite_handler::<R, P>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateDivisionRequest {
    pub id: String,
    pub basis: BasisDraft,
    #[serde(default)]
    pub policy: Option<ResolutionPolicy>,
}

pub(crate) async fn create_handler<R, P>(
    State(service): State<Arc<DivisionService<R, P>>>,
    axum::Json(request): axum::Json<CreateDivisionRequest>,
) -> Response
where
    R: DivisionRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.create_division(DivisionId(request.id), request.basis, request.policy) {
        Ok(record) => (StatusCode::CREATED, axum::Json(record.summary())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_handler<R, P>(
    State(service): State<Arc<DivisionService<R, P>>>,
) -> Response
where
    R: DivisionRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.list_divisions() {
        Ok(summaries) => (StatusCode::OK, axum::Json(summaries)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn state_handler<R, P>(
    State(service): State<Arc<DivisionService<R, P>>>,
    Path(division_id): Path<String>,
) -> Response
where
    R: DivisionRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.get_division_state(&DivisionId(division_id)) {
        Ok(state) => (StatusCode::OK, axum::Json(state)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_handler<R, P>(
    State(service): State<Arc<DivisionService<R, P>>>,
    Path(division_id): Path<String>,
) -> Response
where
    R: DivisionRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.delete_division(&DivisionId(division_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn export_handler<R, P>(
    State(service): State<Arc<DivisionService<R, P>>>,
    Path(division_id): Path<String>,
) -> Response
where
    R: DivisionRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.export(&DivisionId(division_id)) {
        Ok(document) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            document,
        )
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn import_handler<R, P>(
    State(service): State<Arc<DivisionService<R, P>>>,
    body: String,
) -> Response
where
    R: DivisionRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.import(&body, None) {
        Ok(record) => (StatusCode::CREATED, axum::Json(record.summary())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn open_round_handler<R, P>(
    State(service): State<Arc<DivisionService<R, P>>>,
    Path(division_id): Path<String>,
) -> Response
where
    R: DivisionRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.open_next_round(&DivisionId(division_id)) {
        Ok(round) => (StatusCode::OK, axum::Json(json!({ "round": round, "phase": "open" })))
            .into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn close_current_round_handler<R, P>(
    State(service): State<Arc<DivisionService<R, P>>>,
    Path(division_id): Path<String>,
) -> Response
where
    R: DivisionRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.close_current_round(&DivisionId(division_id)) {
        Ok(round) => closed_response(round),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn close_round_handler<R, P>(
    State(service): State<Arc<DivisionService<R, P>>>,
    Path((division_id, round)): Path<(String, RoundIndex)>,
) -> Response
where
    R: DivisionRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.close_round(&DivisionId(division_id), round) {
        Ok(round) => closed_response(round),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<R, P>(
    State(service): State<Arc<DivisionService<R, P>>>,
    Path((division_id, round, participant)): Path<(String, RoundIndex, ParticipantIndex)>,
    axum::Json(selections): axum::Json<Vec<Selection>>,
) -> Response
where
    R: DivisionRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.submit(&DivisionId(division_id), round, participant, selections) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn participant_view_handler<R, P>(
    State(service): State<Arc<DivisionService<R, P>>>,
    Path((division_id, participant)): Path<(String, ParticipantIndex)>,
) -> Response
where
    R: DivisionRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.participant_view(&DivisionId(division_id), participant) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn invite_handler<R, P>(
    State(service): State<Arc<DivisionService<R, P>>>,
    Path((division_id, participant)): Path<(String, ParticipantIndex)>,
) -> Response
where
    R: DivisionRepository + 'static,
    P: NotificationPublisher + 'static,
{
    match service.invite_participant(&DivisionId(division_id), participant) {
        Ok(event) => (StatusCode::ACCEPTED, axum::Json(event)).into_response(),
        Err(error) => error_response(error),
    }
}

fn closed_response(round: RoundIndex) -> Response {
    (
        StatusCode::OK,
        axum::Json(json!({ "round": round, "phase": "resolved" })),
    )
        .into_response()
}

pub(crate) fn status_for(error: &DivisionServiceError) -> StatusCode {
    match error {
        DivisionServiceError::Repository(RepositoryError::NotFound)
        | DivisionServiceError::UnknownParticipant { .. }
        | DivisionServiceError::Resolution(ResolutionError::UnknownRound { .. }) => {
            StatusCode::NOT_FOUND
        }
        DivisionServiceError::Repository(RepositoryError::Conflict)
        | DivisionServiceError::Division(_)
        | DivisionServiceError::Submission(SubmissionError::RoundClosed { .. })
        | DivisionServiceError::Resolution(
            ResolutionError::NoOpenRound
            | ResolutionError::AlreadyClosed { .. }
            | ResolutionError::RoundNotOpen { .. },
        ) => StatusCode::CONFLICT,
        DivisionServiceError::Basis(_)
        | DivisionServiceError::Submission(_)
        | DivisionServiceError::Schema(_)
        | DivisionServiceError::InvalidDivisionId(_)
        | DivisionServiceError::MissingDivisionId => StatusCode::UNPROCESSABLE_ENTITY,
        DivisionServiceError::Repository(RepositoryError::Unavailable(_))
        | DivisionServiceError::Resolution(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: DivisionServiceError) -> Response {
    let payload = json!({
        "error": error.to_string(),
    });
    (status_for(&error), axum::Json(payload)).into_response()
}
