use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequestParts, Path, Query, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

use super::access::{AccessError, Caller};
use super::directory::{
    CertificateQuery, CourseQuery, EnrollmentQuery, GradeQuery, InvoiceQuery, UserQuery,
};
use super::domain::{EnrollmentId, Role, SubjectId};
use super::revenue::RevenueQuery;
use super::service::CampusService;
use super::{
    CertificateRequest, EnrollmentRequest, GradeRequest, InvoiceRequest, WorkflowError,
};
use crate::storage::CampusRepository;

/// Header carrying the authenticated user id, set by the session provider.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's role code, e.g. `CASHIER`.
pub const USER_ROLE_HEADER: &str = "x-user-role";

type Shared<R> = State<Arc<CampusService<R>>>;

/// Router builder exposing the campus workflows over HTTP.
pub fn campus_router<R>(service: Arc<CampusService<R>>) -> Router
where
    R: CampusRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/enrollments",
            post(register_enrollment_handler::<R>).get(list_enrollments_handler::<R>),
        )
        .route(
            "/api/v1/enrollments/:enrollment_id",
            get(enrollment_handler::<R>),
        )
        .route(
            "/api/v1/enrollments/:enrollment_id/cancel",
            post(cancel_enrollment_handler::<R>),
        )
        .route(
            "/api/v1/invoices",
            post(issue_invoice_handler::<R>).get(list_invoices_handler::<R>),
        )
        .route(
            "/api/v1/grades",
            post(record_grade_handler::<R>).get(list_grades_handler::<R>),
        )
        .route(
            "/api/v1/certificates",
            post(issue_certificate_handler::<R>).get(list_certificates_handler::<R>),
        )
        .route("/api/v1/statistics/revenue", get(revenue_handler::<R>))
        .route("/api/v1/schools", get(schools_handler::<R>))
        .route("/api/v1/courses", get(courses_handler::<R>))
        .route("/api/v1/users", get(users_handler::<R>))
        .route("/api/v1/subjects/assigned", get(assigned_subjects_handler::<R>))
        .route(
            "/api/v1/subjects/:subject_id/students",
            get(subject_roster_handler::<R>),
        )
        .with_state(service)
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER);
        let role = header(parts, USER_ROLE_HEADER).and_then(Role::parse);
        match (user_id, role) {
            (Some(user_id), Some(role)) => Ok(Caller::new(user_id, role)),
            _ => Err(WorkflowError::from(AccessError::Unauthenticated).into_response()),
        }
    }
}

pub(crate) fn status_for(error: &WorkflowError) -> StatusCode {
    match error {
        WorkflowError::Validation(_) | WorkflowError::Rejected(_) => StatusCode::BAD_REQUEST,
        WorkflowError::Access(
            AccessError::Unauthenticated | AccessError::UnknownAccount { .. },
        ) => StatusCode::UNAUTHORIZED,
        WorkflowError::Access(_) => StatusCode::FORBIDDEN,
        WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
        WorkflowError::Conflict(_) => StatusCode::CONFLICT,
        WorkflowError::Dependency(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let message = match &self {
            WorkflowError::Dependency(source) => {
                error!(error = %source, "storage failure while serving request");
                "internal storage error".to_string()
            }
            other => other.to_string(),
        };
        let payload = json!({
            "kind": self.kind(),
            "error": message,
        });
        (status, Json(payload)).into_response()
    }
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, WorkflowError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Runs a service call on the blocking pool. Both stores take a mutex and SQLite touches disk.
async fn blocking<R, T, F>(
    service: Arc<CampusService<R>>,
    status: StatusCode,
    work: F,
) -> Response
where
    R: CampusRepository + 'static,
    T: Serialize + Send + 'static,
    F: FnOnce(&CampusService<R>) -> Result<T, WorkflowError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || work(&service)).await {
        Ok(result) => respond(status, result),
        Err(join) => {
            error!(error = %join, "workflow task did not complete");
            let payload = json!({
                "kind": "dependency",
                "error": "internal storage error",
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

fn malformed(detail: String) -> Response {
    let payload = json!({
        "kind": "validation",
        "error": detail,
    });
    (StatusCode::BAD_REQUEST, Json(payload)).into_response()
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| malformed(rejection.body_text()))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, Response> {
    params
        .map(|Query(value)| value)
        .map_err(|rejection| malformed(rejection.body_text()))
}

pub(crate) async fn register_enrollment_handler<R>(
    State(service): Shared<R>,
    caller: Caller,
    payload: Result<Json<EnrollmentRequest>, JsonRejection>,
) -> Response
where
    R: CampusRepository + 'static,
{
    match body(payload) {
        Ok(request) => {
            blocking(service, StatusCode::CREATED, move |service| {
                service.register_enrollment(&caller, request)
            })
            .await
        }
        Err(response) => response,
    }
}

pub(crate) async fn list_enrollments_handler<R>(
    State(service): Shared<R>,
    caller: Caller,
    params: Result<Query<EnrollmentQuery>, QueryRejection>,
) -> Response
where
    R: CampusRepository + 'static,
{
    match query(params) {
        Ok(filter) => {
            blocking(service, StatusCode::OK, move |service| {
                service.enrollments(&caller, filter)
            })
            .await
        }
        Err(response) => response,
    }
}

pub(crate) async fn enrollment_handler<R>(
    State(service): Shared<R>,
    caller: Caller,
    Path(enrollment_id): Path<String>,
) -> Response
where
    R: CampusRepository + 'static,
{
    let id = EnrollmentId(enrollment_id);
    blocking(service, StatusCode::OK, move |service| {
        service.enrollment(&caller, &id)
    })
    .await
}

pub(crate) async fn cancel_enrollment_handler<R>(
    State(service): Shared<R>,
    caller: Caller,
    Path(enrollment_id): Path<String>,
) -> Response
where
    R: CampusRepository + 'static,
{
    let id = EnrollmentId(enrollment_id);
    blocking(service, StatusCode::OK, move |service| {
        service.cancel_enrollment(&caller, &id)
    })
    .await
}

pub(crate) async fn issue_invoice_handler<R>(
    State(service): Shared<R>,
    caller: Caller,
    payload: Result<Json<InvoiceRequest>, JsonRejection>,
) -> Response
where
    R: CampusRepository + 'static,
{
    match body(payload) {
        Ok(request) => {
            blocking(service, StatusCode::CREATED, move |service| {
                service.issue_invoice(&caller, request)
            })
            .await
        }
        Err(response) => response,
    }
}

pub(crate) async fn list_invoices_handler<R>(
    State(service): Shared<R>,
    caller: Caller,
    params: Result<Query<InvoiceQuery>, QueryRejection>,
) -> Response
where
    R: CampusRepository + 'static,
{
    match query(params) {
        Ok(filter) => {
            blocking(service, StatusCode::OK, move |service| {
                service.invoices(&caller, filter)
            })
            .await
        }
        Err(response) => response,
    }
}

pub(crate) async fn record_grade_handler<R>(
    State(service): Shared<R>,
    caller: Caller,
    payload: Result<Json<GradeRequest>, JsonRejection>,
) -> Response
where
    R: CampusRepository + 'static,
{
    match body(payload) {
        Ok(request) => {
            blocking(service, StatusCode::CREATED, move |service| {
                service.record_grade(&caller, request)
            })
            .await
        }
        Err(response) => response,
    }
}

pub(crate) async fn list_grades_handler<R>(
    State(service): Shared<R>,
    caller: Caller,
    params: Result<Query<GradeQuery>, QueryRejection>,
) -> Response
where
    R: CampusRepository + 'static,
{
    match query(params) {
        Ok(filter) => {
            blocking(service, StatusCode::OK, move |service| {
                service.grades(&caller, filter)
            })
            .await
        }
        Err(response) => response,
    }
}

pub(crate) async fn issue_certificate_handler<R>(
    State(service): Shared<R>,
    caller: Caller,
    payload: Result<Json<CertificateRequest>, JsonRejection>,
) -> Response
where
    R: CampusRepository + 'static,
{
    match body(payload) {
        Ok(request) => {
            blocking(service, StatusCode::CREATED, move |service| {
                service.issue_certificate(&caller, request)
            })
            .await
        }
        Err(response) => response,
    }
}

pub(crate) async fn list_certificates_handler<R>(
    State(service): Shared<R>,
    caller: Caller,
    params: Result<Query<CertificateQuery>, QueryRejection>,
) -> Response
where
    R: CampusRepository + 'static,
{
    match query(params) {
        Ok(filter) => {
            blocking(service, StatusCode::OK, move |service| {
                service.certificates(&caller, filter)
            })
            .await
        }
        Err(response) => response,
    }
}

pub(crate) async fn revenue_handler<R>(
    State(service): Shared<R>,
    caller: Caller,
    params: Result<Query<RevenueQuery>, QueryRejection>,
) -> Response
where
    R: CampusRepository + 'static,
{
    match query(params) {
        Ok(filter) => {
            blocking(service, StatusCode::OK, move |service| {
                service.revenue(&caller, filter)
            })
            .await
        }
        Err(response) => response,
    }
}

pub(crate) async fn schools_handler<R>(State(service): Shared<R>) -> Response
where
    R: CampusRepository + 'static,
{
    blocking(service, StatusCode::OK, |service| service.schools()).await
}

pub(crate) async fn courses_handler<R>(
    State(service): Shared<R>,
    params: Result<Query<CourseQuery>, QueryRejection>,
) -> Response
where
    R: CampusRepository + 'static,
{
    match query(params) {
        Ok(filter) => {
            blocking(service, StatusCode::OK, move |service| service.courses(filter)).await
        }
        Err(response) => response,
    }
}

pub(crate) async fn users_handler<R>(
    State(service): Shared<R>,
    caller: Caller,
    params: Result<Query<UserQuery>, QueryRejection>,
) -> Response
where
    R: CampusRepository + 'static,
{
    match query(params) {
        Ok(filter) => {
            blocking(service, StatusCode::OK, move |service| {
                service.users(&caller, filter)
            })
            .await
        }
        Err(response) => response,
    }
}

pub(crate) async fn assigned_subjects_handler<R>(
    State(service): Shared<R>,
    caller: Caller,
) -> Response
where
    R: CampusRepository + 'static,
{
    blocking(service, StatusCode::OK, move |service| {
        service.assigned_subjects(&caller)
    })
    .await
}

pub(crate) async fn subject_roster_handler<R>(
    State(service): Shared<R>,
    caller: Caller,
    Path(subject_id): Path<String>,
) -> Response
where
    R: CampusRepository + 'static,
{
    let id = SubjectId(subject_id);
    blocking(service, StatusCode::OK, move |service| {
        service.subject_roster(&caller, &id)
    })
    .await
}
