//! JSON API for leave applications.
//!
//! - `POST /api/applications`: submit an application
//! - `GET  /api/applications`: newest applications first
//! - `POST /api/approve`: advance an application one tier
//! - `POST /api/reject`: reject a pending application
//! - `GET  /api/approvals?appId=`: audit trail for one application
//! - `POST /api/login`: exchange demo credentials for a bearer token

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use wfh_core::credentials::verify_password;
use wfh_core::domain::application::{
    Application, ApplicationId, ApplicationStatus, LeaveKind, NewApplication,
};
use wfh_core::domain::approval::{ApprovalAction, ApprovalRecord, Decision};
use wfh_core::domain::user::Role;
use wfh_core::errors::{ApplicationError, DomainError, InterfaceError};
use wfh_db::{ApplicationRepository, UserRepository, MAX_LIST_LIMIT};

use crate::auth::{Identity, TokenIssuer};
use crate::context::{ClientIp, CorrelationId, CORRELATION_HEADER};

#[derive(Clone)]
pub struct ApiState {
    pub applications: Arc<dyn ApplicationRepository>,
    pub users: Arc<dyn UserRepository>,
    pub tokens: Arc<TokenIssuer>,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct CreateApplicationRequest {
    #[serde(default)]
    pub dates: Vec<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResponse {
    pub app_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub app_id: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub status: ApplicationStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalsQuery {
    pub app_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationView {
    pub app_id: i64,
    pub applicant_email: String,
    pub applicant_name: String,
    pub department: String,
    pub dates: Vec<String>,
    #[serde(rename = "type")]
    pub kind: LeaveKind,
    pub reason: Option<String>,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Application> for ApplicationView {
    fn from(value: Application) -> Self {
        Self {
            app_id: value.id.0,
            applicant_email: value.applicant.email,
            applicant_name: value.applicant.name,
            department: value.applicant.department,
            dates: value.dates,
            kind: value.kind,
            reason: value.reason,
            status: value.status,
            submitted_at: value.submitted_at,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalView {
    pub id: i64,
    pub app_id: i64,
    pub sequence: u32,
    pub actor_email: String,
    pub actor_name: String,
    pub actor_role: Role,
    pub action: ApprovalAction,
    pub comment: Option<String>,
    pub actor_ip: Option<String>,
    pub acted_at: DateTime<Utc>,
}

impl From<ApprovalRecord> for ApprovalView {
    fn from(value: ApprovalRecord) -> Self {
        Self {
            id: value.id,
            app_id: value.application_id.0,
            sequence: value.sequence,
            actor_email: value.actor_email,
            actor_name: value.actor_name,
            actor_role: value.actor_role,
            action: value.action,
            comment: value.comment,
            actor_ip: value.actor_ip,
            acted_at: value.acted_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

/// Error response carrying the client-safe message and the request's correlation id.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    pub fn from_application(correlation: &CorrelationId, error: ApplicationError) -> Self {
        let interface = error.into_interface(correlation.as_str());
        if interface.status_code() >= 500 {
            error!(
                event_name = "api.request.failed",
                correlation_id = %correlation.as_str(),
                error = %interface,
                "request failed"
            );
        } else {
            warn!(
                event_name = "api.request.refused",
                correlation_id = %correlation.as_str(),
                status = interface.status_code(),
                error = %interface,
                "request refused"
            );
        }
        Self(interface)
    }

    fn validation(correlation: &CorrelationId, message: impl Into<String>) -> Self {
        Self::from_application(correlation, DomainError::Validation(message.into()).into())
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { message: self.0.user_message().to_string() };
        let mut response = (self.status(), Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(self.0.correlation_id()) {
            response.headers_mut().insert(CORRELATION_HEADER, value);
        }
        response
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/applications", post(create_application).get(list_applications))
        .route("/api/approve", post(approve))
        .route("/api/reject", post(reject))
        .route("/api/approvals", get(list_approvals))
        .route("/api/login", post(login))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn create_application(
    State(state): State<ApiState>,
    correlation: CorrelationId,
    identity: Identity,
    payload: Result<Json<CreateApplicationRequest>, JsonRejection>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let Json(body) =
        payload.map_err(|rejection| ApiError::validation(&correlation, rejection.body_text()))?;

    let kind = match body.kind.as_deref().map(str::trim).filter(|kind| !kind.is_empty()) {
        None => LeaveKind::default(),
        Some(raw) => LeaveKind::parse(raw).ok_or_else(|| {
            ApiError::validation(&correlation, format!("unknown leave type `{raw}`"))
        })?,
    };

    let draft = NewApplication {
        applicant: identity.applicant(),
        dates: body.dates,
        kind,
        reason: body.reason,
    }
    .validate()
    .map_err(|error| ApiError::from_application(&correlation, error.into()))?;

    let id = state
        .applications
        .create(draft)
        .await
        .map_err(|error| ApiError::from_application(&correlation, error.into()))?;

    info!(
        event_name = "api.application.created",
        correlation_id = %correlation.as_str(),
        application_id = %id,
        kind = kind.as_str(),
        "application submitted"
    );
    Ok(Json(CreatedResponse { app_id: id.0 }))
}

pub async fn list_applications(
    State(state): State<ApiState>,
    correlation: CorrelationId,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<ApplicationView>>, ApiError> {
    let Query(query) =
        query.map_err(|rejection| ApiError::validation(&correlation, rejection.body_text()))?;

    let applications = state
        .applications
        .list(query.limit.unwrap_or(MAX_LIST_LIMIT))
        .await
        .map_err(|error| ApiError::from_application(&correlation, error.into()))?;

    Ok(Json(applications.into_iter().map(ApplicationView::from).collect()))
}

pub async fn approve(
    State(state): State<ApiState>,
    correlation: CorrelationId,
    identity: Identity,
    client_ip: ClientIp,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    decide(state, correlation, identity, client_ip, payload, ApprovalAction::Approved).await
}

pub async fn reject(
    State(state): State<ApiState>,
    correlation: CorrelationId,
    identity: Identity,
    client_ip: ClientIp,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    decide(state, correlation, identity, client_ip, payload, ApprovalAction::Rejected).await
}

async fn decide(
    state: ApiState,
    correlation: CorrelationId,
    identity: Identity,
    ClientIp(client_ip): ClientIp,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
    action: ApprovalAction,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(body) =
        payload.map_err(|rejection| ApiError::validation(&correlation, rejection.body_text()))?;

    let comment = body.comment.map(|text| text.trim().to_string()).filter(|text| !text.is_empty());
    let mut decision = Decision { action, actor: identity.actor(), comment, actor_ip: None };
    if let Some(ip) = client_ip {
        decision = decision.with_actor_ip(ip);
    }

    let application_id = ApplicationId(body.app_id);
    let outcome = state
        .applications
        .decide(application_id, decision)
        .await
        .map_err(|error| ApiError::from_application(&correlation, error.into()))?;

    info!(
        event_name = "api.application.decided",
        correlation_id = %correlation.as_str(),
        application_id = %application_id,
        action = action.as_str(),
        from = %outcome.from,
        status = %outcome.status,
        sequence = outcome.record.sequence,
        "application decision recorded"
    );
    Ok(Json(StatusResponse { status: outcome.status }))
}

pub async fn list_approvals(
    State(state): State<ApiState>,
    correlation: CorrelationId,
    query: Result<Query<ApprovalsQuery>, QueryRejection>,
) -> Result<Json<Vec<ApprovalView>>, ApiError> {
    let Query(query) =
        query.map_err(|rejection| ApiError::validation(&correlation, rejection.body_text()))?;
    let app_id =
        query.app_id.ok_or_else(|| ApiError::validation(&correlation, "appId is required"))?;

    let records = state
        .applications
        .list_approvals(ApplicationId(app_id))
        .await
        .map_err(|error| ApiError::from_application(&correlation, error.into()))?;

    Ok(Json(records.into_iter().map(ApprovalView::from).collect()))
}

pub async fn login(
    State(state): State<ApiState>,
    correlation: CorrelationId,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(body) =
        payload.map_err(|rejection| ApiError::validation(&correlation, rejection.body_text()))?;
    let unauthorized = || {
        ApiError::from_application(
            &correlation,
            ApplicationError::Unauthorized("invalid username or password".to_string()),
        )
    };

    let account = state
        .users
        .find_by_username(body.username.trim())
        .await
        .map_err(|error| ApiError::from_application(&correlation, error.into()))?
        .ok_or_else(unauthorized)?;
    if !verify_password(&body.password, &account.password_hash) {
        return Err(unauthorized());
    }

    let token = state.tokens.issue(&account).map_err(|error| {
        ApiError::from_application(&correlation, ApplicationError::Persistence(error.to_string()))
    })?;

    info!(
        event_name = "api.login.succeeded",
        correlation_id = %correlation.as_str(),
        username = %account.username,
        role = account.role.as_str(),
        "issued bearer token"
    );
    Ok(Json(LoginResponse { token, name: account.name, role: account.role }))
}
