//! Request handlers and wire types.

use crate::AppState;
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use rescuepc_license::{
    Expiry, Feature, InvalidReason, LicenseError, LicenseRecord, LicenseResult, LicenseStatus,
    LicenseType, Sale, ValidationResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ── Wire types ───────────────────────────────────────────────────

/// Body of `POST /validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub key: String,
}

/// Validation verdict. Invalid keys still answer 200 with `valid: false`.
///
/// The seat holder is left out: anyone holding a key can call this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_type: Option<LicenseType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<Feature>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Expiry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seats: Option<u32>,
}

impl From<ValidationResult> for ValidateResponse {
    fn from(result: ValidationResult) -> Self {
        match result {
            ValidationResult::Valid(grant) => Self {
                valid: true,
                reason: None,
                license_type: Some(grant.license_type),
                features: Some(grant.features),
                expires_at: Some(grant.expires_at),
                seats: grant.seats,
            },
            ValidationResult::Invalid(reason) => Self {
                valid: false,
                reason: Some(reason),
                license_type: None,
                features: None,
                expires_at: None,
                seats: None,
            },
        }
    }
}

/// Query string of `GET /validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateQuery {
    pub key: String,
}

/// A confirmed sale forwarded by the payment webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRequest {
    pub origin_ref: String,
    pub license_type: String,
    pub owner_email: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
}

impl SaleRequest {
    fn into_sale(self) -> LicenseResult<Sale> {
        let sale = Sale::new(&self.origin_ref, &self.license_type, &self.owner_email)?;
        Ok(match self.assigned_to {
            Some(assignee) => sale.with_assignee(assignee),
            None => sale,
        })
    }
}

/// Body of `PUT /licenses/{key}/assignee`; `null` clears the seat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssigneeRequest {
    #[serde(default)]
    pub assigned_to: Option<String>,
}

/// Administrative view of a stored license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseView {
    pub key: String,
    pub owner_email: String,
    pub license_type: LicenseType,
    pub license_name: String,
    pub status: LicenseStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Expiry,
    pub origin_ref: String,
    pub assigned_to: Option<String>,
    pub rules_version: u16,
}

impl LicenseView {
    fn new(record: LicenseRecord, now: DateTime<Utc>) -> Self {
        Self {
            key: record.key.to_string(),
            status: record.effective_status(now),
            license_name: record.license_type.display_name().to_string(),
            owner_email: record.owner_email,
            license_type: record.license_type,
            issued_at: record.issued_at,
            expires_at: record.expires_at,
            origin_ref: record.origin_ref,
            assigned_to: record.assigned_to,
            rules_version: record.rules_version,
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: &'a str,
}

/// An error response: HTTP status plus a stable machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// A 400 for request bodies or query strings that failed to parse.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL",
            message: message.into(),
        }
    }

    /// HTTP status of the response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code, e.g. `STORE_UNAVAILABLE`.
    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        let (status, code) = match &err {
            LicenseError::MalformedFormat(_) => (StatusCode::BAD_REQUEST, "MALFORMED_KEY"),
            LicenseError::UnknownLicenseType(_) => {
                (StatusCode::BAD_REQUEST, "UNKNOWN_LICENSE_TYPE")
            }
            LicenseError::InvalidEmail(_) => (StatusCode::BAD_REQUEST, "INVALID_EMAIL"),
            LicenseError::InvalidSale(_) => (StatusCode::BAD_REQUEST, "INVALID_SALE"),
            LicenseError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            LicenseError::Revoked(_) => (StatusCode::CONFLICT, "REVOKED"),
            LicenseError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION")
            }
            LicenseError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            LicenseError::StoreUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
            }
            LicenseError::Storage(_) | LicenseError::Serialization(_) => {
                tracing::error!(error = %err, "internal license error");
                return Self::internal(err.to_string());
            }
        };
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.message,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

// ── Handlers ─────────────────────────────────────────────────────

/// Runs a store-bound call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> LicenseResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::internal(format!("task failed: {e}")))?
        .map_err(ApiError::from)
}

async fn validate(state: Arc<AppState>, key: String) -> Result<Json<ValidateResponse>, ApiError> {
    let result = blocking(move || state.validator.validate(&key, Utc::now())).await?;
    Ok(Json(result.into()))
}

pub(crate) async fn validate_post(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    validate(state, request.key).await
}

pub(crate) async fn validate_get(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ValidateQuery>, QueryRejection>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    validate(state, query.key).await
}

pub(crate) async fn create_sale(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SaleRequest>, JsonRejection>,
) -> Result<Json<LicenseView>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let sale = request.into_sale()?;
    let now = Utc::now();
    let record = blocking(move || state.issuance.issue(&sale, now)).await?;
    Ok(Json(LicenseView::new(record, now)))
}

pub(crate) async fn revoke_license(
    State(state): State<Arc<AppState>>,
    Path(raw_key): Path<String>,
) -> Result<Json<LicenseView>, ApiError> {
    let key = state.issuance.codec().parse(&raw_key)?;
    let record = blocking(move || state.store.set_status(&key, LicenseStatus::Revoked)).await?;
    Ok(Json(LicenseView::new(record, Utc::now())))
}

pub(crate) async fn assign_license(
    State(state): State<Arc<AppState>>,
    Path(raw_key): Path<String>,
    body: Result<Json<AssigneeRequest>, JsonRejection>,
) -> Result<Json<LicenseView>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let key = state.issuance.codec().parse(&raw_key)?;
    let assignee = request
        .assigned_to
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());
    let record = blocking(move || state.store.assign(&key, assignee.as_deref())).await?;
    Ok(Json(LicenseView::new(record, Utc::now())))
}
