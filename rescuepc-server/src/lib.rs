//! HTTP API for the RescuePC license service.
//!
//! Two routers share one [`AppState`]:
//! - the public router answers key validation for desktop clients
//! - the internal router accepts confirmed sales and admin actions, and is
//!   meant to be bound to a private interface only

mod api;
pub mod notify;

use axum::{
    Router,
    routing::{post, put},
};
use rescuepc_license::{
    EntitlementResolver, IssuanceConfig, IssuanceObserver, IssuanceService, KeyCodec,
    LicenseResult, LicenseStore, Validator,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use api::{
    ApiError, AssigneeRequest, LicenseView, SaleRequest, ValidateRequest, ValidateResponse,
};

/// Shared handles for every request.
pub struct AppState {
    pub store: Arc<dyn LicenseStore>,
    pub validator: Validator,
    pub issuance: IssuanceService,
}

impl AppState {
    /// Wires the validator and issuance service onto one store.
    ///
    /// # Errors
    ///
    /// Fails if the configured key prefix is invalid.
    pub fn new(
        store: Arc<dyn LicenseStore>,
        observer: Arc<dyn IssuanceObserver>,
        config: &IssuanceConfig,
    ) -> LicenseResult<Self> {
        let codec = KeyCodec::new(config.key_prefix.clone())?;
        Ok(Self {
            validator: Validator::new(Arc::clone(&store), codec, EntitlementResolver::new()),
            issuance: IssuanceService::new(Arc::clone(&store), observer, config)?,
            store,
        })
    }
}

/// Builds the public router (validation only).
pub fn build_public_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/validate",
            post(api::validate_post).get(api::validate_get),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds the internal router (sales intake and license administration).
pub fn build_internal_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sales", post(api::create_sale))
        .route("/licenses/{key}/revoke", post(api::revoke_license))
        .route("/licenses/{key}/assignee", put(api::assign_license))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
