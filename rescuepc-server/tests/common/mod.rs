//! Shared helpers for HTTP API tests.

#![allow(dead_code)]

use axum::Router;
use rescuepc_license::{
    IssuanceConfig, LicenseRecord, LicenseStore, MemoryLicenseStore, NoopObserver, Sale,
};
use rescuepc_server::{AppState, build_internal_router, build_public_router};
use std::sync::Arc;

pub struct TestApp {
    pub public: String,
    pub internal: String,
    pub state: Arc<AppState>,
}

impl TestApp {
    /// Issues a license directly through the service, bypassing HTTP.
    pub fn issue(&self, origin_ref: &str, license_type: &str) -> LicenseRecord {
        let sale = Sale::new(origin_ref, license_type, "owner@example.com").unwrap();
        self.state.issuance.issue(&sale, chrono::Utc::now()).unwrap()
    }
}

/// Spin up both listeners on OS-assigned ports over an in-memory store.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(Arc::new(MemoryLicenseStore::new())).await
}

pub async fn spawn_app_with(store: Arc<dyn LicenseStore>) -> TestApp {
    let state = Arc::new(
        AppState::new(store, Arc::new(NoopObserver), &IssuanceConfig::default()).unwrap(),
    );
    TestApp {
        public: serve(build_public_router(Arc::clone(&state))).await,
        internal: serve(build_internal_router(Arc::clone(&state))).await,
        state,
    }
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}
