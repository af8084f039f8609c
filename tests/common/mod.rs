#![allow(dead_code)]

use std::sync::Arc;
use bitdex::api::{ApiRequest, ApiResponse, Handler, StaticToken};
use bitdex::{Config, Database};

pub const TOKEN: &str = "admin-token";

pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn handler() -> Handler {
    setup_tracing();
    let config = Config::default().with_shard_count(4).with_worker_threads(2);
    let db = Database::open(config).expect("open database");
    Handler::new(Arc::new(db), Arc::new(StaticToken::new(TOKEN)))
}

/// Sends a request the way an authenticated HTTP client would.
pub fn send(handler: &Handler, request: ApiRequest) -> ApiResponse {
    handler.handle(request.with_authorization(&format!("Bearer {}", TOKEN)))
}
