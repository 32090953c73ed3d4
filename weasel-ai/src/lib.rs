//! weasel-ai library interface
//!
//! Exposes the service pieces for the binary and for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
pub mod validation;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::pipeline::Pipeline;
use crate::services::{ComplianceAnalyzer, LanguageModel, ResponseEvaluator};
use crate::storage::StorageClient;

/// Headroom on top of the file size limit for multipart framing
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: StorageClient,
    pub pipeline: Pipeline,
    pub evaluator: ResponseEvaluator,
    pub max_file_size_mb: u64,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        storage: StorageClient,
        pipeline: Pipeline,
        evaluator: ResponseEvaluator,
        max_file_size_mb: u64,
    ) -> Self {
        Self {
            storage,
            pipeline,
            evaluator,
            max_file_size_mb,
            startup_time: Utc::now(),
        }
    }

    /// Wire analyzer, pipeline and evaluator around one model client
    pub fn from_model(storage: StorageClient, model: Arc<dyn LanguageModel>, max_file_size_mb: u64) -> Self {
        let pipeline = Pipeline::new(storage.clone(), ComplianceAnalyzer::new(model.clone()));
        Self::new(storage, pipeline, ResponseEvaluator::new(model), max_file_size_mb)
    }

    fn body_limit(&self) -> usize {
        let max = validation::max_size_bytes(self.max_file_size_mb);
        usize::try_from(max)
            .unwrap_or(usize::MAX)
            .saturating_add(MULTIPART_OVERHEAD_BYTES)
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.body_limit();

    Router::new()
        .merge(api::health_routes())
        .merge(api::upload_routes())
        .merge(api::file_routes())
        .merge(api::process_routes())
        .merge(api::analysis_routes())
        .merge(api::evaluate_routes())
        .merge(api::admin_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
