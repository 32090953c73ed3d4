//! Stored analysis and portfolio analytics endpoints

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use weasel_common::risk::PortfolioSummary;
use weasel_common::time::now;
use weasel_common::AnalysisResult;

use crate::api::files::LegacyDateQuery;
use crate::error::{ApiError, ApiResult};
use crate::storage::ListOptions;
use crate::AppState;

/// GET /api/analysis/:filename
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(_legacy): Query<LegacyDateQuery>,
) -> ApiResult<Json<AnalysisResult>> {
    state
        .storage
        .download_analysis_result(&filename)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No analysis for {}", filename)))
}

/// GET /api/analytics/portfolio
pub async fn portfolio(State(state): State<AppState>) -> ApiResult<Json<PortfolioSummary>> {
    let listing = state
        .storage
        .list_files(&ListOptions {
            max_results: Some(usize::MAX),
            ..ListOptions::default()
        })
        .await?;

    let summary = PortfolioSummary::from_records(
        listing.files.iter().map(|f| (f.name.as_str(), &f.metadata)),
        now(),
    );

    tracing::debug!(
        total_calls = summary.total_calls,
        high_risk_calls = summary.high_risk_calls,
        "Portfolio summary computed"
    );
    Ok(Json(summary))
}

/// Build analysis routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/api/analysis/:filename", get(get_analysis))
        .route("/api/analytics/portfolio", get(portfolio))
}
