//! Alternative response evaluation endpoint

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use serde_json::Value;
use weasel_common::evaluation::{EvaluateRequest, EvaluationResult};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub success: bool,
    pub data: EvaluationResult,
}

const MISSING_FIELDS: &str =
    "Missing required fields: originalResponse, alternativeResponse, or violationContext";

/// POST /api/evaluate
///
/// The body is decoded by hand so a missing field is a 400 with the same
/// message as an empty one.
pub async fn evaluate(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Json<EvaluateResponse>> {
    let request: EvaluateRequest =
        serde_json::from_value(body).map_err(|_| ApiError::BadRequest(MISSING_FIELDS.to_string()))?;

    let data = state.evaluator.evaluate(&request).await?;
    Ok(Json(EvaluateResponse { success: true, data }))
}

/// Build evaluation routes
pub fn evaluate_routes() -> Router<AppState> {
    Router::new().route("/api/evaluate", post(evaluate))
}
