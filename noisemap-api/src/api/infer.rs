//! Classification endpoint

use axum::{extract::State, routing::post, Json, Router};
use serde_json::json;

use crate::classifier::Classification;
use crate::error::{ApiError, ApiResult};
use crate::models::FeaturePayload;
use crate::AppState;

/// POST /infer/classify
///
/// Maps a feature payload to a source label. Without a loaded model this
/// reports the `"unknown"` sentinel with an explanatory detail rather than
/// failing; a vector whose width does not match the model is rejected
/// before inference runs.
pub async fn classify(
    State(state): State<AppState>,
    Json(payload): Json<FeaturePayload>,
) -> ApiResult<Json<serde_json::Value>> {
    let input = payload.to_model_input();

    match state.classifier.classify(&input) {
        Ok(Classification::Label(label)) => Ok(Json(json!({ "label": label }))),
        Ok(Classification::Unknown { detail }) => {
            Ok(Json(json!({ "label": "unknown", "detail": detail })))
        }
        Err(shape) => Err(ApiError::BadRequest(shape.to_string())),
    }
}

/// Build inference routes
pub fn infer_routes() -> Router<AppState> {
    Router::new().route("/infer/classify", post(classify))
}
