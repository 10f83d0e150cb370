//! Read endpoints

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use serde::Deserialize;
use tracing::instrument;

use super::decode;
use crate::api::{ApiError, ApiResult, ApiState};
use crate::metric::{Metric, MetricError, MetricKind};

/// Body of `POST /value/`
#[derive(Debug, Deserialize)]
pub struct ValueRequest {
    pub id: String,

    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Look up `id`, treating a metric of another kind as absent
async fn lookup(state: &ApiState, id: &str, kind: Option<MetricKind>) -> ApiResult<Metric> {
    let metric = state.repository.get(id).await?;
    match kind {
        Some(kind) if metric.kind() != kind => {
            Err(ApiError::NotFound(format!("metric {id} is not a {kind}")))
        }
        _ => Ok(metric),
    }
}

/// GET /value/{kind}/{id}
#[instrument(skip(state))]
pub async fn value_raw(
    State(state): State<ApiState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<String> {
    let kind: MetricKind = kind
        .parse()
        .map_err(|e: MetricError| ApiError::UnsupportedKind(e.to_string()))?;
    Ok(lookup(&state, &id, Some(kind)).await?.render())
}

/// POST /value/
#[instrument(skip_all)]
pub async fn value_json(State(state): State<ApiState>, body: Bytes) -> ApiResult<Json<Metric>> {
    let request: ValueRequest = decode(&body)?;
    let kind = request
        .kind
        .as_deref()
        .filter(|k| !k.is_empty())
        .map(str::parse::<MetricKind>)
        .transpose()?;

    let mut metric = lookup(&state, &request.id, kind).await?;
    state.hasher.sign(&mut metric);
    Ok(Json(metric))
}
