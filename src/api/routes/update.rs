//! Update endpoints
//!
//! All three endpoints funnel into `Repository::set`, which owns the merge
//! rules, then give the repository a chance to flush synchronously.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use tracing::{debug, instrument};

use super::decode;
use crate::api::{ApiError, ApiResult, ApiState};
use crate::metric::{Metric, MetricError, MetricKind, MetricPayload, MetricValue};

/// POST /update/{kind}/{id}/{value}
#[instrument(skip(state))]
pub async fn update_raw(
    State(state): State<ApiState>,
    Path((kind, id, raw)): Path<(String, String, String)>,
) -> ApiResult<&'static str> {
    let kind: MetricKind = kind
        .parse()
        .map_err(|e: MetricError| ApiError::UnsupportedKind(e.to_string()))?;
    let value = MetricValue::parse(kind, &raw)?;

    state
        .repository
        .set(Metric {
            id,
            value,
            hash: None,
        })
        .await?;
    state.repository.flush_db().await;

    Ok("Ok")
}

/// POST /update/
///
/// Responds with the stored metric after the merge, signed.
#[instrument(skip_all)]
pub async fn update_json(State(state): State<ApiState>, body: Bytes) -> ApiResult<Json<Metric>> {
    let metric = Metric::try_from(decode::<MetricPayload>(&body)?)?;
    state.hasher.verify(&metric)?;

    let id = metric.id.clone();
    state.repository.set(metric).await?;
    state.repository.flush_db().await;

    let mut stored = state.repository.get(&id).await?;
    state.hasher.sign(&mut stored);
    Ok(Json(stored))
}

/// POST /updates/
///
/// Every metric is decoded and verified before anything is stored, then the
/// batch is merged as a unit: a malformed, tampered or conflicting entry
/// rejects the whole batch and nothing is stored.
#[instrument(skip_all)]
pub async fn update_batch(
    State(state): State<ApiState>,
    body: Bytes,
) -> ApiResult<Json<Vec<Metric>>> {
    let batch = decode::<Vec<MetricPayload>>(&body)?
        .into_iter()
        .map(Metric::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    for metric in &batch {
        state.hasher.verify(metric)?;
    }

    debug!("applying batch of {} metrics", batch.len());

    let mut ids: Vec<String> = Vec::with_capacity(batch.len());
    for metric in &batch {
        if !ids.contains(&metric.id) {
            ids.push(metric.id.clone());
        }
    }
    state.repository.set_all(batch).await?;
    state.repository.flush_db().await;

    let mut stored = Vec::with_capacity(ids.len());
    for id in &ids {
        stored.push(state.repository.get(id).await?);
    }
    state.hasher.sign_all(&mut stored);
    Ok(Json(stored))
}
