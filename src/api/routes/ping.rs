//! Durable-medium liveness probe

use axum::extract::State;
use tracing::instrument;

use crate::api::{ApiResult, ApiState};

/// GET /ping
///
/// 200 when the repository's durable medium answers, 500 otherwise,
/// including for the memory-only repository.
#[instrument(skip_all)]
pub async fn ping(State(state): State<ApiState>) -> ApiResult<&'static str> {
    state.repository.ping().await?;
    Ok("Ok")
}
