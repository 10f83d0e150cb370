pub mod index;
pub mod ping;
pub mod update;
pub mod value;

use serde::de::DeserializeOwned;

use super::error::ApiResult;

/// Decode a JSON body, reporting failures as bad requests
///
/// Axum's `Json` extractor answers data errors with 422; clients of this
/// API expect 400 for every malformed body.
pub(crate) fn decode<T: DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    Ok(serde_json::from_slice(body)?)
}
