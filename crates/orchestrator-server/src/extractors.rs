//! Custom Axum extractors.

use axum::{async_trait, extract::Request};
use serde::de::DeserializeOwned;
use serde_json::error::Category;
use tracing::debug;

use crate::error::ApiError;

/// JSON body whose failures render as [`ApiError`].
///
/// Malformed JSON is a 400; well-formed JSON of the wrong shape is a 422.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> axum::extract::FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = axum::body::Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read request body: {e}")))?;

        serde_json::from_slice(&bytes).map(Self).map_err(|e| {
            debug!(error = %e, "Rejected request body");
            match e.classify() {
                Category::Data => ApiError::validation(format!("Invalid request body: {e}")),
                Category::Io | Category::Syntax | Category::Eof => {
                    ApiError::bad_request(format!("Invalid JSON: {e}"))
                }
            }
        })
    }
}
