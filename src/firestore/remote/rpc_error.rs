use reqwest::StatusCode;
use serde::Deserialize;

use crate::firestore::error::{
    deadline_exceeded, internal_error, invalid_argument, not_found, permission_denied,
    resource_exhausted, unauthenticated, unavailable, FirestoreAdapterError,
};

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: Option<GoogleError>,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Maps a failed REST response to an adapter error, preferring the
/// canonical status carried in a Google error body.
pub fn map_http_error(status: StatusCode, body: &str) -> FirestoreAdapterError {
    let payload = serde_json::from_str::<GoogleErrorBody>(body)
        .ok()
        .and_then(|body| body.error);
    let message = payload
        .as_ref()
        .and_then(|error| error.message.clone())
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("HTTP error")
                .to_string()
        });

    if let Some(canonical) = payload.as_ref().and_then(|error| error.status.as_deref()) {
        if let Some(error) = map_canonical_status(canonical, &message) {
            return error;
        }
    }

    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::CONFLICT
        | StatusCode::PRECONDITION_FAILED
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNSUPPORTED_MEDIA_TYPE => invalid_argument(message),
        StatusCode::UNAUTHORIZED => unauthenticated(message),
        StatusCode::FORBIDDEN => permission_denied(message),
        StatusCode::NOT_FOUND => not_found(message),
        StatusCode::TOO_MANY_REQUESTS => resource_exhausted(message),
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => unavailable(message),
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => deadline_exceeded(message),
        status if status.is_client_error() => invalid_argument(message),
        _ => internal_error(message),
    }
}

fn map_canonical_status(status: &str, message: &str) -> Option<FirestoreAdapterError> {
    let message = message.to_string();
    let error = match status {
        "INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "OUT_OF_RANGE" | "ALREADY_EXISTS" => {
            invalid_argument(message)
        }
        "UNAUTHENTICATED" => unauthenticated(message),
        "PERMISSION_DENIED" => permission_denied(message),
        "NOT_FOUND" => not_found(message),
        "RESOURCE_EXHAUSTED" => resource_exhausted(message),
        "UNAVAILABLE" => unavailable(message),
        "DEADLINE_EXCEEDED" => deadline_exceeded(message),
        "CANCELLED" | "DATA_LOSS" | "UNKNOWN" | "INTERNAL" => internal_error(message),
        _ => return None,
    };
    Some(error)
}
