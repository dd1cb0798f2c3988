use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use estore_infra::StoreError;

/// The only place storage outcomes become HTTP status codes.
pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    let (status, code) = store_error_status(&err);
    if status.is_server_error() {
        tracing::error!(error = %err, code, "request failed");
    }
    json_error(status, code, err.to_string())
}

pub fn store_error_status(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::Invalid(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        StoreError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        StoreError::StorageUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable"),
        StoreError::Encode(_) | StoreError::Decode(_) | StoreError::Database(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "store_error")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use estore_core::DomainError;

    #[test]
    fn each_store_outcome_has_a_distinct_status() {
        let cases = [
            (StoreError::Conflict("taken".into()), StatusCode::CONFLICT),
            (StoreError::StorageUnavailable("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (StoreError::Invalid(DomainError::validation("bad")), StatusCode::BAD_REQUEST),
            (StoreError::Decode("row".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(store_error_status(&err).0, expected, "{err}");
        }
    }
}
