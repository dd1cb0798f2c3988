use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{Form, FromRequest, Request};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value as JsonValue};

use crate::app::errors::json_error;

/// Append request body.
///
/// `application/x-www-form-urlencoded` pairs become a JSON object of strings;
/// anything else is parsed as JSON. An empty body is `{}`.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBody(pub JsonValue);

#[async_trait]
impl<S> FromRequest<S> for EventBody
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            let object: Map<String, JsonValue> = pairs
                .into_iter()
                .map(|(k, v)| (k, JsonValue::String(v)))
                .collect();
            return Ok(EventBody(JsonValue::Object(object)));
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(EventBody(JsonValue::Object(Map::new())));
        }

        serde_json::from_slice(&bytes)
            .map(EventBody)
            .map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_body", format!("body is not valid JSON: {e}")))
    }
}
