//! `X-ES-*` request header mapping.
//!
//! Every request header named `X-ES-<Name>` is stored in the event's headers
//! as `<Name>`. HTTP delivers names lower-cased, so each dash-separated
//! segment is re-capitalised (`x-es-correlation-id` → `Correlation-Id`).
//! The `Version` entry doubles as the event's `version` and may appear only
//! once. Other repeated headers keep their last value.

use axum::http::HeaderMap;

use estore_core::{DomainError, Headers};

pub const HEADER_PREFIX: &str = "x-es-";
pub const VERSION_HEADER: &str = "Version";

/// Collect the `X-ES-*` headers of a request.
pub fn event_headers(headers: &HeaderMap) -> Result<Headers, DomainError> {
    let mut mapped = Headers::new();
    for (name, value) in headers {
        let Some(suffix) = strip_prefix(name.as_str()) else {
            continue;
        };
        let value = value
            .to_str()
            .map_err(|_| DomainError::validation(format!("header {name} is not valid UTF-8")))?;
        let key = canonical_name(suffix);
        let previous = mapped.insert(key.clone(), value.trim().to_string());
        if previous.is_some() && key == VERSION_HEADER {
            return Err(DomainError::validation("X-ES-Version given more than once"));
        }
    }
    Ok(mapped)
}

/// The event version carried by the `Version` header.
pub fn event_version(headers: &Headers) -> Result<i64, DomainError> {
    let raw = headers
        .get(VERSION_HEADER)
        .ok_or_else(|| DomainError::validation("missing X-ES-Version header"))?;
    raw.parse::<i64>()
        .map_err(|_| DomainError::validation(format!("X-ES-Version must be an integer, got {raw:?}")))
}

fn strip_prefix(name: &str) -> Option<&str> {
    let head = name.get(..HEADER_PREFIX.len())?;
    if !head.eq_ignore_ascii_case(HEADER_PREFIX) {
        return None;
    }
    let suffix = &name[HEADER_PREFIX.len()..];
    (!suffix.is_empty()).then_some(suffix)
}

fn canonical_name(suffix: &str) -> String {
    suffix
        .split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
