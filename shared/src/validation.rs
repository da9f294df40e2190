use url::Url;
use crate::types::{NewService, ServicePayload};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("url and name are mandatory")]
    MissingFields,

    #[error("the provided url is invalid: {0}")]
    InvalidUrl(String),
}

/// Both `name` and `url` are present and not blank.
pub fn is_valid(payload: &ServicePayload) -> bool {
    let present = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.trim().is_empty());
    present(&payload.name) && present(&payload.url)
}

/// `url` is an absolute http(s) URL with a host. Loopback and single-label
/// hosts such as `localhost` are accepted.
pub fn is_url_valid(payload: &ServicePayload) -> bool {
    payload.url.as_deref().is_some_and(|url| check_url(url).is_ok())
}

pub fn check_url(url: &str) -> Result<(), ValidationError> {
    let parsed = Url::parse(url).map_err(|e| ValidationError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(ValidationError::InvalidUrl(format!("unsupported scheme: {}", other))),
    }

    // The parser tolerates `http:host` and `http:/host`; only `scheme://` is accepted here
    let has_authority = url
        .trim()
        .get(parsed.scheme().len()..)
        .is_some_and(|rest| rest.starts_with("://"));
    if !has_authority {
        return Err(ValidationError::InvalidUrl(format!("expected {}://", parsed.scheme())));
    }

    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ValidationError::InvalidUrl("missing host".to_string())),
    }
}

/// Run both checks and hand back the fields the registry writes.
/// The url is returned untouched; it is never normalized before storage.
pub fn validate(payload: &ServicePayload) -> Result<NewService, ValidationError> {
    if !is_valid(payload) {
        return Err(ValidationError::MissingFields);
    }

    let (Some(name), Some(url)) = (&payload.name, &payload.url) else {
        return Err(ValidationError::MissingFields);
    };
    check_url(url)?;

    Ok(NewService {
        name: name.clone(),
        url: url.clone(),
    })
}
