//! Submission parsing
//!
//! Field types are checked before required fields, so `{"callback_url": 1}`
//! is a 422 even though `message` is also missing.

use doppler_http::ApiError;
use serde_json::{Map, Value};
use thiserror::Error;

const REQUIRED_FIELDS: [&str; 2] = ["callback_url", "message"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Request body must be a JSON object")]
    NotJson,

    #[error("{0} not found")]
    Missing(&'static str),

    #[error("{field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ValidationError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::NotJson => ApiError::unsupported_media_type(err.to_string()),
            ValidationError::Missing(_) => ApiError::bad_request(err.to_string()),
            ValidationError::Invalid { .. } => ApiError::unprocessable(err.to_string()),
        }
    }
}

/// A validated job submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub callback_url: String,
    pub message: String,
    /// Requested first fire time in epoch seconds; absent means now
    pub run_at: Option<i64>,
    pub max_retries: u32,
    /// Seconds between attempts; absent means the worker default
    pub retry_delay: Option<u64>,
}

impl Submission {
    /// Parse and validate a raw request body.
    pub fn from_json(body: &[u8]) -> Result<Self, ValidationError> {
        let fields = match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(fields)) => fields,
            _ => return Err(ValidationError::NotJson),
        };

        let callback_url = string_field(&fields, "callback_url")?;
        let message = string_field(&fields, "message")?;
        let run_at = optional(&fields, "run_at")
            .map(|value| {
                value
                    .as_i64()
                    .ok_or_else(|| ValidationError::invalid("run_at", "must be an integer"))
            })
            .transpose()?;
        let max_retries = optional(&fields, "max_retries")
            .map(|value| unsigned(value, "max_retries", 0))
            .transpose()?;
        let retry_delay = optional(&fields, "retry_delay")
            .map(|value| unsigned(value, "retry_delay", 1))
            .transpose()?;

        let (Some(callback_url), Some(message)) = (callback_url, message) else {
            let missing = REQUIRED_FIELDS
                .into_iter()
                .find(|name| !fields.contains_key(*name))
                .unwrap_or("callback_url");
            return Err(ValidationError::Missing(missing));
        };

        validate_callback_url(&callback_url)?;

        Ok(Submission {
            callback_url,
            message,
            run_at,
            max_retries: match max_retries {
                Some(n) => u32::try_from(n)
                    .map_err(|_| ValidationError::invalid("max_retries", "is too large"))?,
                None => 0,
            },
            retry_delay,
        })
    }
}

/// `null` counts as absent for optional fields
fn optional<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|value| !value.is_null())
}

fn string_field(
    fields: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<String>, ValidationError> {
    match fields.get(name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::invalid(name, "must be a string")),
    }
}

fn unsigned(value: &Value, name: &'static str, min: u64) -> Result<u64, ValidationError> {
    if let Some(n) = value.as_u64() {
        if n >= min {
            return Ok(n);
        }
    } else if value.as_i64().is_none() {
        return Err(ValidationError::invalid(name, "must be an integer"));
    }
    Err(ValidationError::invalid(name, format!("must be at least {}", min)))
}

/// Absolute URL with both a scheme and a host
pub fn validate_callback_url(url: &str) -> Result<(), ValidationError> {
    let invalid = || {
        ValidationError::invalid(
            "callback_url",
            format!("'{}' is not a valid callback url", url),
        )
    };

    let uri: http::Uri = url.parse().map_err(|_| invalid())?;
    match (uri.scheme(), uri.host()) {
        (Some(_), Some(host)) if !host.is_empty() => Ok(()),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use serde_json::json;

    fn parse(value: Value) -> Result<Submission, ValidationError> {
        Submission::from_json(value.to_string().as_bytes())
    }

    #[test]
    fn minimal_submission_uses_defaults() {
        let sub = parse(json!({"callback_url": "http://example.com/hook", "message": "m"})).unwrap();
        assert_eq!(sub.max_retries, 0);
        assert_eq!(sub.retry_delay, None);
        assert_eq!(sub.run_at, None);
    }

    #[test]
    fn full_submission() {
        let sub = parse(json!({
            "callback_url": "https://example.com/hook?x=1",
            "message": "m",
            "run_at": 1_700_000_000,
            "max_retries": 3,
            "retry_delay": 30,
            "ignored": true,
        }))
        .unwrap();
        assert_eq!(sub.run_at, Some(1_700_000_000));
        assert_eq!(sub.max_retries, 3);
        assert_eq!(sub.retry_delay, Some(30));
    }

    #[test]
    fn non_objects_are_unsupported() {
        assert_eq!(Submission::from_json(b""), Err(ValidationError::NotJson));
        assert_eq!(Submission::from_json(b"hello"), Err(ValidationError::NotJson));
        assert_eq!(Submission::from_json(b"[1, 2]"), Err(ValidationError::NotJson));
    }

    #[test]
    fn missing_required_fields() {
        assert_eq!(
            parse(json!({"callback_url": "http://example.com/"})),
            Err(ValidationError::Missing("message"))
        );
        assert_eq!(
            parse(json!({"message": "m"})),
            Err(ValidationError::Missing("callback_url"))
        );
    }

    #[test]
    fn type_errors_win_over_missing_fields() {
        let err = parse(json!({"callback_url": 5})).unwrap_err();
        assert!(matches!(err, ValidationError::Invalid { field: "callback_url", .. }));
    }

    #[test]
    fn numeric_ranges() {
        let base = |extra: Value| {
            let mut body = json!({"callback_url": "http://example.com/", "message": "m"});
            body.as_object_mut()
                .unwrap()
                .extend(extra.as_object().unwrap().clone());
            parse(body)
        };

        assert!(base(json!({"max_retries": -1})).is_err());
        assert!(base(json!({"max_retries": "3"})).is_err());
        assert!(base(json!({"retry_delay": 0})).is_err());
        assert!(base(json!({"run_at": 1.5})).is_err());
        assert!(base(json!({"max_retries": 5_000_000_000u64})).is_err());
        assert_eq!(base(json!({"run_at": null})).unwrap().run_at, None);
    }

    #[test]
    fn callback_url_needs_scheme_and_host() {
        assert!(validate_callback_url("http://example.com/hook").is_ok());
        assert!(validate_callback_url("http://127.0.0.1:8000").is_ok());
        assert!(validate_callback_url("not-a-url").is_err());
        assert!(validate_callback_url("/relative/path").is_err());
        assert!(validate_callback_url("http://").is_err());
    }

    #[test]
    fn errors_map_to_status_codes() {
        let status = |err: ValidationError| ApiError::from(err).status;
        assert_eq!(status(ValidationError::NotJson), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(status(ValidationError::Missing("message")), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(ValidationError::invalid("callback_url", "bad")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
