//! The JSON envelope every M2M endpoint answers with, and its classification.
//!
//! ```json
//! {
//!   "requestId": 1234,
//!   "version": "stable",
//!   "data": ...,
//!   "errorCode": null,
//!   "errorMessage": null
//! }
//! ```
//!
//! Business errors arrive inside 200-level bodies, so classification looks at
//! `errorCode` only and never at the HTTP status.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{AUTH_EXPIRED, Result, UsgsError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// Endpoint-specific payload. `null` when the service returned none.
    #[serde(default)]
    pub data: Value,
    /// `null` iff the call succeeded. The key itself must be present.
    #[serde(deserialize_with = "nullable")]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    /// Remaining top-level fields (`requestId`, `version`, `sessionId`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResponseEnvelope {
    /// Builds a successful envelope around `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            error_code: None,
            error_message: None,
            extra: Map::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_code.is_none()
    }
}

// A plain `Option` field would silently default to `None` when the key is
// missing; routing through `deserialize_with` makes the key mandatory.
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// Parses a raw response body into an envelope.
pub(crate) fn parse_envelope(url: &str, body: &str) -> Result<ResponseEnvelope> {
    serde_json::from_str(body).map_err(|source| UsgsError::MalformedEnvelope {
        url: url.to_string(),
        source,
    })
}

/// Returns the envelope unchanged when it carries no error code, otherwise the
/// matching typed failure.
pub fn classify(envelope: ResponseEnvelope) -> Result<ResponseEnvelope> {
    let Some(code) = envelope.error_code.as_deref() else {
        return Ok(envelope);
    };

    let message = envelope.error_message.clone().unwrap_or_default();
    if code == AUTH_EXPIRED {
        return Err(UsgsError::AuthExpired { message });
    }

    Err(UsgsError::Service {
        code: code.to_string(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(body: Value) -> ResponseEnvelope {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn success_is_returned_unchanged() {
        let env = envelope(json!({
            "requestId": 42,
            "version": "stable",
            "data": [{"datasetName": "landsat_ot_c2_l2"}],
            "errorCode": null,
            "errorMessage": null
        }));
        let out = classify(env.clone()).unwrap();
        assert_eq!(out, env);
        assert_eq!(out.extra["requestId"], json!(42));
        assert_eq!(out.extra["version"], json!("stable"));
    }

    #[test]
    fn built_success_envelope_classifies_ok() {
        let env = ResponseEnvelope::ok(json!({"apiKey": "x"}));
        assert!(env.is_success());
        assert_eq!(classify(env).unwrap().data["apiKey"], "x");
    }

    #[test]
    fn auth_expired_ignores_message_content() {
        for message in [json!("API key has expired"), json!(""), Value::Null] {
            let env = envelope(json!({
                "data": null,
                "errorCode": "AUTH_EXPIRED",
                "errorMessage": message
            }));
            assert!(classify(env).unwrap_err().is_auth_expired());
        }
    }

    #[test]
    fn other_codes_keep_code_and_message() {
        let env = envelope(json!({
            "data": null,
            "errorCode": "DATASET_INVALID",
            "errorMessage": "Invalid dataset: foo"
        }));
        match classify(env) {
            Err(UsgsError::Service { code, message }) => {
                assert_eq!(code, "DATASET_INVALID");
                assert_eq!(message, "Invalid dataset: foo");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_error_code_key_is_malformed() {
        let err = parse_envelope("https://example.test/x", r#"{"data": 1}"#).unwrap_err();
        assert!(matches!(err, UsgsError::MalformedEnvelope { .. }));
    }

    #[test]
    fn non_json_body_is_malformed() {
        let err = parse_envelope("https://example.test/x", "<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, UsgsError::MalformedEnvelope { .. }));
    }

    #[test]
    fn data_and_message_default_to_null() {
        let env = parse_envelope("https://example.test/x", r#"{"errorCode": null}"#).unwrap();
        assert!(env.is_success());
        assert_eq!(env.data, Value::Null);
        assert_eq!(env.error_message, None);
    }
}
