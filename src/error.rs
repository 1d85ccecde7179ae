use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Error code the M2M service uses for an API key that is no longer valid.
pub const AUTH_EXPIRED: &str = "AUTH_EXPIRED";

/// Code reported when a login succeeds at the envelope level but carries no key.
pub const LOGIN_NO_KEY: &str = "LOGIN_NO_KEY";

/// Errors returned by every [`Client`](crate::Client) operation.
#[derive(Debug, Error)]
pub enum UsgsError {
    /// The request could not be delivered (connect error, timeout, reset)
    /// even after the retry policy was exhausted.
    #[error("could not reach {url} after {attempts} attempt(s): {source}")]
    Transport {
        url: String,
        attempts: usize,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx HTTP status whose body was not a service envelope, or a
    /// retryable status that persisted through every attempt.
    #[error("HTTP {status} from {url} after {attempts} attempt(s)\n{body}")]
    Status {
        url: String,
        status: StatusCode,
        attempts: usize,
        body: String,
    },

    /// The API key was rejected as expired. Log in again to obtain a new one.
    #[error("API key has expired. Try logging out and logging back in.{}", detail(message))]
    AuthExpired { message: String },

    /// Any other error reported in the service envelope, verbatim.
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    /// The response body was not a valid service envelope.
    #[error("malformed response envelope from {url}: {source}")]
    MalformedEnvelope {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// A stored credential file exists but cannot be parsed.
    #[error("corrupted credential file {}: {source}", path.display())]
    CredentialStore {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl UsgsError {
    /// True for [`UsgsError::AuthExpired`], the one failure fixed by logging in again.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, UsgsError::AuthExpired { .. })
    }

    /// Service error code carried by this failure, if it came from an envelope.
    pub fn service_code(&self) -> Option<&str> {
        match self {
            UsgsError::AuthExpired { .. } => Some(AUTH_EXPIRED),
            UsgsError::Service { code, .. } => Some(code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, UsgsError>;

fn detail(message: &str) -> String {
    if message.trim().is_empty() {
        String::new()
    } else {
        format!(" ({message})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_display_keeps_code_and_message() {
        let err = UsgsError::Service {
            code: "DATASET_INVALID".into(),
            message: "Invalid dataset".into(),
        };
        assert_eq!(err.to_string(), "DATASET_INVALID: Invalid dataset");
        assert_eq!(err.service_code(), Some("DATASET_INVALID"));
        assert!(!err.is_auth_expired());
    }

    #[test]
    fn auth_expired_reports_its_code() {
        let err = UsgsError::AuthExpired {
            message: "expired".into(),
        };
        assert!(err.is_auth_expired());
        assert_eq!(err.service_code(), Some(AUTH_EXPIRED));
    }

    #[test]
    fn auth_expired_display_omits_empty_message() {
        let bare = UsgsError::AuthExpired {
            message: String::new(),
        };
        assert_eq!(
            bare.to_string(),
            "API key has expired. Try logging out and logging back in."
        );

        let detailed = UsgsError::AuthExpired {
            message: "key expired".into(),
        };
        assert!(detailed.to_string().ends_with(" (key expired)"));
    }

    #[test]
    fn local_errors_have_no_service_code() {
        let err = UsgsError::Config("no home directory".into());
        assert_eq!(err.service_code(), None);
    }
}
