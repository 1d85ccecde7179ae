use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, UsgsError};
use crate::session::RetryPolicy;

/// Production M2M endpoint.
pub const DEFAULT_API_URL: &str = "https://m2m.cr.usgs.gov/api/api/json/stable";

/// Credential file name, relative to the home directory.
pub const CREDENTIALS_FILE: &str = ".usgs";

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base API URL, every endpoint path is joined onto it.
    pub url: String,
    /// Where the API key is persisted between runs.
    pub credentials_path: PathBuf,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

/// Resolves the configuration, in order of precedence:
/// - explicit arguments
/// - environment variables `USGS_API_URL` / `USGS_CREDENTIALS`
/// - the production URL and `~/.usgs`
pub(crate) fn load_config(
    url: Option<String>,
    credentials_path: Option<PathBuf>,
) -> Result<ClientConfig> {
    let url = url
        .or_else(|| env_nonempty("USGS_API_URL"))
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let credentials_path = match credentials_path
        .or_else(|| env_nonempty("USGS_CREDENTIALS").map(PathBuf::from))
    {
        Some(p) => p,
        None => default_credentials_path()?,
    };

    Ok(ClientConfig {
        url,
        credentials_path,
        timeout: DEFAULT_TIMEOUT,
        retry: RetryPolicy::default(),
    })
}

pub(crate) fn default_credentials_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| {
        UsgsError::Config(
            "cannot determine home directory (set USGS_CREDENTIALS to a file path)".into(),
        )
    })?;
    Ok(home.join(CREDENTIALS_FILE))
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Explicit arguments never consult the environment, so these stay
    // independent of whatever USGS_* variables the test host exports.
    #[test]
    fn explicit_values_win() {
        let cfg = load_config(
            Some("http://localhost:9999/api".into()),
            Some(PathBuf::from("/tmp/creds.json")),
        )
        .unwrap();
        assert_eq!(cfg.url, "http://localhost:9999/api");
        assert_eq!(cfg.credentials_path, PathBuf::from("/tmp/creds.json"));
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT);
        assert_eq!(cfg.retry, RetryPolicy::default());
    }

    #[test]
    fn default_path_is_dot_usgs_in_home() {
        if let Ok(path) = default_credentials_path() {
            assert!(path.ends_with(CREDENTIALS_FILE));
        }
    }
}
