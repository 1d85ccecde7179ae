use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{ClientConfig, load_config};
use crate::credentials::{CredentialRecord, CredentialStore, FileCredentialStore};
use crate::envelope::{ResponseEnvelope, classify};
use crate::error::{LOGIN_NO_KEY, Result, UsgsError};
use crate::payloads::{self, DatasetSearch, SceneSearch};
use crate::session::{RetryPolicy, SessionFactory};

/// Blocking client for the M2M API.
///
/// Every operation resolves its API key, opens a fresh session, POSTs one
/// request and classifies the response envelope. Operations taking an
/// `api_key` use it instead of the stored key when it is `Some` and
/// non-empty.
#[derive(Clone)]
pub struct Client {
    sessions: SessionFactory,
    store: Arc<dyn CredentialStore>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client from environment variables and defaults.
    ///
    /// This is equivalent to `Client::new(None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::new(None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit `url`/`credentials_path` arguments
    /// - environment variables `USGS_API_URL` / `USGS_CREDENTIALS`
    /// - the production endpoint and `~/.usgs`
    pub fn new(url: Option<String>, credentials_path: Option<PathBuf>) -> Result<Self> {
        let cfg = load_config(url, credentials_path)?;
        Ok(Self::with_config(cfg))
    }

    pub fn with_config(cfg: ClientConfig) -> Self {
        Self {
            sessions: SessionFactory::new(cfg.url, cfg.timeout, cfg.retry),
            store: Arc::new(FileCredentialStore::new(cfg.credentials_path)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.sessions.set_timeout(timeout);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.sessions.set_retry_policy(retry);
        self
    }

    /// Replaces the credential store, e.g. with a
    /// [`MemoryCredentialStore`](crate::MemoryCredentialStore).
    pub fn with_store(self, store: impl CredentialStore + 'static) -> Self {
        self.with_shared_store(Arc::new(store))
    }

    pub fn with_shared_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    pub fn base_url(&self) -> &str {
        self.sessions.base_url()
    }

    /// Lists the search filters available for `dataset`.
    pub fn dataset_filters(
        &self,
        dataset: &str,
        api_key: Option<&str>,
    ) -> Result<ResponseEnvelope> {
        self.call("dataset-filters", payloads::dataset_filters(dataset), api_key)
    }

    /// Lists downloadable products for the given scenes, with availability.
    pub fn download_options<S: AsRef<str>>(
        &self,
        dataset: &str,
        entity_ids: &[S],
        api_key: Option<&str>,
    ) -> Result<ResponseEnvelope> {
        self.call(
            "download-options",
            payloads::download_options(dataset, entity_ids),
            api_key,
        )
    }

    /// Discovers downloadable products for a dataset. Unlike
    /// [`download_options`](Self::download_options) this does not check
    /// product availability.
    pub fn dataset_download_options(
        &self,
        dataset: &str,
        api_key: Option<&str>,
    ) -> Result<ResponseEnvelope> {
        self.call(
            "dataset-download-options",
            payloads::dataset_download_options(dataset),
            api_key,
        )
    }

    /// Queues a product for download and returns the available download URLs.
    pub fn download_request(
        &self,
        dataset: &str,
        entity_id: &str,
        product_id: &str,
        api_key: Option<&str>,
    ) -> Result<ResponseEnvelope> {
        self.call(
            "download-request",
            payloads::download_request(dataset, entity_id, product_id),
            api_key,
        )
    }

    pub fn dataset_search(
        &self,
        params: &DatasetSearch,
        api_key: Option<&str>,
    ) -> Result<ResponseEnvelope> {
        self.call("dataset-search", payloads::dataset_search(params), api_key)
    }

    /// Requests the full metadata of one scene.
    pub fn scene_metadata(
        &self,
        dataset: &str,
        entity_id: &str,
        api_key: Option<&str>,
    ) -> Result<ResponseEnvelope> {
        self.call(
            "scene-metadata",
            payloads::scene_metadata(dataset, entity_id),
            api_key,
        )
    }

    /// Searches scenes of a dataset. An API key is required by the service.
    pub fn scene_search(
        &self,
        params: &SceneSearch,
        api_key: Option<&str>,
    ) -> Result<ResponseEnvelope> {
        self.call("scene-search", payloads::scene_search(params), api_key)
    }

    /// Logs in with an application token, returning the envelope whose
    /// `data` is the issued API key.
    ///
    /// With `save`, the key is stored and used by later calls that are not
    /// given an explicit key, until [`logout`](Self::logout).
    pub fn login(&self, username: &str, token: &str, save: bool) -> Result<ResponseEnvelope> {
        let created = Utc::now();
        let session = self.sessions.open(None)?;
        let payload = payloads::login(username, token);
        let envelope = classify(session.post("login-token", Some(&payload))?)?;

        let Some(api_key) = envelope.data.as_str() else {
            return Err(UsgsError::Service {
                code: LOGIN_NO_KEY.to_string(),
                message: envelope
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Authentication failed".to_string()),
            });
        };

        if save {
            self.store.persist(&CredentialRecord {
                api_key: api_key.to_string(),
                created,
            })?;
        }
        info!(username, saved = save, "logged in");

        Ok(envelope)
    }

    /// Invalidates the stored API key and removes it.
    ///
    /// Returns `Ok(None)` without touching the network when nothing is
    /// stored. A key the service already considers expired is removed
    /// silently. Any other failure leaves the stored key in place.
    pub fn logout(&self) -> Result<Option<ResponseEnvelope>> {
        let Some(record) = self.store.load()? else {
            debug!("no stored API key, nothing to log out");
            return Ok(None);
        };

        let session = self.sessions.open(Some(&record.api_key))?;
        let envelope = session.post("logout", None)?;

        match classify(envelope.clone()) {
            Ok(_) => {}
            Err(e) if e.is_auth_expired() => {
                debug!("stored API key had already expired");
            }
            Err(e) => return Err(e),
        }

        self.store.clear()?;
        info!("logged out");
        Ok(Some(envelope))
    }

    fn call(&self, path: &str, payload: Value, api_key: Option<&str>) -> Result<ResponseEnvelope> {
        let api_key = self.store.resolve(api_key)?;
        let session = self.sessions.open(api_key.as_deref())?;
        classify(session.post(path, Some(&payload))?)
    }
}
