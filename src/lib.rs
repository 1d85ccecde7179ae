//! A small Rust client for the USGS EROS Machine-to-Machine (M2M) API.
//!
//! This crate implements a `usgs`-style flow:
//! log in once to obtain an API key, then search datasets and scenes and
//! request downloads. The key is stored in `~/.usgs` and reused by every call
//! that is not given one explicitly, until you log out.
//!
//! ## Quick start
//! - Create an application token in your EROS profile.
//! - Call [`Client::login`] with `save = true`, then any query operation.
//! - Optionally point the client elsewhere with `USGS_API_URL`, or store the
//!   key at another path with `USGS_CREDENTIALS`.
//!
//! ```no_run
//! use anyhow::Result;
//! use usgs::{Client, SceneSearch};
//!
//! fn main() -> Result<()> {
//!     let client = Client::from_env()?;
//!     client.login("username", "application-token", true)?;
//!
//!     let mut search = SceneSearch::new("landsat_ot_c2_l2");
//!     search.max_results = 10;
//!     let scenes = client.scene_search(&search, None)?;
//!     println!("{}", scenes.data);
//!
//!     client.logout()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! The service reports business errors inside the JSON body. Every operation
//! turns them into [`UsgsError::Service`], except `AUTH_EXPIRED`, which is
//! [`UsgsError::AuthExpired`] so callers can log in again. Network failures
//! are retried up to five times with exponential backoff before surfacing as
//! [`UsgsError::Transport`].

#![forbid(unsafe_code)]

mod client;
mod config;
mod credentials;
mod envelope;
mod error;
pub mod payloads;
mod session;
mod util;

pub use client::Client;
pub use config::{CREDENTIALS_FILE, ClientConfig, DEFAULT_API_URL};
pub use credentials::{
    CredentialRecord, CredentialStore, FileCredentialStore, MemoryCredentialStore,
};
pub use envelope::{ResponseEnvelope, classify};
pub use error::{AUTH_EXPIRED, LOGIN_NO_KEY, Result, UsgsError};
pub use payloads::{Coordinate, DatasetSearch, SceneSearch, SortOrder};
pub use session::{AUTH_HEADER, RetryPolicy, Session, SessionFactory};
