//! HTTP Cache Proxy
//! ================
//!
//! `http-cache-proxy` is a caching reverse proxy: it forwards client GET
//! requests to an origin server, decides whether a previously stored
//! response is still usable without contacting the origin, and otherwise
//! performs a conditional fetch to minimize redundant transfer.
//!
//! The moving parts:
//! - [`freshness`] decides whether a stored entry may be served without
//!   refetching (deterministic rules first, a conditional HEAD probe when
//!   those cannot decide),
//! - [`backend`] is the pluggable key-to-entry store (in-memory,
//!   file-persisted, or redis with per-key write locking),
//! - [`proxy`] wires both into the per-request control flow behind an
//!   axum router.
//!
//! Construct the pieces from a [`config::Config`] and serve:
//!
//! ```no_run
//! use std::sync::Arc;
//! use http_cache_proxy::{backend, config::Config, origin::HttpOriginClient, proxy};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let state = Arc::new(proxy::ProxyState {
//!     backend: backend::from_config(&config).await?,
//!     origin: Arc::new(HttpOriginClient::new(config.connect_timeout)?),
//!     config,
//! });
//! let app = proxy::router(state);
//! # drop(app);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod backend;
pub mod config;
pub mod entry;
pub mod error;
pub mod freshness;
pub mod origin;
pub mod proxy;

pub use backend::{CacheBackend, SharedBackend};
pub use config::Config;
pub use entry::CacheEntry;
pub use error::{CacheError, OriginError};
pub use freshness::Freshness;
pub use proxy::ProxyState;
