//! Delegated agent-identity token broker—direct-mode IdP handshakes, user delegation with RFC
//! 8693 actor binding, scope-ceiling exchanges, and JWKS validation in one crate.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

#[cfg(test)]
use agent_token_broker as _;

pub mod auth;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod idp;
pub mod obs;
pub mod store;
pub mod validate;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		config::BrokerConfig,
		flows::Broker,
		http::{ReqwestHttpClient, ReqwestTransportErrorMapper},
		idp::IdpDescriptor,
		store::{
			BrokerStore, SessionStore,
			memory::{MemorySessionStore, MemoryStore},
		},
	};

	/// Broker type alias used by reqwest-backed integration tests.
	pub type ReqwestTestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	///
	/// Redirect following stays disabled, matching the hardened production client.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Constructs a [`Broker`] backed by in-memory stores and the reqwest transport used across
	/// integration tests.
	pub fn build_reqwest_test_broker(
		descriptor: IdpDescriptor,
		config: BrokerConfig,
	) -> (ReqwestTestBroker, Arc<MemoryStore>, Arc<MemorySessionStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn BrokerStore> = store_backend.clone();
		let session_backend = Arc::new(MemorySessionStore::default());
		let sessions: Arc<dyn SessionStore> = session_backend.clone();
		let http_client = test_reqwest_http_client();
		let mapper = Arc::new(ReqwestTransportErrorMapper);
		let broker =
			Broker::with_http_client(store, sessions, descriptor, config, http_client, mapper);

		(broker, store_backend, session_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, hash_map::DefaultHasher},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {httpmock as _, tokio as _};
