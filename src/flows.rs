//! High-level broker flows: actor tokens, delegated logins, and exchanges.

pub mod common;

mod actor;
mod delegated;
mod exchange;

pub use actor::*;
pub use common::*;
pub use delegated::*;

// self
use crate::{
	_prelude::*,
	config::BrokerConfig,
	http::{IdpHttpClient, TransportErrorMapper},
	idp::{IdpClient, IdpDescriptor},
	obs::{EventSink, NoopEventSink},
	store::{BrokerStore, CacheKey, SessionStore},
};
#[cfg(feature = "reqwest")]
use crate::http::{ReqwestHttpClient, ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Coordinates agent-identity token flows against a single identity provider.
///
/// The broker owns the HTTP client, the token cache, the session store, the
/// provider descriptor, and the static configuration so individual flows can
/// focus on their own semantics (handshake sequencing, delegation binding,
/// downscoping policy). All flows report lifecycle events to the configured
/// [`EventSink`].
#[derive(Clone)]
pub struct Broker<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Cache that persists acquired actor tokens.
	pub store: Arc<dyn BrokerStore>,
	/// Store tracking pending and completed login sessions.
	pub sessions: Arc<dyn SessionStore>,
	/// Descriptor that defines the provider endpoints.
	pub descriptor: IdpDescriptor,
	/// Static configuration: applications, agents, and policy.
	pub config: BrokerConfig,
	/// Sink receiving flow lifecycle events.
	pub events: Arc<dyn EventSink>,
	flow_guards: Arc<Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>>,
}
impl<C, M> Broker<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		store: Arc<dyn BrokerStore>,
		sessions: Arc<dyn SessionStore>,
		descriptor: IdpDescriptor,
		config: BrokerConfig,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			sessions,
			descriptor,
			config,
			events: Arc::new(NoopEventSink),
			flow_guards: Default::default(),
		}
	}

	/// Replaces the event sink receiving flow lifecycle events.
	pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
		self.events = sink;

		self
	}

	/// Builds an identity-provider client sharing the broker's transport.
	pub fn idp(&self) -> IdpClient<C, M> {
		IdpClient::new(
			self.descriptor.clone(),
			Arc::clone(&self.http_client),
			Arc::clone(&self.transport_mapper),
		)
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a broker with the crate's hardened reqwest transport.
	///
	/// The transport disables redirect following (the direct-auth flow treats a
	/// 302 as a first-class response) and applies a bounded request timeout.
	pub fn new(
		store: Arc<dyn BrokerStore>,
		sessions: Arc<dyn SessionStore>,
		descriptor: IdpDescriptor,
		config: BrokerConfig,
	) -> Result<Self> {
		Ok(Self::with_http_client(
			store,
			sessions,
			descriptor,
			config,
			ReqwestHttpClient::hardened()?,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}
}
impl<C, M> Debug for Broker<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("descriptor", &self.descriptor)
			.field("config", &self.config)
			.finish()
	}
}
