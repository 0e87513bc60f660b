//! Storage abstractions for cached actor tokens and pending login sessions.

pub mod memory;

// self
use crate::{
	_prelude::*,
	auth::{AgentId, PkceChallenge, ScopeSet, SessionId, TokenRecord},
};

/// Boxed future type used by the storage traits.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a + Send>>;

/// Errors produced by storage backends.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum StoreError {
	/// Record could not be serialized or deserialized by the backend.
	#[error("Serialization failed: {message}.")]
	Serialization {
		/// Backend-provided failure description.
		message: String,
	},
	/// Backend rejected or failed the operation.
	#[error("Storage backend failed: {message}.")]
	Backend {
		/// Backend-provided failure description.
		message: String,
	},
}

/// Cache key identifying an actor token slot.
///
/// Tokens are keyed by the application, the agent they act as, and the scope
/// fingerprint, so a scope change never serves a stale grant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
	/// Client identifier of the application that acquired the token.
	pub client_id: String,
	/// Agent the token acts as.
	pub agent: AgentId,
	/// Fingerprint of the normalized scope set.
	pub scope_fingerprint: String,
}
impl CacheKey {
	/// Builds a cache key from its parts.
	pub fn new(client_id: &str, agent: &AgentId, scope: &ScopeSet) -> Self {
		Self {
			client_id: client_id.to_owned(),
			agent: agent.clone(),
			scope_fingerprint: scope.fingerprint(),
		}
	}
}

/// Async storage backend for cached actor tokens.
pub trait BrokerStore
where
	Self: 'static + Send + Sync,
{
	/// Persists a token record under the key, replacing any previous record.
	fn save(&self, key: CacheKey, record: TokenRecord) -> StoreFuture<'_, Result<(), StoreError>>;

	/// Fetches the record stored under the key, if any.
	fn fetch(&self, key: &CacheKey) -> StoreFuture<'_, Result<Option<TokenRecord>, StoreError>>;

	/// Removes and returns the record stored under the key.
	fn evict(&self, key: &CacheKey) -> StoreFuture<'_, Result<Option<TokenRecord>, StoreError>>;
}

/// Pending or completed user login session.
#[derive(Clone)]
pub struct UserSession {
	/// Opaque session identifier, doubling as the OAuth `state` parameter.
	pub session: SessionId,
	/// PKCE pair generated for this login.
	pub pkce: PkceChallenge,
	/// Creation instant.
	pub created_at: OffsetDateTime,
	/// Instant after which the session can no longer be completed.
	pub expires_at: OffsetDateTime,
	/// Delegated token produced by completion, once the session is consumed.
	pub delegated_token: Option<TokenRecord>,
	/// Instant at which the session was consumed, if it has been.
	pub consumed_at: Option<OffsetDateTime>,
}
impl UserSession {
	/// Creates a pending session expiring `ttl` after `now`.
	pub fn new(session: SessionId, pkce: PkceChallenge, now: OffsetDateTime, ttl: Duration) -> Self {
		Self {
			session,
			pkce,
			created_at: now,
			expires_at: now + ttl,
			delegated_token: None,
			consumed_at: None,
		}
	}

	/// Returns `true` once the completion window has closed.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Returns `true` once the session has been completed.
	pub fn is_consumed(&self) -> bool {
		self.consumed_at.is_some()
	}
}
impl Debug for UserSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UserSession")
			.field("session", &self.session)
			.field("pkce", &self.pkce)
			.field("created_at", &self.created_at)
			.field("expires_at", &self.expires_at)
			.field("consumed_at", &self.consumed_at)
			.finish()
	}
}

/// Result of attempting to complete a session.
#[derive(Clone, Debug)]
pub enum CompleteOutcome {
	/// The session was pending and is now consumed; the updated copy is returned.
	Completed(UserSession),
	/// The session was already consumed by an earlier completion.
	AlreadyConsumed,
	/// No session exists under the identifier.
	Missing,
}

/// Async storage backend for login sessions.
///
/// `complete` must be atomic with respect to concurrent completions of the same
/// session: exactly one caller observes [`CompleteOutcome::Completed`].
pub trait SessionStore
where
	Self: 'static + Send + Sync,
{
	/// Inserts a pending session.
	fn insert(&self, session: UserSession) -> StoreFuture<'_, Result<(), StoreError>>;

	/// Fetches a session by identifier.
	fn fetch(&self, session: &SessionId)
	-> StoreFuture<'_, Result<Option<UserSession>, StoreError>>;

	/// Marks the session consumed and attaches the delegated token.
	fn complete(
		&self,
		session: &SessionId,
		token: TokenRecord,
		now: OffsetDateTime,
	) -> StoreFuture<'_, Result<CompleteOutcome, StoreError>>;

	/// Removes a session by identifier.
	fn remove(&self, session: &SessionId)
	-> StoreFuture<'_, Result<Option<UserSession>, StoreError>>;

	/// Removes all sessions expired at `now` and returns how many were dropped.
	fn purge_expired(&self, now: OffsetDateTime) -> StoreFuture<'_, Result<usize, StoreError>>;
}
