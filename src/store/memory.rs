//! In-memory storage backends for single-process deployments.

// std
use std::collections::HashMap;
// self
use crate::{
	_prelude::*,
	auth::{SessionId, TokenRecord},
	store::{BrokerStore, CacheKey, CompleteOutcome, SessionStore, StoreError, StoreFuture, UserSession},
};

/// Process-local actor-token cache backed by a [`HashMap`].
#[derive(Debug, Default)]
pub struct MemoryStore {
	records: RwLock<HashMap<CacheKey, TokenRecord>>,
}
impl MemoryStore {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of cached records, for test assertions and diagnostics.
	pub fn len(&self) -> usize {
		self.records.read().len()
	}

	/// Returns `true` when the cache is empty.
	pub fn is_empty(&self) -> bool {
		self.records.read().is_empty()
	}
}
impl BrokerStore for MemoryStore {
	fn save(&self, key: CacheKey, record: TokenRecord) -> StoreFuture<'_, Result<(), StoreError>> {
		self.records.write().insert(key, record);

		Box::pin(async { Ok(()) })
	}

	fn fetch(&self, key: &CacheKey) -> StoreFuture<'_, Result<Option<TokenRecord>, StoreError>> {
		let record = self.records.read().get(key).cloned();

		Box::pin(async { Ok(record) })
	}

	fn evict(&self, key: &CacheKey) -> StoreFuture<'_, Result<Option<TokenRecord>, StoreError>> {
		let record = self.records.write().remove(key);

		Box::pin(async { Ok(record) })
	}
}

/// Process-local session store backed by a [`HashMap`].
#[derive(Debug, Default)]
pub struct MemorySessionStore {
	sessions: RwLock<HashMap<SessionId, UserSession>>,
}
impl MemorySessionStore {
	/// Creates an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of stored sessions, for test assertions and diagnostics.
	pub fn len(&self) -> usize {
		self.sessions.read().len()
	}

	/// Returns `true` when no sessions are stored.
	pub fn is_empty(&self) -> bool {
		self.sessions.read().is_empty()
	}
}
impl SessionStore for MemorySessionStore {
	fn insert(&self, session: UserSession) -> StoreFuture<'_, Result<(), StoreError>> {
		self.sessions.write().insert(session.session.clone(), session);

		Box::pin(async { Ok(()) })
	}

	fn fetch(
		&self,
		session: &SessionId,
	) -> StoreFuture<'_, Result<Option<UserSession>, StoreError>> {
		let found = self.sessions.read().get(session).cloned();

		Box::pin(async { Ok(found) })
	}

	fn complete(
		&self,
		session: &SessionId,
		token: TokenRecord,
		now: OffsetDateTime,
	) -> StoreFuture<'_, Result<CompleteOutcome, StoreError>> {
		// The write lock spans the check and the update, so exactly one caller
		// observes the pending state.
		let outcome = match self.sessions.write().get_mut(session) {
			None => CompleteOutcome::Missing,
			Some(entry) if entry.is_consumed() => CompleteOutcome::AlreadyConsumed,
			Some(entry) => {
				entry.consumed_at = Some(now);
				entry.delegated_token = Some(token);

				CompleteOutcome::Completed(entry.clone())
			},
		};

		Box::pin(async { Ok(outcome) })
	}

	fn remove(
		&self,
		session: &SessionId,
	) -> StoreFuture<'_, Result<Option<UserSession>, StoreError>> {
		let removed = self.sessions.write().remove(session);

		Box::pin(async { Ok(removed) })
	}

	fn purge_expired(&self, now: OffsetDateTime) -> StoreFuture<'_, Result<usize, StoreError>> {
		let mut sessions = self.sessions.write();
		let before = sessions.len();

		sessions.retain(|_, session| !session.is_expired_at(now));

		let dropped = before - sessions.len();

		Box::pin(async move { Ok(dropped) })
	}
}
