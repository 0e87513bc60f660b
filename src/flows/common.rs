//! Shared helpers for flow implementations (freshness, payload conversion, guards).

// self
use crate::{
	_prelude::*,
	auth::{AgentId, ScopeSet, TokenClaims, TokenRecord, TokenStatus},
	error::ConfigError,
	flows::Broker,
	http::{IdpHttpClient, TransportErrorMapper},
	idp::TokenPayload,
	store::CacheKey,
};

/// Cached actor tokens within this margin of expiry are refreshed early, so a
/// token handed to a flow never expires mid-exchange.
pub const ACTOR_REFRESH_MARGIN: Duration = Duration::seconds(60);

/// Returns `true` when a cached record can still be served.
pub fn is_fresh(record: &TokenRecord, now: OffsetDateTime) -> bool {
	record.status_at(now) == TokenStatus::Active
		&& record.expires_at - now > ACTOR_REFRESH_MARGIN
}

/// Converts a token endpoint payload into a [`TokenRecord`].
///
/// `expires_in` is mandatory; tokens without a bounded lifetime are rejected
/// rather than cached forever. When the provider omits the granted scope, the
/// requested `fallback_scope` is assumed. Claims are decoded without signature
/// verification purely for bookkeeping (`act` inspection); authorization
/// decisions on inbound tokens go through the validators instead.
pub fn record_from_payload(
	payload: TokenPayload,
	fallback_scope: &ScopeSet,
	actor: Option<AgentId>,
) -> Result<TokenRecord> {
	let secs = payload.expires_in.ok_or(ConfigError::MissingExpiresIn)?;
	let secs = i64::try_from(secs).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if secs <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	let scope = payload
		.scope
		.as_deref()
		.map(ScopeSet::from_space_delimited)
		.unwrap_or_else(|| fallback_scope.clone());
	let claims = TokenClaims::decode_unverified(&payload.access_token).ok();
	let mut builder = TokenRecord::builder(scope)
		.access_token(payload.access_token)
		.issued_now()
		.expires_in(Duration::seconds(secs));

	if let Some(token_type) = payload.token_type {
		builder = builder.token_type(token_type);
	}
	if let Some(actor) = actor {
		builder = builder.actor(actor);
	}
	if let Some(claims) = claims {
		builder = builder.claims(claims);
	}

	Ok(builder.build().map_err(ConfigError::from)?)
}

/// Returns (and creates on demand) the singleflight guard for a cache key.
pub(crate) fn flow_guard<C, M>(broker: &Broker<C, M>, key: &CacheKey) -> Arc<AsyncMutex<()>>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let mut guards = broker.flow_guards.lock();

	guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::Error;

	fn payload(expires_in: Option<u64>, scope: Option<&str>) -> TokenPayload {
		TokenPayload {
			access_token: "issued".into(),
			token_type: Some("Bearer".into()),
			expires_in,
			scope: scope.map(str::to_owned),
			refresh_token: None,
			id_token: None,
		}
	}

	#[test]
	fn payload_conversion_prefers_granted_scope() {
		let fallback = ScopeSet::from_space_delimited("openid");
		let record = record_from_payload(payload(Some(3600), Some("hr:read")), &fallback, None)
			.expect("Payload with scope and expiry should convert.");

		assert_eq!(record.scope.normalized(), "hr:read");
		assert_eq!(record.access_token.expose(), "issued");

		let defaulted = record_from_payload(payload(Some(3600), None), &fallback, None)
			.expect("Payload without scope should fall back to the requested set.");

		assert_eq!(defaulted.scope.normalized(), "openid");
	}

	#[test]
	fn payload_conversion_requires_a_bounded_lifetime() {
		let fallback = ScopeSet::default();

		assert!(matches!(
			record_from_payload(payload(None, None), &fallback, None)
				.expect_err("Missing expires_in must be rejected."),
			Error::Config(ConfigError::MissingExpiresIn),
		));
		assert!(matches!(
			record_from_payload(payload(Some(0), None), &fallback, None)
				.expect_err("Zero expires_in must be rejected."),
			Error::Config(ConfigError::NonPositiveExpiresIn),
		));
		assert!(matches!(
			record_from_payload(payload(Some(u64::MAX), None), &fallback, None)
				.expect_err("Overflowing expires_in must be rejected."),
			Error::Config(ConfigError::ExpiresInOutOfRange),
		));
	}

	#[test]
	fn freshness_respects_the_refresh_margin() {
		let now = OffsetDateTime::now_utc();
		let record = record_from_payload(payload(Some(3600), None), &ScopeSet::default(), None)
			.expect("Payload fixture should convert.");

		assert!(is_fresh(&record, now));
		assert!(!is_fresh(&record, now + Duration::seconds(3541)));
		assert!(!is_fresh(&record, now + Duration::seconds(7200)));
	}
}
