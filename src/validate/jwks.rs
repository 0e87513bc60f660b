//! Signature-verifying validator backed by the provider's JWKS endpoint.

// std
use std::collections::HashMap;
// crates.io
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header, errors::ErrorKind};
use oauth2::{
	AsyncHttpClient,
	http::{Method, Request, header::ACCEPT},
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenClaims},
	flows::Broker,
	http::{IdpHttpClient, ResponseMetadataSlot, TransportErrorMapper},
	validate::{TokenValidator, ValidateFuture, ValidationError, ensure_scopes},
};

const DEFAULT_KEYS_TTL: Duration = Duration::minutes(10);

/// Validator that verifies RS256 signatures against the provider's JWKS.
///
/// Keys are cached and refetched when the cache goes stale or a token names an
/// unknown key id, so provider key rotations are picked up without restarts.
pub struct JwksValidator<C>
where
	C: ?Sized + IdpHttpClient,
{
	http_client: Arc<C>,
	jwks_url: Url,
	keys_ttl: Duration,
	required_scopes: Option<ScopeSet>,
	cache: RwLock<KeyCache>,
}
impl<C> JwksValidator<C>
where
	C: ?Sized + IdpHttpClient,
{
	/// Creates a validator fetching keys from the provided JWKS URL.
	pub fn new(http_client: Arc<C>, jwks_url: Url) -> Self {
		Self {
			http_client,
			jwks_url,
			keys_ttl: DEFAULT_KEYS_TTL,
			required_scopes: None,
			cache: RwLock::new(KeyCache::default()),
		}
	}

	/// Overrides how long fetched keys are trusted before a refetch.
	pub fn with_keys_ttl(mut self, ttl: Duration) -> Self {
		self.keys_ttl = ttl;

		self
	}

	/// Requires every validated token to carry at least these scopes.
	pub fn with_required_scopes(mut self, scopes: ScopeSet) -> Self {
		self.required_scopes = Some(scopes);

		self
	}

	async fn validate_inner(&self, token: &str) -> Result<TokenClaims, ValidationError> {
		let header = decode_header(token).map_err(|_| ValidationError::Malformed)?;
		let kid = header.kid.ok_or(ValidationError::MissingKeyId)?;
		let key = self.key_for(&kid).await?;
		let decoding = DecodingKey::from_rsa_components(&key.n, &key.e)
			.map_err(|_| ValidationError::KeyNotFound { kid: kid.clone() })?;
		let mut validation = Validation::new(Algorithm::RS256);

		// Audience policy varies per deployment; callers enforce it on the
		// returned claims when they need to.
		validation.validate_aud = false;

		let data = decode::<TokenClaims>(token, &decoding, &validation).map_err(|err| {
			match err.kind() {
				ErrorKind::ExpiredSignature => ValidationError::TokenExpired,
				ErrorKind::InvalidSignature => ValidationError::SignatureInvalid,
				_ => ValidationError::Malformed,
			}
		})?;

		ensure_scopes(self.required_scopes.as_ref(), &data.claims)?;

		Ok(data.claims)
	}

	async fn key_for(&self, kid: &str) -> Result<RsaComponents, ValidationError> {
		let now = OffsetDateTime::now_utc();

		{
			let cache = self.cache.read();
			let fresh = cache.refreshed_at.map(|at| now - at < self.keys_ttl).unwrap_or(false);

			if fresh && let Some(key) = cache.keys.get(kid) {
				return Ok(key.clone());
			}
		}

		self.refresh_keys(now).await?;

		self.cache
			.read()
			.keys
			.get(kid)
			.cloned()
			.ok_or_else(|| ValidationError::KeyNotFound { kid: kid.to_owned() })
	}

	async fn refresh_keys(&self, now: OffsetDateTime) -> Result<(), ValidationError> {
		let unavailable =
			|reason: String| ValidationError::JwksUnavailable { reason };
		let request = Request::builder()
			.method(Method::GET)
			.uri(self.jwks_url.as_str())
			.header(ACCEPT, "application/json")
			.body(Vec::new())
			.map_err(|err| unavailable(err.to_string()))?;
		let handle = self.http_client.with_metadata(ResponseMetadataSlot::default());
		let response = handle.call(request).await.map_err(|err| unavailable(err.to_string()))?;

		if !response.status().is_success() {
			return Err(unavailable(format!("HTTP status {}", response.status().as_u16())));
		}

		let set: JwkSet =
			serde_json::from_slice(response.body()).map_err(|err| unavailable(err.to_string()))?;
		let keys = set
			.keys
			.into_iter()
			.filter_map(|jwk| match jwk {
				Jwk { kid: Some(kid), kty, n: Some(n), e: Some(e), .. } if kty == "RSA" =>
					Some((kid, RsaComponents { n, e })),
				_ => None,
			})
			.collect();
		let mut cache = self.cache.write();

		cache.keys = keys;
		cache.refreshed_at = Some(now);

		Ok(())
	}
}
impl<C> TokenValidator for JwksValidator<C>
where
	C: ?Sized + IdpHttpClient,
{
	fn validate<'a>(&'a self, token: &'a str) -> ValidateFuture<'a> {
		Box::pin(self.validate_inner(token))
	}
}
impl<C> Debug for JwksValidator<C>
where
	C: ?Sized + IdpHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("JwksValidator")
			.field("jwks_url", &self.jwks_url)
			.field("keys_ttl", &self.keys_ttl)
			.field("required_scopes", &self.required_scopes)
			.finish()
	}
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds a signature-verifying validator against the descriptor's JWKS
	/// endpoint, sharing the broker's transport.
	pub fn jwks_validator(&self) -> JwksValidator<C> {
		JwksValidator::new(Arc::clone(&self.http_client), self.descriptor.endpoints.jwks.clone())
	}
}

#[derive(Default)]
struct KeyCache {
	keys: HashMap<String, RsaComponents>,
	refreshed_at: Option<OffsetDateTime>,
}

#[derive(Clone)]
struct RsaComponents {
	n: String,
	e: String,
}

#[derive(Deserialize)]
struct JwkSet {
	keys: Vec<Jwk>,
}

#[derive(Deserialize)]
struct Jwk {
	kid: Option<String>,
	kty: String,
	n: Option<String>,
	e: Option<String>,
}
