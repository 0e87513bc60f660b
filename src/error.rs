//! Broker-level error types shared across flows, the IdP client, and stores.

// self
use crate::{_prelude::*, idp::IdpCall};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Token validation failure.
	#[error(transparent)]
	Validation(#[from] crate::validate::ValidationError),

	/// Identity provider rejected a request outright.
	#[error("Identity provider rejected the {call} request: {reason}.")]
	IdpRejected {
		/// Which IdP call was rejected.
		call: IdpCall,
		/// Provider- or broker-supplied reason string.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Agent credentials were rejected during an authentication step.
	#[error("Agent `{agent}` failed to authenticate: {reason}.")]
	InvalidAgentCredentials {
		/// Agent identifier or directory key that failed to authenticate.
		agent: String,
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
	/// A token grant or RFC 8693 exchange failed at the token endpoint.
	#[error("Token exchange failed: {reason}.")]
	TokenExchangeFailed {
		/// Agent directory key the exchange targeted, when known.
		agent: Option<String>,
		/// Provider- or broker-supplied reason string.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Issued token is bound to a different actor than requested.
	#[error("Issued token is bound to actor {found:?} instead of `{expected}`.")]
	ActorMismatch {
		/// Actor subject the broker required.
		expected: String,
		/// Actor subject found in the token, if any.
		found: Option<String>,
	},
	/// Issued token carries scopes beyond what the target agent permits.
	#[error("Token granted `{granted}` which exceeds the scopes permitted for `{agent}`.")]
	ScopeNotPermitted {
		/// Agent directory key whose scope policy was violated.
		agent: String,
		/// Space-delimited scopes the token was granted.
		granted: String,
		/// Space-delimited scopes the agent permits.
		permitted: String,
	},
	/// No login session matches the supplied identifier.
	#[error("No login session matches `{session}`.")]
	UnknownSession {
		/// Session identifier supplied by the caller.
		session: String,
	},
	/// The login session exceeded its time-to-live.
	#[error("Login session `{session}` has expired.")]
	SessionExpired {
		/// Session identifier supplied by the caller.
		session: String,
	},
	/// The login session has already been completed once.
	#[error("Login session `{session}` has already been completed.")]
	SessionConsumed {
		/// Session identifier supplied by the caller.
		session: String,
	},
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// IdP descriptor failed validation.
	#[error(transparent)]
	InvalidDescriptor(#[from] crate::idp::IdpDescriptorError),

	/// No agent with the requested key is registered in the directory.
	#[error("No agent is registered under the key `{key}`.")]
	UnknownAgent {
		/// Directory key that failed to resolve.
		key: String,
	},
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::TokenRecordBuilderError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// IdP endpoint returned an unexpected but non-fatal response.
	#[error("Identity provider returned an unexpected response: {message}.")]
	IdpEndpoint {
		/// Provider- or broker-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// IdP endpoint responded with malformed JSON that could not be parsed.
	#[error("Identity provider returned malformed JSON.")]
	ResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the identity provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the identity provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
