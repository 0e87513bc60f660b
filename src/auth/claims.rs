//! JWT claim models shared by the flows and validators.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, auth::ScopeSet};

/// Error raised when a token cannot be split and decoded as a JWT.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ClaimsError {
	/// The token is not a three-part base64url JWT carrying a JSON payload.
	#[error("Token is not a structurally valid JWT.")]
	Malformed,
}

/// Delegation chain entry carried in the RFC 8693 `act` claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorClaim {
	/// Subject of the acting party.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sub: Option<String>,
	/// Nested prior actor, for multi-hop delegation chains.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub act: Option<Box<ActorClaim>>,
}

/// Decoded JWT payload of a broker-issued or broker-validated token.
///
/// Unknown claims are preserved in `extra` so callers can inspect
/// provider-specific fields without this crate modeling them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
	/// Subject the token was issued for.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sub: Option<String>,
	/// Issuer identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub iss: Option<String>,
	/// Audience; providers emit either a string or an array here.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub aud: Option<serde_json::Value>,
	/// Space-delimited scope string.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
	/// Expiry as seconds since the Unix epoch.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exp: Option<i64>,
	/// RFC 8693 actor claim binding the token to the acting agent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub act: Option<ActorClaim>,
	/// Authorized party.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub azp: Option<String>,
	/// Token identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub jti: Option<String>,
	/// Client the token was issued to.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_id: Option<String>,
	/// Remaining provider-specific claims.
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}
impl TokenClaims {
	/// Decodes the payload segment of a JWT without verifying its signature.
	///
	/// This is a structural decode only; callers needing authenticity go through
	/// the JWKS validator instead.
	pub fn decode_unverified(token: &str) -> Result<Self, ClaimsError> {
		let mut segments = token.split('.');
		let (Some(_), Some(payload), Some(_), None) =
			(segments.next(), segments.next(), segments.next(), segments.next())
		else {
			return Err(ClaimsError::Malformed);
		};
		let decoded = URL_SAFE_NO_PAD.decode(payload).map_err(|_| ClaimsError::Malformed)?;

		serde_json::from_slice(&decoded).map_err(|_| ClaimsError::Malformed)
	}

	/// Granted scopes as a normalized set.
	pub fn scopes(&self) -> ScopeSet {
		self.scope.as_deref().map(ScopeSet::from_space_delimited).unwrap_or_default()
	}

	/// Subject of the immediate actor, when the token carries an `act` claim.
	pub fn actor_subject(&self) -> Option<&str> {
		self.act.as_ref()?.sub.as_deref()
	}

	/// Returns true if the token is expired at the provided instant.
	///
	/// Tokens without an `exp` claim are treated as unexpired here; the JWKS
	/// validator enforces its own expiry policy.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.exp.map(|exp| instant.unix_timestamp() >= exp).unwrap_or(false)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn encode_unsigned(payload: &serde_json::Value) -> String {
		let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\",\"typ\":\"JWT\"}");
		let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());

		format!("{header}.{body}.sig")
	}

	#[test]
	fn decode_reads_actor_chain_and_scope() {
		let token = encode_unsigned(&serde_json::json!({
			"sub": "user-1",
			"scope": "hr:write hr:read",
			"exp": 4_102_444_800_i64,
			"act": { "sub": "orchestrator-agent", "act": { "sub": "upstream-agent" } },
			"org_name": "example",
		}));
		let claims = TokenClaims::decode_unverified(&token)
			.expect("Unsigned fixture token should decode successfully.");

		assert_eq!(claims.sub.as_deref(), Some("user-1"));
		assert_eq!(claims.actor_subject(), Some("orchestrator-agent"));
		assert_eq!(
			claims
				.act
				.as_ref()
				.and_then(|act| act.act.as_ref())
				.and_then(|act| act.sub.as_deref()),
			Some("upstream-agent"),
		);
		assert_eq!(claims.scopes().normalized(), "hr:read hr:write");
		assert_eq!(claims.extra.get("org_name").and_then(|v| v.as_str()), Some("example"));
	}

	#[test]
	fn expiry_checks_use_unix_timestamps() {
		let expired = encode_unsigned(&serde_json::json!({ "exp": 1_000_000_000_i64 }));
		let claims = TokenClaims::decode_unverified(&expired)
			.expect("Expired fixture token should decode successfully.");

		assert!(claims.is_expired_at(OffsetDateTime::now_utc()));

		let open_ended = encode_unsigned(&serde_json::json!({ "sub": "user-1" }));
		let claims = TokenClaims::decode_unverified(&open_ended)
			.expect("Open-ended fixture token should decode successfully.");

		assert!(!claims.is_expired_at(OffsetDateTime::now_utc()));
	}

	#[test]
	fn malformed_tokens_are_rejected() {
		assert_eq!(TokenClaims::decode_unverified("opaque"), Err(ClaimsError::Malformed));
		assert_eq!(TokenClaims::decode_unverified("a.b"), Err(ClaimsError::Malformed));
		assert_eq!(TokenClaims::decode_unverified("a.%%%.c"), Err(ClaimsError::Malformed));
	}
}
