//! Inbound token validation for resource services.
//!
//! [`JwksValidator`] is the validator services should reach for: it verifies
//! signatures against the provider's published keys before trusting a single
//! claim. [`UnverifiedValidator`] only decodes and applies local policy; it
//! exists for gateways sitting behind a component that has already verified
//! the signature, and must be chosen explicitly.

pub mod jwks;
pub use jwks::*;

// self
use crate::{
	_prelude::*,
	auth::{ClaimsError, ScopeSet, TokenClaims},
};

/// Errors raised while validating inbound tokens.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ValidationError {
	/// Token could not be decoded as a JWT.
	#[error("Token is structurally malformed.")]
	Malformed,
	/// Token header does not name the signing key.
	#[error("Token header does not name a key id.")]
	MissingKeyId,
	/// No published key matches the token's key id.
	#[error("No JWKS key matches the key id `{kid}`.")]
	KeyNotFound {
		/// Key id the token was signed with.
		kid: String,
	},
	/// Signature verification failed.
	#[error("Token signature is invalid.")]
	SignatureInvalid,
	/// Token expired.
	#[error("Token has expired.")]
	TokenExpired,
	/// Token does not carry the scopes the validator requires.
	#[error("Token grants `{granted}` but `{required}` is required.")]
	InsufficientScope {
		/// Space-delimited scopes the validator requires.
		required: String,
		/// Space-delimited scopes the token was granted.
		granted: String,
	},
	/// JWKS endpoint could not be reached or parsed.
	#[error("JWKS endpoint is unavailable: {reason}.")]
	JwksUnavailable {
		/// Transport- or parser-supplied reason string.
		reason: String,
	},
}
impl From<ClaimsError> for ValidationError {
	fn from(_: ClaimsError) -> Self {
		Self::Malformed
	}
}

/// Boxed future returned by [`TokenValidator::validate`].
pub type ValidateFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TokenClaims, ValidationError>> + 'a + Send>>;

/// Validates inbound tokens and exposes their claims on success.
pub trait TokenValidator
where
	Self: 'static + Send + Sync,
{
	/// Validates the token and returns its decoded claims.
	fn validate<'a>(&'a self, token: &'a str) -> ValidateFuture<'a>;
}

/// Validator that decodes claims without verifying the signature.
///
/// Still enforces expiry and the configured scope requirement. Only deploy
/// behind infrastructure that has already verified the signature.
#[derive(Clone, Debug, Default)]
pub struct UnverifiedValidator {
	required_scopes: Option<ScopeSet>,
}
impl UnverifiedValidator {
	/// Creates a validator with no scope requirement.
	pub fn new() -> Self {
		Self::default()
	}

	/// Requires every validated token to carry at least these scopes.
	pub fn with_required_scopes(mut self, scopes: ScopeSet) -> Self {
		self.required_scopes = Some(scopes);

		self
	}
}
impl TokenValidator for UnverifiedValidator {
	fn validate<'a>(&'a self, token: &'a str) -> ValidateFuture<'a> {
		Box::pin(async move {
			let claims = TokenClaims::decode_unverified(token)?;

			if claims.is_expired_at(OffsetDateTime::now_utc()) {
				return Err(ValidationError::TokenExpired);
			}

			ensure_scopes(self.required_scopes.as_ref(), &claims)?;

			Ok(claims)
		})
	}
}

pub(crate) fn ensure_scopes(
	required: Option<&ScopeSet>,
	claims: &TokenClaims,
) -> Result<(), ValidationError> {
	let Some(required) = required else {
		return Ok(());
	};
	let granted = claims.scopes();

	if required.is_subset_of(&granted) {
		Ok(())
	} else {
		Err(ValidationError::InsufficientScope {
			required: required.normalized(),
			granted: granted.normalized(),
		})
	}
}
