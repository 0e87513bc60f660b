//! PKCE verifier/challenge generation (RFC 7636, S256 only).

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Freshly generated PKCE verifier/challenge pair.
///
/// The verifier is secret handshake material and is redacted from `Debug`
/// output; only the derived challenge is exposed for display.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
	verifier: String,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkceChallenge {
	/// Generates a fresh verifier from the process CSPRNG and derives its challenge.
	///
	/// The 64-character alphanumeric verifier sits comfortably inside RFC 7636's
	/// 43..=128 bound while carrying more than 32 bytes of entropy.
	pub fn generate() -> Self {
		let verifier: String =
			rand::rng().sample_iter(Alphanumeric).take(PKCE_VERIFIER_LEN).map(char::from).collect();
		let mut hasher = Sha256::new();

		hasher.update(verifier.as_bytes());

		let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

		Self { verifier, challenge, method: PkceCodeChallengeMethod::S256 }
	}

	/// Secret verifier sent with the code exchange. Callers must avoid logging it.
	pub fn verifier(&self) -> &str {
		&self.verifier
	}

	/// Base64url (no padding) SHA-256 challenge sent with the authorization request.
	pub fn challenge(&self) -> &str {
		&self.challenge
	}

	/// Challenge method (currently always `S256`).
	pub fn method(&self) -> PkceCodeChallengeMethod {
		self.method
	}
}
impl Debug for PkceChallenge {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkceChallenge")
			.field("verifier", &"<redacted>")
			.field("challenge", &self.challenge)
			.field("method", &self.method)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn challenge_matches_verifier_digest() {
		let pkce = PkceChallenge::generate();
		let mut hasher = Sha256::new();

		hasher.update(pkce.verifier().as_bytes());

		let expected = URL_SAFE_NO_PAD.encode(hasher.finalize());

		assert_eq!(pkce.challenge(), expected);
		assert_eq!(pkce.method().as_str(), "S256");
	}

	#[test]
	fn verifier_length_satisfies_rfc_bounds() {
		let pkce = PkceChallenge::generate();

		assert!((43..=128).contains(&pkce.verifier().len()));
		assert!(pkce.verifier().chars().all(|c| c.is_ascii_alphanumeric()));
	}

	#[test]
	fn consecutive_pairs_differ() {
		let lhs = PkceChallenge::generate();
		let rhs = PkceChallenge::generate();

		assert_ne!(lhs.verifier(), rhs.verifier());
		assert_ne!(lhs.challenge(), rhs.challenge());
	}

	#[test]
	fn debug_redacts_verifier() {
		let pkce = PkceChallenge::generate();
		let rendered = format!("{pkce:?}");

		assert!(rendered.contains("<redacted>"));
		assert!(!rendered.contains(pkce.verifier()));
	}
}
