//! Serde models for identity-provider request and response payloads.

// self
use crate::_prelude::*;

/// Direct-mode authorization response body.
///
/// Providers either start an authentication flow (`flowStatus` +`flowId`) or,
/// when an active session already covers the client, short-circuit with a code.
#[derive(Debug, Deserialize)]
pub(crate) struct DirectAuthResponse {
	#[serde(rename = "flowStatus")]
	pub flow_status: Option<String>,
	#[serde(rename = "flowId")]
	pub flow_id: Option<String>,
	#[serde(rename = "authData")]
	pub auth_data: Option<AuthData>,
	pub code: Option<String>,
}

/// Authentication-step response body.
#[derive(Debug, Deserialize)]
pub(crate) struct AuthnResponse {
	#[serde(rename = "flowStatus")]
	pub flow_status: Option<String>,
	#[serde(rename = "authData")]
	pub auth_data: Option<AuthData>,
	pub code: Option<String>,
}

/// Nested payload carrying the authorization code after authentication.
#[derive(Debug, Deserialize)]
pub(crate) struct AuthData {
	pub code: Option<String>,
	#[serde(rename = "redirectUrl")]
	pub redirect_url: Option<String>,
}

/// Successful token endpoint response body shared by every grant.
#[derive(Deserialize)]
pub struct TokenPayload {
	/// Issued access token.
	pub access_token: String,
	/// Token type, normally `Bearer`.
	pub token_type: Option<String>,
	/// Relative expiry in seconds.
	pub expires_in: Option<u64>,
	/// Space-delimited scopes actually granted.
	pub scope: Option<String>,
	/// Refresh token, when the provider issues one.
	pub refresh_token: Option<String>,
	/// OpenID Connect identity token, when requested.
	pub id_token: Option<String>,
}
impl Debug for TokenPayload {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenPayload")
			.field("access_token", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("expires_in", &self.expires_in)
			.field("scope", &self.scope)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

/// Structured OAuth error body returned by provider endpoints.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct OAuthErrorBody {
	pub error: Option<String>,
	pub error_description: Option<String>,
}
