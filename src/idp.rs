//! Typed client for WSO2/Asgardeo-style identity-provider endpoints.
//!
//! The client speaks three surfaces on top of a pluggable transport:
//!
//! - the authorization endpoint in `response_mode=direct`, which either starts an
//!   authentication flow or short-circuits with a code when a session is active;
//! - the authentication endpoint, which accepts authenticator payloads for
//!   non-interactive agent credentials;
//! - the token endpoint, covering the authorization-code, password, and RFC 8693
//!   token-exchange grants.
//!
//! Client credentials ride in a Basic authorization header for every call except
//! the authorization-code exchange, which this provider family only accepts with
//! `client_id`/`client_secret` as body parameters. That asymmetry is load-bearing;
//! do not "normalize" it.

pub mod descriptor;
pub mod wire;

pub use descriptor::*;
pub use wire::TokenPayload;

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use oauth2::{
	AsyncHttpClient, HttpRequest,
	http::{
		Method, Request,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION},
	},
};
use serde::de::DeserializeOwned;
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{AgentId, PkceChallenge, ScopeSet, TokenSecret},
	config::AppCredentials,
	error::{ConfigError, TransientError},
	http::{IdpHttpClient, ResponseMetadataSlot, TransportErrorMapper},
	idp::wire::{AuthData, AuthnResponse, DirectAuthResponse, OAuthErrorBody},
};

const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
/// base64("BasicAuthenticator:LOCAL"), the authenticator selector for
/// username/password credentials on the authentication endpoint.
const BASIC_AUTHENTICATOR_ID: &str = "QmFzaWNBdXRoZW50aWNhdG9yOkxPQ0FM";
const BODY_PREVIEW_LIMIT: usize = 256;

/// Identity-provider calls issued by the broker, used for error labeling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdpCall {
	/// Direct-mode authorization request.
	DirectAuthorize,
	/// Authenticator submission against the authentication endpoint.
	Authenticate,
	/// Authorization-code exchange at the token endpoint.
	CodeExchange,
	/// Resource-owner password grant at the token endpoint.
	PasswordGrant,
	/// RFC 8693 token exchange at the token endpoint.
	TokenExchange,
}
impl IdpCall {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			IdpCall::DirectAuthorize => "direct_authorize",
			IdpCall::Authenticate => "authenticate",
			IdpCall::CodeExchange => "code_exchange",
			IdpCall::PasswordGrant => "password_grant",
			IdpCall::TokenExchange => "token_exchange",
		}
	}
}
impl Display for IdpCall {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome of a direct-mode authorization request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirectAuthOutcome {
	/// The provider started an authentication flow; submit credentials next.
	FlowInitiated {
		/// Flow identifier to present to the authentication endpoint.
		flow_id: String,
	},
	/// An active session satisfied the request; the code is ready to exchange.
	Completed {
		/// Issued authorization code.
		code: String,
	},
}

/// Typed identity-provider client bound to one descriptor and transport.
pub struct IdpClient<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Descriptor naming the endpoints this client talks to.
	pub descriptor: IdpDescriptor,
	/// HTTP client wrapper used for every outbound request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them.
	pub transport_mapper: Arc<M>,
}
impl<C, M> IdpClient<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a client from a descriptor and a caller-provided transport pair.
	pub fn new(
		descriptor: IdpDescriptor,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self { descriptor, http_client: http_client.into(), transport_mapper: mapper.into() }
	}

	/// Starts a direct-mode authorization flow for the application.
	///
	/// Client credentials go into the Basic authorization header. The provider
	/// answers with a flow identifier, a short-circuit code when a session is
	/// already active, or a 302 whose Location query carries the flow identifier
	/// (standard browser mode).
	pub async fn initiate_direct_auth_flow(
		&self,
		app: &AppCredentials,
		pkce: &PkceChallenge,
		scope: &ScopeSet,
		redirect_uri: &Url,
	) -> Result<DirectAuthOutcome> {
		const CALL: IdpCall = IdpCall::DirectAuthorize;

		let body = form_urlencoded::Serializer::new(String::new())
			.append_pair("response_type", "code")
			.append_pair("response_mode", "direct")
			.append_pair("client_id", &app.client_id)
			.append_pair("redirect_uri", redirect_uri.as_str())
			.append_pair("scope", &scope.normalized())
			.append_pair("code_challenge", pkce.challenge())
			.append_pair("code_challenge_method", pkce.method().as_str())
			.finish();
		let request =
			form_request(&self.descriptor.endpoints.authorization, body, Some(app))?;
		let resp = self.dispatch(CALL, request).await?;

		if resp.status == 302 {
			let location = resp.location.as_deref().ok_or_else(|| Error::IdpRejected {
				call: CALL,
				reason: "Redirect response did not include a Location header".into(),
				status: Some(resp.status),
			})?;

			return match location_hint(&self.descriptor.endpoints.authorization, location) {
				Some(LocationHint::Code(code)) => Ok(DirectAuthOutcome::Completed { code }),
				Some(LocationHint::Flow(flow_id)) =>
					Ok(DirectAuthOutcome::FlowInitiated { flow_id }),
				None => Err(Error::IdpRejected {
					call: CALL,
					reason: "Redirect location did not carry a flow identifier".into(),
					status: Some(resp.status),
				}),
			};
		}
		if !resp.is_success() {
			return Err(classify_failure(&resp, CALL).into_error_for(CALL));
		}

		let parsed: DirectAuthResponse = parse_json(&resp)?;

		if parsed.flow_status.as_deref() == Some("SUCCESS_COMPLETED") {
			if let Some(code) = extract_code(parsed.auth_data.as_ref(), parsed.code.as_deref()) {
				return Ok(DirectAuthOutcome::Completed { code });
			}
		}
		if let Some(flow_id) = parsed.flow_id {
			return Ok(DirectAuthOutcome::FlowInitiated { flow_id });
		}

		Err(Error::IdpRejected {
			call: CALL,
			reason: "Response did not include a flow identifier or code".into(),
			status: Some(resp.status),
		})
	}

	/// Submits the agent's own credentials for a pending flow and returns the code.
	pub async fn authenticate_with_credentials(
		&self,
		flow_id: &str,
		agent_id: &AgentId,
		agent_secret: &TokenSecret,
	) -> Result<String> {
		const CALL: IdpCall = IdpCall::Authenticate;

		let payload = serde_json::json!({
			"flowId": flow_id,
			"selectedAuthenticator": {
				"authenticatorId": BASIC_AUTHENTICATOR_ID,
				"params": {
					"username": agent_id.as_ref(),
					"password": agent_secret.expose(),
				},
			},
		});
		let request =
			json_request(&self.descriptor.endpoints.authentication, payload.to_string())?;
		let resp = self.dispatch(CALL, request).await?;

		if !resp.is_success() {
			return Err(match classify_failure(&resp, CALL) {
				IdpFailure::Rejected { reason, .. } =>
					Error::InvalidAgentCredentials { agent: agent_id.to_string(), reason },
				transient => transient.into_error_for(CALL),
			});
		}

		let parsed: AuthnResponse = parse_json(&resp)?;

		extract_code(parsed.auth_data.as_ref(), parsed.code.as_deref()).ok_or_else(|| {
			let status = parsed.flow_status.unwrap_or_else(|| "unknown".into());

			Error::InvalidAgentCredentials {
				agent: agent_id.to_string(),
				reason: format!(
					"Authentication response ({status}) did not include an authorization code"
				),
			}
		})
	}

	/// Exchanges an authorization code, optionally attaching an actor token.
	///
	/// Unlike every other token call, this grant sends `client_id` and
	/// `client_secret` as body parameters; the provider rejects Basic headers here.
	pub async fn exchange_authorization_code(
		&self,
		app: &AppCredentials,
		code: &str,
		pkce_verifier: &str,
		redirect_uri: &Url,
		actor_token: Option<&str>,
	) -> Result<TokenPayload> {
		const CALL: IdpCall = IdpCall::CodeExchange;

		let mut serializer = form_urlencoded::Serializer::new(String::new());

		serializer
			.append_pair("grant_type", "authorization_code")
			.append_pair("code", code)
			.append_pair("redirect_uri", redirect_uri.as_str())
			.append_pair("code_verifier", pkce_verifier)
			.append_pair("client_id", &app.client_id)
			.append_pair("client_secret", app.client_secret.expose());

		if let Some(actor) = actor_token {
			serializer
				.append_pair("actor_token", actor)
				.append_pair("actor_token_type", ACCESS_TOKEN_TYPE);
		}

		let request = form_request(&self.descriptor.endpoints.token, serializer.finish(), None)?;

		self.token_call(CALL, request).await
	}

	/// Acquires a token with the resource-owner password grant.
	///
	/// Lower assurance than the direct-auth handshake; kept for providers and
	/// deployments that have not enabled the direct flow.
	pub async fn password_grant(
		&self,
		app: &AppCredentials,
		agent_id: &AgentId,
		agent_secret: &TokenSecret,
		scope: &ScopeSet,
	) -> Result<TokenPayload> {
		const CALL: IdpCall = IdpCall::PasswordGrant;

		let body = form_urlencoded::Serializer::new(String::new())
			.append_pair("grant_type", "password")
			.append_pair("username", agent_id.as_ref())
			.append_pair("password", agent_secret.expose())
			.append_pair("scope", &scope.normalized())
			.finish();
		let request = form_request(&self.descriptor.endpoints.token, body, Some(app))?;

		self.token_call(CALL, request).await.map_err(|err| match err {
			Error::TokenExchangeFailed { reason, .. } =>
				Error::InvalidAgentCredentials { agent: agent_id.to_string(), reason },
			other => other,
		})
	}

	/// Performs an RFC 8693 token exchange, optionally binding an actor token.
	///
	/// `scope` limits the issued token to the target agent's permitted scopes;
	/// the caller still verifies the granted scopes on the way out.
	pub async fn exchange_token(
		&self,
		app: &AppCredentials,
		subject_token: &str,
		actor_token: Option<&str>,
		scope: &ScopeSet,
	) -> Result<TokenPayload> {
		const CALL: IdpCall = IdpCall::TokenExchange;

		let mut serializer = form_urlencoded::Serializer::new(String::new());

		serializer
			.append_pair("grant_type", TOKEN_EXCHANGE_GRANT)
			.append_pair("subject_token", subject_token)
			.append_pair("subject_token_type", ACCESS_TOKEN_TYPE)
			.append_pair("requested_token_type", ACCESS_TOKEN_TYPE);

		if let Some(actor) = actor_token {
			serializer
				.append_pair("actor_token", actor)
				.append_pair("actor_token_type", ACCESS_TOKEN_TYPE);
		}
		if !scope.is_empty() {
			serializer.append_pair("scope", &scope.normalized());
		}

		let request =
			form_request(&self.descriptor.endpoints.token, serializer.finish(), Some(app))?;

		self.token_call(CALL, request).await
	}

	/// Builds the browser authorization URL for the delegated user login.
	///
	/// Pure URL construction; `requested_actor` asks the provider to bind the
	/// eventual delegated token to the orchestrator agent.
	pub fn build_user_authorization_url(
		&self,
		client_id: &str,
		scope: &ScopeSet,
		state: &str,
		pkce: &PkceChallenge,
		requested_actor: &AgentId,
		redirect_uri: &Url,
	) -> Url {
		let mut url = self.descriptor.endpoints.authorization.clone();

		{
			let mut pairs = url.query_pairs_mut();

			pairs.append_pair("response_type", "code");
			pairs.append_pair("client_id", client_id);
			pairs.append_pair("redirect_uri", redirect_uri.as_str());

			if !scope.is_empty() {
				pairs.append_pair("scope", &scope.normalized());
			}

			pairs.append_pair("state", state);
			pairs.append_pair("code_challenge", pkce.challenge());
			pairs.append_pair("code_challenge_method", pkce.method().as_str());
			pairs.append_pair("requested_actor", requested_actor.as_ref());
		}

		url
	}

	async fn token_call(&self, call: IdpCall, request: HttpRequest) -> Result<TokenPayload> {
		let resp = self.dispatch(call, request).await?;

		if !resp.is_success() {
			return Err(match classify_failure(&resp, call) {
				IdpFailure::Rejected { reason, status } =>
					Error::TokenExchangeFailed { agent: None, reason, status: Some(status) },
				transient => transient.into_error_for(call),
			});
		}

		parse_json(&resp)
	}

	async fn dispatch(&self, call: IdpCall, request: HttpRequest) -> Result<DispatchedResponse> {
		let slot = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(slot.clone());
		let response = handle.call(request).await.map_err(|err| {
			self.transport_mapper.map_transport_error(call, slot.take().as_ref(), err)
		})?;
		let status = response.status().as_u16();
		let location = response
			.headers()
			.get(LOCATION)
			.and_then(|value| value.to_str().ok())
			.map(str::to_owned);
		let retry_after = slot.take().and_then(|meta| meta.retry_after);

		Ok(DispatchedResponse { status, location, body: response.into_body(), retry_after })
	}
}
impl<C, M> Debug for IdpClient<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdpClient").field("descriptor", &self.descriptor).finish()
	}
}

struct DispatchedResponse {
	status: u16,
	location: Option<String>,
	body: Vec<u8>,
	retry_after: Option<Duration>,
}
impl DispatchedResponse {
	fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

enum IdpFailure {
	Transient { message: String, status: Option<u16>, retry_after: Option<Duration> },
	Rejected { reason: String, status: u16 },
}
impl IdpFailure {
	fn into_error_for(self, call: IdpCall) -> Error {
		match self {
			IdpFailure::Transient { message, status, retry_after } =>
				TransientError::IdpEndpoint { message, status, retry_after }.into(),
			IdpFailure::Rejected { reason, status } =>
				Error::IdpRejected { call, reason, status: Some(status) },
		}
	}
}

enum LocationHint {
	Flow(String),
	Code(String),
}

fn form_request(
	endpoint: &Url,
	body: String,
	basic: Option<&AppCredentials>,
) -> Result<HttpRequest> {
	let mut builder = Request::builder()
		.method(Method::POST)
		.uri(endpoint.as_str())
		.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
		.header(ACCEPT, "application/json");

	if let Some(app) = basic {
		builder = builder.header(AUTHORIZATION, basic_authorization(app));
	}

	Ok(builder.body(body.into_bytes()).map_err(ConfigError::from)?)
}

fn json_request(endpoint: &Url, body: String) -> Result<HttpRequest> {
	Ok(Request::builder()
		.method(Method::POST)
		.uri(endpoint.as_str())
		.header(CONTENT_TYPE, "application/json")
		.header(ACCEPT, "application/json")
		.body(body.into_bytes())
		.map_err(ConfigError::from)?)
}

fn basic_authorization(app: &AppCredentials) -> String {
	let credentials = format!("{}:{}", app.client_id, app.client_secret.expose());

	format!("Basic {}", STANDARD.encode(credentials))
}

fn parse_json<T>(resp: &DispatchedResponse) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(&resp.body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| TransientError::ResponseParse { source, status: Some(resp.status) }.into())
}

fn classify_failure(resp: &DispatchedResponse, call: IdpCall) -> IdpFailure {
	let body_text = String::from_utf8_lossy(&resp.body);
	let parsed: OAuthErrorBody = serde_json::from_slice(&resp.body).unwrap_or_default();
	let reason = parsed
		.error_description
		.clone()
		.or_else(|| parsed.error.clone())
		.map(truncate_preview)
		.unwrap_or_else(|| {
			let preview = truncate_preview(body_text.trim().to_owned());

			if preview.is_empty() { format!("HTTP status {}", resp.status) } else { preview }
		});

	if is_transient(resp.status, parsed.error.as_deref(), &body_text) {
		IdpFailure::Transient {
			message: format!("The {call} call failed: {reason}"),
			status: Some(resp.status),
			retry_after: resp.retry_after,
		}
	} else {
		IdpFailure::Rejected { reason, status: resp.status }
	}
}

/// Structured OAuth fields win over body text, which wins over the HTTP status.
fn is_transient(status: u16, oauth_error: Option<&str>, body: &str) -> bool {
	if let Some(code) = oauth_error {
		return code.eq_ignore_ascii_case("server_error")
			|| code.eq_ignore_ascii_case("temporarily_unavailable");
	}

	let lowered = body.to_ascii_lowercase();

	if lowered.contains("temporarily_unavailable") {
		return true;
	}

	status == 429 || status >= 500
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= BODY_PREVIEW_LIMIT {
		return body;
	}

	body.chars().take(BODY_PREVIEW_LIMIT).collect()
}

fn extract_code(auth_data: Option<&AuthData>, code: Option<&str>) -> Option<String> {
	if let Some(data) = auth_data {
		if let Some(code) = &data.code {
			return Some(code.clone());
		}
		if let Some(redirect) = &data.redirect_url
			&& let Ok(url) = Url::parse(redirect)
			&& let Some((_, value)) = url.query_pairs().find(|(key, _)| key == "code")
		{
			return Some(value.into_owned());
		}
	}

	code.map(str::to_owned)
}

fn location_hint(base: &Url, location: &str) -> Option<LocationHint> {
	let url = Url::options().base_url(Some(base)).parse(location).ok()?;
	let mut flow = None;
	let mut code = None;

	for (key, value) in url.query_pairs() {
		match key.as_ref() {
			"flowId" | "sessionDataKey" => flow = Some(value.into_owned()),
			"code" => code = Some(value.into_owned()),
			_ => {},
		}
	}

	code.map(LocationHint::Code).or(flow.map(LocationHint::Flow))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn response(status: u16, body: &str) -> DispatchedResponse {
		DispatchedResponse {
			status,
			location: None,
			body: body.as_bytes().to_vec(),
			retry_after: None,
		}
	}

	#[test]
	fn classification_prefers_structured_oauth_fields() {
		let rejected = classify_failure(&response(500, "{\"error\":\"invalid_client\"}"), IdpCall::PasswordGrant);

		assert!(matches!(rejected, IdpFailure::Rejected { .. }));

		let transient = classify_failure(&response(400, "{\"error\":\"server_error\"}"), IdpCall::PasswordGrant);

		assert!(matches!(transient, IdpFailure::Transient { .. }));
	}

	#[test]
	fn classification_falls_back_to_status() {
		assert!(matches!(
			classify_failure(&response(503, "upstream restarting"), IdpCall::TokenExchange),
			IdpFailure::Transient { .. },
		));
		assert!(matches!(
			classify_failure(&response(401, "nope"), IdpCall::TokenExchange),
			IdpFailure::Rejected { reason, status: 401 } if reason == "nope",
		));
	}

	#[test]
	fn code_extraction_covers_nested_and_redirect_shapes() {
		let nested = AuthData { code: Some("nested".into()), redirect_url: None };

		assert_eq!(extract_code(Some(&nested), Some("top")), Some("nested".into()));

		let redirect = AuthData {
			code: None,
			redirect_url: Some("https://app.example/cb?code=from-redirect&state=s".into()),
		};

		assert_eq!(extract_code(Some(&redirect), None), Some("from-redirect".into()));
		assert_eq!(extract_code(None, Some("top")), Some("top".into()));
		assert_eq!(extract_code(None, None), None);
	}

	#[test]
	fn location_hints_parse_flow_and_code() {
		let base = Url::parse("https://idp.example/oauth2/authorize")
			.expect("Base URL fixture should parse successfully.");

		assert!(matches!(
			location_hint(&base, "https://idp.example/login?flowId=flow-9"),
			Some(LocationHint::Flow(flow)) if flow == "flow-9",
		));
		assert!(matches!(
			location_hint(&base, "/authenticate?sessionDataKey=sdk-1"),
			Some(LocationHint::Flow(flow)) if flow == "sdk-1",
		));
		assert!(matches!(
			location_hint(&base, "https://app.example/cb?code=abc"),
			Some(LocationHint::Code(code)) if code == "abc",
		));
		assert!(location_hint(&base, "/plain").is_none());
	}

	#[test]
	fn basic_authorization_encodes_credentials() {
		let app = AppCredentials::new("client", "secret");

		assert_eq!(basic_authorization(&app), "Basic Y2xpZW50OnNlY3JldA==");
	}
}
