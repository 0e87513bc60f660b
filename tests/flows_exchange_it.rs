// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use httpmock::prelude::*;
// self
use agent_token_broker::{
	_preludet::*,
	auth::{AgentId, AgentKey, IdpId, ScopeSet},
	config::{ActorTokenStrategy, AgentIdentity, AppCredentials, BrokerConfig},
	error::ConfigError,
	idp::IdpDescriptor,
};

const EXCH_BASIC: &str = "Basic ZXhjaC1hcHA6ZXhjaC1zZWNyZXQ=";
const HR_ACTOR_TOKEN_BODY: &str =
	"{\"access_token\":\"hr-actor-token\",\"token_type\":\"Bearer\",\"expires_in\":3600,\"scope\":\"openid\"}";

fn build_descriptor(server: &MockServer) -> IdpDescriptor {
	let idp_id =
		IdpId::new("mock-idp").expect("IdP identifier should be valid for exchange tests.");

	IdpDescriptor::builder(idp_id)
		.authorization_endpoint(
			Url::parse(&server.url("/oauth2/authorize"))
				.expect("Mock authorization endpoint should parse successfully."),
		)
		.authentication_endpoint(
			Url::parse(&server.url("/oauth2/authn"))
				.expect("Mock authentication endpoint should parse successfully."),
		)
		.token_endpoint(
			Url::parse(&server.url("/oauth2/token"))
				.expect("Mock token endpoint should parse successfully."),
		)
		.jwks_endpoint(
			Url::parse(&server.url("/oauth2/jwks"))
				.expect("Mock JWKS endpoint should parse successfully."),
		)
		.build()
		.expect("IdP descriptor should build successfully.")
}

fn hr_key() -> AgentKey {
	AgentKey::new("hr").expect("Agent key should be valid.")
}

fn build_config() -> BrokerConfig {
	BrokerConfig::new(
		AppCredentials::new("orch-app", "orch-secret"),
		AppCredentials::new("exch-app", "exch-secret"),
		AgentIdentity::new(
			AgentId::new("orch-agent").expect("Agent identifier should be valid."),
			"orch-agent-pass",
			ScopeSet::new(["openid"]).expect("Scope set should be valid."),
		),
		Url::parse("https://broker.example/callback")
			.expect("Redirect URI should parse successfully."),
	)
	.with_actor_strategy(ActorTokenStrategy::Password)
	.agent(
		hr_key(),
		AgentIdentity::new(
			AgentId::new("hr-agent").expect("Agent identifier should be valid."),
			"hr-agent-pass",
			ScopeSet::new(["hr:read", "hr:write"]).expect("Scope set should be valid."),
		),
	)
}

fn unsigned_jwt(payload: &serde_json::Value) -> String {
	let header = URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\",\"typ\":\"JWT\"}");
	let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());

	format!("{header}.{body}.sig")
}

fn exchanged_token_body(actor_subject: &str, scope: &str) -> String {
	let token = unsigned_jwt(&serde_json::json!({
		"sub": "user-1",
		"scope": scope,
		"exp": (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp(),
		"act": { "sub": actor_subject },
	}));

	format!(
		"{{\"access_token\":\"{token}\",\"token_type\":\"Bearer\",\"expires_in\":900,\"scope\":\"{scope}\"}}"
	)
}

/// Mounts the mock serving the exchanger application's actor token.
async fn mock_hr_actor_token(server: &MockServer) {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/token")
				.header("authorization", EXCH_BASIC)
				.body_includes("grant_type=password")
				.body_includes("username=hr-agent");
			then.status(200).header("content-type", "application/json").body(HR_ACTOR_TOKEN_BODY);
		})
		.await;
}

#[tokio::test]
async fn exchange_downscopes_and_binds_the_agent() {
	let server = MockServer::start_async().await;
	let descriptor = build_descriptor(&server);
	let (broker, _store, _sessions) = build_reqwest_test_broker(descriptor, build_config());

	mock_hr_actor_token(&server).await;

	let exchange = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/token")
				.header("authorization", EXCH_BASIC)
				.body_includes("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Atoken-exchange")
				.body_includes("subject_token=delegated-token")
				.body_includes("subject_token_type=urn%3Aietf%3Aparams%3Aoauth%3Atoken-type%3Aaccess_token")
				.body_includes("actor_token=hr-actor-token")
				.body_includes("scope=hr%3Aread+hr%3Awrite");
			then.status(200)
				.header("content-type", "application/json")
				.body(exchanged_token_body("hr-agent", "hr:read"));
		})
		.await;
	let record = broker
		.exchange_token_for_agent("delegated-token", &hr_key())
		.await
		.expect("Exchange should succeed.");

	assert_eq!(record.scope.normalized(), "hr:read");
	assert_eq!(record.actor_subject(), Some("hr-agent"));
	assert_eq!(record.actor.as_deref(), Some("hr-agent"));

	exchange.assert_async().await;
}

#[tokio::test]
async fn scope_escalation_is_fatal() {
	let server = MockServer::start_async().await;
	let descriptor = build_descriptor(&server);
	let (broker, _store, _sessions) = build_reqwest_test_broker(descriptor, build_config());

	mock_hr_actor_token(&server).await;

	let _exchange = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token").body_includes("subject_token=delegated-token");
			then.status(200)
				.header("content-type", "application/json")
				.body(exchanged_token_body("hr-agent", "hr:read admin:all"));
		})
		.await;
	let err = broker
		.exchange_token_for_agent("delegated-token", &hr_key())
		.await
		.expect_err("A token escaping the agent's ceiling must be rejected.");

	assert!(matches!(
		err,
		Error::ScopeNotPermitted { agent, granted, permitted }
			if agent == "hr"
				&& granted == "admin:all hr:read"
				&& permitted == "hr:read hr:write",
	));
}

#[tokio::test]
async fn foreign_actor_bindings_are_fatal() {
	let server = MockServer::start_async().await;
	let descriptor = build_descriptor(&server);
	let (broker, _store, _sessions) = build_reqwest_test_broker(descriptor, build_config());

	mock_hr_actor_token(&server).await;

	let _exchange = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token").body_includes("subject_token=delegated-token");
			then.status(200)
				.header("content-type", "application/json")
				.body(exchanged_token_body("rogue-agent", "hr:read"));
		})
		.await;
	let err = broker
		.exchange_token_for_agent("delegated-token", &hr_key())
		.await
		.expect_err("A token bound to another actor must be rejected.");

	assert!(matches!(
		err,
		Error::ActorMismatch { expected, found }
			if expected == "hr-agent" && found.as_deref() == Some("rogue-agent"),
	));
}

#[tokio::test]
async fn unknown_agent_keys_fail_before_any_call() {
	let server = MockServer::start_async().await;
	let descriptor = build_descriptor(&server);
	let (broker, _store, _sessions) = build_reqwest_test_broker(descriptor, build_config());
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200).body("{}");
		})
		.await;
	let key = AgentKey::new("finance").expect("Agent key should be valid.");
	let err = broker
		.exchange_token_for_agent("delegated-token", &key)
		.await
		.expect_err("An unregistered agent key must be rejected.");

	assert!(matches!(
		err,
		Error::Config(ConfigError::UnknownAgent { key }) if key == "finance",
	));

	token.assert_calls_async(0).await;
}

#[tokio::test]
async fn provider_rejections_name_the_target_agent() {
	let server = MockServer::start_async().await;
	let descriptor = build_descriptor(&server);
	let (broker, _store, _sessions) = build_reqwest_test_broker(descriptor, build_config());

	mock_hr_actor_token(&server).await;

	let _exchange = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token").body_includes("subject_token=delegated-token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"Subject token revoked\"}");
		})
		.await;
	let err = broker
		.exchange_token_for_agent("delegated-token", &hr_key())
		.await
		.expect_err("A provider rejection must surface as an error.");

	assert!(matches!(
		err,
		Error::TokenExchangeFailed { agent: Some(agent), reason, status: Some(400) }
			if agent == "hr" && reason == "Subject token revoked",
	));
}
