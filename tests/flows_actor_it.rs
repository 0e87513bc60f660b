// crates.io
use httpmock::prelude::*;
// self
use agent_token_broker::{
	_preludet::*,
	auth::{AgentId, IdpId, ScopeSet},
	config::{ActorTokenStrategy, AgentIdentity, AppCredentials, BrokerConfig},
	flows::AppRole,
	idp::IdpDescriptor,
	store::{BrokerStore, CacheKey},
};

const ORCH_BASIC: &str = "Basic b3JjaC1hcHA6b3JjaC1zZWNyZXQ=";
const ACTOR_TOKEN_BODY: &str =
	"{\"access_token\":\"actor-token\",\"token_type\":\"Bearer\",\"expires_in\":3600,\"scope\":\"openid\"}";

fn build_descriptor(server: &MockServer) -> IdpDescriptor {
	let idp_id =
		IdpId::new("mock-idp").expect("IdP identifier should be valid for actor flow tests.");

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

fn orchestrator_agent() -> AgentIdentity {
	AgentIdentity::new(
		AgentId::new("orch-agent").expect("Agent identifier should be valid."),
		"orch-agent-pass",
		ScopeSet::new(["openid"]).expect("Scope set should be valid."),
	)
}

fn build_config() -> BrokerConfig {
	BrokerConfig::new(
		AppCredentials::new("orch-app", "orch-secret"),
		AppCredentials::new("exch-app", "exch-secret"),
		orchestrator_agent(),
		Url::parse("https://broker.example/callback")
			.expect("Redirect URI should parse successfully."),
	)
}

#[tokio::test]
async fn actor_token_runs_the_three_step_handshake() {
	let server = MockServer::start_async().await;
	let descriptor = build_descriptor(&server);
	let (broker, store, _sessions) = build_reqwest_test_broker(descriptor, build_config());
	let agent = orchestrator_agent();
	let authorize = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/authorize")
				.header("authorization", ORCH_BASIC)
				.body_includes("response_mode=direct")
				.body_includes("code_challenge_method=S256");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"flowStatus\":\"INCOMPLETE\",\"flowId\":\"flow-1\"}");
		})
		.await;
	let authn = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/authn")
				.body_includes("\"flowId\":\"flow-1\"")
				.body_includes("\"username\":\"orch-agent\"");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"flowStatus\":\"SUCCESS_COMPLETED\",\"authData\":{\"code\":\"actor-code\"}}");
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/token")
				.body_includes("grant_type=authorization_code")
				.body_includes("code=actor-code")
				.body_includes("client_id=orch-app")
				.body_includes("client_secret=orch-secret");
			then.status(200).header("content-type", "application/json").body(ACTOR_TOKEN_BODY);
		})
		.await;
	let record =
		broker.actor_token(AppRole::Orchestrator, &agent).await.expect("Handshake should succeed.");

	assert_eq!(record.access_token.expose(), "actor-token");
	assert_eq!(record.scope.normalized(), "openid");
	assert_eq!(record.actor.as_deref(), Some("orch-agent"));

	authorize.assert_async().await;
	authn.assert_async().await;
	token.assert_async().await;

	let key = CacheKey::new("orch-app", &agent.agent_id, &ScopeSet::from_space_delimited("openid"));
	let cached = store
		.fetch(&key)
		.await
		.expect("Cache fetch should succeed.")
		.expect("Actor token should be cached after acquisition.");

	assert_eq!(cached.access_token.expose(), "actor-token");
}

#[tokio::test]
async fn actor_token_short_circuits_when_a_session_is_active() {
	let server = MockServer::start_async().await;
	let descriptor = build_descriptor(&server);
	let (broker, _store, _sessions) = build_reqwest_test_broker(descriptor, build_config());
	let _authorize = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/authorize");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"flowStatus\":\"SUCCESS_COMPLETED\",\"authData\":{\"code\":\"sso-code\"}}");
		})
		.await;
	let authn = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/authn");
			then.status(200).body("{}");
		})
		.await;
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token").body_includes("code=sso-code");
			then.status(200).header("content-type", "application/json").body(ACTOR_TOKEN_BODY);
		})
		.await;
	let record = broker
		.actor_token(AppRole::Orchestrator, &orchestrator_agent())
		.await
		.expect("Short-circuited handshake should succeed.");

	assert_eq!(record.access_token.expose(), "actor-token");

	authn.assert_calls_async(0).await;
}

#[tokio::test]
async fn actor_token_is_cached_and_singleflighted() {
	let server = MockServer::start_async().await;
	let descriptor = build_descriptor(&server);
	let (broker, _store, _sessions) = build_reqwest_test_broker(descriptor, build_config());
	let agent = orchestrator_agent();
	let authorize = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/authorize");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"flowStatus\":\"SUCCESS_COMPLETED\",\"authData\":{\"code\":\"sso-code\"}}");
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200).header("content-type", "application/json").body(ACTOR_TOKEN_BODY);
		})
		.await;
	let (first, second) = tokio::join!(
		broker.actor_token(AppRole::Orchestrator, &agent),
		broker.actor_token(AppRole::Orchestrator, &agent),
	);

	assert_eq!(
		first.expect("First concurrent call should succeed.").access_token.expose(),
		"actor-token",
	);
	assert_eq!(
		second.expect("Second concurrent call should succeed.").access_token.expose(),
		"actor-token",
	);

	let third = broker
		.actor_token(AppRole::Orchestrator, &agent)
		.await
		.expect("Cached call should succeed.");

	assert_eq!(third.access_token.expose(), "actor-token");

	authorize.assert_calls_async(1).await;
	token.assert_calls_async(1).await;
}

#[tokio::test]
async fn password_strategy_skips_the_handshake() {
	let server = MockServer::start_async().await;
	let descriptor = build_descriptor(&server);
	let config = build_config().with_actor_strategy(ActorTokenStrategy::Password);
	let (broker, _store, _sessions) = build_reqwest_test_broker(descriptor, config);
	let authorize = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/authorize");
			then.status(200).body("{}");
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/token")
				.header("authorization", ORCH_BASIC)
				.body_includes("grant_type=password")
				.body_includes("username=orch-agent")
				.body_includes("password=orch-agent-pass");
			then.status(200).header("content-type", "application/json").body(ACTOR_TOKEN_BODY);
		})
		.await;
	let record = broker
		.actor_token(AppRole::Orchestrator, &orchestrator_agent())
		.await
		.expect("Password grant should succeed.");

	assert_eq!(record.access_token.expose(), "actor-token");

	authorize.assert_calls_async(0).await;
	token.assert_async().await;
}

#[tokio::test]
async fn rejected_credentials_name_the_agent() {
	let server = MockServer::start_async().await;
	let descriptor = build_descriptor(&server);
	let (broker, _store, _sessions) = build_reqwest_test_broker(descriptor, build_config());
	let _authorize = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/authorize");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"flowStatus\":\"INCOMPLETE\",\"flowId\":\"flow-2\"}");
		})
		.await;
	let _authn = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/authn");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_credentials\",\"error_description\":\"Password mismatch\"}");
		})
		.await;
	let err = broker
		.actor_token(AppRole::Orchestrator, &orchestrator_agent())
		.await
		.expect_err("Rejected credentials must surface as an error.");

	assert!(matches!(
		err,
		Error::InvalidAgentCredentials { agent, reason }
			if agent == "orch-agent" && reason == "Password mismatch",
	));
}
