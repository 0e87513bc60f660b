//! Actor-token acquisition for the broker's registered applications.

// self
use crate::{
	_prelude::*,
	auth::{PkceChallenge, ScopeSet, TokenRecord},
	config::{ActorTokenStrategy, AgentIdentity, AppCredentials},
	flows::{Broker, common},
	http::{IdpHttpClient, TransportErrorMapper},
	idp::{DirectAuthOutcome, TokenPayload},
	obs::{self, ActorFlowStage, BrokerEvent, FlowKind, FlowOutcome, FlowSpan},
	store::CacheKey,
};

/// Which registered application an actor token is acquired for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppRole {
	/// Orchestrator application, used when binding delegated user tokens.
	Orchestrator,
	/// Exchanger application, used when downscoping toward downstream agents.
	Exchanger,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns a valid actor token for `agent`, acquired through `role`'s application.
	///
	/// Tokens are cached per application, agent, and scope; concurrent callers
	/// for the same slot are collapsed into a single provider handshake. Records
	/// within [`common::ACTOR_REFRESH_MARGIN`] of expiry are reacquired early.
	pub async fn actor_token(&self, role: AppRole, agent: &AgentIdentity) -> Result<TokenRecord> {
		let span = FlowSpan::new(FlowKind::ActorToken, "actor_token");

		obs::record_flow_outcome(FlowKind::ActorToken, FlowOutcome::Attempt);

		let result = span.instrument(self.actor_token_inner(role, agent)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(FlowKind::ActorToken, FlowOutcome::Success),
			Err(err) => {
				obs::record_flow_outcome(FlowKind::ActorToken, FlowOutcome::Failure);
				self.events.on_event(&BrokerEvent::FlowFailed {
					flow: FlowKind::ActorToken,
					reason: err.to_string(),
				});
			},
		}

		result
	}

	/// Resolves the credentials registered for an application role.
	pub fn app_credentials(&self, role: AppRole) -> &AppCredentials {
		match role {
			AppRole::Orchestrator => &self.config.orchestrator_app,
			AppRole::Exchanger => &self.config.exchanger_app,
		}
	}

	async fn actor_token_inner(
		&self,
		role: AppRole,
		agent: &AgentIdentity,
	) -> Result<TokenRecord> {
		let app = self.app_credentials(role);
		let scope = ScopeSet::from_space_delimited("openid");
		let key = CacheKey::new(&app.client_id, &agent.agent_id, &scope);
		let guard = common::flow_guard(self, &key);
		let _permit = guard.lock().await;

		if let Some(record) = self.store.fetch(&key).await?
			&& common::is_fresh(&record, OffsetDateTime::now_utc())
		{
			self.events.on_event(&BrokerEvent::ActorTokenIssued {
				agent: agent.agent_id.to_string(),
				cached: true,
			});

			return Ok(record);
		}

		let payload = match self.config.actor_strategy {
			ActorTokenStrategy::AuthorizationCode =>
				self.acquire_via_direct_flow(app, agent, &scope).await?,
			ActorTokenStrategy::Password =>
				self.idp()
					.password_grant(app, &agent.agent_id, &agent.agent_secret, &scope)
					.await?,
		};
		let record = common::record_from_payload(payload, &scope, Some(agent.agent_id.clone()))?;

		self.store.save(key, record.clone()).await?;
		self.events.on_event(&BrokerEvent::ActorTokenIssued {
			agent: agent.agent_id.to_string(),
			cached: false,
		});

		Ok(record)
	}

	/// Runs the three-step handshake: initiate, authenticate, exchange the code.
	///
	/// Providers with an active session for the application may short-circuit
	/// the initiation with a ready authorization code, skipping the credential
	/// submission entirely.
	async fn acquire_via_direct_flow(
		&self,
		app: &AppCredentials,
		agent: &AgentIdentity,
		scope: &ScopeSet,
	) -> Result<TokenPayload> {
		let idp = self.idp();
		let pkce = PkceChallenge::generate();
		let code = match idp
			.initiate_direct_auth_flow(app, &pkce, scope, &self.config.redirect_uri)
			.await?
		{
			DirectAuthOutcome::Completed { code } => code,
			DirectAuthOutcome::FlowInitiated { flow_id } => {
				self.events.on_event(&BrokerEvent::ActorStage {
					agent: agent.agent_id.to_string(),
					stage: ActorFlowStage::FlowInitiated,
				});

				let code = idp
					.authenticate_with_credentials(&flow_id, &agent.agent_id, &agent.agent_secret)
					.await?;

				self.events.on_event(&BrokerEvent::ActorStage {
					agent: agent.agent_id.to_string(),
					stage: ActorFlowStage::Authenticated,
				});

				code
			},
		};

		idp.exchange_authorization_code(
			app,
			&code,
			pkce.verifier(),
			&self.config.redirect_uri,
			None,
		)
		.await
	}
}
