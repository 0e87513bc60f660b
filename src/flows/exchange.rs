//! RFC 8693 exchange of delegated tokens toward downstream agents.

// self
use crate::{
	_prelude::*,
	auth::{AgentKey, TokenRecord},
	flows::{AppRole, Broker, common},
	http::{IdpHttpClient, TransportErrorMapper},
	obs::{self, BrokerEvent, FlowKind, FlowOutcome, FlowSpan},
};

impl<C, M> Broker<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Exchanges a delegated user token for one downscoped to a registered agent.
	///
	/// The exchanger application performs the RFC 8693 exchange with its own
	/// actor token attached, requesting at most the agent's permitted scopes.
	/// The issued token must stay inside that ceiling and must be bound to the
	/// agent through its `act` claim; either violation is fatal, with no
	/// fallback to the broader subject token. Exchanged tokens are never
	/// cached, so revocations and policy changes at the provider take effect on
	/// the next call.
	pub async fn exchange_token_for_agent(
		&self,
		subject_token: &str,
		agent_key: &AgentKey,
	) -> Result<TokenRecord> {
		let span = FlowSpan::new(FlowKind::TokenExchange, "exchange_token_for_agent");

		obs::record_flow_outcome(FlowKind::TokenExchange, FlowOutcome::Attempt);

		let result = span.instrument(self.exchange_inner(subject_token, agent_key)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(FlowKind::TokenExchange, FlowOutcome::Success),
			Err(err) => {
				obs::record_flow_outcome(FlowKind::TokenExchange, FlowOutcome::Failure);
				self.events.on_event(&BrokerEvent::FlowFailed {
					flow: FlowKind::TokenExchange,
					reason: err.to_string(),
				});
			},
		}

		result
	}

	async fn exchange_inner(
		&self,
		subject_token: &str,
		agent_key: &AgentKey,
	) -> Result<TokenRecord> {
		let identity = self.config.agent_identity(agent_key)?.clone();
		// Exchange failures surfaced below this point name the target agent.
		let tag = |err: Error| match err {
			Error::TokenExchangeFailed { agent: None, reason, status } =>
				Error::TokenExchangeFailed { agent: Some(agent_key.to_string()), reason, status },
			other => other,
		};
		let actor = self.actor_token(AppRole::Exchanger, &identity).await.map_err(tag)?;
		let payload = self
			.idp()
			.exchange_token(
				&self.config.exchanger_app,
				subject_token,
				Some(actor.access_token.expose()),
				&identity.required_scopes,
			)
			.await
			.map_err(tag)?;
		let record = common::record_from_payload(
			payload,
			&identity.required_scopes,
			Some(identity.agent_id.clone()),
		)?;

		if !record.scope.is_subset_of(&identity.required_scopes) {
			return Err(Error::ScopeNotPermitted {
				agent: agent_key.to_string(),
				granted: record.scope.normalized(),
				permitted: identity.required_scopes.normalized(),
			});
		}

		match record.actor_subject() {
			Some(subject) if subject == identity.agent_id.as_ref() => {},
			found => {
				return Err(Error::ActorMismatch {
					expected: identity.agent_id.to_string(),
					found: found.map(str::to_owned),
				});
			},
		}

		self.events.on_event(&BrokerEvent::TokenExchanged { agent: agent_key.to_string() });

		Ok(record)
	}
}
