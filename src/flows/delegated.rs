//! Delegated user login: session issuance and completion.

// self
use crate::{
	_prelude::*,
	auth::{PkceChallenge, SessionId, TokenRecord},
	flows::{AppRole, Broker, common},
	http::{IdpHttpClient, TransportErrorMapper},
	obs::{self, BrokerEvent, FlowKind, FlowOutcome, FlowSpan},
	store::{CompleteOutcome, UserSession},
};

/// Handle returned by [`Broker::start_login`], to be forwarded to the user agent.
#[derive(Clone, Debug)]
pub struct LoginStart {
	/// Session identifier, doubling as the OAuth `state` parameter.
	pub session: SessionId,
	/// Authorization URL the user's browser must visit.
	pub authorize_url: Url,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Starts a delegated login: creates a pending session and builds the
	/// authorization URL the user must visit.
	///
	/// The URL requests the union of the base scopes and every registered
	/// agent's ceiling, and names the orchestrator agent as `requested_actor` so
	/// the eventual delegated token carries the `act` binding.
	pub async fn start_login(&self) -> Result<LoginStart> {
		let session = SessionId::generate();
		let pkce = PkceChallenge::generate();
		let record = UserSession::new(
			session.clone(),
			pkce.clone(),
			OffsetDateTime::now_utc(),
			self.config.session_ttl,
		);

		self.sessions.insert(record).await?;

		let authorize_url = self.idp().build_user_authorization_url(
			&self.config.orchestrator_app.client_id,
			&self.config.login_scopes(),
			session.as_ref(),
			&pkce,
			&self.config.orchestrator_agent.agent_id,
			&self.config.redirect_uri,
		);

		self.events.on_event(&BrokerEvent::SessionCreated { session: session.to_string() });

		Ok(LoginStart { session, authorize_url })
	}

	/// Completes a delegated login with the authorization code from the callback.
	///
	/// The code is exchanged with the session's PKCE verifier and the
	/// orchestrator's actor token attached, producing a delegated token whose
	/// `act` claim names the orchestrator agent. An issued token bound to any
	/// other actor is fatal. Sessions complete exactly once.
	pub async fn complete_login(&self, session: &SessionId, code: &str) -> Result<TokenRecord> {
		let span = FlowSpan::new(FlowKind::DelegatedLogin, "complete_login");

		obs::record_flow_outcome(FlowKind::DelegatedLogin, FlowOutcome::Attempt);

		let result = span.instrument(self.complete_login_inner(session, code)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(FlowKind::DelegatedLogin, FlowOutcome::Success),
			Err(err) => {
				obs::record_flow_outcome(FlowKind::DelegatedLogin, FlowOutcome::Failure);
				self.events.on_event(&BrokerEvent::FlowFailed {
					flow: FlowKind::DelegatedLogin,
					reason: err.to_string(),
				});
			},
		}

		result
	}

	/// Drops sessions whose completion window has closed; returns how many.
	pub async fn purge_expired_sessions(&self) -> Result<usize> {
		Ok(self.sessions.purge_expired(OffsetDateTime::now_utc()).await?)
	}

	async fn complete_login_inner(&self, session: &SessionId, code: &str) -> Result<TokenRecord> {
		let now = OffsetDateTime::now_utc();
		let stored = self
			.sessions
			.fetch(session)
			.await?
			.ok_or_else(|| Error::UnknownSession { session: session.to_string() })?;

		if stored.is_consumed() {
			return Err(Error::SessionConsumed { session: session.to_string() });
		}
		if stored.is_expired_at(now) {
			self.sessions.remove(session).await?;

			return Err(Error::SessionExpired { session: session.to_string() });
		}

		let orchestrator = self.config.orchestrator_agent.clone();
		let actor = self.actor_token(AppRole::Orchestrator, &orchestrator).await?;
		let payload = self
			.idp()
			.exchange_authorization_code(
				&self.config.orchestrator_app,
				code,
				stored.pkce.verifier(),
				&self.config.redirect_uri,
				Some(actor.access_token.expose()),
			)
			.await?;
		let record = common::record_from_payload(
			payload,
			&self.config.login_scopes(),
			Some(orchestrator.agent_id.clone()),
		)?;

		match record.actor_subject() {
			Some(subject) if subject == orchestrator.agent_id.as_ref() => {},
			found => {
				return Err(Error::ActorMismatch {
					expected: orchestrator.agent_id.to_string(),
					found: found.map(str::to_owned),
				});
			},
		}

		match self.sessions.complete(session, record.clone(), OffsetDateTime::now_utc()).await? {
			CompleteOutcome::Completed(_) => {
				self.events
					.on_event(&BrokerEvent::DelegatedTokenIssued { session: session.to_string() });

				Ok(record)
			},
			CompleteOutcome::AlreadyConsumed =>
				Err(Error::SessionConsumed { session: session.to_string() }),
			CompleteOutcome::Missing => Err(Error::UnknownSession { session: session.to_string() }),
		}
	}
}
