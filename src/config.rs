//! Broker configuration: application credentials, agent identities, and policy.

// self
use crate::{
	_prelude::*,
	auth::{AgentId, AgentKey, ScopeSet, TokenSecret},
	error::ConfigError,
};

/// Default lifetime for pending user login sessions.
pub const DEFAULT_SESSION_TTL: Duration = Duration::minutes(10);

/// OAuth application credentials registered at the identity provider.
#[derive(Clone, Debug)]
pub struct AppCredentials {
	/// Registered client identifier.
	pub client_id: String,
	/// Client secret; redacted from debug output.
	pub client_secret: TokenSecret,
}
impl AppCredentials {
	/// Creates a credential pair.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
		Self { client_id: client_id.into(), client_secret: TokenSecret::new(client_secret) }
	}
}

/// A machine agent account with its own credentials and scope ceiling.
#[derive(Clone, Debug)]
pub struct AgentIdentity {
	/// Subject identifier of the agent account at the provider.
	pub agent_id: AgentId,
	/// Agent account password; redacted from debug output.
	pub agent_secret: TokenSecret,
	/// Maximum scopes tokens issued for this agent may carry.
	pub required_scopes: ScopeSet,
	/// Optional audience restriction for exchanged tokens.
	pub audience: Option<Url>,
}
impl AgentIdentity {
	/// Creates an agent identity with a scope ceiling and no audience.
	pub fn new(
		agent_id: AgentId,
		agent_secret: impl Into<String>,
		required_scopes: ScopeSet,
	) -> Self {
		Self {
			agent_id,
			agent_secret: TokenSecret::new(agent_secret),
			required_scopes,
			audience: None,
		}
	}

	/// Sets an audience restriction.
	pub fn with_audience(mut self, audience: Url) -> Self {
		self.audience = Some(audience);

		self
	}
}

/// How actor tokens are acquired for an application's agent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActorTokenStrategy {
	/// Direct-auth handshake: initiate, authenticate, exchange the code.
	#[default]
	AuthorizationCode,
	/// Resource-owner password grant; for providers without the direct flow.
	Password,
}

/// Static configuration consumed by the broker flows.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
	/// Application used for user logins and orchestrator actor tokens.
	pub orchestrator_app: AppCredentials,
	/// Application used for RFC 8693 exchanges and exchanger actor tokens.
	pub exchanger_app: AppCredentials,
	/// Agent the orchestrator acts as when binding delegated tokens.
	pub orchestrator_agent: AgentIdentity,
	/// Redirect URI registered for both applications.
	pub redirect_uri: Url,
	/// Scopes always requested on user logins, before agent ceilings are merged.
	pub base_scopes: ScopeSet,
	/// Lifetime of pending login sessions.
	pub session_ttl: Duration,
	/// Actor-token acquisition strategy.
	pub actor_strategy: ActorTokenStrategy,
	/// Downstream agents addressable by exchange, keyed by caller-facing name.
	pub agents: BTreeMap<AgentKey, AgentIdentity>,
}
impl BrokerConfig {
	/// Creates a configuration with default TTL, strategy, and no downstream agents.
	pub fn new(
		orchestrator_app: AppCredentials,
		exchanger_app: AppCredentials,
		orchestrator_agent: AgentIdentity,
		redirect_uri: Url,
	) -> Self {
		Self {
			orchestrator_app,
			exchanger_app,
			orchestrator_agent,
			redirect_uri,
			base_scopes: ScopeSet::default(),
			session_ttl: DEFAULT_SESSION_TTL,
			actor_strategy: ActorTokenStrategy::default(),
			agents: BTreeMap::new(),
		}
	}

	/// Overrides the pending-session lifetime.
	pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
		self.session_ttl = ttl;

		self
	}

	/// Overrides the actor-token acquisition strategy.
	pub fn with_actor_strategy(mut self, strategy: ActorTokenStrategy) -> Self {
		self.actor_strategy = strategy;

		self
	}

	/// Sets the scopes always requested on user logins.
	pub fn with_base_scopes(mut self, scopes: ScopeSet) -> Self {
		self.base_scopes = scopes;

		self
	}

	/// Registers a downstream agent under a caller-facing key.
	pub fn agent(mut self, key: AgentKey, identity: AgentIdentity) -> Self {
		self.agents.insert(key, identity);

		self
	}

	/// Looks up a registered downstream agent.
	pub fn agent_identity(&self, key: &AgentKey) -> Result<&AgentIdentity, ConfigError> {
		self.agents.get(key).ok_or_else(|| ConfigError::UnknownAgent { key: key.to_string() })
	}

	/// Scopes requested on user logins: the base set merged with every
	/// registered agent's ceiling, so delegated tokens can later be downscoped
	/// to any agent without re-prompting the user.
	pub fn login_scopes(&self) -> ScopeSet {
		self.agents
			.values()
			.fold(self.base_scopes.clone(), |acc, identity| acc.union(&identity.required_scopes))
	}
}
