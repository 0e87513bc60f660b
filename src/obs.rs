//! Optional observability helpers for broker flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `agent_token_broker.flow` with the `flow`
//!   and `stage` (call site) fields.
//! - Enable `metrics` to increment the `agent_token_broker_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.
//!
//! Independently of both features, flows report lifecycle events to an
//! [`EventSink`], which embedders can implement for audit logging. Events carry
//! identifiers only, never token material.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Broker flow kinds observed by the instrumentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Actor-token acquisition for an application.
	ActorToken,
	/// Delegated user login (start and completion).
	DelegatedLogin,
	/// RFC 8693 exchange toward a downstream agent.
	TokenExchange,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::ActorToken => "actor_token",
			FlowKind::DelegatedLogin => "delegated_login",
			FlowKind::TokenExchange => "token_exchange",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a broker flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Stages of the three-step actor-token handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActorFlowStage {
	/// Direct authorization accepted; a flow identifier was issued.
	FlowInitiated,
	/// Agent credentials accepted; an authorization code was issued.
	Authenticated,
}
impl ActorFlowStage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ActorFlowStage::FlowInitiated => "flow_initiated",
			ActorFlowStage::Authenticated => "authenticated",
		}
	}
}
impl Display for ActorFlowStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Lifecycle events emitted by the broker flows.
///
/// Payloads are limited to identifiers; token material never appears here.
#[derive(Clone, Debug)]
pub enum BrokerEvent {
	/// A login session was created and an authorization URL handed out.
	SessionCreated {
		/// Session identifier.
		session: String,
	},
	/// An actor-token handshake passed a stage.
	ActorStage {
		/// Agent the token will act as.
		agent: String,
		/// Stage that completed.
		stage: ActorFlowStage,
	},
	/// An actor token was issued or served from cache.
	ActorTokenIssued {
		/// Agent the token acts as.
		agent: String,
		/// Whether the token came from the cache.
		cached: bool,
	},
	/// A delegated token was bound to a completed login session.
	DelegatedTokenIssued {
		/// Session identifier.
		session: String,
	},
	/// A delegated token was downscoped and exchanged for an agent.
	TokenExchanged {
		/// Caller-facing agent key.
		agent: String,
	},
	/// A flow failed; the reason matches the returned error's display form.
	FlowFailed {
		/// Flow that failed.
		flow: FlowKind,
		/// Human-readable failure reason.
		reason: String,
	},
}

/// Receiver for [`BrokerEvent`] values.
pub trait EventSink
where
	Self: 'static + Send + Sync,
{
	/// Handles a single event; implementations must not block.
	fn on_event(&self, event: &BrokerEvent);
}

/// Sink that discards every event.
#[derive(Clone, Debug, Default)]
pub struct NoopEventSink;
impl EventSink for NoopEventSink {
	fn on_event(&self, _: &BrokerEvent) {}
}
