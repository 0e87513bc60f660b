//! Identity-provider descriptor data structures and builder.

// self
use crate::{_prelude::*, auth::IdpId};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum IdpDescriptorError {
	/// Authorization endpoint is required for the direct-auth and login flows.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Authentication endpoint is required for the direct-auth flow.
	#[error("Missing authentication endpoint.")]
	MissingAuthenticationEndpoint,
	/// Token endpoint is mandatory for all flows.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// JWKS endpoint is required for signature-verifying validation.
	#[error("Missing JWKS endpoint.")]
	MissingJwksEndpoint,
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Base URL could not be joined into endpoint URLs.
	#[error("Base URL cannot be joined into endpoint URLs.")]
	InvalidBase {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}

/// Endpoint set declared by an identity-provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpEndpoints {
	/// Authorization endpoint handling both browser and direct-mode requests.
	pub authorization: Url,
	/// Authentication endpoint accepting direct-mode authenticator payloads.
	pub authentication: Url,
	/// Token endpoint used for code exchanges, grants, and RFC 8693 exchanges.
	pub token: Url,
	/// JWKS endpoint publishing the signing keys.
	pub jwks: Url,
}

/// Immutable identity-provider descriptor consumed by the flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdpDescriptor {
	/// Descriptor identifier.
	pub id: IdpId,
	/// Endpoint definitions exposed by the provider.
	pub endpoints: IdpEndpoints,
}
impl IdpDescriptor {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: IdpId) -> IdpDescriptorBuilder {
		IdpDescriptorBuilder::new(id)
	}

	/// Derives all endpoints from a tenant base URL using the provider's
	/// conventional `/oauth2/*` layout.
	pub fn from_base_url(id: IdpId, base: &Url) -> Result<Self, IdpDescriptorError> {
		let join = |segment: &str| {
			base.join(segment).map_err(|source| IdpDescriptorError::InvalidBase { source })
		};

		Self::builder(id)
			.authorization_endpoint(join("oauth2/authorize")?)
			.authentication_endpoint(join("oauth2/authn")?)
			.token_endpoint(join("oauth2/token")?)
			.jwks_endpoint(join("oauth2/jwks")?)
			.build()
	}

	fn validate(&self) -> Result<(), IdpDescriptorError> {
		validate_endpoint("authorization", &self.endpoints.authorization)?;
		validate_endpoint("authentication", &self.endpoints.authentication)?;
		validate_endpoint("token", &self.endpoints.token)?;
		validate_endpoint("jwks", &self.endpoints.jwks)?;

		Ok(())
	}
}

/// Builder for [`IdpDescriptor`] values.
#[derive(Debug)]
pub struct IdpDescriptorBuilder {
	/// Identifier for the descriptor being constructed.
	pub id: IdpId,
	/// Optional authorization endpoint.
	pub authorization_endpoint: Option<Url>,
	/// Optional direct-mode authentication endpoint.
	pub authentication_endpoint: Option<Url>,
	/// Token endpoint used for all grants.
	pub token_endpoint: Option<Url>,
	/// JWKS endpoint publishing the signing keys.
	pub jwks_endpoint: Option<Url>,
}
impl IdpDescriptorBuilder {
	/// Creates a new builder seeded with the provided identifier.
	pub fn new(id: IdpId) -> Self {
		Self {
			id,
			authorization_endpoint: None,
			authentication_endpoint: None,
			token_endpoint: None,
			jwks_endpoint: None,
		}
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the direct-mode authentication endpoint.
	pub fn authentication_endpoint(mut self, url: Url) -> Self {
		self.authentication_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the JWKS endpoint.
	pub fn jwks_endpoint(mut self, url: Url) -> Self {
		self.jwks_endpoint = Some(url);

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<IdpDescriptor, IdpDescriptorError> {
		let authorization = self
			.authorization_endpoint
			.ok_or(IdpDescriptorError::MissingAuthorizationEndpoint)?;
		let authentication = self
			.authentication_endpoint
			.ok_or(IdpDescriptorError::MissingAuthenticationEndpoint)?;
		let token = self.token_endpoint.ok_or(IdpDescriptorError::MissingTokenEndpoint)?;
		let jwks = self.jwks_endpoint.ok_or(IdpDescriptorError::MissingJwksEndpoint)?;
		let descriptor = IdpDescriptor {
			id: self.id,
			endpoints: IdpEndpoints { authorization, authentication, token, jwks },
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), IdpDescriptorError> {
	if url.scheme() != "https" {
		Err(IdpDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	} else {
		Ok(())
	}
}
