//! Auth-domain identifiers, scope sets, PKCE material, claims, and token models.

pub mod claims;
pub mod id;
pub mod pkce;
pub mod scope;
pub mod token;

pub use claims::*;
pub use id::*;
pub use pkce::*;
pub use scope::*;
pub use token::{record::*, secret::*};
