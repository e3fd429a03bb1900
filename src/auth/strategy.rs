//! Per-request selection between bearer and signed-header authentication.

// self
use crate::{
	_prelude::*,
	auth::{Credential, SignatureProvider, SignedHeaderSet, SigningKeys, TokenSecret},
};

/// Authentication attached to a single outbound request.
///
/// Strategies are mutually exclusive: a bearer token always wins over capability signing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthStrategy {
	/// `Authorization: Bearer <token>`.
	Bearer(TokenSecret),
	/// Freshly signed capability headers.
	Signed(SignedHeaderSet),
	/// Neither a token nor signing keys are available.
	Anonymous,
}
impl AuthStrategy {
	/// Picks the strategy for the current credential and key material.
	pub fn select(credential: Option<&Credential>, keys: Option<&SigningKeys>) -> Self {
		match (credential, keys) {
			(Some(credential), _) => Self::Bearer(credential.access_token.clone()),
			(None, Some(keys)) => Self::Signed(SignatureProvider.sign(keys)),
			(None, None) => Self::Anonymous,
		}
	}

	/// Returns the header pairs to attach.
	pub fn headers(&self) -> Vec<(String, String)> {
		match self {
			Self::Bearer(token) =>
				vec![("Authorization".into(), format!("Bearer {}", token.expose()))],
			Self::Signed(set) =>
				set.headers().into_iter().map(|(name, value)| (name.to_owned(), value)).collect(),
			Self::Anonymous => Vec::new(),
		}
	}

	/// Returns the bearer token when that strategy was selected.
	pub fn bearer(&self) -> Option<&TokenSecret> {
		match self {
			Self::Bearer(token) => Some(token),
			_ => None,
		}
	}

	/// Stable label for logs.
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Bearer(_) => "bearer",
			Self::Signed(_) => "signed",
			Self::Anonymous => "anonymous",
		}
	}
}
