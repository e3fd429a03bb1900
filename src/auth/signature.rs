//! Capability-key request signing used when no bearer token is available.
//!
//! The canonical string is built from the auth headers sorted by name, each value
//! percent-encoded, joined as `name=value&...`. The secret key is appended, the result is
//! base64-encoded, and the SHA-256 digest of that base64 text (hex) becomes the signature.
//! A fresh header set must be computed for every request; nothing here is cached.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Header carrying the public access key.
pub const ACCESS_KEY_HEADER: &str = "Access-Key";
/// Header carrying the unix-seconds timestamp.
pub const TIMESTAMP_HEADER: &str = "Timestamp";
/// Header carrying the optional session identifier.
pub const SESSION_ID_HEADER: &str = "Session-Id";
/// Header carrying the computed signature.
pub const SIGNATURE_HEADER: &str = "Signature";

/// Capability key pair plus an optional session identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningKeys {
	/// Public access key.
	pub access_key: String,
	/// Secret key; never transmitted.
	pub secret_key: TokenSecret,
	/// Optional session identifier included in the signed set.
	pub session_id: Option<String>,
}
impl SigningKeys {
	/// Creates a key pair without a session identifier.
	pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
		Self {
			access_key: access_key.into(),
			secret_key: TokenSecret::new(secret_key),
			session_id: None,
		}
	}

	/// Attaches a session identifier.
	pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
		self.session_id = Some(session_id.into());

		self
	}
}

/// Time-stamped, signed header set attached in place of a bearer token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedHeaderSet {
	/// Public access key.
	pub access_key: String,
	/// Unix seconds at signing time.
	pub timestamp: i64,
	/// Optional session identifier.
	pub session_id: Option<String>,
	/// Hex-encoded SHA-256 signature.
	pub signature: String,
}
impl SignedHeaderSet {
	/// Returns `(name, value)` pairs ready to be attached to a request.
	pub fn headers(&self) -> Vec<(&'static str, String)> {
		let mut headers = vec![
			(ACCESS_KEY_HEADER, self.access_key.clone()),
			(TIMESTAMP_HEADER, self.timestamp.to_string()),
		];

		if let Some(session_id) = &self.session_id {
			headers.push((SESSION_ID_HEADER, session_id.clone()));
		}

		headers.push((SIGNATURE_HEADER, self.signature.clone()));

		headers
	}
}

/// Stateless signer for [`SignedHeaderSet`] values.
#[derive(Clone, Copy, Debug, Default)]
pub struct SignatureProvider;
impl SignatureProvider {
	/// Signs with the current clock.
	pub fn sign(&self, keys: &SigningKeys) -> SignedHeaderSet {
		self.sign_at(keys, OffsetDateTime::now_utc().unix_timestamp())
	}

	/// Signs with an explicit timestamp; deterministic for a given input.
	pub fn sign_at(&self, keys: &SigningKeys, timestamp: i64) -> SignedHeaderSet {
		let timestamp_value = timestamp.to_string();
		let mut fields = BTreeMap::new();

		fields.insert(ACCESS_KEY_HEADER, keys.access_key.as_str());
		fields.insert(TIMESTAMP_HEADER, timestamp_value.as_str());

		if let Some(session_id) = &keys.session_id {
			fields.insert(SESSION_ID_HEADER, session_id.as_str());
		}

		let canonical = canonical_string(&fields);
		let signature = digest(&canonical, &keys.secret_key);

		SignedHeaderSet {
			access_key: keys.access_key.clone(),
			timestamp,
			session_id: keys.session_id.clone(),
			signature,
		}
	}
}

fn canonical_string(fields: &BTreeMap<&str, &str>) -> String {
	fields
		.iter()
		.map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
		.collect::<Vec<_>>()
		.join("&")
}

fn digest(canonical: &str, secret: &TokenSecret) -> String {
	let encoded = STANDARD.encode(format!("{canonical}{}", secret.expose()));

	hex::encode(Sha256::digest(encoded.as_bytes()))
}
