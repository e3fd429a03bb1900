//! Access credentials and the durable store that owns them.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::StorageKeys,
	store::{KeyValueStore, StoreError, WriteBatch},
};

/// Access credential plus optional renewal material.
///
/// `expires_at` only carries meaning while an access token is present; the store never returns
/// an expiry without a token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Bearer token attached to outbound calls.
	pub access_token: TokenSecret,
	/// Renewal token used by the refresh endpoint, if the backend issued one.
	pub renewal_token: Option<TokenSecret>,
	/// Instant after which the access token should be treated as expired.
	pub expires_at: Option<OffsetDateTime>,
}
impl Credential {
	/// Creates a credential holding only an access token.
	pub fn new(access_token: impl Into<String>) -> Self {
		Self { access_token: TokenSecret::new(access_token), renewal_token: None, expires_at: None }
	}

	/// Attaches a renewal token.
	pub fn with_renewal_token(mut self, token: impl Into<String>) -> Self {
		self.renewal_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets an absolute expiry instant.
	pub fn with_expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Returns `true` if the credential has a known expiry at or before `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| instant >= expires_at)
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &"<redacted>")
			.field("renewal_token", &self.renewal_token.as_ref().map(|_| "<redacted>"))
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Durable holder of the current [`Credential`].
///
/// The three fields live under separate storage keys. They are written through one
/// [`WriteBatch`] and read through one [`KeyValueStore::get_many`] snapshot, so readers never
/// observe a half-written credential.
#[derive(Clone)]
pub struct CredentialStore {
	kv: Arc<dyn KeyValueStore>,
	keys: StorageKeys,
}
impl CredentialStore {
	/// Creates a store over the provided backend and key names.
	pub fn new(kv: Arc<dyn KeyValueStore>, keys: StorageKeys) -> Self {
		Self { kv, keys }
	}

	/// Returns the stored credential, if an access token is present.
	pub fn get(&self) -> Result<Option<Credential>, StoreError> {
		let mut values = self
			.kv
			.get_many(&[
				self.keys.access_token.as_str(),
				self.keys.renewal_token.as_str(),
				self.keys.expires_at.as_str(),
			])?
			.into_iter();
		let Some(access) = values.next().flatten().filter(|v| !v.is_empty()) else {
			return Ok(None);
		};
		let renewal = values.next().flatten().filter(|v| !v.is_empty());
		let expires_at = values
			.next()
			.flatten()
			.and_then(|raw| raw.trim().parse::<i64>().ok())
			.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok());

		Ok(Some(Credential {
			access_token: TokenSecret::new(access),
			renewal_token: renewal.map(TokenSecret::new),
			expires_at,
		}))
	}

	/// Replaces the stored credential.
	///
	/// When `ttl` is given the expiry becomes `now + ttl`, overriding `credential.expires_at`.
	/// Returns the credential exactly as persisted.
	pub fn set(&self, credential: Credential, ttl: Option<Duration>) -> Result<Credential, StoreError> {
		let mut credential = credential;

		if let Some(ttl) = ttl {
			credential.expires_at = Some(OffsetDateTime::now_utc() + ttl);
		}

		let mut batch =
			WriteBatch::new().set(&self.keys.access_token, credential.access_token.expose());

		batch = match &credential.renewal_token {
			Some(token) => batch.set(&self.keys.renewal_token, token.expose()),
			None => batch.remove(&self.keys.renewal_token),
		};
		batch = match credential.expires_at {
			Some(instant) => batch.set(&self.keys.expires_at, instant.unix_timestamp().to_string()),
			None => batch.remove(&self.keys.expires_at),
		};

		self.kv.apply(batch)?;

		Ok(credential)
	}

	/// Removes every credential field.
	pub fn clear(&self) -> Result<(), StoreError> {
		self.kv.apply(
			WriteBatch::new()
				.remove(&self.keys.access_token)
				.remove(&self.keys.renewal_token)
				.remove(&self.keys.expires_at),
		)
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialStore").field("keys", &self.keys).finish()
	}
}
