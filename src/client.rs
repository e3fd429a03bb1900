//! Authenticated request pipeline.
//!
//! Every call made through [`ApiClient::send`] follows the same policy:
//!
//! 1. pick the auth strategy for this attempt (bearer token when stored, otherwise freshly
//!    signed capability headers);
//! 2. issue the call bounded by the request timeout;
//! 3. on 401/403, obtain a usable credential (the one a concurrent refresh already stored, or a
//!    new one from the [`RefreshCoordinator`]) and retry exactly once;
//! 4. if no credential can be obtained, or the retry is rejected again, clear the credential
//!    store, emit the re-authentication signal, and fail with [`Error::SessionInvalid`].
//!
//! A logical request therefore never costs more than two backend calls.

mod request;

pub use request::*;

// crates.io
use serde::de::DeserializeOwned;
// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
use crate::{
	_prelude::*,
	auth::{AuthStrategy, Credential, CredentialStore},
	config::ClientConfig,
	error::ResponseError,
	http::{HttpRequest, HttpResponse, HttpTransport, send_with_timeout},
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
	session::{
		AuthBackend, Navigator, ReauthReason, ReauthRedirect, RefreshCoordinator, SessionGuard,
	},
	store::KeyValueStore,
};

/// Authenticated API client.
///
/// Clones share the transport, credential store, and refresh coordinator, so concurrent
/// requests from any clone collapse onto one refresh.
#[derive(Clone)]
pub struct ApiClient {
	config: Arc<ClientConfig>,
	transport: Arc<dyn HttpTransport>,
	backend: AuthBackend,
	credentials: CredentialStore,
	refresher: RefreshCoordinator,
	navigator: Arc<dyn Navigator>,
}
impl ApiClient {
	/// Creates a client backed by the crate's default reqwest transport.
	#[cfg(feature = "reqwest")]
	pub fn new(
		config: ClientConfig,
		kv: Arc<dyn KeyValueStore>,
		navigator: Arc<dyn Navigator>,
	) -> Self {
		Self::with_transport(config, kv, navigator, Arc::new(ReqwestHttpClient::default()))
	}

	/// Creates a client over a caller-provided transport.
	pub fn with_transport(
		config: ClientConfig,
		kv: Arc<dyn KeyValueStore>,
		navigator: Arc<dyn Navigator>,
		transport: Arc<dyn HttpTransport>,
	) -> Self {
		let config = Arc::new(config);
		let credentials = CredentialStore::new(kv, config.storage_keys.clone());
		let backend = AuthBackend::new(config.clone(), transport.clone());
		let refresher = RefreshCoordinator::new(backend.clone(), credentials.clone());

		Self { config, transport, backend, credentials, refresher, navigator }
	}

	/// Configuration in use.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Credential store shared with the refresh coordinator.
	pub fn credentials(&self) -> &CredentialStore {
		&self.credentials
	}

	/// Refresh coordinator shared by every clone of this client.
	pub fn refresher(&self) -> &RefreshCoordinator {
		&self.refresher
	}

	/// Builds a [`SessionGuard`] that shares this client's refresh coordinator.
	pub fn session_guard(&self) -> SessionGuard {
		SessionGuard::new(
			self.backend.clone(),
			self.credentials.clone(),
			self.refresher.clone(),
			self.navigator.clone(),
		)
	}

	/// Sends `request` through the auth pipeline and returns the 2xx response.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: OperationKind = OperationKind::Request;

		let span = OperationSpan::new(KIND, "send_request");

		obs::record_operation_outcome(KIND, OperationOutcome::Attempt);

		let result = span.instrument(self.send_inner(&request)).await;

		match &result {
			Ok(_) => obs::record_operation_outcome(KIND, OperationOutcome::Success),
			Err(_) => obs::record_operation_outcome(KIND, OperationOutcome::Failure),
		}

		result
	}

	/// `GET path`, decoding the JSON body.
	pub async fn get_json<T>(&self, path: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		Ok(self.send(ApiRequest::get(path)).await?.json()?)
	}

	/// `POST path` with a JSON body, decoding the JSON response.
	pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		Ok(self.send(ApiRequest::post(path).json(body)?).await?.json()?)
	}

	/// Exchanges login parameters for a credential and stores it.
	pub async fn login<I, K, V>(&self, params: I) -> Result<Credential>
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: AsRef<str>,
	{
		const KIND: OperationKind = OperationKind::Login;

		let span = OperationSpan::new(KIND, "login");

		obs::record_operation_outcome(KIND, OperationOutcome::Attempt);

		let result = span
			.instrument(async {
				let grant = self.backend.login(params).await?;
				let ttl = grant.ttl();

				Ok::<_, Error>(self.credentials.set(grant.into_credential(None), ttl)?)
			})
			.await;

		match &result {
			Ok(_) => obs::record_operation_outcome(KIND, OperationOutcome::Success),
			Err(_) => obs::record_operation_outcome(KIND, OperationOutcome::Failure),
		}

		result
	}

	/// Ends the session: best-effort backend logout, then an unconditional local clear followed
	/// by the re-authentication signal.
	pub async fn logout(&self) -> Result<()> {
		const KIND: OperationKind = OperationKind::Logout;

		let span = OperationSpan::new(KIND, "logout");

		obs::record_operation_outcome(KIND, OperationOutcome::Attempt);

		let credential = self.credentials.get().unwrap_or_else(|e| {
			obs::event!(warn, error = %e, "credential store unreadable during logout");

			None
		});

		if let Err(e) = span.instrument(self.backend.logout(credential.as_ref())).await {
			obs::event!(warn, error = %e, "backend logout failed; clearing locally");
		}

		let cleared = self.credentials.clear();
		let reason = ReauthReason::LoggedOut;

		self.navigator.reauthenticate(ReauthRedirect::new(&self.config.reauth_url, reason));

		match cleared {
			Ok(()) => {
				obs::record_operation_outcome(KIND, OperationOutcome::Success);

				Ok(())
			},
			Err(e) => {
				obs::record_operation_outcome(KIND, OperationOutcome::Failure);

				Err(e.into())
			},
		}
	}

	async fn send_inner(&self, request: &ApiRequest) -> Result<ApiResponse> {
		let credential = self.credentials.get()?;
		let strategy = AuthStrategy::select(credential.as_ref(), self.config.signing.as_ref());
		let response = self.dispatch(request, &strategy).await?;

		if !response.is_auth_failure() {
			return Self::finish(response);
		}

		obs::event!(
			debug,
			path = %request.path,
			status = response.status,
			strategy = strategy.as_str(),
			"request rejected; attempting credential recovery"
		);

		let Some(renewed) = self.recover(&strategy).await else {
			return Err(self.invalidate(ReauthReason::RefreshFailed));
		};
		let response = self.dispatch(request, &AuthStrategy::Bearer(renewed.access_token)).await?;

		if response.is_auth_failure() {
			return Err(self.invalidate(ReauthReason::Expired));
		}

		Self::finish(response)
	}

	async fn dispatch(&self, request: &ApiRequest, strategy: &AuthStrategy) -> Result<HttpResponse> {
		let mut url = self.config.endpoint_url(&request.path);

		if !request.query.is_empty() {
			url.query_pairs_mut().extend_pairs(&request.query);
		}

		let mut outbound = HttpRequest::new(request.method, url)
			.with_headers(strategy.headers())
			.with_headers(request.options.headers.iter().cloned());

		if let Some(body) = &request.body {
			outbound = outbound.with_json_body(body.clone());
		}

		let timeout = request.options.timeout.unwrap_or(self.config.request_timeout);

		Ok(send_with_timeout(self.transport.as_ref(), outbound, timeout).await?)
	}

	/// Returns a credential worth retrying with.
	///
	/// A stored token that differs from the one this attempt used was written by a refresh that
	/// finished meanwhile; it is reused without another refresh call.
	async fn recover(&self, used: &AuthStrategy) -> Option<Credential> {
		match self.credentials.get() {
			Ok(Some(stored)) if used.bearer() != Some(&stored.access_token) => {
				obs::event!(debug, "stored credential changed during the request; reusing it");

				return Some(stored);
			},
			Ok(_) => {},
			Err(e) => {
				obs::event!(warn, error = %e, "credential store unreadable during recovery");
			},
		}

		self.refresher.refresh().await
	}

	fn invalidate(&self, reason: ReauthReason) -> Error {
		obs::event!(warn, %reason, "session invalidated; requesting re-authentication");

		if let Err(e) = self.credentials.clear() {
			obs::event!(warn, error = %e, "failed to clear credential store");
		}

		self.navigator.reauthenticate(ReauthRedirect::new(&self.config.reauth_url, reason));

		Error::SessionInvalid { reason }
	}

	fn finish(response: HttpResponse) -> Result<ApiResponse> {
		if response.is_success() {
			Ok(ApiResponse::new(response))
		} else {
			Err(ResponseError::from_status(response.status, &response.body).into())
		}
	}
}
impl Debug for ApiClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("base_url", &self.config.base_url.as_str())
			.field("signing", &self.config.signing.is_some())
			.field("refresher", &self.refresher)
			.finish()
	}
}
