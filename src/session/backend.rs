//! Backend auth endpoints: session status, credential renewal, login exchange, and logout.

// self
use crate::{
	_prelude::*,
	auth::{AuthStrategy, Credential, TokenSecret},
	config::ClientConfig,
	error::ResponseError,
	http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, send_with_timeout},
};

/// Token payload returned by the refresh and login endpoints.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenGrant {
	/// New access token.
	#[serde(alias = "access_token")]
	pub session_token: TokenSecret,
	/// Rotated renewal token, when the backend rotates.
	#[serde(default)]
	pub refresh_token: Option<TokenSecret>,
	/// Token lifetime in seconds.
	#[serde(default)]
	pub expires_in: Option<i64>,
}
impl TokenGrant {
	/// Lifetime of the issued token, ignoring non-positive values.
	pub fn ttl(&self) -> Option<Duration> {
		self.expires_in.filter(|secs| *secs > 0).map(Duration::seconds)
	}

	/// Converts the grant into a credential, keeping `previous_renewal` when the backend did not
	/// rotate the renewal token.
	pub fn into_credential(self, previous_renewal: Option<TokenSecret>) -> Credential {
		Credential {
			access_token: self.session_token,
			renewal_token: self.refresh_token.filter(|token| !token.is_empty()).or(previous_renewal),
			expires_at: None,
		}
	}
}

#[derive(Deserialize)]
struct StatusBody {
	authenticated: bool,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
	refresh_token: &'a str,
}

/// Thin client for the backend's auth endpoints.
///
/// Every call is bounded by [`ClientConfig::request_timeout`]. None of these calls touch the
/// credential store; callers decide what to persist.
#[derive(Clone)]
pub struct AuthBackend {
	config: Arc<ClientConfig>,
	transport: Arc<dyn HttpTransport>,
}
impl AuthBackend {
	/// Creates a backend client sharing `config` and `transport`.
	pub fn new(config: Arc<ClientConfig>, transport: Arc<dyn HttpTransport>) -> Self {
		Self { config, transport }
	}

	/// Configuration in use.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Asks the backend whether `credential` is still authenticated.
	///
	/// A 401/403 answer counts as "not authenticated" rather than an error.
	pub async fn status(&self, credential: &Credential) -> Result<bool> {
		let url = self.config.endpoint_url(&self.config.endpoints.status);
		let request = HttpRequest::new(HttpMethod::Get, url).with_headers(self.auth_headers(credential));
		let response = self.send(request).await?;

		if response.is_auth_failure() {
			return Ok(false);
		}

		let body = response.error_for_status()?.json::<StatusBody>()?;

		Ok(body.authenticated)
	}

	/// Calls the refresh endpoint for `credential`.
	///
	/// The renewal token travels as a `refresh_token` query parameter for `GET` and as a JSON
	/// body otherwise.
	pub async fn refresh(&self, credential: &Credential) -> Result<TokenGrant> {
		let method = self.config.refresh_method;
		let mut url = self.config.endpoint_url(&self.config.endpoints.refresh);
		let mut body = None;

		if let Some(renewal) = &credential.renewal_token {
			if method == HttpMethod::Get {
				url.query_pairs_mut().append_pair("refresh_token", renewal.expose());
			} else {
				body = Some(Self::encode(&RefreshBody { refresh_token: renewal.expose() })?);
			}
		}

		let mut request = HttpRequest::new(method, url).with_headers(self.auth_headers(credential));

		if let Some(body) = body {
			request = request.with_json_body(body);
		}

		let response = self.send(request).await?.error_for_status()?;

		Self::grant(&response)
	}

	/// Exchanges login parameters for a token grant.
	pub async fn login<I, K, V>(&self, params: I) -> Result<TokenGrant>
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: AsRef<str>,
	{
		let mut url = self.config.endpoint_url(&self.config.endpoints.login);

		url.query_pairs_mut().extend_pairs(params);

		let response =
			self.send(HttpRequest::new(HttpMethod::Get, url)).await?.error_for_status()?;

		Self::grant(&response)
	}

	/// Notifies the backend that the session ended.
	pub async fn logout(&self, credential: Option<&Credential>) -> Result<()> {
		let url = self.config.endpoint_url(&self.config.endpoints.logout);
		let mut request = HttpRequest::new(HttpMethod::Get, url);

		if let Some(credential) = credential {
			request = request.with_headers(self.auth_headers(credential));
		}

		self.send(request).await?.error_for_status()?;

		Ok(())
	}

	pub(crate) async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
		Ok(send_with_timeout(self.transport.as_ref(), request, self.config.request_timeout).await?)
	}

	pub(crate) fn encode<T>(body: &T) -> Result<Vec<u8>>
	where
		T: ?Sized + Serialize,
	{
		serde_json::to_vec(body).map_err(|e| {
			crate::error::ConfigError::RequestBody { message: e.to_string() }.into()
		})
	}

	fn auth_headers(&self, credential: &Credential) -> Vec<(String, String)> {
		AuthStrategy::select(Some(credential), self.config.signing.as_ref()).headers()
	}

	fn grant(response: &HttpResponse) -> Result<TokenGrant> {
		let grant = response.json::<TokenGrant>()?;

		if grant.session_token.is_empty() {
			return Err(ResponseError::MissingToken { status: response.status }.into());
		}

		Ok(grant)
	}
}
impl Debug for AuthBackend {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthBackend").field("base_url", &self.config.base_url.as_str()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{ScriptedTransport, test_config};

	fn backend(transport: Arc<ScriptedTransport>) -> AuthBackend {
		AuthBackend::new(Arc::new(test_config("https://api.example.com/v1")), transport)
	}

	#[tokio::test]
	async fn status_treats_auth_failures_as_unauthenticated() {
		let transport = Arc::new(ScriptedTransport::default());
		let backend = backend(transport.clone());
		let credential = Credential::new("access-1");

		transport.push("/v1/auth/status", 200, r#"{"authenticated":true}"#);
		transport.push("/v1/auth/status", 401, "");
		transport.push("/v1/auth/status", 200, "not json");

		assert!(backend.status(&credential).await.expect("Status check should succeed."));
		assert!(!backend.status(&credential).await.expect("401 should read as unauthenticated."));
		assert!(matches!(
			backend.status(&credential).await,
			Err(Error::Response(ResponseError::Malformed { status: 200, .. }))
		));

		let request = &transport.requests()[0];

		assert_eq!(request.header("Authorization"), Some("Bearer access-1"));
	}

	#[tokio::test]
	async fn refresh_sends_renewal_token_and_parses_grant() {
		let transport = Arc::new(ScriptedTransport::default());
		let backend = backend(transport.clone());
		let credential = Credential::new("access-1").with_renewal_token("renew-1");

		transport.push(
			"/v1/auth/refresh",
			200,
			r#"{"access_token":"access-2","expires_in":900}"#,
		);

		let grant = backend.refresh(&credential).await.expect("Refresh should succeed.");

		assert_eq!(grant.session_token.expose(), "access-2");
		assert_eq!(grant.ttl(), Some(Duration::seconds(900)));

		let rotated = grant.into_credential(credential.renewal_token.clone());

		assert_eq!(rotated.renewal_token.as_ref().map(TokenSecret::expose), Some("renew-1"));

		let request = &transport.requests()[0];

		assert_eq!(request.method, HttpMethod::Post);
		assert_eq!(request.body.as_deref(), Some(br#"{"refresh_token":"renew-1"}"#.as_slice()));
	}

	#[tokio::test]
	async fn empty_session_token_is_rejected() {
		let transport = Arc::new(ScriptedTransport::default());
		let backend = backend(transport.clone());

		transport.push("/v1/auth/login", 200, r#"{"session_token":""}"#);

		let err = backend
			.login([("code", "abc")])
			.await
			.expect_err("Empty tokens should be rejected.");

		assert!(matches!(err, Error::Response(ResponseError::MissingToken { status: 200 })));
		assert_eq!(transport.requests()[0].url.query(), Some("code=abc"));
	}
}
