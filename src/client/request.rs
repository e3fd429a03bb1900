//! Request and response values exchanged with [`ApiClient`](crate::client::ApiClient).

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, ResponseError},
	http::{HttpMethod, HttpResponse},
};

/// Per-request overrides.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestOptions {
	/// Overrides [`ClientConfig::request_timeout`](crate::config::ClientConfig::request_timeout).
	pub timeout: Option<StdDuration>,
	/// Extra headers appended after the auth headers.
	pub headers: Vec<(String, String)>,
}

/// Logical API call, resolved against the configured base URL on every attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: HttpMethod,
	/// Endpoint path relative to the base URL.
	pub path: String,
	/// Query pairs.
	pub query: Vec<(String, String)>,
	/// Serialized JSON body.
	pub body: Option<Vec<u8>>,
	/// Overrides.
	pub options: RequestOptions,
}
impl ApiRequest {
	/// Creates a request without body or query.
	pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			body: None,
			options: RequestOptions::default(),
		}
	}

	/// `GET path`.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(HttpMethod::Get, path)
	}

	/// `POST path`.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(HttpMethod::Post, path)
	}

	/// Appends a query pair.
	pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((name.into(), value.into()));

		self
	}

	/// Serializes `body` as the JSON payload.
	pub fn json<T>(mut self, body: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		let bytes = serde_json::to_vec(body)
			.map_err(|e| ConfigError::RequestBody { message: e.to_string() })?;

		self.body = Some(bytes);

		Ok(self)
	}

	/// Appends a header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.options.headers.push((name.into(), value.into()));

		self
	}

	/// Overrides the request timeout.
	pub fn timeout(mut self, timeout: StdDuration) -> Self {
		self.options.timeout = Some(timeout);

		self
	}
}

/// Successful (2xx) backend response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse(HttpResponse);
impl ApiResponse {
	pub(crate) fn new(response: HttpResponse) -> Self {
		Self(response)
	}

	/// HTTP status code.
	pub fn status(&self) -> u16 {
		self.0.status
	}

	/// Raw body.
	pub fn bytes(&self) -> &[u8] {
		&self.0.body
	}

	/// Body decoded as UTF-8, lossily.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.0.body).into_owned()
	}

	/// Decodes the body as JSON; failures surface as [`ResponseError::Malformed`].
	pub fn json<T>(&self) -> Result<T, ResponseError>
	where
		T: DeserializeOwned,
	{
		self.0.json()
	}
}
