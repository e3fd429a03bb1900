//! Transport primitives shared by the request pipeline, refresh coordinator, and session guard.
//!
//! [`HttpTransport`] is the crate's only dependency on an HTTP stack. It deals in plain
//! [`HttpRequest`]/[`HttpResponse`] values so tests and alternative runtimes can provide their
//! own implementation. Timeouts are enforced above the transport by [`send_with_timeout`],
//! which drops (and therefore aborts) the in-flight call once the window elapses.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	error::{ResponseError, TransportError},
};

/// Boxed future returned by [`HttpTransport::execute`].
pub type HttpFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// HTTP methods used against the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HttpMethod {
	/// `GET`.
	#[default]
	Get,
	/// `POST`.
	Post,
	/// `PUT`.
	Put,
	/// `PATCH`.
	Patch,
	/// `DELETE`.
	Delete,
}
impl HttpMethod {
	/// Returns the canonical method name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Patch => "PATCH",
			Self::Delete => "DELETE",
		}
	}
}
impl Display for HttpMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Fully resolved outbound request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
	/// Method.
	pub method: HttpMethod,
	/// Absolute URL including query.
	pub url: Url,
	/// Header pairs, applied in order.
	pub headers: Vec<(String, String)>,
	/// JSON body bytes, if any.
	pub body: Option<Vec<u8>>,
}
impl HttpRequest {
	/// Creates a request without headers or body.
	pub fn new(method: HttpMethod, url: Url) -> Self {
		Self { method, url, headers: Vec::new(), body: None }
	}

	/// Appends a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Appends several headers.
	pub fn with_headers<I>(mut self, headers: I) -> Self
	where
		I: IntoIterator<Item = (String, String)>,
	{
		self.headers.extend(headers);

		self
	}

	/// Sets a JSON body.
	pub fn with_json_body(mut self, body: Vec<u8>) -> Self {
		self.body = Some(body);

		self
	}

	/// Returns the first header value matching `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}

/// Response status plus body bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
	/// HTTP status code.
	pub status: u16,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl HttpResponse {
	/// Creates a response.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, body: body.into() }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns `true` for 401 and 403.
	pub fn is_auth_failure(&self) -> bool {
		matches!(self.status, 401 | 403)
	}

	/// Decodes the body as JSON, reporting the failing path on mismatch.
	pub fn json<T>(&self) -> Result<T, ResponseError>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| ResponseError::Malformed { status: self.status, source })
	}

	/// Converts a non-2xx response into a [`ResponseError::Status`].
	pub fn error_for_status(self) -> Result<Self, ResponseError> {
		if self.is_success() {
			Ok(self)
		} else {
			Err(ResponseError::from_status(self.status, &self.body))
		}
	}
}

/// Abstraction over HTTP stacks capable of executing backend calls.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes a request. Non-2xx statuses are responses, not errors.
	fn execute(&self, request: HttpRequest) -> HttpFuture<'_>;
}

/// Executes `request` and aborts it once `timeout` elapses.
pub async fn send_with_timeout(
	transport: &dyn HttpTransport,
	request: HttpRequest,
	timeout: StdDuration,
) -> Result<HttpResponse, TransportError> {
	let endpoint = request.url.path().to_owned();

	match tokio::time::timeout(timeout, transport.execute(request)).await {
		Ok(result) => result,
		Err(_) => Err(TransportError::Timeout { endpoint, after: timeout }),
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	fn method(method: HttpMethod) -> reqwest::Method {
		match method {
			HttpMethod::Get => reqwest::Method::GET,
			HttpMethod::Post => reqwest::Method::POST,
			HttpMethod::Put => reqwest::Method::PUT,
			HttpMethod::Patch => reqwest::Method::PATCH,
			HttpMethod::Delete => reqwest::Method::DELETE,
		}
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestHttpClient {
	fn execute(&self, request: HttpRequest) -> HttpFuture<'_> {
		Box::pin(async move {
			let endpoint = request.url.path().to_owned();
			let mut builder = self.0.request(Self::method(request.method), request.url);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = request.body {
				builder = builder.header(reqwest::header::CONTENT_TYPE, "application/json").body(body);
			}

			let response = builder
				.send()
				.await
				.map_err(|e| TransportError::network(endpoint.clone(), e))?;
			let status = response.status().as_u16();
			let body =
				response.bytes().await.map_err(|e| TransportError::network(endpoint, e))?.to_vec();

			Ok(HttpResponse { status, body })
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	struct StalledTransport;
	impl HttpTransport for StalledTransport {
		fn execute(&self, _request: HttpRequest) -> HttpFuture<'_> {
			Box::pin(async {
				tokio::time::sleep(StdDuration::from_secs(3600)).await;

				Ok(HttpResponse::new(200, Vec::new()))
			})
		}
	}

	#[tokio::test(start_paused = true)]
	async fn timeout_aborts_stalled_call() {
		let url = Url::parse("https://api.example.com/auth/status").expect("URL should parse.");
		let err = send_with_timeout(
			&StalledTransport,
			HttpRequest::new(HttpMethod::Get, url),
			StdDuration::from_secs(5),
		)
		.await
		.expect_err("Stalled calls should time out.");

		assert!(matches!(
			err,
			TransportError::Timeout { ref endpoint, after } if endpoint == "/auth/status" && after == StdDuration::from_secs(5)
		));
	}

	#[test]
	fn response_classification() {
		assert!(HttpResponse::new(204, Vec::new()).is_success());
		assert!(HttpResponse::new(401, Vec::new()).is_auth_failure());
		assert!(HttpResponse::new(403, Vec::new()).is_auth_failure());
		assert!(!HttpResponse::new(500, Vec::new()).is_auth_failure());

		let request = HttpRequest::new(
			HttpMethod::Get,
			Url::parse("https://api.example.com").expect("URL should parse."),
		)
		.with_header("Authorization", "Bearer x");

		assert_eq!(request.header("authorization"), Some("Bearer x"));
	}

	#[test]
	fn json_decoding_reports_malformed_bodies() {
		#[derive(Debug, Deserialize)]
		struct Status {
			authenticated: bool,
		}

		let ok = HttpResponse::new(200, br#"{"authenticated":true}"#.to_vec());

		assert!(ok.json::<Status>().expect("Valid JSON should decode.").authenticated);

		let err = HttpResponse::new(200, b"<html>".to_vec())
			.json::<Status>()
			.expect_err("HTML bodies should be rejected.");

		assert!(matches!(err, ResponseError::Malformed { status: 200, .. }));

		let err = HttpResponse::new(502, b"bad gateway".to_vec())
			.error_for_status()
			.expect_err("Non-2xx responses should become errors.");

		assert!(matches!(err, ResponseError::Status { status: 502, body: None, .. }));
	}
}
