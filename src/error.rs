//! Crate-level error types shared by the request pipeline, session services, and job tracking.

// self
use crate::{_prelude::*, session::ReauthReason};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Durable storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Backend answered, but not with the expected successful payload.
	#[error(transparent)]
	Response(#[from] ResponseError),

	/// Credentials could not be restored; the session was cleared and re-authentication was
	/// requested.
	#[error("Session is no longer valid ({reason}).")]
	SessionInvalid {
		/// Reason code forwarded to the re-authentication entry point.
		reason: ReauthReason,
	},
}
impl Error {
	/// Returns `true` for failures that are worth retrying on the next poll.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Transport(_) | Self::Response(_))
	}
}

/// Configuration and validation failures.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum ConfigError {
	/// Base URL cannot carry path segments (e.g. `mailto:` or `data:`).
	#[error("The {field} URL must be an http(s) URL: {url}.")]
	InvalidUrl {
		/// Which URL failed validation.
		field: &'static str,
		/// URL that failed validation.
		url: String,
	},
	/// A polling interval or timeout was zero.
	#[error("The {field} duration must be greater than zero.")]
	ZeroDuration {
		/// Offending field name.
		field: &'static str,
	},
	/// Slow polling interval is shorter than the fast one.
	#[error("The slow polling interval must not be shorter than the fast interval.")]
	SlowIntervalTooShort,
	/// Staleness thresholds are out of order.
	#[error("The awaiting-update threshold must be shorter than the delayed threshold.")]
	StalenessThresholdsOutOfOrder,
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed: {message}.")]
	HttpClientBuild {
		/// Underlying builder failure.
		message: String,
	},
	/// No async runtime is available to spawn background tasks on.
	#[error("A Tokio runtime is required to start background pollers.")]
	RuntimeUnavailable,
	/// Request body could not be serialized.
	#[error("Request body could not be serialized: {message}.")]
	RequestBody {
		/// Serializer failure.
		message: String,
	},
}

/// Transport-level failures (network, timeout).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {endpoint}.")]
	Network {
		/// Endpoint path being called.
		endpoint: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Server did not answer within the configured window; the request was aborted.
	#[error("Request to {endpoint} timed out after {after:?}.")]
	Timeout {
		/// Endpoint path being called.
		endpoint: String,
		/// Configured timeout.
		after: StdDuration,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		endpoint: impl Into<String>,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { endpoint: endpoint.into(), source: Box::new(src) }
	}
}

/// Failures derived from a backend response.
#[derive(Debug, ThisError)]
pub enum ResponseError {
	/// Backend returned a non-2xx status.
	#[error("Request failed with HTTP {status}: {message}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Parsed JSON body, when the backend sent one.
		body: Option<serde_json::Value>,
		/// Backend-supplied message or a generic description.
		message: String,
	},
	/// Backend returned a body that is not the expected JSON.
	#[error("Response from HTTP {status} could not be parsed as JSON.")]
	Malformed {
		/// HTTP status code.
		status: u16,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Token endpoint answered 2xx without a usable session token.
	#[error("Token response from HTTP {status} did not include a session token.")]
	MissingToken {
		/// HTTP status code.
		status: u16,
	},
}
impl ResponseError {
	/// Builds a [`ResponseError::Status`] from a raw response body.
	pub fn from_status(status: u16, body: &[u8]) -> Self {
		let parsed = serde_json::from_slice::<serde_json::Value>(body).ok();
		let message = parsed
			.as_ref()
			.and_then(|value| {
				["message", "error", "detail"]
					.iter()
					.find_map(|field| value.get(field).and_then(serde_json::Value::as_str))
			})
			.map(ToOwned::to_owned)
			.unwrap_or_else(|| format!("HTTP {status}"));

		Self::Status { status, body: parsed, message }
	}

	/// Returns the HTTP status attached to the failure.
	pub fn status(&self) -> u16 {
		match self {
			Self::Status { status, .. }
			| Self::Malformed { status, .. }
			| Self::MissingToken { status } => *status,
		}
	}
}
