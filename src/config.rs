//! Externally supplied configuration: backend location, auth material, endpoint paths, storage
//! key names, and polling cadence.

// self
use crate::{
	_prelude::*,
	auth::SigningKeys,
	error::ConfigError,
	http::HttpMethod,
	jobs::{StalenessThresholds, StatusVocabulary},
};

/// Backend endpoint paths, relative to [`ClientConfig::base_url`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
	/// `GET` session status, answering `{ authenticated }`.
	pub status: String,
	/// Credential renewal.
	pub refresh: String,
	/// Credential exchange.
	pub login: String,
	/// Best-effort server-side logout.
	pub logout: String,
	/// `POST { url }` starting a scan.
	pub scan: String,
	/// `GET` scan status, keyed by session id.
	pub scan_status: String,
	/// Query parameter carrying the session id on [`Endpoints::scan_status`].
	pub scan_session_param: String,
}
impl Default for Endpoints {
	fn default() -> Self {
		Self {
			status: "/auth/status".into(),
			refresh: "/auth/refresh".into(),
			login: "/auth/login".into(),
			logout: "/auth/logout".into(),
			scan: "/scanner/scan".into(),
			scan_status: "/scanner/session/status".into(),
			scan_session_param: "session_id".into(),
		}
	}
}

/// Names of the durable storage keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageKeys {
	/// Access token.
	pub access_token: String,
	/// Renewal token.
	pub renewal_token: String,
	/// Expiry, stored as unix seconds.
	pub expires_at: String,
	/// Serialized job table.
	pub jobs: String,
}
impl Default for StorageKeys {
	fn default() -> Self {
		Self {
			access_token: "session_token".into(),
			renewal_token: "refresh_token".into(),
			expires_at: "token_expires_at".into(),
			jobs: "scan_sessions".into(),
		}
	}
}

/// Poll cadence and staleness thresholds for background jobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollingConfig {
	/// Interval used while the poller is younger than [`PollingConfig::backoff_threshold`].
	pub fast_interval: StdDuration,
	/// Interval used once the backoff threshold has elapsed.
	pub slow_interval: StdDuration,
	/// Poller age at which the cadence switches from fast to slow.
	pub backoff_threshold: StdDuration,
	/// Advisory staleness thresholds.
	pub staleness: StalenessThresholds,
	/// How often the staleness monitor re-evaluates a job.
	pub staleness_check_interval: StdDuration,
}
impl PollingConfig {
	/// Returns the delay before the next tick for a poller that has been running `elapsed`.
	pub fn interval_for(&self, elapsed: StdDuration) -> StdDuration {
		if elapsed < self.backoff_threshold { self.fast_interval } else { self.slow_interval }
	}

	fn validate(&self) -> Result<(), ConfigError> {
		for (field, value) in [
			("fast_interval", self.fast_interval),
			("slow_interval", self.slow_interval),
			("staleness_check_interval", self.staleness_check_interval),
		] {
			if value.is_zero() {
				return Err(ConfigError::ZeroDuration { field });
			}
		}
		if self.slow_interval < self.fast_interval {
			return Err(ConfigError::SlowIntervalTooShort);
		}
		if self.staleness.awaiting_update >= self.staleness.delayed {
			return Err(ConfigError::StalenessThresholdsOutOfOrder);
		}

		Ok(())
	}
}
impl Default for PollingConfig {
	fn default() -> Self {
		Self {
			fast_interval: StdDuration::from_secs(4),
			slow_interval: StdDuration::from_secs(9),
			backoff_threshold: StdDuration::from_secs(60),
			staleness: StalenessThresholds::default(),
			staleness_check_interval: StdDuration::from_secs(1),
		}
	}
}

/// Validated client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
	/// Base API URL; endpoint paths are appended to its path.
	pub base_url: Url,
	/// Re-authentication entry point used when the session is invalidated.
	pub reauth_url: Url,
	/// Upper bound on a single network call.
	pub request_timeout: StdDuration,
	/// Capability keys used when no bearer token is stored.
	pub signing: Option<SigningKeys>,
	/// Method used against the refresh endpoint.
	pub refresh_method: HttpMethod,
	/// Endpoint paths.
	pub endpoints: Endpoints,
	/// Durable storage key names.
	pub storage_keys: StorageKeys,
	/// Poll cadence.
	pub polling: PollingConfig,
	/// Status vocabulary used to classify job states.
	pub vocabulary: StatusVocabulary,
}
impl ClientConfig {
	/// Starts a builder for the provided base URL.
	pub fn builder(base_url: Url) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url)
	}

	/// Resolves an endpoint path against the base URL.
	pub fn endpoint_url(&self, path: &str) -> Url {
		let mut url = self.base_url.clone();
		let base_path = url.path().trim_end_matches('/').to_owned();
		let suffix = path.trim_start_matches('/');

		url.set_path(&format!("{base_path}/{suffix}"));

		url
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	/// Base API URL.
	pub base_url: Url,
	/// Optional re-authentication entry point; defaults to `/login` on the base origin.
	pub reauth_url: Option<Url>,
	/// Request timeout.
	pub request_timeout: StdDuration,
	/// Capability keys.
	pub signing: Option<SigningKeys>,
	/// Refresh method.
	pub refresh_method: HttpMethod,
	/// Endpoint paths.
	pub endpoints: Endpoints,
	/// Storage key names.
	pub storage_keys: StorageKeys,
	/// Poll cadence.
	pub polling: PollingConfig,
	/// Status vocabulary.
	pub vocabulary: StatusVocabulary,
}
impl ClientConfigBuilder {
	const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(30);

	/// Creates a builder seeded with defaults.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			reauth_url: None,
			request_timeout: Self::DEFAULT_TIMEOUT,
			signing: None,
			refresh_method: HttpMethod::Post,
			endpoints: Endpoints::default(),
			storage_keys: StorageKeys::default(),
			polling: PollingConfig::default(),
			vocabulary: StatusVocabulary::default(),
		}
	}

	/// Sets the re-authentication entry point.
	pub fn reauth_url(mut self, url: Url) -> Self {
		self.reauth_url = Some(url);

		self
	}

	/// Overrides the request timeout.
	pub fn request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Enables signed-header auth with the provided keys.
	pub fn signing_keys(mut self, keys: SigningKeys) -> Self {
		self.signing = Some(keys);

		self
	}

	/// Overrides the refresh method.
	pub fn refresh_method(mut self, method: HttpMethod) -> Self {
		self.refresh_method = method;

		self
	}

	/// Replaces the endpoint paths.
	pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
		self.endpoints = endpoints;

		self
	}

	/// Replaces the storage key names.
	pub fn storage_keys(mut self, keys: StorageKeys) -> Self {
		self.storage_keys = keys;

		self
	}

	/// Replaces the polling configuration.
	pub fn polling(mut self, polling: PollingConfig) -> Self {
		self.polling = polling;

		self
	}

	/// Replaces the status vocabulary.
	pub fn vocabulary(mut self, vocabulary: StatusVocabulary) -> Self {
		self.vocabulary = vocabulary;

		self
	}

	/// Validates and produces a [`ClientConfig`].
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		validate_http_url("base", &self.base_url)?;

		let reauth_url = match self.reauth_url {
			Some(url) => {
				validate_http_url("reauth", &url)?;

				url
			},
			None => {
				let mut url = self.base_url.clone();

				url.set_path("/login");
				url.set_query(None);
				url.set_fragment(None);

				url
			},
		};

		if self.request_timeout.is_zero() {
			return Err(ConfigError::ZeroDuration { field: "request_timeout" });
		}

		self.polling.validate()?;

		Ok(ClientConfig {
			base_url: self.base_url,
			reauth_url,
			request_timeout: self.request_timeout,
			signing: self.signing,
			refresh_method: self.refresh_method,
			endpoints: self.endpoints,
			storage_keys: self.storage_keys,
			polling: self.polling,
			vocabulary: self.vocabulary,
		})
	}
}

fn validate_http_url(field: &'static str, url: &Url) -> Result<(), ConfigError> {
	if matches!(url.scheme(), "http" | "https") && !url.cannot_be_a_base() {
		Ok(())
	} else {
		Err(ConfigError::InvalidUrl { field, url: url.to_string() })
	}
}
