//! Client runtime for compliance scan backends: credential storage, signed or bearer request
//! authentication, single-flight credential refresh, session guarding, and durable polling of
//! long-running scan jobs.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod jobs;
pub mod obs;
pub mod scanner;
pub mod session;
pub mod store;
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// self
	use crate::{
		config::ClientConfig,
		http::{HttpFuture, HttpRequest, HttpResponse, HttpTransport},
		session::{Navigator, ReauthRedirect},
	};
	#[cfg(feature = "reqwest")]
	use crate::{client::ApiClient, store::MemoryStore};

	/// Navigator that remembers every redirect it was asked to perform.
	#[derive(Debug, Default)]
	pub struct RecordingNavigator(Mutex<Vec<ReauthRedirect>>);
	impl RecordingNavigator {
		/// Returns every redirect recorded so far.
		pub fn redirects(&self) -> Vec<ReauthRedirect> {
			self.0.lock().clone()
		}
	}
	impl Navigator for RecordingNavigator {
		fn reauthenticate(&self, redirect: ReauthRedirect) {
			self.0.lock().push(redirect);
		}
	}

	/// Transport answering from per-path scripts and recording every request.
	///
	/// Queued responses are served first, then the path's fallback, then a bare 404.
	#[derive(Debug, Default)]
	pub struct ScriptedTransport {
		queued: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
		fallback: Mutex<HashMap<String, HttpResponse>>,
		requests: Mutex<Vec<HttpRequest>>,
		delay: Option<StdDuration>,
	}
	impl ScriptedTransport {
		/// Delays every response by `delay` (use with a paused clock).
		pub fn with_delay(mut self, delay: StdDuration) -> Self {
			self.delay = Some(delay);

			self
		}

		/// Queues a one-shot response for `path`.
		pub fn push(&self, path: &str, status: u16, body: &str) {
			self.queued
				.lock()
				.entry(path.to_owned())
				.or_default()
				.push_back(HttpResponse::new(status, body.as_bytes().to_vec()));
		}

		/// Sets the response served for `path` once its queue is empty.
		pub fn always(&self, path: &str, status: u16, body: &str) {
			self.fallback
				.lock()
				.insert(path.to_owned(), HttpResponse::new(status, body.as_bytes().to_vec()));
		}

		/// Returns every request received so far.
		pub fn requests(&self) -> Vec<HttpRequest> {
			self.requests.lock().clone()
		}

		/// Number of requests received for `path`.
		pub fn calls_to(&self, path: &str) -> usize {
			self.requests.lock().iter().filter(|request| request.url.path() == path).count()
		}

		fn respond(&self, path: &str) -> HttpResponse {
			if let Some(response) = self.queued.lock().get_mut(path).and_then(VecDeque::pop_front) {
				return response;
			}

			self.fallback
				.lock()
				.get(path)
				.cloned()
				.unwrap_or_else(|| HttpResponse::new(404, Vec::new()))
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn execute(&self, request: HttpRequest) -> HttpFuture<'_> {
			Box::pin(async move {
				let path = request.url.path().to_owned();

				self.requests.lock().push(request);

				if let Some(delay) = self.delay {
					tokio::time::sleep(delay).await;
				}

				Ok(self.respond(&path))
			})
		}
	}

	/// Builds a config pointed at `base_url` with a short request timeout.
	pub fn test_config(base_url: &str) -> ClientConfig {
		let base = Url::parse(base_url).expect("Test base URL should parse.");

		ClientConfig::builder(base)
			.request_timeout(StdDuration::from_secs(5))
			.build()
			.expect("Test config should validate.")
	}

	/// Constructs an [`ApiClient`] backed by an in-memory store, the default reqwest transport,
	/// and a recording navigator.
	#[cfg(feature = "reqwest")]
	pub fn build_test_client(
		config: ClientConfig,
	) -> (ApiClient, Arc<MemoryStore>, Arc<RecordingNavigator>) {
		let store = Arc::new(MemoryStore::default());
		let navigator = Arc::new(RecordingNavigator::default());
		let client = ApiClient::new(config, store.clone(), navigator.clone());

		(client, store, navigator)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
