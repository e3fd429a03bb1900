//! Single-flight credential renewal.
//!
//! [`RefreshCoordinator::refresh`] may be called from any number of tasks at once. The first
//! caller starts the network call and parks a shared future in the coordinator; everyone who
//! arrives while it is pending awaits that same future instead of issuing another call. The
//! shared future vacates its slot when it resolves, success or not, so a failed refresh never
//! wedges later attempts. The coordinator never retries on its own.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use futures::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialStore},
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
	session::AuthBackend,
};

type SharedRefresh = Shared<BoxFuture<'static, Option<Credential>>>;

#[derive(Default)]
struct RefreshState {
	generation: u64,
	in_flight: Option<(u64, SharedRefresh)>,
}

/// Coalesces concurrent refresh requests onto one backend call.
///
/// Clones share the same in-flight slot and metrics.
#[derive(Clone)]
pub struct RefreshCoordinator {
	backend: AuthBackend,
	credentials: CredentialStore,
	metrics: Arc<RefreshMetrics>,
	state: Arc<Mutex<RefreshState>>,
}
impl RefreshCoordinator {
	/// Creates a coordinator that renews credentials held by `credentials`.
	pub fn new(backend: AuthBackend, credentials: CredentialStore) -> Self {
		Self {
			backend,
			credentials,
			metrics: Default::default(),
			state: Default::default(),
		}
	}

	/// Counters for refresh outcomes.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Returns `true` while a refresh call is pending.
	pub fn is_refreshing(&self) -> bool {
		self.state.lock().in_flight.is_some()
	}

	/// Renews the stored credential, joining a refresh already in flight if there is one.
	///
	/// Resolves to the newly stored credential, or `None` when the refresh failed for any
	/// reason; on failure the credential store is left untouched.
	pub async fn refresh(&self) -> Option<Credential> {
		let pending = {
			let mut state = self.state.lock();

			match &state.in_flight {
				Some((_, pending)) => {
					self.metrics.record_coalesced();

					pending.clone()
				},
				None => {
					state.generation += 1;

					let generation = state.generation;
					let pending = self.start(generation);

					state.in_flight = Some((generation, pending.clone()));

					pending
				},
			}
		};

		pending.await
	}

	fn start(&self, generation: u64) -> SharedRefresh {
		let backend = self.backend.clone();
		let credentials = self.credentials.clone();
		let metrics = self.metrics.clone();
		let state = self.state.clone();

		async move {
			let outcome = Self::perform(&backend, &credentials, &metrics).await;
			let mut state = state.lock();

			if state.in_flight.as_ref().is_some_and(|(current, _)| *current == generation) {
				state.in_flight = None;
			}

			outcome
		}
		.boxed()
		.shared()
	}

	async fn perform(
		backend: &AuthBackend,
		credentials: &CredentialStore,
		metrics: &RefreshMetrics,
	) -> Option<Credential> {
		const KIND: OperationKind = OperationKind::Refresh;

		let span = OperationSpan::new(KIND, "refresh_credential");

		let result = span
			.instrument(async {
				let Some(current) = credentials.get()? else {
					return Ok(None);
				};

				metrics.record_attempt();
				obs::record_operation_outcome(KIND, OperationOutcome::Attempt);

				let grant = backend.refresh(&current).await?;
				let ttl = grant.ttl();
				let renewed = grant.into_credential(current.renewal_token);

				Ok::<_, Error>(Some(credentials.set(renewed, ttl)?))
			})
			.await;

		match result {
			Ok(Some(credential)) => {
				metrics.record_success();
				obs::record_operation_outcome(KIND, OperationOutcome::Success);
				obs::event!(debug, "credential refreshed");

				Some(credential)
			},
			Ok(None) => {
				metrics.record_failure();
				obs::record_operation_outcome(KIND, OperationOutcome::Failure);
				obs::event!(info, "no stored credential to refresh");

				None
			},
			Err(e) => {
				metrics.record_failure();
				obs::record_operation_outcome(KIND, OperationOutcome::Failure);
				obs::event!(warn, error = %e, "credential refresh failed");

				None
			},
		}
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("backend", &self.backend)
			.field("in_flight", &self.is_refreshing())
			.field("metrics", &self.metrics)
			.finish()
	}
}
