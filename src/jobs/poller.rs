//! Per-job polling orchestration.
//!
//! [`PollingOrchestrator`] subscribes to a [`JobRegistry`] and keeps exactly one poller per
//! tracked job. A poller runs the status loop and an independent staleness monitor:
//!
//! - each tick fetches the job status through a [`StatusSource`] and classifies it with the
//!   configured [`StatusVocabulary`];
//! - continuing statuses are merged into the registry and the next tick is scheduled on the
//!   fast interval until the backoff threshold, then on the slow interval;
//! - terminal statuses remove the job with the matching [`RemovalReason`];
//! - transport and response failures are logged and retried on the current cadence;
//! - a lost session stops the poller but keeps the job so it can resume after
//!   re-authentication.
//!
//! Removing a job (for any reason) cancels its poller; a cancelled poller never fires again.

// crates.io
use tokio::{runtime::Handle, sync::watch, time::Instant};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	config::PollingConfig,
	error::ConfigError,
	jobs::{
		JobPhase, JobRegistry, JobUpdate, RegistryEvent, RemovalReason, SessionId, Staleness,
		StatusReport, StatusVocabulary, Subscription, TaskHandle, sleep_or_cancel,
	},
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
};

/// Boxed future returned by [`StatusSource::fetch_status`].
pub type StatusFuture<'a> = Pin<Box<dyn Future<Output = Result<StatusReport>> + 'a + Send>>;

/// Anything that can report the current status of a job.
pub trait StatusSource
where
	Self: 'static + Send + Sync,
{
	/// Fetches the latest status for `session_id`.
	fn fetch_status<'a>(&'a self, session_id: &'a SessionId) -> StatusFuture<'a>;
}

/// Lifecycle of a single poller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PollerState {
	/// Spawned but not yet ticking.
	Idle,
	/// Ticking.
	Polling,
	/// Observed a success status.
	Succeeded,
	/// Observed a failure status.
	Failed,
	/// Stopped without a terminal status (session lost or job vanished).
	Stopped,
}

struct PollerEntry {
	task: TaskHandle,
	state: Arc<Mutex<PollerState>>,
	staleness: watch::Receiver<Staleness>,
}

struct OrchestratorInner {
	registry: JobRegistry,
	source: Arc<dyn StatusSource>,
	polling: PollingConfig,
	vocabulary: StatusVocabulary,
	runtime: Handle,
	pollers: Mutex<HashMap<SessionId, PollerEntry>>,
}
impl OrchestratorInner {
	fn on_event(&self, event: &RegistryEvent) {
		match event {
			RegistryEvent::Added(job) => self.ensure_poller(&job.session_id),
			RegistryEvent::Removed { job, .. } => self.stop(&job.session_id),
			RegistryEvent::Updated(_) => {},
		}
	}

	fn ensure_poller(&self, session_id: &SessionId) {
		let mut pollers = self.pollers.lock();

		if pollers.get(session_id).is_some_and(|entry| !entry.task.is_finished()) {
			return;
		}

		// Events can arrive out of order when a listener mutates the registry re-entrantly.
		let Some(job) = self.registry.get_job(session_id) else {
			return;
		};

		let state = Arc::new(Mutex::new(PollerState::Idle));
		let (staleness_tx, staleness_rx) = watch::channel(Staleness::Fresh);
		let ctx = PollerContext {
			session_id: session_id.clone(),
			registry: self.registry.clone(),
			source: self.source.clone(),
			polling: self.polling.clone(),
			vocabulary: self.vocabulary.clone(),
			state: state.clone(),
			last_progress: Mutex::new(progress_origin(job.last_update_at)),
			staleness: staleness_tx,
		};
		let task = TaskHandle::spawn(&self.runtime, move |token| ctx.run(token));

		obs::event!(info, session_id = %session_id, "job poller started");

		pollers.insert(session_id.clone(), PollerEntry { task, state, staleness: staleness_rx });
	}

	fn stop(&self, session_id: &str) {
		let entry = self.pollers.lock().remove(session_id);

		if let Some(entry) = entry {
			entry.task.cancel();

			obs::event!(info, session_id, "job poller stopped");
		}
	}

	fn resume(&self) -> Result<()> {
		for job in self.registry.list_jobs() {
			let phase = job.last_status.as_deref().map(|status| self.vocabulary.classify(status));

			match phase {
				Some(JobPhase::Succeeded) => {
					self.registry
						.finish_job(&job.session_id, RemovalReason::Succeeded { message: None })?;
				},
				Some(JobPhase::Failed) => {
					self.registry
						.finish_job(&job.session_id, RemovalReason::Failed { message: None })?;
				},
				Some(JobPhase::Continuing) | None => self.ensure_poller(&job.session_id),
			}
		}

		Ok(())
	}
}

/// Keeps one poller running per tracked job.
///
/// Dropping the orchestrator cancels every poller and unsubscribes from the registry.
pub struct PollingOrchestrator {
	inner: Arc<OrchestratorInner>,
	_subscription: Subscription,
}
impl PollingOrchestrator {
	/// Subscribes to `registry` and resumes polling for every job already stored in it.
	///
	/// Must be called from within a Tokio runtime; pollers are spawned on it.
	pub fn start(
		registry: JobRegistry,
		source: Arc<dyn StatusSource>,
		polling: PollingConfig,
		vocabulary: StatusVocabulary,
	) -> Result<Self> {
		let runtime = Handle::try_current().map_err(|_| ConfigError::RuntimeUnavailable)?;
		let inner = Arc::new(OrchestratorInner {
			registry: registry.clone(),
			source,
			polling,
			vocabulary,
			runtime,
			pollers: Mutex::new(HashMap::new()),
		});
		let subscription = registry.subscribe({
			let inner = Arc::downgrade(&inner);

			move |event: &RegistryEvent| {
				if let Some(inner) = inner.upgrade() {
					inner.on_event(event);
				}
			}
		});

		inner.resume()?;

		Ok(Self { inner, _subscription: subscription })
	}

	/// Restarts pollers for jobs whose poller stopped (e.g. after re-authentication).
	pub fn resume(&self) -> Result<()> {
		self.inner.resume()
	}

	/// Cancels the poller for `session_id` without touching the registry.
	pub fn stop(&self, session_id: &str) {
		self.inner.stop(session_id);
	}

	/// Cancels every poller.
	pub fn shutdown(&self) {
		let entries: Vec<_> = self.inner.pollers.lock().drain().collect();

		for (_, entry) in entries {
			entry.task.cancel();
		}
	}

	/// Returns the state of the poller for `session_id`, if one exists.
	pub fn state(&self, session_id: &str) -> Option<PollerState> {
		self.inner.pollers.lock().get(session_id).map(|entry| *entry.state.lock())
	}

	/// Returns `true` while a poller for `session_id` is running.
	pub fn is_polling(&self, session_id: &str) -> bool {
		self.inner
			.pollers
			.lock()
			.get(session_id)
			.is_some_and(|entry| !entry.task.is_finished() && !entry.task.is_cancelled())
	}

	/// Number of running pollers.
	pub fn active_pollers(&self) -> usize {
		self.inner
			.pollers
			.lock()
			.values()
			.filter(|entry| !entry.task.is_finished() && !entry.task.is_cancelled())
			.count()
	}

	/// Subscribes to the staleness advisory of `session_id`.
	pub fn staleness(&self, session_id: &str) -> Option<watch::Receiver<Staleness>> {
		self.inner.pollers.lock().get(session_id).map(|entry| entry.staleness.clone())
	}
}
impl Drop for PollingOrchestrator {
	fn drop(&mut self) {
		self.shutdown();
	}
}
impl Debug for PollingOrchestrator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PollingOrchestrator")
			.field("registry", &self.inner.registry)
			.field("pollers", &self.inner.pollers.lock().len())
			.finish()
	}
}

/// Maps the wall-clock instant of the last persisted update onto the runtime clock.
fn progress_origin(last_update_at: Option<OffsetDateTime>) -> Instant {
	let now = Instant::now();

	last_update_at
		.and_then(|at| StdDuration::try_from(OffsetDateTime::now_utc() - at).ok())
		.and_then(|silent| now.checked_sub(silent))
		.unwrap_or(now)
}

enum Tick {
	Continue,
	Stop,
}

struct PollerContext {
	session_id: SessionId,
	registry: JobRegistry,
	source: Arc<dyn StatusSource>,
	polling: PollingConfig,
	vocabulary: StatusVocabulary,
	state: Arc<Mutex<PollerState>>,
	last_progress: Mutex<Instant>,
	staleness: watch::Sender<Staleness>,
}
impl PollerContext {
	async fn run(self, token: CancellationToken) {
		let monitor_token = token.child_token();

		tokio::join!(
			async {
				self.poll(&token).await;
				monitor_token.cancel();
			},
			self.monitor(&monitor_token),
		);
	}

	async fn poll(&self, token: &CancellationToken) {
		let started = Instant::now();
		let mut warned_unrecognized = false;

		self.set_state(PollerState::Polling);

		loop {
			if self.registry.get_job(&self.session_id).is_none() {
				self.set_state(PollerState::Stopped);

				return;
			}

			let span = OperationSpan::new(OperationKind::Poll, "fetch_status");

			obs::record_operation_outcome(OperationKind::Poll, OperationOutcome::Attempt);

			let fetched = tokio::select! {
				biased;
				_ = token.cancelled() => return,
				result = span.instrument(self.source.fetch_status(&self.session_id)) => result,
			};

			if token.is_cancelled() {
				return;
			}

			match fetched {
				Ok(report) => {
					obs::record_operation_outcome(OperationKind::Poll, OperationOutcome::Success);

					if !warned_unrecognized && !self.vocabulary.is_recognized(&report.status) {
						warned_unrecognized = true;

						obs::event!(
							warn,
							session_id = %self.session_id,
							status = %report.status,
							"unrecognized job status treated as still running"
						);
					}
					if let Tick::Stop = self.apply(report) {
						return;
					}
				},
				Err(Error::SessionInvalid { reason }) => {
					obs::record_operation_outcome(OperationKind::Poll, OperationOutcome::Failure);
					obs::event!(
						warn,
						session_id = %self.session_id,
						%reason,
						"session lost while polling; poller paused until resumed"
					);

					self.set_state(PollerState::Stopped);

					return;
				},
				Err(e) => {
					obs::record_operation_outcome(OperationKind::Poll, OperationOutcome::Failure);
					obs::event!(
						warn,
						session_id = %self.session_id,
						error = %e,
						"job status poll failed; retrying on schedule"
					);
				},
			}

			let delay = self.polling.interval_for(started.elapsed());

			if !sleep_or_cancel(token, delay).await {
				return;
			}
		}
	}

	fn apply(&self, report: StatusReport) -> Tick {
		match self.vocabulary.classify(&report.status) {
			JobPhase::Continuing => {
				let update = JobUpdate::new().status(report.status).progress(report.progress);

				match self.registry.update_job(&self.session_id, update) {
					Ok(Some(_)) => {
						self.touch();

						Tick::Continue
					},
					Ok(None) => {
						self.set_state(PollerState::Stopped);

						Tick::Stop
					},
					Err(e) => {
						obs::event!(warn, session_id = %self.session_id, error = %e, "failed to persist job progress");

						Tick::Continue
					},
				}
			},
			JobPhase::Succeeded => {
				self.set_state(PollerState::Succeeded);
				self.finish(RemovalReason::Succeeded { message: report.message });

				Tick::Stop
			},
			JobPhase::Failed => {
				self.set_state(PollerState::Failed);
				self.finish(RemovalReason::Failed { message: report.message });

				Tick::Stop
			},
		}
	}

	fn finish(&self, reason: RemovalReason) {
		obs::event!(info, session_id = %self.session_id, ?reason, "job reached a terminal status");

		if let Err(e) = self.registry.finish_job(&self.session_id, reason) {
			obs::event!(warn, session_id = %self.session_id, error = %e, "failed to remove finished job");
		}
	}

	async fn monitor(&self, token: &CancellationToken) {
		let thresholds = self.polling.staleness;

		while sleep_or_cancel(token, self.polling.staleness_check_interval).await {
			let since_update = self.last_progress.lock().elapsed();
			let next = Staleness::classify(since_update, &thresholds);

			self.publish(next);
		}
	}

	fn touch(&self) {
		*self.last_progress.lock() = Instant::now();

		self.publish(Staleness::Fresh);
	}

	fn publish(&self, next: Staleness) {
		self.staleness.send_if_modified(|current| {
			if *current == next {
				return false;
			}

			obs::event!(debug, session_id = %self.session_id, staleness = %next, "job staleness changed");

			*current = next;

			true
		});
	}

	fn set_state(&self, state: PollerState) {
		*self.state.lock() = state;
	}
}
