// std
use std::collections::VecDeque;
// crates.io
use tokio::time::{self, Instant};
// self
use compliance_client::{
	_preludet::*,
	config::PollingConfig,
	error::{ConfigError, TransportError},
	jobs::{
		Job, JobRegistry, PollerState, PollingOrchestrator, RegistryEvent, RemovalReason,
		SessionId, Staleness, StatusFuture, StatusReport, StatusSource, StatusVocabulary,
		Subscription,
	},
	session::ReauthReason,
	store::{KeyValueStore, MemoryStore},
};

#[derive(Clone, Debug)]
enum Step {
	Status(&'static str),
	Progress(&'static str, u64),
	Failure(&'static str, &'static str),
	Offline,
	SessionLost,
}
impl Step {
	fn into_result(self) -> Result<StatusReport> {
		match self {
			Self::Status(status) => Ok(StatusReport::new(status)),
			Self::Progress(status, pages) => {
				let mut report = StatusReport::new(status);

				report.progress.insert("pages_scanned".into(), pages.into());

				Ok(report)
			},
			Self::Failure(status, message) =>
				Ok(StatusReport { message: Some(message.into()), ..StatusReport::new(status) }),
			Self::Offline => Err(TransportError::Timeout {
				endpoint: "/scanner/session/status".into(),
				after: StdDuration::from_secs(30),
			}
			.into()),
			Self::SessionLost => Err(Error::SessionInvalid { reason: ReauthReason::Expired }),
		}
	}
}

struct ScriptedSource {
	steps: Mutex<VecDeque<Step>>,
	fallback: Step,
	origin: Instant,
	calls: Mutex<Vec<StdDuration>>,
}
impl ScriptedSource {
	fn new(steps: impl IntoIterator<Item = Step>, fallback: Step) -> Arc<Self> {
		Arc::new(Self {
			steps: Mutex::new(steps.into_iter().collect()),
			fallback,
			origin: Instant::now(),
			calls: Mutex::new(Vec::new()),
		})
	}

	fn calls(&self) -> usize {
		self.calls.lock().len()
	}

	fn call_offsets_secs(&self) -> Vec<u64> {
		self.calls.lock().iter().map(StdDuration::as_secs).collect()
	}
}
impl StatusSource for ScriptedSource {
	fn fetch_status<'a>(&'a self, _session_id: &'a SessionId) -> StatusFuture<'a> {
		Box::pin(async move {
			self.calls.lock().push(self.origin.elapsed());

			let step = self.steps.lock().pop_front().unwrap_or_else(|| self.fallback.clone());

			step.into_result()
		})
	}
}

struct Harness {
	registry: JobRegistry,
	orchestrator: PollingOrchestrator,
	events: Arc<Mutex<Vec<RegistryEvent>>>,
	_subscription: Subscription,
}
impl Harness {
	fn start(store: Arc<dyn KeyValueStore>, source: Arc<ScriptedSource>) -> Self {
		let registry = JobRegistry::open(store, "scan_sessions").expect("Registry should open.");
		let events = Arc::new(Mutex::new(Vec::new()));
		let subscription = registry.subscribe({
			let events = events.clone();

			move |event: &RegistryEvent| events.lock().push(event.clone())
		});
		let orchestrator = PollingOrchestrator::start(
			registry.clone(),
			source,
			PollingConfig::default(),
			StatusVocabulary::default(),
		)
		.expect("Orchestrator should start inside a runtime.");

		Self { registry, orchestrator, events, _subscription: subscription }
	}

	fn add(&self, id: &str) {
		self.registry.add_job(job(id)).expect("Adding a job should succeed.");
	}

	fn removals(&self) -> Vec<RemovalReason> {
		self.events
			.lock()
			.iter()
			.filter_map(|event| match event {
				RegistryEvent::Removed { reason, .. } => Some(reason.clone()),
				_ => None,
			})
			.collect()
	}
}

fn job(id: &str) -> Job {
	Job::new(SessionId::new(id).expect("Session id should be valid."), "https://shop.example.com")
}

async fn advance_to(origin: Instant, secs: u64) {
	time::sleep_until(origin + StdDuration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn job_runs_pending_running_completed() {
	let source = ScriptedSource::new(
		[Step::Status("pending"), Step::Status("running"), Step::Status("completed")],
		Step::Status("running"),
	);
	let origin = source.origin;
	let harness = Harness::start(Arc::new(MemoryStore::default()), source.clone());

	harness.add("sess-1");

	assert!(harness.registry.get_job("sess-1").is_some());

	advance_to(origin, 1).await;

	assert_eq!(
		harness.registry.get_job("sess-1").and_then(|job| job.last_status),
		Some("pending".to_owned())
	);

	advance_to(origin, 5).await;

	let running = harness.registry.get_job("sess-1").expect("Job should still be tracked.");

	assert_eq!(running.last_status.as_deref(), Some("running"));
	assert!(running.last_update_at.is_some());

	advance_to(origin, 9).await;

	assert!(harness.registry.get_job("sess-1").is_none());
	assert_eq!(harness.removals(), vec![RemovalReason::Succeeded { message: None }]);

	advance_to(origin, 40).await;

	assert_eq!(source.calls(), 3);
	assert_eq!(harness.removals().len(), 1);
	assert!(!harness.orchestrator.is_polling("sess-1"));
}

#[tokio::test(start_paused = true)]
async fn cadence_switches_to_slow_interval_after_threshold() {
	let source = ScriptedSource::new([], Step::Status("running"));
	let origin = source.origin;
	let harness = Harness::start(Arc::new(MemoryStore::default()), source.clone());

	harness.add("sess-slow");
	advance_to(origin, 100).await;

	let mut expected = Vec::new();
	let mut tick = 0;

	while tick <= 100 {
		expected.push(tick);
		tick += if tick < 60 { 4 } else { 9 };
	}

	assert_eq!(source.call_offsets_secs(), expected);
}

#[tokio::test(start_paused = true)]
async fn removing_a_job_cancels_its_poller() {
	let source = ScriptedSource::new([], Step::Status("running"));
	let origin = source.origin;
	let harness = Harness::start(Arc::new(MemoryStore::default()), source.clone());

	harness.add("sess-gone");
	advance_to(origin, 5).await;

	assert_eq!(source.calls(), 2);
	assert!(harness.orchestrator.is_polling("sess-gone"));

	harness.registry.remove_job("sess-gone").expect("Removal should succeed.");

	assert!(!harness.orchestrator.is_polling("sess-gone"));

	advance_to(origin, 5 + 18).await;

	assert_eq!(source.calls(), 2);
	assert_eq!(harness.removals(), vec![RemovalReason::Discarded]);
}

#[tokio::test(start_paused = true)]
async fn job_removed_while_being_added_is_never_polled() {
	let source = ScriptedSource::new([], Step::Status("running"));
	let origin = source.origin;
	let registry = JobRegistry::open(Arc::new(MemoryStore::default()), "scan_sessions")
		.expect("Registry should open.");
	let discard = registry.subscribe({
		let registry = registry.clone();

		move |event: &RegistryEvent| {
			if let RegistryEvent::Added(job) = event {
				registry.remove_job(&job.session_id).expect("Nested removal should succeed.");
			}
		}
	});
	let orchestrator = PollingOrchestrator::start(
		registry.clone(),
		source.clone(),
		PollingConfig::default(),
		StatusVocabulary::default(),
	)
	.expect("Orchestrator should start inside a runtime.");

	registry.add_job(job("sess-flash")).expect("Adding a job should succeed.");
	advance_to(origin, 10).await;

	assert_eq!(source.calls(), 0);
	assert!(!orchestrator.is_polling("sess-flash"));
	assert!(registry.is_empty());

	drop(discard);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_orchestrator_stops_all_pollers() {
	let source = ScriptedSource::new([], Step::Status("running"));
	let origin = source.origin;
	let harness = Harness::start(Arc::new(MemoryStore::default()), source.clone());

	harness.add("sess-a");
	harness.add("sess-b");
	advance_to(origin, 1).await;

	assert_eq!(harness.orchestrator.active_pollers(), 2);
	assert_eq!(source.calls(), 2);

	let Harness { registry, orchestrator, .. } = harness;

	drop(orchestrator);
	advance_to(origin, 30).await;

	assert_eq!(source.calls(), 2);
	assert_eq!(registry.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn transport_errors_do_not_abandon_the_job() {
	let source = ScriptedSource::new(
		[Step::Offline, Step::Offline, Step::Offline, Step::Status("Scan Complete")],
		Step::Status("running"),
	);
	let origin = source.origin;
	let harness = Harness::start(Arc::new(MemoryStore::default()), source.clone());

	harness.add("sess-flaky");
	advance_to(origin, 9).await;

	assert!(harness.registry.get_job("sess-flaky").is_some());
	assert_eq!(harness.orchestrator.state("sess-flaky"), Some(PollerState::Polling));

	advance_to(origin, 13).await;

	assert!(harness.registry.get_job("sess-flaky").is_none());
	assert_eq!(source.call_offsets_secs(), vec![0, 4, 8, 12]);
	assert_eq!(harness.removals(), vec![RemovalReason::Succeeded { message: None }]);
}

#[tokio::test(start_paused = true)]
async fn failure_status_carries_backend_message() {
	let source = ScriptedSource::new(
		[Step::Progress("scanning", 12), Step::Failure("Scan Error", "robots.txt disallows crawling")],
		Step::Status("running"),
	);
	let origin = source.origin;
	let harness = Harness::start(Arc::new(MemoryStore::default()), source.clone());

	harness.add("sess-fail");
	advance_to(origin, 1).await;

	let scanning = harness.registry.get_job("sess-fail").expect("Job should be tracked.");

	assert_eq!(scanning.progress.get("pages_scanned").and_then(|n| n.as_u64()), Some(12));

	advance_to(origin, 5).await;

	assert!(harness.registry.get_job("sess-fail").is_none());
	assert_eq!(
		harness.removals(),
		vec![RemovalReason::Failed { message: Some("robots.txt disallows crawling".into()) }]
	);
}

#[tokio::test(start_paused = true)]
async fn unknown_statuses_keep_polling() {
	let source = ScriptedSource::new([], Step::Status("archived"));
	let origin = source.origin;
	let harness = Harness::start(Arc::new(MemoryStore::default()), source.clone());

	harness.add("sess-odd");
	advance_to(origin, 9).await;

	assert_eq!(source.calls(), 3);
	assert_eq!(
		harness.registry.get_job("sess-odd").and_then(|job| job.last_status),
		Some("archived".to_owned())
	);
}

#[tokio::test(start_paused = true)]
async fn session_loss_pauses_polling_but_keeps_the_job() {
	let source = ScriptedSource::new([Step::SessionLost], Step::Status("running"));
	let origin = source.origin;
	let harness = Harness::start(Arc::new(MemoryStore::default()), source.clone());

	harness.add("sess-auth");
	advance_to(origin, 30).await;

	assert_eq!(source.calls(), 1);
	assert!(harness.registry.get_job("sess-auth").is_some());
	assert_eq!(harness.orchestrator.state("sess-auth"), Some(PollerState::Stopped));
	assert!(!harness.orchestrator.is_polling("sess-auth"));

	harness.orchestrator.resume().expect("Resuming should succeed.");
	advance_to(origin, 31).await;

	assert_eq!(source.calls(), 2);
	assert!(harness.orchestrator.is_polling("sess-auth"));
}

#[tokio::test(start_paused = true)]
async fn persisted_jobs_resume_after_reload() {
	let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
	let before_reload = JobRegistry::open(store.clone(), "scan_sessions").expect("Registry should open.");
	let mut finished = job("sess-done");

	finished.last_status = Some("completed".into());
	before_reload.add_job(job("sess-live")).expect("Adding a job should succeed.");
	before_reload.add_job(finished).expect("Adding a job should succeed.");
	drop(before_reload);

	let source = ScriptedSource::new([Step::Status("running")], Step::Status("completed"));
	let origin = source.origin;
	let harness = Harness::start(store, source.clone());

	assert!(harness.registry.get_job("sess-done").is_none());
	assert!(harness.registry.get_job("sess-live").is_some());
	assert!(harness.orchestrator.is_polling("sess-live"));

	advance_to(origin, 5).await;

	assert!(harness.registry.is_empty());
	assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn staleness_escalates_without_successful_updates() {
	let source = ScriptedSource::new([Step::Status("running")], Step::Offline);
	let origin = source.origin;
	let harness = Harness::start(Arc::new(MemoryStore::default()), source.clone());

	harness.add("sess-quiet");

	let staleness =
		harness.orchestrator.staleness("sess-quiet").expect("Poller should expose staleness.");

	advance_to(origin, 10).await;

	assert_eq!(*staleness.borrow(), Staleness::Fresh);

	advance_to(origin, 21).await;

	assert_eq!(*staleness.borrow(), Staleness::AwaitingUpdate);

	advance_to(origin, 76).await;

	assert_eq!(*staleness.borrow(), Staleness::Delayed);
	assert!(harness.registry.get_job("sess-quiet").is_some());
}

#[tokio::test(start_paused = true)]
async fn reloaded_job_keeps_its_silence_history() {
	let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
	let before_reload = JobRegistry::open(store.clone(), "scan_sessions").expect("Registry should open.");
	let mut silent = job("sess-silent");

	silent.last_status = Some("running".into());
	silent.last_update_at = Some(OffsetDateTime::now_utc() - Duration::minutes(2));
	before_reload.add_job(silent).expect("Adding a job should succeed.");
	drop(before_reload);

	let source = ScriptedSource::new([], Step::Offline);
	let origin = source.origin;
	let harness = Harness::start(store, source.clone());
	let staleness =
		harness.orchestrator.staleness("sess-silent").expect("Poller should expose staleness.");

	advance_to(origin, 2).await;

	assert_eq!(*staleness.borrow(), Staleness::Delayed);
	assert!(harness.orchestrator.is_polling("sess-silent"));
}

#[test]
fn start_requires_a_runtime() {
	let registry = JobRegistry::open(Arc::new(MemoryStore::default()), "scan_sessions")
		.expect("Registry should open.");
	let source: Arc<dyn StatusSource> = ScriptedSource::new([], Step::Status("running"));
	let err = PollingOrchestrator::start(
		registry,
		source,
		PollingConfig::default(),
		StatusVocabulary::default(),
	)
	.expect_err("Starting outside a runtime should fail.");

	assert!(matches!(err, Error::Config(ConfigError::RuntimeUnavailable)));
}
