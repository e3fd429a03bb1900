//! Durable, observable table of in-flight jobs.
//!
//! Every mutation serializes the complete table, writes it under one storage key, and only then
//! swaps the in-memory copy and notifies subscribers. A failed write leaves both the durable
//! and in-memory tables untouched, so the registry can always be rebuilt from the last
//! successful write.

// std
use std::sync::{
	Weak,
	atomic::{AtomicU64, Ordering},
};
// self
use crate::{
	_prelude::*,
	jobs::{Job, JobUpdate, SessionId},
	obs,
	store::{KeyValueStore, StoreError},
};

type Listener = Arc<dyn Fn(&RegistryEvent) + Send + Sync>;

/// Why a job left the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemovalReason {
	/// Backend reported a success status.
	Succeeded {
		/// Backend-supplied message, if any.
		message: Option<String>,
	},
	/// Backend reported a failure status.
	Failed {
		/// Backend-supplied message, if any.
		message: Option<String>,
	},
	/// The user discarded the job.
	Discarded,
}

/// Change notification delivered to subscribers after each persisted mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum RegistryEvent {
	/// A job was added (or replaced under the same session id).
	Added(Job),
	/// A job was updated.
	Updated(Job),
	/// A job was removed.
	Removed {
		/// The job as it was when removed.
		job: Job,
		/// Why it was removed.
		reason: RemovalReason,
	},
}
impl RegistryEvent {
	/// Session id of the affected job.
	pub fn session_id(&self) -> &SessionId {
		match self {
			Self::Added(job) | Self::Updated(job) | Self::Removed { job, .. } => &job.session_id,
		}
	}
}

struct RegistryInner {
	kv: Arc<dyn KeyValueStore>,
	key: String,
	jobs: Mutex<Vec<Job>>,
	listeners: Mutex<Vec<(u64, Listener)>>,
	next_listener: AtomicU64,
}

/// Persisted, observable collection of in-flight jobs keyed by [`SessionId`].
///
/// Clones share the same table and subscriber list.
#[derive(Clone)]
pub struct JobRegistry(Arc<RegistryInner>);
impl JobRegistry {
	/// Opens the registry, rehydrating the table stored under `key`.
	pub fn open(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Result<Self, StoreError> {
		let key = key.into();
		let jobs = match kv.get(&key)? {
			Some(raw) if !raw.trim().is_empty() =>
				serde_json::from_str::<Vec<Job>>(&raw).map_err(|e| StoreError::Serialization {
					message: format!("Failed to parse job table `{key}`: {e}"),
				})?,
			_ => Vec::new(),
		};

		Ok(Self(Arc::new(RegistryInner {
			kv,
			key,
			jobs: Mutex::new(jobs),
			listeners: Mutex::new(Vec::new()),
			next_listener: AtomicU64::new(0),
		})))
	}

	/// Adds a job, replacing any existing job with the same session id.
	pub fn add_job(&self, job: Job) -> Result<(), StoreError> {
		self.mutate(|jobs| {
			match jobs.iter_mut().find(|existing| existing.session_id == job.session_id) {
				Some(existing) => *existing = job.clone(),
				None => jobs.push(job.clone()),
			}

			Some(((), RegistryEvent::Added(job)))
		})
		.map(|_| ())
	}

	/// Merges `update` into the job and stamps `last_update_at`.
	///
	/// Returns the updated job, or `None` when no job has that id.
	pub fn update_job(&self, id: &str, update: JobUpdate) -> Result<Option<Job>, StoreError> {
		let now = OffsetDateTime::now_utc();

		self.mutate(|jobs| {
			let job = jobs.iter_mut().find(|job| job.session_id.as_ref() == id)?;

			update.apply_to(job, now);

			Some((job.clone(), RegistryEvent::Updated(job.clone())))
		})
	}

	/// Discards a job at the user's request.
	pub fn remove_job(&self, id: &str) -> Result<Option<Job>, StoreError> {
		self.finish_job(id, RemovalReason::Discarded)
	}

	/// Removes a job with an explicit reason (terminal outcome or discard).
	pub fn finish_job(&self, id: &str, reason: RemovalReason) -> Result<Option<Job>, StoreError> {
		self.mutate(|jobs| {
			let index = jobs.iter().position(|job| job.session_id.as_ref() == id)?;
			let job = jobs.remove(index);

			Some((job.clone(), RegistryEvent::Removed { job, reason }))
		})
	}

	/// Returns a job by id.
	pub fn get_job(&self, id: &str) -> Option<Job> {
		self.0.jobs.lock().iter().find(|job| job.session_id.as_ref() == id).cloned()
	}

	/// Returns every job in insertion order.
	pub fn list_jobs(&self) -> Vec<Job> {
		self.0.jobs.lock().clone()
	}

	/// Number of tracked jobs.
	pub fn len(&self) -> usize {
		self.0.jobs.lock().len()
	}

	/// Returns `true` when no job is tracked.
	pub fn is_empty(&self) -> bool {
		self.0.jobs.lock().is_empty()
	}

	/// Registers a listener invoked synchronously after every persisted mutation.
	///
	/// The listener stays registered until the returned [`Subscription`] is dropped or
	/// [`Subscription::unsubscribe`] is called.
	pub fn subscribe<F>(&self, listener: F) -> Subscription
	where
		F: 'static + Fn(&RegistryEvent) + Send + Sync,
	{
		let id = self.0.next_listener.fetch_add(1, Ordering::Relaxed);

		self.0.listeners.lock().push((id, Arc::new(listener)));

		Subscription { registry: Arc::downgrade(&self.0), id }
	}

	fn mutate<T, F>(&self, apply: F) -> Result<Option<T>, StoreError>
	where
		F: FnOnce(&mut Vec<Job>) -> Option<(T, RegistryEvent)>,
	{
		let (value, event) = {
			let mut guard = self.0.jobs.lock();
			let mut next = guard.clone();
			let Some((value, event)) = apply(&mut next) else {
				return Ok(None);
			};
			let payload = serde_json::to_string(&next).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize job table: {e}"),
			})?;

			self.0.kv.set(&self.0.key, payload)?;

			*guard = next;

			(value, event)
		};

		self.notify(&event);

		Ok(Some(value))
	}

	fn notify(&self, event: &RegistryEvent) {
		let listeners: Vec<Listener> =
			self.0.listeners.lock().iter().map(|(_, listener)| listener.clone()).collect();

		obs::event!(debug, session_id = %event.session_id(), listeners = listeners.len(), "job registry changed");

		for listener in listeners {
			listener(event);
		}
	}
}
impl Debug for JobRegistry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("JobRegistry")
			.field("key", &self.0.key)
			.field("jobs", &self.0.jobs.lock().len())
			.field("listeners", &self.0.listeners.lock().len())
			.finish()
	}
}

/// Handle that keeps a registry listener alive.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
	registry: Weak<RegistryInner>,
	id: u64,
}
impl Subscription {
	/// Removes the listener.
	pub fn unsubscribe(self) {
		drop(self);
	}
}
impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(registry) = self.registry.upgrade() {
			registry.listeners.lock().retain(|(id, _)| *id != self.id);
		}
	}
}
impl Debug for Subscription {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Subscription").field("id", &self.id).finish()
	}
}
