//! Job records and the session identifiers that key them.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const SESSION_ID_MAX_LEN: usize = 128;

/// Error returned when session identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum SessionIdError {
	/// The identifier was empty.
	#[error("Session identifier cannot be empty.")]
	Empty,
	/// The identifier contains whitespace characters.
	#[error("Session identifier contains whitespace.")]
	ContainsWhitespace,
	/// The identifier exceeded the allowed character count.
	#[error("Session identifier exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
}

/// Backend-issued identifier of a scan session; immutable once created.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);
impl SessionId {
	/// Creates a new identifier after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, SessionIdError> {
		let view = value.as_ref();

		validate_view(view)?;

		Ok(Self(view.to_owned()))
	}
}
impl Deref for SessionId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for SessionId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for SessionId {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<SessionId> for String {
	fn from(value: SessionId) -> Self {
		value.0
	}
}
impl TryFrom<String> for SessionId {
	type Error = SessionIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_view(&value)?;

		Ok(Self(value))
	}
}
impl FromStr for SessionId {
	type Err = SessionIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for SessionId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "SessionId({})", self.0)
	}
}
impl Display for SessionId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

fn validate_view(view: &str) -> Result<(), SessionIdError> {
	if view.is_empty() {
		return Err(SessionIdError::Empty);
	}
	if view.chars().any(char::is_whitespace) {
		return Err(SessionIdError::ContainsWhitespace);
	}
	if view.len() > SESSION_ID_MAX_LEN {
		return Err(SessionIdError::TooLong { max: SESSION_ID_MAX_LEN });
	}

	Ok(())
}

/// Numeric progress counters reported by the backend (pages scanned, issues found, ...).
pub type ProgressFields = BTreeMap<String, serde_json::Number>;

/// In-flight background job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
	/// Unique key.
	pub session_id: SessionId,
	/// Website being scanned.
	pub target_url: String,
	/// Launch instant.
	pub started_at: OffsetDateTime,
	/// Last status string reported by the backend.
	#[serde(default)]
	pub last_status: Option<String>,
	/// Instant of the last merged update; never moves backwards.
	#[serde(default)]
	pub last_update_at: Option<OffsetDateTime>,
	/// Latest progress counters.
	#[serde(default)]
	pub progress: ProgressFields,
}
impl Job {
	/// Creates a job started now.
	pub fn new(session_id: SessionId, target_url: impl Into<String>) -> Self {
		Self {
			session_id,
			target_url: target_url.into(),
			started_at: OffsetDateTime::now_utc(),
			last_status: None,
			last_update_at: None,
			progress: ProgressFields::new(),
		}
	}

	/// Overrides the launch instant.
	pub fn with_started_at(mut self, instant: OffsetDateTime) -> Self {
		self.started_at = instant;

		self
	}
}

/// Partial update merged into a [`Job`] by the registry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobUpdate {
	/// New status string, if reported.
	pub status: Option<String>,
	/// Counters to merge over the existing ones.
	pub progress: ProgressFields,
}
impl JobUpdate {
	/// Creates an empty update.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the status string.
	pub fn status(mut self, status: impl Into<String>) -> Self {
		self.status = Some(status.into());

		self
	}

	/// Sets one progress counter.
	pub fn counter(mut self, name: impl Into<String>, value: impl Into<serde_json::Number>) -> Self {
		self.progress.insert(name.into(), value.into());

		self
	}

	/// Merges all counters from `progress`.
	pub fn progress(mut self, progress: ProgressFields) -> Self {
		self.progress.extend(progress);

		self
	}

	/// Merges the update into `job`, stamping `last_update_at` without moving it backwards.
	pub(crate) fn apply_to(self, job: &mut Job, now: OffsetDateTime) {
		if let Some(status) = self.status {
			job.last_status = Some(status);
		}

		job.progress.extend(self.progress);
		job.last_update_at = Some(match job.last_update_at {
			Some(previous) if previous > now => previous,
			_ => now,
		});
	}
}
