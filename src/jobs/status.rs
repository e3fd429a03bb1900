//! Backend status vocabulary and the closed set of job phases it maps onto.

// self
use crate::{_prelude::*, jobs::ProgressFields};

/// Closed classification of a backend status string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobPhase {
	/// Job is still running; keep polling.
	Continuing,
	/// Job finished successfully.
	Succeeded,
	/// Job finished with a failure.
	Failed,
}
impl JobPhase {
	/// Returns `true` for [`JobPhase::Succeeded`] and [`JobPhase::Failed`].
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Succeeded | Self::Failed)
	}
}

/// Term lists used to classify status strings.
///
/// Matching is a case-insensitive substring test. Success terms are checked first, then failure
/// terms. A string matching neither is [`JobPhase::Continuing`]; whether it was a known
/// continuing term is reported separately by [`StatusVocabulary::is_recognized`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusVocabulary {
	/// Terms that mark success.
	pub success: Vec<String>,
	/// Terms that mark failure.
	pub failure: Vec<String>,
	/// Terms known to mean "still running".
	pub continuing: Vec<String>,
}
impl StatusVocabulary {
	/// Classifies a raw status string.
	pub fn classify(&self, status: &str) -> JobPhase {
		let status = status.to_lowercase();

		if Self::matches_any(&status, &self.success) {
			JobPhase::Succeeded
		} else if Self::matches_any(&status, &self.failure) {
			JobPhase::Failed
		} else {
			JobPhase::Continuing
		}
	}

	/// Returns `true` when the status matches any configured vocabulary.
	pub fn is_recognized(&self, status: &str) -> bool {
		let status = status.to_lowercase();

		Self::matches_any(&status, &self.success)
			|| Self::matches_any(&status, &self.failure)
			|| Self::matches_any(&status, &self.continuing)
	}

	fn matches_any(status: &str, terms: &[String]) -> bool {
		terms.iter().any(|term| !term.is_empty() && status.contains(&term.to_lowercase()))
	}
}
impl Default for StatusVocabulary {
	fn default() -> Self {
		fn terms(values: &[&str]) -> Vec<String> {
			values.iter().map(|value| (*value).to_owned()).collect()
		}

		Self {
			success: terms(&["completed", "complete", "success"]),
			failure: terms(&["failed", "error", "cancelled", "canceled"]),
			continuing: terms(&[
				"pending",
				"queued",
				"running",
				"in_progress",
				"processing",
				"scanning",
				"started",
			]),
		}
	}
}

/// Status payload returned by the scan status endpoint.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct StatusReport {
	/// Raw status string.
	pub status: String,
	/// Progress counters; non-numeric members are dropped.
	#[serde(default, deserialize_with = "numeric_fields")]
	pub progress: ProgressFields,
	/// Human-readable message, typically set on failure.
	#[serde(default)]
	pub message: Option<String>,
}
impl StatusReport {
	/// Creates a report with only a status string.
	pub fn new(status: impl Into<String>) -> Self {
		Self { status: status.into(), ..Default::default() }
	}
}

fn numeric_fields<'de, D>(deserializer: D) -> Result<ProgressFields, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let raw = Option::<serde_json::Map<String, serde_json::Value>>::deserialize(deserializer)?;

	Ok(raw
		.into_iter()
		.flatten()
		.filter_map(|(name, value)| match value {
			serde_json::Value::Number(number) => Some((name, number)),
			_ => None,
		})
		.collect())
}
