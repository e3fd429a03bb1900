//! Advisory staleness states for jobs that have not reported progress recently.

// self
use crate::_prelude::*;

/// Elapsed-time thresholds separating the staleness states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StalenessThresholds {
	/// Silence after which a job is reported as [`Staleness::AwaitingUpdate`].
	pub awaiting_update: StdDuration,
	/// Silence after which a job is reported as [`Staleness::Delayed`].
	pub delayed: StdDuration,
}
impl Default for StalenessThresholds {
	fn default() -> Self {
		Self { awaiting_update: StdDuration::from_secs(20), delayed: StdDuration::from_secs(75) }
	}
}

/// Advisory signal for presentation; never an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Staleness {
	/// Progress arrived recently.
	#[default]
	Fresh,
	/// No update yet, still working.
	AwaitingUpdate,
	/// Taking longer than usual.
	Delayed,
}
impl Staleness {
	/// Classifies the time since the last successful update.
	pub fn classify(since_update: StdDuration, thresholds: &StalenessThresholds) -> Self {
		if since_update >= thresholds.delayed {
			Self::Delayed
		} else if since_update >= thresholds.awaiting_update {
			Self::AwaitingUpdate
		} else {
			Self::Fresh
		}
	}

	/// Stable label for logs and UI copy lookups.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Fresh => "fresh",
			Self::AwaitingUpdate => "awaiting_update",
			Self::Delayed => "delayed",
		}
	}
}
impl Display for Staleness {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn thresholds_partition_elapsed_time() {
		let thresholds = StalenessThresholds::default();

		assert_eq!(Staleness::classify(StdDuration::from_secs(19), &thresholds), Staleness::Fresh);
		assert_eq!(
			Staleness::classify(StdDuration::from_secs(20), &thresholds),
			Staleness::AwaitingUpdate
		);
		assert_eq!(
			Staleness::classify(StdDuration::from_secs(74), &thresholds),
			Staleness::AwaitingUpdate
		);
		assert_eq!(Staleness::classify(StdDuration::from_secs(75), &thresholds), Staleness::Delayed);
	}
}
