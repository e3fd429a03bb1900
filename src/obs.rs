//! Optional observability helpers.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (default) to emit spans named `compliance_client.op` with the `op` and
//!   `stage` fields, plus the crate's diagnostic events.
//! - Enable `metrics` to increment the `compliance_client_operation_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`.

mod counters;
mod spans;

pub use counters::*;
pub use spans::*;

pub(crate) use spans::event;

// self
use crate::_prelude::*;

/// Operations observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
	/// Authenticated API request through the pipeline.
	Request,
	/// Credential renewal.
	Refresh,
	/// Session guard verification.
	SessionGuard,
	/// Credential exchange.
	Login,
	/// Logout.
	Logout,
	/// Single job status poll.
	Poll,
}
impl OperationKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OperationKind::Request => "request",
			OperationKind::Refresh => "refresh",
			OperationKind::SessionGuard => "session_guard",
			OperationKind::Login => "login",
			OperationKind::Logout => "logout",
			OperationKind::Poll => "poll",
		}
	}
}
impl Display for OperationKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OperationOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OperationOutcome::Attempt => "attempt",
			OperationOutcome::Success => "success",
			OperationOutcome::Failure => "failure",
		}
	}
}
impl Display for OperationOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
