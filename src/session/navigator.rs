//! Re-authentication signal emitted when a session cannot be restored.

// crates.io
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
// self
use crate::_prelude::*;

/// Reason code carried to the re-authentication entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReauthReason {
	/// Credentials were rejected and could not be refreshed.
	Expired,
	/// The refresh call itself failed.
	RefreshFailed,
	/// No valid session was found on guarded entry.
	Unauthenticated,
	/// The user logged out.
	LoggedOut,
}
impl ReauthReason {
	/// Returns the wire value used in the `reason` query parameter.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Expired => "expired",
			Self::RefreshFailed => "refresh_failed",
			Self::Unauthenticated => "unauthenticated",
			Self::LoggedOut => "logged_out",
		}
	}
}
impl Display for ReauthReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Navigation request towards the re-authentication entry point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReauthRedirect {
	/// Why the session ended.
	pub reason: ReauthReason,
	/// Entry point with the `reason` query parameter appended.
	pub location: Url,
}
impl ReauthRedirect {
	/// Builds a redirect to `entry` carrying `reason`.
	pub fn new(entry: &Url, reason: ReauthReason) -> Self {
		let mut location = entry.clone();

		location.query_pairs_mut().append_pair("reason", reason.as_str());

		Self { reason, location }
	}
}

/// Receives the caller-visible re-authentication signal.
pub trait Navigator
where
	Self: 'static + Send + Sync,
{
	/// Sends the user to the re-authentication entry point.
	fn reauthenticate(&self, redirect: ReauthRedirect);
}

/// [`Navigator`] that forwards redirects over an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelNavigator(UnboundedSender<ReauthRedirect>);
impl ChannelNavigator {
	/// Creates the navigator and the receiving half the presentation layer listens on.
	pub fn channel() -> (Self, UnboundedReceiver<ReauthRedirect>) {
		let (tx, rx) = mpsc::unbounded_channel();

		(Self(tx), rx)
	}
}
impl Navigator for ChannelNavigator {
	fn reauthenticate(&self, redirect: ReauthRedirect) {
		if let Err(e) = self.0.send(redirect) {
			crate::obs::event!(warn, location = %e.0.location, "re-authentication signal dropped; no receiver");
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn redirect_appends_reason_code() {
		let entry = Url::parse("https://app.example.com/login?next=%2Fscans")
			.expect("Entry URL should parse.");
		let redirect = ReauthRedirect::new(&entry, ReauthReason::Expired);

		assert_eq!(redirect.location.as_str(), "https://app.example.com/login?next=%2Fscans&reason=expired");
		assert_eq!(redirect.reason.to_string(), "expired");
	}

	#[tokio::test]
	async fn channel_navigator_delivers_redirects() {
		let (navigator, mut rx) = ChannelNavigator::channel();
		let entry = Url::parse("https://app.example.com/login").expect("Entry URL should parse.");

		navigator.reauthenticate(ReauthRedirect::new(&entry, ReauthReason::Unauthenticated));

		let redirect = rx.recv().await.expect("Redirect should be delivered.");

		assert_eq!(redirect.reason, ReauthReason::Unauthenticated);
	}
}
