//! Protected-entry gate.

// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialStore},
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
	session::{AuthBackend, Navigator, ReauthReason, ReauthRedirect, RefreshCoordinator},
};

/// Decides whether a protected action may proceed.
///
/// The check runs status, then at most one refresh followed by a second status check. Every
/// failing path clears the stored credential so an invalid token never lingers.
#[derive(Clone)]
pub struct SessionGuard {
	backend: AuthBackend,
	credentials: CredentialStore,
	refresher: RefreshCoordinator,
	navigator: Arc<dyn Navigator>,
}
impl SessionGuard {
	/// Creates a guard sharing the pipeline's refresh coordinator.
	pub fn new(
		backend: AuthBackend,
		credentials: CredentialStore,
		refresher: RefreshCoordinator,
		navigator: Arc<dyn Navigator>,
	) -> Self {
		Self { backend, credentials, refresher, navigator }
	}

	/// Returns `true` when the stored credential is (or could be made) valid.
	pub async fn verify(&self) -> bool {
		const KIND: OperationKind = OperationKind::SessionGuard;

		let span = OperationSpan::new(KIND, "verify_session");

		obs::record_operation_outcome(KIND, OperationOutcome::Attempt);

		let verified = span.instrument(self.verify_inner()).await;

		if verified {
			obs::record_operation_outcome(KIND, OperationOutcome::Success);
		} else {
			obs::record_operation_outcome(KIND, OperationOutcome::Failure);
			self.clear();
		}

		verified
	}

	/// Like [`SessionGuard::verify`], but emits the re-authentication signal and returns
	/// [`Error::SessionInvalid`] when verification fails.
	pub async fn require(&self) -> Result<()> {
		if self.verify().await {
			return Ok(());
		}

		let reason = ReauthReason::Unauthenticated;

		self.navigator.reauthenticate(ReauthRedirect::new(&self.backend.config().reauth_url, reason));

		Err(Error::SessionInvalid { reason })
	}

	async fn verify_inner(&self) -> bool {
		let credential = match self.credentials.get() {
			Ok(Some(credential)) => credential,
			Ok(None) => return false,
			Err(e) => {
				obs::event!(warn, error = %e, "credential store unreadable during session check");

				return false;
			},
		};

		if self.is_authenticated(&credential).await {
			return true;
		}

		match self.refresher.refresh().await {
			Some(renewed) => self.is_authenticated(&renewed).await,
			None => false,
		}
	}

	async fn is_authenticated(&self, credential: &Credential) -> bool {
		match self.backend.status(credential).await {
			Ok(authenticated) => authenticated,
			Err(e) => {
				obs::event!(warn, error = %e, "session status check failed");

				false
			},
		}
	}

	fn clear(&self) {
		if let Err(e) = self.credentials.clear() {
			obs::event!(warn, error = %e, "failed to clear credential after session check");
		}
	}
}
impl Debug for SessionGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionGuard")
			.field("backend", &self.backend)
			.field("refresher", &self.refresher)
			.finish()
	}
}
