//! Compliance scan endpoints: launching scans and reading their status.

// self
use crate::{
	_prelude::*,
	client::{ApiClient, ApiRequest},
	jobs::{Job, JobRegistry, SessionId, StatusFuture, StatusReport, StatusSource},
	obs,
};

#[derive(Serialize)]
struct StartScanBody<'a> {
	url: &'a str,
}

#[derive(Deserialize)]
struct StartScanReply {
	session_id: SessionId,
}

/// Scan API on top of the authenticated pipeline.
///
/// Status polling goes through the same pipeline, so a poll that hits an expired session
/// triggers the usual refresh-then-retry policy.
#[derive(Clone, Debug)]
pub struct ScannerApi {
	client: ApiClient,
}
impl ScannerApi {
	/// Wraps an authenticated client.
	pub fn new(client: ApiClient) -> Self {
		Self { client }
	}

	/// Starts a scan of `target_url` and returns the backend's session id.
	pub async fn start_scan(&self, target_url: &str) -> Result<SessionId> {
		let path = &self.client.config().endpoints.scan;
		let reply: StartScanReply =
			self.client.post_json(path, &StartScanBody { url: target_url }).await?;

		obs::event!(info, session_id = %reply.session_id, target_url, "scan started");

		Ok(reply.session_id)
	}

	/// Starts a scan and tracks it in `registry`; a running orchestrator picks it up from there.
	pub async fn launch(&self, registry: &JobRegistry, target_url: &str) -> Result<Job> {
		let session_id = self.start_scan(target_url).await?;
		let job = Job::new(session_id, target_url);

		registry.add_job(job.clone())?;

		Ok(job)
	}

	/// Fetches the current status of a scan.
	pub async fn status(&self, session_id: &SessionId) -> Result<StatusReport> {
		let endpoints = &self.client.config().endpoints;
		let request = ApiRequest::get(endpoints.scan_status.as_str())
			.query(endpoints.scan_session_param.as_str(), session_id.as_ref());

		Ok(self.client.send(request).await?.json()?)
	}
}
impl StatusSource for ScannerApi {
	fn fetch_status<'a>(&'a self, session_id: &'a SessionId) -> StatusFuture<'a> {
		Box::pin(self.status(session_id))
	}
}
