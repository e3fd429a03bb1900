//! Cancellable scheduled tasks.

// crates.io
use tokio::{runtime::Handle, task::JoinHandle};
use tokio_util::sync::CancellationToken;
// self
use crate::_prelude::*;

/// Handle to a spawned background task that can be cancelled deterministically.
///
/// The task receives a [`CancellationToken`] and must stop at its next suspension point once the
/// token fires. Dropping the handle cancels the task.
#[derive(Debug)]
pub struct TaskHandle {
	token: CancellationToken,
	join: JoinHandle<()>,
}
impl TaskHandle {
	/// Spawns `task` on `runtime`.
	pub fn spawn<F, Fut>(runtime: &Handle, task: F) -> Self
	where
		F: FnOnce(CancellationToken) -> Fut,
		Fut: 'static + Future<Output = ()> + Send,
	{
		let token = CancellationToken::new();
		let join = runtime.spawn(task(token.clone()));

		Self { token, join }
	}

	/// Requests cancellation; the task never runs another tick afterwards.
	pub fn cancel(&self) {
		self.token.cancel();
	}

	/// Returns `true` once [`TaskHandle::cancel`] was called.
	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}

	/// Returns `true` once the task has returned.
	pub fn is_finished(&self) -> bool {
		self.join.is_finished()
	}
}
impl Drop for TaskHandle {
	fn drop(&mut self) {
		self.token.cancel();
	}
}

/// Sleeps for `delay` unless `token` fires first; returns `false` when cancelled.
pub async fn sleep_or_cancel(token: &CancellationToken, delay: StdDuration) -> bool {
	tokio::select! {
		biased;
		_ = token.cancelled() => false,
		_ = tokio::time::sleep(delay) => true,
	}
}
