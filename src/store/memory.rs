//! Thread-safe in-memory [`KeyValueStore`] for tests and ephemeral sessions.

// self
use crate::{
	_prelude::*,
	store::{KeyValueStore, StoreError, WriteBatch},
};

type StoreMap = Arc<RwLock<HashMap<String, String>>>;

/// Storage backend that keeps values in-process.
///
/// Clones share the same map, so a clone handed to a second client behaves like a page reload
/// reading the same durable storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Returns every key currently stored, sorted.
	pub fn keys(&self) -> Vec<String> {
		let mut keys: Vec<_> = self.0.read().keys().cloned().collect();

		keys.sort();

		keys
	}
}
impl KeyValueStore for MemoryStore {
	fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError> {
		let map = self.0.read();

		Ok(keys.iter().map(|key| map.get(*key).cloned()).collect())
	}

	fn apply(&self, batch: WriteBatch) -> Result<(), StoreError> {
		batch.apply_to(&mut self.0.write());

		Ok(())
	}
}
