//! Durable key-value storage contracts and built-in backends.
//!
//! Every component that persists state (credentials, the job table) goes through
//! [`KeyValueStore`]. Writes are expressed as a [`WriteBatch`] so multi-key updates land
//! all-or-nothing.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::_prelude::*;

/// Storage backend contract shared by the credential store and the job registry.
pub trait KeyValueStore
where
	Self: Send + Sync,
{
	/// Reads every key in `keys` from one consistent snapshot.
	///
	/// The result is positional: entry `i` holds the value stored under `keys[i]`. No batch
	/// applied concurrently may be partially visible in the result.
	fn get_many(&self, keys: &[&str]) -> Result<Vec<Option<String>>, StoreError>;

	/// Applies every operation in `batch` atomically.
	fn apply(&self, batch: WriteBatch) -> Result<(), StoreError>;

	/// Reads the value stored under `key`, if present.
	fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.get_many(&[key])?.pop().flatten())
	}

	/// Stores a single value.
	fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
		self.apply(WriteBatch::new().set(key, value))
	}

	/// Removes a single value.
	fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.apply(WriteBatch::new().remove(key))
	}
}

/// Single mutation inside a [`WriteBatch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
	/// Inserts or replaces `key`.
	Set {
		/// Storage key.
		key: String,
		/// Serialized value.
		value: String,
	},
	/// Deletes `key` if present.
	Remove {
		/// Storage key.
		key: String,
	},
}

/// Ordered list of writes applied as one unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch(Vec<WriteOp>);
impl WriteBatch {
	/// Creates an empty batch.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a set operation.
	pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.0.push(WriteOp::Set { key: key.into(), value: value.into() });

		self
	}

	/// Appends a remove operation.
	pub fn remove(mut self, key: impl Into<String>) -> Self {
		self.0.push(WriteOp::Remove { key: key.into() });

		self
	}

	/// Returns `true` when the batch carries no operations.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Applies the batch to an in-memory map.
	pub(crate) fn apply_to(self, map: &mut HashMap<String, String>) {
		for op in self.0 {
			match op {
				WriteOp::Set { key, value } => {
					map.insert(key, value);
				},
				WriteOp::Remove { key } => {
					map.remove(&key);
				},
			}
		}
	}
}
impl IntoIterator for WriteBatch {
	type IntoIter = std::vec::IntoIter<WriteOp>;
	type Item = WriteOp;

	fn into_iter(self) -> Self::IntoIter {
		self.0.into_iter()
	}
}

/// Error type produced by [`KeyValueStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend or by callers encoding values.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
