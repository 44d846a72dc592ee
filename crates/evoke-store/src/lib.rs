#![deny(missing_docs)]
#![doc = "Artifact store mapping structured keys to derivative paths."]

/// Structured artifact keys and their path encoding.
pub mod key;
/// Canonical hashing helpers.
pub mod hash;
/// Canonical JSON and bincode helpers.
pub mod serde;
/// Filesystem store with atomic writes.
pub mod store;

pub use hash::{content_hash, stable_hash_string};
pub use key::{ArtifactKey, GroupKey};
pub use store::ArtifactStore;
