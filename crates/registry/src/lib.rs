//! Document Registry
//!
//! Maps document fingerprints to their owner, registration time, metadata
//! and an optional off-registry storage pointer. Each fingerprint is
//! registered at most once; afterwards only its current owner may hand it
//! to someone else. An owner index answers "what does this account hold"
//! and is kept in step with the records on every mutation.

pub mod backend;
pub mod errors;
pub mod events;
pub mod index;
pub mod registry;
pub mod sled_backend;
pub mod store;

pub use backend::{MemoryBackend, RegistryBackend};
pub use errors::*;
pub use events::RegistryEvent;
pub use registry::{
    DocumentRegistry, RegistryOptions, DEFAULT_EVENT_CAPACITY, DEFAULT_MAX_METADATA_BYTES,
    DEFAULT_MAX_STORAGE_POINTER_BYTES,
};
pub use sled_backend::SledBackend;
