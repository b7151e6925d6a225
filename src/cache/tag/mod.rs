//! Tag-version storage and memoisation
//!
//! Tags are invalidated by deleting their version record, never by
//! overwriting it; items validate themselves against the versions they
//! were saved with.

pub(crate) mod known_versions;
pub(crate) mod version_store;

pub(crate) use known_versions::KnownTagVersions;
pub(crate) use version_store::TagVersionStore;
