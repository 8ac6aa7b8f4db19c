//! Repository trait definitions (ports).
//!
//! These traits define the metadata-tier storage interface that the
//! infrastructure layer (fieldvisit-infra) implements. The core crate never
//! depends on any specific storage technology.

pub mod draft;
