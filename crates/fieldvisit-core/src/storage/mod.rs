//! Storage abstractions for attachments.
//!
//! Defines the blob tier trait and the external upload collaborator used at
//! submission time. Implementations live in fieldvisit-infra (or, for the
//! uploader, in whatever surface owns the network).

pub mod blob_store;
pub mod uploader;
