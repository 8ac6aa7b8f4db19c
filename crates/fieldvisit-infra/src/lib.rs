//! Infrastructure layer for the field-visit draft engine.
//!
//! Implements the storage ports defined in `fieldvisit-core`: the SQLite
//! metadata and attachment tiers, a directory-backed attachment uploader,
//! and the config loader.

pub mod config;
pub mod filesystem;
pub mod sqlite;
