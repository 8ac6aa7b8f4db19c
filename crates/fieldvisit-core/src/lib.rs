//! Draft persistence engine for the field-visit wizard.
//!
//! This crate holds the pure form-tree algorithms (path addressing,
//! attachment extraction, merge, completeness), the storage "ports" that the
//! infrastructure layer implements, and the services built on them
//! (`DraftService`, `AutosaveCoordinator`). It depends only on
//! `fieldvisit-types` -- never on `fieldvisit-infra` or any database crate.

pub mod repository;
pub mod service;
pub mod storage;
pub mod tree;

#[cfg(test)]
mod test_support;
