//! Shared domain types for the field-visit draft engine.
//!
//! This crate contains the value model of an in-progress wizard session
//! (`FormValue`, `Attachment`), the persisted `Draft` record and its key,
//! engine configuration, and the error types shared by every layer.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror, base64.

pub mod config;
pub mod draft;
pub mod error;
pub mod form;
