//! SQLite storage layer.
//!
//! Both draft tiers live in one SQLite database (WAL mode, split read/write
//! pools): `drafts` for metadata and `draft_attachments` for blobs.

pub mod attachment;
pub mod draft;
pub mod pool;
