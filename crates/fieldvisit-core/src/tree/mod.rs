//! Pure, synchronous algorithms over `FormValue` trees.
//!
//! - `path`: dotted/indexed addressing (`a.b[2].c`)
//! - `blobs`: split attachments out of a tree and put them back
//! - `merge`: object-recursive deep merge of partial updates
//! - `completeness`: filled/total leaf scoring

pub mod blobs;
pub mod completeness;
pub mod merge;
pub mod path;
