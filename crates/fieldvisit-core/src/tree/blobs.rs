//! Attachment extraction and restoration.
//!
//! The metadata tier only ever sees a "clean" tree in which every
//! attachment leaf has been replaced by `Null`. The attachments themselves
//! travel separately as a flat `path -> Attachment` map and are put back at
//! the same paths on load. `restore(extract(t)) == t` for every tree.

use std::collections::BTreeMap;

use fieldvisit_types::error::PathError;
use fieldvisit_types::form::{Attachment, FormValue};

use super::path;

/// Attachments keyed by their path in the form tree.
pub type BlobMap = BTreeMap<String, Attachment>;

/// A tree split into its JSON-safe part and its attachments.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub clean: FormValue,
    pub blobs: BlobMap,
}

/// Result of re-injecting attachments into a clean tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Restored {
    pub tree: FormValue,
    /// Paths that could not be installed, with the reason.
    pub skipped: Vec<(String, PathError)>,
}

/// Split every attachment leaf out of `tree`.
pub fn extract(tree: &FormValue) -> Extracted {
    let mut blobs = BlobMap::new();
    let clean = strip(tree, "", &mut blobs);
    Extracted { clean, blobs }
}

fn strip(node: &FormValue, at: &str, blobs: &mut BlobMap) -> FormValue {
    match node {
        FormValue::Attachment(attachment) => {
            blobs.insert(at.to_string(), attachment.clone());
            FormValue::Null
        }
        FormValue::Object(map) => FormValue::Object(
            map.iter()
                .map(|(key, child)| (key.clone(), strip(child, &path::join_key(at, key), blobs)))
                .collect(),
        ),
        FormValue::Array(items) => FormValue::Array(
            items
                .iter()
                .enumerate()
                .map(|(index, child)| strip(child, &path::join_index(at, index), blobs))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Number of attachment leaves anywhere in `tree`.
pub fn count_attachments(tree: &FormValue) -> usize {
    match tree {
        FormValue::Attachment(_) => 1,
        FormValue::Object(map) => map.values().map(count_attachments).sum(),
        FormValue::Array(items) => items.iter().map(count_attachments).sum(),
        _ => 0,
    }
}

/// Put every attachment of `blobs` back into `clean` at its path.
///
/// An empty path addresses the root itself. Paths that cannot be installed
/// (the clean tree now has a scalar where a container is needed) are skipped
/// and reported instead of failing the whole restore.
pub fn restore(clean: FormValue, blobs: &BlobMap) -> Restored {
    let mut tree = clean;
    let mut skipped = Vec::new();

    for (at, attachment) in blobs {
        if at.is_empty() {
            tree = FormValue::Attachment(attachment.clone());
            continue;
        }
        if let Err(err) = path::set(&mut tree, at, FormValue::Attachment(attachment.clone())) {
            tracing::warn!(path = at.as_str(), error = %err, "skipping unrestorable attachment");
            skipped.push((at.clone(), err));
        }
    }

    Restored { tree, skipped }
}
