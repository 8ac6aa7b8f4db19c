//! Deep merge of partial form updates.
//!
//! Rules, per key of the patch:
//! - object over object: recurse
//! - anything else (arrays, scalars, attachments, type mismatch): replace
//!
//! Keys absent from the patch are left untouched, so independently edited
//! wizard sections coexist in one tree. Arrays are replaced wholesale, never
//! spliced. Attachments are their own variant and therefore always replace
//! atomically.

use fieldvisit_types::form::FormValue;

/// Merge `patch` into `base`, returning the merged tree.
pub fn merge(base: FormValue, patch: FormValue) -> FormValue {
    let mut merged = base;
    merge_into(&mut merged, patch);
    merged
}

/// In-place variant of [`merge`].
pub fn merge_into(base: &mut FormValue, patch: FormValue) {
    match (base, patch) {
        (FormValue::Object(base_map), FormValue::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_into(existing, patch_value),
                    None => {
                        base_map.insert(key, patch_value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}
