//! Completion estimate for a form tree.
//!
//! Every non-reserved key is one unit of work:
//! - arrays are filled when non-empty
//! - nested objects are recursed into (and contribute their own units) until
//!   the depth ceiling, below which they count as one unit filled when
//!   non-empty
//! - scalars are filled unless they are `null`, `""` or `false`
//!
//! `false` counts as unfilled on purpose: most wizard questions are yes/no
//! toggles that default to `false`.

use fieldvisit_types::form::{FormMap, FormValue};

/// Default depth ceiling for [`score`].
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Metadata keys that never count towards completion. Keys starting with
/// `_` are reserved as well.
pub const RESERVED_KEYS: &[&str] = &[
    "id",
    "draftId",
    "farmId",
    "userId",
    "createdAt",
    "updatedAt",
    "currentStep",
];

/// Filled and total unit counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Completeness {
    pub filled: u32,
    pub total: u32,
}

impl Completeness {
    /// Rounded percentage in `[0, 100]`; `0` when there is nothing to fill.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let filled = u64::from(self.filled.min(self.total));
        let total = u64::from(self.total);
        // round-half-up of 100 * filled / total
        let percent = (200 * filled + total) / (2 * total);
        percent.min(100) as u8
    }

    fn add_unit(&mut self, filled: bool) {
        self.total += 1;
        if filled {
            self.filled += 1;
        }
    }
}

pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with('_') || RESERVED_KEYS.contains(&key)
}

/// Score `tree`. Non-object roots score `0/0`.
pub fn score(tree: &FormValue, max_depth: usize) -> Completeness {
    let mut acc = Completeness::default();
    if let Some(map) = tree.as_object() {
        score_object(map, 0, max_depth, &mut acc);
    }
    acc
}

fn score_object(map: &FormMap, depth: usize, max_depth: usize, acc: &mut Completeness) {
    for (key, value) in map {
        if is_reserved_key(key) {
            continue;
        }
        match value {
            FormValue::Object(child) if depth < max_depth => {
                score_object(child, depth + 1, max_depth, acc)
            }
            FormValue::Object(child) => acc.add_unit(!child.is_empty()),
            FormValue::Array(items) => acc.add_unit(!items.is_empty()),
            scalar => acc.add_unit(is_filled_scalar(scalar)),
        }
    }
}

fn is_filled_scalar(value: &FormValue) -> bool {
    match value {
        FormValue::Null | FormValue::Bool(false) => false,
        FormValue::String(s) => !s.is_empty(),
        _ => true,
    }
}
