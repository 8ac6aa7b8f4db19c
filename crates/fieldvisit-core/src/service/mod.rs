//! Draft services.
//!
//! `DraftService` owns the draft lifecycle and coordinates the metadata and
//! blob tiers; `AutosaveCoordinator` debounces UI edits into coalesced
//! writes against it.

pub mod autosave;
pub mod clock;
pub mod draft;
