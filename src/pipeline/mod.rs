//! Pipeline entry points for harvester operations.
//!
//! - `clean`: batch cleaning stages (dedupe, windows, text normalization)
//! - `normalize`: the text-transform collaborator
//! - `run`: end-to-end fetch, clean, persist, verify

pub mod clean;
pub mod normalize;
pub mod run;

pub use clean::{Cleaner, dedupe_by_key, filter_by_date, filter_by_score, filter_custom};
pub use normalize::TextNormalizer;
pub use run::{RunSummary, run_harvest};
