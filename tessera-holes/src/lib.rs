//! Hole Detection
//!
//! Interval bookkeeping that records which ID ranges of a conversation are
//! known to be cached (`Filled`) and which are unknown (`Hole`).
//!
//! ## Layout
//!
//! - [`Detector`]: the bar store for one key, an ordered run of bars covering
//!   `[0, max_index]` with adjacent bars of the same kind always merged.
//! - [`DetectorRegistry`]: lazily loads detectors from a [`HoleStore`], keeps
//!   one lock per key, and resets corrupted stores.
//! - [`UpdateGapDetector`]: the same bars applied to the server update
//!   sequence, deciding when a difference sync is due.

pub mod bar;
pub mod detector;
pub mod registry;
pub mod update_gap;

pub use bar::{Bar, BarKind};
pub use detector::Detector;
pub use registry::{DetectorRegistry, HoleStore, HoleStoreError};
pub use update_gap::{GapCheck, UpdateGapDetector};
