//! Update stream gap tracking.
//!
//! Server updates carry a sequence ID. The applied IDs are kept as bars; the
//! watermark is the end of the leading `Filled` run starting at 0, i.e. the
//! highest ID below which nothing is missing.

use crate::bar::Bar;
use crate::detector::Detector;
use tessera_model::UpdateId;

/// Result of checking an incoming container against the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapCheck {
    InSync,
    /// Updates `[from, to]` were never received.
    OutOfSync { from: UpdateId, to: UpdateId },
}

#[derive(Debug, Clone, Default)]
pub struct UpdateGapDetector {
    applied: Detector,
}

impl UpdateGapDetector {
    /// Start with everything up to `watermark` considered applied.
    pub fn new(watermark: UpdateId) -> Self {
        // Update IDs start at 1; slot 0 is always filled.
        let mut gap = Self::default();
        gap.advance_to(watermark.max(0));
        gap
    }

    /// Mark every ID up to `update_id` as applied, e.g. after a difference
    /// sync reported it as its high mark.
    pub fn advance_to(&mut self, update_id: UpdateId) {
        if update_id >= 0 {
            self.applied.insert_bar(Bar::filled(0, update_id));
        }
    }

    pub fn watermark(&self) -> UpdateId {
        match self.applied.bars().first() {
            Some(b) if b.is_filled() && b.min == 0 => b.max,
            _ => 0,
        }
    }

    /// Check a container whose first sequenced update is `min_update_id`.
    /// Containers with no sequenced updates (`0`) are always in sync.
    pub fn check(&self, min_update_id: UpdateId) -> GapCheck {
        let next = self.watermark() + 1;
        if min_update_id > next {
            GapCheck::OutOfSync {
                from: next,
                to: min_update_id - 1,
            }
        } else {
            GapCheck::InSync
        }
    }

    pub fn is_applied(&self, update_id: UpdateId) -> bool {
        update_id > 0 && !self.applied.is_point_hole(update_id)
    }

    pub fn record(&mut self, update_id: UpdateId) {
        if update_id > 0 {
            self.applied.insert_bar(Bar::filled(update_id, update_id));
        }
    }

    /// Missing ranges above the watermark, as seen so far.
    pub fn missing(&self) -> Vec<Bar> {
        let watermark = self.watermark();
        self.applied
            .bars()
            .iter()
            .filter(|b| !b.is_filled() && b.max > watermark)
            .copied()
            .collect()
    }
}
