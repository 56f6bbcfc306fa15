//! Bar Store
//!
//! An ordered run of [`Bar`]s over `[0, max_index]`. After every
//! [`Detector::insert_bar`] the bars are sorted, non-overlapping, contiguous
//! and coalesced: no two neighbours share a kind. Range queries depend on
//! that last property, since a filled range split across two touching
//! `Filled` bars would otherwise read as a hole.

use crate::bar::{Bar, BarKind};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detector {
    bars: Vec<Bar>,
    max_index: i64,
}

impl Detector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from previously persisted bars without normalising them.
    ///
    /// Callers should check [`Detector::is_valid`] before trusting the result.
    pub fn from_bars(bars: Vec<Bar>) -> Self {
        let max_index = bars.iter().map(|b| b.max).max().unwrap_or(0);
        Self { bars, max_index }
    }

    /// Decode a persisted bar list. An empty blob is an empty store.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        if bytes.is_empty() {
            return Ok(Self::new());
        }
        let bars: Vec<Bar> = serde_json::from_slice(bytes)?;
        Ok(Self::from_bars(bars))
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.bars)
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn max_index(&self) -> i64 {
        self.max_index
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    // ==================== Mutation ====================

    /// Overwrite `[bar.min, bar.max]` with `bar.kind`.
    ///
    /// Bars partially covered are split, the domain grows with a `Hole` when
    /// `bar.max` passes `max_index`, and same-kind neighbours are merged.
    /// A bar with `min > max` is ignored.
    pub fn insert_bar(&mut self, bar: Bar) {
        if bar.min > bar.max {
            return;
        }

        self.bars.sort_by_key(|b| b.min);
        if let Some(tail) = self.bars.last().map(|b| b.max) {
            if bar.max > tail {
                self.bars.push(Bar::hole(tail.saturating_add(1), bar.max));
            }
        }

        let old_bars = std::mem::take(&mut self.bars);
        let mut rebuilt = Vec::with_capacity(old_bars.len() + 2);
        let mut placed = false;

        for old in old_bars {
            if old.max < bar.min {
                push_coalesced(&mut rebuilt, old);
                continue;
            }
            if !placed {
                if old.min < bar.min {
                    push_coalesced(&mut rebuilt, Bar::new(old.min, bar.min - 1, old.kind));
                }
                push_coalesced(&mut rebuilt, bar);
                placed = true;
            }
            if old.max > bar.max {
                let start = old.min.max(bar.max + 1);
                push_coalesced(&mut rebuilt, Bar::new(start, old.max, old.kind));
            }
        }
        if !placed {
            push_coalesced(&mut rebuilt, bar);
        }

        self.max_index = rebuilt.last().map_or(0, |b| b.max);
        self.bars = rebuilt;
    }

    /// Mark everything past `max_index` up to `pt` as filled.
    ///
    /// Returns false (and changes nothing) when `pt` is already inside the domain.
    pub fn set_upper_filled(&mut self, pt: i64) -> bool {
        if pt <= self.max_index {
            return false;
        }
        self.insert_bar(Bar::filled(self.max_index + 1, pt));
        true
    }

    /// Extend the lowest `Filled` bar down to 0.
    ///
    /// Used once the oldest message of a conversation has been reached. Holes
    /// between later `Filled` bars are left alone.
    pub fn set_lower_filled(&mut self) {
        let first = self.bars.iter().find(|b| b.is_filled()).copied();
        if let Some(first) = first {
            if first.min != 0 {
                self.insert_bar(Bar::filled(0, first.min));
            }
        }
    }

    // ==================== Queries ====================

    /// True iff one `Filled` bar covers all of `[min, max]`.
    pub fn is_range_filled(&self, min: i64, max: i64) -> bool {
        self.bars
            .iter()
            .any(|b| b.is_filled() && b.contains_range(min, max))
    }

    /// True if `pt` falls in a `Hole` bar or outside the domain.
    pub fn is_point_hole(&self, pt: i64) -> bool {
        match self.bar_at(pt) {
            Some(b) => b.kind == BarKind::Hole,
            None => true,
        }
    }

    /// The filled run from `pt` upward: `[pt, bar.max]`.
    pub fn upper_filled(&self, pt: i64) -> Option<Bar> {
        self.bar_at(pt)
            .filter(|b| b.is_filled())
            .map(|b| Bar::filled(pt, b.max))
    }

    /// The filled run from `pt` downward: `[bar.min, pt]`.
    pub fn lower_filled(&self, pt: i64) -> Option<Bar> {
        self.bar_at(pt)
            .filter(|b| b.is_filled())
            .map(|b| Bar::filled(b.min, pt))
    }

    /// Well-formed bars with strictly increasing, non-overlapping bounds.
    pub fn is_valid(&self) -> bool {
        self.bars.iter().all(|b| b.min <= b.max)
            && self.bars.windows(2).all(|w| w[0].max < w[1].min)
    }

    fn bar_at(&self, pt: i64) -> Option<&Bar> {
        self.bars.iter().find(|b| b.contains(pt))
    }
}

/// Append `bar` after the current tail, clipping any overlap, bridging a gap
/// with a `Hole`, and merging into the tail when the kinds match.
fn push_coalesced(bars: &mut Vec<Bar>, mut bar: Bar) {
    let start = bars
        .last()
        .map_or(bar.min.min(0), |last| last.max.saturating_add(1));
    if bar.min < start {
        bar.min = start;
    }
    if bar.min > bar.max {
        return;
    }
    if bar.min > start {
        merge_tail(bars, Bar::hole(start, bar.min - 1));
    }
    merge_tail(bars, bar);
}

fn merge_tail(bars: &mut Vec<Bar>, bar: Bar) {
    match bars.last_mut() {
        Some(last) if last.kind == bar.kind => last.max = bar.max,
        _ => bars.push(bar),
    }
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bar in &self.bars {
            write!(f, "{}", bar)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(ranges: &[(i64, i64)]) -> Detector {
        let mut d = Detector::new();
        for &(min, max) in ranges {
            d.insert_bar(Bar::filled(min, max));
        }
        d
    }

    #[test]
    fn test_empty_store_seeds_leading_hole() {
        let d = filled(&[(10, 13)]);
        assert_eq!(d.to_string(), "[H: 0 - 9][F: 10 - 13]");
        assert_eq!(d.max_index(), 13);
    }

    #[test]
    fn test_bar_from_zero_has_no_leading_hole() {
        let d = filled(&[(0, 5)]);
        assert_eq!(d.bars(), &[Bar::filled(0, 5)]);
    }

    #[test]
    fn test_touching_fills_coalesce() {
        let d = filled(&[(10, 11), (11, 13), (15, 16), (17, 19)]);
        assert!(!d.is_range_filled(10, 14));
        assert_eq!(d.lower_filled(16), Some(Bar::filled(15, 16)));
        assert_eq!(
            d.to_string(),
            "[H: 0 - 9][F: 10 - 13][H: 14 - 14][F: 15 - 19]"
        );
    }

    #[test]
    fn test_out_of_order_fills() {
        let d = filled(&[(6, 8), (19, 20), (12, 12), (12, 12), (15, 15), (13, 14)]);
        assert_eq!(d.lower_filled(21), None);
        assert_eq!(d.upper_filled(12), Some(Bar::filled(12, 15)));
        assert!(d.is_point_hole(10));
        assert!(!d.is_point_hole(14));
    }

    #[test]
    fn test_overlapping_fills_near_the_top() {
        let d = filled(&[(12, 12), (101, 120), (110, 120), (140, 141), (141, 142), (143, 143)]);
        assert_eq!(d.lower_filled(141), Some(Bar::filled(140, 141)));
        assert_eq!(d.upper_filled(120), Some(Bar::filled(120, 120)));
        assert_eq!(d.max_index(), 143);
    }

    #[test]
    fn test_fills_below_existing_domain() {
        let d = filled(&[
            (1001, 1001),
            (800, 900),
            (700, 850),
            (700, 799),
            (701, 799),
            (701, 801),
            (100, 699),
        ]);
        assert_eq!(d.upper_filled(700), Some(Bar::filled(700, 900)));
        assert!(d.is_point_hole(950));
        assert!(d.is_range_filled(100, 900));
    }

    #[test]
    fn test_fill_bridging_two_filled_runs() {
        let d = filled(&[(1001, 1001), (400, 500), (600, 700), (399, 699)]);
        assert_eq!(d.upper_filled(699), Some(Bar::filled(699, 700)));
        assert!(d.is_range_filled(399, 700));
    }

    #[test]
    fn test_reinsert_is_idempotent() {
        let once = filled(&[(5, 9), (20, 30)]);
        let twice = filled(&[(5, 9), (20, 30), (20, 30)]);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_hole_overwrites_filled_range() {
        let mut d = filled(&[(0, 100)]);
        d.insert_bar(Bar::hole(40, 60));
        assert_eq!(d.to_string(), "[F: 0 - 39][H: 40 - 60][F: 61 - 100]");
    }

    #[test]
    fn test_inverted_bar_is_ignored() {
        let mut d = filled(&[(3, 4)]);
        let before = d.clone();
        d.insert_bar(Bar::filled(9, 2));
        assert_eq!(d, before);
    }

    #[test]
    fn test_points_outside_domain_are_holes() {
        let d = filled(&[(10, 20)]);
        assert!(d.is_point_hole(21));
        assert!(d.is_point_hole(-1));
        assert_eq!(d.upper_filled(25), None);
    }

    #[test]
    fn test_set_upper_filled() {
        let mut d = filled(&[(10, 20)]);
        assert!(!d.set_upper_filled(15));
        assert!(d.set_upper_filled(30));
        assert_eq!(d.upper_filled(10), Some(Bar::filled(10, 30)));
        assert_eq!(d.max_index(), 30);
    }

    #[test]
    fn test_set_lower_filled_extends_only_lowest_run() {
        let mut d = filled(&[(10, 20), (30, 40)]);
        d.set_lower_filled();
        assert_eq!(d.to_string(), "[F: 0 - 20][H: 21 - 29][F: 30 - 40]");

        let mut empty = Detector::new();
        empty.set_lower_filled();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_validity() {
        assert!(Detector::new().is_valid());
        assert!(filled(&[(3, 9), (15, 18)]).is_valid());
        assert!(!Detector::from_bars(vec![Bar::filled(9, 3)]).is_valid());
        assert!(!Detector::from_bars(vec![Bar::filled(0, 10), Bar::hole(5, 20)]).is_valid());
        assert!(!Detector::from_bars(vec![Bar::hole(5, 9), Bar::filled(0, 4)]).is_valid());
    }

    #[test]
    fn test_json_round_trip_and_empty_blob() {
        let d = filled(&[(2, 4), (8, 8)]);
        let bytes = d.to_json().unwrap();
        assert_eq!(Detector::from_json(&bytes).unwrap(), d);
        assert!(Detector::from_json(&[]).unwrap().is_empty());
        assert!(Detector::from_json(b"{not json").is_err());
    }

    #[test]
    fn test_insert_into_gapped_store_bridges_with_hole() {
        // Persisted stores only need to pass is_valid(), which allows gaps.
        let mut d = Detector::from_bars(vec![Bar::filled(0, 3), Bar::filled(10, 12)]);
        d.insert_bar(Bar::filled(20, 21));
        assert_eq!(
            d.to_string(),
            "[F: 0 - 3][H: 4 - 9][F: 10 - 12][H: 13 - 19][F: 20 - 21]"
        );
    }

    // ==================== Properties ====================

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn bar_strategy() -> impl Strategy<Value = Bar> {
            (0i64..300, 0i64..40, any::<bool>()).prop_map(|(min, len, is_filled)| {
                let kind = if is_filled { BarKind::Filled } else { BarKind::Hole };
                Bar::new(min, min + len, kind)
            })
        }

        fn build(bars: &[Bar]) -> Detector {
            let mut d = Detector::new();
            for bar in bars {
                d.insert_bar(*bar);
            }
            d
        }

        proptest! {
            #[test]
            fn bars_stay_contiguous_and_coalesced(bars in prop::collection::vec(bar_strategy(), 1..40)) {
                let d = build(&bars);
                let list = d.bars();
                prop_assert!(d.is_valid());
                prop_assert_eq!(list[0].min, 0);
                prop_assert_eq!(list[list.len() - 1].max, d.max_index());
                for w in list.windows(2) {
                    prop_assert_eq!(w[0].max + 1, w[1].min);
                    prop_assert_ne!(w[0].kind, w[1].kind);
                }
            }

            #[test]
            fn last_insert_wins(bars in prop::collection::vec(bar_strategy(), 1..40)) {
                let d = build(&bars);
                for pt in 0..=d.max_index() {
                    let covering = d.bars().iter().filter(|b| b.contains(pt)).count();
                    prop_assert_eq!(covering, 1);
                    let expected = bars
                        .iter()
                        .rev()
                        .find(|b| b.contains(pt))
                        .map_or(BarKind::Hole, |b| b.kind);
                    prop_assert_eq!(d.is_point_hole(pt), expected == BarKind::Hole);
                }
            }

            #[test]
            fn refill_is_idempotent(bars in prop::collection::vec(bar_strategy(), 1..20), extra in bar_strategy()) {
                let fill = Bar::filled(extra.min, extra.max);
                let mut once = build(&bars);
                once.insert_bar(fill);
                let mut twice = once.clone();
                twice.insert_bar(fill);
                prop_assert_eq!(once, twice);
            }

            #[test]
            fn range_filled_matches_pointwise(bars in prop::collection::vec(bar_strategy(), 1..20), a in 0i64..350, len in 0i64..30) {
                let d = build(&bars);
                let b = a + len;
                let pointwise = (a..=b).all(|pt| !d.is_point_hole(pt));
                prop_assert_eq!(d.is_range_filled(a, b), pointwise);
            }
        }
    }
}
