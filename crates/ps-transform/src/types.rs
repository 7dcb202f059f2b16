//! Geometry and page-list value types.
//!
//! Everything here is a plain value: the parsers build these once and the
//! transform back ends read them, so the same specs and page list can be
//! replayed across every modulo block of the output.

use std::fmt;

use crate::error::{Result, TransformError};

/// A page rectangle in PostScript points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rectangle {
    pub width: f64,
    pub height: f64,
}

impl Rectangle {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// The same sheet turned 90 degrees.
    pub fn rotated(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} pt", self.width, self.height)
    }
}

/// A translation in points.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Offset {
    pub x: f64,
    pub y: f64,
}

impl Offset {
    pub const ZERO: Offset = Offset { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One page-transform descriptor within a slot.
///
/// `rotate` is kept normalized to `[0, 360)` and `hflip`/`vflip` are never
/// both set: the parser collapses a combined flip into a 180-degree rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PageSpec {
    /// Index counted from the end of the current modulo block.
    pub reversed: bool,
    /// Page index within the modulo block; `0 <= pageno < modulo`.
    pub pageno: usize,
    /// Counterclockwise rotation in degrees, normalized to `[0, 360)`.
    pub rotate: i32,
    pub hflip: bool,
    pub vflip: bool,
    pub scale: f64,
    pub off: Offset,
}

impl Default for PageSpec {
    fn default() -> Self {
        Self {
            reversed: false,
            pageno: 0,
            rotate: 0,
            hflip: false,
            vflip: false,
            scale: 1.0,
            off: Offset::ZERO,
        }
    }
}

impl PageSpec {
    /// True iff applying this spec changes the page at all.
    pub fn has_transform(&self) -> bool {
        self.rotate != 0
            || self.hflip
            || self.vflip
            || self.scale != 1.0
            || self.off != Offset::ZERO
    }
}

/// One output-page position: the ordered page specs composited onto it.
pub type Slot = Vec<PageSpec>;

/// Document-wide rotation and scaling folded into every page spec when a
/// transform is constructed. Replaces ambient global state.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlobalTransform {
    pub rotate: i32,
    pub scale: f64,
}

impl Default for GlobalTransform {
    fn default() -> Self {
        Self {
            rotate: 0,
            scale: 1.0,
        }
    }
}

impl GlobalTransform {
    /// Combine this global transform with every spec in `slots`.
    pub fn fold(&self, mut slots: Vec<Slot>) -> Vec<Slot> {
        if self.rotate == 0 && self.scale == 1.0 {
            return slots;
        }
        for slot in &mut slots {
            for spec in slot {
                spec.rotate = (spec.rotate + self.rotate).rem_euclid(360);
                spec.scale *= self.scale;
            }
        }
        slots
    }
}

/// A page interval as written by the user. `start`/`end` may be negative
/// (end-relative) until resolved against a document; the text `_` denotes an
/// inserted blank page.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub start: i64,
    pub end: i64,
    pub text: String,
}

impl Range {
    pub fn is_blank(&self) -> bool {
        self.text == "_"
    }
}

/// The resolved, ordered sequence of zero-based source-page indices.
///
/// `None` entries are inserted blank pages. Positions past the end of the
/// list also resolve to blank, so the writers treat "ran out of pages" and
/// "explicit blank" identically.
#[derive(Debug, Clone)]
pub struct PageList {
    pages: Vec<Option<usize>>,
}

impl PageList {
    /// Resolve `ranges` against a document of `total_pages` pages.
    ///
    /// End-relative bounds (negative after parsing) count backward from the
    /// last page and are clamped to page 1. Each range is walked inclusively
    /// in whichever direction `end` lies from `start`; the odd/even filter
    /// applies before `reverse` flips the assembled list as a whole.
    pub fn new(
        total_pages: usize,
        ranges: &[Range],
        reverse: bool,
        odd: bool,
        even: bool,
    ) -> Result<Self> {
        let abs_page = |n: i64| -> i64 {
            if n < 0 {
                (n + total_pages as i64 + 1).max(1)
            } else {
                n
            }
        };

        let mut pages = Vec::new();
        for range in ranges {
            let start = abs_page(range.start);
            let end = abs_page(range.end);
            let inc: i64 = if end < start { -1 } else { 1 };
            let mut current = start;
            while end - current != -inc {
                if current > total_pages as i64 {
                    return Err(TransformError::PageRangeInvalid(range.text.clone()));
                }
                let filtered = (odd && !even && current % 2 == 0)
                    || (even && !odd && current % 2 == 1);
                if !filtered {
                    // A blank range walks through as page 0, stored as the
                    // blank sentinel.
                    pages.push(if current > 0 {
                        Some(current as usize - 1)
                    } else {
                        None
                    });
                }
                current += inc;
            }
        }
        if reverse {
            pages.reverse();
        }
        Ok(Self { pages })
    }

    /// The source page at output position `index`, or `None` for a blank.
    pub fn real_page(&self, index: usize) -> Option<usize> {
        self.pages.get(index).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: i64, end: i64, text: &str) -> Range {
        Range {
            start,
            end,
            text: text.to_string(),
        }
    }

    #[test]
    fn end_relative_range_resolves_backward_from_last_page() {
        // `_5-_1` on a 20-page document: the last five pages in order.
        let list =
            PageList::new(20, &[range(-5, -1, "_5-_1")], false, false, false).unwrap();
        let pages: Vec<_> = (0..list.len()).map(|i| list.real_page(i)).collect();
        assert_eq!(
            pages,
            vec![Some(15), Some(16), Some(17), Some(18), Some(19)]
        );
    }

    #[test]
    fn even_filter_keeps_even_numbered_pages() {
        let list = PageList::new(20, &[range(1, 5, "1-5")], false, false, true).unwrap();
        let pages: Vec<_> = (0..list.len()).map(|i| list.real_page(i)).collect();
        assert_eq!(pages, vec![Some(1), Some(3)]);
    }

    #[test]
    fn out_of_range_walk_fails_with_the_original_text() {
        let err = PageList::new(20, &[range(1, 25, "1-25")], false, false, false)
            .unwrap_err();
        assert!(matches!(err, TransformError::PageRangeInvalid(t) if t == "1-25"));
    }

    #[test]
    fn descending_range_walks_backward() {
        let list = PageList::new(10, &[range(3, 1, "3-1")], false, false, false).unwrap();
        let pages: Vec<_> = (0..list.len()).map(|i| list.real_page(i)).collect();
        assert_eq!(pages, vec![Some(2), Some(1), Some(0)]);
    }

    #[test]
    fn blank_range_inserts_sentinel() {
        let list = PageList::new(10, &[range(1, 1, "1"), range(0, 0, "_")], false, false, false)
            .unwrap();
        assert_eq!(list.real_page(0), Some(0));
        assert_eq!(list.real_page(1), None);
        // Past the end of the list is also blank.
        assert_eq!(list.real_page(2), None);
    }

    #[test]
    fn reverse_flips_the_whole_assembled_list() {
        let list = PageList::new(4, &[range(1, -1, "1-_1")], true, false, false).unwrap();
        let pages: Vec<_> = (0..list.len()).map(|i| list.real_page(i)).collect();
        assert_eq!(pages, vec![Some(3), Some(2), Some(1), Some(0)]);
    }

    #[test]
    fn global_transform_folds_into_specs() {
        let slots = vec![vec![PageSpec {
            rotate: 270,
            scale: 2.0,
            ..Default::default()
        }]];
        let folded = GlobalTransform {
            rotate: 180,
            scale: 0.5,
        }
        .fold(slots);
        assert_eq!(folded[0][0].rotate, 90);
        assert_eq!(folded[0][0].scale, 1.0);
    }
}
