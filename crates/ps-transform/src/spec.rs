//! Parsers for the page-spec mini-language, page ranges, and dimensions.
//!
//! The grammar (also printed with every parse failure):
//!
//! ```text
//! PAGESPECS = [MODULO:]SPECS
//! SPECS     = SPEC[+SPECS|,SPECS]
//! SPEC      = [-]PAGENO[TRANSFORM...][@SCALE][(XOFF,YOFF)]
//! TRANSFORM = L|R|U|H|V
//!             MODULO > 0; 0 <= PAGENO < MODULO
//! ```
//!
//! A top-level comma starts a new output slot; `+` stacks further pages onto
//! the same slot. Offsets are dimension literals resolved against the output
//! page, so `1w`/`1h` mean one full page width/height.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, TransformError};
use crate::types::{Offset, PageSpec, Range, Rectangle, Slot};

fn term_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(-)?(\d+)([LRUHVlruhv]+)?(?:@([^()]+))?(?:\((-?[0-9.a-z]+),(-?[0-9.a-z]+)\))?$")
            .unwrap()
    })
}

fn range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(_?\d+)?(?:(-)(_?\d+)?)?$").unwrap())
}

fn dimension_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+?)(pt|in|cm|mm|w|h)?$").unwrap())
}

pub const PT_PER_IN: f64 = 72.0;
pub const PT_PER_CM: f64 = 28.346456692913385;
pub const PT_PER_MM: f64 = 2.8346456692913385;

/// Parse a dimension literal: a float with an optional `pt|in|cm|mm|w|h`
/// unit. `w` and `h` multiply by the output page's width/height and require
/// `size` to be known.
pub fn dimension(text: &str, size: Option<Rectangle>) -> Result<f64> {
    let caps = dimension_re()
        .captures(text)
        .ok_or_else(|| TransformError::BadDimension(text.to_string()))?;
    let number: f64 = caps[1]
        .parse()
        .map_err(|_| TransformError::BadDimension(text.to_string()))?;
    let unit = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    match unit {
        "" | "pt" => Ok(number),
        "in" => Ok(number * PT_PER_IN),
        "cm" => Ok(number * PT_PER_CM),
        "mm" => Ok(number * PT_PER_MM),
        "w" => {
            let size = size.ok_or(TransformError::PageSizeNotSet)?;
            Ok(number * size.width)
        }
        "h" => {
            let size = size.ok_or(TransformError::PageSizeNotSet)?;
            Ok(number * size.height)
        }
        _ => unreachable!(),
    }
}

/// Split on commas that are not nested inside parentheses.
fn split_slots(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Parse a page-spec string.
///
/// Returns the slots, the modulo, and whether any spec flips a page (the
/// caller must know the input page size before it can flip).
pub fn parse_specs(
    text: &str,
    size: Option<Rectangle>,
) -> Result<(Vec<Slot>, usize, bool)> {
    let (modulo, specs_text) = match text.split_once(':') {
        Some((modulo_text, rest)) => {
            let modulo: usize = modulo_text
                .parse()
                .map_err(|_| TransformError::BadPageSpec)?;
            (modulo, rest)
        }
        None => (1, text),
    };
    if modulo == 0 {
        return Err(TransformError::BadPageSpec);
    }

    let mut slots = Vec::new();
    let mut flipping = false;
    for slot_text in split_slots(specs_text) {
        let mut slot = Vec::new();
        for term in slot_text.split('+') {
            let caps = term_re()
                .captures(term)
                .ok_or(TransformError::BadPageSpec)?;
            let mut spec = PageSpec {
                reversed: caps.get(1).is_some(),
                pageno: caps[2].parse().map_err(|_| TransformError::BadPageSpec)?,
                ..Default::default()
            };
            if spec.pageno >= modulo {
                return Err(TransformError::BadPageSpec);
            }
            if let Some(scale_text) = caps.get(4) {
                spec.scale = scale_text
                    .as_str()
                    .parse()
                    .map_err(|_| TransformError::BadPageSpec)?;
                if !(spec.scale > 0.0) {
                    return Err(TransformError::BadPageSpec);
                }
            }
            if let (Some(xoff), Some(yoff)) = (caps.get(5), caps.get(6)) {
                spec.off = Offset::new(
                    dimension(xoff.as_str(), size)?,
                    dimension(yoff.as_str(), size)?,
                );
            }
            if let Some(transforms) = caps.get(3) {
                for letter in transforms.as_str().chars() {
                    match letter.to_ascii_uppercase() {
                        'L' => spec.rotate += 90,
                        'R' => spec.rotate -= 90,
                        'U' => spec.rotate += 180,
                        'H' => spec.hflip = !spec.hflip,
                        'V' => spec.vflip = !spec.vflip,
                        _ => unreachable!(),
                    }
                }
            }
            // A combined flip is a 180-degree rotation.
            if spec.hflip && spec.vflip {
                spec.hflip = false;
                spec.vflip = false;
                spec.rotate += 180;
            }
            spec.rotate = spec.rotate.rem_euclid(360);
            flipping |= spec.hflip || spec.vflip;
            slot.push(spec);
        }
        slots.push(slot);
    }
    Ok((slots, modulo, flipping))
}

/// Parse a page-range string: comma-separated ranges, `_` for an inserted
/// blank, a leading `_` on a number counting backward from the last page.
pub fn parse_range(text: &str) -> Result<Vec<Range>> {
    let mut ranges = Vec::new();
    for range_text in text.split(',') {
        if range_text == "_" {
            ranges.push(Range {
                start: 0,
                end: 0,
                text: range_text.to_string(),
            });
            continue;
        }
        let caps = range_re()
            .captures(range_text)
            .filter(|c| c.get(1).is_some() || c.get(2).is_some())
            .ok_or_else(|| TransformError::BadPageRange(range_text.to_string()))?;
        let start_text = caps.get(1).map(|m| m.as_str()).unwrap_or("1");
        let end_text = if caps.get(2).is_some() {
            caps.get(3).map(|m| m.as_str()).unwrap_or("-1")
        } else {
            start_text
        };
        let parse = |s: &str| -> Result<i64> {
            let s = if let Some(rest) = s.strip_prefix('_') {
                format!("-{rest}")
            } else {
                s.to_string()
            };
            s.parse()
                .map_err(|_| TransformError::BadPageRange(range_text.to_string()))
        };
        ranges.push(Range {
            start: parse(start_text)?,
            end: parse(end_text)?,
            text: range_text.to_string(),
        });
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_spec() {
        let (slots, modulo, flipping) = parse_specs("0", None).unwrap();
        assert_eq!(modulo, 1);
        assert!(!flipping);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].len(), 1);
        assert!(!slots[0][0].has_transform());
    }

    #[test]
    fn modulo_and_stacked_slots() {
        let (slots, modulo, _) = parse_specs("2:0+1U", None).unwrap();
        assert_eq!(modulo, 2);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].len(), 2);
        assert_eq!(slots[0][1].pageno, 1);
        assert_eq!(slots[0][1].rotate, 180);
    }

    #[test]
    fn commas_inside_offsets_do_not_split_slots() {
        let (slots, _, _) = parse_specs(
            "2:0@0.5(1in,2in),1@0.5(0.5w,0cm)",
            Some(Rectangle::new(500.0, 800.0)),
        )
        .unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0][0].off, Offset::new(72.0, 144.0));
        assert_eq!(slots[1][0].off, Offset::new(250.0, 0.0));
    }

    #[test]
    fn flips_in_either_order_collapse_to_a_half_turn() {
        for text in ["0HV", "0VH", "0VLH"] {
            let (slots, _, flipping) = parse_specs(text, None).unwrap();
            let spec = slots[0][0];
            assert!(!spec.hflip, "{text}");
            assert!(!spec.vflip, "{text}");
            assert!(!flipping, "{text}");
        }
        let (slots, _, _) = parse_specs("0HV", None).unwrap();
        assert_eq!(slots[0][0].rotate, 180);
        let (slots, _, _) = parse_specs("0VLH", None).unwrap();
        assert_eq!(slots[0][0].rotate, (90 + 180) % 360);
    }

    #[test]
    fn double_flip_cancels() {
        let (slots, _, flipping) = parse_specs("0HH", None).unwrap();
        assert!(!slots[0][0].hflip);
        assert!(!flipping);
        let (slots, _, flipping) = parse_specs("0H", None).unwrap();
        assert!(slots[0][0].hflip);
        assert!(flipping);
    }

    #[test]
    fn pageno_must_be_below_modulo() {
        assert!(matches!(
            parse_specs("2:2", None),
            Err(TransformError::BadPageSpec)
        ));
        assert!(matches!(
            parse_specs("1", None),
            Err(TransformError::BadPageSpec)
        ));
    }

    #[test]
    fn reversed_and_rotation_letters() {
        let (slots, _, _) = parse_specs("4:-3L", None).unwrap();
        let spec = slots[0][0];
        assert!(spec.reversed);
        assert_eq!(spec.pageno, 3);
        assert_eq!(spec.rotate, 90);
        let (slots, _, _) = parse_specs("0R", None).unwrap();
        assert_eq!(slots[0][0].rotate, 270);
    }

    #[test]
    fn garbage_is_a_single_canonical_error() {
        for text in ["x", "0@", "0(", "0@1(1,)", "0)", ""] {
            assert!(
                matches!(parse_specs(text, None), Err(TransformError::BadPageSpec)),
                "{text:?}"
            );
        }
    }

    #[test]
    fn dimension_units() {
        assert_eq!(dimension("72", None).unwrap(), 72.0);
        assert_eq!(dimension("72pt", None).unwrap(), 72.0);
        assert_eq!(dimension("1in", None).unwrap(), 72.0);
        assert!((dimension("2.54cm", None).unwrap() - 72.0).abs() < 1e-9);
        assert!((dimension("25.4mm", None).unwrap() - 72.0).abs() < 1e-9);
        let size = Some(Rectangle::new(600.0, 800.0));
        assert_eq!(dimension("0.5w", size).unwrap(), 300.0);
        assert_eq!(dimension("-1h", size).unwrap(), -800.0);
    }

    #[test]
    fn relative_dimension_requires_a_page_size() {
        assert!(matches!(
            dimension("1w", None),
            Err(TransformError::PageSizeNotSet)
        ));
        assert!(matches!(
            dimension("abc", None),
            Err(TransformError::BadDimension(_))
        ));
    }

    #[test]
    fn range_grammar() {
        let ranges = parse_range("1-5,_,_5-_1,7").unwrap();
        assert_eq!(ranges[0].start, 1);
        assert_eq!(ranges[0].end, 5);
        assert!(ranges[1].is_blank());
        assert_eq!(ranges[2].start, -5);
        assert_eq!(ranges[2].end, -1);
        assert_eq!(ranges[3].start, 7);
        assert_eq!(ranges[3].end, 7);
    }

    #[test]
    fn open_ended_ranges() {
        let ranges = parse_range("3-").unwrap();
        assert_eq!(ranges[0].start, 3);
        assert_eq!(ranges[0].end, -1);
        let ranges = parse_range("-4").unwrap();
        assert_eq!(ranges[0].start, 1);
        assert_eq!(ranges[0].end, 4);
    }

    #[test]
    fn bad_range_names_the_offender() {
        let err = parse_range("1-5,bogus").unwrap_err();
        assert!(matches!(err, TransformError::BadPageRange(t) if t == "bogus"));
    }
}
