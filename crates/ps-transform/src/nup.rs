//! N-up layout search.
//!
//! Finding the best grid is a small optimisation problem: try every divisor
//! pair of N in both normal and rotated orientation and keep the layout
//! wasting the least output-page area. The winner is rendered as a page-spec
//! string for the transform engine.

use std::fmt::Write as _;

use crate::error::{Result, TransformError};
use crate::types::Rectangle;

pub const DEFAULT_TOLERANCE: f64 = 100_000.0;

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NupOptions {
    /// Pages per output sheet.
    pub nup: usize,
    /// Output page size; defaults to the input size, then to `default_size`.
    pub size: Option<Rectangle>,
    /// Input page size; defaults to the output size.
    pub in_size: Option<Rectangle>,
    /// Margin around the whole output page.
    pub margin: f64,
    /// Border around each input page cell.
    pub border: f64,
    /// Input pages are rotated 90 degrees left.
    pub rotated_left: bool,
    /// Input pages are rotated 90 degrees right.
    pub rotated_right: bool,
    /// Swap the output page's width and height.
    pub flip: bool,
    /// Column-major placement instead of row-major.
    pub transpose: bool,
    /// Maximum wasted area in square points.
    pub tolerance: f64,
}

impl Default for NupOptions {
    fn default() -> Self {
        Self {
            nup: 1,
            size: None,
            in_size: None,
            margin: 0.0,
            border: 0.0,
            rotated_left: false,
            rotated_right: false,
            flip: false,
            transpose: false,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// A computed layout, ready to feed to the transform engine.
#[derive(Debug, Clone, PartialEq)]
pub struct NupLayout {
    /// Page-spec string, e.g. `4:0@0.5(0,421)+1@0.5(297.5,421)+...`.
    pub spec_text: String,
    /// Resolved output page size (after any flip).
    pub size: Rectangle,
    /// Resolved input page size.
    pub in_size: Rectangle,
}

/// Next exact divisor of `m` greater than `n`, with its cofactor, or `None`.
fn nextdiv(mut n: usize, m: usize) -> Option<(usize, usize)> {
    while n < m {
        n += 1;
        if m % n == 0 {
            return Some((n, m / n));
        }
    }
    None
}

/// Search the divisor pairs of `options.nup` for the least-waste grid and
/// render it as a page-spec string.
///
/// `default_size` is used when neither an output nor an input size is given.
pub fn layout(options: &NupOptions, default_size: Option<Rectangle>) -> Result<NupLayout> {
    if options.nup == 0 {
        return Err(TransformError::Config(
            "number of pages per sheet must be greater than 0".to_string(),
        ));
    }

    let size = options
        .size
        .or(options.in_size)
        .or(default_size)
        .ok_or_else(|| {
            TransformError::Config(
                "output page size not set, and could not get default paper size".to_string(),
            )
        })?;
    let in_size = options.in_size.unwrap_or(size);
    let size = if options.flip { size.rotated() } else { size };
    let (mut iwidth, mut iheight) = (in_size.width, in_size.height);

    let mut rowmajor = !options.transpose;
    let mut leftright = true;
    let mut topbottom = true;
    if options.rotated_left {
        rowmajor = !rowmajor;
        topbottom = !topbottom;
    }
    if options.rotated_right {
        rowmajor = !rowmajor;
        leftright = !leftright;
    }

    let ppwid = size.width - options.margin * 2.0;
    let pphgt = size.height - options.margin * 2.0;
    if ppwid <= 0.0 || pphgt <= 0.0 {
        return Err(TransformError::Config("margin is too large".to_string()));
    }
    if options.border > ppwid.min(pphgt) {
        return Err(TransformError::Config("border is too large".to_string()));
    }

    let mut best = options.tolerance;
    let mut winner: Option<(usize, usize, bool)> = None;
    let mut reduce_waste = |hor: usize, ver: usize, iwid: f64, ihgt: f64, rot: bool| {
        let scl = (pphgt / (ihgt * ver as f64)).min(ppwid / (iwid * hor as f64));
        let waste = (ppwid - scl * iwid * hor as f64).powi(2)
            + (pphgt - scl * ihgt * ver as f64).powi(2);
        if waste < best {
            best = waste;
            winner = Some((hor, ver, rot));
        }
    };
    let mut div = Some((1, options.nup));
    while let Some((hor, ver)) = div {
        reduce_waste(hor, ver, iwidth, iheight, false);
        reduce_waste(ver, hor, iheight, iwidth, true);
        div = nextdiv(hor, options.nup);
    }

    let (horiz, vert, rotate) = winner.ok_or(TransformError::NoLayout(options.nup))?;

    if rotate {
        (topbottom, leftright, rowmajor) = (!leftright, topbottom, !rowmajor);
        (iwidth, iheight) = (iheight, iwidth);
    }

    // Uniform cell scale, allowing for internal borders.
    let scale = ((pphgt - 2.0 * options.border * vert as f64) / (iheight * vert as f64))
        .min((ppwid - 2.0 * options.border * horiz as f64) / (iwidth * horiz as f64));

    // Centring shifts within each cell.
    let hshift = (ppwid / horiz as f64 - iwidth * scale) / 2.0;
    let vshift = (pphgt / vert as f64 - iheight * scale) / 2.0;

    let mut terms = Vec::with_capacity(options.nup);
    for page in 0..options.nup {
        let (mut across, mut up) = if rowmajor {
            (page % horiz, page / horiz)
        } else {
            (page / vert, page % vert)
        };
        if !leftright {
            across = horiz - 1 - across;
        }
        if topbottom {
            up = vert - 1 - up;
        }
        let xoff = if rotate {
            options.margin + (across + 1) as f64 * ppwid / horiz as f64 - hshift
        } else {
            options.margin + across as f64 * ppwid / horiz as f64 + hshift
        };
        let yoff = options.margin + up as f64 * pphgt / vert as f64 + vshift;
        let mut term = String::new();
        let _ = write!(
            term,
            "{page}{}@{scale:.6}({xoff:.6},{yoff:.6})",
            if rotate { "L" } else { "" }
        );
        terms.push(term);
    }

    Ok(NupLayout {
        spec_text: format!("{}:{}", options.nup, terms.join("+")),
        size,
        in_size,
    })
}
