//! Booklet signature arithmetic.
//!
//! A signature is a group of sheets folded together; printing one means
//! interleaving pages from both ends of the group so they read in order
//! after folding. The output is a page-range string for the transform
//! engine, with `_` marking pad pages beyond the real page count.

use std::fmt::Write as _;

use crate::error::{Result, TransformError};

/// Source page (1-based) for output position `page` within signatures of
/// `signature` pages.
fn page_index_to_real_page(signature: usize, page: usize) -> usize {
    let mut real_page = page - page % signature;
    let page_on_sheet = page % 4;
    let recto_verso = (page % signature) / 2;
    if page_on_sheet == 0 || page_on_sheet == 3 {
        real_page += signature - 1 - recto_verso;
    } else {
        real_page += recto_verso;
    }
    real_page + 1
}

/// Build the booklet page-range string for a document of `input_pages`.
///
/// `signature` must be a positive multiple of 4, or 0 to cover the whole
/// document in one signature, or 1 for no reordering.
pub fn book_range(input_pages: usize, signature: usize) -> Result<String> {
    if signature > 1 && signature % 4 != 0 {
        return Err(TransformError::Config(
            "signature must be a multiple of 4".to_string(),
        ));
    }

    let (signature, maxpage) = if signature == 0 {
        let maxpage = input_pages + (4 - input_pages % 4) % 4;
        (maxpage, maxpage)
    } else {
        (
            signature,
            input_pages + (signature - input_pages % signature) % signature,
        )
    };

    let mut out = String::new();
    for page in 0..maxpage {
        if page > 0 {
            out.push(',');
        }
        let real_page = page_index_to_real_page(signature, page);
        if real_page <= input_pages {
            let _ = write!(out, "{real_page}");
        } else {
            out.push('_');
        }
    }
    Ok(out)
}
