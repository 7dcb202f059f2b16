//! Back-end-independent transform driver.
//!
//! A back end implements [`DocumentTransform`] for one output format;
//! [`transform_pages`] owns the ordering logic: resolving the page range,
//! padding to a whole number of modulo blocks, and replaying the slot list
//! over every block.

use crate::error::{Result, TransformError};
use crate::spec;
use crate::types::{PageList, PageSpec, Range, Rectangle, Slot};

/// Map a spec's page index to its position in the current modulo block.
///
/// A reversed spec counts from the end of the document's padded page count
/// rather than from the start of the block.
pub fn page_index_to_page_number(
    spec: &PageSpec,
    maxpage: usize,
    modulo: usize,
    pagebase: usize,
) -> usize {
    (if spec.reversed {
        maxpage - pagebase - modulo
    } else {
        pagebase
    }) + spec.pageno
}

/// One output format's writer.
///
/// The driver calls these in a fixed order: `write_header` once, then
/// `write_page_comment` and `write_page` once per output page, then
/// `finalize` once.
pub trait DocumentTransform {
    /// Number of pages in the source document.
    fn pages(&self) -> usize;

    /// Source page size, when known.
    fn in_size(&self) -> Option<Rectangle>;

    /// The slot list this transform was built with.
    fn slots(&self) -> &[Slot];

    fn write_header(&mut self, maxpage: usize, modulo: usize) -> Result<()>;

    /// Emit the output page's identity (its `%%Page:` comment, or nothing
    /// for formats that do not need one).
    fn write_page_comment(&mut self, label: &str, outputpage: usize) -> Result<()>;

    /// Composite one output page from every spec in `slot`.
    fn write_page(
        &mut self,
        page_list: &PageList,
        outputpage: usize,
        slot: &Slot,
        maxpage: usize,
        modulo: usize,
        pagebase: usize,
    ) -> Result<()>;

    fn finalize(&mut self) -> Result<()>;
}

/// Run a whole transformation and return the number of output pages written.
///
/// `pagerange` defaults to the whole document in order. The resolved list is
/// padded with blanks up to a multiple of `modulo` so the last block is
/// complete.
pub fn transform_pages(
    doc: &mut dyn DocumentTransform,
    pagerange: Option<Vec<Range>>,
    flipping: bool,
    reverse: bool,
    odd: bool,
    even: bool,
    modulo: usize,
) -> Result<usize> {
    if flipping && doc.in_size().is_none() {
        return Err(TransformError::InputSizeUnknown);
    }

    let pagerange = match pagerange {
        Some(ranges) => ranges,
        None => spec::parse_range("1-_1")?,
    };
    let page_list = PageList::new(doc.pages(), &pagerange, reverse, odd, even)?;

    // Pad to a whole number of modulo blocks.
    let maxpage =
        page_list.len() + (modulo - page_list.len() % modulo) % modulo;

    doc.write_header(maxpage, modulo)?;

    let slots = doc.slots().to_vec();
    let mut outputpage = 0;
    let mut pagebase = 0;
    while pagebase < maxpage {
        for slot in &slots {
            outputpage += 1;
            let label = slot
                .iter()
                .map(|spec| {
                    let page = page_index_to_page_number(spec, maxpage, modulo, pagebase);
                    match page_list.real_page(page) {
                        Some(real) => (real + 1).to_string(),
                        None => "*".to_string(),
                    }
                })
                .collect::<Vec<_>>()
                .join(",");
            log::debug!("writing output page {outputpage} ({label})");
            doc.write_page_comment(&label, outputpage)?;
            doc.write_page(&page_list, outputpage, slot, maxpage, modulo, pagebase)?;
        }
        pagebase += modulo;
    }

    doc.finalize()?;
    log::info!("wrote {outputpage} pages");
    Ok(outputpage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageSpec;

    #[test]
    fn reversed_specs_count_from_the_end() {
        let forward = PageSpec::default();
        let reversed = PageSpec {
            reversed: true,
            ..Default::default()
        };
        // 4 pages, modulo 2: blocks [0,1] and [2,3].
        assert_eq!(page_index_to_page_number(&forward, 4, 2, 0), 0);
        assert_eq!(page_index_to_page_number(&forward, 4, 2, 2), 2);
        assert_eq!(page_index_to_page_number(&reversed, 4, 2, 0), 2);
        assert_eq!(page_index_to_page_number(&reversed, 4, 2, 2), 0);
    }
}
