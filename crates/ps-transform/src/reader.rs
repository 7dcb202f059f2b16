//! Document readers: the DSC scanner for PostScript and a thin lopdf adapter
//! for PDF.
//!
//! The scanner indexes a PostScript stream by byte offset in one forward
//! pass. It never parses PostScript itself; it only looks at `%%` structural
//! comments, so the transform can later re-seek into the stream and copy
//! page bodies verbatim. Keeping offsets rather than parsed lines keeps
//! memory independent of page content.

use std::io::{BufRead, Seek, SeekFrom};
use std::ops::Range as ByteRange;

use lopdf::{Document, Object, ObjectId};

use crate::error::{Result, TransformError};
use crate::types::Rectangle;

/// Structural index of a PostScript document.
pub struct PsReader<R> {
    pub(crate) infile: R,
    /// Offset just past the header comments.
    pub headerpos: u64,
    /// Offset of the `%%Pages:` comment, if any.
    pub pagescmt: Option<u64>,
    /// Offset of the `%%EndSetup` line (clamped to the first page).
    pub endsetup: u64,
    /// Byte span of a previously injected PStoPS procset, if present.
    pub procset_pos: Option<ByteRange<u64>>,
    /// Start offset of every page, plus a sentinel at the end of the last
    /// page (always `num_pages + 1` entries).
    pub pageptr: Vec<u64>,
    pub num_pages: usize,
    /// Offsets of size-declaration comments to drop when the output size is
    /// overridden.
    pub sizeheaders: Vec<u64>,
    /// The document's native page size, if one could be recovered.
    pub size: Option<Rectangle>,
    /// True when `size` was inferred from a bounding box rather than an
    /// authoritative `%%DocumentMedia:` comment.
    pub size_guessed: bool,
}

/// Split a `%%Keyword: value` line into its keyword and trimmed value.
fn dsc_comment(line: &[u8]) -> Option<(&[u8], &[u8])> {
    let rest = line.strip_prefix(b"%%")?;
    let end = rest
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    let keyword = &rest[..end];
    let value = rest[end..].trim_ascii();
    Some((keyword, value))
}

fn parse_f64(word: &[u8]) -> Option<f64> {
    std::str::from_utf8(word).ok()?.trim().parse().ok()
}

/// Parse `%%DocumentMedia: plain <width> <height> ...`.
fn media_size(value: &[u8]) -> Option<Rectangle> {
    let mut words = value.split(|b| *b == b' ').filter(|w| !w.is_empty());
    let _name = words.next()?;
    let width = parse_f64(words.next()?)?;
    let height = parse_f64(words.next()?)?;
    Some(Rectangle::new(width, height))
}

/// Parse `%%BoundingBox: llx lly urx ury` into a page size.
fn bbox_size(value: &[u8]) -> Option<Rectangle> {
    let mut nums = value
        .split(|b| b.is_ascii_whitespace())
        .filter(|w| !w.is_empty())
        .map(parse_f64);
    let llx = nums.next()??;
    let lly = nums.next()??;
    let urx = nums.next()??;
    let ury = nums.next()??;
    let size = Rectangle::new(urx - llx, ury - lly);
    (size.width > 0.0 && size.height > 0.0).then_some(size)
}

const SIZE_KEYWORDS: [&[u8]; 5] = [
    b"BoundingBox:",
    b"HiResBoundingBox:",
    b"DocumentPaperSizes:",
    b"DocumentMedia:",
    b"PageBoundingBox:",
];

impl<R: BufRead + Seek> PsReader<R> {
    /// Scan `infile` and build the structural index.
    ///
    /// Pages are only counted at nesting level 0; anything inside
    /// `%%BeginDocument`/`%%BeginBinary`/`%%BeginFile` blocks is opaque.
    /// A scan that finds zero pages still succeeds.
    pub fn new(mut infile: R) -> Result<Self> {
        infile.seek(SeekFrom::Start(0))?;

        let mut headerpos: Option<u64> = None;
        let mut pagescmt = None;
        let mut endsetup: Option<u64> = None;
        let mut procset_start: Option<u64> = None;
        let mut procset_end = None;
        let mut pageptr = Vec::new();
        let mut sizeheaders = Vec::new();
        let mut size: Option<Rectangle> = None;
        let mut size_guessed = false;

        let mut nesting = 0i32;
        let mut record: u64 = 0;
        let mut next_record: u64 = 0;
        let mut line = Vec::new();
        loop {
            line.clear();
            let n = infile.read_until(b'\n', &mut line)?;
            if n == 0 {
                break;
            }
            next_record += n as u64;
            if let Some((keyword, value)) = line
                .starts_with(b"%%")
                .then(|| dsc_comment(&line))
                .flatten()
            {
                // Opportunistic size recovery while still in the header:
                // %%DocumentMedia is authoritative, a bounding box is only
                // a guess.
                if headerpos.is_none() {
                    if keyword == b"DocumentMedia:" {
                        if size.is_none() || size_guessed {
                            if let Some(media) = media_size(value) {
                                size = Some(media);
                                size_guessed = false;
                            }
                        }
                    } else if keyword == b"BoundingBox:" || keyword == b"HiResBoundingBox:" {
                        if size.is_none() {
                            if let Some(bbox) = bbox_size(value) {
                                size = Some(bbox);
                                size_guessed = true;
                            }
                        }
                    }
                }

                if nesting == 0 && keyword == b"Page:" {
                    pageptr.push(record);
                } else if headerpos.is_none() && SIZE_KEYWORDS.contains(&keyword) {
                    sizeheaders.push(record);
                } else if headerpos.is_none() && keyword == b"Pages:" {
                    pagescmt = Some(record);
                } else if headerpos.is_none() && keyword == b"EndComments" {
                    headerpos = Some(next_record);
                } else if matches!(
                    keyword,
                    b"BeginDocument:" | b"BeginBinary:" | b"BeginFile:"
                ) {
                    nesting += 1;
                } else if matches!(keyword, b"EndDocument" | b"EndBinary" | b"EndFile") {
                    nesting -= 1;
                } else if nesting == 0 && keyword == b"EndSetup" {
                    endsetup = Some(record);
                } else if nesting == 0 && headerpos.is_none() && keyword == b"BeginProlog" {
                    headerpos = Some(next_record);
                } else if nesting == 0 && line.starts_with(b"%%BeginProcSet: PStoPS") {
                    procset_start = Some(record);
                } else if procset_start.is_some()
                    && procset_end.is_none()
                    && keyword == b"EndProcSet"
                {
                    procset_end = Some(next_record);
                } else if nesting == 0 && matches!(keyword, b"Trailer" | b"EOF") {
                    break;
                }
            } else if headerpos.is_none() && record > 0 && !line.starts_with(b"%%") {
                // A document with no %%EndComments: the header ends at the
                // first non-comment line after the %! signature.
                headerpos = Some(record);
            }
            record = next_record;
        }

        let num_pages = pageptr.len();
        pageptr.push(record);

        let mut endsetup = endsetup.unwrap_or(0);
        if endsetup == 0 || endsetup > pageptr[0] {
            endsetup = pageptr[0];
        }

        Ok(Self {
            infile,
            headerpos: headerpos.unwrap_or(0),
            pagescmt,
            endsetup,
            procset_pos: procset_start.zip(procset_end).map(|(s, e)| s..e),
            pageptr,
            num_pages,
            sizeheaders,
            size,
            size_guessed,
        })
    }

    pub fn pages(&self) -> usize {
        self.num_pages
    }
}

/// A PDF document opened for transformation: lopdf does the parsing, this
/// adapter only exposes the page list and the nominal page size.
pub struct PdfReader {
    pub document: Document,
    pub page_ids: Vec<ObjectId>,
    pub size: Option<Rectangle>,
}

impl PdfReader {
    pub fn new(document: Document) -> Result<Self> {
        let page_ids: Vec<ObjectId> = document.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(TransformError::Config("document has no pages".to_string()));
        }
        let size = media_box(&document, page_ids[0]);
        Ok(Self {
            document,
            page_ids,
            size,
        })
    }

    pub fn load(data: &[u8]) -> Result<Self> {
        Self::new(Document::load_mem(data)?)
    }

    pub fn pages(&self) -> usize {
        self.page_ids.len()
    }
}

fn object_f64(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Width and height of a page's media box, if it has a usable one.
pub(crate) fn media_box(document: &Document, page_id: ObjectId) -> Option<Rectangle> {
    let page = document.get_dictionary(page_id).ok()?;
    let mb = page.get(b"MediaBox").and_then(|obj| obj.as_array()).ok()?;
    if mb.len() != 4 {
        return None;
    }
    let llx = object_f64(&mb[0])?;
    let lly = object_f64(&mb[1])?;
    let urx = object_f64(&mb[2])?;
    let ury = object_f64(&mb[3])?;
    Some(Rectangle::new(urx - llx, ury - lly))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &[u8] = b"\
%!PS-Adobe-3.0
%%Pages: 2
%%DocumentMedia: plain 595 842 0 () ()
%%BoundingBox: 0 0 595 842
%%EndComments
%%BeginProlog
/box { 0 0 moveto } def
%%EndProlog
%%BeginSetup
%%EndSetup
%%Page: 1 1
box showpage
%%Page: 2 2
box showpage
%%Trailer
%%EOF
";

    #[test]
    fn indexes_pages_and_sections() {
        let reader = PsReader::new(Cursor::new(SAMPLE)).unwrap();
        assert_eq!(reader.pages(), 2);
        assert_eq!(reader.pageptr.len(), 3);
        assert!(reader.pagescmt.is_some());
        assert_eq!(reader.size, Some(Rectangle::new(595.0, 842.0)));
        assert!(!reader.size_guessed);
        // %%DocumentMedia and %%BoundingBox are both suppression candidates.
        assert_eq!(reader.sizeheaders.len(), 2);
        // %%EndSetup sits before the first page.
        assert!(reader.endsetup < reader.pageptr[0]);
        assert!(reader.headerpos > 0);
    }

    #[test]
    fn scanning_twice_yields_identical_indices() {
        let a = PsReader::new(Cursor::new(SAMPLE)).unwrap();
        let b = PsReader::new(Cursor::new(SAMPLE)).unwrap();
        assert_eq!(a.pageptr, b.pageptr);
        assert_eq!(a.headerpos, b.headerpos);
        assert_eq!(a.pagescmt, b.pagescmt);
        assert_eq!(a.endsetup, b.endsetup);
        assert_eq!(a.sizeheaders, b.sizeheaders);
    }

    #[test]
    fn nested_documents_do_not_contribute_pages() {
        let doc = b"\
%!PS-Adobe-3.0
%%Pages: 1
%%EndComments
%%Page: 1 1
%%BeginDocument: inner.eps
%%Page: 1 1
%%Page: 2 2
%%EndDocument
showpage
%%Trailer
%%EOF
";
        let reader = PsReader::new(Cursor::new(&doc[..])).unwrap();
        assert_eq!(reader.pages(), 1);
    }

    #[test]
    fn bounding_box_size_is_flagged_as_guessed() {
        let doc = b"\
%!PS-Adobe-3.0
%%Pages: 1
%%BoundingBox: 0 0 612 792
%%EndComments
%%Page: 1 1
showpage
%%EOF
";
        let reader = PsReader::new(Cursor::new(&doc[..])).unwrap();
        assert_eq!(reader.size, Some(Rectangle::new(612.0, 792.0)));
        assert!(reader.size_guessed);
    }

    #[test]
    fn missing_end_comments_finalizes_header_at_first_body_line() {
        let doc = b"\
%!PS-Adobe-3.0
%%Pages: 1
/init { } def
%%Page: 1 1
showpage
";
        let reader = PsReader::new(Cursor::new(&doc[..])).unwrap();
        assert_eq!(reader.pages(), 1);
        // Header ends where `/init` begins.
        assert_eq!(reader.headerpos, 26);
    }

    #[test]
    fn bare_structural_comment_leaves_the_header_open() {
        // "%% draft" has no keyword; the header is still in progress.
        let doc = b"\
%!PS-Adobe-3.0
%% draft
%%Pages: 1
%%EndComments
%%Page: 1 1
showpage
%%EOF
";
        let reader = PsReader::new(Cursor::new(&doc[..])).unwrap();
        assert!(reader.pagescmt.is_some());
        // Header ends after %%EndComments, not at the bare comment.
        assert_eq!(reader.headerpos, 49);
    }

    #[test]
    fn zero_page_document_scans_successfully() {
        let doc = b"%!PS-Adobe-3.0\n%%EndComments\n%%EOF\n";
        let reader = PsReader::new(Cursor::new(&doc[..])).unwrap();
        assert_eq!(reader.pages(), 0);
        assert_eq!(reader.pageptr.len(), 1);
    }

    #[test]
    fn detects_previously_injected_procset() {
        let doc = b"\
%!PS-Adobe-3.0
%%Pages: 1
%%EndComments
%%BeginProcSet: PStoPS 1 15
userdict begin
end
%%EndProcSet
%%Page: 1 1
showpage
%%EOF
";
        let reader = PsReader::new(Cursor::new(&doc[..])).unwrap();
        let span = reader.procset_pos.expect("procset span");
        assert!(span.start < span.end);
        assert!(span.end <= reader.pageptr[0]);
    }
}
