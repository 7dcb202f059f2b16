//! Page rearrangement engine for PostScript and PDF documents.
//!
//! The engine selects, reorders, rotates, scales, and packs logical pages
//! onto output pages without rendering anything: PostScript documents are
//! rewritten by DSC-guided stream surgery, PDF documents by object-level
//! compositing. Page arrangements are described by a small page-spec
//! algebra (see [`spec::parse_specs`]); the n-up and booklet helpers
//! generate spec strings from higher-level parameters.

pub mod book;
mod error;
pub mod io;
pub mod nup;
pub mod paper;
mod pdf;
mod ps;
mod reader;
pub mod spec;
mod transform;
mod types;

pub use error::{Result, TransformError};
pub use pdf::PdfTransform;
pub use ps::PsTransform;
pub use reader::{PdfReader, PsReader};
pub use transform::{page_index_to_page_number, transform_pages, DocumentTransform};
pub use types::*;
