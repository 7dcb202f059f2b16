use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "bad page specification:\n\n\
         \x20 PAGESPECS = [MODULO:]SPECS\n\
         \x20 SPECS     = SPEC[+SPECS|,SPECS]\n\
         \x20 SPEC      = [-]PAGENO[TRANSFORM...][@SCALE][(XOFF,YOFF)]\n\
         \x20 TRANSFORM = L|R|U|H|V\n\
         \x20             MODULO > 0; 0 <= PAGENO < MODULO"
    )]
    BadPageSpec,
    #[error("`{0}' is not a page range")]
    BadPageRange(String),
    #[error("page range {0} is invalid")]
    PageRangeInvalid(String),
    #[error("bad dimension `{0}'")]
    BadDimension(String),
    #[error("output page size not set")]
    PageSizeNotSet,
    #[error("input page size must be set when flipping the page")]
    InputSizeUnknown,
    #[error("can't find acceptable layout for {0}-up")]
    NoLayout(usize),
    #[error("paper size `{0}' unknown")]
    UnknownPaper(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TransformError>;
