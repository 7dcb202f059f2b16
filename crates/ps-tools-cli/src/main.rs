use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use ps_transform::io::{self, FileType};
use ps_transform::{
    book, nup, paper, spec, transform_pages, GlobalTransform, PdfReader, PdfTransform,
    PsReader, PsTransform, Range, Rectangle,
};

#[derive(Parser)]
#[command(name = "pst", about = "Rearrange pages of PostScript and PDF documents", version)]
struct Cli {
    /// Print page labels as they are written
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress warnings
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct IoArgs {
    /// Input file (stdin if omitted)
    infile: Option<PathBuf>,

    /// Output file (stdout if omitted)
    outfile: Option<PathBuf>,
}

#[derive(Args)]
struct PaperArgs {
    /// Output paper name or WIDTHxHEIGHT
    #[arg(short = 'p', long)]
    paper: Option<String>,

    /// Input paper name or WIDTHxHEIGHT
    #[arg(short = 'P', long)]
    inpaper: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rearrange pages according to a page specification
    Tops {
        /// Page specifications, e.g. "2:0L@0.7(21cm,0)+1L@0.7(21cm,14.85cm)"
        #[arg(short = 'S', long, default_value = "0")]
        specs: String,

        /// Select the given page ranges
        #[arg(short = 'R', long)]
        pages: Option<String>,

        /// Select even-numbered pages
        #[arg(short, long)]
        even: bool,

        /// Select odd-numbered pages
        #[arg(short, long)]
        odd: bool,

        /// Reverse the order of the pages
        #[arg(short, long)]
        reverse: bool,

        /// Draw a line of the given width around each page
        #[arg(short, long, value_name = "DIMENSION", num_args = 0..=1,
              default_missing_value = "1")]
        draw: Option<String>,

        #[command(flatten)]
        paper: PaperArgs,

        #[command(flatten)]
        io: IoArgs,
    },

    /// Select pages and page ranges
    Select {
        /// Comma-separated pages and page ranges, e.g. "1-4,_,_10-_1"
        #[arg(short, long)]
        pages: Option<String>,

        /// Select even-numbered pages
        #[arg(short, long)]
        even: bool,

        /// Select odd-numbered pages
        #[arg(short, long)]
        odd: bool,

        /// Reverse the order of the pages
        #[arg(short, long)]
        reverse: bool,

        #[command(flatten)]
        io: IoArgs,
    },

    /// Reorder pages into booklet signatures
    Book {
        /// Signature size: a multiple of 4, or 0 for one whole-document
        /// signature
        #[arg(short, long, default_value = "0")]
        signature: usize,

        #[command(flatten)]
        io: IoArgs,
    },

    /// Impose multiple pages per output sheet
    Nup {
        /// Pages per output sheet
        #[arg(short, long)]
        nup: usize,

        /// Margin around each output page
        #[arg(short, long, value_name = "DIMENSION", default_value = "0")]
        margin: String,

        /// Border around each input page
        #[arg(short, long, value_name = "DIMENSION", default_value = "0")]
        border: String,

        /// Draw a line of the given width around each page
        #[arg(short, long, value_name = "DIMENSION", num_args = 0..=1,
              default_missing_value = "1")]
        draw: Option<String>,

        /// Input pages are rotated left 90 degrees
        #[arg(short = 'l', long)]
        rotatedleft: bool,

        /// Input pages are rotated right 90 degrees
        #[arg(short = 'r', long)]
        rotatedright: bool,

        /// Swap the output page's width and height
        #[arg(short, long)]
        flip: bool,

        /// Place pages in column-major order
        #[arg(short = 'c', long)]
        transpose: bool,

        /// Maximum wasted area in square points
        #[arg(short, long, default_value_t = nup::DEFAULT_TOLERANCE)]
        tolerance: f64,

        #[command(flatten)]
        paper: PaperArgs,

        #[command(flatten)]
        io: IoArgs,
    },

    /// Scale pages to fit a new paper size
    Resize {
        #[command(flatten)]
        paper: PaperArgs,

        #[command(flatten)]
        io: IoArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
    .format_timestamp(None)
    .init();
    run(cli.command)
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Tops {
            specs,
            pages,
            even,
            odd,
            reverse,
            draw,
            paper,
            io,
        } => {
            let size = parse_paper_arg(paper.paper.as_deref())?;
            let in_size = parse_paper_arg(paper.inpaper.as_deref())?;
            let request = TransformRequest {
                size,
                in_size,
                spec_text: specs,
                pagerange: parse_range_arg(pages.as_deref())?,
                reverse,
                odd,
                even,
                draw: parse_draw_arg(draw.as_deref())?,
            };
            transform_file(&io, request)
        }
        Commands::Select {
            pages,
            even,
            odd,
            reverse,
            io,
        } => {
            let request = TransformRequest {
                pagerange: parse_range_arg(pages.as_deref())?,
                reverse,
                odd,
                even,
                ..Default::default()
            };
            transform_file(&io, request)
        }
        Commands::Book { signature, io } => {
            let data = io::read_input(io.infile.as_deref())?;
            let pages = page_count(&data)?;
            let range = book::book_range(pages, signature)?;
            log::debug!("booklet page order: {range}");
            let request = TransformRequest {
                pagerange: Some(spec::parse_range(&range)?),
                ..Default::default()
            };
            transform_data(data, io.outfile.as_deref(), request)
        }
        Commands::Nup {
            nup,
            margin,
            border,
            draw,
            rotatedleft,
            rotatedright,
            flip,
            transpose,
            tolerance,
            paper,
            io,
        } => {
            let options = nup::NupOptions {
                nup,
                size: parse_paper_arg(paper.paper.as_deref())?,
                in_size: parse_paper_arg(paper.inpaper.as_deref())?,
                margin: spec::dimension(&margin, None)?,
                border: spec::dimension(&border, None)?,
                rotated_left: rotatedleft,
                rotated_right: rotatedright,
                flip,
                transpose,
                tolerance,
            };
            nup_transform(&options, parse_draw_arg(draw.as_deref())?, &io)
        }
        Commands::Resize { paper, io } => {
            let options = nup::NupOptions {
                nup: 1,
                size: parse_paper_arg(paper.paper.as_deref())?,
                in_size: parse_paper_arg(paper.inpaper.as_deref())?,
                ..Default::default()
            };
            nup_transform(&options, 0.0, &io)
        }
    }
}

/// Everything a single transform run needs besides the document itself.
struct TransformRequest {
    size: Option<Rectangle>,
    in_size: Option<Rectangle>,
    spec_text: String,
    pagerange: Option<Vec<Range>>,
    reverse: bool,
    odd: bool,
    even: bool,
    draw: f64,
}

impl Default for TransformRequest {
    fn default() -> Self {
        Self {
            size: None,
            in_size: None,
            spec_text: "0".to_string(),
            pagerange: None,
            reverse: false,
            odd: false,
            even: false,
            draw: 0.0,
        }
    }
}

fn parse_paper_arg(text: Option<&str>) -> Result<Option<Rectangle>> {
    text.map(paper::parse_paper).transpose().map_err(Into::into)
}

fn parse_range_arg(text: Option<&str>) -> Result<Option<Vec<Range>>> {
    text.map(spec::parse_range).transpose().map_err(Into::into)
}

fn parse_draw_arg(text: Option<&str>) -> Result<f64> {
    Ok(match text {
        Some(text) => spec::dimension(text, None)?,
        None => 0.0,
    })
}

fn nup_transform(options: &nup::NupOptions, draw: f64, io: &IoArgs) -> Result<()> {
    let layout = nup::layout(options, Some(paper::default_size()))?;
    log::debug!("computed imposition {}", layout.spec_text);
    let in_size = (layout.in_size != layout.size).then_some(layout.in_size);
    let request = TransformRequest {
        size: Some(layout.size),
        in_size,
        spec_text: layout.spec_text,
        draw,
        ..Default::default()
    };
    transform_file(io, request)
}

fn transform_file(io: &IoArgs, request: TransformRequest) -> Result<()> {
    let data = io::read_input(io.infile.as_deref())?;
    transform_data(data, io.outfile.as_deref(), request)
}

fn page_count(data: &[u8]) -> Result<usize> {
    Ok(match io::sniff(data)? {
        FileType::Ps => PsReader::new(Cursor::new(data))?.pages(),
        FileType::Pdf => PdfReader::load(data)?.pages(),
    })
}

fn transform_data(
    data: Vec<u8>,
    outfile: Option<&Path>,
    request: TransformRequest,
) -> Result<()> {
    let (specs, modulo, flipping) = spec::parse_specs(&request.spec_text, request.size)
        .context("invalid page specification")?;
    let output = io::open_output(outfile)?;
    match io::sniff(&data)? {
        FileType::Ps => {
            let reader = PsReader::new(Cursor::new(data))?;
            let mut doc = PsTransform::new(
                reader,
                output,
                request.size,
                request.in_size,
                specs,
                GlobalTransform::default(),
                request.draw,
            );
            transform_pages(
                &mut doc,
                request.pagerange,
                flipping,
                request.reverse,
                request.odd,
                request.even,
                modulo,
            )?;
        }
        FileType::Pdf => {
            let reader = PdfReader::load(&data)?;
            let mut doc = PdfTransform::new(
                reader,
                output,
                request.size,
                request.in_size,
                specs,
                GlobalTransform::default(),
                request.draw,
            )?;
            transform_pages(
                &mut doc,
                request.pagerange,
                flipping,
                request.reverse,
                request.odd,
                request.even,
                modulo,
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn select_reverses_a_postscript_stream() {
        let input = b"%!PS-Adobe-3.0\n%%Pages: 2\n%%EndComments\n\
                      %%Page: 1 1\n(a) show showpage\n\
                      %%Page: 2 2\n(b) show showpage\n%%EOF\n";
        let dir = tempfile::tempdir().unwrap();
        let infile = dir.path().join("in.ps");
        let outfile = dir.path().join("out.ps");
        std::fs::write(&infile, input).unwrap();
        run(Commands::Select {
            pages: None,
            even: false,
            odd: false,
            reverse: true,
            io: IoArgs {
                infile: Some(infile),
                outfile: Some(outfile.clone()),
            },
        })
        .unwrap();
        let out = std::fs::read_to_string(&outfile).unwrap();
        assert!(out.find("(b) show").unwrap() < out.find("(a) show").unwrap());
    }

    #[test]
    fn book_pads_to_a_multiple_of_four() {
        let mut input = String::from("%!PS-Adobe-3.0\n%%Pages: 6\n%%EndComments\n");
        for p in 1..=6 {
            input.push_str(&format!("%%Page: {p} {p}\n(p{p}) show showpage\n"));
        }
        input.push_str("%%EOF\n");
        let dir = tempfile::tempdir().unwrap();
        let infile = dir.path().join("in.ps");
        let outfile = dir.path().join("out.ps");
        std::fs::write(&infile, input).unwrap();
        run(Commands::Book {
            signature: 0,
            io: IoArgs {
                infile: Some(infile),
                outfile: Some(outfile.clone()),
            },
        })
        .unwrap();
        let out = std::fs::read_to_string(&outfile).unwrap();
        assert!(out.contains("%%Pages: 8 0"));
        assert!(out.contains("%%Page: (*) 1"));
    }
}
