//! PostScript back end.
//!
//! Pages are rewritten by seeking back into the scanned input and copying
//! byte ranges, with transform code injected around each page body. The
//! injected PStoPS procset redefines `showpage` and friends so that a source
//! page drawn mid-sheet cannot flush the sheet or reset the matrix.

use std::io::{BufRead, Read, Seek, SeekFrom, Write};

use crate::error::{Result, TransformError};
use crate::reader::PsReader;
use crate::transform::{page_index_to_page_number, DocumentTransform};
use crate::types::{GlobalTransform, Offset, PageList, PageSpec, Rectangle, Slot};

/// Wraps showpage, erasepage and copypage in guarded versions and nullifies
/// the paper size operators, so composited pages cannot emit a sheet or
/// change the device setup behind our back.
const PROCSET: &str = "userdict begin
[/showpage/erasepage/copypage]{dup where{pop dup load
 type/operatortype eq{ /PStoPSenablepage cvx 1 index
 load 1 array astore cvx {} bind /ifelse cvx 4 array
 astore cvx def}{pop}ifelse}{pop}ifelse}forall
 /PStoPSenablepage true def
[/letter/legal/executivepage/a4/a4small/b5/com10envelope
 /monarchenvelope/c5envelope/dlenvelope/lettersmall/note
 /folio/quarto/a5]{dup where{dup wcheck{exch{}put}
 {pop{}def}ifelse}{pop}ifelse}forall
/setpagedevice {pop}bind 1 index where{dup wcheck{3 1 roll put}
 {pop def}ifelse}{def}ifelse
/PStoPSmatrix matrix currentmatrix def
/PStoPSxform matrix def/PStoPSclip{clippath}def
/defaultmatrix{PStoPSmatrix exch PStoPSxform exch concatmatrix}bind def
/initmatrix{matrix defaultmatrix setmatrix}bind def
/initclip[{matrix currentmatrix PStoPSmatrix setmatrix
 [{currentpoint}stopped{$error/newerror false put{newpath}}
 {/newpath cvx 3 1 roll/moveto cvx 4 array astore cvx}ifelse]
 {[/newpath cvx{/moveto cvx}{/lineto cvx}
 {/curveto cvx}{/closepath cvx}pathforall]cvx exch pop}
 stopped{$error/errorname get/invalidaccess eq{cleartomark
 $error/newerror false put cvx exec}{stop}ifelse}if}bind aload pop
 /initclip dup load dup type dup/operatortype eq{pop exch pop}
 {dup/arraytype eq exch/packedarraytype eq or
  {dup xcheck{exch pop aload pop}{pop cvx}ifelse}
  {pop cvx}ifelse}ifelse
 {newpath PStoPSclip clip newpath exec setmatrix} bind aload pop]cvx def
/initgraphics{initmatrix newpath initclip 1 setlinewidth
 0 setlinecap 0 setlinejoin []0 setdash 0 setgray
 10 setmiterlimit}bind def
end";

/// Captures the transformation from the device default matrix to the matrix
/// in force at the end of the document's setup section.
const XFORM_CAPTURE: &str = "userdict/PStoPSxform PStoPSmatrix matrix currentmatrix
 matrix invertmatrix matrix concatmatrix
 matrix invertmatrix put";

pub struct PsTransform<R, W> {
    reader: PsReader<R>,
    outfile: W,
    size: Option<Rectangle>,
    in_size: Option<Rectangle>,
    specs: Vec<Slot>,
    draw: f64,
    use_procset: bool,
    in_size_guessed: bool,
}

impl<R: BufRead + Seek, W: Write> PsTransform<R, W> {
    /// `size` is the output page size to declare; `in_size` overrides the
    /// size recovered by the scanner; `global` is combined into every spec.
    /// The procset is only injected when some slot actually transforms or
    /// composites pages.
    pub fn new(
        reader: PsReader<R>,
        outfile: W,
        size: Option<Rectangle>,
        in_size: Option<Rectangle>,
        specs: Vec<Slot>,
        global: GlobalTransform,
        draw: f64,
    ) -> Self {
        let specs = global.fold(specs);
        let use_procset = specs
            .iter()
            .any(|slot| slot.len() > 1 || slot.first().is_some_and(PageSpec::has_transform));
        // The warning below only applies when the guessed scanner size is
        // what we actually use, not an explicit override.
        let in_size_guessed = in_size.is_none() && reader.size.is_some() && reader.size_guessed;
        let in_size = in_size.or(reader.size).or(size);
        Self {
            reader,
            outfile,
            size,
            in_size,
            specs,
            draw,
            use_procset,
            in_size_guessed,
        }
    }

    /// Consume the transform, returning the output sink.
    pub fn into_output(self) -> W {
        self.outfile
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.outfile.write_all(text.as_bytes())?;
        self.outfile.write_all(b"\n")?;
        Ok(())
    }

    /// Copy input from the current position up to `upto`, dropping the lines
    /// that start at offsets in `ignore`. Consumed entries are removed.
    fn fcopy(&mut self, upto: u64, ignore: &mut Vec<u64>) -> Result<()> {
        loop {
            let here = self.reader.infile.stream_position()?;
            while ignore.first().is_some_and(|&off| off < here) {
                ignore.remove(0);
            }
            match ignore.first().copied() {
                Some(off) if off < upto => {
                    copy_exact(&mut self.reader.infile, &mut self.outfile, off - here)?;
                    let mut dropped = Vec::new();
                    self.reader.infile.read_until(b'\n', &mut dropped)?;
                    ignore.remove(0);
                }
                _ => {
                    copy_exact(&mut self.reader.infile, &mut self.outfile, upto - here)?;
                    return Ok(());
                }
            }
        }
    }
}

fn copy_exact<R: Read, W: Write>(from: &mut R, to: &mut W, count: u64) -> Result<()> {
    std::io::copy(&mut from.take(count), to)?;
    Ok(())
}

impl<R: BufRead + Seek, W: Write> DocumentTransform for PsTransform<R, W> {
    fn pages(&self) -> usize {
        self.reader.num_pages
    }

    fn in_size(&self) -> Option<Rectangle> {
        self.in_size
    }

    fn slots(&self) -> &[Slot] {
        &self.specs
    }

    fn write_header(&mut self, maxpage: usize, modulo: usize) -> Result<()> {
        let mut ignorelist = if self.size.is_some() {
            self.reader.sizeheaders.clone()
        } else {
            Vec::new()
        };
        self.reader.infile.seek(SeekFrom::Start(0))?;
        if let Some(pagescmt) = self.reader.pagescmt {
            self.fcopy(pagescmt, &mut ignorelist)?;
            // Consume the old %%Pages: line; it is replaced below.
            let mut dropped = Vec::new();
            self.reader.infile.read_until(b'\n', &mut dropped)?;
            if let Some(size) = self.size {
                if self.in_size_guessed {
                    if let Some(in_size) = self.in_size {
                        log::warn!("required input paper size was guessed as {in_size}");
                    }
                }
                self.write(&format!(
                    "%%DocumentMedia: plain {} {} 0 () ()",
                    size.width as i64, size.height as i64
                ))?;
                self.write(&format!(
                    "%%BoundingBox: 0 0 {} {}",
                    size.width as i64, size.height as i64
                ))?;
            }
            let pages = (maxpage / modulo) * self.specs.len();
            self.write(&format!("%%Pages: {pages} 0"))?;
        } else if self.size.is_some() {
            log::warn!("could not find document header, so cannot set output paper size");
        }
        self.fcopy(self.reader.headerpos, &mut ignorelist)?;
        if self.use_procset {
            self.write(&format!("%%BeginProcSet: PStoPS 1 15\n{PROCSET}"))?;
            self.write("%%EndProcSet")?;
        }

        // Copy the prologue and setup, skipping any procset we injected on a
        // previous run so it gets replaced rather than duplicated.
        if let Some(procset_pos) = self.reader.procset_pos.clone() {
            if self.use_procset {
                self.fcopy(procset_pos.start, &mut Vec::new())?;
                self.reader.infile.seek(SeekFrom::Start(procset_pos.end))?;
            }
        }
        self.fcopy(self.reader.endsetup, &mut Vec::new())?;

        // Save the transformation from the original to the current matrix.
        if self.reader.procset_pos.is_none() && self.use_procset {
            self.write(XFORM_CAPTURE)?;
        }

        self.fcopy(self.reader.pageptr[0], &mut Vec::new())
    }

    fn write_page_comment(&mut self, label: &str, outputpage: usize) -> Result<()> {
        self.write(&format!("%%Page: ({label}) {outputpage}"))
    }

    fn write_page(
        &mut self,
        page_list: &PageList,
        _outputpage: usize,
        slot: &Slot,
        maxpage: usize,
        modulo: usize,
        pagebase: usize,
    ) -> Result<()> {
        for (spec_index, spec) in slot.iter().enumerate() {
            let page_number = page_index_to_page_number(spec, maxpage, modulo, pagebase);
            let real_page = if page_number < page_list.len() {
                page_list
                    .real_page(page_number)
                    .filter(|&p| p < self.pages())
            } else {
                None
            };
            if let Some(real) = real_page {
                // Position past the page's %%Page: comment; the driver has
                // already written ours.
                self.reader
                    .infile
                    .seek(SeekFrom::Start(self.reader.pageptr[real]))?;
                let mut dropped = Vec::new();
                self.reader.infile.read_until(b'\n', &mut dropped)?;
            }
            if self.use_procset {
                self.write("userdict/PStoPSsaved save put")?;
            }
            if spec.has_transform() {
                self.write("PStoPSmatrix setmatrix")?;
                if spec.off != Offset::ZERO {
                    self.write(&format!("{:.6} {:.6} translate", spec.off.x, spec.off.y))?;
                }
                if spec.rotate != 0 {
                    self.write(&format!("{} rotate", spec.rotate.rem_euclid(360)))?;
                }
                if spec.hflip {
                    let in_size = self.in_size.ok_or(TransformError::InputSizeUnknown)?;
                    self.write(&format!(
                        "[ -1 0 0 1 {} 0 ] concat",
                        in_size.width * spec.scale
                    ))?;
                }
                if spec.vflip {
                    let in_size = self.in_size.ok_or(TransformError::InputSizeUnknown)?;
                    self.write(&format!(
                        "[ 1 0 0 -1 0 {} ] concat",
                        in_size.height * spec.scale
                    ))?;
                }
                if spec.scale != 1.0 {
                    self.write(&format!("{:.6} dup scale", spec.scale))?;
                }
                self.write("userdict/PStoPSmatrix matrix currentmatrix put")?;
                if let Some(in_size) = self.in_size {
                    let (w, h) = (in_size.width, in_size.height);
                    self.write(&format!(
                        "userdict/PStoPSclip{{0 0 moveto\n \
                         {w:.6} 0 rlineto 0 {h:.6} rlineto {:.6} 0 rlineto\n \
                         closepath}}put initclip",
                        -w
                    ))?;
                    if self.draw > 0.0 {
                        self.write(&format!(
                            "gsave clippath 0 setgray {} setlinewidth stroke grestore",
                            self.draw
                        ))?;
                    }
                }
            }
            if spec_index < slot.len() - 1 {
                self.write("/PStoPSenablepage false def")?;
            }
            if self.reader.procset_pos.is_some() && real_page.is_some() {
                // Pass page setup through until the transform we injected on
                // the previous run; it is re-emitted below.
                loop {
                    let mut line = Vec::new();
                    let n = self.reader.infile.read_until(b'\n', &mut line)?;
                    if n == 0 || line.starts_with(b"PStoPSxform") {
                        break;
                    }
                    self.outfile.write_all(&line)?;
                }
            }
            if self.reader.procset_pos.is_none() && self.use_procset {
                self.write("PStoPSxform concat")?;
            }
            if let Some(real) = real_page {
                self.fcopy(self.reader.pageptr[real + 1], &mut Vec::new())?;
            } else {
                self.write("showpage")?;
            }
            if self.use_procset {
                self.write("PStoPSsaved restore")?;
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.reader
            .infile
            .seek(SeekFrom::Start(self.reader.pageptr[self.pages()]))?;
        std::io::copy(&mut self.reader.infile, &mut self.outfile)?;
        self.outfile.flush()?;
        Ok(())
    }
}
