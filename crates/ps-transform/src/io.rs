//! Input/output plumbing shared by the command-line tools.
//!
//! Input is slurped into memory so both back ends can seek, and so stdin
//! works the same as a file. Output stays streaming.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{Result, TransformError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Ps,
    Pdf,
}

/// Identify a document by its magic bytes.
pub fn sniff(data: &[u8]) -> Result<FileType> {
    if data.starts_with(b"%PDF-") {
        Ok(FileType::Pdf)
    } else if data.starts_with(b"%!") {
        Ok(FileType::Ps)
    } else {
        Err(TransformError::Config("incompatible file type".to_string()))
    }
}

/// Read the whole input, from a file or stdin.
pub fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    match path {
        Some(path) => {
            File::open(path)?.read_to_end(&mut data)?;
        }
        None => {
            std::io::stdin().lock().read_to_end(&mut data)?;
        }
    }
    Ok(data)
}

/// Open the output sink, a file or stdout.
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(std::io::stdout().lock()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_by_magic_bytes() {
        assert_eq!(sniff(b"%!PS-Adobe-3.0\n").unwrap(), FileType::Ps);
        assert_eq!(sniff(b"%PDF-1.7\n").unwrap(), FileType::Pdf);
        assert!(sniff(b"GIF89a").is_err());
    }

    #[test]
    fn reads_input_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.ps");
        std::fs::write(&path, b"%!PS\n").unwrap();
        assert_eq!(read_input(Some(&path)).unwrap(), b"%!PS\n");
    }
}
