//! File-backed archives
//!
//! A file archive starts with a 12-byte header (`b"archive\0"` magic, then
//! major and minor version as little-endian `u16`), followed by any number
//! of wrapped values.

use super::{wrap_load, wrap_store, Archivable, InputArchive, OutputArchive};
use crate::core::error::{CloudError, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const MAGIC: [u8; 8] = *b"archive\0";
pub const VERSION_MAJOR: u16 = 0;
pub const VERSION_MINOR: u16 = 1;
pub const HEADER_SIZE: usize = 12;

fn header_bytes() -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0..8].copy_from_slice(&MAGIC);
    header[8..10].copy_from_slice(&VERSION_MAJOR.to_le_bytes());
    header[10..12].copy_from_slice(&VERSION_MINOR.to_le_bytes());
    header
}

/// Validate magic and version of a file archive header
pub fn validate_header(header: &[u8; HEADER_SIZE]) -> Result<()> {
    if header[0..8] != MAGIC {
        return Err(CloudError::InvalidMagic);
    }

    let major = u16::from_le_bytes([header[8], header[9]]);
    let minor = u16::from_le_bytes([header[10], header[11]]);
    if major != VERSION_MAJOR {
        return Err(CloudError::UnsupportedVersion { major, minor });
    }

    Ok(())
}

/// Buffered writer producing a file archive
pub struct FileOutputArchive {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl FileOutputArchive {
    /// Create (or truncate) the file and write the header
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(&header_bytes())?;

        Ok(FileOutputArchive {
            writer,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Append one wrapped value
    pub fn store<T: Archivable>(&mut self, value: &T) -> Result<()> {
        wrap_store(self, value)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and sync to disk
    pub fn close(mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputArchive for FileOutputArchive {
    fn store_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }
}

/// Buffered reader over a file archive
pub struct FileInputArchive {
    reader: BufReader<File>,
    remaining: usize,
    path: PathBuf,
}

impl FileInputArchive {
    /// Open the file and validate its header
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        let total = usize::try_from(file.metadata()?.len())
            .map_err(|_| CloudError::InvalidValue("archive file too large".to_string()))?;

        if total < HEADER_SIZE {
            return Err(CloudError::InvalidMagic);
        }

        let mut reader = BufReader::new(file);
        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header)?;
        validate_header(&header)?;

        Ok(FileInputArchive {
            reader,
            remaining: total - HEADER_SIZE,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Read one wrapped value into `value`
    pub fn load<T: Archivable>(&mut self, value: &mut T) -> Result<()> {
        wrap_load(self, value)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InputArchive for FileInputArchive {
    fn load_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.len() > self.remaining {
            return Err(CloudError::UnexpectedEof {
                needed: buf.len(),
                available: self.remaining,
            });
        }
        self.reader.read_exact(buf)?;
        self.remaining -= buf.len();
        Ok(())
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.remaining)
    }
}
