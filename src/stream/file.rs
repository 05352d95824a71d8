use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
}

/// A file opened read-only or write-only, never both. Writes append at
/// the stream's internal cursor; reads are positional.
pub struct FileStream {
    identity: String,
    file: File,
    mode: FileMode,
    cursor: u64,
}

impl FileStream {
    pub fn open_read(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|err| Error::InvalidFile(format!("{}: {err}", path.display())))?;
        Ok(Self {
            identity: path.display().to_string(),
            file,
            mode: FileMode::Read,
            cursor: 0,
        })
    }

    pub fn create_write(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|err| Error::InvalidFile(format!("{}: {err}", path.display())))?;
        Ok(Self {
            identity: path.display().to_string(),
            file,
            mode: FileMode::Write,
            cursor: 0,
        })
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if self.mode != FileMode::Read {
            return Err(Error::InvalidStream("stream is not open for reading"));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        // Loop until the buffer is full or EOF so callers always see the
        // exact transferred count.
        let mut total = 0;
        while total < buf.len() {
            let n = self.file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        self.cursor = offset + total as u64;
        Ok(total)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.mode != FileMode::Write {
            return Err(Error::InvalidStream("stream is not open for writing"));
        }
        self.file.write_all(data)?;
        self.cursor += data.len() as u64;
        Ok(())
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let new = self.file.seek(pos)?;
        self.cursor = new;
        Ok(new)
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.mode == FileMode::Write {
            self.file.flush()?;
        }
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        if self.mode == FileMode::Write {
            self.file.sync_all()?;
        }
        Ok(())
    }

    pub fn file_len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}
