use std::fs::OpenOptions;
use std::io::SeekFrom;
use std::path::Path;

use memmap2::{MmapMut, MmapOptions};

use crate::{Error, Result};

/// A file-backed memory map of fixed size.
///
/// The caller must ensure the backing file is not externally truncated
/// while mapped; the mapping does not pin it.
pub struct MemoryMapStream {
    identity: String,
    map: MmapMut,
    len: u64,
    cursor: u64,
}

impl MemoryMapStream {
    pub fn create(path: &Path, len: u64) -> Result<Self> {
        if len == 0 {
            return Err(Error::InvalidParam("memory map size must be non-zero"));
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|err| Error::InvalidFile(format!("{}: {err}", path.display())))?;
        file.set_len(len)?;
        let map = unsafe { MmapOptions::new().len(len as usize).map_mut(&file)? };
        Ok(Self {
            identity: path.display().to_string(),
            map,
            len,
            cursor: 0,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        let n = buf.len().min((self.len - offset) as usize);
        buf[..n].copy_from_slice(&self.map[offset as usize..offset as usize + n]);
        self.cursor = offset + n as u64;
        Ok(n)
    }

    pub fn write(&mut self, data: &[u8], offset: u64) -> Result<()> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(Error::InvalidParam("write range overflow"))?;
        if end > self.len {
            return Err(Error::InvalidParam("write past end of mapped region"));
        }
        self.map[offset as usize..end as usize].copy_from_slice(data);
        self.cursor = end;
        Ok(())
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let base: i128 = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.cursor as i128 + delta as i128,
            SeekFrom::End(delta) => self.len as i128 + delta as i128,
        };
        if base < 0 {
            return Err(Error::InvalidParam("seek before start of stream"));
        }
        if base > self.len as i128 {
            return Err(Error::InvalidParam("seek past end of mapped region"));
        }
        self.cursor = base as u64;
        Ok(self.cursor)
    }

    /// Zero-copy view of the whole mapped region.
    pub fn buffer(&self) -> &[u8] {
        &self.map
    }

    /// Force dirty pages out to the backing file.
    pub fn flush(&mut self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }
}
