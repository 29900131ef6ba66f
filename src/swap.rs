//! The swap store (component C): a fixed-size on-disk array of page-sized
//! slots backing every non-resident page.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use shared::bitmap::Bitmap;

use crate::error::{VmError, VmResult};

pub struct SwapStore {
    bitmap: Bitmap,
    file: File,
    page_size: usize,
    path: PathBuf,
}

impl SwapStore {
    /// Creates (or truncates) the backing file at `path` to exactly
    /// `swap_sectors * page_size` bytes.
    pub fn create(path: impl AsRef<Path>, swap_sectors: usize, page_size: usize) -> VmResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len((swap_sectors * page_size) as u64)?;

        log::debug!(
            "swap store created at {} ({} sectors x {} bytes)",
            path.display(),
            swap_sectors,
            page_size
        );

        Ok(SwapStore {
            bitmap: Bitmap::new(swap_sectors),
            file,
            page_size,
            path,
        })
    }

    pub fn alloc_sector(&mut self) -> VmResult<u64> {
        let idx = self
            .bitmap
            .find_and_set()
            .map_err(|_| VmError::SwapExhausted)?;
        Ok((idx * self.page_size) as u64)
    }

    pub fn free_sector(&mut self, byte_offset: u64) -> VmResult<()> {
        let idx = (byte_offset / self.page_size as u64) as usize;
        self.bitmap
            .clear(idx)
            .map_err(|e| VmError::Assertion(e.to_string()))?;
        Ok(())
    }

    /// Reads exactly `buf.len()` bytes (`buf.len() <= PageSize`) starting at
    /// `byte_offset`.
    pub fn read_page(&mut self, buf: &mut [u8], byte_offset: u64) -> VmResult<()> {
        debug_assert!(buf.len() <= self.page_size);
        self.file.seek(SeekFrom::Start(byte_offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Writes the first `n` bytes of `buf` (`n <= PageSize`) at `byte_offset`.
    pub fn write_page(&mut self, buf: &[u8], n: usize, byte_offset: u64) -> VmResult<()> {
        debug_assert!(n <= self.page_size);
        self.file.seek(SeekFrom::Start(byte_offset))?;
        self.file.write_all(&buf[..n])?;
        Ok(())
    }

    /// Full-page copy, for forthcoming features such as `exec`/`fork`.
    pub fn copy_sector(&mut self, to: u64, from: u64) -> VmResult<()> {
        let mut buf = vec![0u8; self.page_size];
        self.read_page(&mut buf, from)?;
        self.write_page(&buf, self.page_size, to)?;
        Ok(())
    }

    pub fn free_count(&self) -> usize {
        self.bitmap.count_set()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

impl Drop for SwapStore {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            log::warn!("failed to remove swap file {}: {err}", self.path.display());
        }
    }
}
