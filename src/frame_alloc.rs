//! Physical memory and the frame allocator (components B) built on top of
//! the shared bitmap allocator (component A).

use shared::bitmap::Bitmap;
use shared::index::FrameIndex;

use crate::error::{VmError, VmResult};

/// Stand-in for the simulator's `mainMemory`. The simulator itself is an
/// out-of-scope collaborator; this crate owns the backing bytes because it
/// is the one reading and writing them during a fault.
pub struct PhysicalMemory {
    bytes: Vec<u8>,
    page_size: usize,
}

impl PhysicalMemory {
    pub fn new(num_phys_pages: usize, page_size: usize) -> Self {
        PhysicalMemory {
            bytes: vec![0; num_phys_pages * page_size],
            page_size,
        }
    }

    pub fn page(&self, frame: FrameIndex) -> &[u8] {
        let start = frame.as_usize() * self.page_size;
        &self.bytes[start..start + self.page_size]
    }

    pub fn page_mut(&mut self, frame: FrameIndex) -> &mut [u8] {
        let start = frame.as_usize() * self.page_size;
        &mut self.bytes[start..start + self.page_size]
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

/// Hands out and reclaims frame indices over `NumPhysPages`. Frames are
/// zeroed on free so a fresh allocation never leaks another process's data.
pub struct FrameAllocator {
    bitmap: Bitmap,
}

impl FrameAllocator {
    pub fn new(num_phys_pages: usize) -> Self {
        FrameAllocator {
            bitmap: Bitmap::new(num_phys_pages),
        }
    }

    pub fn alloc(&mut self) -> VmResult<FrameIndex> {
        let idx = self
            .bitmap
            .find_and_set()
            .map_err(|e| VmError::Assertion(e.to_string()))?;
        Ok(FrameIndex::from(idx))
    }

    pub fn free(&mut self, frame: FrameIndex, mem: &mut PhysicalMemory) -> VmResult<()> {
        mem.page_mut(frame).fill(0);
        self.bitmap
            .clear(frame.as_usize())
            .map_err(|e| VmError::Assertion(e.to_string()))?;
        Ok(())
    }

    pub fn free_count(&self) -> usize {
        self.bitmap.count_set()
    }
}
