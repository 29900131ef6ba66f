//! The virtual memory manager (component F): owns the swap store, the frame
//! table, the frame allocator, and the clock hand. Services page faults and
//! address-space teardown.

use shared::index::{FrameIndex, SpaceId, VirtPage};

use crate::addrspace::{AddressSpace, SENTINEL_FRAME};
use crate::debug::{DebugEvent, DebugLog};
use crate::error::{VmError, VmResult};
use crate::frame_alloc::{FrameAllocator, PhysicalMemory};
use crate::frame_table::FrameTable;
use crate::process::ProcessDirectory;
use crate::swap::SwapStore;

pub struct VirtualMemoryManager {
    frame_table: FrameTable,
    frame_alloc: FrameAllocator,
    swap: SwapStore,
    mem: PhysicalMemory,
    clock_hand: usize,
    page_size: usize,
    num_phys_pages: usize,
}

impl VirtualMemoryManager {
    pub fn new(num_phys_pages: usize, page_size: usize, swap: SwapStore) -> Self {
        VirtualMemoryManager {
            frame_table: FrameTable::new(num_phys_pages),
            frame_alloc: FrameAllocator::new(num_phys_pages),
            swap,
            mem: PhysicalMemory::new(num_phys_pages, page_size),
            clock_hand: 0,
            page_size,
            num_phys_pages,
        }
    }

    pub fn free_count(&self) -> usize {
        self.frame_alloc.free_count()
    }

    pub fn mem(&self) -> &PhysicalMemory {
        &self.mem
    }

    pub fn mem_mut(&mut self) -> &mut PhysicalMemory {
        &mut self.mem
    }

    pub fn swap(&self) -> &SwapStore {
        &self.swap
    }

    pub fn swap_mut(&mut self) -> &mut SwapStore {
        &mut self.swap
    }

    pub fn frame_table(&self) -> &FrameTable {
        &self.frame_table
    }

    pub fn clock_hand(&self) -> usize {
        self.clock_hand
    }

    /// Services a page fault at `faulting_virt_addr` for `space_id`, resolved
    /// through `directory` rather than an owned reference (see the cyclic-
    /// references design note).
    pub fn page_in(
        &mut self,
        directory: &mut impl ProcessDirectory,
        space_id: SpaceId,
        faulting_virt_addr: u64,
    ) -> VmResult<()> {
        let p = (faulting_virt_addr / self.page_size as u64) as usize;

        if self.frame_alloc.free_count() > 0 {
            let frame = self.frame_alloc.alloc()?;
            log::trace!("page_in: free frame {} available for page {p}", frame.as_usize());
            return self.load_into_frame(directory, space_id, p, frame);
        }

        self.page_in_via_second_chance(directory, space_id, p)
    }

    fn load_into_frame(
        &mut self,
        directory: &mut impl ProcessDirectory,
        space_id: SpaceId,
        p: usize,
        frame: FrameIndex,
    ) -> VmResult<()> {
        self.frame_table.set(frame, space_id, VirtPage::from(p));

        let space = directory
            .space_mut(space_id)
            .ok_or_else(|| VmError::Assertion("faulting address space not found".into()))?;
        space.page_table[p].physical_frame = frame;
        let slot = space.swap_slot[p];

        self.swap.read_page(self.mem.page_mut(frame), slot)?;
        // Re-borrow: the read above only needed `self.mem`/`self.swap`, not
        // `space`, so this is a fresh, independent borrow.
        let space = directory
            .space_mut(space_id)
            .ok_or_else(|| VmError::Assertion("faulting address space not found".into()))?;
        space.page_table[p].valid = true;

        Ok(())
    }

    /// The second-chance clock. Follows the textbook variant named in the
    /// design notes: the clock hand advances on every skip, not only on
    /// eviction, and the victim frame comes from wherever the clock hand
    /// currently points, never re-derived from the allocator.
    fn page_in_via_second_chance(
        &mut self,
        directory: &mut impl ProcessDirectory,
        space_id: SpaceId,
        p: usize,
    ) -> VmResult<()> {
        for _ in 0..2 * self.num_phys_pages {
            let i = self.clock_hand;
            let frame = FrameIndex::from(i);
            let info = *self.frame_table.get(frame);
            let owner = info
                .owner
                .ok_or_else(|| VmError::Assertion("resident frame with no owner".into()))?;

            if owner == space_id && info.vpage.as_usize() == p {
                return Err(VmError::Assertion(
                    "the faulting page cannot be selected as its own victim".into(),
                ));
            }

            let victim_space = directory
                .space_mut(owner)
                .ok_or_else(|| VmError::Assertion("frame table owner not found".into()))?;
            let entry = &mut victim_space.page_table[info.vpage.as_usize()];

            if entry.use_bit {
                entry.use_bit = false;
                self.clock_hand = (i + 1) % self.num_phys_pages;
                continue;
            }

            if entry.dirty && entry.read_only {
                log::warn!("read-only page marked dirty at eviction; skipping write-back (I5)");
            }

            if entry.valid && entry.dirty && !entry.read_only {
                let bytes = self.mem.page(frame).to_vec();
                self.swap
                    .write_page(&bytes, self.page_size, victim_space.swap_slot[info.vpage.as_usize()])?;
            }
            entry.valid = false;
            entry.physical_frame = SENTINEL_FRAME;

            self.frame_table.set(frame, space_id, VirtPage::from(p));

            let space = directory
                .space_mut(space_id)
                .ok_or_else(|| VmError::Assertion("faulting address space not found".into()))?;
            space.page_table[p].physical_frame = frame;
            let slot = space.swap_slot[p];

            self.swap.read_page(self.mem.page_mut(frame), slot)?;

            let space = directory
                .space_mut(space_id)
                .ok_or_else(|| VmError::Assertion("faulting address space not found".into()))?;
            space.page_table[p].valid = true;

            self.clock_hand = (i + 1) % self.num_phys_pages;
            return Ok(());
        }

        panic!("second-chance clock found no victim in 2*NumPhysPages iterations");
    }

    /// Frees every resident frame and every swap slot of `space`, recording
    /// one debug event per frame released. After this, the space is
    /// destroyed; no further operation on it is legal.
    pub fn release(&mut self, space: &mut AddressSpace, debug: &mut DebugLog) -> VmResult<()> {
        for i in 0..space.num_pages {
            let entry = space.page_table[i];
            if entry.valid {
                self.frame_alloc.free(entry.physical_frame, &mut self.mem)?;
                self.frame_table.clear(entry.physical_frame);
                debug.record(DebugEvent::FrameReleased {
                    pid: space.pcb.pid,
                    vpage: i as u64,
                });
            }
            self.swap.free_sector(space.swap_slot[i])?;
        }
        space.mark_destroyed();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;
    use crate::addrspace::Pcb;
    use crate::process::SimpleProcessDirectory;

    fn temp_swap(sectors: usize, page_size: usize) -> SwapStore {
        let path = tempfile::NamedTempFile::new()
            .unwrap()
            .into_temp_path()
            .keep()
            .unwrap();
        SwapStore::create(path, sectors, page_size).unwrap()
    }

    fn make_space(
        directory: &mut SimpleProcessDirectory,
        id: SpaceId,
        num_pages: usize,
        swap: &mut SwapStore,
        page_size: usize,
        debug: &mut DebugLog,
    ) {
        let space = AddressSpace::new(num_pages, Pcb { pid: id.as_raw() }, swap, page_size, debug).unwrap();
        directory.insert(id, space);
    }

    #[test]
    fn single_fault_with_free_frames_assigns_frame_zero() {
        let mut swap = temp_swap(8, 8);
        let mut debug = DebugLog::new();
        let mut directory = SimpleProcessDirectory::new();
        let space_id = SpaceId::new(0);
        make_space(&mut directory, space_id, 2, &mut swap, 8, &mut debug);

        let mut vm = VirtualMemoryManager::new(4, 8, swap);
        vm.page_in(&mut directory, space_id, 0).unwrap();

        let space = directory.get(space_id).unwrap();
        let entry = space.page_table[0];
        assert_eq!(entry.physical_frame.as_usize(), 0);
        assert!(entry.valid);
        assert!(!entry.use_bit);
        assert!(!entry.dirty);
        assert_eq!(vm.frame_table().get(FrameIndex::from(0usize)).owner, Some(space_id));
    }

    #[test]
    fn second_chance_clock_evicts_the_only_unused_frame() {
        let mut swap = temp_swap(8, 8);
        let mut debug = DebugLog::new();
        let mut directory = SimpleProcessDirectory::new();
        let space_id = SpaceId::new(0);
        make_space(&mut directory, space_id, 3, &mut swap, 8, &mut debug);

        let mut vm = VirtualMemoryManager::new(2, 8, swap);

        vm.page_in(&mut directory, space_id, 0).unwrap();
        directory
            .space_mut(space_id)
            .unwrap()
            .page_table[0]
            .use_bit = true;

        vm.page_in(&mut directory, space_id, 8).unwrap();
        directory
            .space_mut(space_id)
            .unwrap()
            .page_table[1]
            .use_bit = true;

        vm.page_in(&mut directory, space_id, 16).unwrap();

        let space = directory.get(space_id).unwrap();
        assert!(!space.page_table[0].valid, "page 0 should have been evicted");
        assert!(space.page_table[1].valid);
        assert!(space.page_table[2].valid);
        assert_eq!(space.page_table[2].physical_frame.as_usize(), 0);
        assert_eq!(space.page_table[1].physical_frame.as_usize(), 1);
    }

    #[test]
    fn dirty_eviction_writes_back_before_reuse() {
        let mut swap = temp_swap(8, 8);
        let mut debug = DebugLog::new();
        let mut directory = SimpleProcessDirectory::new();
        let space_id = SpaceId::new(0);
        make_space(&mut directory, space_id, 3, &mut swap, 8, &mut debug);

        let mut vm = VirtualMemoryManager::new(2, 8, swap);

        vm.page_in(&mut directory, space_id, 0).unwrap();
        directory.space_mut(space_id).unwrap().page_table[0].use_bit = true;
        directory.space_mut(space_id).unwrap().page_table[0].dirty = true;
        vm.mem_mut().page_mut(FrameIndex::from(0usize)).copy_from_slice(&[9; 8]);

        vm.page_in(&mut directory, space_id, 8).unwrap();
        directory.space_mut(space_id).unwrap().page_table[1].use_bit = true;

        vm.page_in(&mut directory, space_id, 16).unwrap();

        let swap_slot_0 = directory.get(space_id).unwrap().swap_slot[0];
        let mut buf = [0u8; 8];
        vm.swap_mut().read_page(&mut buf, swap_slot_0).unwrap();
        assert_eq!(buf, [9; 8]);
    }

    #[test]
    fn read_only_dirty_page_is_never_written_back_on_eviction() {
        let mut swap = temp_swap(8, 8);
        let mut debug = DebugLog::new();
        let mut directory = SimpleProcessDirectory::new();
        let space_id = SpaceId::new(0);
        make_space(&mut directory, space_id, 3, &mut swap, 8, &mut debug);

        let mut vm = VirtualMemoryManager::new(2, 8, swap);

        vm.page_in(&mut directory, space_id, 0).unwrap();
        {
            let entry = &mut directory.space_mut(space_id).unwrap().page_table[0];
            // Manufactured violation of I5 (a read-only page must never be
            // dirty): eviction must still skip the write-back rather than
            // trust `dirty`.
            entry.read_only = true;
            entry.dirty = true;
        }
        vm.mem_mut().page_mut(FrameIndex::from(0usize)).copy_from_slice(&[9; 8]);

        vm.page_in(&mut directory, space_id, 8).unwrap();
        directory.space_mut(space_id).unwrap().page_table[1].use_bit = true;

        // Evicts page 0 (use_bit false), which would write back [9; 8] if
        // the read-only flag were ignored.
        vm.page_in(&mut directory, space_id, 16).unwrap();

        let swap_slot_0 = directory.get(space_id).unwrap().swap_slot[0];
        let mut buf = [0u8; 8];
        vm.swap_mut().read_page(&mut buf, swap_slot_0).unwrap();
        assert_eq!(buf, [0u8; 8], "read-only page must not be written back even if marked dirty");
    }

    #[test]
    fn release_frees_every_frame_and_swap_slot() {
        let mut swap = temp_swap(8, 8);
        let mut debug = DebugLog::new();
        let mut directory = SimpleProcessDirectory::new();
        let space_id = SpaceId::new(0);
        make_space(&mut directory, space_id, 3, &mut swap, 8, &mut debug);

        let mut vm = VirtualMemoryManager::new(4, 8, swap);
        vm.page_in(&mut directory, space_id, 0).unwrap();
        vm.page_in(&mut directory, space_id, 8).unwrap();

        let mut space = directory.remove(space_id).unwrap();
        vm.release(&mut space, &mut debug).unwrap();

        assert_eq!(vm.free_count(), 4);
        assert_eq!(vm.swap().free_count(), 8);
        assert!(space.is_destroyed());
        assert_eq!(
            debug.events().iter().filter(|e| matches!(e, DebugEvent::FrameReleased { .. })).count(),
            2
        );
    }

    #[test]
    fn single_frame_machine_always_succeeds_across_distinct_pages() {
        let mut swap = temp_swap(8, 8);
        let mut debug = DebugLog::new();
        let mut directory = SimpleProcessDirectory::new();
        let space_id = SpaceId::new(0);
        make_space(&mut directory, space_id, 4, &mut swap, 8, &mut debug);

        let mut vm = VirtualMemoryManager::new(1, 8, swap);
        for page in 0..4u64 {
            vm.page_in(&mut directory, space_id, page * 8).unwrap();
            assert_eq!(vm.free_count(), 0);
        }
    }
}
