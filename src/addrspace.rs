//! The address space (component E): a per-process page table plus the
//! parallel array of swap-slot offsets assigned at creation.

use shared::index::{FrameIndex, VirtPage};

use crate::debug::{DebugEvent, DebugLog};
use crate::error::{VmError, VmResult};
use crate::swap::SwapStore;

/// Marks `physical_frame` meaningless; only valid when `valid` is set.
pub const SENTINEL_FRAME: FrameIndex = FrameIndex::new(u32::MAX);

#[derive(Clone, Copy, Debug)]
pub struct PageTableEntry {
    pub virtual_page: VirtPage,
    pub physical_frame: FrameIndex,
    pub valid: bool,
    pub use_bit: bool,
    pub dirty: bool,
    pub read_only: bool,
}

impl PageTableEntry {
    fn new(virtual_page: VirtPage) -> Self {
        PageTableEntry {
            virtual_page,
            physical_frame: SENTINEL_FRAME,
            valid: false,
            use_bit: false,
            dirty: false,
            read_only: false,
        }
    }
}

/// Opaque process descriptor; the VM core only ever needs the PID for
/// logging and the observable debug stream.
#[derive(Clone, Copy, Debug)]
pub struct Pcb {
    pub pid: u64,
}

pub struct AddressSpace {
    pub num_pages: usize,
    pub page_table: Vec<PageTableEntry>,
    pub swap_slot: Vec<u64>,
    pub pcb: Pcb,
    destroyed: bool,
}

impl AddressSpace {
    /// Allocates a page table and a swap slot for every page of a space of
    /// `num_pages` pages, pre-zeroing every slot so uninitialized pages read
    /// as zero on first fault. Rolls back every slot already taken if swap
    /// is exhausted partway through.
    pub fn new(
        num_pages: usize,
        pcb: Pcb,
        swap: &mut SwapStore,
        page_size: usize,
        debug: &mut DebugLog,
    ) -> VmResult<Self> {
        let mut page_table = Vec::with_capacity(num_pages);
        let mut swap_slot: Vec<u64> = Vec::with_capacity(num_pages);
        let zero = vec![0u8; page_size];

        for i in 0..num_pages {
            page_table.push(PageTableEntry::new(VirtPage::from(i)));

            let slot = match swap.alloc_sector() {
                Ok(slot) => slot,
                Err(_) => {
                    for &s in &swap_slot {
                        let _ = swap.free_sector(s);
                    }
                    return Err(VmError::SwapExhausted);
                }
            };

            if let Err(err) = swap.write_page(&zero, page_size, slot) {
                let _ = swap.free_sector(slot);
                for &s in &swap_slot {
                    let _ = swap.free_sector(s);
                }
                return Err(err);
            }

            debug.record(DebugEvent::SwapPreallocated {
                pid: pcb.pid,
                swap_page: slot / page_size as u64,
            });
            swap_slot.push(slot);
        }

        debug_assert_eq!(page_table.len(), num_pages);
        debug_assert_eq!(swap_slot.len(), num_pages);

        Ok(AddressSpace {
            num_pages,
            page_table,
            swap_slot,
            pcb,
            destroyed: false,
        })
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_swap(sectors: usize, page_size: usize) -> SwapStore {
        let path = tempfile::NamedTempFile::new()
            .unwrap()
            .into_temp_path()
            .keep()
            .unwrap();
        SwapStore::create(path, sectors, page_size).unwrap()
    }

    #[test]
    fn creation_zero_fills_every_slot_and_marks_nothing_resident() {
        let mut swap = temp_swap(8, 8);
        let mut debug = DebugLog::new();
        let space = AddressSpace::new(4, Pcb { pid: 1 }, &mut swap, 8, &mut debug).unwrap();

        assert_eq!(space.page_table.len(), 4);
        assert_eq!(space.swap_slot.len(), 4);
        for entry in &space.page_table {
            assert!(!entry.valid);
            assert!(!entry.dirty);
            assert!(!entry.use_bit);
        }

        let mut buf = [0xffu8; 8];
        swap.read_page(&mut buf, space.swap_slot[0]).unwrap();
        assert_eq!(buf, [0u8; 8]);
    }

    #[test]
    fn swap_slots_are_pairwise_distinct() {
        let mut swap = temp_swap(8, 8);
        let mut debug = DebugLog::new();
        let space = AddressSpace::new(4, Pcb { pid: 1 }, &mut swap, 8, &mut debug).unwrap();

        let mut seen = std::collections::BTreeSet::new();
        for &slot in &space.swap_slot {
            assert!(seen.insert(slot));
        }
    }

    #[test]
    fn creation_records_one_debug_event_per_page() {
        let mut swap = temp_swap(8, 8);
        let mut debug = DebugLog::new();
        let _space = AddressSpace::new(3, Pcb { pid: 9 }, &mut swap, 8, &mut debug).unwrap();

        assert_eq!(debug.events().len(), 3);
        assert!(matches!(
            debug.events()[0],
            DebugEvent::SwapPreallocated { pid: 9, .. }
        ));
    }

    #[test]
    fn exhaustion_rolls_back_every_slot_taken() {
        let mut swap = temp_swap(4, 8);
        let mut debug = DebugLog::new();
        let result = AddressSpace::new(5, Pcb { pid: 1 }, &mut swap, 8, &mut debug);

        assert!(matches!(result, Err(VmError::SwapExhausted)));
        assert_eq!(swap.free_count(), 4);
    }
}
