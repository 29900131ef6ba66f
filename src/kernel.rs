//! The `Kernel` context named in the global-state design note: the source's
//! `virtualMemoryManager`/`memoryManager`/`machine`/`currentThread`
//! singletons collapsed into one value, assembled once and threaded
//! explicitly into every operation. The single `Mutex` is the "big VM lock"
//! hook point a future multi-CPU host would hold across these calls; on
//! this single-CPU-cooperative host it is never contended.

use std::path::Path;
use std::sync::Mutex;

use shared::index::SpaceId;

use crate::addrspace::Pcb;
use crate::debug::DebugEvent;
use crate::error::{VmError, VmResult};
use crate::loader;
use crate::process::SimpleProcessDirectory;
use crate::swap::SwapStore;
use crate::vm::VirtualMemoryManager;

struct KernelState {
    vm: VirtualMemoryManager,
    processes: SimpleProcessDirectory,
    debug: crate::debug::DebugLog,
    next_space_id: u64,
}

pub struct Kernel {
    state: Mutex<KernelState>,
    page_size: usize,
}

impl Kernel {
    pub fn new(
        num_phys_pages: usize,
        page_size: usize,
        swap_path: impl AsRef<Path>,
        swap_sectors: usize,
    ) -> VmResult<Self> {
        let swap = SwapStore::create(swap_path, swap_sectors, page_size)?;
        let vm = VirtualMemoryManager::new(num_phys_pages, page_size, swap);

        Ok(Kernel {
            state: Mutex::new(KernelState {
                vm,
                processes: SimpleProcessDirectory::new(),
                debug: crate::debug::DebugLog::new(),
                next_space_id: 0,
            }),
            page_size,
        })
    }

    /// Parses `exe` as a NOFF executable and creates a fresh address space
    /// for it, pre-staging every page in swap. Returns the id the caller
    /// will use for subsequent faults and teardown.
    pub fn create_process(&self, exe: &[u8], pid: u64, user_stack_size: usize) -> VmResult<SpaceId> {
        let mut state = self.state.lock().unwrap();
        let space_id = SpaceId::new(state.next_space_id);
        state.next_space_id += 1;

        let page_size = self.page_size;
        let KernelState {
            vm,
            debug,
            processes,
            ..
        } = &mut *state;

        let space = loader::from_executable(
            exe,
            Pcb { pid },
            page_size,
            user_stack_size,
            vm.swap_mut(),
            debug,
        )?;
        processes.insert(space_id, space);

        log::info!("created process {pid} as space {}", space_id.as_raw());
        Ok(space_id)
    }

    /// Services a page fault for `space_id` at `faulting_virt_addr`.
    pub fn page_in(&self, space_id: SpaceId, faulting_virt_addr: u64) -> VmResult<()> {
        let mut state = self.state.lock().unwrap();
        let KernelState { vm, processes, .. } = &mut *state;
        vm.page_in(processes, space_id, faulting_virt_addr)
    }

    /// Tears down `space_id`: releases every resident frame and every swap
    /// slot it holds. After this call the id is no longer valid.
    pub fn destroy_process(&self, space_id: SpaceId) -> VmResult<()> {
        let mut state = self.state.lock().unwrap();
        let KernelState {
            vm,
            processes,
            debug,
            ..
        } = &mut *state;

        let mut space = processes
            .remove(space_id)
            .ok_or_else(|| VmError::Assertion("destroy_process: unknown space id".into()))?;
        vm.release(&mut space, debug)
    }

    pub fn free_count(&self) -> usize {
        self.state.lock().unwrap().vm.free_count()
    }

    /// A snapshot of the observable debug stream recorded so far.
    pub fn debug_events(&self) -> Vec<DebugEvent> {
        self.state.lock().unwrap().debug.events().to_vec()
    }
}
