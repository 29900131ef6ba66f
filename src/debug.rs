//! The observable debug stream named by the external interface contract:
//! one line per significant event, in the order the events occur, so tests
//! can assert on exact ordering without scraping formatted log text.

use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DebugEvent {
    /// A swap slot was pre-allocated for a page at address-space creation.
    SwapPreallocated { pid: u64, swap_page: u64 },
    /// A frame was released back to the allocator at address-space teardown.
    FrameReleased { pid: u64, vpage: u64 },
}

impl fmt::Display for DebugEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugEvent::SwapPreallocated { pid, swap_page } => write!(f, "Z {pid}: {swap_page}"),
            DebugEvent::FrameReleased { pid, vpage } => write!(f, "E {pid}: {vpage}"),
        }
    }
}

#[derive(Default)]
pub struct DebugLog(Vec<DebugEvent>);

impl DebugLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: DebugEvent) {
        log::trace!("{event}");
        self.0.push(event);
    }

    pub fn events(&self) -> &[DebugEvent] {
        &self.0
    }
}
