//! The frame table (component D): maps each resident physical frame back to
//! its owning address space and the virtual page residing there.

use shared::index::{FrameIndex, SpaceId, VirtPage};

#[derive(Clone, Copy, Debug)]
pub struct FrameInfo {
    pub owner: Option<SpaceId>,
    pub vpage: VirtPage,
}

impl FrameInfo {
    fn unowned() -> Self {
        FrameInfo {
            owner: None,
            vpage: VirtPage::new(0),
        }
    }
}

pub struct FrameTable {
    entries: Vec<FrameInfo>,
}

impl FrameTable {
    pub fn new(num_phys_pages: usize) -> Self {
        FrameTable {
            entries: vec![FrameInfo::unowned(); num_phys_pages],
        }
    }

    pub fn get(&self, frame: FrameIndex) -> &FrameInfo {
        &self.entries[frame.as_usize()]
    }

    pub fn set(&mut self, frame: FrameIndex, owner: SpaceId, vpage: VirtPage) {
        self.entries[frame.as_usize()] = FrameInfo {
            owner: Some(owner),
            vpage,
        };
    }

    pub fn clear(&mut self, frame: FrameIndex) {
        self.entries[frame.as_usize()] = FrameInfo::unowned();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
