//! The process-directory seam named in the cyclic-references design note:
//! the virtual memory manager never owns an `AddressSpace`, it only resolves
//! a `SpaceId` through whatever owns the process table. The thread layer
//! that would normally own this is out of scope, so this module provides a
//! small concrete directory good enough to drive the manager standalone.

use std::collections::BTreeMap;

use shared::index::SpaceId;

use crate::addrspace::AddressSpace;

pub trait ProcessDirectory {
    fn space_mut(&mut self, id: SpaceId) -> Option<&mut AddressSpace>;
}

#[derive(Default)]
pub struct SimpleProcessDirectory {
    spaces: BTreeMap<SpaceId, AddressSpace>,
}

impl SimpleProcessDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: SpaceId, space: AddressSpace) {
        self.spaces.insert(id, space);
    }

    pub fn remove(&mut self, id: SpaceId) -> Option<AddressSpace> {
        self.spaces.remove(&id)
    }

    pub fn get(&self, id: SpaceId) -> Option<&AddressSpace> {
        self.spaces.get(&id)
    }
}

impl ProcessDirectory for SimpleProcessDirectory {
    fn space_mut(&mut self, id: SpaceId) -> Option<&mut AddressSpace> {
        self.spaces.get_mut(&id)
    }
}
