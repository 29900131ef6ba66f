//! Small newtype indices shared between the allocator and the kernel crate.
//!
//! Modeled on the address/length newtype pattern used for byte-granular
//! addresses elsewhere in this style of codebase, but simplified: these are
//! plain slot indices (a frame number, a virtual page number), not byte
//! offsets, so no alignment or pointer arithmetic is needed. Swap sector
//! offsets are plain `u64` byte offsets, not a slot index, so they are not
//! one of these newtypes.

use std::fmt;

macro_rules! index_type {
    ($name:ident) => {
        #[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Hash)]
        pub struct $name(u32);

        impl $name {
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            pub const fn as_usize(self) -> usize {
                self.0 as usize
            }

            pub const fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<usize> for $name {
            fn from(raw: usize) -> Self {
                Self(raw as u32)
            }
        }

        impl From<$name> for usize {
            fn from(v: $name) -> usize {
                v.as_usize()
            }
        }
    };
}

index_type!(FrameIndex);
index_type!(VirtPage);

static_assertions::assert_eq_size!(FrameIndex, u32);
static_assertions::assert_eq_size!(VirtPage, u32);

/// Identifies an address space to the virtual memory manager. Opaque: the
/// manager never dereferences it, it only uses it as a key into a process
/// directory.
#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd, Hash, Debug)]
pub struct SpaceId(u64);

impl SpaceId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}
