//! Loader glue (component G): NOFF header parsing and scattering an
//! executable's segments into a freshly constructed address space's swap
//! slots.

use crate::addrspace::{AddressSpace, Pcb};
use crate::debug::DebugLog;
use crate::error::{VmError, VmResult};
use crate::swap::SwapStore;

/// `NOFFMAGIC`, the identifying word at the start of every header.
const NOFF_MAGIC: u32 = 0xbadfad;

/// Number of 32-bit words in a NOFF header: magic plus three segment
/// descriptors of three words each.
const NOFF_HEADER_WORDS: usize = 1 + 3 * 3;

#[derive(Clone, Copy, Debug)]
pub struct Segment {
    pub size: u32,
    pub virtual_addr: u32,
    pub in_file_addr: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct NoffHeader {
    pub code: Segment,
    pub init_data: Segment,
    pub uninit_data: Segment,
}

impl NoffHeader {
    /// Parses the header from the first bytes of `raw`, byte-swapping every
    /// field if the magic word indicates the opposite endianness.
    pub fn parse(raw: &[u8]) -> VmResult<Self> {
        if raw.len() < NOFF_HEADER_WORDS * 4 {
            return Err(VmError::BadExecutable);
        }

        let mut words = [0u32; NOFF_HEADER_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            let bytes: [u8; 4] = raw[i * 4..i * 4 + 4].try_into().unwrap();
            *word = u32::from_ne_bytes(bytes);
        }

        let swap_needed = if words[0] == NOFF_MAGIC {
            false
        } else if words[0].swap_bytes() == NOFF_MAGIC {
            true
        } else {
            return Err(VmError::BadExecutable);
        };

        if swap_needed {
            for word in &mut words {
                *word = word.swap_bytes();
            }
        }

        Ok(NoffHeader {
            code: Segment {
                size: words[1],
                virtual_addr: words[2],
                in_file_addr: words[3],
            },
            init_data: Segment {
                size: words[4],
                virtual_addr: words[5],
                in_file_addr: words[6],
            },
            uninit_data: Segment {
                size: words[7],
                virtual_addr: words[8],
                in_file_addr: words[9],
            },
        })
    }
}

/// Reads `size` bytes of `exe` starting at `file_off` and scatters them into
/// the swap slots covering `[virt, virt + size)`. Tolerates a short read:
/// the space's slots were already zero-filled at construction, so a
/// partial segment just leaves the remainder as zero. Returns the number of
/// bytes actually written.
pub fn load_segment(
    swap: &mut SwapStore,
    swap_slot: &[u64],
    page_size: usize,
    exe: &[u8],
    virt: u32,
    file_off: u32,
    size: u32,
) -> VmResult<u32> {
    let mut remaining = size as usize;
    let mut virt = virt as usize;
    let mut file_pos = file_off as usize;
    let mut total = 0u32;

    while remaining > 0 {
        let page = virt / page_size;
        let offset = virt % page_size;
        let chunk = remaining.min(page_size - offset);

        let available = exe.len().saturating_sub(file_pos);
        let read_len = chunk.min(available);
        if read_len == 0 {
            break;
        }

        swap.write_page(
            &exe[file_pos..file_pos + read_len],
            read_len,
            swap_slot[page] + offset as u64,
        )?;
        total += read_len as u32;

        if read_len < chunk {
            break;
        }

        virt += chunk;
        file_pos += chunk;
        remaining -= chunk;
    }

    Ok(total)
}

/// Runs the full creation algorithm: parse the header, size the space,
/// allocate and zero-fill every swap slot, then scatter the code and
/// initialized-data segments into place. `uninitData` has no backing bytes
/// and needs no segment load; the zero-fill from construction already
/// covers it.
pub fn from_executable(
    exe: &[u8],
    pcb: Pcb,
    page_size: usize,
    user_stack_size: usize,
    swap: &mut SwapStore,
    debug: &mut DebugLog,
) -> VmResult<AddressSpace> {
    let header = NoffHeader::parse(exe)?;

    let size = header.code.size as usize
        + header.init_data.size as usize
        + header.uninit_data.size as usize
        + user_stack_size;
    let num_pages = size.div_ceil(page_size);

    let space = AddressSpace::new(num_pages, pcb, swap, page_size, debug)?;

    if header.code.size > 0 {
        load_segment(
            swap,
            &space.swap_slot,
            page_size,
            exe,
            header.code.virtual_addr,
            header.code.in_file_addr,
            header.code.size,
        )?;
    }
    if header.init_data.size > 0 {
        load_segment(
            swap,
            &space.swap_slot,
            page_size,
            exe,
            header.init_data.virtual_addr,
            header.init_data.in_file_addr,
            header.init_data.size,
        )?;
    }

    Ok(space)
}
