use std::fs::File;
use std::io;
use std::mem::size_of;
use std::num::NonZeroUsize;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::{Mmap, MmapOptions};

/// The largest number of bytes a single mapping is allowed to span.
const MAX_BLOCK_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// The index file seen as one contiguous little-endian address space.
///
/// Files too large for a single mapping are stitched from several mappings.
/// Every block spans a whole number of nodes, so a node-relative read never
/// crosses a block boundary.
pub struct Storage {
    blocks: Vec<Block>,
    block_bytes: u64,
    node_size: usize,
    len: u64,
}

struct Block {
    map: Mmap,
    /// Bytes to skip at the start of the mapping: mmap offsets must sit on
    /// a page boundary, block boundaries usually do not.
    skew: usize,
}

impl Storage {
    /// Maps `len` bytes of `file` in blocks of `block_nodes` whole nodes,
    /// defaulting to the largest node multiple below 2 GiB.
    pub fn map(
        file: &File,
        len: u64,
        node_size: usize,
        block_nodes: Option<NonZeroUsize>,
    ) -> io::Result<Storage> {
        let block_bytes = match block_nodes {
            Some(nodes) => nodes.get() as u64 * node_size as u64,
            None => (MAX_BLOCK_BYTES / node_size as u64).max(1) * node_size as u64,
        };

        let page_size = page_size::get() as u64;
        let mut blocks = Vec::with_capacity(len.div_ceil(block_bytes) as usize);
        let mut start = 0;
        while start < len {
            let end = (start + block_bytes).min(len);
            let aligned = start - (start % page_size);
            let skew = (start - aligned) as usize;
            // safety: the file stays read-only for the whole storage lifetime
            let map = unsafe {
                MmapOptions::new().offset(aligned).len(skew + (end - start) as usize).map(file)?
            };
            blocks.push(Block { map, skew });
            start = end;
        }

        Ok(Storage { blocks, block_bytes, node_size, len })
    }

    /// The total number of addressable bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Reads the little-endian i32 at `offset`. All reads are node-relative
    /// and therefore never cross a block boundary.
    pub fn read_i32(&self, offset: u64) -> i32 {
        LittleEndian::read_i32(self.slice(offset, size_of::<i32>()))
    }

    /// Reads the little-endian IEEE-754 f32 at `offset`.
    pub fn read_f32(&self, offset: u64) -> f32 {
        LittleEndian::read_f32(self.slice(offset, size_of::<f32>()))
    }

    /// Returns the whole node starting at `offset`.
    pub fn node_bytes(&self, offset: u64) -> &[u8] {
        self.slice(offset, self.node_size)
    }

    fn slice(&self, offset: u64, len: usize) -> &[u8] {
        let block = &self.blocks[(offset / self.block_bytes) as usize];
        let within = block.skew + (offset % self.block_bytes) as usize;
        &block.map[within..within + len]
    }
}
