use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::fs::File;
use std::num::NonZeroUsize;
use std::path::Path;

use ordered_float::OrderedFloat;
use tracing::debug;

use crate::distance::DistanceType;
use crate::node::{Node, UnalignedF32Slice};
use crate::storage::Storage;
use crate::{Error, ItemId, Result};

/// A read-only reader over an Annoy index file.
///
/// The reader is immutable once opened: every query carries its own heap
/// and candidate scratch, so independent threads can query the same reader
/// concurrently through a shared reference. [`Reader::close`] releases the
/// mappings early; dropping the reader does the same.
pub struct Reader {
    dimensions: usize,
    distance_type: DistanceType,
    node_size: usize,
    n_items: usize,
    max_descendants: i32,
    roots: Vec<u64>,
    storage: Option<Storage>,
}

impl Reader {
    /// Memory-maps the index file at `path` and locates the tree roots.
    ///
    /// `block_nodes` caps the size of a single mapping, expressed in whole
    /// nodes; `None` picks the largest block fitting in 2 GiB. The file
    /// length must be a non-zero multiple of the node size, anything else
    /// means the declared `dimensions` do not match the file.
    pub fn open(
        path: impl AsRef<Path>,
        dimensions: usize,
        distance_type: DistanceType,
        block_nodes: Option<NonZeroUsize>,
    ) -> Result<Reader> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let node_size = distance_type.node_size(dimensions);

        if file_size == 0 {
            return Err(Error::EmptyIndex);
        }
        if file_size % node_size as u64 != 0 {
            return Err(Error::UnevenFileSize { file_size, node_size });
        }

        let storage = Storage::map(&file, file_size, node_size, block_nodes)?;

        // The roots are the contiguous suffix of nodes all sharing the
        // descendant count of the very last node. That shared count is also
        // the number of items stored in the index.
        let last = file_size - node_size as u64;
        let m = storage.read_i32(last);
        let mut roots = vec![last];
        let mut offset = last;
        while let Some(previous) = offset.checked_sub(node_size as u64) {
            if storage.read_i32(previous) != m {
                break;
            }
            roots.push(previous);
            offset = previous;
        }

        if m < 0 {
            return Err(Error::ImpossibleDescendantCount(m));
        }

        debug!(
            n_items = m,
            n_trees = roots.len(),
            n_blocks = storage.n_blocks(),
            "opened a {distance_type} index of {file_size} bytes"
        );

        Ok(Reader {
            dimensions,
            distance_type,
            node_size,
            n_items: m as usize,
            max_descendants: dimensions as i32 + 2,
            roots,
            storage: Some(storage),
        })
    }

    /// The number of dimensions of the indexed vectors.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// The number of items stored in the index.
    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// The number of trees of the forest.
    pub fn n_trees(&self) -> usize {
        self.roots.len()
    }

    /// The size in bytes of one node of this index.
    pub fn node_size(&self) -> usize {
        self.node_size
    }

    /// Releases the mappings; every query afterwards fails with
    /// [`Error::AlreadyClosed`]. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.storage = None;
    }

    /// Returns the vector stored for `item`.
    ///
    /// The vector region is returned exactly as stored, the all-zero
    /// "deleted" sentinel included.
    pub fn item_vector(&self, item: ItemId) -> Result<Vec<f32>> {
        let storage = self.storage()?;
        if (item as usize) < self.n_items {
            Ok(self.item_slice(storage, item).to_vec())
        } else {
            Err(Error::ItemOutOfRange { item, n_items: self.n_items })
        }
    }

    /// Returns the `count` items closest to `item`, best first, with their
    /// metric-natural score.
    ///
    /// `search_k` bounds how many distinct candidates the descent collects
    /// before re-ranking and defaults to `count` times the number of trees;
    /// raising it trades speed for accuracy.
    pub fn nns_by_item(
        &self,
        item: ItemId,
        count: usize,
        search_k: Option<NonZeroUsize>,
    ) -> Result<Vec<(ItemId, f32)>> {
        let query_vector = self.item_vector(item)?;
        self.nns_by_vector(&query_vector, count, search_k)
    }

    /// Returns the `count` items closest to `query_vector`, best first,
    /// with their metric-natural score.
    ///
    /// See [`Reader::nns_by_item`] for the `search_k` knob.
    pub fn nns_by_vector(
        &self,
        query_vector: &[f32],
        count: usize,
        search_k: Option<NonZeroUsize>,
    ) -> Result<Vec<(ItemId, f32)>> {
        let storage = self.storage()?;
        if query_vector.len() != self.dimensions {
            return Err(Error::InvalidVecDimension {
                expected: self.dimensions,
                received: query_vector.len(),
            });
        }

        let query = UnalignedF32Slice::from_slice(query_vector);
        let search_k = search_k.map_or(count * self.roots.len(), NonZeroUsize::get);

        // Descend all the trees at once through a single max-heap. The
        // roots enter with a priority dominating every real margin; deeper
        // nodes enter keyed by their signed split margin.
        let mut queue =
            BinaryHeap::with_capacity(self.roots.len() + self.n_items.max(1).ilog2() as usize);
        for &root in &self.roots {
            queue.push((OrderedFloat(f32::INFINITY), root));
        }

        let mut candidates = Vec::new();
        let mut seen = HashSet::new();
        while candidates.len() < search_k {
            let (OrderedFloat(_), offset) = match queue.pop() {
                Some(entry) => entry,
                None => break,
            };

            match Node::from_bytes(
                storage.node_bytes(offset),
                self.distance_type,
                self.max_descendants,
            ) {
                Node::Leaf(leaf) => {
                    let item = (offset / self.node_size as u64) as ItemId;
                    debug!("descended to the single item node {item}");
                    if !leaf.vector.is_zero() && seen.insert(item) {
                        candidates.push(item);
                    }
                }
                Node::Descendants(descendants) => {
                    for item in descendants.items() {
                        if !self.item_slice(storage, item).is_zero() && seen.insert(item) {
                            candidates.push(item);
                        }
                    }
                }
                Node::SplitPlaneNormal(split) => {
                    let margin = split.margin(query);
                    let [child_0, child_1] = split.children();
                    queue.push((OrderedFloat(margin), self.node_offset(child_0)));
                    queue.push((OrderedFloat(-margin), self.node_offset(child_1)));
                }
            }
        }

        // Score every distinct candidate under the true metric. Candidates
        // are visited in id order so equal scores tie-break the same way on
        // every run.
        candidates.sort_unstable();
        let mut by_score = BinaryHeap::with_capacity(candidates.len());
        for item in candidates {
            let vector = self.item_slice(storage, item);
            if vector.is_zero() {
                continue;
            }
            let score = self.distance_type.rerank_score(vector, query);
            by_score.push((OrderedFloat(score), item));
        }

        let capacity = count.min(by_score.len());
        let mut output = Vec::with_capacity(capacity);
        while let Some((OrderedFloat(score), item)) = by_score.pop() {
            if output.len() == capacity {
                break;
            }
            output.push((item, self.distance_type.output_score(score)));
        }

        Ok(output)
    }

    fn storage(&self) -> Result<&Storage> {
        self.storage.as_ref().ok_or(Error::AlreadyClosed)
    }

    /// The vector region of the node storing `item`, borrowed from the map.
    fn item_slice<'s>(&self, storage: &'s Storage, item: ItemId) -> UnalignedF32Slice<'s> {
        let node_bytes = storage.node_bytes(item as u64 * self.node_size as u64);
        UnalignedF32Slice::from_bytes(&node_bytes[self.distance_type.header_size()..])
    }

    /// Child pointers are node indices; nodes are addressed by byte offset.
    fn node_offset(&self, node_index: i32) -> u64 {
        node_index as u32 as u64 * self.node_size as u64
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("dimensions", &self.dimensions)
            .field("distance_type", &self.distance_type)
            .field("node_size", &self.node_size)
            .field("n_items", &self.n_items)
            .field("max_descendants", &self.max_descendants)
            .field("roots", &self.roots)
            .field("closed", &self.storage.is_none())
            .finish()
    }
}
