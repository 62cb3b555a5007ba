use std::fmt;
use std::iter;
use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use byteorder::{ByteOrder, LittleEndian};

use crate::distance::{cosine_margin, dot_product, minkowski_margin, DistanceType};
use crate::ItemId;

/// A sequence of little-endian f32 living directly in the mapped file,
/// with no alignment guarantee.
#[derive(Clone, Copy)]
pub struct UnalignedF32Slice<'a>(&'a [u8]);

impl<'a> UnalignedF32Slice<'a> {
    /// Wraps a buffer of whole little-endian floats.
    pub(crate) fn from_bytes(bytes: &'a [u8]) -> UnalignedF32Slice<'a> {
        debug_assert_eq!(bytes.len() % size_of::<f32>(), 0);
        UnalignedF32Slice(bytes)
    }

    pub fn from_slice(slice: &'a [f32]) -> UnalignedF32Slice<'a> {
        UnalignedF32Slice(bytemuck::cast_slice(slice))
    }

    /// The number of f32 in the slice.
    pub fn len(&self) -> usize {
        self.0.len() / size_of::<f32>()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + 'a {
        self.0.chunks_exact(size_of::<f32>()).map(LittleEndian::read_f32)
    }

    pub fn to_vec(&self) -> Vec<f32> {
        let mut output = vec![0.0; self.len()];
        LittleEndian::read_f32_into(self.0, &mut output);
        output
    }

    /// Whether this is the all-zero sentinel marking a deleted item.
    pub fn is_zero(&self) -> bool {
        self.iter().all(|x| x == 0.0)
    }
}

impl fmt::Debug for UnalignedF32Slice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// A node of the forest, decoded at some node-aligned byte offset.
///
/// The semantic type derives from the `n_descendants` field alone: one
/// descendant makes an item leaf, up to `dimensions + 2` a bucket of packed
/// item ids, anything above a split node.
#[derive(Debug, Clone)]
pub enum Node<'a> {
    Leaf(Leaf<'a>),
    Descendants(Descendants<'a>),
    SplitPlaneNormal(SplitPlaneNormal<'a>),
}

impl<'a> Node<'a> {
    pub(crate) fn from_bytes(
        bytes: &'a [u8],
        distance_type: DistanceType,
        max_descendants: i32,
    ) -> Node<'a> {
        let n_descendants = LittleEndian::read_i32(bytes);
        if n_descendants == 1 {
            let (header, vector_bytes) = NodeHeader::from_bytes(bytes, distance_type);
            Node::Leaf(Leaf { header, vector: UnalignedF32Slice::from_bytes(vector_bytes) })
        } else if n_descendants <= max_descendants {
            let offset = distance_type.offset_before_children();
            let length = n_descendants.max(0) as usize * size_of::<i32>();
            Node::Descendants(Descendants { item_bytes: &bytes[offset..offset + length] })
        } else {
            let (header, normal_bytes) = NodeHeader::from_bytes(bytes, distance_type);
            Node::SplitPlaneNormal(SplitPlaneNormal {
                header,
                normal: UnalignedF32Slice::from_bytes(normal_bytes),
            })
        }
    }
}

/// An item leaf, the vector region holds the item's own vector.
#[derive(Debug, Clone)]
pub struct Leaf<'a> {
    pub header: NodeHeader,
    pub vector: UnalignedF32Slice<'a>,
}

/// A bucket leaf packing item ids where the vector would otherwise be.
#[derive(Debug, Clone)]
pub struct Descendants<'a> {
    item_bytes: &'a [u8],
}

impl<'a> Descendants<'a> {
    /// The packed item ids, unsigned interpretations of the stored i32s.
    pub fn items(&self) -> impl Iterator<Item = ItemId> + 'a {
        let mut remaining = self.item_bytes;
        iter::from_fn(move || {
            if remaining.is_empty() {
                None
            } else {
                let item = LittleEndian::read_u32(remaining);
                remaining = &remaining[size_of::<u32>()..];
                Some(item)
            }
        })
    }

    pub fn len(&self) -> usize {
        self.item_bytes.len() / size_of::<u32>()
    }

    pub fn is_empty(&self) -> bool {
        self.item_bytes.is_empty()
    }
}

/// A split node: a hyperplane and the two children it separates.
#[derive(Debug, Clone)]
pub struct SplitPlaneNormal<'a> {
    pub header: NodeHeader,
    pub normal: UnalignedF32Slice<'a>,
}

impl SplitPlaneNormal<'_> {
    /// Which side of the split plane `query` falls on, and by how much.
    pub fn margin(&self, query: UnalignedF32Slice) -> f32 {
        match self.header {
            NodeHeader::Angular(_) => cosine_margin(self.normal, query),
            NodeHeader::Euclidean(NodeHeaderEuclidean { bias, .. }) => {
                minkowski_margin(self.normal, query, bias)
            }
            NodeHeader::Dot(_) => dot_product(self.normal, query),
        }
    }

    pub fn children(&self) -> [i32; 2] {
        self.header.children()
    }
}

/// The fixed, metric-dependent fields at the front of every node.
#[derive(Debug, Clone, Copy)]
pub enum NodeHeader {
    Angular(NodeHeaderAngular),
    Euclidean(NodeHeaderEuclidean),
    Dot(NodeHeaderDot),
}

impl NodeHeader {
    pub(crate) fn from_bytes(bytes: &[u8], distance_type: DistanceType) -> (NodeHeader, &[u8]) {
        match distance_type {
            DistanceType::Angular => {
                let (header, remaining) = NodeHeaderAngular::read(bytes);
                (NodeHeader::Angular(header), remaining)
            }
            DistanceType::Euclidean => {
                let (header, remaining) = NodeHeaderEuclidean::read(bytes);
                (NodeHeader::Euclidean(header), remaining)
            }
            DistanceType::Dot => {
                let (header, remaining) = NodeHeaderDot::read(bytes);
                (NodeHeader::Dot(header), remaining)
            }
        }
    }

    pub fn n_descendants(&self) -> i32 {
        match self {
            NodeHeader::Angular(h) => h.n_descendants,
            NodeHeader::Euclidean(h) => h.n_descendants,
            NodeHeader::Dot(h) => h.n_descendants,
        }
    }

    pub fn children(&self) -> [i32; 2] {
        match self {
            NodeHeader::Angular(h) => h.children,
            NodeHeader::Euclidean(h) => h.children,
            NodeHeader::Dot(h) => h.children,
        }
    }
}

#[repr(C)]
#[derive(Pod, Zeroable, Debug, Clone, Copy)]
pub struct NodeHeaderAngular {
    n_descendants: i32,
    children: [i32; 2],
}

#[repr(C)]
#[derive(Pod, Zeroable, Debug, Clone, Copy)]
pub struct NodeHeaderEuclidean {
    n_descendants: i32,
    /// Offset term of the split plane.
    bias: f32,
    children: [i32; 2],
}

/// Dot nodes reserve the trailing 8 header bytes, the children sit right
/// after the descendant count like Angular ones.
#[repr(C)]
#[derive(Pod, Zeroable, Debug, Clone, Copy)]
pub struct NodeHeaderDot {
    n_descendants: i32,
    children: [i32; 2],
    _reserved: [u8; 4],
}

impl NodeHeaderAngular {
    fn read(bytes: &[u8]) -> (NodeHeaderAngular, &[u8]) {
        let (left, right) = bytes.split_at(size_of::<Self>());
        let array: [u8; size_of::<Self>()] = left.try_into().unwrap();
        (bytemuck::cast(array), right)
    }

    pub const fn header_size() -> usize {
        size_of::<NodeHeaderAngular>()
    }
}

impl NodeHeaderEuclidean {
    fn read(bytes: &[u8]) -> (NodeHeaderEuclidean, &[u8]) {
        let (left, right) = bytes.split_at(size_of::<Self>());
        let array: [u8; size_of::<Self>()] = left.try_into().unwrap();
        (bytemuck::cast(array), right)
    }

    pub const fn header_size() -> usize {
        size_of::<NodeHeaderEuclidean>()
    }
}

impl NodeHeaderDot {
    fn read(bytes: &[u8]) -> (NodeHeaderDot, &[u8]) {
        let (left, right) = bytes.split_at(size_of::<Self>());
        let array: [u8; size_of::<Self>()] = left.try_into().unwrap();
        (bytemuck::cast(array), right)
    }

    pub const fn header_size() -> usize {
        size_of::<NodeHeaderDot>()
    }
}
