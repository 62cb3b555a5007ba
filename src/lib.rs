//! Read-only queries over index files produced by the Annoy builder.
//!
//! An index file is a packed sequence of fixed-size nodes describing a
//! forest of random-projection binary trees. This crate memory-maps such a
//! file, locates the tree roots, and answers k-nearest-neighbor queries by
//! descending all the trees at once through a shared max-heap keyed by
//! split-plane margins, then re-ranking the collected candidates under the
//! true metric.
//!
//! ```no_run
//! use rannoy::{DistanceType, Reader};
//!
//! # fn main() -> rannoy::Result<()> {
//! let reader = Reader::open("points.angular.annoy", 8, DistanceType::Angular, None)?;
//! for (item, score) in reader.nns_by_item(42, 10, None)? {
//!     println!("{item}: {score}");
//! }
//! # Ok(()) }
//! ```
//!
//! The reader never writes: building an index, as well as mutating or
//! deleting items, happens elsewhere.

mod distance;
mod error;
mod node;
mod reader;
mod storage;

#[cfg(test)]
mod tests;

pub use distance::{
    cosine_margin, dot_product, euclidean_distance, minkowski_margin, norm, DistanceType,
};
pub use error::Error;
pub use node::{
    Descendants, Leaf, Node, NodeHeader, NodeHeaderAngular, NodeHeaderDot, NodeHeaderEuclidean,
    SplitPlaneNormal, UnalignedF32Slice,
};
pub use reader::Reader;
pub use storage::Storage;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An external item id, the unsigned interpretation of the i32 stored in
/// the index file.
pub type ItemId = u32;
