use crate::ItemId;

/// The errors a [`crate::Reader`] can produce.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The index file cannot be opened or mapped.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The index file contains no nodes at all.
    #[error("invalid index: the file is empty")]
    EmptyIndex,

    /// The file length is not a whole number of nodes, which almost always
    /// means the index was built with a different number of dimensions.
    #[error(
        "invalid index: file size {file_size} is not a multiple of the \
         node size {node_size}, the dimensions do not match the file"
    )]
    UnevenFileSize { file_size: u64, node_size: usize },

    /// The descendant count shared by the root nodes cannot be an item count.
    #[error("invalid index: root nodes declare an impossible descendant count of {0}")]
    ImpossibleDescendantCount(i32),

    #[error("Invalid vector dimensions. Got {received} but expected {expected}")]
    InvalidVecDimension { expected: usize, received: usize },

    #[error("item index {item} is out of range, the index stores {n_items} items")]
    ItemOutOfRange { item: ItemId, n_items: usize },

    /// The reader was closed and its mappings released.
    #[error("the index has already been closed")]
    AlreadyClosed,

    #[error("unknown distance type `{0}`, expected angular, euclidean or dot")]
    UnknownDistanceType(String),
}
