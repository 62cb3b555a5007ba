use std::fmt;
use std::mem::size_of;
use std::str::FromStr;

use crate::node::{NodeHeaderAngular, NodeHeaderDot, NodeHeaderEuclidean, UnalignedF32Slice};
use crate::Error;

/// The distance metric an index was built with.
///
/// The metric fixes the node layout, the margin used as the best-first
/// traversal priority, and the score candidates are re-ranked under.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
#[repr(u8)]
pub enum DistanceType {
    /// Cosine similarity, called "angular" by the builder.
    Angular = 0,
    Euclidean = 1,
    /// Raw inner-product similarity.
    Dot = 2,
}

impl DistanceType {
    pub(crate) fn header_size(&self) -> usize {
        match self {
            DistanceType::Angular => NodeHeaderAngular::header_size(),
            DistanceType::Euclidean => NodeHeaderEuclidean::header_size(),
            DistanceType::Dot => NodeHeaderDot::header_size(),
        }
    }

    /// Where the children ids (or the packed item ids of a bucket leaf)
    /// start within a node.
    pub(crate) fn offset_before_children(&self) -> usize {
        match self {
            DistanceType::Angular | DistanceType::Dot => size_of::<i32>(),
            DistanceType::Euclidean => size_of::<i32>() + size_of::<f32>(),
        }
    }

    /// The size in bytes of one node of a `dimensions`-dimensional index.
    pub(crate) fn node_size(&self, dimensions: usize) -> usize {
        self.header_size() + dimensions * size_of::<f32>()
    }

    /// Score of a candidate item against the query, higher is better.
    pub(crate) fn rerank_score(&self, item: UnalignedF32Slice, query: UnalignedF32Slice) -> f32 {
        match self {
            DistanceType::Angular => cosine_margin(item, query),
            DistanceType::Euclidean => -euclidean_distance(item, query),
            DistanceType::Dot => dot_product(item, query),
        }
    }

    /// Converts an internal ranking score into the value reported to callers.
    pub(crate) fn output_score(&self, score: f32) -> f32 {
        match self {
            DistanceType::Euclidean => -score,
            DistanceType::Angular | DistanceType::Dot => score,
        }
    }
}

impl fmt::Display for DistanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceType::Angular => f.write_str("angular"),
            DistanceType::Euclidean => f.write_str("euclidean"),
            DistanceType::Dot => f.write_str("dot"),
        }
    }
}

impl FromStr for DistanceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<DistanceType, Error> {
        match s {
            "angular" => Ok(DistanceType::Angular),
            "euclidean" => Ok(DistanceType::Euclidean),
            "dot" => Ok(DistanceType::Dot),
            unknown => Err(Error::UnknownDistanceType(unknown.to_owned())),
        }
    }
}

/// Dot product of `u` and `v`, accumulated in f64 before narrowing back.
pub fn dot_product(u: UnalignedF32Slice, v: UnalignedF32Slice) -> f32 {
    u.iter().zip(v.iter()).map(|(x, y)| x as f64 * y as f64).sum::<f64>() as f32
}

/// Euclidean norm of `v`.
pub fn norm(v: UnalignedF32Slice) -> f32 {
    v.iter().map(|x| x as f64 * x as f64).sum::<f64>().sqrt() as f32
}

/// Cosine of the angle between `u` and `v`.
///
/// Items with an all-zero vector never reach this kernel, but a dummy
/// all-zero split normal can. A zero denominator yields 0.0 so that both
/// sides of such a split rank equally instead of poisoning the heap with NaN.
pub fn cosine_margin(u: UnalignedF32Slice, v: UnalignedF32Slice) -> f32 {
    let denominator = norm(u) * norm(v);
    if denominator > 0.0 {
        dot_product(u, v) / denominator
    } else {
        0.0
    }
}

/// Split margin for the Euclidean metric, `bias + u · v`.
pub fn minkowski_margin(u: UnalignedF32Slice, v: UnalignedF32Slice, bias: f32) -> f32 {
    bias + dot_product(u, v)
}

/// Euclidean distance between `u` and `v`.
///
/// Expanding through dot products would save a pass but cancels
/// catastrophically, see <https://github.com/spotify/annoy/issues/314>.
pub fn euclidean_distance(u: UnalignedF32Slice, v: UnalignedF32Slice) -> f32 {
    u.iter()
        .zip(v.iter())
        .map(|(x, y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt() as f32
}
