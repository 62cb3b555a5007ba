use std::path::PathBuf;

use byteorder::{LittleEndian, WriteBytesExt};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use crate::distance::{cosine_margin, dot_product, minkowski_margin};
use crate::node::UnalignedF32Slice;
use crate::{DistanceType, ItemId};


pub struct IndexHandle {
    pub path: PathBuf,
    #[allow(unused)]
    pub tempdir: TempDir,
}

pub fn write_index_bytes(bytes: &[u8]) -> IndexHandle {
    let tempdir = tempfile::tempdir().unwrap();
    let path = tempdir.path().join("test.tree");
    std::fs::write(&path, bytes).unwrap();
    IndexHandle { path, tempdir }
}

pub fn build_index(
    distance_type: DistanceType,
    dimensions: usize,
    vectors: &[Vec<f32>],
    n_trees: usize,
) -> IndexHandle {
    let mut writer = IndexWriter::new(distance_type, dimensions);
    for vector in vectors {
        writer.add_item(vector);
    }
    write_index_bytes(&writer.into_bytes(n_trees, &mut rng()))
}

pub fn rng() -> StdRng {
    StdRng::from_seed(std::array::from_fn(|_| 42))
}

pub fn random_vectors(rng: &mut StdRng, count: usize, dimensions: usize) -> Vec<Vec<f32>> {
    (0..count).map(|_| (0..dimensions).map(|_| rng.gen_range(-1.0..1.0)).collect()).collect()
}

pub fn ids(nns: &[(ItemId, f32)]) -> Vec<ItemId> {
    nns.iter().map(|(item, _)| *item).collect()
}

pub fn overlap(left: &[ItemId], right: &[ItemId]) -> usize {
    left.iter().filter(|item| right.contains(item)).count()
}

/// Ranks every non-deleted item against `query` under the true metric, the
/// reference the approximate search is compared to.
pub fn exhaustive_nns(
    distance_type: DistanceType,
    vectors: &[Vec<f32>],
    query: &[f32],
    count: usize,
) -> Vec<ItemId> {
    let query = UnalignedF32Slice::from_slice(query);
    let mut scored: Vec<(f32, ItemId)> = vectors
        .iter()
        .enumerate()
        .filter(|(_, vector)| vector.iter().any(|x| *x != 0.0))
        .map(|(item, vector)| {
            (distance_type.rerank_score(UnalignedF32Slice::from_slice(vector), query), item as ItemId)
        })
        .collect();
    scored.sort_by(|(left, left_id), (right, right_id)| {
        right.partial_cmp(left).unwrap().then(right_id.cmp(left_id))
    });
    scored.into_iter().take(count).map(|(_, item)| item).collect()
}

/// Writes Annoy-compatible index files for the tests: item nodes first,
/// tree nodes in post-order, every root last with `n_descendants` equal to
/// the item count. Splits put non-negative margins in the first child, the
/// side the searcher explores first for a query in that half-space.
pub struct IndexWriter {
    distance_type: DistanceType,
    dimensions: usize,
    items: Vec<Vec<f32>>,
}

impl IndexWriter {
    pub fn new(distance_type: DistanceType, dimensions: usize) -> IndexWriter {
        IndexWriter { distance_type, dimensions, items: Vec::new() }
    }

    pub fn add_item(&mut self, vector: &[f32]) {
        assert_eq!(vector.len(), self.dimensions);
        self.items.push(vector.to_vec());
    }

    pub fn into_bytes(self, n_trees: usize, rng: &mut StdRng) -> Vec<u8> {
        let mut nodes: Vec<Vec<u8>> =
            self.items.iter().map(|vector| item_node(self.distance_type, vector)).collect();
        let indices: Vec<u32> = (0..self.items.len() as u32).collect();
        let roots: Vec<Vec<u8>> =
            (0..n_trees).map(|_| self.plant_tree(&indices, rng, &mut nodes)).collect();
        nodes.extend(roots);
        nodes.concat()
    }

    /// Builds everything below one root and returns the root node bytes
    /// without appending them: the roots must sit at the very end of the file.
    fn plant_tree(&self, indices: &[u32], rng: &mut StdRng, nodes: &mut Vec<Vec<u8>>) -> Vec<u8> {
        let n_descendants = indices.len() as i32;
        if indices.len() <= self.dimensions + 2 {
            return descendants_node(self.distance_type, self.dimensions, n_descendants, indices);
        }
        let (normal, bias, left, right) = self.split(indices, rng);
        let left_id = self.grow(&left, rng, nodes);
        let right_id = self.grow(&right, rng, nodes);
        split_node(self.distance_type, n_descendants, [left_id, right_id], &normal, bias)
    }

    /// Appends the subtree holding `indices` and returns its node id. A
    /// single item is not materialized, its parent points at the item node.
    fn grow(&self, indices: &[u32], rng: &mut StdRng, nodes: &mut Vec<Vec<u8>>) -> u32 {
        if indices.len() == 1 {
            return indices[0];
        }
        if indices.len() <= self.dimensions + 2 {
            let n_descendants = indices.len() as i32;
            nodes.push(descendants_node(self.distance_type, self.dimensions, n_descendants, indices));
            return (nodes.len() - 1) as u32;
        }
        let (normal, bias, left, right) = self.split(indices, rng);
        let left_id = self.grow(&left, rng, nodes);
        let right_id = self.grow(&right, rng, nodes);
        let n_descendants = indices.len() as i32;
        nodes.push(split_node(self.distance_type, n_descendants, [left_id, right_id], &normal, bias));
        (nodes.len() - 1) as u32
    }

    /// Builds a split plane from two random items and partitions by margin
    /// sign.
    fn split(&self, indices: &[u32], rng: &mut StdRng) -> (Vec<f32>, f32, Vec<u32>, Vec<u32>) {
        let mut chosen = indices.choose_multiple(rng, 2);
        let p = &self.items[*chosen.next().unwrap() as usize];
        let q = &self.items[*chosen.next().unwrap() as usize];
        let normal: Vec<f32> = p.iter().zip(q).map(|(p, q)| p - q).collect();
        let bias = match self.distance_type {
            DistanceType::Euclidean => {
                p.iter().zip(q).zip(&normal).map(|((p, q), n)| -n * (p + q) / 2.0).sum()
            }
            DistanceType::Angular | DistanceType::Dot => 0.0,
        };

        let mut left = Vec::new();
        let mut right = Vec::new();
        for &index in indices {
            if self.margin(&normal, bias, &self.items[index as usize]) >= 0.0 {
                left.push(index);
            } else {
                right.push(index);
            }
        }

        // A degenerate plane puts everything on one side, alternate instead.
        if left.is_empty() || right.is_empty() {
            left.clear();
            right.clear();
            for (position, &index) in indices.iter().enumerate() {
                if position % 2 == 0 {
                    left.push(index);
                } else {
                    right.push(index);
                }
            }
        }

        (normal, bias, left, right)
    }

    fn margin(&self, normal: &[f32], bias: f32, vector: &[f32]) -> f32 {
        let normal = UnalignedF32Slice::from_slice(normal);
        let vector = UnalignedF32Slice::from_slice(vector);
        match self.distance_type {
            DistanceType::Angular => cosine_margin(normal, vector),
            DistanceType::Euclidean => minkowski_margin(normal, vector, bias),
            DistanceType::Dot => dot_product(normal, vector),
        }
    }
}

pub fn item_node(distance_type: DistanceType, vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::new();
    write_header(&mut bytes, distance_type, 1, [0, 0], 0.0);
    for &value in vector {
        bytes.write_f32::<LittleEndian>(value).unwrap();
    }
    bytes
}

pub fn descendants_node(
    distance_type: DistanceType,
    dimensions: usize,
    n_descendants: i32,
    items: &[u32],
) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.write_i32::<LittleEndian>(n_descendants).unwrap();
    bytes.resize(distance_type.offset_before_children(), 0);
    for &item in items {
        bytes.write_u32::<LittleEndian>(item).unwrap();
    }
    bytes.resize(distance_type.node_size(dimensions), 0);
    bytes
}

pub fn split_node(
    distance_type: DistanceType,
    n_descendants: i32,
    children: [u32; 2],
    normal: &[f32],
    bias: f32,
) -> Vec<u8> {
    let mut bytes = Vec::new();
    write_header(&mut bytes, distance_type, n_descendants, children, bias);
    for &value in normal {
        bytes.write_f32::<LittleEndian>(value).unwrap();
    }
    bytes
}

fn write_header(
    bytes: &mut Vec<u8>,
    distance_type: DistanceType,
    n_descendants: i32,
    children: [u32; 2],
    bias: f32,
) {
    bytes.write_i32::<LittleEndian>(n_descendants).unwrap();
    match distance_type {
        DistanceType::Angular => {
            bytes.write_u32::<LittleEndian>(children[0]).unwrap();
            bytes.write_u32::<LittleEndian>(children[1]).unwrap();
        }
        DistanceType::Euclidean => {
            bytes.write_f32::<LittleEndian>(bias).unwrap();
            bytes.write_u32::<LittleEndian>(children[0]).unwrap();
            bytes.write_u32::<LittleEndian>(children[1]).unwrap();
        }
        DistanceType::Dot => {
            bytes.write_u32::<LittleEndian>(children[0]).unwrap();
            bytes.write_u32::<LittleEndian>(children[1]).unwrap();
            bytes.extend_from_slice(&[0; 4]);
        }
    }
}
