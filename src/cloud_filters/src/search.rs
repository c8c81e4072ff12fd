//! Nearest-neighbor queries over point clouds.
//!
//! Filters consume neighbor search through the [`NeighborSearch`] trait.
//! Two backends are provided:
//!
//! - [`KdTreeSearch`]: kiddo immutable k-d tree for 2-D and 3-D clouds
//! - [`BruteForceSearch`]: exhaustive scan, any dimension
//!
//! Results are sorted by ascending euclidean distance, ties by index, and may hold fewer than
//! `k` entries when fewer candidates lie within `max_dist`.
//!
//! # Usage
//!
//! ```ignore
//! let search = SearchBackend::KdTree.build(&cloud);
//! for n in search.knn(cloud.point(0), 5, 0.0, f32::INFINITY) {
//!     println!("{} at {}", n.index, n.distance);
//! }
//! ```

use std::cmp::Ordering;

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;

use crate::points::LabeledPoints;

/// Bucket size for the k-d tree.
///
/// Large enough for planar clouds where many points share one coordinate.
const BUCKET_SIZE: usize = 256;

/// One neighbor of a query point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Column index in the searched cloud.
    pub index: usize,
    /// Euclidean (not squared) distance to the query.
    pub distance: f32,
}

/// Read-only neighbor queries over a fixed set of points.
pub trait NeighborSearch: Send + Sync {
    /// Up to `k` nearest points within `max_dist`, nearest first.
    ///
    /// Points at equal distance are ordered by index, and when several tie
    /// at the k-th distance the lowest indices are kept.
    ///
    /// # Arguments
    /// * `query` - Query coordinates, at least the indexed dimension
    /// * `k` - Maximum number of neighbors (the query point itself counts)
    /// * `epsilon` - Admissible relative error of approximate backends;
    ///   exact backends ignore it
    /// * `max_dist` - Neighbors farther than this are dropped
    ///
    /// # Returns
    /// Neighbors sorted by (distance, index), possibly fewer than `k`.
    fn knn(&self, query: &[f32], k: usize, epsilon: f32, max_dist: f32) -> Vec<Neighbor>;

    /// All points within `radius`, nearest first.
    fn within(&self, query: &[f32], radius: f32) -> Vec<Neighbor>;

    /// Number of indexed points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which backend [`SearchBackend::build`] should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchBackend {
    /// k-d tree when the dimension allows it, exhaustive scan otherwise.
    #[default]
    KdTree,
    BruteForce,
}

impl SearchBackend {
    /// Index the euclidean coordinates of `cloud`.
    ///
    /// The column index of each point is the neighbor index reported by
    /// the queries.
    ///
    /// # Arguments
    /// * `cloud` - Points to index
    ///
    /// # Returns
    /// A k-d tree for 2-D and 3-D clouds with this backend selected, an
    /// exhaustive scan otherwise (including empty clouds).
    pub fn build(self, cloud: &LabeledPoints) -> Box<dyn NeighborSearch> {
        match self {
            SearchBackend::KdTree => match KdTreeSearch::from_cloud(cloud) {
                Some(tree) => Box::new(tree),
                None => Box::new(BruteForceSearch::from_cloud(cloud)),
            },
            SearchBackend::BruteForce => Box::new(BruteForceSearch::from_cloud(cloud)),
        }
    }
}

/// k-d tree over 2-D or 3-D points.
///
/// Generic args of the tree: A=f32 (coordinate), T=u64 (column index),
/// K=dimension, B=bucket size.
#[derive(Debug)]
pub enum KdTreeSearch {
    Planar(ImmutableKdTree<f32, u64, 2, BUCKET_SIZE>),
    Spatial(ImmutableKdTree<f32, u64, 3, BUCKET_SIZE>),
}

impl KdTreeSearch {
    /// Build a tree over the cloud's points.
    ///
    /// Returns `None` for empty clouds and for dimensions other than 2 and 3.
    pub fn from_cloud(cloud: &LabeledPoints) -> Option<Self> {
        if cloud.is_empty() {
            return None;
        }
        match cloud.euclidean_dim() {
            2 => {
                let pts: Vec<[f32; 2]> = (0..cloud.len())
                    .map(|i| {
                        let p = cloud.point(i);
                        [p[0], p[1]]
                    })
                    .collect();
                // The item value (u64) is set to the slice index.
                Some(Self::Planar((&*pts).into()))
            }
            3 => {
                let pts: Vec<[f32; 3]> = (0..cloud.len())
                    .map(|i| {
                        let p = cloud.point(i);
                        [p[0], p[1], p[2]]
                    })
                    .collect();
                Some(Self::Spatial((&*pts).into()))
            }
            _ => None,
        }
    }
}

impl KdTreeSearch {
    /// Up to `k` nearest items with squared distances, in tree order.
    fn nearest_squared(&self, query: &[f32], k: usize) -> Vec<(u64, f32)> {
        match self {
            Self::Planar(tree) => tree
                .nearest_n::<SquaredEuclidean>(&[query[0], query[1]], k)
                .into_iter()
                .map(|nn| (nn.item, nn.distance))
                .collect(),
            Self::Spatial(tree) => tree
                .nearest_n::<SquaredEuclidean>(&[query[0], query[1], query[2]], k)
                .into_iter()
                .map(|nn| (nn.item, nn.distance))
                .collect(),
        }
    }

    /// Items within a squared radius, in tree order.
    fn within_squared(&self, query: &[f32], radius_sq: f32) -> Vec<(u64, f32)> {
        match self {
            Self::Planar(tree) => tree
                .within::<SquaredEuclidean>(&[query[0], query[1]], radius_sq)
                .into_iter()
                .map(|nn| (nn.item, nn.distance))
                .collect(),
            Self::Spatial(tree) => tree
                .within::<SquaredEuclidean>(&[query[0], query[1], query[2]], radius_sq)
                .into_iter()
                .map(|nn| (nn.item, nn.distance))
                .collect(),
        }
    }
}

fn to_sorted_neighbors(raw: Vec<(u64, f32)>) -> Vec<Neighbor> {
    let mut out: Vec<Neighbor> = raw
        .into_iter()
        .map(|(item, dist_sq)| Neighbor {
            index: item as usize,
            distance: dist_sq.sqrt(),
        })
        .collect();
    out.sort_by(compare_neighbors);
    out
}

impl NeighborSearch for KdTreeSearch {
    fn knn(&self, query: &[f32], k: usize, _epsilon: f32, max_dist: f32) -> Vec<Neighbor> {
        if k == 0 {
            return Vec::new();
        }
        let k = k.min(self.len());
        let mut raw = self.nearest_squared(query, k);
        if raw.len() == k && k < self.len() {
            // nearest_n keeps an arbitrary subset of the points tied at the
            // k-th distance, so gather every point up to that distance.
            let kth = raw.iter().map(|&(_, d)| d).fold(0.0f32, f32::max);
            let widened = kth * (1.0 + 4.0 * f32::EPSILON) + f32::MIN_POSITIVE;
            raw = self
                .within_squared(query, widened)
                .into_iter()
                .filter(|&(_, d)| d <= kth)
                .collect();
        }
        let mut out = to_sorted_neighbors(raw);
        out.retain(|n| n.distance <= max_dist);
        out.truncate(k);
        out
    }

    fn within(&self, query: &[f32], radius: f32) -> Vec<Neighbor> {
        // Kiddo uses squared distance
        to_sorted_neighbors(self.within_squared(query, radius * radius))
    }

    fn len(&self) -> usize {
        match self {
            Self::Planar(tree) => tree.size(),
            Self::Spatial(tree) => tree.size(),
        }
    }
}

/// Exhaustive search, usable for any dimension.
#[derive(Debug, Clone)]
pub struct BruteForceSearch {
    dim: usize,
    /// Coordinates, `dim` values per point.
    coords: Vec<f32>,
}

impl BruteForceSearch {
    pub fn from_cloud(cloud: &LabeledPoints) -> Self {
        let dim = cloud.euclidean_dim();
        let mut coords = Vec::with_capacity(dim * cloud.len());
        for i in 0..cloud.len() {
            coords.extend_from_slice(cloud.point(i));
        }
        Self { dim, coords }
    }

    fn distances(&self, query: &[f32]) -> impl Iterator<Item = Neighbor> + '_ {
        let query: Vec<f32> = query.iter().take(self.dim).copied().collect();
        self.coords
            .chunks_exact(self.dim)
            .enumerate()
            .map(move |(index, p)| {
                let dist_sq: f32 = p
                    .iter()
                    .zip(&query)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                Neighbor {
                    index,
                    distance: dist_sq.sqrt(),
                }
            })
    }
}

impl NeighborSearch for BruteForceSearch {
    fn knn(&self, query: &[f32], k: usize, _epsilon: f32, max_dist: f32) -> Vec<Neighbor> {
        let mut all: Vec<Neighbor> = self
            .distances(query)
            .filter(|n| n.distance <= max_dist)
            .collect();
        all.sort_by(compare_neighbors);
        all.truncate(k);
        all
    }

    fn within(&self, query: &[f32], radius: f32) -> Vec<Neighbor> {
        let mut all: Vec<Neighbor> = self
            .distances(query)
            .filter(|n| n.distance <= radius)
            .collect();
        all.sort_by(compare_neighbors);
        all
    }

    fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.coords.len() / self.dim
        }
    }
}

/// Order by distance, then index.
fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.index.cmp(&b.index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line_cloud(n: usize) -> LabeledPoints {
        let pts: Vec<[f32; 3]> = (0..n).map(|i| [i as f32, 0.0, 0.0]).collect();
        LabeledPoints::from_points(&pts)
    }

    #[test]
    fn test_kdtree_knn_sorted() {
        let cloud = line_cloud(10);
        let search = KdTreeSearch::from_cloud(&cloud).unwrap();

        let result = search.knn(&[4.2, 0.0, 0.0], 3, 0.0, f32::INFINITY);
        let indices: Vec<usize> = result.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![4, 5, 3]);
        assert_relative_eq!(result[0].distance, 0.2, epsilon = 1e-5);
    }

    #[test]
    fn test_knn_respects_max_dist() {
        let cloud = line_cloud(10);
        for backend in [SearchBackend::KdTree, SearchBackend::BruteForce] {
            let search = backend.build(&cloud);
            let result = search.knn(&[0.0, 0.0, 0.0], 5, 0.0, 1.5);
            assert_eq!(result.len(), 2, "{backend:?}");
        }
    }

    #[test]
    fn test_backends_agree() {
        let pts: Vec<[f32; 3]> = (0..200)
            .map(|i| {
                let t = i as f32 * 0.37;
                [t.sin() * 3.0, (t * 1.3).cos() * 2.0, t * 0.05]
            })
            .collect();
        let cloud = LabeledPoints::from_points(&pts);
        let tree = SearchBackend::KdTree.build(&cloud);
        let brute = SearchBackend::BruteForce.build(&cloud);

        for q in [[0.0, 0.0, 0.0], [1.0, -1.0, 5.0], [2.5, 1.0, 3.0]] {
            let a: Vec<usize> = tree.knn(&q, 7, 0.0, f32::INFINITY).iter().map(|n| n.index).collect();
            let b: Vec<usize> = brute.knn(&q, 7, 0.0, f32::INFINITY).iter().map(|n| n.index).collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_grid_ties_resolved_by_index() {
        let pts: Vec<[f32; 2]> = (0..21 * 21).map(|i| [(i % 21) as f32, (i / 21) as f32]).collect();
        let cloud = LabeledPoints::from_points(&pts);
        let tree = SearchBackend::KdTree.build(&cloud);
        let brute = SearchBackend::BruteForce.build(&cloud);

        for k in [2, 3, 4, 6, 8] {
            for q in 0..cloud.len() {
                let query = cloud.point(q);
                let a: Vec<usize> = tree.knn(query, k, 0.0, f32::INFINITY).iter().map(|n| n.index).collect();
                let b: Vec<usize> = brute.knn(query, k, 0.0, f32::INFINITY).iter().map(|n| n.index).collect();
                assert_eq!(a, b, "query {q}, k {k}");
            }
        }

        // Of the four neighbors at distance 1, the lowest indices win
        let result = tree.knn(&[11.0, 0.0], 3, 0.0, f32::INFINITY);
        let indices: Vec<usize> = result.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![11, 10, 12]);
    }

    #[test]
    fn test_within() {
        let cloud = LabeledPoints::from_points(&[[0.0, 0.0], [1.0, 0.0], [0.0, 3.0]]);
        let search = SearchBackend::KdTree.build(&cloud);
        assert_eq!(search.len(), 3);

        let result = search.within(&[0.0, 0.0], 1.5);
        let indices: Vec<usize> = result.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_brute_force_high_dimension() {
        let features = nalgebra::DMatrix::from_fn(5, 4, |r, c| if r == 4 { 1.0 } else { (r * c) as f32 });
        let cloud = LabeledPoints::new(features).unwrap();
        assert!(KdTreeSearch::from_cloud(&cloud).is_none());

        let search = SearchBackend::KdTree.build(&cloud);
        let result = search.knn(&[0.0, 1.0, 2.0, 3.0], 2, 0.0, f32::INFINITY);
        assert_eq!(result[0].index, 1);
        assert_relative_eq!(result[0].distance, 0.0);
    }

    #[test]
    fn test_empty_cloud() {
        let cloud = LabeledPoints::empty(3);
        let search = SearchBackend::KdTree.build(&cloud);
        assert!(search.is_empty());
        assert!(search.knn(&[0.0, 0.0, 0.0], 3, 0.0, f32::INFINITY).is_empty());
    }
}
