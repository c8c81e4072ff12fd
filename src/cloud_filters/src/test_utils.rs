//! Synthetic point clouds with known geometry.
//!
//! Generators are deterministic (random ones take a seed) and return
//! [`LabeledPoints`] without descriptors.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::points::LabeledPoints;

/// Generate a square grid in the plane `z = z`.
pub fn make_xy_plane(size: f32, interval: f32, z: f32) -> LabeledPoints {
    let num_points = ((size / interval) as usize) + 1;
    let mut points = Vec::with_capacity(num_points * num_points);

    for i in 0..num_points {
        for j in 0..num_points {
            let x = interval * (j as f32);
            let y = interval * (i as f32);
            points.push([x, y, z]);
        }
    }

    LabeledPoints::from_points(&points)
}

/// Generate a square grid through the origin, orthogonal to `normal`.
///
/// `normal` need not be unit length.
pub fn make_tilted_plane(size: f32, interval: f32, normal: [f32; 3]) -> LabeledPoints {
    let n = nalgebra::Vector3::from(normal).normalize();
    // Any vector not parallel to n seeds the tangent basis
    let seed = if n.x.abs() < 0.9 {
        nalgebra::Vector3::x()
    } else {
        nalgebra::Vector3::y()
    };
    let u = n.cross(&seed).normalize();
    let v = n.cross(&u);

    let num_points = ((size / interval) as usize) + 1;
    let half = size / 2.0;
    let mut points = Vec::with_capacity(num_points * num_points);
    for i in 0..num_points {
        for j in 0..num_points {
            let a = interval * (j as f32) - half;
            let b = interval * (i as f32) - half;
            let p = u * a + v * b;
            points.push([p.x, p.y, p.z]);
        }
    }

    LabeledPoints::from_points(&points)
}

/// Generate a 3D grid of points (cube).
pub fn make_cube_grid(size: f32, interval: f32, offset: [f32; 3]) -> LabeledPoints {
    let num_points = ((size / interval) as usize) + 1;
    let mut points = Vec::with_capacity(num_points * num_points * num_points);

    for i in 0..num_points {
        for j in 0..num_points {
            for k in 0..num_points {
                let x = offset[0] + interval * (k as f32);
                let y = offset[1] + interval * (j as f32);
                let z = offset[2] + interval * (i as f32);
                points.push([x, y, z]);
            }
        }
    }

    LabeledPoints::from_points(&points)
}

/// Generate random points within a sphere.
pub fn make_random_sphere(
    center: [f32; 3],
    radius: f32,
    num_points: usize,
    seed: u64,
) -> LabeledPoints {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(num_points);

    for _ in 0..num_points {
        // Uniform distribution in sphere using rejection sampling
        loop {
            let u = rng.gen_range(-1.0f32..1.0);
            let v = rng.gen_range(-1.0f32..1.0);
            let w = rng.gen_range(-1.0f32..1.0);

            let r2 = u * u + v * v + w * w;
            if r2 <= 1.0 && r2 > 0.0 {
                let r = rng.gen::<f32>().powf(1.0 / 3.0) * radius;
                let scale = r / r2.sqrt();
                points.push([
                    center[0] + u * scale,
                    center[1] + v * scale,
                    center[2] + w * scale,
                ]);
                break;
            }
        }
    }

    LabeledPoints::from_points(&points)
}

/// Generate tight clusters, `per_cluster` points uniformly within `spread`
/// of each center. Clusters are emitted one after another.
pub fn make_clusters(
    centers: &[[f32; 3]],
    spread: f32,
    per_cluster: usize,
    seed: u64,
) -> LabeledPoints {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(centers.len() * per_cluster);
    for c in centers {
        for _ in 0..per_cluster {
            points.push([
                c[0] + rng.gen_range(-spread..=spread),
                c[1] + rng.gen_range(-spread..=spread),
                c[2] + rng.gen_range(-spread..=spread),
            ]);
        }
    }
    LabeledPoints::from_points(&points)
}

/// Compute per-axis bounds of a cloud.
pub fn compute_bounds(cloud: &LabeledPoints) -> (Vec<f32>, Vec<f32>) {
    let dim = cloud.euclidean_dim();
    let mut min = vec![f32::MAX; dim];
    let mut max = vec![f32::MIN; dim];

    for i in 0..cloud.len() {
        for (axis, &v) in cloud.point(i).iter().enumerate() {
            min[axis] = min[axis].min(v);
            max[axis] = max[axis].max(v);
        }
    }

    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_xy_plane() {
        let cloud = make_xy_plane(1.0, 0.5, 2.0);
        assert_eq!(cloud.len(), 9);
        for i in 0..cloud.len() {
            assert_eq!(cloud.coordinate(2, i), 2.0);
        }
    }

    #[test]
    fn test_tilted_plane_is_orthogonal_to_normal() {
        let normal = [1.0, 2.0, 2.0];
        let cloud = make_tilted_plane(2.0, 0.5, normal);
        assert_eq!(cloud.len(), 25);
        for i in 0..cloud.len() {
            let p = cloud.point(i);
            let dot = (p[0] * normal[0] + p[1] * normal[1] + p[2] * normal[2]) / 3.0;
            assert_relative_eq!(dot, 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_cube_grid_bounds() {
        let cloud = make_cube_grid(1.0, 0.5, [1.0, 2.0, 3.0]);
        assert_eq!(cloud.len(), 27);
        let (min, max) = compute_bounds(&cloud);
        assert_eq!(min, vec![1.0, 2.0, 3.0]);
        assert_eq!(max, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_random_sphere() {
        let sphere = make_random_sphere([0.0, 0.0, 0.0], 1.0, 1000, 42);
        assert_eq!(sphere.len(), 1000);
        for i in 0..sphere.len() {
            let r: f32 = sphere.point(i).iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!(r <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn test_random_sphere_reproducible() {
        let sphere1 = make_random_sphere([0.0, 0.0, 0.0], 1.0, 100, 42);
        let sphere2 = make_random_sphere([0.0, 0.0, 0.0], 1.0, 100, 42);
        assert_eq!(sphere1, sphere2);
    }

    #[test]
    fn test_clusters_stay_within_spread() {
        let centers = [[0.0, 0.0, 0.0], [10.0, 0.0, 0.0]];
        let cloud = make_clusters(&centers, 0.1, 5, 3);
        assert_eq!(cloud.len(), 10);
        for i in 0..cloud.len() {
            let c = centers[i / 5];
            for (axis, &v) in cloud.point(i).iter().enumerate() {
                assert!((v - c[axis]).abs() <= 0.1 + 1e-6);
            }
        }
    }
}
