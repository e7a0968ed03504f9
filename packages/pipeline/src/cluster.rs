//! Seeded k-means over normalized indicator triples.

use rand::{Rng as _, SeedableRng as _};
use rand_chacha::ChaCha8Rng;

const MAX_ITERATIONS: usize = 100;

/// Clusters the points into at most `k` groups with Lloyd's algorithm and
/// k-means++ seeding, driven by a fixed-seed ChaCha stream so identical
/// inputs always produce identical labels. `k` is clamped to the point
/// count; zero points yield an empty labeling.
#[must_use]
pub fn kmeans(points: &[[f64; 3]], k: usize, seed: u64) -> Vec<usize> {
    if points.is_empty() || k == 0 {
        return vec![0; points.len()];
    }
    let k = k.min(points.len());
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut centers = seed_centers(points, k, &mut rng);
    let mut labels = vec![0_usize; points.len()];

    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (label, point) in labels.iter_mut().zip(points) {
            let nearest = nearest_center(point, &centers);
            if nearest != *label {
                *label = nearest;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        // Means per cluster; a cluster that lost all points keeps its
        // previous center.
        let mut sums = vec![[0.0_f64; 3]; k];
        let mut counts = vec![0_usize; k];
        for (label, point) in labels.iter().zip(points) {
            counts[*label] += 1;
            for axis in 0..3 {
                sums[*label][axis] += point[axis];
            }
        }
        for (center, (sum, count)) in centers.iter_mut().zip(sums.iter().zip(&counts)) {
            if *count > 0 {
                #[allow(clippy::cast_precision_loss)]
                let divisor = *count as f64;
                for axis in 0..3 {
                    center[axis] = sum[axis] / divisor;
                }
            }
        }
    }

    labels
}

/// k-means++ seeding: the first center is uniform, each further center is
/// drawn proportionally to the squared distance from the nearest center
/// chosen so far.
fn seed_centers(points: &[[f64; 3]], k: usize, rng: &mut ChaCha8Rng) -> Vec<[f64; 3]> {
    let mut centers = Vec::with_capacity(k);
    centers.push(points[rng.gen_range(0..points.len())]);

    while centers.len() < k {
        let weights: Vec<f64> = points
            .iter()
            .map(|point| {
                centers
                    .iter()
                    .map(|center| distance_squared(point, center))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            // All remaining points coincide with a center.
            centers.push(points[0]);
            continue;
        }

        let mut draw = rng.gen_range(0.0..1.0) * total;
        let mut chosen = points.len() - 1;
        for (index, weight) in weights.iter().enumerate() {
            draw -= weight;
            if draw <= 0.0 {
                chosen = index;
                break;
            }
        }
        centers.push(points[chosen]);
    }

    centers
}

/// Nearest center by squared distance; ties go to the lower index.
fn nearest_center(point: &[f64; 3], centers: &[[f64; 3]]) -> usize {
    centers
        .iter()
        .enumerate()
        .map(|(index, center)| (distance_squared(point, center), index))
        .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
        .map_or(0, |(_, index)| index)
}

fn distance_squared(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (0..3).map(|axis| (a[axis] - b[axis]).powi(2)).sum()
}
