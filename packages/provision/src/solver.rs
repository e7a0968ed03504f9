//! Distance-ordered greedy assignment of building demand to service
//! capacity.

use geo::Point;
use urban_potential_city_models::{BuildingId, ServiceId, ServiceLink};

use crate::ProvisionError;

/// Dense building × service distance matrix in coarse cell units.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    /// Builds the matrix from building centroids and service points,
    /// expressing euclidean distances in `cell_size` units.
    #[must_use]
    pub fn from_points(demand: &[Point<f64>], supply: &[Point<f64>], cell_size: f64) -> Self {
        let mut values = Vec::with_capacity(demand.len() * supply.len());
        for building in demand {
            for service in supply {
                let d = (building.x() - service.x()).hypot(building.y() - service.y());
                values.push(d / cell_size);
            }
        }
        Self {
            rows: demand.len(),
            cols: supply.len(),
            values,
        }
    }

    /// Distance between building `row` and service `col`, cell units.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.cols + col]
    }

    /// Number of demand rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of supply columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }
}

/// Result of a provision solve.
#[derive(Debug, Clone)]
pub struct SolverOutcome {
    /// Building-to-service assignments, in assignment order.
    pub links: Vec<ServiceLink>,
    /// Capacity consumed per service, aligned with the supply input.
    pub employed: Vec<f64>,
    /// Demand left unserved per building, aligned with the demand input.
    pub unserved: Vec<f64>,
}

/// Assigns building demand to service capacity under a distance threshold.
///
/// Contract: every link's quantity is bounded by the remaining capacity of
/// its service and the remaining demand of its building at assignment
/// time, and no link spans a distance above the threshold.
pub trait ProvisionSolver {
    /// Solves the assignment.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrix shape does not match the demand and
    /// supply collections.
    fn solve(
        &self,
        demand: &[(BuildingId, f64)],
        supply: &[(ServiceId, f64)],
        matrix: &DistanceMatrix,
        threshold: f64,
    ) -> Result<SolverOutcome, ProvisionError>;
}

/// Reference solver: candidate pairs within the threshold are processed in
/// ascending `(distance, building index, service index)` order, each taking
/// as much as both sides still allow. Deterministic for identical inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyCapacitySolver;

impl ProvisionSolver for GreedyCapacitySolver {
    fn solve(
        &self,
        demand: &[(BuildingId, f64)],
        supply: &[(ServiceId, f64)],
        matrix: &DistanceMatrix,
        threshold: f64,
    ) -> Result<SolverOutcome, ProvisionError> {
        if matrix.rows() != demand.len() || matrix.cols() != supply.len() {
            return Err(ProvisionError::MatrixShape {
                matrix_rows: matrix.rows(),
                matrix_cols: matrix.cols(),
                demand: demand.len(),
                supply: supply.len(),
            });
        }

        let mut pairs: Vec<(f64, usize, usize)> = Vec::new();
        for (b, _) in demand.iter().enumerate().filter(|(_, (_, d))| *d > 0.0) {
            for (s, _) in supply.iter().enumerate().filter(|(_, (_, c))| *c > 0.0) {
                let distance = matrix.get(b, s);
                if distance <= threshold {
                    pairs.push((distance, b, s));
                }
            }
        }
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut remaining_demand: Vec<f64> = demand.iter().map(|(_, d)| *d).collect();
        let mut remaining_capacity: Vec<f64> = supply.iter().map(|(_, c)| *c).collect();
        let mut links = Vec::new();

        for (_, b, s) in pairs {
            let quantity = remaining_demand[b].min(remaining_capacity[s]);
            if quantity <= 0.0 {
                continue;
            }
            remaining_demand[b] -= quantity;
            remaining_capacity[s] -= quantity;
            links.push(ServiceLink {
                building_id: demand[b].0.clone(),
                service_id: supply[s].0.clone(),
                quantity,
            });
        }

        let employed = supply
            .iter()
            .zip(&remaining_capacity)
            .map(|((_, capacity), remaining)| capacity - remaining)
            .collect();

        Ok(SolverOutcome {
            links,
            employed,
            unserved: remaining_demand,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(buildings: usize, services: usize) -> (Vec<BuildingId>, Vec<ServiceId>) {
        use urban_potential_city_models::ServiceKind;

        let b = (0..buildings).map(BuildingId::from_index).collect();
        let s = (0..services)
            .map(|i| ServiceId::from_index(ServiceKind::School, i))
            .collect();
        (b, s)
    }

    #[test]
    fn assigns_nearest_first_and_respects_capacity() {
        let (b, s) = ids(2, 1);
        let demand = vec![(b[0].clone(), 30.0), (b[1].clone(), 30.0)];
        let supply = vec![(s[0].clone(), 40.0)];
        let matrix = DistanceMatrix::from_points(
            &[Point::new(0.0, 0.0), Point::new(100.0, 0.0)],
            &[Point::new(10.0, 0.0)],
            50.0,
        );
        let outcome = GreedyCapacitySolver
            .solve(&demand, &supply, &matrix, 10.0)
            .unwrap();

        // The closer building is fully served; the other gets the rest.
        assert_eq!(outcome.links.len(), 2);
        assert!((outcome.links[0].quantity - 30.0).abs() < f64::EPSILON);
        assert!((outcome.links[1].quantity - 10.0).abs() < f64::EPSILON);
        assert!((outcome.employed[0] - 40.0).abs() < f64::EPSILON);
        assert!((outcome.unserved[1] - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn threshold_excludes_distant_pairs() {
        let (b, s) = ids(1, 1);
        let demand = vec![(b[0].clone(), 10.0)];
        let supply = vec![(s[0].clone(), 10.0)];
        let matrix = DistanceMatrix::from_points(
            &[Point::new(0.0, 0.0)],
            &[Point::new(1000.0, 0.0)],
            50.0,
        );
        // 1000m at 50m cells = 20 cell units, above a threshold of 10.
        let outcome = GreedyCapacitySolver
            .solve(&demand, &supply, &matrix, 10.0)
            .unwrap();
        assert!(outcome.links.is_empty());
        assert!((outcome.unserved[0] - 10.0).abs() < f64::EPSILON);
        assert!(outcome.employed[0].abs() < f64::EPSILON);
    }

    #[test]
    fn link_quantities_never_exceed_either_side() {
        let (b, s) = ids(3, 2);
        let demand: Vec<_> = b.iter().cloned().zip([25.0, 40.0, 15.0]).collect();
        let supply: Vec<_> = s.iter().cloned().zip([30.0, 30.0]).collect();
        let points_b = [
            Point::new(0.0, 0.0),
            Point::new(60.0, 0.0),
            Point::new(120.0, 0.0),
        ];
        let points_s = [Point::new(30.0, 0.0), Point::new(90.0, 0.0)];
        let matrix = DistanceMatrix::from_points(&points_b, &points_s, 50.0);
        let outcome = GreedyCapacitySolver
            .solve(&demand, &supply, &matrix, 100.0)
            .unwrap();

        let served: f64 = outcome.links.iter().map(|l| l.quantity).sum();
        let total_capacity: f64 = supply.iter().map(|(_, c)| c).sum();
        let total_demand: f64 = demand.iter().map(|(_, d)| d).sum();
        assert!(served <= total_capacity + 1e-9);
        assert!(served <= total_demand + 1e-9);
        for quantity in outcome.links.iter().map(|l| l.quantity) {
            assert!(quantity > 0.0);
        }
    }

    #[test]
    fn mismatched_matrix_shape_is_an_error() {
        let (b, s) = ids(1, 1);
        let demand = vec![(b[0].clone(), 10.0)];
        let supply = vec![(s[0].clone(), 10.0)];
        let matrix = DistanceMatrix::from_points(&[], &[], 50.0);
        assert!(
            GreedyCapacitySolver
                .solve(&demand, &supply, &matrix, 10.0)
                .is_err()
        );
    }

    #[test]
    fn solve_is_deterministic() {
        let (b, s) = ids(4, 3);
        let demand: Vec<_> = b.iter().cloned().zip([10.0, 20.0, 30.0, 40.0]).collect();
        let supply: Vec<_> = s.iter().cloned().zip([35.0, 35.0, 35.0]).collect();
        let points_b = [
            Point::new(0.0, 0.0),
            Point::new(50.0, 50.0),
            Point::new(100.0, 0.0),
            Point::new(0.0, 100.0),
        ];
        let points_s = [
            Point::new(25.0, 25.0),
            Point::new(75.0, 25.0),
            Point::new(25.0, 75.0),
        ];
        let matrix = DistanceMatrix::from_points(&points_b, &points_s, 50.0);
        let first = GreedyCapacitySolver
            .solve(&demand, &supply, &matrix, 100.0)
            .unwrap();
        let second = GreedyCapacitySolver
            .solve(&demand, &supply, &matrix, 100.0)
            .unwrap();
        assert_eq!(first.links, second.links);
        assert_eq!(first.employed, second.employed);
    }
}
