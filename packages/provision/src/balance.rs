//! Floor-area-weighted population apportionment.

use crate::ProvisionError;

/// Apportions an aggregate population total onto buildings.
///
/// Contract: the returned vector has one entry per weight, every entry is
/// non-negative, and the sum equals the rounded target exactly.
pub trait PopulationBalancer {
    /// Apportions `target` people across buildings with the given
    /// floor-area `weights`.
    ///
    /// # Errors
    ///
    /// Returns an error if `target` is positive and there are no buildings
    /// to carry it.
    fn apportion(&self, target: f64, weights: &[f64]) -> Result<Vec<f64>, ProvisionError>;
}

/// Reference balancer: shares proportional to floor-area weight, rounded
/// with the largest-remainder method so the total is conserved exactly.
/// When every weight is zero the target spreads uniformly.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloorAreaBalancer;

impl PopulationBalancer for FloorAreaBalancer {
    fn apportion(&self, target: f64, weights: &[f64]) -> Result<Vec<f64>, ProvisionError> {
        #[allow(clippy::cast_possible_truncation)]
        let target_units = target.round().max(0.0) as u64;
        if weights.is_empty() {
            if target_units > 0 {
                return Err(ProvisionError::NoCarriers { target });
            }
            return Ok(vec![]);
        }

        let total_weight: f64 = weights.iter().sum();
        #[allow(clippy::cast_precision_loss)]
        let shares: Vec<f64> = if total_weight > 0.0 {
            weights
                .iter()
                .map(|w| target_units as f64 * w / total_weight)
                .collect()
        } else {
            log::warn!(
                "All {} building weights are zero; apportioning uniformly",
                weights.len()
            );
            vec![target_units as f64 / weights.len() as f64; weights.len()]
        };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let mut allocated: Vec<u64> = shares.iter().map(|s| s.floor() as u64).collect();
        let placed: u64 = allocated.iter().sum();
        let mut remainder = target_units.saturating_sub(placed);

        // Hand the leftover units to the largest fractional parts, ties by
        // input order.
        let mut order: Vec<usize> = (0..shares.len()).collect();
        order.sort_by(|&a, &b| {
            let frac_a = shares[a].fract();
            let frac_b = shares[b].fract();
            frac_b.total_cmp(&frac_a).then(a.cmp(&b))
        });
        for index in order {
            if remainder == 0 {
                break;
            }
            allocated[index] += 1;
            remainder -= 1;
        }

        #[allow(clippy::cast_precision_loss)]
        let allocations = allocated.into_iter().map(|units| units as f64).collect();
        Ok(allocations)
    }
}
