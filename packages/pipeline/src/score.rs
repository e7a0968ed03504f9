//! Development-potential scoring: eligibility, normalization, correlation
//! weights, clustering, and categorization.

use std::collections::BTreeSet;

use urban_potential_city_models::{ScoreCategory, ScoreRecord, ServiceKind, Zone};
use urban_potential_config::NormsConfig;

use crate::{cluster, StageReport};

/// Scores every residential zone on a [-100, 100] scale.
///
/// Zones whose projection, density deficit, and green difference all clear
/// the eligibility thresholds enter the positive branch: the three core
/// indicators are min-max normalized, weighted by the mean absolute
/// Pearson correlation with the other two, and the composite rescaled to
/// [0, 100]. The raw indicator triples are also clustered with a seeded
/// k-means so downstream consumers can group similar zones.
///
/// Ineligible residential zones enter the negative branch, but only when
/// provision was aggregated for all three service kinds; otherwise their
/// free-places columns would be trivially zero and the branch meaningless.
/// There, summed normalized free places rescale to [-100, 0]: the more
/// unused capacity a zone holds without clearing eligibility, the
/// stronger the negative signal. Zones with no free places at all stay
/// at zero.
///
/// Every zone, scored or not, receives a category from its final score.
#[must_use]
pub fn score_zones(
    mut zones: Vec<Zone>,
    norms: &NormsConfig,
    aggregated_kinds: &BTreeSet<ServiceKind>,
) -> (Vec<Zone>, Vec<ScoreRecord>, StageReport) {
    let mut report = StageReport::new("potential_scorer");
    report.processed = zones.iter().filter(|zone| zone.is_living).count();

    let thresholds = &norms.eligibility;
    let eligible: Vec<usize> = zones
        .iter()
        .enumerate()
        .filter(|(_, zone)| {
            zone.is_living
                && zone
                    .projection
                    .new_population
                    .is_some_and(|population| population > thresholds.min_new_population)
                && zone
                    .density
                    .deficit_density
                    .is_some_and(|deficit| deficit >= thresholds.min_deficit_density)
                && zone.green.difference_from_normative > thresholds.min_green_difference
        })
        .map(|(index, _)| index)
        .collect();
    log::info!(
        "{} of {} residential zones eligible for positive scoring",
        eligible.len(),
        report.processed
    );
    for _ in eligible.len()..report.processed {
        report.miss("ineligible_zone");
    }

    let mut records = Vec::new();
    if !eligible.is_empty() {
        let raw: Vec<[f64; 3]> = eligible
            .iter()
            .map(|&index| {
                let zone = &zones[index];
                [
                    zone.projection.new_population.unwrap_or_default(),
                    zone.density.deficit_density.unwrap_or_default(),
                    zone.green.difference_from_normative,
                ]
            })
            .collect();

        let columns: Vec<Vec<f64>> = (0..3)
            .map(|axis| raw.iter().map(|row| row[axis]).collect())
            .collect();
        let normalized: Vec<Vec<f64>> = columns.iter().map(|column| min_max(column)).collect();

        let weights = correlation_weights(&columns);
        log::info!(
            "Indicator weights: population {:.3}, density {:.3}, green {:.3}",
            weights[0],
            weights[1],
            weights[2]
        );

        let composite: Vec<f64> = (0..eligible.len())
            .map(|row| (0..3).map(|axis| weights[axis] * normalized[axis][row]).sum())
            .collect();
        let rescaled: Vec<f64> = min_max(&composite).into_iter().map(|v| v * 100.0).collect();

        let clusters = cluster::kmeans(&raw, norms.scoring.cluster_count, norms.scoring.cluster_seed);

        for (position, &index) in eligible.iter().enumerate() {
            let score = rescaled[position];
            let category = ScoreCategory::from_score(score, norms.scoring.category_cut);
            zones[index].total_score = score;
            records.push(ScoreRecord {
                zone_id: zones[index].id.clone(),
                normalized: [
                    normalized[0][position],
                    normalized[1][position],
                    normalized[2][position],
                ],
                cluster: clusters[position],
                total_score: score,
                category,
            });
        }
    }

    let all_kinds_aggregated = ServiceKind::all()
        .iter()
        .all(|kind| aggregated_kinds.contains(kind));
    if all_kinds_aggregated {
        score_negative(&mut zones, &eligible);
    } else {
        log::info!("Negative scoring skipped: not all service kinds were aggregated");
    }

    for zone in &mut zones {
        zone.category = Some(ScoreCategory::from_score(
            zone.total_score,
            norms.scoring.category_cut,
        ));
    }

    (zones, records, report)
}

/// Negative branch over ineligible residential zones: summed normalized
/// free places, rescaled to [-100, 0]. Zones with no free signal stay 0.
fn score_negative(zones: &mut [Zone], eligible: &[usize]) {
    let eligible: BTreeSet<usize> = eligible.iter().copied().collect();
    let candidates: Vec<usize> = zones
        .iter()
        .enumerate()
        .filter(|(index, zone)| zone.is_living && !eligible.contains(index))
        .map(|(index, _)| index)
        .collect();
    if candidates.is_empty() {
        return;
    }

    let columns: Vec<Vec<f64>> = ServiceKind::all()
        .iter()
        .map(|kind| {
            candidates
                .iter()
                .map(|&index| zones[index].provision_for(*kind).free_places)
                .collect()
        })
        .collect();
    let normalized: Vec<Vec<f64>> = columns.iter().map(|column| min_max(column)).collect();
    let summed: Vec<f64> = (0..candidates.len())
        .map(|row| (0..3).map(|axis| normalized[axis][row]).sum())
        .collect();
    let rescaled = min_max(&summed);

    for (position, &index) in candidates.iter().enumerate() {
        let has_signal = (0..3).any(|axis| columns[axis][position] > 0.0);
        if has_signal {
            zones[index].total_score = -100.0 * rescaled[position];
        }
    }
}

/// Min-max normalization to [0, 1]; a constant column maps to all zeros.
fn min_max(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if span <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|value| (value - min) / span).collect()
}

/// Weight per indicator: the mean absolute Pearson correlation with the
/// other two, normalized to sum 1. Constant columns weigh 0; if every
/// column is constant, the weights fall back to equal thirds.
fn correlation_weights(columns: &[Vec<f64>]) -> [f64; 3] {
    let mut weights = [0.0_f64; 3];
    for i in 0..3 {
        let mut sum = 0.0;
        for j in 0..3 {
            if i != j {
                sum += pearson(&columns[i], &columns[j]).abs();
            }
        }
        weights[i] = sum / 2.0;
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return [1.0 / 3.0; 3];
    }
    for weight in &mut weights {
        *weight /= total;
    }
    weights
}

/// Pearson correlation; 0 when either column has no variance.
fn pearson(a: &[f64], b: &[f64]) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let n = a.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut covariance = 0.0;
    let mut variance_a = 0.0;
    let mut variance_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        covariance += (x - mean_a) * (y - mean_b);
        variance_a += (x - mean_a).powi(2);
        variance_b += (y - mean_b).powi(2);
    }
    if variance_a <= 0.0 || variance_b <= 0.0 {
        return 0.0;
    }
    covariance / (variance_a.sqrt() * variance_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};
    use urban_potential_city_models::{EnvironmentType, ZoneProvision, ZoneSource};

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]])
    }

    fn residential_zones(count: usize) -> Vec<Zone> {
        let norms = urban_potential_config::NormsConfig::load(None).unwrap();
        let sources = (0..count)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let x = i as f64 * 200.0;
                ZoneSource {
                    geometry: square(x, 0.0, 100.0),
                    code: "ЖР".to_string(),
                    environment: Some(EnvironmentType::Medium),
                }
            })
            .collect();
        crate::resolve::resolve_zones(sources, &norms).0
    }

    fn make_eligible(zone: &mut Zone, new_population: f64, deficit: f64, green: f64) {
        zone.projection.new_population = Some(new_population);
        zone.density.deficit_density = Some(deficit);
        zone.green.difference_from_normative = green;
    }

    fn set_free_places(zone: &mut Zone, school: f64, kindergarten: f64, polyclinic: f64) {
        for (kind, places) in [
            (ServiceKind::School, school),
            (ServiceKind::Kindergarten, kindergarten),
            (ServiceKind::Polyclinic, polyclinic),
        ] {
            zone.provision.insert(
                kind,
                ZoneProvision {
                    free_places: places,
                    ..Default::default()
                },
            );
        }
    }

    fn all_kinds() -> BTreeSet<ServiceKind> {
        ServiceKind::all().iter().copied().collect()
    }

    #[test]
    fn eligible_zones_span_zero_to_one_hundred() {
        let norms = urban_potential_config::NormsConfig::load(None).unwrap();
        let mut zones = residential_zones(3);
        make_eligible(&mut zones[0], 500.0, 0.03, 5.0);
        make_eligible(&mut zones[1], 250.0, 0.015, 2.5);
        make_eligible(&mut zones[2], 10.0, 0.001, 0.5);

        let (zones, records, _) = score_zones(zones, &norms, &all_kinds());
        assert_eq!(records.len(), 3);
        assert!((zones[0].total_score - 100.0).abs() < 1e-9);
        assert!(zones[2].total_score.abs() < 1e-9);
        assert!(zones[1].total_score > 0.0 && zones[1].total_score < 100.0);
        assert_eq!(zones[0].category, Some(ScoreCategory::High));
        assert_eq!(zones[2].category, Some(ScoreCategory::Medium));
    }

    #[test]
    fn a_single_eligible_zone_scores_zero() {
        let norms = urban_potential_config::NormsConfig::load(None).unwrap();
        let mut zones = residential_zones(1);
        make_eligible(&mut zones[0], 100.0, 0.02, 3.0);

        let (zones, records, _) = score_zones(zones, &norms, &all_kinds());
        // Every normalization span is zero, so the composite collapses.
        assert!(zones[0].total_score.abs() < f64::EPSILON);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, ScoreCategory::Medium);
    }

    #[test]
    fn ineligible_zones_with_free_places_score_negative() {
        let norms = urban_potential_config::NormsConfig::load(None).unwrap();
        let mut zones = residential_zones(3);
        // Zone 0 is eligible, zones 1 and 2 are not.
        make_eligible(&mut zones[0], 500.0, 0.03, 5.0);
        set_free_places(&mut zones[1], 200.0, 150.0, 400.0);
        set_free_places(&mut zones[2], 50.0, 30.0, 80.0);

        let (zones, _, report) = score_zones(zones, &norms, &all_kinds());
        assert!((zones[1].total_score + 100.0).abs() < 1e-9);
        assert!(zones[2].total_score < 0.0 || zones[2].total_score.abs() < 1e-9);
        assert_eq!(zones[1].category, Some(ScoreCategory::Low));
        assert_eq!(report.misses["ineligible_zone"], 2);
    }

    #[test]
    fn zones_without_free_signal_stay_at_zero() {
        let norms = urban_potential_config::NormsConfig::load(None).unwrap();
        let mut zones = residential_zones(2);
        set_free_places(&mut zones[0], 100.0, 100.0, 100.0);
        // Zone 1 has no free places anywhere.

        let (zones, _, _) = score_zones(zones, &norms, &all_kinds());
        assert!(zones[1].total_score.abs() < f64::EPSILON);
        assert_eq!(zones[1].category, Some(ScoreCategory::Medium));
    }

    #[test]
    fn negative_branch_requires_all_kinds_aggregated() {
        let norms = urban_potential_config::NormsConfig::load(None).unwrap();
        let mut zones = residential_zones(2);
        set_free_places(&mut zones[0], 200.0, 150.0, 400.0);
        set_free_places(&mut zones[1], 50.0, 30.0, 80.0);

        let partial: BTreeSet<ServiceKind> = [ServiceKind::School].into_iter().collect();
        let (zones, _, _) = score_zones(zones, &norms, &partial);
        assert!(zones[0].total_score.abs() < f64::EPSILON);
        assert!(zones[1].total_score.abs() < f64::EPSILON);
    }

    #[test]
    fn correlation_weights_sum_to_one() {
        let columns = vec![
            vec![1.0, 2.0, 3.0, 4.0],
            vec![2.0, 4.0, 6.0, 8.0],
            vec![5.0, 3.0, 8.0, 1.0],
        ];
        let weights = correlation_weights(&columns);
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        // Perfectly correlated columns outweigh the noisy one.
        assert!(weights[0] > weights[2]);
        assert!(weights[1] > weights[2]);
    }

    #[test]
    fn constant_columns_fall_back_to_equal_weights() {
        let columns = vec![vec![1.0; 4], vec![2.0; 4], vec![3.0; 4]];
        let weights = correlation_weights(&columns);
        for weight in weights {
            assert!((weight - 1.0 / 3.0).abs() < 1e-9);
        }
    }

    #[test]
    fn pearson_handles_degenerate_inputs() {
        assert!(pearson(&[1.0], &[2.0]).abs() < f64::EPSILON);
        assert!(pearson(&[1.0, 1.0], &[2.0, 3.0]).abs() < f64::EPSILON);
        assert!((pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-9);
    }
}
