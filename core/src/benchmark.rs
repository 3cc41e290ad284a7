//! Percentile benchmarker: population-relative bands per level.
//!
//! Only the active population (7-day spend > 0) is sampled. Efficiency is
//! `1 / CPA` on the client's primary conversion, so higher is better and
//! zero-conversion entities drop out instead of looking infinitely
//! efficient. Too few samples fall back to fixed conservative bands.

use crate::{
    aggregator::RollingAggregate,
    types::EntityLevel,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum samples before a band is computed from the population.
pub const MIN_BENCHMARK_SAMPLES: usize = 5;

pub const LOW_PERCENTILE: f64 = 0.10;
pub const HIGH_PERCENTILE: f64 = 0.90;

// Conservative fallback bands.
pub const FALLBACK_CTR: Band = Band::fixed(0.005, 0.030);
pub const FALLBACK_CLICK_TO_CONVERSION: Band = Band::fixed(0.01, 0.10);
pub const FALLBACK_CONVERSION_RATE: Band = Band::fixed(0.02, 0.15);

/// A 10th–90th percentile band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub p10:      f64,
    pub p90:      f64,
    pub samples:  usize,
    pub fallback: bool,
}

impl Band {
    pub const fn fixed(p10: f64, p90: f64) -> Self {
        Self { p10, p90, samples: 0, fallback: true }
    }

    /// Min-max normalise `value` into [0, 1] against the band.
    pub fn normalize(&self, value: f64) -> f64 {
        let width = self.p90 - self.p10;
        if width <= 0.0 {
            return if value >= self.p90 { 1.0 } else { 0.0 };
        }
        ((value - self.p10) / width).clamp(0.0, 1.0)
    }
}

/// Linear interpolation between order statistics: `pos = (n - 1) * p`.
/// `sorted` must be ascending and non-empty.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let pos = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn sorted_finite(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = values.filter(|x| x.is_finite()).collect();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    v
}

/// Population band, or `None` if the sample is too thin or degenerate.
fn population_band(values: Vec<f64>) -> Option<Band> {
    if values.len() < MIN_BENCHMARK_SAMPLES {
        return None;
    }
    let p10 = percentile(&values, LOW_PERCENTILE);
    let p90 = percentile(&values, HIGH_PERCENTILE);
    (p90 > p10).then_some(Band { p10, p90, samples: values.len(), fallback: false })
}

fn band_or(values: Vec<f64>, fallback: Band) -> Band {
    population_band(values).unwrap_or(fallback)
}

/// Bands for one level of one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub level:               EntityLevel,
    pub active_count:        usize,
    /// `None` when neither the population nor a target CPA can anchor it.
    pub efficiency:          Option<Band>,
    pub click_to_conversion: Band,
    pub conversion_rate:     Band,
    pub ctr:                 Band,
    /// 25th percentile of 7-day spend across active entities.
    pub spend_p25:           f64,
}

impl Percentiles {
    /// Bands with no population behind them.
    pub fn fallback(level: EntityLevel, target_cpa: Option<f64>) -> Self {
        Self {
            level,
            active_count:        0,
            efficiency:          target_efficiency_band(target_cpa),
            click_to_conversion: FALLBACK_CLICK_TO_CONVERSION,
            conversion_rate:     FALLBACK_CONVERSION_RATE,
            ctr:                 FALLBACK_CTR,
            spend_p25:           0.0,
        }
    }

    pub fn compute(level: EntityLevel, aggs: &[&RollingAggregate], target_cpa: Option<f64>) -> Self {
        let active: Vec<&&RollingAggregate> = aggs.iter().filter(|a| a.is_active()).collect();

        let efficiency = population_band(sorted_finite(
            active.iter().filter_map(|a| a.d7.cpa).filter(|c| *c > 0.0).map(|c| 1.0 / c),
        ))
        .or_else(|| target_efficiency_band(target_cpa));

        let spend = sorted_finite(active.iter().map(|a| a.spend_7d()));
        let spend_p25 = if spend.is_empty() { 0.0 } else { percentile(&spend, 0.25) };

        Self {
            level,
            active_count: active.len(),
            efficiency,
            click_to_conversion: band_or(
                sorted_finite(active.iter().filter_map(|a| a.d7.click_to_conversion)),
                FALLBACK_CLICK_TO_CONVERSION,
            ),
            conversion_rate: band_or(
                sorted_finite(active.iter().filter_map(|a| a.d7.conversion_rate)),
                FALLBACK_CONVERSION_RATE,
            ),
            ctr: band_or(sorted_finite(active.iter().filter_map(|a| a.d7.ctr)), FALLBACK_CTR),
            spend_p25,
        }
    }
}

/// Efficiency band anchored on the target: CPA at 2× target maps to 0,
/// CPA at half the target maps to 1.
fn target_efficiency_band(target_cpa: Option<f64>) -> Option<Band> {
    target_cpa
        .filter(|t| *t > 0.0)
        .map(|t| Band::fixed(1.0 / (t * 2.0), 1.0 / (t * 0.5)))
}

/// Per-level bands for one client at one computation instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSet {
    pub by_level: BTreeMap<EntityLevel, Percentiles>,
}

impl BenchmarkSet {
    pub fn compute(aggs: &[RollingAggregate], target_cpa: Option<f64>) -> Self {
        let by_level = EntityLevel::ALL
            .iter()
            .map(|level| {
                let members: Vec<&RollingAggregate> =
                    aggs.iter().filter(|a| a.level == *level).collect();
                (*level, Percentiles::compute(*level, &members, target_cpa))
            })
            .collect();
        Self { by_level }
    }

    /// Bands for `level`; a fallback set if the level was never computed.
    pub fn for_level(&self, level: EntityLevel, target_cpa: Option<f64>) -> Percentiles {
        self.by_level
            .get(&level)
            .cloned()
            .unwrap_or_else(|| Percentiles::fallback(level, target_cpa))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn agg(id: &str, spend: f64, purchases: f64) -> RollingAggregate {
        let day = NaiveDate::from_ymd_opt(2026, 5, 20).unwrap();
        let mut a = RollingAggregate::empty("c1", id, EntityLevel::Ad, day);
        a.d7.totals.spend = spend;
        a.d7.totals.impressions = 10_000;
        a.d7.totals.clicks = (spend as u64).max(1);
        a.d7.totals.conversions.purchases = purchases;
        a.refresh_metrics(crate::types::ConversionType::Purchase);
        a
    }

    #[test]
    fn percentile_interpolates_between_order_statistics() {
        let v = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&v, 0.0), 10.0);
        assert_eq!(percentile(&v, 0.5), 30.0);
        // pos = 4 * 0.9 = 3.6 → 40 + 0.6 * 10
        assert!((percentile(&v, 0.9) - 46.0).abs() < 1e-9);
        assert!((percentile(&v, 0.1) - 14.0).abs() < 1e-9);
        assert_eq!(percentile(&[7.0], 0.9), 7.0);
    }

    #[test]
    fn zero_conversion_entities_are_excluded_from_efficiency() {
        let aggs: Vec<RollingAggregate> = (0..6)
            .map(|i| agg(&format!("a{i}"), 100.0, (i + 1) as f64))
            .chain(std::iter::once(agg("dud", 100.0, 0.0)))
            .collect();
        let refs: Vec<&RollingAggregate> = aggs.iter().collect();
        let p = Percentiles::compute(EntityLevel::Ad, &refs, None);
        let band = p.efficiency.unwrap();
        assert_eq!(band.samples, 6);
        assert!(!band.fallback);
        assert!(band.p10 < band.p90);
    }

    #[test]
    fn thin_population_uses_fallback_bands() {
        let aggs = vec![agg("a", 50.0, 1.0), agg("b", 80.0, 2.0)];
        let refs: Vec<&RollingAggregate> = aggs.iter().collect();
        let p = Percentiles::compute(EntityLevel::Ad, &refs, Some(40.0));
        assert!(p.ctr.fallback);
        assert_eq!(p.ctr, FALLBACK_CTR);
        let eff = p.efficiency.unwrap();
        assert!(eff.fallback);
        assert!((eff.p10 - 1.0 / 80.0).abs() < 1e-12);

        let none = Percentiles::compute(EntityLevel::Ad, &refs, None);
        assert_eq!(none.efficiency, None);
    }

    #[test]
    fn inactive_entities_are_not_sampled() {
        let aggs = vec![agg("a", 10.0, 1.0), agg("idle", 0.0, 0.0), agg("b", 30.0, 1.0)];
        let refs: Vec<&RollingAggregate> = aggs.iter().collect();
        let p = Percentiles::compute(EntityLevel::Ad, &refs, None);
        assert_eq!(p.active_count, 2);
        assert!((p.spend_p25 - 15.0).abs() < 1e-9);
    }

    #[test]
    fn normalize_clamps_to_unit_range() {
        let b = Band::fixed(0.01, 0.03);
        assert_eq!(b.normalize(0.0), 0.0);
        assert_eq!(b.normalize(0.5), 1.0);
        assert!((b.normalize(0.02) - 0.5).abs() < 1e-9);
    }
}
