//! Rolling-metrics aggregator: raw daily records to sliding-window
//! aggregates per entity.
//!
//! A record belongs to the N-day window iff `0 <= (reference - date) < N`.
//! The reference date itself is day 0. Ratios are `None` whenever their
//! denominator is zero; callers treat `None` as "insufficient signal".
//!
//! Aggregation is two-phase:
//!   1. `build_aggregate`: per entity, independent, parallel-safe.
//!   2. `finalize_population`: cross-entity pass (spend shares, top-N
//!      concentration, active child/sibling counts). Needs every entity's
//!      7-day spend, so it runs only after phase 1 has completed for all.

use crate::{
    concept::concept_key,
    record::{ConversionCounts, DailyRecord},
    types::{ClientId, ConversionType, EntityId, EntityLevel},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const WINDOW_SIZES: [i64; 4] = [3, 7, 14, 30];

/// Ads ranked into the top-N concentration share.
pub const TOP_N_CONCENTRATION: usize = 3;

// ── Windows ──────────────────────────────────────────────────────────────────

/// A right-open range of days back from the reference date: `start <= back < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpan {
    pub start: i64,
    pub end:   i64,
}

impl WindowSpan {
    /// The trailing `n` days, reference date included.
    pub const fn trailing(n: i64) -> Self {
        Self { start: 0, end: n }
    }

    /// The `n` days immediately before `trailing(n)`, non-overlapping.
    pub const fn prior(n: i64) -> Self {
        Self { start: n, end: 2 * n }
    }

    pub fn contains(&self, days_back: i64) -> bool {
        days_back >= self.start && days_back < self.end
    }

    pub fn len(&self) -> i64 {
        self.end - self.start
    }
}

/// Summed raw counters over one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowTotals {
    pub spend:              f64,
    pub impressions:        u64,
    pub reach:              u64,
    pub clicks:             u64,
    pub landing_page_views: u64,
    pub conversions:        ConversionCounts,
    pub conversion_value:   f64,
    pub video_views_3s:     u64,
    pub thruplays:          u64,
    pub engagements:        u64,
    /// Distinct days that contributed at least one record.
    pub days_with_data:     u32,
}

impl WindowTotals {
    fn add_record(&mut self, r: &DailyRecord) {
        self.spend              += r.spend;
        self.impressions         = self.impressions.saturating_add(r.impressions);
        self.reach               = self.reach.saturating_add(r.reach);
        self.clicks              = self.clicks.saturating_add(r.clicks);
        self.landing_page_views  = self.landing_page_views.saturating_add(r.landing_page_views);
        self.conversions.add(&r.conversions);
        self.conversion_value   += r.conversion_value;
        self.video_views_3s      = self.video_views_3s.saturating_add(r.video_views_3s);
        self.thruplays           = self.thruplays.saturating_add(r.thruplays);
        self.engagements         = self.engagements.saturating_add(r.engagements);
    }

    pub fn merge(&mut self, other: &WindowTotals) {
        self.spend              += other.spend;
        self.impressions         = self.impressions.saturating_add(other.impressions);
        self.reach               = self.reach.saturating_add(other.reach);
        self.clicks              = self.clicks.saturating_add(other.clicks);
        self.landing_page_views  = self.landing_page_views.saturating_add(other.landing_page_views);
        self.conversions.add(&other.conversions);
        self.conversion_value   += other.conversion_value;
        self.video_views_3s      = self.video_views_3s.saturating_add(other.video_views_3s);
        self.thruplays           = self.thruplays.saturating_add(other.thruplays);
        self.engagements         = self.engagements.saturating_add(other.engagements);
        self.days_with_data      = self.days_with_data.max(other.days_with_data);
    }
}

/// `num / den`, undefined when the denominator is zero.
pub fn ratio(num: f64, den: f64) -> Option<f64> {
    if den == 0.0 || !den.is_finite() {
        None
    } else {
        Some(num / den)
    }
}

/// Period-over-period percentage change; 0 when there is no prior value.
pub fn pct_delta(curr: f64, prev: f64) -> f64 {
    if prev == 0.0 {
        0.0
    } else {
        (curr / prev - 1.0) * 100.0
    }
}

/// Percentage change between two ratios; undefined if either side is.
pub fn ratio_delta(curr: Option<f64>, prev: Option<f64>) -> Option<f64> {
    match (curr, prev) {
        (Some(c), Some(p)) => Some(pct_delta(c, p)),
        _ => None,
    }
}

/// Totals for one window plus every ratio derived from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub days:                i64,
    pub totals:              WindowTotals,
    pub primary_conversions: f64,
    pub cpa:                 Option<f64>,
    pub roas:                Option<f64>,
    pub ctr:                 Option<f64>,
    pub cpm:                 Option<f64>,
    pub frequency:           Option<f64>,
    pub hook_rate:           Option<f64>,
    pub video_retention:     Option<f64>,
    pub click_to_conversion: Option<f64>,
    pub conversion_rate:     Option<f64>,
    /// Primary conversions per day of window length.
    pub velocity:            f64,
}

impl WindowMetrics {
    pub fn from_totals(days: i64, totals: WindowTotals, primary: ConversionType) -> Self {
        let conv = totals.conversions.get(primary);
        let impressions = totals.impressions as f64;
        Self {
            days,
            primary_conversions: conv,
            cpa:                 ratio(totals.spend, conv),
            roas:                ratio(totals.conversion_value, totals.spend),
            ctr:                 ratio(totals.clicks as f64, impressions),
            cpm:                 ratio(totals.spend * 1000.0, impressions),
            frequency:           ratio(impressions, totals.reach as f64),
            hook_rate:           ratio(totals.video_views_3s as f64, impressions),
            video_retention:     ratio(totals.thruplays as f64, totals.video_views_3s as f64),
            click_to_conversion: ratio(conv, totals.clicks as f64),
            conversion_rate:     ratio(conv, totals.landing_page_views as f64),
            velocity:            if days > 0 { conv / days as f64 } else { 0.0 },
            totals,
        }
    }

    pub fn spend(&self) -> f64 {
        self.totals.spend
    }
}

// ── Aggregate ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deltas {
    /// Budget-change signal (days 0–2 vs 3–5).
    pub spend_3d_vs_prev_3d:      f64,
    pub cpa_3d_vs_prev_3d:        Option<f64>,
    pub hook_rate_3d_vs_prev_3d:  Option<f64>,
    /// Week-over-week (days 0–6 vs 7–13).
    pub spend_7d_vs_prev_7d:      f64,
    pub conversions_7d_vs_prev_7d: f64,
    pub cpa_7d_vs_prev_7d:        Option<f64>,
    /// Short window against the 14-day baseline.
    pub cpa_7d_vs_14d:            Option<f64>,
    pub roas_7d_vs_14d:           Option<f64>,
    pub hook_rate_7d_vs_14d:      Option<f64>,
    pub ctr_7d_vs_14d:            Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Concentration {
    /// This entity's share of 7-day spend across its level.
    pub level_spend_share: Option<f64>,
    /// Ads only: this ad's share of account-wide ad spend.
    pub top1_share:        Option<f64>,
    /// Ads and accounts: share of ad spend held by the top-3 ads.
    pub top3_share:        Option<f64>,
    /// Ads only: 1-based rank by 7-day spend.
    pub spend_rank:        Option<usize>,
    /// Active entities at this level, client-wide.
    pub active_population: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureFacts {
    /// Active entities one level down whose parent is this entity.
    pub active_children: usize,
    /// Active entities at this level sharing this entity's parent (self included).
    pub active_siblings: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stability {
    pub days_active:          u32,
    pub days_since_last_edit: Option<u32>,
    pub last_seen:            Option<NaiveDate>,
    /// Coefficient of variation of daily CPA inside the 7-day window.
    pub cpa_volatility:       Option<f64>,
    pub roas_volatility:      Option<f64>,
}

impl Stability {
    /// The larger of CPA and ROAS volatility, if either is defined.
    pub fn volatility(&self) -> Option<f64> {
        match (self.cpa_volatility, self.roas_volatility) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

/// One entity's windowed view at one computation instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingAggregate {
    pub client_id:      ClientId,
    pub entity_id:      EntityId,
    pub level:          EntityLevel,
    pub name:           String,
    pub parent_id:      Option<EntityId>,
    pub concept_key:    Option<String>,
    pub reference_date: NaiveDate,
    pub d3:             WindowMetrics,
    pub d7:             WindowMetrics,
    pub d14:            WindowMetrics,
    pub d30:            WindowMetrics,
    pub prev_3d:        WindowMetrics,
    pub prev_7d:        WindowMetrics,
    pub deltas:         Deltas,
    pub concentration:  Concentration,
    pub structure:      StructureFacts,
    pub stability:      Stability,
}

impl RollingAggregate {
    /// All-zero aggregate for an entity with no usable records.
    pub fn empty(
        client_id: impl Into<ClientId>,
        entity_id: impl Into<EntityId>,
        level: EntityLevel,
        reference_date: NaiveDate,
    ) -> Self {
        let entity_id = entity_id.into();
        Self {
            client_id: client_id.into(),
            name: entity_id.clone(),
            entity_id,
            level,
            parent_id: None,
            concept_key: None,
            reference_date,
            d3:  WindowMetrics { days: 3, ..Default::default() },
            d7:  WindowMetrics { days: 7, ..Default::default() },
            d14: WindowMetrics { days: 14, ..Default::default() },
            d30: WindowMetrics { days: 30, ..Default::default() },
            prev_3d: WindowMetrics { days: 3, ..Default::default() },
            prev_7d: WindowMetrics { days: 7, ..Default::default() },
            deltas: Deltas::default(),
            concentration: Concentration::default(),
            structure: StructureFacts::default(),
            stability: Stability::default(),
        }
    }

    /// Active means any spend in the trailing 7 days.
    pub fn is_active(&self) -> bool {
        self.d7.totals.spend > 0.0
    }

    pub fn spend_7d(&self) -> f64 {
        self.d7.totals.spend
    }

    /// Recompute every ratio and delta from the window totals.
    pub fn refresh_metrics(&mut self, primary: ConversionType) {
        self.d3      = WindowMetrics::from_totals(3, self.d3.totals, primary);
        self.d7      = WindowMetrics::from_totals(7, self.d7.totals, primary);
        self.d14     = WindowMetrics::from_totals(14, self.d14.totals, primary);
        self.d30     = WindowMetrics::from_totals(30, self.d30.totals, primary);
        self.prev_3d = WindowMetrics::from_totals(3, self.prev_3d.totals, primary);
        self.prev_7d = WindowMetrics::from_totals(7, self.prev_7d.totals, primary);
        self.deltas  = compute_deltas(self);
    }
}

fn compute_deltas(a: &RollingAggregate) -> Deltas {
    Deltas {
        spend_3d_vs_prev_3d:       pct_delta(a.d3.spend(), a.prev_3d.spend()),
        cpa_3d_vs_prev_3d:         ratio_delta(a.d3.cpa, a.prev_3d.cpa),
        hook_rate_3d_vs_prev_3d:   ratio_delta(a.d3.hook_rate, a.prev_3d.hook_rate),
        spend_7d_vs_prev_7d:       pct_delta(a.d7.spend(), a.prev_7d.spend()),
        conversions_7d_vs_prev_7d: pct_delta(a.d7.primary_conversions, a.prev_7d.primary_conversions),
        cpa_7d_vs_prev_7d:         ratio_delta(a.d7.cpa, a.prev_7d.cpa),
        cpa_7d_vs_14d:             ratio_delta(a.d7.cpa, a.d14.cpa),
        roas_7d_vs_14d:            ratio_delta(a.d7.roas, a.d14.roas),
        hook_rate_7d_vs_14d:       ratio_delta(a.d7.hook_rate, a.d14.hook_rate),
        ctr_7d_vs_14d:             ratio_delta(a.d7.ctr, a.d14.ctr),
    }
}

// ── Phase 1: per entity ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct AggregationContext {
    pub reference_date: NaiveDate,
    pub primary:        ConversionType,
}

/// Every record of one (level, entity id), in no particular order.
#[derive(Debug, Clone)]
pub struct EntityRecords<'a> {
    pub level:     EntityLevel,
    pub entity_id: &'a str,
    pub records:   Vec<&'a DailyRecord>,
}

/// Partition records by (level, entity id). Output is sorted by level, then id.
pub fn group_by_entity(records: &[DailyRecord]) -> Vec<EntityRecords<'_>> {
    let mut groups: BTreeMap<(EntityLevel, &str), Vec<&DailyRecord>> = BTreeMap::new();
    for r in records {
        groups.entry((r.level, r.entity_id.as_str())).or_default().push(r);
    }
    groups
        .into_iter()
        .map(|((level, entity_id), records)| EntityRecords { level, entity_id, records })
        .collect()
}

fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return None;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(var.sqrt() / mean)
}

/// Build one entity's aggregate. Concentration and structure stay at their
/// defaults until `finalize_population` runs.
pub fn build_aggregate(group: &EntityRecords<'_>, ctx: &AggregationContext) -> RollingAggregate {
    let client_id = group.records.first().map(|r| r.client_id.clone()).unwrap_or_default();
    let mut agg = RollingAggregate::empty(client_id, group.entity_id, group.level, ctx.reference_date);

    let spans = [
        WindowSpan::trailing(3),
        WindowSpan::trailing(7),
        WindowSpan::trailing(14),
        WindowSpan::trailing(30),
        WindowSpan::prior(3),
        WindowSpan::prior(7),
    ];
    let mut totals = [WindowTotals::default(); 6];
    let mut days_seen: [Vec<i64>; 6] = Default::default();
    // days back → (spend, primary conversions, value) inside the 7-day window
    let mut daily_7d: BTreeMap<i64, (f64, f64, f64)> = BTreeMap::new();
    let mut latest: Option<&DailyRecord> = None;

    for r in &group.records {
        let back = r.days_back(ctx.reference_date);
        if back < 0 {
            continue;
        }
        for (i, span) in spans.iter().enumerate() {
            if span.contains(back) {
                totals[i].add_record(r);
                if !days_seen[i].contains(&back) {
                    days_seen[i].push(back);
                }
            }
        }
        if WindowSpan::trailing(7).contains(back) {
            let day = daily_7d.entry(back).or_insert((0.0, 0.0, 0.0));
            day.0 += r.spend;
            day.1 += r.conversions.get(ctx.primary);
            day.2 += r.conversion_value;
        }
        if latest.map_or(true, |l| r.date > l.date) {
            latest = Some(r);
        }
    }

    for (i, t) in totals.iter_mut().enumerate() {
        t.days_with_data = days_seen[i].len() as u32;
    }
    agg.d3.totals      = totals[0];
    agg.d7.totals      = totals[1];
    agg.d14.totals     = totals[2];
    agg.d30.totals     = totals[3];
    agg.prev_3d.totals = totals[4];
    agg.prev_7d.totals = totals[5];
    agg.refresh_metrics(ctx.primary);

    let daily_cpa: Vec<f64> = daily_7d
        .values()
        .filter_map(|(spend, conv, _)| ratio(*spend, *conv))
        .collect();
    let daily_roas: Vec<f64> = daily_7d
        .values()
        .filter_map(|(spend, _, value)| ratio(*value, *spend))
        .collect();

    if let Some(l) = latest {
        let gap = (ctx.reference_date - l.date).num_days().max(0) as u32;
        agg.name = l.name.clone();
        agg.parent_id = l.parent_id.clone().or_else(|| {
            group.records.iter().find_map(|r| r.parent_id.clone())
        });
        agg.stability = Stability {
            days_active:          l.days_active,
            days_since_last_edit: l.days_since_last_edit.map(|d| d.saturating_add(gap)),
            last_seen:            Some(l.date),
            cpa_volatility:       coefficient_of_variation(&daily_cpa),
            roas_volatility:      coefficient_of_variation(&daily_roas),
        };
        if group.level == EntityLevel::Ad {
            agg.concept_key = l
                .concept_id
                .clone()
                .or_else(|| concept_key(&l.name));
        }
    }

    agg
}

// ── Phase 2: population pass ─────────────────────────────────────────────────

/// Cross-entity pass. Requires every entity's phase-1 aggregate.
pub fn finalize_population(aggs: &mut [RollingAggregate]) {
    let mut level_spend: HashMap<EntityLevel, f64> = HashMap::new();
    let mut level_active: HashMap<EntityLevel, usize> = HashMap::new();
    for a in aggs.iter() {
        *level_spend.entry(a.level).or_insert(0.0) += a.spend_7d();
        if a.is_active() {
            *level_active.entry(a.level).or_insert(0) += 1;
        }
    }

    // Ad ranking: spend desc, entity id asc for ties.
    let mut ad_rank: Vec<(f64, &str)> = aggs
        .iter()
        .filter(|a| a.level == EntityLevel::Ad)
        .map(|a| (a.spend_7d(), a.entity_id.as_str()))
        .collect();
    ad_rank.sort_by(|x, y| {
        y.0.partial_cmp(&x.0).unwrap_or(std::cmp::Ordering::Equal).then_with(|| x.1.cmp(y.1))
    });
    let total_ad_spend: f64 = ad_rank.iter().map(|(s, _)| s).sum();
    let top_n_spend: f64 = ad_rank.iter().take(TOP_N_CONCENTRATION).map(|(s, _)| s).sum();
    let top_n_share = ratio(top_n_spend, total_ad_spend);
    let rank_of: HashMap<String, usize> = ad_rank
        .iter()
        .enumerate()
        .map(|(i, (_, id))| (id.to_string(), i + 1))
        .collect();

    // Active child / sibling counts.
    let mut children: HashMap<(EntityLevel, String), usize> = HashMap::new();
    let mut siblings: HashMap<(EntityLevel, Option<String>), usize> = HashMap::new();
    for a in aggs.iter().filter(|a| a.is_active()) {
        if let Some(parent) = &a.parent_id {
            *children.entry((a.level, parent.clone())).or_insert(0) += 1;
        }
        *siblings.entry((a.level, a.parent_id.clone())).or_insert(0) += 1;
    }

    for a in aggs.iter_mut() {
        let level_total = level_spend.get(&a.level).copied().unwrap_or(0.0);
        a.concentration.level_spend_share = ratio(a.spend_7d(), level_total);
        a.concentration.active_population = level_active.get(&a.level).copied().unwrap_or(0);
        match a.level {
            EntityLevel::Ad => {
                a.concentration.top1_share = ratio(a.spend_7d(), total_ad_spend);
                a.concentration.top3_share = top_n_share;
                a.concentration.spend_rank = rank_of.get(&a.entity_id).copied();
            }
            EntityLevel::Account => {
                a.concentration.top3_share = top_n_share;
            }
            _ => {}
        }

        a.structure.active_children = a
            .level
            .child()
            .and_then(|child| children.get(&(child, a.entity_id.clone())).copied())
            .unwrap_or(0);
        a.structure.active_siblings = siblings
            .get(&(a.level, a.parent_id.clone()))
            .copied()
            .unwrap_or(0);
    }
}

/// Sequential convenience: both phases over a full record set.
pub fn aggregate_all(records: &[DailyRecord], ctx: &AggregationContext) -> Vec<RollingAggregate> {
    let mut aggs: Vec<RollingAggregate> = group_by_entity(records)
        .iter()
        .map(|g| build_aggregate(g, ctx))
        .collect();
    finalize_population(&mut aggs);
    aggs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ConversionCounts;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    fn rec(id: &str, level: EntityLevel, day: u32, spend: f64, purchases: f64) -> DailyRecord {
        DailyRecord {
            client_id: "c1".into(),
            date: date(day),
            entity_id: id.into(),
            level,
            name: id.into(),
            parent_id: None,
            concept_id: None,
            spend,
            impressions: 1000,
            reach: 500,
            clicks: 20,
            landing_page_views: 10,
            conversions: ConversionCounts { purchases, ..Default::default() },
            conversion_value: purchases * 80.0,
            video_views_3s: 300,
            thruplays: 60,
            engagements: 15,
            days_active: 20,
            days_since_last_edit: Some(4),
        }
    }

    fn ctx(day: u32) -> AggregationContext {
        AggregationContext { reference_date: date(day), primary: ConversionType::Purchase }
    }

    #[test]
    fn window_boundary_is_right_open() {
        // Reference 20th: the 14th is 6 days back (in 7d), the 13th is 7 back (out).
        let records = vec![
            rec("a", EntityLevel::Ad, 20, 10.0, 0.0),
            rec("a", EntityLevel::Ad, 14, 10.0, 0.0),
            rec("a", EntityLevel::Ad, 13, 10.0, 0.0),
        ];
        let aggs = aggregate_all(&records, &ctx(20));
        assert_eq!(aggs[0].d7.spend(), 20.0);
        assert_eq!(aggs[0].d14.spend(), 30.0);
        assert_eq!(aggs[0].prev_7d.spend(), 10.0);
    }

    #[test]
    fn huge_counters_saturate_instead_of_overflowing() {
        let mut big = rec("a", EntityLevel::Ad, 20, 1.0, 0.0);
        big.impressions = u64::MAX - 10;
        let mut totals = WindowTotals::default();
        totals.add_record(&big);
        totals.add_record(&big);
        assert_eq!(totals.impressions, u64::MAX);
        assert_eq!(totals.reach, 1000);

        let mut merged = totals;
        merged.merge(&totals);
        assert_eq!(merged.impressions, u64::MAX);
        assert_eq!(merged.clicks, 80);
        assert_eq!(merged.spend, 4.0);
    }

    #[test]
    fn future_records_are_ignored() {
        let records = vec![rec("a", EntityLevel::Ad, 21, 50.0, 1.0)];
        let aggs = aggregate_all(&records, &ctx(20));
        assert_eq!(aggs[0].d30.spend(), 0.0);
        assert!(!aggs[0].is_active());
    }

    #[test]
    fn cpa_is_undefined_without_conversions() {
        let aggs = aggregate_all(&[rec("a", EntityLevel::Ad, 20, 40.0, 0.0)], &ctx(20));
        assert_eq!(aggs[0].d7.cpa, None);
        assert!(aggs[0].d7.ctr.is_some());
        assert_eq!(aggs[0].d7.click_to_conversion, Some(0.0));
    }

    #[test]
    fn delta_is_zero_when_prior_is_zero() {
        assert_eq!(pct_delta(50.0, 0.0), 0.0);
        assert!((pct_delta(130.0, 100.0) - 30.0).abs() < 1e-9);
        assert_eq!(ratio_delta(Some(1.0), None), None);
    }

    #[test]
    fn edit_recency_advances_to_reference_date() {
        let aggs = aggregate_all(&[rec("a", EntityLevel::Ad, 18, 5.0, 0.0)], &ctx(20));
        assert_eq!(aggs[0].stability.days_since_last_edit, Some(6));
        assert_eq!(aggs[0].stability.last_seen, Some(date(18)));
    }

    #[test]
    fn concentration_ranks_ads_account_wide() {
        let records = vec![
            rec("a1", EntityLevel::Ad, 20, 60.0, 1.0),
            rec("a2", EntityLevel::Ad, 20, 20.0, 1.0),
            rec("a3", EntityLevel::Ad, 20, 10.0, 0.0),
            rec("a4", EntityLevel::Ad, 20, 10.0, 0.0),
        ];
        let aggs = aggregate_all(&records, &ctx(20));
        let a1 = aggs.iter().find(|a| a.entity_id == "a1").unwrap();
        assert_eq!(a1.concentration.top1_share, Some(0.6));
        assert_eq!(a1.concentration.spend_rank, Some(1));
        assert_eq!(a1.concentration.top3_share, Some(0.9));
    }

    #[test]
    fn active_children_counted_per_parent() {
        let mut g1 = rec("g1", EntityLevel::AdGroup, 20, 5.0, 0.0);
        g1.parent_id = Some("camp".into());
        let mut g2 = rec("g2", EntityLevel::AdGroup, 20, 5.0, 0.0);
        g2.parent_id = Some("camp".into());
        let mut g3 = rec("g3", EntityLevel::AdGroup, 1, 5.0, 0.0);
        g3.parent_id = Some("camp".into());
        let camp = rec("camp", EntityLevel::Campaign, 20, 10.0, 0.0);
        let aggs = aggregate_all(&[g1, g2, g3, camp], &ctx(20));
        let c = aggs.iter().find(|a| a.entity_id == "camp").unwrap();
        assert_eq!(c.structure.active_children, 2, "inactive ad group must not count");
        let g = aggs.iter().find(|a| a.entity_id == "g1").unwrap();
        assert_eq!(g.structure.active_siblings, 2);
    }

    #[test]
    fn volatility_needs_two_converting_days() {
        let records = vec![
            rec("a", EntityLevel::Ad, 20, 10.0, 1.0),
            rec("a", EntityLevel::Ad, 19, 30.0, 1.0),
        ];
        let aggs = aggregate_all(&records, &ctx(20));
        let cv = aggs[0].stability.cpa_volatility.unwrap();
        assert!((cv - 0.5).abs() < 1e-9, "cv of [10, 30] is 0.5, got {cv}");

        let single = aggregate_all(&[rec("b", EntityLevel::Ad, 20, 10.0, 1.0)], &ctx(20));
        assert_eq!(single[0].stability.cpa_volatility, None);
    }
}
