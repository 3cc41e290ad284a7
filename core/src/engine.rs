//! The computation engine: one client, one reference date, one pass.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Validate     drop malformed and out-of-window records
//!   2. Aggregate    per entity, parallel
//!   3. Population   concentration + structure pass   ← barrier: needs all of 2
//!   4. Concepts     pool ad totals by concept key
//!   5. Benchmark    percentile bands per level         ← barrier: needs all of 3
//!   6. Classify     per active entity, parallel, creative category for ads
//!   7. Alerts       fixed rule battery over 6
//!   8. Bundles      main + ads payloads with size metadata
//!
//! RULES:
//!   - Every run recomputes from scratch. No state survives between calls.
//!   - Workers only read shared inputs (config, profile, bands, concepts).
//!   - The deadline is checked between phases and before every entity;
//!     expiry aborts the whole run. There is no partial result.
//!   - `computed_at` comes from the caller, so identical inputs give
//!     byte-identical output.

use crate::{
    aggregator::{build_aggregate, finalize_population, group_by_entity, AggregationContext, RollingAggregate},
    alert_rules::AlertEngine,
    benchmark::{BenchmarkSet, Percentiles},
    bundle::{AdsBundle, BundleMeta, MainBundle},
    classifier::{classify, Classification, ClassifierInput},
    concept::build_concepts,
    config::{ClientProfile, EngineConfig},
    creative,
    error::{EngineError, EngineResult},
    parallel::{check_deadline, ordered_map, worker_count},
    record::{ingest, DailyRecord, RawDailyRecord, RETENTION_DAYS},
    types::EntityLevel,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Instant};

/// Parse a caller-supplied `YYYY-MM-DD` reference date.
pub fn parse_reference_date(value: &str) -> EngineResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| EngineError::InvalidReferenceDate { value: value.to_string() })
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Stamped on every alert and bundle.
    pub computed_at: DateTime<Utc>,
    pub deadline:    Option<Instant>,
    /// Worker threads; `None` means one per available core.
    pub workers:     Option<usize>,
}

impl RunOptions {
    pub fn at(computed_at: DateTime<Utc>) -> Self {
        Self { computed_at, deadline: None, workers: None }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::at(Utc::now())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub records_seen:          usize,
    pub records_rejected:      usize,
    pub records_out_of_window: usize,
    pub entities:              usize,
    pub active_entities:       usize,
    pub concepts:              usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputationOutput {
    pub main:      MainBundle,
    pub ads:       AdsBundle,
    pub main_meta: BundleMeta,
    pub ads_meta:  BundleMeta,
    pub stats:     RunStats,
}

impl ComputationOutput {
    pub fn classifications(&self) -> &[Classification] {
        &self.main.classifications
    }

    pub fn alerts(&self) -> &[crate::alert_rules::Alert] {
        &self.main.alerts
    }
}

pub struct PulseEngine {
    pub profile: ClientProfile,
    pub config:  EngineConfig,
    alerts:      AlertEngine,
}

impl PulseEngine {
    pub fn new(profile: ClientProfile, config: EngineConfig) -> Self {
        Self { profile, config, alerts: AlertEngine::default() }
    }

    /// Swap the alert battery (tests and custom deployments).
    pub fn with_alert_engine(mut self, alerts: AlertEngine) -> Self {
        self.alerts = alerts;
        self
    }

    /// Convert raw collaborator rows first, then compute. Rejected rows are
    /// logged and counted.
    pub fn compute_raw(
        &self,
        raw: Vec<RawDailyRecord>,
        reference_date: NaiveDate,
        options: &RunOptions,
    ) -> EngineResult<ComputationOutput> {
        let seen = raw.len();
        let report = ingest(raw);
        let mut output = self.compute(&report.accepted, reference_date, options)?;
        output.stats.records_seen = seen;
        output.stats.records_rejected += report.rejected.len();
        Ok(output)
    }

    pub fn compute(
        &self,
        records: &[DailyRecord],
        reference_date: NaiveDate,
        options: &RunOptions,
    ) -> EngineResult<ComputationOutput> {
        let started = Instant::now();
        let deadline = options.deadline;
        let workers = worker_count(options.workers);
        let client_id = self.profile.client_id.as_str();
        let primary = self.profile.primary_conversion;
        let target_cpa = self.profile.target_cpa();
        let mut stats = RunStats { records_seen: records.len(), ..Default::default() };

        log::info!(
            "client={client_id} date={reference_date}: computing over {} records with {workers} workers",
            records.len()
        );

        // 1. Validate
        check_deadline(deadline, "validate")?;
        let mut kept: Vec<DailyRecord> = Vec::with_capacity(records.len());
        for r in records {
            if !r.client_id.is_empty() && r.client_id != client_id {
                log::warn!("skipping record for {}: belongs to client {}", r.entity_id, r.client_id);
                stats.records_rejected += 1;
                continue;
            }
            if let Err(e) = r.validate() {
                log::warn!("skipping record: {e}");
                stats.records_rejected += 1;
                continue;
            }
            let back = r.days_back(reference_date);
            if !(0..RETENTION_DAYS).contains(&back) {
                stats.records_out_of_window += 1;
                continue;
            }
            kept.push(r.clone());
        }

        // 2. Aggregate
        let ctx = AggregationContext { reference_date, primary };
        let groups = group_by_entity(&kept);
        let mut aggs = ordered_map(&groups, workers, deadline, "aggregate", |g| build_aggregate(g, &ctx))?;
        log::debug!("client={client_id}: aggregated {} entities in {:?}", aggs.len(), started.elapsed());

        // 3. Population
        check_deadline(deadline, "population")?;
        finalize_population(&mut aggs);

        // 4. Concepts
        let concepts = build_concepts(&aggs, primary);

        // 5. Benchmark
        check_deadline(deadline, "benchmark")?;
        let benchmarks = BenchmarkSet::compute(&aggs, target_cpa);
        let bands: BTreeMap<EntityLevel, Percentiles> = EntityLevel::ALL
            .iter()
            .map(|level| (*level, benchmarks.for_level(*level, target_cpa)))
            .collect();

        // 6. Classify
        let active: Vec<(&RollingAggregate, &Percentiles)> = aggs
            .iter()
            .filter(|a| a.is_active())
            .filter_map(|a| bands.get(&a.level).map(|p| (a, p)))
            .collect();
        let classifications = ordered_map(&active, workers, deadline, "classify", |(agg, percentiles)| {
            let input = ClassifierInput {
                aggregate: agg,
                percentiles,
                concept: agg.concept_key.as_deref().and_then(|k| concepts.get(k)),
                config: &self.config,
                profile: &self.profile,
            };
            let mut c = classify(&input);
            creative::annotate(&mut c, agg, percentiles, &self.profile);
            c
        })?;

        // 7. Alerts
        check_deadline(deadline, "alerts")?;
        let pairs: Vec<(&RollingAggregate, &Classification)> =
            active.iter().map(|(a, _)| *a).zip(classifications.iter()).collect();
        let alerts = self.alerts.evaluate(&pairs, &self.profile, &self.config, reference_date, options.computed_at);

        // 8. Bundles
        stats.entities = aggs.len();
        stats.active_entities = active.len();
        stats.concepts = concepts.len();

        let (ad_aggs, other_aggs): (Vec<RollingAggregate>, Vec<RollingAggregate>) =
            aggs.into_iter().partition(|a| a.level == EntityLevel::Ad);
        let ad_classifications: Vec<Classification> = classifications
            .iter()
            .filter(|c| c.level == EntityLevel::Ad)
            .cloned()
            .collect();

        let main = MainBundle {
            client_id: client_id.to_string(),
            reference_date,
            computed_at: options.computed_at,
            entities: other_aggs,
            concepts: concepts.into_values().collect(),
            classifications,
            alerts,
        };
        let ads = AdsBundle {
            client_id: client_id.to_string(),
            reference_date,
            computed_at: options.computed_at,
            ads: ad_aggs,
            classifications: ad_classifications,
        };
        let main_meta = main.meta()?;
        let ads_meta = ads.meta()?;

        log::info!(
            "client={client_id} date={reference_date}: {} entities ({} active), {} alerts, {} rejected, {} out of window in {:?}",
            stats.entities,
            stats.active_entities,
            main.alerts.len(),
            stats.records_rejected,
            stats.records_out_of_window,
            started.elapsed()
        );

        Ok(ComputationOutput { main, ads, main_meta, ads_meta, stats })
    }
}
