//! Deterministic synthetic account generation.
//!
//! Builds an account → campaign → ad-group → ad hierarchy and one daily
//! record per live entity per day. Ad names follow the concept-token
//! convention (`[C03] Testimonial | v2`) so concept grouping has something
//! to find. Parent-level records are roll-ups of their ads.
//!
//! RULE: same seed and spec ⇒ identical records.

use crate::{
    config::ClientProfile,
    record::{ConversionCounts, DailyRecord},
    rng::{RngBank, RngStream, SeededRng},
    types::{ClientId, ConversionType, EntityLevel},
};
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub client_id:             ClientId,
    pub reference_date:        NaiveDate,
    /// Days of history ending at the reference date.
    pub days:                  u32,
    pub campaigns:             usize,
    pub adgroups_per_campaign: usize,
    pub ads_per_adgroup:       usize,
    pub concepts:              usize,
    pub target_cpa:            f64,
}

impl SyntheticSpec {
    pub fn new(client_id: impl Into<ClientId>, reference_date: NaiveDate) -> Self {
        Self {
            client_id: client_id.into(),
            reference_date,
            days: 30,
            campaigns: 3,
            adgroups_per_campaign: 3,
            ads_per_adgroup: 4,
            concepts: 6,
            target_cpa: 40.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticClient {
    pub profile: ClientProfile,
    pub records: Vec<DailyRecord>,
}

/// Per-ad behaviour drawn once up front.
struct AdPlan {
    id:          String,
    name:        String,
    parent_id:   String,
    concept_id:  String,
    start_back:  u32,
    edit_back:   Option<u32>,
    daily_spend: f64,
    cpm:         f64,
    ctr:         f64,
    cvr:         f64,
    hook_rate:   f64,
    order_value: f64,
    fatigued:    bool,
}

pub fn generate_client(seed: u64, spec: &SyntheticSpec) -> SyntheticClient {
    let bank = RngBank::new(seed);
    let mut hierarchy = bank.stream(RngStream::Hierarchy);
    let mut perf = bank.stream(RngStream::Performance);
    let mut edits = bank.stream(RngStream::Edits);

    let account_id = format!("{}-act", spec.client_id);
    let mut parents: Vec<(EntityLevel, String, String, Option<String>)> =
        vec![(EntityLevel::Account, account_id.clone(), format!("{} account", spec.client_id), None)];
    let mut ads = Vec::new();
    let max_back = spec.days.saturating_sub(1);

    for c in 0..spec.campaigns {
        let campaign_id = format!("{}-cmp{:02}", spec.client_id, c + 1);
        let objective = hierarchy.pick(campaign_objectives()).copied().unwrap_or("Prospecting");
        parents.push((
            EntityLevel::Campaign,
            campaign_id.clone(),
            format!("{objective} {:02}", c + 1),
            Some(account_id.clone()),
        ));

        for g in 0..spec.adgroups_per_campaign {
            let adgroup_id = format!("{campaign_id}-ag{:02}", g + 1);
            let audience = hierarchy.pick(audiences()).copied().unwrap_or("Broad");
            parents.push((
                EntityLevel::AdGroup,
                adgroup_id.clone(),
                format!("{audience} | {objective}"),
                Some(campaign_id.clone()),
            ));

            for a in 0..spec.ads_per_adgroup {
                let concept = hierarchy.next_u64_below(spec.concepts.max(1) as u64) as usize;
                let theme = concept_themes()[concept % concept_themes().len()];
                let concept_id = format!("C{:02}", concept + 1);
                let start_back = if hierarchy.chance(0.2) {
                    hierarchy.next_u64_below(6) as u32
                } else {
                    max_back.saturating_sub(hierarchy.next_u64_below(5) as u32)
                };
                ads.push(AdPlan {
                    id: format!("{adgroup_id}-ad{:02}", a + 1),
                    name: format!("[{concept_id}] {theme} | v{}", a + 1),
                    parent_id: adgroup_id.clone(),
                    concept_id,
                    start_back: start_back.min(max_back),
                    edit_back: edits.chance(0.3).then(|| edits.next_u64_below(10) as u32),
                    daily_spend: perf.pareto(15.0, 1.6).min(400.0),
                    cpm: perf.range(7.0, 15.0),
                    ctr: perf.range(0.004, 0.03),
                    cvr: perf.range(0.01, 0.12),
                    hook_rate: perf.range(0.15, 0.45),
                    order_value: perf.range(50.0, 140.0),
                    fatigued: perf.chance(0.15),
                });
            }
        }
    }

    let mut records = Vec::new();
    for plan in &ads {
        for back in 0..=plan.start_back {
            records.push(ad_day(spec, plan, back, &mut perf));
        }
    }
    records.extend(roll_up(spec, &parents, &records));
    records.sort_by(|a, b| (a.date, a.level, &a.entity_id).cmp(&(b.date, b.level, &b.entity_id)));

    log::debug!(
        "synthetic seed={seed} client={}: {} ads, {} records",
        spec.client_id,
        ads.len(),
        records.len()
    );

    let profile = ClientProfile {
        name: format!("Synthetic {}", spec.client_id),
        target_cpa: Some(spec.target_cpa),
        primary_conversion: ConversionType::Purchase,
        ..ClientProfile::new(spec.client_id.clone())
    };
    SyntheticClient { profile, records }
}

fn whole(rng: &mut SeededRng, expected: f64) -> f64 {
    let base = expected.max(0.0).floor();
    base + if rng.chance(expected - base) { 1.0 } else { 0.0 }
}

fn ad_day(spec: &SyntheticSpec, plan: &AdPlan, back: u32, rng: &mut SeededRng) -> DailyRecord {
    let tiring = plan.fatigued && back < 7;
    let (ctr, cvr, hook, exposure) = if tiring {
        (plan.ctr * 0.7, plan.cvr * 0.6, plan.hook_rate * 0.7, rng.range(4.5, 5.5))
    } else {
        (plan.ctr, plan.cvr, plan.hook_rate, rng.range(1.1, 1.6))
    };

    let spend = plan.daily_spend * rng.range(0.85, 1.15);
    let impressions = (spend / plan.cpm * 1000.0).round();
    let clicks = (impressions * ctr).round();
    let landing_page_views = (clicks * 0.8).round();
    let purchases = whole(rng, landing_page_views * cvr);
    let video_views_3s = (impressions * hook).round();

    let days_since_last_edit = match plan.edit_back {
        Some(e) if back <= e && e <= plan.start_back => e - back,
        _ => plan.start_back - back,
    };

    DailyRecord {
        client_id: spec.client_id.clone(),
        date: spec.reference_date - Duration::days(back as i64),
        entity_id: plan.id.clone(),
        level: EntityLevel::Ad,
        name: plan.name.clone(),
        parent_id: Some(plan.parent_id.clone()),
        concept_id: Some(plan.concept_id.clone()),
        spend: (spend * 100.0).round() / 100.0,
        impressions: impressions as u64,
        reach: (impressions / exposure).round() as u64,
        clicks: clicks as u64,
        landing_page_views: landing_page_views as u64,
        conversions: ConversionCounts { purchases, ..Default::default() },
        conversion_value: (purchases * plan.order_value * 100.0).round() / 100.0,
        video_views_3s: video_views_3s as u64,
        thruplays: (video_views_3s * rng.range(0.2, 0.4)).round() as u64,
        engagements: (clicks * 1.5).round() as u64,
        days_active: plan.start_back - back + 1,
        days_since_last_edit: Some(days_since_last_edit),
    }
}

/// Sum child records into one record per parent per day.
fn roll_up(
    spec: &SyntheticSpec,
    parents: &[(EntityLevel, String, String, Option<String>)],
    ad_records: &[DailyRecord],
) -> Vec<DailyRecord> {
    let mut out: Vec<DailyRecord> = Vec::new();
    let mut children: Vec<DailyRecord> = ad_records.to_vec();

    // Deepest level first so each level rolls up the one below it.
    for level in [EntityLevel::AdGroup, EntityLevel::Campaign, EntityLevel::Account] {
        let mut by_parent: BTreeMap<(String, NaiveDate), DailyRecord> = BTreeMap::new();
        for (_, id, name, parent_id) in parents.iter().filter(|p| p.0 == level) {
            for child in children.iter().filter(|c| c.parent_id.as_deref() == Some(id.as_str())) {
                let entry = by_parent.entry((id.clone(), child.date)).or_insert_with(|| DailyRecord {
                    client_id: spec.client_id.clone(),
                    date: child.date,
                    entity_id: id.clone(),
                    level,
                    name: name.clone(),
                    parent_id: parent_id.clone(),
                    concept_id: None,
                    spend: 0.0,
                    impressions: 0,
                    reach: 0,
                    clicks: 0,
                    landing_page_views: 0,
                    conversions: ConversionCounts::default(),
                    conversion_value: 0.0,
                    video_views_3s: 0,
                    thruplays: 0,
                    engagements: 0,
                    days_active: 0,
                    days_since_last_edit: None,
                });
                entry.spend = ((entry.spend + child.spend) * 100.0).round() / 100.0;
                entry.impressions += child.impressions;
                entry.reach += child.reach;
                entry.clicks += child.clicks;
                entry.landing_page_views += child.landing_page_views;
                entry.conversions.add(&child.conversions);
                entry.conversion_value += child.conversion_value;
                entry.video_views_3s += child.video_views_3s;
                entry.thruplays += child.thruplays;
                entry.engagements += child.engagements;
                entry.days_active = entry.days_active.max(child.days_active);
                entry.days_since_last_edit = match (entry.days_since_last_edit, child.days_since_last_edit) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
            }
        }
        children = by_parent.into_values().collect();
        out.extend(children.iter().cloned());
    }
    out
}

// ── Curated name lists ───────────────────────────────────────────────────────

fn concept_themes() -> &'static [&'static str] {
    &[
        "Testimonial", "Founder Story", "Unboxing", "Before After", "Price Drop",
        "How It Works", "Social Proof", "Limited Drop", "Problem Solution", "UGC Haul",
        "Comparison", "Behind The Scenes",
    ]
}

fn campaign_objectives() -> &'static [&'static str] {
    &["Prospecting", "Retargeting", "Catalog Sales", "Lead Gen", "Seasonal Push"]
}

fn audiences() -> &'static [&'static str] {
    &[
        "Broad", "Lookalike 1%", "Lookalike 3%", "Interest Stack", "Website Visitors",
        "Cart Abandoners", "Engaged 30d", "Past Buyers",
    ]
}
