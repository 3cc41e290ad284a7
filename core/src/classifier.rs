//! Decision classifier: one pure call per active entity.
//!
//! Five independent dimensions are decided separately (learning phase,
//! intent stage, fatigue, structure) and then resolved into one action.
//!
//! DECISION PRECEDENCE (fixed, first match wins):
//!   1. fatigue REAL or CONCEPT_DECAY                          → ROTATE_CONCEPT
//!   2. structure FRAGMENTED or OVERCONCENTRATED               → CONSOLIDATE
//!   3. stage BOFU, strong efficiency, fatigue NONE/HEALTHY    → SCALE
//!   4. stage TOFU/MOFU, adequate spend, zero conversions      → KILL_RETRY
//!   5. stage BOFU, fewer than 3 live variants                 → INTRODUCE_BOFU_VARIANTS
//!   6. otherwise                                              → HOLD
//!
//! RULE: output depends only on `ClassifierInput`. No clocks, no RNG,
//! no shared state.

use crate::{
    aggregator::RollingAggregate,
    benchmark::{Band, Percentiles},
    concept::ConceptAggregate,
    config::{ClientProfile, EngineConfig},
    creative::CreativeCategory,
    types::{ClientId, EntityId, EntityLevel},
};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Constants ────────────────────────────────────────────────────────────────

/// An edit this recent counts as a fresh structural change.
pub const RECENT_EDIT_DAYS: u32 = 3;
const EXPLORATION_MIN_DAYS: u32 = 7;
const EXPLORATION_MIN_CONVERSIONS_14D: f64 = 5.0;
const STABILIZING_MIN_DAYS: u32 = 14;
const STABILIZING_EDIT_DAYS: u32 = 7;

const INTENT_WEIGHT_CLICK_TO_CONVERSION: f64 = 0.30;
const INTENT_WEIGHT_CONVERSION_RATE: f64 = 0.25;
const INTENT_WEIGHT_EFFICIENCY: f64 = 0.25;
const INTENT_WEIGHT_CTR: f64 = 0.20;
pub const TOFU_MAX_SCORE: f64 = 0.35;
pub const MOFU_MAX_SCORE: f64 = 0.65;

/// Hook-rate drop (percent, 7d vs 14d) that counts as falling.
pub const HOOK_RATE_DECLINE_PCT: f64 = 5.0;

/// Normalised efficiency that counts as strong when no target is set.
const STRONG_EFFICIENCY: f64 = 0.75;
/// Spend without a target CPA that is enough to judge a zero-conversion entity.
const KILL_MIN_SPEND: f64 = 50.0;
const KILL_SPEND_TARGET_MULTIPLE: f64 = 1.5;
pub const MIN_BOFU_VARIANTS: usize = 3;
/// A lone active ad always holds 100% of spend, so it is never overconcentrated.
const MIN_ADS_FOR_CONCENTRATION: usize = 2;

// ── States ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LearningPhase {
    Exploration,
    Stabilizing,
    Exploitation,
    Unstable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStage {
    Tofu,
    Mofu,
    Bofu,
}

impl IntentStage {
    pub fn from_score(score: f64) -> Self {
        if score < TOFU_MAX_SCORE {
            Self::Tofu
        } else if score <= MOFU_MAX_SCORE {
            Self::Mofu
        } else {
            Self::Bofu
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FatigueState {
    None,
    HealthyRepetition,
    AudienceSaturation,
    ConceptDecay,
    Real,
}

impl FatigueState {
    /// States that do not block scaling.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::None | Self::HealthyRepetition)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StructuralState {
    Normal,
    Fragmented,
    Overconcentrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Scale,
    RotateConcept,
    Consolidate,
    IntroduceBofuVariants,
    KillRetry,
    Hold,
}

impl Decision {
    /// Weight of the triggering condition in the impact score.
    fn severity_weight(&self) -> f64 {
        match self {
            Self::RotateConcept         => 1.0,
            Self::KillRetry             => 0.9,
            Self::Consolidate           => 0.7,
            Self::Scale                 => 0.6,
            Self::IntroduceBofuVariants => 0.4,
            Self::Hold                  => 0.1,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scale                 => "SCALE",
            Self::RotateConcept         => "ROTATE_CONCEPT",
            Self::Consolidate           => "CONSOLIDATE",
            Self::IntroduceBofuVariants => "INTRODUCE_BOFU_VARIANTS",
            Self::KillRetry             => "KILL_RETRY",
            Self::Hold                  => "HOLD",
        };
        f.write_str(s)
    }
}

// ── Input / output ───────────────────────────────────────────────────────────

/// Everything one classification may look at.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    pub aggregate:   &'a RollingAggregate,
    pub percentiles: &'a Percentiles,
    pub concept:     Option<&'a ConceptAggregate>,
    pub config:      &'a EngineConfig,
    pub profile:     &'a ClientProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub client_id:          ClientId,
    pub entity_id:          EntityId,
    pub level:              EntityLevel,
    pub entity_name:        String,
    pub learning_phase:     LearningPhase,
    pub intent_stage:       IntentStage,
    pub intent_score:       f64,
    pub fatigue:            FatigueState,
    pub structural:         StructuralState,
    pub decision:           Decision,
    /// [0, 1]; rises with data volume.
    pub confidence:         f64,
    /// [0, 100]; rises with spend share and deviation.
    pub impact_score:       f64,
    pub evidence:           Vec<String>,
    pub creative_category:  Option<CreativeCategory>,
    pub creative_reasoning: Option<String>,
}

fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    match v {
        Some(x) => format!("{x:.decimals$}"),
        None => "n/a".to_string(),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ── Signal helpers ───────────────────────────────────────────────────────────

/// CPA is rising when the 7d-vs-14d delta reaches the configured multiplier.
pub fn cpa_rising(delta_pct: Option<f64>, multiplier: f64) -> bool {
    delta_pct.is_some_and(|d| d > 0.0 && d >= (multiplier - 1.0) * 100.0)
}

pub fn hook_rate_falling(delta_pct: Option<f64>) -> bool {
    delta_pct.is_some_and(|d| d <= -HOOK_RATE_DECLINE_PCT)
}

fn edited_within(agg: &RollingAggregate, days: u32) -> bool {
    agg.stability.days_since_last_edit.is_some_and(|d| d <= days)
}

// ── Dimension 1: learning phase ──────────────────────────────────────────────

pub fn learning_phase(agg: &RollingAggregate, config: &EngineConfig) -> (LearningPhase, String) {
    let s = &agg.stability;
    let volatile = s.volatility().is_some_and(|v| v > config.volatility_ratio);

    if edited_within(agg, RECENT_EDIT_DAYS) && volatile {
        return (
            LearningPhase::Unstable,
            format!(
                "edited {} days ago with CPA/ROAS variation {} above tolerance {:.2}",
                s.days_since_last_edit.unwrap_or(0),
                fmt_opt(s.volatility(), 2),
                config.volatility_ratio
            ),
        );
    }
    if s.days_active < EXPLORATION_MIN_DAYS || agg.d14.primary_conversions < EXPLORATION_MIN_CONVERSIONS_14D {
        return (
            LearningPhase::Exploration,
            format!(
                "{} days active, {:.0} conversions in 14 days",
                s.days_active, agg.d14.primary_conversions
            ),
        );
    }
    if s.days_active < STABILIZING_MIN_DAYS || edited_within(agg, STABILIZING_EDIT_DAYS) || volatile {
        return (
            LearningPhase::Stabilizing,
            format!("{} days active, settling after recent changes", s.days_active),
        );
    }
    (
        LearningPhase::Exploitation,
        format!("{} days active with stable delivery", s.days_active),
    )
}

// ── Dimension 2: intent ──────────────────────────────────────────────────────

/// Weighted blend of normalised funnel signals. Undefined signals are left
/// out and the remaining weights re-normalised; no signal at all scores 0.
pub fn intent_score(agg: &RollingAggregate, p: &Percentiles) -> f64 {
    let efficiency = agg.d7.cpa.filter(|c| *c > 0.0).map(|c| 1.0 / c);
    let parts: [(Option<f64>, f64, Option<Band>); 4] = [
        (agg.d7.click_to_conversion, INTENT_WEIGHT_CLICK_TO_CONVERSION, Some(p.click_to_conversion)),
        (agg.d7.conversion_rate, INTENT_WEIGHT_CONVERSION_RATE, Some(p.conversion_rate)),
        (efficiency, INTENT_WEIGHT_EFFICIENCY, p.efficiency),
        (agg.d7.ctr, INTENT_WEIGHT_CTR, Some(p.ctr)),
    ];

    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    for (value, weight, band) in parts {
        if let (Some(v), Some(b)) = (value, band) {
            weighted += b.normalize(v) * weight;
            weight_sum += weight;
        }
    }
    if weight_sum == 0.0 {
        return 0.0;
    }
    (weighted / weight_sum).clamp(0.0, 1.0)
}

pub fn intent_stage(agg: &RollingAggregate, p: &Percentiles) -> (IntentStage, f64, String) {
    let score = intent_score(agg, p);
    let stage = IntentStage::from_score(score);
    (
        stage,
        score,
        format!(
            "intent {score:.2} (click→conv {}, CVR {}, CTR {})",
            fmt_opt(agg.d7.click_to_conversion, 3),
            fmt_opt(agg.d7.conversion_rate, 3),
            fmt_opt(agg.d7.ctr, 4)
        ),
    )
}

// ── Dimension 3: fatigue ─────────────────────────────────────────────────────

pub fn fatigue_state(
    agg: &RollingAggregate,
    concept: Option<&ConceptAggregate>,
    config: &EngineConfig,
) -> (FatigueState, Option<String>) {
    let high_frequency = agg.d7.frequency.is_some_and(|f| f > config.fatigue_frequency);
    let rising = cpa_rising(agg.deltas.cpa_7d_vs_14d, config.fatigue_cpa_multiplier);
    let falling = hook_rate_falling(agg.deltas.hook_rate_7d_vs_14d);
    let signals = format!(
        "frequency {} (ceiling {:.1}), CPA {}% vs 14d, hook rate {}% vs 14d",
        fmt_opt(agg.d7.frequency, 2),
        config.fatigue_frequency,
        fmt_opt(agg.deltas.cpa_7d_vs_14d, 1),
        fmt_opt(agg.deltas.hook_rate_7d_vs_14d, 1),
    );

    if high_frequency && rising && falling {
        return (FatigueState::Real, Some(format!("real fatigue: {signals}")));
    }

    if agg.level == EntityLevel::Ad {
        if let Some(c) = concept {
            if cpa_rising(c.cpa_7d_vs_14d, config.fatigue_cpa_multiplier)
                && hook_rate_falling(c.hook_rate_7d_vs_14d)
            {
                return (
                    FatigueState::ConceptDecay,
                    Some(format!(
                        "concept {} decaying across {} ads: CPA {}%, hook rate {}%",
                        c.concept_key,
                        c.ad_ids.len(),
                        fmt_opt(c.cpa_7d_vs_14d, 1),
                        fmt_opt(c.hook_rate_7d_vs_14d, 1),
                    )),
                );
            }
        }
    }

    if high_frequency && (rising || falling) {
        return (FatigueState::AudienceSaturation, Some(format!("saturating: {signals}")));
    }
    if high_frequency {
        return (
            FatigueState::HealthyRepetition,
            Some(format!("high frequency without degradation: {signals}")),
        );
    }
    (FatigueState::None, None)
}

// ── Dimension 4: structure ───────────────────────────────────────────────────

pub fn structural_state(agg: &RollingAggregate, config: &EngineConfig) -> (StructuralState, Option<String>) {
    match agg.level {
        EntityLevel::Ad => {
            let share = agg.concentration.top1_share.unwrap_or(0.0);
            if agg.concentration.active_population >= MIN_ADS_FOR_CONCENTRATION
                && share > config.overconcentration_ratio
            {
                return (
                    StructuralState::Overconcentrated,
                    Some(format!(
                        "{:.0}% of account ad spend in one ad (limit {:.0}%)",
                        share * 100.0,
                        config.overconcentration_ratio * 100.0
                    )),
                );
            }
        }
        EntityLevel::Campaign if agg.structure.active_children > config.max_adsets_per_campaign => {
            return (
                StructuralState::Fragmented,
                Some(format!(
                    "{} active ad groups (limit {})",
                    agg.structure.active_children, config.max_adsets_per_campaign
                )),
            );
        }
        EntityLevel::AdGroup if agg.structure.active_siblings > config.max_adsets_per_campaign => {
            return (
                StructuralState::Fragmented,
                Some(format!(
                    "parent campaign runs {} active ad groups (limit {})",
                    agg.structure.active_siblings, config.max_adsets_per_campaign
                )),
            );
        }
        _ => {}
    }
    (StructuralState::Normal, None)
}

// ── Dimension 5: decision ────────────────────────────────────────────────────

/// CPA at/under target, ROAS at/over target, or (with no targets) top-quartile
/// normalised efficiency. Undefined metrics never count as strong.
pub fn efficiency_strong(agg: &RollingAggregate, p: &Percentiles, profile: &ClientProfile) -> bool {
    let target_cpa = profile.target_cpa();
    let target_roas = profile.target_roas();
    if target_cpa.is_none() && target_roas.is_none() {
        return match (agg.d7.cpa.filter(|c| *c > 0.0), p.efficiency) {
            (Some(cpa), Some(band)) => band.normalize(1.0 / cpa) >= STRONG_EFFICIENCY,
            _ => false,
        };
    }
    let cpa_ok = matches!((agg.d7.cpa, target_cpa), (Some(c), Some(t)) if c <= t);
    let roas_ok = matches!((agg.d7.roas, target_roas), (Some(r), Some(t)) if r >= t);
    cpa_ok || roas_ok
}

/// Number of live variants an entity can rotate between.
pub fn variant_count(agg: &RollingAggregate) -> usize {
    match agg.level {
        EntityLevel::Ad => agg.structure.active_siblings,
        _ => agg.structure.active_children,
    }
}

fn kill_spend_floor(profile: &ClientProfile) -> f64 {
    profile
        .target_cpa()
        .map(|t| t * KILL_SPEND_TARGET_MULTIPLE)
        .unwrap_or(KILL_MIN_SPEND)
}

pub fn decide(
    input: &ClassifierInput<'_>,
    stage: IntentStage,
    fatigue: FatigueState,
    structural: StructuralState,
) -> (Decision, String) {
    let agg = input.aggregate;

    if matches!(fatigue, FatigueState::Real | FatigueState::ConceptDecay) {
        return (Decision::RotateConcept, "fatigue requires a new concept".into());
    }
    if structural != StructuralState::Normal {
        return (Decision::Consolidate, "structure splits or concentrates delivery".into());
    }
    if stage == IntentStage::Bofu
        && fatigue.is_benign()
        && efficiency_strong(agg, input.percentiles, input.profile)
    {
        return (
            Decision::Scale,
            format!("bottom-funnel efficiency with CPA {}", fmt_opt(agg.d7.cpa, 2)),
        );
    }
    if matches!(stage, IntentStage::Tofu | IntentStage::Mofu)
        && agg.spend_7d() >= kill_spend_floor(input.profile)
        && agg.d7.primary_conversions == 0.0
    {
        return (
            Decision::KillRetry,
            format!("{:.2} spent in 7 days without a conversion", agg.spend_7d()),
        );
    }
    if stage == IntentStage::Bofu && variant_count(agg) < MIN_BOFU_VARIANTS {
        return (
            Decision::IntroduceBofuVariants,
            format!("only {} live variants behind bottom-funnel intent", variant_count(agg)),
        );
    }
    (Decision::Hold, "no action threshold met".into())
}

// ── Scores ───────────────────────────────────────────────────────────────────

/// Monotone in days active, 14-day conversions and 7-day impressions.
pub fn confidence_score(agg: &RollingAggregate) -> f64 {
    let days = (agg.stability.days_active as f64 / 14.0).min(1.0);
    let conversions = (agg.d14.primary_conversions / 30.0).min(1.0);
    let impressions = (agg.d7.totals.impressions as f64 / 10_000.0).min(1.0);
    round2((0.40 * days + 0.35 * conversions + 0.25 * impressions).clamp(0.0, 1.0))
}

/// Monotone in spend share and in the size of the CPA deviation.
pub fn impact_score(agg: &RollingAggregate, decision: Decision) -> f64 {
    let share = agg.concentration.level_spend_share.unwrap_or(0.0).clamp(0.0, 1.0);
    let deviation = agg
        .deltas
        .cpa_7d_vs_14d
        .map(|d| (d.abs() / 100.0).min(1.0))
        .unwrap_or(0.0);
    let raw = 0.5 * share + 0.3 * decision.severity_weight() + 0.2 * deviation;
    round2((raw * 100.0).clamp(0.0, 100.0))
}

// ── Entry point ──────────────────────────────────────────────────────────────

pub fn classify(input: &ClassifierInput<'_>) -> Classification {
    let agg = input.aggregate;
    let mut evidence = Vec::new();

    let (learning_phase, learning_note) = learning_phase(agg, input.config);
    evidence.push(learning_note);

    let (intent_stage, intent_score, intent_note) = intent_stage(agg, input.percentiles);
    evidence.push(intent_note);

    let (fatigue, fatigue_note) = fatigue_state(agg, input.concept, input.config);
    evidence.extend(fatigue_note);

    let (structural, structural_note) = structural_state(agg, input.config);
    evidence.extend(structural_note);

    let (decision, decision_note) = decide(input, intent_stage, fatigue, structural);
    evidence.push(format!("{decision}: {decision_note}"));

    log::debug!(
        "classify {} {}: phase={learning_phase:?} stage={intent_stage:?} fatigue={fatigue:?} structure={structural:?} → {decision}",
        agg.level, agg.entity_id,
    );

    Classification {
        client_id: agg.client_id.clone(),
        entity_id: agg.entity_id.clone(),
        level: agg.level,
        entity_name: agg.name.clone(),
        learning_phase,
        intent_stage,
        intent_score,
        fatigue,
        structural,
        decision,
        confidence: confidence_score(agg),
        impact_score: impact_score(agg, decision),
        evidence,
        creative_category: None,
        creative_reasoning: None,
    }
}
