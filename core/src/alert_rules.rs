//! Alert rule engine: a fixed, ordered battery of rules per active entity.
//!
//! RULE ORDER (evaluation and tie-break order):
//!   SCALING_OPPORTUNITY, LEARNING_RESET_RISK, CPA_SPIKE, BUDGET_BLEED,
//!   CPA_VOLATILITY, then the classifier pass-throughs ROTATE_CONCEPT,
//!   CONSOLIDATE, KILL_RETRY, INTRODUCE_BOFU_VARIANTS.
//!
//! RULE: the output is a complete snapshot keyed by `(entity_id, type)`.
//! Nothing is diffed against a previous run; a later write for the same
//! key replaces the earlier one.
//! RULE: alert ids are UUID v5 over client, entity, type and reference
//! date, so a re-run on the same inputs reproduces them exactly.

use crate::{
    aggregator::RollingAggregate,
    classifier::{Classification, Decision, FatigueState, RECENT_EDIT_DAYS},
    config::{ClientProfile, EngineConfig},
    template::TemplateVars,
    types::{ClientId, EntityId, EntityLevel},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::BTreeMap, fmt, str::FromStr};
use uuid::Uuid;

/// Days that must pass after an edit before scaling is advised.
pub const SCALING_MIN_DAYS_SINCE_EDIT: u32 = 3;
pub const BUDGET_BLEED_TARGET_MULTIPLE: f64 = 2.0;
/// CPA spikes beyond this multiple of the configured ratio are critical.
pub const CPA_SPIKE_CRITICAL_MULTIPLE: f64 = 2.0;

// ── Severity ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

// ── Alert type ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    ScalingOpportunity,
    LearningResetRisk,
    CpaSpike,
    BudgetBleed,
    CpaVolatility,
    RotateConcept,
    Consolidate,
    KillRetry,
    IntroduceBofuVariants,
}

impl AlertType {
    pub const ALL: [AlertType; 9] = [
        AlertType::ScalingOpportunity,
        AlertType::LearningResetRisk,
        AlertType::CpaSpike,
        AlertType::BudgetBleed,
        AlertType::CpaVolatility,
        AlertType::RotateConcept,
        AlertType::Consolidate,
        AlertType::KillRetry,
        AlertType::IntroduceBofuVariants,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::ScalingOpportunity    => "SCALING_OPPORTUNITY",
            AlertType::LearningResetRisk     => "LEARNING_RESET_RISK",
            AlertType::CpaSpike              => "CPA_SPIKE",
            AlertType::BudgetBleed           => "BUDGET_BLEED",
            AlertType::CpaVolatility         => "CPA_VOLATILITY",
            AlertType::RotateConcept         => "ROTATE_CONCEPT",
            AlertType::Consolidate           => "CONSOLIDATE",
            AlertType::KillRetry             => "KILL_RETRY",
            AlertType::IntroduceBofuVariants => "INTRODUCE_BOFU_VARIANTS",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlertType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown alert type: {s}"))
    }
}

// ── Alert ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id:           Uuid,
    pub client_id:    ClientId,
    pub level:        EntityLevel,
    pub entity_id:    EntityId,
    pub entity_name:  String,
    pub alert_type:   AlertType,
    pub severity:     Severity,
    pub title:        String,
    pub description:  String,
    pub impact_score: f64,
    pub evidence:     Vec<String>,
    pub created_at:   DateTime<Utc>,
}

/// Highest severity first, then impact, then entity, level and type for stability.
pub fn alert_order(a: &Alert, b: &Alert) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| b.impact_score.total_cmp(&a.impact_score))
        .then_with(|| a.entity_id.cmp(&b.entity_id))
        .then_with(|| a.level.cmp(&b.level))
        .then_with(|| a.alert_type.cmp(&b.alert_type))
}

pub fn alert_id(
    client_id: &str,
    level: EntityLevel,
    entity_id: &str,
    alert_type: AlertType,
    reference_date: NaiveDate,
) -> Uuid {
    let key = format!("{client_id}|{}|{entity_id}|{}|{reference_date}", level.as_str(), alert_type.as_str());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
}

// ── Rules ────────────────────────────────────────────────────────────────────

/// What one rule sees for one entity.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub aggregate:      &'a RollingAggregate,
    pub classification: &'a Classification,
    pub profile:        &'a ClientProfile,
    pub config:         &'a EngineConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit {
    pub severity: Severity,
    pub evidence: Vec<String>,
}

fn hit(severity: Severity, evidence: String) -> Option<RuleHit> {
    Some(RuleHit { severity, evidence: vec![evidence] })
}

/// One alert condition. Implementations must be pure.
pub trait AlertRule: Send + Sync {
    fn alert_type(&self) -> AlertType;

    /// Returns a hit when the rule fires for this entity.
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<RuleHit>;
}

fn edited_within(agg: &RollingAggregate, days: u32) -> bool {
    agg.stability.days_since_last_edit.is_some_and(|d| d <= days)
}

pub struct ScalingOpportunity;

impl AlertRule for ScalingOpportunity {
    fn alert_type(&self) -> AlertType {
        AlertType::ScalingOpportunity
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<RuleHit> {
        if ctx.profile.scaling_suppressed() {
            return None;
        }
        let agg = ctx.aggregate;
        let cpa_ok = matches!((agg.d7.cpa, ctx.profile.target_cpa()), (Some(c), Some(t)) if c <= t);
        let roas_ok = matches!((agg.d7.roas, ctx.profile.target_roas()), (Some(r), Some(t)) if r >= t);
        let velocity_holding = agg.d7.velocity >= agg.d14.velocity;
        let frequency_safe = agg.d7.frequency.is_some_and(|f| f < ctx.config.scaling_frequency_ceiling);
        let settled = agg
            .stability
            .days_since_last_edit
            .map_or(true, |d| d >= SCALING_MIN_DAYS_SINCE_EDIT);

        if (cpa_ok || roas_ok) && velocity_holding && frequency_safe && settled {
            return hit(
                Severity::Info,
                format!(
                    "velocity {:.2}/day over 7d vs {:.2}/day over 14d",
                    agg.d7.velocity, agg.d14.velocity
                ),
            );
        }
        None
    }
}

pub struct LearningResetRisk;

impl AlertRule for LearningResetRisk {
    fn alert_type(&self) -> AlertType {
        AlertType::LearningResetRisk
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<RuleHit> {
        let agg = ctx.aggregate;
        let change = agg.deltas.spend_3d_vs_prev_3d.abs() / 100.0;
        if change > ctx.config.learning_reset_budget_change && edited_within(agg, RECENT_EDIT_DAYS) {
            return hit(
                Severity::Warning,
                format!(
                    "3-day spend moved {:.0}% with an edit {} days ago",
                    change * 100.0,
                    agg.stability.days_since_last_edit.unwrap_or(0)
                ),
            );
        }
        None
    }
}

pub struct CpaSpike;

impl AlertRule for CpaSpike {
    fn alert_type(&self) -> AlertType {
        AlertType::CpaSpike
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<RuleHit> {
        let delta = ctx.aggregate.deltas.cpa_7d_vs_14d? / 100.0;
        let ratio = ctx.config.cpa_spike_ratio;
        if delta <= ratio {
            return None;
        }
        let severity = if delta > ratio * CPA_SPIKE_CRITICAL_MULTIPLE {
            Severity::Critical
        } else {
            Severity::Warning
        };
        hit(severity, format!("7d CPA {:+.0}% vs 14d (limit {:.0}%)", delta * 100.0, ratio * 100.0))
    }
}

pub struct BudgetBleed;

impl AlertRule for BudgetBleed {
    fn alert_type(&self) -> AlertType {
        AlertType::BudgetBleed
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<RuleHit> {
        let target = ctx.profile.target_cpa()?;
        let agg = ctx.aggregate;
        if agg.d7.primary_conversions == 0.0 && agg.spend_7d() > BUDGET_BLEED_TARGET_MULTIPLE * target {
            return hit(
                Severity::Critical,
                format!("{:.2} spent with no conversions against target CPA {target:.2}", agg.spend_7d()),
            );
        }
        None
    }
}

pub struct CpaVolatility;

impl AlertRule for CpaVolatility {
    fn alert_type(&self) -> AlertType {
        AlertType::CpaVolatility
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<RuleHit> {
        let change = ctx.aggregate.deltas.spend_3d_vs_prev_3d.abs() / 100.0;
        if change > ctx.config.volatility_ratio {
            return hit(
                Severity::Warning,
                format!("3-day spend change {:.0}% exceeds {:.0}%", change * 100.0, ctx.config.volatility_ratio * 100.0),
            );
        }
        None
    }
}

/// Forwards a classifier decision as an alert.
pub struct DecisionPassThrough {
    pub decision:   Decision,
    pub alert_type: AlertType,
}

impl AlertRule for DecisionPassThrough {
    fn alert_type(&self) -> AlertType {
        self.alert_type
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<RuleHit> {
        let c = ctx.classification;
        if c.decision != self.decision {
            return None;
        }
        let severity = match self.decision {
            Decision::RotateConcept if c.fatigue == FatigueState::Real => Severity::Critical,
            Decision::RotateConcept | Decision::Consolidate | Decision::KillRetry => Severity::Warning,
            Decision::IntroduceBofuVariants if ctx.profile.constraints.creative_production_limited => {
                return None;
            }
            _ => Severity::Info,
        };
        Some(RuleHit { severity, evidence: c.evidence.clone() })
    }
}

/// The built-in battery, in evaluation order.
pub fn builtin_rules() -> Vec<Box<dyn AlertRule>> {
    vec![
        Box::new(ScalingOpportunity),
        Box::new(LearningResetRisk),
        Box::new(CpaSpike),
        Box::new(BudgetBleed),
        Box::new(CpaVolatility),
        Box::new(DecisionPassThrough { decision: Decision::RotateConcept, alert_type: AlertType::RotateConcept }),
        Box::new(DecisionPassThrough { decision: Decision::Consolidate, alert_type: AlertType::Consolidate }),
        Box::new(DecisionPassThrough { decision: Decision::KillRetry, alert_type: AlertType::KillRetry }),
        Box::new(DecisionPassThrough {
            decision:   Decision::IntroduceBofuVariants,
            alert_type: AlertType::IntroduceBofuVariants,
        }),
    ]
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct AlertEngine {
    rules: Vec<Box<dyn AlertRule>>,
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(builtin_rules())
    }
}

impl AlertEngine {
    pub fn new(rules: Vec<Box<dyn AlertRule>>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Box<dyn AlertRule>] {
        &self.rules
    }

    /// Evaluate every rule for every classified entity and return the full
    /// alert set, sorted by `alert_order`.
    pub fn evaluate(
        &self,
        entities: &[(&RollingAggregate, &Classification)],
        profile: &ClientProfile,
        config: &EngineConfig,
        reference_date: NaiveDate,
        computed_at: DateTime<Utc>,
    ) -> Vec<Alert> {
        let mut snapshot: BTreeMap<(EntityLevel, EntityId, AlertType), Alert> = BTreeMap::new();

        for (agg, classification) in entities {
            let ctx = RuleContext { aggregate: agg, classification, profile, config };
            let vars = TemplateVars::from_aggregate(agg, profile.target_cpa());

            for rule in &self.rules {
                let Some(fired) = rule.evaluate(&ctx) else { continue };
                let alert_type = rule.alert_type();
                let template = config.template_for(alert_type);
                let alert = Alert {
                    id: alert_id(&profile.client_id, agg.level, &agg.entity_id, alert_type, reference_date),
                    client_id: profile.client_id.clone(),
                    level: agg.level,
                    entity_id: agg.entity_id.clone(),
                    entity_name: agg.name.clone(),
                    alert_type,
                    severity: fired.severity,
                    title: vars.render(&template.title),
                    description: vars.render(&template.description),
                    impact_score: classification.impact_score,
                    evidence: fired.evidence,
                    created_at: computed_at,
                };
                log::debug!(
                    "alert {} {} {}: {}",
                    alert.severity, alert_type, agg.entity_id, alert.title
                );
                snapshot.insert((agg.level, agg.entity_id.clone(), alert_type), alert);
            }
        }

        let mut alerts: Vec<Alert> = snapshot.into_values().collect();
        alerts.sort_by(alert_order);
        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{IntentStage, LearningPhase, StructuralState};
    use crate::types::{ConversionType, GrowthPosture};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 20).unwrap()
    }

    fn classification(agg: &RollingAggregate, decision: Decision, fatigue: FatigueState) -> Classification {
        Classification {
            client_id: agg.client_id.clone(),
            entity_id: agg.entity_id.clone(),
            level: agg.level,
            entity_name: agg.name.clone(),
            learning_phase: LearningPhase::Exploitation,
            intent_stage: IntentStage::Mofu,
            intent_score: 0.5,
            fatigue,
            structural: StructuralState::Normal,
            decision,
            confidence: 0.5,
            impact_score: 10.0,
            evidence: vec!["because".into()],
            creative_category: None,
            creative_reasoning: None,
        }
    }

    fn run(agg: &RollingAggregate, c: &Classification, profile: &ClientProfile) -> Vec<Alert> {
        AlertEngine::default().evaluate(&[(agg, c)], profile, &EngineConfig::default(), day(), Utc::now())
    }

    fn types(alerts: &[Alert]) -> Vec<(AlertType, Severity)> {
        alerts.iter().map(|a| (a.alert_type, a.severity)).collect()
    }

    #[test]
    fn budget_bleed_is_critical() {
        let mut agg = RollingAggregate::empty("c1", "ad-9", EntityLevel::Ad, day());
        agg.d7.totals.spend = 600.0;
        agg.d7.totals.impressions = 30_000;
        agg.refresh_metrics(ConversionType::Purchase);
        let c = classification(&agg, Decision::Hold, FatigueState::None);
        let profile = ClientProfile { target_cpa: Some(100.0), ..ClientProfile::new("c1") };
        let alerts = run(&agg, &c, &profile);
        assert!(types(&alerts).contains(&(AlertType::BudgetBleed, Severity::Critical)));
    }

    #[test]
    fn rotate_severity_follows_fatigue() {
        let agg = RollingAggregate::empty("c1", "ad-1", EntityLevel::Ad, day());
        let profile = ClientProfile::new("c1");
        let real = classification(&agg, Decision::RotateConcept, FatigueState::Real);
        assert_eq!(types(&run(&agg, &real, &profile)), vec![(AlertType::RotateConcept, Severity::Critical)]);
        let decay = classification(&agg, Decision::RotateConcept, FatigueState::ConceptDecay);
        assert_eq!(types(&run(&agg, &decay, &profile)), vec![(AlertType::RotateConcept, Severity::Warning)]);
    }

    #[test]
    fn posture_and_constraints_suppress() {
        let mut agg = RollingAggregate::empty("c1", "ad-1", EntityLevel::Ad, day());
        agg.d7.totals.spend = 400.0;
        agg.d7.totals.impressions = 21_000;
        agg.d7.totals.reach = 10_000;
        agg.d7.totals.conversions.purchases = 10.0;
        agg.d14.totals = agg.d7.totals;
        agg.refresh_metrics(ConversionType::Purchase);
        let c = classification(&agg, Decision::IntroduceBofuVariants, FatigueState::None);

        let mut profile = ClientProfile { target_cpa: Some(50.0), ..ClientProfile::new("c1") };
        let open = types(&run(&agg, &c, &profile));
        assert!(open.contains(&(AlertType::ScalingOpportunity, Severity::Info)));
        assert!(open.contains(&(AlertType::IntroduceBofuVariants, Severity::Info)));

        profile.growth_posture = GrowthPosture::Conservative;
        profile.constraints.creative_production_limited = true;
        assert!(run(&agg, &c, &profile).is_empty());
    }

    #[test]
    fn cpa_spike_escalates() {
        let mut agg = RollingAggregate::empty("c1", "ad-1", EntityLevel::Ad, day());
        let c = classification(&agg, Decision::Hold, FatigueState::None);
        let profile = ClientProfile::new("c1");
        agg.deltas.cpa_7d_vs_14d = Some(30.0);
        assert_eq!(types(&run(&agg, &c, &profile)), vec![(AlertType::CpaSpike, Severity::Warning)]);
        agg.deltas.cpa_7d_vs_14d = Some(80.0);
        assert_eq!(types(&run(&agg, &c, &profile)), vec![(AlertType::CpaSpike, Severity::Critical)]);
    }

    #[test]
    fn budget_swing_right_after_an_edit_risks_a_learning_reset() {
        let mut agg = RollingAggregate::empty("c1", "ad-1", EntityLevel::Ad, day());
        let c = classification(&agg, Decision::Hold, FatigueState::None);
        let profile = ClientProfile::new("c1");
        agg.deltas.spend_3d_vs_prev_3d = 40.0;
        agg.stability.days_since_last_edit = Some(1);
        assert_eq!(types(&run(&agg, &c, &profile)), vec![(AlertType::LearningResetRisk, Severity::Warning)]);
        agg.stability.days_since_last_edit = Some(10);
        assert!(run(&agg, &c, &profile).is_empty());
        agg.stability.days_since_last_edit = Some(1);
        agg.deltas.spend_3d_vs_prev_3d = -25.0;
        assert!(run(&agg, &c, &profile).is_empty());
    }

    #[test]
    fn large_spend_swings_are_volatile() {
        let mut agg = RollingAggregate::empty("c1", "ad-1", EntityLevel::Ad, day());
        let c = classification(&agg, Decision::Hold, FatigueState::None);
        let profile = ClientProfile::new("c1");
        agg.deltas.spend_3d_vs_prev_3d = -60.0;
        assert_eq!(types(&run(&agg, &c, &profile)), vec![(AlertType::CpaVolatility, Severity::Warning)]);
        agg.deltas.spend_3d_vs_prev_3d = 50.0;
        assert!(run(&agg, &c, &profile).is_empty());
    }

    #[test]
    fn same_id_on_two_levels_keeps_both_alerts() {
        let mut ad = RollingAggregate::empty("c1", "x-1", EntityLevel::Ad, day());
        ad.deltas.cpa_7d_vs_14d = Some(30.0);
        let mut campaign = ad.clone();
        campaign.level = EntityLevel::Campaign;
        let ad_c = classification(&ad, Decision::Hold, FatigueState::None);
        let campaign_c = classification(&campaign, Decision::Hold, FatigueState::None);

        let alerts = AlertEngine::default().evaluate(
            &[(&campaign, &campaign_c), (&ad, &ad_c)],
            &ClientProfile::new("c1"),
            &EngineConfig::default(),
            day(),
            Utc::now(),
        );
        let levels: Vec<EntityLevel> = alerts.iter().map(|a| a.level).collect();
        assert_eq!(levels, vec![EntityLevel::Campaign, EntityLevel::Ad]);
        assert_ne!(alerts[0].id, alerts[1].id);
    }

    #[test]
    fn unknown_placeholder_survives_rendering() {
        let mut agg = RollingAggregate::empty("c1", "ad-1", EntityLevel::Ad, day());
        agg.deltas.cpa_7d_vs_14d = Some(30.0);
        let c = classification(&agg, Decision::Hold, FatigueState::None);
        let mut config = EngineConfig::default();
        config.templates.insert(
            AlertType::CpaSpike,
            crate::config::AlertTemplate { title: "{{entity_name}} {{region}}".into(), description: String::new() },
        );
        let alerts = AlertEngine::default().evaluate(&[(&agg, &c)], &ClientProfile::new("c1"), &config, day(), Utc::now());
        assert_eq!(alerts[0].title, "ad-1 {{region}}");
    }

    #[test]
    fn ids_are_stable_and_sorting_puts_critical_first() {
        let a = alert_id("c1", EntityLevel::Ad, "ad-1", AlertType::CpaSpike, day());
        assert_eq!(a, alert_id("c1", EntityLevel::Ad, "ad-1", AlertType::CpaSpike, day()));
        assert_ne!(a, alert_id("c1", EntityLevel::Ad, "ad-2", AlertType::CpaSpike, day()));
        assert_ne!(a, alert_id("c1", EntityLevel::Campaign, "ad-1", AlertType::CpaSpike, day()));
        assert_eq!("cpa_spike".parse::<AlertType>(), Ok(AlertType::CpaSpike));
        assert!(Severity::Critical > Severity::Warning && Severity::Warning > Severity::Info);
    }
}
