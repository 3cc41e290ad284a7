//! Creative categorizer: ad-level only.
//!
//! Six mutually exclusive buckets, first match wins:
//!   DOMINANT_SCALABLE → WINNER_SATURATING → HIDDEN_BOFU →
//!   INEFFICIENT_TOFU → ZOMBIE → NEW_INSUFFICIENT_DATA
//!
//! RULE: an ad matching nothing stays uncategorised. That is a normal
//! outcome, not an error.

use crate::{
    aggregator::RollingAggregate,
    benchmark::Percentiles,
    classifier::{Classification, Decision, FatigueState, IntentStage},
    config::ClientProfile,
    types::EntityLevel,
};
use serde::{Deserialize, Serialize};

/// Share of account-wide 7-day ad spend above which a winner is dominant.
pub const DOMINANT_SPEND_SHARE: f64 = 0.30;
pub const INEFFICIENT_CPA_MULTIPLE: f64 = 1.5;
pub const INEFFICIENT_MIN_SPEND: f64 = 100.0;
pub const ZOMBIE_SPEND_FLOOR: f64 = 50.0;
/// Lower floor for ads with no downstream signal whatsoever.
pub const ZOMBIE_SILENT_SPEND_FLOOR: f64 = 30.0;
pub const NEW_MIN_DAYS_ACTIVE: u32 = 4;
pub const NEW_MIN_IMPRESSIONS: u64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreativeCategory {
    DominantScalable,
    WinnerSaturating,
    HiddenBofu,
    InefficientTofu,
    Zombie,
    NewInsufficientData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreativeVerdict {
    pub category:  Option<CreativeCategory>,
    pub reasoning: String,
}

fn verdict(category: CreativeCategory, reasoning: String) -> CreativeVerdict {
    CreativeVerdict { category: Some(category), reasoning }
}

/// Categorise one ad. Returns `None` for non-ad entities.
pub fn categorize(
    classification: &Classification,
    agg: &RollingAggregate,
    percentiles: &Percentiles,
    profile: &ClientProfile,
) -> Option<CreativeVerdict> {
    if agg.level != EntityLevel::Ad {
        return None;
    }

    let spend = agg.spend_7d();
    let share = agg.concentration.top1_share.unwrap_or(0.0);
    let conversions = agg.d7.primary_conversions;
    let stage = classification.intent_stage;
    let cpa = agg.d7.cpa;
    let target = profile.target_cpa();

    let at_or_under_target = matches!((cpa, target), (Some(c), Some(t)) if c <= t);
    if (classification.decision == Decision::Scale || at_or_under_target) && share > DOMINANT_SPEND_SHARE {
        return Some(verdict(
            CreativeCategory::DominantScalable,
            format!("carries {:.0}% of ad spend while hitting efficiency goals", share * 100.0),
        ));
    }

    if stage == IntentStage::Bofu
        && matches!(classification.fatigue, FatigueState::Real | FatigueState::AudienceSaturation)
    {
        return Some(verdict(
            CreativeCategory::WinnerSaturating,
            "converts at the bottom of the funnel but the audience is wearing out".into(),
        ));
    }

    if stage == IntentStage::Bofu && spend < percentiles.spend_p25 && conversions >= 1.0 {
        return Some(verdict(
            CreativeCategory::HiddenBofu,
            format!(
                "{conversions:.0} conversions on {spend:.2} spend, below the ad spend 25th percentile {:.2}",
                percentiles.spend_p25
            ),
        ));
    }

    if stage == IntentStage::Tofu && spend > INEFFICIENT_MIN_SPEND {
        if let (Some(c), Some(t)) = (cpa, target) {
            if c > t * INEFFICIENT_CPA_MULTIPLE {
                return Some(verdict(
                    CreativeCategory::InefficientTofu,
                    format!("CPA {c:.2} exceeds {INEFFICIENT_CPA_MULTIPLE}x target {t:.2}"),
                ));
            }
        }
    }

    let t = &agg.d7.totals;
    let silent = t.conversions.total() == 0.0 && t.conversion_value == 0.0 && t.landing_page_views == 0;
    if (spend > ZOMBIE_SPEND_FLOOR && conversions == 0.0) || (spend > ZOMBIE_SILENT_SPEND_FLOOR && silent) {
        return Some(verdict(
            CreativeCategory::Zombie,
            format!("{spend:.2} spent in 7 days without a conversion"),
        ));
    }

    if agg.stability.days_active < NEW_MIN_DAYS_ACTIVE || t.impressions < NEW_MIN_IMPRESSIONS {
        return Some(verdict(
            CreativeCategory::NewInsufficientData,
            format!("{} days active, {} impressions", agg.stability.days_active, t.impressions),
        ));
    }

    Some(CreativeVerdict {
        category: None,
        reasoning: "no creative pattern stands out".into(),
    })
}

/// Categorise and write the result onto the classification.
pub fn annotate(
    classification: &mut Classification,
    agg: &RollingAggregate,
    percentiles: &Percentiles,
    profile: &ClientProfile,
) {
    if let Some(v) = categorize(classification, agg, percentiles, profile) {
        classification.creative_category = v.category;
        classification.creative_reasoning = Some(v.reasoning);
    }
}
