//! Per-client thresholds, alert copy, and the client profile.
//!
//! Every field has a documented default so a missing or partial document
//! never fails a run. Fractions are stored as fractions (0.25 = 25 %).

use crate::{
    alert_rules::AlertType,
    types::{ClientId, ConversionType, GrowthPosture},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Engine thresholds ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 7-day frequency above which an ad is considered heavily repeated.
    pub fatigue_frequency: f64,
    /// 7d CPA / 14d CPA at or above which CPA counts as rising.
    pub fatigue_cpa_multiplier: f64,
    /// Active ad groups per campaign above which the structure is fragmented.
    pub max_adsets_per_campaign: usize,
    /// Share of account ad spend above which a single ad is overconcentrated.
    pub overconcentration_ratio: f64,
    /// 3-day budget change (fraction) that risks resetting delivery learning.
    pub learning_reset_budget_change: f64,
    /// Frequency ceiling under which scaling is considered safe.
    pub scaling_frequency_ceiling: f64,
    /// 7d-vs-14d CPA increase (fraction) that counts as a spike.
    pub cpa_spike_ratio: f64,
    /// Tolerated day-to-day variation (fraction) of CPA, ROAS and budget.
    pub volatility_ratio: f64,
    pub templates: BTreeMap<AlertType, AlertTemplate>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fatigue_frequency:            4.0,
            fatigue_cpa_multiplier:       1.2,
            max_adsets_per_campaign:      5,
            overconcentration_ratio:      0.60,
            learning_reset_budget_change: 0.30,
            scaling_frequency_ceiling:    3.5,
            cpa_spike_ratio:              0.25,
            volatility_ratio:             0.50,
            templates:                    default_templates(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON document on disk.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        Self::from_json(&content).map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Resolve the effective config for a client: the stored document if
    /// present, documented defaults otherwise.
    pub fn or_default(stored: Option<EngineConfig>, client_id: &str) -> Self {
        match stored {
            Some(cfg) => cfg,
            None => {
                log::warn!("client={client_id} no engine config found, using defaults");
                Self::default()
            }
        }
    }

    /// Template for an alert type, falling back to the built-in copy when a
    /// partial document omitted it.
    pub fn template_for(&self, alert_type: AlertType) -> AlertTemplate {
        self.templates
            .get(&alert_type)
            .cloned()
            .unwrap_or_else(|| builtin_template(alert_type))
    }
}

// ── Alert copy ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertTemplate {
    pub title:       String,
    pub description: String,
}

fn tpl(title: &str, description: &str) -> AlertTemplate {
    AlertTemplate { title: title.into(), description: description.into() }
}

fn builtin_template(alert_type: AlertType) -> AlertTemplate {
    match alert_type {
        AlertType::ScalingOpportunity => tpl(
            "Scaling opportunity: {{entity_name}}",
            "CPA {{cpa}} against target {{target_cpa}} with frequency {{frequency}}. \
             Conversion velocity is holding; budget can be raised in small steps.",
        ),
        AlertType::LearningResetRisk => tpl(
            "Learning reset risk: {{entity_name}}",
            "Spend moved {{spend_delta}}% over the last 3 days right after an edit. \
             Further changes may restart delivery learning.",
        ),
        AlertType::CpaSpike => tpl(
            "CPA spike: {{entity_name}}",
            "7-day CPA {{cpa}} is {{cpa_delta}}% above the 14-day baseline (target {{target_cpa}}).",
        ),
        AlertType::BudgetBleed => tpl(
            "Budget bleed: {{entity_name}}",
            "{{spend}} spent in 7 days with no conversions (target CPA {{target_cpa}}).",
        ),
        AlertType::CpaVolatility => tpl(
            "Volatile budget: {{entity_name}}",
            "Spend changed {{spend_delta}}% versus the previous 3 days; CPA readings are unreliable.",
        ),
        AlertType::RotateConcept => tpl(
            "Rotate creative concept: {{entity_name}}",
            "Frequency {{frequency}}, CPA {{cpa_delta}}% versus 14 days, hook rate {{hook_rate_delta}}%. \
             The audience is tiring of this concept.",
        ),
        AlertType::Consolidate => tpl(
            "Consolidate structure: {{entity_name}}",
            "Spend of {{spend}} is split or concentrated in a way that starves delivery learning.",
        ),
        AlertType::KillRetry => tpl(
            "Kill and retry: {{entity_name}}",
            "{{spend}} spent over 7 days without a conversion signal.",
        ),
        AlertType::IntroduceBofuVariants => tpl(
            "Add bottom-funnel variants: {{entity_name}}",
            "Strong purchase intent with few live variants; add variants to protect CPA {{cpa}}.",
        ),
    }
}

fn default_templates() -> BTreeMap<AlertType, AlertTemplate> {
    AlertType::ALL.iter().map(|t| (*t, builtin_template(*t))).collect()
}

// ── Client profile ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConstraints {
    /// Budgets cannot be raised; scaling alerts are suppressed.
    pub budget_locked: bool,
    /// New creatives cannot be produced; variant alerts are suppressed.
    pub creative_production_limited: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientProfile {
    pub client_id:          ClientId,
    pub name:               String,
    pub target_cpa:         Option<f64>,
    pub target_roas:        Option<f64>,
    pub primary_conversion: ConversionType,
    pub growth_posture:     GrowthPosture,
    pub constraints:        ClientConstraints,
}

impl ClientProfile {
    pub fn new(client_id: impl Into<ClientId>) -> Self {
        let client_id = client_id.into();
        Self { name: client_id.clone(), client_id, ..Default::default() }
    }

    /// Positive target CPA, if one is configured.
    pub fn target_cpa(&self) -> Option<f64> {
        self.target_cpa.filter(|t| *t > 0.0)
    }

    pub fn target_roas(&self) -> Option<f64> {
        self.target_roas.filter(|t| *t > 0.0)
    }

    /// True when budget-raising recommendations must not be surfaced.
    pub fn scaling_suppressed(&self) -> bool {
        self.growth_posture == GrowthPosture::Conservative || self.constraints.budget_locked
    }
}
