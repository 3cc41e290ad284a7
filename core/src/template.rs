//! Alert copy rendering.
//!
//! RULE: only the fixed placeholder set below is substituted. Anything else
//! in `{{…}}` passes through untouched. Undefined values render as "n/a".

use crate::aggregator::RollingAggregate;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateVars {
    pub entity_name:     String,
    pub spend:           Option<f64>,
    pub cpa:             Option<f64>,
    pub target_cpa:      Option<f64>,
    pub frequency:       Option<f64>,
    pub spend_delta:     Option<f64>,
    pub cpa_delta:       Option<f64>,
    pub hook_rate_delta: Option<f64>,
}

impl TemplateVars {
    pub fn from_aggregate(agg: &RollingAggregate, target_cpa: Option<f64>) -> Self {
        Self {
            entity_name:     agg.name.clone(),
            spend:           Some(agg.spend_7d()),
            cpa:             agg.d7.cpa,
            target_cpa,
            frequency:       agg.d7.frequency,
            spend_delta:     Some(agg.deltas.spend_3d_vs_prev_3d),
            cpa_delta:       agg.deltas.cpa_7d_vs_14d,
            hook_rate_delta: agg.deltas.hook_rate_7d_vs_14d,
        }
    }

    pub fn render(&self, template: &str) -> String {
        template
            .replace("{{entity_name}}", &self.entity_name)
            .replace("{{spend}}", &money(self.spend))
            .replace("{{cpa}}", &money(self.cpa))
            .replace("{{target_cpa}}", &money(self.target_cpa))
            .replace("{{frequency}}", &number(self.frequency))
            .replace("{{spend_delta}}", &percent(self.spend_delta))
            .replace("{{cpa_delta}}", &percent(self.cpa_delta))
            .replace("{{hook_rate_delta}}", &percent(self.hook_rate_delta))
    }
}

fn money(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".into(), |x| format!("{x:.2}"))
}

fn number(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".into(), |x| format!("{x:.2}"))
}

fn percent(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".into(), |x| format!("{x:+.1}"))
}
