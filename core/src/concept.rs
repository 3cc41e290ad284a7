//! Creative-concept grouping.
//!
//! The concept key is best-effort: an explicit id from ingestion, else a
//! token parsed out of the ad name by naming convention. Ads without a key
//! are simply left out of concept-level analysis.

use crate::{
    aggregator::{ratio_delta, RollingAggregate, WindowMetrics, WindowTotals},
    types::{ConversionType, EntityId, EntityLevel},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Longest leading token accepted as an identifier-like concept key.
pub const MAX_CONCEPT_TOKEN_LEN: usize = 12;

const SEPARATORS: [char; 3] = ['|', '_', '-'];

/// Derive a concept key from an ad name.
///
/// `"[C03] Testimonial | v2"` → `C03`; `"UGC7 - hook test"` → `UGC7`;
/// `"Summer sale video"` → `None`.
pub fn concept_key(name: &str) -> Option<String> {
    if let Some(open) = name.find('[') {
        if let Some(len) = name[open + 1..].find(']') {
            let token = name[open + 1..open + 1 + len].trim();
            if !token.is_empty() {
                return Some(token.to_uppercase());
            }
        }
    }

    let idx = name.find(|c| SEPARATORS.contains(&c))?;
    let token = name[..idx].trim();
    let plausible = !token.is_empty()
        && token.chars().count() <= MAX_CONCEPT_TOKEN_LEN
        && token.chars().all(|c| c.is_ascii_alphanumeric());
    plausible.then(|| token.to_uppercase())
}

/// Ad-level totals pooled across every ad sharing one concept key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptAggregate {
    pub concept_key:         String,
    pub ad_ids:              Vec<EntityId>,
    pub active_ads:          usize,
    pub d7:                  WindowMetrics,
    pub d14:                 WindowMetrics,
    pub prev_7d:             WindowMetrics,
    pub cpa_7d_vs_14d:       Option<f64>,
    pub hook_rate_7d_vs_14d: Option<f64>,
}

impl ConceptAggregate {
    pub fn spend_7d(&self) -> f64 {
        self.d7.totals.spend
    }
}

/// Pool ad aggregates by concept key. Keys are sorted, ad ids are sorted.
pub fn build_concepts(
    aggs: &[RollingAggregate],
    primary: ConversionType,
) -> BTreeMap<String, ConceptAggregate> {
    let mut pooled: BTreeMap<&str, (Vec<EntityId>, usize, [WindowTotals; 3])> = BTreeMap::new();
    for a in aggs.iter().filter(|a| a.level == EntityLevel::Ad) {
        let Some(key) = a.concept_key.as_deref() else { continue };
        let entry = pooled.entry(key).or_default();
        entry.0.push(a.entity_id.clone());
        if a.is_active() {
            entry.1 += 1;
        }
        entry.2[0].merge(&a.d7.totals);
        entry.2[1].merge(&a.d14.totals);
        entry.2[2].merge(&a.prev_7d.totals);
    }

    pooled
        .into_iter()
        .map(|(key, (mut ad_ids, active_ads, t))| {
            ad_ids.sort();
            let d7 = WindowMetrics::from_totals(7, t[0], primary);
            let d14 = WindowMetrics::from_totals(14, t[1], primary);
            let prev_7d = WindowMetrics::from_totals(7, t[2], primary);
            let concept = ConceptAggregate {
                concept_key: key.to_string(),
                ad_ids,
                active_ads,
                cpa_7d_vs_14d: ratio_delta(d7.cpa, d14.cpa),
                hook_rate_7d_vs_14d: ratio_delta(d7.hook_rate, d14.hook_rate),
                d7,
                d14,
                prev_7d,
            };
            (key.to_string(), concept)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn bracket_token_wins() {
        assert_eq!(concept_key("[c03] Testimonial | v2"), Some("C03".into()));
        assert_eq!(concept_key("Spring [UGC-7] cut"), Some("UGC-7".into()));
    }

    #[test]
    fn leading_token_before_separator() {
        assert_eq!(concept_key("UGC7 - hook test"), Some("UGC7".into()));
        assert_eq!(concept_key("hk12_static_v3"), Some("HK12".into()));
    }

    #[test]
    fn long_or_free_text_names_have_no_key() {
        assert_eq!(concept_key("Summer sale video"), None);
        assert_eq!(concept_key("Summer sale video | v2"), None, "token has spaces");
        assert_eq!(concept_key("averyveryverylongtoken_v1"), None);
        assert_eq!(concept_key("[] empty"), None);
    }

    #[test]
    fn concepts_pool_ad_totals() {
        let day = NaiveDate::from_ymd_opt(2026, 5, 20).unwrap();
        let mut a = RollingAggregate::empty("c1", "ad-1", EntityLevel::Ad, day);
        a.concept_key = Some("C1".into());
        a.d7.totals.spend = 30.0;
        a.d7.totals.conversions.purchases = 1.0;
        let mut b = RollingAggregate::empty("c1", "ad-2", EntityLevel::Ad, day);
        b.concept_key = Some("C1".into());
        b.d7.totals.spend = 10.0;
        b.d7.totals.conversions.purchases = 1.0;
        let orphan = RollingAggregate::empty("c1", "ad-3", EntityLevel::Ad, day);

        let concepts = build_concepts(&[b, a, orphan], ConversionType::Purchase);
        assert_eq!(concepts.len(), 1);
        let c = &concepts["C1"];
        assert_eq!(c.ad_ids, vec!["ad-1".to_string(), "ad-2".to_string()]);
        assert_eq!(c.active_ads, 2);
        assert_eq!(c.d7.cpa, Some(20.0));
    }
}
