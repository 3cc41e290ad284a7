//! Output bundles handed to the storage collaborator.
//!
//! The main bundle carries non-ad entities, concepts, every classification
//! and the alert list. Ad-level entities and their classifications go into
//! a separate bundle so neither payload grows with the ad count alone.
//! Each bundle travels with `BundleMeta`, measured on the exact JSON bytes.

use crate::{
    aggregator::RollingAggregate,
    alert_rules::Alert,
    classifier::Classification,
    concept::ConceptAggregate,
    error::EngineResult,
    types::ClientId,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleKind {
    Main,
    Ads,
}

impl BundleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleKind::Main => "main",
            BundleKind::Ads => "ads",
        }
    }
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainBundle {
    pub client_id:       ClientId,
    pub reference_date:  NaiveDate,
    pub computed_at:     DateTime<Utc>,
    pub entities:        Vec<RollingAggregate>,
    pub concepts:        Vec<ConceptAggregate>,
    pub classifications: Vec<Classification>,
    pub alerts:          Vec<Alert>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdsBundle {
    pub client_id:       ClientId,
    pub reference_date:  NaiveDate,
    pub computed_at:     DateTime<Utc>,
    pub ads:             Vec<RollingAggregate>,
    pub classifications: Vec<Classification>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMeta {
    pub kind:                 BundleKind,
    pub serialized_bytes:     usize,
    pub entity_count:         usize,
    pub classification_count: usize,
    pub alert_count:          usize,
}

impl MainBundle {
    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn meta(&self) -> EngineResult<BundleMeta> {
        Ok(BundleMeta {
            kind:                 BundleKind::Main,
            serialized_bytes:     self.to_json()?.len(),
            entity_count:         self.entities.len(),
            classification_count: self.classifications.len(),
            alert_count:          self.alerts.len(),
        })
    }
}

impl AdsBundle {
    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn meta(&self) -> EngineResult<BundleMeta> {
        Ok(BundleMeta {
            kind:                 BundleKind::Ads,
            serialized_bytes:     self.to_json()?.len(),
            entity_count:         self.ads.len(),
            classification_count: self.classifications.len(),
            alert_count:          0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_measures_the_serialized_payload() {
        let bundle = AdsBundle {
            client_id: "c1".into(),
            reference_date: NaiveDate::from_ymd_opt(2026, 5, 20).unwrap(),
            computed_at: DateTime::<Utc>::UNIX_EPOCH,
            ads: vec![],
            classifications: vec![],
        };
        let meta = bundle.meta().unwrap();
        assert_eq!(meta.kind, BundleKind::Ads);
        assert_eq!(meta.serialized_bytes, bundle.to_json().unwrap().len());
        assert_eq!(meta.entity_count, 0);
    }
}
