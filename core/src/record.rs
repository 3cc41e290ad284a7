//! Daily performance records: the only input the engine reads.
//!
//! RULE: Records are immutable once ingested. The aggregator only reads them.
//! Malformed rows are rejected one at a time; a bad row never aborts a run.

use crate::types::{ClientId, ConversionType, EntityId, EntityLevel};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How long daily records are retained and considered by a run.
pub const RETENTION_DAYS: i64 = 35;

// ── Conversion counters ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionCounts {
    pub purchases:   f64,
    pub leads:       f64,
    pub chat_starts: f64,
    pub installs:    f64,
}

impl ConversionCounts {
    pub fn get(&self, kind: ConversionType) -> f64 {
        match kind {
            ConversionType::Purchase  => self.purchases,
            ConversionType::Lead      => self.leads,
            ConversionType::ChatStart => self.chat_starts,
            ConversionType::Install   => self.installs,
        }
    }

    /// Sum over every conversion type.
    pub fn total(&self) -> f64 {
        self.purchases + self.leads + self.chat_starts + self.installs
    }

    pub fn add(&mut self, other: &ConversionCounts) {
        self.purchases   += other.purchases;
        self.leads       += other.leads;
        self.chat_starts += other.chat_starts;
        self.installs    += other.installs;
    }

    fn values(&self) -> [f64; 4] {
        [self.purchases, self.leads, self.chat_starts, self.installs]
    }
}

// ── Validated record ─────────────────────────────────────────────────────────

/// One entity, one calendar day, one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub client_id:          ClientId,
    pub date:               NaiveDate,
    pub entity_id:          EntityId,
    pub level:              EntityLevel,
    pub name:               String,
    pub parent_id:          Option<EntityId>,
    /// Explicit creative-concept id, when the ingestion side knows one.
    pub concept_id:         Option<String>,
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
    /// Days the entity has been delivering, as reported on this day.
    pub days_active:        u32,
    /// Days since the last budget/targeting/creative edit, if ever edited.
    pub days_since_last_edit: Option<u32>,
}

// ── Raw record (pre-validation) ──────────────────────────────────────────────

/// A record as delivered by the ingestion collaborator, before validation.
/// `level` is free text and counters may be negative or non-finite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDailyRecord {
    pub client_id:          String,
    pub date:               Option<NaiveDate>,
    pub entity_id:          String,
    pub level:              String,
    pub name:               String,
    pub parent_id:          Option<String>,
    pub concept_id:         Option<String>,
    pub spend:              f64,
    pub impressions:        i64,
    pub reach:              i64,
    pub clicks:             i64,
    pub landing_page_views: i64,
    pub conversions:        ConversionCounts,
    pub conversion_value:   f64,
    pub video_views_3s:     i64,
    pub thruplays:          i64,
    pub engagements:        i64,
    pub days_active:        i64,
    pub days_since_last_edit: Option<i64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordRejection {
    #[error("record has no entity id")]
    MissingEntityId,

    #[error("record for '{entity_id}' has no date")]
    MissingDate { entity_id: String },

    #[error("record for '{entity_id}' has unknown level '{level}'")]
    UnknownLevel { entity_id: String, level: String },

    #[error("record for '{entity_id}' has negative {field}")]
    NegativeCounter { entity_id: String, field: &'static str },

    #[error("record for '{entity_id}' has non-finite {field}")]
    NonFiniteValue { entity_id: String, field: &'static str },

    #[error("record for '{entity_id}' has out-of-range {field}")]
    OutOfRange { entity_id: String, field: &'static str },
}

fn non_negative_int(entity_id: &str, field: &'static str, v: i64) -> Result<u64, RecordRejection> {
    u64::try_from(v).map_err(|_| RecordRejection::NegativeCounter {
        entity_id: entity_id.to_string(),
        field,
    })
}

fn day_count(entity_id: &str, field: &'static str, v: i64) -> Result<u32, RecordRejection> {
    let days = non_negative_int(entity_id, field, v)?;
    u32::try_from(days).map_err(|_| RecordRejection::OutOfRange {
        entity_id: entity_id.to_string(),
        field,
    })
}

fn non_negative_f64(entity_id: &str, field: &'static str, v: f64) -> Result<f64, RecordRejection> {
    if !v.is_finite() {
        return Err(RecordRejection::NonFiniteValue { entity_id: entity_id.to_string(), field });
    }
    if v < 0.0 {
        return Err(RecordRejection::NegativeCounter { entity_id: entity_id.to_string(), field });
    }
    Ok(v)
}

impl TryFrom<RawDailyRecord> for DailyRecord {
    type Error = RecordRejection;

    fn try_from(raw: RawDailyRecord) -> Result<Self, Self::Error> {
        let id = raw.entity_id.trim().to_string();
        if id.is_empty() {
            return Err(RecordRejection::MissingEntityId);
        }
        let date = raw.date.ok_or_else(|| RecordRejection::MissingDate { entity_id: id.clone() })?;
        let level = raw.level.parse::<EntityLevel>().map_err(|_| RecordRejection::UnknownLevel {
            entity_id: id.clone(),
            level:     raw.level.clone(),
        })?;

        let spend = non_negative_f64(&id, "spend", raw.spend)?;
        let conversion_value = non_negative_f64(&id, "conversion_value", raw.conversion_value)?;
        for v in raw.conversions.values() {
            non_negative_f64(&id, "conversions", v)?;
        }

        let days_since_last_edit = match raw.days_since_last_edit {
            Some(d) => Some(day_count(&id, "days_since_last_edit", d)?),
            None => None,
        };

        Ok(DailyRecord {
            client_id: raw.client_id,
            date,
            level,
            name: if raw.name.trim().is_empty() { id.clone() } else { raw.name },
            parent_id: raw.parent_id.filter(|p| !p.trim().is_empty()),
            concept_id: raw.concept_id.filter(|c| !c.trim().is_empty()),
            spend,
            impressions:        non_negative_int(&id, "impressions", raw.impressions)?,
            reach:              non_negative_int(&id, "reach", raw.reach)?,
            clicks:             non_negative_int(&id, "clicks", raw.clicks)?,
            landing_page_views: non_negative_int(&id, "landing_page_views", raw.landing_page_views)?,
            conversions: raw.conversions,
            conversion_value,
            video_views_3s: non_negative_int(&id, "video_views_3s", raw.video_views_3s)?,
            thruplays:      non_negative_int(&id, "thruplays", raw.thruplays)?,
            engagements:    non_negative_int(&id, "engagements", raw.engagements)?,
            days_active:    day_count(&id, "days_active", raw.days_active)?,
            days_since_last_edit,
            entity_id: id,
        })
    }
}

impl DailyRecord {
    /// Re-check a record that was built in memory rather than converted
    /// from a raw row.
    pub fn validate(&self) -> Result<(), RecordRejection> {
        if self.entity_id.trim().is_empty() {
            return Err(RecordRejection::MissingEntityId);
        }
        non_negative_f64(&self.entity_id, "spend", self.spend)?;
        non_negative_f64(&self.entity_id, "conversion_value", self.conversion_value)?;
        for v in self.conversions.values() {
            non_negative_f64(&self.entity_id, "conversions", v)?;
        }
        Ok(())
    }

    /// Whole days between `reference` and this record's date.
    /// Negative for records dated after the reference date.
    pub fn days_back(&self, reference: NaiveDate) -> i64 {
        (reference - self.date).num_days()
    }
}

// ── Ingestion ────────────────────────────────────────────────────────────────

/// Outcome of converting a batch of raw rows.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub accepted: Vec<DailyRecord>,
    pub rejected: Vec<RecordRejection>,
}

/// Convert raw rows, skipping (and logging) each malformed one.
pub fn ingest(raw: Vec<RawDailyRecord>) -> IngestReport {
    let mut report = IngestReport::default();
    for row in raw {
        match DailyRecord::try_from(row) {
            Ok(rec) => report.accepted.push(rec),
            Err(e) => {
                log::warn!("skipping record: {e}");
                report.rejected.push(e);
            }
        }
    }
    report
}

/// Parse a JSON array of raw rows (the ingestion collaborator's export format).
pub fn parse_raw_records(json: &str) -> serde_json::Result<Vec<RawDailyRecord>> {
    serde_json::from_str(json)
}
