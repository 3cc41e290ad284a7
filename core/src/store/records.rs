use super::PulseStore;
use crate::{
    error::EngineResult,
    record::{ConversionCounts, DailyRecord, RawDailyRecord},
};
use chrono::NaiveDate;
use rusqlite::params;

impl PulseStore {
    /// Insert or overwrite one record keyed by (client, date, level, entity).
    pub fn insert_daily_record(&self, r: &DailyRecord) -> EngineResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO daily_record (
                client_id, date, level, entity_id, name, parent_id, concept_id,
                spend, impressions, reach, clicks, landing_page_views,
                purchases, leads, chat_starts, installs, conversion_value,
                video_views_3s, thruplays, engagements, days_active, days_since_last_edit
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                      ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
            params![
                r.client_id,
                r.date.to_string(),
                r.level.as_str(),
                r.entity_id,
                r.name,
                r.parent_id,
                r.concept_id,
                r.spend,
                r.impressions as i64,
                r.reach as i64,
                r.clicks as i64,
                r.landing_page_views as i64,
                r.conversions.purchases,
                r.conversions.leads,
                r.conversions.chat_starts,
                r.conversions.installs,
                r.conversion_value,
                r.video_views_3s as i64,
                r.thruplays as i64,
                r.engagements as i64,
                r.days_active as i64,
                r.days_since_last_edit.map(|d| d as i64),
            ],
        )?;
        Ok(())
    }

    /// Insert many records in one transaction.
    pub fn insert_daily_records(&self, records: &[DailyRecord]) -> EngineResult<usize> {
        let tx = self.conn.unchecked_transaction()?;
        for r in records {
            self.insert_daily_record(r)?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Raw rows for `client_id` dated within `[from, to]`, in date, level,
    /// entity order. Rows are returned unconverted.
    pub fn records_for_client(
        &self,
        client_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<Vec<RawDailyRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT client_id, date, level, entity_id, name, parent_id, concept_id,
                    spend, impressions, reach, clicks, landing_page_views,
                    purchases, leads, chat_starts, installs, conversion_value,
                    video_views_3s, thruplays, engagements, days_active, days_since_last_edit
             FROM daily_record
             WHERE client_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC, level ASC, entity_id ASC",
        )?;
        let rows = stmt
            .query_map(params![client_id, from.to_string(), to.to_string()], |row| {
                let date: String = row.get(1)?;
                Ok(RawDailyRecord {
                    client_id:          row.get(0)?,
                    date:               NaiveDate::parse_from_str(&date, "%Y-%m-%d").ok(),
                    level:              row.get(2)?,
                    entity_id:          row.get(3)?,
                    name:               row.get(4)?,
                    parent_id:          row.get(5)?,
                    concept_id:         row.get(6)?,
                    spend:              row.get(7)?,
                    impressions:        row.get(8)?,
                    reach:              row.get(9)?,
                    clicks:             row.get(10)?,
                    landing_page_views: row.get(11)?,
                    conversions: ConversionCounts {
                        purchases:   row.get(12)?,
                        leads:       row.get(13)?,
                        chat_starts: row.get(14)?,
                        installs:    row.get(15)?,
                    },
                    conversion_value:     row.get(16)?,
                    video_views_3s:       row.get(17)?,
                    thruplays:            row.get(18)?,
                    engagements:          row.get(19)?,
                    days_active:          row.get(20)?,
                    days_since_last_edit: row.get(21)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Retention policy: delete a client's rows dated before `cutoff`.
    pub fn purge_records_before(&self, client_id: &str, cutoff: NaiveDate) -> EngineResult<usize> {
        let n = self.conn.execute(
            "DELETE FROM daily_record WHERE client_id = ?1 AND date < ?2",
            params![client_id, cutoff.to_string()],
        )?;
        if n > 0 {
            log::info!("client={client_id}: purged {n} records before {cutoff}");
        }
        Ok(n)
    }
}
