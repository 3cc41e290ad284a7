use super::PulseStore;
use crate::{
    alert_rules::{alert_order, Alert, Severity},
    bundle::BundleKind,
    error::EngineResult,
};
use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use std::collections::HashSet;

fn severity_rank(s: Severity) -> i64 {
    match s {
        Severity::Info => 0,
        Severity::Warning => 1,
        Severity::Critical => 2,
    }
}

impl PulseStore {
    // ── Bundles ────────────────────────────────────────────────

    /// Upsert keyed by (client, date, kind); a re-run overwrites.
    pub fn save_bundle(
        &self,
        client_id: &str,
        reference_date: NaiveDate,
        kind: BundleKind,
        payload: &str,
        serialized_bytes: usize,
    ) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO output_bundle (client_id, reference_date, kind, payload, serialized_bytes)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(client_id, reference_date, kind)
             DO UPDATE SET payload = excluded.payload, serialized_bytes = excluded.serialized_bytes",
            params![client_id, reference_date.to_string(), kind.as_str(), payload, serialized_bytes as i64],
        )?;
        Ok(())
    }

    pub fn load_bundle(
        &self,
        client_id: &str,
        reference_date: NaiveDate,
        kind: BundleKind,
    ) -> EngineResult<Option<String>> {
        let payload = self
            .conn
            .query_row(
                "SELECT payload FROM output_bundle
                 WHERE client_id = ?1 AND reference_date = ?2 AND kind = ?3",
                params![client_id, reference_date.to_string(), kind.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    // ── Alerts ─────────────────────────────────────────────────

    /// Replace the client's alert snapshot in one transaction: upsert every
    /// new alert by (client, level, entity, type), then delete keys that are no
    /// longer present. Readers see the old set or the new one, never an
    /// empty table in between.
    pub fn replace_alerts(&self, client_id: &str, alerts: &[Alert]) -> EngineResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        let mut keep: HashSet<(String, String, String)> = HashSet::new();
        for a in alerts {
            tx.execute(
                "INSERT INTO alert (
                    client_id, level, entity_id, alert_type, alert_id, severity,
                    severity_rank, impact_score, payload, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(client_id, level, entity_id, alert_type) DO UPDATE SET
                    alert_id = excluded.alert_id,
                    severity = excluded.severity,
                    severity_rank = excluded.severity_rank,
                    impact_score = excluded.impact_score,
                    payload = excluded.payload,
                    created_at = excluded.created_at",
                params![
                    client_id,
                    a.level.as_str(),
                    a.entity_id,
                    a.alert_type.as_str(),
                    a.id.to_string(),
                    a.severity.to_string(),
                    severity_rank(a.severity),
                    a.impact_score,
                    serde_json::to_string(a)?,
                    a.created_at.to_rfc3339(),
                ],
            )?;
            keep.insert((a.level.as_str().to_string(), a.entity_id.clone(), a.alert_type.as_str().to_string()));
        }

        let existing: Vec<(String, String, String)> = {
            let mut stmt = tx.prepare("SELECT level, entity_id, alert_type FROM alert WHERE client_id = ?1")?;
            let rows = stmt
                .query_map(params![client_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        let mut removed = 0usize;
        for key in existing.iter().filter(|k| !keep.contains(*k)) {
            removed += tx.execute(
                "DELETE FROM alert
                 WHERE client_id = ?1 AND level = ?2 AND entity_id = ?3 AND alert_type = ?4",
                params![client_id, key.0, key.1, key.2],
            )?;
        }

        tx.commit()?;
        log::debug!("client={client_id}: alert snapshot {} upserted, {removed} removed", alerts.len());
        Ok(())
    }

    /// Current snapshot, most severe and most impactful first.
    pub fn alerts_for_client(&self, client_id: &str) -> EngineResult<Vec<Alert>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM alert WHERE client_id = ?1
             ORDER BY severity_rank DESC, impact_score DESC, entity_id ASC, alert_type ASC",
        )?;
        let payloads = stmt
            .query_map(params![client_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut alerts = Vec::with_capacity(payloads.len());
        for p in payloads {
            alerts.push(serde_json::from_str(&p)?);
        }
        alerts.sort_by(alert_order);
        Ok(alerts)
    }
}
