use super::PulseStore;
use crate::{
    config::{ClientProfile, EngineConfig},
    error::EngineResult,
};
use rusqlite::{params, OptionalExtension};

impl PulseStore {
    pub fn save_client_profile(&self, profile: &ClientProfile) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO client_profile (client_id, profile) VALUES (?1, ?2)
             ON CONFLICT(client_id) DO UPDATE SET profile = excluded.profile",
            params![profile.client_id, serde_json::to_string(profile)?],
        )?;
        Ok(())
    }

    pub fn load_client_profile(&self, client_id: &str) -> EngineResult<Option<ClientProfile>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT profile FROM client_profile WHERE client_id = ?1",
                params![client_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    pub fn save_engine_config(&self, client_id: &str, config: &EngineConfig) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO engine_config (client_id, config) VALUES (?1, ?2)
             ON CONFLICT(client_id) DO UPDATE SET config = excluded.config",
            params![client_id, serde_json::to_string(config)?],
        )?;
        Ok(())
    }

    /// `None` when the client has no stored document; callers fall back to
    /// `EngineConfig::or_default`.
    pub fn load_engine_config(&self, client_id: &str) -> EngineResult<Option<EngineConfig>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT config FROM engine_config WHERE client_id = ?1",
                params![client_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(json.map(|j| EngineConfig::from_json(&j)).transpose()?)
    }
}
