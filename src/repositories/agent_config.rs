use diesel::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;
use crate::{
    models::records::{AgentConfigRow, NewAgentConfigRow},
    repositories::call_history::epoch_now,
    DbPool,
};

const DEFAULT_NAME: &str = "LokMitra";
const DEFAULT_DESCRIPTION: &str = "LokMitra is an AI voice agent serving the public to help \
    people through voice interactions and knowledge access.";

/// The single agent configuration row. `tool_settings` maps a vapi tool id to
/// `{"enabled": bool}`; tools without an entry are treated as enabled.
#[derive(Debug, Clone, Serialize)]
pub struct AgentConfig {
    pub name: String,
    pub description: String,
    pub tool_settings: Map<String, Value>,
    pub updated_at: i32,
}

impl AgentConfig {
    pub fn is_tool_enabled(&self, tool_id: &str) -> bool {
        self.tool_settings
            .get(tool_id)
            .and_then(|entry| entry.get("enabled"))
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}

fn parse_config(row: AgentConfigRow) -> AgentConfig {
    let tool_settings = serde_json::from_str(&row.tool_settings_json).unwrap_or_else(|e| {
        warn!("Bad tool_settings_json, resetting: {}", e);
        Map::new()
    });
    AgentConfig {
        name: row.name,
        description: row.description,
        tool_settings,
        updated_at: row.updated_at,
    }
}

pub struct AgentConfigRepository {
    pool: DbPool,
}

impl AgentConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get-or-create the singleton row (id is always 1).
    pub fn get(&self) -> Result<AgentConfig, diesel::result::Error> {
        use crate::schema::agent_configurations::dsl::*;
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        let existing: Option<AgentConfigRow> = agent_configurations
            .find(1)
            .select(AgentConfigRow::as_select())
            .first(&mut conn)
            .optional()?;

        if let Some(row) = existing {
            return Ok(parse_config(row));
        }

        let defaults = NewAgentConfigRow {
            id: 1,
            name: DEFAULT_NAME.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            tool_settings_json: "{}".to_string(),
            updated_at: epoch_now(),
        };
        diesel::insert_into(crate::schema::agent_configurations::table)
            .values(&defaults)
            .execute(&mut conn)?;

        agent_configurations
            .find(1)
            .select(AgentConfigRow::as_select())
            .first(&mut conn)
            .map(parse_config)
    }

    /// Partial update. `tool_settings` entries are merged into the existing
    /// map rather than replacing it, so toggling one tool never drops the
    /// stored state of the others.
    pub fn update(
        &self,
        new_name: Option<&str>,
        new_description: Option<&str>,
        settings_patch: Option<&Map<String, Value>>,
    ) -> Result<AgentConfig, diesel::result::Error> {
        use crate::schema::agent_configurations::dsl::*;

        let mut config = self.get()?;
        if let Some(value) = new_name {
            config.name = value.trim().to_string();
        }
        if let Some(value) = new_description {
            config.description = value.trim().to_string();
        }
        if let Some(patch) = settings_patch {
            for (key, value) in patch {
                config.tool_settings.insert(key.clone(), value.clone());
            }
        }

        let mut conn = self.pool.get().expect("Failed to get DB connection");
        let now = epoch_now();
        diesel::update(agent_configurations.find(1))
            .set((
                name.eq(&config.name),
                description.eq(&config.description),
                tool_settings_json.eq(serde_json::to_string(&config.tool_settings)
                    .unwrap_or_else(|_| "{}".into())),
                updated_at.eq(now),
            ))
            .execute(&mut conn)?;

        config.updated_at = now;
        Ok(config)
    }

    pub fn set_tool_enabled(
        &self,
        tool_id: &str,
        enabled: bool,
    ) -> Result<AgentConfig, diesel::result::Error> {
        let mut patch = Map::new();
        patch.insert(
            tool_id.to_string(),
            serde_json::json!({ "enabled": enabled }),
        );
        self.update(None, None, Some(&patch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::r2d2::ConnectionManager;
    use diesel_migrations::MigrationHarness;
    use serde_json::json;

    fn test_repository() -> AgentConfigRepository {
        // One pooled connection so every call sees the same in-memory DB.
        let manager = ConnectionManager::<diesel::SqliteConnection>::new(":memory:");
        let pool = diesel::r2d2::Pool::builder()
            .max_size(1)
            .build(manager)
            .expect("in-memory pool");
        pool.get()
            .expect("in-memory connection")
            .run_pending_migrations(crate::MIGRATIONS)
            .expect("migrations");
        AgentConfigRepository::new(pool)
    }

    #[test]
    fn get_creates_the_singleton_with_defaults() {
        let repo = test_repository();
        let config = repo.get().unwrap();
        assert_eq!(config.name, DEFAULT_NAME);
        assert!(config.tool_settings.is_empty());
    }

    #[test]
    fn settings_patch_merges_instead_of_replacing() {
        let repo = test_repository();
        repo.set_tool_enabled("tool-a", false).unwrap();

        let mut patch = Map::new();
        patch.insert("tool-b".to_string(), json!({"enabled": false}));
        let config = repo.update(None, None, Some(&patch)).unwrap();

        // The earlier tool-a entry survives the tool-b patch.
        assert!(!config.is_tool_enabled("tool-a"));
        assert!(!config.is_tool_enabled("tool-b"));

        let stored = repo.get().unwrap();
        assert!(!stored.is_tool_enabled("tool-a"));
        assert!(!stored.is_tool_enabled("tool-b"));
    }

    #[test]
    fn set_tool_enabled_round_trips() {
        let repo = test_repository();
        repo.set_tool_enabled("tool-a", false).unwrap();
        assert!(!repo.get().unwrap().is_tool_enabled("tool-a"));

        repo.set_tool_enabled("tool-a", true).unwrap();
        assert!(repo.get().unwrap().is_tool_enabled("tool-a"));
    }

    #[test]
    fn name_update_leaves_tool_settings_alone() {
        let repo = test_repository();
        repo.set_tool_enabled("tool-a", false).unwrap();

        let config = repo.update(Some("  Seva  "), None, None).unwrap();
        assert_eq!(config.name, "Seva");
        assert!(!config.is_tool_enabled("tool-a"));
    }

    fn config_with(settings: Value) -> AgentConfig {
        AgentConfig {
            name: "LokMitra".into(),
            description: "test".into(),
            tool_settings: settings.as_object().cloned().unwrap_or_default(),
            updated_at: 0,
        }
    }

    #[test]
    fn tools_default_to_enabled() {
        let config = config_with(json!({}));
        assert!(config.is_tool_enabled("tool-a"));
    }

    #[test]
    fn disabled_flag_is_honored() {
        let config = config_with(json!({
            "tool-a": {"enabled": false},
            "tool-b": {"enabled": true},
        }));
        assert!(!config.is_tool_enabled("tool-a"));
        assert!(config.is_tool_enabled("tool-b"));
    }

    #[test]
    fn malformed_entry_falls_back_to_enabled() {
        let config = config_with(json!({"tool-a": {"enabled": "yes"}}));
        assert!(config.is_tool_enabled("tool-a"));
    }
}
