//! Durable feedback store over MySQL. Thumbs-up interactions are copied here
//! with no expiry; thumbs-down turns leave a row in `negative_feedback` for
//! analysis. Each write is its own short transaction.

use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;

use crate::config::MysqlConfig;
use crate::interaction::Interaction;

#[derive(Clone)]
pub struct DurableStore {
    pool: Option<MySqlPool>,
}

impl DurableStore {
    /// Connect and run migrations. Without a password the store is disabled —
    /// feedback then lives only in the ephemeral log.
    pub async fn connect(config: &MysqlConfig) -> Self {
        if !config.is_configured() {
            tracing::warn!("MYSQL_PASSWORD not set, durable feedback store disabled");
            return Self { pool: None };
        }

        let pool = match MySqlPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url())
            .await
        {
            Ok(pool) => pool,
            Err(err) => {
                tracing::warn!(error = %err, "MySQL unavailable, durable feedback store disabled");
                return Self { pool: None };
            }
        };

        if let Err(err) = sqlx::migrate!("../migrations").run(&pool).await {
            tracing::error!(error = %err, "failed to run migrations, durable feedback store disabled");
            return Self { pool: None };
        }

        tracing::info!(
            host = %config.host,
            database = %config.database,
            "connected to MySQL durable store"
        );
        Self { pool: Some(pool) }
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }

    /// Upsert keyed on `interaction_id`: repeating a thumbs-up is a no-op
    /// apart from the feedback column refresh.
    pub async fn save_interaction(&self, interaction: &Interaction) -> Result<(), String> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };

        sqlx::query(
            "INSERT INTO interactions \
             (interaction_id, session_id, user_message, final_response, routing_type, \
              tools_used, tool_results, llm_payload, llm_response, debug_info, feedback, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE feedback = VALUES(feedback)",
        )
        .bind(&interaction.interaction_id)
        .bind(&interaction.session_id)
        .bind(&interaction.user_message)
        .bind(&interaction.final_response)
        .bind(interaction.routing_type.as_str())
        .bind(serde_json::to_string(&interaction.tools_used).ok())
        .bind(
            interaction
                .tool_results
                .as_ref()
                .and_then(|v| serde_json::to_string(v).ok()),
        )
        .bind(
            interaction
                .llm_payload
                .as_ref()
                .and_then(|v| serde_json::to_string(v).ok()),
        )
        .bind(&interaction.llm_response)
        .bind(
            interaction
                .debug_info
                .as_ref()
                .and_then(|v| serde_json::to_string(v).ok()),
        )
        .bind(interaction.feedback.as_str())
        .bind(interaction.created_at)
        .execute(pool)
        .await
        .map_err(|err| err.to_string())?;

        tracing::info!(interaction_id = %interaction.interaction_id, "saved interaction to durable store");
        Ok(())
    }

    pub async fn save_negative_feedback(
        &self,
        interaction: &Interaction,
        reason: &str,
    ) -> Result<(), String> {
        let Some(pool) = &self.pool else {
            return Ok(());
        };

        sqlx::query(
            "INSERT INTO negative_feedback \
             (interaction_id, session_id, user_message, final_response, routing_type, tools_used, reason) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&interaction.interaction_id)
        .bind(&interaction.session_id)
        .bind(&interaction.user_message)
        .bind(&interaction.final_response)
        .bind(interaction.routing_type.as_str())
        .bind(serde_json::to_string(&interaction.tools_used).ok())
        .bind(reason)
        .execute(pool)
        .await
        .map_err(|err| err.to_string())?;

        tracing::info!(interaction_id = %interaction.interaction_id, "recorded negative feedback");
        Ok(())
    }
}
