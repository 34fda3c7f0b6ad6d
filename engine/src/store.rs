//! State Store Adapter (C8): persists adventure snapshots to Postgres and
//! supports resumption lookup. A pure sink — never invokes the LLM gateway,
//! the image service, or any other core component.

use crate::config::Environment;
use crate::error::StoreError;
use crate::state::StateSnapshot;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Raw row shape as persisted.
pub struct StoredState {
    pub state_id: Uuid,
    pub snapshot: StateSnapshot,
    pub environment: Environment,
    pub client_uuid: String,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct StateStore {
    pool: PgPool,
}

impl StateStore {
    pub fn new(pool: PgPool) -> Self {
        StateStore { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await.map_err(StoreError::Database)?;
        Ok(StateStore { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../migrations").run(&self.pool).await.map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    /// Idempotent per `client_uuid` until `is_complete = true`: repeated
    /// calls for the same in-progress adventure update the same row rather
    /// than accumulating duplicates.
    pub async fn store(
        &self,
        state_id: Option<Uuid>,
        snapshot: &StateSnapshot,
        environment: Environment,
        client_uuid: &str,
        is_complete: bool,
    ) -> Result<Uuid, StoreError> {
        let id = state_id.unwrap_or_else(Uuid::new_v4);
        let payload = serde_json::to_value(snapshot).map_err(|e| StoreError::Unavailable(e.to_string()))?;

        sqlx::query(
            "INSERT INTO adventure_states (id, client_uuid, environment, snapshot, is_complete, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, now(), now())
             ON CONFLICT (id) DO UPDATE SET
                snapshot = EXCLUDED.snapshot,
                is_complete = EXCLUDED.is_complete,
                updated_at = now()",
        )
        .bind(id)
        .bind(client_uuid)
        .bind(environment.as_str())
        .bind(payload)
        .bind(is_complete)
        .execute(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(id)
    }

    pub async fn load(&self, state_id: Uuid) -> Result<StateSnapshot, StoreError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT snapshot FROM adventure_states WHERE id = $1")
                .bind(state_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::Database)?;

        let (payload,) = row.ok_or_else(|| StoreError::NotFound(state_id.to_string()))?;
        serde_json::from_value(payload).map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// Returns any not-yet-completed adventure for this client, enabling
    /// resumption.
    pub async fn active_for_client(&self, client_uuid: &str) -> Result<Option<Uuid>, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM adventure_states
             WHERE client_uuid = $1 AND is_complete = false
             ORDER BY updated_at DESC
             LIMIT 1",
        )
        .bind(client_uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(row.map(|(id,)| id))
    }
}
