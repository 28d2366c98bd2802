//! PostgreSQL store adapter.
//!
//! Documents are stored as JSONB rows next to an integer version column; the
//! version column carries the optimistic concurrency check so a full
//! read-modify-write round trip is a single compare-and-swap UPDATE. Counter
//! operations on connections are single statements and never read first.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::lead::{InteractionKind, Lead, LeadColor, MAX_CALL_ATTEMPTS};
use crate::store::{ConnectionStore, LeadStore, TemplateStore};
use crate::templates::{MessageTemplate, TemplateChannel};
use crate::whatsapp::Connection;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS leads (
        id UUID PRIMARY KEY,
        cpf TEXT NOT NULL UNIQUE,
        data JSONB NOT NULL,
        version BIGINT NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS whatsapp_connections (
        id UUID PRIMARY KEY,
        data JSONB NOT NULL,
        version BIGINT NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS message_templates (
        id UUID PRIMARY KEY,
        data JSONB NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_leads_color ON leads ((data->>'color'))",
    "CREATE INDEX IF NOT EXISTS idx_leads_list ON leads ((data->>'list'))",
];

/// PostgreSQL implementation of every store port
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database with a bounded pool
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Create tables and indexes when they do not exist yet
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn decode_lead(data: serde_json::Value, version: i64) -> StoreResult<Lead> {
        let mut lead: Lead = serde_json::from_value(data)?;
        lead.version = version;
        Ok(lead)
    }

    fn decode_connection(data: serde_json::Value, version: i64) -> StoreResult<Connection> {
        let mut conn: Connection = serde_json::from_value(data)?;
        conn.version = version;
        Ok(conn)
    }
}

#[async_trait]
impl LeadStore for PgStore {
    async fn insert(&self, lead: &Lead) -> StoreResult<()> {
        let doc = serde_json::to_value(lead)?;
        let result = sqlx::query("INSERT INTO leads (id, cpf, data, version) VALUES ($1, $2, $3, $4)")
            .bind(lead.id)
            .bind(&lead.cpf)
            .bind(doc)
            .bind(lead.version)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
                Err(StoreError::Duplicate(lead.cpf.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Lead>> {
        let row = sqlx::query_as::<_, (serde_json::Value, i64)>(
            "SELECT data, version FROM leads WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(data, version)| Self::decode_lead(data, version))
            .transpose()
    }

    async fn find_by_cpf(&self, cpf: &str) -> StoreResult<Option<Lead>> {
        let row = sqlx::query_as::<_, (serde_json::Value, i64)>(
            "SELECT data, version FROM leads WHERE cpf = $1",
        )
        .bind(cpf)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(data, version)| Self::decode_lead(data, version))
            .transpose()
    }

    async fn update(&self, lead: &Lead) -> StoreResult<Lead> {
        let mut next = lead.clone();
        next.version = lead.version + 1;
        next.updated_at = Utc::now();
        let doc = serde_json::to_value(&next)?;

        let rows = sqlx::query(
            "UPDATE leads SET data = $1, version = $2 WHERE id = $3 AND version = $4",
        )
        .bind(doc)
        .bind(next.version)
        .bind(lead.id)
        .bind(lead.version)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM leads WHERE id = $1")
                .bind(lead.id)
                .fetch_one(&self.pool)
                .await?;
            if exists == 0 {
                return Err(StoreError::NotFound(lead.id));
            }
            return Err(StoreError::VersionConflict {
                id: lead.id,
                expected: lead.version,
            });
        }

        Ok(next)
    }

    async fn find_due_for_call(&self, now: DateTime<Utc>, limit: usize) -> StoreResult<Vec<Lead>> {
        let rows = sqlx::query_as::<_, (serde_json::Value, i64)>(
            r#"
            SELECT data, version FROM leads
            WHERE (data->>'blocked')::boolean = false
              AND data->>'color' NOT IN ('paid', 'complaint', 'expired')
              AND (data->>'total_call_attempts')::int < $1
              AND (
                    (data->>'next_call_at' IS NULL AND (data->>'total_call_attempts')::int = 0)
                 OR (data->>'next_call_at')::timestamptz <= $2
              )
            ORDER BY data->>'list' ASC,
                     (data->>'next_call_at')::timestamptz ASC NULLS FIRST,
                     (data->>'created_at')::timestamptz ASC
            LIMIT $3
            "#,
        )
        .bind(MAX_CALL_ATTEMPTS as i32)
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(data, version)| Self::decode_lead(data, version))
            .collect()
    }

    async fn find_expired_proposals(&self, now: DateTime<Utc>) -> StoreResult<Vec<Lead>> {
        let rows = sqlx::query_as::<_, (serde_json::Value, i64)>(
            r#"
            SELECT data, version FROM leads
            WHERE data->>'proposal_status' = 'pending'
              AND (data->>'proposal_expires_at')::timestamptz < $1
              AND data->>'color' != 'expired'
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(data, version)| Self::decode_lead(data, version))
            .collect()
    }

    async fn count_by_color(&self) -> StoreResult<HashMap<LeadColor, i64>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT data->>'color', COUNT(*) FROM leads GROUP BY 1",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for (name, count) in rows {
            match LeadColor::parse(&name) {
                Some(color) => {
                    counts.insert(color, count);
                }
                None => tracing::warn!(color = %name, "skipping unknown color in stats"),
            }
        }
        Ok(counts)
    }

    async fn cost_by_kind(&self) -> StoreResult<HashMap<InteractionKind, f64>> {
        let rows = sqlx::query_as::<_, (String, f64)>(
            r#"
            SELECT i->>'kind', SUM((i->>'cost')::float8)::float8
            FROM leads, jsonb_array_elements(data->'interactions') AS i
            WHERE (i->>'cost')::float8 > 0
            GROUP BY 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut totals = HashMap::new();
        for (name, total) in rows {
            match InteractionKind::parse(&name) {
                Some(kind) => {
                    totals.insert(kind, total);
                }
                None => tracing::warn!(kind = %name, "skipping unknown interaction kind in summary"),
            }
        }
        Ok(totals)
    }

    async fn count(&self) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM leads")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ConnectionStore for PgStore {
    async fn insert(&self, connection: &Connection) -> StoreResult<()> {
        let doc = serde_json::to_value(connection)?;
        sqlx::query("INSERT INTO whatsapp_connections (id, data, version) VALUES ($1, $2, $3)")
            .bind(connection.id)
            .bind(doc)
            .bind(connection.version)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Connection>> {
        let row = sqlx::query_as::<_, (serde_json::Value, i64)>(
            "SELECT data, version FROM whatsapp_connections WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(data, version)| Self::decode_connection(data, version))
            .transpose()
    }

    async fn count(&self) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM whatsapp_connections")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn pick_least_loaded(&self) -> StoreResult<Option<Connection>> {
        let row = sqlx::query_as::<_, (serde_json::Value, i64)>(
            r#"
            SELECT data, version FROM whatsapp_connections
            WHERE data->>'status' = 'active'
              AND (data->>'daily_messages_sent')::int < (data->>'daily_limit')::int
            ORDER BY (data->>'daily_messages_sent')::int ASC,
                     (data->>'connection_number')::int ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(data, version)| Self::decode_connection(data, version))
            .transpose()
    }

    async fn record_send(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<Option<Connection>> {
        // Single-statement increment-if-below-limit; losing the race simply
        // matches no row.
        let row = sqlx::query_as::<_, (serde_json::Value, i64)>(
            r#"
            UPDATE whatsapp_connections
            SET data = data || jsonb_build_object(
                    'daily_messages_sent', (data->>'daily_messages_sent')::int + 1,
                    'total_messages_sent', (data->>'total_messages_sent')::bigint + 1,
                    'last_message_at', to_jsonb($2::timestamptz),
                    'updated_at', to_jsonb($2::timestamptz),
                    'version', version + 1
                ),
                version = version + 1
            WHERE id = $1
              AND data->>'status' = 'active'
              AND (data->>'daily_messages_sent')::int < (data->>'daily_limit')::int
            RETURNING data, version
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(data, version)| Self::decode_connection(data, version))
            .transpose()
    }

    async fn assign_lead(&self, id: Uuid, lead_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE whatsapp_connections
            SET data = jsonb_set(
                    data,
                    '{assigned_leads}',
                    COALESCE(data->'assigned_leads', '[]'::jsonb) || to_jsonb($2::text)
                ),
                version = version + 1
            WHERE id = $1
              AND NOT COALESCE(data->'assigned_leads', '[]'::jsonb) @> to_jsonb($2::text)
            "#,
        )
        .bind(id)
        .bind(lead_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_daily_counters(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let rows = sqlx::query(
            r#"
            UPDATE whatsapp_connections
            SET data = data || jsonb_build_object(
                    'daily_messages_sent', 0,
                    'last_reset_at', to_jsonb($1::timestamptz),
                    'updated_at', to_jsonb($1::timestamptz),
                    'version', version + 1
                ),
                version = version + 1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows)
    }
}

#[async_trait]
impl TemplateStore for PgStore {
    async fn insert(&self, template: &MessageTemplate) -> StoreResult<()> {
        let doc = serde_json::to_value(template)?;
        sqlx::query("INSERT INTO message_templates (id, data) VALUES ($1, $2)")
            .bind(template.id)
            .bind(doc)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn active_for_channel(
        &self,
        channel: TemplateChannel,
    ) -> StoreResult<Vec<MessageTemplate>> {
        let rows = sqlx::query_scalar::<_, serde_json::Value>(
            r#"
            SELECT data FROM message_templates
            WHERE data->>'channel' = $1 AND (data->>'active')::boolean = true
            "#,
        )
        .bind(channel.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|data| serde_json::from_value(data).map_err(StoreError::from))
            .collect()
    }

    async fn count(&self) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM message_templates")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
