use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool, Postgres, Transaction,
};
use uuid::Uuid;

use crate::config::ServiceConfig;

/// Pool sizing for the request-handler fleet. Acquisition is kept short so a
/// saturated pool fails the request instead of queueing it indefinitely.
const MAX_CONNECTIONS: u32 = 20;
const IDLE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
const ACQUIRE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

/// Default timeout for individual queries.
/// Prevents hung queries from blocking a handler indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkItemRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[sqlx(rename = "type")]
    pub item_type: String,
    pub title: String,
    pub status: String,
    pub estimated_duration_days: Option<i32>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EdgeRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub from_id: Uuid,
    pub to_id: Uuid,
    pub dependency_type: String,
    pub lag_days: i32,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(config: &ServiceConfig) -> Result<Self> {
        let pool_opts = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .idle_timeout(IDLE_TIMEOUT)
            .acquire_timeout(ACQUIRE_TIMEOUT);

        let pool = if let Some(url) = &config.database_url {
            pool_opts.connect(url).await?
        } else {
            let mut opts = PgConnectOptions::new()
                .host(&config.db_host)
                .port(config.db_port)
                .database(&config.db_name)
                .username(&config.db_user);
            if let Some(password) = &config.db_password {
                opts = opts.password(password);
            }
            pool_opts.connect_with(opts).await?
        };

        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Wrap an already-connected pool (integration tests).
    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    async fn migrate(pool: &PgPool) -> Result<()> {
        for sql in [include_str!("migrations/001_init.sql")] {
            for stmt in sql.split(';') {
                let stmt = stmt.trim();
                if !stmt.is_empty() {
                    sqlx::query(stmt).execute(pool).await?;
                }
            }
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ─── Reads (outside any mutation) ───────────────────────────────────────

    /// Work items for a tenant; when `filter` is given, only items whose id
    /// is in the set.
    pub async fn list_work_items(
        &self,
        tenant_id: Uuid,
        filter: Option<&[Uuid]>,
    ) -> Result<Vec<WorkItemRow>> {
        with_timeout(async {
            let rows = match filter {
                Some(ids) => {
                    sqlx::query_as(
                        "SELECT id, tenant_id, type, title, status, estimated_duration_days
                         FROM work_items WHERE tenant_id = $1 AND id = ANY($2) ORDER BY id",
                    )
                    .bind(tenant_id)
                    .bind(ids)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as(
                        "SELECT id, tenant_id, type, title, status, estimated_duration_days
                         FROM work_items WHERE tenant_id = $1 ORDER BY id",
                    )
                    .bind(tenant_id)
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            Ok(rows)
        })
        .await
    }

    /// Edges for a tenant; when `filter` is given, edges touching the set on
    /// either endpoint. Callers building a graph must drop edges whose other
    /// endpoint falls outside the node set.
    pub async fn list_edges(&self, tenant_id: Uuid, filter: Option<&[Uuid]>) -> Result<Vec<EdgeRow>> {
        with_timeout(async {
            let rows = match filter {
                Some(ids) => {
                    sqlx::query_as(
                        "SELECT * FROM dependency_edges
                         WHERE tenant_id = $1 AND (from_id = ANY($2) OR to_id = ANY($2))
                         ORDER BY id",
                    )
                    .bind(tenant_id)
                    .bind(ids)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as(
                        "SELECT * FROM dependency_edges WHERE tenant_id = $1 ORDER BY id",
                    )
                    .bind(tenant_id)
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            Ok(rows)
        })
        .await
    }

    pub async fn get_edge(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<EdgeRow>> {
        with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM dependency_edges WHERE tenant_id = $1 AND id = $2")
                    .bind(tenant_id)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?,
            )
        })
        .await
    }

    // ─── Mutations ──────────────────────────────────────────────────────────

    /// Open a mutation transaction holding the per-tenant advisory lock.
    ///
    /// The lock serialises concurrent edge mutations within one tenant so two
    /// inserts that each pass their cycle check cannot jointly close a cycle.
    /// It is released automatically at commit or rollback.
    pub async fn begin_mutation(&self, tenant_id: Uuid) -> Result<MutationTx> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(tenant_lock_key(tenant_id))
            .execute(&mut *tx)
            .await?;
        Ok(MutationTx { tx, tenant_id })
    }
}

/// Advisory lock key: the first eight bytes of the tenant uuid. Collisions
/// between tenants only over-serialise; they never under-lock.
fn tenant_lock_key(tenant_id: Uuid) -> i64 {
    let bytes = tenant_id.as_bytes();
    i64::from_be_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// One edge mutation: every statement runs on the same connection inside the
/// advisory-locked transaction. Dropping the value rolls everything back.
pub struct MutationTx {
    tx: Transaction<'static, Postgres>,
    tenant_id: Uuid,
}

impl MutationTx {
    /// Of `ids`, the ones that do NOT exist in this tenant.
    pub async fn missing_work_items(&mut self, ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let found: Vec<(Uuid,)> = with_timeout(async {
            Ok(
                sqlx::query_as("SELECT id FROM work_items WHERE tenant_id = $1 AND id = ANY($2)")
                    .bind(self.tenant_id)
                    .bind(ids)
                    .fetch_all(&mut *self.tx)
                    .await?,
            )
        })
        .await?;
        let found: std::collections::HashSet<Uuid> = found.into_iter().map(|(id,)| id).collect();
        let mut missing = Vec::new();
        for id in ids {
            if !found.contains(id) && !missing.contains(id) {
                missing.push(*id);
            }
        }
        Ok(missing)
    }

    /// All stored edges leaving any node in `from_ids`, as (from, to) pairs.
    /// One query per frontier level of the cycle probe.
    pub async fn successor_edges(&mut self, from_ids: &[Uuid]) -> Result<Vec<(Uuid, Uuid)>> {
        with_timeout(async {
            let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
                "SELECT from_id, to_id FROM dependency_edges
                 WHERE tenant_id = $1 AND from_id = ANY($2)
                 ORDER BY from_id, to_id",
            )
            .bind(self.tenant_id)
            .bind(from_ids)
            .fetch_all(&mut *self.tx)
            .await?;
            Ok(rows)
        })
        .await
    }

    pub async fn edge_between(&mut self, from_id: Uuid, to_id: Uuid) -> Result<Option<EdgeRow>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM dependency_edges
                 WHERE tenant_id = $1 AND from_id = $2 AND to_id = $3",
            )
            .bind(self.tenant_id)
            .bind(from_id)
            .bind(to_id)
            .fetch_optional(&mut *self.tx)
            .await?)
        })
        .await
    }

    pub async fn get_edge(&mut self, id: Uuid) -> Result<Option<EdgeRow>> {
        with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM dependency_edges WHERE tenant_id = $1 AND id = $2")
                    .bind(self.tenant_id)
                    .bind(id)
                    .fetch_optional(&mut *self.tx)
                    .await?,
            )
        })
        .await
    }

    pub async fn insert_edge(&mut self, edge: &EdgeRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO dependency_edges
               (id, tenant_id, from_id, to_id, dependency_type, lag_days,
                created_at, created_by, updated_at, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(edge.id)
        .bind(edge.tenant_id)
        .bind(edge.from_id)
        .bind(edge.to_id)
        .bind(&edge.dependency_type)
        .bind(edge.lag_days)
        .bind(edge.created_at)
        .bind(edge.created_by)
        .bind(edge.updated_at)
        .bind(&edge.metadata)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn update_edge(&mut self, edge: &EdgeRow) -> Result<()> {
        sqlx::query(
            "UPDATE dependency_edges
             SET dependency_type = $1, lag_days = $2, metadata = $3, updated_at = $4
             WHERE tenant_id = $5 AND id = $6",
        )
        .bind(&edge.dependency_type)
        .bind(edge.lag_days)
        .bind(&edge.metadata)
        .bind(edge.updated_at)
        .bind(self.tenant_id)
        .bind(edge.id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn delete_edge(&mut self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM dependency_edges WHERE tenant_id = $1 AND id = $2")
            .bind(self.tenant_id)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
