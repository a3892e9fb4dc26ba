//! PostgreSQL backend for the RemoteStore trait.
//!
//! Each entity kind lives in its own table with the record kept whole in a
//! JSONB `data` column. Filter conditions are rendered against that column.

use async_trait::async_trait;
use deadpool_postgres::{Pool, PoolConfig, Runtime};
use rust_decimal::Decimal;
use tokio_postgres::NoTls;
use tokio_postgres::types::ToSql;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::db::{RemoteQuery, RemoteStore, StoredRow};
use crate::error::DatabaseError;
use crate::records::{Condition, EntityKind, LIST_SEPARATOR, SearchField};

const ROW_COLUMNS: &str = "id, user_id, data, created_at, updated_at";

/// PostgreSQL remote store.
pub struct PgBackend {
    pool: Pool,
}

impl PgBackend {
    /// Build a connection pool. No connection is opened until first use.
    pub fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let mut cfg = deadpool_postgres::Config::new();
        cfg.url = Some(config.url().to_string());
        cfg.pool = Some(PoolConfig::new(config.pool_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Create the per-kind tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.pool.get().await?;
        for kind in [EntityKind::Lead, EntityKind::Deal, EntityKind::Document] {
            let table = kind.table();
            conn.batch_execute(&format!(
                "CREATE TABLE IF NOT EXISTS {table} ( \
                     id UUID PRIMARY KEY, \
                     user_id TEXT, \
                     data JSONB NOT NULL, \
                     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
                     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW() \
                 ); \
                 CREATE INDEX IF NOT EXISTS {table}_user_created_idx \
                     ON {table} (user_id, created_at DESC);"
            ))
            .await?;
        }
        tracing::debug!("Remote schema ready");
        Ok(())
    }
}

/// Owned query parameter.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlParam {
    Text(String),
    Numeric(Decimal),
    Id(Uuid),
}

impl SqlParam {
    fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            Self::Text(value) => value,
            Self::Numeric(value) => value,
            Self::Id(value) => value,
        }
    }
}

/// Escape `%`, `_` and `\` so a search term matches literally inside ILIKE.
pub(crate) fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn search_expr(field: SearchField) -> String {
    match field {
        SearchField::Text(name) => format!("coalesce(data->>'{name}', '')"),
        SearchField::List(name) => format!(
            "array_to_string(ARRAY(SELECT jsonb_array_elements_text(coalesce(data->'{name}', '[]'::jsonb))), '{LIST_SEPARATOR}')"
        ),
    }
}

/// Render the WHERE clause of `query`, numbering parameters from `$start`.
///
/// Returns an empty clause when nothing constrains the query.
pub(crate) fn render_where(query: &RemoteQuery, start: usize) -> (String, Vec<SqlParam>) {
    let mut clauses = Vec::new();
    let mut params = Vec::new();
    let next = |param: SqlParam, params: &mut Vec<SqlParam>| {
        params.push(param);
        format!("${}", start + params.len() - 1)
    };

    if let Some(id) = query.id {
        let p = next(SqlParam::Id(id), &mut params);
        clauses.push(format!("id = {p}"));
    }
    if let Some(owner) = &query.owner {
        let p = next(SqlParam::Text(owner.clone()), &mut params);
        clauses.push(format!("user_id = {p}"));
    }
    for condition in &query.conditions {
        match condition {
            Condition::Equals { field, value } => {
                let p = next(SqlParam::Text(value.clone()), &mut params);
                clauses.push(format!("data->>'{field}' = {p}"));
            }
            Condition::Contains { fields, term } => {
                let p = next(
                    SqlParam::Text(format!("%{}%", escape_like(term))),
                    &mut params,
                );
                let any = fields
                    .iter()
                    .map(|field| format!("{} ILIKE {p}", search_expr(*field)))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                clauses.push(format!("({any})"));
            }
            Condition::AtLeast { field, bound } => {
                let p = next(SqlParam::Numeric(*bound), &mut params);
                clauses.push(format!("(data->>'{field}')::numeric >= {p}"));
            }
            Condition::AtMost { field, bound } => {
                let p = next(SqlParam::Numeric(*bound), &mut params);
                clauses.push(format!("(data->>'{field}')::numeric <= {p}"));
            }
        }
    }

    if clauses.is_empty() {
        (String::new(), params)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), params)
    }
}

fn param_refs(params: &[SqlParam]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(SqlParam::as_sql).collect()
}

fn row_to_stored_row(row: &tokio_postgres::Row) -> StoredRow {
    StoredRow {
        id: row.get("id"),
        owner: row.get("user_id"),
        data: row.get("data"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl RemoteStore for PgBackend {
    async fn fetch(&self, query: &RemoteQuery) -> Result<Vec<StoredRow>, DatabaseError> {
        let conn = self.pool.get().await?;
        let (where_sql, params) = render_where(query, 1);
        let sql = format!(
            "SELECT {ROW_COLUMNS} FROM {}{where_sql} ORDER BY created_at DESC",
            query.kind.table()
        );
        let rows = conn.query(&sql, &param_refs(&params)).await?;
        Ok(rows.iter().map(row_to_stored_row).collect())
    }

    async fn insert(&self, kind: EntityKind, row: &StoredRow) -> Result<(), DatabaseError> {
        let conn = self.pool.get().await?;
        conn.execute(
            &format!(
                "INSERT INTO {} ({ROW_COLUMNS}) VALUES ($1, $2, $3, $4, $5)",
                kind.table()
            ),
            &[
                &row.id,
                &row.owner,
                &row.data,
                &row.created_at,
                &row.updated_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn replace(&self, query: &RemoteQuery, row: &StoredRow) -> Result<u64, DatabaseError> {
        let conn = self.pool.get().await?;
        let (where_sql, params) = render_where(query, 3);
        let sql = format!(
            "UPDATE {} SET data = $1, updated_at = $2{where_sql}",
            query.kind.table()
        );
        let mut refs: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(params.len() + 2);
        refs.push(&row.data);
        refs.push(&row.updated_at);
        refs.extend(param_refs(&params));
        Ok(conn.execute(&sql, &refs).await?)
    }

    async fn remove(&self, query: &RemoteQuery) -> Result<u64, DatabaseError> {
        let conn = self.pool.get().await?;
        let (where_sql, params) = render_where(query, 1);
        let sql = format!("DELETE FROM {}{where_sql}", query.kind.table());
        Ok(conn.execute(&sql, &param_refs(&params)).await?)
    }
}
