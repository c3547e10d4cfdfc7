//! Forward-only schema migrations.
//!
//! Each step is recorded in the `migrations` ledger table. A step checks the
//! live schema before altering it and runs inside a transaction together with
//! its ledger row, so re-running against an up-to-date database is a no-op.

use anyhow::{anyhow, Result};
use sqlx::{Pool, Row, Sqlite, Transaction};
use tracing::{debug, info};

pub struct Migration {
    pub id: i64,
    pub name: &'static str,
    /// (table, column, definition) triples added by this step
    columns: &'static [(&'static str, &'static str, &'static str)],
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        name: "add_deleted_flags",
        columns: &[
            ("snapshot_attempts", "deleted", "BOOLEAN NOT NULL DEFAULT 0"),
            ("target_results", "deleted", "BOOLEAN NOT NULL DEFAULT 0"),
        ],
    },
    Migration {
        id: 2,
        name: "add_attempt_persisted_flag",
        columns: &[("snapshot_attempts", "persisted", "BOOLEAN NOT NULL DEFAULT 0")],
    },
    Migration {
        id: 3,
        name: "add_target_persisted_flag",
        columns: &[("target_results", "persisted", "BOOLEAN NOT NULL DEFAULT 0")],
    },
];

pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    let applied = applied_migrations(pool).await?;

    for migration in MIGRATIONS {
        if applied.contains(&migration.id) {
            debug!("Migration {} ({}) already applied", migration.id, migration.name);
            continue;
        }

        info!("Applying migration {} ({})", migration.id, migration.name);
        let mut tx = pool.begin().await?;

        for (table, column, definition) in migration.columns {
            if column_exists(&mut tx, table, column).await? {
                debug!("Column {}.{} already present", table, column);
                continue;
            }
            let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition);
            sqlx::query(&sql).execute(&mut *tx).await.map_err(|e| {
                anyhow!(
                    "migration {} failed adding {}.{}: {}",
                    migration.name,
                    table,
                    column,
                    e
                )
            })?;
        }

        sqlx::query("INSERT INTO migrations (id, name) VALUES (?, ?)")
            .bind(migration.id)
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
    }

    Ok(())
}

/// Ids of the migrations recorded in the ledger, ascending
pub async fn applied_migrations(pool: &Pool<Sqlite>) -> Result<Vec<i64>> {
    let rows = sqlx::query("SELECT id FROM migrations ORDER BY id")
        .fetch_all(pool)
        .await?;

    let mut ids = Vec::with_capacity(rows.len());
    for row in rows {
        ids.push(row.try_get("id")?);
    }
    Ok(ids)
}

async fn column_exists(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    column: &str,
) -> Result<bool> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM pragma_table_info(?) WHERE name = ?")
        .bind(table)
        .bind(column)
        .fetch_one(&mut **tx)
        .await?;
    let count: i64 = row.try_get("n")?;
    Ok(count > 0)
}
