use super::EnergyStore;
use crate::config::PostgresConfig;
use crate::error::StoreError;
use crate::model::{BranchEnergyRow, MainEnergyRow, Table};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub type DbPool = Pool<Postgres>;

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub async fn connect(cfg: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(connect_options(cfg)?)
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(Self { pool })
    }
}

fn connect_options(cfg: &PostgresConfig) -> Result<PgConnectOptions, StoreError> {
    if let Some(url) = &cfg.url {
        return Ok(PgConnectOptions::from_str(url)?);
    }
    let mut opts = PgConnectOptions::new().port(cfg.port);
    if let Some(host) = &cfg.host {
        opts = opts.host(host);
    }
    if let Some(user) = &cfg.user {
        opts = opts.username(user);
    }
    if let Some(password) = &cfg.password {
        opts = opts.password(password);
    }
    if let Some(db) = &cfg.database {
        opts = opts.database(db);
    }
    Ok(opts)
}

/// `INSERT INTO t (a, b) VALUES ($1, $2), ($3, $4)` for `rows` tuples.
pub(crate) fn insert_sql(table: Table, columns: &[&str], rows: usize) -> String {
    let cols_per_row = columns.len();
    let mut values_placeholders: Vec<String> = Vec::with_capacity(rows);
    let mut arg_index = 1;
    for _ in 0..rows {
        let mut tuple = Vec::with_capacity(cols_per_row);
        for _ in 0..cols_per_row {
            tuple.push(format!("${}", arg_index));
            arg_index += 1;
        }
        values_placeholders.push(format!("({})", tuple.join(", ")));
    }
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        columns.join(", "),
        values_placeholders.join(", ")
    )
}

#[async_trait]
impl EnergyStore for PgStore {
    async fn insert_main(&self, row: &MainEnergyRow) -> Result<(), StoreError> {
        let sql = insert_sql(Table::Main, &MainEnergyRow::COLUMNS, 1);
        sqlx::query(&sql)
            .bind(row.time)
            .bind(&row.relay_state)
            .bind(row.main_meter_produced_energy_wh)
            .bind(row.main_meter_consumed_energy_wh)
            .bind(row.instant_grid_power_w)
            .bind(row.feed_through_power_w)
            .bind(row.feed_through_produced_energy_wh)
            .bind(row.feed_through_consumed_energy_wh)
            .bind(row.grid_sample_start_ms)
            .bind(row.grid_sample_end_ms)
            .bind(&row.dsm_grid_state)
            .bind(&row.dsm_state)
            .bind(&row.current_run_config)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_branches(&self, rows: &[BranchEnergyRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let sql = insert_sql(Table::Branch, &BranchEnergyRow::COLUMNS, rows.len());
        let mut q = sqlx::query(&sql);
        for r in rows {
            q = q
                .bind(r.time)
                .bind(r.branch_id)
                .bind(&r.relay_state)
                .bind(r.instant_power_w)
                .bind(r.imported_active_energy_wh)
                .bind(r.exported_active_energy_wh)
                .bind(r.measure_start_ts_ms)
                .bind(r.measure_duration_ms)
                .bind(r.is_measure_valid);
        }
        let done = q.execute(&self.pool).await?;
        debug!(table = %Table::Branch, count = done.rows_affected(), "branch rows inserted");
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
