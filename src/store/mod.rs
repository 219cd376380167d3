pub mod postgres;
pub mod postgrest;
mod writer;

use crate::config::StoreConfig;
use crate::error::{Result as CollectorResult, StoreError};
use crate::model::{BranchEnergyRow, MainEnergyRow};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use writer::{StoreWriteError, StoreWriter, WriteOutcome};

/// Insert-only access to the `main_energy` and `branch_energy` tables.
///
/// Each call is a single statement, so a failed insert leaves nothing behind
/// in that table.
#[async_trait]
pub trait EnergyStore: Send + Sync {
    async fn insert_main(&self, row: &MainEnergyRow) -> Result<(), StoreError>;

    async fn insert_branches(&self, rows: &[BranchEnergyRow]) -> Result<(), StoreError>;

    /// Release the underlying connection.
    async fn close(&self) {}
}

/// Open the configured backend once for the lifetime of the process.
pub async fn connect(
    cfg: &StoreConfig,
    request_timeout: Duration,
) -> CollectorResult<Arc<dyn EnergyStore>> {
    let store: Arc<dyn EnergyStore> = match cfg {
        StoreConfig::Postgres(pg) => Arc::new(postgres::PgStore::connect(pg).await?),
        StoreConfig::Postgrest(rest) => {
            Arc::new(postgrest::PostgrestStore::new(rest, request_timeout)?)
        }
    };
    Ok(store)
}
