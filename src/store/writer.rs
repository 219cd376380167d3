use super::EnergyStore;
use crate::error::StoreError;
use crate::model::{Reading, Table};
use crate::retry::{RetryError, RetryPolicy};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
#[error("insert into {table} failed: {cause}")]
pub struct StoreWriteError {
    pub table: Table,
    #[source]
    pub cause: RetryError<StoreError>,
}

/// What happened to one reading's two inserts.
#[derive(Debug, Default)]
pub struct WriteOutcome {
    pub main_written: bool,
    pub branches_written: usize,
    pub errors: Vec<StoreWriteError>,
}

impl WriteOutcome {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn failed(&self, table: Table) -> bool {
        self.errors.iter().any(|e| e.table == table)
    }
}

/// Writes a reading to both tables, best effort: a failure on one table is
/// logged and recorded, and never stops the other insert.
pub struct StoreWriter {
    store: Arc<dyn EnergyStore>,
    retry: RetryPolicy,
}

impl StoreWriter {
    pub fn new(store: Arc<dyn EnergyStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Both tables are stamped with the same `now`.
    pub async fn write(&self, reading: &Reading, now: DateTime<Utc>) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();
        let store = &self.store;

        let main = reading.main_row(now);
        debug!(table = %Table::Main, "Inserting data to main_energy");
        let main_ref = &main;
        match self
            .retry
            .run("insert main_energy", move || store.insert_main(main_ref))
            .await
        {
            Ok(()) => outcome.main_written = true,
            Err(cause) => {
                error!(table = %Table::Main, "Error inserting data: {cause}");
                error!(table = %Table::Main, record = ?main, "rejected record");
                outcome.errors.push(StoreWriteError {
                    table: Table::Main,
                    cause,
                });
            }
        }

        let rows = reading.branch_rows(now);
        if rows.is_empty() {
            debug!(table = %Table::Branch, "reading has no branches; skipping insert");
            return outcome;
        }
        debug!(table = %Table::Branch, count = rows.len(), "Inserting data to branch_energy");
        let rows_ref = rows.as_slice();
        match self
            .retry
            .run("insert branch_energy", move || store.insert_branches(rows_ref))
            .await
        {
            Ok(()) => outcome.branches_written = rows.len(),
            Err(cause) => {
                error!(table = %Table::Branch, count = rows.len(), "Error inserting data: {cause}");
                error!(table = %Table::Branch, records = ?rows, "rejected records");
                outcome.errors.push(StoreWriteError {
                    table: Table::Branch,
                    cause,
                });
            }
        }

        outcome
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}
