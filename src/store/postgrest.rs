use super::EnergyStore;
use crate::config::PostgrestConfig;
use crate::error::StoreError;
use crate::model::{BranchEnergyRow, MainEnergyRow, Table};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Inserts through a PostgREST endpoint such as Supabase's `/rest/v1`.
pub struct PostgrestStore {
    http: reqwest::Client,
    base_url: String,
    key: String,
}

impl PostgrestStore {
    pub fn new(cfg: &PostgrestConfig, timeout: Duration) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            key: cfg.key.clone(),
        })
    }

    pub fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn post<T: Serialize + ?Sized>(&self, table: Table, body: &T) -> Result<(), StoreError> {
        let res = self
            .http
            .post(self.table_url(table))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        let status = res.status();
        if status.is_success() {
            return Ok(());
        }
        let body = res.text().await.unwrap_or_default();
        Err(StoreError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl EnergyStore for PostgrestStore {
    async fn insert_main(&self, row: &MainEnergyRow) -> Result<(), StoreError> {
        self.post(Table::Main, row).await
    }

    async fn insert_branches(&self, rows: &[BranchEnergyRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.post(Table::Branch, rows).await
    }
}
