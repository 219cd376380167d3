use crate::error::DeviceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

/// One `GET /api/v1/panel` response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    #[serde(rename = "mainRelayState", alias = "relayState")]
    pub relay_state: String,
    pub main_meter_energy: EnergyCounters,
    pub instant_grid_power_w: f64,
    pub feedthrough_power_w: f64,
    pub feedthrough_energy: EnergyCounters,
    pub grid_sample_start_ms: i64,
    pub grid_sample_end_ms: i64,
    pub dsm_grid_state: String,
    pub dsm_state: String,
    pub current_run_config: String,
    pub branches: Vec<BranchReading>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyCounters {
    pub produced_energy_wh: f64,
    pub consumed_energy_wh: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchReading {
    pub id: i32,
    pub relay_state: String,
    pub instant_power_w: f64,
    pub imported_active_energy_wh: f64,
    pub exported_active_energy_wh: f64,
    pub measure_start_ts_ms: i64,
    pub measure_duration_ms: i64,
    /// `false` marks a suspect sample; it is stored regardless.
    pub is_measure_valid: bool,
}

impl Reading {
    pub fn from_slice(payload: &[u8]) -> Result<Self, DeviceError> {
        let reading: Reading = serde_json::from_slice(payload)?;
        reading.validate()?;
        Ok(reading)
    }

    /// Panel-level checks reject the reading. Branch oddities are logged at
    /// warn and left for the store to accept or reject.
    fn validate(&self) -> Result<(), DeviceError> {
        if self.grid_sample_end_ms < self.grid_sample_start_ms {
            return Err(DeviceError::Invalid(format!(
                "gridSampleEndMs {} precedes gridSampleStartMs {}",
                self.grid_sample_end_ms, self.grid_sample_start_ms
            )));
        }
        for problem in self.branch_problems() {
            warn!("{problem}");
        }
        Ok(())
    }

    /// Duplicate ids and negative measurement windows, in device order.
    pub fn branch_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut seen = HashSet::with_capacity(self.branches.len());
        for b in &self.branches {
            if !seen.insert(b.id) {
                problems.push(format!("duplicate branch id {}", b.id));
            }
            if b.measure_duration_ms < 0 {
                problems.push(format!(
                    "branch {} has negative measureDurationMs {}",
                    b.id, b.measure_duration_ms
                ));
            }
        }
        problems
    }

    pub fn main_row(&self, time: DateTime<Utc>) -> MainEnergyRow {
        MainEnergyRow {
            time,
            relay_state: self.relay_state.clone(),
            main_meter_produced_energy_wh: self.main_meter_energy.produced_energy_wh,
            main_meter_consumed_energy_wh: self.main_meter_energy.consumed_energy_wh,
            instant_grid_power_w: self.instant_grid_power_w,
            feed_through_power_w: self.feedthrough_power_w,
            feed_through_produced_energy_wh: self.feedthrough_energy.produced_energy_wh,
            feed_through_consumed_energy_wh: self.feedthrough_energy.consumed_energy_wh,
            grid_sample_start_ms: self.grid_sample_start_ms,
            grid_sample_end_ms: self.grid_sample_end_ms,
            dsm_grid_state: self.dsm_grid_state.clone(),
            dsm_state: self.dsm_state.clone(),
            current_run_config: self.current_run_config.clone(),
        }
    }

    /// Branch rows in device order, all stamped with the same `time`.
    pub fn branch_rows(&self, time: DateTime<Utc>) -> Vec<BranchEnergyRow> {
        self.branches
            .iter()
            .map(|b| BranchEnergyRow {
                time,
                branch_id: b.id,
                relay_state: b.relay_state.clone(),
                instant_power_w: b.instant_power_w,
                imported_active_energy_wh: b.imported_active_energy_wh,
                exported_active_energy_wh: b.exported_active_energy_wh,
                measure_start_ts_ms: b.measure_start_ts_ms,
                measure_duration_ms: b.measure_duration_ms,
                is_measure_valid: b.is_measure_valid,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Main,
    Branch,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Main => "main_energy",
            Table::Branch => "branch_energy",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MainEnergyRow {
    pub time: DateTime<Utc>,
    pub relay_state: String,
    pub main_meter_produced_energy_wh: f64,
    pub main_meter_consumed_energy_wh: f64,
    pub instant_grid_power_w: f64,
    pub feed_through_power_w: f64,
    pub feed_through_produced_energy_wh: f64,
    pub feed_through_consumed_energy_wh: f64,
    pub grid_sample_start_ms: i64,
    pub grid_sample_end_ms: i64,
    pub dsm_grid_state: String,
    pub dsm_state: String,
    pub current_run_config: String,
}

impl MainEnergyRow {
    pub const COLUMNS: [&'static str; 13] = [
        "time",
        "relay_state",
        "main_meter_produced_energy_wh",
        "main_meter_consumed_energy_wh",
        "instant_grid_power_w",
        "feed_through_power_w",
        "feed_through_produced_energy_wh",
        "feed_through_consumed_energy_wh",
        "grid_sample_start_ms",
        "grid_sample_end_ms",
        "dsm_grid_state",
        "dsm_state",
        "current_run_config",
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchEnergyRow {
    pub time: DateTime<Utc>,
    pub branch_id: i32,
    pub relay_state: String,
    pub instant_power_w: f64,
    pub imported_active_energy_wh: f64,
    pub exported_active_energy_wh: f64,
    pub measure_start_ts_ms: i64,
    pub measure_duration_ms: i64,
    pub is_measure_valid: bool,
}

impl BranchEnergyRow {
    pub const COLUMNS: [&'static str; 9] = [
        "time",
        "branch_id",
        "relay_state",
        "instant_power_w",
        "imported_active_energy_wh",
        "exported_active_energy_wh",
        "measure_start_ts_ms",
        "measure_duration_ms",
        "is_measure_valid",
    ];
}
