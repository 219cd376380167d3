//! Fixed-interval poll loop: fetch a reading, write it, sleep, repeat.
//!
//! Cycles never overlap. The interval is slept after each cycle's work, so
//! the period is work time plus interval. Shutdown is checked at the top of
//! every cycle and can cut the inter-cycle sleep short; in-flight requests and
//! retry backoffs always run to completion.

use crate::device::PanelSource;
use crate::error::{CollectorError, DeviceError};
use crate::retry::{RetryError, RetryPolicy};
use crate::store::{StoreWriter, WriteOutcome};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopping,
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// The panel answered; the write outcome says what reached the store.
    Stored(WriteOutcome),
    /// Status, parse or other non-retryable device error; nothing written.
    Skipped(DeviceError),
}

pub struct PollLoop<D> {
    device: D,
    writer: StoreWriter,
    retry: RetryPolicy,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
    state: LoopState,
}

impl<D: PanelSource> PollLoop<D> {
    pub fn new(
        device: D,
        writer: StoreWriter,
        retry: RetryPolicy,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            device,
            writer,
            retry,
            interval,
            shutdown,
            state: LoopState::Running,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// One fetch-then-write cycle. Only exhausted retries against the panel
    /// come back as `Err`.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CollectorError> {
        let device = &self.device;
        match self.retry.run("fetch panel", move || device.fetch()).await {
            Ok(reading) => {
                let now = Utc::now();
                info!("OK 200: {} W", reading.instant_grid_power_w);
                let outcome = self.writer.write(&reading, now).await;
                Ok(CycleOutcome::Stored(outcome))
            }
            Err(RetryError::Permanent(e)) => {
                match &e {
                    DeviceError::Status { status, .. } => error!(status = *status, "{e}"),
                    _ => error!("skipping cycle: {e}"),
                }
                Ok(CycleOutcome::Skipped(e))
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                Err(CollectorError::DeviceUnreachable { attempts, last })
            }
        }
    }

    /// Run until shutdown is signalled (`Ok`) or the panel stays unreachable
    /// through a full retry cycle (`Err`). The store is closed either way.
    pub async fn run(&mut self) -> Result<(), CollectorError> {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            max_retries = self.retry.max_retries(),
            "poll loop started"
        );

        let result = loop {
            if *self.shutdown.borrow() {
                break Ok(());
            }
            if let Err(e) = self.run_cycle().await {
                break Err(e);
            }

            let sleep = tokio::time::sleep(self.interval);
            tokio::pin!(sleep);
            tokio::select! {
                _ = &mut sleep => {}
                changed = self.shutdown.changed() => {
                    // sender gone: nobody can ask us to stop, so finish the sleep
                    if changed.is_err() {
                        (&mut sleep).await;
                    }
                }
            }
        };

        self.state = LoopState::Stopping;
        match &result {
            Ok(()) => error!("Interrupt received, exiting gracefully..."),
            Err(e) => error!("stopping: {e}"),
        }
        self.writer.close().await;
        error!("Connection closed");
        result
    }
}
