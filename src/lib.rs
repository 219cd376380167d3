pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod model;
pub mod poll;
pub mod retry;
pub mod store;

// Re-export commonly used items
pub use config::Config;
pub use error::{CollectorError, DeviceError, Result, StoreError};
pub use model::{BranchReading, Reading};
pub use retry::RetryPolicy;
