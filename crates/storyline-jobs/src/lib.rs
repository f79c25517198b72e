pub mod dispatch;
pub mod error;
pub mod manager;
pub mod sweeper;
pub mod types;
pub mod worker;

pub use dispatch::{ContentAgentDispatcher, DispatchError, HttpContentAgentDispatcher, NoopDispatcher};
pub use error::{JobsError, Result};
pub use manager::JobManager;
pub use sweeper::TimeoutSweeper;
pub use types::{AssetWorkerConfig, CreateJobRequest, GenerateAssetPayload, TimeoutSweeperConfig};
pub use worker::AssetWorker;
