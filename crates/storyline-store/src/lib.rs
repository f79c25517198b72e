pub mod db;
pub mod error;
pub mod kv;
pub mod manager;
pub mod types;

pub use error::{Result, StoreError};
pub use kv::{InMemoryKvCache, KvCache};
pub use manager::RowStore;
