pub mod async_loader;
pub mod cache;
pub mod loader;

pub use async_loader::{AsyncLoader, CancelToken, LoadProgress};
pub use cache::Cache;
pub use loader::{LoadError, Loader};
