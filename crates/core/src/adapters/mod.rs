pub mod database;
pub mod memory;
pub mod traits;

pub use database::{DatabaseAdapter, UserFetch, UserRecord, fetch_user};
pub use memory::MemoryDatabaseAdapter;
pub use traits::{SubscriptionOps, UsageChange, UsageOutcome, UserOps};

#[cfg(feature = "postgres")]
pub use database::sqlx_adapter::{PoolConfig, SqlxAdapter};
