pub mod manager;
pub mod memory;
pub mod sqlite;

pub use manager::{DatabaseManager, Stores};
pub use memory::{InMemoryAlertStore, InMemoryJobStore, InMemoryLogStore};
pub use sqlite::{SqliteAlertStore, SqliteJobStore, SqliteLogStore};
