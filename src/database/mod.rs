pub mod connection;
pub mod models;
pub mod moderation;
pub mod players;
pub mod queue;
pub mod rows;
pub mod setup;
pub mod tournaments;

pub use connection::{create_pool, get_connection, open, open_with_busy_timeout, DbConn, DbPool, DEFAULT_BUSY_TIMEOUT};
pub use models::*;
pub use rows::{RowStore, SqliteRowStore};
