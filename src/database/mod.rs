//! Connection pool, migrations and transaction helpers.

pub mod pool;

pub use pool::{begin_serializable, create_pool, run_migrations, Database, DatabaseError};
