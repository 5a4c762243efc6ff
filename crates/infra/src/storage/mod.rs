//! SQLite storage: connection pool and schema

mod pool;
mod schema;

pub use pool::DbPool;
pub use schema::apply_schema;
