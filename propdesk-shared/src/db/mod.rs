/// PostgreSQL plumbing: connection pool and schema migrations
///
/// Queries live on the models; [`crate::store::postgres::PgStore`] wires them
/// behind the storage trait.

pub mod migrations;
pub mod pool;
