//! Database drivers behind the store traits.
//!
//! - [`mysql`]: [`MysqlReader`], the [`SourceStore`](crate::core::SourceStore)
//! - [`postgres`]: [`PostgresWriter`], the [`TargetStore`](crate::core::TargetStore)

pub mod mysql;
pub mod postgres;

pub use mysql::MysqlReader;
pub use postgres::PostgresWriter;
