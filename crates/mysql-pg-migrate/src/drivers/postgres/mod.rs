//! PostgreSQL target driver.

pub mod tls;
mod writer;

pub use tls::SslMode;
pub use writer::PostgresWriter;
