//! Schema introspection (source side) and materialization (target side).

pub mod introspect;
pub mod materialize;

pub use introspect::describe_table;
pub use materialize::{
    translate_default, KnownTables, MaterializeOutcome, MaterializeReport, SchemaMaterializer,
};
