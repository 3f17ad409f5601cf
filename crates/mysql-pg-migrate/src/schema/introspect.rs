//! Source structure introspection.

use tracing::{debug, warn};

use crate::core::identifier::IdentifierNormalizer;
use crate::core::schema::TableDescriptor;
use crate::core::traits::SourceStore;

/// Read the structure of one source table.
///
/// Never fails: when the columns cannot be read the table is returned
/// data-only (no columns), and unreadable indexes are simply omitted.
pub async fn describe_table(
    source: &dyn SourceStore,
    table: &str,
    normalizer: &IdentifierNormalizer,
) -> TableDescriptor {
    let target_name = normalizer.table(table);

    let columns = match source.columns(table).await {
        Ok(columns) => columns,
        Err(e) => {
            warn!(
                "Could not read structure of {}: {}. Loading it data-only",
                table, e
            );
            return TableDescriptor::data_only(table, target_name);
        }
    };

    let indexes = match source.indexes(table).await {
        Ok(indexes) => indexes,
        Err(e) => {
            warn!("Could not read indexes of {}: {}", table, e);
            Vec::new()
        }
    };

    debug!(
        "Described {} -> {}: {} columns, {} indexes",
        table,
        target_name,
        columns.len(),
        indexes.len()
    );

    TableDescriptor {
        source_name: table.to_string(),
        target_name,
        columns,
        indexes,
    }
}
