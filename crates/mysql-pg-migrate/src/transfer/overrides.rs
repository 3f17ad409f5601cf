//! Per-table load behavior.
//!
//! Most tables load in batches with no extra repair. Tables registered here
//! can switch to single-row loading and fix up rows the target would
//! otherwise reject.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::MigrationConfig;
use crate::core::value::{MigrationRow, SqlValue};

use super::LoadStrategy;

/// Behavior attached to one table.
pub trait TableOverride: Send + Sync {
    /// How the table's rows are sent.
    fn strategy(&self) -> LoadStrategy {
        LoadStrategy::Batched
    }

    /// Fix a transformed row in place. `column_types` maps target column to
    /// PostgreSQL type.
    fn repair_row(&self, _row: &mut MigrationRow, _column_types: &HashMap<String, String>) {}
}

/// Row-at-a-time loading with integers clamped to the column width and
/// non-finite floats nulled.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictNumericRepair;

impl TableOverride for StrictNumericRepair {
    fn strategy(&self) -> LoadStrategy {
        LoadStrategy::RowByRow
    }

    fn repair_row(&self, row: &mut MigrationRow, column_types: &HashMap<String, String>) {
        for (column, value) in row.iter_mut() {
            let bounds = column_types.get(column).and_then(|t| integer_bounds(t));
            match value {
                SqlValue::I64(v) => {
                    if let Some((min, max)) = bounds {
                        let clamped = (*v).clamp(min, max);
                        if clamped != *v {
                            debug!("Clamped {} from {} to {}", column, v, clamped);
                            *v = clamped;
                        }
                    }
                }
                SqlValue::F64(f) if !f.is_finite() => {
                    debug!("Replaced non-finite {} with NULL", column);
                    *value = SqlValue::Null;
                }
                _ => {}
            }
        }
    }
}

fn integer_bounds(pg_type: &str) -> Option<(i64, i64)> {
    match pg_type.to_lowercase().as_str() {
        "smallint" | "smallserial" => Some((i64::from(i16::MIN), i64::from(i16::MAX))),
        "integer" | "serial" => Some((i64::from(i32::MIN), i64::from(i32::MAX))),
        "bigint" | "bigserial" => Some((i64::MIN, i64::MAX)),
        _ => None,
    }
}

/// Table name (source or target spelling, case-insensitive) to override.
#[derive(Clone, Default)]
pub struct OverrideRegistry {
    entries: HashMap<String, Arc<dyn TableOverride>>,
}

impl OverrideRegistry {
    /// Registry with [`StrictNumericRepair`] for every configured
    /// row-by-row table.
    pub fn from_config(config: &MigrationConfig) -> Self {
        let mut registry = Self::default();
        for table in &config.row_by_row_tables {
            registry.register(table, Arc::new(StrictNumericRepair));
        }
        registry
    }

    /// Attach an override to a table name.
    pub fn register(&mut self, table: &str, table_override: Arc<dyn TableOverride>) {
        self.entries.insert(table.to_lowercase(), table_override);
    }

    /// Override for a table, looked up by source then target name.
    pub fn get(&self, source_name: &str, target_name: &str) -> Option<&dyn TableOverride> {
        self.entries
            .get(&source_name.to_lowercase())
            .or_else(|| self.entries.get(&target_name.to_lowercase()))
            .map(|o| o.as_ref())
    }

    /// Load strategy for a table; batched when nothing is registered.
    pub fn strategy(&self, source_name: &str, target_name: &str) -> LoadStrategy {
        self.get(source_name, target_name)
            .map(|o| o.strategy())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_strict_numeric_repair_clamps_to_column_width() {
        let mut row = MigrationRow::new();
        row.insert("id".into(), SqlValue::I64(5_000_000_000));
        row.insert("rank".into(), SqlValue::I64(-70_000));
        row.insert("total".into(), SqlValue::I64(i64::MAX));
        row.insert("score".into(), SqlValue::F64(f64::NAN));
        row.insert("ratio".into(), SqlValue::F64(0.5));

        StrictNumericRepair.repair_row(
            &mut row,
            &types(&[
                ("id", "serial"),
                ("rank", "smallint"),
                ("total", "bigint"),
                ("score", "double precision"),
                ("ratio", "real"),
            ]),
        );

        assert_eq!(row["id"], SqlValue::I64(2_147_483_647));
        assert_eq!(row["rank"], SqlValue::I64(-32_768));
        assert_eq!(row["total"], SqlValue::I64(i64::MAX));
        assert_eq!(row["score"], SqlValue::Null);
        assert_eq!(row["ratio"], SqlValue::F64(0.5));
    }

    #[test]
    fn test_registry_from_config() {
        let registry = OverrideRegistry::from_config(&MigrationConfig::default());
        assert_eq!(
            registry.strategy("instituicao", "institution"),
            LoadStrategy::RowByRow
        );
        assert_eq!(
            registry.strategy("INSTITUTION", "whatever"),
            LoadStrategy::RowByRow
        );
        assert_eq!(registry.strategy("cursos", "courses"), LoadStrategy::Batched);
        assert!(registry.get("cursos", "courses").is_none());
    }

    #[test]
    fn test_register_custom_override() {
        struct Noop;
        impl TableOverride for Noop {}

        let mut registry = OverrideRegistry::default();
        registry.register("videos", Arc::new(Noop));
        assert!(registry.get("video", "videos").is_some());
        assert_eq!(registry.strategy("video", "videos"), LoadStrategy::Batched);
    }
}
