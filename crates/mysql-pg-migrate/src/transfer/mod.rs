//! Batch loading of transformed rows into the target.
//!
//! Rows are split into batches of `batch_size` and written with one multi-row
//! `INSERT ... ON CONFLICT` each. When a batch fails, its rows are retried one
//! at a time so a single bad row only costs itself.

pub mod overrides;

use std::ops::AddAssign;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::core::schema::TableKind;
use crate::core::traits::TargetStore;
use crate::core::value::MigrationRow;
use crate::dialect::{ConflictPolicy, InsertStatement};

pub use overrides::{OverrideRegistry, StrictNumericRepair, TableOverride};

/// Default rows per INSERT statement.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Row counts from loading one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Rows written.
    pub inserted: u64,

    /// Rows absorbed by the conflict clause.
    pub skipped: u64,

    /// Rows rejected by the target.
    pub failed: u64,
}

impl LoadStats {
    /// Rows accounted for.
    pub fn total(&self) -> u64 {
        self.inserted + self.skipped + self.failed
    }
}

impl AddAssign for LoadStats {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// How a table's rows are sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadStrategy {
    /// Multi-row statements, falling back to single rows on failure.
    #[default]
    Batched,
    /// One statement per row.
    RowByRow,
}

/// Writes rows through a [`TargetStore`].
pub struct BatchLoader<'a> {
    target: &'a dyn TargetStore,
    batch_size: usize,
}

impl<'a> BatchLoader<'a> {
    /// Create a loader; a zero batch size is treated as 1.
    pub fn new(target: &'a dyn TargetStore, batch_size: usize) -> Self {
        Self {
            target,
            batch_size: batch_size.max(1),
        }
    }

    /// Load all rows of one table.
    ///
    /// Never fails as a whole: failed batches and rows are logged and
    /// counted in the returned stats.
    pub async fn load_rows(
        &self,
        table: &str,
        rows: &[MigrationRow],
        kind: &TableKind,
        strategy: LoadStrategy,
    ) -> LoadStats {
        let mut stats = LoadStats::default();
        if rows.is_empty() {
            debug!("{}: no rows to load", table);
            return stats;
        }

        let conflict = ConflictPolicy::from(kind);
        let start = Instant::now();

        match strategy {
            LoadStrategy::Batched => {
                for (batch_no, batch) in rows.chunks(self.batch_size).enumerate() {
                    stats += self.load_batch(table, batch_no, batch, &conflict).await;
                }
            }
            LoadStrategy::RowByRow => {
                stats += self.load_singly(table, 0, rows, &conflict).await;
            }
        }

        info!(
            "{}: {} inserted, {} skipped, {} failed in {:?}",
            table,
            stats.inserted,
            stats.skipped,
            stats.failed,
            start.elapsed()
        );
        stats
    }

    async fn load_batch(
        &self,
        table: &str,
        batch_no: usize,
        batch: &[MigrationRow],
        conflict: &ConflictPolicy,
    ) -> LoadStats {
        let statement = InsertStatement::new(table, batch, conflict.clone());
        match self.target.insert_rows(&statement).await {
            Ok(affected) => {
                let inserted = affected.min(batch.len() as u64);
                LoadStats {
                    inserted,
                    skipped: batch.len() as u64 - inserted,
                    failed: 0,
                }
            }
            Err(e) => {
                warn!(
                    "{}: batch {} ({} rows) failed, retrying row by row: {}",
                    table,
                    batch_no + 1,
                    batch.len(),
                    e
                );
                self.load_singly(table, batch_no * self.batch_size, batch, conflict)
                    .await
            }
        }
    }

    async fn load_singly(
        &self,
        table: &str,
        offset: usize,
        rows: &[MigrationRow],
        conflict: &ConflictPolicy,
    ) -> LoadStats {
        let mut stats = LoadStats::default();
        for (i, row) in rows.iter().enumerate() {
            let statement = InsertStatement::new(table, std::slice::from_ref(row), conflict.clone());
            match self.target.insert_rows(&statement).await {
                Ok(0) => stats.skipped += 1,
                Ok(_) => stats.inserted += 1,
                Err(e) => {
                    warn!("{}: row {} failed: {}", table, offset + i + 1, e);
                    stats.failed += 1;
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::SqlValue;
    use crate::testing::MemoryTarget;

    fn keyed() -> TableKind {
        TableKind::Keyed {
            key_column: "id".into(),
        }
    }

    fn rows(ids: std::ops::RangeInclusive<i64>) -> Vec<MigrationRow> {
        ids.map(|id| {
            let mut row = MigrationRow::new();
            row.insert("id".into(), SqlValue::I64(id));
            row.insert("name".into(), SqlValue::Text(format!("row {}", id)));
            row
        })
        .collect()
    }

    #[tokio::test]
    async fn test_load_rows_in_batches() {
        let target = MemoryTarget::new().with_table("courses", &["id"]);
        let loader = BatchLoader::new(&target, 2);

        let stats = loader
            .load_rows("courses", &rows(1..=5), &keyed(), LoadStrategy::Batched)
            .await;
        assert_eq!(
            stats,
            LoadStats {
                inserted: 5,
                skipped: 0,
                failed: 0
            }
        );
        assert_eq!(target.insert_statements(), 3);
        assert_eq!(target.rows("courses").len(), 5);
    }

    #[tokio::test]
    async fn test_rerun_is_absorbed_by_conflict_clause() {
        let target = MemoryTarget::new().with_table("courses", &["id"]);
        let loader = BatchLoader::new(&target, DEFAULT_BATCH_SIZE);

        loader
            .load_rows("courses", &rows(1..=3), &keyed(), LoadStrategy::Batched)
            .await;
        let stats = loader
            .load_rows("courses", &rows(1..=3), &keyed(), LoadStrategy::Batched)
            .await;

        assert_eq!(stats.inserted, 0);
        assert_eq!(stats.skipped, 3);
        assert_eq!(stats.failed, 0);
        assert_eq!(target.rows("courses").len(), 3);
    }

    #[tokio::test]
    async fn test_failed_batch_falls_back_to_single_rows() {
        let target = MemoryTarget::new().with_table("courses", &["id"]);
        target.reject_value("courses", "id", SqlValue::I64(2));
        let loader = BatchLoader::new(&target, 10);

        let stats = loader
            .load_rows("courses", &rows(1..=4), &keyed(), LoadStrategy::Batched)
            .await;
        assert_eq!(stats.inserted, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total(), 4);
        // one failed batch plus four single-row attempts
        assert_eq!(target.insert_statements(), 5);
    }

    #[tokio::test]
    async fn test_row_by_row_strategy() {
        let target = MemoryTarget::new().with_table("institution", &["id"]);
        let loader = BatchLoader::new(&target, 500);

        let stats = loader
            .load_rows("institution", &rows(1..=3), &keyed(), LoadStrategy::RowByRow)
            .await;
        assert_eq!(stats.inserted, 3);
        assert_eq!(target.insert_statements(), 3);
    }

    #[tokio::test]
    async fn test_zero_rows_short_circuits() {
        let target = MemoryTarget::new();
        let loader = BatchLoader::new(&target, 500);

        let stats = loader
            .load_rows("missing", &[], &TableKind::Junction, LoadStrategy::Batched)
            .await;
        assert_eq!(stats, LoadStats::default());
        assert_eq!(target.insert_statements(), 0);
    }

    #[tokio::test]
    async fn test_junction_duplicates_are_skipped() {
        let target = MemoryTarget::new().with_table("course_user", &["course_id", "user_id"]);
        let loader = BatchLoader::new(&target, 500);

        let pair = |c: i64, u: i64| {
            let mut row = MigrationRow::new();
            row.insert("course_id".into(), SqlValue::I64(c));
            row.insert("user_id".into(), SqlValue::I64(u));
            row
        };
        let stats = loader
            .load_rows(
                "course_user",
                &[pair(1, 1), pair(1, 2), pair(1, 1)],
                &TableKind::Junction,
                LoadStrategy::Batched,
            )
            .await;
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.skipped, 1);
    }
}
