//! JSON snapshot of the source data.
//!
//! One file per run, `backup_YYYYMMDDTHHMMSS.mmmZ.json`, holding
//! `{ "<table>": [ { "<column>": value, ... }, ... ], ... }` in table
//! enumeration order.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use tracing::{info, warn};

use crate::core::traits::SourceStore;
use crate::error::Result;

/// File name for a snapshot taken at `at`.
pub fn snapshot_file_name(at: DateTime<Utc>) -> String {
    format!("backup_{}.json", at.format("%Y%m%dT%H%M%S%.3fZ"))
}

/// Read every table from the source and write the snapshot into `dir`.
///
/// Tables that cannot be read are logged and left out. Returns the path of
/// the written file.
pub async fn snapshot(source: &dyn SourceStore, tables: &[String], dir: &Path) -> Result<PathBuf> {
    snapshot_at(source, tables, dir, Utc::now()).await
}

/// [`snapshot`] with an explicit timestamp.
pub async fn snapshot_at(
    source: &dyn SourceStore,
    tables: &[String],
    dir: &Path,
    at: DateTime<Utc>,
) -> Result<PathBuf> {
    let mut document: IndexMap<String, Vec<JsonValue>> = IndexMap::new();

    for table in tables {
        match source.fetch_rows(table).await {
            Ok(rows) => {
                let rows = rows
                    .iter()
                    .map(|row| {
                        JsonValue::Object(
                            row.iter()
                                .map(|(k, v)| (k.clone(), v.to_json()))
                                .collect::<Map<String, JsonValue>>(),
                        )
                    })
                    .collect();
                document.insert(table.clone(), rows);
            }
            Err(e) => warn!("Snapshot: skipping {}: {}", table, e),
        }
    }

    std::fs::create_dir_all(dir)?;
    let path = dir.join(snapshot_file_name(at));
    let content = serde_json::to_string_pretty(&document)?;

    // Atomic write: write to temp file, then rename
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, &content)?;
    std::fs::rename(&temp_path, &path)?;

    info!(
        "Snapshot of {} tables written to {}",
        document.len(),
        path.display()
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ColumnDescriptor;
    use crate::core::value::{SourceRow, SourceValue};
    use crate::testing::MemorySource;
    use chrono::TimeZone;
    use serde_json::json;

    fn row(pairs: &[(&str, SourceValue)]) -> SourceRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_snapshot_file_name() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(snapshot_file_name(at), "backup_20240309T070501.000Z.json");

        let later = at + chrono::Duration::milliseconds(250);
        assert_eq!(snapshot_file_name(later), "backup_20240309T070501.250Z.json");
    }

    #[tokio::test]
    async fn test_snapshots_in_the_same_second_do_not_overwrite() {
        let source = MemorySource::new().with_table(
            "cursos",
            vec![ColumnDescriptor::new("id", "int")],
            vec![row(&[("id", SourceValue::from(1))])],
        );
        let dir = tempfile::tempdir().unwrap();
        let tables = ["cursos".to_string()];
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let first = snapshot_at(&source, &tables, dir.path(), at).await.unwrap();
        let second = snapshot_at(
            &source,
            &tables,
            dir.path(),
            at + chrono::Duration::milliseconds(1),
        )
        .await
        .unwrap();

        assert_ne!(first, second);
        assert!(first.exists());
        assert!(second.exists());
    }

    #[tokio::test]
    async fn test_snapshot_writes_tables_in_order() {
        let source = MemorySource::new()
            .with_table(
                "usuarios",
                vec![ColumnDescriptor::new("id", "bigint unsigned")],
                vec![row(&[
                    ("id", SourceValue::Int(18_446_744_073_709_551_615)),
                    ("legacy", SourceValue::Int(99_999_999_999_999_999_999)),
                    ("avatar", SourceValue::Bytes(vec![0xde, 0xad])),
                ])],
            )
            .with_table(
                "cursos",
                vec![ColumnDescriptor::new("id", "int")],
                vec![row(&[("id", SourceValue::from(1)), ("nome", SourceValue::from("Rust"))])],
            );
        let dir = tempfile::tempdir().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let path = snapshot_at(
            &source,
            &["usuarios".to_string(), "cursos".to_string()],
            dir.path(),
            at,
        )
        .await
        .unwrap();

        assert_eq!(path, dir.path().join("backup_20240102T030405.000Z.json"));
        assert!(!path.with_extension("tmp").exists());

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.find("usuarios").unwrap() < text.find("cursos").unwrap());

        let parsed: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["usuarios"][0]["id"], json!(18_446_744_073_709_551_615u64));
        assert_eq!(parsed["usuarios"][0]["legacy"], json!("99999999999999999999"));
        assert_eq!(parsed["usuarios"][0]["avatar"], json!("\\xdead"));
        assert_eq!(parsed["cursos"][0], json!({"id": 1, "nome": "Rust"}));
    }

    #[tokio::test]
    async fn test_unreadable_table_is_omitted() {
        let source = MemorySource::new()
            .with_table("cursos", vec![], vec![])
            .with_table("aula", vec![], vec![]);
        source.fail_fetch("aula");
        let dir = tempfile::tempdir().unwrap();

        let path = snapshot(
            &source,
            &["cursos".to_string(), "aula".to_string()],
            &dir.path().join("nested"),
        )
        .await
        .unwrap();

        let parsed: JsonValue =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed, json!({"cursos": []}));
    }
}
