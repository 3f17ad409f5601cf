//! Statements run after all data is loaded.
//!
//! Each statement is idempotent on its own (`IF NOT EXISTS`, catalog
//! guards, `CREATE OR REPLACE`) so a rerun against a migrated target is a
//! no-op.

use crate::core::identifier::{bounded_identifier, escape_if_reserved};
use crate::core::schema::ForeignKeyCandidate;

use super::literal::quote_literal;
use super::{column_list, foreign_key_clause};

/// Name of the shared trigger function.
pub const UPDATED_AT_FUNCTION: &str = "update_updated_at_column";

/// Column maintained by the trigger.
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// `CREATE OR REPLACE FUNCTION update_updated_at_column()`.
pub fn updated_at_function_sql() -> String {
    format!(
        "CREATE OR REPLACE FUNCTION {}() RETURNS TRIGGER AS $$\n\
         BEGIN\n    NEW.{} = NOW();\n    RETURN NEW;\nEND;\n$$ LANGUAGE plpgsql",
        UPDATED_AT_FUNCTION, UPDATED_AT_COLUMN
    )
}

/// Per-table `BEFORE UPDATE` trigger, guarded by `pg_trigger`.
pub fn updated_at_trigger_sql(table: &str) -> String {
    let trigger = bounded_identifier(format!("trg_{}_updated_at", table));
    let qualified = escape_if_reserved(table);
    format!(
        "DO $$\nBEGIN\n    IF NOT EXISTS (SELECT 1 FROM pg_trigger WHERE tgname = {} AND tgrelid = to_regclass({})) THEN\n        \
         CREATE TRIGGER {} BEFORE UPDATE ON {} FOR EACH ROW EXECUTE FUNCTION {}();\n    END IF;\nEND\n$$",
        quote_literal(&trigger),
        quote_literal(&qualified),
        escape_if_reserved(&trigger),
        qualified,
        UPDATED_AT_FUNCTION
    )
}

/// Deterministic index name for a column list.
pub fn index_name(table: &str, columns: &[String]) -> String {
    bounded_identifier(format!("idx_{}_{}", table, columns.join("_")))
}

/// `CREATE [UNIQUE] INDEX IF NOT EXISTS`.
pub fn create_index_sql(table: &str, columns: &[String], unique: bool) -> String {
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if unique { "UNIQUE " } else { "" },
        escape_if_reserved(&index_name(table, columns)),
        escape_if_reserved(table),
        column_list(columns)
    )
}

/// `ALTER TABLE ... ADD CONSTRAINT ... NOT VALID`, guarded by `pg_constraint`.
///
/// `NOT VALID` keeps rows loaded before the parent existed from blocking the
/// constraint; new writes are still checked.
pub fn deferred_foreign_key_sql(table: &str, fk: &ForeignKeyCandidate) -> String {
    format!(
        "DO $$\nBEGIN\n    IF NOT EXISTS (SELECT 1 FROM pg_constraint WHERE conname = {}) THEN\n        \
         ALTER TABLE {} ADD {} NOT VALID;\n    END IF;\nEND\n$$",
        quote_literal(&fk.constraint_name),
        escape_if_reserved(table),
        foreign_key_clause(fk)
    )
}

/// Move a serial column's sequence past the loaded maximum.
pub fn reset_sequence_sql(table: &str, column: &str) -> String {
    let col = escape_if_reserved(column);
    format!(
        "SELECT setval(pg_get_serial_sequence({}, {}), COALESCE(MAX({}), 1), MAX({}) IS NOT NULL) FROM {}",
        quote_literal(&escape_if_reserved(table)),
        quote_literal(column),
        col,
        col,
        escape_if_reserved(table)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updated_at_function() {
        let sql = updated_at_function_sql();
        assert!(sql.starts_with("CREATE OR REPLACE FUNCTION update_updated_at_column()"));
        assert!(sql.contains("NEW.updated_at = NOW()"));
    }

    #[test]
    fn test_updated_at_trigger_is_guarded() {
        let sql = updated_at_trigger_sql("user");
        assert!(sql.contains("tgname = E'trg_user_updated_at'"));
        assert!(sql.contains("to_regclass(E'\"user\"')"));
        assert!(sql.contains("CREATE TRIGGER trg_user_updated_at BEFORE UPDATE ON \"user\""));
    }

    #[test]
    fn test_create_index_sql() {
        assert_eq!(
            create_index_sql("courses", &["institution_id".to_string()], false),
            "CREATE INDEX IF NOT EXISTS idx_courses_institution_id ON courses (institution_id)"
        );
        assert!(create_index_sql("user", &["email".to_string()], true)
            .starts_with("CREATE UNIQUE INDEX IF NOT EXISTS idx_user_email ON \"user\""));
    }

    #[test]
    fn test_deferred_foreign_key_sql() {
        let fk = ForeignKeyCandidate {
            source_column: "course_id".into(),
            target_table: "courses".into(),
            constraint_name: "fk_lessons_courses_course_id".into(),
        };
        let sql = deferred_foreign_key_sql("lessons", &fk);
        assert!(sql.contains("conname = E'fk_lessons_courses_course_id'"));
        assert!(sql.contains(
            "ALTER TABLE lessons ADD CONSTRAINT fk_lessons_courses_course_id FOREIGN KEY (course_id) REFERENCES courses (id) NOT VALID"
        ));
    }

    #[test]
    fn test_reset_sequence_sql() {
        assert_eq!(
            reset_sequence_sql("user", "id"),
            "SELECT setval(pg_get_serial_sequence(E'\"user\"', E'id'), COALESCE(MAX(id), 1), MAX(id) IS NOT NULL) FROM \"user\""
        );
    }
}
