//! Foreign-key inference and table ordering.
//!
//! MySQL sources here rarely declare foreign keys, so references are inferred
//! from column names: `<entity>_id` points at the canonical table for
//! `<entity>`. The heuristic can be wrong, so every inferred relationship is
//! logged and configuration can pin or suppress any column.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::core::identifier::{bounded_identifier, IdentifierNormalizer, FOREIGN_KEY_SUFFIX};
use crate::core::schema::{ForeignKeyCandidate, TableDescriptor};

/// Result of inspecting one column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDetection {
    /// Whether the column looks like a reference.
    pub is_foreign_key: bool,
    /// Canonical parent table, when it is one.
    pub target_table: Option<String>,
}

impl ForeignKeyDetection {
    fn none() -> Self {
        Self {
            is_foreign_key: false,
            target_table: None,
        }
    }

    fn to(table: String) -> Self {
        Self {
            is_foreign_key: true,
            target_table: Some(table),
        }
    }
}

/// Inspect a column name with the built-in dictionary.
pub fn detect_foreign_key(column: &str) -> ForeignKeyDetection {
    RelationshipInferencer::default().detect_column(column)
}

/// `fk_{source}_{target}_{column}` with canonical table names, shortened to
/// PostgreSQL's identifier limit with a digest suffix when needed.
pub fn foreign_key_constraint_name(source_table: &str, target_table: &str, column: &str) -> String {
    constraint_name_with(&IdentifierNormalizer::default(), source_table, target_table, column)
}

fn constraint_name_with(
    normalizer: &IdentifierNormalizer,
    source_table: &str,
    target_table: &str,
    column: &str,
) -> String {
    bounded_identifier(format!(
        "fk_{}_{}_{}",
        normalizer.table(source_table),
        normalizer.table(target_table),
        column
    ))
}

/// Name-based relationship inference with configured overrides.
#[derive(Debug, Clone, Default)]
pub struct RelationshipInferencer {
    normalizer: IdentifierNormalizer,
    overrides: HashMap<String, Option<String>>,
}

impl RelationshipInferencer {
    /// `overrides` keys are `table.column` or `column`, in source or target
    /// spelling; a `None` value suppresses inference for that column.
    pub fn new(
        normalizer: IdentifierNormalizer,
        overrides: &HashMap<String, Option<String>>,
    ) -> Self {
        Self {
            normalizer,
            overrides: overrides
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
        }
    }

    /// Suffix rule on an already normalized column name.
    pub fn detect_column(&self, column: &str) -> ForeignKeyDetection {
        let normalized = self.normalizer.column(column);
        match normalized.strip_suffix(FOREIGN_KEY_SUFFIX) {
            Some(prefix) if !prefix.is_empty() => {
                ForeignKeyDetection::to(self.normalizer.table(prefix))
            }
            _ => ForeignKeyDetection::none(),
        }
    }

    fn override_for(&self, descriptor: &TableDescriptor, field: &str, column: &str) -> Option<&Option<String>> {
        let tables = [&descriptor.source_name, &descriptor.target_name];
        let columns = [field, column];
        for table in tables {
            for col in columns {
                let key = format!("{}.{}", table, col).to_lowercase();
                if let Some(hit) = self.overrides.get(&key) {
                    return Some(hit);
                }
            }
        }
        columns
            .iter()
            .find_map(|col| self.overrides.get(&col.to_lowercase()))
    }

    /// Detection for one column of a table, overrides first.
    pub fn detect(&self, descriptor: &TableDescriptor, field: &str) -> ForeignKeyDetection {
        let column = self.normalizer.column(field);
        match self.override_for(descriptor, field, &column) {
            Some(Some(table)) => ForeignKeyDetection::to(self.normalizer.table(table)),
            Some(None) => ForeignKeyDetection::none(),
            None => self.detect_column(&column),
        }
    }

    /// Constraint name using this inferencer's aliases.
    pub fn constraint_name(&self, source_table: &str, target_table: &str, column: &str) -> String {
        constraint_name_with(&self.normalizer, source_table, target_table, column)
    }

    /// Parent tables this table refers to, known or not.
    pub fn parents(&self, descriptor: &TableDescriptor) -> Vec<String> {
        let mut parents = Vec::new();
        for col in &descriptor.columns {
            if let Some(target) = self.detect(descriptor, &col.field).target_table {
                if !parents.contains(&target) {
                    parents.push(target);
                }
            }
        }
        parents
    }

    /// Foreign keys whose parent is a known target table.
    ///
    /// `known_tables` holds canonical names of tables migrated in this run or
    /// already present in the target.
    pub fn candidates(
        &self,
        descriptor: &TableDescriptor,
        known_tables: &HashSet<String>,
    ) -> Vec<ForeignKeyCandidate> {
        let mut out = Vec::new();
        for col in &descriptor.columns {
            let Some(target) = self.detect(descriptor, &col.field).target_table else {
                continue;
            };
            let column = self.normalizer.column(&col.field);
            if !known_tables.contains(&target) {
                debug!(
                    "{}.{} looks like a reference to unknown table '{}', skipping",
                    descriptor.target_name, column, target
                );
                continue;
            }
            let constraint_name =
                self.constraint_name(&descriptor.source_name, &target, &column);
            info!(
                "Inferred relationship {}.{} -> {}.id ({})",
                descriptor.target_name, column, target, constraint_name
            );
            out.push(ForeignKeyCandidate {
                source_column: column,
                target_table: target,
                constraint_name,
            });
        }
        out
    }

    /// Indices into `descriptors` so that inferred parents come before
    /// children. Ties keep enumeration order; tables caught in a cycle are
    /// appended in enumeration order.
    pub fn migration_order(&self, descriptors: &[TableDescriptor]) -> Vec<usize> {
        let position: HashMap<&str, usize> = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.target_name.as_str(), i))
            .collect();

        let mut children: Vec<Vec<usize>> = vec![Vec::new(); descriptors.len()];
        let mut in_degree = vec![0usize; descriptors.len()];
        for (child, descriptor) in descriptors.iter().enumerate() {
            for parent in self.parents(descriptor) {
                if let Some(&p) = position.get(parent.as_str()) {
                    if p != child {
                        children[p].push(child);
                        in_degree[child] += 1;
                    }
                }
            }
        }

        let mut order = Vec::with_capacity(descriptors.len());
        let mut done = vec![false; descriptors.len()];
        while let Some(next) = (0..descriptors.len()).find(|&i| !done[i] && in_degree[i] == 0) {
            done[next] = true;
            order.push(next);
            for &child in &children[next] {
                in_degree[child] -= 1;
            }
        }

        let cyclic: Vec<usize> = (0..descriptors.len()).filter(|&i| !done[i]).collect();
        if !cyclic.is_empty() {
            let names: Vec<&str> = cyclic
                .iter()
                .map(|&i| descriptors[i].target_name.as_str())
                .collect();
            warn!(
                "Reference cycle between tables {:?}; loading them in source order",
                names
            );
            order.extend(cyclic);
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifier::PG_MAX_IDENTIFIER_BYTES;
    use crate::core::schema::ColumnDescriptor;

    fn table(source: &str, columns: &[&str]) -> TableDescriptor {
        TableDescriptor {
            source_name: source.to_string(),
            target_name: IdentifierNormalizer::default().table(source),
            columns: std::iter::once(ColumnDescriptor::new("id", "int").auto_increment_pk())
                .chain(columns.iter().map(|c| ColumnDescriptor::new(*c, "int")))
                .collect(),
            indexes: vec![],
        }
    }

    #[test]
    fn test_detect_foreign_key() {
        let d = detect_foreign_key("instituicao_id");
        assert!(d.is_foreign_key);
        assert_eq!(d.target_table.as_deref(), Some("institution"));
        assert_eq!(
            detect_foreign_key("course_id").target_table.as_deref(),
            Some("courses")
        );
        assert!(!detect_foreign_key("id").is_foreign_key);
        assert!(!detect_foreign_key("_id").is_foreign_key);
        assert!(!detect_foreign_key("nome").is_foreign_key);
        assert!(!detect_foreign_key("idade").is_foreign_key);
    }

    #[test]
    fn test_constraint_name_template() {
        assert_eq!(
            foreign_key_constraint_name("cursos", "institution", "institution_id"),
            "fk_courses_institution_institution_id"
        );
        assert_eq!(
            foreign_key_constraint_name("aulas", "cursos", "course_id"),
            "fk_lessons_courses_course_id"
        );
    }

    #[test]
    fn test_long_constraint_names_are_unique_and_bounded() {
        let long_table = "a_really_long_legacy_table_name_that_goes_on";
        let a = foreign_key_constraint_name(long_table, "institution", "institution_id");
        let b = foreign_key_constraint_name(long_table, "institution", "institution_id_old");
        assert!(a.len() <= PG_MAX_IDENTIFIER_BYTES);
        assert!(b.len() <= PG_MAX_IDENTIFIER_BYTES);
        assert_ne!(a, b);
        assert_eq!(
            a,
            foreign_key_constraint_name(long_table, "institution", "institution_id")
        );
    }

    #[test]
    fn test_overrides_pin_and_suppress() {
        let mut overrides = HashMap::new();
        overrides.insert("cursos.autor_id".to_string(), Some("usuarios".to_string()));
        overrides.insert("legacy_id".to_string(), None);
        let inf = RelationshipInferencer::new(IdentifierNormalizer::default(), &overrides);

        let cursos = table("cursos", &["autor_id", "legacy_id", "instituicao_id"]);
        assert_eq!(
            inf.detect(&cursos, "autor_id").target_table.as_deref(),
            Some("user")
        );
        assert!(!inf.detect(&cursos, "legacy_id").is_foreign_key);
        assert_eq!(
            inf.detect(&cursos, "instituicao_id").target_table.as_deref(),
            Some("institution")
        );
    }

    #[test]
    fn test_candidates_require_known_parent() {
        let inf = RelationshipInferencer::default();
        let cursos = table("cursos", &["instituicao_id", "fornecedor_id"]);
        let known: HashSet<String> = ["institution".to_string()].into_iter().collect();
        let candidates = inf.candidates(&cursos, &known);
        assert_eq!(
            candidates,
            vec![ForeignKeyCandidate {
                source_column: "institution_id".into(),
                target_table: "institution".into(),
                constraint_name: "fk_courses_institution_institution_id".into(),
            }]
        );
    }

    #[test]
    fn test_migration_order_parents_first() {
        let tables = vec![
            table("aulas", &["curso_id"]),
            table("cursos", &["instituicao_id"]),
            table("videos", &[]),
            table("instituicao", &[]),
        ];
        let order = RelationshipInferencer::default().migration_order(&tables);
        let names: Vec<&str> = order.iter().map(|&i| tables[i].target_name.as_str()).collect();
        assert_eq!(names, vec!["videos", "institution", "courses", "lessons"]);
    }

    #[test]
    fn test_migration_order_cycles_and_self_references() {
        let tables = vec![
            table("a", &["b_id"]),
            table("b", &["a_id"]),
            table("c", &["c_id"]),
        ];
        let order = RelationshipInferencer::default().migration_order(&tables);
        assert_eq!(order, vec![2, 0, 1]);
    }
}
