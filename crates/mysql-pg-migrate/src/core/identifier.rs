//! Identifier normalization, validation and quoting.
//!
//! Source schemas name things in Portuguese, with and without accents, and
//! mix singular and plural forms. Target names are canonical English. The
//! mapping is a dictionary lookup keyed by an accent-folded lowercase form, so
//! `instituição`, `instituicao` and `INSTITUICAO` all resolve the same way.
//! Anything not in the dictionary is returned unchanged.
//!
//! SQL identifiers cannot be bound as parameters, so every name that reaches
//! generated SQL goes through [`escape_if_reserved`] or [`quote_pg`].

use crate::error::{MigrateError, Result};
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Maximum identifier length accepted by [`validate_identifier`].
/// MySQL allows 64 characters, PostgreSQL truncates at 63 bytes.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// PostgreSQL truncates identifiers longer than this many bytes.
pub const PG_MAX_IDENTIFIER_BYTES: usize = 63;

/// Suffix that marks a column as a reference to another table.
pub const FOREIGN_KEY_SUFFIX: &str = "_id";

/// Source table spellings -> canonical target table.
const TABLE_SYNONYMS: &[(&str, &str)] = &[
    ("curso", "courses"),
    ("cursos", "courses"),
    ("course", "courses"),
    ("instituicao", "institution"),
    ("instituicoes", "institution"),
    ("institutions", "institution"),
    ("usuario", "user"),
    ("usuarios", "user"),
    ("users", "user"),
    ("escola", "school"),
    ("escolas", "school"),
    ("schools", "school"),
    ("papel", "role"),
    ("papeis", "role"),
    ("perfil", "role"),
    ("perfis", "role"),
    ("roles", "role"),
    ("turma", "classes"),
    ("turmas", "classes"),
    ("class", "classes"),
    ("aula", "lessons"),
    ("aulas", "lessons"),
    ("lesson", "lessons"),
    ("modulo", "modules"),
    ("modulos", "modules"),
    ("module", "modules"),
    ("video", "videos"),
    ("categoria", "categories"),
    ("categorias", "categories"),
    ("category", "categories"),
    ("matricula", "enrollments"),
    ("matriculas", "enrollments"),
    ("enrollment", "enrollments"),
    ("professor", "teachers"),
    ("professores", "teachers"),
    ("teacher", "teachers"),
    ("aluno", "students"),
    ("alunos", "students"),
    ("student", "students"),
    ("questao", "questions"),
    ("questoes", "questions"),
    ("pergunta", "questions"),
    ("perguntas", "questions"),
    ("question", "questions"),
    ("resposta", "answers"),
    ("respostas", "answers"),
    ("answer", "answers"),
    ("certificado", "certificates"),
    ("certificados", "certificates"),
    ("certificate", "certificates"),
    ("comentario", "comments"),
    ("comentarios", "comments"),
    ("comment", "comments"),
    ("arquivo", "files"),
    ("arquivos", "files"),
    ("file", "files"),
    ("notificacao", "notifications"),
    ("notificacoes", "notifications"),
    ("notification", "notifications"),
    ("avaliacao", "assessments"),
    ("avaliacoes", "assessments"),
    ("assessment", "assessments"),
    ("curso_usuario", "course_user"),
    ("usuario_curso", "course_user"),
    ("turma_aluno", "class_student"),
    ("aluno_turma", "class_student"),
];

/// Source column words -> canonical target column. Entity words double as
/// the prefix of reference columns (`instituicao_id` -> `institution_id`).
const COLUMN_SYNONYMS: &[(&str, &str)] = &[
    ("nome", "name"),
    ("ativo", "active"),
    ("ativa", "active"),
    ("ordem", "order"),
    ("descricao", "description"),
    ("titulo", "title"),
    ("senha", "password"),
    ("telefone", "phone"),
    ("celular", "mobile_phone"),
    ("endereco", "address"),
    ("cidade", "city"),
    ("estado", "state"),
    ("pais", "country"),
    ("cep", "postal_code"),
    ("imagem", "image"),
    ("foto", "photo"),
    ("duracao", "duration"),
    ("conteudo", "content"),
    ("nota", "grade"),
    ("valor", "amount"),
    ("preco", "price"),
    ("quantidade", "quantity"),
    ("status", "status"),
    ("tipo", "type"),
    ("sobrenome", "last_name"),
    ("apelido", "nickname"),
    ("data_nascimento", "birth_date"),
    ("nascimento", "birth_date"),
    ("data_inicio", "start_date"),
    ("data_fim", "end_date"),
    ("data_criacao", "created_at"),
    ("criado_em", "created_at"),
    ("data_cadastro", "created_at"),
    ("data_atualizacao", "updated_at"),
    ("atualizado_em", "updated_at"),
    ("data_exclusao", "deleted_at"),
    ("excluido_em", "deleted_at"),
    ("instituicao", "institution"),
    ("usuario", "user"),
    ("escola", "school"),
    ("papel", "role"),
    ("perfil", "role"),
    ("curso", "course"),
    ("turma", "class"),
    ("aula", "lesson"),
    ("modulo", "module"),
    ("categoria", "category"),
    ("professor", "teacher"),
    ("aluno", "student"),
    ("questao", "question"),
    ("pergunta", "question"),
    ("resposta", "answer"),
    ("autor", "author"),
    ("responsavel", "owner"),
];

static TABLES: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| TABLE_SYNONYMS.iter().copied().collect());

static COLUMNS: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| COLUMN_SYNONYMS.iter().copied().collect());

/// PostgreSQL reserved key words (SQL Key Words appendix, "reserved" and
/// "reserved (can be function or type)").
static RESERVED_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
        "authorization", "binary", "both", "case", "cast", "check", "collate", "collation",
        "column", "concurrently", "constraint", "create", "cross", "current_catalog",
        "current_date", "current_role", "current_schema", "current_time", "current_timestamp",
        "current_user", "default", "deferrable", "desc", "distinct", "do", "else", "end",
        "except", "false", "fetch", "for", "foreign", "freeze", "from", "full", "grant",
        "group", "having", "ilike", "in", "initially", "inner", "intersect", "into", "is",
        "isnull", "join", "lateral", "leading", "left", "like", "limit", "localtime",
        "localtimestamp", "natural", "not", "notnull", "null", "offset", "on", "only", "or",
        "order", "outer", "overlaps", "placing", "primary", "references", "returning",
        "right", "select", "session_user", "similar", "some", "symmetric", "system_user",
        "table", "tablesample", "then", "to", "trailing", "true", "union", "unique", "user",
        "using", "variadic", "verbose", "when", "where", "window", "with",
    ]
    .into_iter()
    .collect()
});

/// Lowercase and strip accents: `Instituição` -> `instituicao`.
pub fn fold_key(name: &str) -> String {
    name.trim()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

/// Translate a source table name with the built-in dictionary.
pub fn normalize_table_name(name: &str) -> String {
    IdentifierNormalizer::default().table(name)
}

/// Translate a source column name with the built-in dictionary.
pub fn normalize_column_name(name: &str) -> String {
    IdentifierNormalizer::default().column(name)
}

/// Name translation with optional user-supplied aliases.
///
/// Aliases are consulted first, then the built-in dictionary, then the name
/// is returned as given.
#[derive(Debug, Clone, Default)]
pub struct IdentifierNormalizer {
    tables: HashMap<String, String>,
    columns: HashMap<String, String>,
}

impl IdentifierNormalizer {
    /// Build a normalizer from configured table and column aliases.
    pub fn with_aliases(
        tables: &HashMap<String, String>,
        columns: &HashMap<String, String>,
    ) -> Self {
        let fold = |m: &HashMap<String, String>| {
            m.iter()
                .map(|(k, v)| (fold_key(k), v.clone()))
                .collect::<HashMap<_, _>>()
        };
        Self {
            tables: fold(tables),
            columns: fold(columns),
        }
    }

    /// Canonical target table name for a source (or already canonical) name.
    pub fn table(&self, name: &str) -> String {
        let key = fold_key(name);
        if let Some(alias) = self.tables.get(&key) {
            return alias.clone();
        }
        match TABLES.get(key.as_str()) {
            Some(canonical) => (*canonical).to_string(),
            None => name.to_string(),
        }
    }

    /// Canonical target column name.
    ///
    /// Reference columns whose prefix is a known entity word are rewritten
    /// prefix-first, so `escola_id` becomes `school_id` without a dedicated
    /// dictionary entry.
    pub fn column(&self, name: &str) -> String {
        let key = fold_key(name);
        if let Some(alias) = self.columns.get(&key) {
            return alias.clone();
        }
        if let Some(canonical) = COLUMNS.get(key.as_str()) {
            return (*canonical).to_string();
        }
        if let Some(prefix) = key.strip_suffix(FOREIGN_KEY_SUFFIX) {
            let word = self
                .columns
                .get(prefix)
                .map(String::as_str)
                .or_else(|| COLUMNS.get(prefix).copied());
            if let Some(word) = word {
                return format!("{}{}", word, FOREIGN_KEY_SUFFIX);
            }
        }
        name.to_string()
    }
}

/// Whether `name` is a PostgreSQL reserved word (case-insensitive).
pub fn is_reserved_word(name: &str) -> bool {
    RESERVED_WORDS.contains(name.to_lowercase().as_str())
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$')
}

/// Quote `name` for PostgreSQL if it is reserved or would not survive
/// unquoted (uppercase letters, spaces, punctuation). Never fails.
pub fn escape_if_reserved(name: &str) -> String {
    if is_plain_identifier(name) && !is_reserved_word(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Shorten a generated name to PostgreSQL's limit.
///
/// Over-long names keep their head and get an 8-hex-digit SHA-256 digest of
/// the full name appended, so distinct inputs stay distinct.
pub fn bounded_identifier(full: String) -> String {
    if full.len() <= PG_MAX_IDENTIFIER_BYTES {
        return full;
    }
    let digest = hex::encode(Sha256::digest(full.as_bytes()));
    let mut cut = PG_MAX_IDENTIFIER_BYTES - 9;
    while !full.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}_{}", &full[..cut], &digest[..8])
}

/// Validate an identifier before it is embedded in SQL.
///
/// Rejects empty names, NUL bytes and names longer than
/// `MAX_IDENTIFIER_LENGTH`.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Always-quoted PostgreSQL identifier.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Backtick-quoted MySQL identifier.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}
