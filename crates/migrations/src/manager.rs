//! Migration Manager - File system operations for migrations
//!
//! Discovers migration files, parses their up/down sections and splits SQL
//! into executable statements.

use async_trait::async_trait;
use sqlparser::dialect::{Dialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Location, Token, TokenWithLocation, Tokenizer};
use std::fs;
use std::path::{Path, PathBuf};
use strata_core::Client;

use crate::definitions::{MigrationConfig, MigrationDefinition, MigrationDirection};
use crate::error::{MigrationError, MigrationResult};

/// Source of migration definitions.
///
/// Implementations return definitions sorted ascending by name and have no
/// side effects.
#[async_trait]
pub trait MigrationSource: Send + Sync {
    async fn load_migrations(&self) -> MigrationResult<Vec<MigrationDefinition>>;
}

/// Migration manager for loading migrations from a directory
pub struct MigrationManager {
    config: MigrationConfig,
}

impl MigrationManager {
    /// Create a new migration manager with default configuration
    pub fn new() -> Self {
        Self::with_config(MigrationConfig::default())
    }

    /// Create a new migration manager with custom configuration
    pub fn with_config(config: MigrationConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Parse a migration file into a definition named after its file stem
    fn parse_migration_file(
        &self,
        name: String,
        path: &Path,
        content: &str,
    ) -> MigrationResult<MigrationDefinition> {
        let (up, down) = parse_migration_content(content);

        let up = up.ok_or_else(|| {
            MigrationError::Discovery(format!(
                "Migration file {} has no up section (expected a `-- Up migration` line)",
                path.display()
            ))
        })?;

        Ok(MigrationDefinition { name, up, down })
    }
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MigrationSource for MigrationManager {
    /// Load all migration files from the migrations directory
    async fn load_migrations(&self) -> MigrationResult<Vec<MigrationDefinition>> {
        let files = read_sql_files(&self.config.migrations_dir, &self.config.extensions)?;

        let mut migrations = Vec::with_capacity(files.len());
        for file in files {
            migrations.push(self.parse_migration_file(file.name, &file.path, &file.content)?);
        }

        ensure_unique_names(&migrations)?;
        tracing::debug!(
            count = migrations.len(),
            dir = %self.config.migrations_dir.display(),
            "discovered migrations"
        );
        Ok(migrations)
    }
}

/// In-memory definitions, e.g. migrations embedded in a binary
#[async_trait]
impl MigrationSource for Vec<MigrationDefinition> {
    async fn load_migrations(&self) -> MigrationResult<Vec<MigrationDefinition>> {
        let mut migrations = self.clone();
        migrations.sort_by(|a, b| a.name.cmp(&b.name));
        ensure_unique_names(&migrations)?;
        Ok(migrations)
    }
}

fn ensure_unique_names(sorted: &[MigrationDefinition]) -> MigrationResult<()> {
    if let Some(pair) = sorted.windows(2).find(|pair| pair[0].name == pair[1].name) {
        return Err(MigrationError::Discovery(format!(
            "Duplicate migration name: {}",
            pair[0].name
        )));
    }
    Ok(())
}

/// A script file read from disk
pub(crate) struct SqlFile {
    pub name: String,
    pub path: PathBuf,
    pub content: String,
}

/// Read every file with a matching extension, sorted by file stem.
///
/// A missing directory yields no files.
pub(crate) fn read_sql_files(dir: &Path, extensions: &[String]) -> MigrationResult<Vec<SqlFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|e| {
        MigrationError::Discovery(format!("Failed to read directory {}: {}", dir.display(), e))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| MigrationError::Discovery(format!("Failed to read directory entry: {}", e)))?;

        let path = entry.path();
        let matches_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| extensions.iter().any(|allowed| allowed == ext));
        if !path.is_file() || !matches_extension {
            continue;
        }

        let name = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) if !stem.starts_with('.') => stem.to_string(),
            Some(_) => continue,
            None => {
                return Err(MigrationError::Discovery(format!(
                    "Invalid file name: {}",
                    path.display()
                )))
            }
        };

        let content = fs::read_to_string(&path).map_err(|e| {
            MigrationError::Discovery(format!("Failed to read {}: {}", path.display(), e))
        })?;

        files.push(SqlFile { name, path, content });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Recognize `-- Up migration` / `-- Down migration` section markers
fn section_marker(line: &str) -> Option<MigrationDirection> {
    let comment = line.trim().strip_prefix("--")?.trim().to_lowercase();
    let mut words = comment.split_whitespace();
    let direction = match words.next()?.trim_end_matches(':') {
        "up" => MigrationDirection::Up,
        "down" => MigrationDirection::Down,
        _ => return None,
    };

    match words.next() {
        None => Some(direction),
        Some(word) if word.starts_with("migration") => Some(direction),
        Some(_) => None,
    }
}

/// Split migration content into its up and down SQL.
///
/// Sections are empty-trimmed; an empty section counts as absent.
fn parse_migration_content(content: &str) -> (Option<String>, Option<String>) {
    let mut up_sql = Vec::new();
    let mut down_sql = Vec::new();
    let mut current_section = None;

    for line in content.lines() {
        if let Some(direction) = section_marker(line) {
            current_section = Some(direction);
            continue;
        }

        // Comments are dropped; they never reach the database
        if line.trim().starts_with("--") {
            continue;
        }

        match current_section {
            Some(MigrationDirection::Up) => up_sql.push(line),
            Some(MigrationDirection::Down) => down_sql.push(line),
            None => {} // Before any section marker
        }
    }

    let non_empty = |lines: Vec<&str>| {
        let sql = lines.join("\n").trim().to_string();
        (!sql.is_empty()).then_some(sql)
    };

    (non_empty(up_sql), non_empty(down_sql))
}

/// Split SQL into statements using the client's SQL dialect.
///
/// The tokenizer only locates statement boundaries: each statement is the
/// original source text between two top-level `;` tokens, so what runs is
/// exactly what was written. Semicolons inside strings, dollar-quoted bodies
/// and `BEGIN ... END` blocks of trigger, function and procedure definitions
/// do not end a statement. SQL the tokenizer rejects is returned whole, to
/// be run as a single script.
pub fn split_sql_statements(sql: &str, client: Client) -> Vec<String> {
    let dialect: Box<dyn Dialect> = match client {
        Client::Postgres => Box::new(PostgreSqlDialect {}),
        Client::Sqlite => Box::new(SQLiteDialect {}),
    };

    match Tokenizer::new(dialect.as_ref(), sql).tokenize_with_location() {
        Ok(tokens) => split_at_boundaries(sql, &tokens),
        Err(e) => {
            tracing::warn!("SQL tokenizing failed, running the section as one script: {}", e);
            let script = sql.trim();
            if script.is_empty() {
                Vec::new()
            } else {
                vec![script.to_string()]
            }
        }
    }
}

fn split_at_boundaries(sql: &str, tokens: &[TokenWithLocation]) -> Vec<String> {
    let mut position = SourcePosition::new(sql);
    let mut statements = Vec::new();
    let mut start = 0;
    let mut scope = StatementScope::default();

    for token in tokens {
        match &token.token {
            Token::SemiColon if scope.block_depth == 0 => {
                let end = position.advance_to(&token.location);
                if scope.has_content {
                    statements.push(sql[start..end].trim().to_string());
                }
                start = end + 1;
                scope = StatementScope::default();
            }
            other => scope.observe(other),
        }
    }

    if scope.has_content {
        statements.push(sql[start..].trim().to_string());
    }
    statements
}

/// Nesting state of the statement being scanned
#[derive(Debug, Default)]
struct StatementScope {
    /// Any token besides whitespace and comments was seen
    has_content: bool,
    /// Still inside `CREATE [OR REPLACE] [TEMP] ...` before the object kind
    in_create_header: bool,
    /// The statement defines a trigger, function or procedure
    has_body: bool,
    block_depth: usize,
}

impl StatementScope {
    fn observe(&mut self, token: &Token) {
        if matches!(token, Token::Whitespace(_)) {
            return;
        }

        let first = !self.has_content;
        self.has_content = true;

        let Token::Word(word) = token else {
            self.in_create_header = false;
            return;
        };

        if first {
            self.in_create_header = word.keyword == Keyword::CREATE;
            return;
        }

        if self.in_create_header {
            match word.keyword {
                Keyword::OR
                | Keyword::REPLACE
                | Keyword::TEMP
                | Keyword::TEMPORARY
                | Keyword::CONSTRAINT => {}
                Keyword::TRIGGER | Keyword::FUNCTION | Keyword::PROCEDURE => {
                    self.has_body = true;
                    self.in_create_header = false;
                }
                _ => self.in_create_header = false,
            }
            return;
        }

        if self.has_body {
            match word.keyword {
                Keyword::BEGIN | Keyword::CASE => self.block_depth += 1,
                Keyword::END => self.block_depth = self.block_depth.saturating_sub(1),
                _ => {}
            }
        }
    }
}

/// Maps tokenizer locations (1-based line and char column) to byte offsets.
///
/// Locations must be requested in increasing order.
struct SourcePosition<'a> {
    source: &'a str,
    offset: usize,
    line: u64,
    column: u64,
}

impl<'a> SourcePosition<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn advance_to(&mut self, location: &Location) -> usize {
        while (self.line, self.column) < (location.line, location.column) {
            let Some(ch) = self.source[self.offset..].chars().next() else {
                break;
            };
            self.offset += ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset
    }
}
