//! SQL Dialect Layer (C3). A closed interface per backend, grounded on the
//! teacher's `DriverCapabilities`/`PluginManifest` split between static
//! capability flags and the SQL-generation methods each driver module
//! implements for itself (`drivers::mysql::mod::get_create_table_sql` etc.).

mod mysql;
mod postgres;
mod sqlite;

use crate::config::BackendKind;

pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

/// How a backend returns generated primary keys from a batch insert (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedKeysBehavior {
    /// One key per inserted row (PostgreSQL, MySQL).
    AllRows,
    /// Only the last inserted key, regardless of batch size (SQLite — a
    /// documented known limit, §1 Non-goals / §9 Open Questions).
    LastRowOnly,
}

/// Per-backend SQL generation rules. Implementations hold no connection
/// state — they are pure text-and-syntax authorities consulted by C4/C5/C7.
pub trait Dialect: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Identifier quote character (`` ` `` for MySQL/SQLite, `"` for
    /// PostgreSQL, §4.3).
    fn quote_char(&self) -> char;

    fn quote_ident(&self, ident: &str) -> String {
        let q = self.quote_char();
        format!("{q}{ident}{q}")
    }

    /// Renders the `n`-th (1-based) placeholder for a bound parameter:
    /// `?` for SQLite/MySQL, `$n` for PostgreSQL.
    fn placeholder(&self, n: usize) -> String;

    /// `LIMIT`/`OFFSET` clause text, or an empty string for either part that
    /// doesn't apply.
    fn limit_offset(&self, limit: Option<i64>, offset: Option<i64>) -> String {
        let mut out = String::new();
        if let Some(l) = limit {
            out.push_str(&format!(" LIMIT {l}"));
        }
        if let Some(o) = offset {
            out.push_str(&format!(" OFFSET {o}"));
        }
        out
    }

    /// Maps a declared SQL type name (already dialect-specific — the
    /// descriptor stores `sql_type`/`sqlite_type` separately) onto the
    /// column-definition text used in `CREATE TABLE`/`ALTER TABLE`.
    fn column_type_name(&self, sql_type: &str, sqlite_type: &str, length: Option<u32>) -> String;

    /// The auto-increment keyword or type substitution for a primary-key
    /// column (e.g. `AUTO_INCREMENT` suffix for MySQL, `SERIAL` type swap for
    /// PostgreSQL, inline `INTEGER PRIMARY KEY` for SQLite).
    fn auto_increment_column_def(&self, column_name: &str, quoted_type: &str) -> String;

    /// `INSERT ... ON CONFLICT/DUPLICATE KEY ...` upsert syntax (§4.3).
    fn upsert_sql(
        &self,
        table: &str,
        columns: &[&str],
        conflict_columns: &[&str],
        update_columns: &[&str],
    ) -> String;

    fn generated_keys_behavior(&self) -> GeneratedKeysBehavior;

    /// `CREATE SCHEMA IF NOT EXISTS ...` — a no-op everywhere but PostgreSQL.
    fn create_schema_sql(&self, _schema: &str) -> Option<String> {
        None
    }
}

pub fn dialect_for(kind: BackendKind) -> Box<dyn Dialect> {
    match kind {
        BackendKind::Sqlite => Box::new(SqliteDialect),
        BackendKind::Mysql => Box::new(MysqlDialect),
        BackendKind::Postgresql => Box::new(PostgresDialect),
    }
}
