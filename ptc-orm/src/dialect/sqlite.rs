use super::{Dialect, GeneratedKeysBehavior};
use crate::config::BackendKind;

pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn placeholder(&self, _n: usize) -> String {
        "?".to_string()
    }

    fn column_type_name(&self, _sql_type: &str, sqlite_type: &str, length: Option<u32>) -> String {
        match (sqlite_type, length) {
            ("TEXT", _) | ("VARCHAR", _) => "TEXT".to_string(),
            _ => sqlite_type.to_string(),
        }
    }

    fn auto_increment_column_def(&self, column_name: &str, _quoted_type: &str) -> String {
        // SQLite's rowid aliasing requires the inline form; the dialect never
        // appends a trailing keyword like MySQL does.
        format!("{column_name} INTEGER PRIMARY KEY AUTOINCREMENT")
    }

    fn upsert_sql(
        &self,
        table: &str,
        columns: &[&str],
        conflict_columns: &[&str],
        update_columns: &[&str],
    ) -> String {
        let placeholders: Vec<String> = (1..=columns.len()).map(|n| self.placeholder(n)).collect();
        let assignments: Vec<String> = update_columns
            .iter()
            .map(|c| format!("`{c}` = excluded.`{c}`"))
            .collect();
        format!(
            "INSERT INTO `{table}` ({cols}) VALUES ({vals}) ON CONFLICT ({conflict}) DO UPDATE SET {assign}",
            cols = columns.iter().map(|c| format!("`{c}`")).collect::<Vec<_>>().join(", "),
            vals = placeholders.join(", "),
            conflict = conflict_columns.iter().map(|c| format!("`{c}`")).collect::<Vec<_>>().join(", "),
            assign = assignments.join(", "),
        )
    }

    fn generated_keys_behavior(&self) -> GeneratedKeysBehavior {
        GeneratedKeysBehavior::LastRowOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_with_backtick() {
        assert_eq!(SqliteDialect.quote_ident("world"), "`world`");
    }

    #[test]
    fn placeholder_is_always_question_mark() {
        assert_eq!(SqliteDialect.placeholder(1), "?");
        assert_eq!(SqliteDialect.placeholder(9), "?");
    }

    #[test]
    fn upsert_uses_on_conflict_do_update() {
        let sql = SqliteDialect.upsert_sql("player_home", &["username", "world"], &["username"], &["world"]);
        assert_eq!(
            sql,
            "INSERT INTO `player_home` (`username`, `world`) VALUES (?, ?) ON CONFLICT (`username`) DO UPDATE SET `world` = excluded.`world`"
        );
    }

    #[test]
    fn batch_inserts_report_only_the_last_generated_key() {
        assert_eq!(SqliteDialect.generated_keys_behavior(), GeneratedKeysBehavior::LastRowOnly);
    }

    #[test]
    fn has_no_schema_concept() {
        assert_eq!(SqliteDialect.create_schema_sql("public"), None);
    }
}
