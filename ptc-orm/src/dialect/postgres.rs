use super::{Dialect, GeneratedKeysBehavior};
use crate::config::BackendKind;

pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgresql
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${n}")
    }

    fn column_type_name(&self, sql_type: &str, _sqlite_type: &str, length: Option<u32>) -> String {
        match (sql_type, length) {
            ("VARCHAR", Some(len)) => format!("VARCHAR({len})"),
            ("VARCHAR", None) => format!("VARCHAR({})", crate::registry::DEFAULT_STRING_LENGTH),
            _ => sql_type.to_string(),
        }
    }

    fn auto_increment_column_def(&self, column_name: &str, quoted_type: &str) -> String {
        // PostgreSQL substitutes the type entirely rather than appending a
        // keyword (§4.3's `serial_type` capability in the teacher's model).
        let _ = quoted_type;
        format!("\"{column_name}\" SERIAL")
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
            .map(|c| format!("\"{c}\" = excluded.\"{c}\""))
            .collect();
        format!(
            "INSERT INTO \"{table}\" ({cols}) VALUES ({vals}) ON CONFLICT ({conflict}) DO UPDATE SET {assign}",
            cols = columns.iter().map(|c| format!("\"{c}\"")).collect::<Vec<_>>().join(", "),
            vals = placeholders.join(", "),
            conflict = conflict_columns.iter().map(|c| format!("\"{c}\"")).collect::<Vec<_>>().join(", "),
            assign = assignments.join(", "),
        )
    }

    fn generated_keys_behavior(&self) -> GeneratedKeysBehavior {
        GeneratedKeysBehavior::AllRows
    }

    fn create_schema_sql(&self, schema: &str) -> Option<String> {
        Some(format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_with_double_quote() {
        assert_eq!(PostgresDialect.quote_ident("world"), "\"world\"");
    }

    #[test]
    fn placeholders_are_numbered() {
        assert_eq!(PostgresDialect.placeholder(1), "$1");
        assert_eq!(PostgresDialect.placeholder(2), "$2");
    }

    #[test]
    fn auto_increment_swaps_type_to_serial() {
        assert_eq!(PostgresDialect.auto_increment_column_def("id", "BIGINT"), "\"id\" SERIAL");
    }

    #[test]
    fn upsert_uses_on_conflict_do_update() {
        let sql = PostgresDialect.upsert_sql("player_home", &["username", "world"], &["username"], &["world"]);
        assert_eq!(
            sql,
            "INSERT INTO \"player_home\" (\"username\", \"world\") VALUES ($1, $2) ON CONFLICT (\"username\") DO UPDATE SET \"world\" = excluded.\"world\""
        );
    }

    #[test]
    fn create_schema_is_idempotent() {
        assert_eq!(
            PostgresDialect.create_schema_sql("tenant_a"),
            Some("CREATE SCHEMA IF NOT EXISTS \"tenant_a\"".to_string())
        );
    }
}
