use super::{Dialect, GeneratedKeysBehavior};
use crate::config::BackendKind;

pub struct MysqlDialect;

impl Dialect for MysqlDialect {
    fn kind(&self) -> BackendKind {
        BackendKind::Mysql
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn placeholder(&self, _n: usize) -> String {
        "?".to_string()
    }

    fn column_type_name(&self, sql_type: &str, _sqlite_type: &str, length: Option<u32>) -> String {
        match (sql_type, length) {
            ("VARCHAR", Some(len)) => format!("VARCHAR({len})"),
            ("VARCHAR", None) => format!("VARCHAR({})", crate::registry::DEFAULT_STRING_LENGTH),
            _ => sql_type.to_string(),
        }
    }

    fn auto_increment_column_def(&self, column_name: &str, quoted_type: &str) -> String {
        format!("`{column_name}` {quoted_type} AUTO_INCREMENT")
    }

    fn upsert_sql(
        &self,
        table: &str,
        columns: &[&str],
        _conflict_columns: &[&str],
        update_columns: &[&str],
    ) -> String {
        let placeholders: Vec<String> = (1..=columns.len()).map(|n| self.placeholder(n)).collect();
        let assignments: Vec<String> = update_columns
            .iter()
            .map(|c| format!("`{c}` = VALUES(`{c}`)"))
            .collect();
        format!(
            "INSERT INTO `{table}` ({cols}) VALUES ({vals}) ON DUPLICATE KEY UPDATE {assign}",
            cols = columns.iter().map(|c| format!("`{c}`")).collect::<Vec<_>>().join(", "),
            vals = placeholders.join(", "),
            assign = assignments.join(", "),
        )
    }

    fn generated_keys_behavior(&self) -> GeneratedKeysBehavior {
        GeneratedKeysBehavior::AllRows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varchar_falls_back_to_default_length() {
        assert_eq!(MysqlDialect.column_type_name("VARCHAR", "TEXT", None), "VARCHAR(64)");
        assert_eq!(MysqlDialect.column_type_name("VARCHAR", "TEXT", Some(32)), "VARCHAR(32)");
    }

    #[test]
    fn auto_increment_appends_keyword_rather_than_swapping_type() {
        assert_eq!(MysqlDialect.auto_increment_column_def("id", "BIGINT"), "`id` BIGINT AUTO_INCREMENT");
    }

    #[test]
    fn upsert_uses_on_duplicate_key_update() {
        let sql = MysqlDialect.upsert_sql("player_home", &["username", "world"], &[], &["world"]);
        assert_eq!(
            sql,
            "INSERT INTO `player_home` (`username`, `world`) VALUES (?, ?) ON DUPLICATE KEY UPDATE `world` = VALUES(`world`)"
        );
    }

    #[test]
    fn batch_inserts_report_every_generated_key() {
        assert_eq!(MysqlDialect.generated_keys_behavior(), GeneratedKeysBehavior::AllRows);
    }
}
