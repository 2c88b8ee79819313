//! DDL / Migration Engine (C5). Generates `CREATE TABLE` statements from an
//! [`EntityDescriptor`], creates child tables for collection fields, recurses
//! into link targets, and runs ordered `_ptc_meta`-gated migration steps.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::metadata::{CollectionFieldDescriptor, CollectionKind, EntityDescriptor};
use crate::pool::AnyPool;
use crate::value::ColumnKind;

const META_TABLE: &str = "_ptc_meta";

fn default_types_for(kind: ColumnKind) -> (&'static str, &'static str) {
    match kind {
        ColumnKind::Bool => ("TINYINT(1)", "INTEGER"),
        ColumnKind::I64 | ColumnKind::IndexedEnum => ("BIGINT", "INTEGER"),
        ColumnKind::F64 => ("DOUBLE", "REAL"),
        ColumnKind::Str => ("VARCHAR", "TEXT"),
        ColumnKind::Bytes => ("BLOB", "BLOB"),
    }
}

fn column_def_sql(col: &crate::metadata::ColumnDescriptor, dialect: &dyn Dialect) -> String {
    let type_name = dialect.column_type_name(&col.sql_type, &col.sqlite_type, col.length);
    if col.is_auto_key {
        return dialect.auto_increment_column_def(&col.column_name, &type_name);
    }
    let quoted = dialect.quote_ident(&col.column_name);
    let mut def = format!("{quoted} {type_name}");
    if col.is_primary_key {
        def.push_str(" PRIMARY KEY");
    }
    if !col.nullable && !col.is_primary_key {
        def.push_str(" NOT NULL");
    }
    def
}

fn create_table_sql(descriptor: &EntityDescriptor, dialect: &dyn Dialect) -> String {
    let cols: Vec<String> = descriptor.columns.iter().map(|c| column_def_sql(c, dialect)).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        descriptor.quoted_table(dialect.quote_char()),
        cols.join(",\n  ")
    )
}

fn child_table_sql(
    descriptor: &EntityDescriptor,
    field: &CollectionFieldDescriptor,
    dialect: &dyn Dialect,
) -> Result<String> {
    let quote = dialect.quote_char();
    let parent_pk = descriptor
        .primary_key_column()
        .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "collection fields require a primary key".into()))?;
    let parent_col = format!("parent_{}", parent_pk.column_name);
    let pk_type = dialect.column_type_name(&parent_pk.sql_type, &parent_pk.sqlite_type, parent_pk.length);
    let id_type = dialect.column_type_name("BIGINT", "INTEGER", None);

    let mut cols = vec![
        dialect.auto_increment_column_def("id", &id_type),
        format!("{} {} NOT NULL", dialect.quote_ident(&parent_col), pk_type),
    ];

    let (value_sql, value_sqlite) = default_types_for(field.element_kind);
    let value_type = dialect.column_type_name(value_sql, value_sqlite, None);

    match field.kind {
        CollectionKind::List => {
            cols.push(format!("{} {} NOT NULL", dialect.quote_ident("value"), value_type));
            let order_type = dialect.column_type_name("INT", "INTEGER", None);
            cols.push(format!("{} {} NOT NULL", dialect.quote_ident("sort_order"), order_type));
        }
        CollectionKind::Set => {
            cols.push(format!("{} {} NOT NULL", dialect.quote_ident("value"), value_type));
        }
        CollectionKind::Map => {
            let key_kind = field
                .key_kind
                .ok_or_else(|| Error::Descriptor(descriptor.entity_name, "Map field missing a key codec".into()))?;
            let (key_sql, key_sqlite) = default_types_for(key_kind);
            let key_type = dialect.column_type_name(key_sql, key_sqlite, None);
            cols.push(format!("{} {} NOT NULL", dialect.quote_ident("map_key"), key_type));
            cols.push(format!("{} {} NOT NULL", dialect.quote_ident("map_value"), value_type));
        }
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {quote}{}{quote} (\n  {}\n)",
        field.child_table,
        cols.join(",\n  ")
    ))
}

async fn ensure_meta_table(pool: &AnyPool, dialect: &dyn Dialect) -> Result<()> {
    let quote = dialect.quote_char();
    let text_type = dialect.column_type_name("VARCHAR", "TEXT", Some(255));
    let int_type = dialect.column_type_name("BIGINT", "INTEGER", None);
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {quote}{META_TABLE}{quote} ({quote}table_name{quote} {text_type} PRIMARY KEY, {quote}version{quote} {int_type} NOT NULL)"
    );
    sqlx::query(&sql).execute(pool).await.map_err(Error::Database)?;
    Ok(())
}

async fn stored_version(pool: &AnyPool, dialect: &dyn Dialect, table_name: &str) -> Result<i64> {
    let quote = dialect.quote_char();
    let placeholder = dialect.placeholder(1);
    let sql = format!("SELECT {quote}version{quote} FROM {quote}{META_TABLE}{quote} WHERE {quote}table_name{quote} = {placeholder}");
    let row: Option<(i64,)> = sqlx::query_as(&sql)
        .bind(table_name)
        .fetch_optional(pool)
        .await
        .map_err(Error::Database)?;
    Ok(row.map(|(v,)| v).unwrap_or(0))
}

async fn write_version(pool: &AnyPool, dialect: &dyn Dialect, table_name: &str, version: i64) -> Result<()> {
    let sql = dialect.upsert_sql(META_TABLE, &["table_name", "version"], &["table_name"], &["version"]);
    sqlx::query(&sql)
        .bind(table_name)
        .bind(version)
        .execute(pool)
        .await
        .map_err(Error::Database)?;
    Ok(())
}

/// Runs every migration step with `version` greater than the stored version,
/// in ascending order, each inside its own transaction. A failed step leaves
/// the table pinned at its last successful version (§4.5, §7).
pub async fn run_migrations(descriptor: &EntityDescriptor, pool: &AnyPool, dialect: &dyn Dialect) -> Result<()> {
    if descriptor.migrations.is_empty() {
        return Ok(());
    }
    ensure_meta_table(pool, dialect).await?;
    let current = stored_version(pool, dialect, &descriptor.table_name).await?;

    let mut pending: Vec<_> = descriptor.migrations.iter().filter(|m| m.version > current).collect();
    pending.sort_by_key(|m| m.version);

    for step in pending {
        log::info!("migrating table `{}` to version {}", descriptor.table_name, step.version);
        let mut tx = pool.begin().await.map_err(Error::Database)?;
        for stmt in &step.statements {
            sqlx::query(stmt).execute(&mut *tx).await.map_err(|e| {
                log::error!(
                    "migration step {} for table `{}` failed: {e}",
                    step.version,
                    descriptor.table_name
                );
                Error::Migration(descriptor.table_name.clone(), step.version, e.to_string())
            })?;
        }
        tx.commit().await.map_err(Error::Database)?;
        write_version(pool, dialect, &descriptor.table_name, step.version).await?;
    }
    Ok(())
}

/// Ensures the main table, its child tables, and every link target's schema
/// exist, then runs pending migrations for this table. `visited` collapses
/// repeated link targets (including self-referential ones) to one pass.
pub fn ensure_schema<'a>(
    descriptor: &'a EntityDescriptor,
    pool: &'a AnyPool,
    dialect: &'a dyn Dialect,
    visited: &'a mut HashSet<String>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        if !visited.insert(descriptor.table_name.clone()) {
            return Ok(());
        }

        if let Some(schema) = &descriptor.schema {
            if let Some(sql) = dialect.create_schema_sql(schema) {
                sqlx::query(&sql).execute(pool).await.map_err(Error::Database)?;
            }
        }

        match &descriptor.manual_ddl {
            Some(statements) => {
                for stmt in statements {
                    sqlx::query(stmt).execute(pool).await.map_err(Error::Database)?;
                }
            }
            None => {
                log::debug!("creating table `{}` if absent", descriptor.table_name);
                let sql = create_table_sql(descriptor, dialect);
                sqlx::query(&sql).execute(pool).await.map_err(Error::Database)?;
            }
        }

        for field in &descriptor.collection_fields {
            log::debug!("creating child table `{}`", field.child_table);
            let sql = child_table_sql(descriptor, field, dialect)?;
            sqlx::query(&sql).execute(pool).await.map_err(Error::Database)?;
        }

        for link in &descriptor.link_fields {
            let target = (link.target)();
            ensure_schema(&target, pool, dialect, visited).await?;
        }

        run_migrations(descriptor, pool, dialect).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;
    use crate::metadata::ColumnDescriptor;

    fn sample_descriptor() -> EntityDescriptor {
        EntityDescriptor {
            entity_name: "Widget",
            table_name: "widget".into(),
            schema: None,
            columns: vec![
                ColumnDescriptor {
                    field_name: "id",
                    column_name: "id".into(),
                    kind: ColumnKind::I64,
                    sql_type: "BIGINT".into(),
                    sqlite_type: "INTEGER".into(),
                    length: None,
                    nullable: false,
                    is_primary_key: true,
                    is_secondary_key: false,
                    is_auto_key: true,
                    is_mutable: false,
                    is_synthetic: false,
                },
                ColumnDescriptor {
                    field_name: "name",
                    column_name: "name".into(),
                    kind: ColumnKind::Str,
                    sql_type: "VARCHAR".into(),
                    sqlite_type: "TEXT".into(),
                    length: Some(64),
                    nullable: false,
                    is_primary_key: false,
                    is_secondary_key: false,
                    is_auto_key: false,
                    is_mutable: true,
                    is_synthetic: false,
                },
            ],
            primary_key: Some(0),
            secondary_keys: vec![],
            link_fields: vec![],
            collection_fields: vec![],
            migrations: vec![],
            manual_ddl: None,
        }
    }

    #[test]
    fn create_table_sql_quotes_and_orders_columns() {
        let descriptor = sample_descriptor();
        let sql = create_table_sql(&descriptor, &SqliteDialect);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS `widget`"));
        assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("`name` TEXT NOT NULL"));
    }
}
